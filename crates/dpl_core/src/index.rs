use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;
use walkdir::WalkDir;

use crate::namespace::{Namespace, NamespaceEntry, NamespaceTable, PageTitle, normalize_spaces};
use crate::runtime::{ResolvedPaths, normalize_for_display};

const INDEX_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS indexed_pages (
    title TEXT PRIMARY KEY,
    namespace_id INTEGER NOT NULL,
    namespace TEXT NOT NULL,
    page_text TEXT NOT NULL,
    relative_path TEXT NOT NULL,
    is_redirect INTEGER NOT NULL,
    redirect_target TEXT,
    content_hash TEXT NOT NULL,
    bytes INTEGER NOT NULL,
    touched TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_indexed_pages_namespace ON indexed_pages(namespace_id, page_text);

CREATE TABLE IF NOT EXISTS indexed_links (
    source_title TEXT NOT NULL,
    link_kind TEXT NOT NULL,
    target_title TEXT NOT NULL,
    target_namespace INTEGER NOT NULL,
    target_text TEXT NOT NULL,
    sortkey TEXT NOT NULL DEFAULT '',
    added_at TEXT NOT NULL,
    PRIMARY KEY (source_title, link_kind, target_title),
    FOREIGN KEY (source_title) REFERENCES indexed_pages(title) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_indexed_links_target ON indexed_links(link_kind, target_title);
CREATE INDEX IF NOT EXISTS idx_indexed_links_category ON indexed_links(link_kind, target_text);

CREATE TABLE IF NOT EXISTS indexed_revisions (
    rev_id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_title TEXT NOT NULL,
    rev_timestamp TEXT NOT NULL,
    user_name TEXT NOT NULL,
    minor INTEGER NOT NULL DEFAULT 0,
    size_delta INTEGER NOT NULL DEFAULT 0,
    comment TEXT NOT NULL DEFAULT '',
    FOREIGN KEY (page_title) REFERENCES indexed_pages(title) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_indexed_revisions_page ON indexed_revisions(page_title, rev_timestamp);
"#;

pub const UNCATEGORIZED_VIEW_NAME: &str = "dpl_clview";

/// Every page paired with each of its categories; uncategorized pages appear once with an empty category.
pub const UNCATEGORIZED_VIEW_SQL: &str = "CREATE VIEW dpl_clview AS SELECT p.title AS cl_from, IFNULL(l.target_text, '') AS cl_to, IFNULL(l.sortkey, '') AS cl_sortkey, IFNULL(l.added_at, p.touched) AS cl_timestamp FROM indexed_pages p LEFT OUTER JOIN indexed_links l ON l.source_title = p.title AND l.link_kind = 'category'";

pub const IMPORT_USER: &str = "Maintenance script";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Page,
    Category,
    Template,
    File,
}

impl LinkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Category => "category",
            Self::Template => "template",
            Self::File => "file",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    pub kind: LinkKind,
    pub target: PageTitle,
    /// Category sort key; empty unless given as `[[Category:X|key]]`.
    pub sortkey: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    pub db_path: String,
    pub inserted_pages: usize,
    pub inserted_links: usize,
    pub inserted_revisions: usize,
    pub redirects: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredIndexStats {
    pub indexed_pages: usize,
    pub redirects: usize,
    pub links_by_kind: BTreeMap<String, usize>,
    pub revisions: usize,
    pub by_namespace: BTreeMap<String, usize>,
    pub uncategorized_view: bool,
}

#[derive(Debug, Clone)]
struct ScannedPage {
    title: PageTitle,
    relative_path: String,
    is_redirect: bool,
    redirect_target: Option<String>,
    content_hash: String,
    bytes: u64,
    touched: String,
    content: String,
}

pub fn rebuild_index(paths: &ResolvedPaths, namespaces: &NamespaceTable) -> Result<RebuildReport> {
    let pages = scan_pages(paths, namespaces)?;
    ensure_db_parent(paths)?;
    let mut connection = open_connection(&paths.db_path)?;
    initialize_schema(&connection)?;

    let transaction = connection
        .transaction()
        .context("failed to start index rebuild transaction")?;
    transaction
        .execute("DELETE FROM indexed_pages", [])
        .context("failed to clear indexed_pages table")?;

    let mut inserted_pages = 0usize;
    let mut inserted_links = 0usize;
    let mut inserted_revisions = 0usize;
    let mut redirects = 0usize;
    {
        let mut page_statement = transaction
            .prepare(
                "INSERT OR REPLACE INTO indexed_pages (
                    title,
                    namespace_id,
                    namespace,
                    page_text,
                    relative_path,
                    is_redirect,
                    redirect_target,
                    content_hash,
                    bytes,
                    touched
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )
            .context("failed to prepare indexed_pages insert")?;

        for page in &pages {
            let title = page.title.prefixed();
            page_statement
                .execute(params![
                    title,
                    page.title.namespace_id,
                    page.title.namespace,
                    page.title.text,
                    page.relative_path,
                    if page.is_redirect { 1i64 } else { 0i64 },
                    page.redirect_target,
                    page.content_hash,
                    i64::try_from(page.bytes).context("bytes value does not fit into i64")?,
                    page.touched,
                ])
                .with_context(|| format!("failed to insert {}", page.relative_path))?;
            inserted_pages += 1;
            if page.is_redirect {
                redirects += 1;
            }

            for link in extract_links(&page.content, namespaces) {
                inserted_links += insert_link(&transaction, &title, &link, &page.touched)?;
            }
            record_revision(
                &transaction,
                &title,
                &page.touched,
                IMPORT_USER,
                false,
                i64::try_from(page.bytes).context("bytes value does not fit into i64")?,
                "Imported from wiki_content",
            )?;
            inserted_revisions += 1;
        }
    }

    transaction
        .commit()
        .context("failed to commit index rebuild transaction")?;

    info!(
        pages = inserted_pages,
        links = inserted_links,
        revisions = inserted_revisions,
        "rebuilt content index"
    );
    Ok(RebuildReport {
        db_path: normalize_for_display(&paths.db_path),
        inserted_pages,
        inserted_links,
        inserted_revisions,
        redirects,
    })
}

pub fn load_stored_index_stats(paths: &ResolvedPaths) -> Result<Option<StoredIndexStats>> {
    if !paths.db_path.exists() {
        return Ok(None);
    }

    let connection = open_connection(&paths.db_path)?;
    if !table_exists(&connection, "indexed_pages")? {
        return Ok(None);
    }

    let indexed_pages = count_query(&connection, "SELECT COUNT(*) FROM indexed_pages")
        .context("failed to count indexed pages")?;
    let redirects = count_query(
        &connection,
        "SELECT COUNT(*) FROM indexed_pages WHERE is_redirect = 1",
    )
    .context("failed to count redirects")?;
    let revisions = count_query(&connection, "SELECT COUNT(*) FROM indexed_revisions")
        .context("failed to count revisions")?;
    let links_by_kind = grouped_counts(
        &connection,
        "SELECT link_kind, COUNT(*) FROM indexed_links GROUP BY link_kind ORDER BY link_kind ASC",
    )?;
    let by_namespace = grouped_counts(
        &connection,
        "SELECT namespace, COUNT(*) FROM indexed_pages GROUP BY namespace ORDER BY namespace ASC",
    )?;

    Ok(Some(StoredIndexStats {
        indexed_pages,
        redirects,
        links_by_kind,
        revisions,
        by_namespace,
        uncategorized_view: view_exists(&connection, UNCATEGORIZED_VIEW_NAME)?,
    }))
}

/// Create the uncategorized view. Returns `false` when it already existed.
pub fn create_uncategorized_view(paths: &ResolvedPaths) -> Result<bool> {
    ensure_db_parent(paths)?;
    let connection = open_connection(&paths.db_path)?;
    initialize_schema(&connection)?;
    if view_exists(&connection, UNCATEGORIZED_VIEW_NAME)? {
        return Ok(false);
    }
    connection
        .execute_batch(UNCATEGORIZED_VIEW_SQL)
        .with_context(|| format!("failed to create view {UNCATEGORIZED_VIEW_NAME}"))?;
    Ok(true)
}

pub fn open_connection(db_path: &Path) -> Result<Connection> {
    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    connection
        .busy_timeout(Duration::from_secs(5))
        .context("failed to set sqlite busy timeout")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign_keys pragma")?;
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to enable WAL journal mode")?;
    Ok(connection)
}

pub fn initialize_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(INDEX_SCHEMA_SQL)
        .context("failed to initialize index schema")
}

pub fn table_exists(connection: &Connection, table_name: &str) -> Result<bool> {
    schema_object_exists(connection, "table", table_name)
}

pub fn view_exists(connection: &Connection, view_name: &str) -> Result<bool> {
    schema_object_exists(connection, "view", view_name)
}

fn schema_object_exists(connection: &Connection, kind: &str, name: &str) -> Result<bool> {
    let exists: i64 = connection
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2)",
            [kind, name],
            |row| row.get(0),
        )
        .with_context(|| format!("failed to check sqlite_master for {kind} {name}"))?;
    Ok(exists == 1)
}

/// Insert one page row directly, bypassing the filesystem scan.
pub fn insert_page(
    connection: &Connection,
    title: &PageTitle,
    content: &str,
    touched: &str,
    namespaces: &NamespaceTable,
) -> Result<()> {
    let prefixed = title.prefixed();
    let (is_redirect, redirect_target) = parse_redirect(content);
    let bytes = i64::try_from(content.len()).context("bytes value does not fit into i64")?;
    connection
        .execute(
            "INSERT OR REPLACE INTO indexed_pages (
                title, namespace_id, namespace, page_text, relative_path,
                is_redirect, redirect_target, content_hash, bytes, touched
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                prefixed,
                title.namespace_id,
                title.namespace,
                title.text,
                String::new(),
                if is_redirect { 1i64 } else { 0i64 },
                redirect_target,
                compute_hash(content),
                bytes,
                touched,
            ],
        )
        .with_context(|| format!("failed to insert page {prefixed}"))?;
    for link in extract_links(content, namespaces) {
        insert_link(connection, &prefixed, &link, touched)?;
    }
    Ok(())
}

fn insert_link(
    connection: &Connection,
    source_title: &str,
    link: &ExtractedLink,
    added_at: &str,
) -> Result<usize> {
    connection
        .execute(
            "INSERT OR IGNORE INTO indexed_links (
                source_title,
                link_kind,
                target_title,
                target_namespace,
                target_text,
                sortkey,
                added_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                source_title,
                link.kind.as_str(),
                link.target.prefixed(),
                link.target.namespace_id,
                link.target.text,
                link.sortkey,
                added_at,
            ],
        )
        .with_context(|| format!("failed to insert links for {source_title}"))
}

pub fn record_revision(
    connection: &Connection,
    page_title: &str,
    timestamp: &str,
    user_name: &str,
    minor: bool,
    size_delta: i64,
    comment: &str,
) -> Result<()> {
    connection
        .execute(
            "INSERT INTO indexed_revisions (
                page_title,
                rev_timestamp,
                user_name,
                minor,
                size_delta,
                comment
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                page_title,
                timestamp,
                user_name,
                if minor { 1i64 } else { 0i64 },
                size_delta,
                comment,
            ],
        )
        .with_context(|| format!("failed to record revision for {page_title}"))?;
    Ok(())
}

/// Wiki links, category memberships, file uses and template transclusions found in wikitext.
pub fn extract_links(content: &str, namespaces: &NamespaceTable) -> Vec<ExtractedLink> {
    let mut out = extract_wikilinks(content, namespaces);
    out.extend(extract_templates(content, namespaces));
    out
}

fn extract_wikilinks(content: &str, namespaces: &NamespaceTable) -> Vec<ExtractedLink> {
    let mut out = Vec::new();
    let mut rest = content;
    while let Some(start) = rest.find("[[") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("]]") else {
            break;
        };
        if let Some(link) = parse_wikilink(&after[..end], namespaces) {
            out.push(link);
        }
        rest = &after[end + 2..];
    }
    out
}

fn parse_wikilink(inner: &str, namespaces: &NamespaceTable) -> Option<ExtractedLink> {
    let (target_part, label) = match inner.split_once('|') {
        Some((target, label)) => (target.trim(), label.trim()),
        None => (inner.trim(), ""),
    };

    let mut target = target_part;
    let mut leading_colon = false;
    while let Some(stripped) = target.strip_prefix(':') {
        leading_colon = true;
        target = stripped.trim_start();
    }
    if let Some((without_fragment, _)) = target.split_once('#') {
        target = without_fragment.trim_end();
    }
    if target.is_empty()
        || target.starts_with("http://")
        || target.starts_with("https://")
        || target.starts_with("//")
    {
        return None;
    }

    let target = canonical_file_prefix(target);
    let title = namespaces.parse_title(&target)?;
    let kind = if leading_colon {
        LinkKind::Page
    } else if title.namespace_id == Namespace::Category.id() {
        LinkKind::Category
    } else if title.namespace_id == Namespace::File.id() {
        LinkKind::File
    } else {
        LinkKind::Page
    };
    let sortkey = if kind == LinkKind::Category {
        label.to_string()
    } else {
        String::new()
    };
    Some(ExtractedLink {
        kind,
        target: title,
        sortkey,
    })
}

fn canonical_file_prefix(target: &str) -> String {
    match target.split_once(':') {
        Some((prefix, rest)) if prefix.trim().eq_ignore_ascii_case("Image") => {
            format!("{}{}", Namespace::File.prefix(), rest)
        }
        _ => target.to_string(),
    }
}

fn extract_templates(content: &str, namespaces: &NamespaceTable) -> Vec<ExtractedLink> {
    let mut out = Vec::new();
    let mut rest = content;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        if after.starts_with('{') {
            // Template parameter `{{{name}}}`.
            rest = after.trim_start_matches('{');
            continue;
        }
        let end = after.find(['|', '}', '{']).unwrap_or(after.len());
        if let Some(title) = template_title(&after[..end], namespaces)
            && !out.iter().any(|link: &ExtractedLink| link.target == title)
        {
            out.push(ExtractedLink {
                kind: LinkKind::Template,
                target: title,
                sortkey: String::new(),
            });
        }
        rest = after;
    }
    out
}

fn template_title(raw_name: &str, namespaces: &NamespaceTable) -> Option<PageTitle> {
    let name = normalize_spaces(raw_name);
    if name.is_empty() || name.starts_with('#') {
        return None;
    }
    if let Some(page) = name.strip_prefix(':') {
        return namespaces.parse_title(page);
    }
    if let Some((prefix, _)) = name.split_once(':') {
        // Parser functions and magic words (`DISPLAYTITLE:`) are not transclusions.
        let entry = namespaces.resolve(prefix).filter(|entry| !entry.is_main())?;
        return namespaces.parse_title(&name).filter(|title| title.namespace_id == entry.id);
    }
    if name
        .chars()
        .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == ' ')
    {
        return None;
    }
    namespaces.parse_title(&format!("{}{}", Namespace::Template.prefix(), name))
}

fn scan_pages(paths: &ResolvedPaths, namespaces: &NamespaceTable) -> Result<Vec<ScannedPage>> {
    let mut out = Vec::new();
    if !paths.wiki_content_dir.exists() {
        return Ok(out);
    }
    for entry in namespaces.entries() {
        let base = paths.wiki_content_dir.join(&entry.folder);
        if !base.exists() {
            continue;
        }
        for file in WalkDir::new(&base).follow_links(false).sort_by_file_name() {
            let file = file.with_context(|| format!("failed to walk {}", base.display()))?;
            if !file.file_type().is_file() {
                continue;
            }
            let path = file.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("wiki") {
                continue;
            }
            let relative = path
                .strip_prefix(&base)
                .with_context(|| format!("{} escapes {}", path.display(), base.display()))?;
            let Some(title) = relative_path_to_title(entry, relative) else {
                continue;
            };
            out.push(read_scanned_page(paths, path, title)?);
        }
    }
    Ok(out)
}

fn relative_path_to_title(entry: &NamespaceEntry, relative: &Path) -> Option<PageTitle> {
    let segments = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>();
    let (last, parents) = segments.split_last()?;
    let last = last.strip_suffix(".wiki").unwrap_or(last);
    let text = parents
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(last))
        .map(decode_segment)
        .collect::<Vec<_>>()
        .join("/");
    let text = normalize_spaces(&text);
    if text.is_empty() {
        return None;
    }
    Some(PageTitle::new(entry, text))
}

fn decode_segment(value: &str) -> String {
    value
        .replace("___", "/")
        .replace("--", ":")
        .replace('_', " ")
}

fn read_scanned_page(paths: &ResolvedPaths, path: &Path, title: PageTitle) -> Result<ScannedPage> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let metadata =
        fs::metadata(path).with_context(|| format!("failed to stat {}", path.display()))?;
    let modified = metadata
        .modified()
        .with_context(|| format!("failed to read modification time of {}", path.display()))?;
    let touched = DateTime::<Utc>::from(modified)
        .format("%Y%m%d%H%M%S")
        .to_string();
    let (is_redirect, redirect_target) = parse_redirect(&content);
    let relative_path = path
        .strip_prefix(&paths.project_root)
        .map(normalize_for_display)
        .unwrap_or_else(|_| normalize_for_display(path));

    Ok(ScannedPage {
        title,
        relative_path,
        is_redirect,
        redirect_target,
        content_hash: compute_hash(&content),
        bytes: metadata.len(),
        touched,
        content,
    })
}

fn compute_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut output = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn parse_redirect(content: &str) -> (bool, Option<String>) {
    let trimmed = content.trim();
    if !trimmed.to_ascii_uppercase().starts_with("#REDIRECT") {
        return (false, None);
    }
    if let Some(start) = trimmed.find("[[")
        && let Some(end) = trimmed[start + 2..].find("]]")
    {
        let target = trimmed[start + 2..start + 2 + end].trim().to_string();
        if !target.is_empty() {
            return (true, Some(target));
        }
    }
    (true, None)
}

fn ensure_db_parent(paths: &ResolvedPaths) -> Result<()> {
    let parent = paths
        .db_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("db path has no parent: {}", paths.db_path.display()))?;
    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create database parent directory {}",
            parent.display()
        )
    })
}

fn count_query(connection: &Connection, sql: &str) -> Result<usize> {
    let count: i64 = connection
        .query_row(sql, [], |row| row.get(0))
        .with_context(|| format!("failed query: {sql}"))?;
    usize::try_from(count).context("count does not fit into usize")
}

fn grouped_counts(connection: &Connection, sql: &str) -> Result<BTreeMap<String, usize>> {
    let mut statement = connection
        .prepare(sql)
        .with_context(|| format!("failed to prepare aggregation query: {sql}"))?;
    let rows = statement
        .query_map([], |row| {
            let key: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((key, count))
        })
        .context("failed to run aggregation query")?;

    let mut out = BTreeMap::new();
    for row in rows {
        let (key, count) = row.context("failed to read aggregation row")?;
        let count = usize::try_from(count).context("count does not fit into usize")?;
        out.insert(key, count);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::*;
    use crate::runtime::ValueSource;

    fn write_file(path: &Path, content: &str) {
        let parent = path.parent().expect("parent");
        fs::create_dir_all(parent).expect("create parent");
        fs::write(path, content).expect("write file");
    }

    fn paths(project_root: &Path) -> ResolvedPaths {
        ResolvedPaths {
            wiki_content_dir: project_root.join("wiki_content"),
            state_dir: project_root.join(".dpl"),
            data_dir: project_root.join(".dpl").join("data"),
            db_path: project_root.join(".dpl").join("data").join("dpl.db"),
            config_path: project_root.join(".dpl").join("config.toml"),
            project_root: project_root.to_path_buf(),
            root_source: ValueSource::Flag,
            data_source: ValueSource::Default,
            config_source: ValueSource::Default,
        }
    }

    #[test]
    fn extract_links_classifies_link_kinds() {
        let namespaces = NamespaceTable::default();
        let content = "[[Alpha|label]] [[Category:People|Smith, John]] [[:Category:People]] \
                       [[Image:Map.png|thumb]] [[Alpha#History]] [[https://example.com]] \
                       {{Infobox person|name={{PAGENAME}}}} {{#if:x|y}} {{:Beta}} {{{param}}} {{Infobox person}}";
        let links = extract_links(content, &namespaces);
        let summary = links
            .iter()
            .map(|link| (link.kind, link.target.prefixed(), link.sortkey.clone()))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                (LinkKind::Page, "Alpha".to_string(), String::new()),
                (
                    LinkKind::Category,
                    "Category:People".to_string(),
                    "Smith, John".to_string()
                ),
                (LinkKind::Page, "Category:People".to_string(), String::new()),
                (LinkKind::File, "File:Map.png".to_string(), String::new()),
                (LinkKind::Page, "Alpha".to_string(), String::new()),
                (
                    LinkKind::Template,
                    "Template:Infobox person".to_string(),
                    String::new()
                ),
                (LinkKind::Template, "Beta".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn rebuild_index_persists_pages_links_and_revisions() {
        let temp = tempdir().expect("tempdir");
        let project_root = temp.path().join("project");
        fs::create_dir_all(&project_root).expect("create project root");
        let paths = paths(&project_root);
        let namespaces = NamespaceTable::default();

        write_file(
            &paths.wiki_content_dir.join("Main").join("Alpha.wiki"),
            "[[Beta]] [[Category:People]] {{Infobox}}",
        );
        write_file(
            &paths.wiki_content_dir.join("Main").join("Guide").join("Intro.wiki"),
            "Subpage [[Category:People]]",
        );
        write_file(
            &paths.wiki_content_dir.join("Main").join("Old_Name.wiki"),
            "#REDIRECT [[Alpha]]",
        );
        write_file(
            &paths.wiki_content_dir.join("Category").join("People.wiki"),
            "People category",
        );

        let report = rebuild_index(&paths, &namespaces).expect("rebuild");
        assert_eq!(report.inserted_pages, 4);
        assert_eq!(report.inserted_revisions, 4);
        assert_eq!(report.redirects, 1);

        let stats = load_stored_index_stats(&paths)
            .expect("load stats")
            .expect("stats must exist");
        assert_eq!(stats.indexed_pages, 4);
        assert_eq!(stats.revisions, 4);
        assert_eq!(
            stats.by_namespace,
            BTreeMap::from([("Category".to_string(), 1), ("Main".to_string(), 3)])
        );
        assert_eq!(stats.links_by_kind.get("category"), Some(&2));
        assert_eq!(stats.links_by_kind.get("template"), Some(&1));
        assert!(!stats.uncategorized_view);

        let connection = open_connection(&paths.db_path).expect("open");
        let (text, user): (String, String) = connection
            .query_row(
                "SELECT p.page_text, r.user_name FROM indexed_pages p
                 JOIN indexed_revisions r ON r.page_title = p.title
                 WHERE p.title = 'Guide/Intro'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("subpage row");
        assert_eq!(text, "Guide/Intro");
        assert_eq!(user, IMPORT_USER);
    }

    #[test]
    fn create_uncategorized_view_is_idempotent() {
        let temp = tempdir().expect("tempdir");
        let project_root = temp.path().join("project");
        fs::create_dir_all(&project_root).expect("create project root");
        let paths = paths(&project_root);

        assert!(create_uncategorized_view(&paths).expect("create view"));
        assert!(!create_uncategorized_view(&paths).expect("create view again"));

        let connection = open_connection(&paths.db_path).expect("open");
        let namespaces = NamespaceTable::default();
        let lonely = namespaces.parse_title("Lonely").expect("title");
        insert_page(&connection, &lonely, "no categories", "20240101000000", &namespaces)
            .expect("insert");
        let category: String = connection
            .query_row(
                "SELECT cl_to FROM dpl_clview WHERE cl_from = 'Lonely'",
                [],
                |row| row.get(0),
            )
            .expect("view row");
        assert_eq!(category, "");
    }

    #[test]
    fn load_stored_index_stats_returns_none_when_db_is_missing() {
        let temp = tempdir().expect("tempdir");
        let paths = paths(temp.path());
        assert!(load_stored_index_stats(&paths).expect("load stats").is_none());
    }
}
