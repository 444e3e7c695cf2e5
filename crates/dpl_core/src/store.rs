use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params_from_iter};
use tracing::debug;

use crate::index::{UNCATEGORIZED_VIEW_NAME, open_connection, view_exists};
use crate::namespace::{NamespaceTable, PageTitle};
use crate::parameters::{
    CategoryFilter, CategoryGroup, Comparison, MinorEdits, Operator, OrderMethod, Redirects,
    SortOrder,
};
use crate::query::{
    ContentStore, Contribution, QueryGoal, QueryResult, QuerySpecification, ResultRow,
};

const CATEGORY_SOURCE: &str = "(SELECT source_title AS cl_from, target_text AS cl_to, sortkey AS cl_sortkey, added_at AS cl_timestamp FROM indexed_links WHERE link_kind = 'category')";
const FIELD_SEPARATOR: char = '\u{1f}';

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Content store over the SQLite index.
pub struct SqliteStore {
    connection: Connection,
    namespaces: NamespaceTable,
}

impl SqliteStore {
    pub fn open(db_path: &Path, namespaces: NamespaceTable) -> Result<Self> {
        let connection = open_connection(db_path)?;
        Self::from_connection(connection, namespaces)
    }

    pub fn from_connection(connection: Connection, namespaces: NamespaceTable) -> Result<Self> {
        register_regexp(&connection)?;
        Ok(Self {
            connection,
            namespaces,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn title_from_prefixed(&self, prefixed: &str) -> PageTitle {
        self.namespaces
            .parse_title(prefixed)
            .unwrap_or_else(|| PageTitle::new(self.namespaces.main(), prefixed.to_string()))
    }

    fn select_pages(&self, spec: &QuerySpecification) -> Result<QueryResult> {
        let mut sql = SqlBuilder::default();
        let source = category_source(spec);
        let filters = sql.page_filters(spec, source);
        let join = if spec.fields.category_join {
            let restrict = first_equal_group(&spec.category)
                .map(|group| format!(" AND c.cl_to IN ({})", sql.bind_list(&group.categories)))
                .unwrap_or_default();
            format!(" LEFT JOIN {source} c ON c.cl_from = p.title{restrict}")
        } else {
            String::new()
        };
        let category_columns = if spec.fields.category_join {
            "c.cl_to, c.cl_sortkey, c.cl_timestamp"
        } else {
            "NULL, NULL, NULL"
        };
        let categories_column = if spec.fields.categories {
            "(SELECT GROUP_CONCAT(cat.target_text, char(31)) FROM indexed_links cat WHERE cat.source_title = p.title AND cat.link_kind = 'category')"
        } else {
            "NULL"
        };
        let contribution_column = if spec.fields.contribution {
            "(SELECT r.user_name || char(31) || SUM(ABS(r.size_delta)) FROM indexed_revisions r WHERE r.page_title = p.title GROUP BY r.user_name ORDER BY SUM(ABS(r.size_delta)) DESC, r.user_name ASC LIMIT 1)"
        } else {
            "NULL"
        };

        let inner = format!(
            "SELECT p.title, p.namespace, p.namespace_id, p.page_text, p.touched, p.bytes, \
             (SELECT MIN(r.rev_timestamp) FROM indexed_revisions r WHERE r.page_title = p.title) AS first_edit, \
             (SELECT MAX(r.rev_timestamp) FROM indexed_revisions r WHERE r.page_title = p.title) AS last_edit, \
             {author} AS author, \
             {last_editor} AS last_editor, \
             {category_columns}, \
             {categories_column}, \
             {contribution_column} \
             FROM indexed_pages p{join}{where_clause}",
            author = revision_user("p.title", "ASC"),
            last_editor = revision_user("p.title", "DESC"),
            where_clause = where_clause(&filters),
        );
        let order_by = page_order_by(spec);
        let total = self.count_total(spec, &inner, &sql)?;
        let statement = format!("{inner}{order_by}{}", sql.limit_clause(spec));

        debug!(sql = %statement, binds = sql.binds.len(), "running page query");
        let mut prepared = self
            .connection
            .prepare(&statement)
            .with_context(|| format!("failed to prepare query: {statement}"))?;
        let mapped = prepared
            .query_map(params_from_iter(sql.binds.iter()), page_row)
            .context("failed to run page query")?;
        let mut rows = Vec::new();
        for row in mapped {
            rows.push(row.context("failed to read page row")?);
        }
        Ok(QueryResult {
            rows,
            total,
            statement: Some(statement),
        })
    }

    fn select_categories(&self, spec: &QuerySpecification) -> Result<QueryResult> {
        let mut sql = SqlBuilder::default();
        let filters = sql.page_filters(spec, category_source(spec));
        let inner = format!(
            "SELECT l.target_title, \
             EXISTS(SELECT 1 FROM indexed_pages x WHERE x.title = l.target_title) AS page_exists, \
             l.target_text \
             FROM indexed_links l \
             WHERE l.link_kind = 'category' AND l.source_title IN (SELECT p.title FROM indexed_pages p{}) \
             GROUP BY l.target_title",
            where_clause(&filters),
        );
        self.select_targets(spec, inner, "l.target_text", sql)
    }

    fn select_references(
        &self,
        spec: &QuerySpecification,
        missing_only: bool,
        image_containers: &[String],
    ) -> Result<QueryResult> {
        let mut sql = SqlBuilder::default();
        let kind = if image_containers.is_empty() {
            "page"
        } else {
            "file"
        };
        let mut filters = vec![format!("l.link_kind = '{kind}'")];
        if !image_containers.is_empty() {
            filters.push(format!(
                "l.source_title IN ({})",
                sql.bind_list(image_containers)
            ));
        }
        if !spec.links_from.is_empty() {
            filters.push(format!(
                "l.source_title IN ({})",
                sql.bind_list(&spec.links_from)
            ));
        }
        if !spec.not_links_from.is_empty() {
            filters.push(format!(
                "l.source_title NOT IN ({})",
                sql.bind_list(&spec.not_links_from)
            ));
        }
        if !spec.namespaces.is_empty() {
            filters.push(format!(
                "l.target_namespace IN ({})",
                sql.bind_ints(&spec.namespaces)
            ));
        }
        if !spec.not_namespaces.is_empty() {
            filters.push(format!(
                "l.target_namespace NOT IN ({})",
                sql.bind_ints(&spec.not_namespaces)
            ));
        }
        if !spec.titles.is_empty() {
            filters.push(format!("l.target_title IN ({})", sql.bind_list(&spec.titles)));
        }
        sql.title_filters(spec, "l.target_text", &mut filters);
        if missing_only {
            filters.push(
                "NOT EXISTS(SELECT 1 FROM indexed_pages x WHERE x.title = l.target_title)"
                    .to_string(),
            );
        }

        let inner = format!(
            "SELECT l.target_title, \
             EXISTS(SELECT 1 FROM indexed_pages x WHERE x.title = l.target_title) AS page_exists, \
             l.target_namespace, l.target_text \
             FROM indexed_links l{} \
             GROUP BY l.target_title",
            where_clause(&filters),
        );
        self.select_targets(spec, inner, "l.target_namespace, l.target_text", sql)
    }

    fn select_targets(
        &self,
        spec: &QuerySpecification,
        inner: String,
        order_columns: &str,
        mut sql: SqlBuilder,
    ) -> Result<QueryResult> {
        let direction = direction(spec.order);
        let order_by = if spec.sort_methods().next().is_some() {
            let columns = order_columns
                .split(", ")
                .map(|column| format!("{column} {direction}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!(" ORDER BY {columns}")
        } else {
            String::new()
        };
        let total = self.count_total(spec, &inner, &sql)?;
        let statement = format!("{inner}{order_by}{}", sql.limit_clause(spec));

        debug!(sql = %statement, binds = sql.binds.len(), "running target query");
        let mut prepared = self
            .connection
            .prepare(&statement)
            .with_context(|| format!("failed to prepare query: {statement}"))?;
        let mapped = prepared
            .query_map(params_from_iter(sql.binds.iter()), |row| {
                let target: String = row.get(0)?;
                let exists: i64 = row.get(1)?;
                Ok((target, exists == 1))
            })
            .context("failed to run target query")?;
        let mut rows = Vec::new();
        for row in mapped {
            let (target, exists) = row.context("failed to read target row")?;
            rows.push(ResultRow {
                page: self.title_from_prefixed(&target),
                exists,
                ..ResultRow::default()
            });
        }
        Ok(QueryResult {
            rows,
            total,
            statement: Some(statement),
        })
    }

    fn count_total(
        &self,
        spec: &QuerySpecification,
        inner: &str,
        sql: &SqlBuilder,
    ) -> Result<Option<usize>> {
        if !spec.count_total {
            return Ok(None);
        }
        let statement = format!("SELECT COUNT(*) FROM ({inner})");
        let count: i64 = self
            .connection
            .query_row(&statement, params_from_iter(sql.binds.iter()), |row| {
                row.get(0)
            })
            .with_context(|| format!("failed query: {statement}"))?;
        let count = usize::try_from(count).context("count does not fit into usize")?;
        Ok(Some(count))
    }
}

impl ContentStore for SqliteStore {
    fn view_exists(&self, name: &str) -> Result<bool> {
        view_exists(&self.connection, name)
    }

    fn select(&self, spec: &QuerySpecification) -> Result<QueryResult> {
        match &spec.goal {
            QueryGoal::Pages => self.select_pages(spec),
            QueryGoal::Categories => self.select_categories(spec),
            QueryGoal::OpenReferences {
                missing_only,
                image_containers,
            } => self.select_references(spec, *missing_only, image_containers),
        }
    }
}

fn register_regexp(connection: &Connection) -> Result<()> {
    connection
        .create_scalar_function(
            "regexp",
            2,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let pattern: Arc<Regex> = ctx.get_or_create_aux(0, |value| -> Result<_, BoxError> {
                    Ok(Regex::new(value.as_str()?)?)
                })?;
                let text = ctx
                    .get_raw(1)
                    .as_str_or_null()
                    .map_err(|error| rusqlite::Error::UserFunctionError(error.into()))?;
                Ok(text.is_some_and(|text| pattern.is_match(text)))
            },
        )
        .context("failed to register REGEXP function")
}

#[derive(Default)]
struct SqlBuilder {
    binds: Vec<Value>,
}

impl SqlBuilder {
    fn bind(&mut self, value: Value) -> String {
        self.binds.push(value);
        format!("?{}", self.binds.len())
    }

    fn bind_text(&mut self, value: &str) -> String {
        self.bind(Value::Text(value.to_string()))
    }

    fn bind_list<'a, I>(&mut self, values: I) -> String
    where
        I: IntoIterator<Item = &'a String>,
    {
        values
            .into_iter()
            .map(|value| self.bind_text(value))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn bind_ints(&mut self, values: &[i32]) -> String {
        values
            .iter()
            .map(|value| self.bind(Value::Integer(i64::from(*value))))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn limit_clause(&mut self, spec: &QuerySpecification) -> String {
        let limit = spec
            .limit
            .and_then(|limit| i64::try_from(limit).ok())
            .unwrap_or(-1);
        let offset = i64::try_from(spec.offset).unwrap_or(i64::MAX);
        if limit < 0 && offset == 0 {
            return String::new();
        }
        let limit = self.bind(Value::Integer(limit));
        let offset = self.bind(Value::Integer(offset));
        format!(" LIMIT {limit} OFFSET {offset}")
    }

    fn page_filters(&mut self, spec: &QuerySpecification, source: &str) -> Vec<String> {
        let mut filters = Vec::new();
        for group in &spec.category.groups {
            filters.push(self.category_group(group, source));
        }
        for group in &spec.not_category.groups {
            filters.push(format!("NOT ({})", self.category_group(group, source)));
        }
        if !spec.namespaces.is_empty() {
            filters.push(format!(
                "p.namespace_id IN ({})",
                self.bind_ints(&spec.namespaces)
            ));
        }
        if !spec.not_namespaces.is_empty() {
            filters.push(format!(
                "p.namespace_id NOT IN ({})",
                self.bind_ints(&spec.not_namespaces)
            ));
        }
        if !spec.uses.is_empty() {
            filters.push(format!(
                "EXISTS({})",
                self.outgoing_links("template", &spec.uses)
            ));
        }
        if !spec.not_uses.is_empty() {
            filters.push(format!(
                "NOT EXISTS({})",
                self.outgoing_links("template", &spec.not_uses)
            ));
        }
        for group in &spec.links_to {
            filters.push(format!("EXISTS({})", self.outgoing_links("page", group)));
        }
        if !spec.not_links_to.is_empty() {
            filters.push(format!(
                "NOT EXISTS({})",
                self.outgoing_links("page", &spec.not_links_to)
            ));
        }
        if !spec.links_from.is_empty() {
            filters.push(format!(
                "EXISTS({})",
                self.incoming_links(&spec.links_from)
            ));
        }
        if !spec.not_links_from.is_empty() {
            filters.push(format!(
                "NOT EXISTS({})",
                self.incoming_links(&spec.not_links_from)
            ));
        }
        if !spec.titles.is_empty() {
            filters.push(format!("p.title IN ({})", self.bind_list(&spec.titles)));
        }
        self.title_filters(spec, "p.page_text", &mut filters);
        match spec.redirects {
            Redirects::Exclude => filters.push("p.is_redirect = 0".to_string()),
            Redirects::Only => filters.push("p.is_redirect = 1".to_string()),
            Redirects::Include => {}
        }
        if let Some(user) = &spec.created_by {
            filters.push(format!(
                "{} = {}",
                revision_user("p.title", "ASC"),
                self.bind_text(user)
            ));
        }
        if let Some(user) = &spec.last_modified_by {
            filters.push(format!(
                "{} = {}",
                revision_user("p.title", "DESC"),
                self.bind_text(user)
            ));
        }
        if let Some(user) = &spec.modified_by {
            filters.push(format!(
                "EXISTS(SELECT 1 FROM indexed_revisions r WHERE r.page_title = p.title AND r.user_name = {})",
                self.bind_text(user)
            ));
        }
        let revisions = &spec.revisions;
        if let Some(timestamp) = &revisions.all_before {
            filters.push(format!(
                "EXISTS(SELECT 1 FROM indexed_revisions r WHERE r.page_title = p.title AND r.rev_timestamp < {})",
                self.bind_text(timestamp)
            ));
        }
        if let Some(timestamp) = &revisions.all_since {
            filters.push(format!(
                "EXISTS(SELECT 1 FROM indexed_revisions r WHERE r.page_title = p.title AND r.rev_timestamp >= {})",
                self.bind_text(timestamp)
            ));
        }
        if let Some(timestamp) = &revisions.first_since {
            filters.push(format!(
                "(SELECT MIN(r.rev_timestamp) FROM indexed_revisions r WHERE r.page_title = p.title) >= {}",
                self.bind_text(timestamp)
            ));
        }
        if let Some(timestamp) = &revisions.last_before {
            filters.push(format!(
                "(SELECT MAX(r.rev_timestamp) FROM indexed_revisions r WHERE r.page_title = p.title) < {}",
                self.bind_text(timestamp)
            ));
        }
        if spec.minor_edits == Some(MinorEdits::Exclude) {
            filters.push(
                "IFNULL((SELECT r.minor FROM indexed_revisions r WHERE r.page_title = p.title ORDER BY r.rev_timestamp DESC, r.rev_id DESC LIMIT 1), 0) = 0"
                    .to_string(),
            );
        }
        filters
    }

    fn title_filters(&mut self, spec: &QuerySpecification, column: &str, filters: &mut Vec<String>) {
        if !spec.title_match.is_empty() {
            filters.push(self.like_any(column, &spec.title_match));
        }
        if !spec.not_title_match.is_empty() {
            filters.push(format!("NOT {}", self.like_any(column, &spec.not_title_match)));
        }
        if let Some(bound) = &spec.title_lt {
            filters.push(format!("{column} < {}", self.bind_text(bound)));
        }
        if let Some(bound) = &spec.title_gt {
            filters.push(format!("{column} > {}", self.bind_text(bound)));
        }
    }

    fn like_any(&mut self, column: &str, patterns: &[String]) -> String {
        let alternatives = patterns
            .iter()
            .map(|pattern| format!("{column} LIKE {}", self.bind_text(pattern)))
            .collect::<Vec<_>>()
            .join(" OR ");
        format!("({alternatives})")
    }

    fn category_group(&mut self, group: &CategoryGroup, source: &str) -> String {
        match group.operator {
            Operator::Or => {
                let condition = match group.comparison {
                    Comparison::Equal => {
                        format!("c.cl_to IN ({})", self.bind_list(&group.categories))
                    }
                    comparison => group
                        .categories
                        .iter()
                        .map(|name| self.category_condition(comparison, name))
                        .collect::<Vec<_>>()
                        .join(" OR "),
                };
                category_exists(source, &condition)
            }
            Operator::And => {
                let clauses = group
                    .categories
                    .iter()
                    .map(|name| {
                        let condition = self.category_condition(group.comparison, name);
                        category_exists(source, &condition)
                    })
                    .collect::<Vec<_>>();
                clauses.join(" AND ")
            }
        }
    }

    fn category_condition(&mut self, comparison: Comparison, name: &str) -> String {
        let bound = self.bind_text(name);
        match comparison {
            Comparison::Equal => format!("c.cl_to = {bound}"),
            Comparison::Like => format!("c.cl_to LIKE {bound}"),
            Comparison::Regexp => format!("c.cl_to REGEXP {bound}"),
        }
    }

    fn outgoing_links(&mut self, kind: &str, targets: &[String]) -> String {
        format!(
            "SELECT 1 FROM indexed_links o WHERE o.source_title = p.title AND o.link_kind = '{kind}' AND o.target_title IN ({})",
            self.bind_list(targets)
        )
    }

    fn incoming_links(&mut self, sources: &[String]) -> String {
        format!(
            "SELECT 1 FROM indexed_links i WHERE i.target_title = p.title AND i.link_kind = 'page' AND i.source_title IN ({})",
            self.bind_list(sources)
        )
    }
}

fn category_exists(source: &str, condition: &str) -> String {
    format!("EXISTS(SELECT 1 FROM {source} c WHERE c.cl_from = p.title AND ({condition}))")
}

fn category_source(spec: &QuerySpecification) -> &'static str {
    if spec.uncategorized_view {
        UNCATEGORIZED_VIEW_NAME
    } else {
        CATEGORY_SOURCE
    }
}

fn first_equal_group(filter: &CategoryFilter) -> Option<&CategoryGroup> {
    filter
        .groups
        .iter()
        .find(|group| group.comparison == Comparison::Equal)
}

fn revision_user(page_column: &str, direction: &str) -> String {
    format!(
        "(SELECT r.user_name FROM indexed_revisions r WHERE r.page_title = {page_column} ORDER BY r.rev_timestamp {direction}, r.rev_id {direction} LIMIT 1)"
    )
}

fn where_clause(filters: &[String]) -> String {
    if filters.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", filters.join(" AND "))
    }
}

fn direction(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Ascending => "ASC",
        SortOrder::Descending => "DESC",
    }
}

fn page_order_by(spec: &QuerySpecification) -> String {
    let direction = direction(spec.order);
    let mut keys = Vec::new();
    for method in spec.sort_methods() {
        let columns: &[&str] = match method {
            OrderMethod::Title => &["p.namespace_id", "p.page_text"],
            OrderMethod::TitleWithoutNamespace => &["p.page_text"],
            OrderMethod::Category => &["c.cl_to"],
            OrderMethod::Sortkey => &["IFNULL(NULLIF(c.cl_sortkey, ''), p.page_text)"],
            OrderMethod::CategoryAdd => &["c.cl_timestamp"],
            OrderMethod::PageTouched => &["p.touched"],
            OrderMethod::FirstEdit => &["first_edit"],
            OrderMethod::LastEdit => &["last_edit"],
            OrderMethod::User => &["last_editor"],
            OrderMethod::Size => &["p.bytes"],
            OrderMethod::None => &[],
        };
        keys.extend(columns.iter().map(|column| format!("{column} {direction}")));
    }
    if keys.is_empty() {
        return String::new();
    }
    keys.push(format!("p.title {direction}"));
    format!(" ORDER BY {}", keys.join(", "))
}

fn page_row(row: &Row<'_>) -> rusqlite::Result<ResultRow> {
    let namespace: String = row.get(1)?;
    let namespace_id: i32 = row.get(2)?;
    let text: String = row.get(3)?;
    let bytes: i64 = row.get(5)?;
    let categories = row
        .get::<_, Option<String>>(13)?
        .map(|joined| {
            let mut names = joined
                .split(FIELD_SEPARATOR)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>();
            names.sort();
            names.dedup();
            names
        })
        .unwrap_or_default();
    let contribution = row
        .get::<_, Option<String>>(14)?
        .and_then(|value| {
            let (user, bytes) = value.split_once(FIELD_SEPARATOR)?;
            Some(Contribution {
                user: user.to_string(),
                bytes: bytes.parse().ok()?,
            })
        });

    Ok(ResultRow {
        page: PageTitle {
            namespace,
            namespace_id,
            text,
        },
        exists: true,
        touched: row.get(4)?,
        size: u64::try_from(bytes).ok(),
        first_edit: row.get(6)?,
        last_edit: row.get(7)?,
        author: row.get(8)?,
        last_editor: row.get(9)?,
        category: row.get(10)?,
        sortkey: row.get(11)?,
        category_added: row.get(12)?,
        categories,
        contribution,
    })
}
