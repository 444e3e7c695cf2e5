use serde::Serialize;

use crate::config::CustomNamespace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Main,
    User,
    File,
    MediaWiki,
    Template,
    Category,
    Module,
}

impl Namespace {
    pub const ALL: [Namespace; 7] = [
        Self::Main,
        Self::User,
        Self::File,
        Self::MediaWiki,
        Self::Template,
        Self::Category,
        Self::Module,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "Main",
            Self::User => "User",
            Self::File => "File",
            Self::MediaWiki => "MediaWiki",
            Self::Template => "Template",
            Self::Category => "Category",
            Self::Module => "Module",
        }
    }

    pub fn id(self) -> i32 {
        match self {
            Self::Main => 0,
            Self::User => 2,
            Self::File => 6,
            Self::MediaWiki => 8,
            Self::Template => 10,
            Self::Category => 14,
            Self::Module => 828,
        }
    }

    /// Title prefix including the colon; empty for the main namespace.
    pub fn prefix(self) -> String {
        match self {
            Self::Main => String::new(),
            other => format!("{}:", other.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceEntry {
    pub name: String,
    pub id: i32,
    pub folder: String,
}

impl NamespaceEntry {
    pub fn is_main(&self) -> bool {
        self.id == Namespace::Main.id()
    }
}

#[derive(Debug, Clone)]
pub struct NamespaceTable {
    entries: Vec<NamespaceEntry>,
}

impl Default for NamespaceTable {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl NamespaceTable {
    pub fn new(custom: &[CustomNamespace]) -> Self {
        let mut entries = Namespace::ALL
            .iter()
            .map(|namespace| NamespaceEntry {
                name: namespace.as_str().to_string(),
                id: namespace.id(),
                folder: namespace.as_str().to_string(),
            })
            .collect::<Vec<_>>();
        for namespace in custom {
            let name = normalize_spaces(&namespace.name.replace('_', " "));
            if name.is_empty() || entries.iter().any(|entry| entry.name.eq_ignore_ascii_case(&name)) {
                continue;
            }
            entries.push(NamespaceEntry {
                folder: namespace.folder().to_string(),
                name,
                id: namespace.id,
            });
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[NamespaceEntry] {
        &self.entries
    }

    pub fn main(&self) -> &NamespaceEntry {
        &self.entries[0]
    }

    /// Resolve a namespace name as written in a directive. Empty, `Main` and `(Main)` mean the main namespace.
    pub fn resolve(&self, name: &str) -> Option<&NamespaceEntry> {
        let normalized = normalize_spaces(&name.replace('_', " "));
        if normalized.is_empty() || normalized.eq_ignore_ascii_case("(Main)") {
            return Some(self.main());
        }
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(&normalized))
    }

    pub fn by_folder(&self, folder: &str) -> Option<&NamespaceEntry> {
        self.entries
            .iter()
            .find(|entry| entry.folder.eq_ignore_ascii_case(folder))
    }

    pub fn id_of(&self, name: &str) -> i32 {
        self.resolve(name).map_or(Namespace::Main.id(), |entry| entry.id)
    }

    /// Split a title into its namespace and bare text. Unknown prefixes stay part of the text.
    pub fn parse_title(&self, value: &str) -> Option<PageTitle> {
        let normalized = normalize_title(value);
        let normalized = normalized.trim_start_matches(':').trim();
        if normalized.is_empty() {
            return None;
        }
        if let Some((prefix, rest)) = normalized.split_once(':')
            && !prefix.trim().is_empty()
            && let Some(entry) = self.resolve(prefix)
            && !entry.is_main()
        {
            let text = normalize_spaces(rest);
            if text.is_empty() {
                return None;
            }
            return Some(PageTitle::new(entry, text));
        }
        Some(PageTitle::new(self.main(), normalized.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct PageTitle {
    pub namespace: String,
    pub namespace_id: i32,
    pub text: String,
}

impl PageTitle {
    pub fn new(entry: &NamespaceEntry, text: String) -> Self {
        Self {
            namespace: entry.name.clone(),
            namespace_id: entry.id,
            text,
        }
    }

    pub fn prefixed(&self) -> String {
        if self.namespace_id == Namespace::Main.id() {
            self.text.clone()
        } else {
            format!("{}:{}", self.namespace, self.text)
        }
    }

    /// Title text in URL form (spaces as underscores).
    pub fn db_key(&self) -> String {
        self.text.replace(' ', "_")
    }

    pub fn is_subpage(&self) -> bool {
        self.text.contains('/')
    }
}

pub fn normalize_title(value: &str) -> String {
    normalize_spaces(&value.replace('_', " "))
}

pub fn normalize_spaces(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut previous_was_space = false;

    for ch in value.chars() {
        if ch.is_whitespace() {
            if !previous_was_space {
                output.push(' ');
                previous_was_space = true;
            }
        } else {
            output.push(ch);
            previous_was_space = false;
        }
    }

    output.trim().to_string()
}
