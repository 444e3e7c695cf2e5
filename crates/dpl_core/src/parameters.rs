use std::collections::BTreeSet;

use serde::Serialize;

/// Category name standing for "page has no category" in filters.
pub const UNCATEGORIZED: &str = "";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Equal,
    Like,
    Regexp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// Any one category of the group matches.
    Or,
    /// Every category of the group matches.
    And,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryGroup {
    pub comparison: Comparison,
    pub operator: Operator,
    pub categories: BTreeSet<String>,
}

impl CategoryGroup {
    pub fn includes_uncategorized(&self) -> bool {
        self.comparison == Comparison::Equal && self.categories.contains(UNCATEGORIZED)
    }
}

/// Conjunction of category groups: a page must satisfy every group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryFilter {
    pub groups: Vec<CategoryGroup>,
}

impl CategoryFilter {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn count(&self) -> usize {
        self.groups.iter().map(|group| group.categories.len()).sum()
    }

    pub fn includes_uncategorized(&self) -> bool {
        self.groups.iter().any(CategoryGroup::includes_uncategorized)
    }

    pub fn push(&mut self, group: CategoryGroup) {
        self.groups.push(group);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Goal {
    Pages,
    Categories,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenReferences {
    No,
    Yes,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Redirects {
    Exclude,
    Include,
    Only,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MinorEdits {
    Include,
    Exclude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderMethod {
    Title,
    TitleWithoutNamespace,
    Category,
    Sortkey,
    CategoryAdd,
    PageTouched,
    FirstEdit,
    LastEdit,
    User,
    Size,
    None,
}

impl OrderMethod {
    pub fn parse(value: &str) -> Option<Self> {
        let method = match value.trim().to_ascii_lowercase().as_str() {
            "title" => Self::Title,
            "titlewithoutnamespace" => Self::TitleWithoutNamespace,
            "category" => Self::Category,
            "sortkey" => Self::Sortkey,
            "categoryadd" => Self::CategoryAdd,
            "pagetouched" => Self::PageTouched,
            "firstedit" => Self::FirstEdit,
            "lastedit" => Self::LastEdit,
            "user" => Self::User,
            "size" => Self::Size,
            "none" => Self::None,
            _ => return None,
        };
        Some(method)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::TitleWithoutNamespace => "titlewithoutnamespace",
            Self::Category => "category",
            Self::Sortkey => "sortkey",
            Self::CategoryAdd => "categoryadd",
            Self::PageTouched => "pagetouched",
            Self::FirstEdit => "firstedit",
            Self::LastEdit => "lastedit",
            Self::User => "user",
            Self::Size => "size",
            Self::None => "none",
        }
    }

    /// Methods that need the category join of the query.
    pub fn uses_category_join(self) -> bool {
        matches!(self, Self::Category | Self::Sortkey | Self::CategoryAdd)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListMode {
    Unordered,
    Ordered,
    None,
    Inline,
    Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadingMode {
    None,
    Unordered,
    Ordered,
    Definition,
    H2,
    H3,
    H4,
}

impl HeadingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Unordered => "unordered",
            Self::Ordered => "ordered",
            Self::Definition => "definition",
            Self::H2 => "H2",
            Self::H3 => "H3",
            Self::H4 => "H4",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Enrichment {
    pub page_touched_date: bool,
    pub first_category_date: bool,
    pub edit_date: bool,
    pub user: bool,
    pub author: bool,
    pub last_editor: bool,
    pub contribution: bool,
    pub categories: bool,
    pub page_size: bool,
}

impl Enrichment {
    pub fn date_kinds(&self) -> usize {
        [
            self.page_touched_date,
            self.first_category_date,
            self.edit_date,
        ]
        .into_iter()
        .filter(|flag| *flag)
        .count()
    }

    pub fn any(&self) -> bool {
        self.page_touched_date
            || self.first_category_date
            || self.edit_date
            || self.user
            || self.author
            || self.last_editor
            || self.contribution
            || self.categories
            || self.page_size
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetTargets {
    pub links: bool,
    pub templates: bool,
    pub categories: bool,
    pub images: bool,
}

impl ResetTargets {
    pub fn any(&self) -> bool {
        self.links || self.templates || self.categories || self.images
    }

    pub fn merge(&mut self, other: ResetTargets) {
        self.links |= other.links;
        self.templates |= other.templates;
        self.categories |= other.categories;
        self.images |= other.images;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RevisionRanges {
    pub all_before: Option<String>,
    pub all_since: Option<String>,
    pub first_since: Option<String>,
    pub last_before: Option<String>,
}

impl RevisionRanges {
    pub fn any(&self) -> bool {
        self.all_before.is_some()
            || self.all_since.is_some()
            || self.first_since.is_some()
            || self.last_before.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeaderTemplates {
    pub results_header: Option<String>,
    pub results_footer: Option<String>,
    pub one_result_header: Option<String>,
    pub one_result_footer: Option<String>,
    pub no_results_header: Option<String>,
    pub no_results_footer: Option<String>,
}

impl HeaderTemplates {
    /// Raw text of the templates consulted when deciding whether a total count is needed.
    pub fn total_probe(&self) -> String {
        [
            self.results_header.as_deref(),
            self.no_results_header.as_deref(),
            self.results_footer.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Typed, validated values of one directive invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterSet {
    pub category: CategoryFilter,
    pub not_category: CategoryFilter,
    pub namespaces: Vec<i32>,
    pub not_namespaces: Vec<i32>,
    pub uses: Vec<String>,
    pub not_uses: Vec<String>,
    pub links_to: Vec<Vec<String>>,
    pub not_links_to: Vec<String>,
    pub links_from: Vec<String>,
    pub not_links_from: Vec<String>,
    pub titles: Vec<String>,
    pub title_match: Vec<String>,
    pub not_title_match: Vec<String>,
    pub title_lt: Option<String>,
    pub title_gt: Option<String>,
    pub redirects: Redirects,
    pub created_by: Option<String>,
    pub modified_by: Option<String>,
    pub last_modified_by: Option<String>,
    pub open_references: OpenReferences,
    pub image_container: Vec<String>,
    pub revisions: RevisionRanges,
    pub minor_edits: Option<MinorEdits>,

    pub order_methods: Vec<OrderMethod>,
    pub order: SortOrder,
    pub order_suit_symbols: bool,
    pub count: Option<usize>,
    pub offset: usize,
    pub random_count: Option<usize>,
    pub goal: Goal,

    pub mode: ListMode,
    pub heading_mode: HeadingMode,
    pub heading_count: bool,
    pub inline_text: String,
    pub escape_links: bool,
    pub show_namespace: bool,
    pub title_max_length: Option<usize>,
    pub section_labels: Vec<String>,
    pub dominant_section: Option<usize>,
    pub templates: HeaderTemplates,

    pub enrichment: Enrichment,

    pub exec_and_exit: Option<String>,
    pub debug: Option<u8>,
    pub allow_cached_results: bool,
    pub cache_period: Option<u64>,
    pub skip_this_page: bool,
    pub include_subpages: bool,
    pub reset: ResetTargets,
    pub eliminate: ResetTargets,

    pub selection_found: bool,
    pub open_ref_conflict: bool,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            category: CategoryFilter::default(),
            not_category: CategoryFilter::default(),
            namespaces: Vec::new(),
            not_namespaces: Vec::new(),
            uses: Vec::new(),
            not_uses: Vec::new(),
            links_to: Vec::new(),
            not_links_to: Vec::new(),
            links_from: Vec::new(),
            not_links_from: Vec::new(),
            titles: Vec::new(),
            title_match: Vec::new(),
            not_title_match: Vec::new(),
            title_lt: None,
            title_gt: None,
            redirects: Redirects::Exclude,
            created_by: None,
            modified_by: None,
            last_modified_by: None,
            open_references: OpenReferences::No,
            image_container: Vec::new(),
            revisions: RevisionRanges::default(),
            minor_edits: None,
            order_methods: vec![OrderMethod::Title],
            order: SortOrder::Ascending,
            order_suit_symbols: false,
            count: None,
            offset: 0,
            random_count: None,
            goal: Goal::Pages,
            mode: ListMode::Unordered,
            heading_mode: HeadingMode::None,
            heading_count: false,
            inline_text: "&#160;-&#160;".to_string(),
            escape_links: true,
            show_namespace: true,
            title_max_length: None,
            section_labels: Vec::new(),
            dominant_section: None,
            templates: HeaderTemplates::default(),
            enrichment: Enrichment::default(),
            exec_and_exit: None,
            debug: None,
            allow_cached_results: false,
            cache_period: None,
            skip_this_page: true,
            include_subpages: true,
            reset: ResetTargets::default(),
            eliminate: ResetTargets::default(),
            selection_found: false,
            open_ref_conflict: false,
        }
    }
}

impl ParameterSet {
    /// Categories named by `category` and `notcategory` together.
    pub fn total_categories(&self) -> usize {
        self.category.count() + self.not_category.count()
    }

    pub fn includes_uncategorized(&self) -> bool {
        self.category.includes_uncategorized() || self.not_category.includes_uncategorized()
    }

    pub fn has_order_method(&self, candidates: &[OrderMethod]) -> bool {
        self.order_methods
            .iter()
            .any(|method| candidates.contains(method))
    }

    pub fn open_references_enabled(&self) -> bool {
        self.open_references != OpenReferences::No
    }

    pub fn reverses_results(&self) -> bool {
        self.title_lt.is_some() && self.title_gt.is_none() && self.order == SortOrder::Descending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(comparison: Comparison, operator: Operator, names: &[&str]) -> CategoryGroup {
        CategoryGroup {
            comparison,
            operator,
            categories: names.iter().map(|name| name.to_string()).collect(),
        }
    }

    #[test]
    fn category_totals_cover_both_filters() {
        let mut params = ParameterSet::default();
        params
            .category
            .push(group(Comparison::Equal, Operator::Or, &["A", "B"]));
        params
            .not_category
            .push(group(Comparison::Like, Operator::Or, &["C%"]));
        assert_eq!(params.total_categories(), 3);
        assert!(!params.includes_uncategorized());

        params
            .category
            .push(group(Comparison::Equal, Operator::Or, &[UNCATEGORIZED]));
        assert!(params.includes_uncategorized());
    }

    #[test]
    fn reversal_needs_only_upper_bound_and_descending() {
        let mut params = ParameterSet::default();
        params.title_lt = Some("M".to_string());
        assert!(!params.reverses_results());
        params.order = SortOrder::Descending;
        assert!(params.reverses_results());
        params.title_gt = Some("C".to_string());
        assert!(!params.reverses_results());
    }

    #[test]
    fn total_probe_reads_results_and_no_results_headers() {
        let templates = HeaderTemplates {
            results_header: Some("a".to_string()),
            no_results_header: Some("%TOTALPAGES%".to_string()),
            one_result_footer: Some("ignored".to_string()),
            ..HeaderTemplates::default()
        };
        assert_eq!(templates.total_probe(), "a%TOTALPAGES%");
    }
}
