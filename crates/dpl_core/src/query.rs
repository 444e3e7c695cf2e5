use anyhow::Result;
use serde::Serialize;

use crate::config::DplSection;
use crate::namespace::PageTitle;
use crate::parameters::{
    CategoryFilter, Goal, MinorEdits, OpenReferences, OrderMethod, ParameterSet, Redirects,
    RevisionRanges, SortOrder,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryGoal {
    Pages,
    /// Distinct categories of the selected pages.
    Categories,
    /// Link targets instead of existing pages; file targets when image containers are given.
    OpenReferences {
        missing_only: bool,
        image_containers: Vec<String>,
    },
}

/// Optional per-row columns the store computes on request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowFields {
    pub category_join: bool,
    pub categories: bool,
    pub contribution: bool,
}

/// Store-agnostic description of one fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuerySpecification {
    pub goal: QueryGoal,
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
    pub revisions: RevisionRanges,
    pub minor_edits: Option<MinorEdits>,
    pub order_methods: Vec<OrderMethod>,
    pub order: SortOrder,
    pub fields: RowFields,
    pub uncategorized_view: bool,
    pub limit: Option<usize>,
    pub offset: usize,
    pub count_total: bool,
}

impl QuerySpecification {
    /// Order methods that contribute a sort key.
    pub fn sort_methods(&self) -> impl Iterator<Item = OrderMethod> + '_ {
        self.order_methods
            .iter()
            .copied()
            .filter(|method| *method != OrderMethod::None)
    }
}

/// One returned record. Optional fields are filled depending on the goal and requested fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    pub page: PageTitle,
    pub exists: bool,
    /// Category of the joined membership row, when the query joins categories.
    pub category: Option<String>,
    pub sortkey: Option<String>,
    pub category_added: Option<String>,
    pub touched: Option<String>,
    pub first_edit: Option<String>,
    pub last_edit: Option<String>,
    pub author: Option<String>,
    pub last_editor: Option<String>,
    pub contribution: Option<Contribution>,
    pub categories: Vec<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contribution {
    pub user: String,
    pub bytes: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub rows: Vec<ResultRow>,
    /// Total matching rows ignoring limit and offset; present only when requested.
    pub total: Option<usize>,
    /// Query text as executed, for debug output.
    pub statement: Option<String>,
}

pub trait ContentStore {
    fn view_exists(&self, name: &str) -> Result<bool>;
    fn select(&self, spec: &QuerySpecification) -> Result<QueryResult>;
}

pub fn build(params: &ParameterSet, limits: &DplSection, count_total: bool) -> QuerySpecification {
    let goal = match (params.open_references, params.goal) {
        (OpenReferences::No, Goal::Pages) => QueryGoal::Pages,
        (OpenReferences::No, Goal::Categories) => QueryGoal::Categories,
        (references, _) => QueryGoal::OpenReferences {
            missing_only: references == OpenReferences::Missing,
            image_containers: params.image_container.clone(),
        },
    };
    let limit = match params.count {
        Some(count) => Some(count),
        None if limits.allow_unlimited_results => None,
        None => Some(limits.max_result_count),
    };
    let fields = RowFields {
        category_join: params
            .order_methods
            .iter()
            .any(|method| method.uses_category_join())
            || params.enrichment.first_category_date,
        categories: params.enrichment.categories,
        contribution: params.enrichment.contribution,
    };

    QuerySpecification {
        goal,
        category: params.category.clone(),
        not_category: params.not_category.clone(),
        namespaces: params.namespaces.clone(),
        not_namespaces: params.not_namespaces.clone(),
        uses: params.uses.clone(),
        not_uses: params.not_uses.clone(),
        links_to: params.links_to.clone(),
        not_links_to: params.not_links_to.clone(),
        links_from: params.links_from.clone(),
        not_links_from: params.not_links_from.clone(),
        titles: params.titles.clone(),
        title_match: params.title_match.clone(),
        not_title_match: params.not_title_match.clone(),
        title_lt: params.title_lt.clone(),
        title_gt: params.title_gt.clone(),
        redirects: params.redirects,
        created_by: params.created_by.clone(),
        modified_by: params.modified_by.clone(),
        last_modified_by: params.last_modified_by.clone(),
        revisions: params.revisions.clone(),
        minor_edits: params.minor_edits,
        order_methods: params.order_methods.clone(),
        order: params.order,
        fields,
        uncategorized_view: params.includes_uncategorized(),
        limit,
        offset: params.offset,
        count_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DplConfig;
    use crate::parameters::Enrichment;

    #[test]
    fn build_caps_limit_unless_results_are_unlimited() {
        let mut limits = DplConfig::default().dpl;
        limits.max_result_count = 50;
        let params = ParameterSet::default();
        assert_eq!(build(&params, &limits, false).limit, Some(50));

        limits.allow_unlimited_results = true;
        assert_eq!(build(&params, &limits, false).limit, None);

        let params = ParameterSet {
            count: Some(7),
            offset: 3,
            ..ParameterSet::default()
        };
        let spec = build(&params, &limits, true);
        assert_eq!(spec.limit, Some(7));
        assert_eq!(spec.offset, 3);
        assert!(spec.count_total);
    }

    #[test]
    fn build_maps_goal_and_requested_fields() {
        let limits = DplConfig::default().dpl;
        let params = ParameterSet {
            open_references: OpenReferences::Missing,
            image_container: vec!["Gallery".to_string()],
            order_methods: vec![OrderMethod::Sortkey],
            enrichment: Enrichment {
                categories: true,
                ..Enrichment::default()
            },
            ..ParameterSet::default()
        };
        let spec = build(&params, &limits, false);
        assert_eq!(
            spec.goal,
            QueryGoal::OpenReferences {
                missing_only: true,
                image_containers: vec!["Gallery".to_string()],
            }
        );
        assert!(spec.fields.category_join);
        assert!(spec.fields.categories);
        assert!(!spec.fields.contribution);

        let params = ParameterSet {
            goal: Goal::Categories,
            order_methods: vec![OrderMethod::None],
            ..ParameterSet::default()
        };
        let spec = build(&params, &limits, false);
        assert_eq!(spec.goal, QueryGoal::Categories);
        assert_eq!(spec.sort_methods().count(), 0);
    }
}
