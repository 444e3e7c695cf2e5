use tracing::debug;

use crate::config::DplSection;
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticLog};
use crate::index::{UNCATEGORIZED_VIEW_NAME, UNCATEGORIZED_VIEW_SQL};
use crate::parameters::{HeadingMode, ListMode, OrderMethod, ParameterSet};

pub struct ValidationContext<'a> {
    pub limits: &'a DplSection,
    /// Whether the uncategorized view exists in the store. Only consulted when a filter needs it.
    pub uncategorized_view_available: bool,
}

const EDIT_ORDER: &[OrderMethod] = &[OrderMethod::FirstEdit, OrderMethod::LastEdit];

/// Run the consistency rules in order. The first fatal rule aborts; warnings go to `log`.
/// A heading mode without a secondary order key is downgraded to `none` in place.
pub fn validate(
    params: &mut ParameterSet,
    context: &ValidationContext<'_>,
    log: &mut DiagnosticLog,
) -> Result<(), Diagnostic> {
    let result = run_rules(params, context, log);
    if let Err(diagnostic) = &result {
        debug!(code = diagnostic.code.name(), "directive failed validation");
    }
    result
}

fn run_rules(
    params: &mut ParameterSet,
    context: &ValidationContext<'_>,
    log: &mut DiagnosticLog,
) -> Result<(), Diagnostic> {
    let limits = context.limits;
    let total_categories = params.total_categories();

    if total_categories > limits.max_category_count && !limits.allow_unlimited_categories {
        return Err(Diagnostic::with_args(
            DiagnosticCode::TooManyCategories,
            [limits.max_category_count.to_string()],
        ));
    }
    if total_categories < limits.min_category_count {
        return Err(Diagnostic::with_args(
            DiagnosticCode::TooFewCategories,
            [limits.min_category_count.to_string()],
        ));
    }
    if total_categories == 0 && !params.selection_found {
        return Err(Diagnostic::new(DiagnosticCode::NoSelectionCriteria));
    }

    if total_categories == 0
        && (params.has_order_method(&[OrderMethod::CategoryAdd])
            || params.enrichment.first_category_date)
    {
        return Err(Diagnostic::new(
            DiagnosticCode::CategoryDateWithoutCategories,
        ));
    }

    if params.enrichment.date_kinds() > 1 {
        return Err(Diagnostic::new(DiagnosticCode::ConflictingDateParameters));
    }

    if let Some(dominant) = params.dominant_section
        && params.section_labels.len() < dominant
    {
        return Err(Diagnostic::with_args(
            DiagnosticCode::DominantSectionRange,
            [params.section_labels.len().to_string()],
        ));
    }

    if params.mode == ListMode::Category
        && !params.has_order_method(&[
            OrderMethod::Sortkey,
            OrderMethod::Title,
            OrderMethod::TitleWithoutNamespace,
        ])
    {
        return Err(incompatible_order(
            "mode=category",
            "sortkey | title | titlewithoutnamespace",
        ));
    }

    if params.enrichment.page_touched_date
        && !params.has_order_method(&[OrderMethod::PageTouched, OrderMethod::Title])
    {
        return Err(incompatible_order(
            "addpagetoucheddate=true",
            "pagetouched | title",
        ));
    }

    let revision_range = params.revisions.any();
    if params.enrichment.edit_date && !params.has_order_method(EDIT_ORDER) && revision_range {
        return Err(incompatible_order("addeditdate=true", "firstedit | lastedit"));
    }

    // A revision range exempts adduser but not minoredits.
    if params.enrichment.user && !params.has_order_method(EDIT_ORDER) && !revision_range {
        return Err(incompatible_order("adduser=true", "firstedit | lastedit"));
    }
    if params.minor_edits.is_some() && !params.has_order_method(EDIT_ORDER) {
        return Err(incompatible_order("minoredits", "firstedit | lastedit"));
    }

    if params.includes_uncategorized() && !context.uncategorized_view_available {
        return Err(Diagnostic::with_args(
            DiagnosticCode::MissingRequiredView,
            [UNCATEGORIZED_VIEW_NAME, UNCATEGORIZED_VIEW_SQL],
        ));
    }

    let enrichment = &params.enrichment;
    if params.mode == ListMode::Category
        && (enrichment.categories
            || enrichment.edit_date
            || enrichment.first_category_date
            || enrichment.page_touched_date
            || !params.section_labels.is_empty()
            || enrichment.user
            || enrichment.author
            || enrichment.contribution
            || enrichment.last_editor)
    {
        log.add(Diagnostic::new(
            DiagnosticCode::CategoryOutputIgnoresEnrichment,
        ));
    }

    if params.heading_mode != HeadingMode::None && params.order_methods.len() < 2 {
        log.add(Diagnostic::with_args(
            DiagnosticCode::HeadingModeDowngraded,
            [params.heading_mode.as_str(), HeadingMode::None.as_str()],
        ));
        params.heading_mode = HeadingMode::None;
    }

    if params.open_ref_conflict && params.open_references_enabled() {
        return Err(Diagnostic::new(DiagnosticCode::OpenReferencesConflict));
    }

    Ok(())
}

fn incompatible_order(parameter: &str, allowed: &str) -> Diagnostic {
    Diagnostic::with_args(DiagnosticCode::IncompatibleOrderMethod, [parameter, allowed])
}
