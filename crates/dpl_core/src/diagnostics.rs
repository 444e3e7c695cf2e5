use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Fatal,
    Warning,
    Debug,
}

impl Severity {
    /// Lowest directive `debug` level at which entries of this severity are shown.
    pub fn min_level(self) -> u8 {
        match self {
            Self::Fatal => 1,
            Self::Warning => 2,
            Self::Debug => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Fatal => "Fatal",
            Self::Warning => "Warning",
            Self::Debug => "Query",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticCode {
    TooManyCategories,
    TooFewCategories,
    NoSelectionCriteria,
    CategoryDateWithoutCategories,
    ConflictingDateParameters,
    IncompatibleOrderMethod,
    DominantSectionRange,
    MissingRequiredView,
    OpenReferencesConflict,
    ProtectedPageRequired,
    SqlBuildError,
    UnknownParameter,
    ParameterRejectedValue,
    NoResults,
    CategoryOutputIgnoresEnrichment,
    HeadingModeDowngraded,
    TransclusionLoopDetected,
    ParameterWithoutOption,
    QueryText,
}

impl DiagnosticCode {
    pub fn name(self) -> &'static str {
        match self {
            Self::TooManyCategories => "too-many-categories",
            Self::TooFewCategories => "too-few-categories",
            Self::NoSelectionCriteria => "no-selection-criteria",
            Self::CategoryDateWithoutCategories => "category-date-without-categories",
            Self::ConflictingDateParameters => "conflicting-date-parameters",
            Self::IncompatibleOrderMethod => "incompatible-order-method",
            Self::DominantSectionRange => "dominant-section-range",
            Self::MissingRequiredView => "missing-required-view",
            Self::OpenReferencesConflict => "open-references-conflict",
            Self::ProtectedPageRequired => "protected-page-required",
            Self::SqlBuildError => "sql-build-error",
            Self::UnknownParameter => "unknown-parameter",
            Self::ParameterRejectedValue => "parameter-rejected-value",
            Self::NoResults => "no-results",
            Self::CategoryOutputIgnoresEnrichment => "category-output-ignores-enrichment",
            Self::HeadingModeDowngraded => "heading-mode-downgraded",
            Self::TransclusionLoopDetected => "transclusion-loop-detected",
            Self::ParameterWithoutOption => "parameter-without-option",
            Self::QueryText => "query-text",
        }
    }

    pub fn id(self) -> u16 {
        match self {
            Self::TooManyCategories => 1003,
            Self::TooFewCategories => 1004,
            Self::NoSelectionCriteria => 1005,
            Self::CategoryDateWithoutCategories => 1006,
            Self::ConflictingDateParameters => 1008,
            Self::IncompatibleOrderMethod => 1009,
            Self::DominantSectionRange => 1010,
            Self::MissingRequiredView => 1011,
            Self::OpenReferencesConflict => 1012,
            Self::ProtectedPageRequired => 1023,
            Self::SqlBuildError => 1024,
            Self::UnknownParameter => 2013,
            Self::ParameterRejectedValue => 2014,
            Self::NoResults => 2016,
            Self::CategoryOutputIgnoresEnrichment => 2017,
            Self::HeadingModeDowngraded => 2018,
            Self::TransclusionLoopDetected => 2020,
            Self::ParameterWithoutOption => 2022,
            Self::QueryText => 3021,
        }
    }

    pub fn severity(self) -> Severity {
        match self.id() {
            1000..=1999 => Severity::Fatal,
            2000..=2999 => Severity::Warning,
            _ => Severity::Debug,
        }
    }

    fn template(self) -> &'static str {
        match self {
            Self::TooManyCategories => "Too many categories! Maximum: $1.",
            Self::TooFewCategories => "Too few categories! Minimum: $1.",
            Self::NoSelectionCriteria => {
                "No selection criteria! You have to use at least one of category, namespace, uses, linksto, linksfrom, title, titlematch, createdby, modifiedby or lastmodifiedby."
            }
            Self::CategoryDateWithoutCategories => {
                "addfirstcategorydate=true and ordermethod=categoryadd need at least one category."
            }
            Self::ConflictingDateParameters => {
                "Only one of addpagetoucheddate, addfirstcategorydate and addeditdate can be used at a time."
            }
            Self::IncompatibleOrderMethod => "'$1' can only be used with 'ordermethod=[...,]$2'.",
            Self::DominantSectionRange => {
                "The dominant section index must be between 1 and the number of include labels ($1 in this query)."
            }
            Self::MissingRequiredView => {
                "Queries involving uncategorized pages need the view '$1'. Create it with: $2"
            }
            Self::OpenReferencesConflict => {
                "'openreferences' cannot be combined with the other selection or enrichment parameters used here."
            }
            Self::ProtectedPageRequired => {
                "Directives may only run from edit-protected pages. Page '$1' is not protected."
            }
            Self::SqlBuildError => "Query failed: $1",
            Self::UnknownParameter => "Unknown parameter '$1' is ignored. Available parameters: $2.",
            Self::ParameterRejectedValue => "Parameter '$1' rejected the value '$2'; it is ignored.",
            Self::NoResults => "No results!",
            Self::CategoryOutputIgnoresEnrichment => {
                "mode=category shows titles only; the add* and include parameters are ignored."
            }
            Self::HeadingModeDowngraded => {
                "'headingmode=$1' needs at least two order methods; using '$2' instead."
            }
            Self::TransclusionLoopDetected => "Infinite transclusion loop created by page '$1'.",
            Self::ParameterWithoutOption => "Parameter '$1' has no assigned option and is ignored.",
            Self::QueryText => "$1",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub args: Vec<String>,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode) -> Self {
        Self {
            code,
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(code: DiagnosticCode, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            code,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Render the template in one pass; argument text is never rescanned for placeholders.
    pub fn message(&self) -> String {
        let template = self.code.template();
        let mut text = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(position) = rest.find('$') {
            text.push_str(&rest[..position]);
            let after = &rest[position + 1..];
            let digits = after
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after.len());
            let argument = after[..digits]
                .parse::<usize>()
                .ok()
                .and_then(|index| index.checked_sub(1))
                .and_then(|index| self.args.get(index));
            match argument {
                Some(argument) => text.push_str(argument),
                None => text.push_str(&rest[position..position + 1 + digits]),
            }
            rest = &after[digits..];
        }
        text.push_str(rest);
        text
    }

    /// One display line: severity, code and rendered message.
    pub fn line(&self) -> String {
        format!(
            "{} ({}): {}",
            self.severity().label(),
            self.code.name(),
            self.message()
        )
    }
}

#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    level: u8,
    entries: Vec<Diagnostic>,
}

impl DiagnosticLog {
    pub fn new(level: u8) -> Self {
        Self {
            level,
            entries: Vec::new(),
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn set_level(&mut self, level: u8) {
        self.level = level;
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity() {
            Severity::Fatal | Severity::Warning => warn!(
                code = diagnostic.code.name(),
                id = diagnostic.code.id(),
                detail = %diagnostic.message(),
                "directive diagnostic"
            ),
            Severity::Debug => debug!(code = diagnostic.code.name(), detail = %diagnostic.message(), "directive query"),
        }
        self.entries.push(diagnostic);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn has_fatal(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.severity() == Severity::Fatal)
    }

    /// Display lines for the entries visible at the current level.
    pub fn messages(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| self.level >= entry.severity().min_level())
            .map(Diagnostic::line)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_substitutes_positional_arguments() {
        let diagnostic = Diagnostic::with_args(
            DiagnosticCode::IncompatibleOrderMethod,
            ["mode=category", "sortkey | title | titlewithoutnamespace"],
        );
        assert_eq!(
            diagnostic.message(),
            "'mode=category' can only be used with 'ordermethod=[...,]sortkey | title | titlewithoutnamespace'."
        );
        assert_eq!(diagnostic.severity(), Severity::Fatal);
    }

    #[test]
    fn message_keeps_placeholders_inside_arguments() {
        let diagnostic =
            Diagnostic::with_args(DiagnosticCode::ParameterRejectedValue, ["count", "$1"]);
        assert_eq!(
            diagnostic.message(),
            "Parameter 'count' rejected the value '$1'; it is ignored."
        );

        let diagnostic = Diagnostic::with_args(DiagnosticCode::UnknownParameter, ["$2x", "a, b"]);
        assert_eq!(
            diagnostic.message(),
            "Unknown parameter '$2x' is ignored. Available parameters: a, b."
        );

        let missing = Diagnostic::new(DiagnosticCode::SqlBuildError);
        assert_eq!(missing.message(), "Query failed: $1");
    }

    #[test]
    fn codes_map_to_severity_by_id_range() {
        assert_eq!(DiagnosticCode::NoSelectionCriteria.severity(), Severity::Fatal);
        assert_eq!(DiagnosticCode::UnknownParameter.severity(), Severity::Warning);
        assert_eq!(DiagnosticCode::TransclusionLoopDetected.severity(), Severity::Warning);
        assert_eq!(DiagnosticCode::QueryText.severity(), Severity::Debug);
    }

    #[test]
    fn messages_are_filtered_by_level() {
        let mut log = DiagnosticLog::new(0);
        log.add(Diagnostic::new(DiagnosticCode::NoResults));
        log.add(Diagnostic::new(DiagnosticCode::NoSelectionCriteria));
        log.add(Diagnostic::with_args(DiagnosticCode::QueryText, ["SELECT 1"]));
        assert!(log.messages().is_empty());
        assert!(log.has_fatal());

        log.set_level(1);
        assert_eq!(log.messages().len(), 1);
        log.set_level(2);
        assert_eq!(log.messages().len(), 2);
        log.set_level(3);
        let messages = log.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], "Warning (no-results): No results!");
        assert_eq!(messages[2], "Query (query-text): SELECT 1");
    }
}
