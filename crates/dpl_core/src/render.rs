use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::namespace::PageTitle;
use crate::parameters::HeaderTemplates;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Author-written `\n` and `¶` both stand for a line break in header and footer text.
pub fn replace_new_lines(text: &str) -> String {
    text.replace("\\n", "\n").replace('¶', "\n")
}

/// Replace each variable in turn; unknown `%TOKENS%` stay verbatim.
pub fn replace_variables(text: &str, variables: &[(&str, String)]) -> String {
    let mut text = replace_new_lines(text);
    for (variable, value) in variables {
        text = text.replace(variable, value);
    }
    text
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderVariant {
    Results,
    OneResult,
    NoResults,
}

impl HeaderVariant {
    pub fn for_count(found: usize) -> Self {
        match found {
            0 => Self::NoResults,
            1 => Self::OneResult,
            _ => Self::Results,
        }
    }

    fn templates(self, templates: &HeaderTemplates) -> (Option<&str>, Option<&str>) {
        match self {
            Self::Results => (
                templates.results_header.as_deref(),
                templates.results_footer.as_deref(),
            ),
            Self::OneResult => (
                templates.one_result_header.as_deref(),
                templates.one_result_footer.as_deref(),
            ),
            Self::NoResults => (
                templates.no_results_header.as_deref(),
                templates.no_results_footer.as_deref(),
            ),
        }
    }
}

/// Scalar values exposed to header and footer templates and to the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderContext {
    pub total: usize,
    pub pages: usize,
    pub first: Option<PageTitle>,
    pub last: Option<PageTitle>,
    pub elapsed: Duration,
    /// Wall-clock time of the invocation as `Y/m/d H:M:S`.
    pub timestamp: String,
    pub scroll_dir: String,
    pub count: Option<usize>,
}

impl RenderContext {
    pub fn dpl_time(&self) -> String {
        format!("{:.3} sec. ({})", self.elapsed.as_secs_f64(), self.timestamp)
    }

    fn first_namespace(&self) -> String {
        namespace_of(self.first.as_ref())
    }

    fn first_title(&self) -> String {
        title_of(self.first.as_ref())
    }

    fn last_namespace(&self) -> String {
        namespace_of(self.last.as_ref())
    }

    fn last_title(&self) -> String {
        title_of(self.last.as_ref())
    }

    pub fn variables(&self) -> Vec<(&'static str, String)> {
        vec![
            ("%TOTALPAGES%", self.total.to_string()),
            ("%VERSION%", VERSION.to_string()),
            ("%PAGES%", self.pages.to_string()),
            ("%DPLTIME%", self.dpl_time()),
            ("%FIRSTNAMESPACE%", self.first_namespace()),
            ("%FIRSTTITLE%", self.first_title()),
            ("%LASTNAMESPACE%", self.last_namespace()),
            ("%LASTTITLE%", self.last_title()),
            ("%SCROLLDIR%", self.scroll_dir.clone()),
        ]
    }

    /// Values published for continuation links.
    pub fn scroll_variables(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("DPL_firstNamespace".to_string(), self.first_namespace()),
            ("DPL_firstTitle".to_string(), self.first_title()),
            ("DPL_lastNamespace".to_string(), self.last_namespace()),
            ("DPL_lastTitle".to_string(), self.last_title()),
            ("DPL_scrollDir".to_string(), self.scroll_dir.clone()),
            ("DPL_time".to_string(), self.dpl_time()),
            (
                "DPL_count".to_string(),
                self.count.map(|count| count.to_string()).unwrap_or_default(),
            ),
            ("DPL_totalPages".to_string(), self.total.to_string()),
            ("DPL_pages".to_string(), self.pages.to_string()),
        ])
    }
}

fn namespace_of(title: Option<&PageTitle>) -> String {
    title
        .map(|title| title.namespace_id.to_string())
        .unwrap_or_default()
}

fn title_of(title: Option<&PageTitle>) -> String {
    title.map(PageTitle::db_key).unwrap_or_default()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub header: String,
    pub footer: String,
}

impl Frame {
    /// Literal-preserving wrap used at the highest debug level.
    pub fn wrap_literal(self) -> Self {
        Self {
            header: format!("<pre><nowiki>{}", self.header),
            footer: format!("{}</nowiki></pre>", self.footer),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.footer.is_empty()
    }
}

/// Header and footer for a result set of `context.total` rows.
pub fn frame(templates: &HeaderTemplates, context: &RenderContext) -> Frame {
    let (header, footer) = HeaderVariant::for_count(context.total).templates(templates);
    let variables = context.variables();
    Frame {
        header: header
            .map(|text| replace_variables(text, &variables))
            .unwrap_or_default(),
        footer: footer
            .map(|text| replace_variables(text, &variables))
            .unwrap_or_default(),
    }
}

/// Header and footer when the store returned nothing; only the counters are substituted.
pub fn no_results_frame(templates: &HeaderTemplates) -> Frame {
    let variables = [("%TOTALPAGES%", "0".to_string()), ("%PAGES%", "0".to_string())];
    Frame {
        header: templates
            .no_results_header
            .as_deref()
            .map(|text| replace_variables(text, &variables))
            .unwrap_or_default(),
        footer: templates
            .no_results_footer
            .as_deref()
            .map(|text| replace_variables(text, &variables))
            .unwrap_or_default(),
    }
}

/// Diagnostics block, header, body and footer in output order.
pub fn assemble(messages: &[String], frame: &Frame, body: &str) -> String {
    let mut out = String::new();
    if !messages.is_empty() {
        out.push_str(&messages.join("<br/>\n"));
        out.push('\n');
    }
    out.push_str(&frame.header);
    out.push_str(body);
    out.push_str(&frame.footer);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::NamespaceTable;

    fn context(total: usize) -> RenderContext {
        let namespaces = NamespaceTable::default();
        RenderContext {
            total,
            pages: total,
            first: namespaces.parse_title("Card games"),
            last: namespaces.parse_title("Category:Bridge bidding"),
            elapsed: Duration::from_millis(1250),
            timestamp: "2024/01/31 15:45:00".to_string(),
            scroll_dir: "down".to_string(),
            count: Some(20),
        }
    }

    #[test]
    fn replace_variables_handles_new_lines_and_unknown_tokens() {
        let text = replace_variables(
            "Total: %TOTALPAGES%\\nNext¶%UNKNOWN%",
            &[("%TOTALPAGES%", "3".to_string())],
        );
        assert_eq!(text, "Total: 3\nNext\n%UNKNOWN%");
    }

    #[test]
    fn frame_selects_variant_by_cardinality() {
        let templates = HeaderTemplates {
            results_header: Some("%TOTALPAGES% pages from %FIRSTTITLE% to %LASTNAMESPACE%:%LASTTITLE%".to_string()),
            one_result_header: Some("Only one".to_string()),
            results_footer: Some("took %DPLTIME%, %SCROLLDIR%".to_string()),
            ..HeaderTemplates::default()
        };

        let many = frame(&templates, &context(3));
        assert_eq!(many.header, "3 pages from Card_games to 14:Bridge_bidding");
        assert_eq!(many.footer, "took 1.250 sec. (2024/01/31 15:45:00), down");

        let one = frame(&templates, &context(1));
        assert_eq!(one.header, "Only one");
        assert_eq!(one.footer, "");

        assert!(frame(&templates, &context(0)).is_empty());
    }

    #[test]
    fn no_results_frame_substitutes_counters_only() {
        let templates = HeaderTemplates {
            no_results_header: Some("%TOTALPAGES%/%PAGES% %FIRSTTITLE%".to_string()),
            ..HeaderTemplates::default()
        };
        let frame = no_results_frame(&templates);
        assert_eq!(frame.header, "0/0 %FIRSTTITLE%");
        assert_eq!(frame.footer, "");
    }

    #[test]
    fn scroll_variables_expose_navigation_state() {
        let variables = context(3).scroll_variables();
        assert_eq!(variables["DPL_firstNamespace"], "0");
        assert_eq!(variables["DPL_firstTitle"], "Card_games");
        assert_eq!(variables["DPL_lastNamespace"], "14");
        assert_eq!(variables["DPL_count"], "20");
        assert_eq!(variables["DPL_totalPages"], "3");
        assert_eq!(variables.len(), 9);
    }

    #[test]
    fn assemble_puts_diagnostics_first_and_wraps_literal() {
        let frame = Frame {
            header: "H".to_string(),
            footer: "F".to_string(),
        };
        let messages = vec!["Warning one".to_string(), "Warning two".to_string()];
        assert_eq!(
            assemble(&messages, &frame, "body"),
            "Warning one<br/>\nWarning two\nHbodyF"
        );
        assert_eq!(
            assemble(&[], &frame.wrap_literal(), "x"),
            "<pre><nowiki>HxF</nowiki></pre>"
        );
    }
}
