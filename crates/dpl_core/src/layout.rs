use chrono::NaiveDateTime;
use serde::Serialize;

use crate::namespace::{Namespace, PageTitle};
use crate::parameters::{Enrichment, HeadingMode, ListMode, OrderMethod, ParameterSet};
use crate::query::ResultRow;

/// Presentation settings for one rendering of the result rows.
#[derive(Debug, Clone)]
pub struct LayoutRequest<'a> {
    pub mode: ListMode,
    pub heading_mode: HeadingMode,
    pub heading_method: Option<OrderMethod>,
    pub heading_count: bool,
    pub inline_text: &'a str,
    pub escape_links: bool,
    pub show_namespace: bool,
    pub title_max_length: Option<usize>,
    pub section_labels: &'a [String],
    pub enrichment: &'a Enrichment,
    /// Edit dates and users follow the first revision instead of the last one.
    pub first_edit: bool,
}

impl<'a> LayoutRequest<'a> {
    pub fn from_params(params: &'a ParameterSet) -> Self {
        let heading_method = if params.heading_mode == HeadingMode::None {
            None
        } else {
            params.order_methods.first().copied()
        };
        Self {
            mode: params.mode,
            heading_mode: params.heading_mode,
            heading_method,
            heading_count: params.heading_count,
            inline_text: &params.inline_text,
            escape_links: params.escape_links,
            show_namespace: params.show_namespace,
            title_max_length: params.title_max_length,
            section_labels: &params.section_labels,
            enrichment: &params.enrichment,
            first_edit: params.has_order_method(&[OrderMethod::FirstEdit]),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LayoutOutput {
    pub text: String,
    pub row_count: usize,
}

pub trait LayoutRenderer {
    fn render(&self, rows: &[ResultRow], request: &LayoutRequest<'_>) -> LayoutOutput;
}

/// Wikitext lists, optionally grouped under headings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListLayout;

impl LayoutRenderer for ListLayout {
    fn render(&self, rows: &[ResultRow], request: &LayoutRequest<'_>) -> LayoutOutput {
        if rows.is_empty() {
            return LayoutOutput::default();
        }
        let text = if request.mode == ListMode::Category {
            category_columns(rows, request)
        } else {
            match request.heading_method {
                Some(method) if request.heading_mode != HeadingMode::None => {
                    grouped(rows, request, method)
                }
                _ => list(rows, request, ""),
            }
        };
        LayoutOutput {
            text,
            row_count: rows.len(),
        }
    }
}

fn grouped(rows: &[ResultRow], request: &LayoutRequest<'_>, method: OrderMethod) -> String {
    let mut sections = Vec::new();
    let mut start = 0;
    while start < rows.len() {
        let key = heading_key(&rows[start], method);
        let end = rows[start..]
            .iter()
            .position(|row| heading_key(row, method) != key)
            .map_or(rows.len(), |offset| start + offset);
        let group = &rows[start..end];
        let mut heading = heading_label(&key, method);
        if request.heading_count {
            heading.push_str(&format!(" ({})", group.len()));
        }
        let section = match request.heading_mode {
            HeadingMode::H2 => format!("== {heading} ==\n{}", list(group, request, "")),
            HeadingMode::H3 => format!("=== {heading} ===\n{}", list(group, request, "")),
            HeadingMode::H4 => format!("==== {heading} ====\n{}", list(group, request, "")),
            HeadingMode::Unordered => format!("* {heading}\n{}", list(group, request, "*")),
            HeadingMode::Ordered => format!("# {heading}\n{}", list(group, request, "#")),
            HeadingMode::Definition | HeadingMode::None => {
                format!("; {heading}\n{}", list(group, request, ":"))
            }
        };
        sections.push(section);
        start = end;
    }
    sections.join("\n")
}

fn list(rows: &[ResultRow], request: &LayoutRequest<'_>, prefix: &str) -> String {
    let items = rows.iter().map(|row| item(row, request));
    match request.mode {
        ListMode::Unordered => items
            .map(|item| format!("{prefix}* {item}"))
            .collect::<Vec<_>>()
            .join("\n"),
        ListMode::Ordered => items
            .map(|item| format!("{prefix}# {item}"))
            .collect::<Vec<_>>()
            .join("\n"),
        ListMode::Inline => {
            let line = items.collect::<Vec<_>>().join(request.inline_text);
            if prefix.is_empty() {
                line
            } else {
                format!("{prefix} {line}")
            }
        }
        ListMode::None | ListMode::Category => {
            if prefix.is_empty() {
                items.collect::<Vec<_>>().join("<br/>\n")
            } else {
                items
                    .map(|item| format!("{prefix} {item}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
    }
}

/// Alphabetical groups in the manner of a category page.
fn category_columns(rows: &[ResultRow], request: &LayoutRequest<'_>) -> String {
    let mut out = Vec::new();
    let mut current: Option<String> = None;
    for row in rows {
        let source = row
            .sortkey
            .as_deref()
            .filter(|sortkey| !sortkey.is_empty())
            .unwrap_or(&row.page.text);
        let letter = first_letter(source);
        if current.as_deref() != Some(letter.as_str()) {
            out.push(format!("=== {letter} ==="));
            current = Some(letter);
        }
        out.push(format!("* {}", link(&row.page, request)));
    }
    out.join("\n")
}

fn item(row: &ResultRow, request: &LayoutRequest<'_>) -> String {
    let enrichment = request.enrichment;
    let mut text = String::new();

    let date = if enrichment.page_touched_date {
        row.touched.as_deref()
    } else if enrichment.first_category_date {
        row.category_added.as_deref()
    } else if enrichment.edit_date {
        edit_date(row, request)
    } else {
        None
    };
    if let Some(date) = date {
        text.push_str(&format_timestamp(date));
        text.push_str(": ");
    }

    text.push_str(&link(&row.page, request));

    if enrichment.user
        && let Some(user) = edit_user(row, request)
    {
        text.push_str(&format!(" . . {}", user_link(user)));
    }
    if enrichment.author
        && let Some(author) = row.author.as_deref()
    {
        text.push_str(&format!(" . . {}", user_link(author)));
    }
    if enrichment.last_editor
        && let Some(editor) = row.last_editor.as_deref()
    {
        text.push_str(&format!(" . . {}", user_link(editor)));
    }
    if enrichment.contribution
        && let Some(contribution) = &row.contribution
    {
        text.push_str(&format!(
            " . . {} ({})",
            user_link(&contribution.user),
            contribution.bytes
        ));
    }
    if enrichment.categories && !row.categories.is_empty() {
        let categories = row
            .categories
            .iter()
            .map(|name| format!("[[:{}{name}|{name}]]", Namespace::Category.prefix()))
            .collect::<Vec<_>>()
            .join(" | ");
        text.push_str(&format!(" . . {categories}"));
    }
    if enrichment.page_size
        && let Some(size) = row.size
    {
        text.push_str(&format!(" [{size}]"));
    }

    let markers = include_markers(&row.page, request.section_labels);
    if !markers.is_empty() {
        let separator = if request.mode == ListMode::Inline {
            " "
        } else {
            "\n"
        };
        text.push_str(separator);
        text.push_str(&markers.join(separator));
    }
    text
}

fn edit_date<'r>(row: &'r ResultRow, request: &LayoutRequest<'_>) -> Option<&'r str> {
    if request.first_edit {
        row.first_edit.as_deref()
    } else {
        row.last_edit.as_deref()
    }
}

fn edit_user<'r>(row: &'r ResultRow, request: &LayoutRequest<'_>) -> Option<&'r str> {
    if request.first_edit {
        row.author.as_deref()
    } else {
        row.last_editor.as_deref()
    }
}

fn user_link(user: &str) -> String {
    format!("[[{}{user}|{user}]]", Namespace::User.prefix())
}

fn link(page: &PageTitle, request: &LayoutRequest<'_>) -> String {
    let target = page.prefixed();
    let escaped = request.escape_links
        && (page.namespace_id == Namespace::Category.id() || page.namespace_id == Namespace::File.id());
    let colon = if escaped { ":" } else { "" };
    let label = if request.show_namespace {
        target.clone()
    } else {
        page.text.clone()
    };
    let label = truncate(&label, request.title_max_length);
    if label == target && !escaped {
        format!("[[{target}]]")
    } else {
        format!("[[{colon}{target}|{label}]]")
    }
}

fn truncate(label: &str, max_length: Option<usize>) -> String {
    match max_length {
        Some(max) if label.chars().count() > max => {
            let mut short = label.chars().take(max).collect::<String>();
            short.push_str("...");
            short
        }
        _ => label.to_string(),
    }
}

/// Transclusion markers for `include`: whole page, heading section (`#Heading`) or labelled section.
fn include_markers(page: &PageTitle, labels: &[String]) -> Vec<String> {
    let title = page.prefixed();
    labels
        .iter()
        .map(|label| {
            if label.is_empty() || label == "*" {
                format!("{{{{:{title}}}}}")
            } else if let Some(heading) = label.strip_prefix('#') {
                format!("{{{{#lsth:{title}|{heading}}}}}")
            } else {
                format!("{{{{#lst:{title}|{label}}}}}")
            }
        })
        .collect()
}

fn heading_key(row: &ResultRow, method: OrderMethod) -> String {
    match method {
        OrderMethod::Category => row.category.clone().unwrap_or_default(),
        OrderMethod::User => row.last_editor.clone().unwrap_or_default(),
        OrderMethod::PageTouched => day(row.touched.as_deref()),
        OrderMethod::FirstEdit => day(row.first_edit.as_deref()),
        OrderMethod::LastEdit => day(row.last_edit.as_deref()),
        OrderMethod::CategoryAdd => day(row.category_added.as_deref()),
        OrderMethod::Sortkey => first_letter(
            row.sortkey
                .as_deref()
                .filter(|sortkey| !sortkey.is_empty())
                .unwrap_or(&row.page.text),
        ),
        OrderMethod::Title => row.page.namespace.clone(),
        OrderMethod::TitleWithoutNamespace => first_letter(&row.page.text),
        OrderMethod::Size => row.size.map(|size| size.to_string()).unwrap_or_default(),
        OrderMethod::None => String::new(),
    }
}

fn heading_label(key: &str, method: OrderMethod) -> String {
    match method {
        OrderMethod::Category if !key.is_empty() => {
            format!("[[:{}{key}|{key}]]", Namespace::Category.prefix())
        }
        OrderMethod::User if !key.is_empty() => user_link(key),
        _ => key.to_string(),
    }
}

fn day(timestamp: Option<&str>) -> String {
    timestamp
        .and_then(|value| NaiveDateTime::parse_from_str(value, "%Y%m%d%H%M%S").ok())
        .map(|value| value.format("%-d %B %Y").to_string())
        .unwrap_or_default()
}

fn first_letter(value: &str) -> String {
    value
        .chars()
        .next()
        .map(|letter| letter.to_uppercase().collect())
        .unwrap_or_default()
}

/// `20240131154500` as `15:45, 31 January 2024`; other input is returned unchanged.
pub fn format_timestamp(value: &str) -> String {
    NaiveDateTime::parse_from_str(value, "%Y%m%d%H%M%S")
        .map(|value| value.format("%H:%M, %-d %B %Y").to_string())
        .unwrap_or_else(|_| value.to_string())
}
