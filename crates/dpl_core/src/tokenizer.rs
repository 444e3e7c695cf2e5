use std::collections::BTreeMap;

use regex::{NoExpand, Regex};
use serde::Serialize;

use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticLog};
use crate::registry::ParameterRegistry;

/// Request arguments that may be substituted into directive text as `{%NAME%}` or `{%NAME:default%}`.
pub const URL_ARGUMENTS: &[&str] = &[
    "DPL_offset",
    "DPL_count",
    "DPL_fromTitle",
    "DPL_findTitle",
    "DPL_toTitle",
    "DPL_arg1",
    "DPL_arg2",
    "DPL_arg3",
    "DPL_arg4",
    "DPL_arg5",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectiveEntry {
    pub name: String,
    pub values: Vec<String>,
}

/// Parameter names in first-encounter order, each with its accumulated raw values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Directive {
    entries: Vec<DirectiveEntry>,
}

impl Directive {
    pub fn entries(&self) -> &[DirectiveEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.values.as_slice())
    }

    fn push(&mut self, name: String, value: String) {
        match self.entries.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => entry.values.push(value),
            None => self.entries.push(DirectiveEntry {
                name,
                values: vec![value],
            }),
        }
    }

    /// Reconstruct `name=value` lines; tokenizing the result yields the same directive.
    pub fn to_text(&self) -> String {
        self.entries
            .iter()
            .flat_map(|entry| {
                entry
                    .values
                    .iter()
                    .map(move |value| format!("{}={}", entry.name, value))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Canonicalise alias characters and line endings, then trim surrounding blank lines.
pub fn normalize_input(raw: &str) -> String {
    let text = raw
        .replace('«', "<")
        .replace('»', ">")
        .replace('¦', "|")
        .replace("²{", "{{")
        .replace("}²", "}}")
        .replace("\r\n", "\n")
        .replace('\r', "\n");
    text.trim_matches('\n').to_string()
}

pub fn tokenize(raw: &str, registry: &ParameterRegistry, log: &mut DiagnosticLog) -> Directive {
    let mut directive = Directive::default();
    let normalized = normalize_input(raw);

    for line in normalized.split('\n') {
        if line.trim().is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once('=') else {
            log.add(Diagnostic::with_args(
                DiagnosticCode::ParameterWithoutOption,
                [line.trim()],
            ));
            continue;
        };

        let mut name = name.trim().to_ascii_lowercase();
        let value = value.trim();
        if name.contains(['<', '>']) {
            name = name.replace('<', "lt").replace('>', "gt");
        }
        if name.is_empty() || name.starts_with('#') {
            continue;
        }
        if !registry.exists(&name) {
            log.add(Diagnostic::with_args(
                DiagnosticCode::UnknownParameter,
                [name, registry.available_names().join(", ")],
            ));
            continue;
        }
        if !registry.is_available(&name) {
            continue;
        }
        if directive.contains(&name) && !registry.is_repeatable(&name) {
            continue;
        }
        if value.is_empty() && !registry.allows_empty(&name) {
            continue;
        }
        directive.push(name, value.to_string());
    }

    directive
}

/// Substitute `{%NAME:default%}` and `{%NAME%}` placeholders from the request arguments.
pub fn resolve_url_arguments(input: &str, arguments: &BTreeMap<String, String>) -> String {
    let mut text = input.to_string();
    for name in URL_ARGUMENTS {
        let placeholder = format!("{{%{name}%}}");
        let Ok(pattern) = Regex::new(&format!(r"\{{%{}:(.*?)%\}}", regex::escape(name))) else {
            continue;
        };
        let value = arguments
            .get(*name)
            .map(String::as_str)
            .unwrap_or_default();
        if value.is_empty() {
            text = pattern.replace_all(&text, "${1}").into_owned();
            text = text.replace(&placeholder, "");
        } else {
            text = pattern.replace_all(&text, NoExpand(value)).into_owned();
            text = text.replace(&placeholder, value);
        }
    }
    text
}
