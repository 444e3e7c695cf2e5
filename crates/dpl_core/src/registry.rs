use std::collections::BTreeSet;

use tracing::debug;

use crate::config::DplSection;
use crate::namespace::{Namespace, NamespaceTable, normalize_title};
use crate::parameters::{
    CategoryGroup, Comparison, Goal, HeadingMode, ListMode, MinorEdits, OpenReferences, Operator,
    OrderMethod, ParameterSet, Redirects, ResetTargets, SortOrder, UNCATEGORIZED,
};
use crate::tokenizer::Directive;

/// Read-only inputs a setter may consult.
pub struct SetterContext<'a> {
    pub namespaces: &'a NamespaceTable,
    pub limits: &'a DplSection,
    pub max_result_count: usize,
}

pub type Setter = fn(&mut ParameterSet, &str, &SetterContext<'_>) -> bool;

#[derive(Clone, Copy)]
pub struct ParameterDefinition {
    pub name: &'static str,
    pub richness: u8,
    pub repeatable: bool,
    pub priority: Option<u8>,
    pub selection: bool,
    pub open_ref_conflict: bool,
    setter: Setter,
}

impl ParameterDefinition {
    const fn new(name: &'static str, richness: u8, setter: Setter) -> Self {
        Self {
            name,
            richness,
            repeatable: false,
            priority: None,
            selection: false,
            open_ref_conflict: false,
            setter,
        }
    }

    const fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    const fn priority(mut self, rank: u8) -> Self {
        self.priority = Some(rank);
        self
    }

    const fn selection(mut self) -> Self {
        self.selection = true;
        self
    }

    const fn open_ref_conflict(mut self) -> Self {
        self.open_ref_conflict = true;
        self
    }
}

impl std::fmt::Debug for ParameterDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterDefinition")
            .field("name", &self.name)
            .field("richness", &self.richness)
            .field("repeatable", &self.repeatable)
            .field("priority", &self.priority)
            .finish()
    }
}

type Def = ParameterDefinition;

static DEFINITIONS: &[ParameterDefinition] = &[
    Def::new("openreferences", 3, set_open_references).priority(1),
    Def::new("category", 0, set_category)
        .repeatable()
        .priority(2)
        .open_ref_conflict(),
    Def::new("notcategory", 0, set_not_category)
        .repeatable()
        .open_ref_conflict(),
    Def::new("goal", 3, set_goal).priority(3),
    Def::new("ordermethod", 0, set_order_method).priority(4),
    Def::new("include", 2, set_include)
        .repeatable()
        .priority(5)
        .open_ref_conflict(),
    Def::new("includepage", 2, set_include)
        .repeatable()
        .priority(5)
        .open_ref_conflict(),
    Def::new("namespace", 0, set_namespace).repeatable().selection(),
    Def::new("notnamespace", 1, set_not_namespace).repeatable(),
    Def::new("uses", 2, set_uses)
        .repeatable()
        .selection()
        .open_ref_conflict(),
    Def::new("notuses", 2, set_not_uses)
        .repeatable()
        .selection()
        .open_ref_conflict(),
    Def::new("linksto", 2, set_links_to)
        .repeatable()
        .selection()
        .open_ref_conflict(),
    Def::new("notlinksto", 2, set_not_links_to)
        .repeatable()
        .selection()
        .open_ref_conflict(),
    Def::new("linksfrom", 2, set_links_from).repeatable().selection(),
    Def::new("notlinksfrom", 2, set_not_links_from)
        .repeatable()
        .selection()
        .open_ref_conflict(),
    Def::new("title", 2, set_title).repeatable().selection(),
    Def::new("titlematch", 2, set_title_match)
        .repeatable()
        .selection()
        .open_ref_conflict(),
    Def::new("nottitlematch", 2, set_not_title_match)
        .repeatable()
        .selection()
        .open_ref_conflict(),
    Def::new("titlelt", 2, set_title_lt).open_ref_conflict(),
    Def::new("titlegt", 2, set_title_gt).open_ref_conflict(),
    Def::new("redirects", 0, set_redirects).open_ref_conflict(),
    Def::new("createdby", 2, set_created_by)
        .selection()
        .open_ref_conflict(),
    Def::new("modifiedby", 2, set_modified_by)
        .selection()
        .open_ref_conflict(),
    Def::new("lastmodifiedby", 2, set_last_modified_by)
        .selection()
        .open_ref_conflict(),
    Def::new("imagecontainer", 3, set_image_container)
        .repeatable()
        .selection(),
    Def::new("allrevisionsbefore", 2, set_all_revisions_before).open_ref_conflict(),
    Def::new("allrevisionssince", 2, set_all_revisions_since).open_ref_conflict(),
    Def::new("firstrevisionsince", 2, set_first_revision_since).open_ref_conflict(),
    Def::new("lastrevisionbefore", 2, set_last_revision_before).open_ref_conflict(),
    Def::new("minoredits", 2, set_minor_edits).open_ref_conflict(),
    Def::new("order", 0, set_order),
    Def::new("ordersuitsymbols", 2, set_order_suit_symbols),
    Def::new("count", 0, set_count),
    Def::new("offset", 1, set_offset),
    Def::new("randomcount", 1, set_random_count),
    Def::new("mode", 0, set_mode),
    Def::new("headingmode", 1, set_heading_mode),
    Def::new("headingcount", 1, set_heading_count),
    Def::new("inlinetext", 1, set_inline_text),
    Def::new("escapelinks", 1, set_escape_links),
    Def::new("shownamespace", 0, set_show_namespace),
    Def::new("titlemaxlen", 1, set_title_max_length),
    Def::new("dominantsection", 2, set_dominant_section),
    Def::new("resultsheader", 1, set_results_header),
    Def::new("resultsfooter", 1, set_results_footer),
    Def::new("oneresultheader", 1, set_one_result_header),
    Def::new("oneresultfooter", 1, set_one_result_footer),
    Def::new("noresultsheader", 1, set_no_results_header),
    Def::new("noresultsfooter", 1, set_no_results_footer),
    Def::new("addpagetoucheddate", 1, set_add_page_touched_date).open_ref_conflict(),
    Def::new("addfirstcategorydate", 0, set_add_first_category_date).open_ref_conflict(),
    Def::new("addeditdate", 1, set_add_edit_date).open_ref_conflict(),
    Def::new("adduser", 1, set_add_user).open_ref_conflict(),
    Def::new("addauthor", 2, set_add_author).open_ref_conflict(),
    Def::new("addlasteditor", 2, set_add_last_editor).open_ref_conflict(),
    Def::new("addcontribution", 2, set_add_contribution).open_ref_conflict(),
    Def::new("addcategories", 1, set_add_categories).open_ref_conflict(),
    Def::new("addpagesize", 2, set_add_page_size).open_ref_conflict(),
    Def::new("execandexit", 3, set_exec_and_exit),
    Def::new("debug", 1, set_debug),
    Def::new("allowcachedresults", 1, set_allow_cached_results),
    Def::new("cacheperiod", 1, set_cache_period),
    Def::new("skipthispage", 2, set_skip_this_page),
    Def::new("includesubpages", 2, set_include_subpages),
    Def::new("reset", 3, set_reset).repeatable(),
    Def::new("eliminate", 3, set_eliminate).repeatable(),
];

/// Parameters that keep an empty value instead of dropping the line.
pub const EMPTY_VALUE_PARAMETERS: &[&str] = &["category", "notcategory", "namespace"];

#[derive(Debug, Clone)]
pub struct ParameterRegistry {
    richness: u8,
}

impl ParameterRegistry {
    pub fn new(richness: u8) -> Self {
        Self { richness }
    }

    fn definition(&self, name: &str) -> Option<&'static ParameterDefinition> {
        DEFINITIONS.iter().find(|definition| definition.name == name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.definition(name).is_some()
    }

    /// Richness tier of a recognised parameter.
    pub fn classify(&self, name: &str) -> Option<u8> {
        self.definition(name).map(|definition| definition.richness)
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.classify(name)
            .is_some_and(|richness| richness <= self.richness)
    }

    pub fn is_repeatable(&self, name: &str) -> bool {
        self.definition(name)
            .is_some_and(|definition| definition.repeatable)
    }

    pub fn allows_empty(&self, name: &str) -> bool {
        EMPTY_VALUE_PARAMETERS.contains(&name)
    }

    pub fn available_names(&self) -> Vec<&'static str> {
        DEFINITIONS
            .iter()
            .filter(|definition| definition.richness <= self.richness)
            .map(|definition| definition.name)
            .collect()
    }

    pub fn available_definitions(&self) -> Vec<&'static ParameterDefinition> {
        DEFINITIONS
            .iter()
            .filter(|definition| definition.richness <= self.richness)
            .collect()
    }

    /// Run the setter for one raw value. `false` means the value was rejected and nothing changed.
    pub fn apply(
        &self,
        name: &str,
        raw_value: &str,
        params: &mut ParameterSet,
        context: &SetterContext<'_>,
    ) -> bool {
        let Some(definition) = self.definition(name) else {
            return false;
        };
        if definition.richness > self.richness {
            return false;
        }
        let accepted = (definition.setter)(params, raw_value, context);
        if accepted {
            params.selection_found |= definition.selection;
            params.open_ref_conflict |= definition.open_ref_conflict;
        }
        debug!(parameter = name, value = raw_value, accepted, "applied parameter");
        accepted
    }

    /// Directive entries reordered so prioritised parameters come first; the rest keep encounter order.
    pub fn sort_by_priority<'d>(&self, directive: &'d Directive) -> Vec<(&'d str, &'d [String])> {
        let mut entries = directive
            .entries()
            .iter()
            .map(|entry| (entry.name.as_str(), entry.values.as_slice()))
            .collect::<Vec<_>>();
        entries.sort_by_key(|(name, _)| {
            self.definition(name)
                .and_then(|definition| definition.priority)
                .unwrap_or(u8::MAX)
        });
        entries
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

fn parse_positive(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok().filter(|value| *value > 0)
}

fn split_list(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn set_flag(target: &mut bool, value: &str) -> bool {
    match parse_bool(value) {
        Some(flag) => {
            *target = flag;
            true
        }
        None => false,
    }
}

fn set_text(target: &mut Option<String>, value: &str) -> bool {
    *target = Some(value.to_string());
    true
}

fn parse_category_part(part: &str) -> (Comparison, String) {
    let mut part = part.trim();
    if part.len() > 1
        && let Some(stripped) = part.strip_prefix(['+', '-'])
    {
        part = stripped.trim_start();
    }
    if part.is_empty() || part.eq_ignore_ascii_case("_none_") {
        return (Comparison::Equal, UNCATEGORIZED.to_string());
    }
    if let Some(pattern) = part.strip_prefix('~')
        && !pattern.is_empty()
    {
        return (Comparison::Regexp, pattern.to_string());
    }
    if part.starts_with('*') && part.len() > 1 {
        return (Comparison::Like, normalize_title(part).replace('*', "%"));
    }
    (Comparison::Equal, normalize_title(part))
}

/// `A|B` is one OR group, `A&B` one AND group. Mixing comparison kinds is only allowed under AND.
fn parse_category_groups(value: &str) -> Option<Vec<CategoryGroup>> {
    let value = value.trim();
    let (operator, parts) = if value.contains('|') {
        (Operator::Or, value.split('|').collect::<Vec<_>>())
    } else {
        (Operator::And, value.split('&').collect::<Vec<_>>())
    };
    let operator = if parts.len() == 1 { Operator::Or } else { operator };

    let mut groups: Vec<CategoryGroup> = Vec::new();
    for part in parts {
        let (comparison, name) = parse_category_part(part);
        match groups.iter_mut().find(|group| group.comparison == comparison) {
            Some(group) => {
                group.categories.insert(name);
            }
            None => groups.push(CategoryGroup {
                comparison,
                operator,
                categories: BTreeSet::from([name]),
            }),
        }
    }
    if operator == Operator::Or && groups.len() > 1 {
        return None;
    }
    Some(groups)
}

fn set_category(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    let Some(groups) = parse_category_groups(value) else {
        return false;
    };
    for group in groups {
        params.category.push(group);
    }
    true
}

fn set_not_category(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    let Some(groups) = parse_category_groups(value) else {
        return false;
    };
    for group in groups {
        params.not_category.push(group);
    }
    true
}

fn resolve_namespace_ids(value: &str, context: &SetterContext<'_>) -> Option<Vec<i32>> {
    if value.trim().is_empty() {
        return Some(vec![Namespace::Main.id()]);
    }
    value
        .split('|')
        .map(|name| context.namespaces.resolve(name).map(|entry| entry.id))
        .collect()
}

fn push_unique(target: &mut Vec<i32>, ids: Vec<i32>) {
    for id in ids {
        if !target.contains(&id) {
            target.push(id);
        }
    }
}

fn set_namespace(params: &mut ParameterSet, value: &str, context: &SetterContext<'_>) -> bool {
    match resolve_namespace_ids(value, context) {
        Some(ids) => {
            push_unique(&mut params.namespaces, ids);
            true
        }
        None => false,
    }
}

fn set_not_namespace(params: &mut ParameterSet, value: &str, context: &SetterContext<'_>) -> bool {
    match resolve_namespace_ids(value, context) {
        Some(ids) => {
            push_unique(&mut params.not_namespaces, ids);
            true
        }
        None => false,
    }
}

fn parse_titles(value: &str, context: &SetterContext<'_>) -> Option<Vec<String>> {
    let titles = split_list(value, '|')
        .iter()
        .filter_map(|item| context.namespaces.parse_title(item))
        .map(|title| title.prefixed())
        .collect::<Vec<_>>();
    if titles.is_empty() { None } else { Some(titles) }
}

fn parse_templates(value: &str, context: &SetterContext<'_>) -> Option<Vec<String>> {
    let templates = split_list(value, '|')
        .iter()
        .filter_map(|item| {
            let title = context.namespaces.parse_title(item)?;
            if title.namespace_id == Namespace::Template.id() {
                Some(title.prefixed())
            } else {
                Some(format!("{}{}", Namespace::Template.prefix(), title.prefixed()))
            }
        })
        .collect::<Vec<_>>();
    if templates.is_empty() {
        None
    } else {
        Some(templates)
    }
}

fn set_uses(params: &mut ParameterSet, value: &str, context: &SetterContext<'_>) -> bool {
    match parse_templates(value, context) {
        Some(templates) => {
            params.uses.extend(templates);
            true
        }
        None => false,
    }
}

fn set_not_uses(params: &mut ParameterSet, value: &str, context: &SetterContext<'_>) -> bool {
    match parse_templates(value, context) {
        Some(templates) => {
            params.not_uses.extend(templates);
            true
        }
        None => false,
    }
}

fn set_links_to(params: &mut ParameterSet, value: &str, context: &SetterContext<'_>) -> bool {
    match parse_titles(value, context) {
        Some(titles) => {
            params.links_to.push(titles);
            true
        }
        None => false,
    }
}

fn set_not_links_to(params: &mut ParameterSet, value: &str, context: &SetterContext<'_>) -> bool {
    match parse_titles(value, context) {
        Some(titles) => {
            params.not_links_to.extend(titles);
            true
        }
        None => false,
    }
}

fn set_links_from(params: &mut ParameterSet, value: &str, context: &SetterContext<'_>) -> bool {
    match parse_titles(value, context) {
        Some(titles) => {
            params.links_from.extend(titles);
            true
        }
        None => false,
    }
}

fn set_not_links_from(params: &mut ParameterSet, value: &str, context: &SetterContext<'_>) -> bool {
    match parse_titles(value, context) {
        Some(titles) => {
            params.not_links_from.extend(titles);
            true
        }
        None => false,
    }
}

fn set_title(params: &mut ParameterSet, value: &str, context: &SetterContext<'_>) -> bool {
    match context.namespaces.parse_title(value) {
        Some(title) => {
            params.titles.push(title.prefixed());
            true
        }
        None => false,
    }
}

fn set_title_match(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    let patterns = split_list(value, '|');
    if patterns.is_empty() {
        return false;
    }
    params.title_match.extend(patterns);
    true
}

fn set_not_title_match(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    let patterns = split_list(value, '|');
    if patterns.is_empty() {
        return false;
    }
    params.not_title_match.extend(patterns);
    true
}

fn set_title_lt(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    params.title_lt = Some(normalize_title(value));
    true
}

fn set_title_gt(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    params.title_gt = Some(normalize_title(value));
    true
}

fn set_redirects(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    params.redirects = match value.trim().to_ascii_lowercase().as_str() {
        "exclude" => Redirects::Exclude,
        "include" => Redirects::Include,
        "only" => Redirects::Only,
        _ => return false,
    };
    true
}

fn user_name(value: &str) -> Option<String> {
    let name = normalize_title(value);
    let name = name
        .strip_prefix(&Namespace::User.prefix())
        .map(str::to_string)
        .unwrap_or(name);
    if name.is_empty() { None } else { Some(name) }
}

fn set_created_by(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    params.created_by = user_name(value);
    params.created_by.is_some()
}

fn set_modified_by(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    params.modified_by = user_name(value);
    params.modified_by.is_some()
}

fn set_last_modified_by(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    params.last_modified_by = user_name(value);
    params.last_modified_by.is_some()
}

fn set_open_references(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    if value.trim().eq_ignore_ascii_case("missing") {
        params.open_references = OpenReferences::Missing;
        return true;
    }
    match parse_bool(value) {
        Some(true) => params.open_references = OpenReferences::Yes,
        Some(false) => params.open_references = OpenReferences::No,
        None => return false,
    }
    true
}

fn set_image_container(params: &mut ParameterSet, value: &str, context: &SetterContext<'_>) -> bool {
    match parse_titles(value, context) {
        Some(titles) => {
            params.image_container.extend(titles);
            true
        }
        None => false,
    }
}

/// Any digits become a 14-digit `YYYYMMDDHHMMSS` timestamp, right-padded with zeros.
pub fn parse_timestamp(value: &str) -> Option<String> {
    let mut digits = value
        .chars()
        .filter(char::is_ascii_digit)
        .take(14)
        .collect::<String>();
    if digits.is_empty() {
        return None;
    }
    while digits.len() < 14 {
        digits.push('0');
    }
    Some(digits)
}

fn set_timestamp(target: &mut Option<String>, value: &str) -> bool {
    *target = parse_timestamp(value);
    target.is_some()
}

fn set_all_revisions_before(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_timestamp(&mut params.revisions.all_before, value)
}

fn set_all_revisions_since(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_timestamp(&mut params.revisions.all_since, value)
}

fn set_first_revision_since(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_timestamp(&mut params.revisions.first_since, value)
}

fn set_last_revision_before(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_timestamp(&mut params.revisions.last_before, value)
}

fn set_minor_edits(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    params.minor_edits = match value.trim().to_ascii_lowercase().as_str() {
        "include" => Some(MinorEdits::Include),
        "exclude" => Some(MinorEdits::Exclude),
        _ => return false,
    };
    true
}

fn set_order_method(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    let methods = value
        .split(',')
        .map(OrderMethod::parse)
        .collect::<Option<Vec<_>>>();
    match methods {
        Some(methods) if !methods.is_empty() => {
            params.order_methods = methods;
            true
        }
        _ => false,
    }
}

fn set_order(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    params.order = match value.trim().to_ascii_lowercase().as_str() {
        "ascending" | "asc" => SortOrder::Ascending,
        "descending" | "desc" => SortOrder::Descending,
        _ => return false,
    };
    true
}

fn set_order_suit_symbols(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_flag(&mut params.order_suit_symbols, value)
}

fn set_count(params: &mut ParameterSet, value: &str, context: &SetterContext<'_>) -> bool {
    let Some(mut count) = parse_positive(value) else {
        return false;
    };
    if !context.limits.allow_unlimited_results {
        count = count.min(context.max_result_count);
    }
    params.count = Some(count);
    true
}

fn set_offset(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    match value.trim().parse::<usize>() {
        Ok(offset) => {
            params.offset = offset;
            true
        }
        Err(_) => false,
    }
}

fn set_random_count(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    params.random_count = parse_positive(value);
    params.random_count.is_some()
}

fn set_goal(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    params.goal = match value.trim().to_ascii_lowercase().as_str() {
        "pages" => Goal::Pages,
        "categories" => Goal::Categories,
        _ => return false,
    };
    true
}

fn set_mode(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    params.mode = match value.trim().to_ascii_lowercase().as_str() {
        "unordered" => ListMode::Unordered,
        "ordered" => ListMode::Ordered,
        "none" => ListMode::None,
        "inline" => ListMode::Inline,
        "category" => ListMode::Category,
        _ => return false,
    };
    true
}

fn set_heading_mode(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    params.heading_mode = match value.trim().to_ascii_lowercase().as_str() {
        "none" => HeadingMode::None,
        "unordered" => HeadingMode::Unordered,
        "ordered" => HeadingMode::Ordered,
        "definition" => HeadingMode::Definition,
        "h2" => HeadingMode::H2,
        "h3" => HeadingMode::H3,
        "h4" => HeadingMode::H4,
        _ => return false,
    };
    true
}

fn set_heading_count(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_flag(&mut params.heading_count, value)
}

fn set_inline_text(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    params.inline_text = value.to_string();
    true
}

fn set_escape_links(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_flag(&mut params.escape_links, value)
}

fn set_show_namespace(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_flag(&mut params.show_namespace, value)
}

fn set_title_max_length(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    params.title_max_length = parse_positive(value);
    params.title_max_length.is_some()
}

fn set_include(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    let labels = split_list(value, ',');
    if labels.is_empty() {
        return false;
    }
    params.section_labels.extend(labels);
    true
}

fn set_dominant_section(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    params.dominant_section = parse_positive(value);
    params.dominant_section.is_some()
}

fn set_results_header(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_text(&mut params.templates.results_header, value)
}

fn set_results_footer(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_text(&mut params.templates.results_footer, value)
}

fn set_one_result_header(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_text(&mut params.templates.one_result_header, value)
}

fn set_one_result_footer(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_text(&mut params.templates.one_result_footer, value)
}

fn set_no_results_header(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_text(&mut params.templates.no_results_header, value)
}

fn set_no_results_footer(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_text(&mut params.templates.no_results_footer, value)
}

fn set_add_page_touched_date(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_flag(&mut params.enrichment.page_touched_date, value)
}

fn set_add_first_category_date(
    params: &mut ParameterSet,
    value: &str,
    _: &SetterContext<'_>,
) -> bool {
    set_flag(&mut params.enrichment.first_category_date, value)
}

fn set_add_edit_date(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_flag(&mut params.enrichment.edit_date, value)
}

fn set_add_user(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_flag(&mut params.enrichment.user, value)
}

fn set_add_author(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_flag(&mut params.enrichment.author, value)
}

fn set_add_last_editor(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_flag(&mut params.enrichment.last_editor, value)
}

fn set_add_contribution(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_flag(&mut params.enrichment.contribution, value)
}

fn set_add_categories(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_flag(&mut params.enrichment.categories, value)
}

fn set_add_page_size(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_flag(&mut params.enrichment.page_size, value)
}

fn set_exec_and_exit(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_text(&mut params.exec_and_exit, value)
}

fn set_debug(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    match value.trim().parse::<u8>() {
        Ok(level) if level <= 5 => {
            params.debug = Some(level);
            true
        }
        _ => false,
    }
}

fn set_allow_cached_results(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_flag(&mut params.allow_cached_results, value)
}

fn set_cache_period(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    match value.trim().parse::<u64>() {
        Ok(seconds) => {
            params.cache_period = Some(seconds);
            true
        }
        Err(_) => false,
    }
}

fn set_skip_this_page(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_flag(&mut params.skip_this_page, value)
}

fn set_include_subpages(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    set_flag(&mut params.include_subpages, value)
}

/// Comma list of links, templates, categories, images, `all` or `none`.
pub fn parse_reset_targets(value: &str) -> Option<ResetTargets> {
    let mut targets = ResetTargets::default();
    for item in split_list(value, ',') {
        match item.to_ascii_lowercase().as_str() {
            "links" => targets.links = true,
            "templates" => targets.templates = true,
            "categories" => targets.categories = true,
            "images" => targets.images = true,
            "all" => {
                targets = ResetTargets {
                    links: true,
                    templates: true,
                    categories: true,
                    images: true,
                }
            }
            "none" => targets = ResetTargets::default(),
            _ => return None,
        }
    }
    Some(targets)
}

fn set_reset(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    match parse_reset_targets(value) {
        Some(targets) => {
            params.reset.merge(targets);
            true
        }
        None => false,
    }
}

fn set_eliminate(params: &mut ParameterSet, value: &str, _: &SetterContext<'_>) -> bool {
    match parse_reset_targets(value) {
        Some(targets) => {
            params.eliminate.merge(targets);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DplSection;

    fn apply_all(pairs: &[(&str, &str)]) -> (ParameterSet, Vec<String>) {
        let registry = ParameterRegistry::new(4);
        let namespaces = NamespaceTable::default();
        let limits = DplSection::default();
        let context = SetterContext {
            namespaces: &namespaces,
            limits: &limits,
            max_result_count: limits.max_result_count,
        };
        let mut params = ParameterSet::default();
        let mut rejected = Vec::new();
        for (name, value) in pairs {
            if !registry.apply(name, value, &mut params, &context) {
                rejected.push(format!("{name}={value}"));
            }
        }
        (params, rejected)
    }

    #[test]
    fn category_syntax_builds_tagged_groups() {
        let (params, rejected) = apply_all(&[
            ("category", "Card_games|Dice games"),
            ("category", "A&B"),
            ("category", "*Bridge*"),
            ("category", "~^Rules? .*$"),
            ("category", "_none_"),
            ("category", "+Openings"),
        ]);
        assert!(rejected.is_empty());
        let groups = &params.category.groups;
        assert_eq!(groups.len(), 6);
        assert_eq!(groups[0].operator, Operator::Or);
        assert!(groups[0].categories.contains("Card games"));
        assert!(groups[0].categories.contains("Dice games"));
        assert_eq!(groups[1].operator, Operator::And);
        assert_eq!(groups[2].comparison, Comparison::Like);
        assert!(groups[2].categories.contains("%Bridge%"));
        assert_eq!(groups[3].comparison, Comparison::Regexp);
        assert!(groups[4].includes_uncategorized());
        assert!(groups[5].categories.contains("Openings"));
        assert_eq!(params.total_categories(), 8);
    }

    #[test]
    fn only_a_leading_star_makes_a_like_pattern() {
        let (params, rejected) = apply_all(&[("category", "*Card*s"), ("category", "Card*s")]);
        assert!(rejected.is_empty());
        let groups = &params.category.groups;
        assert_eq!(groups[0].comparison, Comparison::Like);
        assert!(groups[0].categories.contains("%Card%s"));
        assert_eq!(groups[1].comparison, Comparison::Equal);
        assert!(groups[1].categories.contains("Card*s"));
    }

    #[test]
    fn mixed_comparisons_under_or_are_rejected() {
        let (params, rejected) = apply_all(&[("category", "A|*B")]);
        assert_eq!(rejected, vec!["category=A|*B".to_string()]);
        assert!(params.category.is_empty());

        let (params, rejected) = apply_all(&[("category", "A&*B")]);
        assert!(rejected.is_empty());
        assert_eq!(params.category.groups.len(), 2);
    }

    #[test]
    fn namespace_values_resolve_and_reject_unknown_names() {
        let (params, rejected) = apply_all(&[
            ("namespace", "Category|Template"),
            ("namespace", ""),
            ("namespace", "Nowhere"),
        ]);
        assert_eq!(params.namespaces, vec![14, 10, 0]);
        assert_eq!(rejected, vec!["namespace=Nowhere".to_string()]);
        assert!(params.selection_found);
    }

    #[test]
    fn setters_validate_enumerations_and_numbers() {
        let (params, rejected) = apply_all(&[
            ("ordermethod", "category,title"),
            ("ordermethod", "title,bogus"),
            ("order", "descending"),
            ("mode", "table"),
            ("headingmode", "H3"),
            ("count", "9000"),
            ("randomcount", "0"),
            ("debug", "7"),
            ("addeditdate", "yes"),
            ("allrevisionssince", "2024-01"),
            ("reset", "links,templates"),
            ("eliminate", "all"),
            ("uses", "Infobox|Template:Navbox"),
        ]);
        assert_eq!(
            params.order_methods,
            vec![OrderMethod::Category, OrderMethod::Title]
        );
        assert_eq!(params.order, SortOrder::Descending);
        assert_eq!(params.mode, ListMode::Unordered);
        assert_eq!(params.heading_mode, HeadingMode::H3);
        assert_eq!(params.count, Some(500));
        assert!(params.enrichment.edit_date);
        assert_eq!(
            params.revisions.all_since.as_deref(),
            Some("20240100000000")
        );
        assert!(params.reset.links && params.reset.templates && !params.reset.images);
        assert!(params.eliminate.images);
        assert_eq!(
            params.uses,
            vec!["Template:Infobox".to_string(), "Template:Navbox".to_string()]
        );
        assert_eq!(
            rejected,
            vec![
                "ordermethod=title,bogus".to_string(),
                "mode=table".to_string(),
                "randomcount=0".to_string(),
                "debug=7".to_string(),
            ]
        );
    }

    #[test]
    fn open_reference_conflicts_are_tracked() {
        let (params, _) = apply_all(&[("openreferences", "missing"), ("linksfrom", "Main Page")]);
        assert_eq!(params.open_references, OpenReferences::Missing);
        assert!(!params.open_ref_conflict);

        let (params, _) = apply_all(&[("openreferences", "yes"), ("addauthor", "true")]);
        assert!(params.open_ref_conflict);
    }

    #[test]
    fn richness_limits_availability() {
        let registry = ParameterRegistry::new(0);
        assert!(registry.exists("openreferences"));
        assert!(!registry.is_available("openreferences"));
        assert!(registry.is_available("category"));
        assert_eq!(registry.classify("nope"), None);
        assert!(registry.available_names().contains(&"count"));
        assert!(!registry.available_names().contains(&"uses"));
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        for value in ["true", "YES", "1", "on"] {
            assert_eq!(parse_bool(value), Some(true));
        }
        for value in ["false", "no", "0", "Off"] {
            assert_eq!(parse_bool(value), Some(false));
        }
        assert_eq!(parse_bool("maybe"), None);
    }
}
