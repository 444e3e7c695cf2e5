use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Local;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{DplConfig, DplSection};
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticLog};
use crate::host::{Host, SharedState, apply_end_resets};
use crate::index::UNCATEGORIZED_VIEW_NAME;
use crate::layout::{LayoutRenderer, LayoutRequest, ListLayout};
use crate::namespace::NamespaceTable;
use crate::parameters::{Goal, ParameterSet};
use crate::postprocess;
use crate::query::{self, ContentStore};
use crate::registry::{ParameterRegistry, SetterContext};
use crate::render::{self, Frame, RenderContext};
use crate::tokenizer::{resolve_url_arguments, tokenize};
use crate::validator::{ValidationContext, validate};

const EXEC_GET_URL_ARGS: &str = "geturlargs";
const URL_OFFSET: &str = "DPL_offset";
const URL_SCROLL_DIR: &str = "DPL_scrollDir";

static LIST_LAYOUT: ListLayout = ListLayout;

/// One directive invocation as handed over by the host.
#[derive(Debug, Clone, Default)]
pub struct InvocationRequest {
    pub input: String,
    pub url_args: BTreeMap<String, String>,
    /// Invoked as a parser function rather than a tag.
    pub function_mode: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvocationOutput {
    pub text: String,
    /// Navigation values for continuation links. Empty when no rows were rendered.
    pub scroll_variables: BTreeMap<String, String>,
    /// Every `DPL_*` request argument, echoed back for the host.
    pub url_variables: BTreeMap<String, String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs directive text through tokenizing, validation, query, layout and framing.
pub struct DirectiveParser<'a> {
    limits: DplSection,
    namespaces: NamespaceTable,
    registry: ParameterRegistry,
    store: &'a dyn ContentStore,
    layout: &'a dyn LayoutRenderer,
    shared: &'a SharedState,
}

impl<'a> DirectiveParser<'a> {
    pub fn new(config: &DplConfig, store: &'a dyn ContentStore, shared: &'a SharedState) -> Self {
        let limits = config.effective_limits();
        Self {
            registry: ParameterRegistry::new(limits.functional_richness),
            namespaces: config.namespaces(),
            limits,
            store,
            layout: &LIST_LAYOUT,
            shared,
        }
    }

    pub fn with_layout(mut self, layout: &'a dyn LayoutRenderer) -> Self {
        self.layout = layout;
        self
    }

    pub fn namespaces(&self) -> &NamespaceTable {
        &self.namespaces
    }

    pub fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    pub fn parse(&self, request: &InvocationRequest, host: &mut dyn Host) -> InvocationOutput {
        self.parse_with_rng(request, host, &mut rand::rng())
    }

    pub fn parse_with_rng<R>(
        &self,
        request: &InvocationRequest,
        host: &mut dyn Host,
        rng: &mut R,
    ) -> InvocationOutput
    where
        R: Rng + ?Sized,
    {
        let started = Instant::now();
        let mut run = Invocation {
            log: DiagnosticLog::new(self.limits.debug_level),
            frame: Frame::default(),
            body: String::new(),
            output: InvocationOutput {
                url_variables: request
                    .url_args
                    .iter()
                    .filter(|(key, _)| key.starts_with("DPL_"))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
                ..InvocationOutput::default()
            },
        };

        let document = host.current_document().clone();
        let page = document.title.prefixed();
        if self.shared.is_transcluding(&page) {
            run.log.add(Diagnostic::with_args(
                DiagnosticCode::TransclusionLoopDetected,
                [page],
            ));
            return run.finish(true);
        }
        if self.limits.run_from_protected_pages_only && !document.edit_protected {
            run.log.add(Diagnostic::with_args(
                DiagnosticCode::ProtectedPageRequired,
                [page],
            ));
            return run.finish(true);
        }

        let input = resolve_url_arguments(&request.input, &request.url_args);
        let directive = tokenize(&input, &self.registry, &mut run.log);
        let mut params = ParameterSet::default();
        let setter_context = SetterContext {
            namespaces: &self.namespaces,
            limits: &self.limits,
            max_result_count: self.limits.max_result_count,
        };
        for (name, values) in self.registry.sort_by_priority(&directive) {
            for value in values {
                if !self.registry.apply(name, value, &mut params, &setter_context) {
                    run.log.add(Diagnostic::with_args(
                        DiagnosticCode::ParameterRejectedValue,
                        [name, value.as_str()],
                    ));
                }
            }
        }
        if let Some(level) = params.debug {
            run.log.set_level(level);
        }
        if let Some(offset) = request
            .url_args
            .get(URL_OFFSET)
            .and_then(|value| value.trim().parse::<usize>().ok())
        {
            params.offset = offset;
        }

        if let Some(exit) = params.exec_and_exit.take() {
            debug!(exit = %exit, "execandexit short-circuit");
            run.output.text = if exit == EXEC_GET_URL_ARGS {
                String::new()
            } else {
                exit
            };
            return run.output;
        }

        let uncategorized_view_available = if params.includes_uncategorized() {
            match self.store.view_exists(UNCATEGORIZED_VIEW_NAME) {
                Ok(found) => found,
                Err(error) => {
                    run.log.add(Diagnostic::with_args(
                        DiagnosticCode::SqlBuildError,
                        [format!("{error:#}")],
                    ));
                    return run.finish(false);
                }
            }
        } else {
            false
        };
        let validation = ValidationContext {
            limits: &self.limits,
            uncategorized_view_available,
        };
        if let Err(fatal) = validate(&mut params, &validation, &mut run.log) {
            run.log.add(fatal);
            return run.finish(true);
        }

        let count_total = !self.limits.allow_unlimited_results
            && params.goal != Goal::Categories
            && params.templates.total_probe().contains("%TOTALPAGES%");
        let specification = query::build(&params, &self.limits, count_total);
        let result = match self.store.select(&specification) {
            Ok(result) => result,
            Err(error) => {
                run.log.add(Diagnostic::with_args(
                    DiagnosticCode::SqlBuildError,
                    [format!("{error:#}")],
                ));
                return run.finish(false);
            }
        };
        if let Some(statement) = &result.statement {
            run.log.add(Diagnostic::with_args(
                DiagnosticCode::QueryText,
                [statement.as_str()],
            ));
        }
        if result.rows.is_empty() {
            run.frame = render::no_results_frame(&params.templates);
            return run.finish(false);
        }

        let total = result.total;
        let rows = postprocess::process(result.rows, &params, Some(&document.title), rng);
        let layout = self
            .layout
            .render(&rows, &LayoutRequest::from_params(&params));
        let context = RenderContext {
            total: total.unwrap_or(layout.row_count),
            pages: layout.row_count,
            first: rows.first().map(|row| row.page.clone()),
            last: rows.last().map(|row| row.page.clone()),
            elapsed: started.elapsed(),
            timestamp: Local::now().format("%Y/%m/%d %H:%M:%S").to_string(),
            scroll_dir: request
                .url_args
                .get(URL_SCROLL_DIR)
                .cloned()
                .unwrap_or_default(),
            count: params.count,
        };
        run.frame = render::frame(&params.templates, &context);
        if run.log.level() == 5 {
            run.frame = run.frame.wrap_literal();
        }
        run.body = layout.text;
        run.output.scroll_variables = context.scroll_variables();

        if params.allow_cached_results {
            let seconds = params
                .cache_period
                .unwrap_or(self.limits.default_cache_period);
            host.set_cache_expiry(seconds);
        } else {
            host.disable_cache();
        }

        info!(
            page = %document.title.prefixed(),
            rows = layout.row_count,
            total = context.total,
            "rendered directive"
        );
        let output = run.finish(true);
        apply_end_resets(
            params.reset,
            params.eliminate,
            request.function_mode,
            &output.text,
            &self.namespaces,
            host,
            self.shared,
        );
        output
    }
}

/// Working state while a single invocation is assembled.
struct Invocation {
    log: DiagnosticLog,
    frame: Frame,
    body: String,
    output: InvocationOutput,
}

impl Invocation {
    fn finish(mut self, results: bool) -> InvocationOutput {
        if !results && self.frame.is_empty() {
            self.log.add(Diagnostic::new(DiagnosticCode::NoResults));
        }
        self.output.text = render::assemble(&self.log.messages(), &self.frame, &self.body);
        self.output.diagnostics = self.log.entries().to_vec();
        self.output
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use anyhow::{Result, bail};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::host::{CacheDecision, CurrentDocument, PostRenderHook, RecordingHost};
    use crate::parameters::OrderMethod;
    use crate::query::{QueryResult, QuerySpecification, ResultRow};

    #[derive(Default)]
    struct FakeStore {
        titles: Vec<&'static str>,
        fail: bool,
        calls: Cell<usize>,
        last: RefCell<Option<QuerySpecification>>,
    }

    impl FakeStore {
        fn with_titles(titles: &[&'static str]) -> Self {
            Self {
                titles: titles.to_vec(),
                ..Self::default()
            }
        }
    }

    impl ContentStore for FakeStore {
        fn view_exists(&self, _name: &str) -> Result<bool> {
            Ok(false)
        }

        fn select(&self, specification: &QuerySpecification) -> Result<QueryResult> {
            self.calls.set(self.calls.get() + 1);
            *self.last.borrow_mut() = Some(specification.clone());
            if self.fail {
                bail!("disk I/O error");
            }
            let namespaces = NamespaceTable::default();
            let rows = self
                .titles
                .iter()
                .filter_map(|title| namespaces.parse_title(title))
                .map(|page| ResultRow {
                    page,
                    exists: true,
                    ..ResultRow::default()
                })
                .collect::<Vec<_>>();
            Ok(QueryResult {
                total: specification.count_total.then_some(rows.len()),
                rows,
                statement: Some("SELECT 1".to_string()),
            })
        }
    }

    fn host(protected: bool) -> RecordingHost {
        RecordingHost::new(CurrentDocument {
            title: NamespaceTable::default()
                .parse_title("Main Page")
                .expect("title"),
            edit_protected: protected,
        })
    }

    fn request(input: &str) -> InvocationRequest {
        InvocationRequest {
            input: input.to_string(),
            ..InvocationRequest::default()
        }
    }

    fn run(config: &DplConfig, store: &FakeStore, request: &InvocationRequest) -> (InvocationOutput, RecordingHost) {
        let shared = SharedState::new();
        let mut host = host(false);
        let parser = DirectiveParser::new(config, store, &shared);
        let output = parser.parse_with_rng(request, &mut host, &mut StdRng::seed_from_u64(5));
        (output, host)
    }

    #[test]
    fn renders_rows_with_total_in_header() {
        let store = FakeStore::with_titles(&["Alpha", "Beta", "Gamma"]);
        let (output, host) = run(
            &DplConfig::default(),
            &store,
            &request("category=Foo\nordermethod=title\nresultsheader=%TOTALPAGES% pages\\n"),
        );
        assert_eq!(output.text, "3 pages\n* [[Alpha]]\n* [[Beta]]\n* [[Gamma]]");
        assert!(
            output
                .diagnostics
                .iter()
                .all(|diagnostic| diagnostic.code == DiagnosticCode::QueryText)
        );
        {
            let last = store.last.borrow();
            let spec = last.as_ref().expect("query ran");
            assert!(spec.count_total);
            assert_eq!(spec.order_methods, vec![OrderMethod::Title]);
        }
        assert_eq!(output.scroll_variables["DPL_firstTitle"], "Alpha");
        assert_eq!(output.scroll_variables["DPL_totalPages"], "3");
        assert_eq!(host.cache, Some(CacheDecision::Disabled));
        assert_eq!(host.hooks, vec![PostRenderHook::EndReset]);
    }

    #[test]
    fn exec_and_exit_skips_the_query() {
        let store = FakeStore::with_titles(&["Alpha"]);
        let (output, _) = run(
            &DplConfig::default(),
            &store,
            &request("category=Foo\nexecandexit=geturlargs"),
        );
        assert_eq!(output.text, "");

        let (output, _) = run(
            &DplConfig::default(),
            &store,
            &request("category=Foo\nexecandexit=Nothing to list"),
        );
        assert_eq!(output.text, "Nothing to list");
        assert_eq!(store.calls.get(), 0);
    }

    #[test]
    fn empty_directive_reports_missing_selection() {
        let store = FakeStore::with_titles(&["Alpha"]);
        let (output, host) = run(&DplConfig::default(), &store, &request(""));
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].code, DiagnosticCode::NoSelectionCriteria);
        assert!(output.text.starts_with("Fatal (no-selection-criteria)"));
        assert_eq!(store.calls.get(), 0);
        assert_eq!(host.cache, None);
    }

    #[test]
    fn transclusion_loop_stops_before_query() {
        let store = FakeStore::with_titles(&["Alpha"]);
        let shared = SharedState::new();
        shared.enter_transclusion("Main Page");
        let mut host = host(false);
        let config = DplConfig::default();
        let parser = DirectiveParser::new(&config, &store, &shared);
        let output = parser.parse(&request("category=Foo"), &mut host);
        assert_eq!(
            output.diagnostics[0].code,
            DiagnosticCode::TransclusionLoopDetected
        );
        assert!(output.text.contains("Main Page"));
        assert_eq!(store.calls.get(), 0);
    }

    #[test]
    fn protected_only_rejects_unprotected_pages() {
        let store = FakeStore::with_titles(&["Alpha"]);
        let mut config = DplConfig::default();
        config.dpl.run_from_protected_pages_only = true;
        let (output, _) = run(&config, &store, &request("category=Foo"));
        assert_eq!(output.diagnostics[0].code, DiagnosticCode::ProtectedPageRequired);
        assert_eq!(store.calls.get(), 0);

        let shared = SharedState::new();
        let mut protected = host(true);
        let parser = DirectiveParser::new(&config, &store, &shared);
        let output = parser.parse(&request("category=Foo"), &mut protected);
        assert_eq!(output.text, "* [[Alpha]]");
    }

    #[test]
    fn store_failure_becomes_fatal_diagnostic() {
        let store = FakeStore {
            fail: true,
            ..FakeStore::default()
        };
        let (output, _) = run(&DplConfig::default(), &store, &request("category=Foo"));
        let codes = output
            .diagnostics
            .iter()
            .map(|diagnostic| diagnostic.code)
            .collect::<Vec<_>>();
        assert_eq!(codes, vec![DiagnosticCode::SqlBuildError, DiagnosticCode::NoResults]);
        assert!(output.text.contains("disk I/O error"));
    }

    #[test]
    fn no_results_uses_dedicated_header_or_warns() {
        let store = FakeStore::default();
        let (output, _) = run(
            &DplConfig::default(),
            &store,
            &request("category=Foo\nnoresultsheader=None found (%TOTALPAGES%)"),
        );
        assert_eq!(output.text, "None found (0)");

        let (output, _) = run(&DplConfig::default(), &store, &request("category=Foo"));
        assert_eq!(output.text, "Warning (no-results): No results!\n");
        assert!(output.scroll_variables.is_empty());
    }

    #[test]
    fn url_arguments_fill_placeholders_and_offset() {
        let store = FakeStore::with_titles(&["Alpha"]);
        let request = InvocationRequest {
            input: "category=Foo\ncount={%DPL_count:2%}".to_string(),
            url_args: BTreeMap::from([
                ("DPL_offset".to_string(), "5".to_string()),
                ("title".to_string(), "Main Page".to_string()),
            ]),
            function_mode: false,
        };
        let (output, _) = run(&DplConfig::default(), &store, &request);
        let last = store.last.borrow();
        let spec = last.as_ref().expect("query ran");
        assert_eq!(spec.limit, Some(2));
        assert_eq!(spec.offset, 5);
        assert_eq!(
            output.url_variables,
            BTreeMap::from([("DPL_offset".to_string(), "5".to_string())])
        );
    }

    #[test]
    fn cached_results_set_expiry() {
        let store = FakeStore::with_titles(&["Alpha"]);
        let (_, host) = run(
            &DplConfig::default(),
            &store,
            &request("category=Foo\nallowcachedresults=true\ncacheperiod=60"),
        );
        assert_eq!(host.cache, Some(CacheDecision::Expires { seconds: 60 }));

        let (_, host) = run(
            &DplConfig::default(),
            &store,
            &request("category=Foo\nallowcachedresults=true"),
        );
        assert_eq!(host.cache, Some(CacheDecision::Expires { seconds: 3600 }));
    }

    #[test]
    fn highest_debug_level_shows_query_and_wraps_output() {
        let store = FakeStore::with_titles(&["Alpha"]);
        let (output, _) = run(
            &DplConfig::default(),
            &store,
            &request("category=Foo\ndebug=5"),
        );
        assert_eq!(
            output.text,
            "Query (query-text): SELECT 1\n<pre><nowiki>* [[Alpha]]</nowiki></pre>"
        );
    }

    #[test]
    fn rejected_values_warn_and_keep_defaults() {
        let store = FakeStore::with_titles(&["Alpha"]);
        let (output, _) = run(
            &DplConfig::default(),
            &store,
            &request("category=Foo\ncount=many"),
        );
        assert_eq!(output.diagnostics[0].code, DiagnosticCode::ParameterRejectedValue);
        assert!(output.text.ends_with("* [[Alpha]]"));
        assert_eq!(
            store.last.borrow().as_ref().map(|spec| spec.limit),
            Some(Some(DplConfig::default().dpl.max_result_count))
        );
    }
}
