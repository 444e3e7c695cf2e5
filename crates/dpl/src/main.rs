use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use dpl_core::config::{DplConfig, load_config};
use dpl_core::host::{CurrentDocument, RecordingHost, SharedState};
use dpl_core::index::{
    StoredIndexStats, UNCATEGORIZED_VIEW_NAME, create_uncategorized_view, load_stored_index_stats,
    rebuild_index,
};
use dpl_core::pipeline::{DirectiveParser, InvocationRequest};
use dpl_core::registry::ParameterRegistry;
use dpl_core::runtime::{
    PathOverrides, REBUILD_HINT, ResolutionContext, ResolvedPaths, ensure_content_ready,
    ensure_index_ready, inspect_runtime, normalize_for_display, resolve_paths,
};
use dpl_core::store::SqliteStore;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "dpl",
    version,
    about = "Dynamic page lists over a local wiki content index"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            data_dir: cli.data_dir.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Render one directive against the content index")]
    Render(RenderArgs),
    Index(IndexArgs),
    #[command(about = "List the parameters available at the configured richness")]
    Params,
    #[command(about = "Show resolved paths and index state")]
    Status,
}

#[derive(Debug, Args)]
struct RenderArgs {
    #[arg(long, value_name = "FILE", help = "Directive text file (stdin when omitted)")]
    input: Option<PathBuf>,
    #[arg(long, default_value = "Main Page", help = "Title of the embedding document")]
    page: String,
    #[arg(long, help = "Treat the embedding document as edit-protected")]
    protected: bool,
    #[arg(
        long = "arg",
        value_name = "KEY=VALUE",
        value_parser = parse_key_value,
        help = "Request argument such as DPL_offset=20"
    )]
    args: Vec<(String, String)>,
    #[arg(long, help = "Invoke as a parser function instead of a tag")]
    function_mode: bool,
    #[arg(long, help = "Print the full invocation result as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct IndexArgs {
    #[command(subcommand)]
    command: IndexSubcommand,
}

#[derive(Debug, Subcommand)]
enum IndexSubcommand {
    Rebuild,
    Stats,
    #[command(name = "create-view", about = "Create the view used by uncategorized-page queries")]
    CreateView,
}

#[derive(Debug, Serialize)]
struct RenderReport<'a> {
    page: String,
    output: &'a dpl_core::pipeline::InvocationOutput,
    host: &'a RecordingHost,
    created_links: dpl_core::host::CreatedLinks,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_env("DPL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Render(args)) => run_render(&runtime, args),
        Some(Commands::Index(IndexArgs { command })) => match command {
            IndexSubcommand::Rebuild => run_index_rebuild(&runtime),
            IndexSubcommand::Stats => run_index_stats(&runtime),
            IndexSubcommand::CreateView => run_index_create_view(&runtime),
        },
        Some(Commands::Params) => run_params(&runtime),
        Some(Commands::Status) => run_status(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_render(runtime: &RuntimeOptions, args: RenderArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    ensure_index_ready(&paths)?;

    let input = match &args.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => io::read_to_string(io::stdin()).context("failed to read directive from stdin")?,
    };
    let namespaces = config.namespaces();
    let title = namespaces
        .parse_title(&args.page)
        .with_context(|| format!("invalid page title: {}", args.page))?;
    let store = SqliteStore::open(&paths.db_path, namespaces)?;
    let shared = SharedState::new();
    let parser = DirectiveParser::new(&config, &store, &shared);
    let mut host = RecordingHost::new(CurrentDocument {
        title,
        edit_protected: args.protected,
    });
    let request = InvocationRequest {
        input,
        url_args: args.args.into_iter().collect::<BTreeMap<_, _>>(),
        function_mode: args.function_mode,
    };
    debug!(page = %args.page, "rendering directive");
    let output = parser.parse(&request, &mut host);

    if args.json {
        let report = RenderReport {
            page: host.document.title.prefixed(),
            output: &output,
            host: &host,
            created_links: shared.created_links(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", output.text);
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_index_rebuild(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let status = inspect_runtime(&paths)?;
    ensure_content_ready(&paths, &status)?;
    let report = rebuild_index(&paths, &config.namespaces())?;

    println!("index rebuild");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("db_path: {}", report.db_path);
    println!("inserted_pages: {}", report.inserted_pages);
    println!("inserted_links: {}", report.inserted_links);
    println!("inserted_revisions: {}", report.inserted_revisions);
    println!("redirects: {}", report.redirects);
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_index_stats(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;

    println!("index stats");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!(
        "wiki_content_dir: {}",
        normalize_path(&paths.wiki_content_dir)
    );
    match load_stored_index_stats(&paths)? {
        Some(stored) => print_stored_index_stats("index", &stored),
        None => println!("index.storage: <not built> ({REBUILD_HINT})"),
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_index_create_view(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let created = create_uncategorized_view(&paths)?;
    if created {
        println!("Created view {UNCATEGORIZED_VIEW_NAME}");
    } else {
        println!("View {UNCATEGORIZED_VIEW_NAME} already exists");
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_params(runtime: &RuntimeOptions) -> Result<()> {
    let config = load_runtime_config(runtime)?;
    let registry = ParameterRegistry::new(config.functional_richness());
    println!("richness: {}", config.functional_richness());
    for definition in registry.available_definitions() {
        let mut flags = Vec::new();
        if definition.repeatable {
            flags.push("repeatable".to_string());
        }
        if let Some(priority) = definition.priority {
            flags.push(format!("priority={priority}"));
        }
        if flags.is_empty() {
            println!("param.{}: level {}", definition.name, definition.richness);
        } else {
            println!(
                "param.{}: level {} ({})",
                definition.name,
                definition.richness,
                flags.join(", ")
            );
        }
    }
    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths)?;

    println!("status");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("wiki_content_exists: {}", format_flag(status.wiki_content_exists));
    println!("db_path: {}", normalize_path(&paths.db_path));
    println!("db_exists: {}", format_flag(status.db_exists));
    println!(
        "db_size_bytes: {}",
        status
            .db_size_bytes
            .map(|size| size.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    );
    println!(
        "config_path: {} ({})",
        normalize_path(&paths.config_path),
        if status.config_exists {
            "found"
        } else {
            "missing"
        }
    );
    for warning in &status.warnings {
        println!("warning: {warning}");
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn print_stored_index_stats(prefix: &str, stats: &StoredIndexStats) {
    println!("{prefix}.indexed_pages: {}", stats.indexed_pages);
    println!("{prefix}.redirects: {}", stats.redirects);
    println!("{prefix}.revisions: {}", stats.revisions);
    for (kind, count) in &stats.links_by_kind {
        println!("{prefix}.links.{kind}: {count}");
    }
    if stats.by_namespace.is_empty() {
        println!("{prefix}.by_namespace: <empty>");
    } else {
        for (namespace, count) in &stats.by_namespace {
            println!("{prefix}.namespace.{namespace}: {count}");
        }
    }
    println!(
        "{prefix}.uncategorized_view: {}",
        format_flag(stats.uncategorized_view)
    );
}

fn load_runtime_config(runtime: &RuntimeOptions) -> Result<DplConfig> {
    let paths = resolve_runtime_paths(runtime)?;
    load_config(&paths.config_path)
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        data_dir: runtime.data_dir.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(format!("expected KEY=VALUE, got `{raw}`"));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("argument name is empty in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn normalize_path(path: &Path) -> String {
    normalize_for_display(path)
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
