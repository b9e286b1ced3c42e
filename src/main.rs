use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use ratatui::{buffer::Buffer, layout::Rect, widgets::Widget};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use dotbrowse::app::{App, ViewMode};
use dotbrowse::components::tree::TreeWidget;
use dotbrowse::config::{AppConfig, GeneralConfig, LogConfig, SearchConfig};
use dotbrowse::error::{AppError, Result};
use dotbrowse::event::{Event, EventHandler, SourceKind};
use dotbrowse::fs::path::normalize;
use dotbrowse::fs::probe::RealFs;
use dotbrowse::fs::walker::{walk_with, WalkContext, WalkError, WalkMetrics};
use dotbrowse::logging;

/// Browse managed, ignored and unmanaged dotfiles as a tree, with deep search.
#[derive(Parser, Debug)]
#[command(name = "dotbrowse", version, about)]
struct Cli {
    /// Explicit config file (highest priority after CLI flags)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "info" or "dotbrowse=debug" (RUST_LOG overrides)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify path lists and print the resulting tree
    Tree(TreeArgs),
    /// Walk directories for paths containing QUERY
    Walk(WalkArgs),
}

#[derive(Args, Debug)]
struct TreeArgs {
    /// File of newline-separated managed paths
    #[arg(long)]
    managed: Option<PathBuf>,

    /// File of newline-separated ignored paths
    #[arg(long)]
    ignored: Option<PathBuf>,

    /// File of newline-separated unmanaged paths
    #[arg(long)]
    unmanaged: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ViewMode::Managed)]
    view: ViewMode,

    /// Search input; deep-searches the disk in unmanaged/all views
    #[arg(long)]
    filter: Option<String>,

    /// Base directory (defaults to config, then $HOME)
    #[arg(long)]
    base: Option<PathBuf>,

    /// Output width in columns
    #[arg(long, default_value_t = 120)]
    width: u16,
}

#[derive(Args, Debug)]
struct WalkArgs {
    /// Print sorted results and metrics as JSON instead of streaming paths
    #[arg(long)]
    json: bool,

    /// Levels below each root (0 = unlimited)
    #[arg(long)]
    max_depth: Option<usize>,

    #[arg(long)]
    max_results: Option<usize>,

    /// Case-insensitive substring; blank matches everything
    query: String,

    #[arg(required = true)]
    roots: Vec<PathBuf>,
}

impl Cli {
    /// Flags that double as config values.
    fn overrides(&self) -> AppConfig {
        let mut cfg = AppConfig {
            log: LogConfig {
                level: self.log_level.clone(),
            },
            ..Default::default()
        };
        match &self.command {
            Command::Tree(args) => {
                cfg.general = GeneralConfig {
                    base_dir: args.base.as_ref().map(|p| p.display().to_string()),
                };
            }
            Command::Walk(args) => {
                cfg.search = SearchConfig {
                    max_depth: args.max_depth,
                    max_results: args.max_results,
                    ..Default::default()
                };
            }
        }
        cfg
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref(), Some(&cli.overrides()));
    logging::init(config.log_level())?;
    debug!(?config, "configuration loaded");

    match cli.command {
        Command::Tree(args) => run_tree(args, &config).await,
        Command::Walk(args) => run_walk(args, &config).await,
    }
}

async fn run_tree(args: TreeArgs, config: &AppConfig) -> Result<()> {
    let base = config
        .base_dir()
        .ok_or_else(|| AppError::InvalidPath("no base directory; pass --base".to_string()))?;
    if !base.is_dir() {
        return Err(AppError::InvalidPath(format!(
            "{} is not a directory",
            base.display()
        )));
    }
    let options = config.search_options()?;
    let idle = options.timeout + options.debounce + std::time::Duration::from_secs(1);

    let mut events = EventHandler::new();
    let mut app = App::new(&base, options, Arc::new(RealFs), events.sender());
    app.switch_view(args.view);

    let (managed, ignored, unmanaged) = tokio::try_join!(
        read_path_list(args.managed.as_deref()),
        read_path_list(args.ignored.as_deref()),
        read_path_list(args.unmanaged.as_deref()),
    )?;
    let tx = events.sender();
    for (kind, paths) in [
        (SourceKind::Managed, managed),
        (SourceKind::Ignored, ignored),
        (SourceKind::Unmanaged, unmanaged),
    ] {
        if let Some(paths) = paths {
            let _ = tx.send(Event::SourceLoaded { kind, paths });
        }
    }
    if let Some(query) = &args.filter {
        app.set_input(query);
    }

    app.settle(&mut events, idle).await;

    for line in render_rows(&app, args.width, config.use_icons()) {
        println!("{line}");
    }
    eprintln!("{}", summary(&app));
    if let Some((msg, _)) = &app.status_message {
        eprintln!("{msg}");
    }
    Ok(())
}

/// Newline-separated paths; blank lines skipped. `None` stays not-loaded.
async fn read_path_list(path: Option<&Path>) -> Result<Option<Vec<PathBuf>>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::InvalidPath(format!("{}: {e}", path.display())))?;
    Ok(Some(
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect(),
    ))
}

fn render_rows(app: &App, width: u16, use_icons: bool) -> Vec<String> {
    let rows = app.rows();
    if rows.is_empty() {
        return Vec::new();
    }
    let height = rows.len().min(u16::MAX as usize) as u16;
    let area = Rect::new(0, 0, width, height);
    let mut buf = Buffer::empty(area);
    TreeWidget::new(app.display_tree(), rows, use_icons).render(area, &mut buf);

    (0..height)
        .map(|y| {
            (0..width)
                .filter_map(|x| buf.cell((x, y)).map(|c| c.symbol().to_string()))
                .collect::<String>()
                .trim_end()
                .to_string()
        })
        .collect()
}

fn summary(app: &App) -> String {
    let mut line = format!("{} rows, view {}", app.rows().len(), app.view().label());
    let search = app.search_state();
    if let Some(metrics) = &search.last_metrics {
        line.push_str(&format!(
            ", search {} ({} matches in {} ms)",
            metrics.termination.label(),
            metrics.matches,
            metrics.elapsed.as_millis()
        ));
    }
    if !app.index().is_ready() {
        line.push_str(", classification incomplete");
    }
    line
}

#[derive(Serialize)]
struct WalkReport<'a> {
    results: &'a [PathBuf],
    metrics: &'a WalkMetrics,
    error: Option<String>,
}

async fn run_walk(args: WalkArgs, config: &AppConfig) -> Result<()> {
    let opts = config.search_options()?.walk;
    let cwd = std::env::current_dir()?;
    let roots: Vec<PathBuf> = args
        .roots
        .iter()
        .map(|root| normalize(&cwd.join(root)))
        .collect();

    let token = CancellationToken::new();
    let on_ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });
    let ctx = WalkContext::with_timeout(token, config.search_timeout());
    let query = args.query.clone();
    let stream = !args.json;
    let outcome = tokio::task::spawn_blocking(move || {
        // Plain output prints matches as they are found.
        walk_with(&query, &roots, &opts, &ctx, |path| {
            if stream {
                println!("{}", path.display());
            }
        })
    })
    .await
    .map_err(|e| WalkError::Worker(e.to_string()))?;

    if args.json {
        let report = WalkReport {
            results: &outcome.results,
            metrics: &outcome.metrics,
            error: outcome.error.as_ref().map(|e| e.to_string()),
        };
        let json = serde_json::to_string_pretty(&report).map_err(std::io::Error::from)?;
        println!("{json}");
    } else {
        let metrics = &outcome.metrics;
        eprintln!(
            "{} matches, {} roots, {} ms, {}",
            metrics.matches,
            metrics.roots_visited,
            metrics.elapsed.as_millis(),
            metrics.termination.label()
        );
    }

    match outcome.error {
        Some(err @ WalkError::Worker(_)) => Err(err.into()),
        Some(err) => {
            warn!(error = %err, "walk stopped early; results are partial");
            Ok(())
        }
        None => Ok(()),
    }
}
