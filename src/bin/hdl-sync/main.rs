//! hdl-sync CLI tool
//!
//! Command-line interface for mounting and watching HDL projects with hdl-sync.
//!
//! ## Commands
//!
//! - `scan <path>`: Mount the project once and print its module tree
//! - `watch <path>`: Keep the project graph in sync with the file system until Ctrl-C

use clap::{Parser, Subcommand};
use hdl_sync::{
    build_tool::FileListBuildTool,
    config::MonitorSettings,
    context::ProjectContext,
    event::Event,
    graph::{ModuleKey, ProjectGraph},
    sync::FileSyncEngine,
    watch::MonitorService,
    SyncError,
};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

#[derive(Parser)]
#[command(name = "hdl-sync")]
#[command(author, version, about = "Keep an HDL project graph in sync with its sources", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount a project once and print its module hierarchy
    Scan {
        /// Project root
        path: PathBuf,

        /// Project property file (default: <path>/property.json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Also list every unresolved instance
        #[arg(short, long)]
        verbose: bool,
    },

    /// Watch a project and keep its graph in sync
    Watch {
        /// Project root
        path: PathBuf,

        /// Project property file (default: <path>/property.json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Watch service settings (TOML)
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Mirror the project file list into this file
        #[arg(long)]
        filelist: Option<PathBuf>,

        /// Print every event, not only reports
        #[arg(short, long)]
        verbose: bool,
    },
}

fn print_tree(graph: &ProjectGraph) {
    fn walk(graph: &ProjectGraph, key: &ModuleKey, depth: usize, seen: &mut BTreeSet<ModuleKey>) {
        let Some(module) = graph.module(key) else {
            return;
        };
        println!("{}{}", "  ".repeat(depth), module.key());
        if !seen.insert(key.clone()) {
            return;
        }
        for instance in module.instances.values() {
            match instance.resolved.as_ref() {
                Some(child) => walk(graph, child, depth + 1, seen),
                None => println!(
                    "{}{} : {} (unresolved)",
                    "  ".repeat(depth + 1),
                    instance.name,
                    instance.type_name
                ),
            }
        }
        seen.remove(key);
    }

    let mut seen = BTreeSet::new();
    for top in graph.top_modules().iter() {
        walk(graph, top, 0, &mut seen);
    }
}

fn scan(path: &Path, config: Option<&Path>, verbose: bool) -> Result<(), SyncError> {
    let ctx = ProjectContext::open(path, config)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let files = FileSyncEngine::new(ctx.clone());
    runtime.block_on(files.mount());

    let graph = ctx.graph.read();
    println!("=== Hierarchy ===");
    print_tree(&graph);

    let stats = graph.stats();
    println!("\n=== Scan Results ===");
    println!("Files: {}", stats.files);
    println!("Modules: {}", stats.modules);
    println!("Instances: {}", stats.instances);
    println!("Unresolved: {}", stats.unhandled);

    if verbose {
        for pending in graph.unhandled_instances() {
            println!(
                "  {} in {}: no module named `{}`",
                pending.instance, pending.parent, pending.type_name
            );
        }
        for file in graph.files().filter(|f| !f.diagnostics.is_empty()) {
            for diagnostic in file.diagnostics.iter() {
                println!("  {}: {diagnostic}", file.path.display());
            }
        }
    }
    Ok(())
}

fn watch(
    path: &Path,
    config: Option<&Path>,
    settings: Option<&Path>,
    filelist: Option<PathBuf>,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = match settings {
        Some(settings) => MonitorSettings::load(settings)?,
        None => MonitorSettings::default(),
    };
    if filelist.is_some() {
        settings.filelist = filelist;
    }
    let config = config.unwrap_or(settings.config_file.as_path()).to_path_buf();

    let ctx = ProjectContext::open(path, Some(&config))?;
    if let Some(list) = settings.filelist.clone() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let tool = runtime.block_on(FileListBuildTool::load(list))?;
        ctx.build_tool.register(Arc::new(tool));
    }

    let events = ctx.notifier.subscribe();
    let event_handle = std::thread::spawn(move || {
        for event in events {
            match event {
                Event::Report(report) => println!("[{:?}] {}", report.level, report.message),
                Event::GraphChanged { .. } if verbose => println!("[Event] {event}"),
                Event::GraphChanged { .. } => {}
            }
        }
    });

    let service = MonitorService::new(ctx, settings)?;
    let stats = service.context().graph.read().stats();
    println!(
        "Watching {} ({} files, {} modules). Press Ctrl-C to stop.",
        path.display(),
        stats.files,
        stats.modules
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        println!("\nShutting down...");
        r.store(false, Ordering::SeqCst);
    })?;
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    drop(service);
    if event_handle.join().is_err() {
        eprintln!("Event printer thread panicked");
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            path,
            config,
            verbose,
        } => {
            scan(&path, config.as_deref(), verbose)?;
            Ok(())
        }
        Commands::Watch {
            path,
            config,
            settings,
            filelist,
            verbose,
        } => watch(
            &path,
            config.as_deref(),
            settings.as_deref(),
            filelist,
            verbose,
        ),
    }
}
