//! Tests for the file and config sync engines

use super::*;
use crate::{
    build_tool::BuildTool,
    context::ProjectContext,
    event::{Event, Report, ReportLevel},
    graph::ModuleKey,
    parser::{FastParse, FullParse, LanguageId, LanguageParser},
};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::{
    path::{Path, PathBuf},
    sync::{mpsc::Receiver, Arc},
};
use tempfile::TempDir;

const TOP: &str = "module top;\n    core u_core (.clk(clk));\nendmodule\n";
const CORE: &str = "module core(input clk);\nendmodule\n";

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    ctx: ProjectContext,
    events: Receiver<Event>,
}

impl Fixture {
    fn new(property: Option<&str>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        if let Some(property) = property {
            std::fs::write(root.join("property.json"), property).unwrap();
        }
        let ctx = ProjectContext::open(&root, None).unwrap();
        let events = ctx.notifier.subscribe();
        Fixture {
            _dir: dir,
            root,
            ctx,
            events,
        }
    }

    fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    fn files(&self) -> FileSyncEngine {
        FileSyncEngine::new(self.ctx.clone())
    }

    fn reports(&self) -> Vec<Report> {
        self.events
            .try_iter()
            .filter_map(|event| match event {
                Event::Report(report) => Some(report),
                Event::GraphChanged { .. } => None,
            })
            .collect()
    }
}

#[derive(Default)]
struct RecordingBuildTool {
    calls: Mutex<Vec<(&'static str, Vec<PathBuf>)>>,
}

impl BuildTool for RecordingBuildTool {
    fn name(&self) -> &str {
        "recording"
    }

    fn add_files(&self, files: Vec<PathBuf>) -> BoxFuture<'_, Result<(), SyncError>> {
        self.calls.lock().push(("add", files));
        Box::pin(async { Ok(()) })
    }

    fn del_files(&self, files: Vec<PathBuf>) -> BoxFuture<'_, Result<(), SyncError>> {
        self.calls.lock().push(("del", files));
        Box::pin(async { Ok(()) })
    }
}

/// Build tool whose file list cannot be written.
struct UnwritableBuildTool;

impl BuildTool for UnwritableBuildTool {
    fn name(&self) -> &str {
        "unwritable"
    }

    fn add_files(&self, _files: Vec<PathBuf>) -> BoxFuture<'_, Result<(), SyncError>> {
        Box::pin(async { Err(SyncError::PermissionDenied) })
    }

    fn del_files(&self, _files: Vec<PathBuf>) -> BoxFuture<'_, Result<(), SyncError>> {
        Box::pin(async { Err(SyncError::BuildTool("list is locked".to_string())) })
    }
}

#[derive(Default)]
struct FakeWatch {
    roots: Mutex<Vec<TrackedPathSet>>,
}

impl SourceWatch for FakeWatch {
    fn rewatch(&self, roots: &TrackedPathSet) -> Result<(), SyncError> {
        self.roots.lock().push(roots.clone());
        Ok(())
    }
}

struct FailingParser;

impl LanguageParser for FailingParser {
    fn fast(&self, path: &Path) -> Result<FastParse, SyncError> {
        Err(SyncError::ParseFailure(path.display().to_string()))
    }

    fn full(&self, path: &Path) -> Result<FullParse, SyncError> {
        Err(SyncError::ParseFailure(path.display().to_string()))
    }
}

#[tokio::test]
async fn test_add_populates_and_resolves_across_files() {
    let fx = Fixture::new(None);
    let top = fx.write("user/src/top.v", TOP);
    let core = fx.write("user/src/core.v", CORE);
    let files = fx.files();

    files.add(&top).await.unwrap();
    assert_eq!(fx.ctx.graph.read().unhandled_instances().len(), 1);
    files.add(&core).await.unwrap();

    let graph = fx.ctx.graph.read();
    let top_module = graph.module(&ModuleKey::new(&top, "top")).unwrap();
    assert_eq!(
        top_module.instances["u_core"].resolved,
        Some(ModuleKey::new(&core, "core"))
    );
    assert_eq!(graph.top_modules(), vec![ModuleKey::new(&top, "top")]);
    assert_eq!(fx.ctx.notifier.generation(), 2);
    assert!(fx.reports().is_empty());
}

#[tokio::test]
async fn test_add_with_failed_full_parse_keeps_empty_file() {
    let fx = Fixture::new(None);
    fx.ctx
        .parsers
        .registry()
        .insert(LanguageId::Verilog, Arc::new(FailingParser));
    let path = fx.write("user/src/broken.v", TOP);

    fx.files().on_add(&path).await;
    let graph = fx.ctx.graph.read();
    let file = graph.get_file(&path).expect("file stays registered");
    assert!(file.is_empty());
    let reports = fx.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].level, ReportLevel::Error);
    assert_eq!(fx.ctx.notifier.generation(), 1);
}

#[tokio::test]
async fn test_add_records_full_parse_diagnostics() {
    let fx = Fixture::new(None);
    let path = fx.write("user/src/half.v", "module ok;\nendmodule\nmodule dangling;\n");
    fx.files().add(&path).await.unwrap();
    let graph = fx.ctx.graph.read();
    let file = graph.get_file(&path).unwrap();
    assert_eq!(file.module_names().collect::<Vec<_>>(), vec!["ok"]);
    assert_eq!(file.diagnostics.len(), 1);
}

#[tokio::test]
async fn test_change_reconciles_in_place() {
    let fx = Fixture::new(None);
    let path = fx.write(
        "user/src/ab.v",
        "module a;\nendmodule\nmodule b;\nendmodule\n",
    );
    let files = fx.files();
    files.add(&path).await.unwrap();
    let b_id = fx.ctx.graph.read().module(&ModuleKey::new(&path, "b")).unwrap().id;

    fx.write(
        "user/src/ab.v",
        "module b(input clk);\nendmodule\nmodule c;\nendmodule\n",
    );
    files.change(&path).await.unwrap();

    let graph = fx.ctx.graph.read();
    let file = graph.get_file(&path).unwrap();
    assert_eq!(file.module_names().collect::<Vec<_>>(), vec!["b", "c"]);
    assert_eq!(file.modules["b"].id, b_id);
    assert_eq!(file.modules["b"].ports.len(), 1);
}

#[tokio::test]
async fn test_change_with_failed_fast_parse_leaves_file_untouched() {
    let fx = Fixture::new(None);
    let path = fx.write("user/src/top.v", TOP);
    let files = fx.files();
    files.add(&path).await.unwrap();
    let before = fx.ctx.graph.read().get_file(&path).cloned();
    let generation = fx.ctx.notifier.generation();

    fx.write("user/src/top.v", "module top;\n    core u_core (.clk(clk));\n");
    files.on_change(&path).await;

    assert_eq!(fx.ctx.graph.read().get_file(&path).cloned(), before);
    assert_eq!(fx.ctx.notifier.generation(), generation);
    let reports = fx.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].level, ReportLevel::Error);
}

#[tokio::test]
async fn test_change_on_untracked_path_is_silent() {
    let fx = Fixture::new(None);
    let path = fx.write("user/src/top.v", TOP);
    let files = fx.files();

    assert!(matches!(
        files.change(&path).await,
        Err(SyncError::UntrackedPath(_))
    ));
    files.on_change(&path).await;
    assert!(fx.ctx.graph.read().get_file(&path).is_none());
    assert!(fx.reports().is_empty());
    assert_eq!(fx.ctx.notifier.generation(), 0);
}

#[tokio::test]
async fn test_unlink_then_add_dir_and_unlink_dir() {
    let fx = Fixture::new(None);
    let top = fx.write("user/src/top.v", TOP);
    let core = fx.write("user/src/ip/core.v", CORE);
    fx.write("user/src/ip/readme.txt", "not hdl");
    let files = fx.files();

    assert_eq!(files.add_dir(&fx.root.join("user/src")).await.unwrap(), 2);
    assert_eq!(files.add_dir(&fx.root.join("user/src")).await.unwrap(), 0);

    files.unlink(&top).await.unwrap();
    assert!(fx.ctx.graph.read().get_file(&top).is_none());
    assert!(fx.ctx.graph.read().dependents(&ModuleKey::new(&core, "core")).is_empty());

    assert_eq!(files.unlink_dir(&fx.root.join("user/src/ip")).await.unwrap(), 1);
    assert_eq!(fx.ctx.graph.read().stats().files, 0);
}

#[tokio::test]
async fn test_mount_loads_tracked_roots() {
    let fx = Fixture::new(None);
    fx.write("user/src/top.v", TOP);
    fx.write("user/sim/core.v", CORE);
    fx.write("elsewhere/other.v", CORE);

    assert_eq!(fx.files().mount().await, 2);
    let graph = fx.ctx.graph.read();
    assert_eq!(graph.stats().modules, 2);
    assert!(graph.unhandled_instances().is_empty());
}

#[tokio::test]
async fn test_mount_reports_files_that_fail_to_parse() {
    let fx = Fixture::new(None);
    fx.ctx
        .parsers
        .registry()
        .insert(LanguageId::Verilog, Arc::new(FailingParser));
    let broken = fx.write("user/src/broken.v", TOP);
    fx.write("user/sim/tb.sv", "module tb; endmodule\n");

    assert_eq!(fx.files().mount().await, 2);
    let graph = fx.ctx.graph.read();
    assert!(graph.get_file(&broken).unwrap().is_empty());
    assert_eq!(graph.stats().modules, 1);
    let reports = fx.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].level, ReportLevel::Error);
    assert!(reports[0].message.contains("broken.v"));
}

const OLD_PROPERTY: &str =
    r#"{"arch": {"hardware": {"src": "src_old"}}, "library": {"common_path": "shared"}}"#;
const NEW_PROPERTY: &str =
    r#"{"arch": {"hardware": {"src": "src_new"}}, "library": {"common_path": "shared"}}"#;

fn remount_fixture() -> (Fixture, [PathBuf; 4]) {
    let fx = Fixture::new(Some(OLD_PROPERTY));
    let f1 = fx.write("src_old/f1.v", "module f1; endmodule\n");
    let f2 = fx.write("shared/f2.v", "module f2; endmodule\n");
    let f3 = fx.write("shared/f3.v", "module f3; endmodule\n");
    let f4 = fx.write("src_new/f4.v", "module f4; endmodule\n");
    (fx, [f1, f2, f3, f4])
}

#[tokio::test]
async fn test_update_config_with_same_paths_touches_nothing() {
    let (fx, _) = remount_fixture();
    let tool = Arc::new(RecordingBuildTool::default());
    fx.ctx.build_tool.register(tool.clone());
    let watch = Arc::new(FakeWatch::default());
    let files = fx.files();
    files.mount().await;
    let before = fx.ctx.graph.read().files().cloned().collect::<Vec<_>>();
    let generation = fx.ctx.notifier.generation();

    // Different text, same path set
    fx.write(
        "property.json",
        r#"{"library": {"common_path": "shared"}, "toolChain": "xilinx", "arch": {"hardware": {"src": "src_old"}}}"#,
    );
    let engine = ConfigSyncEngine::new(files, Some(watch.clone() as Arc<dyn SourceWatch>));
    assert_eq!(engine.update_config().await.unwrap(), RemountOutcome::Unchanged);

    assert_eq!(
        fx.ctx.graph.read().files().cloned().collect::<Vec<_>>(),
        before
    );
    assert!(tool.calls.lock().is_empty());
    assert!(watch.roots.lock().is_empty());
    assert_eq!(fx.ctx.notifier.generation(), generation);
}

#[tokio::test]
async fn test_update_config_remounts_diff_only() {
    let (fx, [f1, f2, f3, f4]) = remount_fixture();
    let tool = Arc::new(RecordingBuildTool::default());
    fx.ctx.build_tool.register(tool.clone());
    let watch = Arc::new(FakeWatch::default());
    let files = fx.files();
    assert_eq!(files.mount().await, 3);
    let id_of = |path: &Path, name: &str| {
        fx.ctx
            .graph
            .read()
            .module(&ModuleKey::new(path, name))
            .map(|m| m.id)
    };
    let (f2_id, f3_id) = (id_of(&f2, "f2"), id_of(&f3, "f3"));

    fx.write("property.json", NEW_PROPERTY);
    let engine = ConfigSyncEngine::new(files, Some(watch.clone() as Arc<dyn SourceWatch>));
    let outcome = engine.update_config().await.unwrap();
    assert_eq!(
        outcome,
        RemountOutcome::Remounted {
            added: vec![f4.clone()],
            removed: vec![f1.clone()],
        }
    );

    assert_eq!(
        fx.ctx.graph.read().file_paths(),
        vec![f2.clone(), f3.clone(), f4.clone()]
    );
    assert_eq!(id_of(&f2, "f2"), f2_id);
    assert_eq!(id_of(&f3, "f3"), f3_id);
    assert!(id_of(&f4, "f4").is_some());

    let mut calls = tool.calls.lock().clone();
    calls.sort();
    assert_eq!(calls, vec![("add", vec![f4]), ("del", vec![f1])]);
    let roots = watch.roots.lock().clone();
    assert_eq!(roots.len(), 1);
    assert!(roots[0].contains(&fx.root.join("src_new")));
    assert!(!roots[0].contains(&fx.root.join("src_old")));
    assert!(fx.reports().is_empty());
}

#[tokio::test]
async fn test_update_config_without_build_tool_still_updates_graph() {
    let (fx, [f1, _, _, f4]) = remount_fixture();
    let files = fx.files();
    files.mount().await;
    fx.write("property.json", NEW_PROPERTY);

    let engine = ConfigSyncEngine::new(files, None);
    engine.update_config().await.unwrap();
    let graph = fx.ctx.graph.read();
    assert!(graph.get_file(&f1).is_none());
    assert!(graph.get_file(&f4).is_some());
    let reports = fx.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].level, ReportLevel::Warn);
}

#[tokio::test]
async fn test_build_tool_failures_are_reported_as_build_tool_errors() {
    let (fx, [f1, _, _, f4]) = remount_fixture();
    fx.ctx.build_tool.register(Arc::new(UnwritableBuildTool));
    let files = fx.files();
    files.mount().await;
    fx.write("property.json", NEW_PROPERTY);

    let engine = ConfigSyncEngine::new(files, None);
    engine.update_config().await.unwrap();
    let graph = fx.ctx.graph.read();
    assert!(graph.get_file(&f1).is_none());
    assert!(graph.get_file(&f4).is_some());

    let mut messages = fx
        .reports()
        .into_iter()
        .inspect(|report| assert_eq!(report.level, ReportLevel::Error))
        .map(|report| report.message)
        .collect::<Vec<_>>();
    messages.sort();
    assert_eq!(
        messages,
        vec![
            SyncError::BuildTool("list is locked".to_string()).to_string(),
            SyncError::BuildTool(format!(
                "unwritable failed to sync files: {}",
                SyncError::PermissionDenied
            ))
            .to_string(),
        ]
    );
}

#[tokio::test]
async fn test_broken_config_reports_and_keeps_live_config() {
    let (fx, _) = remount_fixture();
    let files = fx.files();
    files.mount().await;
    let before = fx.ctx.config.read().tracked_paths();

    fx.write("property.json", "{ \"arch\": ");
    let engine = ConfigSyncEngine::new(files, None);
    engine.on_change(&fx.root.join("property.json")).await;

    assert_eq!(fx.ctx.config.read().tracked_paths(), before);
    assert_eq!(fx.ctx.graph.read().stats().files, 3);
    let reports = fx.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].level, ReportLevel::Error);
}

#[tokio::test]
async fn test_dispatcher_routes_and_filters() {
    let fx = Fixture::new(None);
    let top = fx.write("user/src/top.v", TOP);
    let outside = fx.write("elsewhere/core.v", CORE);
    let notes = fx.write("user/src/notes.md", "# notes");
    let files = fx.files();
    let dispatcher = SyncDispatcher::new(files.clone(), ConfigSyncEngine::new(files, None));

    dispatcher
        .dispatch(&WatchEvent::source(FsEventKind::Add, &top))
        .await;
    dispatcher
        .dispatch(&WatchEvent::source(FsEventKind::Add, &outside))
        .await;
    dispatcher
        .dispatch(&WatchEvent::source(FsEventKind::Add, &notes))
        .await;
    // Not the project's property file
    dispatcher
        .dispatch(&WatchEvent::config(
            FsEventKind::Change,
            fx.root.join("other.json"),
        ))
        .await;

    assert_eq!(fx.ctx.graph.read().file_paths(), vec![top.clone()]);
    assert_eq!(fx.ctx.notifier.generation(), 1);

    dispatcher
        .dispatch(&WatchEvent::source(FsEventKind::Unlink, &top))
        .await;
    assert_eq!(fx.ctx.graph.read().stats().files, 0);
}
