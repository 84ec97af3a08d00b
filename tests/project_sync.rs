//! Integration tests for the sync engines (mount, edit, remount)
//!
//! These tests drive the public API the way a watcher would, without starting one:
//! - mounting a project with mixed Verilog and VHDL sources
//! - editing files and observing instance resolution follow the edits
//! - remounting after the property file moves the source roots

use hdl_sync::{
    build_tool::FileListBuildTool,
    context::ProjectContext,
    event::{ChangeReason, Event},
    graph::ModuleKey,
    sync::{ConfigSyncEngine, FileSyncEngine, RemountOutcome},
    SyncError,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::TempDir;
use test_log::test;

const TOP: &str = "module top(input clk);\n    core u_core (.clk(clk));\n    alu u_alu (.a(clk));\nendmodule\n";
const CORE: &str = "module core(input clk);\nendmodule\n";
const ALU: &str = "entity alu is\n    port (a : in std_logic);\nend entity;\n";

fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    path
}

/// Helper to create a project with the default layout (`user/src`, `user/sim`)
fn create_test_project() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().canonicalize().unwrap();
    write(&root, "user/src/top.v", TOP);
    write(&root, "user/src/core.v", CORE);
    write(&root, "user/src/alu.vhd", ALU);
    write(&root, "user/sim/tb.sv", "module tb;\n    top dut (.clk(clk));\nendmodule\n");
    write(&root, "docs/readme.v", "module outside; endmodule\n");
    (temp_dir, root)
}

#[test(tokio::test)]
async fn test_mount_resolves_across_files_and_languages() {
    let (_dir, root) = create_test_project();
    let ctx = ProjectContext::open(&root, None).unwrap();
    let files = FileSyncEngine::new(ctx.clone());

    assert_eq!(files.mount().await, 4);

    let graph = ctx.graph.read();
    assert!(graph.find_modules("outside").is_empty());
    let top = graph
        .module(&ModuleKey::new(root.join("user/src/top.v"), "top"))
        .unwrap();
    assert_eq!(
        top.instances["u_core"].resolved,
        Some(ModuleKey::new(root.join("user/src/core.v"), "core"))
    );
    assert_eq!(
        top.instances["u_alu"].resolved,
        Some(ModuleKey::new(root.join("user/src/alu.vhd"), "alu"))
    );
    assert!(graph.unhandled_instances().is_empty());
    assert_eq!(
        graph.top_modules(),
        vec![ModuleKey::new(root.join("user/sim/tb.sv"), "tb")]
    );
}

#[test(tokio::test)]
async fn test_edits_move_instances_in_and_out_of_pending() {
    let (_dir, root) = create_test_project();
    let ctx = ProjectContext::open(&root, None).unwrap();
    let files = FileSyncEngine::new(ctx.clone());
    files.mount().await;
    let top_key = ModuleKey::new(root.join("user/src/top.v"), "top");
    let top_id = ctx.graph.read().module(&top_key).unwrap().id;

    let core = write(&root, "user/src/core.v", "module core_v2(input clk);\nendmodule\n");
    files.change(&core).await.unwrap();
    {
        let graph = ctx.graph.read();
        let pending = graph.unhandled_instances();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].parent, top_key);
        assert_eq!(pending[0].type_name, "core");
        assert!(graph.module(&top_key).unwrap().unhandled.contains("u_core"));
    }

    write(&root, "user/src/core.v", CORE);
    files.change(&core).await.unwrap();
    let graph = ctx.graph.read();
    assert!(graph.unhandled_instances().is_empty());
    let top = graph.module(&top_key).unwrap();
    assert_eq!(top.id, top_id);
    assert!(top.instances["u_core"].is_resolved());
}

#[test(tokio::test)]
async fn test_unlink_and_re_add_a_definition() {
    let (_dir, root) = create_test_project();
    let ctx = ProjectContext::open(&root, None).unwrap();
    let files = FileSyncEngine::new(ctx.clone());
    files.mount().await;
    let events = ctx.notifier.subscribe();
    let alu = root.join("user/src/alu.vhd");

    std::fs::remove_file(&alu).unwrap();
    files.unlink(&alu).await.unwrap();
    assert_eq!(ctx.graph.read().unhandled_instances().len(), 1);

    write(&root, "user/src/alu.vhd", ALU);
    files.add(&alu).await.unwrap();
    assert!(ctx.graph.read().unhandled_instances().is_empty());

    let reasons = events
        .try_iter()
        .filter_map(|event| match event {
            Event::GraphChanged { reason, .. } => Some(reason),
            Event::Report(_) => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(
        reasons,
        vec![
            ChangeReason::FileRemoved(alu.clone()),
            ChangeReason::FileAdded(alu.clone())
        ]
    );
}

#[test(tokio::test)]
async fn test_change_outside_tracked_roots_is_rejected() {
    let (_dir, root) = create_test_project();
    let ctx = ProjectContext::open(&root, None).unwrap();
    let files = FileSyncEngine::new(ctx.clone());
    files.mount().await;
    let generation = ctx.notifier.generation();

    let result = files.change(&root.join("docs/readme.v")).await;
    assert!(matches!(result, Err(SyncError::UntrackedPath(_))));
    assert_eq!(ctx.notifier.generation(), generation);
}

#[test(tokio::test)]
async fn test_remount_updates_graph_and_file_list() {
    let (_dir, root) = create_test_project();
    write(&root, "rtl/fifo.v", "module fifo; endmodule\n");
    let list_path = root.join("build/files.f");
    let tool = Arc::new(FileListBuildTool::load(list_path.clone()).await.unwrap());
    let ctx = ProjectContext::open(&root, None)
        .unwrap()
        .with_build_tool(tool.clone());
    let files = FileSyncEngine::new(ctx.clone());
    files.mount().await;
    let config = ConfigSyncEngine::new(files, None);

    write(
        &root,
        "property.json",
        r#"{"arch": {"hardware": {"src": "rtl", "sim": "user/sim"}}}"#,
    );
    let outcome = config.update_config().await.unwrap();

    let removed = vec![
        root.join("user/src/alu.vhd"),
        root.join("user/src/core.v"),
        root.join("user/src/top.v"),
    ];
    assert_eq!(
        outcome,
        RemountOutcome::Remounted {
            added: vec![root.join("rtl/fifo.v")],
            removed,
        }
    );
    assert_eq!(
        ctx.graph.read().file_paths(),
        vec![root.join("rtl/fifo.v"), root.join("user/sim/tb.sv")]
    );
    assert_eq!(ctx.graph.read().unhandled_instances().len(), 1);
    assert_eq!(
        tool.files().await.into_iter().collect::<Vec<_>>(),
        vec![root.join("rtl/fifo.v")]
    );
    assert!(std::fs::read_to_string(&list_path)
        .unwrap()
        .ends_with("rtl/fifo.v\n"));

    assert_eq!(
        config.update_config().await.unwrap(),
        RemountOutcome::Unchanged
    );
}
