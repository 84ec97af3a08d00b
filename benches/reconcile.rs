//! Performance benchmarks for incremental graph updates
//!
//! These benchmarks measure:
//! - Reconciling a re-parsed file against an already populated graph
//! - Lazy resolution when a widely instantiated module appears and disappears
//! - Mounting a generated project from disk
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use hdl_sync::{
    context::ProjectContext,
    graph::ProjectGraph,
    parser::{FastParse, LanguageId, MacroTable, RawModule},
    sync::FileSyncEngine,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FILES: usize = 200;

fn module_file(i: usize) -> FastParse {
    let mut module = RawModule::new(format!("m{i}"));
    for j in 0..8 {
        module = module.with_instance(format!("u{j}"), format!("m{}", (i + j + 1) % FILES));
    }
    module = module.with_instance("u_leaf", "leaf");
    FastParse {
        content: vec![module],
        macros: MacroTable::new(),
        language: LanguageId::Verilog,
    }
}

fn path_of(i: usize) -> PathBuf {
    PathBuf::from(format!("/prj/user/src/m{i}.v"))
}

fn populated_graph() -> ProjectGraph {
    let mut graph = ProjectGraph::default();
    for i in 0..FILES {
        let path = path_of(i);
        graph.create_file(&path, LanguageId::Verilog);
        graph.reconcile(&path, &module_file(i));
    }
    graph
}

fn bench_reconcile_single_file(c: &mut Criterion) {
    let graph = populated_graph();
    let path = path_of(7);
    let mut edited = module_file(7);
    edited.content[0] = edited.content[0].clone().with_instance("u_extra", "m42");

    c.bench_function("reconcile_single_file", |b| {
        b.iter_batched(
            || graph.clone(),
            |mut graph| graph.reconcile(&path, &edited),
            BatchSize::LargeInput,
        );
    });
}

fn bench_pending_drain(c: &mut Criterion) {
    let graph = populated_graph();
    let leaf = Path::new("/prj/user/src/leaf.v");
    let parsed = FastParse {
        content: vec![RawModule::new("leaf")],
        macros: MacroTable::new(),
        language: LanguageId::Verilog,
    };

    c.bench_function("pending_drain", |b| {
        b.iter_batched(
            || graph.clone(),
            |mut graph| {
                graph.create_file(leaf, LanguageId::Verilog);
                graph.reconcile(leaf, &parsed);
                graph.delete_file(leaf);
                graph
            },
            BatchSize::LargeInput,
        );
    });
}

fn setup_project() -> Result<(TempDir, PathBuf), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path().to_path_buf();
    let src = root.join("user/src");
    std::fs::create_dir_all(&src)?;
    for i in 0..FILES {
        let mut text = format!("module m{i}(input clk);\n");
        for j in 0..8 {
            text.push_str(&format!(
                "    m{} u{j} (.clk(clk));\n",
                (i + j + 1) % FILES
            ));
        }
        text.push_str("endmodule\n");
        std::fs::write(src.join(format!("m{i}.v")), text)?;
    }
    Ok((temp_dir, root))
}

fn bench_mount(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (_temp_dir, root) = setup_project().unwrap();

    c.bench_function("mount_project", |b| {
        b.to_async(&rt).iter(|| async {
            let ctx = ProjectContext::open(&root, None).unwrap();
            FileSyncEngine::new(ctx).mount().await
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .sample_size(50)
        .measurement_time(std::time::Duration::from_secs(10));
    targets =
        bench_reconcile_single_file,
        bench_pending_drain,
        bench_mount
}

criterion_main!(benches);
