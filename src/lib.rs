//! # hdl-sync
//!
//! Incremental synchronization between the HDL sources of a hardware project and an
//! in-memory structural model of that project.
//!
//! ## Overview
//!
//! hdl-sync keeps a **project graph** (files, the modules they define, and the instances
//! those modules contain) consistent with a directory tree of Verilog, SystemVerilog and
//! VHDL sources while the user edits them. Only the changed file is re-parsed; the result
//! is diffed against what the graph already holds and patched in place, so module
//! identities and cross-file instance resolutions survive edits.
//!
//! ### Key Features
//!
//! - **Incremental reconcile**: create, update and delete modules by name, keep ids stable
//! - **Lazy resolution**: instances whose type is not defined yet wait in a pending queue
//!   and bind as soon as a module with that name appears anywhere in the project
//! - **Config remount**: a change to the project property file that moves the source
//!   roots rebuilds the watch set and diffs the file list against a build tool
//! - **Change notifications**: every mutation bumps a generation counter and is broadcast
//!   to subscribers
//!
//! ## Architecture
//!
//! - **[`parser`]**: the [`ParseAdapter`](parser::ParseAdapter) and the built-in
//!   Verilog/SystemVerilog and VHDL scanners
//! - **[`graph`]**: [`ProjectGraph`](graph::ProjectGraph) and its reconcile algorithm
//! - **[`config`]**: the project property file and the tracked path set derived from it
//! - **[`sync`]**: [`FileSyncEngine`](sync::FileSyncEngine) and
//!   [`ConfigSyncEngine`](sync::ConfigSyncEngine)
//! - **[`event`]**: the [`Notifier`](event::Notifier) that broadcasts graph changes and reports
//! - **[`build_tool`]**: the optional build tool integration told about remounted files
//! - **`watch`**: [`MonitorService`](watch::MonitorService), the debounced file watchers
//!   that drive the engines (requires the `service` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hdl_sync::{context::ProjectContext, sync::FileSyncEngine};
//! use std::path::Path;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = ProjectContext::open(Path::new("./my_project"), None)?;
//!     let files = FileSyncEngine::new(ctx.clone());
//!     files.mount().await;
//!
//!     for module in ctx.graph.read().modules() {
//!         println!("{} ({} instances)", module.key(), module.instances.len());
//!     }
//!     for pending in ctx.graph.read().unhandled_instances() {
//!         println!("unresolved: {} in {}", pending.type_name, pending.parent);
//!     }
//!
//!     // After the user saves a file:
//!     files.change(Path::new("./my_project/user/src/top.v")).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **default**: parsers, graph, config and sync engines
//! - **service**: file watching (`notify`) and [`watch::MonitorService`]
//! - **bin**: the `hdl-sync` command line tool

pub mod build_tool;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod graph;
pub mod parser;
pub mod paths;
pub mod sync;
#[cfg(feature = "service")]
pub mod watch;

pub use error::*;
