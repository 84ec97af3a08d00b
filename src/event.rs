//! Change signals and user-facing reports.
//!
//! The [`Notifier`] is the only way graph mutations become visible to downstream
//! consumers (tree views, build-tool panels, the CLI). Handlers never call into those
//! consumers directly; they signal, and each subscriber drains its own channel.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{channel, Receiver, Sender},
    },
};

/// Why the graph changed. Informational only: consumers are expected to redraw from
/// the graph itself rather than from the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeReason {
    FileAdded(PathBuf),
    FileUpdated(PathBuf),
    FileRemoved(PathBuf),
    /// Tracked path set changed; (added, removed) file counts
    Remounted(usize, usize),
    /// Initial population of the graph
    Mounted(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReportLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub level: ReportLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Graph changed, please redraw. `generation` strictly increases per notifier, so a
    /// consumer that already redrew at generation `n` may skip every signal `<= n`.
    GraphChanged {
        generation: u64,
        reason: ChangeReason,
    },
    Report(Report),
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Event::GraphChanged { generation, .. } => write!(f, "GraphChanged({generation})"),
            Event::Report(report) => write!(f, "Report({:?}: {})", report.level, report.message),
        }
    }
}

/// Observer list for graph-changed signals and reports.
///
/// Signalling with no subscribers is a no-op, and subscribers whose receiver was dropped
/// are pruned on the next delivery.
#[derive(Debug, Default)]
pub struct Notifier {
    subscribers: Mutex<Vec<Sender<Event>>>,
    generation: AtomicU64,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<Event> {
        let (tx, rx) = channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Register an existing sender, e.g. one shared with other event producers.
    pub fn attach(&self, tx: Sender<Event>) {
        self.subscribers.lock().push(tx);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn signal(&self, reason: ChangeReason) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("[Notifier] graph changed ({generation}): {:?}", reason);
        self.deliver(Event::GraphChanged { generation, reason });
    }

    pub fn report(&self, level: ReportLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            ReportLevel::Info => tracing::info!("{message}"),
            ReportLevel::Warn => tracing::warn!("{message}"),
            ReportLevel::Error => tracing::error!("{message}"),
        }
        self.deliver(Event::Report(Report { level, message }));
    }

    fn deliver(&self, event: Event) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
