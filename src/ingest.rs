use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::trace;

use crate::query::SearchQuery;
use crate::record::SearchRecord;
use crate::transfer::ShareIndex;

/// Push interface the network collaborator drives. Implementations must
/// be callable from any thread; they never touch the tree directly.
pub trait ResultSink: Send + Sync {
    fn on_result(&self, record: SearchRecord);
}

/// Producer-side accept/reject tallies, shared with the status display.
#[derive(Debug, Default)]
pub struct FilterStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl FilterStats {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.accepted.store(0, Ordering::Relaxed);
        self.rejected.store(0, Ordering::Relaxed);
    }
}

/// Acceptance policy for one search session.
#[derive(Clone)]
pub struct AcceptConfig {
    pub query: SearchQuery,
    pub token: String,
    pub hide_shared: bool,
    pub free_slots_only: bool,
}

/// Thread-safe staging entry point: applies the acceptance predicate on
/// the producer's thread and hands accepted records to the owner context
/// over a channel. Rejections are counted, never surfaced as errors.
pub struct ResultInbox {
    config: AcceptConfig,
    share: Option<Arc<dyn ShareIndex + Send + Sync>>,
    stop: Arc<AtomicBool>,
    stats: Arc<FilterStats>,
    tx: Sender<SearchRecord>,
}

impl ResultInbox {
    pub fn new(
        config: AcceptConfig,
        share: Option<Arc<dyn ShareIndex + Send + Sync>>,
        stop: Arc<AtomicBool>,
        stats: Arc<FilterStats>,
    ) -> (Self, Receiver<SearchRecord>) {
        let (tx, rx) = unbounded();
        (
            Self {
                config,
                share,
                stop,
                stats,
                tx,
            },
            rx,
        )
    }

    fn accepts(&self, record: &SearchRecord) -> bool {
        if self.config.query.is_empty() || self.stop.load(Ordering::SeqCst) {
            return false;
        }

        // results from a superseded search still carry the old token
        if !record.token.is_empty() && record.token != self.config.token {
            return false;
        }

        if !self.config.query.matches(record) {
            return false;
        }

        if self.config.hide_shared && record.is_file() {
            if let (Some(share), Some(hash)) = (&self.share, &record.hash) {
                if share.is_content_shared(hash) {
                    return false;
                }
            }
        }

        if self.config.free_slots_only && record.free_slots == 0 {
            return false;
        }

        true
    }
}

impl ResultSink for ResultInbox {
    fn on_result(&self, record: SearchRecord) {
        if self.accepts(&record) {
            self.stats.accepted.fetch_add(1, Ordering::Relaxed);
            let _ = self.tx.send(record);
        } else {
            trace!("result rejected: {}", record.path);
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Long-lived sink the network collaborator holds across searches. Each
/// new search installs a fresh inbox; between sessions records fall
/// through.
#[derive(Clone, Default)]
pub struct SinkHandle {
    inner: Arc<Mutex<Option<ResultInbox>>>,
}

impl SinkHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, inbox: ResultInbox) {
        let mut guard = self.inner.lock().unwrap_or_else(|err| err.into_inner());
        *guard = Some(inbox);
    }

    pub fn uninstall(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(|err| err.into_inner());
        *guard = None;
    }
}

impl ResultSink for SinkHandle {
    fn on_result(&self, record: SearchRecord) {
        let guard = self.inner.lock().unwrap_or_else(|err| err.into_inner());
        if let Some(inbox) = guard.as_ref() {
            inbox.on_result(record);
        }
    }
}
