use crate::stats::engine::StatisticsEngine;

use models::{CommandHistoryItem, Envelope, SessionExport, SessionStatistics};

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{RwLock, watch};

/// Shared handle to one session's statistics.
///
/// Only the monitor's draining task mutates it. Readers take the read lock
/// for the duration of a snapshot, so an export never sees a half-applied
/// update. Every change bumps the revision published by [`subscribe`].
///
/// [`subscribe`]: StatisticsService::subscribe
#[derive(Clone)]
pub struct StatisticsService {
    engine: Arc<RwLock<StatisticsEngine>>,
    revision: Arc<watch::Sender<u64>>,
}

impl StatisticsService {
    pub fn new(max_history: usize) -> Self {
        let (revision, _) = watch::channel(0);

        Self {
            engine: Arc::new(RwLock::new(StatisticsEngine::new(max_history))),
            revision: Arc::new(revision),
        }
    }

    pub(crate) async fn apply(&self, envelope: &Envelope) {
        let changed = self.engine.write().await.apply(envelope);
        if changed {
            self.bump();
        }
    }

    pub async fn reset(&self) {
        self.engine.write().await.reset();
        self.bump();
    }

    pub async fn statistics(&self) -> SessionStatistics {
        self.engine.read().await.statistics()
    }

    pub async fn export(&self) -> SessionExport {
        self.engine.read().await.export()
    }

    pub async fn history(&self) -> Vec<CommandHistoryItem> {
        self.engine.read().await.history().cloned().collect()
    }

    pub async fn error_patterns(&self) -> BTreeMap<String, u64> {
        self.engine.read().await.error_patterns().clone()
    }

    /// Revision counter, bumped after every applied change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision = revision.wrapping_add(1));
    }
}
