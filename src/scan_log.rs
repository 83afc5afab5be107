use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::{broadcast, RwLock};

use crate::config::ACTIVITY_BUFFER_SIZE;

/// One line of operator-facing activity: admission decisions, stage
/// transitions, fallbacks, reconciler sweeps.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub source: ActivitySource,
    pub level: ActivityLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ActivitySource {
    Api,
    Orchestrator,
    Extractor,
    Inference,
    Reconciler,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Info,
    Warn,
    Error,
    Debug,
}

pub struct ScanLog {
    buffer: RwLock<VecDeque<ActivityEntry>>,
    sender: broadcast::Sender<ActivityEntry>,
}

impl Default for ScanLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanLog {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            buffer: RwLock::new(VecDeque::with_capacity(ACTIVITY_BUFFER_SIZE)),
            sender,
        }
    }

    pub async fn push(&self, entry: ActivityEntry) {
        let mut buf = self.buffer.write().await;
        if buf.len() >= ACTIVITY_BUFFER_SIZE {
            buf.pop_front();
        }
        buf.push_back(entry.clone());
        drop(buf);

        // No subscribers is fine.
        let _ = self.sender.send(entry);
    }

    /// Oldest first.
    pub async fn history(&self) -> Vec<ActivityEntry> {
        self.buffer.read().await.iter().cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEntry> {
        self.sender.subscribe()
    }

    pub async fn emit(&self, source: ActivitySource, level: ActivityLevel, message: impl Into<String>) {
        self.push(ActivityEntry {
            timestamp: Utc::now(),
            source,
            level,
            scan_id: None,
            message: message.into(),
        })
        .await;
    }

    pub async fn emit_for_scan(
        &self,
        source: ActivitySource,
        level: ActivityLevel,
        scan_id: &str,
        message: impl Into<String>,
    ) {
        self.push(ActivityEntry {
            timestamp: Utc::now(),
            source,
            level,
            scan_id: Some(scan_id.to_string()),
            message: message.into(),
        })
        .await;
    }
}
