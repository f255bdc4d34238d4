//! Sync status cache

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Success,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub status: SyncStatus,
    pub last_sync: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SyncState {
    pub fn is_syncing(&self) -> bool {
        self.status == SyncStatus::Syncing
    }
}

/// Tracks the most recent backend sync
#[derive(Debug, Default)]
pub struct SyncTracker {
    state: RwLock<SyncState>,
}

impl SyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter `Syncing`. Returns false if a sync is already in flight.
    pub async fn begin(&self) -> bool {
        let mut state = self.state.write().await;
        if state.is_syncing() {
            return false;
        }
        state.status = SyncStatus::Syncing;
        state.error = None;
        true
    }

    pub async fn succeed(&self) {
        let mut state = self.state.write().await;
        let now = Utc::now();
        state.status = SyncStatus::Success;
        state.last_sync = Some(now);
        state.error = None;
        info!("Sync completed at {}", now);
    }

    /// Record a failed sync; `last_sync` keeps the last good time
    pub async fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        let mut state = self.state.write().await;
        warn!("Sync failed: {}", message);
        state.status = SyncStatus::Error;
        state.error = Some(message);
    }

    pub async fn state(&self) -> SyncState {
        self.state.read().await.clone()
    }

    /// Whether a new sync should start given the configured interval
    pub async fn is_due(&self, interval: Duration, now: DateTime<Utc>) -> bool {
        let state = self.state.read().await;
        if state.is_syncing() {
            return false;
        }
        match state.last_sync {
            Some(last) => now - last >= interval,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sync_lifecycle() {
        let tracker = SyncTracker::new();
        assert_eq!(tracker.state().await, SyncState::default());

        assert!(tracker.begin().await);
        assert!(!tracker.begin().await);
        assert_eq!(tracker.state().await.status, SyncStatus::Syncing);

        tracker.succeed().await;
        let state = tracker.state().await;
        assert_eq!(state.status, SyncStatus::Success);
        let last_sync = state.last_sync.unwrap();

        assert!(tracker.begin().await);
        tracker.fail("backend unreachable").await;
        let state = tracker.state().await;
        assert_eq!(state.status, SyncStatus::Error);
        assert_eq!(state.error.as_deref(), Some("backend unreachable"));
        assert_eq!(state.last_sync, Some(last_sync));

        assert!(tracker.begin().await);
        assert!(tracker.state().await.error.is_none());
    }

    #[tokio::test]
    async fn test_is_due() {
        let tracker = SyncTracker::new();
        let interval = Duration::seconds(300);
        let now = Utc::now();
        assert!(tracker.is_due(interval, now).await);

        tracker.begin().await;
        assert!(!tracker.is_due(interval, now).await);

        tracker.succeed().await;
        let last = tracker.state().await.last_sync.unwrap();
        assert!(!tracker.is_due(interval, last + Duration::seconds(10)).await);
        assert!(tracker.is_due(interval, last + Duration::seconds(300)).await);
    }
}
