//! Core types used throughout the visit tracker.
//!
//! This module defines tab identity and lifecycle events, the per-tab
//! observation state, the outbound visit record with its metadata, and the
//! error type for the browser host surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::hasher::content_hash;

/// Browser tab identifier
pub type TabId = i64;

/// Version sent with every record: unversioned, the backend assigns one
pub const UNVERSIONED: i64 = 0;

/// Identity and location of a tab at a given moment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    /// Tab identifier
    pub id: TabId,
    /// Current URL (empty when the host does not expose it)
    #[serde(default)]
    pub url: String,
    /// Current page title
    #[serde(default)]
    pub title: String,
}

impl TabInfo {
    pub fn new(id: TabId, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            title: title.into(),
        }
    }
}

/// Tab lifecycle signals consumed by the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabEvent {
    /// Navigation in the tab reached the "complete" state
    NavigationCompleted(TabInfo),
    /// The tab became the focused tab
    Activated(TabInfo),
    /// The tab was closed
    Closed(TabId),
}

impl TabEvent {
    pub fn tab_id(&self) -> TabId {
        match self {
            TabEvent::NavigationCompleted(tab) | TabEvent::Activated(tab) => tab.id,
            TabEvent::Closed(id) => *id,
        }
    }
}

/// Observation state kept for each tab under observation
#[derive(Debug, Clone)]
pub struct TabVisitState {
    /// Tab identifier
    pub tab_id: TabId,
    /// When the current dwell period started
    pub started_at: Instant,
    /// Latest known URL
    pub url: String,
    /// Latest known title
    pub title: String,
}

impl TabVisitState {
    pub fn new(tab: &TabInfo, started_at: Instant) -> Self {
        Self {
            tab_id: tab.id,
            started_at,
            url: tab.url.clone(),
            title: tab.title.clone(),
        }
    }

    /// Wall-clock dwell between `started_at` and `now`
    pub fn dwell(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }
}

/// What caused a visit to qualify
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualificationTrigger {
    /// Settle delay after navigation-complete elapsed
    NavigationSettled,
    /// Focus moved away from the tab
    FocusLost,
    /// Recurring threshold timer fired for the focused tab
    Interval,
}

impl QualificationTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualificationTrigger::NavigationSettled => "navigation_settled",
            QualificationTrigger::FocusLost => "focus_lost",
            QualificationTrigger::Interval => "interval",
        }
    }
}

/// A visit that met the dwell threshold.
///
/// URL and title are copied at trigger time so that the record can still be
/// assembled after the tab has closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedVisit {
    pub tab_id: TabId,
    pub url: String,
    pub title: String,
    pub dwell: Duration,
    pub trigger: QualificationTrigger,
}

impl QualifiedVisit {
    pub fn from_state(state: &TabVisitState, dwell: Duration, trigger: QualificationTrigger) -> Self {
        Self {
            tab_id: state.tab_id,
            url: state.url.clone(),
            title: state.title.clone(),
            dwell,
            trigger,
        }
    }

    /// Whether content capture should wait before requesting the page
    pub fn capture_deferred(&self) -> bool {
        self.trigger == QualificationTrigger::FocusLost
    }
}

/// Cookie attached to the visited URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub session: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<f64>,
}

/// Bookmark node returned by a bookmark search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkNode {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Folders have no URL
    #[serde(default)]
    pub url: Option<String>,
}

/// One-shot geolocation fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
}

/// Entry of the host's ranked top-sites list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopSite {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// Browser history entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// Milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_visit_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit_count: Option<u32>,
}

/// User idle classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleState {
    #[default]
    Active,
    Idle,
    Locked,
}

impl IdleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdleState::Active => "active",
            IdleState::Idle => "idle",
            IdleState::Locked => "locked",
        }
    }
}

/// Contextual signals gathered at emission time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitMetadata {
    pub cookies: Vec<Cookie>,
    pub is_bookmarked: bool,
    pub geolocation: Option<GeoPosition>,
    pub top_sites: Vec<TopSite>,
    pub idle_state: IdleState,
    pub recent_history: Vec<HistoryItem>,
}

/// Outbound visit event.
///
/// Only constructible through [`VisitRecord::assemble`], which refuses empty
/// content and derives the hash from the content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitRecord {
    timestamp: DateTime<Utc>,
    url: String,
    title: String,
    content: String,
    content_hash: String,
    version: i64,
    metadata: VisitMetadata,
}

impl VisitRecord {
    /// Assemble a record, or `None` when `content` is empty
    pub fn assemble(
        visit: &QualifiedVisit,
        content: String,
        metadata: VisitMetadata,
        timestamp: DateTime<Utc>,
    ) -> Option<Self> {
        if content.is_empty() {
            return None;
        }

        Some(Self {
            timestamp,
            url: visit.url.clone(),
            title: visit.title.clone(),
            content_hash: content_hash(&content),
            content,
            version: UNVERSIONED,
            metadata,
        })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn metadata(&self) -> &VisitMetadata {
        &self.metadata
    }
}

/// Errors raised by the browser host surface
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Host call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Host disconnected")]
    Disconnected,

    #[error("Host reported an error: {0}")]
    Remote(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visit() -> QualifiedVisit {
        QualifiedVisit {
            tab_id: 7,
            url: "https://example.com".to_string(),
            title: "Example".to_string(),
            dwell: Duration::from_secs(1200),
            trigger: QualificationTrigger::Interval,
        }
    }

    #[test]
    fn test_assemble_rejects_empty_content() {
        let record = VisitRecord::assemble(&visit(), String::new(), VisitMetadata::default(), Utc::now());
        assert!(record.is_none());
    }

    #[test]
    fn test_assemble_sets_hash_and_version() {
        let record = VisitRecord::assemble(
            &visit(),
            "X".to_string(),
            VisitMetadata::default(),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(record.content_hash(), content_hash("X"));
        assert_eq!(record.version(), UNVERSIONED);
        assert_eq!(record.url(), "https://example.com");
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let metadata = VisitMetadata {
            geolocation: Some(GeoPosition {
                latitude: 52.5,
                longitude: 13.4,
            }),
            idle_state: IdleState::Locked,
            ..Default::default()
        };
        let record =
            VisitRecord::assemble(&visit(), "<html></html>".to_string(), metadata, Utc::now()).unwrap();

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["version"], 0);
        assert!(json["contentHash"].is_string());
        assert!(json["timestamp"].is_string());
        assert_eq!(json["metadata"]["isBookmarked"], false);
        assert_eq!(json["metadata"]["idleState"], "locked");
        assert_eq!(json["metadata"]["geolocation"]["latitude"], 52.5);
        assert!(json["metadata"]["topSites"].is_array());
        assert!(json["metadata"]["recentHistory"].is_array());
    }

    #[test]
    fn test_missing_geolocation_serializes_null() {
        let record = VisitRecord::assemble(
            &visit(),
            "body".to_string(),
            VisitMetadata::default(),
            Utc::now(),
        )
        .unwrap();

        let json = serde_json::to_value(&record).unwrap();
        assert!(json["metadata"]["geolocation"].is_null());
    }

    #[test]
    fn test_history_item_from_host_json() {
        let item: HistoryItem = serde_json::from_str(
            r#"{"id":"1","url":"https://a.test","title":"A","lastVisitTime":1700000000000.0,"visitCount":3,"typedCount":0}"#,
        )
        .unwrap();

        assert_eq!(item.last_visit_time, Some(1_700_000_000_000.0));
        assert_eq!(item.visit_count, Some(3));
    }

    #[test]
    fn test_event_tab_id() {
        let tab = TabInfo::new(12, "https://a.test", "A");
        assert_eq!(TabEvent::NavigationCompleted(tab.clone()).tab_id(), 12);
        assert_eq!(TabEvent::Activated(tab).tab_id(), 12);
        assert_eq!(TabEvent::Closed(9).tab_id(), 9);
    }

    #[test]
    fn test_focus_lost_defers_capture() {
        let mut v = visit();
        assert!(!v.capture_deferred());
        v.trigger = QualificationTrigger::FocusLost;
        assert!(v.capture_deferred());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dwell_measures_elapsed_time() {
        let state = TabVisitState::new(&TabInfo::new(1, "https://a.test", "A"), Instant::now());
        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(state.dwell(Instant::now()), Duration::from_secs(90));
    }
}
