//! In-memory doubles for the browser host and the visit sink.

use crate::dispatcher::{DispatchOutcome, VisitSink};
use crate::host::{BrowserHost, HistoryQuery};
use crate::types::{
    BookmarkNode, Cookie, GeoPosition, HistoryItem, HostError, IdleState, TabId, TabInfo, TopSite,
    VisitRecord,
};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct HostState {
    active: Option<TabInfo>,
    active_delays: VecDeque<Duration>,
    content: String,
    content_delay: Option<Duration>,
    cookies: Vec<Cookie>,
    bookmarks: Vec<BookmarkNode>,
    position: Option<GeoPosition>,
    top_sites: Vec<TopSite>,
    idle: IdleState,
    history: Vec<HistoryItem>,
    failing: HashSet<String>,
    captured_tabs: Vec<TabId>,
    idle_queries: Vec<u64>,
    history_queries: Vec<HistoryQuery>,
}

/// Scriptable [`BrowserHost`]. Failures are keyed by trait method name.
#[derive(Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut HostState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    fn check(&self, method: &str) -> Result<(), HostError> {
        if self.with(|s| s.failing.contains(method)) {
            Err(HostError::Remote(format!("{} unavailable", method)))
        } else {
            Ok(())
        }
    }

    pub fn set_active(&self, tab: Option<TabInfo>) {
        self.with(|s| s.active = tab);
    }

    /// Delay the next `active_tab` answer; queued delays apply in order
    pub fn delay_next_active_tab(&self, delay: Duration) {
        self.with(|s| s.active_delays.push_back(delay));
    }

    pub fn set_content(&self, content: &str) {
        self.with(|s| s.content = content.to_string());
    }

    pub fn set_content_delay(&self, delay: Duration) {
        self.with(|s| s.content_delay = Some(delay));
    }

    pub fn set_cookies(&self, cookies: Vec<Cookie>) {
        self.with(|s| s.cookies = cookies);
    }

    pub fn set_bookmarks(&self, bookmarks: Vec<BookmarkNode>) {
        self.with(|s| s.bookmarks = bookmarks);
    }

    pub fn set_position(&self, position: Option<GeoPosition>) {
        self.with(|s| s.position = position);
    }

    pub fn set_top_sites(&self, sites: Vec<TopSite>) {
        self.with(|s| s.top_sites = sites);
    }

    pub fn set_idle(&self, idle: IdleState) {
        self.with(|s| s.idle = idle);
    }

    pub fn set_history(&self, history: Vec<HistoryItem>) {
        self.with(|s| s.history = history);
    }

    pub fn fail(&self, method: &str) {
        self.with(|s| s.failing.insert(method.to_string()));
    }

    pub fn captured_tabs(&self) -> Vec<TabId> {
        self.with(|s| s.captured_tabs.clone())
    }

    pub fn idle_queries(&self) -> Vec<u64> {
        self.with(|s| s.idle_queries.clone())
    }

    pub fn history_queries(&self) -> Vec<HistoryQuery> {
        self.with(|s| s.history_queries.clone())
    }
}

#[async_trait::async_trait]
impl BrowserHost for FakeHost {
    async fn active_tab(&self) -> Result<Option<TabInfo>, HostError> {
        if let Some(delay) = self.with(|s| s.active_delays.pop_front()) {
            tokio::time::sleep(delay).await;
        }
        self.check("active_tab")?;
        Ok(self.with(|s| s.active.clone()))
    }

    async fn page_content(&self, tab_id: TabId) -> Result<String, HostError> {
        let delay = self.with(|s| {
            s.captured_tabs.push(tab_id);
            s.content_delay
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check("page_content")?;
        Ok(self.with(|s| s.content.clone()))
    }

    async fn cookies(&self, _url: &str) -> Result<Vec<Cookie>, HostError> {
        self.check("cookies")?;
        Ok(self.with(|s| s.cookies.clone()))
    }

    async fn search_bookmarks(&self, _url: &str) -> Result<Vec<BookmarkNode>, HostError> {
        self.check("search_bookmarks")?;
        Ok(self.with(|s| s.bookmarks.clone()))
    }

    async fn current_position(&self) -> Result<Option<GeoPosition>, HostError> {
        self.check("current_position")?;
        Ok(self.with(|s| s.position))
    }

    async fn top_sites(&self) -> Result<Vec<TopSite>, HostError> {
        self.check("top_sites")?;
        Ok(self.with(|s| s.top_sites.clone()))
    }

    async fn idle_state(&self, detection_interval_secs: u64) -> Result<IdleState, HostError> {
        self.with(|s| s.idle_queries.push(detection_interval_secs));
        self.check("idle_state")?;
        Ok(self.with(|s| s.idle))
    }

    async fn search_history(&self, query: &HistoryQuery) -> Result<Vec<HistoryItem>, HostError> {
        self.with(|s| s.history_queries.push(query.clone()));
        self.check("search_history")?;
        Ok(self.with(|s| s.history.clone()))
    }
}

/// [`VisitSink`] that keeps every record and answers with a fixed outcome
pub struct RecordingSink {
    records: Mutex<Vec<VisitRecord>>,
    outcome: DispatchOutcome,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::with_outcome(DispatchOutcome::Delivered {
            status: 200,
            body: serde_json::json!({"message": "ok"}),
        })
    }

    pub fn with_outcome(outcome: DispatchOutcome) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            outcome,
        }
    }

    pub fn records(&self) -> Vec<VisitRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl VisitSink for RecordingSink {
    async fn send(&self, record: VisitRecord) -> DispatchOutcome {
        self.records.lock().unwrap().push(record);
        self.outcome.clone()
    }
}
