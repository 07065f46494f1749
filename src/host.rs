//! Browser host surface.
//!
//! Every interaction with the browser (tab queries, in-page content requests,
//! cookie/bookmark/geolocation/top-sites/idle/history reads) goes through the
//! [`BrowserHost`] trait so that the tracker, capturer and enricher stay
//! independent of how the browser is reached.

use crate::types::{
    BookmarkNode, Cookie, GeoPosition, HistoryItem, HostError, IdleState, TabId, TabInfo, TopSite,
};
use serde::Serialize;

/// History search parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    /// Free-text filter, empty for all entries
    pub text: String,
    /// Lower bound in milliseconds since the Unix epoch
    pub start_time: f64,
    pub max_results: u32,
}

/// Asynchronous read surface of the host browser
#[async_trait::async_trait]
pub trait BrowserHost: Send + Sync {
    /// The tab that currently has focus in the last focused window
    async fn active_tab(&self) -> Result<Option<TabInfo>, HostError>;

    /// Ask the tab's page context for its serialized content
    async fn page_content(&self, tab_id: TabId) -> Result<String, HostError>;

    /// Cookies visible to `url`
    async fn cookies(&self, url: &str) -> Result<Vec<Cookie>, HostError>;

    /// Bookmarks matching `url`
    async fn search_bookmarks(&self, url: &str) -> Result<Vec<BookmarkNode>, HostError>;

    /// One-shot position fix, `None` when permission is denied
    async fn current_position(&self) -> Result<Option<GeoPosition>, HostError>;

    /// Host-ranked most visited sites
    async fn top_sites(&self) -> Result<Vec<TopSite>, HostError>;

    /// Idle classification using the given detection threshold
    async fn idle_state(&self, detection_interval_secs: u64) -> Result<IdleState, HostError>;

    /// History entries matching `query`
    async fn search_history(&self, query: &HistoryQuery) -> Result<Vec<HistoryItem>, HostError>;
}
