//! Context enrichment.
//!
//! Gathers the six auxiliary signals attached to a visit record. All six reads
//! are issued concurrently and joined; each one falls back independently so a
//! failing signal never blocks or aborts the others.

use crate::config::{EnrichmentConfig, TimingConfig};
use crate::host::{BrowserHost, HistoryQuery};
use crate::types::{Cookie, GeoPosition, HistoryItem, HostError, IdleState, TopSite, VisitMetadata};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Context enricher over the browser host
pub struct ContextEnricher {
    host: Arc<dyn BrowserHost>,
    /// Idle detection threshold in seconds
    idle_threshold_secs: u64,
    history_window: chrono::Duration,
    history_max_results: u32,
    top_sites_limit: usize,
    /// Upper bound on each individual read
    call_timeout: Duration,
}

impl ContextEnricher {
    pub fn new(
        host: Arc<dyn BrowserHost>,
        timing: &TimingConfig,
        enrichment: &EnrichmentConfig,
    ) -> Self {
        Self {
            host,
            idle_threshold_secs: timing.idle_threshold_seconds,
            history_window: chrono::Duration::hours(enrichment.history_window_hours as i64),
            history_max_results: enrichment.history_max_results,
            top_sites_limit: enrichment.top_sites_limit,
            call_timeout: timing.host_call_timeout(),
        }
    }

    /// Gather all signals for `url` as of `at`
    pub async fn gather(&self, url: &str, at: DateTime<Utc>) -> VisitMetadata {
        let (cookies, is_bookmarked, geolocation, top_sites, idle_state, recent_history) = tokio::join!(
            self.cookies(url),
            self.is_bookmarked(url),
            self.geolocation(),
            self.top_sites(),
            self.idle_state(),
            self.recent_history(at),
        );

        debug!(
            "Enriched {}: {} cookies, bookmarked={}, geo={}, {} top sites, idle={}, {} history entries",
            url,
            cookies.len(),
            is_bookmarked,
            geolocation.is_some(),
            top_sites.len(),
            idle_state.as_str(),
            recent_history.len()
        );

        VisitMetadata {
            cookies,
            is_bookmarked,
            geolocation,
            top_sites,
            idle_state,
            recent_history,
        }
    }

    async fn cookies(&self, url: &str) -> Vec<Cookie> {
        self.read("cookies", self.host.cookies(url))
            .await
            .unwrap_or_default()
    }

    async fn is_bookmarked(&self, url: &str) -> bool {
        self.read("bookmarks", self.host.search_bookmarks(url))
            .await
            .map(|nodes| nodes.iter().any(|n| n.url.as_deref() == Some(url)))
            .unwrap_or(false)
    }

    async fn geolocation(&self) -> Option<GeoPosition> {
        self.read("geolocation", self.host.current_position())
            .await
            .flatten()
    }

    async fn top_sites(&self) -> Vec<TopSite> {
        let mut sites = self
            .read("top sites", self.host.top_sites())
            .await
            .unwrap_or_default();
        sites.truncate(self.top_sites_limit);
        sites
    }

    async fn idle_state(&self) -> IdleState {
        self.read("idle state", self.host.idle_state(self.idle_threshold_secs))
            .await
            .unwrap_or_default()
    }

    async fn recent_history(&self, at: DateTime<Utc>) -> Vec<HistoryItem> {
        let now_ms = at.timestamp_millis() as f64;
        let query = HistoryQuery {
            text: String::new(),
            start_time: (at - self.history_window).timestamp_millis() as f64,
            max_results: self.history_max_results,
        };

        let mut items = self
            .read("history", self.host.search_history(&query))
            .await
            .unwrap_or_default();
        items.retain(|item| matches!(item.last_visit_time, Some(t) if t <= now_ms));
        items.truncate(self.history_max_results as usize);
        items
    }

    /// Run one read with a timeout, logging and discarding any failure
    async fn read<T>(
        &self,
        signal: &str,
        call: impl Future<Output = Result<T, HostError>>,
    ) -> Option<T> {
        let result = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(HostError::Timeout(self.call_timeout)),
        };

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Signal '{}' unavailable, using fallback: {}", signal, e);
                None
            }
        }
    }
}
