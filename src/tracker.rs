//! Visit lifecycle tracking.
//!
//! The tracker owns the per-tab observation map and decides when a visit has
//! dwelt long enough to be recorded. Per tab the lifecycle is:
//!
//! `Unobserved → Observing → (Qualified) → Observing (reset) | Unobserved`
//!
//! - navigation-complete starts (or restarts) observation, then re-evaluates
//!   the tab once the settle delay has passed
//! - focus moving away flushes the previous tab: it is recorded if it dwelt
//!   long enough, and dropped either way
//! - a timer firing every threshold interval re-evaluates the focused tab and
//!   restarts its dwell after each qualification
//! - closing a tab drops its state without evaluation
//!
//! Qualified visits run through the [`VisitPipeline`] on their own task so the
//! tracker keeps handling events while content is captured and delivered.

use crate::config::TimingConfig;
use crate::host::BrowserHost;
use crate::pipeline::{PipelineOutcome, VisitPipeline};
use crate::policy::UrlPolicy;
use crate::types::{QualificationTrigger, QualifiedVisit, TabEvent, TabId, TabInfo, TabVisitState};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// Visit lifecycle state machine
pub struct VisitTracker {
    /// Browser host, queried for the focused tab
    host: Arc<dyn BrowserHost>,
    /// Pipeline run for every qualified visit
    pipeline: Arc<VisitPipeline>,
    /// URL ignore policy
    policy: Arc<UrlPolicy>,
    /// Minimum dwell, also the re-evaluation interval
    min_visit: Duration,
    /// Wait after navigation-complete before evaluating
    settle_delay: Duration,
    /// Observation state per tab
    visits: HashMap<TabId, TabVisitState>,
    /// Tab that last received focus
    focused: Option<TabId>,
    /// Settle notifications back into the event loop
    settle_tx: mpsc::UnboundedSender<TabId>,
    settle_rx: mpsc::UnboundedReceiver<TabId>,
    /// Pipelines still running
    in_flight: JoinSet<PipelineOutcome>,
    /// Number of qualifications so far
    qualified_total: u64,
}

impl VisitTracker {
    /// Create a new tracker
    pub fn new(
        timing: &TimingConfig,
        host: Arc<dyn BrowserHost>,
        pipeline: Arc<VisitPipeline>,
        policy: Arc<UrlPolicy>,
    ) -> Self {
        let (settle_tx, settle_rx) = mpsc::unbounded_channel();

        Self {
            host,
            pipeline,
            policy,
            min_visit: timing.min_visit(),
            settle_delay: timing.settle_delay(),
            visits: HashMap::new(),
            focused: None,
            settle_tx,
            settle_rx,
            in_flight: JoinSet::new(),
            qualified_total: 0,
        }
    }

    /// Seed state from the live focused tab
    pub async fn init(&mut self) {
        info!("Initializing visit tracker");

        match self.host.active_tab().await {
            Ok(Some(tab)) => {
                info!("Focused tab at startup: {} ({})", tab.id, tab.url);
                self.on_activated(tab);
            }
            Ok(None) => info!("No focused tab at startup"),
            Err(e) => warn!("Failed to query focused tab at startup: {}", e),
        }
    }

    /// Run the event loop until the event stream closes or `shutdown` resolves.
    ///
    /// Pipelines still in flight are awaited before returning.
    pub async fn run<F>(
        mut self,
        mut events: mpsc::UnboundedReceiver<TabEvent>,
        shutdown: F,
    ) -> TrackerStatus
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval_at(Instant::now() + self.min_visit, self.min_visit);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Visit tracker running (threshold {:?}, settle delay {:?})",
            self.min_visit, self.settle_delay
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        info!("Tab event stream closed");
                        break;
                    }
                },
                Some(tab_id) = self.settle_rx.recv() => self.on_settled(tab_id),
                at = ticker.tick() => self.evaluate_focused(at).await,
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    log_joined(joined);
                }
            }
        }

        self.drain().await;
        self.status()
    }

    /// Apply one tab lifecycle event
    pub fn handle_event(&mut self, event: TabEvent) {
        trace!("Tab {} event: {:?}", event.tab_id(), event);

        match event {
            TabEvent::NavigationCompleted(tab) => self.on_navigation_completed(tab),
            TabEvent::Activated(tab) => self.on_activated(tab),
            TabEvent::Closed(tab_id) => self.on_closed(tab_id),
        }
    }

    fn on_navigation_completed(&mut self, tab: TabInfo) {
        if self.policy.should_ignore(&tab.url) {
            if self.visits.remove(&tab.id).is_some() {
                debug!("Tab {} navigated to ignored URL, observation dropped", tab.id);
            }
            return;
        }

        debug!("Observing tab {}: {} ({})", tab.id, tab.title, tab.url);
        self.visits
            .insert(tab.id, TabVisitState::new(&tab, Instant::now()));
        self.schedule_settle(tab.id);
    }

    fn on_activated(&mut self, tab: TabInfo) {
        let previous = self.focused.replace(tab.id);

        if let Some(previous) = previous.filter(|id| *id != tab.id) {
            self.flush(previous);
        }

        if self.policy.should_ignore(&tab.url) {
            self.visits.remove(&tab.id);
            return;
        }

        if previous == Some(tab.id) {
            if let Some(state) = self.visits.get_mut(&tab.id) {
                state.url = tab.url;
                state.title = tab.title;
                return;
            }
        }

        info!("Focus changed to tab {}: {} ({})", tab.id, tab.title, tab.url);
        self.visits
            .insert(tab.id, TabVisitState::new(&tab, Instant::now()));
    }

    fn on_closed(&mut self, tab_id: TabId) {
        if self.visits.remove(&tab_id).is_some() {
            debug!("Tab {} closed, observation dropped", tab_id);
        }
        if self.focused == Some(tab_id) {
            self.focused = None;
        }
    }

    /// Evaluate a tab whose settle delay has elapsed
    pub fn on_settled(&mut self, tab_id: TabId) {
        let now = Instant::now();
        let visit = match self.visits.get_mut(&tab_id) {
            Some(state) => {
                let dwell = state.dwell(now);
                if dwell < self.min_visit {
                    trace!("Tab {} settled after {:?} dwell", tab_id, dwell);
                    return;
                }
                let visit =
                    QualifiedVisit::from_state(state, dwell, QualificationTrigger::NavigationSettled);
                state.started_at = now;
                visit
            }
            None => return,
        };

        self.qualify(visit);
    }

    /// Re-evaluate the focused tab against the dwell threshold.
    ///
    /// `at` is the timer deadline. Dwell is measured up to `at` and a
    /// qualified tab restarts its dwell at `at`, not after the host query.
    pub async fn evaluate_focused(&mut self, at: Instant) {
        let tab = match self.host.active_tab().await {
            Ok(Some(tab)) => tab,
            Ok(None) => {
                trace!("No focused tab to evaluate");
                return;
            }
            Err(e) => {
                warn!("Failed to query focused tab: {}", e);
                return;
            }
        };

        if self.policy.should_ignore(&tab.url) {
            return;
        }

        let visit = match self.visits.get_mut(&tab.id) {
            Some(state) => {
                state.url = tab.url;
                state.title = tab.title;

                let dwell = state.dwell(at);
                if dwell < self.min_visit {
                    trace!("Focused tab {} at {:?} dwell", tab.id, dwell);
                    return;
                }
                let visit = QualifiedVisit::from_state(state, dwell, QualificationTrigger::Interval);
                state.started_at = at;
                visit
            }
            None => {
                debug!("Focused tab {} was not observed, starting now", tab.id);
                self.visits.insert(tab.id, TabVisitState::new(&tab, at));
                return;
            }
        };

        self.qualify(visit);
    }

    /// Wait for every in-flight pipeline to finish
    pub async fn drain(&mut self) {
        if !self.in_flight.is_empty() {
            info!("Waiting for {} in-flight visit(s)", self.in_flight.len());
        }
        while let Some(joined) = self.in_flight.join_next().await {
            log_joined(joined);
        }
    }

    /// Whether a tab is currently under observation
    pub fn is_observing(&self, tab_id: TabId) -> bool {
        self.visits.contains_key(&tab_id)
    }

    /// Get tracker status
    pub fn status(&self) -> TrackerStatus {
        TrackerStatus {
            observed_tabs: self.visits.len(),
            focused_tab: self.focused,
            in_flight: self.in_flight.len(),
            qualified_total: self.qualified_total,
        }
    }

    /// Drop the previously focused tab, recording it if it qualified
    fn flush(&mut self, tab_id: TabId) {
        let state = match self.visits.remove(&tab_id) {
            Some(state) => state,
            None => return,
        };

        let dwell = state.dwell(Instant::now());
        if dwell >= self.min_visit {
            self.qualify(QualifiedVisit::from_state(
                &state,
                dwell,
                QualificationTrigger::FocusLost,
            ));
        } else {
            debug!("Tab {} lost focus after {:?}, not recorded", tab_id, dwell);
        }
    }

    fn schedule_settle(&self, tab_id: TabId) {
        let tx = self.settle_tx.clone();
        let delay = self.settle_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(tab_id);
        });
    }

    fn qualify(&mut self, visit: QualifiedVisit) {
        self.qualified_total += 1;
        info!(
            "Tab {} qualified ({}) after {:?}: {}",
            visit.tab_id,
            visit.trigger.as_str(),
            visit.dwell,
            visit.url
        );

        let pipeline = Arc::clone(&self.pipeline);
        self.in_flight
            .spawn(async move { pipeline.process(visit).await });
    }
}

fn log_joined(joined: Result<PipelineOutcome, JoinError>) {
    match joined {
        Ok(outcome) => trace!("Visit pipeline finished: {:?}", outcome),
        Err(e) => error!("Visit pipeline task failed: {}", e),
    }
}

/// Tracker status information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerStatus {
    pub observed_tabs: usize,
    pub focused_tab: Option<TabId>,
    pub in_flight: usize,
    pub qualified_total: u64,
}
