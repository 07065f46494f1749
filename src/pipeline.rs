//! Visit event assembly.
//!
//! Runs once per qualified visit: policy re-check, optional capture deferral,
//! content capture, fingerprinting, context enrichment, record assembly and
//! dispatch. The pipeline only sees the url/title snapshot taken when the visit
//! qualified, so it never touches tracker state.

use crate::capture::ContentCapturer;
use crate::dispatcher::{DispatchOutcome, VisitSink};
use crate::enricher::ContextEnricher;
use crate::policy::UrlPolicy;
use crate::types::{QualifiedVisit, VisitRecord};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// How a pipeline run ended
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// URL matched the ignore policy at emission time
    Ignored,
    /// Capture returned nothing, no record was assembled
    EmptyContent,
    /// Record was handed to the sink
    Dispatched(DispatchOutcome),
}

/// Capture → hash → enrich → dispatch for qualified visits
pub struct VisitPipeline {
    capturer: ContentCapturer,
    enricher: ContextEnricher,
    sink: Arc<dyn VisitSink>,
    policy: Arc<UrlPolicy>,
    /// Wait before capturing a tab that just lost focus
    capture_defer: Duration,
}

impl VisitPipeline {
    pub fn new(
        capturer: ContentCapturer,
        enricher: ContextEnricher,
        sink: Arc<dyn VisitSink>,
        policy: Arc<UrlPolicy>,
        capture_defer: Duration,
    ) -> Self {
        Self {
            capturer,
            enricher,
            sink,
            policy,
            capture_defer,
        }
    }

    /// Process one qualified visit to completion
    pub async fn process(&self, visit: QualifiedVisit) -> PipelineOutcome {
        if self.policy.should_ignore(&visit.url) {
            debug!("Dropping qualified visit to ignored URL {}", visit.url);
            return PipelineOutcome::Ignored;
        }

        if visit.capture_deferred() {
            tokio::time::sleep(self.capture_defer).await;
        }

        let content = self.capturer.capture(visit.tab_id).await;
        if content.is_empty() {
            info!(
                "No content captured for tab {} ({}), skipping visit",
                visit.tab_id, visit.url
            );
            return PipelineOutcome::EmptyContent;
        }

        let timestamp = chrono::Utc::now();
        let metadata = self.enricher.gather(&visit.url, timestamp).await;

        let record = match VisitRecord::assemble(&visit, content, metadata, timestamp) {
            Some(record) => record,
            None => return PipelineOutcome::EmptyContent,
        };

        info!(
            "📥 Qualified visit ({}): {} - {} ({} chars, dwell {:?})",
            visit.trigger.as_str(),
            record.url(),
            record.title(),
            record.content().len(),
            visit.dwell
        );

        let outcome = self.sink.send(record).await;
        outcome.log(&visit.url);
        PipelineOutcome::Dispatched(outcome)
    }
}
