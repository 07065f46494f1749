//! Visit Tracker - Browser dwell tracking and visit event assembly
//!
//! This crate watches browser tab lifecycle signals, decides when a page visit
//! has lasted long enough to be worth recording, and turns each qualifying
//! visit into a single event posted to an ingestion endpoint:
//!
//! - **Tracking**: per-tab dwell timing driven by navigation, focus and close
//!   events plus a recurring threshold timer
//! - **Capture**: the page content requested from the tab itself
//! - **Enrichment**: cookies, bookmark status, geolocation, top sites, idle
//!   state and recent history, gathered concurrently with per-signal fallbacks
//! - **Dispatch**: one JSON `POST` per visit, no retry
//!
//! # Architecture
//!
//! The browser is reached through the [`BrowserHost`] trait. In production the
//! [`NativeBridge`] implements it over the browser's native messaging pipe and
//! also supplies the stream of [`TabEvent`]s that drives the [`VisitTracker`].
//! Qualified visits run through the [`VisitPipeline`] on their own tasks.

pub mod bridge;
pub mod capture;
pub mod config;
pub mod dispatcher;
pub mod enricher;
pub mod hasher;
pub mod host;
pub mod pipeline;
pub mod policy;
pub mod tracker;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use bridge::NativeBridge;
pub use capture::ContentCapturer;
pub use config::Config;
pub use dispatcher::{DispatchError, DispatchOutcome, EventDispatcher, VisitSink};
pub use enricher::ContextEnricher;
pub use hasher::content_hash;
pub use host::{BrowserHost, HistoryQuery};
pub use pipeline::{PipelineOutcome, VisitPipeline};
pub use policy::UrlPolicy;
pub use tracker::{TrackerStatus, VisitTracker};
pub use types::{
    BookmarkNode, Cookie, GeoPosition, HistoryItem, HostError, IdleState, QualificationTrigger,
    QualifiedVisit, TabEvent, TabId, TabInfo, TabVisitState, TopSite, VisitMetadata, VisitRecord,
};
