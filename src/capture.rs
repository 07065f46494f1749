//! Page content capture.
//!
//! Requests the rendered page content from a tab's page context. Every failure
//! mode (no response, access error, timeout) collapses into an empty string,
//! which callers treat as "capture failed, do not proceed".

use crate::host::BrowserHost;
use crate::types::{HostError, TabId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Content capture service
pub struct ContentCapturer {
    host: Arc<dyn BrowserHost>,
    /// Upper bound on a single capture request
    timeout: Duration,
}

impl ContentCapturer {
    pub fn new(host: Arc<dyn BrowserHost>, timeout: Duration) -> Self {
        Self { host, timeout }
    }

    /// Capture the content of a tab, or an empty string on failure
    pub async fn capture(&self, tab_id: TabId) -> String {
        trace!("Capturing content of tab {}", tab_id);

        let start = std::time::Instant::now();
        let result = match tokio::time::timeout(self.timeout, self.host.page_content(tab_id)).await {
            Ok(result) => result,
            Err(_) => Err(HostError::Timeout(self.timeout)),
        };

        match result {
            Ok(content) => {
                debug!(
                    "Tab {} captured in {:?} ({} chars)",
                    tab_id,
                    start.elapsed(),
                    content.len()
                );
                content
            }
            Err(e) => {
                warn!("Content capture failed for tab {}: {}", tab_id, e);
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeHost;

    #[tokio::test]
    async fn test_capture_returns_content() {
        let host = Arc::new(FakeHost::new());
        host.set_content("<html>X</html>");

        let capturer = ContentCapturer::new(host, Duration::from_secs(1));
        assert_eq!(capturer.capture(3).await, "<html>X</html>");
    }

    #[tokio::test]
    async fn test_capture_error_is_empty() {
        let host = Arc::new(FakeHost::new());
        host.fail("page_content");

        let capturer = ContentCapturer::new(host, Duration::from_secs(1));
        assert_eq!(capturer.capture(3).await, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_timeout_is_empty() {
        let host = Arc::new(FakeHost::new());
        host.set_content("late");
        host.set_content_delay(Duration::from_secs(60));

        let capturer = ContentCapturer::new(host, Duration::from_secs(5));
        assert_eq!(capturer.capture(3).await, "");
    }
}
