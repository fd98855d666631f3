//! Feed transport backed by responses the host page already fetched.
//!
//! Each provided body answers one lookup and is then dropped; anything worth
//! keeping lives in the core's bounded caches.

use epiplot_core::error::FeedError;
use epiplot_core::feeds::{HttpGet, HttpResponse};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub(crate) struct HostTransport {
    responses: Mutex<HashMap<String, HttpResponse>>,
}

impl HostTransport {
    pub(crate) fn provide(&self, url: String, response: HttpResponse) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(url, response);
        }
    }

    /// Bodies provided but not yet read.
    pub(crate) fn len(&self) -> usize {
        self.responses.lock().map(|responses| responses.len()).unwrap_or(0)
    }

    pub(crate) fn forget(&self, url: &str) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.remove(url);
        }
    }
}

impl HttpGet for HostTransport {
    fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse, FeedError> {
        let mut responses = self
            .responses
            .lock()
            .map_err(|_| FeedError::Transport("response table poisoned".to_string()))?;
        responses
            .remove(url)
            .ok_or_else(|| FeedError::Transport(format!("host has not fetched {url}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_only_provided_urls() {
        let transport = HostTransport::default();
        assert!(matches!(
            transport.get("https://feed/a", Duration::from_secs(1)),
            Err(FeedError::Transport(_))
        ));
        transport.provide("https://feed/a".into(), HttpResponse::ok("[]"));
        let response = transport
            .get("https://feed/a", Duration::from_secs(1))
            .expect("provided response");
        assert_eq!(response.body, "[]");
        transport.forget("https://feed/a");
        assert!(transport.get("https://feed/a", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn responses_are_consumed_by_the_lookup() {
        let transport = HostTransport::default();
        transport.provide("https://feed/a".into(), HttpResponse::ok("1"));
        transport.provide("https://feed/b".into(), HttpResponse::ok("2"));
        assert!(transport.get("https://feed/a", Duration::from_secs(1)).is_ok());
        assert!(transport.get("https://feed/a", Duration::from_secs(1)).is_err());
        assert_eq!(transport.len(), 1);
        transport.forget("https://feed/b");
        assert_eq!(transport.len(), 0);
    }
}
