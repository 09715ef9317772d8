//! In-memory fetcher used by the unit tests.

use crate::fetch::{FetchError, FetchRequest, Fetcher, RawResponse};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Serves canned responses keyed by URL; unknown URLs answer 404.
#[derive(Default)]
pub(crate) struct StaticFetcher {
    responses: HashMap<String, Result<RawResponse, FetchError>>,
    delays: HashMap<String, Duration>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, body: &str) -> Self {
        self.responses
            .insert(url.to_string(), Ok(RawResponse::html(url, body)));
        self
    }

    pub fn response(mut self, url: &str, response: RawResponse) -> Self {
        self.responses.insert(url.to_string(), Ok(response));
        self
    }

    pub fn failure(mut self, url: &str, status: u16) -> Self {
        self.responses.insert(
            url.to_string(),
            Err(FetchError::Status {
                url: url.to_string(),
                status,
            }),
        );
        self
    }

    pub fn delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    /// URLs requested so far, in request order
    pub fn requested(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url.clone())
            .collect()
    }

    /// Full requests issued so far
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<RawResponse, FetchError> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(delay) = self.delays.get(&request.url) {
            tokio::time::sleep(*delay).await;
        }

        match self.responses.get(&request.url) {
            Some(response) => response.clone(),
            None => Err(FetchError::Status {
                url: request.url.clone(),
                status: 404,
            }),
        }
    }
}
