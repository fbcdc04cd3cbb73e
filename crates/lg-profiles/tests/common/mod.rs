//! Shared fixtures for the profile integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lg_profiles::{ContentBlockingManager, EngineConfig, FetchError, Fetcher};
use tempfile::TempDir;

pub const ADS_URL: &str = "https://lists.test/ads.txt";
pub const ALLOW_URL: &str = "https://lists.test/allow.txt";

pub const ADS_LIST: &str = "[Adblock Plus 2.0]
! Title: Test Ads
! Homepage: https://lists.test/
! Expires: 2 days
||ads.example^
||tracker.test^$script,domain=news.test|~sports.news.test
||cdn.test^$third-party
/banner/*
example.org##.ad-box
";

pub const ALLOW_LIST: &str = "[Adblock Plus 2.0]
! Title: Allowlist
@@||ads.example/allowed^
";

enum Response {
    List(String),
    Status(u16),
}

/// In-memory fetcher: serves configured bodies or HTTP statuses per URL and
/// counts calls.
pub struct StubFetcher {
    responses: Mutex<HashMap<String, Response>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl StubFetcher {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn serve(&self, url: &str, list: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Response::List(list.to_string()));
    }

    pub fn fail(&self, url: &str, status: u16) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Response::Status(status));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.responses.lock().unwrap().get(url) {
            Some(Response::List(list)) => Ok(list.as_bytes().to_vec()),
            Some(Response::Status(status)) => Err(FetchError::Http(*status)),
            None => Err(FetchError::Http(404)),
        }
    }
}

pub fn config(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        storage_dir: dir.path().join("filters"),
        check_interval_secs: 1,
        ..EngineConfig::default()
    }
}

pub fn manager(dir: &TempDir, fetcher: &Arc<StubFetcher>) -> ContentBlockingManager {
    let fetcher: Arc<dyn Fetcher> = fetcher.clone();
    ContentBlockingManager::new(&config(dir), fetcher).unwrap()
}

pub fn reopen(dir: &TempDir, fetcher: &Arc<StubFetcher>) -> ContentBlockingManager {
    let fetcher: Arc<dyn Fetcher> = fetcher.clone();
    ContentBlockingManager::open(&config(dir), fetcher).unwrap()
}
