//! In-memory doubles shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use templar_core::Ledger;
use templar_renderer::MaterialSink;

use crate::error::SourceError;
use crate::http::{http_err, Fetcher};

/// Serves fixed bodies by URL; anything else is a 404.
#[derive(Default)]
pub struct StaticFetcher {
    bodies: HashMap<String, Vec<u8>>,
    requests: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(self, url: &str, body: &str) -> Self {
        self.with_bytes(url, body.as_bytes().to_vec())
    }

    pub fn with_bytes(mut self, url: &str, body: Vec<u8>) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Fetcher for StaticFetcher {
    fn get_text(&self, url: &str) -> Result<String, SourceError> {
        let bytes = self.get_bytes(url)?;
        String::from_utf8(bytes).map_err(|e| http_err(url, e))
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| http_err(url, "status code 404"))
    }
}

/// Sink that keeps everything it is given.
#[derive(Default)]
pub struct RecordingSink {
    ledger: Mutex<Ledger>,
}

impl RecordingSink {
    pub fn get(&self, material: &str) -> Option<String> {
        self.ledger.lock().unwrap().get(material).cloned()
    }

    pub fn ledger(&self) -> Ledger {
        self.ledger.lock().unwrap().clone()
    }
}

impl MaterialSink for RecordingSink {
    fn record(&self, material: &str, version: &str) {
        self.ledger
            .lock()
            .unwrap()
            .insert(material.to_string(), version.to_string());
    }
}

/// Named arguments from string pairs.
pub fn str_args(pairs: &[(&str, &str)]) -> templar_renderer::Args {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), tera::Value::from(*v)))
        .collect()
}
