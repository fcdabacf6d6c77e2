// Replay recording: collects duel events and compresses them for storage.

use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, PoisonError};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;

use crate::engine::duel::DuelId;

/// Collects serialized duel events and compresses them on finish.
#[derive(Debug, Default)]
pub struct ReplayRecorder {
    messages: Vec<String>,
}

impl ReplayRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one event. Events that fail to serialize are skipped.
    pub fn record<T: Serialize>(&mut self, event: &T) {
        match serde_json::to_string(event) {
            Ok(json) => self.messages.push(json),
            Err(e) => tracing::warn!("Skipping unserializable replay event: {e}"),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Compress all recorded events into a gzipped JSON array.
    pub fn finish(self) -> std::io::Result<Vec<u8>> {
        let json = format!("[{}]", self.messages.join(","));
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(json.as_bytes())?;
        encoder.finish()
    }
}

/// Decompress gzipped replay data back to the JSON string.
pub fn decompress_replay(data: &[u8]) -> Result<String, std::io::Error> {
    let mut decoder = GzDecoder::new(data);
    let mut result = String::new();
    decoder.read_to_string(&mut result)?;
    Ok(result)
}

#[derive(Debug, Default)]
struct StoreInner {
    replays: HashMap<DuelId, Vec<u8>>,
    order: VecDeque<DuelId>,
}

/// Bounded in-memory store of finished duel replays. The oldest replay is
/// evicted once capacity is reached.
#[derive(Debug, Clone)]
pub struct ReplayStore {
    capacity: usize,
    inner: Arc<Mutex<StoreInner>>,
}

impl ReplayStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Arc::new(Mutex::new(StoreInner::default())),
        }
    }

    pub fn insert(&self, duel_id: DuelId, data: Vec<u8>) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.replays.insert(duel_id.clone(), data).is_none() {
            inner.order.push_back(duel_id);
        }
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.replays.remove(&oldest);
            }
        }
    }

    pub fn get(&self, duel_id: &DuelId) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.replays.get(duel_id).cloned()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.replays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
