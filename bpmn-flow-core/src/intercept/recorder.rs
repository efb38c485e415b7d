use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::policy::{InterceptMode, Operation};

/// One intercepted operation as seen by the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptedCall {
    pub sequence: u64,
    pub key: String,
    pub operation: Operation,
    pub mode: InterceptMode,
    pub params: Value,
    pub result: Value,
    /// True when the real implementation was not called.
    pub mocked: bool,
    pub at: DateTime<Utc>,
}

/// Receives every intercepted call in order, whatever its mode.
pub trait CallRecorder: Send + Sync {
    fn record(&self, call: &InterceptedCall);
}

#[derive(Default)]
pub struct MemoryRecorder {
    calls: Mutex<Vec<InterceptedCall>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<InterceptedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `(operation, key)` pairs, for asserting interaction sequences.
    pub fn keys(&self) -> Vec<(Operation, String)> {
        self.calls()
            .into_iter()
            .map(|c| (c.operation, c.key))
            .collect()
    }
}

impl CallRecorder for MemoryRecorder {
    fn record(&self, call: &InterceptedCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call.clone());
    }
}

/// Recorded results keyed by call key. Shared between interceptors so a
/// later request can replay what an earlier one recorded; callers can also
/// seed entries directly.
///
/// A bounded table evicts its oldest key once full.
#[derive(Default)]
pub struct Recordings {
    table: Mutex<RecordingTable>,
    capacity: Option<usize>,
}

#[derive(Default)]
struct RecordingTable {
    entries: HashMap<String, Value>,
    /// Insertion order of `entries`, oldest first.
    order: VecDeque<String>,
}

impl Recordings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounded(capacity: usize) -> Self {
        Self {
            table: Mutex::default(),
            capacity: Some(capacity),
        }
    }

    pub fn from_map(entries: HashMap<String, Value>) -> Self {
        let order = entries.keys().cloned().collect();
        Self {
            table: Mutex::new(RecordingTable { entries, order }),
            capacity: None,
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, RecordingTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().entries.get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let mut table = self.lock();
        if table.entries.insert(key.clone(), value).is_some() {
            return;
        }
        table.order.push_back(key);
        let Some(capacity) = self.capacity else {
            return;
        };
        while table.entries.len() > capacity {
            let Some(oldest) = table.order.pop_front() else {
                break;
            };
            table.entries.remove(&oldest);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.lock().entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bounded_recordings_evict_oldest_key() {
        let recordings = Recordings::bounded(3);
        for n in 0..10 {
            recordings.insert(format!("ExecuteNode:i:{n}"), json!(n));
        }
        assert_eq!(recordings.len(), 3);
        assert_eq!(recordings.get("ExecuteNode:i:0"), None);
        assert_eq!(recordings.get("ExecuteNode:i:9"), Some(json!(9)));
        assert_eq!(recordings.get("ExecuteNode:i:7"), Some(json!(7)));
    }

    #[test]
    fn test_rerecording_a_key_keeps_its_slot() {
        let recordings = Recordings::bounded(2);
        recordings.insert("a", json!(1));
        recordings.insert("b", json!(2));
        recordings.insert("a", json!(3));
        assert_eq!(recordings.len(), 2);
        assert_eq!(recordings.get("a"), Some(json!(3)));

        recordings.insert("c", json!(4));
        assert_eq!(recordings.get("a"), None);
        assert_eq!(recordings.get("b"), Some(json!(2)));
        assert_eq!(recordings.get("c"), Some(json!(4)));
    }

    #[test]
    fn test_unbounded_recordings_keep_everything() {
        let recordings = Recordings::new();
        for n in 0..100 {
            recordings.insert(format!("k{n}"), json!(n));
        }
        assert_eq!(recordings.len(), 100);
        assert_eq!(recordings.capacity(), None);
    }
}
