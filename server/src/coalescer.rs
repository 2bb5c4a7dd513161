//! Coalescer: a per-`(roomId, msgKind)` queue with a 33 ms single-shot flush
//! timer. The teacher's broadcast fabric (`host_to_client_broadcaster`) fans
//! out every message immediately with no batching; this generalizes that
//! "spawn a task, hand it a channel" shape into a timer-driven flush task
//! per key.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use protocol::StreamId;
use serde_json::Value;

pub const FLUSH_WINDOW: Duration = Duration::from_millis(33);

type FlushFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type FlushFn = Arc<dyn Fn(StreamId, String, Vec<Value>) -> FlushFuture + Send + Sync>;

#[derive(Eq, PartialEq, Hash, Clone)]
struct Key(StreamId, String);

#[derive(Default)]
struct Queues {
    pending: HashMap<Key, Vec<Value>>,
    armed: HashMap<Key, ()>,
}

#[derive(Default)]
pub struct Coalescer {
    queues: Arc<Mutex<Queues>>,
}

impl Coalescer {
    /// Appends `msg` to the queue for `(room_id, kind)`, arming a flush
    /// timer the first time this tick a message lands on that key.
    pub fn coalesce(&self, room_id: StreamId, kind: String, msg: Value, flush: FlushFn) {
        let key = Key(room_id.clone(), kind.clone());
        let mut queues = self.queues.lock().expect("coalescer lock poisoned");
        queues.pending.entry(key.clone()).or_default().push(msg);
        if queues.armed.contains_key(&key) {
            return;
        }
        queues.armed.insert(key.clone(), ());
        drop(queues);

        let queues_handle = self.queues.clone();
        tokio::spawn(async move {
            tokio::time::sleep(FLUSH_WINDOW).await;
            let batch = {
                let mut queues = queues_handle.lock().expect("coalescer lock poisoned");
                queues.armed.remove(&key);
                queues.pending.remove(&key).unwrap_or_default()
            };
            if !batch.is_empty() {
                flush(key.0.clone(), key.1.clone(), batch).await;
            }
        });
    }

    /// Drops any pending queue/timer state for a room, clearing both queues
    /// and timers on room destruction. The in-flight `sleep` tasks still
    /// fire but find nothing queued.
    pub fn clear_room(&self, room_id: &str) {
        let mut queues = self.queues.lock().expect("coalescer lock poisoned");
        queues.pending.retain(|key, _| key.0 != room_id);
        queues.armed.retain(|key, _| key.0 != room_id);
    }
}

/// For kinds where only the newest update matters (e.g. `game_state`),
/// discards every entry but the last.
pub fn keep_last(mut batch: Vec<Value>) -> Vec<Value> {
    if let Some(last) = batch.pop() {
        vec![last]
    } else {
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn flush_fires_once_per_window_and_preserves_order() {
        let coalescer = Coalescer::default();
        let flushed = Arc::new(Mutex::new(Vec::new()));
        let flushed_handle = flushed.clone();
        let flush: FlushFn = Arc::new(move |_room, _kind, batch| {
            let flushed_handle = flushed_handle.clone();
            Box::pin(async move {
                flushed_handle.lock().unwrap().extend(batch);
            })
        });

        for i in 0..5 {
            coalescer.coalesce(
                "r1".to_string(),
                "game_state".to_string(),
                Value::from(i),
                flush.clone(),
            );
        }

        tokio::time::sleep(FLUSH_WINDOW + Duration::from_millis(5)).await;
        let values: Vec<i64> = flushed
            .lock()
            .unwrap()
            .iter()
            .map(|v| v.as_i64().unwrap())
            .collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn keep_last_discards_all_but_final_entry() {
        let batch = vec![Value::from(1), Value::from(2), Value::from(3)];
        assert_eq!(keep_last(batch), vec![Value::from(3)]);
    }
}
