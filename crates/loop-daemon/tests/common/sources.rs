//! Scriptable feed sources for driving a running core.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use loop_daemon::{FeedSource, FetchError};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;

pub fn feed(id: &str, ts: chrono::DateTime<chrono::Utc>) -> Value {
    json!([{
        "_id": id,
        "loop": {
            "timestamp": ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "iob": { "iob": 0.5 },
            "cob": { "cob": 10 }
        }
    }])
}

/// Answers every fetch immediately with whatever feed is currently set.
pub struct StaticSource {
    payload: Mutex<Value>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(payload: Value) -> Self {
        Self {
            payload: Mutex::new(payload),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, payload: Value) {
        *self.payload.lock().unwrap() = payload;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FeedSource for StaticSource {
    fn fetch(&self) -> BoxFuture<'static, Result<Value, FetchError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let payload = self.payload.lock().unwrap().clone();
        futures_util::future::ready(Ok(payload)).boxed()
    }
}

/// Each fetch waits on the next gate handed out by `open_gate`.
#[derive(Default)]
pub struct GatedSource {
    gates: Mutex<VecDeque<oneshot::Receiver<Result<Value, FetchError>>>>,
}

impl GatedSource {
    pub fn open_gate(&self) -> oneshot::Sender<Result<Value, FetchError>> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().push_back(rx);
        tx
    }
}

impl FeedSource for GatedSource {
    fn fetch(&self) -> BoxFuture<'static, Result<Value, FetchError>> {
        let gate = self.gates.lock().unwrap().pop_front();
        async move {
            match gate {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(FetchError::Other("gate dropped".into()))),
                None => Err(FetchError::Other("no gate prepared".into())),
            }
        }
        .boxed()
    }
}
