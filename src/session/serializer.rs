//! Mutual exclusion for outbound backend requests.

use std::future::Future;
use tokio::sync::Mutex;

/// Serializes admission, heartbeat and chat requests.
///
/// At most one guarded operation runs at a time. Waiters are granted the lock
/// in arrival order, and the lock is released on every exit path of the
/// guarded operation, including errors, cancellation and panics.
#[derive(Debug, Default)]
pub struct RequestSerializer {
    gate: Mutex<()>,
}

impl RequestSerializer {
    /// New, unlocked serializer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` while holding the lock.
    pub async fn with_lock<F, Fut, T>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.gate.lock().await;
        op().await
    }

    /// Whether a guarded operation is running right now.
    #[cfg(test)]
    pub(crate) fn is_busy(&self) -> bool {
        self.gate.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_more_than_one_in_flight() {
        let serializer = Arc::new(RequestSerializer::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let serializer = Arc::clone(&serializer);
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                serializer
                    .with_lock(|| async {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn released_after_error() {
        let serializer = RequestSerializer::new();
        let result: Result<(), &str> = serializer.with_lock(|| async { Err("boom") }).await;
        assert!(result.is_err());
        assert!(!serializer.is_busy());
    }

    #[tokio::test]
    async fn released_after_panic() {
        let serializer = Arc::new(RequestSerializer::new());
        let s = Arc::clone(&serializer);
        let joined = tokio::spawn(async move {
            s.with_lock(|| async {
                panic!("request blew up");
            })
            .await
        })
        .await;
        assert!(joined.is_err());
        let value = tokio::time::timeout(
            Duration::from_secs(1),
            serializer.with_lock(|| async { 7 }),
        )
        .await
        .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn released_after_cancellation() {
        let serializer = Arc::new(RequestSerializer::new());
        let s = Arc::clone(&serializer);
        let task = tokio::spawn(async move {
            s.with_lock(|| tokio::time::sleep(Duration::from_secs(60)))
                .await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(serializer.is_busy());
        task.abort();
        let _ = task.await;
        assert!(!serializer.is_busy());
    }
}
