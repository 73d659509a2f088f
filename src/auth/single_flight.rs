// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key-based call deduplication.
//!
//! [`SingleFlight`] coalesces concurrent identical async operations: while an
//! operation for a key is running, later callers with the same key await the
//! same pending result instead of starting a duplicate.
//!
//! Used by the key directory (one JWKS fetch per issuer) and by the
//! authenticator (one verification per token digest).

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};

type Outcome<T> = Result<T, FlightError>;
type CallMap<K, T> = HashMap<K, Call<T>>;

struct Call<T> {
    id: u64,
    future: Shared<BoxFuture<'static, Outcome<T>>>,
}

/// The spawned operation ended without producing a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FlightError {
    #[error("in-flight operation panicked")]
    Panicked,
    #[error("in-flight operation was cancelled")]
    Cancelled,
}

/// Snapshot of a [`SingleFlight`] registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SingleFlightStats {
    /// Operations currently running.
    pub in_flight: usize,
    /// Operations started since creation.
    pub started: u64,
    /// Calls that joined an operation already running.
    pub coalesced: u64,
}

/// Registry of in-flight operations keyed by `K`, each producing a `T`.
///
/// `T` is cloned out to every waiter, so wrap large payloads in `Arc` to share
/// one allocation between them.
pub struct SingleFlight<K, T> {
    calls: Arc<Mutex<CallMap<K, T>>>,
    next_id: AtomicU64,
    coalesced: AtomicU64,
}

fn lock<K, T>(calls: &Mutex<CallMap<K, T>>) -> MutexGuard<'_, CallMap<K, T>> {
    // The map is only ever touched by short non-panicking sections.
    calls.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the call's entry when the spawned task finishes or unwinds.
struct Release<K: Eq + Hash, T> {
    calls: Arc<Mutex<CallMap<K, T>>>,
    key: K,
    id: u64,
}

impl<K: Eq + Hash, T> Drop for Release<K, T> {
    fn drop(&mut self) {
        let mut calls = lock(&self.calls);
        // A forget() may have let a newer call take this key.
        if calls.get(&self.key).is_some_and(|call| call.id == self.id) {
            calls.remove(&self.key);
        }
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Run `operation` under `key`, or join the run already in progress.
    ///
    /// The operation is spawned onto the Tokio runtime, so it runs to
    /// completion even if every caller stops waiting. Its key leaves the
    /// registry as soon as it completes and before any waiter observes the
    /// result, so the next call with the same key always starts fresh.
    pub async fn run<F>(&self, key: K, operation: F) -> Outcome<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let future = {
            let mut calls = lock(&self.calls);
            if let Some(call) = calls.get(&key) {
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                call.future.clone()
            } else {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let release = Release {
                    calls: Arc::clone(&self.calls),
                    key: key.clone(),
                    id,
                };
                let task = tokio::spawn(async move {
                    let _release = release;
                    operation.await
                });
                let future = async move {
                    task.await.map_err(|e| {
                        if e.is_panic() {
                            FlightError::Panicked
                        } else {
                            FlightError::Cancelled
                        }
                    })
                }
                .boxed()
                .shared();
                calls.insert(
                    key,
                    Call {
                        id,
                        future: future.clone(),
                    },
                );
                future
            }
        };

        future.await
    }

    /// Stop coalescing new callers onto the operation running under `key`.
    ///
    /// The running operation is not cancelled; callers already waiting still
    /// receive its result.
    pub fn forget(&self, key: &K) -> bool {
        lock(&self.calls).remove(key).is_some()
    }

    pub fn stats(&self) -> SingleFlightStats {
        SingleFlightStats {
            in_flight: lock(&self.calls).len(),
            started: self.next_id.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use futures_util::future::join_all;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let flights: SingleFlight<&'static str, Arc<String>> = SingleFlight::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let calls = (0..16).map(|_| {
            let runs = Arc::clone(&runs);
            flights.run("issuer", async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Arc::new("keys".to_string())
            })
        });
        let results: Vec<Arc<String>> = join_all(calls)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        for result in &results {
            assert!(Arc::ptr_eq(result, &results[0]));
        }

        let stats = flights.stats();
        assert_eq!(stats.started, 1);
        assert_eq!(stats.coalesced, 15);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn failures_are_shared_too() {
        let flights: SingleFlight<u8, Result<u32, String>> = SingleFlight::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let calls = (0..4).map(|_| {
            let runs = Arc::clone(&runs);
            flights.run(7, async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err("unreachable".to_string())
            })
        });

        for result in join_all(calls).await {
            assert_eq!(result, Ok(Err("unreachable".to_string())));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn completed_key_starts_fresh() {
        let flights: SingleFlight<u8, u32> = SingleFlight::new();

        assert_eq!(flights.run(1, async { 10 }).await, Ok(10));
        assert_eq!(flights.run(1, async { 20 }).await, Ok(20));
        assert_eq!(flights.stats().started, 2);
        assert_eq!(flights.stats().coalesced, 0);
    }

    #[tokio::test]
    async fn distinct_keys_run_independently() {
        let flights: SingleFlight<u8, u8> = SingleFlight::new();
        let (a, b) = tokio::join!(flights.run(1, async { 1 }), flights.run(2, async { 2 }));
        assert_eq!((a, b), (Ok(1), Ok(2)));
        assert_eq!(flights.stats().started, 2);
    }

    #[tokio::test]
    async fn forget_stops_coalescing_without_cancelling() {
        let flights = Arc::new(SingleFlight::<u8, u32>::new());
        let (release, gate) = oneshot::channel::<()>();

        let first = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move {
                flights
                    .run(1, async move {
                        let _ = gate.await;
                        1
                    })
                    .await
            })
        };

        // Let the first operation register itself.
        while flights.stats().in_flight == 0 {
            tokio::task::yield_now().await;
        }
        assert!(flights.forget(&1));
        assert!(!flights.forget(&1));

        // A new caller starts its own operation instead of joining the first.
        assert_eq!(flights.run(1, async { 2 }).await, Ok(2));

        release.send(()).unwrap();
        assert_eq!(first.await.unwrap(), Ok(1));
        assert_eq!(flights.stats().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn operation_finishes_after_every_caller_gives_up() {
        let flights = SingleFlight::<u8, u32>::new();
        let finished = Arc::new(AtomicUsize::new(0));

        let waiters = (0..3).map(|_| {
            let finished = Arc::clone(&finished);
            tokio::time::timeout(
                Duration::from_millis(10),
                flights.run(1, async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    7
                }),
            )
        });
        for waited in join_all(waiters).await {
            assert!(waited.is_err());
        }
        assert_eq!(flights.stats().in_flight, 1);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(flights.stats().in_flight, 0);
        assert_eq!(flights.run(1, async { 8 }).await, Ok(8));
    }

    #[tokio::test]
    async fn panicking_operation_is_reported_and_released() {
        let flights = SingleFlight::<u8, u32>::new();
        let outcome = flights
            .run(1, async {
                if true {
                    panic!("boom");
                }
                0
            })
            .await;
        assert_eq!(outcome, Err(FlightError::Panicked));
        assert_eq!(flights.stats().in_flight, 0);
    }
}
