//! Concurrent-miss coalescing
//!
//! [`Group::work`] runs at most one execution per key at a time. Callers that
//! arrive while an execution for their key is in flight wait for it and get a
//! clone of its outcome. Nothing is retained once the execution completes.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::watch;
use tracing::debug;

/// Outcome of a coalesced call
#[derive(Debug, Clone, PartialEq)]
pub struct Coalesced<T> {
    pub value: T,
    /// `true` for the caller that ran the execution, `false` for callers that joined it
    pub leader: bool,
}

/// The leader of an in-flight execution was dropped before completing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abandoned;

/// Deduplicates concurrent executions sharing a key
pub struct Group<T> {
    calls: Mutex<HashMap<String, watch::Receiver<Option<T>>>>,
}

impl<T: Clone> Group<T> {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` for `key`, or join the execution already in flight for it
    pub async fn work<F, Fut>(&self, key: &str, f: F) -> Result<Coalesced<T>, Abandoned>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let call = {
            let mut calls = self.calls.lock();
            match calls.get(key) {
                Some(rx) => Err(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    calls.insert(key.to_string(), rx);
                    Ok(Call {
                        group: self,
                        key,
                        tx: Some(tx),
                    })
                }
            }
        };

        match call {
            Ok(call) => {
                let value = f().await;
                call.complete(value.clone());
                Ok(Coalesced {
                    value,
                    leader: true,
                })
            }
            Err(mut rx) => {
                debug!("Joining in-flight execution for key={}", key);
                let value = rx
                    .wait_for(Option::is_some)
                    .await
                    .map_err(|_| Abandoned)?
                    .clone()
                    .ok_or(Abandoned)?;
                Ok(Coalesced {
                    value,
                    leader: false,
                })
            }
        }
    }

    /// Number of keys with an execution in flight
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }
}

impl<T: Clone> Default for Group<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Leader-side handle of an in-flight execution.
///
/// Dropping it without [`Call::complete`] removes the entry and closes the
/// channel, so waiters observe [`Abandoned`] instead of hanging.
struct Call<'a, T> {
    group: &'a Group<T>,
    key: &'a str,
    tx: Option<watch::Sender<Option<T>>>,
}

impl<T> Call<'_, T> {
    fn complete(mut self, value: T) {
        let mut calls = self.group.calls.lock();
        calls.remove(self.key);
        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(value));
        }
    }
}

impl<T> Drop for Call<'_, T> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            debug!("In-flight execution abandoned for key={}", self.key);
            self.group.calls.lock().remove(self.key);
            drop(tx);
        }
    }
}
