//! Deadline bridge between a fixed upstream reply window and slow completions.
//!
//! The upstream platform waits a few seconds for a reply and then retries the
//! same message. A completion that misses the window keeps running; its result
//! is parked under the message fingerprint and served to the retry.
//!
//! Per fingerprint:
//!
//! ```text
//! (none) --call, deadline passes--> running --work ends--> parked
//! parked --identical call--> consumed (served once)
//! running --identical call--> a second run starts; last writer wins
//! ```

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chatrelay_core::UserId;
use chatrelay_store::KeyValueStore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Stable identity of an inbound message: the same sender and text always
/// give the same fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(user: &UserId, text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(user.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(text.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn key(&self) -> String {
        format!("pending:{}", self.0)
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short form is enough to correlate log lines.
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

/// Parked outcome of a completion that missed its deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PendingResult {
    Ready { reply: String },
    Failed { error: String },
}

impl From<Result<String, String>> for PendingResult {
    fn from(r: Result<String, String>) -> Self {
        match r {
            Ok(reply) => Self::Ready { reply },
            Err(error) => Self::Failed { error },
        }
    }
}

impl From<PendingResult> for Result<String, String> {
    fn from(p: PendingResult) -> Self {
        match p {
            PendingResult::Ready { reply } => Ok(reply),
            PendingResult::Failed { error } => Err(error),
        }
    }
}

/// What a bridged call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// Work finished inside the deadline.
    Completed(Result<String, String>),
    /// A result parked by an earlier call with the same fingerprint.
    Recovered(Result<String, String>),
    /// Deadline passed; the work continues in the background.
    Placeholder,
}

pub struct TimeoutBridge {
    store: Arc<KeyValueStore>,
    pending_ttl: Duration,
    /// Upper bound for background work, so a hung provider cannot hold a task forever.
    work_ceiling: Duration,
}

impl TimeoutBridge {
    pub fn new(store: Arc<KeyValueStore>, pending_ttl: Duration, work_ceiling: Duration) -> Self {
        Self {
            store,
            pending_ttl,
            work_ceiling,
        }
    }

    /// Serve a parked result for `fp` if there is one, otherwise run `work`
    /// and wait at most `deadline` for it.
    ///
    /// A parked result is consumed on read. Work that misses the deadline is
    /// not cancelled: its result is parked under `fp` for `pending_ttl`.
    /// The bridge never retries work on its own.
    pub async fn call_with_deadline<F, E>(
        &self,
        fp: &Fingerprint,
        deadline: Duration,
        work: F,
    ) -> BridgeOutcome
    where
        F: Future<Output = Result<String, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let key = fp.key();

        if let Some(raw) = self.store.take(&key).await {
            match serde_json::from_str::<PendingResult>(&raw) {
                Ok(parked) => {
                    info!(fingerprint = %fp, "serving parked result");
                    return BridgeOutcome::Recovered(parked.into());
                }
                Err(e) => warn!(fingerprint = %fp, error = %e, "parked result is unreadable, running again"),
            }
        }

        let (tx, mut rx) = oneshot::channel::<Result<String, String>>();
        let store = Arc::clone(&self.store);
        let pending_ttl = self.pending_ttl;
        let ceiling = self.work_ceiling;
        let task_fp = fp.clone();
        let started = Instant::now();

        tokio::spawn(async move {
            let result = match tokio::time::timeout(ceiling, work).await {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("no reply within {ceiling:?}")),
            };

            // Receiver gone means the caller hit its deadline.
            if let Err(result) = tx.send(result) {
                let parked = PendingResult::from(result);
                match serde_json::to_string(&parked) {
                    Ok(json) => {
                        store.set(&key, &json, pending_ttl).await;
                        info!(
                            fingerprint = %task_fp,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "late result parked"
                        );
                    }
                    Err(e) => warn!(fingerprint = %task_fp, error = %e, "failed to encode late result"),
                }
            }
        });

        match tokio::time::timeout(deadline, &mut rx).await {
            Ok(Ok(result)) => {
                debug!(fingerprint = %fp, "completed inside deadline");
                BridgeOutcome::Completed(result)
            }
            Ok(Err(_)) => {
                warn!(fingerprint = %fp, "completion task ended without a result");
                BridgeOutcome::Completed(Err("completion failed unexpectedly".to_string()))
            }
            Err(_) => {
                // Close first so the task either sees the closed channel and
                // parks, or has already sent and we pick the value up here.
                rx.close();
                match rx.try_recv() {
                    Ok(result) => BridgeOutcome::Completed(result),
                    Err(_) => {
                        info!(fingerprint = %fp, deadline_ms = deadline.as_millis() as u64, "deadline passed, work continues");
                        BridgeOutcome::Placeholder
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge() -> (TimeoutBridge, Arc<KeyValueStore>) {
        let kv = Arc::new(KeyValueStore::in_memory(Duration::from_secs(60)));
        let b = TimeoutBridge::new(Arc::clone(&kv), Duration::from_secs(30), Duration::from_secs(5));
        (b, kv)
    }

    fn fp(text: &str) -> Fingerprint {
        Fingerprint::new(&UserId::from("u1"), text)
    }

    async fn slow(reply: &'static str, ms: u64) -> Result<String, String> {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(reply.to_string())
    }

    #[test]
    fn fingerprint_is_stable_and_distinguishes_senders() {
        let a = Fingerprint::new(&UserId::from("u1"), "hello");
        assert_eq!(a, Fingerprint::new(&UserId::from("u1"), "hello"));
        assert_ne!(a, Fingerprint::new(&UserId::from("u2"), "hello"));
        assert_ne!(
            Fingerprint::new(&UserId::from("ab"), "c"),
            Fingerprint::new(&UserId::from("a"), "bc")
        );
        assert!(a.key().starts_with("pending:"));
        assert_eq!(a.key().len(), "pending:".len() + 64);
    }

    #[test]
    fn pending_result_wire_format() {
        let json = serde_json::to_string(&PendingResult::Ready { reply: "hi".into() }).unwrap();
        assert_eq!(json, r#"{"status":"ready","reply":"hi"}"#);
    }

    #[tokio::test]
    async fn fast_work_returns_directly_without_parking() {
        let (b, kv) = bridge();
        let out = b
            .call_with_deadline(&fp("q"), Duration::from_millis(500), slow("fast", 5))
            .await;
        assert_eq!(out, BridgeOutcome::Completed(Ok("fast".into())));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(kv.get(&fp("q").key()).await, None);
    }

    #[tokio::test]
    async fn late_result_is_parked_and_served_once() {
        let (b, _) = bridge();
        let f = fp("slow");

        let first = b
            .call_with_deadline(&f, Duration::from_millis(20), slow("late", 80))
            .await;
        assert_eq!(first, BridgeOutcome::Placeholder);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let second = b
            .call_with_deadline(&f, Duration::from_millis(20), slow("unused", 1000))
            .await;
        assert_eq!(second, BridgeOutcome::Recovered(Ok("late".into())));

        // Consumed: the next call starts fresh work and times out again.
        let third = b
            .call_with_deadline(&f, Duration::from_millis(20), slow("again", 1000))
            .await;
        assert_eq!(third, BridgeOutcome::Placeholder);
    }

    #[tokio::test]
    async fn late_failure_is_parked_too() {
        let (b, _) = bridge();
        let f = fp("boom");
        let work = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err::<String, _>("upstream 500")
        };

        assert_eq!(
            b.call_with_deadline(&f, Duration::from_millis(10), work).await,
            BridgeOutcome::Placeholder
        );
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(
            b.call_with_deadline(&f, Duration::from_millis(10), slow("x", 1000)).await,
            BridgeOutcome::Recovered(Err("upstream 500".into()))
        );
    }

    #[tokio::test]
    async fn work_ceiling_turns_hang_into_parked_error() {
        let kv = Arc::new(KeyValueStore::in_memory(Duration::from_secs(60)));
        let b = TimeoutBridge::new(Arc::clone(&kv), Duration::from_secs(30), Duration::from_millis(40));
        let f = fp("hang");

        assert_eq!(
            b.call_with_deadline(&f, Duration::from_millis(10), slow("never", 10_000)).await,
            BridgeOutcome::Placeholder
        );
        tokio::time::sleep(Duration::from_millis(120)).await;
        match b.call_with_deadline(&f, Duration::from_millis(10), slow("x", 1000)).await {
            BridgeOutcome::Recovered(Err(msg)) => assert!(msg.starts_with("no reply within"), "{msg}"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreadable_parked_value_runs_work_again() {
        let (b, kv) = bridge();
        let f = fp("corrupt");
        kv.set(&f.key(), "not json", Duration::ZERO).await;

        let out = b
            .call_with_deadline(&f, Duration::from_millis(500), slow("fresh", 5))
            .await;
        assert_eq!(out, BridgeOutcome::Completed(Ok("fresh".into())));
    }
}
