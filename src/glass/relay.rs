//! Live relay of query output to a subscriber.
//!
//! A subscriber attaches to a query id and receives its output as a
//! stream of lines. The relay polls the store rather than listening to
//! the executor directly, so attaching works at any point in the query's
//! life: before the background task registered the entry (bounded lookup
//! retries cover the race), mid-flight, or long after completion (the
//! terminal fast path replays everything in one burst).
//!
//! Producers append whole lines to `output`, so the byte-offset delta
//! never splits a line. Every relay ends with [`END_MARKER`] no matter
//! how it got there.

use std::sync::Arc;
use std::time::Duration;

use futures_core::Stream;
use log::debug;
use tokio::sync::mpsc;

use crate::glass::registry::QueryStore;

/// Final line of every relay; subscribers treat it as end-of-stream.
pub const END_MARKER: &str = "[DONE]";

/// Relay tuning.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Store polling cadence while the query is in flight.
    pub poll_interval: Duration,

    /// Ceiling on how long a subscriber waits for the query to finish.
    pub max_wait: Duration,

    /// How many times to re-try the initial lookup before declaring the
    /// id unknown. Covers a subscriber racing the executor's registration.
    pub lookup_retries: u32,

    /// Delay between initial-lookup attempts.
    pub lookup_retry_delay: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_wait: Duration::from_secs(120),
            lookup_retries: 10,
            lookup_retry_delay: Duration::from_millis(100),
        }
    }
}

/// Attach to a query and stream its output lines.
///
/// The returned stream always terminates, and its final item is always
/// [`END_MARKER`].
pub fn subscribe(
    store: Arc<dyn QueryStore>,
    id: String,
    config: RelayConfig,
) -> impl Stream<Item = String> + Send {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(run_relay(store, id, config, tx));
    futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|line| (line, rx))
    })
}

async fn run_relay(
    store: Arc<dyn QueryStore>,
    id: String,
    config: RelayConfig,
    tx: mpsc::Sender<String>,
) {
    // A send failure means the subscriber went away; stop relaying.
    macro_rules! emit {
        ($line:expr) => {
            if tx.send($line).await.is_err() {
                debug!("subscriber for {id} disconnected");
                return;
            }
        };
    }

    if !await_registration(store.as_ref(), &id, &config).await {
        emit!(format!("error: query {id} not found"));
        emit!(END_MARKER.to_owned());
        return;
    }

    let started = tokio::time::Instant::now();
    let mut sent = 0usize;

    loop {
        let Ok(query) = store.get(&id) else {
            // Registered a moment ago and gone now; treat as lost.
            emit!(format!("error: query {id} not found"));
            break;
        };

        if let Some(output) = &query.output
            && output.len() > sent
        {
            for line in output[sent..].lines() {
                emit!(line.to_owned());
            }
            sent = output.len();
        }

        if query.is_terminal() {
            if let Some(error) = &query.error {
                emit!(format!("error: {error}"));
            }
            break;
        }

        if started.elapsed() >= config.max_wait {
            emit!(format!(
                "error: timed out waiting for query {id} after {}s",
                config.max_wait.as_secs()
            ));
            break;
        }

        tokio::time::sleep(config.poll_interval).await;
    }

    emit!(END_MARKER.to_owned());
}

/// Wait for the query to appear in the store, bounded by the retry budget.
async fn await_registration(store: &dyn QueryStore, id: &str, config: &RelayConfig) -> bool {
    for attempt in 0..=config.lookup_retries {
        if store.get(id).is_ok() {
            return true;
        }
        if attempt < config.lookup_retries {
            tokio::time::sleep(config.lookup_retry_delay).await;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glass::query::{Query, QueryKind, QueryStatus};
    use crate::glass::registry::MemoryRegistry;
    use futures_util::StreamExt;

    fn fast_config() -> RelayConfig {
        RelayConfig {
            poll_interval: Duration::from_millis(5),
            max_wait: Duration::from_secs(5),
            lookup_retries: 3,
            lookup_retry_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn unknown_id_ends_after_bounded_retries() {
        let store: Arc<dyn QueryStore> = Arc::new(MemoryRegistry::new());
        let lines: Vec<String> =
            subscribe(store, "missing".into(), fast_config()).collect().await;

        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("query missing not found"));
        assert_eq!(lines[1], END_MARKER);
    }

    #[tokio::test]
    async fn terminal_query_replays_everything_in_one_burst() {
        let registry = Arc::new(MemoryRegistry::new());
        let mut query = Query::new(QueryKind::Ping, "8.8.8.8", "core-1");
        query.status = QueryStatus::Completed;
        query.output = Some("reply 1\n\nreply 2\n".into());
        let id = registry.create(query);

        let store: Arc<dyn QueryStore> = registry;
        let lines: Vec<String> = subscribe(store, id, fast_config()).collect().await;

        // Interior empty lines survive the replay.
        assert_eq!(lines, vec!["reply 1", "", "reply 2", END_MARKER]);
    }

    #[tokio::test]
    async fn failed_query_reports_its_error_before_the_marker() {
        let registry = Arc::new(MemoryRegistry::new());
        let mut query = Query::new(QueryKind::Bgp, "8.8.8.8", "core-1");
        query.status = QueryStatus::Error;
        query.error = Some("authentication failed for user ops".into());
        let id = registry.create(query);

        let store: Arc<dyn QueryStore> = registry;
        let lines: Vec<String> = subscribe(store, id, fast_config()).collect().await;

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("error: authentication failed"));
        assert_eq!(lines[1], END_MARKER);
    }

    #[tokio::test]
    async fn in_flight_growth_is_relayed_as_a_delta() {
        let registry = Arc::new(MemoryRegistry::new());
        let mut query = Query::new(QueryKind::Traceroute, "8.8.8.8", "core-1");
        query.status = QueryStatus::Running;
        let id = registry.create(query);

        let writer = registry.clone();
        let writer_id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer
                .update(&writer_id, &mut |q| q.output = Some("hop 1\n".into()))
                .unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer
                .update(&writer_id, &mut |q| {
                    q.output = Some("hop 1\nhop 2\n".into());
                    q.status = QueryStatus::Completed;
                })
                .unwrap();
        });

        let store: Arc<dyn QueryStore> = registry;
        let lines: Vec<String> = subscribe(store, id, fast_config()).collect().await;

        assert_eq!(lines, vec!["hop 1", "hop 2", END_MARKER]);
    }

    #[tokio::test]
    async fn subscriber_can_attach_before_registration() {
        let registry = Arc::new(MemoryRegistry::new());
        let query = Query::new(QueryKind::Ping, "8.8.8.8", "core-1");
        let id = query.id.clone();

        let store: Arc<dyn QueryStore> = registry.clone();
        let stream = subscribe(store, id.clone(), fast_config());

        let writer = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let mut query = query;
            query.status = QueryStatus::Completed;
            query.output = Some("late but fine\n".into());
            writer.create(query);
        });

        let lines: Vec<String> = stream.collect().await;
        assert_eq!(lines, vec!["late but fine", END_MARKER]);
    }

    #[tokio::test]
    async fn stuck_query_hits_the_wait_ceiling() {
        let registry = Arc::new(MemoryRegistry::new());
        let mut query = Query::new(QueryKind::Ping, "8.8.8.8", "core-1");
        query.status = QueryStatus::Running;
        let id = registry.create(query);

        let config = RelayConfig {
            max_wait: Duration::from_millis(30),
            ..fast_config()
        };
        let store: Arc<dyn QueryStore> = registry;
        let lines: Vec<String> = subscribe(store, id, config).collect().await;

        let last = lines.last().unwrap();
        assert_eq!(last, END_MARKER);
        assert!(lines[lines.len() - 2].contains("timed out waiting"));
    }
}
