//! In-process progress fan-out bus.
//!
//! One topic per job id. Publishers never block on slow subscribers: each
//! subscriber sits behind a bounded ring buffer (32 frames) and the oldest
//! frame is dropped on overflow. Dropping stale frames is safe because
//! progress is monotonic. Terminal frames (`complete`/`error`) are never
//! dropped: they are retried until at least one subscriber receives them or
//! a 30-second timeout elapses, and they are stored on the topic so that a
//! subscriber connecting late is still handed the terminal frame.
//!
//! The bus registry is the single process-wide mutable global in the
//! system; its lifecycle is tied to the process.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use lclip_models::{JobId, ProgressRecord};

/// Per-subscriber buffer capacity.
const SUBSCRIBER_BUFFER: usize = 32;

/// How long a terminal publish keeps retrying for a live subscriber.
const TERMINAL_PUBLISH_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay between terminal publish retries.
const TERMINAL_RETRY_INTERVAL: Duration = Duration::from_millis(250);

struct Topic {
    tx: broadcast::Sender<ProgressRecord>,
    terminal: RwLock<Option<ProgressRecord>>,
}

impl Topic {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Self {
            tx,
            terminal: RwLock::new(None),
        }
    }
}

/// Publish/subscribe channel registry keyed by job id.
#[derive(Default)]
pub struct ProgressBus {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide bus instance.
    pub fn global() -> &'static ProgressBus {
        static GLOBAL: OnceLock<ProgressBus> = OnceLock::new();
        GLOBAL.get_or_init(ProgressBus::new)
    }

    fn topic(&self, job_id: &JobId) -> Arc<Topic> {
        {
            let topics = self.topics.read().expect("bus registry poisoned");
            if let Some(topic) = topics.get(job_id.as_str()) {
                return Arc::clone(topic);
            }
        }
        let mut topics = self.topics.write().expect("bus registry poisoned");
        Arc::clone(
            topics
                .entry(job_id.as_str().to_string())
                .or_insert_with(|| Arc::new(Topic::new())),
        )
    }

    /// Publish an ordinary progress frame. Non-blocking; frames for
    /// subscribers with full buffers displace their oldest frame.
    pub fn publish(&self, job_id: &JobId, record: ProgressRecord) {
        let topic = self.topic(job_id);
        // No receivers is fine; progress frames carry no delivery guarantee
        let _ = topic.tx.send(record);
    }

    /// Publish a terminal frame with delivery guarantee.
    ///
    /// The frame is stored for replay to late subscribers, then sent;
    /// without a live subscriber the send is retried until one appears or
    /// the 30-second window closes. Returns whether any subscriber got it.
    pub async fn publish_terminal(&self, job_id: &JobId, record: ProgressRecord) -> bool {
        debug_assert!(record.is_terminal());
        let topic = self.topic(job_id);

        {
            let mut terminal = topic.terminal.write().expect("terminal slot poisoned");
            *terminal = Some(record.clone());
        }

        let deadline = tokio::time::Instant::now() + TERMINAL_PUBLISH_TIMEOUT;
        loop {
            if topic.tx.receiver_count() > 0 && topic.tx.send(record.clone()).is_ok() {
                debug!(job_id = %job_id, "Terminal frame delivered");
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(job_id = %job_id, "No subscriber for terminal frame within timeout");
                return false;
            }
            tokio::time::sleep(TERMINAL_RETRY_INTERVAL).await;
        }
    }

    /// Subscribe to a job's frames.
    ///
    /// The subscription sees frames published after this call; if the job
    /// already reached a terminal state, that terminal frame is replayed
    /// immediately.
    pub fn subscribe(&self, job_id: &JobId) -> Subscription {
        let topic = self.topic(job_id);
        let rx = topic.tx.subscribe();
        let replay = topic
            .terminal
            .read()
            .expect("terminal slot poisoned")
            .clone();

        Subscription {
            rx,
            replay,
            finished: false,
        }
    }

    /// Drop a job's topic. Existing subscriptions drain and then end.
    pub fn release(&self, job_id: &JobId) {
        let mut topics = self.topics.write().expect("bus registry poisoned");
        topics.remove(job_id.as_str());
    }

    /// Number of live topics (for observability).
    pub fn topic_count(&self) -> usize {
        self.topics.read().expect("bus registry poisoned").len()
    }
}

/// A live subscription to one job's progress frames.
pub struct Subscription {
    rx: broadcast::Receiver<ProgressRecord>,
    replay: Option<ProgressRecord>,
    finished: bool,
}

impl Subscription {
    /// Receive the next frame.
    ///
    /// Returns `None` once a terminal frame has been yielded or the topic
    /// is gone. Lagged receivers skip dropped frames and continue.
    pub async fn recv(&mut self) -> Option<ProgressRecord> {
        if self.finished {
            return None;
        }

        if let Some(terminal) = self.replay.take() {
            self.finished = true;
            return Some(terminal);
        }

        loop {
            match self.rx.recv().await {
                Ok(record) => {
                    if record.is_terminal() {
                        self.finished = true;
                    }
                    return Some(record);
                }
                Err(broadcast::error::RecvError::Lagged(dropped)) => {
                    // Stale progress frames were displaced; keep reading
                    debug!(dropped, "Subscriber lagged, dropped oldest frames");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lclip_models::Stage;

    fn job() -> JobId {
        JobId::new()
    }

    fn progress(job_id: &JobId, percent: f32) -> ProgressRecord {
        ProgressRecord::progress(job_id.clone(), Stage::Transcribe, percent, "", None)
    }

    #[tokio::test]
    async fn test_frames_delivered_in_publication_order() {
        let bus = ProgressBus::new();
        let job_id = job();
        let mut sub = bus.subscribe(&job_id);

        for percent in [10.0, 20.0, 30.0] {
            bus.publish(&job_id, progress(&job_id, percent));
        }

        assert_eq!(sub.recv().await.unwrap().percent(), Some(10.0));
        assert_eq!(sub.recv().await.unwrap().percent(), Some(20.0));
        assert_eq!(sub.recv().await.unwrap().percent(), Some(30.0));
    }

    #[tokio::test]
    async fn test_subscriber_gets_no_history() {
        let bus = ProgressBus::new();
        let job_id = job();

        bus.publish(&job_id, progress(&job_id, 30.0));
        let mut sub = bus.subscribe(&job_id);
        bus.publish(&job_id, progress(&job_id, 35.0));

        // The pre-subscription frame is invisible
        assert_eq!(sub.recv().await.unwrap().percent(), Some(35.0));
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_oldest_keeps_terminal() {
        let bus = ProgressBus::new();
        let job_id = job();
        let mut sub = bus.subscribe(&job_id);

        // Overflow the 32-frame buffer without polling
        for i in 0..100 {
            bus.publish(&job_id, progress(&job_id, i as f32));
        }
        assert!(bus.publish_terminal(&job_id, ProgressRecord::complete(job_id.clone())).await);

        // The subscriber skips dropped frames; whatever survives is
        // monotonic and ends with the terminal frame.
        let mut last = -1.0;
        let mut saw_terminal = false;
        while let Some(record) = sub.recv().await {
            if record.is_terminal() {
                saw_terminal = true;
                break;
            }
            let percent = record.percent().unwrap();
            assert!(percent > last, "progress regressed: {} after {}", percent, last);
            last = percent;
        }
        assert!(saw_terminal);
        // Early frames were dropped, not the newest ones
        assert!(last >= 68.0);
    }

    #[tokio::test]
    async fn test_terminal_replayed_to_late_subscriber() {
        let bus = ProgressBus::new();
        let job_id = job();

        // One live subscriber takes delivery, so the publish resolves
        let mut live = bus.subscribe(&job_id);
        assert!(
            bus.publish_terminal(&job_id, ProgressRecord::error(job_id.clone(), "boom"))
                .await
        );
        assert!(live.recv().await.unwrap().is_terminal());
        assert!(live.recv().await.is_none());

        // A late subscriber still sees the terminal frame, then the end
        let mut late = bus.subscribe(&job_id);
        let record = late.recv().await.unwrap();
        assert!(matches!(record, ProgressRecord::Error { .. }));
        assert!(late.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_times_out_without_subscribers() {
        let bus = ProgressBus::new();
        let job_id = job();
        let delivered = bus
            .publish_terminal(&job_id, ProgressRecord::complete(job_id.clone()))
            .await;
        assert!(!delivered);

        // The frame is still stored for replay
        let mut sub = bus.subscribe(&job_id);
        assert!(sub.recv().await.unwrap().is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_waits_for_first_subscriber() {
        let bus = Arc::new(ProgressBus::new());
        let job_id = job();

        let publisher = {
            let bus = Arc::clone(&bus);
            let job_id = job_id.clone();
            tokio::spawn(async move {
                bus.publish_terminal(&job_id, ProgressRecord::complete(job_id.clone()))
                    .await
            })
        };

        // Subscribe a while into the retry window
        tokio::time::sleep(Duration::from_secs(5)).await;
        let mut sub = bus.subscribe(&job_id);

        assert!(publisher.await.unwrap());
        assert!(sub.recv().await.unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_release_ends_subscriptions() {
        let bus = ProgressBus::new();
        let job_id = job();
        let mut sub = bus.subscribe(&job_id);

        bus.publish(&job_id, progress(&job_id, 10.0));
        bus.release(&job_id);
        assert_eq!(bus.topic_count(), 0);

        assert_eq!(sub.recv().await.unwrap().percent(), Some(10.0));
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = ProgressBus::new();
        let job_a = job();
        let job_b = job();
        let mut sub_b = bus.subscribe(&job_b);

        bus.publish(&job_a, progress(&job_a, 50.0));
        bus.publish(&job_b, progress(&job_b, 10.0));

        let record = sub_b.recv().await.unwrap();
        match record {
            ProgressRecord::Progress { job_id, .. } => assert_eq!(job_id, job_b),
            other => panic!("unexpected record: {:?}", other),
        }
    }
}
