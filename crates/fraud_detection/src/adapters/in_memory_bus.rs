// Rust guideline compliant 2026-10-18

//! In-process partitioned topic bus.
//!
//! Implements `Publisher` for producers and hands out one `MessageSource`
//! per partition to consumer groups. Each partition is an offset-addressed
//! log; consumer groups track a committed offset per partition, so a new
//! subscription resumes at the first uncommitted message (at-least-once).
//! Messages every subscribed group has committed are dropped from the log.

use std::collections::{HashMap, VecDeque};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash as _, Hasher as _};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use domain::{MessageSource, PublishError, Publisher, RawMessage, SourceError};
use parking_lot::Mutex;
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Inner state
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Stored {
    key: Option<String>,
    payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct Log {
    /// Offset of `entries[0]`.
    base: u64,
    entries: VecDeque<Stored>,
    /// Next offset to read, per subscribed consumer group.
    committed: HashMap<String, u64>,
}

impl Log {
    fn get(&self, offset: u64) -> Option<&Stored> {
        let index = usize::try_from(offset.checked_sub(self.base)?).ok()?;
        self.entries.get(index)
    }

    /// Drop entries below the lowest committed offset of any group.
    fn trim(&mut self) {
        let Some(floor) = self.committed.values().copied().min() else {
            return;
        };
        while self.base < floor && self.entries.pop_front().is_some() {
            self.base += 1;
        }
    }
}

#[derive(Debug, Default)]
struct Partition {
    log: Mutex<Log>,
    appended: Notify,
}

#[derive(Debug)]
struct Topic {
    partitions: Vec<Partition>,
    round_robin: AtomicUsize,
}

#[derive(Debug)]
struct BusInner {
    topics: HashMap<String, Topic>,
    closed: AtomicBool,
}

// ---------------------------------------------------------------------------
// InMemoryBus
// ---------------------------------------------------------------------------

/// Cheaply cloneable handle to a shared set of partitioned topics.
///
/// Topics are fixed at construction; publishing to or subscribing to any
/// other name fails with `UnknownTopic`.
#[derive(Debug, Clone)]
pub struct InMemoryBus {
    inner: Arc<BusInner>,
}

impl InMemoryBus {
    /// Create a bus with `partitions` partitions per topic (minimum one).
    #[must_use]
    pub fn new<I, T>(topics: I, partitions: u32) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let partitions = partitions.max(1);
        let topics = topics
            .into_iter()
            .map(|name| {
                let topic = Topic {
                    partitions: (0..partitions).map(|_| Partition::default()).collect(),
                    round_robin: AtomicUsize::new(0),
                };
                (name.into(), topic)
            })
            .collect();
        Self { inner: Arc::new(BusInner { topics, closed: AtomicBool::new(false) }) }
    }

    /// Subscribe `group` to every partition of `topic`.
    ///
    /// Each returned source starts at the group's committed offset for its
    /// partition, or at the oldest retained message for a new group. The
    /// group holds back trimming from then on.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::UnknownTopic`] if the topic does not exist, or
    /// [`SourceError::Rejected`] if `group` is blank.
    pub fn subscribe(&self, topic: &str, group: &str) -> Result<Vec<BusPartition>, SourceError> {
        if group.trim().is_empty() {
            return Err(SourceError::Rejected { reason: "group id must not be empty".to_owned() });
        }
        let t = self
            .inner
            .topics
            .get(topic)
            .ok_or_else(|| SourceError::UnknownTopic { topic: topic.to_owned() })?;

        let sources = (0..t.partitions.len())
            .map(|index| {
                let mut log = t.partitions[index].log.lock();
                let base = log.base;
                let committed = log.committed.entry(group.to_owned()).or_insert(base);
                let position = (*committed).max(base);
                BusPartition {
                    bus: Arc::clone(&self.inner),
                    topic: topic.to_owned(),
                    group: group.to_owned(),
                    index,
                    position,
                }
            })
            .collect();
        tracing::info!(topic, group, partitions = t.partitions.len(), "bus.subscribed");
        Ok(sources)
    }

    /// Stop accepting publishes and end every subscription once drained.
    /// Idempotent.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        for topic in self.inner.topics.values() {
            for partition in &topic.partitions {
                partition.appended.notify_waiters();
            }
        }
    }

    /// Messages of `topic` still held in memory across partitions.
    #[must_use]
    pub fn retained(&self, topic: &str) -> usize {
        self.inner
            .topics
            .get(topic)
            .map_or(0, |t| t.partitions.iter().map(|p| p.log.lock().entries.len()).sum())
    }
}

fn partition_for(topic: &Topic, key: Option<&str>) -> usize {
    let count = topic.partitions.len();
    match key {
        Some(key) => {
            let mut hasher = DefaultHasher::new();
            key.hash(&mut hasher);
            // Remainder is < count, so the conversion cannot fail.
            usize::try_from(hasher.finish() % count as u64).unwrap_or(0)
        }
        None => topic.round_robin.fetch_add(1, Ordering::Relaxed) % count,
    }
}

impl Publisher for InMemoryBus {
    async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: Vec<u8>,
    ) -> Result<(), PublishError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(PublishError::Closed);
        }
        let t = self
            .inner
            .topics
            .get(topic)
            .ok_or_else(|| PublishError::UnknownTopic { topic: topic.to_owned() })?;
        let partition = &t.partitions[partition_for(t, key)];
        partition.log.lock().entries.push_back(Stored { key: key.map(str::to_owned), payload });
        partition.appended.notify_waiters();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BusPartition
// ---------------------------------------------------------------------------

/// One partition of a subscription; implements `MessageSource`.
#[derive(Debug)]
pub struct BusPartition {
    bus: Arc<BusInner>,
    topic: String,
    group: String,
    index: usize,
    position: u64,
}

impl BusPartition {
    /// Zero-based partition number.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    fn partition(&self) -> Option<&Partition> {
        self.bus.topics.get(&self.topic).and_then(|t| t.partitions.get(self.index))
    }
}

impl MessageSource for BusPartition {
    async fn recv(&mut self) -> Option<RawMessage> {
        let bus = Arc::clone(&self.bus);
        let partition = bus.topics.get(&self.topic)?.partitions.get(self.index)?;
        loop {
            // Registered before the check so an append in between is not missed.
            let appended = partition.appended.notified();
            {
                let log = partition.log.lock();
                self.position = self.position.max(log.base);
                if let Some(stored) = log.get(self.position) {
                    let message = RawMessage {
                        topic: self.topic.clone(),
                        partition: u32::try_from(self.index).unwrap_or(u32::MAX),
                        offset: self.position,
                        key: stored.key.clone(),
                        payload: stored.payload.clone(),
                    };
                    self.position += 1;
                    return Some(message);
                }
            }
            if bus.closed.load(Ordering::SeqCst) {
                return None;
            }
            appended.await;
        }
    }

    fn commit(&mut self, offset: u64) {
        let group = self.group.clone();
        if let Some(partition) = self.partition() {
            let mut log = partition.log.lock();
            let next = log.committed.entry(group).or_insert(0);
            *next = (*next).max(offset + 1);
            log.trim();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::InMemoryBus;
    use domain::{MessageSource as _, PublishError, Publisher as _, SourceError};
    use std::time::Duration;

    fn bus(partitions: u32) -> InMemoryBus {
        InMemoryBus::new(["transactions"], partitions)
    }

    // BUS-T01: unknown topic fails for both sides.
    #[tokio::test]
    async fn unknown_topic_is_rejected() {
        let bus = bus(1);
        assert!(matches!(
            bus.subscribe("nope", "g"),
            Err(SourceError::UnknownTopic { .. })
        ));
        assert!(matches!(
            bus.publish("nope", None, vec![]).await,
            Err(PublishError::UnknownTopic { .. })
        ));
    }

    // BUS-T02: blank group is rejected.
    #[test]
    fn blank_group_is_rejected() {
        assert!(matches!(bus(1).subscribe("transactions", ""), Err(SourceError::Rejected { .. })));
    }

    // BUS-T03: same key always lands on the same partition, in order.
    #[tokio::test]
    async fn same_key_preserves_order() {
        let bus = bus(3);
        for i in 0..5u8 {
            bus.publish("transactions", Some("user_2"), vec![i]).await.unwrap();
        }
        bus.close();

        let mut seen = Vec::new();
        for mut source in bus.subscribe("transactions", "g").unwrap() {
            while let Some(message) = source.recv().await {
                seen.push((source.index(), message.offset, message.payload[0]));
            }
        }
        assert_eq!(seen.len(), 5);
        assert!(seen.iter().all(|(p, _, _)| *p == seen[0].0));
        let payloads: Vec<u8> = seen.iter().map(|(_, _, b)| *b).collect();
        assert_eq!(payloads, vec![0, 1, 2, 3, 4]);
    }

    // BUS-T04: uncommitted messages are redelivered to a new subscription.
    #[tokio::test]
    async fn uncommitted_messages_are_redelivered() {
        let bus = bus(1);
        for i in 0..3u8 {
            bus.publish("transactions", None, vec![i]).await.unwrap();
        }

        let mut first = bus.subscribe("transactions", "g").unwrap().remove(0);
        let mut other = bus.subscribe("transactions", "other").unwrap().remove(0);
        let m0 = first.recv().await.unwrap();
        let _m1 = first.recv().await.unwrap();
        first.commit(m0.offset);
        drop(first);

        let mut second = bus.subscribe("transactions", "g").unwrap().remove(0);
        assert_eq!(second.recv().await.unwrap().offset, 1);

        // Another group keeps its own position.
        assert_eq!(other.recv().await.unwrap().offset, 0);
    }

    // BUS-T05: recv waits for a later publish.
    #[tokio::test]
    async fn recv_waits_for_publish() {
        let bus = bus(1);
        let mut source = bus.subscribe("transactions", "g").unwrap().remove(0);
        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish("transactions", Some("k"), b"late".to_vec()).await.unwrap();
        });
        let message = tokio::time::timeout(Duration::from_secs(5), source.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.payload, b"late");
        assert_eq!(message.key.as_deref(), Some("k"));
    }

    // BUS-T06: close ends idle subscriptions and refuses publishes.
    #[tokio::test]
    async fn close_ends_subscriptions() {
        let bus = bus(2);
        let mut source = bus.subscribe("transactions", "g").unwrap().remove(0);
        let closer = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            closer.close();
        });
        assert!(source.recv().await.is_none());
        assert_eq!(
            bus.publish("transactions", None, vec![]).await,
            Err(PublishError::Closed)
        );
    }

    // BUS-T07: keyless publishes spread across partitions.
    #[tokio::test]
    async fn keyless_round_robin() {
        let bus = bus(3);
        for _ in 0..6 {
            bus.publish("transactions", None, vec![0]).await.unwrap();
        }
        assert_eq!(bus.retained("transactions"), 6);
        bus.close();
        for mut source in bus.subscribe("transactions", "g").unwrap() {
            let mut n = 0;
            while source.recv().await.is_some() {
                n += 1;
            }
            assert_eq!(n, 2);
        }
    }

    // BUS-T08: messages committed by the only group are released.
    #[tokio::test]
    async fn committed_messages_are_released() {
        let bus = bus(2);
        let sources = bus.subscribe("transactions", "g").unwrap();
        for i in 0..1000u32 {
            let key = format!("user_{}", i % 7);
            bus.publish("transactions", Some(&key), vec![0xAB; 1024]).await.unwrap();
        }
        assert_eq!(bus.retained("transactions"), 1000);
        bus.close();

        let mut delivered = 0;
        for mut source in sources {
            while let Some(message) = source.recv().await {
                source.commit(message.offset);
                delivered += 1;
            }
        }
        assert_eq!(delivered, 1000);
        assert_eq!(bus.retained("transactions"), 0);
    }

    // BUS-T09: a lagging group holds back trimming; offsets stay stable.
    #[tokio::test]
    async fn lagging_group_holds_messages() {
        let bus = bus(1);
        let mut fast = bus.subscribe("transactions", "fast").unwrap().remove(0);
        let mut slow = bus.subscribe("transactions", "slow").unwrap().remove(0);
        for i in 0..4u8 {
            bus.publish("transactions", None, vec![i]).await.unwrap();
        }
        for _ in 0..4 {
            let m = fast.recv().await.unwrap();
            fast.commit(m.offset);
        }
        assert_eq!(bus.retained("transactions"), 4);

        let m = slow.recv().await.unwrap();
        assert_eq!((m.offset, m.payload[0]), (0, 0));
        let m = slow.recv().await.unwrap();
        slow.commit(m.offset);
        assert_eq!(bus.retained("transactions"), 2);

        let m = slow.recv().await.unwrap();
        assert_eq!((m.offset, m.payload[0]), (2, 2));
    }

    // BUS-T10: a group joining after trimming starts at the oldest retained offset.
    #[tokio::test]
    async fn late_group_starts_at_retained_base() {
        let bus = bus(1);
        let mut early = bus.subscribe("transactions", "early").unwrap().remove(0);
        for i in 0..3u8 {
            bus.publish("transactions", None, vec![i]).await.unwrap();
        }
        let m = early.recv().await.unwrap();
        early.commit(m.offset);
        assert_eq!(bus.retained("transactions"), 2);

        let mut late = bus.subscribe("transactions", "late").unwrap().remove(0);
        let m = late.recv().await.unwrap();
        assert_eq!((m.offset, m.payload[0]), (1, 1));
    }
}
