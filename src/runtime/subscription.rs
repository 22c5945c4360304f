use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use tokio::sync::Notify;
use tracing::warn;

use crate::events::{Event, Message};

use super::channel::Matcher;

/// Bounded per-subscriber buffer of progress messages.
///
/// When full, the oldest block update is evicted. Terminal messages are never
/// evicted, so every subscriber sees the `Complete` of each matching execution.
pub(crate) struct Subscription {
    matcher: Option<Matcher>,
    capacity: usize,
    buffer: Mutex<VecDeque<Event<Message>>>,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl Subscription {
    /// `None` matches every message.
    pub fn new(
        matcher: Option<Matcher>,
        capacity: usize,
    ) -> Self {
        Self {
            matcher,
            capacity: capacity.max(1),
            buffer: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn push(
        &self,
        event: &Event<Message>,
    ) {
        if let Some(matcher) = &self.matcher {
            if !matcher.is_match(&event.execution_id, &event.block_id) {
                return;
            }
        }
        {
            let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
            buffer.push_back(event.clone());
            if buffer.len() > self.capacity {
                if let Some(pos) = buffer.iter().position(|e| !e.is_complete()) {
                    buffer.remove(pos);
                    let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if dropped.is_power_of_two() {
                        warn!(dropped, capacity = self.capacity, "Subscriber lagged, oldest progress updates dropped");
                    }
                }
            }
        }
        self.notify.notify_one();
    }

    /// Next buffered message. `None` once closed and drained.
    pub async fn next(&self) -> Option<Event<Message>> {
        loop {
            if let Some(event) = self.buffer.lock().unwrap_or_else(|e| e.into_inner()).pop_front() {
                return Some(event);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ExecutionStatus,
        events::{ExecutionComplete, ExecutionEvent, ExecutionUpdate, UpdateStatus},
    };

    fn update(
        execution_id: &str,
        block_id: &str,
        seq: u64,
    ) -> Event<Message> {
        Event::new(&Message {
            execution_id: execution_id.to_string(),
            block_id: block_id.to_string(),
            seq,
            event: ExecutionEvent::Update(ExecutionUpdate::new(execution_id, block_id, UpdateStatus::Completed)),
        })
    }

    fn complete(
        execution_id: &str,
        seq: u64,
    ) -> Event<Message> {
        Event::new(&Message {
            execution_id: execution_id.to_string(),
            block_id: String::new(),
            seq,
            event: ExecutionEvent::Complete(ExecutionComplete {
                execution_id: execution_id.to_string(),
                status: ExecutionStatus::Completed,
                final_output: None,
                error: None,
                duration_ms: 0,
            }),
        })
    }

    #[tokio::test]
    async fn test_overflow_keeps_terminal_messages() {
        let sub = Subscription::new(None, 4);
        sub.push(&update("a", "a1", 1));
        sub.push(&update("a", "a1", 2));
        sub.push(&complete("a", 3));
        for seq in 1..=6 {
            sub.push(&update("b", "x", seq));
        }
        sub.push(&complete("b", 7));
        sub.close();

        let mut received = Vec::new();
        while let Some(event) = sub.next().await {
            received.push(event);
        }
        assert_eq!(received.len(), 4);
        assert!(received[0].is_complete());
        assert_eq!(received[0].execution_id, "a");
        assert!(received[3].is_complete());
        assert_eq!(received[3].execution_id, "b");
        assert_eq!(sub.dropped.load(Ordering::Relaxed), 6);
        // survivors keep their order
        assert_eq!(received[1].seq, 5);
        assert_eq!(received[2].seq, 6);
    }

    #[tokio::test]
    async fn test_next_waits_for_push() {
        let sub = std::sync::Arc::new(Subscription::new(None, 8));
        let reader = sub.clone();
        let handle = tokio::spawn(async move { reader.next().await });
        tokio::task::yield_now().await;
        sub.push(&update("a", "a1", 1));
        let event = handle.await.unwrap().unwrap();
        assert_eq!(event.seq, 1);
    }
}
