use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tracing::trace;

use crate::{
    events::{Event, ExecutionComplete, ExecutionEvent, ExecutionUpdate, Message},
    runtime::Channel,
};

/// Publishes the progress of one execution onto the engine channel.
///
/// Publishing is fire-and-forget: nothing here waits on subscribers, and the
/// reporter never touches scheduler state.
pub struct Reporter {
    execution_id: String,
    channel: Arc<Channel>,
    seq: AtomicU64,
}

impl Reporter {
    pub fn new(
        execution_id: &str,
        channel: Arc<Channel>,
    ) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            channel,
            seq: AtomicU64::new(0),
        }
    }

    fn publish(
        &self,
        block_id: &str,
        event: ExecutionEvent,
    ) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let message = Message {
            execution_id: self.execution_id.clone(),
            block_id: block_id.to_string(),
            seq,
            event,
        };
        trace!(execution_id = %self.execution_id, seq, block_id, "Publish progress");
        self.channel.publish(Event::new(&message));
    }

    pub fn update(
        &self,
        update: ExecutionUpdate,
    ) {
        let block_id = update.block_id.clone();
        self.publish(&block_id, ExecutionEvent::Update(update));
    }

    pub fn complete(
        &self,
        complete: ExecutionComplete,
    ) {
        self.publish("", ExecutionEvent::Complete(complete));
    }
}
