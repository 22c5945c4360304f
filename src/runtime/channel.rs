use std::sync::{Arc, RwLock, Weak};

use futures::{Stream, future::BoxFuture};
use tokio::runtime::Handle;

use super::subscription::Subscription;
use crate::{
    BlockflowError, Result, ShareLock,
    common::{BroadcastQueue, Shutdown},
    events::{Event, ExecutionComplete, ExecutionEvent, ExecutionUpdate, Log, Message},
};

macro_rules! dispatch_event {
    ($handles:expr, $(&$item:ident), +) => {
        let handlers = $handles.read().unwrap();
        for handle in handlers.iter() {
            (handle)($(&$item),+);
        }
    };
}

macro_rules! dispatch_event_async {
    ($handles:expr, $(&$item:ident), +) => {
        let handles = $handles.clone();

        tokio::spawn(async move {
            let handlers = handles.read().unwrap().clone();
            for handle in handlers.iter() {
                (handle)($(&$item),+).await;
            }
        });
    };
}

pub type ExecutionEventHandle = Arc<dyn Fn(&Event<Message>) + Send + Sync>;
pub type ExecutionLogHandle = Arc<dyn Fn(&Event<Log>) + Send + Sync>;
pub type ExecutionEventHandleAsync = Arc<dyn Fn(&Event<Message>) -> BoxFuture<'static, ()> + Send + Sync>;
pub type ExecutionLogHandleAsync = Arc<dyn Fn(&Event<Log>) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// use the glob pattern to match the execution id
    /// eg. exec1*
    pub execution_id: String,

    /// use the glob pattern to match the block id
    /// eg. fetch-*
    pub block_id: String,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            execution_id: "*".to_string(),
            block_id: "*".to_string(),
        }
    }
}

impl ChannelOptions {
    pub fn new(
        execution_id: String,
        block_id: String,
    ) -> Self {
        Self {
            execution_id,
            block_id,
        }
    }

    pub fn with_execution_id(execution_id: String) -> Self {
        Self {
            execution_id,
            block_id: "*".to_string(),
        }
    }

    pub fn with_block_id(block_id: String) -> Self {
        Self {
            execution_id: "*".to_string(),
            block_id,
        }
    }

    fn compile(&self) -> Result<Matcher> {
        let glob = |pattern: &str| {
            globset::Glob::new(pattern).map(|g| g.compile_matcher()).map_err(|e| BlockflowError::Engine(format!("invalid channel pattern '{pattern}': {e}")))
        };
        Ok(Matcher {
            execution_id: glob(&self.execution_id)?,
            block_id: glob(&self.block_id)?,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Matcher {
    execution_id: globset::GlobMatcher,
    block_id: globset::GlobMatcher,
}

impl Matcher {
    /// Execution-level events carry an empty block id and match any block pattern.
    pub(crate) fn is_match(
        &self,
        execution_id: &str,
        block_id: &str,
    ) -> bool {
        self.execution_id.is_match(execution_id) && (block_id.is_empty() || self.block_id.is_match(block_id))
    }
}

/// Engine-wide event bus.
///
/// Every subscriber owns a bounded buffer. Publishing never waits on
/// subscribers; a subscriber that falls behind loses its oldest block updates,
/// never an execution's terminal message. Logs go through a broadcast queue.
#[derive(Clone)]
pub struct Channel {
    event_buffer_size: usize,
    subscriptions: ShareLock<Vec<Weak<Subscription>>>,
    log_queue: Arc<BroadcastQueue<Event<Log>>>,

    events: ShareLock<Vec<ExecutionEventHandle>>,
    logs: ShareLock<Vec<ExecutionLogHandle>>,
    events_async: ShareLock<Vec<ExecutionEventHandleAsync>>,
    logs_async: ShareLock<Vec<ExecutionLogHandleAsync>>,

    runtime: Handle,
    shutdown: Shutdown,
}

impl Channel {
    pub(crate) fn new(
        event_buffer_size: usize,
        log_buffer_size: usize,
        runtime: Handle,
    ) -> Self {
        Self {
            event_buffer_size,
            subscriptions: Arc::new(RwLock::new(Vec::new())),
            log_queue: BroadcastQueue::new(log_buffer_size),
            events: Arc::new(RwLock::new(Vec::new())),
            logs: Arc::new(RwLock::new(Vec::new())),
            events_async: Arc::new(RwLock::new(Vec::new())),
            logs_async: Arc::new(RwLock::new(Vec::new())),
            runtime,
            shutdown: Shutdown::new(),
        }
    }

    pub(crate) fn log_queue(&self) -> Arc<BroadcastQueue<Event<Log>>> {
        self.log_queue.clone()
    }

    /// Deliver a progress message to every live subscription.
    pub(crate) fn publish(
        &self,
        event: Event<Message>,
    ) {
        let mut closed = false;
        for sub in self.subscriptions.read().unwrap().iter() {
            match sub.upgrade() {
                Some(sub) => sub.push(&event),
                None => closed = true,
            }
        }
        if closed {
            self.subscriptions.write().unwrap().retain(|sub| sub.strong_count() > 0);
        }
    }

    fn register(
        &self,
        matcher: Option<Matcher>,
    ) -> Arc<Subscription> {
        let sub = Arc::new(Subscription::new(matcher, self.event_buffer_size));
        let mut subscriptions = self.subscriptions.write().unwrap();
        if self.shutdown.is_terminated() {
            sub.close();
        }
        subscriptions.push(Arc::downgrade(&sub));
        sub
    }

    /// Start dispatching published messages to registered handlers.
    pub(crate) fn listen(&self) {
        let subscription = self.register(None);
        let mut log_queue = self.log_queue.subscribe();
        let events = self.events.clone();
        let logs = self.logs.clone();
        let events_async = self.events_async.clone();
        let logs_async = self.logs_async.clone();

        let shutdown = self.shutdown.clone();
        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    e = subscription.next() => match e {
                        Some(e) => {
                            let evt = e.clone();
                            dispatch_event!(events, &evt);
                            dispatch_event_async!(events_async, &e);
                        }
                        None => break,
                    },
                    log = log_queue.recv() => match log {
                        Ok(log) => {
                            let l = log.clone();
                            dispatch_event!(logs, &l);
                            dispatch_event_async!(logs_async, &log);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                        Err(_) => break,
                    },
                }
            }
        });
    }

    /// Stream of messages matching `options`, starting from now.
    ///
    /// Messages published while the stream is not polled are buffered up to the
    /// channel capacity. Beyond that the oldest block updates are skipped; the
    /// `Complete` of every matching execution is always delivered. The stream
    /// ends when the engine shuts down.
    pub fn subscribe(
        &self,
        options: ChannelOptions,
    ) -> Result<impl Stream<Item = Event<Message>> + Send + 'static> {
        let subscription = self.register(Some(options.compile()?));
        let stream = futures::stream::unfold(subscription, |sub| async move { sub.next().await.map(|e| (e, sub)) });
        Ok(stream)
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown.shutdown();
        for sub in self.subscriptions.read().unwrap().iter() {
            if let Some(sub) = sub.upgrade() {
                sub.close();
            }
        }
    }
}

/// Handler registration filtered by execution and block id globs.
#[derive(Clone)]
pub struct ChannelEvent {
    channel: Arc<Channel>,

    matcher: Matcher,
}

impl ChannelEvent {
    pub fn channel(
        channel: Arc<Channel>,
        options: ChannelOptions,
    ) -> Result<Self> {
        Ok(Self {
            channel,
            matcher: options.compile()?,
        })
    }

    /// Called with the terminal summary of each matching execution.
    pub fn on_complete(
        &self,
        f: impl Fn(&ExecutionComplete) + Send + Sync + 'static,
    ) {
        let matcher = self.matcher.clone();

        self.channel.events.write().unwrap().push(Arc::new(move |e| {
            if let ExecutionEvent::Complete(complete) = &e.event {
                if matcher.is_match(&e.execution_id, &e.block_id) {
                    f(complete);
                }
            }
        }));
    }

    /// Called with every block transition.
    pub fn on_update(
        &self,
        f: impl Fn(&ExecutionUpdate) + Send + Sync + 'static,
    ) {
        let matcher = self.matcher.clone();

        self.channel.events.write().unwrap().push(Arc::new(move |e| {
            if let ExecutionEvent::Update(update) = &e.event {
                if matcher.is_match(&e.execution_id, &e.block_id) {
                    f(update);
                }
            }
        }));
    }

    pub fn on_error(
        &self,
        f: impl Fn(&Event<Message>) + Send + Sync + 'static,
    ) {
        let matcher = self.matcher.clone();

        self.channel.events.write().unwrap().push(Arc::new(move |e| {
            if e.is_error() && matcher.is_match(&e.execution_id, &e.block_id) {
                f(e);
            }
        }));
    }

    pub fn on_event(
        &self,
        f: impl Fn(&Event<Message>) + Send + Sync + 'static,
    ) {
        let matcher = self.matcher.clone();

        self.channel.events.write().unwrap().push(Arc::new(move |e| {
            if matcher.is_match(&e.execution_id, &e.block_id) {
                f(e);
            }
        }));
    }

    pub fn on_log(
        &self,
        f: impl Fn(&Event<Log>) + Send + Sync + 'static,
    ) {
        let matcher = self.matcher.clone();

        self.channel.logs.write().unwrap().push(Arc::new(move |e| {
            if matcher.is_match(&e.execution_id, &e.block_id) {
                f(e);
            }
        }));
    }

    pub fn on_event_async<F>(
        &self,
        f: F,
    ) where
        F: Fn(&Event<Message>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let matcher = self.matcher.clone();

        self.channel.events_async.write().unwrap().push(Arc::new(move |e| {
            if matcher.is_match(&e.execution_id, &e.block_id) {
                f(e)
            } else {
                Box::pin(async {})
            }
        }));
    }

    pub fn on_log_async<F>(
        &self,
        f: F,
    ) where
        F: Fn(&Event<Log>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let matcher = self.matcher.clone();

        self.channel.logs_async.write().unwrap().push(Arc::new(move |e| {
            if matcher.is_match(&e.execution_id, &e.block_id) {
                f(e)
            } else {
                Box::pin(async {})
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matcher_globs() {
        let matcher = ChannelOptions::new("exec-*".to_string(), "fetch-*".to_string()).compile().unwrap();
        assert!(matcher.is_match("exec-1", "fetch-news"));
        assert!(matcher.is_match("exec-1", ""));
        assert!(!matcher.is_match("exec-1", "summarize"));
        assert!(!matcher.is_match("other", "fetch-news"));
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        assert!(ChannelOptions::with_block_id("[".to_string()).compile().is_err());
    }

    fn update(
        execution_id: &str,
        block_id: &str,
    ) -> Event<Message> {
        Event::new(&Message {
            execution_id: execution_id.to_string(),
            block_id: block_id.to_string(),
            seq: 1,
            event: ExecutionEvent::Update(ExecutionUpdate::new(execution_id, block_id, crate::UpdateStatus::Running)),
        })
    }

    #[tokio::test]
    async fn test_subscribe_filters_and_ends_on_shutdown() {
        use tokio_stream::StreamExt;

        let channel = Channel::new(8, 8, Handle::current());
        let stream = channel.subscribe(ChannelOptions::with_execution_id("exec-1".to_string())).unwrap();
        channel.publish(update("exec-1", "a"));
        channel.publish(update("exec-2", "a"));
        channel.publish(update("exec-1", "b"));
        channel.shutdown();

        let blocks: Vec<String> = stream.map(|e| e.block_id.clone()).collect().await;
        assert_eq!(blocks, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let channel = Channel::new(8, 8, Handle::current());
        let stream = channel.subscribe(ChannelOptions::default()).unwrap();
        assert_eq!(channel.subscriptions.read().unwrap().len(), 1);
        drop(stream);
        channel.publish(update("exec-1", "a"));
        assert!(channel.subscriptions.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_after_shutdown_ends_immediately() {
        use tokio_stream::StreamExt;

        let channel = Channel::new(8, 8, Handle::current());
        channel.shutdown();
        let mut stream = Box::pin(channel.subscribe(ChannelOptions::default()).unwrap());
        assert!(stream.next().await.is_none());
    }
}
