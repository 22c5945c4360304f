//! Execution of one block: interpolation, attempts, timeouts and retries.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    common::Vars,
    error::{BlockError, ErrorKind},
    events::{ExecutionUpdate, UpdateStatus},
    model::RetryAttempt,
    retry::should_retry,
    runtime::Context,
    utils,
    workflow::{
        Block, BlockId,
        actions::BlockAction,
        template,
    },
};

#[derive(Debug)]
pub(crate) enum Outcome {
    Completed(Vars),
    Failed(BlockError),
    /// The execution was stopped while the block ran.
    Aborted,
}

/// What a worker hands back to the scheduler when its block is done.
#[derive(Debug)]
pub(crate) struct BlockOutcome {
    pub block_id: BlockId,
    /// Config after interpolation, `None` when interpolation failed.
    pub inputs: Option<Value>,
    pub result: Outcome,
    pub attempts: Vec<RetryAttempt>,
    pub retry_count: u32,
}

impl BlockOutcome {
    fn new(block_id: &str) -> Self {
        Self {
            block_id: block_id.to_string(),
            inputs: None,
            result: Outcome::Aborted,
            attempts: Vec::new(),
            retry_count: 0,
        }
    }

    fn fail(
        mut self,
        error: BlockError,
    ) -> Self {
        self.result = Outcome::Failed(error);
        self
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Await a worker, turning a panic anywhere in it into a permanent failure.
pub(crate) async fn guard(
    block_id: &str,
    worker: impl Future<Output = BlockOutcome>,
) -> BlockOutcome {
    match AssertUnwindSafe(worker).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => {
            let message = panic_message(&panic);
            warn!(block_id, panic = %message, "Block worker panicked");
            BlockOutcome::new(block_id).fail(BlockError::new(ErrorKind::Permanent, format!("block panicked: {message}")))
        }
    }
}

pub(crate) async fn run_block(
    ctx: Arc<Context>,
    block: Block,
) -> BlockOutcome {
    let mut outcome = BlockOutcome::new(&block.id);

    let resolved = match template::resolve_value(&block.config, &ctx.scope()) {
        Ok(resolved) => resolved,
        Err(err) => {
            outcome.attempts.push(RetryAttempt::failed(0, &err, utils::time::time_millis(), 0));
            return outcome.fail(err);
        }
    };
    outcome.inputs = Some(resolved.clone());

    let action = match BlockAction::create(block.block_type, resolved) {
        Ok(action) => action,
        Err(err) => {
            let err = BlockError::validation(err.to_string());
            outcome.attempts.push(RetryAttempt::failed(0, &err, utils::time::time_millis(), 0));
            return outcome.fail(err);
        }
    };

    let timeout = block.timeout.unwrap_or(ctx.limits().block_timeout);
    let mut attempt = 0;
    let mut last_source = None;
    loop {
        let timestamp = utils::time::time_millis();
        let started = Instant::now();
        let run = AssertUnwindSafe(action.run(ctx.clone(), &block.id)).catch_unwind();

        let result = tokio::select! {
            _ = ctx.wait_shutdown() => return outcome,
            res = tokio::time::timeout(timeout, run) => match res {
                Err(_) => Err(BlockError::timeout(format!("block timed out after {}s", timeout.as_secs_f64()))),
                Ok(Err(panic)) => Err(BlockError::new(ErrorKind::Permanent, format!("block panicked: {}", panic_message(&panic)))),
                Ok(Ok(result)) => result,
            },
        };
        let elapsed = started.elapsed().as_millis() as u64;

        let err = match result {
            Ok(outputs) => {
                outcome.attempts.push(RetryAttempt::succeeded(attempt, timestamp, elapsed));
                ctx.breaker().record_success(last_source);
                outcome.result = Outcome::Completed(outputs);
                return outcome;
            }
            Err(err) => err,
        };
        outcome.attempts.push(RetryAttempt::failed(attempt, &err, timestamp, elapsed));
        last_source = err.source_key();

        let open = ctx.breaker().record_failure(&err);
        let Some(delay) = should_retry(attempt, err.kind, &block.retry) else {
            return outcome.fail(err);
        };
        if open {
            warn!(block_id = %block.id, source = last_source.unwrap_or_default(), error = %err, "Circuit open, not retrying");
            return outcome.fail(err);
        }

        let delay = err.retry_after.map_or(delay, |after| delay.max(after));
        warn!(block_id = %block.id, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %err, "Retrying block");

        let mut update = ExecutionUpdate::new(ctx.execution_id(), &block.id, UpdateStatus::Retrying);
        update.error = Some(err.message.clone());
        update.error_kind = Some(err.kind);
        update.attempt = Some(attempt + 1);
        ctx.reporter().update(update);

        outcome.retry_count += 1;
        attempt += 1;

        tokio::select! {
            _ = ctx.wait_shutdown() => return outcome,
            _ = tokio::time::sleep(delay) => {}
        }
        debug!(block_id = %block.id, attempt, "Starting retry attempt");
    }
}
