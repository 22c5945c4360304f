//! Execution dispatcher for scheduling and running blocks.
//!
//! The dispatcher is responsible for:
//! - Tracking the in-degree of every block and dispatching the ready ones
//! - Bounding the number of concurrently running blocks
//! - Skipping blocks downstream of a failure
//! - Enforcing the workflow deadline and external cancellation
//! - Aggregating the final status and output

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::Arc,
    time::Duration,
};

use tokio::{runtime::Handle, sync::mpsc, time::Instant};
use tracing::{debug, info, trace};

use crate::{
    common::{Queue, Vars},
    error::{BlockError, ErrorKind},
    events::{ExecutionComplete, ExecutionUpdate, UpdateStatus},
    model::{BlockState, BlockStatus, ExecutionResult, ExecutionStatus},
    runtime::{Context, ExecutionCommand},
    workflow::{BlockId, Workflow},
};

use super::worker::{self, BlockOutcome, Outcome};

/// Deadline used when the configured timeout does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Scheduler of one execution.
///
/// The dispatcher loop is the only owner of block states and in-degree
/// counters. Workers report back over an mpsc channel.
pub(crate) struct Dispatcher {
    /// Execution context with variables and outputs.
    ctx: Arc<Context>,
    /// The workflow graph to execute.
    workflow: Arc<Workflow>,
    /// Queue for receiving execution commands.
    command_queue: Arc<Queue<ExecutionCommand>>,
    /// Tokio runtime for spawning workers.
    runtime: Handle,

    states: BTreeMap<BlockId, BlockState>,
    in_degree: HashMap<BlockId, usize>,
    /// Blocks with at least one failed or skipped upstream.
    doomed: HashSet<BlockId>,
    ready: VecDeque<BlockId>,
    running: usize,
    first_error: Option<String>,
}

impl Dispatcher {
    pub fn new(
        ctx: Arc<Context>,
        workflow: Arc<Workflow>,
        command_queue: Arc<Queue<ExecutionCommand>>,
        runtime: Handle,
    ) -> Self {
        let mut states = BTreeMap::new();
        let mut in_degree = HashMap::new();
        let mut ready = VecDeque::new();
        for block in workflow.blocks() {
            states.insert(block.id.clone(), BlockState::new(&block.id, &block.normalized_id, &block.name));
            let degree = workflow.in_degree(&block.id);
            if degree == 0 {
                ready.push_back(block.id.clone());
            }
            in_degree.insert(block.id.clone(), degree);
        }

        Self {
            ctx,
            workflow,
            command_queue,
            runtime,
            states,
            in_degree,
            doomed: HashSet::new(),
            ready,
            running: 0,
            first_error: None,
        }
    }

    /// Drive the execution to a terminal status.
    pub async fn run(mut self) -> ExecutionResult {
        let started = Instant::now();
        let limits = self.ctx.limits().clone();
        let deadline = started.checked_add(limits.workflow_timeout).unwrap_or(started + FAR_FUTURE);

        info!(
            execution_id = self.ctx.execution_id(),
            blocks = self.workflow.len(),
            max_parallel = limits.max_parallel_blocks,
            "Execution started"
        );
        trace!(execution_id = self.ctx.execution_id(), graph = %self.workflow.schema(), "Workflow graph");

        let (tx, mut rx) = mpsc::channel::<BlockOutcome>(self.workflow.len().max(1));
        let command_queue = self.command_queue.clone();
        let mut abort: Option<BlockError> = None;

        loop {
            while self.running < limits.max_parallel_blocks {
                let Some(block_id) = self.ready.pop_front() else {
                    break;
                };
                self.dispatch(&block_id, &tx);
            }
            if self.running == 0 {
                break;
            }

            tokio::select! {
                Some(outcome) = rx.recv() => {
                    self.running -= 1;
                    self.finish(outcome, None);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    abort = Some(BlockError::timeout(format!("workflow timed out after {}s", limits.workflow_timeout.as_secs())));
                    break;
                }
                Some(ExecutionCommand::Cancel) = command_queue.next_async() => {
                    abort = Some(BlockError::new(ErrorKind::Cancelled, "execution cancelled"));
                    break;
                }
            }
        }

        if let Some(reason) = &abort {
            info!(execution_id = self.ctx.execution_id(), running = self.running, reason = %reason, "Stopping execution");
            self.ctx.cancel();
            // only workers hold senders now, so a lost worker ends the drain
            drop(tx);
            while self.running > 0 {
                let Some(outcome) = rx.recv().await else {
                    break;
                };
                self.running -= 1;
                self.finish(outcome, Some(reason));
            }
            self.skip_pending();
        }

        self.aggregate(abort, started.elapsed().as_millis() as u64)
    }

    fn dispatch(
        &mut self,
        block_id: &str,
        tx: &mpsc::Sender<BlockOutcome>,
    ) {
        let Some(block) = self.workflow.get_block(block_id).cloned() else {
            return;
        };
        let Some(state) = self.states.get_mut(block_id) else {
            return;
        };
        if !state.transition(BlockStatus::Running) {
            return;
        }
        debug!(execution_id = self.ctx.execution_id(), block_id, block_type = block.block_type.as_ref(), "Dispatching block");

        let mut update = ExecutionUpdate::new(self.ctx.execution_id(), block_id, UpdateStatus::Running);
        update.attempt = Some(0);
        self.ctx.reporter().update(update);

        self.running += 1;
        let ctx = self.ctx.clone();
        let tx = tx.clone();
        let block_id = block_id.to_string();
        self.runtime.spawn(async move {
            let outcome = worker::guard(&block_id, worker::run_block(ctx, block)).await;
            let _ = tx.send(outcome).await;
        });
    }

    /// Apply a worker outcome. With `abort` set, downstream blocks are left pending.
    fn finish(
        &mut self,
        outcome: BlockOutcome,
        abort: Option<&BlockError>,
    ) {
        let BlockOutcome {
            block_id,
            inputs,
            result,
            attempts,
            retry_count,
        } = outcome;
        let Some(state) = self.states.get_mut(&block_id) else {
            return;
        };
        state.inputs = inputs.clone();
        state.retry_count = retry_count;
        state.retry_history = attempts;

        let mut update = ExecutionUpdate::new(self.ctx.execution_id(), &block_id, UpdateStatus::Completed);
        update.inputs = inputs;

        let completed = match result {
            Outcome::Completed(outputs) => {
                state.transition(BlockStatus::Completed);
                self.ctx.add_output(&block_id, &state.normalized_id, outputs.clone());
                state.outputs = Some(outputs.clone());
                update.output = Some(outputs);
                true
            }
            Outcome::Failed(err) => {
                Self::fail_state(state, &err, &mut self.first_error);
                update.status = UpdateStatus::Failed;
                update.error = Some(err.message);
                update.error_kind = Some(err.kind);
                false
            }
            Outcome::Aborted => {
                let err = abort.cloned().unwrap_or_else(|| BlockError::new(ErrorKind::Cancelled, "execution cancelled"));
                Self::fail_state(state, &err, &mut self.first_error);
                update.status = UpdateStatus::Failed;
                update.error = Some(err.message);
                update.error_kind = Some(err.kind);
                false
            }
        };
        debug!(
            execution_id = self.ctx.execution_id(),
            block_id = %block_id,
            status = state.status.as_ref(),
            retries = retry_count,
            duration_ms = state.duration_ms(),
            "Block finished"
        );
        self.ctx.reporter().update(update);

        if abort.is_none() {
            self.propagate(&block_id, completed);
        }
    }

    fn fail_state(
        state: &mut BlockState,
        err: &BlockError,
        first_error: &mut Option<String>,
    ) {
        state.transition(BlockStatus::Failed);
        state.error = Some(err.message.clone());
        state.error_kind = Some(err.kind);
        first_error.get_or_insert_with(|| format!("{}: {}", state.name, err.message));
    }

    /// Release successors of a terminal block, skipping the doomed ones transitively.
    fn propagate(
        &mut self,
        block_id: &str,
        completed: bool,
    ) {
        let mut stack = vec![(block_id.to_string(), completed)];
        while let Some((source, ok)) = stack.pop() {
            for target in self.workflow.successors(&source) {
                if !ok {
                    self.doomed.insert(target.clone());
                }
                let Some(degree) = self.in_degree.get_mut(&target) else {
                    continue;
                };
                *degree = degree.saturating_sub(1);
                if *degree > 0 {
                    continue;
                }
                if self.doomed.contains(&target) {
                    self.skip(&target);
                    stack.push((target, false));
                } else {
                    self.ready.push_back(target);
                }
            }
        }
    }

    fn skip(
        &mut self,
        block_id: &str,
    ) {
        if let Some(state) = self.states.get_mut(block_id) {
            if state.transition(BlockStatus::Skipped) {
                debug!(execution_id = self.ctx.execution_id(), block_id, "Block skipped");
                self.ctx.reporter().update(ExecutionUpdate::new(self.ctx.execution_id(), block_id, UpdateStatus::Skipped));
            }
        }
    }

    fn skip_pending(&mut self) {
        let pending: Vec<BlockId> = self.states.iter().filter(|(_, s)| s.status == BlockStatus::Pending).map(|(id, _)| id.clone()).collect();
        for block_id in pending {
            self.skip(&block_id);
        }
        self.ready.clear();
    }

    fn aggregate(
        self,
        abort: Option<BlockError>,
        duration_ms: u64,
    ) -> ExecutionResult {
        let completed = |id: &str| self.states.get(id).is_some_and(|s| s.status == BlockStatus::Completed);

        let mut output = Vars::new();
        match self.workflow.output_block() {
            Some(block) => {
                if let Some(outputs) = self.states.get(&block.id).and_then(|s| s.outputs.clone()) {
                    output.insert(block.normalized_id.clone(), outputs.into());
                }
            }
            None => {
                for block in self.workflow.blocks().filter(|b| self.workflow.is_terminal(&b.id)) {
                    if let Some(outputs) = self.states.get(&block.id).and_then(|s| s.outputs.clone()) {
                        output.insert(block.normalized_id.clone(), outputs.into());
                    }
                }
            }
        }

        let status = if abort.is_some() {
            ExecutionStatus::Failed
        } else if self.states.values().all(|s| s.status == BlockStatus::Completed) {
            ExecutionStatus::Completed
        } else {
            let delivered = match self.workflow.output_block() {
                Some(block) => completed(&block.id),
                None => self.workflow.blocks().any(|b| self.workflow.is_terminal(&b.id) && completed(&b.id)),
            };
            if delivered { ExecutionStatus::PartialFailure } else { ExecutionStatus::Failed }
        };

        let error = match (&abort, status) {
            (Some(reason), _) => Some(reason.message.clone()),
            (None, ExecutionStatus::Completed) => None,
            (None, _) => self.first_error.clone(),
        };

        info!(
            execution_id = self.ctx.execution_id(),
            status = status.as_ref(),
            duration_ms,
            error = error.as_deref().unwrap_or_default(),
            "Execution finished"
        );

        self.ctx.reporter().complete(ExecutionComplete {
            execution_id: self.ctx.execution_id().to_string(),
            status,
            final_output: (!output.is_empty()).then(|| output.clone()),
            error: error.clone(),
            duration_ms,
        });

        ExecutionResult {
            execution_id: self.ctx.execution_id().to_string(),
            status,
            output,
            block_states: self.states,
            error,
            duration_ms,
            validation_errors: Vec::new(),
        }
    }
}
