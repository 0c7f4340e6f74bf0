//! DAG controller: drives a step graph to completion on the scheduler.

use std::sync::{Arc, Mutex};

use weir_storage::{Database, Strand};

use crate::config::Config;
use crate::error::{ExecError, Result};
use crate::exchange::ExchangeKind;
use crate::graph::{ExchangeData, StepGraph, StepId, StepKind};
use crate::process::ops::{OperationStatus, RecordOperator};
use crate::process::{ReaderHandle, TaskContext};

use super::pool::TaskScheduler;
use super::task::{CancellationSource, Task, TaskResult};

/// Request-level execution environment shared by every task of one job.
#[derive(Clone)]
pub struct ExecutionEnv {
    /// Engine configuration.
    pub config: Arc<Config>,
    /// The database scans and writes go through.
    pub database: Option<Database>,
    /// The transaction strand of the request.
    pub transaction: Option<Strand>,
    /// The request's cancel source.
    pub cancel: CancellationSource,
}

impl ExecutionEnv {
    /// Creates an environment with the given configuration.
    pub fn new(config: Arc<Config>) -> Self {
        Self { config, database: None, transaction: None, cancel: CancellationSource::new() }
    }
}

struct ProcessTask {
    source: Arc<dyn RecordOperator>,
    ctx: TaskContext,
    failure: Arc<Mutex<Option<ExecError>>>,
}

impl Task for ProcessTask {
    fn run(&mut self) -> TaskResult {
        match self.source.process_record(&mut self.ctx) {
            OperationStatus::Ok => TaskResult::Complete,
            OperationStatus::Yield => TaskResult::Yield,
            OperationStatus::Aborted => {
                let error = self
                    .ctx
                    .take_error()
                    .unwrap_or_else(|| ExecError::aborted("task aborted"));
                let mut slot = self.failure.lock().expect("poisoned");
                if slot.is_none() {
                    *slot = Some(error);
                }
                TaskResult::Aborted
            }
        }
    }

    fn preferred_worker(&self) -> Option<usize> {
        Some(self.ctx.partition)
    }
}

/// Drives step graphs: activation, task creation per step wave, barrier
/// completion, deactivation.
pub struct DagController {
    scheduler: Arc<TaskScheduler>,
}

impl DagController {
    /// Creates a controller running on `scheduler`.
    pub fn new(scheduler: Arc<TaskScheduler>) -> Self {
        Self { scheduler }
    }

    /// Runs `graph` to completion.
    ///
    /// Steps execute in topological waves: a process step's tasks only start
    /// after every upstream exchange has been fully produced, which is what
    /// makes the cogroup merge see flushed, sorted partitions.
    pub fn schedule(&self, graph: &mut StepGraph, env: &ExecutionEnv) -> Result<()> {
        let order = graph.topological_order()?;
        for &id in &order {
            if let Some(step) = graph.step_mut(id) {
                step.activate();
            }
        }

        let failure: Arc<Mutex<Option<ExecError>>> = Arc::new(Mutex::new(None));
        for &id in &order {
            if env.cancel.is_cancelled() {
                break;
            }
            let is_process =
                matches!(graph.step(id).map(|s| s.kind()), Some(StepKind::Process(_)));
            if !is_process {
                continue;
            }
            self.run_process_step(graph, id, env, &failure)?;
            if let Some(step) = graph.step_mut(id) {
                step.mark_tasks_created();
            }
            if failure.lock().expect("poisoned").is_some() {
                break;
            }
        }

        for &id in &order {
            if let Some(step) = graph.step_mut(id) {
                step.deactivate();
            }
        }

        if env.cancel.is_cancelled() {
            return Err(ExecError::aborted("request cancelled"));
        }
        let outcome = failure.lock().expect("poisoned").take();
        match outcome {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn run_process_step(
        &self,
        graph: &StepGraph,
        id: StepId,
        env: &ExecutionEnv,
        failure: &Arc<Mutex<Option<ExecError>>>,
    ) -> Result<()> {
        let step = graph.step(id).expect("step id from order");
        let StepKind::Process(process) = step.kind() else {
            unreachable!("checked by caller");
        };

        // a step reading a shuffle runs one task per exchange partition
        let mut partitions = process.partitions;
        let mut shuffle_inputs_empty = true;
        let mut has_shuffle_input = false;
        for &input in step.inputs() {
            if let Some(StepKind::Exchange(exchange)) = graph.step(input).map(|s| s.kind()) {
                if exchange.kind == ExchangeKind::Shuffle {
                    has_shuffle_input = true;
                    if let Some(group) = exchange.group_exchange() {
                        partitions = group.partition_count();
                        shuffle_inputs_empty &= group.is_empty();
                    }
                }
            }
        }
        let empty_input_from_shuffle = has_shuffle_input && shuffle_inputs_empty;

        for partition in 0..partitions {
            let mut ctx = TaskContext::new(
                Arc::clone(&env.config),
                Arc::clone(&process.spec.variable_info),
            )
            .with_cancel(env.cancel.handle());
            if let Some(database) = &env.database {
                ctx = ctx.with_database(database.clone());
            }
            if let Some(transaction) = &env.transaction {
                ctx = ctx.with_transaction(transaction.clone());
            }
            ctx.partition = partition;
            ctx.set_empty_input_from_shuffle(empty_input_from_shuffle);

            for &input in step.inputs() {
                let Some(input_step) = graph.step(input) else { continue };
                let StepKind::Exchange(exchange) = input_step.kind() else { continue };
                match exchange.data() {
                    Some(ExchangeData::Group(group)) => {
                        ctx.add_reader(ReaderHandle::Group(Box::new(group.reader(partition))));
                    }
                    Some(ExchangeData::Forward(forward)) => {
                        ctx.add_reader(ReaderHandle::Record(Box::new(forward.reader())));
                    }
                    None => {
                        return Err(ExecError::new(
                            crate::error::Status::Internal,
                            "upstream exchange is not activated",
                        ))
                    }
                }
            }
            for &output in step.outputs() {
                match graph.step(output).map(|s| s.kind()) {
                    Some(StepKind::Exchange(exchange)) => match exchange.data() {
                        Some(ExchangeData::Group(group)) => {
                            ctx.add_writer(Box::new(group.writer()));
                        }
                        Some(ExchangeData::Forward(forward)) => {
                            ctx.add_writer(Box::new(forward.writer()));
                        }
                        None => {
                            return Err(ExecError::new(
                                crate::error::Status::Internal,
                                "downstream exchange is not activated",
                            ))
                        }
                    },
                    Some(StepKind::Deliver(deliver)) => {
                        ctx = ctx.with_result_writer((deliver.writer_factory)());
                    }
                    _ => {}
                }
            }

            tracing::debug!(step = %id, partition, "process task scheduled");
            self.scheduler.schedule(Box::new(ProcessTask {
                source: Arc::clone(&process.spec.source),
                ctx,
                failure: Arc::clone(failure),
            }));
        }
        // barrier: downstream steps read fully produced exchanges
        self.scheduler.wait_for_idle();
        Ok(())
    }
}
