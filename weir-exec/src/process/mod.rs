//! Process-step internals: task context, operator contexts and the
//! relational operators.

pub mod context;
pub mod ops;
pub mod variable_table;

use std::sync::Arc;

use weir_storage::{Database, Strand};

use crate::config::Config;
use crate::error::ExecError;
use crate::eval::context::EvaluatorContext;
use crate::io::{GroupReader, RecordReader, RecordWriter};
use crate::memory::{global_page_pool, LifoPagedMemoryResource, PagePool};
use crate::scheduler::CancelHandle;

use context::ContextContainer;
use variable_table::{VariableTable, VariableTableInfo};

/// A reader attached to a task, either record- or group-shaped.
pub enum ReaderHandle {
    /// Flat record source.
    Record(Box<dyn RecordReader>),
    /// Key-grouped source.
    Group(Box<dyn GroupReader>),
}

impl core::fmt::Debug for ReaderHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Record(_) => f.write_str("ReaderHandle::Record"),
            Self::Group(_) => f.write_str("ReaderHandle::Group"),
        }
    }
}

/// Mutable per-task state shared by the operators of one process step.
///
/// Operators obtain their own per-operator context lazily from the container
/// and reuse it on subsequent calls; the variable table is written by the
/// source side and read by everything downstream.
pub struct TaskContext {
    pub(crate) config: Arc<Config>,
    pub(crate) variables: VariableTable,
    pub(crate) contexts: ContextContainer,
    pub(crate) resource: LifoPagedMemoryResource,
    pub(crate) varlen_resource: LifoPagedMemoryResource,
    pub(crate) eval_ctx: EvaluatorContext,
    pub(crate) readers: Vec<Option<ReaderHandle>>,
    pub(crate) writers: Vec<Option<Box<dyn RecordWriter>>>,
    pub(crate) result_writer: Option<Box<dyn RecordWriter>>,
    pub(crate) cancel: CancelHandle,
    pub(crate) database: Option<Database>,
    pub(crate) transaction: Option<Strand>,
    pub(crate) empty_input_from_shuffle: bool,
    pub(crate) error: Option<ExecError>,
    pub(crate) partition: usize,
}

impl TaskContext {
    /// Creates a context over the given variable-table shape.
    pub fn new(config: Arc<Config>, variables: Arc<VariableTableInfo>) -> Self {
        Self::with_pool(config, variables, global_page_pool())
    }

    /// Creates a context drawing task memory from `pool`.
    pub fn with_pool(
        config: Arc<Config>,
        variables: Arc<VariableTableInfo>,
        pool: Arc<PagePool>,
    ) -> Self {
        let eval_ctx = EvaluatorContext::new(Arc::clone(&config));
        Self {
            config,
            variables: VariableTable::new(variables),
            contexts: ContextContainer::default(),
            resource: LifoPagedMemoryResource::new(Arc::clone(&pool)),
            varlen_resource: LifoPagedMemoryResource::new(pool),
            eval_ctx,
            readers: Vec::new(),
            writers: Vec::new(),
            result_writer: None,
            cancel: CancelHandle::default(),
            database: None,
            transaction: None,
            empty_input_from_shuffle: false,
            error: None,
            partition: 0,
        }
    }

    /// Attaches the database the scan/find/write operators use.
    #[must_use]
    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    /// Attaches the transaction strand, also exposing it to expression
    /// evaluation (function calls, LOB materialization).
    #[must_use]
    pub fn with_transaction(mut self, transaction: Strand) -> Self {
        self.eval_ctx.set_transaction(transaction.clone());
        self.transaction = Some(transaction);
        self
    }

    /// Attaches the cancel handle the operators poll.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Attaches the result writer for emit operators.
    #[must_use]
    pub fn with_result_writer(mut self, writer: Box<dyn RecordWriter>) -> Self {
        self.result_writer = Some(writer);
        self
    }

    /// Appends a reader, returning its index.
    pub fn add_reader(&mut self, reader: ReaderHandle) -> usize {
        self.readers.push(Some(reader));
        self.readers.len() - 1
    }

    /// Appends a writer, returning its index.
    pub fn add_writer(&mut self, writer: Box<dyn RecordWriter>) -> usize {
        self.writers.push(Some(writer));
        self.writers.len() - 1
    }

    /// Marks this task as reading an exchange that produced no records.
    pub fn set_empty_input_from_shuffle(&mut self, empty: bool) {
        self.empty_input_from_shuffle = empty;
    }

    /// The variable table of the block.
    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    /// Mutable access to the variable table.
    pub fn variables_mut(&mut self) -> &mut VariableTable {
        &mut self.variables
    }

    /// Takes the reader at `index` out of the context.
    pub(crate) fn take_reader(&mut self, index: usize) -> Option<ReaderHandle> {
        self.readers.get_mut(index).and_then(Option::take)
    }

    /// The error recorded by an aborted operator, if any.
    pub fn error(&self) -> Option<&ExecError> {
        self.error.as_ref()
    }

    /// Takes the recorded error.
    pub fn take_error(&mut self) -> Option<ExecError> {
        self.error.take()
    }

    /// Records the first error of the task.
    pub(crate) fn record_error(&mut self, error: ExecError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

impl core::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskContext")
            .field("partition", &self.partition)
            .field("readers", &self.readers.len())
            .field("writers", &self.writers.len())
            .field("error", &self.error)
            .finish()
    }
}
