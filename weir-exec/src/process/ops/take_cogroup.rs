//! Take-cogroup operator: N-way sorted merge over group readers.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use weir_types::Record;

use crate::data::IterableRecordStore;
use crate::error::{ExecError, Status};
use crate::exchange::group::GroupShuffleInfo;
use crate::io::GroupReader;
use crate::memory::global_page_pool;
use crate::process::context::ContextCore;
use crate::process::{ReaderHandle, TaskContext};

use super::{
    Cogroup, CogroupOperator, Group, OperationStatus, OperatorContext, OperatorIndex, OperatorKind,
    RecordOperator,
};

/// One cogroup input: the reader index and the shuffle metadata of its
/// upstream exchange. Key layouts are identical across inputs.
#[derive(Debug, Clone)]
pub struct CogroupInputSpec {
    /// Index of the group reader in the task context.
    pub reader_index: usize,
    /// Shuffle metadata of the upstream exchange.
    pub info: Arc<GroupShuffleInfo>,
}

/// Reads one input's groups ahead by one key and stores the filled members.
struct GroupInput {
    reader: Box<dyn GroupReader>,
    info: Arc<GroupShuffleInfo>,
    store: IterableRecordStore,
    current_key: Option<Record>,
    next_key: Option<Record>,
    reader_eof: bool,
    values_filled: bool,
}

impl GroupInput {
    fn new(reader: Box<dyn GroupReader>, info: Arc<GroupShuffleInfo>) -> Self {
        let store = IterableRecordStore::new(global_page_pool(), Arc::clone(info.value_meta()));
        Self {
            reader,
            info,
            store,
            current_key: None,
            next_key: None,
            reader_eof: false,
            values_filled: false,
        }
    }

    /// Pre-reads the next key. Returns false at EOF.
    fn read_next_key(&mut self) -> bool {
        if self.reader.next_group() {
            self.next_key = Some(self.reader.get_group());
            true
        } else {
            self.reader_eof = true;
            self.next_key = None;
            false
        }
    }

    /// Drains the pre-read group's members into the store and swaps the next
    /// key into the current key.
    fn fill(&mut self) {
        debug_assert!(self.next_key.is_some());
        while self.reader.next_member() {
            self.store.append(&self.reader.get_member());
        }
        self.current_key = self.next_key.take();
        self.values_filled = true;
    }

    fn reset_values(&mut self) {
        self.store.reset();
        self.current_key = None;
        self.values_filled = false;
    }

    fn eof(&self) -> bool {
        self.reader_eof
    }

    fn to_group(&self) -> Group {
        if !self.values_filled {
            return Group::default();
        }
        Group {
            key: self.current_key.clone(),
            members: self.store.iter().collect(),
        }
    }
}

impl core::fmt::Debug for GroupInput {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GroupInput")
            .field("eof", &self.reader_eof)
            .field("filled", &self.values_filled)
            .field("stored", &self.store.len())
            .finish()
    }
}

struct HeapEntry {
    key: Record,
    input: usize,
    info: Arc<GroupShuffleInfo>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed for min-heap behavior on the max-heap
        self.info
            .compare_keys(&self.key, &other.key)
            .then_with(|| self.input.cmp(&other.input))
            .reverse()
    }
}

/// Per-task cogroup state: the inputs and the min-heap of pre-read keys.
///
/// The heap holds exactly the inputs with a pre-read next key; after an input
/// is filled it re-reads and re-enters unless at EOF.
pub struct TakeCogroupContext {
    /// Shared context core.
    pub core: ContextCore,
    inputs: Vec<GroupInput>,
    queue: BinaryHeap<HeapEntry>,
}

impl TakeCogroupContext {
    fn new() -> Self {
        Self { core: ContextCore::new(), inputs: Vec::new(), queue: BinaryHeap::new() }
    }
}

impl core::fmt::Debug for TakeCogroupContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TakeCogroupContext")
            .field("core", &self.core)
            .field("inputs", &self.inputs)
            .field("queued", &self.queue.len())
            .finish()
    }
}

enum State {
    Init,
    KeysFilled,
    ValuesFilled,
    End,
}

/// Merges N already-sorted group streams and delivers one cogroup per
/// distinct key, globally key-ordered.
pub struct TakeCogroup {
    index: OperatorIndex,
    inputs: Vec<CogroupInputSpec>,
    downstream: Box<dyn CogroupOperator>,
}

impl TakeCogroup {
    /// Creates the operator over the given inputs.
    pub fn new(
        index: OperatorIndex,
        inputs: Vec<CogroupInputSpec>,
        downstream: Box<dyn CogroupOperator>,
    ) -> Self {
        debug_assert!(!inputs.is_empty());
        Self { index, inputs, downstream }
    }

    fn create_inputs(&self, ctx: &mut TaskContext) -> Result<Vec<GroupInput>, ExecError> {
        let mut inputs = Vec::with_capacity(self.inputs.len());
        for spec in &self.inputs {
            match ctx.take_reader(spec.reader_index) {
                Some(ReaderHandle::Group(reader)) => {
                    inputs.push(GroupInput::new(reader, Arc::clone(&spec.info)));
                }
                _ => {
                    return Err(ExecError::new(
                        Status::Internal,
                        format!("group reader {} is missing", spec.reader_index),
                    ))
                }
            }
        }
        Ok(inputs)
    }

    fn abort(
        &self,
        ctx: &mut TaskContext,
        mut op_ctx: OperatorContext,
        error: Option<ExecError>,
    ) -> OperationStatus {
        if let Some(error) = error {
            ctx.record_error(error);
        }
        op_ctx.core_mut().abort();
        ctx.contexts.put(self.index, op_ctx);
        self.finish(ctx);
        OperationStatus::Aborted
    }
}

impl RecordOperator for TakeCogroup {
    fn process_record(&self, ctx: &mut TaskContext) -> OperationStatus {
        let mut op_ctx = ctx
            .contexts
            .take(self.index)
            .unwrap_or_else(|| OperatorContext::TakeCogroup(TakeCogroupContext::new()));
        {
            let OperatorContext::TakeCogroup(cg_ctx) = &mut op_ctx else {
                unreachable!("context kind mismatch");
            };
            if cg_ctx.core.inactive() {
                ctx.contexts.put(self.index, op_ctx);
                return OperationStatus::Aborted;
            }
            if cg_ctx.inputs.is_empty() {
                match self.create_inputs(ctx) {
                    Ok(inputs) => cg_ctx.inputs = inputs,
                    Err(e) => return self.abort(ctx, op_ctx, Some(e)),
                }
            }
        }

        let mut state = State::Init;
        loop {
            if ctx.cancel.is_cancelled() {
                return self.abort(ctx, op_ctx, Some(ExecError::aborted("request cancelled")));
            }
            let OperatorContext::TakeCogroup(cg_ctx) = &mut op_ctx else {
                unreachable!("context kind mismatch");
            };
            match state {
                State::Init => {
                    for index in 0..cg_ctx.inputs.len() {
                        let input = &mut cg_ctx.inputs[index];
                        if input.read_next_key() {
                            cg_ctx.queue.push(HeapEntry {
                                key: input.next_key.clone().expect("read above"),
                                input: index,
                                info: Arc::clone(&input.info),
                            });
                        } else {
                            debug_assert!(input.eof());
                        }
                    }
                    state = State::KeysFilled;
                }
                State::KeysFilled => {
                    let Some(top) = cg_ctx.queue.pop() else {
                        // all inputs are at EOF
                        state = State::End;
                        continue;
                    };
                    let index = top.input;
                    cg_ctx.inputs[index].fill();
                    if cg_ctx.inputs[index].read_next_key() {
                        let input = &cg_ctx.inputs[index];
                        cg_ctx.queue.push(HeapEntry {
                            key: input.next_key.clone().expect("read above"),
                            input: index,
                            info: Arc::clone(&input.info),
                        });
                    }
                    // pull every other input whose next key matches
                    loop {
                        let Some(peek) = cg_ctx.queue.peek() else { break };
                        if peek.input == index {
                            break;
                        }
                        let current = cg_ctx.inputs[index]
                            .current_key
                            .as_ref()
                            .expect("filled above");
                        let info = Arc::clone(&cg_ctx.inputs[peek.input].info);
                        if info.compare_keys(&peek.key, current) != Ordering::Equal {
                            break;
                        }
                        let entry = cg_ctx.queue.pop().expect("peeked");
                        cg_ctx.inputs[entry.input].fill();
                        if cg_ctx.inputs[entry.input].read_next_key() {
                            let input = &cg_ctx.inputs[entry.input];
                            cg_ctx.queue.push(HeapEntry {
                                key: input.next_key.clone().expect("read above"),
                                input: entry.input,
                                info: Arc::clone(&input.info),
                            });
                        }
                    }
                    state = State::ValuesFilled;
                }
                State::ValuesFilled => {
                    let cogroup = Cogroup {
                        groups: cg_ctx.inputs.iter().map(GroupInput::to_group).collect(),
                    };
                    if !self.downstream.process_cogroup(ctx, &cogroup).is_ok() {
                        return self.abort(ctx, op_ctx, None);
                    }
                    let OperatorContext::TakeCogroup(cg_ctx) = &mut op_ctx else {
                        unreachable!("context kind mismatch");
                    };
                    for input in &mut cg_ctx.inputs {
                        input.reset_values();
                    }
                    state = State::KeysFilled;
                }
                State::End => break,
            }
        }
        ctx.contexts.put(self.index, op_ctx);
        self.finish(ctx);
        OperationStatus::Ok
    }

    fn finish(&self, ctx: &mut TaskContext) {
        if let Some(mut op_ctx) = ctx.contexts.take(self.index) {
            if let OperatorContext::TakeCogroup(cg_ctx) = &mut op_ctx {
                for input in &mut cg_ctx.inputs {
                    input.reset_values();
                }
            }
            ctx.contexts.put(self.index, op_ctx);
        }
        self.downstream.finish(ctx);
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::TakeCogroup
    }

    fn index(&self) -> OperatorIndex {
        self.index
    }
}
