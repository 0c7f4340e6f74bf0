//! Relational operators.
//!
//! Operators form a chain inside one process step: a source (scan, find,
//! take-flat, take-group, take-cogroup) drives the downstream record/group
//! operators. Every operator exposes a process method advancing by one input
//! unit and a `finish` draining terminal state, and locates its per-task
//! context in the container by operator index.

pub mod aggregate_group;
pub mod emit;
pub mod filter;
pub mod find;
pub mod offer;
pub mod scan;
pub mod take_cogroup;
pub mod take_flat;
pub mod take_group;
pub mod write;

use weir_types::{ErrorKind, Record, Value};

use crate::error::{status_for_error_kind, ExecError};

use super::context::ContextCore;
use super::TaskContext;

pub use aggregate_group::{AggregateGroup, AggregateGroupContext};
pub use emit::{Emit, EmitContext};
pub use filter::{Filter, FilterContext};
pub use find::{Find, FindContext};
pub use offer::{Offer, OfferContext};
pub use scan::{Scan, ScanBound, ScanBounds, ScanContext};
pub use take_cogroup::{TakeCogroup, TakeCogroupContext};
pub use take_flat::{TakeFlat, TakeFlatContext};
pub use take_group::{TakeGroup, TakeGroupContext};
pub use write::{WriteContext, WriteExisting, WritePartial, WritePartialKind};

/// Identifier of an operator within its process step.
pub type OperatorIndex = usize;

/// Kind tag of an operator; context objects mirror it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum OperatorKind {
    /// Range scan over a primary or secondary index.
    Scan,
    /// Point lookup.
    Find,
    /// Predicate filter.
    Filter,
    /// Projection into the result writer.
    Emit,
    /// Projection into an exchange writer.
    Offer,
    /// Pull from a record reader.
    TakeFlat,
    /// Pull groups from a group reader.
    TakeGroup,
    /// N-way sorted cogroup merge.
    TakeCogroup,
    /// Per-group aggregation.
    AggregateGroup,
    /// Update through the primary storage.
    WriteExisting,
    /// Partial update / delete through the primary storage.
    WritePartial,
}

/// Outcome of one operator invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum OperationStatus {
    /// Processing continues.
    Ok,
    /// The operator aborted; upstream stops feeding it.
    Aborted,
    /// The source wants to yield cooperatively; the task resumes later.
    Yield,
}

impl OperationStatus {
    /// True for [`OperationStatus::Ok`].
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Record-by-record operator.
pub trait RecordOperator: Send + Sync {
    /// Processes the record currently bound in the variable table.
    fn process_record(&self, ctx: &mut TaskContext) -> OperationStatus;

    /// Drains terminal state and cascades downstream.
    fn finish(&self, ctx: &mut TaskContext);

    /// The operator kind tag.
    fn kind(&self) -> OperatorKind;

    /// Index of this operator within the step.
    fn index(&self) -> OperatorIndex;
}

/// Group-by-group operator fed one member at a time.
pub trait GroupOperator: Send + Sync {
    /// Processes the member currently bound; `last_member` marks the final
    /// member of the group.
    fn process_group(&self, ctx: &mut TaskContext, last_member: bool) -> OperationStatus;

    /// Drains terminal state and cascades downstream.
    fn finish(&self, ctx: &mut TaskContext);

    /// The operator kind tag.
    fn kind(&self) -> OperatorKind;

    /// Index of this operator within the step.
    fn index(&self) -> OperatorIndex;
}

/// One input's share of a cogroup: its key (when present) and members.
#[derive(Debug, Clone, Default)]
pub struct Group {
    /// The key record; `None` when this input lacks the merged key.
    pub key: Option<Record>,
    /// The member value records.
    pub members: Vec<Record>,
}

impl Group {
    /// True when this input has no members for the merged key.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// N groups joined on equal keys.
#[derive(Debug, Clone, Default)]
pub struct Cogroup {
    /// One group per input, in input order.
    pub groups: Vec<Group>,
}

/// Operator consuming whole cogroups.
pub trait CogroupOperator: Send + Sync {
    /// Processes one delivered cogroup.
    fn process_cogroup(&self, ctx: &mut TaskContext, cogroup: &Cogroup) -> OperationStatus;

    /// Drains terminal state and cascades downstream.
    fn finish(&self, ctx: &mut TaskContext);

    /// The operator kind tag.
    fn kind(&self) -> OperatorKind;

    /// Index of this operator within the step.
    fn index(&self) -> OperatorIndex;
}

/// Tagged per-operator context; the tag mirrors [`OperatorKind`] so the
/// container locates a context by operator index and the operator checks the
/// kind on reuse.
#[derive(Debug)]
pub enum OperatorContext {
    /// Context of a scan operator.
    Scan(ScanContext),
    /// Context of a find operator.
    Find(FindContext),
    /// Context of a filter operator.
    Filter(FilterContext),
    /// Context of an emit operator.
    Emit(EmitContext),
    /// Context of an offer operator.
    Offer(OfferContext),
    /// Context of a take-flat operator.
    TakeFlat(TakeFlatContext),
    /// Context of a take-group operator.
    TakeGroup(TakeGroupContext),
    /// Context of a take-cogroup operator.
    TakeCogroup(TakeCogroupContext),
    /// Context of an aggregate-group operator.
    AggregateGroup(AggregateGroupContext),
    /// Context of a write operator.
    Write(WriteContext),
}

impl OperatorContext {
    /// The kind tag this context belongs to.
    pub fn kind(&self) -> OperatorKind {
        match self {
            Self::Scan(_) => OperatorKind::Scan,
            Self::Find(_) => OperatorKind::Find,
            Self::Filter(_) => OperatorKind::Filter,
            Self::Emit(_) => OperatorKind::Emit,
            Self::Offer(_) => OperatorKind::Offer,
            Self::TakeFlat(_) => OperatorKind::TakeFlat,
            Self::TakeGroup(_) => OperatorKind::TakeGroup,
            Self::TakeCogroup(_) => OperatorKind::TakeCogroup,
            Self::AggregateGroup(_) => OperatorKind::AggregateGroup,
            Self::Write(_) => OperatorKind::WriteExisting,
        }
    }

    /// The shared context core.
    pub fn core(&self) -> &ContextCore {
        match self {
            Self::Scan(c) => &c.core,
            Self::Find(c) => &c.core,
            Self::Filter(c) => &c.core,
            Self::Emit(c) => &c.core,
            Self::Offer(c) => &c.core,
            Self::TakeFlat(c) => &c.core,
            Self::TakeGroup(c) => &c.core,
            Self::TakeCogroup(c) => &c.core,
            Self::AggregateGroup(c) => &c.core,
            Self::Write(c) => &c.core,
        }
    }

    /// Mutable access to the shared context core.
    pub fn core_mut(&mut self) -> &mut ContextCore {
        match self {
            Self::Scan(c) => &mut c.core,
            Self::Find(c) => &mut c.core,
            Self::Filter(c) => &mut c.core,
            Self::Emit(c) => &mut c.core,
            Self::Offer(c) => &mut c.core,
            Self::TakeFlat(c) => &mut c.core,
            Self::TakeGroup(c) => &mut c.core,
            Self::TakeCogroup(c) => &mut c.core,
            Self::AggregateGroup(c) => &mut c.core,
            Self::Write(c) => &mut c.core,
        }
    }
}

/// Records an evaluation failure on the task, enriched from the evaluator
/// context's diagnostics.
pub(crate) fn record_expression_error(ctx: &mut TaskContext, value: &Value) {
    let kind = value.error_kind().unwrap_or(ErrorKind::Undefined);
    let detail = ctx
        .eval_ctx
        .take_error_info()
        .map(|e| e.message)
        .or_else(|| ctx.eval_ctx.errors().last().map(|d| d.message.clone()))
        .unwrap_or_default();
    ctx.record_error(ExecError::new(
        status_for_error_kind(kind),
        format!("expression evaluation failed: {kind}: {detail}"),
    ));
}
