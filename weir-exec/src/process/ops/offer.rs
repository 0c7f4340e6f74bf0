//! Offer operator: projection into an exchange writer.

use weir_plan::VariableId;
use weir_types::Record;

use crate::error::{ExecError, Status};
use crate::process::context::ContextCore;
use crate::process::TaskContext;

use super::{OperationStatus, OperatorContext, OperatorIndex, OperatorKind, RecordOperator};

/// Per-task offer state: the staging record and the release latch.
#[derive(Debug)]
pub struct OfferContext {
    /// Shared context core.
    pub core: ContextCore,
    staging: Record,
    released: bool,
}

impl OfferContext {
    fn new(width: usize) -> Self {
        Self { core: ContextCore::new(), staging: Record::nulls(width), released: false }
    }
}

/// Pushes a projected record into an exchange writer.
///
/// `columns` pairs each source variable with its field slot in the exchange
/// record layout.
pub struct Offer {
    index: OperatorIndex,
    writer_index: usize,
    record_width: usize,
    columns: Vec<(VariableId, usize)>,
}

impl Offer {
    /// Creates an offer at `index` into writer `writer_index`.
    pub fn new(
        index: OperatorIndex,
        writer_index: usize,
        record_width: usize,
        columns: Vec<(VariableId, usize)>,
    ) -> Self {
        Self { index, writer_index, record_width, columns }
    }
}

impl RecordOperator for Offer {
    fn process_record(&self, ctx: &mut TaskContext) -> OperationStatus {
        let mut op_ctx = ctx
            .contexts
            .take(self.index)
            .unwrap_or_else(|| OperatorContext::Offer(OfferContext::new(self.record_width)));
        let OperatorContext::Offer(offer_ctx) = &mut op_ctx else {
            unreachable!("context kind mismatch");
        };
        if offer_ctx.core.inactive() {
            ctx.contexts.put(self.index, op_ctx);
            return OperationStatus::Aborted;
        }
        for (variable, slot) in &self.columns {
            offer_ctx.staging.set(*slot, ctx.variables.get(*variable).clone());
        }
        let record = offer_ctx.staging.clone();
        match ctx.writers.get_mut(self.writer_index).and_then(Option::as_mut) {
            Some(writer) => writer.write(record),
            None => {
                ctx.record_error(ExecError::new(
                    Status::Internal,
                    format!("offer writer {} is missing", self.writer_index),
                ));
                offer_ctx.core.abort();
                ctx.contexts.put(self.index, op_ctx);
                return OperationStatus::Aborted;
            }
        }
        ctx.contexts.put(self.index, op_ctx);
        OperationStatus::Ok
    }

    fn finish(&self, ctx: &mut TaskContext) {
        let mut op_ctx = ctx
            .contexts
            .take(self.index)
            .unwrap_or_else(|| OperatorContext::Offer(OfferContext::new(self.record_width)));
        if let OperatorContext::Offer(offer_ctx) = &mut op_ctx {
            if !offer_ctx.released {
                if let Some(writer) = ctx.writers.get_mut(self.writer_index).and_then(Option::as_mut)
                {
                    writer.flush();
                    writer.release();
                }
                offer_ctx.released = true;
            }
        }
        ctx.contexts.put(self.index, op_ctx);
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Offer
    }

    fn index(&self) -> OperatorIndex {
        self.index
    }
}
