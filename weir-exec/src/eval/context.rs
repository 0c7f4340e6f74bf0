//! Evaluator context and diagnostics.

use std::fmt::Display;
use std::sync::Arc;

use weir_plan::LossPolicy;
use weir_storage::Strand;
use weir_types::ErrorKind;

use crate::config::Config;
use crate::error::ExecError;

/// One diagnostic accumulated during evaluation.
///
/// Records are ordered; the caller reads them after the job to enrich the
/// bare `error{kind}` sentinel that travelled through the value channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    /// The error kind this diagnostic belongs to.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Rendered argument values attached via [`DiagnosticRecord::new_argument`].
    pub arguments: Vec<String>,
}

impl DiagnosticRecord {
    /// Creates a diagnostic with no arguments.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), arguments: Vec::new() }
    }

    /// Attaches a rendered argument value.
    pub fn new_argument(&mut self, value: impl Display) -> &mut Self {
        self.arguments.push(value.to_string());
        self
    }
}

/// Mutable state threaded through one expression evaluation.
#[derive(Debug)]
pub struct EvaluatorContext {
    config: Arc<Config>,
    loss_policy: LossPolicy,
    errors: Vec<DiagnosticRecord>,
    lost_precision: bool,
    error_info: Option<ExecError>,
    transaction: Option<Strand>,
}

impl EvaluatorContext {
    /// Creates a context with the given engine configuration.
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            loss_policy: LossPolicy::Ignore,
            errors: Vec::new(),
            lost_precision: false,
            error_info: None,
            transaction: None,
        }
    }

    /// Attaches the transaction strand function calls and LOB
    /// materialization run under.
    #[must_use]
    pub fn with_transaction(mut self, transaction: Strand) -> Self {
        self.transaction = Some(transaction);
        self
    }

    /// Replaces the attached transaction strand.
    pub fn set_transaction(&mut self, transaction: Strand) {
        self.transaction = Some(transaction);
    }

    /// The engine configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The active loss-of-precision policy.
    pub fn loss_policy(&self) -> LossPolicy {
        self.loss_policy
    }

    /// Replaces the loss policy, returning the previous one.
    pub fn set_loss_policy(&mut self, policy: LossPolicy) -> LossPolicy {
        core::mem::replace(&mut self.loss_policy, policy)
    }

    /// Appends a diagnostic and returns it for argument attachment.
    pub fn add_error(&mut self, record: DiagnosticRecord) -> &mut DiagnosticRecord {
        self.errors.push(record);
        self.errors.last_mut().expect("just pushed")
    }

    /// The accumulated diagnostics, in order.
    pub fn errors(&self) -> &[DiagnosticRecord] {
        &self.errors
    }

    /// Marks that some conversion lost precision.
    pub fn set_lost_precision(&mut self, lost: bool) {
        self.lost_precision = lost;
    }

    /// Whether any conversion lost precision.
    pub fn lost_precision(&self) -> bool {
        self.lost_precision
    }

    /// Stores rich error information for an `error_info_provided` sentinel.
    pub fn set_error_info(&mut self, info: ExecError) {
        self.error_info = Some(info);
    }

    /// Takes the stored rich error information.
    pub fn take_error_info(&mut self) -> Option<ExecError> {
        self.error_info.take()
    }

    /// The transaction strand, when one is attached.
    pub fn transaction(&self) -> Option<&Strand> {
        self.transaction.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_accumulate_in_order() {
        let mut ctx = EvaluatorContext::new(Arc::new(Config::default()));
        ctx.add_error(DiagnosticRecord::new(ErrorKind::LostPrecision, "first"))
            .new_argument(42)
            .new_argument("x");
        ctx.add_error(DiagnosticRecord::new(ErrorKind::FormatError, "second"));
        assert_eq!(ctx.errors().len(), 2);
        assert_eq!(ctx.errors()[0].arguments, vec!["42".to_string(), "x".to_string()]);
        assert_eq!(ctx.errors()[1].kind, ErrorKind::FormatError);
    }

    #[test]
    fn loss_policy_swap_restores() {
        let mut ctx = EvaluatorContext::new(Arc::new(Config::default()));
        let original = ctx.set_loss_policy(LossPolicy::Error);
        assert_eq!(original, LossPolicy::Ignore);
        assert_eq!(ctx.loss_policy(), LossPolicy::Error);
        ctx.set_loss_policy(original);
        assert_eq!(ctx.loss_policy(), LossPolicy::Ignore);
    }
}
