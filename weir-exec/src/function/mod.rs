//! Scalar function registry.
//!
//! Function bodies are table-driven: a definition id maps to a plain function
//! pointer receiving the evaluator context and the already-evaluated argument
//! list. The registry is process-global; the planner refers to functions by
//! id only.

pub mod aggregate;

use std::sync::{Arc, OnceLock, RwLock};

use hashbrown::HashMap;
use weir_plan::FunctionDefinitionId;
use weir_types::{ErrorKind, Value};

use crate::eval::context::EvaluatorContext;

/// Signature of a scalar function body.
pub type ScalarFunctionBody = fn(&mut EvaluatorContext, &[Value]) -> Value;

/// Registered scalar function.
#[derive(Debug, Clone)]
pub struct ScalarFunctionInfo {
    /// Registry id.
    pub definition_id: FunctionDefinitionId,
    /// Name used in diagnostics.
    pub name: &'static str,
    /// The function body.
    pub body: ScalarFunctionBody,
}

/// Process-global scalar function repository.
#[derive(Debug, Default)]
pub struct ScalarFunctionRepository {
    functions: RwLock<HashMap<FunctionDefinitionId, Arc<ScalarFunctionInfo>>>,
}

impl ScalarFunctionRepository {
    /// Registers (or replaces) a function.
    pub fn register(&self, info: ScalarFunctionInfo) {
        self.functions
            .write()
            .expect("poisoned")
            .insert(info.definition_id, Arc::new(info));
    }

    /// Looks a function up by id.
    pub fn find(&self, id: FunctionDefinitionId) -> Option<Arc<ScalarFunctionInfo>> {
        self.functions.read().expect("poisoned").get(&id).cloned()
    }
}

static SCALAR_REPOSITORY: OnceLock<ScalarFunctionRepository> = OnceLock::new();

/// Definition id of the builtin `octet_length` function.
pub const OCTET_LENGTH_ID: FunctionDefinitionId = 1;

/// Definition id of the builtin `abs` function.
pub const ABS_ID: FunctionDefinitionId = 2;

/// The global scalar function repository with builtins registered.
pub fn scalar_function_repository() -> &'static ScalarFunctionRepository {
    SCALAR_REPOSITORY.get_or_init(|| {
        let repo = ScalarFunctionRepository::default();
        repo.register(ScalarFunctionInfo {
            definition_id: OCTET_LENGTH_ID,
            name: "octet_length",
            body: octet_length,
        });
        repo.register(ScalarFunctionInfo { definition_id: ABS_ID, name: "abs", body: abs });
        repo
    })
}

fn octet_length(_ctx: &mut EvaluatorContext, args: &[Value]) -> Value {
    match args {
        [Value::Null] => Value::Null,
        [Value::Character(t)] => Value::Int4(t.len() as i32),
        [Value::Octet(o)] => Value::Int4(o.len() as i32),
        _ => Value::Error(ErrorKind::Unsupported),
    }
}

fn abs(_ctx: &mut EvaluatorContext, args: &[Value]) -> Value {
    match args {
        [Value::Null] => Value::Null,
        [v @ (Value::Int4(_) | Value::Int8(_) | Value::Float4(_) | Value::Float8(_) | Value::Decimal(_))] =>
        {
            match v {
                Value::Int4(x) if *x < 0 => Value::Int4(x.wrapping_neg()),
                Value::Int8(x) if *x < 0 => Value::Int8(x.wrapping_neg()),
                Value::Float4(x) => Value::Float4(x.abs()),
                Value::Float8(x) => Value::Float8(x.abs()),
                Value::Decimal(t) if t.sign() < 0 => {
                    match weir_types::Decimal::Finite(*t).abs() {
                        weir_types::Decimal::Finite(a) => Value::Decimal(a),
                        _ => Value::Error(ErrorKind::ArithmeticError),
                    }
                }
                other => other.clone(),
            }
        }
        _ => Value::Error(ErrorKind::Unsupported),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use weir_types::Text;

    #[test]
    fn builtin_lookup_and_call() {
        let repo = scalar_function_repository();
        let f = repo.find(OCTET_LENGTH_ID).expect("registered");
        let mut ctx = EvaluatorContext::new(Arc::new(Config::default()));
        let v = (f.body)(&mut ctx, &[Value::Character(Text::from("abc"))]);
        assert_eq!(v, Value::Int4(3));
        assert!(repo.find(9999).is_none());
    }

    #[test]
    fn abs_handles_signs() {
        let repo = scalar_function_repository();
        let f = repo.find(ABS_ID).expect("registered");
        let mut ctx = EvaluatorContext::new(Arc::new(Config::default()));
        assert_eq!((f.body)(&mut ctx, &[Value::Int4(-3)]), Value::Int4(3));
        assert_eq!((f.body)(&mut ctx, &[Value::Int8(4)]), Value::Int8(4));
        assert_eq!((f.body)(&mut ctx, &[Value::Null]), Value::Null);
    }
}
