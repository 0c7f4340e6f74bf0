//! Logical types and runtime value representation for the weir execution core.
//!
//! The crate is the leaf of the workspace: it defines the fourteen logical SQL
//! types carried by the engine, the tagged runtime [`Value`], the evaluation
//! error taxonomy, the arbitrary-precision [`decimal`] machinery and the
//! record/layout metadata shared by the executor and the storage codec.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

pub mod datetime;
pub mod decimal;
pub mod error;
pub mod lob;
pub mod record;
pub mod types;
pub mod value;

pub use datetime::{Date, TimeOfDay, TimePoint};
pub use decimal::{Decimal, DecimalStatus, ParseDecimalError, ParsedDecimal, Triple};
pub use error::ErrorKind;
pub use lob::{LobId, LobProvider, LobReference};
pub use record::{Record, RecordMeta};
pub use types::{DataType, TypeKind};
pub use value::{Octet, Text, Value, ValueIndex};
