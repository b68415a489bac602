pub mod money;
pub mod rule;
pub mod transaction;

pub use money::{cents_to_decimal, decimal_to_cents};
pub use rule::ImportRule;
pub use transaction::{
    truncate_description, CandidateTransaction, TransactionKind, DESCRIPTION_MAX_LEN,
};
