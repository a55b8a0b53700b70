//! Parimutuel Betting Escrow
//! Exports all modules for use as a library crate

pub mod config;
pub mod custody;
pub mod error;
pub mod events;
pub mod ids;
pub mod market;
pub mod pool;

pub use config::EscrowConfig;
pub use custody::{AccountBook, Custody, TransferError, TransferKind, TransferRecord};
pub use error::{EscrowError, EscrowResult};
pub use events::{EscrowEvent, EventKind, EventLog};
pub use ids::{Address, Amount, AnswerId, Id32, IdParseError, QuestionId, ID_BYTES};
pub use market::{Market, PoolHandle};
pub use pool::{parimutuel_payout, Pool, PoolState, PoolStats};
