// ============================================================================
// Escrow Errors
// ============================================================================
//
// Every failed call aborts with no partial mutation. Errors are surfaced to
// the caller verbatim; nothing inside the escrow retries.
//
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::custody::TransferError;
use crate::ids::QuestionId;
use crate::pool::PoolState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum EscrowError {
    #[error("Unauthorized: {caller} is not the owner")]
    Unauthorized { caller: String },

    #[error("Invalid transition: cannot {action} while {from:?}")]
    InvalidTransition { from: PoolState, action: String },

    #[error("Invalid state: betting is closed ({0:?})")]
    InvalidState(PoolState),

    #[error("Invalid answer: {0} is not an allowed answer")]
    InvalidAnswer(String),

    #[error("Question is not running")]
    NotRunning,

    #[error("Bet carries no stake")]
    ZeroStake,

    #[error("Nothing to withdraw")]
    NothingToWithdraw,

    #[error("Question not found: {0}")]
    NotFound(QuestionId),

    #[error("Question already open: {0}")]
    DuplicateId(QuestionId),

    #[error("Question needs at least one answer")]
    EmptyAnswerSet,

    #[error("Too many answers: {count} (max {max})")]
    TooManyAnswers { count: usize, max: usize },

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

pub type EscrowResult<T> = Result<T, EscrowError>;
