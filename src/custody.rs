//! Funds custody for the escrow.
//!
//! Pools never touch balances directly. Stakes are pulled in through
//! `Custody::collect` together with the bet, and winnings are pushed out
//! through `Custody::pay` during a withdrawal. Both must be all-or-nothing:
//! a refused transfer moves no funds at all.
//!
//! `AccountBook` is the in-memory custody used by the node binary and the
//! tests. It keeps integer balances per address plus a transfer log.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::ids::{Address, Amount};

// ============================================================================
// TRANSFER PRIMITIVE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum TransferError {
    #[error("Insufficient funds: {address} has {available}, needs {requested}")]
    InsufficientFunds { address: String, available: Amount, requested: Amount },

    #[error("Recipient rejected transfer: {0}")]
    Rejected(String),

    #[error("Balance overflow for {0}")]
    Overflow(String),
}

pub trait Custody {
    /// Move `amount` from `from` into escrow.
    fn collect(&mut self, from: &Address, amount: Amount) -> Result<(), TransferError>;

    /// Push `amount` out of escrow to `to`.
    fn pay(&mut self, to: &Address, amount: Amount) -> Result<(), TransferError>;
}

// ============================================================================
// ACCOUNT BOOK
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    Deposit,
    Stake,
    Payout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: String,
    pub kind: TransferKind,
    pub address: Address,
    pub amount: Amount,
    pub timestamp: i64,
}

impl TransferRecord {
    fn new(kind: TransferKind, address: &Address, amount: Amount) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            address: address.clone(),
            amount,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountBook {
    /// Spendable balance per address
    balances: HashMap<Address, Amount>,
    /// Funds pulled in by `collect` and not yet paid out
    escrow: Amount,
    /// Addresses whose incoming pushes are refused
    #[serde(default)]
    frozen: HashSet<Address>,
    transfers: Vec<TransferRecord>,
}

impl AccountBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account with an opening balance
    pub fn register(&mut self, address: impl Into<Address>, initial: Amount) -> Address {
        let address = address.into();
        self.balances.insert(address.clone(), initial);
        self.transfers.push(TransferRecord::new(TransferKind::Deposit, &address, initial));
        tracing::debug!(address = address.short(), initial, "account registered");
        address
    }

    /// Credit an account from outside the escrow
    pub fn deposit(&mut self, address: &Address, amount: Amount) -> Result<Amount, TransferError> {
        let bal = self.balances.entry(address.clone()).or_insert(0);
        *bal = bal
            .checked_add(amount)
            .ok_or_else(|| TransferError::Overflow(address.to_string()))?;
        let available = *bal;
        self.transfers.push(TransferRecord::new(TransferKind::Deposit, address, amount));
        Ok(available)
    }

    pub fn balance(&self, address: &Address) -> Amount {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// Funds currently held in escrow on behalf of pools
    pub fn escrowed(&self) -> Amount {
        self.escrow
    }

    /// Account balances plus escrow; constant across stakes and payouts
    pub fn total_supply(&self) -> u128 {
        self.balances.values().map(|b| *b as u128).sum::<u128>() + self.escrow as u128
    }

    /// Refuse all future pushes to `address`
    pub fn freeze(&mut self, address: &Address) {
        self.frozen.insert(address.clone());
    }

    pub fn unfreeze(&mut self, address: &Address) {
        self.frozen.remove(address);
    }

    pub fn transfers(&self) -> &[TransferRecord] {
        &self.transfers
    }

    pub fn transfers_for(&self, address: &Address) -> Vec<&TransferRecord> {
        self.transfers.iter().filter(|t| &t.address == address).collect()
    }
}

impl Custody for AccountBook {
    fn collect(&mut self, from: &Address, amount: Amount) -> Result<(), TransferError> {
        let available = self.balance(from);
        if available < amount {
            return Err(TransferError::InsufficientFunds {
                address: from.to_string(),
                available,
                requested: amount,
            });
        }
        let escrow = self
            .escrow
            .checked_add(amount)
            .ok_or_else(|| TransferError::Overflow("escrow".to_string()))?;

        self.balances.insert(from.clone(), available - amount);
        self.escrow = escrow;
        self.transfers.push(TransferRecord::new(TransferKind::Stake, from, amount));
        Ok(())
    }

    fn pay(&mut self, to: &Address, amount: Amount) -> Result<(), TransferError> {
        if self.frozen.contains(to) {
            return Err(TransferError::Rejected(to.to_string()));
        }
        let escrow = self.escrow.checked_sub(amount).ok_or_else(|| {
            TransferError::InsufficientFunds {
                address: "escrow".to_string(),
                available: self.escrow,
                requested: amount,
            }
        })?;
        let credited = self
            .balance(to)
            .checked_add(amount)
            .ok_or_else(|| TransferError::Overflow(to.to_string()))?;

        self.escrow = escrow;
        self.balances.insert(to.clone(), credited);
        self.transfers.push(TransferRecord::new(TransferKind::Payout, to, amount));
        Ok(())
    }
}
