// ============================================================================
// Market - Question Registry
// ============================================================================
//
// The market opens one pool per question id and routes id-addressed calls
// to it. It holds no funds of its own: stakes and payouts move between the
// participants and the custody on each pool's behalf.
//
// Pools live in a table keyed by question id. Every successful routed call
// is mirrored into the market-wide activity log.
//
// A market may carry an admin address. The admin passes the owner gate of
// every pool it opens, next to the account that opened the question.
//
// ============================================================================

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::config::{EscrowConfig, DEFAULT_MAX_ANSWERS};
use crate::custody::Custody;
use crate::error::{EscrowError, EscrowResult};
use crate::events::{EscrowEvent, EventLog};
use crate::ids::{Address, Amount, AnswerId, QuestionId};
use crate::pool::{Pool, PoolState, PoolStats};

/// Returned by `open_question`; addresses the new pool in later calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolHandle {
    pub question: QuestionId,
    /// Position in opening order
    pub index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pools: HashMap<QuestionId, Pool>,
    /// Question ids in opening order
    order: Vec<QuestionId>,
    events: EventLog,
    max_answers: usize,
    #[serde(default)]
    admin: Option<Address>,
}

impl Default for Market {
    fn default() -> Self {
        Self::new()
    }
}

impl Market {
    pub fn new() -> Self {
        Self {
            pools: HashMap::new(),
            order: Vec::new(),
            events: EventLog::new(),
            max_answers: DEFAULT_MAX_ANSWERS,
            admin: None,
        }
    }

    /// A market whose `admin` may run every question alongside its opener
    pub fn with_admin(admin: impl Into<Address>) -> Self {
        Self { admin: Some(admin.into()), ..Self::new() }
    }

    pub fn with_config(config: &EscrowConfig) -> Self {
        let mut market = Self { admin: config.market_admin.clone(), ..Self::new() };
        market.configure(config);
        market
    }

    pub fn admin(&self) -> Option<&Address> {
        self.admin.as_ref()
    }

    /// Apply limits from `config` (also used after loading a snapshot).
    /// The admin is fixed when the market is created and is left alone.
    pub fn configure(&mut self, config: &EscrowConfig) {
        self.max_answers = config.max_answers;
        self.events.set_limit(Some(config.event_log_limit));
    }

    // ========================================================================
    // REGISTRY
    // ========================================================================

    /// Open a new question; `caller` becomes the pool owner and the market
    /// admin, if any, may act on it too.
    pub fn open_question(
        &mut self,
        caller: &Address,
        id: QuestionId,
        answers: impl IntoIterator<Item = AnswerId>,
    ) -> EscrowResult<PoolHandle> {
        if self.pools.contains_key(&id) {
            tracing::debug!(question = %id.short(), "duplicate question id rejected");
            return Err(EscrowError::DuplicateId(id));
        }

        let answers: Vec<AnswerId> = answers.into_iter().collect();
        let distinct = answers.iter().collect::<HashSet<_>>().len();
        if distinct > self.max_answers {
            return Err(EscrowError::TooManyAnswers { count: distinct, max: self.max_answers });
        }

        let pool = Pool::new(id, caller.clone(), answers)?.with_admin(self.admin.clone());
        let handle = PoolHandle { question: id, index: self.order.len() };

        self.mirror_last_event(&pool);
        self.pools.insert(id, pool);
        self.order.push(id);
        Ok(handle)
    }

    /// Toggle a question's betting gate; owner or market admin only
    pub fn toggle_question_running(
        &mut self,
        caller: &Address,
        id: &QuestionId,
        enabled: bool,
    ) -> EscrowResult<()> {
        self.route(id, |pool| pool.set_running(caller, enabled))
    }

    pub fn pool(&self, handle: &PoolHandle) -> Option<&Pool> {
        self.pools.get(&handle.question)
    }

    pub fn pool_by_id(&self, id: &QuestionId) -> EscrowResult<&Pool> {
        self.pools.get(id).ok_or(EscrowError::NotFound(*id))
    }

    pub fn handle_of(&self, id: &QuestionId) -> Option<PoolHandle> {
        self.order
            .iter()
            .position(|q| q == id)
            .map(|index| PoolHandle { question: *id, index })
    }

    pub fn question_ids(&self) -> &[QuestionId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    // ========================================================================
    // ROUTED POOL OPERATIONS
    // ========================================================================

    pub fn bet(
        &mut self,
        id: &QuestionId,
        caller: &Address,
        answer: AnswerId,
        stake: Amount,
        custody: &mut impl Custody,
    ) -> EscrowResult<()> {
        self.route(id, |pool| pool.bet(caller, answer, stake, custody))
    }

    /// Close betting on a question (`Created -> Waiting`)
    pub fn wait_question(&mut self, id: &QuestionId, caller: &Address) -> EscrowResult<()> {
        self.route(id, |pool| pool.advance(caller))
    }

    /// Record the correct answer (`Waiting -> Answered`)
    pub fn answer_question(
        &mut self,
        id: &QuestionId,
        caller: &Address,
        answer: AnswerId,
    ) -> EscrowResult<()> {
        self.route(id, |pool| pool.resolve(caller, answer))
    }

    pub fn withdraw(
        &mut self,
        id: &QuestionId,
        caller: &Address,
        custody: &mut impl Custody,
    ) -> EscrowResult<Amount> {
        self.route(id, |pool| pool.withdraw(caller, custody))
    }

    fn route<T>(
        &mut self,
        id: &QuestionId,
        op: impl FnOnce(&mut Pool) -> EscrowResult<T>,
    ) -> EscrowResult<T> {
        let pool = self.pools.get_mut(id).ok_or(EscrowError::NotFound(*id))?;
        let out = op(pool)?;
        if let Some(event) = pool.events().last().cloned() {
            self.events.record(event);
        }
        Ok(out)
    }

    fn mirror_last_event(&mut self, pool: &Pool) {
        if let Some(event) = pool.events().last() {
            self.events.record(event.clone());
        }
    }

    // ========================================================================
    // READ-THROUGH ACCESSORS
    // ========================================================================

    pub fn get_question_state(&self, id: &QuestionId) -> EscrowResult<PoolState> {
        Ok(self.pool_by_id(id)?.state())
    }

    pub fn get_question_running(&self, id: &QuestionId) -> EscrowResult<bool> {
        Ok(self.pool_by_id(id)?.running())
    }

    /// `None` until the question is answered
    pub fn get_question_answer(&self, id: &QuestionId) -> EscrowResult<Option<AnswerId>> {
        Ok(self.pool_by_id(id)?.the_answer())
    }

    pub fn get_question_answer_balance(
        &self,
        id: &QuestionId,
        answer: &AnswerId,
    ) -> EscrowResult<Amount> {
        Ok(self.pool_by_id(id)?.answer_balance(answer))
    }

    pub fn get_question_user_answer_balance(
        &self,
        id: &QuestionId,
        user: &Address,
        answer: &AnswerId,
    ) -> EscrowResult<Amount> {
        Ok(self.pool_by_id(id)?.user_answer_balance(user, answer))
    }

    pub fn get_question_stats(&self, id: &QuestionId) -> EscrowResult<PoolStats> {
        Ok(self.pool_by_id(id)?.stats())
    }

    /// Funds escrowed across every pool
    pub fn total_escrowed(&self) -> u128 {
        self.pools.values().map(|p| p.escrowed() as u128).sum()
    }

    // ========================================================================
    // ACTIVITY
    // ========================================================================

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Full history of one question, including entries the market log has
    /// already dropped
    pub fn events_for(&self, id: &QuestionId) -> EscrowResult<&[EscrowEvent]> {
        Ok(self.pool_by_id(id)?.events().all())
    }

    pub fn recent_events(&self, limit: usize) -> Vec<&EscrowEvent> {
        self.events.recent(limit)
    }

    // ========================================================================
    // SNAPSHOTS
    // ========================================================================

    /// SHA-256 over the canonical JSON form of the market
    pub fn state_digest(&self) -> EscrowResult<String> {
        let value = serde_json::to_value(self)
            .map_err(|e| EscrowError::Snapshot(format!("Failed to serialize market: {}", e)))?;
        Ok(hex::encode(Sha256::digest(value.to_string().as_bytes())))
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> EscrowResult<String> {
        let path = path.as_ref();
        let digest = self.state_digest()?;
        let snapshot = MarketSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: chrono::Utc::now().timestamp(),
            digest: digest.clone(),
            market: self.clone(),
        };

        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| EscrowError::Snapshot(format!("Failed to serialize snapshot: {}", e)))?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| {
                EscrowError::Snapshot(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        fs::write(path, json).map_err(|e| {
            EscrowError::Snapshot(format!("Failed to write {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            questions = self.len(),
            digest = &digest[..12],
            "market saved"
        );
        Ok(digest)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> EscrowResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            EscrowError::Snapshot(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let snapshot: MarketSnapshot = serde_json::from_str(&json).map_err(|e| {
            EscrowError::Snapshot(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(EscrowError::Snapshot(format!(
                "Unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        let digest = snapshot.market.state_digest()?;
        if digest != snapshot.digest {
            return Err(EscrowError::Snapshot(format!(
                "Digest mismatch: file says {}, contents hash to {}",
                snapshot.digest, digest
            )));
        }
        // the digest only proves the file is self-consistent
        snapshot.market.validate()?;

        tracing::info!(path = %path.display(), questions = snapshot.market.len(), "market loaded");
        Ok(snapshot.market)
    }
}

impl Market {
    /// Registry and per-pool ledger checks, run on every loaded snapshot
    pub fn validate(&self) -> EscrowResult<()> {
        if self.order.len() != self.pools.len() {
            return Err(EscrowError::Snapshot(format!(
                "Question order lists {} ids for {} pools",
                self.order.len(),
                self.pools.len()
            )));
        }
        let mut seen = HashSet::new();
        for id in &self.order {
            let pool = match self.pools.get(id) {
                Some(pool) if seen.insert(*id) => pool,
                _ => {
                    return Err(EscrowError::Snapshot(format!(
                        "Question {} is listed twice or has no pool",
                        id
                    )))
                }
            };
            if pool.id() != *id {
                return Err(EscrowError::Snapshot(format!(
                    "Pool stored under {} belongs to {}",
                    id,
                    pool.id()
                )));
            }
            pool.validate()?;
        }
        Ok(())
    }
}

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct MarketSnapshot {
    version: u32,
    saved_at: i64,
    digest: String,
    market: Market,
}
