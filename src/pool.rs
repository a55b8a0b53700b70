// ============================================================================
// Question Pool - Parimutuel Escrow
// ============================================================================
//
// One pool per question. It owns the betting ledger, the lifecycle and the
// withdrawal protocol:
//
//   Created --advance()--> Waiting --resolve(answer)--> Answered
//
// Payout for a winner with stake `s` on the correct answer:
//
//   T = total staked across all answers
//   W = total staked on the correct answer
//   payout = floor(s * T / W)            (0 when W == 0)
//
// The product is taken in u128 so it cannot overflow, and since s <= W the
// quotient is <= T. Floor division leaves at most W - 1 units of dust, which
// stays escrowed in the pool.
//
// Withdrawal zeroes the caller's winning stake before pushing funds out. If
// the push fails the claim is restored and the call fails as a whole.
//
// ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::custody::Custody;
use crate::error::{EscrowError, EscrowResult};
use crate::events::{EscrowEvent, EventLog};
use crate::ids::{Address, Amount, AnswerId, QuestionId};

// ============================================================================
// POOL STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolState {
    /// Accepting bets (subject to the running flag)
    Created = 0,
    /// Betting closed, waiting for the answer
    Waiting = 1,
    /// Correct answer recorded; terminal
    Answered = 2,
}

impl PoolState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolState::Created => "created",
            PoolState::Waiting => "waiting",
            PoolState::Answered => "answered",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PoolState::Answered)
    }
}

// ============================================================================
// PAYOUT MATH
// ============================================================================

/// `floor(stake * total / winning_total)`, or 0 when nobody backed the winner.
///
/// The result never exceeds `total`.
pub fn parimutuel_payout(stake: Amount, total: Amount, winning_total: Amount) -> Amount {
    if winning_total == 0 || stake == 0 {
        return 0;
    }
    let share = (stake as u128) * (total as u128) / (winning_total as u128);
    share.min(total as u128) as Amount
}

// ============================================================================
// POOL
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    id: QuestionId,
    owner: Address,
    /// Market authority that may act alongside the owner
    #[serde(default)]
    admin: Option<Address>,
    /// Allowed answers in creation order, no duplicates
    allowed_answers: Vec<AnswerId>,
    state: PoolState,
    running: bool,
    answer_totals: HashMap<AnswerId, Amount>,
    user_stakes: HashMap<Address, HashMap<AnswerId, Amount>>,
    /// Sum of all answer totals (T)
    total: Amount,
    correct_answer: Option<AnswerId>,
    /// Paid out so far
    withdrawn: Amount,
    events: EventLog,
}

/// Read-only summary of a pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    pub question: QuestionId,
    pub owner: Address,
    pub state: PoolState,
    pub running: bool,
    pub answers: Vec<(AnswerId, Amount)>,
    pub total_staked: Amount,
    pub correct_answer: Option<AnswerId>,
    pub winning_total: Amount,
    pub withdrawn: Amount,
    pub escrowed: Amount,
    pub participants: usize,
}

impl Pool {
    /// Open a pool. The answer set is fixed from here on; duplicates are
    /// collapsed.
    pub fn new(
        id: QuestionId,
        owner: Address,
        answers: impl IntoIterator<Item = AnswerId>,
    ) -> EscrowResult<Self> {
        let mut allowed_answers: Vec<AnswerId> = Vec::new();
        for answer in answers {
            if !allowed_answers.contains(&answer) {
                allowed_answers.push(answer);
            }
        }
        if allowed_answers.is_empty() {
            return Err(EscrowError::EmptyAnswerSet);
        }

        let answer_totals = allowed_answers.iter().map(|a| (*a, 0)).collect();

        let mut pool = Self {
            id,
            owner,
            admin: None,
            allowed_answers,
            state: PoolState::Created,
            running: true,
            answer_totals,
            user_stakes: HashMap::new(),
            total: 0,
            correct_answer: None,
            withdrawn: 0,
            events: EventLog::new(),
        };
        pool.events.record(EscrowEvent::question_opened(
            pool.id,
            &pool.owner,
            pool.allowed_answers.len(),
        ));
        tracing::info!(
            question = %pool.id.short(),
            owner = pool.owner.short(),
            answers = pool.allowed_answers.len(),
            "question opened"
        );
        Ok(pool)
    }

    /// Let `admin` pass the owner gate as well
    pub fn with_admin(mut self, admin: Option<Address>) -> Self {
        self.admin = admin;
        self
    }

    // ------------------------------------------------------------------------
    // Authorization
    // ------------------------------------------------------------------------

    /// The one check every owner-gated entry point goes through
    fn authorize(&self, caller: &Address) -> EscrowResult<()> {
        let is_admin = self.admin.as_ref() == Some(caller);
        if caller != &self.owner && !is_admin {
            tracing::warn!(
                question = %self.id.short(),
                caller = caller.short(),
                "owner-only call rejected"
            );
            return Err(EscrowError::Unauthorized { caller: caller.to_string() });
        }
        Ok(())
    }

    fn require_allowed(&self, answer: &AnswerId) -> EscrowResult<()> {
        if !self.is_allowed(answer) {
            return Err(EscrowError::InvalidAnswer(answer.to_string()));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Owner operations
    // ------------------------------------------------------------------------

    /// Open or close the betting gate. Independent of `state`.
    pub fn set_running(&mut self, caller: &Address, enabled: bool) -> EscrowResult<()> {
        self.authorize(caller)?;
        self.running = enabled;
        self.events.record(EscrowEvent::running_toggled(self.id, caller, enabled));
        tracing::info!(question = %self.id.short(), running = enabled, "running toggled");
        Ok(())
    }

    /// Close betting ahead of resolution: `Created -> Waiting`
    pub fn advance(&mut self, caller: &Address) -> EscrowResult<()> {
        self.authorize(caller)?;
        if self.state != PoolState::Created {
            return Err(EscrowError::InvalidTransition {
                from: self.state,
                action: "close betting".to_string(),
            });
        }
        self.state = PoolState::Waiting;
        self.events.record(EscrowEvent::betting_closed(self.id, caller));
        tracing::info!(question = %self.id.short(), total = self.total, "betting closed");
        Ok(())
    }

    /// Record the correct answer: `Waiting -> Answered`
    pub fn resolve(&mut self, caller: &Address, answer: AnswerId) -> EscrowResult<()> {
        self.authorize(caller)?;
        self.require_allowed(&answer)?;
        if self.state != PoolState::Waiting {
            return Err(EscrowError::InvalidTransition {
                from: self.state,
                action: "answer".to_string(),
            });
        }

        self.state = PoolState::Answered;
        self.correct_answer = Some(answer);
        self.events.record(EscrowEvent::question_answered(self.id, caller, answer, self.total));

        let winning_total = self.answer_balance(&answer);
        if winning_total == 0 {
            tracing::warn!(
                question = %self.id.short(),
                total = self.total,
                "answered with no stake on the correct answer; funds stay escrowed"
            );
        } else {
            tracing::info!(
                question = %self.id.short(),
                answer = %answer.short(),
                total = self.total,
                winning_total,
                "question answered"
            );
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Participant operations
    // ------------------------------------------------------------------------

    /// Stake `stake` on `answer`. The stake is collected through `custody`
    /// in the same call; if the collection fails nothing changes.
    pub fn bet(
        &mut self,
        caller: &Address,
        answer: AnswerId,
        stake: Amount,
        custody: &mut impl Custody,
    ) -> EscrowResult<()> {
        if let Err(e) = self.check_bet(&answer, stake) {
            tracing::debug!(
                question = %self.id.short(),
                bettor = caller.short(),
                answer = %answer.short(),
                stake,
                error = %e,
                "bet rejected"
            );
            return Err(e);
        }

        let answer_total = self
            .answer_balance(&answer)
            .checked_add(stake)
            .ok_or(EscrowError::Overflow)?;
        let user_total = self
            .user_answer_balance(caller, &answer)
            .checked_add(stake)
            .ok_or(EscrowError::Overflow)?;
        let total = self.total.checked_add(stake).ok_or(EscrowError::Overflow)?;

        custody.collect(caller, stake)?;

        self.answer_totals.insert(answer, answer_total);
        self.user_stakes
            .entry(caller.clone())
            .or_default()
            .insert(answer, user_total);
        self.total = total;
        self.events.record(EscrowEvent::bet_placed(self.id, caller, answer, stake));

        tracing::info!(
            question = %self.id.short(),
            bettor = caller.short(),
            answer = %answer.short(),
            stake,
            answer_total,
            "bet placed"
        );
        Ok(())
    }

    fn check_bet(&self, answer: &AnswerId, stake: Amount) -> EscrowResult<()> {
        if !self.running {
            return Err(EscrowError::NotRunning);
        }
        if self.state != PoolState::Created {
            return Err(EscrowError::InvalidState(self.state));
        }
        self.require_allowed(answer)?;
        if stake == 0 {
            return Err(EscrowError::ZeroStake);
        }
        Ok(())
    }

    /// Pay the caller their share of the pool. Succeeds at most once per
    /// winner.
    pub fn withdraw(
        &mut self,
        caller: &Address,
        custody: &mut impl Custody,
    ) -> EscrowResult<Amount> {
        let correct = match (self.state, self.correct_answer) {
            (PoolState::Answered, Some(answer)) => answer,
            _ => {
                return Err(EscrowError::InvalidTransition {
                    from: self.state,
                    action: "withdraw".to_string(),
                })
            }
        };

        let payout = self.payout_of(caller);
        if payout == 0 {
            tracing::debug!(
                question = %self.id.short(),
                caller = caller.short(),
                "nothing to withdraw"
            );
            return Err(EscrowError::NothingToWithdraw);
        }
        let withdrawn = self.withdrawn.checked_add(payout).ok_or(EscrowError::Overflow)?;
        if withdrawn > self.total {
            return Err(EscrowError::Overflow);
        }

        // Effects before the push
        let claim = self.take_claim(caller, &correct);
        self.withdrawn = withdrawn;

        if let Err(e) = custody.pay(caller, payout) {
            self.restore_claim(caller, correct, claim);
            self.withdrawn -= payout;
            tracing::warn!(
                question = %self.id.short(),
                caller = caller.short(),
                payout,
                error = %e,
                "payout push failed, claim restored"
            );
            return Err(e.into());
        }

        self.events.record(EscrowEvent::withdrawn(self.id, caller, payout));
        tracing::info!(
            question = %self.id.short(),
            winner = caller.short(),
            payout,
            escrowed = self.escrowed(),
            "winnings withdrawn"
        );
        Ok(payout)
    }

    fn take_claim(&mut self, user: &Address, answer: &AnswerId) -> Amount {
        self.user_stakes
            .get_mut(user)
            .and_then(|stakes| stakes.get_mut(answer))
            .map(std::mem::take)
            .unwrap_or(0)
    }

    fn restore_claim(&mut self, user: &Address, answer: AnswerId, claim: Amount) {
        self.user_stakes.entry(user.clone()).or_default().insert(answer, claim);
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn id(&self) -> QuestionId {
        self.id
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn admin(&self) -> Option<&Address> {
        self.admin.as_ref()
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn running(&self) -> bool {
        self.running
    }

    /// The correct answer; `None` until the pool is answered
    pub fn the_answer(&self) -> Option<AnswerId> {
        self.correct_answer
    }

    pub fn allowed_answers(&self) -> &[AnswerId] {
        &self.allowed_answers
    }

    pub fn is_allowed(&self, answer: &AnswerId) -> bool {
        self.allowed_answers.contains(answer)
    }

    /// Total staked on `answer`
    pub fn answer_balance(&self, answer: &AnswerId) -> Amount {
        self.answer_totals.get(answer).copied().unwrap_or(0)
    }

    /// What `user` currently has staked on `answer`
    pub fn user_answer_balance(&self, user: &Address, answer: &AnswerId) -> Amount {
        self.user_stakes
            .get(user)
            .and_then(|stakes| stakes.get(answer))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_staked(&self) -> Amount {
        self.total
    }

    pub fn withdrawn(&self) -> Amount {
        self.withdrawn
    }

    /// Funds still held for this pool
    pub fn escrowed(&self) -> Amount {
        self.total.saturating_sub(self.withdrawn)
    }

    /// What `withdraw` would pay `user` right now
    pub fn payout_of(&self, user: &Address) -> Amount {
        match self.correct_answer {
            Some(answer) if self.state == PoolState::Answered => parimutuel_payout(
                self.user_answer_balance(user, &answer),
                self.total,
                self.answer_balance(&answer),
            ),
            _ => 0,
        }
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            question: self.id,
            owner: self.owner.clone(),
            state: self.state,
            running: self.running,
            answers: self
                .allowed_answers
                .iter()
                .map(|a| (*a, self.answer_balance(a)))
                .collect(),
            total_staked: self.total,
            correct_answer: self.correct_answer,
            winning_total: self.correct_answer.map(|a| self.answer_balance(&a)).unwrap_or(0),
            withdrawn: self.withdrawn,
            escrowed: self.escrowed(),
            participants: self.user_stakes.len(),
        }
    }

    // ------------------------------------------------------------------------
    // Consistency
    // ------------------------------------------------------------------------

    /// Check the ledger invariants of a pool that was not built through its
    /// own operations (e.g. one read back from a snapshot).
    pub fn validate(&self) -> EscrowResult<()> {
        let broken = |what: String| {
            Err(EscrowError::Snapshot(format!("Question {}: {}", self.id, what)))
        };

        if self.allowed_answers.is_empty() {
            return broken("empty answer set".to_string());
        }
        for (i, answer) in self.allowed_answers.iter().enumerate() {
            if self.allowed_answers[..i].contains(answer) {
                return broken(format!("answer {} listed twice", answer));
            }
        }
        if let Some(answer) = self.answer_totals.keys().find(|a| !self.is_allowed(a)) {
            return broken(format!("stake recorded on unknown answer {}", answer));
        }

        let staked: u128 = self.answer_totals.values().map(|v| *v as u128).sum();
        if staked != self.total as u128 {
            return broken(format!("total {} does not match answer totals {}", self.total, staked));
        }
        if self.withdrawn > self.total {
            return broken(format!("withdrawn {} exceeds total {}", self.withdrawn, self.total));
        }

        match (self.state, self.correct_answer) {
            (PoolState::Answered, Some(answer)) if !self.is_allowed(&answer) => {
                return broken(format!("correct answer {} is not allowed", answer));
            }
            (PoolState::Answered, Some(_)) => {}
            (PoolState::Answered, None) => {
                return broken("answered without a correct answer".to_string());
            }
            (state, Some(_)) => {
                return broken(format!("correct answer set while {}", state.as_str()));
            }
            (state, None) if self.withdrawn > 0 => {
                return broken(format!("payouts recorded while {}", state.as_str()));
            }
            (_, None) => {}
        }

        let mut by_answer: HashMap<AnswerId, u128> = HashMap::new();
        for stakes in self.user_stakes.values() {
            for (answer, stake) in stakes {
                if !self.is_allowed(answer) {
                    return broken(format!("user stake on unknown answer {}", answer));
                }
                *by_answer.entry(*answer).or_default() += *stake as u128;
            }
        }
        for answer in &self.allowed_answers {
            let users = by_answer.get(answer).copied().unwrap_or(0);
            let recorded = self.answer_balance(answer) as u128;
            // winners' stakes are zeroed as they withdraw
            let consistent = if Some(*answer) == self.correct_answer {
                users <= recorded
            } else {
                users == recorded
            };
            if !consistent {
                return broken(format!(
                    "user stakes on {} sum to {}, answer total is {}",
                    answer, users, recorded
                ));
            }
        }
        Ok(())
    }
}
