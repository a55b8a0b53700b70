// ============================================================================
// Escrow Activity Log
// ============================================================================
//
// Every committed state change leaves one record behind. Rejected calls
// leave nothing, since they change nothing.
//
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::ids::{Address, Amount, AnswerId, QuestionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    QuestionOpened,
    RunningToggled,
    BetPlaced,
    BettingClosed,
    QuestionAnswered,
    Withdrawn,
}

/// A single activity record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowEvent {
    pub id: String,
    /// Position in the emitting log, starting at 1
    pub seq: u64,
    pub kind: EventKind,
    pub question: QuestionId,
    /// Caller that triggered the change
    pub actor: Address,
    #[serde(default)]
    pub answer: Option<AnswerId>,
    #[serde(default)]
    pub amount: Option<Amount>,
    /// New value of the running flag, for `RunningToggled`
    #[serde(default)]
    pub running: Option<bool>,
    pub timestamp: i64,
    #[serde(default)]
    pub description: Option<String>,
}

impl EscrowEvent {
    pub fn new(kind: EventKind, question: QuestionId, actor: &Address) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            seq: 0,
            kind,
            question,
            actor: actor.clone(),
            answer: None,
            amount: None,
            running: None,
            timestamp: chrono::Utc::now().timestamp(),
            description: None,
        }
    }

    pub fn question_opened(question: QuestionId, owner: &Address, answers: usize) -> Self {
        let mut ev = Self::new(EventKind::QuestionOpened, question, owner);
        ev.description = Some(format!("Question opened with {} answers", answers));
        ev
    }

    pub fn running_toggled(question: QuestionId, actor: &Address, running: bool) -> Self {
        let mut ev = Self::new(EventKind::RunningToggled, question, actor);
        ev.running = Some(running);
        ev.description = Some(format!("Running set to {}", running));
        ev
    }

    pub fn bet_placed(
        question: QuestionId,
        bettor: &Address,
        answer: AnswerId,
        amount: Amount,
    ) -> Self {
        let mut ev = Self::new(EventKind::BetPlaced, question, bettor);
        ev.answer = Some(answer);
        ev.amount = Some(amount);
        ev.description = Some(format!("Bet {} on answer {}", amount, answer.short()));
        ev
    }

    pub fn betting_closed(question: QuestionId, actor: &Address) -> Self {
        let mut ev = Self::new(EventKind::BettingClosed, question, actor);
        ev.description = Some("Betting closed, waiting for answer".to_string());
        ev
    }

    pub fn question_answered(
        question: QuestionId,
        actor: &Address,
        answer: AnswerId,
        total: Amount,
    ) -> Self {
        let mut ev = Self::new(EventKind::QuestionAnswered, question, actor);
        ev.answer = Some(answer);
        ev.amount = Some(total);
        ev.description = Some(format!("Answered {} over a pool of {}", answer.short(), total));
        ev
    }

    pub fn withdrawn(question: QuestionId, winner: &Address, amount: Amount) -> Self {
        let mut ev = Self::new(EventKind::Withdrawn, question, winner);
        ev.amount = Some(amount);
        ev.description = Some(format!("Withdrew {}", amount));
        ev
    }
}

/// Append-only log with an optional retention cap (oldest dropped first)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<EscrowEvent>,
    next_seq: u64,
    #[serde(default)]
    limit: Option<usize>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self { limit: Some(limit), ..Self::default() }
    }

    /// Change the retention cap, trimming right away if needed
    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
        self.trim();
    }

    pub fn record(&mut self, mut event: EscrowEvent) -> &EscrowEvent {
        self.next_seq += 1;
        event.seq = self.next_seq;
        self.events.push(event);
        self.trim();

        // a zero limit still keeps the event just pushed
        &self.events[self.events.len() - 1]
    }

    fn trim(&mut self) {
        if let Some(limit) = self.limit {
            let keep = limit.max(1);
            if self.events.len() > keep {
                let excess = self.events.len() - keep;
                self.events.drain(..excess);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn all(&self) -> &[EscrowEvent] {
        &self.events
    }

    pub fn for_question(&self, question: &QuestionId) -> Vec<&EscrowEvent> {
        self.events.iter().filter(|e| &e.question == question).collect()
    }

    /// Most recent first
    pub fn recent(&self, limit: usize) -> Vec<&EscrowEvent> {
        self.events.iter().rev().take(limit).collect()
    }

    pub fn last(&self) -> Option<&EscrowEvent> {
        self.events.last()
    }
}
