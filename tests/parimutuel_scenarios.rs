//! End-to-end betting rounds through the market and an in-memory account book
//!
//! Question and answer ids are written the way the fixtures write them:
//! short hex literals zero-filled to 32 bytes.

use parimutuel_escrow::{
    AccountBook, Address, Amount, AnswerId, EscrowError, EventKind, Market, PoolState, QuestionId,
};

// ============================================================================
// TEST ACCOUNTS
// ============================================================================

const STARTING_BALANCE: Amount = 10_000;

const OWNER: &str = "L1OWNER000000001";
const ACCT_X: &str = "L1ACCTX000000001";
const ACCT_Y: &str = "L1ACCTY000000001";
const ACCT_Z: &str = "L1ACCTZ000000001";

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn hex_id(literal: &str) -> QuestionId {
    QuestionId::from_hex(literal).expect("valid fixture id")
}

fn answers() -> [AnswerId; 3] {
    [hex_id("0x1"), hex_id("0x2"), hex_id("0x3")]
}

struct Round {
    market: Market,
    book: AccountBook,
    question: QuestionId,
    owner: Address,
    x: Address,
    y: Address,
    z: Address,
}

fn open_round() -> Round {
    let mut book = AccountBook::new();
    let owner = book.register(OWNER, 0);
    let x = book.register(ACCT_X, STARTING_BALANCE);
    let y = book.register(ACCT_Y, STARTING_BALANCE);
    let z = book.register(ACCT_Z, STARTING_BALANCE);

    let mut market = Market::new();
    let question = hex_id("0x1");
    market
        .open_question(&owner, question, answers())
        .expect("open question");

    Round { market, book, question, owner, x, y, z }
}

impl Round {
    fn bet(&mut self, who: &Address, answer: AnswerId, stake: Amount) {
        self.market
            .bet(&self.question, who, answer, stake, &mut self.book)
            .expect("bet accepted");
    }

    fn close_and_answer(&mut self, answer: AnswerId) {
        self.market.wait_question(&self.question, &self.owner).expect("close betting");
        self.market
            .answer_question(&self.question, &self.owner, answer)
            .expect("answer question");
    }

    fn withdraw(&mut self, who: &Address) -> Result<Amount, EscrowError> {
        self.market.withdraw(&self.question, who, &mut self.book)
    }

    fn escrowed(&self) -> Amount {
        self.market.pool_by_id(&self.question).unwrap().escrowed()
    }
}

// ============================================================================
// WORKED EXAMPLE
// ============================================================================

//         |   x   |   y   |   z   |
// --------+-------+-------+-------|
// A       |  100  |   0   |  300  |
// B       |  100  |  200  |   0   |
// C       |   0   |  200  |  300  |
//
// C wins: W = 500, T = 1200. y gets 480, z gets 720, x gets nothing.
#[test]
fn test_withdrawal_math_for_three_bettors() {
    let mut r = open_round();
    let [a, b, c] = answers();
    let (x, y, z) = (r.x.clone(), r.y.clone(), r.z.clone());

    r.bet(&x, a, 100);
    r.bet(&z, a, 300);
    r.bet(&x, b, 100);
    r.bet(&y, b, 200);
    r.bet(&y, c, 200);
    r.bet(&z, c, 300);
    r.close_and_answer(c);

    assert_eq!(r.market.get_question_answer_balance(&r.question, &c).unwrap(), 500);
    assert_eq!(r.escrowed(), 1200);

    assert_eq!(r.withdraw(&y).unwrap(), 480);
    assert_eq!(r.withdraw(&z).unwrap(), 720);
    assert_eq!(r.withdraw(&x), Err(EscrowError::NothingToWithdraw));

    assert_eq!(r.escrowed(), 0);
    assert_eq!(r.book.escrowed(), 0);
    assert_eq!(r.book.balance(&x), STARTING_BALANCE - 200);
    assert_eq!(r.book.balance(&y), STARTING_BALANCE - 400 + 480);
    assert_eq!(r.book.balance(&z), STARTING_BALANCE - 600 + 720);
    assert_eq!(r.book.total_supply(), 3 * STARTING_BALANCE as u128);

    println!("🏆 y won 480, z won 720, nothing left in escrow");
}

#[test]
fn test_sole_bettor_gets_stake_back() {
    let mut r = open_round();
    let [a, _, _] = answers();
    let x = r.x.clone();

    r.bet(&x, a, 100);
    r.close_and_answer(a);

    assert_eq!(r.withdraw(&x).unwrap(), 100);
    assert_eq!(r.book.balance(&x), STARTING_BALANCE);
}

#[test]
fn test_sole_winner_takes_whole_pool() {
    let mut r = open_round();
    let [a, b, c] = answers();
    let (x, y, z) = (r.x.clone(), r.y.clone(), r.z.clone());

    r.bet(&x, a, 333);
    r.bet(&y, b, 250);
    r.bet(&z, c, 17);
    r.close_and_answer(c);

    assert_eq!(r.withdraw(&z).unwrap(), 600);
    assert_eq!(r.escrowed(), 0);
}

#[test]
fn test_loser_gets_nothing() {
    let mut r = open_round();
    let [a, b, _] = answers();
    let (x, y) = (r.x.clone(), r.y.clone());

    r.bet(&x, a, 100);
    r.bet(&y, b, 100);
    r.close_and_answer(b);

    assert_eq!(r.withdraw(&x), Err(EscrowError::NothingToWithdraw));
    assert_eq!(r.book.balance(&x), STARTING_BALANCE - 100);
}

#[test]
fn test_no_double_withdrawal() {
    let mut r = open_round();
    let [a, b, _] = answers();
    let (x, y) = (r.x.clone(), r.y.clone());

    r.bet(&x, a, 100);
    r.bet(&y, b, 300);
    r.close_and_answer(a);

    assert_eq!(r.withdraw(&x).unwrap(), 400);
    assert_eq!(r.withdraw(&x), Err(EscrowError::NothingToWithdraw));
    assert_eq!(r.book.balance(&x), STARTING_BALANCE + 300);
}

// ============================================================================
// STATE MACHINE AND GATES
// ============================================================================

#[test]
fn test_bet_after_answer_rejected() {
    let mut r = open_round();
    let [a, _, _] = answers();
    let x = r.x.clone();

    r.close_and_answer(a);
    let err = r.market.bet(&r.question, &x, a, 100, &mut r.book).unwrap_err();
    assert_eq!(err, EscrowError::InvalidState(PoolState::Answered));
    assert_eq!(r.book.balance(&x), STARTING_BALANCE);
}

#[test]
fn test_non_owner_cannot_answer() {
    let mut r = open_round();
    let [a, _, _] = answers();
    let x = r.x.clone();

    r.market.wait_question(&r.question, &r.owner).unwrap();
    let err = r.market.answer_question(&r.question, &x, a).unwrap_err();
    assert!(matches!(err, EscrowError::Unauthorized { .. }));
    assert_eq!(r.market.get_question_state(&r.question).unwrap(), PoolState::Waiting);
    assert_eq!(r.market.get_question_answer(&r.question).unwrap(), None);
}

#[test]
fn test_toggle_running_blocks_then_allows_bet() {
    let mut r = open_round();
    let [a, _, _] = answers();
    let x = r.x.clone();

    r.market.toggle_question_running(&r.owner, &r.question, false).unwrap();
    let err = r.market.bet(&r.question, &x, a, 100, &mut r.book).unwrap_err();
    assert_eq!(err, EscrowError::NotRunning);
    assert_eq!(r.market.get_question_user_answer_balance(&r.question, &x, &a).unwrap(), 0);

    r.market.toggle_question_running(&r.owner, &r.question, true).unwrap();
    r.bet(&x, a, 100);
    assert_eq!(r.market.get_question_user_answer_balance(&r.question, &x, &a).unwrap(), 100);
}

#[test]
fn test_market_admin_toggles_question_opened_by_someone_else() {
    let mut book = AccountBook::new();
    let admin = book.register(OWNER, 0);
    let opener = book.register(ACCT_X, STARTING_BALANCE);
    let bettor = book.register(ACCT_Y, STARTING_BALANCE);
    let question = hex_id("0x1");
    let [a, _, _] = answers();

    let mut market = Market::with_admin(admin.clone());
    market.open_question(&opener, question, answers()).unwrap();
    assert!(market.get_question_running(&question).unwrap());

    market.toggle_question_running(&admin, &question, false).unwrap();
    assert!(!market.get_question_running(&question).unwrap());
    assert_eq!(
        market.bet(&question, &bettor, a, 100, &mut book),
        Err(EscrowError::NotRunning)
    );

    market.toggle_question_running(&admin, &question, true).unwrap();
    market.bet(&question, &bettor, a, 100, &mut book).unwrap();
    assert_eq!(market.get_question_user_answer_balance(&question, &bettor, &a).unwrap(), 100);
}

#[test]
fn test_answer_before_close_rejected() {
    let mut r = open_round();
    let [a, _, _] = answers();

    let err = r.market.answer_question(&r.question, &r.owner, a).unwrap_err();
    assert!(matches!(err, EscrowError::InvalidTransition { from: PoolState::Created, .. }));
}

#[test]
fn test_activity_log_follows_the_round() {
    let mut r = open_round();
    let [a, _, _] = answers();
    let x = r.x.clone();

    r.bet(&x, a, 100);
    r.close_and_answer(a);
    r.withdraw(&x).unwrap();

    let kinds: Vec<EventKind> = r
        .market
        .events_for(&r.question)
        .unwrap()
        .iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::QuestionOpened,
            EventKind::BetPlaced,
            EventKind::BettingClosed,
            EventKind::QuestionAnswered,
            EventKind::Withdrawn,
        ]
    );
    assert_eq!(r.market.events().len(), 5);
    assert_eq!(r.market.recent_events(1)[0].amount, Some(100));
}

// ============================================================================
// CONSERVATION
// ============================================================================

#[test]
fn test_payouts_never_exceed_pool() {
    // stakes chosen so floor division leaves dust
    let stakes: [(usize, Amount, Amount); 3] = [(0, 7, 11), (1, 13, 0), (2, 5, 29)];
    let mut r = open_round();
    let [a, b, _] = answers();
    let bettors = [r.x.clone(), r.y.clone(), r.z.clone()];

    for (who, on_a, on_b) in stakes {
        if on_a > 0 {
            r.bet(&bettors[who], a, on_a);
        }
        if on_b > 0 {
            r.bet(&bettors[who], b, on_b);
        }
    }
    r.close_and_answer(a);

    let total: Amount = 7 + 11 + 13 + 5 + 29;
    let winning: Amount = 7 + 13 + 5;
    let paid: Amount = bettors.iter().map(|who| r.withdraw(who).unwrap()).sum();

    assert!(paid <= total);
    assert!(total - paid < winning);
    assert_eq!(r.escrowed(), total - paid);
    assert_eq!(r.book.escrowed(), total - paid);
}
