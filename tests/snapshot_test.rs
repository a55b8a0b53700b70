//! Market snapshots survive a save/load cycle and refuse tampered files

use std::path::{Path, PathBuf};

use parimutuel_escrow::{
    AccountBook, AnswerId, EscrowConfig, EscrowError, Market, PoolState, QuestionId,
};

fn temp_state_path() -> PathBuf {
    std::env::temp_dir()
        .join(format!("parimutuel-escrow-{}", uuid::Uuid::new_v4()))
        .join("state.json")
}

fn hex_id(literal: &str) -> QuestionId {
    QuestionId::from_hex(literal).unwrap()
}

fn answered_market(book: &mut AccountBook) -> Market {
    let owner = book.register("OWNER", 0);
    let alice = book.register("ALICE", 1000);
    let bob = book.register("BOB", 1000);
    let (yes, no): (AnswerId, AnswerId) = (hex_id("0x1"), hex_id("0x2"));

    let mut market = Market::new();
    market.open_question(&owner, hex_id("0x1"), vec![yes, no]).unwrap();
    market.open_question(&owner, hex_id("0x2"), vec![yes, no]).unwrap();
    market.bet(&hex_id("0x1"), &alice, yes, 300, book).unwrap();
    market.bet(&hex_id("0x1"), &bob, no, 100, book).unwrap();
    market.wait_question(&hex_id("0x1"), &owner).unwrap();
    market.answer_question(&hex_id("0x1"), &owner, yes).unwrap();
    market
}

#[test]
fn test_round_trip_keeps_ledger() {
    let mut book = AccountBook::new();
    let market = answered_market(&mut book);
    let path = temp_state_path();

    let digest = market.save_to_path(&path).unwrap();
    let mut restored = Market::load_from_path(&path).unwrap();
    assert_eq!(restored.state_digest().unwrap(), digest);

    let q = hex_id("0x1");
    assert_eq!(restored.question_ids(), market.question_ids());
    assert_eq!(restored.get_question_state(&q).unwrap(), PoolState::Answered);
    assert_eq!(restored.get_question_answer(&q).unwrap(), Some(hex_id("0x1")));
    assert_eq!(restored.get_question_answer_balance(&q, &hex_id("0x2")).unwrap(), 100);
    assert_eq!(restored.events().len(), market.events().len());

    // the restored pool still pays out exactly once
    let alice = "ALICE".into();
    assert_eq!(restored.withdraw(&q, &alice, &mut book).unwrap(), 400);
    assert_eq!(restored.withdraw(&q, &alice, &mut book), Err(EscrowError::NothingToWithdraw));

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_tampered_snapshot_rejected() {
    let mut book = AccountBook::new();
    let market = answered_market(&mut book);
    let path = temp_state_path();
    market.save_to_path(&path).unwrap();

    let json = std::fs::read_to_string(&path).unwrap();
    let tampered = json.replacen("\"total\": 400", "\"total\": 4000", 1);
    assert_ne!(json, tampered);
    std::fs::write(&path, tampered).unwrap();

    match Market::load_from_path(&path) {
        Err(EscrowError::Snapshot(msg)) => assert!(msg.contains("Digest mismatch")),
        other => panic!("expected digest mismatch, got {:?}", other.map(|m| m.len())),
    }

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

/// Rewrite the unanswered question's ledger and save it back with a fresh,
/// matching digest
fn forge_snapshot(path: &Path, edit: impl Fn(&mut serde_json::Value)) {
    let json = std::fs::read_to_string(path).unwrap();
    let mut file: serde_json::Value = serde_json::from_str(&json).unwrap();
    let pools = file["market"]["pools"].as_object_mut().unwrap();
    let open_pool = pools
        .values_mut()
        .find(|pool| pool["state"] == "created")
        .unwrap();
    edit(open_pool);

    let forged: Market = serde_json::from_value(file["market"].take()).unwrap();
    forged.save_to_path(path).unwrap();
}

#[test]
fn test_resealed_snapshot_with_broken_ledger_rejected() {
    let mut book = AccountBook::new();
    let market = answered_market(&mut book);
    let path = temp_state_path();

    market.save_to_path(&path).unwrap();
    forge_snapshot(&path, |pool| {
        pool["state"] = "answered".into();
        pool["withdrawn"] = 5000.into();
    });
    match Market::load_from_path(&path) {
        Err(EscrowError::Snapshot(msg)) => assert!(!msg.contains("Digest mismatch"), "{}", msg),
        other => panic!("expected ledger rejection, got {:?}", other.map(|m| m.len())),
    }

    market.save_to_path(&path).unwrap();
    forge_snapshot(&path, |pool| {
        pool["total"] = 4000.into();
    });
    assert!(matches!(Market::load_from_path(&path), Err(EscrowError::Snapshot(_))));

    // an untouched save still loads
    market.save_to_path(&path).unwrap();
    let restored = Market::load_from_path(&path).unwrap();
    assert_eq!(restored.total_escrowed(), 400);

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_admin_survives_round_trip() {
    let cfg = EscrowConfig { market_admin: Some("ADMIN".into()), ..EscrowConfig::default() };
    let mut market = Market::with_config(&cfg);
    let q = hex_id("0x1");
    market.open_question(&"OPENER".into(), q, vec![hex_id("0x1")]).unwrap();
    let path = temp_state_path();
    market.save_to_path(&path).unwrap();

    let mut restored = Market::load_from_path(&path).unwrap();
    assert_eq!(restored.admin().map(|a| a.as_str()), Some("ADMIN"));
    restored.toggle_question_running(&"ADMIN".into(), &q, false).unwrap();
    assert_eq!(restored.get_question_running(&q), Ok(false));

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_missing_snapshot_is_an_error() {
    let path = temp_state_path();
    assert!(matches!(Market::load_from_path(&path), Err(EscrowError::Snapshot(_))));
}

#[test]
fn test_configure_after_load_applies_limits() {
    let mut book = AccountBook::new();
    let mut market = answered_market(&mut book);
    let cfg = EscrowConfig { event_log_limit: 3, max_answers: 1, ..EscrowConfig::default() };
    market.configure(&cfg);

    assert_eq!(market.events().len(), 3);
    let owner = "OWNER".into();
    assert!(matches!(
        market.open_question(&owner, hex_id("0x3"), vec![hex_id("0x1"), hex_id("0x2")]),
        Err(EscrowError::TooManyAnswers { count: 2, max: 1 })
    ));
}
