//! End-to-end flows through the front desk: token gate, simulated and mock
//! readers, fallback, re-probing, serialization and timeouts.
//!
//! Run with: cargo test --package gymtap-nfc --test orchestrator_flow

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{CARD_ID, OP_TIMEOUT_MS, blank_card, mock_desk, simulated_desk, test_config};
use gymtap_core::{Error, MemberId, NfcConfig, NfcOutcome, ReaderMode, TokenState};
use gymtap_hardware::{AnyNfcDevice, HardwareError};
use gymtap_hardware::mock::MockFault;
use gymtap_nfc::{CardPayload, DeviceSelector, FrontDesk};
use gymtap_storage::{MemberStatus, SqliteMemberDirectory};

#[tokio::test]
async fn test_simulated_write_then_read_round_trip() {
    let (desk, _db, member) = simulated_desk().await;
    let token = desk.generate_token(member, Some(30)).await.unwrap();

    let written = desk
        .write_to_card(token.value.as_str(), member, Some(OP_TIMEOUT_MS))
        .await
        .unwrap();
    assert_eq!(written.outcome, NfcOutcome::Success);
    assert_eq!(written.mode, ReaderMode::Simulation);
    assert_eq!(written.card_id.as_deref(), Some("SIM0001"));

    let read = desk.read_card(Some(OP_TIMEOUT_MS)).await.unwrap();
    assert_eq!(read.outcome, NfcOutcome::Success);
    assert_eq!(read.payload, written.payload);

    let decoded = CardPayload::decode(read.payload.as_deref().unwrap()).unwrap();
    assert_eq!(decoded.member_id, member);
    assert_eq!(decoded.token, token.value);
}

#[tokio::test]
async fn test_forced_simulation_never_probes() {
    let (db, _member) = common::database_with_member().await;
    let probes = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = probes.clone();
    let selector = DeviceSelector::with_factory(
        test_config().force_simulation(true),
        Arc::new(move |_: &NfcConfig| -> gymtap_hardware::Result<AnyNfcDevice> {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(HardwareError::unavailable("should never be opened"))
        }),
    );
    let desk = FrontDesk::with_selector(&db, selector);

    desk.initialize().await;
    let status = desk.reader_status();
    assert_eq!(status.mode, ReaderMode::Simulation);
    assert!(status.forced);
    assert!(status.available);
    assert_eq!(status.last_checked_at, None);

    let read = desk.read_card(Some(OP_TIMEOUT_MS)).await.unwrap();
    assert_eq!(read.mode, ReaderMode::Simulation);

    desk.reset_reader();
    desk.read_card(Some(OP_TIMEOUT_MS)).await.unwrap();

    assert_eq!(probes.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(desk.reader_status().last_checked_at, None);
}

#[tokio::test]
async fn test_invalid_tokens_never_reach_the_reader() {
    let (desk, handle, member) = mock_desk(test_config()).await;
    let token = desk.generate_token(member, None).await.unwrap();
    desk.revoke_token(token.value.as_str()).await.unwrap();

    let revoked = desk
        .write_to_card(token.value.as_str(), member, Some(OP_TIMEOUT_MS))
        .await;
    assert!(matches!(revoked, Err(Error::InvalidInput(_))));

    let unknown = desk
        .write_to_card("UnknownToken123", member, Some(OP_TIMEOUT_MS))
        .await;
    assert!(matches!(unknown, Err(Error::NotFound(_))));

    let malformed = desk.write_to_card("not a token!", member, None).await;
    assert!(matches!(malformed, Err(Error::InvalidInput(_))));

    assert_eq!(handle.operations(), 0);
    assert_eq!(handle.detect_calls(), 0);
}

#[tokio::test]
async fn test_token_bound_to_other_member_is_rejected() {
    let (db, member) = common::database_with_member().await;
    let other = SqliteMemberDirectory::new(db.pool().clone())
        .insert("Bruno Lima")
        .await
        .unwrap();
    let other = MemberId::new(other.id).unwrap();
    let desk = FrontDesk::open(&db, test_config().force_simulation(true)).unwrap();

    let token = desk.generate_token(member, None).await.unwrap();

    let result = desk
        .write_to_card(token.value.as_str(), other, Some(OP_TIMEOUT_MS))
        .await;
    assert!(matches!(result, Err(Error::Mismatch(_))));
    assert!(matches!(
        desk.validate_token(token.value.as_str(), Some(other)).await,
        Err(Error::Mismatch(_))
    ));
}

#[tokio::test]
async fn test_deleted_member_tokens_are_gone() {
    let (desk, db, member) = simulated_desk().await;
    let token = desk.generate_token(member, None).await.unwrap();

    SqliteMemberDirectory::new(db.pool().clone())
        .set_status(member, MemberStatus::Deleted)
        .await
        .unwrap();

    assert!(matches!(
        desk.validate_token(token.value.as_str(), Some(member)).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        desk.write_to_card(token.value.as_str(), member, Some(OP_TIMEOUT_MS))
            .await,
        Err(Error::NotFound(_))
    ));
    assert_eq!(desk.simulation_counters().writes(), 0);
}

#[tokio::test]
async fn test_inactive_member_cannot_receive_a_card() {
    let (desk, db, member) = simulated_desk().await;
    let token = desk.generate_token(member, None).await.unwrap();
    let members = SqliteMemberDirectory::new(db.pool().clone());

    members
        .set_status(member, MemberStatus::Inactive)
        .await
        .unwrap();

    match desk
        .write_to_card(token.value.as_str(), member, Some(OP_TIMEOUT_MS))
        .await
    {
        Err(Error::InvalidInput(message)) => {
            assert_eq!(message, format!("Member {member} is not active"));
        }
        other => panic!("expected InvalidInput, got {other:?}"),
    }
    assert_eq!(desk.simulation_counters().writes(), 0);

    members.set_status(member, MemberStatus::Active).await.unwrap();
    let written = desk
        .write_to_card(token.value.as_str(), member, Some(OP_TIMEOUT_MS))
        .await
        .unwrap();
    assert!(written.is_success());
    assert_eq!(desk.simulation_counters().writes(), 1);
}

#[tokio::test]
async fn test_forced_simulation_rejects_invalid_tokens_without_waiting() {
    let (db, member) = common::database_with_member().await;
    let config = test_config()
        .force_simulation(true)
        .simulation_delay(Duration::from_secs(2));
    let desk = FrontDesk::open(&db, config).unwrap();
    let counters = desk.simulation_counters();

    let token = desk.generate_token(member, None).await.unwrap();
    desk.revoke_token(token.value.as_str()).await.unwrap();

    let started = std::time::Instant::now();
    let revoked = desk
        .write_to_card(token.value.as_str(), member, Some(5_000))
        .await;
    let unknown = desk
        .write_to_card("UnknownToken123", member, Some(5_000))
        .await;

    assert!(matches!(revoked, Err(Error::InvalidInput(_))));
    assert!(matches!(unknown, Err(Error::NotFound(_))));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(counters.writes(), 0);
    assert_eq!(counters.reads(), 0);
}

#[tokio::test]
async fn test_verify_payload_checks_the_stored_token() {
    let (desk, _db, member) = simulated_desk().await;
    let token = desk.generate_token(member, None).await.unwrap();

    let written = desk
        .write_to_card(token.value.as_str(), member, Some(OP_TIMEOUT_MS))
        .await
        .unwrap();
    let payload = written.payload.unwrap();

    let verification = desk.verify_payload(&payload).await.unwrap();
    assert!(verification.is_valid());
    assert_eq!(verification.member_id, member);

    desk.revoke_token(token.value.as_str()).await.unwrap();
    let verification = desk.verify_payload(&payload).await.unwrap();
    assert!(!verification.is_valid());
    assert_eq!(verification.token_state, TokenState::Revoked);

    let mut corrupted = payload.clone();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0xFF;
    assert!(matches!(
        desk.verify_payload(&corrupted).await,
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        desk.verify_payload(&[]).await,
        Err(Error::InvalidInput(_))
    ));

    // Only the write touched the reader.
    let counters = desk.simulation_counters();
    assert_eq!(counters.writes(), 1);
    assert_eq!(counters.reads(), 0);
}

#[tokio::test]
async fn test_revoke_scenario() {
    let (desk, _db, member) = simulated_desk().await;
    let token = desk.generate_token(member, None).await.unwrap();

    let first = desk
        .write_to_card(token.value.as_str(), member, Some(OP_TIMEOUT_MS))
        .await
        .unwrap();
    assert!(first.is_success());

    desk.revoke_token(token.value.as_str()).await.unwrap();
    desk.revoke_token(token.value.as_str()).await.unwrap();

    assert_eq!(
        desk.validate_token(token.value.as_str(), None).await.unwrap(),
        TokenState::Revoked
    );
    assert!(matches!(
        desk.write_to_card(token.value.as_str(), member, Some(OP_TIMEOUT_MS))
            .await,
        Err(Error::InvalidInput(_))
    ));

    let listed = desk.list_tokens(member).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].revoked);
}

#[tokio::test]
async fn test_hardware_write_commits_decodable_payload() {
    let (desk, handle, member) = mock_desk(test_config()).await;
    let token = desk.generate_token(member, Some(365)).await.unwrap();

    handle.present_card(blank_card()).await.unwrap();
    let result = desk
        .write_to_card(token.value.as_str(), member, Some(OP_TIMEOUT_MS))
        .await
        .unwrap();

    assert_eq!(result.outcome, NfcOutcome::Success);
    assert_eq!(result.mode, ReaderMode::Hardware);
    assert_eq!(result.card_id.as_deref(), Some(CARD_ID));

    let written = handle.written_payloads();
    assert_eq!(written.len(), 1);
    let decoded = CardPayload::decode(&written[0].1).unwrap();
    assert_eq!(decoded.token, token.value);
    assert_eq!(decoded.member_id, member);
    assert_eq!(decoded.issued_at.timestamp(), token.issued_at.timestamp());
}

#[tokio::test]
async fn test_locked_card_is_mismatch() {
    let (desk, handle, member) = mock_desk(test_config()).await;
    let token = desk.generate_token(member, None).await.unwrap();

    handle.present_card(blank_card().locked()).await.unwrap();
    let result = desk
        .write_to_card(token.value.as_str(), member, Some(OP_TIMEOUT_MS))
        .await
        .unwrap();

    assert_eq!(result.outcome, NfcOutcome::Mismatch);
    assert_eq!(result.message, NfcOutcome::Mismatch.operator_hint());
    assert!(handle.written_payloads().is_empty());
}

#[tokio::test]
async fn test_foreign_card_content_is_mismatch_and_blank_is_success() {
    let (desk, handle, _member) = mock_desk(test_config()).await;

    handle
        .present_card(blank_card().with_contents(b"https://example.org".to_vec()))
        .await
        .unwrap();
    let foreign = desk.read_card(Some(OP_TIMEOUT_MS)).await.unwrap();
    assert_eq!(foreign.outcome, NfcOutcome::Mismatch);
    assert_eq!(foreign.card_id.as_deref(), Some(CARD_ID));

    handle.present_card(blank_card()).await.unwrap();
    let blank = desk.read_card(Some(OP_TIMEOUT_MS)).await.unwrap();
    assert_eq!(blank.outcome, NfcOutcome::Success);
    assert_eq!(blank.payload.as_deref(), Some(&[][..]));
}

#[tokio::test]
async fn test_verify_card_reports_token_state() {
    let (desk, handle, member) = mock_desk(test_config()).await;
    let token = desk.generate_token(member, None).await.unwrap();

    handle.present_card(blank_card()).await.unwrap();
    desk.write_to_card(token.value.as_str(), member, Some(OP_TIMEOUT_MS))
        .await
        .unwrap();
    let stored = handle.written_payloads().remove(0).1;

    handle
        .present_card(blank_card().with_contents(stored.clone()))
        .await
        .unwrap();
    let valid = desk.verify_card(Some(OP_TIMEOUT_MS)).await.unwrap();
    assert!(valid.is_valid());
    assert_eq!(valid.member_id, Some(member));

    desk.revoke_token(token.value.as_str()).await.unwrap();
    handle
        .present_card(blank_card().with_contents(stored))
        .await
        .unwrap();
    let revoked = desk.verify_card(Some(OP_TIMEOUT_MS)).await.unwrap();
    assert!(!revoked.is_valid());
    assert_eq!(revoked.token_state, Some(TokenState::Revoked));
}

#[tokio::test]
async fn test_card_timeout_is_an_outcome_and_keeps_reader() {
    let (desk, handle, _member) = mock_desk(test_config()).await;

    let result = desk.read_card(Some(200)).await.unwrap();
    assert_eq!(result.outcome, NfcOutcome::Timeout);
    assert_eq!(result.mode, ReaderMode::Hardware);
    assert!(result.duration_ms >= 200);

    desk.read_card(Some(50)).await.unwrap();
    assert_eq!(handle.detect_calls(), 1);
}

#[tokio::test]
async fn test_unavailable_hardware_falls_back_to_simulation() {
    let (desk, handle, _member) = mock_desk(test_config()).await;
    handle.set_available(false);

    let result = desk.read_card(Some(OP_TIMEOUT_MS)).await.unwrap();
    assert_eq!(result.mode, ReaderMode::Simulation);
    assert!(result.is_success());

    let status = desk.reader_status();
    assert_eq!(status.mode, ReaderMode::Simulation);
    assert!(!status.forced);
    assert!(status.last_fallback_reason.is_some());
    assert!(status.last_checked_at.is_some());

    // Fallback is cached: no probe per operation.
    desk.read_card(Some(OP_TIMEOUT_MS)).await.unwrap();
    assert_eq!(handle.detect_calls(), 1);

    // Explicit reset picks the reader up again.
    handle.set_available(true);
    desk.reset_reader();
    handle.present_card(blank_card()).await.unwrap();
    let recovered = desk.read_card(Some(OP_TIMEOUT_MS)).await.unwrap();
    assert_eq!(recovered.mode, ReaderMode::Hardware);
    assert_eq!(desk.reader_status().last_fallback_reason, None);
    assert_eq!(handle.detect_calls(), 2);
}

#[tokio::test]
async fn test_status_never_probes() {
    let (desk, handle, _member) = mock_desk(test_config()).await;

    for _ in 0..10 {
        let status = desk.reader_status();
        assert_eq!(status.last_checked_at, None);
        assert!(!status.available);
    }
    assert_eq!(handle.detect_calls(), 0);

    desk.initialize().await;
    assert_eq!(handle.detect_calls(), 1);
    for _ in 0..10 {
        assert_eq!(desk.reader_status().mode, ReaderMode::Hardware);
    }
    assert_eq!(handle.detect_calls(), 1);
}

#[tokio::test]
async fn test_hardware_error_triggers_exactly_one_reprobe() {
    let (desk, handle, _member) = mock_desk(test_config()).await;

    handle.present_card(blank_card()).await.unwrap();
    desk.read_card(Some(OP_TIMEOUT_MS)).await.unwrap();
    assert_eq!(handle.detect_calls(), 1);

    handle.inject_fault(MockFault::Disconnect).await.unwrap();
    let failed = desk.read_card(Some(OP_TIMEOUT_MS)).await.unwrap();
    assert_eq!(failed.outcome, NfcOutcome::Error);
    assert_eq!(failed.message, NfcOutcome::Error.operator_hint());
    assert!(!desk.reader_status().available);
    assert_eq!(handle.detect_calls(), 1);

    handle.present_card(blank_card()).await.unwrap();
    desk.read_card(Some(OP_TIMEOUT_MS)).await.unwrap();
    assert_eq!(handle.detect_calls(), 2);

    handle.present_card(blank_card()).await.unwrap();
    desk.read_card(Some(OP_TIMEOUT_MS)).await.unwrap();
    assert_eq!(handle.detect_calls(), 2);
}

#[tokio::test]
async fn test_device_unavailable_mid_operation_invalidates() {
    let (desk, handle, _member) = mock_desk(test_config()).await;
    desk.initialize().await;

    handle.inject_fault(MockFault::Unavailable).await.unwrap();
    let result = desk.read_card(Some(OP_TIMEOUT_MS)).await.unwrap();

    assert_eq!(result.outcome, NfcOutcome::DeviceUnavailable);
    assert!(!desk.reader_status().available);
}

#[tokio::test]
async fn test_concurrent_request_is_rejected_busy() {
    let (desk, handle, _member) = mock_desk(test_config()).await;
    desk.initialize().await;

    let first = {
        let desk = desk.clone();
        tokio::spawn(async move { desk.read_card(Some(OP_TIMEOUT_MS)).await.unwrap() })
    };
    // Let the first request take the reader.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = desk.read_card(Some(OP_TIMEOUT_MS)).await.unwrap();
    assert_eq!(second.outcome, NfcOutcome::DeviceBusy);

    handle.present_card(blank_card()).await.unwrap();
    let first = first.await.unwrap();
    assert_eq!(first.outcome, NfcOutcome::Success);

    assert_eq!(handle.max_concurrent_operations(), 1);
}

#[tokio::test]
async fn test_stuck_adapter_is_bounded_and_not_interleaved() {
    let config = test_config()
        .timeout_grace(Duration::from_millis(100))
        .admission_timeout(Duration::from_millis(50));
    let (desk, handle, _member) = mock_desk(config).await;
    desk.initialize().await;
    handle.set_ignore_timeout(true);

    let started = std::time::Instant::now();
    let result = desk.read_card(Some(200)).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result.outcome, NfcOutcome::Timeout);
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_millis(1_500));

    // The stuck session still owns the reader.
    let next = desk.read_card(Some(200)).await.unwrap();
    assert_eq!(next.outcome, NfcOutcome::DeviceBusy);

    // Completing the stuck session frees the reader.
    handle.set_ignore_timeout(false);
    handle.present_card(blank_card()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    handle.present_card(blank_card()).await.unwrap();
    let after = desk.read_card(Some(OP_TIMEOUT_MS)).await.unwrap();
    assert_eq!(after.outcome, NfcOutcome::Success);
    assert_eq!(handle.max_concurrent_operations(), 1);
}

#[tokio::test]
async fn test_request_shape_validation() {
    let (desk, _db, member) = simulated_desk().await;

    assert!(matches!(
        desk.read_card(Some(0)).await,
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        desk.read_card(Some(10 * 60 * 1000)).await,
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        desk.generate_token(member, Some(0)).await,
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        desk.generate_token(MemberId::new(999).unwrap(), None).await,
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        desk.get_token("missing").await,
        Err(Error::NotFound(_))
    ));
}
