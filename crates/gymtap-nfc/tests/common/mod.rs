//! Shared fixtures for the gymtap-nfc integration tests.
//!
//! Every fixture runs on an in-memory database with real time; simulation
//! delays are kept short instead of pausing the clock, since the SQLite
//! pool relies on timers of its own.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use gymtap_core::{MemberId, NfcConfig};
use gymtap_hardware::AnyNfcDevice;
use gymtap_hardware::mock::{MockCard, MockNfc, MockNfcHandle};
use gymtap_nfc::{DeviceSelector, FrontDesk};
use gymtap_storage::{Database, SqliteMemberDirectory};

/// Timeout used for operations that are expected to complete.
pub const OP_TIMEOUT_MS: u64 = 2_000;

/// UID of the default test card.
pub const CARD_UID: [u8; 7] = [0x04, 0xA2, 0x4B, 0x12, 0x5C, 0x80, 0x01];

/// Hex card id of [`CARD_UID`].
pub const CARD_ID: &str = "04A24B125C8001";

/// Test configuration: short simulation delay and timeouts.
pub fn test_config() -> NfcConfig {
    NfcConfig::default()
        .simulation_delay(Duration::from_millis(20))
        .timeout_grace(Duration::from_millis(100))
        .admission_timeout(Duration::from_millis(100))
}

/// Database with one active member.
pub async fn database_with_member() -> (Database, MemberId) {
    let db = Database::in_memory().await.unwrap();
    let member = SqliteMemberDirectory::new(db.pool().clone())
        .insert("Ana Souza")
        .await
        .unwrap();
    (db, MemberId::new(member.id).unwrap())
}

/// Front desk pinned to simulation.
pub async fn simulated_desk() -> (FrontDesk, Database, MemberId) {
    let (db, member) = database_with_member().await;
    let desk = FrontDesk::open(&db, test_config().force_simulation(true)).unwrap();
    (desk, db, member)
}

/// Front desk whose "hardware" is a mock reader.
///
/// Every probe reopens the same mock, so the handle keeps working across
/// re-probes.
pub async fn mock_desk(config: NfcConfig) -> (FrontDesk, MockNfcHandle, MemberId) {
    let (db, member) = database_with_member().await;
    let (_reader, handle) = MockNfc::new();

    let factory_handle = handle.clone();
    let selector = DeviceSelector::with_factory(
        config,
        Arc::new(move |_: &NfcConfig| -> gymtap_hardware::Result<AnyNfcDevice> {
            Ok(AnyNfcDevice::Mock(factory_handle.connect()))
        }),
    );

    (FrontDesk::with_selector(&db, selector), handle, member)
}

/// Blank writable card.
pub fn blank_card() -> MockCard {
    MockCard::ntag215(CARD_UID.to_vec())
}
