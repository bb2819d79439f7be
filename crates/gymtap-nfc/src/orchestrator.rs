//! NFC operation orchestrator.
//!
//! Sequences "validate, wait for card, write or read, report" over the
//! single reader. The reader lives behind an async mutex: admission waits
//! at most `admission_timeout` for it, then the device call runs on its own
//! task that owns the lock guard. The caller stops waiting after
//! `timeout + timeout_grace` and reports `Timeout`, while the task keeps the
//! reader locked until the adapter returns, so two card sessions never
//! interleave.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use gymtap_core::{
    MemberId, NfcConfig, NfcOperationResult, NfcOutcome, ReaderMode, ReaderStatus, TokenState,
    TokenValue,
};
use gymtap_hardware::simulation::SimulationCounters;
use gymtap_hardware::{AnyNfcDevice, HardwareError, NfcDevice};
use gymtap_storage::{
    MemberDirectory, SqliteMemberDirectory, SqliteTokenRepository, TokenRepository, TokenStore,
};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::availability::AvailabilityCache;
use crate::payload::{CardPayload, PayloadError};
use crate::selector::DeviceSelector;

/// Outcome of reading a card and checking the token it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardVerification {
    /// The underlying read.
    pub operation: NfcOperationResult,

    /// Member stored on the card, when the payload decoded.
    pub member_id: Option<MemberId>,

    /// State of the stored token, when the payload decoded.
    pub token_state: Option<TokenState>,
}

impl CardVerification {
    /// Card decoded and its token is currently valid for its member.
    pub fn is_valid(&self) -> bool {
        self.operation.is_success() && self.token_state.is_some_and(|s| s.is_valid())
    }
}

/// Token check of a payload handed over without a card read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PayloadVerification {
    pub member_id: MemberId,
    pub token_state: TokenState,
}

impl PayloadVerification {
    pub fn is_valid(&self) -> bool {
        self.token_state.is_valid()
    }
}

#[derive(Debug)]
enum DeviceOp {
    Write(Bytes),
    Read,
}

struct DeviceOutput {
    card_id: String,
    payload: Vec<u8>,
}

/// Serializes NFC operations over the active reader.
#[derive(Debug)]
pub struct NfcOrchestrator<T = SqliteTokenRepository, M = SqliteMemberDirectory> {
    store: Arc<TokenStore<T, M>>,
    device: Arc<Mutex<AnyNfcDevice>>,
    availability: Arc<AvailabilityCache>,
    selector: Arc<DeviceSelector>,
}

impl<T: TokenRepository, M: MemberDirectory> NfcOrchestrator<T, M> {
    /// Orchestrator that probes lazily on the first operation.
    ///
    /// Until then the slot holds a simulated reader; with forced simulation
    /// that reader is final and no probe ever runs.
    pub fn new(store: Arc<TokenStore<T, M>>, selector: DeviceSelector) -> Self {
        let forced = selector.config().force_simulation;
        let device = selector.simulated();

        Self {
            store,
            device: Arc::new(Mutex::new(device)),
            availability: Arc::new(AvailabilityCache::new(forced)),
            selector: Arc::new(selector),
        }
    }

    pub fn config(&self) -> &NfcConfig {
        self.selector.config()
    }

    /// Counters of the simulated readers this orchestrator has used.
    pub fn simulation_counters(&self) -> SimulationCounters {
        self.selector.simulation_counters()
    }

    /// Probe now instead of on the first operation. No-op when forced or
    /// already probed.
    pub async fn initialize(&self) {
        if !self.availability.needs_probe() {
            return;
        }
        let mut device = self.device.lock().await;
        if self.availability.needs_probe() {
            reprobe(&self.selector, &self.availability, &mut device).await;
        }
    }

    /// Write `token` onto the next card presented.
    ///
    /// # Errors
    ///
    /// Fails before the reader is touched if the token is unknown or its
    /// member deleted (`NotFound`), belongs to another member (`Mismatch`),
    /// or is not valid or its member not active (`InvalidInput`).
    /// Device-level failures are outcomes, not errors.
    pub async fn write_token(
        &self,
        token: &TokenValue,
        member_id: MemberId,
        timeout: Duration,
    ) -> gymtap_core::Result<NfcOperationResult> {
        let stored = self.store.require_valid(token, member_id).await?;

        let payload = CardPayload::new(stored.member_id, stored.value, stored.issued_at).encode();
        debug!(member_id = %member_id, bytes = payload.len(), "Writing token to card");

        let result = self.run(DeviceOp::Write(payload), timeout).await;
        if result.is_success() {
            info!(
                member_id = %member_id,
                card_id = result.card_id.as_deref().unwrap_or_default(),
                mode = %result.mode,
                "Token written to card"
            );
        }
        Ok(result)
    }

    /// Read the next card presented.
    ///
    /// A non-blank card whose content is not a GymTap payload reports
    /// `Mismatch`.
    pub async fn read_card(&self, timeout: Duration) -> NfcOperationResult {
        let result = self.run(DeviceOp::Read, timeout).await;
        match check_payload(&result) {
            Some(Err(e)) => mismatch(result, &e),
            _ => result,
        }
    }

    /// Read the next card and validate the token it carries against the
    /// member stored with it.
    ///
    /// # Errors
    ///
    /// `NotFound` if the card carries a token the store does not know, and
    /// `Mismatch` if that token belongs to another member.
    pub async fn verify_card(&self, timeout: Duration) -> gymtap_core::Result<CardVerification> {
        let result = self.run(DeviceOp::Read, timeout).await;

        let payload = match check_payload(&result) {
            Some(Ok(payload)) => payload,
            Some(Err(e)) => {
                return Ok(CardVerification {
                    operation: mismatch(result, &e),
                    member_id: None,
                    token_state: None,
                });
            }
            None => {
                return Ok(CardVerification {
                    operation: result,
                    member_id: None,
                    token_state: None,
                });
            }
        };

        let checked = self.check_token(&payload).await?;

        Ok(CardVerification {
            operation: result,
            member_id: Some(checked.member_id),
            token_state: Some(checked.token_state),
        })
    }

    /// Validate a payload read elsewhere. The reader is not used.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the bytes are not a GymTap payload, otherwise as
    /// for [`verify_card`](Self::verify_card).
    pub async fn verify_payload(
        &self,
        bytes: &[u8],
    ) -> gymtap_core::Result<PayloadVerification> {
        let payload = CardPayload::decode(bytes).map_err(|e| {
            debug!(error = %e, "Payload rejected");
            gymtap_core::Error::InvalidInput(format!("Invalid card payload: {e}"))
        })?;
        self.check_token(&payload).await
    }

    async fn check_token(
        &self,
        payload: &CardPayload,
    ) -> gymtap_core::Result<PayloadVerification> {
        let token_state = self
            .store
            .validate(&payload.token, Some(payload.member_id))
            .await?;

        Ok(PayloadVerification {
            member_id: payload.member_id,
            token_state,
        })
    }

    /// Cached reader status. Never probes, never waits for the reader.
    pub fn status(&self) -> ReaderStatus {
        self.availability.status()
    }

    /// Force a re-probe before the next operation.
    pub fn reset(&self) {
        if self.availability.invalidate() {
            info!("Reader availability reset");
        }
    }

    async fn run(&self, op: DeviceOp, timeout: Duration) -> NfcOperationResult {
        let started = Instant::now();
        let config = self.selector.config();

        let guard = match tokio::time::timeout(
            config.admission_timeout,
            Arc::clone(&self.device).lock_owned(),
        )
        .await
        {
            Ok(guard) => guard,
            Err(_) => {
                warn!("Reader busy, request rejected");
                return NfcOperationResult::failure(
                    self.availability.snapshot().mode,
                    NfcOutcome::DeviceBusy,
                    NfcOutcome::DeviceBusy.operator_hint(),
                    elapsed_ms(started),
                );
            }
        };

        let selector = Arc::clone(&self.selector);
        let availability = Arc::clone(&self.availability);
        let task = tokio::spawn(operate(guard, selector, availability, op, timeout));

        let mode_hint = self.availability.snapshot().mode;
        match tokio::time::timeout(timeout + config.timeout_grace, task).await {
            Ok(Ok((mode, Ok(output)))) => NfcOperationResult::success(
                mode,
                output.card_id,
                output.payload,
                elapsed_ms(started),
            ),
            Ok(Ok((mode, Err(e)))) => {
                let outcome = e.outcome();
                debug!(error = %e, %outcome, "Reader operation failed");
                NfcOperationResult::failure(
                    mode,
                    outcome,
                    outcome.operator_hint(),
                    elapsed_ms(started),
                )
            }
            Ok(Err(join_error)) => {
                error!(error = %join_error, "Reader task failed");
                self.availability.invalidate();
                NfcOperationResult::failure(
                    mode_hint,
                    NfcOutcome::Error,
                    NfcOutcome::Error.operator_hint(),
                    elapsed_ms(started),
                )
            }
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Reader did not return within timeout and grace"
                );
                NfcOperationResult::failure(
                    mode_hint,
                    NfcOutcome::Timeout,
                    NfcOutcome::Timeout.operator_hint(),
                    elapsed_ms(started),
                )
            }
        }
    }
}

/// Device side of one operation, run on its own task.
async fn operate(
    mut device: OwnedMutexGuard<AnyNfcDevice>,
    selector: Arc<DeviceSelector>,
    availability: Arc<AvailabilityCache>,
    op: DeviceOp,
    timeout: Duration,
) -> (ReaderMode, Result<DeviceOutput, HardwareError>) {
    if availability.needs_probe() {
        reprobe(&selector, &availability, &mut device).await;
    }

    let mode = device.mode();
    let result = match op {
        DeviceOp::Write(payload) => device.write(&payload, timeout).await.map(|w| DeviceOutput {
            card_id: w.card.card_id,
            payload: payload.to_vec(),
        }),
        DeviceOp::Read => device.read(timeout).await.map(|r| DeviceOutput {
            card_id: r.card.card_id,
            payload: r.payload,
        }),
    };

    if let Err(e) = &result
        && mode == ReaderMode::Hardware
        && e.invalidates_reader()
        && availability.invalidate()
    {
        warn!(error = %e, "Hardware fault, reader will be probed again");
    }

    (mode, result)
}

async fn reprobe(
    selector: &DeviceSelector,
    availability: &AvailabilityCache,
    device: &mut AnyNfcDevice,
) {
    let selection = selector.select().await;
    let mode = selection.device.mode();
    *device = selection.device;

    let previous = availability.record_probe(mode, selection.fallback_reason.clone());

    match (&previous.last_fallback_reason, &selection.fallback_reason) {
        (None, Some(reason)) => warn!(%reason, "Falling back to simulation mode"),
        (Some(_), None) if mode == ReaderMode::Hardware => info!("Hardware reader recovered"),
        _ if previous.mode != mode => info!(%mode, "Reader mode changed"),
        _ => debug!(%mode, "Reader probed"),
    }
}

/// Decode the payload of a successful, non-blank read.
fn check_payload(result: &NfcOperationResult) -> Option<Result<CardPayload, PayloadError>> {
    if !result.is_success() {
        return None;
    }
    let payload = result.payload.as_deref().filter(|p| !p.is_empty())?;
    Some(CardPayload::decode(payload))
}

fn mismatch(result: NfcOperationResult, error: &PayloadError) -> NfcOperationResult {
    debug!(%error, card_id = ?result.card_id, "Card payload rejected");
    let mut rejected = NfcOperationResult::failure(
        result.mode,
        NfcOutcome::Mismatch,
        NfcOutcome::Mismatch.operator_hint(),
        result.duration_ms,
    );
    rejected.card_id = result.card_id;
    rejected
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
