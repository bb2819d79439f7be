//! Front desk facade.
//!
//! The surface the API layer consumes: string and millisecond inputs in,
//! the shared error taxonomy and [`NfcOperationResult`] out.

use std::sync::Arc;
use std::time::Duration;

use gymtap_core::constants::MAX_OPERATION_TIMEOUT_MS;
use gymtap_core::{
    Error, MemberId, NfcConfig, NfcOperationResult, ReaderStatus, Result, TokenState, TokenValue,
};
use gymtap_hardware::simulation::SimulationCounters;
use gymtap_storage::{Database, SqliteMemberDirectory, SqliteTokenRepository, Token, TokenStore};

use crate::orchestrator::{CardVerification, NfcOrchestrator, PayloadVerification};
use crate::selector::DeviceSelector;

/// Token and card operations for front-desk staff.
///
/// # Examples
///
/// ```no_run
/// use gymtap_core::{MemberId, NfcConfig};
/// use gymtap_nfc::FrontDesk;
/// use gymtap_storage::Database;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let db = Database::in_memory().await?;
/// let desk = FrontDesk::open(&db, NfcConfig::default().force_simulation(true))?;
///
/// let token = desk.generate_token(MemberId::new(1)?, Some(30)).await?;
/// let result = desk
///     .write_to_card(token.value.as_str(), token.member_id, None)
///     .await?;
/// println!("{}: {}", result.outcome, result.message);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FrontDesk {
    store: Arc<TokenStore<SqliteTokenRepository, SqliteMemberDirectory>>,
    orchestrator: Arc<NfcOrchestrator>,
}

impl FrontDesk {
    /// Facade over `db` selecting the reader per `config`.
    ///
    /// # Errors
    ///
    /// `Config` if `config` is out of range.
    pub fn open(db: &Database, config: NfcConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_selector(db, DeviceSelector::new(config)))
    }

    /// Facade with a custom reader selector.
    pub fn with_selector(db: &Database, selector: DeviceSelector) -> Self {
        let store = Arc::new(TokenStore::sqlite(db));
        let orchestrator = Arc::new(NfcOrchestrator::new(Arc::clone(&store), selector));
        Self {
            store,
            orchestrator,
        }
    }

    /// Probe the reader now rather than on the first card operation.
    pub async fn initialize(&self) {
        self.orchestrator.initialize().await;
    }

    pub async fn generate_token(
        &self,
        member_id: MemberId,
        ttl_days: Option<u32>,
    ) -> Result<Token> {
        Ok(self.store.generate(member_id, ttl_days).await?)
    }

    pub async fn validate_token(
        &self,
        value: &str,
        member_id: Option<MemberId>,
    ) -> Result<TokenState> {
        let value = TokenValue::new(value)?;
        Ok(self.store.validate(&value, member_id).await?)
    }

    pub async fn revoke_token(&self, value: &str) -> Result<()> {
        let value = TokenValue::new(value)?;
        Ok(self.store.revoke(&value).await?)
    }

    pub async fn list_tokens(&self, member_id: MemberId) -> Result<Vec<Token>> {
        Ok(self.store.list_for_member(member_id).await?)
    }

    /// Token detail.
    ///
    /// # Errors
    ///
    /// `NotFound` if no token has this value.
    pub async fn get_token(&self, value: &str) -> Result<Token> {
        let value = TokenValue::new(value)?;
        self.store
            .get(&value)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Token {}", value.redacted())))
    }

    /// Number of unrevoked tokens past their expiry.
    pub async fn count_expired_tokens(&self) -> Result<u64> {
        Ok(self.store.count_expired().await?)
    }

    /// Write `token` to the next card. `timeout_ms` defaults to the
    /// configured timeout.
    pub async fn write_to_card(
        &self,
        token: &str,
        member_id: MemberId,
        timeout_ms: Option<u64>,
    ) -> Result<NfcOperationResult> {
        let token = TokenValue::new(token)?;
        let timeout = self.timeout(timeout_ms)?;
        self.orchestrator.write_token(&token, member_id, timeout).await
    }

    pub async fn read_card(&self, timeout_ms: Option<u64>) -> Result<NfcOperationResult> {
        let timeout = self.timeout(timeout_ms)?;
        Ok(self.orchestrator.read_card(timeout).await)
    }

    pub async fn verify_card(&self, timeout_ms: Option<u64>) -> Result<CardVerification> {
        let timeout = self.timeout(timeout_ms)?;
        self.orchestrator.verify_card(timeout).await
    }

    /// Check payload bytes obtained from some other reader.
    pub async fn verify_payload(&self, payload: &[u8]) -> Result<PayloadVerification> {
        self.orchestrator.verify_payload(payload).await
    }

    pub fn reader_status(&self) -> ReaderStatus {
        self.orchestrator.status()
    }

    pub fn reset_reader(&self) {
        self.orchestrator.reset();
    }

    pub fn simulation_counters(&self) -> SimulationCounters {
        self.orchestrator.simulation_counters()
    }

    fn timeout(&self, timeout_ms: Option<u64>) -> Result<Duration> {
        match timeout_ms {
            None => Ok(self.orchestrator.config().default_timeout),
            Some(ms) if ms == 0 || ms > MAX_OPERATION_TIMEOUT_MS => Err(Error::InvalidInput(
                format!("timeout_ms must be between 1 and {MAX_OPERATION_TIMEOUT_MS}, got {ms}"),
            )),
            Some(ms) => Ok(Duration::from_millis(ms)),
        }
    }
}
