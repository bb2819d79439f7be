//! Mock NFC reader implementation for testing and development.
//!
//! This module provides a scriptable reader that can be driven
//! programmatically for testing without requiring physical hardware.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, mpsc};

use crate::{
    HardwareError, Result, ndef,
    traits::NfcDevice,
    types::{CardData, CardRead, CardWrite, ReaderInfo, TagType},
};

/// A card that can be presented to the mock reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCard {
    pub uid: Vec<u8>,
    pub tag_type: TagType,

    /// Payload currently stored on the card.
    pub contents: Vec<u8>,

    /// Locked cards refuse writes.
    pub locked: bool,
}

impl MockCard {
    /// Blank, writable NTAG215.
    pub fn ntag215(uid: Vec<u8>) -> Self {
        Self {
            uid,
            tag_type: TagType::Ntag215,
            contents: Vec::new(),
            locked: false,
        }
    }

    /// Set the stored contents.
    pub fn with_contents(mut self, contents: Vec<u8>) -> Self {
        self.contents = contents;
        self
    }

    /// Set the tag technology.
    pub fn with_tag_type(mut self, tag_type: TagType) -> Self {
        self.tag_type = tag_type;
        self
    }

    /// Lock the card against writes.
    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }
}

/// Fault injected in place of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFault {
    /// Reader unplugged mid-operation.
    Disconnect,
    /// Driver refused access.
    PermissionDenied,
    /// Reader vanished entirely.
    Unavailable,
}

#[derive(Debug, Clone)]
enum MockEvent {
    Present(MockCard),
    Fault(MockFault),
}

#[derive(Debug)]
struct MockShared {
    available: AtomicBool,
    ignore_timeout: AtomicBool,
    detect_calls: AtomicU64,
    operations: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    written: Mutex<Vec<(String, Vec<u8>)>>,
}

impl Default for MockShared {
    fn default() -> Self {
        Self {
            available: AtomicBool::new(true),
            ignore_timeout: AtomicBool::new(false),
            detect_calls: AtomicU64::new(0),
            operations: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            written: Mutex::new(Vec::new()),
        }
    }
}

/// Tracks one in-flight operation for the concurrency counters.
struct InFlight<'a>(&'a MockShared);

impl<'a> InFlight<'a> {
    fn enter(shared: &'a MockShared) -> Self {
        shared.operations.fetch_add(1, Ordering::SeqCst);
        let now = shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        shared.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(shared)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock NFC reader for testing and development.
///
/// Behaves like a physical reader: operations wait for a card presented
/// through the [`MockNfcHandle`].
///
/// # Examples
///
/// ```
/// use gymtap_hardware::mock::{MockCard, MockNfc};
/// use gymtap_hardware::traits::NfcDevice;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> gymtap_hardware::Result<()> {
///     let (mut reader, handle) = MockNfc::new();
///
///     handle.present_card(MockCard::ntag215(vec![0x04, 0xAB, 0xCD, 0xEF])).await?;
///
///     let written = reader.write(b"token", Duration::from_secs(1)).await?;
///     assert_eq!(written.card.card_id, "04ABCDEF");
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockNfc {
    event_rx: Arc<AsyncMutex<mpsc::Receiver<MockEvent>>>,
    name: String,
    shared: Arc<MockShared>,
}

impl MockNfc {
    /// Create a new mock reader with the default name.
    ///
    /// Returns a tuple of (MockNfc, MockNfcHandle) where the handle
    /// can be used to present cards and inject faults.
    pub fn new() -> (Self, MockNfcHandle) {
        Self::with_name("Mock NFC Reader".to_string())
    }

    /// Create a new mock reader with a custom name.
    pub fn with_name(name: String) -> (Self, MockNfcHandle) {
        let (event_tx, event_rx) = mpsc::channel(32);

        let handle = MockNfcHandle {
            event_tx,
            event_rx: Arc::new(AsyncMutex::new(event_rx)),
            name,
            shared: Arc::new(MockShared::default()),
        };

        (handle.connect(), handle)
    }

    async fn next_card(&self, timeout: Duration) -> Result<MockCard> {
        let mut rx = self.event_rx.lock().await;

        let event = if self.shared.ignore_timeout.load(Ordering::SeqCst) {
            rx.recv().await
        } else {
            tokio::time::timeout(timeout, rx.recv())
                .await
                .map_err(|_| HardwareError::timeout(timeout.as_millis() as u64))?
        };

        match event {
            Some(MockEvent::Present(card)) => Ok(card),
            Some(MockEvent::Fault(fault)) => Err(self.fault_error(fault)),
            None => Err(HardwareError::disconnected(self.name.clone())),
        }
    }

    fn fault_error(&self, fault: MockFault) -> HardwareError {
        match fault {
            MockFault::Disconnect => HardwareError::disconnected(self.name.clone()),
            MockFault::PermissionDenied => HardwareError::communication("permission denied"),
            MockFault::Unavailable => HardwareError::unavailable(format!("{} vanished", self.name)),
        }
    }
}

impl NfcDevice for MockNfc {
    async fn detect(&mut self) -> Result<ReaderInfo> {
        self.shared.detect_calls.fetch_add(1, Ordering::SeqCst);

        if self.shared.available.load(Ordering::SeqCst) {
            Ok(self.reader_info())
        } else {
            Err(HardwareError::unavailable(format!(
                "{} not attached",
                self.name
            )))
        }
    }

    async fn write(&mut self, payload: &[u8], timeout: Duration) -> Result<CardWrite> {
        let _in_flight = InFlight::enter(&self.shared);

        let card = self.next_card(timeout).await?;
        let data = CardData::from_uid(&card.uid, card.tag_type.clone())?;

        if card.locked {
            return Err(HardwareError::incompatible_card(
                Some(data.card_id),
                "card is locked",
            ));
        }

        let capacity = card.tag_type.user_memory_bytes().ok_or_else(|| {
            HardwareError::incompatible_card(
                Some(data.card_id.clone()),
                format!("{} is not NDEF writable", card.tag_type.name()),
            )
        })?;

        let framed = ndef::encoded_len(payload.len());
        if framed > capacity {
            return Err(HardwareError::incompatible_card(
                Some(data.card_id),
                format!("payload needs {framed} bytes, card holds {capacity}"),
            ));
        }

        match self.shared.written.lock() {
            Ok(mut written) => written.push((data.card_id.clone(), payload.to_vec())),
            Err(poisoned) => poisoned
                .into_inner()
                .push((data.card_id.clone(), payload.to_vec())),
        }

        Ok(CardWrite {
            card: data,
            bytes_written: payload.len(),
        })
    }

    async fn read(&mut self, timeout: Duration) -> Result<CardRead> {
        let _in_flight = InFlight::enter(&self.shared);

        let card = self.next_card(timeout).await?;
        let data = CardData::from_uid(&card.uid, card.tag_type)?;

        Ok(CardRead {
            card: data,
            payload: card.contents,
        })
    }

    fn reader_info(&self) -> ReaderInfo {
        ReaderInfo::new(
            self.name.clone(),
            vec!["ISO14443A".to_string(), "ISO14443B".to_string()],
        )
    }
}

/// Handle for controlling a mock NFC reader.
///
/// Clones share the same reader state.
#[derive(Debug, Clone)]
pub struct MockNfcHandle {
    event_tx: mpsc::Sender<MockEvent>,
    event_rx: Arc<AsyncMutex<mpsc::Receiver<MockEvent>>>,
    name: String,
    shared: Arc<MockShared>,
}

impl MockNfcHandle {
    /// Open another `MockNfc` attached to the same reader, as a re-probe
    /// would reopen the same physical device.
    pub fn connect(&self) -> MockNfc {
        MockNfc {
            event_rx: Arc::clone(&self.event_rx),
            name: self.name.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Present a card to the reader.
    ///
    /// # Errors
    ///
    /// Returns an error if every reader attached to this handle has been dropped.
    pub async fn present_card(&self, card: MockCard) -> Result<()> {
        self.send(MockEvent::Present(card)).await
    }

    /// Make the next pending operation fail with `fault`.
    ///
    /// # Errors
    ///
    /// Returns an error if every reader attached to this handle has been dropped.
    pub async fn inject_fault(&self, fault: MockFault) -> Result<()> {
        self.send(MockEvent::Fault(fault)).await
    }

    async fn send(&self, event: MockEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| HardwareError::disconnected("NFC event channel closed"))
    }

    /// Control whether `detect` succeeds.
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// When set, operations wait for a card forever, ignoring their timeout.
    pub fn set_ignore_timeout(&self, ignore: bool) {
        self.shared.ignore_timeout.store(ignore, Ordering::SeqCst);
    }

    /// Number of `detect` calls so far.
    pub fn detect_calls(&self) -> u64 {
        self.shared.detect_calls.load(Ordering::SeqCst)
    }

    /// Number of write or read operations that reached the reader.
    pub fn operations(&self) -> u64 {
        self.shared.operations.load(Ordering::SeqCst)
    }

    /// Highest number of operations ever in flight at once.
    pub fn max_concurrent_operations(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }

    /// Payloads committed so far, as `(card_id, payload)`.
    pub fn written_payloads(&self) -> Vec<(String, Vec<u8>)> {
        match self.shared.written.lock() {
            Ok(written) => written.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
