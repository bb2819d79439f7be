//! PC/SC reader adapter.
//!
//! Drives USB readers such as the ACR122U through the platform smart-card
//! service. Cards must be NFC Forum Type 2 tags (NTAG21x, Ultralight) with a
//! valid capability container; the payload is framed with [`crate::ndef`]
//! and written page by page from page 4.
//!
//! The `pcsc` API is blocking, so every device interaction runs on Tokio's
//! blocking pool.

use std::ffi::CString;
use std::fmt;
use std::time::{Duration, Instant};

use pcsc::{Card, Context, Protocols, ReaderState, Scope, ShareMode, State};
use tracing::{debug, info, warn};

use crate::ndef;
use crate::traits::NfcDevice;
use crate::types::{CardData, CardRead, CardWrite, ReaderInfo, TagType};
use crate::{HardwareError, Result};

const APDU_GET_UID: [u8; 5] = [0xFF, 0xCA, 0x00, 0x00, 0x00];
const CAPABILITY_PAGE: u8 = 3;
const FIRST_DATA_PAGE: u8 = 4;
const PAGE_SIZE: usize = 4;
const READ_BLOCK: usize = 16;
const CC_MAGIC: u8 = 0xE1;
const CC_WRITE_ALLOWED: u8 = 0x00;

/// PC/SC backed NFC reader.
pub struct PcscNfc {
    context: Context,
    reader: CString,
    info: ReaderInfo,
}

impl fmt::Debug for PcscNfc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscNfc")
            .field("reader", &self.reader)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl PcscNfc {
    /// Open the reader at `device_index` (default first) among those the
    /// smart-card service lists.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Unavailable`] if the service is not running,
    /// no reader is attached, or the index is out of range.
    pub fn open(device_index: Option<usize>) -> Result<Self> {
        let context = Context::establish(Scope::User).map_err(map_pcsc_error)?;
        let readers = context.list_readers_owned().map_err(map_pcsc_error)?;

        let index = device_index.unwrap_or(0);
        let reader = readers.into_iter().nth(index).ok_or_else(|| {
            HardwareError::unavailable(format!("no PC/SC reader at index {index}"))
        })?;

        let name = reader.to_string_lossy().into_owned();
        info!(reader = %name, "Opened PC/SC reader");

        Ok(Self {
            context,
            reader,
            info: ReaderInfo::new(name, vec!["ISO14443A".to_string()]),
        })
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Session) -> Result<T> + Send + 'static,
    {
        let session = Session {
            context: self.context.clone(),
            reader: self.reader.clone(),
        };

        tokio::task::spawn_blocking(move || op(session))
            .await
            .map_err(|e| HardwareError::other(format!("PC/SC worker failed: {e}")))?
    }
}

impl NfcDevice for PcscNfc {
    async fn detect(&mut self) -> Result<ReaderInfo> {
        let reader = self.reader.clone();
        let info = self.info.clone();

        self.blocking(move |session| {
            let readers = session
                .context
                .list_readers_owned()
                .map_err(map_pcsc_error)?;

            if readers.contains(&reader) {
                Ok(info)
            } else {
                Err(HardwareError::unavailable(format!(
                    "{} is no longer attached",
                    reader.to_string_lossy()
                )))
            }
        })
        .await
    }

    async fn write(&mut self, payload: &[u8], timeout: Duration) -> Result<CardWrite> {
        let area = ndef::encode(payload);
        let bytes_written = payload.len();

        self.blocking(move |session| {
            let card = session.wait_and_connect(timeout)?;
            let mut data = read_card_data(&card)?;
            let capacity = check_capability(&card, &mut data, true)?;

            if area.len() > capacity {
                return Err(HardwareError::incompatible_card(
                    Some(data.card_id),
                    format!(
                        "payload needs {} bytes, card holds {capacity}",
                        area.len()
                    ),
                ));
            }

            for (offset, chunk) in area.chunks(PAGE_SIZE).enumerate() {
                let mut page = [0u8; PAGE_SIZE];
                page[..chunk.len()].copy_from_slice(chunk);
                let index = page_index(&data, usize::from(FIRST_DATA_PAGE) + offset)?;
                write_page(&card, index, &page)?;
            }

            debug!(card_id = %data.card_id, bytes = area.len(), "PC/SC write committed");
            Ok(CardWrite {
                card: data,
                bytes_written,
            })
        })
        .await
    }

    async fn read(&mut self, timeout: Duration) -> Result<CardRead> {
        self.blocking(move |session| {
            let card = session.wait_and_connect(timeout)?;
            let mut data = read_card_data(&card)?;
            let capacity = check_capability(&card, &mut data, false)?;

            let mut area = Vec::with_capacity(capacity);
            let mut page = usize::from(FIRST_DATA_PAGE);
            while area.len() < capacity {
                if ndef::area_len(&area)?.is_some_and(|len| area.len() >= len) {
                    break;
                }
                area.extend_from_slice(&read_pages(&card, page_index(&data, page)?)?);
                page += READ_BLOCK / PAGE_SIZE;
            }

            let payload = ndef::decode(&area).map_err(|e| match e {
                HardwareError::IncompatibleCard { reason, .. } => {
                    HardwareError::incompatible_card(Some(data.card_id.clone()), reason)
                }
                other => other,
            })?;

            Ok(CardRead {
                card: data,
                payload,
            })
        })
        .await
    }

    fn reader_info(&self) -> ReaderInfo {
        self.info.clone()
    }
}

/// Owned handles moved onto the blocking pool for one operation.
struct Session {
    context: Context,
    reader: CString,
}

impl Session {
    /// Block until a card is present or `timeout` elapses, then connect.
    fn wait_and_connect(&self, timeout: Duration) -> Result<Card> {
        let deadline = Instant::now() + timeout;
        let mut states = [ReaderState::new(self.reader.clone(), State::UNAWARE)];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());

            match self.context.get_status_change(remaining, &mut states) {
                Ok(()) => {}
                Err(pcsc::Error::Timeout) => {
                    return Err(HardwareError::timeout(timeout.as_millis() as u64));
                }
                Err(e) => return Err(map_pcsc_error(e)),
            }

            if states[0].event_state().contains(State::PRESENT) {
                break;
            }
            if remaining.is_zero() {
                return Err(HardwareError::timeout(timeout.as_millis() as u64));
            }
            states[0].sync_current_state();
        }

        self.context
            .connect(&self.reader, ShareMode::Shared, Protocols::ANY)
            .map_err(map_pcsc_error)
    }
}

fn transmit(card: &Card, apdu: &[u8]) -> Result<Vec<u8>> {
    let mut buffer = [0u8; pcsc::MAX_BUFFER_SIZE];
    let response = card.transmit(apdu, &mut buffer).map_err(map_pcsc_error)?;

    match response {
        [data @ .., 0x90, 0x00] => Ok(data.to_vec()),
        [.., sw1, sw2] => Err(HardwareError::communication(format!(
            "APDU {:02X}{:02X} failed with status {sw1:02X}{sw2:02X}",
            apdu[0], apdu[1]
        ))),
        _ => Err(HardwareError::invalid_data("short APDU response")),
    }
}

fn read_card_data(card: &Card) -> Result<CardData> {
    let uid = transmit(card, &APDU_GET_UID)?;
    CardData::from_uid(&uid, TagType::Unknown(Vec::new()))
}

fn read_pages(card: &Card, page: u8) -> Result<Vec<u8>> {
    let data = transmit(card, &[0xFF, 0xB0, 0x00, page, READ_BLOCK as u8])?;
    if data.len() < READ_BLOCK {
        return Err(HardwareError::invalid_data(format!(
            "page {page} read returned {} bytes",
            data.len()
        )));
    }
    Ok(data)
}

fn write_page(card: &Card, page: u8, bytes: &[u8; PAGE_SIZE]) -> Result<()> {
    let mut apdu = vec![0xFF, 0xD6, 0x00, page, PAGE_SIZE as u8];
    apdu.extend_from_slice(bytes);
    transmit(card, &apdu).map(|_| ())
}

/// Validate the capability container and return the data-area size.
///
/// Fills in `data.tag_type` from the container.
fn check_capability(card: &Card, data: &mut CardData, for_write: bool) -> Result<usize> {
    let block = read_pages(card, CAPABILITY_PAGE)?;
    let cc = &block[..PAGE_SIZE];
    let card_id = Some(data.card_id.clone());

    if cc[0] != CC_MAGIC {
        warn!(card_id = %data.card_id, "Card is not NDEF formatted");
        return Err(HardwareError::incompatible_card(
            card_id,
            "card is not NDEF formatted",
        ));
    }

    if for_write && cc[3] != CC_WRITE_ALLOWED {
        return Err(HardwareError::incompatible_card(card_id, "card is locked"));
    }

    data.tag_type = TagType::from_capability_size(cc[2]);
    debug!(card_id = %data.card_id, tag = data.tag_type.name(), "Capability container read");

    Ok(cc[2] as usize * 8)
}

/// Page address for an APDU. Type 2 tags address at most 256 pages.
fn page_index(data: &CardData, page: usize) -> Result<u8> {
    u8::try_from(page).map_err(|_| {
        HardwareError::incompatible_card(
            Some(data.card_id.clone()),
            format!("page {page} is beyond the addressable range"),
        )
    })
}

fn map_pcsc_error(error: pcsc::Error) -> HardwareError {
    use pcsc::Error as E;

    match error {
        E::NoService
        | E::ServiceStopped
        | E::NoReadersAvailable
        | E::ReaderUnavailable
        | E::UnknownReader
        | E::SharingViolation => HardwareError::unavailable(error.to_string()),
        E::RemovedCard | E::ResetCard => HardwareError::communication("card removed mid-operation"),
        E::UnpoweredCard | E::UnresponsiveCard => {
            HardwareError::incompatible_card(None, error.to_string())
        }
        other => HardwareError::communication(other.to_string()),
    }
}
