//! NDEF framing for card payloads.
//!
//! Tags store the payload as a single MIME record of type
//! [`MIME_TYPE`] inside an NDEF message TLV, followed by a terminator TLV.
//! Only the framing lives here; the payload bytes themselves are opaque.

use crate::{HardwareError, Result};

/// MIME type of the record carrying the payload.
pub const MIME_TYPE: &[u8] = b"application/x-gymtap";

const TLV_NULL: u8 = 0x00;
const TLV_NDEF_MESSAGE: u8 = 0x03;
const TLV_TERMINATOR: u8 = 0xFE;

const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;
const TNF_MASK: u8 = 0x07;
const TNF_MIME: u8 = 0x02;

/// Encode `payload` as a TLV-wrapped, single-record NDEF message.
///
/// # Examples
///
/// ```
/// use gymtap_hardware::ndef;
///
/// let area = ndef::encode(b"abc");
/// assert_eq!(area[0], 0x03);
/// assert_eq!(ndef::decode(&area).unwrap(), b"abc");
/// ```
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(payload.len() + MIME_TYPE.len() + 6);

    if payload.len() <= u8::MAX as usize {
        record.push(FLAG_MB | FLAG_ME | FLAG_SR | TNF_MIME);
        record.push(MIME_TYPE.len() as u8);
        record.push(payload.len() as u8);
    } else {
        record.push(FLAG_MB | FLAG_ME | TNF_MIME);
        record.push(MIME_TYPE.len() as u8);
        record.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    }
    record.extend_from_slice(MIME_TYPE);
    record.extend_from_slice(payload);

    let mut area = Vec::with_capacity(record.len() + 5);
    area.push(TLV_NDEF_MESSAGE);
    if record.len() < 0xFF {
        area.push(record.len() as u8);
    } else {
        area.push(0xFF);
        area.extend_from_slice(&(record.len() as u16).to_be_bytes());
    }
    area.extend_from_slice(&record);
    area.push(TLV_TERMINATOR);
    area
}

/// Number of bytes [`encode`] produces for a payload of `payload_len` bytes.
pub fn encoded_len(payload_len: usize) -> usize {
    let header = if payload_len <= u8::MAX as usize { 3 } else { 6 };
    let record = header + MIME_TYPE.len() + payload_len;
    let tlv_header = if record < 0xFF { 2 } else { 4 };
    tlv_header + record + 1
}

/// End offset of the NDEF message TLV in `area`, once enough bytes are known.
///
/// The terminator TLV that follows the message is not included. An area
/// holding only a terminator ends right after it. Returns `Ok(None)` while
/// more bytes are needed to tell.
pub fn area_len(area: &[u8]) -> Result<Option<usize>> {
    let mut pos = 0;
    loop {
        let Some(&tag) = area.get(pos) else {
            return Ok(None);
        };
        match tag {
            TLV_NULL => pos += 1,
            TLV_TERMINATOR => return Ok(Some(pos + 1)),
            _ => match tlv_length(area, pos + 1)? {
                Some((len, header)) => {
                    let end = pos + 1 + header + len;
                    if tag == TLV_NDEF_MESSAGE {
                        return Ok(Some(end));
                    }
                    pos = end;
                }
                None => return Ok(None),
            },
        }
    }
}

/// Extract the payload from a tag's data area.
///
/// A blank area (no NDEF message, or an empty one) yields an empty payload.
///
/// # Errors
///
/// Returns [`HardwareError::InvalidData`] for malformed framing and
/// [`HardwareError::IncompatibleCard`] when the card carries a record
/// written by something else.
pub fn decode(area: &[u8]) -> Result<Vec<u8>> {
    let mut pos = 0;
    while let Some(&tag) = area.get(pos) {
        match tag {
            TLV_NULL => pos += 1,
            TLV_TERMINATOR => break,
            _ => {
                let (len, header) = tlv_length(area, pos + 1)?
                    .ok_or_else(|| HardwareError::invalid_data("truncated TLV header"))?;
                let start = pos + 1 + header;
                let body = area
                    .get(start..start + len)
                    .ok_or_else(|| HardwareError::invalid_data("truncated TLV body"))?;

                if tag == TLV_NDEF_MESSAGE {
                    return decode_record(body);
                }
                pos = start + len;
            }
        }
    }

    Ok(Vec::new())
}

fn tlv_length(area: &[u8], at: usize) -> Result<Option<(usize, usize)>> {
    match area.get(at) {
        None => Ok(None),
        Some(0xFF) => match area.get(at + 1..at + 3) {
            Some(bytes) => Ok(Some((u16::from_be_bytes([bytes[0], bytes[1]]) as usize, 3))),
            None => Ok(None),
        },
        Some(&len) => Ok(Some((len as usize, 1))),
    }
}

fn decode_record(message: &[u8]) -> Result<Vec<u8>> {
    if message.is_empty() {
        return Ok(Vec::new());
    }

    let header = message[0];
    if header & TNF_MASK != TNF_MIME {
        return Err(HardwareError::incompatible_card(
            None,
            format!("unexpected NDEF record type (TNF {})", header & TNF_MASK),
        ));
    }

    let type_len = *message
        .get(1)
        .ok_or_else(|| HardwareError::invalid_data("truncated NDEF record"))? as usize;

    let (payload_len, mut pos) = if header & FLAG_SR != 0 {
        let len = *message
            .get(2)
            .ok_or_else(|| HardwareError::invalid_data("truncated NDEF record"))?;
        (len as usize, 3)
    } else {
        let bytes = message
            .get(2..6)
            .ok_or_else(|| HardwareError::invalid_data("truncated NDEF record"))?;
        (
            u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize,
            6,
        )
    };

    if header & FLAG_IL != 0 {
        let id_len = *message
            .get(pos)
            .ok_or_else(|| HardwareError::invalid_data("truncated NDEF record"))?;
        pos += 1 + id_len as usize;
    }

    let record_type = message
        .get(pos..pos + type_len)
        .ok_or_else(|| HardwareError::invalid_data("truncated NDEF record type"))?;
    if record_type != MIME_TYPE {
        return Err(HardwareError::incompatible_card(
            None,
            format!(
                "card holds a {} record",
                String::from_utf8_lossy(record_type)
            ),
        ));
    }
    pos += type_len;

    message
        .get(pos..pos + payload_len)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| HardwareError::invalid_data("truncated NDEF payload"))
}
