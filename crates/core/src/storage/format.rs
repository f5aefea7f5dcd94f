use crate::errors::CoreError;

/// Magic bytes identifying a price-history cache record.
pub const MAGIC: &[u8; 4] = b"PHCR";

/// Current record format version.
pub const CURRENT_VERSION: u16 = 1;

/// Header size in bytes:
/// magic(4) + version(2) + written_at_ms(8) + days(4) + payload_len(8) = 26
pub const HEADER_SIZE: usize = 26;

/// Header of one cache record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub version: u16,
    /// Unix milliseconds at which the series was written.
    pub written_at_ms: i64,
    /// Window length the series was stored under.
    pub days: u32,
    pub payload_len: u64,
}

/// Assemble a complete record.
///
/// Layout:
/// ```text
/// [PHCR: 4B] [version: 2B LE] [written_at_ms: 8B LE] [days: 4B LE]
/// [payload_len: 8B LE] [payload: variable]
/// ```
pub fn write_record(version: u16, written_at_ms: i64, days: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());

    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&version.to_le_bytes());
    buf.extend_from_slice(&written_at_ms.to_le_bytes());
    buf.extend_from_slice(&days.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    buf.extend_from_slice(payload);

    buf
}

/// Parse the header from raw record bytes.
/// Returns the header and the payload slice.
pub fn read_record(data: &[u8]) -> Result<(RecordHeader, &[u8]), CoreError> {
    if data.len() < HEADER_SIZE {
        return Err(CoreError::InvalidFileFormat(
            "Record too small to be a cache record".into(),
        ));
    }

    if &data[0..4] != MAGIC {
        return Err(CoreError::InvalidFileFormat(
            "Invalid magic bytes, not a cache record".into(),
        ));
    }

    let mut offset = 4;

    let version = u16::from_le_bytes(read_array(data, offset)?);
    offset += 2;
    if version == 0 || version > CURRENT_VERSION {
        return Err(CoreError::UnsupportedVersion(version));
    }

    let written_at_ms = i64::from_le_bytes(read_array(data, offset)?);
    offset += 8;

    let days = u32::from_le_bytes(read_array(data, offset)?);
    offset += 4;

    let payload_len = u64::from_le_bytes(read_array(data, offset)?);
    offset += 8;

    let remaining = (data.len() - offset) as u64;
    if payload_len > remaining {
        return Err(CoreError::InvalidFileFormat(format!(
            "Record truncated: expected {payload_len} bytes of payload, got {remaining}"
        )));
    }

    let payload = &data[offset..offset + payload_len as usize];
    let header = RecordHeader {
        version,
        written_at_ms,
        days,
        payload_len,
    };

    Ok((header, payload))
}

fn read_array<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], CoreError> {
    data.get(offset..offset + N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| CoreError::InvalidFileFormat(format!("Failed to read header field at {offset}")))
}
