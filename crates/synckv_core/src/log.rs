//! Per-store durability log.
//!
//! Every committed batch appends its mutations followed by a `Commit`
//! marker; opening a store replays the log and applies only complete
//! batches. Records are framed as:
//!
//! ```text
//! magic (4) | version (2) | type (1) | length (4) | payload | crc32 (4)
//! ```
//!
//! The checksum covers everything before it. A torn or checksum-failed
//! tail is dropped on replay; damage before the committed boundary is
//! reported as corruption.

use crate::error::{KvError, KvResult};
use crate::types::{DeviceId, SequenceNumber};
use parking_lot::Mutex;
use synckv_codec::Key;
use synckv_storage::StorageBackend;

/// Magic bytes identifying a log record.
pub const LOG_MAGIC: [u8; 4] = *b"SKVL";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

/// magic (4) + version (2) + type (1) + length (4)
const HEADER_SIZE: usize = 11;
const CRC_SIZE: usize = 4;

/// Type byte of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum LogRecordType {
    Put = 1,
    Delete = 2,
    Clear = 3,
    Commit = 4,
}

impl LogRecordType {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Put),
            2 => Some(Self::Delete),
            3 => Some(Self::Clear),
            4 => Some(Self::Commit),
            _ => None,
        }
    }
}

/// A single log record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LogRecord {
    /// Upsert of one key in one device's replica.
    Put {
        /// Replica the write targets.
        device: DeviceId,
        /// Key written.
        key: Key,
        /// Encoded value bytes.
        value: Vec<u8>,
    },
    /// Removal of one key from one device's replica.
    Delete {
        /// Replica the delete targets.
        device: DeviceId,
        /// Key removed.
        key: Key,
    },
    /// Removal of an entire device replica.
    Clear {
        /// Replica being purged.
        device: DeviceId,
    },
    /// Marks the preceding records since the last commit as one batch.
    Commit {
        /// Sequence assigned to the batch.
        sequence: SequenceNumber,
    },
}

impl LogRecord {
    fn record_type(&self) -> LogRecordType {
        match self {
            Self::Put { .. } => LogRecordType::Put,
            Self::Delete { .. } => LogRecordType::Delete,
            Self::Clear { .. } => LogRecordType::Clear,
            Self::Commit { .. } => LogRecordType::Commit,
        }
    }

    fn encode_payload(&self) -> KvResult<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Self::Put { device, key, value } => {
                write_short_bytes(&mut buf, device.as_str().as_bytes())?;
                write_short_bytes(&mut buf, key.as_bytes())?;
                let len = u32::try_from(value.len()).map_err(|_| {
                    KvError::invalid_argument("value too large for log record")
                })?;
                buf.extend_from_slice(&len.to_le_bytes());
                buf.extend_from_slice(value);
            }
            Self::Delete { device, key } => {
                write_short_bytes(&mut buf, device.as_str().as_bytes())?;
                write_short_bytes(&mut buf, key.as_bytes())?;
            }
            Self::Clear { device } => {
                write_short_bytes(&mut buf, device.as_str().as_bytes())?;
            }
            Self::Commit { sequence } => {
                buf.extend_from_slice(&sequence.as_u64().to_le_bytes());
            }
        }
        Ok(buf)
    }

    fn decode_payload(record_type: LogRecordType, payload: &[u8]) -> KvResult<Self> {
        let mut cursor = 0usize;
        let record = match record_type {
            LogRecordType::Put => {
                let device = read_device(payload, &mut cursor)?;
                let key = read_key(payload, &mut cursor)?;
                let len = read_u32(payload, &mut cursor)? as usize;
                if cursor + len > payload.len() {
                    return Err(KvError::corrupted("log record value extends past payload"));
                }
                let value = payload[cursor..cursor + len].to_vec();
                cursor += len;
                Self::Put { device, key, value }
            }
            LogRecordType::Delete => {
                let device = read_device(payload, &mut cursor)?;
                let key = read_key(payload, &mut cursor)?;
                Self::Delete { device, key }
            }
            LogRecordType::Clear => {
                let device = read_device(payload, &mut cursor)?;
                Self::Clear { device }
            }
            LogRecordType::Commit => {
                let sequence = SequenceNumber::new(read_u64(payload, &mut cursor)?);
                Self::Commit { sequence }
            }
        };
        if cursor != payload.len() {
            return Err(KvError::corrupted("trailing bytes in log record"));
        }
        Ok(record)
    }
}

fn write_short_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> KvResult<()> {
    let len = u16::try_from(bytes.len())
        .map_err(|_| KvError::invalid_argument("field too large for log record"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn read_short_bytes<'a>(payload: &'a [u8], cursor: &mut usize) -> KvResult<&'a [u8]> {
    if *cursor + 2 > payload.len() {
        return Err(KvError::corrupted("unexpected end of log record"));
    }
    let len = u16::from_le_bytes([payload[*cursor], payload[*cursor + 1]]) as usize;
    *cursor += 2;
    if *cursor + len > payload.len() {
        return Err(KvError::corrupted("unexpected end of log record"));
    }
    let bytes = &payload[*cursor..*cursor + len];
    *cursor += len;
    Ok(bytes)
}

fn read_device(payload: &[u8], cursor: &mut usize) -> KvResult<DeviceId> {
    let bytes = read_short_bytes(payload, cursor)?;
    let text = std::str::from_utf8(bytes)
        .map_err(|_| KvError::corrupted("device id in log record is not UTF-8"))?;
    DeviceId::new(text).map_err(|_| KvError::corrupted("empty device id in log record"))
}

fn read_key(payload: &[u8], cursor: &mut usize) -> KvResult<Key> {
    let bytes = read_short_bytes(payload, cursor)?;
    let text = std::str::from_utf8(bytes)
        .map_err(|_| KvError::corrupted("key in log record is not UTF-8"))?;
    Key::new(text).map_err(|_| KvError::corrupted("invalid key in log record"))
}

fn read_u32(payload: &[u8], cursor: &mut usize) -> KvResult<u32> {
    if *cursor + 4 > payload.len() {
        return Err(KvError::corrupted("unexpected end of log record"));
    }
    let bytes: [u8; 4] = payload[*cursor..*cursor + 4]
        .try_into()
        .map_err(|_| KvError::corrupted("invalid u32 in log record"))?;
    *cursor += 4;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u64(payload: &[u8], cursor: &mut usize) -> KvResult<u64> {
    if *cursor + 8 > payload.len() {
        return Err(KvError::corrupted("unexpected end of log record"));
    }
    let bytes: [u8; 8] = payload[*cursor..*cursor + 8]
        .try_into()
        .map_err(|_| KvError::corrupted("invalid u64 in log record"))?;
    *cursor += 8;
    Ok(u64::from_le_bytes(bytes))
}

/// Computes the CRC32 (IEEE polynomial) of `data`.
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ TABLE[index];
    }
    !crc
}

/// Append-only log over a storage backend.
pub(crate) struct StoreLog {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
}

impl StoreLog {
    pub(crate) fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
        }
    }

    /// Appends one framed record; returns its offset.
    pub(crate) fn append(&self, record: &LogRecord) -> KvResult<u64> {
        let payload = record.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| KvError::invalid_argument("log record payload too large"))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&LOG_MAGIC);
        data.extend_from_slice(&LOG_VERSION.to_le_bytes());
        data.push(record.record_type() as u8);
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);
        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());

        let mut backend = self.backend.lock();
        let offset = backend.append(&data)?;
        Ok(offset)
    }

    /// Flushes the batch to durable storage.
    pub(crate) fn flush(&self) -> KvResult<()> {
        let mut backend = self.backend.lock();
        if self.sync_on_commit {
            backend.sync()?;
        } else {
            backend.flush()?;
        }
        Ok(())
    }

    /// Reads all records belonging to complete committed batches.
    ///
    /// Returns the records in append order and the log offset right
    /// after the last commit marker. A torn or checksum-failed tail is
    /// silently dropped; the caller should truncate to the returned
    /// offset.
    pub(crate) fn read_committed(&self) -> KvResult<(Vec<LogRecord>, u64)> {
        let backend = self.backend.lock();
        let size = backend.size()?;

        let mut offset = 0u64;
        let mut committed = Vec::new();
        let mut pending = Vec::new();
        let mut committed_end = 0u64;

        while offset < size {
            if offset + (HEADER_SIZE as u64) > size {
                break; // torn header
            }
            let header = backend.read_at(offset, HEADER_SIZE)?;
            if header[0..4] != LOG_MAGIC {
                return Err(KvError::corrupted("bad magic in store log"));
            }
            let version = u16::from_le_bytes([header[4], header[5]]);
            if version != LOG_VERSION {
                return Err(KvError::corrupted(format!(
                    "unsupported log version {version}"
                )));
            }
            let record_type = LogRecordType::from_byte(header[6])
                .ok_or_else(|| KvError::corrupted("unknown log record type"))?;
            let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

            let total = HEADER_SIZE as u64 + len as u64 + CRC_SIZE as u64;
            if offset + total > size {
                break; // torn payload
            }
            let payload = backend.read_at(offset + HEADER_SIZE as u64, len)?;
            let crc_bytes = backend.read_at(offset + HEADER_SIZE as u64 + len as u64, CRC_SIZE)?;
            let stored_crc =
                u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

            let mut framed = header;
            framed.extend_from_slice(&payload);
            if compute_crc32(&framed) != stored_crc {
                break; // torn write; drop the tail
            }

            let record = LogRecord::decode_payload(record_type, &payload)?;
            offset += total;

            match record {
                LogRecord::Commit { .. } => {
                    committed.append(&mut pending);
                    committed.push(record);
                    committed_end = offset;
                }
                other => pending.push(other),
            }
        }

        Ok((committed, committed_end))
    }

    /// Truncates the log to `len` bytes.
    pub(crate) fn truncate(&self, len: u64) -> KvResult<()> {
        let mut backend = self.backend.lock();
        backend.truncate(len)?;
        Ok(())
    }

    /// Clears the log entirely (used before writing a restore snapshot).
    pub(crate) fn clear(&self) -> KvResult<()> {
        self.truncate(0)
    }
}

#[cfg(test)]
impl StoreLog {
    /// Direct backend access for crash-scenario tests.
    pub(crate) fn backend_for_testing(
        &self,
    ) -> parking_lot::MutexGuard<'_, Box<dyn StorageBackend>> {
        self.backend.lock()
    }
}

impl std::fmt::Debug for StoreLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreLog")
            .field("sync_on_commit", &self.sync_on_commit)
            .finish_non_exhaustive()
    }
}
