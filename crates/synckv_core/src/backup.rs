//! Backup file encoding.
//!
//! A backup is a point-in-time snapshot of the local replica:
//!
//! ```text
//! magic (4) | version (2) | count (4) | records... | crc32 (4)
//! ```
//!
//! Each record is `key_len (2) | key | value_len (4) | value`. The
//! checksum covers everything before it.

use crate::error::{KvError, KvResult};
use crate::log::compute_crc32;
use synckv_codec::Key;

/// Magic bytes for a backup file.
pub const BACKUP_MAGIC: [u8; 4] = *b"SKVB";

/// Current backup format version.
pub const BACKUP_VERSION: u16 = 1;

/// Encodes a snapshot into backup-file bytes.
pub(crate) fn encode_backup(entries: &[(Key, Vec<u8>)]) -> KvResult<Vec<u8>> {
    let count = u32::try_from(entries.len())
        .map_err(|_| KvError::invalid_argument("too many entries for one backup"))?;

    let mut buf = Vec::new();
    buf.extend_from_slice(&BACKUP_MAGIC);
    buf.extend_from_slice(&BACKUP_VERSION.to_le_bytes());
    buf.extend_from_slice(&count.to_le_bytes());
    for (key, value) in entries {
        let key_bytes = key.as_bytes();
        buf.extend_from_slice(&(key_bytes.len() as u16).to_le_bytes());
        buf.extend_from_slice(key_bytes);
        let value_len = u32::try_from(value.len())
            .map_err(|_| KvError::invalid_argument("value too large for backup"))?;
        buf.extend_from_slice(&value_len.to_le_bytes());
        buf.extend_from_slice(value);
    }
    let crc = compute_crc32(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// Decodes and verifies backup-file bytes.
pub(crate) fn decode_backup(bytes: &[u8]) -> KvResult<Vec<(Key, Vec<u8>)>> {
    if bytes.len() < 14 {
        return Err(KvError::corrupted("backup file too short"));
    }
    if bytes[0..4] != BACKUP_MAGIC {
        return Err(KvError::corrupted("bad backup magic"));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != BACKUP_VERSION {
        return Err(KvError::corrupted(format!(
            "unsupported backup version {version}"
        )));
    }

    let body_len = bytes.len() - 4;
    let stored_crc = u32::from_le_bytes([
        bytes[body_len],
        bytes[body_len + 1],
        bytes[body_len + 2],
        bytes[body_len + 3],
    ]);
    if compute_crc32(&bytes[..body_len]) != stored_crc {
        return Err(KvError::corrupted("backup checksum mismatch"));
    }

    let count = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
    let mut cursor = 10usize;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        if cursor + 2 > body_len {
            return Err(KvError::corrupted("backup record truncated"));
        }
        let key_len = u16::from_le_bytes([bytes[cursor], bytes[cursor + 1]]) as usize;
        cursor += 2;
        if cursor + key_len > body_len {
            return Err(KvError::corrupted("backup key truncated"));
        }
        let key_text = std::str::from_utf8(&bytes[cursor..cursor + key_len])
            .map_err(|_| KvError::corrupted("backup key is not UTF-8"))?;
        let key =
            Key::new(key_text).map_err(|_| KvError::corrupted("invalid key in backup"))?;
        cursor += key_len;

        if cursor + 4 > body_len {
            return Err(KvError::corrupted("backup record truncated"));
        }
        let value_len = u32::from_le_bytes([
            bytes[cursor],
            bytes[cursor + 1],
            bytes[cursor + 2],
            bytes[cursor + 3],
        ]) as usize;
        cursor += 4;
        if cursor + value_len > body_len {
            return Err(KvError::corrupted("backup value truncated"));
        }
        entries.push((key, bytes[cursor..cursor + value_len].to_vec()));
        cursor += value_len;
    }
    if cursor != body_len {
        return Err(KvError::corrupted("trailing bytes in backup"));
    }
    Ok(entries)
}
