//! Store manifest: the metadata a store's options must agree with on
//! reopen.

use crate::config::{KvStoreType, SecurityLevel};
use crate::error::{KvError, KvResult};

/// Magic bytes for the manifest file.
pub const MANIFEST_MAGIC: [u8; 4] = *b"SKVM";

/// Current manifest format version.
pub const MANIFEST_VERSION: u16 = 1;

/// Persistent metadata for one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoreManifest {
    pub store_type: KvStoreType,
    pub security_level: SecurityLevel,
    pub encrypt: bool,
    pub schema: String,
}

impl StoreManifest {
    /// Encodes the manifest to bytes.
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MANIFEST_MAGIC);
        buf.extend_from_slice(&MANIFEST_VERSION.to_le_bytes());
        buf.push(match self.store_type {
            KvStoreType::SingleVersion => 1,
            KvStoreType::DeviceCollaboration => 2,
        });
        buf.push(self.security_level.as_byte());
        buf.push(u8::from(self.encrypt));
        let schema = self.schema.as_bytes();
        buf.extend_from_slice(&(schema.len() as u32).to_le_bytes());
        buf.extend_from_slice(schema);
        buf
    }

    /// Decodes a manifest, validating magic and version.
    pub(crate) fn decode(bytes: &[u8]) -> KvResult<Self> {
        if bytes.len() < 13 {
            return Err(KvError::corrupted("manifest too short"));
        }
        if bytes[0..4] != MANIFEST_MAGIC {
            return Err(KvError::corrupted("bad manifest magic"));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != MANIFEST_VERSION {
            return Err(KvError::corrupted(format!(
                "unsupported manifest version {version}"
            )));
        }
        let store_type = match bytes[6] {
            1 => KvStoreType::SingleVersion,
            2 => KvStoreType::DeviceCollaboration,
            other => {
                return Err(KvError::corrupted(format!(
                    "unknown store type byte {other}"
                )))
            }
        };
        let security_level = SecurityLevel::from_byte(bytes[7])
            .ok_or_else(|| KvError::corrupted("unknown security level byte"))?;
        let encrypt = bytes[8] != 0;
        let schema_len =
            u32::from_le_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]) as usize;
        if 13 + schema_len != bytes.len() {
            return Err(KvError::corrupted("manifest schema length mismatch"));
        }
        let schema = std::str::from_utf8(&bytes[13..])
            .map_err(|_| KvError::corrupted("manifest schema is not UTF-8"))?
            .to_string();
        Ok(Self {
            store_type,
            security_level,
            encrypt,
            schema,
        })
    }
}
