//! Stored response payloads and their on-disk encodings.
//!
//! Two layouts exist per key:
//!
//! - single blob: `<key>` holding a framed header (response metadata and
//!   caller metadata as JSON) followed by the raw body
//! - split: `<key>.response`, `<key>.data` and `<key>.userinfo`, written by
//!   older stores that kept the three parts apart
//!
//! A store writes with one layout but reads whichever one is on disk.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::hash::CacheEntryKey;
use super::persist::BlobStore;
use crate::Error;

const MAGIC: &[u8; 4] = b"STWY";
const SINGLE_BLOB_VERSION: u8 = 1;
const FRAME_PREFIX_LEN: usize = MAGIC.len() + 1 + 4;

pub const RESPONSE_SUFFIX: &str = ".response";
pub const DATA_SUFFIX: &str = ".data";
pub const USER_INFO_SUFFIX: &str = ".userinfo";

/// Metadata of the originating response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub url: String,
    pub status: u16,
    pub mime_type: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub stored_at: DateTime<Utc>,
}

/// A response as held by the caches: metadata, body and caller metadata.
///
/// `CachedResponse::default()` is the empty placeholder a network stack
/// hands out when it has nothing real to cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedResponse {
    pub meta: ResponseMeta,
    pub body: Bytes,
    pub user_info: Option<serde_json::Value>,
}

impl CachedResponse {
    pub fn new(url: &Url, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            meta: ResponseMeta {
                url: url.as_str().to_string(),
                status,
                mime_type: None,
                headers: BTreeMap::new(),
                stored_at: Utc::now(),
            },
            body: body.into(),
            user_info: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.meta.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_user_info(mut self, user_info: serde_json::Value) -> Self {
        self.user_info = Some(user_info);
        self
    }

    pub fn url(&self) -> &str {
        &self.meta.url
    }

    pub fn status(&self) -> u16 {
        self.meta.status
    }

    /// True for a real response: an originating URL, a status and a body.
    pub fn is_valid(&self) -> bool {
        !self.meta.url.is_empty() && self.meta.status != 0 && !self.body.is_empty()
    }
}

#[derive(Serialize, Deserialize)]
struct BlobHeader {
    meta: ResponseMeta,
    user_info: Option<serde_json::Value>,
}

/// Encoding strategy for a stored response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    #[default]
    SingleBlob,
    Split,
}

impl ArchiveFormat {
    pub const ALL: [ArchiveFormat; 2] = [ArchiveFormat::SingleBlob, ArchiveFormat::Split];

    /// Blob names this format uses for `key`.
    pub fn blob_names(self, key: &CacheEntryKey) -> Vec<String> {
        match self {
            ArchiveFormat::SingleBlob => vec![key.to_string()],
            ArchiveFormat::Split => vec![
                format!("{key}{RESPONSE_SUFFIX}"),
                format!("{key}{DATA_SUFFIX}"),
                format!("{key}{USER_INFO_SUFFIX}"),
            ],
        }
    }

    /// Which layout, if any, is present on disk for `key`.
    ///
    /// The single blob wins if both exist.
    pub fn detect(key: &CacheEntryKey, blobs: &dyn BlobStore) -> Option<ArchiveFormat> {
        if blobs.exists(key.as_str()) {
            Some(ArchiveFormat::SingleBlob)
        } else if blobs.exists(&format!("{key}{RESPONSE_SUFFIX}")) {
            Some(ArchiveFormat::Split)
        } else {
            None
        }
    }

    /// Encode a response into `(blob name, bytes)` pairs.
    pub fn encode(self, key: &CacheEntryKey, response: &CachedResponse) -> Result<Vec<(String, Vec<u8>)>, Error> {
        let names = self.blob_names(key);
        match self {
            ArchiveFormat::SingleBlob => {
                let header = serde_json::to_vec(&BlobHeader {
                    meta: response.meta.clone(),
                    user_info: response.user_info.clone(),
                })
                .map_err(|e| Error::InvalidInput(format!("failed to encode response header: {e}")))?;
                let header_len = u32::try_from(header.len())
                    .map_err(|_| Error::InvalidInput("response header too large".into()))?;

                let mut blob = Vec::with_capacity(FRAME_PREFIX_LEN + header.len() + response.body.len());
                blob.extend_from_slice(MAGIC);
                blob.push(SINGLE_BLOB_VERSION);
                blob.extend_from_slice(&header_len.to_le_bytes());
                blob.extend_from_slice(&header);
                blob.extend_from_slice(&response.body);
                Ok(names.into_iter().zip([blob]).collect())
            }
            ArchiveFormat::Split => {
                let meta = serde_json::to_vec(&response.meta)
                    .map_err(|e| Error::InvalidInput(format!("failed to encode response metadata: {e}")))?;
                let user_info = serde_json::to_vec(&response.user_info)
                    .map_err(|e| Error::InvalidInput(format!("failed to encode user info: {e}")))?;
                Ok(names.into_iter().zip([meta, response.body.to_vec(), user_info]).collect())
            }
        }
    }

    /// Decode the entry stored for `key` in this layout.
    ///
    /// `Ok(None)` when the layout is absent; `CorruptEntry` when it is present
    /// but unreadable or incomplete.
    pub fn decode(self, key: &CacheEntryKey, blobs: &dyn BlobStore) -> Result<Option<CachedResponse>, Error> {
        match self {
            ArchiveFormat::SingleBlob => match blobs.read(key.as_str())? {
                Some(bytes) => decode_single_blob(&bytes).map(Some),
                None => Ok(None),
            },
            ArchiveFormat::Split => {
                let Some(meta) = blobs.read(&format!("{key}{RESPONSE_SUFFIX}"))? else {
                    return Ok(None);
                };
                let body = blobs
                    .read(&format!("{key}{DATA_SUFFIX}"))?
                    .ok_or_else(|| Error::CorruptEntry(format!("{key}: missing data blob")))?;
                let user_info = blobs
                    .read(&format!("{key}{USER_INFO_SUFFIX}"))?
                    .ok_or_else(|| Error::CorruptEntry(format!("{key}: missing user info blob")))?;

                Ok(Some(CachedResponse {
                    meta: serde_json::from_slice(&meta)?,
                    body: Bytes::from(body),
                    user_info: serde_json::from_slice(&user_info)?,
                }))
            }
        }
    }
}

fn decode_single_blob(bytes: &[u8]) -> Result<CachedResponse, Error> {
    if bytes.len() < FRAME_PREFIX_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(Error::CorruptEntry("missing frame header".into()));
    }
    let version = bytes[MAGIC.len()];
    if version != SINGLE_BLOB_VERSION {
        return Err(Error::CorruptEntry(format!("unknown archive version {version}")));
    }

    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&bytes[MAGIC.len() + 1..FRAME_PREFIX_LEN]);
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    let body_start = FRAME_PREFIX_LEN
        .checked_add(header_len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| Error::CorruptEntry("truncated header".into()))?;

    let header: BlobHeader = serde_json::from_slice(&bytes[FRAME_PREFIX_LEN..body_start])?;
    Ok(CachedResponse {
        meta: header.meta,
        body: Bytes::copy_from_slice(&bytes[body_start..]),
        user_info: header.user_info,
    })
}
