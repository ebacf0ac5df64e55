//! Serialized representations of forms, catalogs, and records.
//!
//! JSON is the authoring format; CBOR is the compact persisted one. Both
//! decode to the same values.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistFormat {
    Json,
    Cbor,
}

impl PersistFormat {
    /// `.cbor` files are CBOR; everything else is read as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("cbor") => PersistFormat::Cbor,
            _ => PersistFormat::Json,
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cbor: {0}")]
    Cbor(#[from] serde_cbor::Error),
}

pub fn encode<T: Serialize>(value: &T, format: PersistFormat) -> Result<Vec<u8>, PersistError> {
    Ok(match format {
        PersistFormat::Json => serde_json::to_vec_pretty(value)?,
        PersistFormat::Cbor => serde_cbor::to_vec(value)?,
    })
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8], format: PersistFormat) -> Result<T, PersistError> {
    Ok(match format {
        PersistFormat::Json => serde_json::from_slice(bytes)?,
        PersistFormat::Cbor => serde_cbor::from_slice(bytes)?,
    })
}
