//! Checkpoint codec.
//!
//! The payload is JSON of [`CheckpointPayload`] with records ordered by
//! market ID. Ordering comes from the `BTreeMap` the records are collected
//! in, so two replicas with identical state always emit identical bytes.

use std::collections::BTreeMap;

use marketcore_types::constants::CHECKPOINT_VERSION;
use marketcore_types::{CheckpointPayload, CheckpointRecord, MarketId, MarketcoreError, Result};

/// Serialize records, ordered by market ID.
///
/// # Errors
/// `CheckpointEncode` if serialization fails.
pub fn encode(records: BTreeMap<MarketId, CheckpointRecord>) -> Result<Vec<u8>> {
    let payload = CheckpointPayload {
        version: CHECKPOINT_VERSION,
        markets: records.into_values().collect(),
    };
    serde_json::to_vec(&payload).map_err(|e| MarketcoreError::CheckpointEncode {
        reason: e.to_string(),
    })
}

/// Decode a payload into records keyed by market ID.
///
/// Decoding is all-or-nothing: the caller only sees records once the whole
/// payload parsed.
///
/// # Errors
/// `CheckpointDecode` on malformed input or duplicate IDs,
/// `UnsupportedCheckpointVersion` for a payload from a newer format.
pub fn decode(bytes: &[u8]) -> Result<BTreeMap<MarketId, CheckpointRecord>> {
    let payload: CheckpointPayload =
        serde_json::from_slice(bytes).map_err(|e| MarketcoreError::CheckpointDecode {
            reason: e.to_string(),
        })?;
    if payload.version != CHECKPOINT_VERSION {
        return Err(MarketcoreError::UnsupportedCheckpointVersion(payload.version));
    }

    let mut records = BTreeMap::new();
    for record in payload.markets {
        if record.id.is_empty() {
            return Err(MarketcoreError::CheckpointDecode {
                reason: "record without market id".into(),
            });
        }
        let id = record.id.clone();
        if records.insert(id.clone(), record).is_some() {
            return Err(MarketcoreError::CheckpointDecode {
                reason: format!("duplicate record for market {id}"),
            });
        }
    }
    Ok(records)
}
