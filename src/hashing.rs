//! # Content Fingerprinting
//!
//! Deterministic fingerprints for workflow payloads. Payloads are normalized
//! (stable key ordering, volatile fields stripped) before hashing, so two
//! semantically identical definitions always fingerprint identically no
//! matter which system produced them.
//!
//! A `HashingService` is constructed per sync pass and carries a
//! request-scoped collision registry: within one pass, hash equality implies
//! payload equality for any workflow that carries a canonical id. On a
//! detected collision the canonical id is mixed into the normalized bytes to
//! derive a fallback hash, and a structured warning is recorded for the
//! caller to surface.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::Result;

/// Fields stripped during normalization. These change on every save or
/// deploy without altering workflow semantics.
const VOLATILE_FIELDS: &[&str] = &[
    "position",
    "positions",
    "createdAt",
    "updatedAt",
    "webhookId",
    "instanceId",
];

/// Structured record of a detected fingerprint collision.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CollisionWarning {
    /// The raw (colliding) hash.
    pub hash: String,
    /// Canonical id of the workflow involved, when known.
    pub canonical_id: Option<Uuid>,
    /// Human-readable identifiers sampled from the colliding payloads.
    pub sample_identifiers: Vec<String>,
}

struct RegisteredPayload {
    normalized: Value,
    canonical_id: Option<Uuid>,
    identifier: Option<String>,
    /// Set once a warning has been emitted for this entry, so a three-way
    /// collision does not warn about the same workflow twice.
    warned: bool,
}

/// Per-pass fingerprinting service with collision detection.
pub struct HashingService {
    hash_fn: fn(&[u8]) -> String,
    registry: HashMap<String, RegisteredPayload>,
    warnings: Vec<CollisionWarning>,
}

impl HashingService {
    /// Create a service hashing with SHA-256.
    pub fn new() -> Self {
        Self::with_hash_fn(sha256_hex)
    }

    /// Create a service with a custom digest function. Used by tests to
    /// engineer collisions; production code always uses [`Self::new`].
    pub fn with_hash_fn(hash_fn: fn(&[u8]) -> String) -> Self {
        Self {
            hash_fn,
            registry: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Compute the content fingerprint of a workflow payload.
    ///
    /// If the hash already maps to a different normalized payload within this
    /// pass and a `canonical_id` is supplied, a fallback hash mixing the
    /// canonical id into the normalized bytes is returned instead; without a
    /// canonical id the raw hash is returned unresolved. Either way a
    /// [`CollisionWarning`] is recorded.
    pub fn fingerprint(&mut self, payload: &Value, canonical_id: Option<Uuid>) -> Result<String> {
        let normalized = normalize(payload);
        let bytes = serde_json::to_vec(&normalized)?;
        let hash = (self.hash_fn)(&bytes);
        let identifier = sample_identifier(&normalized);

        match self.registry.get_mut(&hash) {
            None => {
                self.registry.insert(
                    hash.clone(),
                    RegisteredPayload {
                        normalized,
                        canonical_id,
                        identifier,
                        warned: false,
                    },
                );
                Ok(hash)
            }
            Some(existing) if existing.normalized == normalized => Ok(hash),
            Some(existing) => {
                // Collision: same hash, different normalized payload.
                let mut samples: Vec<String> =
                    existing.identifier.iter().cloned().collect();
                samples.extend(identifier.clone());

                if !existing.warned {
                    existing.warned = true;
                    self.warnings.push(CollisionWarning {
                        hash: hash.clone(),
                        canonical_id: existing.canonical_id,
                        sample_identifiers: samples.clone(),
                    });
                }
                self.warnings.push(CollisionWarning {
                    hash: hash.clone(),
                    canonical_id,
                    sample_identifiers: samples,
                });

                let Some(canonical_id) = canonical_id else {
                    tracing::warn!(
                        hash = %hash,
                        "Fingerprint collision without canonical id - returning unresolved hash"
                    );
                    return Ok(hash);
                };

                let mut salted = bytes;
                salted.extend_from_slice(canonical_id.as_bytes());
                let fallback = (self.hash_fn)(&salted);
                tracing::warn!(
                    hash = %hash,
                    fallback = %fallback,
                    canonical_id = %canonical_id,
                    "Fingerprint collision resolved via canonical-id fallback"
                );
                self.registry.insert(
                    fallback.clone(),
                    RegisteredPayload {
                        normalized,
                        canonical_id: Some(canonical_id),
                        identifier,
                        warned: true,
                    },
                );
                Ok(fallback)
            }
        }
    }

    /// Drain the collision warnings recorded so far.
    pub fn take_warnings(&mut self) -> Vec<CollisionWarning> {
        std::mem::take(&mut self.warnings)
    }
}

impl Default for HashingService {
    fn default() -> Self {
        Self::new()
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Recursively rebuild the payload with volatile fields stripped.
///
/// Key ordering is stable because `serde_json::Map` keeps keys sorted, so
/// serializing the rebuilt value yields canonical bytes.
fn normalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, val) in map {
                if VOLATILE_FIELDS.contains(&key.as_str()) {
                    continue;
                }
                out.insert(key.clone(), normalize(val));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        other => other.clone(),
    }
}

/// Pick a human-readable identifier out of a payload for collision warnings.
fn sample_identifier(payload: &Value) -> Option<String> {
    payload
        .get("name")
        .or_else(|| payload.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
