use serde::{Deserialize, Serialize};

/// Decoded per-message header metadata, surfaced to the listener and
/// returned by both pipelines.
///
/// Everything here is public container data; the symmetric content key
/// itself never appears (only its RSA-wrapped form).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackHeader {
    /// Informational label for the payload, typically the source file name.
    pub filename: String,
    /// Opaque payload version; never interpreted by the codec.
    pub payload_version: u64,
    /// Opaque parent version; never interpreted by the codec.
    pub payload_version_parent: u64,
    /// Name of the header signature scheme.
    pub sign_algo: String,
    /// Resolved name of the asymmetric key-wrap algorithm.
    pub pk_alg: String,
    /// Hash backing the key-wrap padding.
    pub pk_hash: String,
    /// Resolved name of the payload AEAD.
    pub cipher_algo: String,
    /// Self-declared byte length of the Header-1 SEQUENCE, inclusive.
    pub header1_size: u32,
    /// The symmetric content key, wrapped with the recipient's public key.
    /// Also the AEAD associated data.
    pub encrypted_key: Vec<u8>,
    /// AEAD nonce for the payload stream.
    pub nonce: Vec<u8>,
}
