//! cipherpack-codec: streaming hybrid-encryption container codec
//!
//! A container carries one message: a self-sized DER header, a detached
//! signature over that header's exact byte image, and an AEAD payload
//! stream authenticated against the wrapped content key.
//!
//! Wire layout:
//! ```text
//! Header-1 = SEQUENCE {
//!     package_magic          OCTET STRING
//!     header1_size           OCTET STRING   (4 bytes, u32 little-endian,
//!                                            length of Header-1 inclusive)
//!     data_filename          OCTET STRING
//!     payload_version        INTEGER (u64)
//!     payload_version_parent INTEGER (u64)
//!     sign_algo_name         OCTET STRING
//!     pk_alg_id              AlgorithmIdentifier {
//!                                oid = id-RSAES-OAEP,
//!                                parameters = AlgorithmIdentifier {
//!                                    oid = id-sha256, parameters absent }
//!                            }
//!     cipher_algo_oid        OBJECT IDENTIFIER (ChaCha20-Poly1305)
//!     encrypted_key          OCTET STRING   (RSA-OAEP wrapped content key)
//!     nonce                  OCTET STRING
//! }
//! Header-2 = SEQUENCE { signature OCTET STRING }   (RSA-PSS over Header-1)
//! Payload  = ChaCha20-Poly1305 ciphertext || 16-byte tag
//!            (AAD = encrypted_key contents)
//! ```
//!
//! Key hierarchy:
//! ```text
//! Recipient RSA keypair ── OAEP-wraps ──► per-message content key (random 256-bit)
//!                                             └── payload AEAD (single tag, streamed)
//! Sender RSA keypair ───── PSS-signs ───► Header-1 byte image
//! ```

#![forbid(unsafe_code)]

pub mod aead;
pub mod decrypt;
pub mod encrypt;
pub mod header;
pub mod io;
pub mod keys;

pub use decrypt::check_sign_then_decrypt;
pub use encrypt::encrypt_then_sign;
pub use keys::{load_private_key, load_public_key, SymmetricKey};

/// Content key size in bytes (ChaCha20-Poly1305 maximum key length).
pub const KEY_SIZE: usize = 32;

/// AEAD nonce size in bytes (RFC 8439).
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;
