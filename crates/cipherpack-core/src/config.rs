//! Compile-time wire constants and per-operation options.

/// Magic marker opening every container, first field of Header-1.
pub const PACKAGE_MAGIC: &str = "CIPHERPACK_0001";

/// Name of the header signature scheme, carried verbatim in Header-1.
pub const SIGN_ALGO_NAME: &str = "RSA-PSS(SHA-256)";

/// Resolved name of the asymmetric key-wrap algorithm.
pub const PK_ALG_NAME: &str = "RSA/OAEP";

/// Hash backing both OAEP and the signature scheme.
pub const PK_HASH_NAME: &str = "SHA-256";

/// Resolved name of the payload AEAD.
pub const AEAD_ALGO_NAME: &str = "ChaCha20Poly1305";

/// Default chunk buffer for payload streaming: 64 KiB.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Per-operation options shared by encrypt and decrypt.
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// Replace an existing output file instead of failing with
    /// `OutputExists`.
    pub overwrite: bool,
    /// Payload chunk buffer size in bytes.
    pub buffer_size: usize,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}
