use std::path::PathBuf;

use thiserror::Error;

pub type CpackResult<T> = Result<T, CpackError>;

/// Every failure a cipherpack operation can report.
///
/// All of these are fatal to the running operation: the partially written
/// output is removed and the listener sees `notify_error` followed by
/// `notify_end(success = false)` before the error is returned.
#[derive(Debug, Error)]
pub enum CpackError {
    #[error("output file already exists: {0}")]
    OutputExists(PathBuf),

    #[error("failed to open output file {path}: {source}")]
    OutputOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write output file {path}: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("key file not found: {0}")]
    KeyNotFound(PathBuf),

    #[error("failed to parse key file {path}: {reason}")]
    KeyParse { path: PathBuf, reason: String },

    #[error("wrong passphrase for key file {0}")]
    WrongPassphrase(PathBuf),

    /// The two-pass header encode did not reach its fixed point.
    #[error("header re-encode size mismatch: pass 1 {pass1} bytes, pass 2 {pass2} bytes")]
    HeaderSizeMismatch { pass1: usize, pass2: usize },

    #[error("bad package magic: expected {expected:?}, got {found:?}")]
    BadMagic { expected: String, found: String },

    #[error("bad header size field: expected 4 bytes, got {0}")]
    BadHeaderSize(usize),

    #[error("DER decode error: {0}")]
    DerDecode(String),

    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: u64, got: u64 },

    /// An on-wire algorithm identifier differs from the compile-time
    /// expectation.
    #[error("algorithm mismatch in {field}: expected {expected}, got {found}")]
    AlgorithmMismatch {
        field: &'static str,
        expected: String,
        found: String,
    },

    #[error("header signature mismatch")]
    SignatureMismatch,

    #[error("AEAD tag mismatch")]
    TagMismatch,

    #[error("listener aborted the operation")]
    ListenerAbort,

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLen { expected: usize, actual: usize },

    #[error("invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLen { expected: usize, actual: usize },

    #[error("crypto failure: {0}")]
    Crypto(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<der::Error> for CpackError {
    fn from(e: der::Error) -> Self {
        CpackError::DerDecode(e.to_string())
    }
}
