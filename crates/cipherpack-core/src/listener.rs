//! Observer contract for running pack operations.
//!
//! A listener is owned by the caller and exclusively borrowed by one
//! operation for its duration; all callbacks run synchronously on the
//! pipeline's thread. Returning `false` from [`PackListener::content_processed`]
//! is the only cancellation channel inside payload streaming.

use tracing::{debug, error, info};

use crate::types::PackHeader;

/// Callbacks surfaced by both pipelines. All methods have no-op defaults so
/// implementors override only what they care about.
pub trait PackListener {
    /// Any fatal error, exactly once, before `notify_end(success = false)`.
    fn notify_error(&mut self, _decrypt_mode: bool, _msg: &str) {}

    /// Header metadata is available. In decrypt mode this fires only after
    /// the header signature verified.
    fn notify_header(&mut self, _decrypt_mode: bool, _header: &PackHeader, _verified: bool) {}

    /// Periodic payload progress: bytes processed out of the total content
    /// size.
    fn notify_progress(&mut self, _decrypt_mode: bool, _content_size: u64, _bytes_processed: u64) {}

    /// Terminal notification, exactly once per operation.
    fn notify_end(&mut self, _decrypt_mode: bool, _header: Option<&PackHeader>, _success: bool) {}

    /// Queried once before payload streaming: should the operation forward
    /// processed bytes through `content_processed`?
    fn send_content(&mut self, _decrypt_mode: bool) -> bool {
        false
    }

    /// One call per forwarded chunk. `data` is an observer-side copy;
    /// mutating it does not affect the codec stream. Return `false` to
    /// abort the operation with `ListenerAbort`.
    fn content_processed(
        &mut self,
        _decrypt_mode: bool,
        _is_header: bool,
        _data: &mut [u8],
        _is_final: bool,
    ) -> bool {
        true
    }
}

/// Listener that ignores every notification.
#[derive(Debug, Default)]
pub struct SilentListener;

impl PackListener for SilentListener {}

/// Listener that forwards notifications to `tracing`.
#[derive(Debug, Default)]
pub struct TraceListener;

impl PackListener for TraceListener {
    fn notify_error(&mut self, decrypt_mode: bool, msg: &str) {
        error!(decrypt_mode, msg, "pack operation failed");
    }

    fn notify_header(&mut self, decrypt_mode: bool, header: &PackHeader, verified: bool) {
        info!(
            decrypt_mode,
            verified,
            filename = %header.filename,
            payload_version = header.payload_version,
            cipher = %header.cipher_algo,
            "pack header"
        );
    }

    fn notify_progress(&mut self, decrypt_mode: bool, content_size: u64, bytes_processed: u64) {
        debug!(decrypt_mode, content_size, bytes_processed, "pack progress");
    }

    fn notify_end(&mut self, decrypt_mode: bool, header: Option<&PackHeader>, success: bool) {
        info!(
            decrypt_mode,
            success,
            filename = header.map(|h| h.filename.as_str()).unwrap_or(""),
            "pack operation finished"
        );
    }
}
