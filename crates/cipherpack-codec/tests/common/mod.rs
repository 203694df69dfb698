//! Shared fixtures for the codec integration tests.
//!
//! RSA key generation is expensive, so one sender and one recipient keypair
//! are generated per test process and written out as PEM files on demand.

// Not every test binary uses every fixture.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use secrecy::SecretString;

use cipherpack_core::{PackHeader, PackListener};

pub struct TestKeys {
    pub enc_sec: RsaPrivateKey,
    pub enc_pub: RsaPublicKey,
    pub sign_sec: RsaPrivateKey,
    pub sign_pub: RsaPublicKey,
}

pub fn test_keys() -> &'static TestKeys {
    static KEYS: OnceLock<TestKeys> = OnceLock::new();
    KEYS.get_or_init(|| {
        let enc_sec = RsaPrivateKey::new(&mut OsRng, 2048).expect("recipient keygen");
        let sign_sec = RsaPrivateKey::new(&mut OsRng, 2048).expect("sender keygen");
        TestKeys {
            enc_pub: RsaPublicKey::from(&enc_sec),
            sign_pub: RsaPublicKey::from(&sign_sec),
            enc_sec,
            sign_sec,
        }
    })
}

pub struct KeyFiles {
    pub enc_pub: PathBuf,
    pub enc_sec: PathBuf,
    pub sign_pub: PathBuf,
    pub sign_sec: PathBuf,
}

pub fn write_key_files(dir: &Path) -> KeyFiles {
    let keys = test_keys();
    let files = KeyFiles {
        enc_pub: dir.join("enc.pub.pem"),
        enc_sec: dir.join("enc.sec.pem"),
        sign_pub: dir.join("sign.pub.pem"),
        sign_sec: dir.join("sign.sec.pem"),
    };
    std::fs::write(
        &files.enc_pub,
        keys.enc_pub.to_public_key_pem(LineEnding::LF).unwrap(),
    )
    .unwrap();
    std::fs::write(
        &files.enc_sec,
        keys.enc_sec.to_pkcs8_pem(LineEnding::LF).unwrap().as_bytes(),
    )
    .unwrap();
    std::fs::write(
        &files.sign_pub,
        keys.sign_pub.to_public_key_pem(LineEnding::LF).unwrap(),
    )
    .unwrap();
    std::fs::write(
        &files.sign_sec,
        keys.sign_sec.to_pkcs8_pem(LineEnding::LF).unwrap().as_bytes(),
    )
    .unwrap();
    files
}

pub fn no_passphrase() -> SecretString {
    SecretString::from("")
}

/// 0x00..0xFF repeated `repeats` times.
pub fn byte_ramp(repeats: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(256 * repeats);
    for _ in 0..repeats {
        out.extend(0u8..=255);
    }
    out
}

/// A listener call, recorded in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Error(bool, String),
    Header(bool, bool),
    Progress(bool, u64, u64),
    End(bool, bool, bool), // (decrypt_mode, had_header, success)
    Content(bool, bool, usize, bool), // (decrypt_mode, is_header, len, is_final)
}

/// Records every callback; optionally forwards content and aborts after a
/// fixed number of payload chunks.
#[derive(Debug, Default)]
pub struct RecordingListener {
    pub events: Vec<Event>,
    pub forward_content: bool,
    pub abort_after_chunks: Option<usize>,
    payload_chunks: usize,
}

impl RecordingListener {
    pub fn forwarding() -> Self {
        Self {
            forward_content: true,
            ..Self::default()
        }
    }

    pub fn aborting_after(chunks: usize) -> Self {
        Self {
            forward_content: true,
            abort_after_chunks: Some(chunks),
            ..Self::default()
        }
    }
}

impl PackListener for RecordingListener {
    fn notify_error(&mut self, decrypt_mode: bool, msg: &str) {
        self.events.push(Event::Error(decrypt_mode, msg.to_string()));
    }

    fn notify_header(&mut self, decrypt_mode: bool, _header: &PackHeader, verified: bool) {
        self.events.push(Event::Header(decrypt_mode, verified));
    }

    fn notify_progress(&mut self, decrypt_mode: bool, content_size: u64, bytes_processed: u64) {
        self.events
            .push(Event::Progress(decrypt_mode, content_size, bytes_processed));
    }

    fn notify_end(&mut self, decrypt_mode: bool, header: Option<&PackHeader>, success: bool) {
        self.events
            .push(Event::End(decrypt_mode, header.is_some(), success));
    }

    fn send_content(&mut self, _decrypt_mode: bool) -> bool {
        self.forward_content
    }

    fn content_processed(
        &mut self,
        decrypt_mode: bool,
        is_header: bool,
        data: &mut [u8],
        is_final: bool,
    ) -> bool {
        self.events
            .push(Event::Content(decrypt_mode, is_header, data.len(), is_final));
        if !is_header {
            self.payload_chunks += 1;
            if let Some(limit) = self.abort_after_chunks {
                if self.payload_chunks > limit {
                    return false;
                }
            }
        }
        true
    }
}
