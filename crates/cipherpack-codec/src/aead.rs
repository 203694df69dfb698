//! Streaming ChaCha20-Poly1305 (RFC 8439) with one deferred tag.
//!
//! The container authenticates the whole payload with a single tag written
//! after the last ciphertext byte, so the one-shot `Aead` interface cannot
//! drive it. This engine composes the same primitives the one-shot cipher
//! is built from — the ChaCha20 keystream and the Poly1305 universal hash —
//! into an incremental `update`/`finish` pair.
//!
//! In decrypt mode the trailing [`TAG_SIZE`] bytes of the stream are the
//! tag, but chunk boundaries are not known in advance; `update` therefore
//! withholds the last [`TAG_SIZE`] bytes seen so far and releases them only
//! once later bytes prove they were ciphertext. Buffers may shrink or grow
//! accordingly.

use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use chacha20::ChaCha20;
use poly1305::universal_hash::{KeyInit, UniversalHash};
use poly1305::Poly1305;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use cipherpack_core::{CpackError, CpackResult};

use crate::keys::SymmetricKey;
use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// Incremental AEAD over one message. Created per operation, finalized by
/// [`AeadStream::finish`].
pub struct AeadStream {
    cipher: ChaCha20,
    mac: Option<Poly1305>,
    direction: Direction,
    aad_len: u64,
    msg_len: u64,
    block: [u8; TAG_SIZE],
    block_len: usize,
    holdback: Vec<u8>,
}

impl std::fmt::Debug for AeadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AeadStream")
            .field("direction", &self.direction)
            .field("aad_len", &self.aad_len)
            .field("msg_len", &self.msg_len)
            .finish_non_exhaustive()
    }
}

impl AeadStream {
    /// Maximum (and only) key length of the underlying AEAD.
    pub const fn max_key_len() -> usize {
        KEY_SIZE
    }

    /// Bind key, nonce and associated data, and derive the one-time
    /// Poly1305 key from the first keystream block.
    pub fn new(
        direction: Direction,
        key: &SymmetricKey,
        nonce: &[u8],
        aad: &[u8],
    ) -> CpackResult<Self> {
        if nonce.len() != NONCE_SIZE {
            return Err(CpackError::InvalidNonceLen {
                expected: NONCE_SIZE,
                actual: nonce.len(),
            });
        }

        let mut cipher = ChaCha20::new(
            chacha20::Key::from_slice(key.as_bytes()),
            chacha20::Nonce::from_slice(nonce),
        );

        let mut otk = poly1305::Key::default();
        cipher.apply_keystream(otk.as_mut_slice());
        let mut mac = Poly1305::new(&otk);
        otk.as_mut_slice().zeroize();
        // Message encryption starts at keystream block 1.
        cipher.seek(64u64);

        mac.update_padded(aad);

        Ok(Self {
            cipher,
            mac: Some(mac),
            direction,
            aad_len: aad.len() as u64,
            msg_len: 0,
            block: [0u8; TAG_SIZE],
            block_len: 0,
            holdback: Vec::with_capacity(TAG_SIZE),
        })
    }

    /// Transform one non-final chunk in place.
    pub fn update(&mut self, data: &mut Vec<u8>) -> CpackResult<()> {
        match self.direction {
            Direction::Encrypt => {
                self.cipher.apply_keystream(data);
                self.absorb_ciphertext_in(data)?;
            }
            Direction::Decrypt => {
                // Withhold the trailing TAG_SIZE bytes; they may be the tag.
                self.holdback.extend_from_slice(data);
                let release = self.holdback.len().saturating_sub(TAG_SIZE);
                data.clear();
                data.extend(self.holdback.drain(..release));
                self.absorb_ciphertext_in(data)?;
                self.cipher.apply_keystream(data);
            }
        }
        Ok(())
    }

    /// Transform the final chunk in place. Encrypt mode appends the tag;
    /// decrypt mode verifies and strips it.
    pub fn finish(&mut self, data: &mut Vec<u8>) -> CpackResult<()> {
        match self.direction {
            Direction::Encrypt => {
                self.cipher.apply_keystream(data);
                self.absorb_ciphertext_in(data)?;
                let tag = self.take_tag()?;
                data.extend_from_slice(&tag);
            }
            Direction::Decrypt => {
                self.holdback.extend_from_slice(data);
                if self.holdback.len() < TAG_SIZE {
                    return Err(CpackError::TagMismatch);
                }
                let split = self.holdback.len() - TAG_SIZE;
                let mut tag = [0u8; TAG_SIZE];
                tag.copy_from_slice(&self.holdback[split..]);
                data.clear();
                data.extend_from_slice(&self.holdback[..split]);
                self.holdback.clear();

                self.absorb_ciphertext_in(data)?;
                let expected = self.take_tag()?;
                if !bool::from(expected.as_slice().ct_eq(tag.as_slice())) {
                    return Err(CpackError::TagMismatch);
                }
                self.cipher.apply_keystream(data);
            }
        }
        Ok(())
    }

    fn absorb_ciphertext_in(&mut self, data: &[u8]) -> CpackResult<()> {
        let mac = self.mac.as_mut().ok_or_else(already_finalized)?;
        mac_blocks(mac, &mut self.block, &mut self.block_len, data);
        self.msg_len += data.len() as u64;
        Ok(())
    }

    fn take_tag(&mut self) -> CpackResult<[u8; TAG_SIZE]> {
        let mut mac = self.mac.take().ok_or_else(already_finalized)?;
        if self.block_len > 0 {
            self.block[self.block_len..].fill(0);
            mac.update(&[self.block.into()]);
            self.block_len = 0;
        }
        let mut lengths = [0u8; TAG_SIZE];
        lengths[..8].copy_from_slice(&self.aad_len.to_le_bytes());
        lengths[8..].copy_from_slice(&self.msg_len.to_le_bytes());
        mac.update(&[lengths.into()]);
        Ok(mac.finalize().into())
    }
}

/// Feed ciphertext into the MAC, buffering to whole 16-byte blocks so the
/// zero padding is applied only once at finalization.
fn mac_blocks(mac: &mut Poly1305, block: &mut [u8; TAG_SIZE], block_len: &mut usize, data: &[u8]) {
    let mut rest = data;
    if *block_len > 0 {
        let take = (TAG_SIZE - *block_len).min(rest.len());
        block[*block_len..*block_len + take].copy_from_slice(&rest[..take]);
        *block_len += take;
        rest = &rest[take..];
        if *block_len == TAG_SIZE {
            mac.update(&[(*block).into()]);
            *block_len = 0;
        }
    }
    for chunk in rest.chunks(TAG_SIZE) {
        if chunk.len() == TAG_SIZE {
            mac.update(&[*poly1305::Block::from_slice(chunk)]);
        } else {
            block[..chunk.len()].copy_from_slice(chunk);
            *block_len = chunk.len();
        }
    }
}

fn already_finalized() -> CpackError {
    CpackError::Crypto("AEAD stream already finalized".into())
}
