//! Key material: RSA key file loading, the per-message content key, and the
//! asymmetric wrap/unwrap around it.
//!
//! Key files are auto-detected as PEM first, then DER. Public keys may be
//! SPKI or PKCS#1; private keys may be PKCS#8 (optionally
//! passphrase-encrypted) or PKCS#1.

use std::path::Path;

use der::{Decode, Document};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncryptedPrivateKeyInfo};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use cipherpack_core::{CpackError, CpackResult};

use crate::{KEY_SIZE, NONCE_SIZE};

/// The per-message symmetric content key. Zeroized on drop.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random content key from the system RNG.
pub fn generate_symmetric_key() -> SymmetricKey {
    let mut bytes = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut bytes);
    SymmetricKey::from_bytes(bytes)
}

/// Generate a random AEAD nonce from the system RNG.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Wrap the content key with the recipient's public key (RSA-OAEP, SHA-256).
pub fn wrap_key(pub_key: &RsaPublicKey, key: &SymmetricKey) -> CpackResult<Vec<u8>> {
    pub_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key.as_bytes())
        .map_err(|e| CpackError::Crypto(format!("RSA-OAEP key wrap failed: {e}")))
}

/// Unwrap the content key with the recipient's private key.
///
/// On any unwrap failure, including a plaintext of the wrong length, a
/// random key of `expected_len` is substituted, so wrap-integrity failures
/// surface uniformly at AEAD tag verification instead of acting as a
/// key-unwrap oracle. `expected_len` is the AEAD's maximum key length.
pub fn unwrap_key_or_random(
    sec_key: &RsaPrivateKey,
    wrapped: &[u8],
    expected_len: usize,
) -> SymmetricKey {
    match sec_key.decrypt(Oaep::new::<Sha256>(), wrapped) {
        Ok(mut plain) if plain.len() == expected_len && plain.len() == KEY_SIZE => {
            let mut bytes = [0u8; KEY_SIZE];
            bytes.copy_from_slice(&plain);
            plain.zeroize();
            SymmetricKey::from_bytes(bytes)
        }
        Ok(mut plain) => {
            plain.zeroize();
            generate_symmetric_key()
        }
        Err(_) => generate_symmetric_key(),
    }
}

/// Load an RSA public key from a PEM or DER file (SPKI or PKCS#1).
pub fn load_public_key(path: &Path) -> CpackResult<RsaPublicKey> {
    let raw = read_key_file(path)?;
    if let Some(pem) = as_pem(&raw) {
        return match RsaPublicKey::from_public_key_pem(pem) {
            Ok(key) => Ok(key),
            Err(_) => RsaPublicKey::from_pkcs1_pem(pem).map_err(|e| parse_err(path, e)),
        };
    }
    match RsaPublicKey::from_public_key_der(&raw) {
        Ok(key) => Ok(key),
        Err(_) => RsaPublicKey::from_pkcs1_der(&raw).map_err(|e| parse_err(path, e)),
    }
}

/// Load an RSA private key from a PEM or DER file (PKCS#8 or PKCS#1).
///
/// A non-empty passphrase selects encrypted-PKCS#8 handling; an empty
/// passphrase on an encrypted key, or a failed decryption, reports
/// `WrongPassphrase`.
pub fn load_private_key(path: &Path, passphrase: &SecretString) -> CpackResult<RsaPrivateKey> {
    let raw = read_key_file(path)?;
    let pass = passphrase.expose_secret();
    let pem = as_pem(&raw);

    let doc = match pem {
        Some(s) => Document::from_pem(s).ok().map(|(_, d)| d),
        None => Document::from_der(&raw).ok(),
    };
    let is_encrypted = doc
        .as_ref()
        .map(|d| EncryptedPrivateKeyInfo::try_from(d.as_bytes()).is_ok())
        .unwrap_or(false);

    if !pass.is_empty() && is_encrypted {
        let result = match pem {
            Some(s) => RsaPrivateKey::from_pkcs8_encrypted_pem(s, pass.as_bytes()),
            None => RsaPrivateKey::from_pkcs8_encrypted_der(&raw, pass.as_bytes()),
        };
        return result.map_err(|_| CpackError::WrongPassphrase(path.to_path_buf()));
    }
    if is_encrypted {
        return Err(CpackError::WrongPassphrase(path.to_path_buf()));
    }

    match pem {
        Some(s) => match RsaPrivateKey::from_pkcs8_pem(s) {
            Ok(key) => Ok(key),
            Err(_) => RsaPrivateKey::from_pkcs1_pem(s).map_err(|e| parse_err(path, e)),
        },
        None => match RsaPrivateKey::from_pkcs8_der(&raw) {
            Ok(key) => Ok(key),
            Err(_) => RsaPrivateKey::from_pkcs1_der(&raw).map_err(|e| parse_err(path, e)),
        },
    }
}

fn read_key_file(path: &Path) -> CpackResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CpackError::KeyNotFound(path.to_path_buf()),
        _ => CpackError::Io(e),
    })
}

fn as_pem(raw: &[u8]) -> Option<&str> {
    std::str::from_utf8(raw).ok().filter(|s| s.contains("-----BEGIN"))
}

fn parse_err(path: &Path, e: impl std::fmt::Display) -> CpackError {
    CpackError::KeyParse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use rsa::pkcs1::EncodeRsaPublicKey;

    fn test_keypair() -> &'static (RsaPrivateKey, RsaPublicKey) {
        use std::sync::OnceLock;
        static KEYS: OnceLock<(RsaPrivateKey, RsaPublicKey)> = OnceLock::new();
        KEYS.get_or_init(|| {
            let sec = RsaPrivateKey::new(&mut OsRng, 2048).expect("RSA keygen");
            let public = RsaPublicKey::from(&sec);
            (sec, public)
        })
    }

    #[test]
    fn test_symmetric_keys_are_random() {
        let k1 = generate_symmetric_key();
        let k2 = generate_symmetric_key();
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random keys must differ");
    }

    #[test]
    fn test_symmetric_key_debug_redacted() {
        let key = generate_symmetric_key();
        assert!(format!("{key:?}").contains("REDACTED"));
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let (sec, public) = test_keypair();
        let key = generate_symmetric_key();

        let wrapped = wrap_key(public, &key).unwrap();
        let unwrapped = unwrap_key_or_random(sec, &wrapped, KEY_SIZE);

        assert_eq!(key.as_bytes(), unwrapped.as_bytes());
    }

    #[test]
    fn test_unwrap_wrong_key_yields_random_substitute() {
        let (_, public) = test_keypair();
        let other = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let key = generate_symmetric_key();

        let wrapped = wrap_key(public, &key).unwrap();
        let unwrapped = unwrap_key_or_random(&other, &wrapped, KEY_SIZE);

        assert_ne!(
            key.as_bytes(),
            unwrapped.as_bytes(),
            "wrong private key must not recover the content key"
        );
    }

    #[test]
    fn test_load_public_key_pem_and_der() {
        let (_, public) = test_keypair();
        let dir = tempfile::tempdir().unwrap();

        let pem_path = dir.path().join("pub.pem");
        std::fs::write(&pem_path, public.to_public_key_pem(LineEnding::LF).unwrap()).unwrap();
        assert_eq!(&load_public_key(&pem_path).unwrap(), public);

        let der_path = dir.path().join("pub.der");
        std::fs::write(&der_path, public.to_public_key_der().unwrap().as_bytes()).unwrap();
        assert_eq!(&load_public_key(&der_path).unwrap(), public);

        let pkcs1_path = dir.path().join("pub.pkcs1.pem");
        std::fs::write(&pkcs1_path, public.to_pkcs1_pem(LineEnding::LF).unwrap()).unwrap();
        assert_eq!(&load_public_key(&pkcs1_path).unwrap(), public);
    }

    #[test]
    fn test_load_private_key_plain() {
        let (sec, _) = test_keypair();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sec.pem");
        std::fs::write(&path, sec.to_pkcs8_pem(LineEnding::LF).unwrap().as_bytes()).unwrap();

        let loaded = load_private_key(&path, &SecretString::from("")).unwrap();
        assert_eq!(&loaded, sec);
    }

    #[test]
    fn test_load_private_key_encrypted() {
        let (sec, _) = test_keypair();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sec.enc.pem");
        let pem = sec
            .to_pkcs8_encrypted_pem(&mut OsRng, "correct horse", LineEnding::LF)
            .unwrap();
        std::fs::write(&path, pem.as_bytes()).unwrap();

        let loaded = load_private_key(&path, &SecretString::from("correct horse")).unwrap();
        assert_eq!(&loaded, sec);

        let wrong = load_private_key(&path, &SecretString::from("battery staple"));
        assert!(matches!(wrong, Err(CpackError::WrongPassphrase(_))));

        let empty = load_private_key(&path, &SecretString::from(""));
        assert!(
            matches!(empty, Err(CpackError::WrongPassphrase(_))),
            "encrypted key without passphrase must report WrongPassphrase"
        );
    }

    #[test]
    fn test_load_key_not_found() {
        let missing = Path::new("/nonexistent/key.pem");
        assert!(matches!(
            load_public_key(missing),
            Err(CpackError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_load_key_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.pem");
        std::fs::write(&path, b"-----BEGIN PUBLIC KEY-----\nnot a key\n-----END PUBLIC KEY-----\n")
            .unwrap();
        assert!(matches!(
            load_public_key(&path),
            Err(CpackError::KeyParse { .. })
        ));
    }
}
