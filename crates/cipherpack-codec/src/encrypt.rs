//! Encrypt pipeline: content key generation, asymmetric wrap, signed DER
//! header, AEAD payload stream.

use std::fs::OpenOptions;
use std::io::{Seek, Write};
use std::path::Path;
use std::time::Instant;

use rand::rngs::OsRng;
use rsa::pss::SigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use secrecy::SecretString;
use sha2::Sha256;
use tracing::{debug, info, warn};

use cipherpack_core::config::{
    AEAD_ALGO_NAME, PK_ALG_NAME, PK_HASH_NAME, SIGN_ALGO_NAME,
};
use cipherpack_core::{CpackError, CpackResult, PackHeader, PackListener, PackOptions};

use crate::aead::{AeadStream, Direction};
use crate::header::{encode_header1, encode_header2, Header1Params};
use crate::io::{read_file, CleanupGuard};
use crate::keys::{
    generate_nonce, generate_symmetric_key, load_private_key, load_public_key, wrap_key,
};

/// Encrypt `input` into the container at `output`: wrap a fresh content key
/// for the holder of `enc_pub_key`, sign the header with `sign_sec_key`,
/// stream the payload through the AEAD.
///
/// On success the decoded-equivalent [`PackHeader`] is returned and
/// `notify_end(success = true)` fired; on any failure the output file is
/// removed and the listener sees `notify_error` then
/// `notify_end(success = false)`.
#[allow(clippy::too_many_arguments)]
pub fn encrypt_then_sign(
    enc_pub_key: &Path,
    sign_sec_key: &Path,
    passphrase: &SecretString,
    input: &Path,
    payload_version: u64,
    payload_version_parent: u64,
    output: &Path,
    opts: &PackOptions,
    listener: &mut dyn PackListener,
) -> CpackResult<PackHeader> {
    let mut header_seen: Option<PackHeader> = None;
    let result = run_encrypt(
        enc_pub_key,
        sign_sec_key,
        passphrase,
        input,
        payload_version,
        payload_version_parent,
        output,
        opts,
        &mut header_seen,
        listener,
    );
    match result {
        Ok(header) => {
            listener.notify_end(false, Some(&header), true);
            Ok(header)
        }
        Err(e) => {
            listener.notify_error(false, &e.to_string());
            listener.notify_end(false, header_seen.as_ref(), false);
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_encrypt(
    enc_pub_key: &Path,
    sign_sec_key: &Path,
    passphrase: &SecretString,
    input: &Path,
    payload_version: u64,
    payload_version_parent: u64,
    output: &Path,
    opts: &PackOptions,
    header_seen: &mut Option<PackHeader>,
    listener: &mut dyn PackListener,
) -> CpackResult<PackHeader> {
    let started = Instant::now();

    if output.exists() {
        if !opts.overwrite {
            return Err(CpackError::OutputExists(output.to_path_buf()));
        }
        std::fs::remove_file(output).map_err(|e| CpackError::OutputOpen {
            path: output.to_path_buf(),
            source: e,
        })?;
    }
    let mut sink = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(output)
        .map_err(|e| CpackError::OutputOpen {
            path: output.to_path_buf(),
            source: e,
        })?;
    let guard = CleanupGuard::new(output);

    let enc_key = load_public_key(enc_pub_key)?;
    let sign_key = load_private_key(sign_sec_key, passphrase)?;

    let content_key = generate_symmetric_key();
    let nonce = generate_nonce();
    let encrypted_key = wrap_key(&enc_key, &content_key)?;

    let mut aead = AeadStream::new(Direction::Encrypt, &content_key, &nonce, &encrypted_key)?;

    let filename = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());

    let header1 = encode_header1(&Header1Params {
        filename: &filename,
        payload_version,
        payload_version_parent,
        encrypted_key: &encrypted_key,
        nonce: &nonce,
    })?;
    debug!(header1_size = header1.len(), "encoded header-1");

    let signer = SigningKey::<Sha256>::new(sign_key);
    let signature = signer.sign_with_rng(&mut OsRng, &header1).to_vec();
    debug!(signature = %hex::encode(&signature), "signed header-1");
    let header2 = encode_header2(&signature)?;

    sink.write_all(&header1)
        .and_then(|()| sink.write_all(&header2))
        .map_err(|e| write_err(output, e))?;
    let header_bytes = (header1.len() + header2.len()) as u64;

    let header = PackHeader {
        filename,
        payload_version,
        payload_version_parent,
        sign_algo: SIGN_ALGO_NAME.to_string(),
        pk_alg: PK_ALG_NAME.to_string(),
        pk_hash: PK_HASH_NAME.to_string(),
        cipher_algo: AEAD_ALGO_NAME.to_string(),
        header1_size: header1.len() as u32,
        encrypted_key,
        nonce: nonce.to_vec(),
    };
    *header_seen = Some(header.clone());
    listener.notify_header(false, &header, true);

    let send_content = listener.send_content(false);
    if send_content {
        let mut header_copy = [header1.as_slice(), header2.as_slice()].concat();
        if !listener.content_processed(false, true, &mut header_copy, false) {
            return Err(CpackError::ListenerAbort);
        }
    }

    let content_size = std::fs::metadata(input)?.len();
    let mut payload_bytes = 0u64;
    let mut plain_processed = 0u64;

    let in_bytes = read_file(input, opts.buffer_size, |data, is_final| {
        let plain_len = data.len() as u64;
        if is_final {
            aead.finish(data)?;
        } else {
            aead.update(data)?;
        }
        sink.write_all(data).map_err(|e| write_err(output, e))?;
        payload_bytes += data.len() as u64;
        plain_processed += plain_len;

        if send_content {
            let mut copy = data.clone();
            if !listener.content_processed(false, false, &mut copy, is_final) {
                return Err(CpackError::ListenerAbort);
            }
        }
        listener.notify_progress(false, content_size, plain_processed);
        Ok(())
    })?;

    let sink_pos = sink
        .stream_position()
        .map_err(|e| write_err(output, e))?;
    if header_bytes + payload_bytes != sink_pos {
        warn!(
            header_bytes,
            payload_bytes, sink_pos, "output size accounting mismatch"
        );
    }

    info!(
        input = %input.display(),
        output = %output.display(),
        in_bytes,
        out_bytes = sink_pos,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "encrypt-then-sign complete"
    );
    guard.commit();
    Ok(header)
}

fn write_err(path: &Path, e: std::io::Error) -> CpackError {
    CpackError::OutputWrite {
        path: path.to_path_buf(),
        source: e,
    }
}
