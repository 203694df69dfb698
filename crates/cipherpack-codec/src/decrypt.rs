//! Decrypt pipeline: two-phase header decode, signature verification,
//! content key unwrap, AEAD payload stream.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Instant;

use rsa::pss::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use secrecy::SecretString;
use sha2::Sha256;
use tracing::{debug, info, warn};

use cipherpack_core::{CpackError, CpackResult, PackHeader, PackListener, PackOptions};

use crate::aead::{AeadStream, Direction};
use crate::header::{decode_header1, decode_header2, snoop_header1_size};
use crate::header::{MAX_HEADER1_LEN, MAX_HEADER2_LEN, SNOOP_PREFIX_LEN};
use crate::io::{read_stream, CleanupGuard};
use crate::keys::{load_private_key, load_public_key, unwrap_key_or_random};

/// Verify the container at `input` against the signer's `sign_pub_key`,
/// unwrap the content key with `dec_sec_key`, and stream the decrypted
/// payload into `output`.
///
/// On success the verified [`PackHeader`] is returned and
/// `notify_end(success = true)` fired; on any failure the output file is
/// removed and the listener sees `notify_error` then
/// `notify_end(success = false)`.
pub fn check_sign_then_decrypt(
    sign_pub_key: &Path,
    dec_sec_key: &Path,
    passphrase: &SecretString,
    input: &Path,
    output: &Path,
    opts: &PackOptions,
    listener: &mut dyn PackListener,
) -> CpackResult<PackHeader> {
    let mut header_seen: Option<PackHeader> = None;
    let result = run_decrypt(
        sign_pub_key,
        dec_sec_key,
        passphrase,
        input,
        output,
        opts,
        &mut header_seen,
        listener,
    );
    match result {
        Ok(header) => {
            listener.notify_end(true, Some(&header), true);
            Ok(header)
        }
        Err(e) => {
            listener.notify_error(true, &e.to_string());
            listener.notify_end(true, header_seen.as_ref(), false);
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_decrypt(
    sign_pub_key: &Path,
    dec_sec_key: &Path,
    passphrase: &SecretString,
    input: &Path,
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

    let sign_key = load_public_key(sign_pub_key)?;
    let dec_key = load_private_key(dec_sec_key, passphrase)?;

    let mut source = File::open(input)?;

    // Phase A: snoop only the magic and the self-declared header size.
    let mut prefix = vec![0u8; SNOOP_PREFIX_LEN];
    let prefix_len = read_up_to(&mut source, &mut prefix)?;
    prefix.truncate(prefix_len);
    let header1_size = snoop_header1_size(&prefix)?;
    debug!(header1_size, "snooped header-1 size");
    if header1_size as usize > MAX_HEADER1_LEN {
        return Err(CpackError::DerDecode(format!(
            "declared header size {header1_size} exceeds the {MAX_HEADER1_LEN} byte limit"
        )));
    }

    // Phase B: reread the full Header-1 byte image from offset 0. This exact
    // image, not a re-serialization, is what the signature covers.
    source.seek(SeekFrom::Start(0))?;
    let mut header1_image = vec![0u8; header1_size as usize];
    let image_len = read_up_to(&mut source, &mut header1_image)?;
    if image_len < header1_image.len() {
        return Err(CpackError::ShortRead {
            expected: u64::from(header1_size),
            got: image_len as u64,
        });
    }

    let mut header2_buf = vec![0u8; MAX_HEADER2_LEN];
    let header2_len = read_up_to(&mut source, &mut header2_buf)?;
    header2_buf.truncate(header2_len);
    let (signature, header2_consumed) = decode_header2(&header2_buf)?;
    debug!(signature = %hex::encode(&signature), "read header-2");

    // The signature covers the exact byte image and is checked before any
    // Header-1 field is interpreted; tampering anywhere in the signed image
    // reads as SignatureMismatch.
    let verifier = VerifyingKey::<Sha256>::new(sign_key);
    let signature = Signature::try_from(signature.as_slice())
        .map_err(|_| CpackError::SignatureMismatch)?;
    verifier
        .verify(&header1_image, &signature)
        .map_err(|_| CpackError::SignatureMismatch)?;

    let header = decode_header1(&header1_image)?;
    *header_seen = Some(header.clone());
    listener.notify_header(true, &header, true);

    let send_content = listener.send_content(true);

    let content_key = unwrap_key_or_random(&dec_key, &header.encrypted_key, AeadStream::max_key_len());
    let mut aead = AeadStream::new(
        Direction::Decrypt,
        &content_key,
        &header.nonce,
        &header.encrypted_key,
    )?;

    let payload_offset = u64::from(header1_size) + header2_consumed as u64;
    source.seek(SeekFrom::Start(payload_offset))?;

    let content_size = std::fs::metadata(input)?.len();
    let mut cipher_processed = payload_offset;
    let mut out_bytes = 0u64;

    read_stream(&mut source, opts.buffer_size, |data, is_final| {
        cipher_processed += data.len() as u64;
        if is_final {
            aead.finish(data)?;
        } else {
            aead.update(data)?;
        }
        sink.write_all(data).map_err(|e| write_err(output, e))?;
        out_bytes += data.len() as u64;

        if send_content {
            let mut copy = data.clone();
            if !listener.content_processed(true, false, &mut copy, is_final) {
                return Err(CpackError::ListenerAbort);
            }
        }
        listener.notify_progress(true, content_size, cipher_processed);
        Ok(())
    })?;

    let sink_pos = sink
        .stream_position()
        .map_err(|e| write_err(output, e))?;
    if out_bytes != sink_pos {
        warn!(out_bytes, sink_pos, "output size accounting mismatch");
    }

    info!(
        input = %input.display(),
        output = %output.display(),
        in_bytes = cipher_processed,
        out_bytes,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "check-sign-then-decrypt complete"
    );
    guard.commit();
    Ok(header)
}

/// Fill as much of `buf` as the reader can supply; short only at EOF.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> CpackResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn write_err(path: &Path, e: std::io::Error) -> CpackError {
    CpackError::OutputWrite {
        path: path.to_path_buf(),
        source: e,
    }
}
