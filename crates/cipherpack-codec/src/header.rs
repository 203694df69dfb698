//! DER header codec: the self-sized Header-1 and the detached-signature
//! Header-2.
//!
//! Header-1 declares its own total length in a fixed 4-byte little-endian
//! octet string. The encoder runs two passes: pass 1 with the size field
//! zeroed measures the serialized length, pass 2 re-encodes with the field
//! populated. Only the four value bytes change, so the lengths must agree;
//! the fixed point is asserted.
//!
//! The decoder never re-serializes: Header-1 is read as an exact byte image
//! (the input to signature verification) and parsed from that image.

use der::asn1::{ObjectIdentifier, OctetString};
use der::{Any, Decode, Encode, Header as DerHeader, Reader, SliceReader, Tag};
use spki::AlgorithmIdentifierOwned;

use cipherpack_core::config::{
    AEAD_ALGO_NAME, PACKAGE_MAGIC, PK_ALG_NAME, PK_HASH_NAME, SIGN_ALGO_NAME,
};
use cipherpack_core::{CpackError, CpackResult, PackHeader};

/// id-RSAES-OAEP
pub const RSA_OAEP_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.7");

/// id-sha256
pub const SHA256_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");

/// id-alg-AEADChaCha20Poly1305
pub const CHACHA20_POLY1305_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.3.18");

/// Bytes needed to snoop the outer SEQUENCE, the magic and the size field.
pub const SNOOP_PREFIX_LEN: usize = 64;

/// Upper bound on a plausible Header-1. The size field is attacker
/// controlled until the signature check, so the declared length must not
/// drive an unbounded allocation.
pub const MAX_HEADER1_LEN: usize = 64 * 1024;

/// Upper bound on a serialized Header-2 (RSA signatures up to 8192 bit).
pub const MAX_HEADER2_LEN: usize = 1040;

#[derive(Clone, Debug, Eq, PartialEq, der::Sequence)]
struct Header1 {
    package_magic: OctetString,
    header1_size: OctetString,
    filename: OctetString,
    payload_version: u64,
    payload_version_parent: u64,
    sign_algo: OctetString,
    pk_alg: AlgorithmIdentifierOwned,
    cipher_oid: ObjectIdentifier,
    encrypted_key: OctetString,
    nonce: OctetString,
}

#[derive(Clone, Debug, Eq, PartialEq, der::Sequence)]
struct Header2 {
    signature: OctetString,
}

/// Inputs to Header-1 apart from the derived size field.
#[derive(Debug)]
pub struct Header1Params<'a> {
    pub filename: &'a str,
    pub payload_version: u64,
    pub payload_version_parent: u64,
    pub encrypted_key: &'a [u8],
    pub nonce: &'a [u8],
}

fn build_header1(p: &Header1Params<'_>, size_field: [u8; 4]) -> CpackResult<Header1> {
    let hash_alg = AlgorithmIdentifierOwned {
        oid: SHA256_OID,
        parameters: None,
    };
    Ok(Header1 {
        package_magic: OctetString::new(PACKAGE_MAGIC.as_bytes().to_vec())?,
        header1_size: OctetString::new(size_field.to_vec())?,
        filename: OctetString::new(p.filename.as_bytes().to_vec())?,
        payload_version: p.payload_version,
        payload_version_parent: p.payload_version_parent,
        sign_algo: OctetString::new(SIGN_ALGO_NAME.as_bytes().to_vec())?,
        pk_alg: AlgorithmIdentifierOwned {
            oid: RSA_OAEP_OID,
            parameters: Some(Any::encode_from(&hash_alg)?),
        },
        cipher_oid: CHACHA20_POLY1305_OID,
        encrypted_key: OctetString::new(p.encrypted_key.to_vec())?,
        nonce: OctetString::new(p.nonce.to_vec())?,
    })
}

/// Two-pass encode of Header-1. Returns the final byte image.
pub fn encode_header1(p: &Header1Params<'_>) -> CpackResult<Vec<u8>> {
    let pass1 = build_header1(p, [0u8; 4])?.to_der()?;
    let size_field = (pass1.len() as u32).to_le_bytes();
    let pass2 = build_header1(p, size_field)?.to_der()?;
    if pass1.len() != pass2.len() {
        return Err(CpackError::HeaderSizeMismatch {
            pass1: pass1.len(),
            pass2: pass2.len(),
        });
    }
    Ok(pass2)
}

/// Encode Header-2 around a detached signature.
pub fn encode_header2(signature: &[u8]) -> CpackResult<Vec<u8>> {
    let h2 = Header2 {
        signature: OctetString::new(signature.to_vec())?,
    };
    Ok(h2.to_der()?)
}

/// Phase A of the decode: from a stream prefix, read the magic and size
/// fields structurally and return the declared Header-1 length. Field
/// content is not interpreted here; those checks run in
/// [`decode_header1`], after the signature over the byte image has been
/// verified.
pub fn snoop_header1_size(prefix: &[u8]) -> CpackResult<u32> {
    let mut reader = SliceReader::new(prefix)?;
    let seq = DerHeader::decode(&mut reader)?;
    seq.tag.assert_eq(Tag::Sequence)?;

    let _magic = OctetString::decode(&mut reader)?;
    let size_field = OctetString::decode(&mut reader)?;
    let bytes: [u8; 4] = size_field
        .as_bytes()
        .try_into()
        .map_err(|_| CpackError::BadHeaderSize(size_field.as_bytes().len()))?;
    Ok(u32::from_le_bytes(bytes))
}

/// Phase B of the decode: parse and validate all Header-1 fields from the
/// exact byte image read off the wire. Callers verify the detached
/// signature over the image first; a mismatch reported here therefore
/// means a legitimately signed container of the wrong flavor, not
/// tampering.
pub fn decode_header1(image: &[u8]) -> CpackResult<PackHeader> {
    let h = Header1::from_der(image)?;

    if h.package_magic.as_bytes() != PACKAGE_MAGIC.as_bytes() {
        return Err(CpackError::BadMagic {
            expected: PACKAGE_MAGIC.to_string(),
            found: String::from_utf8_lossy(h.package_magic.as_bytes()).into_owned(),
        });
    }

    let size_bytes: [u8; 4] = h
        .header1_size
        .as_bytes()
        .try_into()
        .map_err(|_| CpackError::BadHeaderSize(h.header1_size.as_bytes().len()))?;
    let header1_size = u32::from_le_bytes(size_bytes);

    let filename = String::from_utf8(h.filename.as_bytes().to_vec())
        .map_err(|_| CpackError::DerDecode("data filename is not valid UTF-8".into()))?;
    if filename.is_empty() {
        return Err(CpackError::DerDecode("empty data filename".into()));
    }

    let sign_algo = String::from_utf8_lossy(h.sign_algo.as_bytes()).into_owned();
    if sign_algo != SIGN_ALGO_NAME {
        return Err(CpackError::AlgorithmMismatch {
            field: "sign_algo",
            expected: SIGN_ALGO_NAME.to_string(),
            found: sign_algo,
        });
    }

    if h.pk_alg.oid != RSA_OAEP_OID {
        return Err(CpackError::AlgorithmMismatch {
            field: "pk_alg",
            expected: format!("{PK_ALG_NAME} ({RSA_OAEP_OID})"),
            found: h.pk_alg.oid.to_string(),
        });
    }
    let hash_alg: AlgorithmIdentifierOwned = match &h.pk_alg.parameters {
        Some(any) => any.decode_as().map_err(CpackError::from)?,
        None => {
            return Err(CpackError::AlgorithmMismatch {
                field: "pk_alg hash",
                expected: PK_HASH_NAME.to_string(),
                found: "absent".to_string(),
            })
        }
    };
    if hash_alg.oid != SHA256_OID {
        return Err(CpackError::AlgorithmMismatch {
            field: "pk_alg hash",
            expected: format!("{PK_HASH_NAME} ({SHA256_OID})"),
            found: hash_alg.oid.to_string(),
        });
    }
    if hash_alg.parameters.is_some() {
        return Err(CpackError::AlgorithmMismatch {
            field: "pk_alg hash parameters",
            expected: "empty".to_string(),
            found: "present".to_string(),
        });
    }

    if h.cipher_oid != CHACHA20_POLY1305_OID {
        return Err(CpackError::AlgorithmMismatch {
            field: "cipher",
            expected: format!("{AEAD_ALGO_NAME} ({CHACHA20_POLY1305_OID})"),
            found: h.cipher_oid.to_string(),
        });
    }

    Ok(PackHeader {
        filename,
        payload_version: h.payload_version,
        payload_version_parent: h.payload_version_parent,
        sign_algo,
        pk_alg: PK_ALG_NAME.to_string(),
        pk_hash: PK_HASH_NAME.to_string(),
        cipher_algo: AEAD_ALGO_NAME.to_string(),
        header1_size,
        encrypted_key: h.encrypted_key.as_bytes().to_vec(),
        nonce: h.nonce.as_bytes().to_vec(),
    })
}

/// Decode Header-2 from a buffer that starts right after Header-1. Returns
/// the signature bytes and the number of bytes Header-2 occupied; payload
/// data follows immediately and is left untouched.
pub fn decode_header2(buf: &[u8]) -> CpackResult<(Vec<u8>, usize)> {
    let mut reader = SliceReader::new(buf)?;
    let h2 = Header2::decode(&mut reader)?;
    let consumed = u32::from(reader.position()) as usize;
    Ok((h2.signature.as_bytes().to_vec(), consumed))
}
