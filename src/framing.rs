//! Fixed-width binary wire encodings.
//!
//! These are the byte-exact contract between peers: 32-byte keys, 64-byte
//! signatures, big-endian `u32` counters, no variable-length fields.
//! Application-level metadata (user ids, session ids, transport framing) is
//! a caller concern and does not appear here.
//!
//! The ratchet header layout mirrors a plain concatenation of its three
//! fixed fields — `dh_pub || prev_chain_len || msg_number` — which is the
//! same shape used by comparable ratchet header encoders in the wild.

use x25519_dalek::PublicKey as X25519Public;

use crate::error::{Result, SignalError};
use crate::ratchet::RatchetHeader;
use crate::x3dh::{PrekeyBundle, X3DHHeader};

pub const RATCHET_HEADER_LEN: usize = 32 + 4 + 4;
pub const PREKEY_BUNDLE_LEN: usize = 32 + 32 + 64 + 1 + 32 + 4;
pub const X3DH_HEADER_LEN: usize = 32 + 32 + 1 + 4;

fn expect_len(bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() != expected {
        return Err(SignalError::BadLength {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// `dh_pub[32] || prev_chain_len:u32 || msg_number:u32`, big-endian.
pub fn encode_ratchet_header(header: &RatchetHeader) -> [u8; RATCHET_HEADER_LEN] {
    let mut out = [0u8; RATCHET_HEADER_LEN];
    out[0..32].copy_from_slice(&header.dh_pub);
    out[32..36].copy_from_slice(&header.pn.to_be_bytes());
    out[36..40].copy_from_slice(&header.n.to_be_bytes());
    out
}

pub fn decode_ratchet_header(bytes: &[u8]) -> Result<RatchetHeader> {
    expect_len(bytes, RATCHET_HEADER_LEN)?;
    let mut dh_pub = [0u8; 32];
    dh_pub.copy_from_slice(&bytes[0..32]);
    let pn = u32::from_be_bytes(bytes[32..36].try_into().unwrap());
    let n = u32::from_be_bytes(bytes[36..40].try_into().unwrap());
    Ok(RatchetHeader { dh_pub, n, pn })
}

/// `identity_key[32] || signed_prekey[32] || signed_prekey_sig[64] ||
/// has_otpk:u8 || one_time_prekey[32] || one_time_prekey_id:u32`.
///
/// `one_time_prekey`/`one_time_prekey_id` are zero-filled when `has_otpk`
/// is 0.
pub fn encode_prekey_bundle(bundle: &PrekeyBundle) -> [u8; PREKEY_BUNDLE_LEN] {
    let mut out = [0u8; PREKEY_BUNDLE_LEN];
    let mut offset = 0;
    out[offset..offset + 32].copy_from_slice(bundle.identity_key.as_bytes());
    offset += 32;
    out[offset..offset + 32].copy_from_slice(bundle.signed_prekey.as_bytes());
    offset += 32;
    out[offset..offset + 64].copy_from_slice(&bundle.signed_prekey_sig);
    offset += 64;
    match (bundle.one_time_prekey, bundle.one_time_prekey_id) {
        (Some(otpk), Some(id)) => {
            out[offset] = 1;
            offset += 1;
            out[offset..offset + 32].copy_from_slice(otpk.as_bytes());
            offset += 32;
            out[offset..offset + 4].copy_from_slice(&id.to_be_bytes());
        }
        _ => {}
    }
    out
}

pub fn decode_prekey_bundle(bytes: &[u8]) -> Result<PrekeyBundle> {
    expect_len(bytes, PREKEY_BUNDLE_LEN)?;
    let identity_key = X25519Public::from(read32(bytes, 0));
    let signed_prekey = X25519Public::from(read32(bytes, 32));
    let mut signed_prekey_sig = [0u8; 64];
    signed_prekey_sig.copy_from_slice(&bytes[64..128]);
    let has_otpk = bytes[128];
    let (one_time_prekey, one_time_prekey_id) = if has_otpk == 1 {
        let otpk = X25519Public::from(read32(bytes, 129));
        let id = u32::from_be_bytes(bytes[161..165].try_into().unwrap());
        (Some(otpk), Some(id))
    } else {
        (None, None)
    };
    Ok(PrekeyBundle {
        identity_key,
        signed_prekey,
        signed_prekey_sig,
        one_time_prekey,
        one_time_prekey_id,
    })
}

/// `identity_key[32] || ephemeral_key[32] || has_otpk_id:u8 || otpk_id:u32`.
pub fn encode_x3dh_header(header: &X3DHHeader) -> [u8; X3DH_HEADER_LEN] {
    let mut out = [0u8; X3DH_HEADER_LEN];
    out[0..32].copy_from_slice(header.identity_key.as_bytes());
    out[32..64].copy_from_slice(header.ephemeral_key.as_bytes());
    if let Some(id) = header.one_time_prekey_id {
        out[64] = 1;
        out[65..69].copy_from_slice(&id.to_be_bytes());
    }
    out
}

pub fn decode_x3dh_header(bytes: &[u8]) -> Result<X3DHHeader> {
    expect_len(bytes, X3DH_HEADER_LEN)?;
    let identity_key = X25519Public::from(read32(bytes, 0));
    let ephemeral_key = X25519Public::from(read32(bytes, 32));
    let one_time_prekey_id = if bytes[64] == 1 {
        Some(u32::from_be_bytes(bytes[65..69].try_into().unwrap()))
    } else {
        None
    };
    Ok(X3DHHeader {
        identity_key,
        ephemeral_key,
        one_time_prekey_id,
    })
}

fn read32(bytes: &[u8], offset: usize) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes[offset..offset + 32]);
    out
}
