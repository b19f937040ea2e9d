//! Key derivation functions.
//!
//! `hkdf_expand` — general-purpose HKDF-SHA-256, used by X3DH and by the
//! Double Ratchet's `KDF_RK`.
//! `kdf_rk` / `kdf_ck` — the two ratchet-specific derivations from the
//! Double Ratchet spec (root-key step and chain-key step respectively).

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Result, SignalError};

type HmacSha256 = Hmac<Sha256>;

/// Expand `ikm` (+ optional `salt`) into `output.len()` bytes via HKDF-SHA-256.
pub fn hkdf_expand(ikm: &[u8], salt: Option<&[u8]>, info: &[u8], output: &mut [u8]) -> Result<()> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| SignalError::DerivationFailed(e.to_string()))
}

/// `KDF_RK(RK, dh_out) -> (RK', CK)`.
///
/// `HKDF(ikm = dh_out, salt = RK, info = "DR-RK", 64)`, split into two
/// 32-byte halves: the first is the new root key, the second the new chain
/// key.
pub fn kdf_rk(root_key: &[u8; 32], dh_output: &[u8]) -> Result<([u8; 32], [u8; 32])> {
    let hk = Hkdf::<Sha256>::new(Some(root_key), dh_output);
    let mut okm = [0u8; 64];
    hk.expand(b"DR-RK", &mut okm)
        .map_err(|e| SignalError::DerivationFailed(e.to_string()))?;
    let mut new_rk = [0u8; 32];
    let mut ck = [0u8; 32];
    new_rk.copy_from_slice(&okm[..32]);
    ck.copy_from_slice(&okm[32..]);
    Ok((new_rk, ck))
}

/// `KDF_CK(CK) -> (CK', MK)`.
///
/// HMAC-SHA-256 based construction, per the Open Question decision in the
/// spec's design notes: `MK = HMAC(CK, 0x01)`, `CK' = HMAC(CK, 0x02)`.
pub fn kdf_ck(chain_key: &[u8; 32]) -> Result<([u8; 32], [u8; 32])> {
    let mut mac_ck = HmacSha256::new_from_slice(chain_key)
        .map_err(|e| SignalError::DerivationFailed(e.to_string()))?;
    mac_ck.update(&[0x02]);
    let new_ck: [u8; 32] = mac_ck.finalize().into_bytes().into();

    let mut mac_mk = HmacSha256::new_from_slice(chain_key)
        .map_err(|e| SignalError::DerivationFailed(e.to_string()))?;
    mac_mk.update(&[0x01]);
    let mk: [u8; 32] = mac_mk.finalize().into_bytes().into();

    Ok((new_ck, mk))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kdf_rk_is_deterministic() {
        let rk = [1u8; 32];
        let dh = [2u8; 32];
        assert_eq!(kdf_rk(&rk, &dh).unwrap(), kdf_rk(&rk, &dh).unwrap());
    }

    #[test]
    fn kdf_ck_advances_and_differs_from_message_key() {
        let ck = [3u8; 32];
        let (ck2, mk) = kdf_ck(&ck).unwrap();
        assert_ne!(ck2, ck);
        assert_ne!(ck2, mk);
    }

    #[test]
    fn kdf_ck_chain_is_stable() {
        let ck = [9u8; 32];
        let (ck_a, mk_a) = kdf_ck(&ck).unwrap();
        let (ck_b, mk_b) = kdf_ck(&ck).unwrap();
        assert_eq!(ck_a, ck_b);
        assert_eq!(mk_a, mk_b);
    }
}
