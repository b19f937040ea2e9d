//! X3DH: asynchronous extended triple Diffie-Hellman key agreement.
//!
//! The initiator (Alice) fetches the responder's (Bob's) published prekey
//! bundle, verifies the signed prekey's XEdDSA signature, generates one
//! ephemeral X25519 keypair, and combines three or four DH outputs into a
//! 32-byte shared secret via HKDF-SHA-256. The responder reconstructs the
//! same DH set from the initial message header and derives the same secret.
//!
//! DH set (mirroring Signal's X3DH, §4.3 of this crate's design notes):
//!   DH1 = IK_A × SPK_B   (mutual authentication)
//!   DH2 = EK_A × IK_B    (forward secrecy)
//!   DH3 = EK_A × SPK_B   (replay protection)
//!   DH4 = EK_A × OPK_B   (one-time forward secrecy, optional)
//!   SK  = HKDF(salt = 0x00*32, ikm = 0xFF*32 || DH1 || DH2 || DH3 [|| DH4])

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroize;

use crate::dh;
use crate::error::{Result, SignalError};
use crate::framing;
use crate::identity::{option_x25519_serde, x25519_serde, IdentityKeyPair, OneTimePrekey, SignedPrekey};
use crate::kdf;

const X3DH_INFO: &[u8] = b"X3DH-Signal";
const CURVE_ID_X25519: u8 = 0x05;

/// Curve-identifier-prefixed key encoding used wherever a public key is
/// signed, so a signature over one key type can never be replayed as a
/// signature over a different one. `pub(crate)` so `identity.rs` signs
/// signed prekeys over exactly the bytes `verify_signed_prekey` checks.
pub(crate) fn encode_pk(key: &X25519Public) -> [u8; 33] {
    let mut out = [0u8; 33];
    out[0] = CURVE_ID_X25519;
    out[1..].copy_from_slice(key.as_bytes());
    out
}

/// A prekey bundle as published by a directory service: the responder's
/// long-term identity key, current signed prekey (with signature), and
/// optionally one one-time prekey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrekeyBundle {
    #[serde(with = "x25519_serde")]
    pub identity_key: X25519Public,
    #[serde(with = "x25519_serde")]
    pub signed_prekey: X25519Public,
    pub signed_prekey_sig: [u8; 64],
    #[serde(with = "option_x25519_serde")]
    pub one_time_prekey: Option<X25519Public>,
    pub one_time_prekey_id: Option<u32>,
}

impl PrekeyBundle {
    /// Build a bundle from the responder's own key material.
    pub fn new(
        identity: &IdentityKeyPair,
        spk: &SignedPrekey,
        otpk: Option<&OneTimePrekey>,
    ) -> Self {
        Self {
            identity_key: *identity.public(),
            signed_prekey: spk.public,
            signed_prekey_sig: spk.signature,
            one_time_prekey: otpk.map(|k| k.public),
            one_time_prekey_id: otpk.map(|k| k.id),
        }
    }

    /// Verify the signed prekey's XEdDSA signature under this bundle's
    /// identity key. Must succeed before any DH is computed against it.
    pub fn verify_signed_prekey(&self) -> Result<()> {
        let ok = IdentityKeyPair::verify(
            &self.identity_key,
            &encode_pk(&self.signed_prekey),
            &self.signed_prekey_sig,
        )?;
        if ok {
            Ok(())
        } else {
            Err(SignalError::BadPrekeySignature)
        }
    }

    /// Encode as the fixed-width wire form, base64url (no padding) for
    /// transport over text-only channels (e.g. a directory service's JSON
    /// API or a QR code payload).
    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(framing::encode_prekey_bundle(self))
    }

    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(s)?;
        framing::decode_prekey_bundle(&bytes)
    }
}

/// Sent alongside the first ciphertext so the responder can derive `SK`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct X3DHHeader {
    #[serde(with = "x25519_serde")]
    pub identity_key: X25519Public,
    #[serde(with = "x25519_serde")]
    pub ephemeral_key: X25519Public,
    pub one_time_prekey_id: Option<u32>,
}

/// Result of a successful X3DH handshake.
pub struct X3DHResult {
    /// Feeds into the Double Ratchet as the initial root key.
    pub shared_key: [u8; 32],
    pub header: X3DHHeader,
}

fn derive_sk(ikm: &mut Vec<u8>) -> Result<[u8; 32]> {
    let mut sk = [0u8; 32];
    kdf::hkdf_expand(ikm, Some(&[0u8; 32]), X3DH_INFO, &mut sk)?;
    ikm.zeroize();
    Ok(sk)
}

/// Alice's half: verify Bob's bundle, run the DH set, derive `SK`.
///
/// Uses the OS CSPRNG for the ephemeral key. See [`initiate_with_rng`] to
/// inject a seeded RNG, e.g. for reproducing a fixed test vector.
pub fn initiate(identity: &IdentityKeyPair, bundle: &PrekeyBundle) -> Result<X3DHResult> {
    initiate_with_rng(identity, bundle, OsRng)
}

/// As [`initiate`], drawing the ephemeral key from the supplied RNG instead
/// of the OS CSPRNG.
pub fn initiate_with_rng<R: RngCore + CryptoRng>(
    identity: &IdentityKeyPair,
    bundle: &PrekeyBundle,
    rng: R,
) -> Result<X3DHResult> {
    bundle.verify_signed_prekey()?;

    let ek = StaticSecret::random_from_rng(rng);
    let ek_pub = X25519Public::from(&ek);

    let dh1 = dh::diffie_hellman(identity.secret(), &bundle.signed_prekey)?;
    let dh2 = dh::diffie_hellman(&ek, &bundle.identity_key)?;
    let dh3 = dh::diffie_hellman(&ek, &bundle.signed_prekey)?;

    let mut ikm = vec![0xFFu8; 32];
    ikm.extend_from_slice(&dh1);
    ikm.extend_from_slice(&dh2);
    ikm.extend_from_slice(&dh3);

    let mut consumed_opk_id = None;
    if let Some(opk_pub) = bundle.one_time_prekey {
        let dh4 = dh::diffie_hellman(&ek, &opk_pub)?;
        ikm.extend_from_slice(&dh4);
        consumed_opk_id = bundle.one_time_prekey_id;
    }

    let shared_key = derive_sk(&mut ikm)?;

    Ok(X3DHResult {
        shared_key,
        header: X3DHHeader {
            identity_key: *identity.public(),
            ephemeral_key: ek_pub,
            one_time_prekey_id: consumed_opk_id,
        },
    })
}

/// Bob's half: reconstruct the DH set from Alice's initial header and
/// derive the same `SK`. `one_time_prekey` must be the secret matching the
/// id Alice claims to have consumed, if any; a mismatch or missing key is
/// `UnknownOPK`.
pub fn respond(
    identity: &IdentityKeyPair,
    signed_prekey: &SignedPrekey,
    one_time_prekey: Option<&OneTimePrekey>,
    header: &X3DHHeader,
) -> Result<[u8; 32]> {
    let dh1 = dh::diffie_hellman(signed_prekey.secret(), &header.identity_key)?;
    let dh2 = dh::diffie_hellman(identity.secret(), &header.ephemeral_key)?;
    let dh3 = dh::diffie_hellman(signed_prekey.secret(), &header.ephemeral_key)?;

    let mut ikm = vec![0xFFu8; 32];
    ikm.extend_from_slice(&dh1);
    ikm.extend_from_slice(&dh2);
    ikm.extend_from_slice(&dh3);

    if let Some(claimed_id) = header.one_time_prekey_id {
        // Distinguish "we have no prekey to try at all" from "the one we
        // looked up locally isn't the one the initiator claims to have
        // consumed" — the latter means the caller's local OPK store is
        // out of sync with what it told the initiator, the former that it
        // never had (or already deleted) one.
        let otpk = one_time_prekey.ok_or(SignalError::MissingPrekey)?;
        let ids_match: bool = otpk.id.to_be_bytes().ct_eq(&claimed_id.to_be_bytes()).into();
        if !ids_match {
            return Err(SignalError::UnknownOPK);
        }
        let dh4 = dh::diffie_hellman(otpk.secret(), &header.ephemeral_key)?;
        ikm.extend_from_slice(&dh4);
    }

    derive_sk(&mut ikm)
}
