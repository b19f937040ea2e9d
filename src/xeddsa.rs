//! XEdDSA signatures and VXEdDSA verifiable-random-function proofs.
//!
//! Both schemes let a single long-term X25519 (Montgomery) keypair also
//! produce Ed25519-shaped signatures, by deterministically deriving the
//! corresponding Edwards keypair at signing time rather than storing it.
//!
//! XEdDSA sign/verify are thin wrappers over the `xeddsa` crate. VXEdDSA has
//! no off-the-shelf crate, so its hash-to-point step and Chaum-Pedersen-style
//! proof are built directly on `curve25519-dalek`.

use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::{clamp_integer, Scalar};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha512};
use x25519_dalek::{PublicKey as XPublicKey, StaticSecret};
// Leading `::` forces resolution to the external `xeddsa` crate rather than
// this module (both are named `xeddsa` at the crate root).
use ::xeddsa::{xed25519, Sign, Verify};

use crate::error::{Result, SignalError};

pub const SIGNATURE_LEN: usize = 64;
pub const VXEDDSA_PROOF_LEN: usize = 96;
pub const VXEDDSA_HASH_LEN: usize = 32;

/// Sign `message` with the Edwards keypair derived from the X25519 secret `k`.
///
/// Uses the OS CSPRNG for the synthetic nonce. See [`xeddsa_sign_with_rng`]
/// to inject a seeded RNG, e.g. for reproducing a fixed test vector.
pub fn xeddsa_sign(k: &StaticSecret, message: &[u8]) -> [u8; SIGNATURE_LEN] {
    xeddsa_sign_with_rng(k, message, OsRng)
}

/// As [`xeddsa_sign`], drawing the synthetic nonce from the supplied RNG
/// instead of the OS CSPRNG.
pub fn xeddsa_sign_with_rng<R: RngCore + CryptoRng>(
    k: &StaticSecret,
    message: &[u8],
    rng: R,
) -> [u8; SIGNATURE_LEN] {
    let signing_key = xed25519::PrivateKey::from(k);
    signing_key.sign(message, rng)
}

/// Verify an XEdDSA signature produced by `xeddsa_sign` over `public`.
pub fn xeddsa_verify(public: &XPublicKey, message: &[u8], signature: &[u8]) -> Result<bool> {
    if signature.len() != SIGNATURE_LEN {
        return Err(SignalError::BadLength {
            expected: SIGNATURE_LEN,
            actual: signature.len(),
        });
    }
    let mut sig = [0u8; SIGNATURE_LEN];
    sig.copy_from_slice(signature);
    let verify_key = xed25519::PublicKey::from(public);
    Ok(verify_key.verify(message, &sig).is_ok())
}

/// Deterministically derive the Edwards scalar `a` and canonical (sign-bit-0)
/// public point `A'` for the X25519 secret `k`, per the XEdDSA key
/// conversion (spec.md §4.2 steps 1-2). Used only by the VXEdDSA
/// construction below — XEdDSA sign/verify proper go through the `xeddsa`
/// crate above.
fn derive_edwards_keypair(k: &StaticSecret) -> (Scalar, CompressedEdwardsY) {
    let clamped = clamp_integer(k.to_bytes());
    let a = Scalar::from_bytes_mod_order(clamped);
    let big_a = &ED25519_BASEPOINT_TABLE * &a;
    let mut bytes = *big_a.compress().as_bytes();
    let sign_bit = bytes[31] >> 7;
    bytes[31] &= 0x7F;
    let a_canonical = if sign_bit == 1 { -a } else { a };
    (a_canonical, CompressedEdwardsY(bytes))
}

/// Recover the canonical (sign-bit-0) Edwards public point for a peer's
/// X25519 public key, for use when verifying a VXEdDSA proof against a key
/// we don't hold the secret for.
fn canonical_edwards_public(public: &XPublicKey) -> Result<CompressedEdwardsY> {
    let mont = curve25519_dalek::montgomery::MontgomeryPoint(public.to_bytes());
    let edwards = mont.to_edwards(0).ok_or(SignalError::BadPoint)?;
    let mut bytes = *edwards.compress().as_bytes();
    bytes[31] &= 0x7F;
    Ok(CompressedEdwardsY(bytes))
}

/// Try-and-increment hash-to-point: hash the domain-separated input and
/// attempt Edwards decompression, incrementing a counter byte on failure
/// until a valid point is found.
fn hash_to_point(message: &[u8]) -> EdwardsPoint {
    let mut counter: u8 = 0;
    loop {
        let mut hasher = Sha512::new();
        hasher.update(b"VXEdDSA-H2C");
        hasher.update(message);
        hasher.update([counter]);
        let digest = hasher.finalize();
        let mut candidate = [0u8; 32];
        candidate.copy_from_slice(&digest[..32]);
        candidate[31] &= 0x7F;
        if let Some(point) = CompressedEdwardsY(candidate).decompress() {
            return point.mul_by_cofactor();
        }
        counter = counter.wrapping_add(1);
    }
}

fn hash_scalar(parts: &[&[u8]]) -> Scalar {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&digest);
    Scalar::from_bytes_mod_order_wide(&wide)
}

/// Produce a 96-byte VXEdDSA proof `V(32) || h(32) || s(32)` binding the
/// holder of `k` to `message`. `V` is the deterministic VRF output point;
/// `h`/`s` are a non-interactive Chaum-Pedersen proof that `V` and the public
/// key `A'` share the same discrete log with respect to `Bv` and `B`
/// respectively.
pub fn vxeddsa_prove(k: &StaticSecret, message: &[u8]) -> [u8; VXEDDSA_PROOF_LEN] {
    let (a, a_prime) = derive_edwards_keypair(k);
    let bv = hash_to_point(message);
    let v = bv * a;
    let v_bytes = *v.compress().as_bytes();

    let nonce = hash_scalar(&[b"VXEdDSA-nonce", a.as_bytes(), message, &v_bytes]);
    let r = &ED25519_BASEPOINT_TABLE * &nonce;
    let rv = bv * nonce;

    let h = hash_scalar(&[
        b"VXEdDSA-challenge",
        &v_bytes,
        r.compress().as_bytes(),
        rv.compress().as_bytes(),
        a_prime.as_bytes(),
        bv.compress().as_bytes(),
        message,
    ]);
    let s = nonce + h * a;

    let mut proof = [0u8; VXEDDSA_PROOF_LEN];
    proof[0..32].copy_from_slice(&v_bytes);
    proof[32..64].copy_from_slice(h.as_bytes());
    proof[64..96].copy_from_slice(s.as_bytes());
    proof
}

/// Verify a VXEdDSA proof against the claimed signer's X25519 public key and
/// return `ProofToHash(proof)`: 32 bytes of uniform randomness derived from
/// the VRF output `V`, usable only once the proof has checked out.
pub fn vxeddsa_verify_and_hash(
    public: &XPublicKey,
    message: &[u8],
    proof: &[u8],
) -> Result<[u8; VXEDDSA_HASH_LEN]> {
    if proof.len() != VXEDDSA_PROOF_LEN {
        return Err(SignalError::BadLength {
            expected: VXEDDSA_PROOF_LEN,
            actual: proof.len(),
        });
    }
    let v_bytes: [u8; 32] = proof[0..32].try_into().unwrap();
    let h_bytes: [u8; 32] = proof[32..64].try_into().unwrap();
    let s_bytes: [u8; 32] = proof[64..96].try_into().unwrap();

    let v = CompressedEdwardsY(v_bytes)
        .decompress()
        .ok_or(SignalError::BadPoint)?;
    let h = Scalar::from_canonical_bytes(h_bytes)
        .into_option()
        .ok_or(SignalError::BadProof)?;
    let s = Scalar::from_canonical_bytes(s_bytes)
        .into_option()
        .ok_or(SignalError::BadProof)?;

    let a_prime = canonical_edwards_public(public)?;
    let big_a = a_prime.decompress().ok_or(SignalError::BadPoint)?;
    let bv = hash_to_point(message);

    let r_prime = &ED25519_BASEPOINT_TABLE * &s - h * big_a;
    let rv_prime = bv * s - v * h;

    let h_prime = hash_scalar(&[
        b"VXEdDSA-challenge",
        &v_bytes,
        r_prime.compress().as_bytes(),
        rv_prime.compress().as_bytes(),
        a_prime.as_bytes(),
        bv.compress().as_bytes(),
        message,
    ]);

    if h_prime != h {
        return Err(SignalError::BadProof);
    }

    Ok(proof_to_hash(&v_bytes))
}

fn proof_to_hash(v_bytes: &[u8; 32]) -> [u8; VXEDDSA_HASH_LEN] {
    let digest = blake3::hash(&[b"VXEdDSA-ProofToHash".as_slice(), v_bytes].concat());
    let mut out = [0u8; VXEDDSA_HASH_LEN];
    out.copy_from_slice(&digest.as_bytes()[..VXEDDSA_HASH_LEN]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair() -> (StaticSecret, XPublicKey) {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = XPublicKey::from(&secret);
        (secret, public)
    }

    #[test]
    fn xeddsa_round_trip() {
        let (secret, public) = keypair();
        let msg = b"hello signal";
        let sig = xeddsa_sign(&secret, msg);
        assert!(xeddsa_verify(&public, msg, &sig).unwrap());
    }

    #[test]
    fn xeddsa_sign_with_rng_is_reproducible() {
        use rand::SeedableRng;
        let (secret, public) = keypair();
        let msg = b"reproducible nonce";
        let sig_a = xeddsa_sign_with_rng(&secret, msg, rand_chacha::ChaCha20Rng::seed_from_u64(7));
        let sig_b = xeddsa_sign_with_rng(&secret, msg, rand_chacha::ChaCha20Rng::seed_from_u64(7));
        assert_eq!(sig_a, sig_b);
        assert!(xeddsa_verify(&public, msg, &sig_a).unwrap());
    }

    #[test]
    fn xeddsa_rejects_flipped_byte() {
        let (secret, public) = keypair();
        let msg = b"hello signal";
        let mut sig = xeddsa_sign(&secret, msg);
        sig[63] ^= 0xFF;
        assert!(!xeddsa_verify(&public, msg, &sig).unwrap());
    }

    #[test]
    fn xeddsa_rejects_wrong_message() {
        let (secret, public) = keypair();
        let sig = xeddsa_sign(&secret, b"hello signal");
        assert!(!xeddsa_verify(&public, b"goodbye signal", &sig).unwrap());
    }

    #[test]
    fn vxeddsa_round_trip() {
        let (secret, public) = keypair();
        let msg = b"vrf input";
        let proof = vxeddsa_prove(&secret, msg);
        let hash = vxeddsa_verify_and_hash(&public, msg, &proof).unwrap();
        assert_eq!(hash.len(), VXEDDSA_HASH_LEN);
    }

    #[test]
    fn vxeddsa_is_deterministic() {
        let (secret, _public) = keypair();
        let msg = b"vrf input";
        let proof_a = vxeddsa_prove(&secret, msg);
        let proof_b = vxeddsa_prove(&secret, msg);
        assert_eq!(proof_a[..32], proof_b[..32]);
    }

    #[test]
    fn vxeddsa_rejects_tampered_proof() {
        let (secret, public) = keypair();
        let msg = b"vrf input";
        let mut proof = vxeddsa_prove(&secret, msg);
        proof[0] ^= 0xFF;
        assert!(vxeddsa_verify_and_hash(&public, msg, &proof).is_err());
    }

    #[test]
    fn vxeddsa_rejects_wrong_key() {
        let (secret, _public) = keypair();
        let (_other_secret, other_public) = keypair();
        let msg = b"vrf input";
        let proof = vxeddsa_prove(&secret, msg);
        assert!(vxeddsa_verify_and_hash(&other_public, msg, &proof).is_err());
    }
}
