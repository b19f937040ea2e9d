//! Identity keys, signed prekeys, and one-time prekeys.
//!
//! Each party holds one long-term `IdentityKeyPair`. Its primary
//! representation is X25519 (`x25519_dalek::StaticSecret`/`PublicKey`): the
//! same key participates in Diffie-Hellman during X3DH *and*, via XEdDSA,
//! signs the signed prekey. No separate Ed25519 identity key is stored.
//!
//! Signed prekeys rotate periodically; one-time prekeys are generated in
//! batches and each is meant to be consumed by at most one `x3dh` handshake.

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::error::Result;
use crate::xeddsa;

/// Serde helpers for `x25519_dalek::PublicKey`, which has no serde impl of
/// its own — framing structs that need JSON round-tripping borrow this the
/// way sibling X3DH implementations in the wider crypto ecosystem do.
pub mod x25519_serde {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &X25519Public, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_bytes(key.as_bytes())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<X25519Public, D::Error> {
        let bytes: Vec<u8> = Deserialize::deserialize(de)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32-byte X25519 key"))?;
        Ok(X25519Public::from(arr))
    }
}

/// As [`x25519_serde`], for `Option<X25519Public>` (one-time prekeys are
/// optional in a bundle).
pub mod option_x25519_serde {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        key: &Option<X25519Public>,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        match key {
            Some(k) => ser.serialize_some(k.as_bytes()),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<Option<X25519Public>, D::Error> {
        let bytes: Option<Vec<u8>> = Deserialize::deserialize(de)?;
        match bytes {
            Some(b) => {
                let arr: [u8; 32] = b
                    .try_into()
                    .map_err(|_| serde::de::Error::custom("expected 32-byte X25519 key"))?;
                Ok(Some(X25519Public::from(arr)))
            }
            None => Ok(None),
        }
    }
}

/// Long-term identity keypair. `Drop` clears the secret via `ZeroizeOnDrop`.
#[derive(ZeroizeOnDrop)]
pub struct IdentityKeyPair {
    secret: StaticSecret,
    #[zeroize(skip)]
    public: X25519Public,
}

impl IdentityKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret);
        Self { secret, public }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*bytes);
        let public = X25519Public::from(&secret);
        Self { secret, public }
    }

    pub fn secret(&self) -> &StaticSecret {
        &self.secret
    }

    pub fn public(&self) -> &X25519Public {
        &self.public
    }

    /// Sign arbitrary bytes with the XEdDSA-derived Edwards keypair.
    pub fn sign(&self, msg: &[u8]) -> [u8; xeddsa::SIGNATURE_LEN] {
        xeddsa::xeddsa_sign(&self.secret, msg)
    }

    /// Verify a signature made by `sign` (or by any holder of the matching
    /// X25519 secret) over `msg`.
    pub fn verify(public: &X25519Public, msg: &[u8], sig: &[u8]) -> Result<bool> {
        xeddsa::xeddsa_verify(public, msg, sig)
    }

    /// Human-readable fingerprint for out-of-band verification: BLAKE3 of
    /// the public key, truncated to 20 bytes, hex-encoded in groups of 4.
    pub fn fingerprint(&self) -> String {
        fingerprint_of(&self.public)
    }
}

/// Shared by `IdentityKeyPair::fingerprint` and any peer public key a caller
/// wants to display for manual comparison (a "safety number" style check).
pub fn fingerprint_of(public: &X25519Public) -> String {
    let hash = blake3::hash(public.as_bytes());
    let hex = hex::encode(&hash.as_bytes()[..20]);
    hex.chars()
        .collect::<Vec<_>>()
        .chunks(4)
        .map(|c| c.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A rotating signed prekey: a fresh X25519 keypair, its public half signed
/// by the owning identity key.
#[derive(ZeroizeOnDrop)]
pub struct SignedPrekey {
    secret: StaticSecret,
    #[zeroize(skip)]
    pub public: X25519Public,
    #[zeroize(skip)]
    pub signature: [u8; xeddsa::SIGNATURE_LEN],
}

impl SignedPrekey {
    pub fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

/// Generate a signed prekey for `identity`: a fresh X25519 keypair with the
/// public half signed via XEdDSA under the identity key.
///
/// Uses the OS CSPRNG. See [`generate_signed_prekey_with_rng`] to inject a
/// seeded RNG, e.g. for reproducing a fixed test vector.
pub fn generate_signed_prekey(identity: &IdentityKeyPair) -> SignedPrekey {
    generate_signed_prekey_with_rng(identity, OsRng)
}

/// As [`generate_signed_prekey`], drawing the keypair from the supplied RNG
/// instead of the OS CSPRNG.
pub fn generate_signed_prekey_with_rng<R: RngCore + CryptoRng>(
    identity: &IdentityKeyPair,
    rng: R,
) -> SignedPrekey {
    let secret = StaticSecret::random_from_rng(rng);
    let public = X25519Public::from(&secret);
    let signature = identity.sign(&crate::x3dh::encode_pk(&public));
    SignedPrekey {
        secret,
        public,
        signature,
    }
}

/// A single one-time prekey, tagged with an opaque id so a server-side
/// directory can track which have been consumed.
#[derive(ZeroizeOnDrop)]
pub struct OneTimePrekey {
    pub id: u32,
    secret: StaticSecret,
    #[zeroize(skip)]
    pub public: X25519Public,
}

impl OneTimePrekey {
    pub fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

/// Generate `count` one-time prekeys, ids starting at `start_id`.
///
/// Uses the OS CSPRNG. See [`generate_one_time_prekeys_with_rng`] to inject a
/// seeded RNG, e.g. for reproducing a fixed test vector.
pub fn generate_one_time_prekeys(count: usize, start_id: u32) -> Vec<OneTimePrekey> {
    generate_one_time_prekeys_with_rng(count, start_id, &mut OsRng)
}

/// As [`generate_one_time_prekeys`], drawing each keypair from the supplied
/// RNG instead of the OS CSPRNG.
pub fn generate_one_time_prekeys_with_rng<R: RngCore + CryptoRng>(
    count: usize,
    start_id: u32,
    mut rng: R,
) -> Vec<OneTimePrekey> {
    (0..count as u32)
        .map(|i| {
            let secret = StaticSecret::random_from_rng(&mut rng);
            let public = X25519Public::from(&secret);
            OneTimePrekey {
                id: start_id + i,
                secret,
                public,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_sign_verify_round_trip() {
        let id = IdentityKeyPair::generate();
        let sig = id.sign(b"hello");
        assert!(IdentityKeyPair::verify(id.public(), b"hello", &sig).unwrap());
    }

    #[test]
    fn signed_prekey_signature_verifies_under_identity() {
        let id = IdentityKeyPair::generate();
        let spk = generate_signed_prekey(&id);
        assert!(IdentityKeyPair::verify(
            id.public(),
            &crate::x3dh::encode_pk(&spk.public),
            &spk.signature
        )
        .unwrap());
    }

    #[test]
    fn signed_prekey_signature_rejects_under_other_identity() {
        let id = IdentityKeyPair::generate();
        let other = IdentityKeyPair::generate();
        let spk = generate_signed_prekey(&id);
        assert!(!IdentityKeyPair::verify(
            other.public(),
            &crate::x3dh::encode_pk(&spk.public),
            &spk.signature
        )
        .unwrap());
    }

    #[test]
    fn fingerprint_is_stable_and_distinguishes_keys() {
        let alice = IdentityKeyPair::generate();
        let bob = IdentityKeyPair::generate();
        assert_eq!(alice.fingerprint(), alice.fingerprint());
        assert_ne!(alice.fingerprint(), bob.fingerprint());
    }

    #[test]
    fn one_time_prekeys_have_distinct_ids_and_keys() {
        let prekeys = generate_one_time_prekeys(5, 100);
        assert_eq!(prekeys.len(), 5);
        assert_eq!(prekeys[0].id, 100);
        assert_eq!(prekeys[4].id, 104);
        for i in 0..prekeys.len() {
            for j in (i + 1)..prekeys.len() {
                assert_ne!(prekeys[i].public.as_bytes(), prekeys[j].public.as_bytes());
            }
        }
    }
}
