//! The Double Ratchet: combined DH ratchet + symmetric chain ratchet.
//!
//! State separation:
//!   RK   — root key, updated on every DH ratchet step
//!   CKs  — sending chain key, updated per message
//!   CKr  — receiving chain key, updated per message
//!   MK   — message key, derived from a chain key, used once then erased
//!
//! A DH ratchet step runs whenever a message arrives carrying a new peer
//! ratchet public key: the old receiving chain is drained into the skipped
//! key store, a fresh root/receiving-chain pair is derived, and a fresh
//! sending keypair/chain is generated for the next outgoing message. This
//! is what gives the ratchet post-compromise security — each direction
//! change mixes in a fresh DH secret neither side could have predicted.
//!
//! `Session::recv` never mutates `self` on a failed decryption: the whole
//! ratchet step runs against a clone, and the clone is only swapped in
//! after the AEAD tag has verified.

use std::collections::{HashMap, VecDeque};

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroize;

use crate::aead;
use crate::dh;
use crate::error::{Result, SignalError};
use crate::framing;
use crate::kdf;

/// Skipped message keys beyond this count in a single chain are refused
/// rather than stored — bounds memory against a peer claiming an enormous
/// counter jump.
pub const MAX_SKIP_PER_CHAIN: u32 = 1000;

/// At most this many prior ratchet-key generations keep skipped entries;
/// the oldest generation is evicted first when a new one is added.
pub const MAX_SKIP_SESSIONS: usize = 5;

/// Sent alongside every ciphertext so the recipient can advance their
/// ratchet. Wire-encoded by [`crate::framing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatchetHeader {
    /// Sender's current DH ratchet public key.
    pub dh_pub: [u8; 32],
    /// Message number in the current sending chain.
    pub n: u32,
    /// Number of messages in the previous sending chain.
    pub pn: u32,
}

/// Double Ratchet session state for one direction of a conversation.
///
/// `dh_send_secret` zeroizes itself on drop via `x25519-dalek`'s own
/// `zeroize` feature; the remaining secret-bearing fields (root key, chain
/// keys, skipped message keys) are wiped by the explicit `Drop` impl below.
#[derive(Clone)]
pub struct Session {
    root_key: [u8; 32],

    dh_send_secret: StaticSecret,
    dh_send_pub: X25519Public,
    send_chain_key: Option<[u8; 32]>,
    send_n: u32,
    prev_send_n: u32,

    dh_recv_pub: Option<X25519Public>,
    recv_chain_key: Option<[u8; 32]>,
    recv_n: u32,

    skipped_keys: HashMap<([u8; 32], u32), [u8; 32]>,
    skipped_generations: VecDeque<[u8; 32]>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.root_key.zeroize();
        if let Some(ck) = self.send_chain_key.as_mut() {
            ck.zeroize();
        }
        if let Some(ck) = self.recv_chain_key.as_mut() {
            ck.zeroize();
        }
        for mk in self.skipped_keys.values_mut() {
            mk.zeroize();
        }
    }
}

impl Session {
    /// Start a session as the initiator, immediately after X3DH. `shared_key`
    /// is X3DH's `SK`; `peer_initial_dh_pub` is the responder's signed
    /// prekey, which doubles as their first ratchet public key.
    pub fn new_initiator(shared_key: [u8; 32], peer_initial_dh_pub: &X25519Public) -> Result<Self> {
        let dh_send_secret = StaticSecret::random_from_rng(OsRng);
        let dh_send_pub = X25519Public::from(&dh_send_secret);

        let dh_output = dh::diffie_hellman(&dh_send_secret, peer_initial_dh_pub)?;
        let (root_key, send_chain_key) = kdf::kdf_rk(&shared_key, &dh_output)?;

        tracing::info!(role = "initiator", "double ratchet session established");

        Ok(Self {
            root_key,
            dh_send_secret,
            dh_send_pub,
            send_chain_key: Some(send_chain_key),
            send_n: 0,
            prev_send_n: 0,
            dh_recv_pub: Some(*peer_initial_dh_pub),
            recv_chain_key: None,
            recv_n: 0,
            skipped_keys: HashMap::new(),
            skipped_generations: VecDeque::new(),
        })
    }

    /// Start a session as the responder, immediately after X3DH.
    /// `my_initial_dh_secret`/`pub` is the signed prekey the initiator used
    /// as their first DH target; no DH ratchet step has happened yet, that
    /// occurs on the first received message.
    pub fn new_responder(
        shared_key: [u8; 32],
        my_initial_dh_secret: StaticSecret,
        my_initial_dh_pub: X25519Public,
    ) -> Self {
        tracing::info!(role = "responder", "double ratchet session established");

        Self {
            root_key: shared_key,
            dh_send_secret: my_initial_dh_secret,
            dh_send_pub: my_initial_dh_pub,
            send_chain_key: None,
            send_n: 0,
            prev_send_n: 0,
            dh_recv_pub: None,
            recv_chain_key: None,
            recv_n: 0,
            skipped_keys: HashMap::new(),
            skipped_generations: VecDeque::new(),
        }
    }

    /// Our current DH ratchet public key.
    pub fn ratchet_public(&self) -> X25519Public {
        self.dh_send_pub
    }

    /// Encrypt `plaintext`, advancing the sending chain by one step.
    /// Returns the wire-encoded header and the AEAD ciphertext (tag
    /// included). The AEAD associated data is `aad ∥ header`, binding the
    /// header to the ciphertext so it cannot be swapped onto a different
    /// message undetected.
    pub fn send(&mut self, plaintext: &[u8], aad: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let (header, mut mk) = self.encrypt_step()?;
        let header_bytes = framing::encode_ratchet_header(&header);
        let nonce = aead::derive_nonce(&mk)?;
        let full_aad = [aad, &header_bytes].concat();
        let ciphertext = aead::encrypt(&mk, &nonce, &full_aad, plaintext);
        mk.zeroize();
        let ciphertext = ciphertext?;
        Ok((header_bytes.to_vec(), ciphertext))
    }

    /// Decrypt a message given its wire-encoded header and ciphertext.
    /// On any failure — malformed header, exceeded skip bound, or a failed
    /// AEAD tag — `self` is left exactly as it was before the call.
    pub fn recv(&mut self, header_bytes: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let header = framing::decode_ratchet_header(header_bytes)?;

        let mut trial = self.clone();
        let mut mk = trial.decrypt_step(&header)?;
        let nonce = aead::derive_nonce(&mk)?;
        let full_aad = [aad, header_bytes].concat();
        let plaintext = aead::decrypt(&mk, &nonce, &full_aad, ciphertext);
        mk.zeroize();
        let plaintext = plaintext?;

        *self = trial;
        Ok(plaintext)
    }

    fn encrypt_step(&mut self) -> Result<(RatchetHeader, [u8; 32])> {
        let ck = self
            .send_chain_key
            .ok_or_else(|| SignalError::SessionState("no sending chain key yet".into()))?;
        let (new_ck, mk) = kdf::kdf_ck(&ck)?;
        self.send_chain_key = Some(new_ck);

        let header = RatchetHeader {
            dh_pub: *self.dh_send_pub.as_bytes(),
            n: self.send_n,
            pn: self.prev_send_n,
        };
        self.send_n += 1;
        Ok((header, mk))
    }

    fn decrypt_step(&mut self, header: &RatchetHeader) -> Result<[u8; 32]> {
        let peer_dh = X25519Public::from(header.dh_pub);

        let skip_key = (header.dh_pub, header.n);
        if let Some(mk) = self.skipped_keys.remove(&skip_key) {
            return Ok(mk);
        }

        let need_dh_ratchet = self.dh_recv_pub.as_ref().map(|k| k.as_bytes()) != Some(peer_dh.as_bytes());

        if need_dh_ratchet {
            if self.dh_recv_pub.is_some() && self.recv_chain_key.is_some() {
                self.skip_message_keys(header.pn)?;
            }

            self.dh_recv_pub = Some(peer_dh);

            let dh_recv_output = dh::diffie_hellman(&self.dh_send_secret, &peer_dh)?;
            let (new_rk, new_recv_ck) = kdf::kdf_rk(&self.root_key, &dh_recv_output)?;
            self.root_key = new_rk;
            self.recv_chain_key = Some(new_recv_ck);
            self.recv_n = 0;

            self.prev_send_n = self.send_n;
            self.send_n = 0;
            let new_dh_secret = StaticSecret::random_from_rng(OsRng);
            self.dh_send_pub = X25519Public::from(&new_dh_secret);
            let dh_send_output = dh::diffie_hellman(&new_dh_secret, &peer_dh)?;
            let (new_rk2, new_send_ck) = kdf::kdf_rk(&self.root_key, &dh_send_output)?;
            self.root_key = new_rk2;
            self.send_chain_key = Some(new_send_ck);
            self.dh_send_secret = new_dh_secret;

            tracing::info!("double ratchet: DH step performed");
        }

        self.skip_message_keys(header.n)?;

        let ck = self
            .recv_chain_key
            .ok_or_else(|| SignalError::SessionState("no receiving chain key".into()))?;
        let (new_ck, mk) = kdf::kdf_ck(&ck)?;
        self.recv_chain_key = Some(new_ck);
        self.recv_n += 1;

        Ok(mk)
    }

    /// Derive and store message keys for `recv_n..until` in the current
    /// receiving chain, bounding the count at `MAX_SKIP_PER_CHAIN` and the
    /// number of distinct ratchet-key generations retained at
    /// `MAX_SKIP_SESSIONS`.
    fn skip_message_keys(&mut self, until: u32) -> Result<()> {
        if until < self.recv_n {
            return Ok(());
        }
        let skip_count = until - self.recv_n;
        if skip_count as u64 > MAX_SKIP_PER_CHAIN as u64 {
            return Err(SignalError::ChainTooLong);
        }

        let dh_pub_bytes = *self
            .dh_recv_pub
            .as_ref()
            .expect("dh_recv_pub set before skip_message_keys is called")
            .as_bytes();

        let ck = self
            .recv_chain_key
            .ok_or_else(|| SignalError::SessionState("no receiving chain key".into()))?;
        let mut ck = ck;
        while self.recv_n < until {
            let (new_ck, mk) = kdf::kdf_ck(&ck)?;
            ck = new_ck;
            self.skipped_keys.insert((dh_pub_bytes, self.recv_n), mk);
            self.recv_n += 1;
        }
        self.recv_chain_key = Some(ck);

        if self.skipped_generations.back() != Some(&dh_pub_bytes) {
            self.skipped_generations.push_back(dh_pub_bytes);
        }
        while self.skipped_generations.len() > MAX_SKIP_SESSIONS {
            if let Some(evicted) = self.skipped_generations.pop_front() {
                let stale_keys: Vec<_> = self
                    .skipped_keys
                    .keys()
                    .filter(|(dh, _)| *dh == evicted)
                    .cloned()
                    .collect();
                for key in stale_keys {
                    if let Some(mut mk) = self.skipped_keys.remove(&key) {
                        mk.zeroize();
                    }
                }
                tracing::debug!("double ratchet: evicted skipped-key generation");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paired_sessions() -> (Session, Session) {
        let shared_key = [42u8; 32];
        let bob_initial_secret = StaticSecret::random_from_rng(OsRng);
        let bob_initial_pub = X25519Public::from(&bob_initial_secret);

        let alice = Session::new_initiator(shared_key, &bob_initial_pub).unwrap();
        let bob = Session::new_responder(shared_key, bob_initial_secret, bob_initial_pub);
        (alice, bob)
    }

    #[test]
    fn ping_pong_round_trip() {
        let (mut alice, mut bob) = paired_sessions();

        for i in 0..3 {
            let (h, ct) = alice.send(format!("hi {i}").as_bytes(), b"aad").unwrap();
            let pt = bob.recv(&h, &ct, b"aad").unwrap();
            assert_eq!(pt, format!("hi {i}").as_bytes());
        }

        for i in 0..2 {
            let (h, ct) = bob.send(format!("yo {i}").as_bytes(), b"aad").unwrap();
            let pt = alice.recv(&h, &ct, b"aad").unwrap();
            assert_eq!(pt, format!("yo {i}").as_bytes());
        }

        let (h, ct) = alice.send(b"once more", b"aad").unwrap();
        let pt = bob.recv(&h, &ct, b"aad").unwrap();
        assert_eq!(pt, b"once more");
    }

    #[test]
    fn out_of_order_delivery() {
        let (mut alice, mut bob) = paired_sessions();

        let (h0, ct0) = alice.send(b"zero", b"aad").unwrap();
        let (h1, ct1) = alice.send(b"one", b"aad").unwrap();
        let (h2, ct2) = alice.send(b"two", b"aad").unwrap();

        assert_eq!(bob.recv(&h2, &ct2, b"aad").unwrap(), b"two");
        assert_eq!(bob.recv(&h0, &ct0, b"aad").unwrap(), b"zero");
        assert_eq!(bob.recv(&h1, &ct1, b"aad").unwrap(), b"one");
    }

    #[test]
    fn dropped_message_does_not_block_later_ones() {
        let (mut alice, mut bob) = paired_sessions();

        let (_h0, _ct0) = alice.send(b"lost", b"aad").unwrap();
        let (h1, ct1) = alice.send(b"delivered", b"aad").unwrap();

        assert_eq!(bob.recv(&h1, &ct1, b"aad").unwrap(), b"delivered");
    }

    #[test]
    fn failed_decrypt_leaves_state_unchanged() {
        let (mut alice, mut bob) = paired_sessions();

        let (h, mut ct) = alice.send(b"tamper me", b"aad").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xFF;

        let recv_n_before = bob.recv_n;
        assert!(bob.recv(&h, &ct, b"aad").is_err());
        assert_eq!(bob.recv_n, recv_n_before, "failed recv must not advance state");

        // A second, untampered message from the same chain still recovers.
        let (h2, ct2) = alice.send(b"still works", b"aad").unwrap();
        assert_eq!(bob.recv(&h2, &ct2, b"aad").unwrap(), b"still works");
    }

    #[test]
    fn forward_secrecy_after_compromise() {
        let (mut alice, mut bob) = paired_sessions();

        let (h0, ct0) = alice.send(b"first secret", b"aad").unwrap();
        bob.recv(&h0, &ct0, b"aad").unwrap();
        let (h1, ct1) = alice.send(b"second secret", b"aad").unwrap();
        bob.recv(&h1, &ct1, b"aad").unwrap();

        // Attacker compromises Bob's full current state. The receiving
        // chain has already advanced past both prior messages and their
        // message keys were used once and erased, so the leaked state
        // cannot be used to re-derive and decrypt them.
        let mut leaked_bob = bob.clone();
        assert!(leaked_bob.recv(&h0, &ct0, b"aad").is_err());
        assert!(leaked_bob.recv(&h1, &ct1, b"aad").is_err());
    }

    #[test]
    fn post_compromise_recovery() {
        let (mut alice, mut bob) = paired_sessions();

        // Attacker compromises Bob's full state before any message flows.
        let leaked_bob = bob.clone();

        // One successful round trip heals the session: Bob's DH ratchet
        // step (triggered on receipt) draws a fresh secret the leaked
        // snapshot never saw.
        let (h, ct) = alice.send(b"heal", b"aad").unwrap();
        assert_eq!(bob.recv(&h, &ct, b"aad").unwrap(), b"heal");
        let (h2, ct2) = bob.send(b"secret reply", b"aad").unwrap();
        assert_eq!(alice.recv(&h2, &ct2, b"aad").unwrap(), b"secret reply");

        // The pre-heal leaked snapshot lacks that fresh secret and cannot
        // decrypt traffic sent after the heal.
        let mut leaked_bob = leaked_bob;
        assert!(leaked_bob.recv(&h2, &ct2, b"aad").is_err());
    }

    #[test]
    fn chain_overflow_is_rejected() {
        let (mut alice, mut bob) = paired_sessions();

        // Prime the receiving chain so skip accounting has a baseline.
        let (h0, ct0) = alice.send(b"first", b"aad").unwrap();
        bob.recv(&h0, &ct0, b"aad").unwrap();

        for _ in 0..(MAX_SKIP_PER_CHAIN + 10) {
            alice.send(b"filler", b"aad").unwrap();
        }
        let (h_far, ct_far) = alice.send(b"far ahead", b"aad").unwrap();

        assert!(matches!(
            bob.recv(&h_far, &ct_far, b"aad"),
            Err(SignalError::ChainTooLong)
        ));
    }
}
