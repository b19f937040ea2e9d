//! The single X25519 Diffie-Hellman primitive every other component builds
//! on: `X25519(scalar, point) -> point`, constant-time, rejecting the
//! degenerate all-zero (non-contributory) output so a peer cannot hand over
//! a low-order public key and force every session onto a fixed shared
//! secret.

use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::error::{Result, SignalError};

/// Compute `secret · public` and reject it if the result is the all-zero
/// output a low-order (small-subgroup or identity) public key produces.
pub(crate) fn diffie_hellman(secret: &StaticSecret, public: &X25519Public) -> Result<[u8; 32]> {
    let shared = secret.diffie_hellman(public);
    if !shared.was_contributory() {
        return Err(SignalError::BadPoint);
    }
    Ok(*shared.as_bytes())
}
