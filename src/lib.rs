//! signal-core-protocols — XEdDSA/VXEdDSA, X3DH, and the Double Ratchet.
//!
//! # Design principles
//! - No custom curve arithmetic where an audited crate already provides it;
//!   VXEdDSA is the one exception, since no crate implements it.
//! - Zeroize all secret material on drop.
//! - No transport, no persistence, no group messaging — callers own those.
//!
//! # Module layout
//! - `identity` — long-term X25519 identity key, signed prekeys, one-time prekeys
//! - `xeddsa`   — XEdDSA sign/verify, VXEdDSA prove/verify-and-hash
//! - `x3dh`     — asynchronous key agreement (prekey bundles, initiator/responder)
//! - `ratchet`  — the Double Ratchet session state machine
//! - `framing`  — fixed-width binary wire encodings
//! - `aead`     — AES-256-GCM encrypt/decrypt helpers
//! - `kdf`      — HKDF-SHA-256 / HMAC-SHA-256 key derivation
//! - `dh`       — the checked X25519 Diffie-Hellman primitive
//! - `error`    — unified error type

pub mod aead;
mod dh;
pub mod error;
pub mod framing;
pub mod identity;
pub mod kdf;
pub mod ratchet;
pub mod x3dh;
pub mod xeddsa;

pub use error::SignalError;
