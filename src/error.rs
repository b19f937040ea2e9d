use thiserror::Error;

/// Unified error type for the XEdDSA/VXEdDSA, X3DH, and Double Ratchet
/// protocols implemented by this crate.
///
/// No variant carries secret key material — only lengths, counters, and
/// opaque identifiers — so these errors are safe to log as-is.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("expected {expected}-byte value, got {actual}")]
    BadLength { expected: usize, actual: usize },

    #[error("point decoding failed")]
    BadPoint,

    #[error("signature verification failed")]
    BadSignature,

    #[error("signed prekey signature verification failed")]
    BadPrekeySignature,

    #[error("VXEdDSA proof verification failed")]
    BadProof,

    #[error("referenced one-time prekey is unknown or already consumed")]
    UnknownOPK,

    #[error("prekey bundle is missing a required prekey")]
    MissingPrekey,

    #[error("key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("AEAD decryption failed (authentication tag mismatch)")]
    DecryptFailed,

    #[error("AEAD encryption failed")]
    EncryptFailed,

    #[error("skipped-message chain exceeded the maximum skip count")]
    ChainTooLong,

    #[error("session is not ready for this operation: {0}")]
    SessionState(String),

    #[error("serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

pub type Result<T> = std::result::Result<T, SignalError>;
