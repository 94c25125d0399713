//! PKCE verifier/challenge generation (RFC 7636, S256 only).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AuthError;

/// Raw entropy behind the verifier. 32 bytes encode to 43 characters,
/// the minimum verifier length RFC 7636 allows.
const VERIFIER_ENTROPY_BYTES: usize = 32;

/// One authorization attempt's verifier and its derived challenge.
///
/// The verifier never leaves the client; only the challenge is sent to the
/// authorization endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

/// Generate a fresh PKCE pair from the OS CSPRNG.
pub fn generate() -> Result<PkcePair, AuthError> {
    let mut entropy = [0u8; VERIFIER_ENTROPY_BYTES];
    OsRng
        .try_fill_bytes(&mut entropy)
        .map_err(|err| AuthError::RandomSourceUnavailable(err.to_string()))?;
    let verifier = URL_SAFE_NO_PAD.encode(entropy);
    let challenge = challenge_for(&verifier);
    Ok(PkcePair {
        verifier,
        challenge,
    })
}

/// Derive the S256 challenge for a verifier: base64url(SHA-256(verifier)),
/// unpadded.
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
