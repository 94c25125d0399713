//! Machine-derived encryption-at-rest for the file-backed session store.
//!
//! Values are sealed with a random data key (DEK) that is itself wrapped by
//! a key derived from host identity material, so the store file is only
//! readable on the machine that wrote it.

use aes_gcm_siv::aead::{Aead, KeyInit};
use aes_gcm_siv::{Aes256GcmSiv, Nonce};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use rand::RngCore;
use scrypt::{scrypt, Params as ScryptParams};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::error::AuthError;

pub(crate) const SEALED_STORE_VERSION: u32 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const MACHINE_KEY_CONTEXT: &str = "authflow-session-kek-v1";

/// On-disk shape of the sealed store file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct SealedStore {
    #[serde(default)]
    pub(crate) version: u32,
    #[serde(default)]
    pub(crate) encryption: SealEnvelope,
    #[serde(default)]
    pub(crate) entries: BTreeMap<String, SealedValue>,
}

/// Wrapped data-key material for one store file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct SealEnvelope {
    #[serde(default)]
    pub(crate) salt: String,
    #[serde(default)]
    pub(crate) dek_nonce: String,
    #[serde(default)]
    pub(crate) dek_sealed: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct SealedValue {
    #[serde(default)]
    pub(crate) nonce: String,
    #[serde(default)]
    pub(crate) ciphertext: String,
}

/// Seal a plaintext key-value map into the on-disk format.
pub(crate) fn seal_store(entries: &BTreeMap<String, String>) -> Result<SealedStore, AuthError> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let kek = derive_machine_kek(&salt)?;

    let mut dek = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut dek);
    let (dek_nonce, dek_sealed) = seal_bytes(&kek, &dek)?;

    let mut sealed_entries = BTreeMap::new();
    for (key, value) in entries {
        let (nonce, ciphertext) = seal_bytes(&dek, value.as_bytes())?;
        sealed_entries.insert(
            key.clone(),
            SealedValue {
                nonce: B64.encode(nonce),
                ciphertext: B64.encode(ciphertext),
            },
        );
    }

    Ok(SealedStore {
        version: SEALED_STORE_VERSION,
        encryption: SealEnvelope {
            salt: B64.encode(salt),
            dek_nonce: B64.encode(dek_nonce),
            dek_sealed: B64.encode(dek_sealed),
        },
        entries: sealed_entries,
    })
}

/// Unseal an on-disk store back into plaintext entries.
pub(crate) fn open_store(sealed: &SealedStore) -> Result<BTreeMap<String, String>, AuthError> {
    let salt = decode_field::<SALT_LEN>(&sealed.encryption.salt, "salt")?;
    let kek = derive_machine_kek(&salt)?;
    let dek_nonce = decode_field::<NONCE_LEN>(&sealed.encryption.dek_nonce, "dek_nonce")?;
    let dek_sealed = B64
        .decode(&sealed.encryption.dek_sealed)
        .map_err(|err| AuthError::Invalid(format!("bad session store field `dek_sealed`: {err}")))?;
    let dek_raw = open_bytes(&kek, &dek_nonce, &dek_sealed).map_err(|_| {
        AuthError::Invalid(
            "failed to decrypt session store key (machine identity may have changed)".to_string(),
        )
    })?;
    let dek: [u8; KEY_LEN] = dek_raw
        .try_into()
        .map_err(|_| AuthError::Invalid("invalid session store key material".to_string()))?;

    let mut entries = BTreeMap::new();
    for (key, value) in &sealed.entries {
        let nonce = decode_field::<NONCE_LEN>(&value.nonce, "nonce")?;
        let ciphertext = B64.decode(&value.ciphertext).map_err(|err| {
            AuthError::Invalid(format!("bad session store entry `{key}`: {err}"))
        })?;
        let plaintext = open_bytes(&dek, &nonce, &ciphertext).map_err(|_| {
            AuthError::Invalid(format!("failed to decrypt session store entry `{key}`"))
        })?;
        let text = String::from_utf8(plaintext).map_err(|_| {
            AuthError::Invalid(format!("session store entry `{key}` is not utf-8"))
        })?;
        entries.insert(key.clone(), text);
    }
    Ok(entries)
}

/// Derive the key-encryption key from host identity material and a salt.
fn derive_machine_kek(salt: &[u8; SALT_LEN]) -> Result<[u8; KEY_LEN], AuthError> {
    let mut hasher = Sha256::new();
    hasher.update(MACHINE_KEY_CONTEXT.as_bytes());
    hasher.update(machine_identity_material());
    hasher.update(salt);
    let seed = hasher.finalize();

    let params = ScryptParams::recommended();
    let mut key = [0u8; KEY_LEN];
    scrypt(&seed, salt, &params, &mut key)
        .map_err(|err| AuthError::Invalid(format!("failed to derive session store key: {err}")))?;
    Ok(key)
}

/// Stable per-host material: OS, hostname, user, home, machine id.
fn machine_identity_material() -> Vec<u8> {
    let host = hostname::get()
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown-host".to_string());
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown-user".to_string());
    let home = dirs::home_dir()
        .map(|path| path.display().to_string())
        .unwrap_or_default();
    format!(
        "os={}|host={host}|user={user}|home={home}|machine_id={}",
        std::env::consts::OS,
        read_machine_id().unwrap_or_default()
    )
    .into_bytes()
}

fn read_machine_id() -> Option<String> {
    for path in ["/etc/machine-id", "/var/lib/dbus/machine-id", "/etc/hostid"] {
        if let Ok(value) = std::fs::read_to_string(path) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

fn seal_bytes(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), AuthError> {
    let cipher = Aes256GcmSiv::new_from_slice(key)
        .map_err(|_| AuthError::Invalid("invalid encryption key length".to_string()))?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| AuthError::Invalid("failed to encrypt session store data".to_string()))?;
    Ok((nonce.to_vec(), ciphertext))
}

fn open_bytes(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>, AuthError> {
    let cipher = Aes256GcmSiv::new_from_slice(key)
        .map_err(|_| AuthError::Invalid("invalid encryption key length".to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| AuthError::Invalid("failed to decrypt session store data".to_string()))
}

fn decode_field<const N: usize>(value: &str, field: &str) -> Result<[u8; N], AuthError> {
    let bytes = B64
        .decode(value)
        .map_err(|err| AuthError::Invalid(format!("bad session store field `{field}`: {err}")))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        AuthError::Invalid(format!(
            "bad session store field `{field}` length: expected {N}, got {}",
            bytes.len()
        ))
    })
}
