//! Opening OS-encrypted Chromium cookie values.
//!
//! Chromium browsers keep cookie values in `encrypted_value`, prefixed
//! with a scheme tag:
//!
//! - `v10` on Linux: AES-128-CBC with the fixed "peanuts" key
//! - `v11` on Linux: AES-128-CBC with a key derived from the keyring secret
//! - `v10` on macOS: AES-128-CBC with a key derived from the Keychain secret
//! - `v10` on Windows: AES-256-GCM with the DPAPI-protected key in `Local State`
//! - `v20` on Windows: app-bound encryption, which only the browser can open
//!
//! Keys are fetched from the OS lazily, the first time a value needs them,
//! so stores that hold plaintext values never touch the keyring.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "windows")]
mod windows;

use super::Browser;
use crate::error::DecryptError;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, KeyIvInit};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use std::cell::OnceCell;
use std::path::{Path, PathBuf};

/// Salt Chromium uses for every PBKDF2 key derivation.
const SALT: &[u8] = b"saltysalt";

/// CBC initialisation vector: sixteen spaces.
const CBC_IV: [u8; 16] = [b' '; 16];

/// AES-GCM nonce length of Windows `v10` values.
const GCM_NONCE_LEN: usize = 12;

/// Newer stores prefix each plaintext with the SHA-256 of its host.
pub const HOST_DIGEST_LEN: usize = 32;

/// First store schema version that carries the host digest.
pub const HOST_DIGEST_SCHEMA_VERSION: i64 = 24;

/// `PBKDF2-HMAC-SHA1("peanuts", "saltysalt", 1)`, the Linux `v10` key.
pub const PEANUTS_KEY: [u8; 16] = [
    0xfd, 0x62, 0x1f, 0xe5, 0xa2, 0xb4, 0x02, 0x53, 0x9d, 0xfa, 0x14, 0x7c, 0xa9, 0x27, 0x27, 0x78,
];

/// Key Chromium falls back to when the keyring hands out an empty secret.
pub const EMPTY_PASSWORD_KEY: [u8; 16] = [
    0xd0, 0xd0, 0xec, 0x9c, 0x7d, 0x77, 0xd4, 0x3a, 0xc5, 0x41, 0x87, 0xfa, 0x48, 0x18, 0xd1, 0x7f,
];

/// Scheme tag at the start of an encrypted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    V10,
    V11,
    V20,
}

impl Scheme {
    /// Splits the tag off `blob`; `None` for untagged values.
    pub fn split(blob: &[u8]) -> Option<(Self, &[u8])> {
        let (tag, rest) = blob.split_at_checked(3)?;
        let scheme = match tag {
            b"v10" => Scheme::V10,
            b"v11" => Scheme::V11,
            b"v20" => Scheme::V20,
            _ => return None,
        };
        Some((scheme, rest))
    }
}

/// A symmetric key for cookie values.
#[derive(Clone, PartialEq, Eq)]
pub enum CipherKey {
    /// AES-128-CBC, Linux and macOS.
    Cbc([u8; 16]),
    /// AES-256-GCM, Windows.
    Gcm([u8; 32]),
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CipherKey::Cbc(_) => f.write_str("CipherKey::Cbc(..)"),
            CipherKey::Gcm(_) => f.write_str("CipherKey::Gcm(..)"),
        }
    }
}

impl CipherKey {
    /// Decrypts a value with its scheme tag already removed.
    fn open(&self, body: &[u8]) -> Option<Vec<u8>> {
        match self {
            CipherKey::Cbc(key) => cbc::Decryptor::<aes::Aes128>::new(key.into(), &CBC_IV.into())
                .decrypt_padded_vec_mut::<Pkcs7>(body)
                .ok(),
            CipherKey::Gcm(key) => {
                let (nonce, sealed) = body.split_at_checked(GCM_NONCE_LEN)?;
                let cipher = Aes256Gcm::new_from_slice(key).ok()?;
                cipher.decrypt(Nonce::from_slice(nonce), sealed).ok()
            }
        }
    }
}

/// `PBKDF2-HMAC-SHA1` with Chromium's salt.
pub fn derive_key(password: &[u8], iterations: u32) -> [u8; 16] {
    pbkdf2::pbkdf2_hmac_array::<sha1::Sha1, 16>(password, SALT, iterations)
}

type KeyCache = OnceCell<Result<Vec<CipherKey>, DecryptError>>;

enum KeySource {
    /// Ask the operating system for the browser's key.
    System {
        browser: Browser,
        user_data: Option<PathBuf>,
    },
    Fixed {
        v10: Vec<CipherKey>,
        v11: Vec<CipherKey>,
    },
}

/// Decrypts the values of one cookie store.
pub struct Decryptor {
    source: KeySource,
    v10: KeyCache,
    v11: KeyCache,
}

impl Decryptor {
    /// Uses the keys the OS holds for `browser`, whose store lives at `store`.
    pub fn system(browser: Browser, store: &Path) -> Self {
        Self::from_source(KeySource::System {
            browser,
            user_data: user_data_dir(store),
        })
    }

    /// Uses fixed keys per scheme, whatever the platform.
    pub fn with_keys(v10: Vec<CipherKey>, v11: Vec<CipherKey>) -> Self {
        Self::from_source(KeySource::Fixed { v10, v11 })
    }

    fn from_source(source: KeySource) -> Self {
        Self {
            source,
            v10: OnceCell::new(),
            v11: OnceCell::new(),
        }
    }

    /// Opens one `encrypted_value`, dropping the host digest when the store has one.
    pub fn decrypt(&self, blob: &[u8], host_digest: bool) -> Result<String, DecryptError> {
        let plaintext = match Scheme::split(blob) {
            Some((Scheme::V20, _)) => {
                return Err(DecryptError::Unsupported(
                    "v20 app-bound encryption can only be opened by the browser".to_string(),
                ));
            }
            Some((scheme, body)) => self
                .keys(scheme)?
                .iter()
                .find_map(|key| key.open(body))
                .ok_or(DecryptError::WrongKey)?,
            None => unprotect_untagged(blob)?,
        };

        let plaintext = if host_digest && plaintext.len() >= HOST_DIGEST_LEN {
            &plaintext[HOST_DIGEST_LEN..]
        } else {
            &plaintext[..]
        };
        String::from_utf8(plaintext.to_vec()).map_err(|_| DecryptError::NotUtf8)
    }

    fn keys(&self, scheme: Scheme) -> Result<&[CipherKey], DecryptError> {
        let cache = match scheme {
            Scheme::V11 => &self.v11,
            _ => &self.v10,
        };
        cache
            .get_or_init(|| self.load(scheme))
            .as_deref()
            .map_err(Clone::clone)
    }

    fn load(&self, scheme: Scheme) -> Result<Vec<CipherKey>, DecryptError> {
        match &self.source {
            KeySource::Fixed { v10, v11 } => Ok(match scheme {
                Scheme::V11 => v11.clone(),
                _ => v10.clone(),
            }),
            KeySource::System { browser, user_data } => {
                tracing::debug!("fetching {} cookie key for {:?}", browser, scheme);
                system_keys(*browser, scheme, user_data.as_deref())
            }
        }
    }
}

/// The `User Data` directory above a store: the nearest one holding `Local State`.
pub fn user_data_dir(store: &Path) -> Option<PathBuf> {
    store
        .ancestors()
        .skip(1)
        .find(|dir| dir.join("Local State").is_file())
        .map(Path::to_path_buf)
}

#[cfg(target_os = "linux")]
fn system_keys(
    browser: Browser,
    scheme: Scheme,
    _user_data: Option<&Path>,
) -> Result<Vec<CipherKey>, DecryptError> {
    match scheme {
        Scheme::V11 => {
            let mut keys = Vec::new();
            if let Some(secret) = linux::keyring_secret(browser)? {
                keys.push(CipherKey::Cbc(derive_key(&secret, 1)));
            }
            keys.push(CipherKey::Cbc(EMPTY_PASSWORD_KEY));
            Ok(keys)
        }
        _ => Ok(vec![CipherKey::Cbc(PEANUTS_KEY)]),
    }
}

#[cfg(target_os = "macos")]
fn system_keys(
    browser: Browser,
    _scheme: Scheme,
    _user_data: Option<&Path>,
) -> Result<Vec<CipherKey>, DecryptError> {
    let secret = macos::keychain_secret(browser)?;
    Ok(vec![CipherKey::Cbc(derive_key(&secret, 1003))])
}

#[cfg(target_os = "windows")]
fn system_keys(
    _browser: Browser,
    scheme: Scheme,
    user_data: Option<&Path>,
) -> Result<Vec<CipherKey>, DecryptError> {
    if scheme == Scheme::V11 {
        return Err(DecryptError::Unsupported("v11 values on Windows".to_string()));
    }
    let user_data = user_data.ok_or_else(|| {
        DecryptError::KeyUnavailable("no Local State next to the cookie store".to_string())
    })?;
    Ok(vec![CipherKey::Gcm(windows::local_state_key(user_data)?)])
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn system_keys(
    _browser: Browser,
    _scheme: Scheme,
    _user_data: Option<&Path>,
) -> Result<Vec<CipherKey>, DecryptError> {
    Err(DecryptError::KeyUnavailable(
        "no key store on this platform".to_string(),
    ))
}

/// Untagged values predate the scheme tags; only Windows (raw DPAPI) has them.
#[cfg(target_os = "windows")]
fn unprotect_untagged(blob: &[u8]) -> Result<Vec<u8>, DecryptError> {
    windows::unprotect(blob)
}

#[cfg(not(target_os = "windows"))]
fn unprotect_untagged(_blob: &[u8]) -> Result<Vec<u8>, DecryptError> {
    Err(DecryptError::Unsupported("untagged encrypted value".to_string()))
}

#[cfg(test)]
pub(crate) mod seal {
    use super::*;
    use aes::cipher::BlockEncryptMut;

    /// Encrypts `plaintext` the way Chromium does on Linux and macOS.
    pub fn cbc(tag: &[u8], key: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
        let sealed = cbc::Encryptor::<aes::Aes128>::new(key.into(), &CBC_IV.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
        [tag, &sealed].concat()
    }
}
