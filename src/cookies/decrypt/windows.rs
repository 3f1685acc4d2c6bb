//! DPAPI: the `Local State` master key and legacy untagged values.

use crate::error::DecryptError;
use base64::Engine;
use std::path::Path;
use windows::Win32::Foundation::HLOCAL;
use windows::Win32::Security::Cryptography::{CRYPT_INTEGER_BLOB, CryptUnprotectData};
use windows::Win32::System::Memory::LocalFree;

const DPAPI_PREFIX: &[u8] = b"DPAPI";

/// Reads and unwraps `os_crypt.encrypted_key` from `<user_data>/Local State`.
pub fn local_state_key(user_data: &Path) -> Result<[u8; 32], DecryptError> {
    let invalid = |what: &str| DecryptError::KeyUnavailable(format!("Local State: {}", what));

    let text = std::fs::read_to_string(user_data.join("Local State"))
        .map_err(|e| DecryptError::KeyUnavailable(format!("Local State: {}", e)))?;
    let json: serde_json::Value = serde_json::from_str(&text).map_err(|_| invalid("not JSON"))?;
    let encoded = json
        .pointer("/os_crypt/encrypted_key")
        .and_then(|v| v.as_str())
        .ok_or_else(|| invalid("no os_crypt.encrypted_key"))?;
    let wrapped = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| invalid("encrypted_key is not base64"))?;
    let wrapped = wrapped
        .strip_prefix(DPAPI_PREFIX)
        .ok_or_else(|| invalid("encrypted_key lacks the DPAPI prefix"))?;

    unprotect(wrapped)?
        .try_into()
        .map_err(|_| invalid("unexpected key length"))
}

/// `CryptUnprotectData` for the current user.
pub fn unprotect(data: &[u8]) -> Result<Vec<u8>, DecryptError> {
    let input = CRYPT_INTEGER_BLOB {
        cbData: data.len() as u32,
        pbData: data.as_ptr() as *mut u8,
    };
    let mut output = CRYPT_INTEGER_BLOB::default();

    // SAFETY: `input` borrows `data` for the call; `output` is allocated by
    // the system and released with `LocalFree` after copying.
    unsafe {
        CryptUnprotectData(&input, None, None, None, None, 0, &mut output)
            .map_err(|e| DecryptError::KeyUnavailable(format!("DPAPI: {}", e)))?;
        let plain = std::slice::from_raw_parts(output.pbData, output.cbData as usize).to_vec();
        let _ = LocalFree(HLOCAL(output.pbData as *mut _));
        Ok(plain)
    }
}
