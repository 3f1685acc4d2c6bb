//! Read-only queries against browser cookie databases.
//!
//! The live database is never opened. It is copied, along with its WAL
//! sidecar, into a private scratch directory that is removed when the
//! read returns, on success and on every error path.

use super::CookieJar;
use super::browser::Schema;
use super::decrypt::{Decryptor, HOST_DIGEST_SCHEMA_VERSION};
use crate::error::{CookieStoreError, DecryptError};
use rusqlite::{Connection, OpenFlags, params};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Microseconds between 1601-01-01 and 1970-01-01.
pub const CHROME_EPOCH_OFFSET_MICROS: i64 = 11_644_473_600_000_000;

/// Firefox expiry values above this are milliseconds, not seconds.
const FIREFOX_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Prefix of the per-read scratch directory.
pub const SCRATCH_PREFIX: &str = "ridikey-cookies-";

const CHROMIUM_QUERY: &str = "SELECT name, value, encrypted_value, expires_utc FROM cookies
     WHERE host_key LIKE ?1 ORDER BY name";

const FIREFOX_QUERY: &str =
    "SELECT name, value, NULL, expiry FROM moz_cookies WHERE host LIKE ?1 ORDER BY name";

const CHROMIUM_VERSION_QUERY: &str =
    "SELECT CAST(value AS INTEGER) FROM meta WHERE key = 'version'";

/// Reads live cookies whose host contains `domain` from the store at `path`.
pub fn read_store(
    path: &Path,
    schema: Schema,
    domain: &str,
    now_unix: i64,
    decryptor: &Decryptor,
) -> Result<CookieJar, CookieStoreError> {
    read_store_in(&std::env::temp_dir(), path, schema, domain, now_unix, decryptor)
}

/// [`read_store`] with the scratch copy placed under `scratch_root`.
pub fn read_store_in(
    scratch_root: &Path,
    path: &Path,
    schema: Schema,
    domain: &str,
    now_unix: i64,
    decryptor: &Decryptor,
) -> Result<CookieJar, CookieStoreError> {
    // Declared first so it is dropped last, after the connection closes.
    let scratch = tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempdir_in(scratch_root)
        .map_err(|e| CookieStoreError::StoreUnreadable(format!("scratch dir: {}", e)))?;

    let copy = scratch.path().join("cookies.sqlite");
    std::fs::copy(path, &copy).map_err(|e| {
        CookieStoreError::StoreUnreadable(format!("cannot copy {}: {}", path.display(), e))
    })?;

    let wal = sidecar(path, "-wal");
    if wal.is_file() {
        // A missing WAL only costs the most recent writes.
        if let Err(e) = std::fs::copy(&wal, sidecar(&copy, "-wal")) {
            tracing::debug!("skipping WAL sidecar of {}: {}", path.display(), e);
        }
    }

    let conn = Connection::open_with_flags(
        &copy,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    query_jar(&conn, schema, domain, now_unix, decryptor)
}

fn query_jar(
    conn: &Connection,
    schema: Schema,
    domain: &str,
    now_unix: i64,
    decryptor: &Decryptor,
) -> Result<CookieJar, CookieStoreError> {
    let (query, expiry_to_unix): (&str, fn(i64) -> Option<i64>) = match schema {
        Schema::Chromium => (CHROMIUM_QUERY, chrome_expiry_to_unix),
        Schema::Firefox => (FIREFOX_QUERY, firefox_expiry_to_unix),
    };
    let host_digest = schema == Schema::Chromium
        && chromium_schema_version(conn) >= HOST_DIGEST_SCHEMA_VERSION;

    let mut stmt = conn.prepare(query)?;
    let rows = stmt.query_map(params![format!("%{}%", domain)], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, Option<Vec<u8>>>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;

    let mut jar = CookieJar::default();
    let mut skipped = 0;
    let mut last_failure: Option<DecryptError> = None;

    for row in rows {
        let (name, value, encrypted, expiry) = row?;

        let live = match expiry_to_unix(expiry) {
            Some(expires_at) => expires_at > now_unix,
            None => true,
        };
        if !live {
            continue;
        }

        let value = match (value, encrypted) {
            (Some(value), _) if !value.is_empty() => value,
            (_, Some(blob)) if !blob.is_empty() => match decryptor.decrypt(&blob, host_digest) {
                Ok(value) => value,
                Err(e) => {
                    tracing::debug!("cannot decrypt cookie {}: {}", name, e);
                    skipped += 1;
                    last_failure = Some(e);
                    continue;
                }
            },
            _ => continue,
        };
        if !value.is_empty() {
            jar.insert(name, value);
        }
    }

    match last_failure {
        Some(reason) if jar.is_empty() => Err(CookieStoreError::Undecryptable { skipped, reason }),
        _ if jar.is_empty() => Err(CookieStoreError::NoMatchingCookies(domain.to_string())),
        Some(reason) => {
            tracing::warn!(
                "{} cookie(s) for {} could not be decrypted and were skipped: {}",
                skipped,
                domain,
                reason
            );
            Ok(jar)
        }
        None => Ok(jar),
    }
}

/// `meta.version` of a Chromium store; 0 when the table is missing.
fn chromium_schema_version(conn: &Connection) -> i64 {
    conn.query_row(CHROMIUM_VERSION_QUERY, [], |row| row.get::<_, i64>(0))
        .unwrap_or(0)
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Chromium expiry to Unix seconds; `None` for session cookies.
pub fn chrome_expiry_to_unix(expires_utc: i64) -> Option<i64> {
    if expires_utc == 0 {
        return None;
    }
    Some((expires_utc - CHROME_EPOCH_OFFSET_MICROS) / 1_000_000)
}

/// Firefox expiry to Unix seconds; `None` for session cookies.
pub fn firefox_expiry_to_unix(expiry: i64) -> Option<i64> {
    if expiry <= 0 {
        return None;
    }
    if expiry > FIREFOX_MILLIS_THRESHOLD {
        Some(expiry / 1000)
    } else {
        Some(expiry)
    }
}
