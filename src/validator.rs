//! Format checks for the two credential fields.
//!
//! Pure classification: odd input lands in [`IdShape::Invalid`] instead of
//! producing an error.

use crate::error::ValidationMismatch;
use crate::record::DeviceRecord;
use regex::Regex;
use std::sync::LazyLock;

static CANONICAL_UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-fA-F0-9]{8}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{12}$")
        .expect("Invalid CANONICAL_UUID regex")
});

static BARE_HEX32: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-fA-F0-9]{32}$").expect("Invalid BARE_HEX32 regex"));

static LOOSE_ALNUM_DASHED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9-]{20,50}$").expect("Invalid LOOSE_ALNUM_DASHED regex")
});

static USER_IDX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{6,15}$").expect("Invalid USER_IDX regex"));

/// Recognised shapes of a device identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdShape {
    /// `8-4-4-4-12` hex with dashes.
    CanonicalUuid,
    /// 32 contiguous hex digits.
    BareHex32,
    /// 20 to 50 alphanumerics and dashes, with at least one dash.
    LooseAlnumDashed,
    Invalid,
}

impl IdShape {
    pub fn is_valid(self) -> bool {
        self != IdShape::Invalid
    }

    pub fn describe(self) -> &'static str {
        match self {
            IdShape::CanonicalUuid => "UUID",
            IdShape::BareHex32 => "32-digit hex",
            IdShape::LooseAlnumDashed => "dashed alphanumeric",
            IdShape::Invalid => "unrecognised",
        }
    }
}

/// Classifies a device identifier, trying the strictest shape first.
pub fn classify(id: &str) -> IdShape {
    if CANONICAL_UUID.is_match(id) {
        IdShape::CanonicalUuid
    } else if BARE_HEX32.is_match(id) {
        IdShape::BareHex32
    } else if LOOSE_ALNUM_DASHED.is_match(id) && id.contains('-') {
        IdShape::LooseAlnumDashed
    } else {
        IdShape::Invalid
    }
}

/// True iff `s` is 6 to 15 ASCII digits.
pub fn validate_user_idx(s: &str) -> bool {
    USER_IDX.is_match(s)
}

/// Checks both fields of a record.
pub fn check(record: &DeviceRecord) -> Result<IdShape, ValidationMismatch> {
    let shape = classify(&record.device_id);
    let user_idx_ok = validate_user_idx(&record.user_idx);
    if shape.is_valid() && user_idx_ok {
        Ok(shape)
    } else {
        Err(ValidationMismatch {
            device_id_ok: shape.is_valid(),
            user_idx_ok,
        })
    }
}
