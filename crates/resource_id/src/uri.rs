//! QuakeML resource URI formatting
//!
//! A standard resource URI looks like `smi:authority.org/event/1234` or
//! `quakeml:authority.org/pick/abc`: a scheme, an authority of at least three
//! characters, a single `/`, and a resource path with a wider character set.

use crate::errors::{ResourceIdError, Result};
use crate::types::fresh_token;
use once_cell::sync::Lazy;
use regex::Regex;

pub const STANDARD_URI_PATTERN: &str = r"^(smi|quakeml):[\w\d][\w\d\-\.\*\(\)_~']{2,}/[\w\d\-\.\*\(\)_~'][\w\d\-\.\*\(\)\+\?_~'=,;#/&]*$";

static STANDARD_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(STANDARD_URI_PATTERN).expect("standard URI pattern compiles"));

pub fn is_standard_uri(id: &str) -> bool {
    STANDARD_URI.is_match(id)
}

/// Format `id` as a standard resource URI under `authority`.
///
/// A conforming id is returned unchanged; anything else is prefixed with
/// `smi:{authority}/`. A blank id is replaced by a fresh token first.
pub fn standardize(id: &str, authority: &str) -> Result<String> {
    let id = if id.trim().is_empty() {
        fresh_token()
    } else {
        id.to_owned()
    };
    if is_standard_uri(&id) {
        return Ok(id);
    }

    let candidate = format!("smi:{authority}/{id}");
    if is_standard_uri(&candidate) {
        Ok(candidate)
    } else {
        Err(ResourceIdError::InvalidUri { id, candidate })
    }
}
