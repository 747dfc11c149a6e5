//! RFC 6238 time-based one-time codes (HMAC-SHA1)

use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use url::Url;

use crate::error::{Error, Result};

type HmacSha1 = Hmac<Sha1>;

/// Code generation parameters shared by generator and verifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotpParams {
    /// Code length (6..=8)
    pub digits: u32,
    /// Time step in seconds
    pub step_secs: u64,
    /// Accepted steps either side of the current one
    pub skew_steps: u64,
}

impl Default for TotpParams {
    fn default() -> Self {
        Self {
            digits: 6,
            step_secs: 30,
            skew_steps: 1,
        }
    }
}

/// RFC 4226 HOTP value for `counter`
pub fn hotp(key: &[u8], counter: u64, digits: u32) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(key)
        .map_err(|e| Error::InvalidSecret(format!("HMAC key rejected: {}", e)))?;
    mac.update(&counter.to_be_bytes());
    let hash = mac.finalize().into_bytes();

    // Dynamic truncation
    let offset = (hash[hash.len() - 1] & 0x0f) as usize;
    let binary = ((hash[offset] as u32 & 0x7f) << 24)
        | ((hash[offset + 1] as u32) << 16)
        | ((hash[offset + 2] as u32) << 8)
        | (hash[offset + 3] as u32);

    let modulus = 10u32.pow(digits);
    Ok(format!("{:0width$}", binary % modulus, width = digits as usize))
}

/// Time step containing `unix_secs`
pub fn time_step(unix_secs: i64, params: &TotpParams) -> u64 {
    if unix_secs <= 0 {
        return 0;
    }
    unix_secs as u64 / params.step_secs.max(1)
}

/// Code for the step containing `unix_secs`
pub fn code_at(key: &[u8], unix_secs: i64, params: &TotpParams) -> Result<String> {
    hotp(key, time_step(unix_secs, params), params.digits)
}

/// Largest accepted `skew_steps`
pub const MAX_SKEW_STEPS: u64 = 10;

/// Verify `code` against the current step and `skew_steps` either side.
///
/// Malformed codes are rejected without computing anything.
pub fn verify(key: &[u8], code: &str, unix_secs: i64, params: &TotpParams) -> bool {
    let code = code.trim();
    if code.len() != params.digits as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let current = time_step(unix_secs, params);
    let skew = params.skew_steps.min(MAX_SKEW_STEPS);
    let first = current.saturating_sub(skew);
    let last = current.saturating_add(skew);

    let mut matched = false;
    for step in first..=last {
        if let Ok(expected) = hotp(key, step, params.digits) {
            // Check every step so timing does not reveal which one matched
            matched |= bool::from(expected.as_bytes().ct_eq(code.as_bytes()));
        }
    }
    matched
}

/// `otpauth://` provisioning URI for authenticator apps
pub fn provisioning_uri(
    secret_base32: &str,
    label: &str,
    issuer: &str,
    params: &TotpParams,
) -> Result<String> {
    let mut uri = Url::parse("otpauth://totp/")
        .map_err(|e| Error::Internal(format!("Provisioning URI base: {}", e)))?;
    uri.set_path(label);
    uri.query_pairs_mut()
        .append_pair("secret", secret_base32)
        .append_pair("issuer", issuer)
        .append_pair("algorithm", "SHA1")
        .append_pair("digits", &params.digits.to_string())
        .append_pair("period", &params.step_secs.to_string());
    Ok(uri.to_string())
}
