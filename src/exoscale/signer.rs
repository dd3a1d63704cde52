//! `EXO2-HMAC-SHA256` request signatures.
//!
//! The signed message joins the request line, the body, the values of the
//! signed query arguments (in key order), an empty header section, and the
//! expiry timestamp with newlines. The signature is the base64-encoded
//! HMAC-SHA256 of that message keyed by the API secret.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::compute::{ApiError, Credentials};

const SCHEME: &str = "EXO2-HMAC-SHA256";
/// Validity window of a signature.
pub const SIGNATURE_TTL: Duration = Duration::from_secs(600);

/// Request parts covered by the signature.
#[derive(Clone, Copy, Debug)]
pub struct SignedRequest<'a> {
    /// Upper-case HTTP method.
    pub method: &'a str,
    /// URL path, including the API version prefix.
    pub path: &'a str,
    /// Raw request body.
    pub body: &'a str,
    /// Query arguments.
    pub query: &'a [(&'a str, &'a str)],
}

impl SignedRequest<'_> {
    /// Returns the message that is signed for an expiry of `expires`.
    #[must_use]
    pub fn string_to_sign(&self, expires: u64) -> String {
        let values: String = self.sorted_query().iter().map(|(_, value)| *value).collect();
        format!(
            "{} {}\n{}\n{}\n\n{}",
            self.method, self.path, self.body, values, expires
        )
    }

    fn sorted_query(&self) -> Vec<(&str, &str)> {
        let mut query = self.query.to_vec();
        query.sort_unstable_by(|left, right| left.0.cmp(right.0));
        query
    }
}

/// Builds the `Authorization` header value for `request`.
///
/// # Errors
///
/// Returns [`ApiError::Signing`] when the secret cannot key the MAC.
pub fn authorization(
    credentials: &Credentials,
    request: &SignedRequest<'_>,
    expires: u64,
) -> Result<String, ApiError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(credentials.secret.as_bytes()).map_err(|err| {
        ApiError::Signing {
            message: err.to_string(),
        }
    })?;
    mac.update(request.string_to_sign(expires).as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    let query = request.sorted_query();
    let signed_args = if query.is_empty() {
        String::new()
    } else {
        let keys: Vec<&str> = query.iter().map(|(key, _)| *key).collect();
        format!(",signed-query-args={}", keys.join(";"))
    };
    Ok(format!(
        "{SCHEME} credential={}{signed_args},expires={expires},signature={signature}",
        credentials.key
    ))
}

/// Returns the expiry timestamp for a signature created now.
///
/// # Errors
///
/// Returns [`ApiError::Signing`] when the system clock is before the Unix
/// epoch.
pub fn expiry_from_now() -> Result<u64, ApiError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| ApiError::Signing {
            message: err.to_string(),
        })?;
    Ok((now + SIGNATURE_TTL).as_secs())
}
