//! OAuth 1.0a request signing (HMAC-SHA1) as E*TRADE expects it.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distributions::Alphanumeric;
use sha1::Sha1;

use crate::error::BrokerError;

type HmacSha1 = Hmac<Sha1>;

/// Credentials and protocol parameters for one signed request.
#[derive(Debug, Clone, Copy)]
pub struct OAuthParams<'a> {
    pub consumer_key: &'a str,
    pub consumer_secret: &'a str,
    /// Request or access token, absent when fetching a request token.
    pub token: Option<&'a str>,
    /// Empty when there is no token yet.
    pub token_secret: &'a str,
    /// Additional protocol parameters such as `oauth_callback` or `oauth_verifier`.
    pub extra: &'a [(&'a str, &'a str)],
}

/// RFC 3986 percent encoding: everything but `A-Z a-z 0-9 - . _ ~`.
pub fn percent_encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Build the signature base string `METHOD&url&params`.
///
/// `params` are raw (unencoded) pairs; they are encoded, sorted and joined here.
pub fn signature_base(method: &str, url: &str, params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();
    let joined = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(url),
        percent_encode(&joined)
    )
}

/// HMAC-SHA1 of `base`, base64 encoded.
pub fn sign(base: &str, consumer_secret: &str, token_secret: &str) -> Result<String, BrokerError> {
    let key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    );
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| BrokerError::Auth(format!("signing key rejected: {e}")))?;
    mac.update(base.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// The `Authorization` header value for a request.
///
/// `query` holds the request's query parameters, which are covered by the
/// signature but not repeated in the header.
pub fn authorization_header(
    method: &str,
    url: &str,
    query: &[(&str, &str)],
    params: &OAuthParams<'_>,
    nonce: &str,
    timestamp: i64,
) -> Result<String, BrokerError> {
    let timestamp = timestamp.to_string();
    let mut protocol: Vec<(String, String)> = vec![
        ("oauth_consumer_key".into(), params.consumer_key.into()),
        ("oauth_nonce".into(), nonce.into()),
        ("oauth_signature_method".into(), "HMAC-SHA1".into()),
        ("oauth_timestamp".into(), timestamp),
        ("oauth_version".into(), "1.0".into()),
    ];
    if let Some(token) = params.token {
        protocol.push(("oauth_token".into(), token.into()));
    }
    protocol.extend(params.extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));

    let mut signed = protocol.clone();
    signed.extend(query.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    let base = signature_base(method, url, &signed);
    let signature = sign(&base, params.consumer_secret, params.token_secret)?;

    protocol.push(("oauth_signature".into(), signature));
    protocol.sort();
    let fields = protocol
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join(",");
    Ok(format!("OAuth realm=\"\",{fields}"))
}

/// Random 32-character alphanumeric nonce.
pub fn nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}
