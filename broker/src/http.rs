//! Response checks shared by the REST clients.

use reqwest::StatusCode;
use reqwest::blocking::Response;

use crate::error::BrokerError;

/// Map non-success statuses to errors and return the body text.
///
/// `None` for 204 No Content.
pub(crate) fn body(resp: Response, what: &'static str) -> Result<Option<String>, BrokerError> {
    let status = resp.status();
    match status {
        StatusCode::UNAUTHORIZED => return Err(BrokerError::Unauthorized),
        StatusCode::TOO_MANY_REQUESTS => return Err(BrokerError::RateLimit),
        StatusCode::NO_CONTENT => return Ok(None),
        _ => {}
    }

    let text = resp
        .text()
        .map_err(|e| BrokerError::Connection(format!("{what}: reading body failed: {e}")))?;
    if !status.is_success() {
        return Err(BrokerError::Http {
            status: status.as_u16(),
            body: text,
        });
    }
    Ok(Some(text))
}

/// Like [`body`] but an empty response is a parse error.
pub(crate) fn require_body(resp: Response, what: &'static str) -> Result<String, BrokerError> {
    body(resp, what)?.ok_or_else(|| BrokerError::parse(what, "empty response"))
}

pub(crate) fn send_error(what: &'static str, err: reqwest::Error) -> BrokerError {
    BrokerError::Connection(format!("{what} request failed: {err}"))
}
