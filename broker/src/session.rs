//! Session recovery shared by the broker clients.

use log::warn;

use crate::error::BrokerError;

/// A broker session that can be dropped and re-established.
pub trait SessionControl {
    fn broker_name(&self) -> &str;

    /// Make sure a usable session exists, authorizing if needed.
    fn establish(&mut self) -> Result<(), BrokerError>;

    /// Forget the current session and its cached token.
    fn invalidate(&mut self) -> Result<(), BrokerError>;
}

/// Run `op`; if the server rejects the session, re-authorize once and retry.
///
/// A second rejection becomes [`BrokerError::Auth`].
pub fn with_reauth<S, T, F>(session: &mut S, mut op: F) -> Result<T, BrokerError>
where
    S: SessionControl,
    F: FnMut(&mut S) -> Result<T, BrokerError>,
{
    match op(session) {
        Err(BrokerError::Unauthorized) => {
            warn!(
                "{}: session rejected, re-authorizing",
                session.broker_name()
            );
            session.invalidate()?;
            session.establish()?;
            op(session).map_err(|e| match e {
                BrokerError::Unauthorized => BrokerError::Auth(format!(
                    "{}: session rejected again after re-authorization",
                    session.broker_name()
                )),
                other => other,
            })
        }
        other => other,
    }
}
