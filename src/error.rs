use crate::state::StateError;

/// Conditions that stop the daemon.
///
/// Anything returned as `Fatal` has already been logged with its host or
/// provider; the control loop only has to exit with a failure status.
#[derive(Debug, thiserror::Error)]
pub enum Fatal {
    /// The provider rejected the account, client or request as a whole.
    #[error("{host}: provider returned [{token}]: {reason}")]
    Provider {
        host: String,
        token: &'static str,
        reason: &'static str,
    },

    /// A transport failure that retrying will not fix.
    #[error("update failed with a fatal transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    State(#[from] StateError),

    /// A configured value would produce an unreasonably large request.
    #[error("{what} is {len} bytes, larger than the {max} byte limit")]
    Oversized {
        what: &'static str,
        len: usize,
        max: usize,
    },
}
