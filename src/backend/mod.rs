pub mod local;
pub mod supabase;

use crate::error::EchoError;

/// Rewords a uniqueness conflict on the username column for display.
pub(crate) fn username_conflict(err: EchoError, username: &str) -> EchoError {
    match err {
        EchoError::Conflict(msg) if msg.contains("username") => {
            EchoError::Conflict(format!("username {username} is already taken"))
        }
        other => other,
    }
}
