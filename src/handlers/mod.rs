pub mod admin;
pub mod availability;
pub mod booking;
pub mod health;

use crate::state::AppState;

/// Notification sends happen after the transaction committed; a failure is
/// logged and swallowed and never unwinds the state transition.
pub(crate) async fn notify(state: &AppState, to: &str, subject: &str, body: &str) {
    if let Err(e) = state.notifier.send(to, subject, body).await {
        tracing::error!(error = %e, to = %to, "failed to send notification");
    }
}
