//! Commit-or-rollback tail shared by the transactional handlers.

use crate::domain::membership::SubscriptionError;
use crate::ports::SubscriptionTransaction;

/// Commits on success; rolls back and returns the original error otherwise.
///
/// A failed rollback is only logged: the connection is discarded and the
/// database abandons the transaction on its own.
pub(super) async fn finish<T>(
    tx: Box<dyn SubscriptionTransaction>,
    outcome: Result<T, SubscriptionError>,
) -> Result<T, SubscriptionError> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
