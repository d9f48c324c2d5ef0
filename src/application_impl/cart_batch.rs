use crate::application_port::*;
use crate::domain_port::{AuthContext, CartBackend};
use futures_util::future::join_all;
use tracing::warn;

/// Sends every operation concurrently and waits for all of them; one failure
/// never cancels the others.
pub async fn run_batch(
    backend: &dyn CartBackend,
    auth: &AuthContext,
    operations: &[BatchOperation],
) -> BatchReport {
    let results = join_all(operations.iter().map(|op| async move {
        let result = match op.action {
            CartAction::Increment => backend.increment(auth, op.id).await,
            CartAction::Decrement => backend.decrement(auth, op.id).await,
            CartAction::Delete => backend.delete(auth, op.id).await,
        };
        match result {
            Ok(()) => BatchItemResult {
                id: op.id,
                success: true,
                error: None,
                code: None,
            },
            Err(error) => {
                warn!(id = %op.id, action = ?op.action, code = ?error.code, "batch operation failed");
                BatchItemResult {
                    id: op.id,
                    success: false,
                    error: Some(error.message),
                    code: Some(error.code),
                }
            }
        }
    }))
    .await;

    BatchReport::from_results(results)
}
