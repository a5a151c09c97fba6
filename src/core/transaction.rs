use std::future::Future;
use std::sync::Arc;

use tokio::time::timeout;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::DocumentStore;
use crate::Error;
use crate::Result;
use crate::SystemError;
use crate::Transaction;
use crate::TransactionConfig;

/// Runs `body` inside one transaction over `collections`.
///
/// Commits when the body succeeds. When it fails the transaction is aborted on
/// a spawned task bounded by `abort_timeout`, so the rollback finishes even if
/// the caller stops polling this future. No retries happen here.
pub async fn run_transaction<S, F, Fut, R>(
    store: &S,
    collections: &[String],
    config: &TransactionConfig,
    body: F,
) -> Result<R>
where
    S: DocumentStore,
    F: FnOnce(Arc<S::Txn>) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let txn = store.begin(collections, config.into()).await?;
    let txn_id = txn.id();

    match body(txn.clone()).await {
        Ok(value) => {
            txn.commit().await?;
            debug!(txn_id, "transaction committed");
            Ok(value)
        }
        Err(err) => {
            debug!(txn_id, "transaction body failed: {:?}", err);
            match abort_detached(txn, config).await {
                Ok(()) => Err(err),
                Err(abort) => {
                    error!(txn_id, "transaction abort failed: {:?}", abort);
                    Err(Error::Abort {
                        source: Box::new(err),
                        abort: Box::new(abort),
                    })
                }
            }
        }
    }
}

async fn abort_detached<X: Transaction>(
    txn: Arc<X>,
    config: &TransactionConfig,
) -> Result<()> {
    let abort_timeout = config.abort_timeout();
    let handle = tokio::spawn(async move { timeout(abort_timeout, txn.abort()).await });

    match handle.await? {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!("transaction abort timed out after {:?}", abort_timeout);
            Err(SystemError::Timeout(abort_timeout).into())
        }
    }
}
