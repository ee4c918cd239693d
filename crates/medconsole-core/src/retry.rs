use std::future::Future;

use futures::future::join_all;
use tracing::{info, warn};

use crate::model::QueueItem;
use crate::notifications::failed_items;
use crate::query::Toast;

/// Anything able to re-send a single outbound queue item.
pub trait QueueBackend {
    fn retry_item(&self, id: &str) -> impl Future<Output = anyhow::Result<()>> + Send;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrySummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<(String, String)>,
}

impl RetrySummary {
    pub fn toast(&self) -> Toast {
        if self.attempted == 0 {
            return Toast::success("No failed messages to retry");
        }
        if self.failures.is_empty() {
            return Toast::success(format!("Retried {} failed messages", self.attempted));
        }
        Toast::error(format!(
            "Retried {} of {} failed messages; {} could not be queued",
            self.succeeded,
            self.attempted,
            self.failures.len()
        ))
    }
}

/// Fires one retry request per failed item concurrently and returns once
/// every request has settled.
#[tracing::instrument(skip_all, fields(total = items.len()))]
pub async fn retry_all_failed<B>(backend: &B, items: &[QueueItem]) -> RetrySummary
where
    B: QueueBackend + Sync,
{
    let failed = failed_items(items);
    if failed.is_empty() {
        info!("no failed queue items to retry");
        return RetrySummary::default();
    }

    let outcomes = join_all(failed.iter().map(|item| async move {
        let result = backend.retry_item(&item.id).await;
        (item.id.clone(), result)
    }))
    .await;

    let mut summary = RetrySummary {
        attempted: outcomes.len(),
        ..RetrySummary::default()
    };
    for (id, result) in outcomes {
        match result {
            Ok(()) => summary.succeeded += 1,
            Err(err) => {
                warn!(id = %id, error = %format!("{err:#}"), "retry request failed");
                summary.failures.push((id, format!("{err:#}")));
            }
        }
    }

    info!(
        attempted = summary.attempted,
        succeeded = summary.succeeded,
        failed = summary.failures.len(),
        "retry-all settled"
    );
    summary
}
