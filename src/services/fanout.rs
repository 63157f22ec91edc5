use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Run `f` over every item with at most `limit` in flight, collecting
/// results as they complete. Output order follows completion order, not
/// input order; callers that care about order must not.
///
/// This is the one fan-out primitive shared by the triage, enrichment and
/// contact stages, so their semaphore sizes stay in configuration instead
/// of being re-implemented per stage.
pub async fn bounded_map<T, R, Fut, F>(items: Vec<T>, limit: usize, f: F) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    Fut: Future<Output = R> + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + Clone + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut set = JoinSet::new();

    for item in items {
        let semaphore = semaphore.clone();
        let f = f.clone();
        set.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("fan-out semaphore closed");
            f(item).await
        });
    }

    let mut out = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(result) => out.push(result),
            // A panicked item must not take its siblings down with it.
            Err(e) => log::error!("Fan-out task panicked: {:?}", e),
        }
    }
    out
}
