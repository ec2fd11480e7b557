//! Startup orchestration: start every watch source, then hold readiness
//! until each one has delivered its initial listing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ray_core::ResourceKind;
use ray_kubehub::WatchSource;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("watch caches not synced after {waited:?}: {}", fmt_kinds(.pending))]
    SyncTimeout { waited: Duration, pending: Vec<ResourceKind> },
}

fn fmt_kinds(kinds: &[ResourceKind]) -> String { kinds.iter().map(ResourceKind::as_str).collect::<Vec<_>>().join(", ") }

/// Start every source on its own task. All of them stop with `stop`.
pub fn start_all(sources: &[Arc<dyn WatchSource>], stop: &CancellationToken) -> Vec<JoinHandle<()>> {
    sources
        .iter()
        .map(|s| {
            debug!(kind = %s.kind(), "starting watch source");
            Arc::clone(s).start(stop.child_token())
        })
        .collect()
}

/// Block until every source reports synced.
///
/// Each source gets its own waiter task; the last one to see its source synced
/// releases the barrier. With `deadline = None` this waits forever.
pub async fn wait_for_sync(sources: &[Arc<dyn WatchSource>], deadline: Option<Duration>) -> Result<(), StartupError> {
    if sources.is_empty() {
        return Ok(());
    }
    let remaining = Arc::new(AtomicUsize::new(sources.len()));
    let done = Arc::new(Notify::new());
    let waiters: Vec<JoinHandle<()>> = sources
        .iter()
        .map(|s| {
            let source = Arc::clone(s);
            let remaining = Arc::clone(&remaining);
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                source.wait_synced().await;
                let left = remaining.fetch_sub(1, Ordering::AcqRel) - 1;
                debug!(kind = %source.kind(), left, "watch source synced");
                if left == 0 {
                    done.notify_one();
                }
            })
        })
        .collect();

    let outcome = match deadline {
        None => {
            done.notified().await;
            Ok(())
        }
        Some(d) => match tokio::time::timeout(d, done.notified()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                let mut pending: Vec<_> = sources.iter().filter(|s| !s.has_synced()).map(|s| s.kind()).collect();
                pending.sort();
                // The last source may have synced after the deadline fired.
                if pending.is_empty() || remaining.load(Ordering::Acquire) == 0 {
                    Ok(())
                } else {
                    Err(StartupError::SyncTimeout { waited: d, pending })
                }
            }
        },
    };
    for w in waiters {
        w.abort();
    }
    if outcome.is_ok() {
        info!(kinds = sources.len(), "all watch caches synced");
    }
    outcome
}
