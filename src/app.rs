use crate::live::{ConnectionState, ManagerHandle};
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Wait for the manager task and the pollers until `shutdown` resolves.
///
/// The polling fallback outlives the live connection: if the manager stops
/// on its own (terminal failure), pollers keep running until `shutdown`.
/// On `shutdown` the manager is asked to stop and every poller is aborted.
///
/// Returns the manager's final state, or `None` if its task panicked.
pub async fn supervise<S>(
    handle: &ManagerHandle,
    mut manager_task: JoinHandle<ConnectionState>,
    pollers: Vec<JoinHandle<()>>,
    shutdown: S,
) -> Option<ConnectionState>
where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let final_state = tokio::select! {
        result = &mut manager_task => {
            let state = manager_result(result);
            if !pollers.is_empty() {
                warn!(
                    pollers = pollers.len(),
                    "Live updates stopped, polling fallback keeps running until shutdown"
                );
                shutdown.as_mut().await;
                info!("Shutdown requested");
            }
            state
        }
        _ = shutdown.as_mut() => {
            info!("Shutdown requested");
            handle.shutdown();
            manager_result(manager_task.await)
        }
    };

    for poller in pollers {
        poller.abort();
    }

    final_state
}

fn manager_result(result: Result<ConnectionState, tokio::task::JoinError>) -> Option<ConnectionState> {
    match result {
        Ok(state) => {
            info!(state = %state, "Connection manager exited");
            Some(state)
        }
        Err(e) => {
            error!(error = %e, "Connection manager task failed");
            None
        }
    }
}
