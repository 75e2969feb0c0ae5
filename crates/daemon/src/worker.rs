use std::sync::Arc;

use tokio::time::sleep;
use tracing::{error, info};

use crate::service::{PollStep, TaskService};

/// Perpetual loop for one task.
///
/// The task's persisted status is checked at the top of every cycle, so a stop
/// takes effect within one poll interval. Store failures end this loop only.
pub(crate) async fn run_task_loop(svc: Arc<TaskService>, task_id: String) {
    let interval = svc.config().poll_interval;
    info!(task_id = %task_id, ?interval, "worker started");

    loop {
        match svc.poll_task_once(&task_id).await {
            Ok(PollStep::Continue) => {}
            Ok(PollStep::Exit(reason)) => {
                info!(task_id = %task_id, %reason, "worker exiting");
                break;
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "worker aborted");
                break;
            }
        }
        sleep(interval).await;
    }
}
