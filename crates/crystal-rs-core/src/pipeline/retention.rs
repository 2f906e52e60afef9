//! Eviction of finished pipeline statuses.

use crystal_rs_protocol::{PipelineStatus, RunId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub(crate) type StatusMap = HashMap<RunId, Arc<watch::Sender<PipelineStatus>>>;

/// Drop terminal statuses older than `ttl`, then the oldest terminal ones
/// until at most `max_entries` remain. Active runs are never evicted.
///
/// Returns the number of evicted statuses.
pub(crate) fn prune_statuses(
    statuses: &mut StatusMap,
    ttl: Duration,
    max_entries: usize,
    now: f64,
) -> usize {
    let before = statuses.len();
    let ttl = ttl.as_secs_f64();
    statuses.retain(|_, status| {
        let status = status.borrow();
        !(status.is_terminal() && now - status.timestamp > ttl)
    });

    if statuses.len() > max_entries {
        let mut terminal: Vec<(f64, RunId)> = statuses
            .iter()
            .filter_map(|(run_id, status)| {
                let status = status.borrow();
                status
                    .is_terminal()
                    .then(|| (status.timestamp, run_id.clone()))
            })
            .collect();
        terminal.sort_by(|left, right| left.0.total_cmp(&right.0).then_with(|| left.1.cmp(&right.1)));
        let excess = statuses.len() - max_entries;
        for (_, run_id) in terminal.into_iter().take(excess) {
            statuses.remove(&run_id);
        }
    }
    before - statuses.len()
}
