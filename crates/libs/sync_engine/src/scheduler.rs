use crate::{SyncEngine, SyncError};
use chrono::Utc;
use common_types::RemoteLibrary;
use cron::Schedule;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub fn parse_schedule(expr: &str) -> Result<Schedule, SyncError> {
    Schedule::from_str(expr).map_err(|source| SyncError::Schedule {
        expr: expr.to_owned(),
        source,
    })
}

/// Trigger a fresh sync at every matching instant of the cron expression.
///
/// Syncs run strictly one at a time. A failed sync is logged and the next
/// trigger still fires; only cancellation (a signal) ends the loop.
pub async fn run_daemon<C: RemoteLibrary + 'static>(
    engine: &SyncEngine<C>,
    expr: &str,
    cancel: &CancellationToken,
) -> Result<(), SyncError> {
    let schedule = parse_schedule(expr)?;
    info!("⏰ Daemon started with schedule {expr:?}");

    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            warn!("Schedule {expr:?} has no upcoming instant, stopping daemon");
            return Ok(());
        };
        info!("Next sync at {next}");
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            () = tokio::time::sleep(wait) => {}
        }
        match engine.run(cancel).await {
            Ok(()) => {}
            Err(SyncError::Interrupted) => return Ok(()),
            Err(e) => error!("Scheduled sync failed: {e:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_schedule_accepts_cron_expression() {
        let schedule = parse_schedule("0 0 4 * * * *").unwrap();
        assert!(schedule.upcoming(Utc).next().is_some());
    }

    #[test]
    fn test_parse_schedule_rejects_garbage() {
        assert!(matches!(
            parse_schedule("every now and then"),
            Err(SyncError::Schedule { .. })
        ));
    }
}
