//! Expiry reaper for probe events. A probe that never answers would
//! otherwise leave its link stuck in `waiting_probe` forever.

use chrono::{Duration, Utc};
use tracing::{error, info};

use linkmap_common::{LinkStatus, ProbeEventStatus};
use linkmap_store::LinkStore;

const SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Start the background sweep. Events older than `ttl_secs` that never
/// reached a terminal state are failed, and their links surfaced as
/// errors so the retry buttons apply.
pub fn start(store: LinkStore, ttl_secs: i64) {
    info!(ttl_secs, "starting probe-event reaper");
    tokio::spawn(async move {
        loop {
            if let Err(e) = sweep(&store, ttl_secs).await {
                error!(error = %e, "probe-event sweep failed");
            }
            tokio::time::sleep(SWEEP_INTERVAL).await;
        }
    });
}

async fn sweep(store: &LinkStore, ttl_secs: i64) -> Result<(), linkmap_store::StoreError> {
    let cutoff = Utc::now() - Duration::seconds(ttl_secs);
    let expired = store.list_expired_probe_events(cutoff).await?;

    for event in expired {
        let transitioned = store
            .complete_probe_event(
                event.id,
                ProbeEventStatus::Error,
                None,
                Some("probe event expired"),
            )
            .await?;
        if transitioned {
            store
                .set_link_status(
                    event.link_id,
                    LinkStatus::Error,
                    Some("probe did not respond in time"),
                )
                .await?;
            info!(event_id = %event.id, link_id = event.link_id, "probe event expired");
        }
    }
    Ok(())
}
