use tracing::{error, info, warn};

use linkmap_common::{LinkStatus, ProbeEventStatus};
use linkmap_pipeline::Pipeline;
use linkmap_store::{LinkStore, ProbeDevice, StoreError};

use crate::wire::ScrapeResultPayload;

#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error("unknown probe event")]
    UnknownEvent,

    #[error("probe event belongs to another user")]
    ForeignEvent,

    #[error("{0}")]
    BadPayload(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result callback intake. Verifies ownership, records the terminal
/// transition (idempotent by event id — duplicates are absorbed), and on
/// success hands the payload to the pipeline asynchronously.
pub async fn receive_result(
    store: &LinkStore,
    pipeline: &Pipeline,
    device: &ProbeDevice,
    payload: ScrapeResultPayload,
) -> Result<(), ReceiveError> {
    let event = store
        .get_probe_event(payload.event_id)
        .await?
        .ok_or(ReceiveError::UnknownEvent)?;

    if event.user_id != device.user_id {
        return Err(ReceiveError::ForeignEvent);
    }

    if payload.success {
        let Some(data) = payload.data else {
            return Err(ReceiveError::BadPayload("success result carries no data"));
        };

        let result_json =
            serde_json::to_value(&data).map_err(|_| ReceiveError::BadPayload("unencodable data"))?;
        let transitioned = store
            .complete_probe_event(
                payload.event_id,
                ProbeEventStatus::Completed,
                Some(&result_json),
                None,
            )
            .await?;

        if !transitioned {
            info!(event_id = %payload.event_id, "duplicate probe result ignored");
            return Ok(());
        }

        // The HTTP response does not wait on the pipeline.
        let pipeline = pipeline.clone();
        let event_id = payload.event_id;
        let user_id = device.user_id;
        tokio::spawn(async move {
            if let Err(e) = pipeline.handle_probe_result(event_id, user_id, data).await {
                error!(event_id = %event_id, error = %e, "probe result handling failed");
            }
        });

        info!(event_id = %payload.event_id, "probe result accepted");
        return Ok(());
    }

    let message = payload.error.as_deref().unwrap_or("probe reported failure");
    let transitioned = store
        .complete_probe_event(
            payload.event_id,
            ProbeEventStatus::Error,
            None,
            Some(message),
        )
        .await?;

    if transitioned {
        // Surface the failure on the link so the retry affordances apply
        // instead of leaving it stuck in waiting_probe.
        store
            .set_link_status(event.link_id, LinkStatus::Error, Some(message))
            .await?;
        warn!(event_id = %payload.event_id, link_id = event.link_id, error = message, "probe scrape failed");
    }

    Ok(())
}
