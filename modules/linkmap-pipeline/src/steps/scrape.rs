use anyhow::{Context, Result};
use tracing::{info, warn};

use linkmap_common::{LinkStatus, MediaItem, ScrapeData, UrlKind};
use linkmap_store::LinkFields;

use crate::deps::PipelineDeps;
use crate::types::{ScrapeCheckpoint, ScrapeOutcome};

/// Scrape step. Three sub-paths:
/// - probe-supplied: a probe already fetched the page; persist its payload.
/// - probe-required: twitter-kind URL with no payload; create a probe
///   event, mark the link `waiting_probe`, and suspend.
/// - cloud-scrape: fetch through the cloud article extractor.
pub async fn scrape(
    deps: &PipelineDeps,
    link_id: i64,
    user_id: i64,
    url: &str,
    supplied: Option<&ScrapeData>,
) -> Result<ScrapeOutcome> {
    let kind = UrlKind::from_url(url);

    if let Some(data) = supplied {
        info!(link_id, url, "scrape: persisting probe-supplied payload");
        let ocr_texts = process_media(deps, link_id, data.raw_media.as_deref()).await;
        persist(deps, link_id, data).await?;
        return Ok(ScrapeOutcome::Scraped(ScrapeCheckpoint::from_data(
            data, ocr_texts,
        )));
    }

    if kind == UrlKind::Twitter {
        info!(link_id, url, "scrape: twitter URL needs a probe, suspending");
        let event = deps
            .store
            .create_probe_event(user_id, link_id, url, kind)
            .await?;

        // Best-effort push; a probe that is offline picks the event up
        // from the pending replay on its next connect.
        if let Err(e) = deps.probes.push_scrape_request(&event).await {
            warn!(link_id, event_id = %event.id, error = %e, "probe push failed, event stays pending");
        }

        deps.store
            .set_link_status(link_id, LinkStatus::WaitingProbe, None)
            .await?;

        return Ok(ScrapeOutcome::Suspended);
    }

    let data = deps
        .fetcher
        .fetch(url)
        .await
        .with_context(|| format!("fetching {url}"))?;

    // Media processing only applies to twitter-kind pages.
    let ocr_texts = if kind == UrlKind::Twitter {
        process_media(deps, link_id, data.raw_media.as_deref()).await
    } else {
        Vec::new()
    };

    persist(deps, link_id, &data).await?;
    Ok(ScrapeOutcome::Scraped(ScrapeCheckpoint::from_data(
        &data, ocr_texts,
    )))
}

/// Run attached media through the image/OCR helper. Never fatal.
async fn process_media(
    deps: &PipelineDeps,
    link_id: i64,
    media: Option<&[MediaItem]>,
) -> Vec<String> {
    let Some(media) = media.filter(|m| !m.is_empty()) else {
        return Vec::new();
    };

    match deps.media.ocr_texts(link_id, media).await {
        Ok(texts) => texts,
        Err(e) => {
            warn!(link_id, error = %e, "media processing failed, continuing without OCR");
            Vec::new()
        }
    }
}

async fn persist(deps: &PipelineDeps, link_id: i64, data: &ScrapeData) -> Result<()> {
    deps.store
        .update_link_fields(
            link_id,
            LinkFields {
                title: data.display_title().map(String::from),
                description: data.og_description.clone(),
                image: data.og_image.clone(),
                site_name: data.og_site_name.clone(),
                content_type: data.og_type.clone(),
                markdown: Some(data.markdown.clone()),
                images: data
                    .raw_media
                    .as_ref()
                    .map(|m| serde_json::to_value(m).unwrap_or_default()),
                ..Default::default()
            },
        )
        .await?;
    deps.store
        .set_link_status(link_id, LinkStatus::Scraped, None)
        .await?;
    Ok(())
}
