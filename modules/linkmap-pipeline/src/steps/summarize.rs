use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use linkmap_store::LinkFields;

use crate::deps::PipelineDeps;
use crate::types::SummarizeCheckpoint;

/// Heading under which OCR text is appended to the page markdown for
/// LLM context. Fixed marker; the summarizer prompt references it.
const OCR_MARKER: &str = "## Text from images";

const SYSTEM_PROMPT: &str = "\
You summarize saved web pages. Reply with a single JSON object, no code \
fences, shaped exactly as {\"summary\": string, \"tags\": [string]}. The \
summary is 2-4 sentences. Tags are 3-6 short lowercase topics, most \
specific first. Content under a '## Text from images' heading was \
extracted from images via OCR.";

/// Summarize step: reads markdown from the store (checkpoints never
/// carry full markdown), asks the LLM for `{summary, tags}`, persists
/// both.
pub async fn summarize(
    deps: &PipelineDeps,
    link_id: i64,
    url: &str,
    ocr_texts: &[String],
) -> Result<SummarizeCheckpoint> {
    let link = deps
        .store
        .get_link(link_id)
        .await?
        .with_context(|| format!("link {link_id} vanished before summarize"))?;

    let mut content = link.markdown.unwrap_or_default();
    if !ocr_texts.is_empty() {
        content.push_str("\n\n");
        content.push_str(OCR_MARKER);
        content.push_str("\n\n");
        content.push_str(&ocr_texts.join("\n\n"));
    }

    let user_prompt = format!("URL: {url}\n\n{content}");
    let raw = deps.llm.complete(SYSTEM_PROMPT, &user_prompt).await?;
    let checkpoint = parse_summary_response(&raw);

    if checkpoint.tags.is_empty() {
        warn!(link_id, "summarizer response was not valid JSON, using raw text");
    }
    info!(link_id, tags = checkpoint.tags.len(), "summarize: persisting");

    deps.store
        .update_link_fields(
            link_id,
            LinkFields {
                summary: Some(checkpoint.summary.clone()),
                tags: Some(checkpoint.tags.clone()),
                ..Default::default()
            },
        )
        .await?;

    Ok(checkpoint)
}

#[derive(Deserialize)]
struct SummaryJson {
    summary: String,
    #[serde(default)]
    tags: Vec<String>,
}

/// Parse the LLM reply. Tolerates surrounding prose or code fences by
/// retrying on the outermost brace span; anything unparseable falls
/// back to the raw text as the summary with no tags.
fn parse_summary_response(raw: &str) -> SummarizeCheckpoint {
    let attempt = |s: &str| serde_json::from_str::<SummaryJson>(s).ok();

    let parsed = attempt(raw.trim()).or_else(|| {
        let start = raw.find('{')?;
        let end = raw.rfind('}')?;
        if start < end {
            attempt(&raw[start..=end])
        } else {
            None
        }
    });

    match parsed {
        Some(json) => SummarizeCheckpoint {
            summary: json.summary,
            tags: json.tags,
        },
        None => SummarizeCheckpoint {
            summary: raw.trim().to_string(),
            tags: Vec::new(),
        },
    }
}
