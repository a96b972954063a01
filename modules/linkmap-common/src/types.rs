use serde::{Deserialize, Serialize};

/// Minimum relation score for two links to be considered related.
pub const SCORE_THRESHOLD: f64 = 0.65;

/// Maximum number of stored relations per link.
pub const MAX_RELATIONS: usize = 5;

/// Dimension of the summary embedding vectors.
pub const EMBEDDING_DIM: usize = 1536;

/// Link lifecycle status. Transitions form a DAG:
/// `pending → {scraped, waiting_probe, error}`, `waiting_probe → pending`
/// (probe result re-spawn), `scraped → analyzed`; `analyzed` and `error`
/// can re-enter `pending` on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Pending,
    Scraped,
    Analyzed,
    Error,
    WaitingProbe,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Pending => "pending",
            LinkStatus::Scraped => "scraped",
            LinkStatus::Analyzed => "analyzed",
            LinkStatus::Error => "error",
            LinkStatus::WaitingProbe => "waiting_probe",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(LinkStatus::Pending),
            "scraped" => Some(LinkStatus::Scraped),
            "analyzed" => Some(LinkStatus::Analyzed),
            "error" => Some(LinkStatus::Error),
            "waiting_probe" => Some(LinkStatus::WaitingProbe),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeEventStatus {
    Pending,
    Sent,
    Completed,
    Error,
}

impl ProbeEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeEventStatus::Pending => "pending",
            ProbeEventStatus::Sent => "sent",
            ProbeEventStatus::Completed => "completed",
            ProbeEventStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProbeEventStatus::Pending),
            "sent" => Some(ProbeEventStatus::Sent),
            "completed" => Some(ProbeEventStatus::Completed),
            "error" => Some(ProbeEventStatus::Error),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProbeEventStatus::Completed | ProbeEventStatus::Error)
    }
}

/// Which fetcher a URL needs. Twitter URLs require authenticated browser
/// context and are routed to a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlKind {
    Twitter,
    Web,
}

impl UrlKind {
    pub fn from_url(raw: &str) -> Self {
        let host = url::Url::parse(raw)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()));
        match host.as_deref() {
            Some(h)
                if h == "twitter.com"
                    || h == "x.com"
                    || h.ends_with(".twitter.com")
                    || h.ends_with(".x.com") =>
            {
                UrlKind::Twitter
            }
            _ => UrlKind::Web,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UrlKind::Twitter => "twitter",
            UrlKind::Web => "web",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "twitter" => Some(UrlKind::Twitter),
            "web" => Some(UrlKind::Web),
            _ => None,
        }
    }
}

/// A media attachment reported by a scraper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    #[serde(rename = "type")]
    pub media_type: String,
    pub url: String,
}

/// Scraped page payload — the wire shape a probe posts back, and the
/// shape the cloud fetcher produces internally.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapeData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub markdown: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_site_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_media: Option<Vec<MediaItem>>,
}

impl ScrapeData {
    /// Best available title: explicit page title, falling back to og:title.
    pub fn display_title(&self) -> Option<&str> {
        self.title.as_deref().or(self.og_title.as_deref())
    }
}
