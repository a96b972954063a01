//! HTML → article extraction: Readability markdown plus og-tag parsing.
//! Shared by the coordinator's cloud fetcher and the probe's local one.

use regex::Regex;
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};

use crate::types::ScrapeData;

/// Only the document head is scanned for meta tags.
const HEAD_LIMIT: usize = 50_000;

/// Convert raw HTML into clean markdown using Readability extraction.
pub fn html_to_markdown(html: &[u8], url: Option<&str>) -> String {
    let parsed_url = url.and_then(|u| url::Url::parse(u).ok());
    let config = TransformConfig {
        readability: true,
        main_content: true,
        return_format: ReturnFormat::Markdown,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: parsed_url.as_ref(),
        content: html,
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };

    transform_content_input(input, &config)
}

/// OpenGraph metadata pulled from a page head.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OgTags {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub site_name: Option<String>,
    pub og_type: Option<String>,
}

/// Parse og:* meta tags. Handles both attribute orders
/// (`property=… content=…` and `content=… property=…`).
pub fn extract_og_tags(html: &str) -> OgTags {
    let head = if let Some(end) = html[..html.len().min(HEAD_LIMIT)].find("</head>") {
        &html[..end]
    } else {
        &html[..html.len().min(HEAD_LIMIT)]
    };

    let og_re = Regex::new(
        r#"(?i)<meta\s+(?:[^>]*?\s)?(?:property|name)\s*=\s*["']og:(\w+)["'][^>]*?\scontent\s*=\s*["']([^"']*)["'][^>]*/?\s*>"#,
    )
    .unwrap();
    let og_rev_re = Regex::new(
        r#"(?i)<meta\s+(?:[^>]*?\s)?content\s*=\s*["']([^"']*)["'][^>]*?\s(?:property|name)\s*=\s*["']og:(\w+)["'][^>]*/?\s*>"#,
    )
    .unwrap();

    let mut tags = OgTags::default();

    let mut apply = |key: &str, value: &str| {
        if value.is_empty() {
            return;
        }
        let slot = match key {
            "title" => &mut tags.title,
            "description" => &mut tags.description,
            "image" => &mut tags.image,
            "site_name" => &mut tags.site_name,
            "type" => &mut tags.og_type,
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    };

    for cap in og_re.captures_iter(head) {
        apply(&cap[1].to_lowercase(), &cap[2]);
    }
    for cap in og_rev_re.captures_iter(head) {
        apply(&cap[2].to_lowercase(), &cap[1]);
    }

    tags
}

/// The document `<title>`, trimmed.
pub fn page_title(html: &str) -> Option<String> {
    let head = &html[..html.len().min(HEAD_LIMIT)];
    let re = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap();
    re.captures(head)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Build a full scrape payload from rendered HTML.
pub fn scrape_data_from_html(html: &str, url: &str) -> ScrapeData {
    let og = extract_og_tags(html);
    let markdown = html_to_markdown(html.as_bytes(), Some(url));

    ScrapeData {
        title: page_title(html),
        markdown,
        og_title: og.title,
        og_description: og.description,
        og_image: og.image,
        og_site_name: og.site_name,
        og_type: og.og_type,
        raw_media: None,
    }
}
