/// Error fragments that mean the URL was a file download, not a page.
/// Matched by substring against stored error messages; the exact
/// wording is load-bearing for compatibility with existing rows.
const PERMANENT_SCRAPE_ERRORS: [&str; 3] = [
    "Download is starting",
    "net::ERR_ABORTED",
    "Navigation failed because page was closed",
];

/// A permanent scrape error is recorded on the link but not retried.
pub fn is_permanent_scrape_error(message: &str) -> bool {
    PERMANENT_SCRAPE_ERRORS
        .iter()
        .any(|needle| message.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_errors_are_permanent() {
        assert!(is_permanent_scrape_error(
            "navigation error: Download is starting for https://example.com/file.pdf"
        ));
        assert!(is_permanent_scrape_error("net::ERR_ABORTED at frame load"));
        assert!(is_permanent_scrape_error(
            "Navigation failed because page was closed"
        ));
    }

    #[test]
    fn ordinary_errors_are_not_permanent() {
        assert!(!is_permanent_scrape_error("connection reset by peer"));
        assert!(!is_permanent_scrape_error("timeout after 30s"));
        assert!(!is_permanent_scrape_error(""));
    }
}
