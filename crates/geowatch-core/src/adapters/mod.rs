//! Upstream decoders.
//!
//! Each adapter owns one provider's URLs, request headers, and the mapping
//! from that provider's schema onto [`DisasterEvent`]. Decoders are
//! tolerant per item: a malformed entry is skipped, the rest of the batch
//! survives.

use std::future::Future;
use std::pin::Pin;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{DisasterEvent, UpstreamId};
use crate::error::FetchError;
use crate::retry::RetryingFetcher;

mod eonet;
mod gdacs;
mod nws;
mod reliefweb;
mod usgs;

pub use eonet::EonetAdapter;
pub use gdacs::GdacsAdapter;
pub use nws::NwsAdapter;
pub use reliefweb::ReliefWebAdapter;
pub use usgs::UsgsAdapter;

/// Contract each upstream decoder implements.
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> UpstreamId;

    /// Fetch the provider's feed(s) through the retrying fetcher and
    /// decode the response into normalized events.
    fn fetch<'a>(
        &'a self,
        fetcher: &'a RetryingFetcher,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DisasterEvent>, FetchError>> + Send + 'a>>;
}

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("valid regex"));
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Strip markup and HTML entities from feed-sourced text and collapse
/// whitespace.
pub(crate) fn strip_html(input: &str) -> String {
    let decoded = html_escape::decode_html_entities(input);
    let stripped = TAG_RE.replace_all(&decoded, " ");
    WS_RE.replace_all(&stripped, " ").trim().to_owned()
}

/// Bound a description to `max` characters (char-based, not bytes).
pub(crate) fn truncate_chars(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        input.to_owned()
    } else {
        input.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_removes_tags_and_entities() {
        let raw = "<p>Flood &amp; landslide&nbsp;risk<br/>in   the&#160;valley</p>";
        assert_eq!(strip_html(raw), "Flood & landslide risk in the valley");
    }

    #[test]
    fn truncate_is_character_based() {
        let text = "é".repeat(300);
        let cut = truncate_chars(&text, 200);
        assert_eq!(cut.chars().count(), 200);
    }
}
