use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::adapters::{strip_html, truncate_chars, SourceAdapter};
use crate::domain::{DisasterEvent, EventExtras, EventKind, UpstreamId, UtcDateTime};
use crate::error::FetchError;
use crate::http_client::HttpRequest;
use crate::retry::RetryingFetcher;

const FEED_URL: &str = "https://www.gdacs.org/xml/rss.xml";

const DESCRIPTION_LIMIT: usize = 200;

/// GDACS RSS decoder.
///
/// The feed is small and loosely structured, with namespace prefixes that
/// drift between `geo:` and `gdacs:` variants, so items are extracted with
/// regular expressions rather than an XML parser. Tolerance beats
/// strictness here.
pub struct GdacsAdapter {
    url: String,
    timeout: Duration,
}

impl GdacsAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            url: FEED_URL.to_owned(),
            timeout,
        }
    }

    pub fn with_url(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

impl SourceAdapter for GdacsAdapter {
    fn id(&self) -> UpstreamId {
        UpstreamId::Gdacs
    }

    fn fetch<'a>(
        &'a self,
        fetcher: &'a RetryingFetcher,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DisasterEvent>, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            let response = fetcher
                .fetch(HttpRequest::get(&self.url).with_timeout(self.timeout))
                .await?;
            Ok(decode(&response.body))
        })
    }
}

static ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<item[^>]*>(.*?)</item>").expect("valid regex"));
static TITLE_RE: Lazy<Regex> = Lazy::new(|| tag_regex("title"));
static DESCRIPTION_RE: Lazy<Regex> = Lazy::new(|| tag_regex("description"));
static PUB_DATE_RE: Lazy<Regex> = Lazy::new(|| tag_regex("pubDate"));
static LINK_RE: Lazy<Regex> = Lazy::new(|| tag_regex("link"));
static GEO_LAT_RE: Lazy<Regex> = Lazy::new(|| tag_regex("geo:lat"));
static GDACS_LAT_RE: Lazy<Regex> = Lazy::new(|| tag_regex("gdacs:lat"));
static GEO_LONG_RE: Lazy<Regex> = Lazy::new(|| tag_regex("geo:long"));
static GDACS_LONG_RE: Lazy<Regex> = Lazy::new(|| tag_regex("gdacs:long"));
static ALERT_LEVEL_RE: Lazy<Regex> = Lazy::new(|| tag_regex("gdacs:alertlevel"));
static EVENT_TYPE_RE: Lazy<Regex> = Lazy::new(|| tag_regex("gdacs:eventtype"));

fn tag_regex(tag: &str) -> Regex {
    Regex::new(&format!(r"(?is)<{tag}[^>]*>(.*?)</{tag}>")).expect("valid regex")
}

fn tag_text(item: &str, re: &Regex) -> Option<String> {
    let captured = re.captures(item)?.get(1)?.as_str();
    let trimmed = captured.trim();
    let value = trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|rest| rest.strip_suffix("]]>"))
        .unwrap_or(trimmed)
        .trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_owned())
    }
}

/// RSS items rarely carry a stable id, so one is synthesized per decode.
fn synthesize_source_id(now: UtcDateTime) -> String {
    let suffix: String = (0..4).map(|_| fastrand::alphanumeric()).collect();
    format!("gdacs-{}-{}", now.unix_millis(), suffix)
}

pub(crate) fn decode(body: &str) -> Vec<DisasterEvent> {
    let mut events = Vec::new();

    for item in ITEM_RE.captures_iter(body) {
        let item = item.get(1).map(|m| m.as_str()).unwrap_or_default();

        let lat = tag_text(item, &GEO_LAT_RE)
            .or_else(|| tag_text(item, &GDACS_LAT_RE))
            .and_then(|v| v.parse::<f64>().ok());
        let lng = tag_text(item, &GEO_LONG_RE)
            .or_else(|| tag_text(item, &GDACS_LONG_RE))
            .and_then(|v| v.parse::<f64>().ok());
        let (Some(lat), Some(lng)) = (lat, lng) else {
            continue;
        };
        // 0,0 marks an item without a real position.
        if lat == 0.0 && lng == 0.0 {
            continue;
        }
        if !DisasterEvent::coordinates_valid(lat, lng) {
            continue;
        }

        let alert_level = tag_text(item, &ALERT_LEVEL_RE).unwrap_or_else(|| "Green".to_owned());
        let event_type = tag_text(item, &EVENT_TYPE_RE);
        let title = tag_text(item, &TITLE_RE).unwrap_or_else(|| "GDACS Alert".to_owned());
        let description = tag_text(item, &DESCRIPTION_RE)
            .map(|raw| truncate_chars(&strip_html(&raw), DESCRIPTION_LIMIT))
            .unwrap_or_default();
        let timestamp = tag_text(item, &PUB_DATE_RE)
            .and_then(|raw| UtcDateTime::parse_rfc2822(&raw))
            .unwrap_or_else(UtcDateTime::now);
        let now = UtcDateTime::now();
        let kind = event_type.as_deref().map_or(EventKind::Other, kind_for_code);

        events.push(DisasterEvent {
            sequence_id: 0,
            source_id: synthesize_source_id(now),
            source: UpstreamId::Gdacs,
            kind,
            severity: severity_for_alert_level(&alert_level),
            lat,
            lng,
            radius_m: kind.default_radius_m(),
            location: strip_html(&title),
            description,
            timestamp,
            url: tag_text(item, &LINK_RE),
            extras: EventExtras {
                alert_level: Some(alert_level),
                ..EventExtras::default()
            },
        });
    }

    events
}

fn kind_for_code(code: &str) -> EventKind {
    match code.trim().to_ascii_uppercase().as_str() {
        "EQ" => EventKind::Earthquake,
        "TC" => EventKind::Hurricane,
        "FL" => EventKind::Flood,
        "VO" => EventKind::Volcano,
        "DR" => EventKind::Drought,
        "WF" => EventKind::Wildfire,
        _ => EventKind::Other,
    }
}

fn severity_for_alert_level(level: &str) -> u8 {
    match level.trim().to_ascii_lowercase().as_str() {
        "red" => 9,
        "orange" => 7,
        "green" => 4,
        _ => 5,
    }
}
