//! Batch message parsing -- legacy `^`-delimited messages and retest envelopes.
//!
//! Both encodings normalize to the same [`TestOptions`]: empty group names fall
//! back to [`DEFAULT_GROUP`], concurrency is at least 1 (and capped at the
//! limiter's permit ceiling) and the timeout is at least [`MIN_TIMEOUT`], whatever
//! the client sent.

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::error::{Error, Result};
use crate::links::LinkExtractor;
use crate::types::{ProxyLink, SpeedTestMode, TestBatch, TestMode, TestOptions};

/// Group name used when the client sends none
pub const DEFAULT_GROUP: &str = "Default Group";

/// Group value clients send to mean "no group"
pub const EMPTY_GROUP_SENTINEL: &str = "?empty?";

/// Lower bound for the throughput timeout
pub const MIN_TIMEOUT: Duration = Duration::from_secs(20);

/// Lower bound for the concurrency
pub const MIN_CONCURRENCY: usize = 1;

const LEGACY_FIELDS: usize = 7;

/// Retest envelope as sent by clients
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RetestEnvelope {
    group: String,
    #[serde(rename = "speedtestMode")]
    speedtest_mode: String,
    #[serde(rename = "pingMethod")]
    ping_method: String,
    #[serde(rename = "sortMethod")]
    sort_method: String,
    concurrency: i64,
    #[serde(rename = "testMode")]
    test_mode: i64,
    testids: Vec<i64>,
    /// Seconds
    timeout: i64,
    links: Vec<String>,
}

/// Apply the group-name default; other names pass through untouched
pub fn normalize_group(group: &str) -> String {
    if group.is_empty() || group == EMPTY_GROUP_SENTINEL {
        DEFAULT_GROUP.to_string()
    } else {
        group.to_string()
    }
}

/// Apply the concurrency floor and the limiter's permit ceiling
pub fn normalize_concurrency(requested: i64) -> usize {
    usize::try_from(requested)
        .unwrap_or(MIN_CONCURRENCY)
        .clamp(MIN_CONCURRENCY, Semaphore::MAX_PERMITS)
}

/// Apply the timeout floor to a value in seconds
pub fn normalize_timeout(seconds: i64) -> Duration {
    let seconds = u64::try_from(seconds).unwrap_or(0);
    Duration::from_secs(seconds).max(MIN_TIMEOUT)
}

/// Try to read `raw` as a retest envelope
///
/// Returns `Ok(None)` when `raw` is not JSON or not a retest request, so the
/// caller can fall back to the legacy encoding.
///
/// # Errors
///
/// [`Error::InvalidInput`] when the envelope is a retest request whose `testids`
/// and `links` disagree in length.
pub fn parse_retest(raw: &[u8]) -> Result<Option<(Vec<ProxyLink>, TestOptions)>> {
    let Ok(envelope) = serde_json::from_slice::<RetestEnvelope>(raw) else {
        return Ok(None);
    };
    if TestMode::from_wire(envelope.test_mode) != Some(TestMode::Retest) {
        return Ok(None);
    }

    if !envelope.testids.is_empty()
        && !envelope.links.is_empty()
        && envelope.testids.len() != envelope.links.len()
    {
        return Err(Error::invalid_input(format!(
            "retest carries {} ids for {} links",
            envelope.testids.len(),
            envelope.links.len()
        )));
    }

    let links: Vec<ProxyLink> = envelope.links.into_iter().map(ProxyLink::from).collect();
    let options = TestOptions {
        group_name: normalize_group(&envelope.group),
        speed_test_mode: SpeedTestMode::from(envelope.speedtest_mode.as_str()),
        ping_method: envelope.ping_method,
        sort_method: envelope.sort_method,
        concurrency: normalize_concurrency(envelope.concurrency),
        timeout: normalize_timeout(envelope.timeout),
        test_mode: TestMode::Retest,
        explicit_ids: envelope.testids,
        explicit_links: links.clone(),
    };
    Ok(Some((links, options)))
}

/// Parse the `^`-delimited parameter segment of a legacy message
///
/// Fields are group, speed mode, ping method, sort method, an unused
/// placeholder, concurrency and timeout (seconds). A six-field segment is read
/// as the same list without the placeholder.
///
/// # Examples
///
/// ```
/// use linkspeed::options::parse_legacy_options;
/// use std::time::Duration;
///
/// let options = parse_legacy_options("Group1^pingonly^^^^8^60").unwrap();
/// assert_eq!(options.group_name, "Group1");
/// assert_eq!(options.concurrency, 8);
/// assert_eq!(options.timeout, Duration::from_secs(60));
/// ```
pub fn parse_legacy_options(segment: &str) -> Result<TestOptions> {
    let mut fields: Vec<&str> = segment.split('^').collect();
    if fields.len() == LEGACY_FIELDS - 1 {
        fields.insert(4, "");
    }
    if fields.len() < LEGACY_FIELDS {
        return Err(Error::invalid_input(format!(
            "expected {} option fields, got {}",
            LEGACY_FIELDS,
            fields.len()
        )));
    }

    let concurrency: i64 = fields[5].trim().parse().map_err(|_| {
        Error::invalid_input(format!("concurrency is not a number: '{}'", fields[5]))
    })?;
    let timeout: i64 = fields[6]
        .trim()
        .parse()
        .map_err(|_| Error::invalid_input(format!("timeout is not a number: '{}'", fields[6])))?;

    Ok(TestOptions {
        group_name: normalize_group(fields[0]),
        speed_test_mode: SpeedTestMode::from(fields[1]),
        ping_method: fields[2].to_string(),
        sort_method: fields[3].to_string(),
        concurrency: normalize_concurrency(concurrency),
        timeout: normalize_timeout(timeout),
        test_mode: TestMode::All,
        explicit_ids: Vec::new(),
        explicit_links: Vec::new(),
    })
}

/// Turn one inbound message into a [`TestBatch`]
///
/// Retest envelopes carry their own links. Legacy messages are split on the
/// first `^`: the left side goes through `extractor` (which may fetch a
/// subscription), the right side through [`parse_legacy_options`].
///
/// # Errors
///
/// - [`Error::InvalidInput`] for malformed messages, bad options or no links
/// - [`Error::Fetch`] / [`Error::Decode`] when a subscription can't be read
pub async fn parse_message(raw: &[u8], extractor: &LinkExtractor) -> Result<TestBatch> {
    if let Some((links, options)) = parse_retest(raw)? {
        return Ok(TestBatch::new(links, options));
    }

    let text = std::str::from_utf8(raw)
        .map_err(|e| Error::invalid_input(format!("message is not UTF-8: {}", e)))?;
    let Some((link_text, option_text)) = text.split_once('^') else {
        return Err(Error::invalid_input("message has no option segment"));
    };

    // options first: a bad option segment shouldn't cost a subscription fetch
    let options = parse_legacy_options(option_text)?;
    let links = extractor.extract(link_text).await?;
    Ok(TestBatch::new(links, options))
}
