//! Core types for linkspeed

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Address of a link inside a batch's progress events
///
/// This is the zero-based position of the link for a fresh batch, or the
/// externally supplied identifier for a retest batch.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LinkId(pub i64);

impl LinkId {
    /// Create a new LinkId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for LinkId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<usize> for LinkId {
    fn from(index: usize) -> Self {
        Self(index as i64)
    }
}

impl PartialEq<i64> for LinkId {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One candidate proxy descriptor (`scheme://payload`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProxyLink(String);

impl ProxyLink {
    /// Wrap a descriptor string
    pub fn new(link: impl Into<String>) -> Self {
        Self(link.into())
    }

    /// The full descriptor text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The descriptor with anything after the first `^` removed
    ///
    /// Index-addressed batches dial this form; retest links are dialed as sent.
    pub fn dial_target(&self) -> &str {
        self.0.split('^').next().unwrap_or_default()
    }

    /// The lowercase scheme tag (`vmess`, `ssr`, `ss`, `trojan`)
    pub fn scheme(&self) -> Option<String> {
        self.0
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
    }
}

impl From<&str> for ProxyLink {
    fn from(link: &str) -> Self {
        Self::new(link)
    }
}

impl From<String> for ProxyLink {
    fn from(link: String) -> Self {
        Self(link)
    }
}

impl std::fmt::Display for ProxyLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which phases each pipeline runs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SpeedTestMode {
    /// Ping, then measure throughput
    #[default]
    Full,
    /// Ping only; a sentinel speed is reported instead of measuring
    PingOnly,
    /// Skip the ping and go straight to the throughput measurement
    SpeedOnly,
}

impl SpeedTestMode {
    /// Wire tag for this mode
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedTestMode::Full => "all",
            SpeedTestMode::PingOnly => "pingonly",
            SpeedTestMode::SpeedOnly => "speedonly",
        }
    }
}

impl From<&str> for SpeedTestMode {
    // unknown tags mean a full test
    fn from(tag: &str) -> Self {
        match tag.trim() {
            "pingonly" => SpeedTestMode::PingOnly,
            "speedonly" => SpeedTestMode::SpeedOnly,
            _ => SpeedTestMode::Full,
        }
    }
}

impl From<String> for SpeedTestMode {
    fn from(tag: String) -> Self {
        SpeedTestMode::from(tag.as_str())
    }
}

impl From<SpeedTestMode> for String {
    fn from(mode: SpeedTestMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Whether a batch is a fresh run or a retest of a prior batch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestMode {
    /// Links are addressed by position
    #[default]
    All,
    /// Links are addressed by explicit ids
    Retest,
}

impl TestMode {
    /// Numeric wire tag (2 = all, 3 = retest)
    pub fn as_i64(&self) -> i64 {
        match self {
            TestMode::All => 2,
            TestMode::Retest => 3,
        }
    }

    /// Parse a numeric wire tag
    pub fn from_wire(tag: i64) -> Option<Self> {
        match tag {
            2 => Some(TestMode::All),
            3 => Some(TestMode::Retest),
            _ => None,
        }
    }
}

/// Normalized control parameters for one batch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestOptions {
    /// Group name shown next to every server
    pub group_name: String,
    /// Which phases run
    pub speed_test_mode: SpeedTestMode,
    /// Passed through untouched
    pub ping_method: String,
    /// Passed through untouched
    pub sort_method: String,
    /// Maximum concurrently running pipelines (at least 1)
    pub concurrency: usize,
    /// Connect and total timeout of each throughput measurement (at least 20s)
    pub timeout: Duration,
    /// Fresh run or retest
    pub test_mode: TestMode,
    /// Explicit ids (retest only)
    #[serde(default)]
    pub explicit_ids: Vec<i64>,
    /// Explicit links (retest only)
    #[serde(default)]
    pub explicit_links: Vec<ProxyLink>,
}

impl TestOptions {
    /// Whether pipelines are addressed through the explicit id/link overrides
    pub fn has_overrides(&self) -> bool {
        !self.explicit_ids.is_empty() && !self.explicit_links.is_empty()
    }
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            group_name: crate::options::DEFAULT_GROUP.to_string(),
            speed_test_mode: SpeedTestMode::Full,
            ping_method: String::new(),
            sort_method: String::new(),
            concurrency: 1,
            timeout: crate::options::MIN_TIMEOUT,
            test_mode: TestMode::All,
            explicit_ids: Vec::new(),
            explicit_links: Vec::new(),
        }
    }
}

/// The unit of one orchestration run
#[derive(Clone, Debug, PartialEq)]
pub struct TestBatch {
    /// Links in dispatch order
    pub links: Vec<ProxyLink>,
    /// Options shared by every pipeline
    pub options: TestOptions,
}

impl TestBatch {
    /// Pair links with options
    pub fn new(links: Vec<ProxyLink>, options: TestOptions) -> Self {
        Self { links, options }
    }

    /// Address and descriptor used for the link at `index`
    ///
    /// Retest batches carrying overrides are re-addressed through
    /// `explicit_ids`/`explicit_links`; everything else uses the index itself.
    pub fn target(&self, index: usize) -> Option<(LinkId, &ProxyLink)> {
        let options = &self.options;
        if options.has_overrides() {
            let id = options.explicit_ids.get(index)?;
            let link = options.explicit_links.get(index)?;
            return Some((LinkId(*id), link));
        }
        self.links.get(index).map(|link| (LinkId::from(index), link))
    }
}

/// Progress event streamed to the subscriber while a batch runs
///
/// Serialized as one JSON object per frame, tagged by `info`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "info", rename_all = "lowercase")]
pub enum ProgressEvent {
    /// The batch has been accepted and is about to run
    Started,

    /// One server of the batch, emitted before any pipeline runs
    GotServer {
        /// Link address
        id: LinkId,
        /// Full descriptor
        link: String,
        /// Group name from the options
        group: String,
        /// Name read from the descriptor (empty when unknown)
        #[serde(default)]
        remarks: String,
        /// Scheme tag (empty when unknown)
        #[serde(default)]
        protocol: String,
    },

    /// Latency probe started
    StartPing {
        /// Link address
        id: LinkId,
    },

    /// Latency probe finished; values below 1 mean the probe failed
    GotPing {
        /// Link address
        id: LinkId,
        /// Elapsed milliseconds
        ping: i64,
    },

    /// Throughput measurement started
    StartSpeed {
        /// Link address
        id: LinkId,
    },

    /// Running throughput figures, or the `(-1, -1, 0)` sentinel
    GotSpeed {
        /// Link address
        id: LinkId,
        /// Running average in bytes per second
        #[serde(rename = "speed")]
        average: i64,
        /// Running maximum in bytes per second
        #[serde(rename = "maxspeed")]
        maximum: i64,
        /// Latest sample in bytes per second
        #[serde(rename = "traffic")]
        current: i64,
    },

    /// The pipeline for this link finished
    EndOne {
        /// Link address
        id: LinkId,
    },

    /// Every dispatched pipeline finished
    Eof,

    /// Batch-level failure; nothing else follows
    Error {
        /// Short machine-readable reason
        reason: String,
        /// Human-readable detail
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl ProgressEvent {
    /// The `gotspeed` sentinel meaning "no measurement"
    pub fn speed_sentinel(id: LinkId) -> Self {
        ProgressEvent::GotSpeed {
            id,
            average: -1,
            maximum: -1,
            current: 0,
        }
    }

    /// Link address carried by per-link events
    pub fn link_id(&self) -> Option<LinkId> {
        match self {
            ProgressEvent::GotServer { id, .. }
            | ProgressEvent::StartPing { id }
            | ProgressEvent::GotPing { id, .. }
            | ProgressEvent::StartSpeed { id }
            | ProgressEvent::GotSpeed { id, .. }
            | ProgressEvent::EndOne { id } => Some(*id),
            ProgressEvent::Started | ProgressEvent::Eof | ProgressEvent::Error { .. } => None,
        }
    }

    /// The `info` tag of this event
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::Started => "started",
            ProgressEvent::GotServer { .. } => "gotserver",
            ProgressEvent::StartPing { .. } => "startping",
            ProgressEvent::GotPing { .. } => "gotping",
            ProgressEvent::StartSpeed { .. } => "startspeed",
            ProgressEvent::GotSpeed { .. } => "gotspeed",
            ProgressEvent::EndOne { .. } => "endone",
            ProgressEvent::Eof => "eof",
            ProgressEvent::Error { .. } => "error",
        }
    }
}

/// How a batch run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every link was dispatched and `eof` was emitted
    Completed,
    /// Cancellation stopped dispatch; no `eof` was emitted
    Cancelled,
    /// The batch had no links; a single `error` was emitted
    NoLinks,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_events_serialize_with_info_tag() {
        let json = serde_json::to_value(ProgressEvent::GotSpeed {
            id: LinkId(4),
            average: 10,
            maximum: 20,
            current: 5,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"info": "gotspeed", "id": 4, "speed": 10, "maxspeed": 20, "traffic": 5})
        );

        let json = serde_json::to_value(ProgressEvent::Eof).unwrap();
        assert_eq!(json, serde_json::json!({"info": "eof"}));

        let json = serde_json::to_value(ProgressEvent::Error {
            reason: "nonodes".into(),
            message: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"info": "error", "reason": "nonodes"}));
    }

    #[test]
    fn speed_sentinel_values() {
        let sentinel = ProgressEvent::speed_sentinel(LinkId(1));
        assert_eq!(
            sentinel,
            ProgressEvent::GotSpeed {
                id: LinkId(1),
                average: -1,
                maximum: -1,
                current: 0
            }
        );
        assert_eq!(sentinel.kind(), "gotspeed");
        assert_eq!(sentinel.link_id(), Some(LinkId(1)));
    }

    #[test]
    fn speed_test_mode_tags() {
        assert_eq!(SpeedTestMode::from("pingonly"), SpeedTestMode::PingOnly);
        assert_eq!(SpeedTestMode::from("speedonly"), SpeedTestMode::SpeedOnly);
        assert_eq!(SpeedTestMode::from(""), SpeedTestMode::Full);
        assert_eq!(SpeedTestMode::from("whatever"), SpeedTestMode::Full);
    }

    #[test]
    fn test_mode_wire_tags() {
        assert_eq!(TestMode::from_wire(3), Some(TestMode::Retest));
        assert_eq!(TestMode::from_wire(2), Some(TestMode::All));
        assert_eq!(TestMode::from_wire(0), None);
        assert_eq!(TestMode::Retest.as_i64(), 3);
    }

    #[test]
    fn dial_target_drops_caret_suffix() {
        let link = ProxyLink::new("trojan://pw@host:443#name^extra");
        assert_eq!(link.dial_target(), "trojan://pw@host:443#name");
        assert_eq!(link.scheme().as_deref(), Some("trojan"));
    }

    #[test]
    fn batch_target_uses_overrides_only_when_both_present() {
        let mut options = TestOptions::default();
        let batch = TestBatch::new(vec!["ss://a".into(), "ss://b".into()], options.clone());
        let (id, link) = batch.target(1).unwrap();
        assert_eq!(id, LinkId(1));
        assert_eq!(link.as_str(), "ss://b");

        options.test_mode = TestMode::Retest;
        options.explicit_ids = vec![7, 9];
        options.explicit_links = vec!["vmess://x".into(), "vmess://y".into()];
        let batch = TestBatch::new(options.explicit_links.clone(), options);
        let (id, link) = batch.target(1).unwrap();
        assert_eq!(id, LinkId(9));
        assert_eq!(link.as_str(), "vmess://y");
        assert!(batch.target(2).is_none());
    }
}
