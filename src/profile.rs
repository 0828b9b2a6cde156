//! Best-effort metadata read from proxy descriptors
//!
//! Only what the engine needs is decoded: the scheme, a display name and the
//! server endpoint. Nothing here validates a descriptor; unknown or malformed
//! payloads just yield empty fields.

use crate::types::ProxyLink;
use crate::utils::decode_base64_text;

/// Metadata of one descriptor
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkProfile {
    /// Lowercase scheme tag
    pub protocol: String,
    /// Display name carried by the descriptor
    pub remarks: String,
    /// Server host
    pub host: Option<String>,
    /// Server port
    pub port: Option<u16>,
}

impl LinkProfile {
    /// Read what can be read from `link`
    pub fn parse(link: &ProxyLink) -> Self {
        let target = link.dial_target();
        let Some((scheme, payload)) = target.split_once("://") else {
            return Self::default();
        };
        let protocol = scheme.to_ascii_lowercase();
        let mut profile = match protocol.as_str() {
            "vmess" => parse_vmess(payload),
            "ssr" => parse_ssr(payload),
            "ss" | "trojan" => parse_authority(target),
            _ => Self::default(),
        };
        profile.protocol = protocol;
        profile
    }

    /// `host:port` of the server, when both are known
    pub fn endpoint(&self) -> Option<String> {
        let host = self.host.as_deref()?;
        let port = self.port?;
        if host.contains(':') && !host.starts_with('[') {
            Some(format!("[{}]:{}", host, port))
        } else {
            Some(format!("{}:{}", host, port))
        }
    }

    /// Name for log lines, falling back to the link's position
    pub fn display_name(&self, fallback_index: i64) -> String {
        if self.remarks.is_empty() {
            format!("Profile {}", fallback_index)
        } else {
            self.remarks.clone()
        }
    }
}

fn parse_vmess(payload: &str) -> LinkProfile {
    let Ok(text) = decode_base64_text(payload) else {
        return LinkProfile::default();
    };
    let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) else {
        return LinkProfile::default();
    };

    // some generators emit the port as a string
    let port = match json.get("port") {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };

    LinkProfile {
        protocol: String::new(),
        remarks: json
            .get("ps")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        host: json
            .get("add")
            .and_then(|v| v.as_str())
            .filter(|h| !h.is_empty())
            .map(str::to_string),
        port,
    }
}

// host:port:protocol:method:obfs:password_b64/?obfsparam=..&remarks=<b64>
fn parse_ssr(payload: &str) -> LinkProfile {
    let Ok(text) = decode_base64_text(payload) else {
        return LinkProfile::default();
    };
    let (main, query) = match text.split_once("/?") {
        Some((main, query)) => (main, Some(query)),
        None => (text.as_str(), None),
    };

    let fields: Vec<&str> = main.rsplitn(6, ':').collect();
    if fields.len() < 6 {
        return LinkProfile::default();
    }
    // rsplitn yields password, obfs, method, protocol, port, host
    let host = fields[5].trim_start_matches('[').trim_end_matches(']');
    let port = fields[4].parse().ok();

    let remarks = query
        .and_then(|q| {
            q.split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == "remarks")
                .map(|(_, value)| value)
        })
        .and_then(|value| decode_base64_text(value).ok())
        .unwrap_or_default();

    LinkProfile {
        protocol: String::new(),
        remarks,
        host: (!host.is_empty()).then(|| host.to_string()),
        port,
    }
}

fn parse_authority(target: &str) -> LinkProfile {
    let Ok(url) = url::Url::parse(target) else {
        return LinkProfile::default();
    };
    let remarks = url
        .fragment()
        .map(|f| {
            urlencoding::decode(f)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| f.to_string())
        })
        .unwrap_or_default();
    let host = url
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
        .filter(|h| !h.is_empty());

    LinkProfile {
        protocol: String::new(),
        remarks,
        host,
        port: url.port(),
    }
}
