use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Prefix used by upstream dispatchers to report a failed call through the
/// run store instead of a response body.
pub const ERROR_SENTINEL: &str = "ERROR: ";

/// A request as described by the batch driver, before mirroring. The URL
/// points at the reference backend. Entries the driver marked disabled stay
/// in the maps; the mirror drops them while copying.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: String,
    pub url: String,
    pub headers: IndexMap<String, String>,
    pub body: RequestBody,
    pub disabled_headers: Vec<String>,
    pub disabled_fields: Vec<String>,
}

impl OutboundRequest {
    pub fn is_header_disabled(&self, name: &str) -> bool {
        self.disabled_headers
            .iter()
            .any(|header| header.eq_ignore_ascii_case(name))
    }

    pub fn is_field_disabled(&self, name: &str) -> bool {
        self.disabled_fields.iter().any(|field| field == name)
    }

    /// The body with disabled form fields removed. Raw and structured
    /// bodies pass through unchanged.
    pub fn enabled_body(&self) -> RequestBody {
        match &self.body {
            RequestBody::FormData(fields) => RequestBody::FormData(self.enabled_fields(fields)),
            RequestBody::UrlEncoded(fields) => {
                RequestBody::UrlEncoded(self.enabled_fields(fields))
            }
            other => other.clone(),
        }
    }

    fn enabled_fields(&self, fields: &IndexMap<String, String>) -> IndexMap<String, String> {
        fields
            .iter()
            .filter(|(name, _)| !self.is_field_disabled(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

/// Request body by mode. Form fields keep their insertion order.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    None,
    Raw(String),
    FormData(IndexMap<String, String>),
    UrlEncoded(IndexMap<String, String>),
    StructuredQuery {
        query: String,
        variables: serde_json::Value,
    },
}

impl RequestBody {
    pub fn is_none(&self) -> bool {
        matches!(self, RequestBody::None)
    }

    /// Wire form of a structured query: one JSON document carrying the
    /// query text and its variables.
    pub fn render_structured_query(query: &str, variables: &serde_json::Value) -> String {
        serde_json::json!({ "query": query, "variables": variables }).to_string()
    }
}

/// A fully built request against one backend. Immutable once constructed;
/// owned by the orchestrator for the duration of one call.
#[derive(Debug, Clone)]
pub struct MirroredRequest {
    pub method: String,
    pub url: String,
    pub headers: IndexMap<String, String>,
    pub body: RequestBody,
}

impl MirroredRequest {
    /// Case-insensitive header lookup; keys keep their original casing.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    Network(String),
    Timeout,
}

/// What one backend produced for one request: a resolved response, or a
/// terminal failure. Consumed exactly once by the comparison step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOutcome {
    pub status: Option<u16>,
    pub body: Option<String>,
    pub error: Option<BackendError>,
}

impl BackendOutcome {
    pub fn success(status: u16, body: String) -> Self {
        Self {
            status: Some(status),
            body: Some(body),
            error: None,
        }
    }

    pub fn network_error<S: Into<String>>(message: S) -> Self {
        Self {
            status: None,
            body: None,
            error: Some(BackendError::Network(message.into())),
        }
    }

    pub fn timeout() -> Self {
        Self {
            status: None,
            body: None,
            error: Some(BackendError::Timeout),
        }
    }

    /// Builds an outcome from a reply relayed through the run store, where a
    /// failed dispatch arrives as a sentinel-prefixed body.
    pub fn from_reply(status: Option<u16>, body: String) -> Self {
        if let Some(message) = body.strip_prefix(ERROR_SENTINEL) {
            Self::network_error(message.to_string())
        } else {
            Self {
                status,
                body: Some(body),
                error: None,
            }
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Human-readable status for reporting: the numeric code, or the failure
    /// kind when the call never resolved.
    pub fn status_label(&self) -> String {
        match &self.error {
            Some(BackendError::Timeout) => String::from("TIMEOUT"),
            Some(BackendError::Network(_)) => String::from("ERROR"),
            None => self
                .status
                .map(|code| code.to_string())
                .unwrap_or_else(|| String::from("0")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    Match,
    Mismatch,
    Exempted,
}

/// Verdict for one positional line pair. Ordering within a
/// `ComparisonResult` is significant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineVerdict {
    pub line_number: usize,
    pub reference_line: String,
    pub candidate_line: String,
    pub status: LineStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonResult {
    pub results: Vec<LineVerdict>,
    pub total_lines: usize,
    pub total_mismatches: usize,
    pub total_exempted: usize,
}

impl ComparisonResult {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            total_lines: 0,
            total_mismatches: 0,
            total_exempted: 0,
        }
    }

    pub fn matched_lines(&self) -> usize {
        self.total_lines - self.total_mismatches - self.total_exempted
    }

    pub fn match_percentage(&self) -> u32 {
        if self.total_lines == 0 {
            return 100;
        }

        (self.matched_lines() as f64 / self.total_lines as f64 * 100.0).round() as u32
    }

    pub fn run_status(&self) -> RunStatus {
        if self.total_mismatches > 0 {
            RunStatus::Failed
        } else {
            RunStatus::Passed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Passed,
    Failed,
}

impl Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Passed => write!(f, "PASSED"),
            RunStatus::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportStatistics {
    pub total_lines: usize,
    pub matched_lines: usize,
    pub mismatched_lines: usize,
    pub exempted_lines: usize,
    pub match_percentage: u32,
    pub status: RunStatus,
    pub reference_status: String,
    pub candidate_status: String,
    pub timestamp: String,
}

/// One request's comparison outcome plus the metadata needed to reproduce
/// it, keyed by serial number in the run store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub serial_number: u32,
    pub request_name: String,
    pub replay_command: String,
    pub reference_snippet: String,
    pub candidate_snippet: String,
    pub statistics: ReportStatistics,
}
