//! Replay-and-compare verification of a backend migration.
//!
//! For each logical request the orchestrator mirrors the reference-backend
//! request onto the candidate backend, waits (bounded) for both outcomes,
//! normalizes the bodies, diffs them line-by-line under an exemption policy
//! and records one report entry per request into a run-scoped store, which
//! exports as CSV or HTML at the end of the batch.

mod compare;
mod config;
mod data;
mod error;
mod http_client;
mod mirror;
mod normalize;
mod orchestrate;
mod report;
mod run_context;

pub use compare::{ExemptionSet, FieldMatcher, LineComparator, SubstringFieldMatcher};
pub use config::{AuthOverride, BatchConfiguration, DEFAULT_PROTOCOL_MARKER};
pub use data::{
    BackendError, BackendOutcome, ComparisonResult, LineStatus, LineVerdict, MirroredRequest,
    OutboundRequest, ReportEntry, ReportStatistics, RequestBody, RunStatus, ERROR_SENTINEL,
};
pub use error::Error;
pub use http_client::{HttpClient, HttpReply, HyperHttpClient};
pub use mirror::{replay_command, RequestMirror};
pub use normalize::{normalize_body, normalize_lines, split_lines};
pub use orchestrate::{Orchestrator, ReferenceReceiver, RequestDisposition};
pub use report::{
    escape_csv, OverallStats, ReportAggregator, FULL_CSV_HEADER, SUMMARY_CSV_HEADER,
};
pub use run_context::{RunContext, REPORT_KEY_PREFIX};
