//! Per-request report assembly and batch-level CSV/HTML export.

use crate::{
    config::BatchConfiguration,
    data::{BackendOutcome, ComparisonResult, ReportEntry, ReportStatistics, RunStatus},
    run_context::RunContext,
};
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::info;

pub const FULL_CSV_HEADER: &str = "Serial,Request,Command,ReferenceResponse,CandidateResponse,Total,Matched,Mismatched,Exempted,Match%,Status,ReferenceStatus,CandidateStatus,Timestamp";
pub const SUMMARY_CSV_HEADER: &str =
    "Serial,Request,Total,Matched,Mismatched,Exempted,Match%,Status,Timestamp";

const PAYLOAD_SKIPPED: &str = "[PAYLOAD_SKIPPED]";

lazy_static! {
    static ref EMBEDDED_BREAKS: Regex = Regex::new(r"\r\n|\n|\r").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverallStats {
    pub total_requests: usize,
    pub passed_requests: usize,
    pub failed_requests: usize,
    pub average_match_percentage: u32,
}

#[derive(Debug, Clone)]
pub struct ReportAggregator {
    snippet_cap: usize,
    skip_payload_logging: bool,
}

impl ReportAggregator {
    pub fn new(snippet_cap: usize) -> Self {
        Self {
            snippet_cap,
            skip_payload_logging: false,
        }
    }

    pub fn from_config(config: &BatchConfiguration) -> Self {
        Self {
            snippet_cap: config.snippet_cap(),
            skip_payload_logging: config.skip_payload_logging(),
        }
    }

    /// Assembles the entry for a completed comparison. The entry fails when
    /// any non-exempted line mismatched or when either backend never
    /// produced a usable response.
    pub fn build_entry(
        &self,
        serial_number: u32,
        request_name: &str,
        replay_command: String,
        reference: &BackendOutcome,
        candidate: &BackendOutcome,
        comparison: &ComparisonResult,
    ) -> ReportEntry {
        let status = if comparison.total_mismatches > 0 || reference.is_error() || candidate.is_error()
        {
            RunStatus::Failed
        } else {
            RunStatus::Passed
        };

        ReportEntry {
            serial_number,
            request_name: request_name.to_string(),
            replay_command,
            reference_snippet: self.snippet(reference.body.as_deref()),
            candidate_snippet: self.snippet(candidate.body.as_deref()),
            statistics: ReportStatistics {
                total_lines: comparison.total_lines,
                matched_lines: comparison.matched_lines(),
                mismatched_lines: comparison.total_mismatches,
                exempted_lines: comparison.total_exempted,
                match_percentage: comparison.match_percentage(),
                status,
                reference_status: reference.status_label(),
                candidate_status: candidate.status_label(),
                timestamp: Utc::now().to_rfc3339(),
            },
        }
    }

    /// Entry for a request whose reference side errored before any
    /// comparison could run: zero lines, zero percent, Failed. Applied
    /// uniformly so the batch report stays one-row-per-request.
    ///
    /// This is the one exception to the zero-line rule: a comparison that
    /// produced no lines reports 100% (see
    /// [`ComparisonResult::match_percentage`]), while these entries report
    /// 0% so a dead backend cannot inflate the batch average.
    pub fn error_entry(
        &self,
        serial_number: u32,
        request_name: &str,
        replay_command: String,
        reference: &BackendOutcome,
        candidate: &BackendOutcome,
    ) -> ReportEntry {
        ReportEntry {
            serial_number,
            request_name: request_name.to_string(),
            replay_command,
            reference_snippet: self.snippet(reference.body.as_deref()),
            candidate_snippet: self.snippet(candidate.body.as_deref()),
            statistics: ReportStatistics {
                total_lines: 0,
                matched_lines: 0,
                mismatched_lines: 0,
                exempted_lines: 0,
                match_percentage: 0,
                status: RunStatus::Failed,
                reference_status: reference.status_label(),
                candidate_status: candidate.status_label(),
                timestamp: Utc::now().to_rfc3339(),
            },
        }
    }

    /// Compact-JSON minified body, truncated to the cap. Non-JSON bodies
    /// are trimmed and truncated as-is.
    fn snippet(&self, body: Option<&str>) -> String {
        if self.skip_payload_logging {
            return String::from(PAYLOAD_SKIPPED);
        }

        let body = match body {
            Some(body) => body,
            None => return String::new(),
        };

        let minified = match serde_json::from_str::<serde_json::Value>(body.trim()) {
            Ok(value) => serde_json::to_string(&value).unwrap_or_else(|_| body.trim().to_string()),
            Err(_) => body.trim().to_string(),
        };

        truncate(&minified, self.snippet_cap)
    }

    pub fn export_full(&self, ctx: &RunContext) -> String {
        let mut csv = String::from(FULL_CSV_HEADER);
        csv.push('\n');

        for entry in ctx.entries() {
            let stats = &entry.statistics;
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
                entry.serial_number,
                escape_csv(&entry.request_name, self.snippet_cap),
                escape_csv(&entry.replay_command, self.snippet_cap),
                escape_csv(&entry.reference_snippet, self.snippet_cap),
                escape_csv(&entry.candidate_snippet, self.snippet_cap),
                stats.total_lines,
                stats.matched_lines,
                stats.mismatched_lines,
                stats.exempted_lines,
                stats.match_percentage,
                stats.status,
                escape_csv(&stats.reference_status, self.snippet_cap),
                escape_csv(&stats.candidate_status, self.snippet_cap),
                escape_csv(&stats.timestamp, self.snippet_cap),
            ));
        }

        info!(entries = ctx.entry_count(), "full CSV report generated");
        csv
    }

    pub fn export_summary(&self, ctx: &RunContext) -> String {
        let mut csv = String::from(SUMMARY_CSV_HEADER);
        csv.push('\n');

        for entry in ctx.entries() {
            let stats = &entry.statistics;
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{}\n",
                entry.serial_number,
                escape_csv(&entry.request_name, self.snippet_cap),
                stats.total_lines,
                stats.matched_lines,
                stats.mismatched_lines,
                stats.exempted_lines,
                stats.match_percentage,
                stats.status,
                escape_csv(&stats.timestamp, self.snippet_cap),
            ));
        }

        csv
    }

    /// Summary table for the report sink. Only the data contract matters:
    /// one row per entry in serial order, pass/fail marked by a row class.
    pub fn export_html(&self, ctx: &RunContext) -> String {
        let overall = self.overall_stats(ctx);
        let mut html = String::from(
            "<!DOCTYPE html><html><head><meta charset=\"UTF-8\"><style>\
             table{border-collapse:collapse}td,th{border:1px solid #ccc;padding:4px 8px}\
             tr.passed{background:#f1f8e9}tr.failed{background:#ffebee}\
             </style></head><body>",
        );

        html.push_str(&format!(
            "<h1>Batch Comparison Report</h1><p>Total: {} | Passed: {} | Failed: {} | Average match: {}%</p>",
            overall.total_requests,
            overall.passed_requests,
            overall.failed_requests,
            overall.average_match_percentage
        ));

        html.push_str(
            "<table><thead><tr><th>Serial</th><th>Request</th><th>Total</th><th>Matched</th>\
             <th>Mismatched</th><th>Exempted</th><th>Match%</th><th>Status</th>\
             <th>Reference</th><th>Candidate</th><th>Timestamp</th></tr></thead><tbody>",
        );

        for entry in ctx.entries() {
            let stats = &entry.statistics;
            let row_class = match stats.status {
                RunStatus::Passed => "passed",
                RunStatus::Failed => "failed",
            };

            html.push_str(&format!(
                "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
                 <td>{}</td><td>{}%</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                row_class,
                entry.serial_number,
                escape_html(&entry.request_name),
                stats.total_lines,
                stats.matched_lines,
                stats.mismatched_lines,
                stats.exempted_lines,
                stats.match_percentage,
                stats.status,
                escape_html(&stats.reference_status),
                escape_html(&stats.candidate_status),
                escape_html(&stats.timestamp),
            ));
        }

        html.push_str("</tbody></table></body></html>");
        html
    }

    pub fn overall_stats(&self, ctx: &RunContext) -> OverallStats {
        let entries = ctx.entries();
        let total_requests = entries.len();

        if total_requests == 0 {
            return OverallStats {
                total_requests: 0,
                passed_requests: 0,
                failed_requests: 0,
                average_match_percentage: 0,
            };
        }

        let passed_requests = entries
            .iter()
            .filter(|entry| entry.statistics.status == RunStatus::Passed)
            .count();
        let percentage_sum: u32 = entries
            .iter()
            .map(|entry| entry.statistics.match_percentage)
            .sum();

        OverallStats {
            total_requests,
            passed_requests,
            failed_requests: total_requests - passed_requests,
            average_match_percentage: (percentage_sum as f64 / total_requests as f64).round()
                as u32,
        }
    }
}

fn truncate(text: &str, cap: usize) -> String {
    text.chars().take(cap).collect()
}

/// CSV escaping per the report contract: embedded line breaks collapse to
/// single spaces, then the field is truncated and quoted (internal quotes
/// doubled) when it contains a comma or quote.
pub fn escape_csv(field: &str, cap: usize) -> String {
    let collapsed = EMBEDDED_BREAKS.replace_all(field, " ");
    let truncated = truncate(&collapsed, cap);

    if truncated.contains(',') || truncated.contains('"') {
        format!("\"{}\"", truncated.replace('"', "\"\""))
    } else {
        truncated
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
