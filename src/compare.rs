//! Positional line-by-line comparison under an exemption policy.
//!
//! The diff is strictly positional: line `i` of the reference is compared
//! against line `i` of the candidate, with the shorter side padded with
//! empty strings. No insertion/deletion alignment is attempted, so a single
//! inserted line on one side shifts every following index and shows up as a
//! cascade of mismatches. That is a deliberate limitation kept for report
//! stability with near-identical structured payloads, not a defect to fix.

use crate::data::{ComparisonResult, LineStatus, LineVerdict};
use std::fmt::Debug;

/// Strategy for deciding whether a line touches a given exempted field.
/// Kept behind a trait so the matching can move from substring containment
/// to a structured-path match without touching the comparator.
pub trait FieldMatcher: Debug {
    fn line_contains(&self, line: &str, field: &str) -> bool;
}

/// Textual containment: the field wrapped as a JSON key (`"field"`) or as
/// an XML open tag (`<field>`, `<field attr=...>`).
#[derive(Debug, Default)]
pub struct SubstringFieldMatcher;

impl FieldMatcher for SubstringFieldMatcher {
    fn line_contains(&self, line: &str, field: &str) -> bool {
        line.contains(&format!("\"{}\"", field))
            || line.contains(&format!("<{}>", field))
            || line.contains(&format!("<{} ", field))
    }
}

/// Ordered set of field names allowed to differ between backends. Loaded
/// once per batch run; read-only during comparison.
#[derive(Debug, Clone, Default)]
pub struct ExemptionSet {
    fields: Vec<String>,
}

impl ExemptionSet {
    pub fn new<S: Into<String>, I: IntoIterator<Item = S>>(fields: I) -> Self {
        let mut set = Self { fields: Vec::new() };

        for field in fields {
            let field = field.into();
            if !set.fields.contains(&field) {
                set.fields.push(field);
            }
        }

        set
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug)]
pub struct LineComparator {
    exemptions: ExemptionSet,
    matcher: Box<dyn FieldMatcher + Send + Sync>,
}

impl LineComparator {
    pub fn new(exemptions: ExemptionSet) -> Self {
        Self::with_matcher(exemptions, Box::new(SubstringFieldMatcher))
    }

    pub fn with_matcher(
        exemptions: ExemptionSet,
        matcher: Box<dyn FieldMatcher + Send + Sync>,
    ) -> Self {
        Self {
            exemptions,
            matcher,
        }
    }

    fn is_exempted(&self, line: &str) -> bool {
        self.exemptions
            .fields()
            .iter()
            .any(|field| self.matcher.line_contains(line, field))
    }

    /// Compares two normalized line sequences. Classification order per
    /// line: Exempted wins over Mismatch, Mismatch over Match. Deterministic
    /// and idempotent for identical inputs.
    pub fn compare(&self, reference: &[String], candidate: &[String]) -> ComparisonResult {
        let total_lines = reference.len().max(candidate.len());
        let mut results = Vec::with_capacity(total_lines);
        let mut total_mismatches = 0;
        let mut total_exempted = 0;

        for index in 0..total_lines {
            let reference_line = reference.get(index).map(String::as_str).unwrap_or("");
            let candidate_line = candidate.get(index).map(String::as_str).unwrap_or("");

            let status = if self.is_exempted(reference_line) || self.is_exempted(candidate_line) {
                total_exempted += 1;
                LineStatus::Exempted
            } else if reference_line != candidate_line {
                total_mismatches += 1;
                LineStatus::Mismatch
            } else {
                LineStatus::Match
            };

            results.push(LineVerdict {
                line_number: index + 1,
                reference_line: reference_line.to_string(),
                candidate_line: candidate_line.to_string(),
                status,
            });
        }

        ComparisonResult {
            results,
            total_lines,
            total_mismatches,
            total_exempted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RunStatus;
    use crate::normalize::normalize_lines;

    fn lines(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn identical_sequences_match_completely() {
        let comparator = LineComparator::new(ExemptionSet::default());
        let side = lines(&["{", "  \"id\": 1", "}"]);

        let result = comparator.compare(&side, &side);

        assert_eq!(result.total_lines, 3);
        assert_eq!(result.total_mismatches, 0);
        assert_eq!(result.total_exempted, 0);
        assert_eq!(result.match_percentage(), 100);
        assert_eq!(result.run_status(), RunStatus::Passed);
    }

    #[test]
    fn extra_lines_compare_against_empty_string() {
        let comparator = LineComparator::new(ExemptionSet::default());
        let reference = lines(&["a", "b", "c"]);
        let candidate = lines(&["a", "b"]);

        let result = comparator.compare(&reference, &candidate);

        assert_eq!(result.total_lines, 3);
        assert_eq!(result.total_mismatches, 1);
        assert_eq!(result.results[2].candidate_line, "");
        assert_eq!(result.results[2].status, LineStatus::Mismatch);
        assert_eq!(result.run_status(), RunStatus::Failed);
    }

    #[test]
    fn exemption_takes_priority_over_mismatch() {
        let comparator =
            LineComparator::new(ExemptionSet::new(vec!["timestamp"]));
        let reference = lines(&["  \"timestamp\": \"2026-01-01\","]);
        let candidate = lines(&["  \"timestamp\": \"2026-01-02\","]);

        let result = comparator.compare(&reference, &candidate);

        assert_eq!(result.total_mismatches, 0);
        assert_eq!(result.total_exempted, 1);
        assert_eq!(result.results[0].status, LineStatus::Exempted);
    }

    #[test]
    fn exemption_matches_xml_open_tags_with_and_without_attributes() {
        let matcher = SubstringFieldMatcher;

        assert!(matcher.line_contains("  <requestId>42</requestId>", "requestId"));
        assert!(matcher.line_contains("  <requestId kind=\"uuid\">42</requestId>", "requestId"));
        assert!(!matcher.line_contains("  <requestIdentifier>42</requestIdentifier>", "requestId"));
    }

    #[test]
    fn comparison_is_idempotent() {
        let comparator = LineComparator::new(ExemptionSet::new(vec!["name"]));
        let reference = lines(&["{", "  \"name\": \"A\"", "}"]);
        let candidate = lines(&["{", "  \"name\": \"B\"", "}"]);

        let first = comparator.compare(&reference, &candidate);
        let second = comparator.compare(&reference, &candidate);

        assert_eq!(first, second);
    }

    #[test]
    fn exempted_name_field_in_normalized_json_passes() {
        let comparator = LineComparator::new(ExemptionSet::new(vec!["name"]));
        let reference = normalize_lines("{\"id\":1,\"name\":\"A\"}");
        let candidate = normalize_lines("{\"id\":1,\"name\":\"B\"}");

        let result = comparator.compare(&reference, &candidate);

        assert_eq!(result.total_mismatches, 0);
        assert_eq!(result.total_exempted, 1);
        assert_eq!(result.results[2].status, LineStatus::Exempted);
        assert_eq!(result.run_status(), RunStatus::Passed);
    }

    #[test]
    fn mismatched_lengths_report_max_length() {
        let comparator = LineComparator::new(ExemptionSet::default());
        let reference = lines(&["only"]);
        let candidate = lines(&["only", "extra", "lines"]);

        let result = comparator.compare(&reference, &candidate);

        assert_eq!(result.total_lines, 3);
        assert_eq!(result.total_mismatches, 2);
        assert_eq!(result.matched_lines(), 1);
    }

    #[test]
    fn duplicate_exemption_fields_are_collapsed() {
        let set = ExemptionSet::new(vec!["id", "name", "id"]);

        assert_eq!(set.fields(), &["id".to_string(), "name".to_string()]);
    }
}
