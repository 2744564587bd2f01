//! Tolerant JSON recovery for model responses.
//!
//! The generative model frequently emits JSON wrapped in markdown fences,
//! prefixed with commentary, or truncated mid-document by a length limit.
//! Losing a whole batch to one malformed response is unacceptable, so this
//! module recovers what it can before the caller gives up:
//!
//! 1. Strip a fenced-code wrapper if present.
//! 2. Keep only the span from the first `{` to the last `}`.
//! 3. If bracket counts balance, parse as-is.
//! 4. Otherwise *soft repair*: drop a dangling trailing comma and append
//!    the missing closers, arrays before their enclosing object.
//! 5. If that still fails to parse, *aggressive repair*: truncate to the
//!    end of the last structurally complete per-segment record and close
//!    the enclosing array and object.
//!
//! Any failure past that point is soft: [`recover_json`] returns `None`
//! and the caller fills the affected indices with empty results.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Dangling comma left at the end of a truncated document.
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*$").expect("static regex"));

/// A self-contained per-segment record, used to find the last complete one
/// in a truncated response.
static COMPLETE_RECORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{"segment_id":\s*\d+,\s*"qa_pairs":\s*\[[^\]]*\]\}"#).expect("static regex")
});

/// Recover a JSON document from raw model output.
///
/// Returns `None` when no object span exists or when even aggressive
/// repair leaves the text unparseable. Callers treat `None` as an empty
/// batch, never as an error.
#[must_use]
pub fn recover_json(raw: &str) -> Option<Value> {
    let unfenced = strip_code_fence(raw.trim());
    let span = extract_object_span(unfenced)?;
    let softened = soft_repair(span);

    match serde_json::from_str(&softened) {
        Ok(value) => Some(value),
        Err(parse_err) => {
            tracing::debug!(error = %parse_err, "soft repair insufficient, trying aggressive repair");
            let repaired = aggressive_repair(&softened).unwrap_or_else(|| soft_repair(&softened));
            match serde_json::from_str(&repaired) {
                Ok(value) => {
                    tracing::info!("recovered truncated response via aggressive repair");
                    Some(value)
                }
                Err(final_err) => {
                    tracing::warn!(error = %final_err, "response unrecoverable, dropping batch");
                    None
                }
            }
        }
    }
}

/// Remove a leading/trailing markdown code fence, if present.
///
/// The opening line may carry a language tag (` ```json `); the closing
/// fence is only removed when it is a line of its own.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    if !text.starts_with("```") {
        return text;
    }

    let after_open = match text.find('\n') {
        Some(idx) => &text[idx + 1..],
        None => return text,
    };

    match after_open.trim_end().strip_suffix("```") {
        Some(body) => match body.rfind('\n') {
            Some(idx) => &body[..idx],
            None => body,
        },
        None => after_open,
    }
}

/// Slice out the span from the first `{` to the last `}` inclusive.
///
/// Commentary before or after the document is discarded. When the text is
/// truncated before any `}` arrives, everything from the first `{` onward
/// is kept so repair can still close it.
pub(crate) fn extract_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    match text.rfind('}') {
        Some(end) if end > start => Some(&text[start..=end]),
        _ => Some(&text[start..]),
    }
}

/// Append the closers a truncated document is missing.
///
/// Balanced input passes through unchanged. Counting is by raw character,
/// which is good enough in practice: the repaired text still has to parse,
/// so a miscount caused by braces inside string values only sends us to
/// the aggressive path.
pub(crate) fn soft_repair(text: &str) -> String {
    let open_braces = text.matches('{').count();
    let close_braces = text.matches('}').count();
    let open_brackets = text.matches('[').count();
    let close_brackets = text.matches(']').count();

    if open_braces == close_braces && open_brackets == close_brackets {
        return text.to_owned();
    }

    tracing::debug!(
        braces = format!("{open_braces}/{close_braces}"),
        brackets = format!("{open_brackets}/{close_brackets}"),
        "unbalanced response, appending missing closers"
    );

    let mut repaired = TRAILING_COMMA.replace(text.trim_end(), "").into_owned();
    for _ in close_brackets..open_brackets {
        repaired.push_str("\n  ]");
    }
    for _ in close_braces..open_braces {
        repaired.push_str("\n}");
    }
    repaired
}

/// Truncate to the last structurally complete per-segment record and close
/// the enclosing array and object.
///
/// Returns `None` when no complete record exists, in which case the caller
/// falls back to the soft-repaired text as a last resort.
pub(crate) fn aggressive_repair(text: &str) -> Option<String> {
    let last = COMPLETE_RECORD.find_iter(text).last()?;
    let mut repaired = TRAILING_COMMA
        .replace(&text[..last.end()], "")
        .into_owned();
    repaired.push_str("\n  ]\n}");
    Some(repaired)
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn balanced_document_parses_unchanged() {
        let raw = r#"{"segments": [{"segment_id": 0, "qa_pairs": []}]}"#;
        let value = recover_json(raw).unwrap();
        assert_eq!(value["segments"][0]["segment_id"], json!(0));
    }

    #[test]
    fn fenced_document_matches_unfenced() {
        let body = r#"{"segments": [{"segment_id": 0, "qa_pairs": []}]}"#;
        let fenced = format!("```json\n{body}\n```");
        let bare_fence = format!("```\n{body}\n```");

        assert_eq!(recover_json(&fenced), recover_json(body));
        assert_eq!(recover_json(&bare_fence), recover_json(body));
    }

    #[test]
    fn commentary_around_the_object_is_discarded() {
        let raw = format!(
            "Here is the JSON you asked for:\n{}\nHope that helps!",
            r#"{"segments": []}"#
        );
        let value = recover_json(&raw).unwrap();
        assert_eq!(value, json!({"segments": []}));
    }

    #[test]
    fn no_object_fails_soft() {
        assert!(recover_json("no json here, sorry").is_none());
        assert!(recover_json("").is_none());
    }

    #[test]
    fn soft_repair_closes_missing_brackets_in_order() {
        // Truncated right after a complete record: the missing closers are
        // the segments array and the root object, in nesting order.
        let raw = r#"{"segments": [{"segment_id": 0, "qa_pairs": [{"question": "What is A?", "answer": "A is a letter."}]}"#;
        let value = recover_json(raw).unwrap();
        assert_eq!(
            value["segments"][0]["qa_pairs"][0]["answer"],
            json!("A is a letter.")
        );
    }

    #[test]
    fn soft_repair_drops_dangling_comma() {
        let raw = r#"{"segments": [{"segment_id": 0, "qa_pairs": []},"#;
        let value = recover_json(raw).unwrap();
        assert_eq!(value["segments"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn aggressive_repair_keeps_complete_leading_records() {
        // Second record is cut off inside its pair list, where appending
        // closers cannot fix the nesting; only the first record survives.
        let raw = concat!(
            r#"{"segments": ["#,
            r#"{"segment_id": 0, "qa_pairs": [{"question": "What is A?", "answer": "A thing."}]},"#,
            r#"{"segment_id": 1, "qa_pairs": [{"question": "What is B?", "answer": "B thing."}"#
        );
        let value = recover_json(raw).unwrap();
        let segments = value["segments"].as_array().unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0]["segment_id"], json!(0));
    }

    #[test]
    fn truncation_with_no_complete_record_fails_soft() {
        // Cut off mid-record with nothing salvageable before it.
        let raw = r#"{"segments": [{"segment_id": 0, "qa_pairs": [{"question": "What is A?", "answer": "A thing."}"#;
        assert!(recover_json(raw).is_none());
    }

    #[test]
    fn strip_code_fence_requires_leading_fence() {
        let text = "plain { } text";
        assert_eq!(strip_code_fence(text), text);
    }

    #[test]
    fn extract_span_without_closer_keeps_tail() {
        let span = extract_object_span(r#"noise {"a": [1, 2"#).unwrap();
        assert_eq!(span, r#"{"a": [1, 2"#);
    }

    #[test]
    fn soft_repair_leaves_balanced_text_alone() {
        let text = r#"{"a": 1}"#;
        assert_eq!(soft_repair(text), text);
    }
}
