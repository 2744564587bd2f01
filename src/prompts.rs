//! Prompt construction for extraction and merge-comparison calls.
//!
//! Both prompts pack a whole batch into one model invocation to amortize
//! call overhead, label every entry by position, and pin down the exact
//! JSON shape the response must use. The recovery parser
//! ([`recovery`](crate::recovery)) relies on the per-segment record shape
//! requested here when it repairs truncated responses.

use std::fmt::Write;

/// Build the batch extraction prompt for `segments`.
///
/// Each segment is labeled `--- SEGMENT i ---` and the response must map
/// every index back through `segment_id`.
pub(crate) fn extraction_prompt(segments: &[&str]) -> String {
    let mut listing = String::new();
    for (idx, text) in segments.iter().enumerate() {
        // write! to a String cannot fail.
        let _ = write!(listing, "\n\n--- SEGMENT {idx} ---\n{text}");
    }

    format!(
        r#"You are a study assistant creating flashcards from educational content.

Extract question-answer pairs from each text segment below. Return ONLY valid JSON.

CRITICAL RULES:
1. NEVER create questions or answers that are empty or just whitespace
2. Questions MUST end with a question mark (?)
3. Answers MUST be complete sentences or phrases with actual content
4. Each segment MUST have at least 1 QA pair (unless the segment is meaningless)
5. Keep answers clear and concise (under 200 characters)
6. Questions should test understanding, not just repeat the text
7. You MUST complete the entire JSON - include ALL {count} segments

GOOD EXAMPLES:
{{"question": "What is photosynthesis?", "answer": "The process by which plants convert light energy into chemical energy using chlorophyll."}}
{{"question": "What organelle performs photosynthesis?", "answer": "Chloroplasts"}}

BAD EXAMPLES (DO NOT DO THIS):
{{"question": "", "answer": "Something"}}
{{"question": "What is X?", "answer": ""}}
{{"question": "Tell me about it", "answer": "It"}}

Text Segments:
{listing}

Return this exact JSON structure (ensure ALL segments 0-{last} are included):
{{
"segments": [
    {{"segment_id": 0, "qa_pairs": [{{"question": "What is X?", "answer": "X is a complete answer with actual content."}}]}},
    {{"segment_id": 1, "qa_pairs": [{{"question": "What is Y?", "answer": "Y is another complete answer."}}]}}
]
}}

JSON:"#,
        count = segments.len(),
        last = segments.len().saturating_sub(1),
    )
}

/// Build the batch merge-comparison prompt.
///
/// Each comparison lists up to the first three questions from both sides
/// of an adjacent chunk pair, labeled `--- COMPARISON i ---`.
pub(crate) fn merge_prompt(comparisons: &[(Vec<&str>, Vec<&str>)]) -> String {
    let mut listing = String::new();
    for (idx, (left, right)) in comparisons.iter().enumerate() {
        let _ = write!(
            listing,
            "\n\n--- COMPARISON {idx} ---\nGroup A: {left:?}\nGroup B: {right:?}"
        );
    }

    format!(
        r#"Analyze these pairs of flashcard question groups and determine if each pair relates to the same topic.
{listing}

Return JSON with decisions for ALL comparisons:
{{"comparisons": [{{"comparison_id": 0, "should_merge": true, "reason": "Both about photosynthesis"}}, {{"comparison_id": 1, "should_merge": false, "reason": "Different topics"}}]}}

Return ONLY valid JSON:"#
    )
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_prompt_labels_every_segment() {
        let prompt = extraction_prompt(&["first segment text", "second segment text"]);
        assert!(prompt.contains("--- SEGMENT 0 ---\nfirst segment text"));
        assert!(prompt.contains("--- SEGMENT 1 ---\nsecond segment text"));
        assert!(prompt.contains("ALL segments 0-1"));
        assert!(prompt.contains(r#""segment_id""#));
    }

    #[test]
    fn merge_prompt_lists_both_groups() {
        let prompt = merge_prompt(&[(
            vec!["What is A?", "What is B?"],
            vec!["What is C?"],
        )]);
        assert!(prompt.contains("--- COMPARISON 0 ---"));
        assert!(prompt.contains("What is A?"));
        assert!(prompt.contains("What is C?"));
        assert!(prompt.contains(r#""comparison_id""#));
    }
}
