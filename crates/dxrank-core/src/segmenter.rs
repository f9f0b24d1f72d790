//! # Text Segmenter
//!
//! Turns raw model output into an ordered list of candidate diagnoses.
//!
//! All functions here are pure: no I/O, no allocation beyond the returned
//! values, and empty input yields empty output.

use crate::types::DiagnosisLine;
use regex::Regex;
use std::sync::LazyLock;

// =============================================================================
// PATTERNS
// =============================================================================

/// Leading list marker: optional emphasis, then `1.`, `2)`, `-`, `•` or `+`.
static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[*_]*\s*(?:\d+\s*[.)]|[-•+](?:\s|$))\s*").expect("valid list marker regex")
});

/// Trailing parenthesized synonym.
static SYNONYM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*)\((.*)\)\s*$").expect("valid synonym regex"));

/// A line that opens with a "Differential Diagnosis" header.
static DD_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[^A-Za-z]*differential diagnosis").expect("valid header regex")
});

/// Lower-case phrases marking a line as commentary rather than a diagnosis.
pub const BOILERPLATE_PHRASES: &[&str] = &[
    "differential diagnosis",
    "here is the list",
    "here is a list",
    "here are the",
    "based on the clinical features",
    "based on the symptoms",
    "based on the given case",
    "based on the limited information",
    "based on the clinical presentation",
    "based on the case",
    "based on the provided",
    "here are the candidate diagnoses",
    "listed by probability",
    "candidate diagnoses",
    "potential diagnoses",
    "ranked by likelihood",
    "these conditions are",
    "note: ",
    "i'm sorry",
    "please",
    "given the complexity",
    "these diseases are",
    "if you have",
    "if further details",
    "the list above",
    "these disorders are",
];

// =============================================================================
// LINE CLEANING
// =============================================================================

/// Strip a leading list marker and surrounding markdown emphasis.
#[must_use]
pub fn clean_line(line: &str) -> String {
    let without_marker = LIST_MARKER.replace(line, "");
    without_marker
        .replace("**", "")
        .trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace())
        .to_string()
}

/// Case-insensitive match against [`BOILERPLATE_PHRASES`].
#[must_use]
pub fn is_boilerplate(line: &str) -> bool {
    let lower = line.to_lowercase();
    BOILERPLATE_PHRASES
        .iter()
        .any(|phrase| lower.contains(phrase))
}

/// Split text into ranked diagnosis lines.
///
/// Empty and boilerplate lines are dropped; ranks count the kept lines only.
#[must_use]
pub fn segment(text: &str) -> Vec<DiagnosisLine> {
    text.lines()
        .map(clean_line)
        .filter(|line| !line.is_empty() && !is_boilerplate(line))
        .enumerate()
        .map(|(index, text)| DiagnosisLine {
            rank: index + 1,
            text,
        })
        .collect()
}

// =============================================================================
// WHOLE-ANSWER HELPERS
// =============================================================================

/// Split `"Name (Synonym)"` into `("Name", Some("Synonym"))`.
#[must_use]
pub fn split_synonym(diagnosis: &str) -> (String, Option<String>) {
    match SYNONYM.captures(diagnosis) {
        Some(caps) => {
            let main = caps.get(1).map_or("", |m| m.as_str()).trim();
            let synonym = caps.get(2).map_or("", |m| m.as_str()).trim();
            (main.to_string(), Some(synonym.to_string()))
        }
        None => (diagnosis.to_string(), None),
    }
}

/// Everything from the first enumerated item (`"1."`) onwards.
///
/// Returns an empty string when the text has no enumerated item.
#[must_use]
pub fn split_from_first_item(text: &str) -> &str {
    text.find("1.").map_or("", |position| &text[position..])
}

/// Remove lines that open with a "Differential Diagnosis" header.
#[must_use]
pub fn strip_header(text: &str) -> String {
    text.split('\n')
        .filter(|line| !DD_HEADER.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(lines: &[DiagnosisLine]) -> Vec<&str> {
        lines.iter().map(|line| line.text.as_str()).collect()
    }

    #[test]
    fn header_is_dropped_and_numbers_removed() {
        let lines = segment("Differential Diagnosis:\n1. Condition A\n2. Condition B");
        assert_eq!(texts(&lines), vec!["Condition A", "Condition B"]);
        assert_eq!(lines[0].rank, 1);
        assert_eq!(lines[1].rank, 2);
    }

    #[test]
    fn clean_line_variants() {
        assert_eq!(clean_line("1. Condition A"), "Condition A");
        assert_eq!(clean_line("*1. Condition A*"), "Condition A");
        assert_eq!(clean_line("**3. Marfan syndrome**"), "Marfan syndrome");
        assert_eq!(clean_line("2) Ehlers-Danlos syndrome"), "Ehlers-Danlos syndrome");
        assert_eq!(clean_line("- Loeys-Dietz syndrome"), "Loeys-Dietz syndrome");
        assert_eq!(clean_line("10. **Homocystinuria**"), "Homocystinuria");
        assert_eq!(clean_line("Condition A"), "Condition A");
        assert_eq!(clean_line(""), "");
    }

    #[test]
    fn hyphenated_names_keep_their_hyphen() {
        assert_eq!(clean_line("X-linked hypophosphatemia"), "X-linked hypophosphatemia");
    }

    #[test]
    fn boilerplate_is_case_insensitive() {
        assert!(is_boilerplate("Based on the clinical presentation, consider:"));
        assert!(is_boilerplate("I'M SORRY, I cannot help"));
        assert!(!is_boilerplate("Marfan syndrome"));
    }

    #[test]
    fn ranks_skip_dropped_lines() {
        let lines = segment("1. A\n\nPlease consult a doctor\n2. B");
        assert_eq!(texts(&lines), vec!["A", "B"]);
        assert_eq!(lines[1].rank, 2);
    }

    #[test]
    fn empty_input() {
        assert!(segment("").is_empty());
        assert_eq!(split_from_first_item(""), "");
        assert_eq!(strip_header(""), "");
    }

    #[test]
    fn synonym_split() {
        assert_eq!(
            split_synonym("Marfan syndrome (MFS)"),
            ("Marfan syndrome".to_string(), Some("MFS".to_string()))
        );
        assert_eq!(
            split_synonym("Marfan syndrome"),
            ("Marfan syndrome".to_string(), None)
        );
        assert_eq!(split_synonym(""), (String::new(), None));
    }

    #[test]
    fn split_from_first_item_cases() {
        assert_eq!(
            split_from_first_item("Differential Diagnosis:\n1. Condition A\n2. Condition B"),
            "1. Condition A\n2. Condition B"
        );
        assert_eq!(
            split_from_first_item("1. Condition A\n2. Condition B"),
            "1. Condition A\n2. Condition B"
        );
        assert_eq!(
            split_from_first_item("Differential Diagnosis:\nCondition A\nCondition B"),
            ""
        );
    }

    #[test]
    fn strip_header_removes_only_header_lines() {
        assert_eq!(
            strip_header("Differential Diagnosis:\n1. Condition A\n2. Condition B"),
            "1. Condition A\n2. Condition B"
        );
        assert_eq!(
            strip_header("**Differential diagnosis**\n1. A"),
            "1. A"
        );
        assert_eq!(strip_header("1. Condition A"), "1. Condition A");
    }
}
