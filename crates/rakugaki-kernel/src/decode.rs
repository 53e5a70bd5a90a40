//! Best-effort decoding of streamed element arrays.
//!
//! A tool call's `elements` argument arrives as a JSON array that may be cut
//! off anywhere while it is still streaming. Decoding is a two-stage parse:
//!
//! 1. strict `serde_json` parse of the whole string;
//! 2. on failure, truncate after the last `}` and close the array, then parse
//!    again.
//!
//! Nothing here returns an error: the render loop has to keep going while a
//! stream is half written, so unusable input becomes [`Decoded::Empty`].
//!
//! Mid-stream input additionally drops its final element. It may have parsed,
//! but the writer could still be appending fields to it.

use serde_json::Value;

use rakugaki_types::DiagramElement;

/// Whether a batch is still streaming or has been delivered in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Partial,
    Final,
}

impl Phase {
    pub fn is_final(self) -> bool {
        matches!(self, Phase::Final)
    }
}

/// Outcome of decoding one raw batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// The input parsed strictly as it was.
    Complete(Vec<DiagramElement>),
    /// Recovered by truncating to the last complete object (and, for partial
    /// input, dropping the trailing element).
    BestEffort(Vec<DiagramElement>),
    /// Nothing usable.
    Empty,
}

impl Decoded {
    pub fn elements(&self) -> &[DiagramElement] {
        match self {
            Decoded::Complete(els) | Decoded::BestEffort(els) => els,
            Decoded::Empty => &[],
        }
    }

    pub fn into_elements(self) -> Vec<DiagramElement> {
        match self {
            Decoded::Complete(els) | Decoded::BestEffort(els) => els,
            Decoded::Empty => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.elements().is_empty()
    }
}

/// Decode `raw` as an element array.
pub fn decode(raw: &str, phase: Phase) -> Decoded {
    let trimmed = raw.trim();
    if !trimmed.starts_with('[') {
        return Decoded::Empty;
    }

    let decoded = match parse_array(trimmed) {
        Some(elements) => Decoded::Complete(elements),
        None => match repair(trimmed) {
            Some(elements) => Decoded::BestEffort(elements),
            None => Decoded::Empty,
        },
    };

    match phase {
        Phase::Final => match decoded {
            Decoded::Complete(els) if els.is_empty() => Decoded::Empty,
            Decoded::BestEffort(els) if els.is_empty() => Decoded::Empty,
            other => other,
        },
        Phase::Partial => {
            let mut elements = decoded.into_elements();
            if elements.len() <= 1 {
                return Decoded::Empty;
            }
            elements.pop();
            Decoded::BestEffort(elements)
        }
    }
}

/// Strict parse. Non-object entries are dropped.
fn parse_array(text: &str) -> Option<Vec<DiagramElement>> {
    let values: Vec<Value> = serde_json::from_str(text).ok()?;
    Some(
        values
            .into_iter()
            .filter_map(DiagramElement::from_value)
            .collect(),
    )
}

/// Truncate after the last closing brace, close the array, and retry.
fn repair(text: &str) -> Option<Vec<DiagramElement>> {
    let end = text.rfind('}')?;
    let mut candidate = String::with_capacity(end + 2);
    candidate.push_str(&text[..=end]);
    candidate.push(']');
    parse_array(&candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRUNCATED: &str = r#"[{"type":"rectangle","id":"a","x":1,"y":1,"width":2},{"type":"rectangle","id":"b","x"#;

    fn ids(decoded: &Decoded) -> Vec<&str> {
        decoded.elements().iter().filter_map(|e| e.id()).collect()
    }

    #[test]
    fn test_non_array_is_empty() {
        assert_eq!(decode("", Phase::Final), Decoded::Empty);
        assert_eq!(decode("{\"type\":\"x\"}", Phase::Final), Decoded::Empty);
        assert_eq!(decode("hello [", Phase::Partial), Decoded::Empty);
    }

    #[test]
    fn test_final_complete() {
        let decoded = decode(
            r#"  [{"type":"ellipse","id":"e1"},{"type":"text","id":"t1"}]  "#,
            Phase::Final,
        );
        assert!(matches!(decoded, Decoded::Complete(_)));
        assert_eq!(ids(&decoded), vec!["e1", "t1"]);
    }

    #[test]
    fn test_final_repairs_truncation() {
        let decoded = decode(TRUNCATED, Phase::Final);
        assert!(matches!(decoded, Decoded::BestEffort(_)));
        assert_eq!(ids(&decoded), vec!["a"]);
    }

    #[test]
    fn test_final_unrepairable_is_empty() {
        assert_eq!(decode("[", Phase::Final), Decoded::Empty);
        assert_eq!(decode(r#"[{"type":"#, Phase::Final), Decoded::Empty);
        assert_eq!(decode("[]", Phase::Final), Decoded::Empty);
    }

    #[test]
    fn test_partial_truncated_single_survivor_is_empty() {
        assert_eq!(decode(TRUNCATED, Phase::Partial), Decoded::Empty);
    }

    #[test]
    fn test_partial_drops_last_even_when_parseable() {
        let raw = r#"[{"type":"a","id":"1"},{"type":"b","id":"2"},{"type":"c","id":"3"}]"#;
        let decoded = decode(raw, Phase::Partial);
        assert!(matches!(decoded, Decoded::BestEffort(_)));
        assert_eq!(ids(&decoded), vec!["1", "2"]);
    }

    #[test]
    fn test_partial_mid_object() {
        let raw = r#"[{"type":"a","id":"1"},{"type":"b","id":"2"},{"type":"c","id":"3","x":"#;
        // Repair keeps 1 and 2; the partial rule then drops 2.
        assert_eq!(ids(&decode(raw, Phase::Partial)), vec!["1"]);
    }

    #[test]
    fn test_partial_single_element_is_empty() {
        assert_eq!(decode(r#"[{"type":"a","id":"1"}]"#, Phase::Partial), Decoded::Empty);
    }

    #[test]
    fn test_nested_braces_truncation() {
        // Last '}' closes a nested object, leaving the outer one open.
        let raw = r#"[{"type":"a","id":"1"},{"type":"b","id":"2","points":{"x":1}"#;
        assert_eq!(decode(raw, Phase::Final), Decoded::Empty);
    }

    #[test]
    fn test_non_objects_skipped() {
        let decoded = decode(r#"[1, "x", {"type":"a","id":"1"}, null]"#, Phase::Final);
        assert_eq!(ids(&decoded), vec!["1"]);
    }
}
