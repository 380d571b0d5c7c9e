//! Repair passes for model output before JSON decoding.
//!
//! Models wrap their answer in code fences, emit raw newlines inside string
//! values, or add chatter around the object. Each pass is a `&str -> String`
//! (or a slice lookup) applied in order by [`decode_copy`].

use enricher_shared::GeneratedCopy;

/// Field names the decoded object must carry.
pub(crate) const COPY_FIELDS: [&str; 3] = ["summary", "full_description", "advantages"];

/// Repair `raw` and decode it as [`GeneratedCopy`].
///
/// The sanitized text is decoded as-is first; only if that fails is the
/// smallest object containing every copy field cut out of it.
pub fn decode_copy(raw: &str) -> Result<GeneratedCopy, serde_json::Error> {
    let sanitized = escape_controls_in_strings(&strip_code_fences(raw));

    match serde_json::from_str(&sanitized) {
        Ok(copy) => Ok(copy),
        Err(err) => match find_copy_object(&sanitized) {
            Some(object) => serde_json::from_str(object),
            None => Err(err),
        },
    }
}

// ---------------------------------------------------------------------------
// Pass 1: Code fences
// ---------------------------------------------------------------------------

/// Remove a leading ```` ```json ```` / ```` ``` ```` and a trailing ```` ``` ````.
pub(crate) fn strip_code_fences(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    }
    if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim().to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Control characters inside strings
// ---------------------------------------------------------------------------

/// Escape raw line breaks and tabs that appear inside quoted strings.
///
/// Bare `\r` inside a string is dropped, not escaped. Characters outside
/// strings are left alone.
pub(crate) fn escape_controls_in_strings(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escape_next = false;

    for ch in text.chars() {
        if escape_next {
            out.push(ch);
            escape_next = false;
            continue;
        }
        match ch {
            '\\' => {
                escape_next = true;
                out.push(ch);
            }
            '"' => {
                in_string = !in_string;
                out.push(ch);
            }
            '\n' if in_string => out.push_str("\\n"),
            '\r' if in_string => {}
            '\t' if in_string => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Pass 3: Object extraction
// ---------------------------------------------------------------------------

/// Smallest brace-balanced object that mentions every copy field.
///
/// Braces inside strings are ignored. This is a heuristic, not a parser: a
/// payload that quotes the field names elsewhere can fool it.
pub(crate) fn find_copy_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut opens: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;
    let mut best: Option<(usize, usize)> = None;

    // Only ASCII bytes are inspected, so byte offsets stay on char boundaries.
    for (i, &b) in bytes.iter().enumerate() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match b {
            b'\\' => escape_next = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => opens.push(i),
            b'}' if !in_string => {
                let Some(start) = opens.pop() else { continue };
                let candidate = &text[start..=i];
                let has_all = COPY_FIELDS
                    .iter()
                    .all(|field| candidate.contains(&format!("\"{field}\"")));
                let shorter = best.is_none_or(|(s, e)| i - start < e - s);
                if has_all && shorter {
                    best = Some((start, i));
                }
            }
            _ => {}
        }
    }

    best.map(|(start, end)| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN: &str =
        r#"{"summary": "Short", "full_description": "Long text", "advantages": "Durable"}"#;

    #[test]
    fn decodes_clean_object() {
        let copy = decode_copy(CLEAN).expect("decode");
        assert_eq!(copy.summary, "Short");
        assert_eq!(copy.full_description, "Long text");
        assert_eq!(copy.advantages, "Durable");
    }

    #[test]
    fn strips_json_fence() {
        let fenced = format!("```json\n{CLEAN}\n```");
        assert_eq!(strip_code_fences(&fenced), CLEAN);
        assert!(decode_copy(&fenced).is_ok());
    }

    #[test]
    fn strips_bare_fence() {
        let fenced = format!("  ```\n{CLEAN}```  ");
        assert_eq!(strip_code_fences(&fenced), CLEAN);
    }

    #[test]
    fn literal_newline_inside_string_is_preserved() {
        let raw = "{\"summary\": \"Short\", \"full_description\": \"First paragraph.\nSecond paragraph.\", \"advantages\": \"Durable\"}";
        assert!(serde_json::from_str::<GeneratedCopy>(raw).is_err());

        let copy = decode_copy(raw).expect("decode after repair");
        assert_eq!(copy.full_description, "First paragraph.\nSecond paragraph.");
    }

    #[test]
    fn tabs_are_escaped_and_carriage_returns_dropped() {
        let raw = "{\"summary\": \"a\tb\", \"full_description\": \"line\r\nnext\", \"advantages\": \"x\"}";
        let copy = decode_copy(raw).expect("decode");
        assert_eq!(copy.summary, "a\tb");
        assert_eq!(copy.full_description, "line\nnext");
    }

    #[test]
    fn whitespace_between_tokens_is_untouched() {
        let raw = "{\n\t\"summary\": \"a\"\n}";
        assert_eq!(escape_controls_in_strings(raw), raw);
    }

    #[test]
    fn escaped_quote_does_not_end_string() {
        let raw = "{\"summary\": \"say \\\"hi\\\"\nnow\", \"full_description\": \"d\", \"advantages\": \"v\"}";
        let copy = decode_copy(raw).expect("decode");
        assert_eq!(copy.summary, "say \"hi\"\nnow");
    }

    #[test]
    fn extracts_object_from_surrounding_chatter() {
        let raw = format!("Here is the content you asked for:\n{CLEAN}\nLet me know if {{you}} need more.");
        let copy = decode_copy(&raw).expect("decode");
        assert_eq!(copy.advantages, "Durable");
    }

    #[test]
    fn picks_smallest_object_containing_all_fields() {
        let raw = format!(r#"{{"meta": {{"model": "x"}}, "result": {CLEAN}}}"#);
        assert_eq!(find_copy_object(&raw), Some(CLEAN));
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let raw = r#"note: {"summary": "uses } and {", "full_description": "d", "advantages": "v"} end"#;
        let copy = decode_copy(raw).expect("decode");
        assert_eq!(copy.summary, "uses } and {");
    }

    #[test]
    fn object_missing_a_field_is_rejected() {
        let raw = r#"Sure! {"summary": "a", "full_description": "b"}"#;
        assert!(find_copy_object(raw).is_none());
        assert!(decode_copy(raw).is_err());
    }

    #[test]
    fn non_json_is_an_error() {
        assert!(decode_copy("I cannot help with that.").is_err());
        assert!(decode_copy("").is_err());
    }
}
