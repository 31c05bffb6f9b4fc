//! Parsing of the question-extraction executable's per-chunk output.
//!
//! Output that cannot be read as a JSON array of questions never fails the
//! job: the chunk contributes zero questions and a warning is logged.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One question as produced by the extraction executable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedQuestion {
    pub question: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub answer: String,
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("output is empty")]
    Empty,

    #[error("output is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("output is JSON but not an array")]
    NotAnArray,
}

static RE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").unwrap());

/// Removes one surrounding Markdown code fence, if present.
pub fn strip_code_fence(raw: &str) -> &str {
    match RE_FENCE.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => raw.trim(),
    }
}

/// Parses one chunk's raw output strictly.
///
/// Items inside the array that do not have the question shape are skipped
/// individually.
pub fn parse_chunk_output(raw: &str) -> Result<Vec<ExtractedQuestion>, ParseError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(ParseError::Empty);
    }

    let value: serde_json::Value = serde_json::from_str(body)?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        _ => return Err(ParseError::NotAnArray),
    };

    let total = items.len();
    let questions: Vec<ExtractedQuestion> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if questions.len() < total {
        tracing::warn!(
            skipped = total - questions.len(),
            "Skipped malformed question items"
        );
    }

    Ok(questions)
}

/// Tolerant variant used by the pipeline: any parse error yields no questions.
pub fn parse_chunk_output_lenient(chunk_index: usize, raw: &str) -> Vec<ExtractedQuestion> {
    match parse_chunk_output(raw) {
        Ok(questions) => questions,
        Err(e) => {
            tracing::warn!(chunk = chunk_index, error = %e, "Discarding unparseable chunk output");
            Vec::new()
        }
    }
}

/// Drops items whose question text is blank and trims what remains.
pub fn validate(questions: Vec<ExtractedQuestion>) -> Vec<ExtractedQuestion> {
    questions
        .into_iter()
        .filter_map(|mut q| {
            let text = q.question.trim();
            if text.is_empty() {
                tracing::debug!("Dropping question with blank text");
                return None;
            }
            q.question = text.to_string();
            Some(q)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_array() {
        let questions =
            parse_chunk_output(r#"[{"question":"2+2?","options":["3","4"],"answer":"4"}]"#).unwrap();
        assert_eq!(
            questions,
            vec![ExtractedQuestion {
                question: "2+2?".to_string(),
                options: vec!["3".to_string(), "4".to_string()],
                answer: "4".to_string(),
            }]
        );
    }

    #[test]
    fn test_parse_fenced_output() {
        let raw = "```json\n[{\"question\":\"Q\",\"options\":[\"a\"],\"answer\":\"a\"}]\n```\n";
        assert_eq!(parse_chunk_output(raw).unwrap().len(), 1);

        let raw = "```\n[]\n```";
        assert!(parse_chunk_output(raw).unwrap().is_empty());
    }

    #[test]
    fn test_answer_defaults_to_empty() {
        let questions = parse_chunk_output(r#"[{"question":"Q","options":["a","b"]}]"#).unwrap();
        assert_eq!(questions[0].answer, "");
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            parse_chunk_output("[{\"question\": "),
            Err(ParseError::Json(_))
        ));
    }

    #[test]
    fn test_non_array() {
        assert!(matches!(
            parse_chunk_output(r#"{"question":"Q","options":[]}"#),
            Err(ParseError::NotAnArray)
        ));
    }

    #[test]
    fn test_empty_output() {
        assert!(matches!(parse_chunk_output("  \n"), Err(ParseError::Empty)));
    }

    #[test]
    fn test_malformed_items_skipped() {
        let raw = r#"[
            {"question":"ok","options":["a"]},
            {"question":"no options"},
            "not an object",
            {"question":"also ok","options":[],"answer":"x"}
        ]"#;
        let questions = parse_chunk_output(raw).unwrap();
        let texts: Vec<_> = questions.iter().map(|q| q.question.as_str()).collect();
        assert_eq!(texts, vec!["ok", "also ok"]);
    }

    #[test]
    fn test_lenient_parse_yields_nothing_on_error() {
        assert!(parse_chunk_output_lenient(0, "garbage").is_empty());
    }

    #[test]
    fn test_validate_drops_blank_questions() {
        let questions = vec![
            ExtractedQuestion {
                question: "  ".to_string(),
                options: vec![],
                answer: String::new(),
            },
            ExtractedQuestion {
                question: " 2+2? ".to_string(),
                options: vec!["4".to_string()],
                answer: "4".to_string(),
            },
        ];
        let valid = validate(questions);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].question, "2+2?");
    }
}
