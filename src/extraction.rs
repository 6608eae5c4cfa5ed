// Layered JSON extraction from free-form agent output
//
// Agents are asked to answer with a delimited JSON object, but in practice
// the output shape varies: bare JSON, JSON inside markdown fences, JSON
// buried in explanatory prose, or no JSON at all. Each tier below handles
// one of those shapes; the final fallback guarantees a schema-shaped value
// so parsing failures never propagate past this module.

use serde_json::{Map, Value};

/// Delimiters agents are instructed to wrap their JSON payload with.
pub const JSON_START_DELIMITER: &str = "<<<JSON_START>>>";
pub const JSON_END_DELIMITER: &str = "<<<JSON_END>>>";

/// How many characters of unparseable content to include in diagnostics.
/// Full payloads are never logged.
const PREVIEW_CHARS: usize = 200;

/// Outcome annotation for one extraction attempt. Never fails the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    /// A JSON object was recovered and every expected key was present.
    Ok,
    /// A JSON object was recovered but one or more expected keys had to be
    /// filled with defaults.
    Partial,
    /// No JSON object could be recovered; the payload is all defaults.
    Failed,
}

/// Default shape for an expected key when the agent omitted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    List,
    Text,
    Number,
    Flag,
    Object,
}

impl FieldKind {
    fn default_value(self) -> Value {
        match self {
            Self::List => Value::Array(Vec::new()),
            Self::Text => Value::String(String::new()),
            Self::Number => Value::from(0),
            Self::Flag => Value::Bool(false),
            Self::Object => Value::Object(Map::new()),
        }
    }
}

/// The keys a given role's output is expected to contain, with the default
/// used for each when missing.
#[derive(Debug, Clone)]
pub struct ExpectedSchema {
    fields: Vec<(&'static str, FieldKind)>,
}

impl ExpectedSchema {
    pub fn new(fields: Vec<(&'static str, FieldKind)>) -> Self {
        Self { fields }
    }

    /// Evidence Curator output: structured observations plus invoice data.
    pub fn curator() -> Self {
        Self::new(vec![
            ("evidence", FieldKind::List),
            ("expense", FieldKind::Object),
            ("fnol_summary", FieldKind::Text),
        ])
    }

    /// Policy Interpreter output: coverage position with citations.
    pub fn interpreter() -> Self {
        Self::new(vec![
            ("coverage_position", FieldKind::Text),
            ("rationale", FieldKind::Text),
            ("sensitivity", FieldKind::Text),
            ("citations", FieldKind::List),
        ])
    }

    /// Compliance Reviewer output: objections and the approval verdict.
    pub fn reviewer() -> Self {
        Self::new(vec![
            ("objections", FieldKind::List),
            ("approval", FieldKind::Flag),
            ("summary", FieldKind::Text),
            ("recommendations", FieldKind::List),
            ("needs_user_input", FieldKind::Flag),
        ])
    }

    /// The canonical all-defaults payload for this schema.
    pub fn empty_payload(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(name, kind)| (name.to_string(), kind.default_value()))
            .collect()
    }

    /// Fill missing expected keys with defaults. Returns how many were filled.
    fn fill_defaults(&self, payload: &mut Map<String, Value>) -> usize {
        let mut filled = 0;
        for (name, kind) in &self.fields {
            if !payload.contains_key(*name) {
                payload.insert(name.to_string(), kind.default_value());
                filled += 1;
            }
        }
        filled
    }
}

/// Result of one extraction pass: the payload is always shaped like the
/// schema, the status says how much of it came from the agent.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub structured: Map<String, Value>,
    pub status: ExtractionStatus,
}

/// Extract a structured payload from raw agent output.
///
/// Tiers, first success wins:
/// 1. JSON between `<<<JSON_START>>>` / `<<<JSON_END>>>` delimiters
/// 2. JSON inside markdown code fences
/// 3. The whole trimmed content as JSON
/// 4. Balanced-brace scan for a JSON object embedded in prose
/// 5. Canonical empty defaults, status `Failed`
///
/// Deterministic: identical input always yields an identical payload.
pub fn extract(raw: &str, schema: &ExpectedSchema) -> Extraction {
    let text = raw.trim();

    let recovered = extract_delimited(text)
        .or_else(|| extract_fenced(text))
        .or_else(|| extract_whole(text))
        .or_else(|| extract_embedded(text));

    match recovered {
        Some(mut payload) => {
            let filled = schema.fill_defaults(&mut payload);
            let status = if filled == 0 {
                ExtractionStatus::Ok
            } else {
                ExtractionStatus::Partial
            };
            Extraction {
                structured: payload,
                status,
            }
        }
        None => {
            tracing::warn!(
                preview = preview(text),
                "No JSON object recovered from agent output, using empty defaults"
            );
            Extraction {
                structured: schema.empty_payload(),
                status: ExtractionStatus::Failed,
            }
        }
    }
}

/// Wrap a JSON value with the extraction delimiters. Used for synthetic
/// turns so their raw content round-trips through tier 1.
pub fn format_delimited(value: &Value) -> String {
    format!(
        "{JSON_START_DELIMITER}\n{}\n{JSON_END_DELIMITER}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    )
}

/// Bounded preview of agent content for diagnostics.
pub fn preview(text: &str) -> &str {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ── Extraction tiers ───────────────────────────────────────────────────────

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Tier 1: JSON between the explicit delimiter pair.
fn extract_delimited(text: &str) -> Option<Map<String, Value>> {
    let start = text.find(JSON_START_DELIMITER)?;
    let interior_start = start + JSON_START_DELIMITER.len();
    let end = text[interior_start..].find(JSON_END_DELIMITER)? + interior_start;
    parse_object(text[interior_start..end].trim())
}

/// Tier 2: JSON inside ```json ... ``` or ``` ... ``` fences.
fn extract_fenced(text: &str) -> Option<Map<String, Value>> {
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find("```") {
        let fence_start = search_from + rel + 3;
        let rest = &text[fence_start..];
        // Skip an optional language tag on the fence line
        let body_start = rest.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &rest[body_start..];
        let Some(close) = body.find("```") else {
            return None;
        };
        if let Some(map) = parse_object(body[..close].trim()) {
            return Some(map);
        }
        search_from = fence_start + body_start + close + 3;
    }
    None
}

/// Tier 3: the entire trimmed content as JSON.
fn extract_whole(text: &str) -> Option<Map<String, Value>> {
    parse_object(text)
}

/// Tier 4: scan for `{`, find the matching `}` by balanced-brace counting
/// (honoring JSON string escaping), and parse that substring. If the
/// candidate does not parse, continue scanning from the next `{`.
fn extract_embedded(text: &str) -> Option<Map<String, Value>> {
    let bytes = text.as_bytes();
    let mut start = 0;

    while let Some(rel) = text[start..].find('{') {
        let open = start + rel;
        if let Some(close) = matching_brace(bytes, open) {
            if let Some(map) = parse_object(&text[open..=close]) {
                return Some(map);
            }
        }
        start = open + 1;
    }
    None
}

/// Index of the `}` matching the `{` at `open`, or `None` if unbalanced.
fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
