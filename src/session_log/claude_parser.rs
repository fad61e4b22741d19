use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use super::{ParsedSession, Role, SessionMessage, ToolCall};

// ---------------------------------------------------------------------------
// Raw JSONL shapes (private deserialization types)
// ---------------------------------------------------------------------------

// Side fields with an unexpected JSON type decode as `None` instead of
// rejecting the whole line.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    kind: Option<RawEntryKind>,
    #[serde(default, deserialize_with = "lenient")]
    timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    cwd: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    git_branch: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    message: Option<RawMessage>,
    #[serde(default, deserialize_with = "lenient")]
    is_compact_summary: Option<bool>,
}

#[derive(Deserialize, Default, PartialEq)]
#[serde(rename_all = "kebab-case")]
enum RawEntryKind {
    User,
    Assistant,
    FileHistorySnapshot,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default, deserialize_with = "lenient")]
    content: Option<RawContent>,
}

/// Claude Code encodes `content` as either a plain string or an array of
/// typed blocks. We handle both forms here.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Blocks(#[serde(deserialize_with = "decodable_blocks")] Vec<RawBlock>),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawBlock {
    Text {
        #[serde(default, deserialize_with = "lenient")]
        text: Option<String>,
    },
    ToolUse {
        #[serde(default, deserialize_with = "lenient")]
        name: Option<String>,
        #[serde(default)]
        input: Option<serde_json::Value>,
    },
    // tool_result and anything newer
    #[serde(other)]
    Other,
}

/// Decode an optional field, mapping a value of the wrong shape to `None`.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// Decode a block array, dropping blocks that don't fit any known shape.
fn decodable_blocks<'de, D>(deserializer: D) -> std::result::Result<Vec<RawBlock>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(values
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect())
}

impl RawContent {
    /// Text used when this content is a compact summary: the whole string, or
    /// the first text block.
    fn summary_text(&self) -> Option<String> {
        match self {
            RawContent::Text(s) if !s.is_empty() => Some(s.clone()),
            RawContent::Text(_) => None,
            RawContent::Blocks(blocks) => blocks.iter().find_map(|b| match b {
                RawBlock::Text { text: Some(t) } => Some(t.clone()),
                _ => None,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Topic table
// ---------------------------------------------------------------------------

lazy_static! {
    /// Ordered (pattern, topic) pairs. A topic is added on its first match.
    /// Word boundaries are ASCII-only, so accented letters never count as
    /// part of a word.
    static ref TOPIC_PATTERNS: Vec<(Regex, &'static str)> = [
        (r"(?-u:\b)(react|vue|angular|svelte)(?-u:\b)", "frontend"),
        (r"(?-u:\b)(express|fastify|hono|koa)(?-u:\b)", "backend"),
        (r"(?-u:\b)(postgres|mysql|sqlite|mongodb|redis)(?-u:\b)", "database"),
        (r"(?-u:\b)(docker|kubernetes|k8s)(?-u:\b)", "containerization"),
        (r"(?-u:\b)(ci/cd|github actions|workflow)(?-u:\b)", "ci-cd"),
        (r"(?-u:\b)(auth|login|jwt|oauth|session)(?-u:\b)", "authentication"),
        (r"(?-u:\b)(test|vitest|jest|playwright|e2e)(?-u:\b)", "testing"),
        (r"(?-u:\b)(api|rest|graphql|endpoint)(?-u:\b)", "api-development"),
        (r"(?-u:\b)(stripe|payment|checkout)(?-u:\b)", "payments"),
        (r"(?-u:\b)(deploy|vercel|cloudflare|aws)(?-u:\b)", "deployment"),
        (r"(?-u:\b)(typescript|type|interface)(?-u:\b)", "typescript"),
        (r"(?-u:\b)(lint|eslint|prettier)(?-u:\b)", "code-quality"),
        (r"(?-u:\b)(git|branch|commit|merge|pr)(?-u:\b)", "version-control"),
        (r"(?-u:\b)(refactor|clean|optimize)(?-u:\b)", "refactoring"),
        (r"(?-u:\b)(bug|fix|error|debug)(?-u:\b)", "debugging"),
        (r"(?-u:\b)(feature|implement|add|create)(?-u:\b)", "feature-development"),
        (r"(?-u:\b)(mobile|ios|android|react native|expo)(?-u:\b)", "mobile"),
        (r"(?-u:\b)(websocket|realtime|socket)(?-u:\b)", "realtime"),
        (r"(?-u:\b)(cache|caching|redis)(?-u:\b)", "caching"),
        (r"(?-u:\b)(migration|schema|seed)(?-u:\b)", "database-migrations"),
    ]
    .into_iter()
    .map(|(pattern, topic)| {
        let re = Regex::new(&format!("(?i){pattern}")).expect("valid topic regex");
        (re, topic)
    })
    .collect();
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a whole Claude Code transcript file.
///
/// Returns `Ok(None)` when the file holds no usable messages (empty, every
/// line malformed, or nothing but snapshots). Only I/O failures are errors.
pub fn parse_session_file(path: &Path) -> Result<Option<ParsedSession>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read session file: {}", path.display()))?;

    let fallback_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    Ok(parse_session_bytes(&bytes, fallback_id))
}

/// Parse transcript contents already in memory. `fallback_id` is used when no
/// entry carries a `sessionId`.
pub fn parse_session_bytes(bytes: &[u8], fallback_id: &str) -> Option<ParsedSession> {
    let mut builder = SessionBuilder::default();
    for entry in bytes.split(|b| *b == b'\n').filter_map(decode_line) {
        builder.push_entry(entry);
    }
    builder.finish(fallback_id)
}

/// Decode one raw line. Lines with invalid UTF-8 or invalid JSON are dropped.
fn decode_line(line: &[u8]) -> Option<RawEntry> {
    let text = match simdutf8::basic::from_utf8(line) {
        Ok(s) => s,
        Err(_) => {
            debug!("claude_parser: skipping line with invalid UTF-8");
            return None;
        }
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str(trimmed) {
        Ok(entry) => Some(entry),
        Err(e) => {
            debug!("claude_parser: failed to parse JSONL line: {e}");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Session assembly
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SessionBuilder {
    session_id: Option<String>,
    project: Option<String>,
    git_branch: Option<String>,
    summary: Option<String>,
    messages: Vec<SessionMessage>,
    tools_used: Vec<String>,
    files_modified: Vec<String>,
}

impl SessionBuilder {
    fn push_entry(&mut self, entry: RawEntry) {
        keep_first(&mut self.session_id, entry.session_id);
        keep_first(&mut self.project, entry.cwd);
        keep_first(&mut self.git_branch, entry.git_branch);

        // Later summaries replace earlier ones.
        if entry.is_compact_summary == Some(true) {
            let text = entry
                .message
                .as_ref()
                .and_then(|m| m.content.as_ref())
                .and_then(RawContent::summary_text);
            if text.is_some() {
                self.summary = text;
            }
        }

        let role = match entry.kind.unwrap_or_default() {
            RawEntryKind::User => Role::User,
            RawEntryKind::Assistant => Role::Assistant,
            RawEntryKind::FileHistorySnapshot | RawEntryKind::Other => return,
        };

        let Some(content) = entry.message.and_then(|m| m.content) else {
            return;
        };

        let (text, tool_calls) = self.flatten(content);
        let text = text.trim();
        if text.is_empty() && tool_calls.is_empty() {
            return;
        }

        self.messages.push(SessionMessage {
            role,
            content: text.to_string(),
            timestamp: entry.timestamp.as_deref().and_then(parse_timestamp),
            tool_calls,
        });
    }

    /// Collapse content into message text plus tool calls, registering tools
    /// and modified files on the way.
    fn flatten(&mut self, content: RawContent) -> (String, Vec<ToolCall>) {
        let blocks = match content {
            RawContent::Text(s) => return (s, Vec::new()),
            RawContent::Blocks(blocks) => blocks,
        };

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in blocks {
            match block {
                RawBlock::Text { text: Some(t) } if !t.is_empty() => {
                    text.push_str(&t);
                    text.push('\n');
                }
                RawBlock::ToolUse {
                    name: Some(name),
                    input,
                } if !name.is_empty() => {
                    let input = input
                        .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
                    push_unique(&mut self.tools_used, &name);

                    if name == "Edit" || name == "Write" {
                        if let Some(file) = input.get("file_path").and_then(|v| v.as_str()) {
                            if !file.is_empty() {
                                push_unique(&mut self.files_modified, file);
                            }
                        }
                    }

                    tool_calls.push(ToolCall { name, input });
                }
                _ => {}
            }
        }

        (text, tool_calls)
    }

    fn finish(self, fallback_id: &str) -> Option<ParsedSession> {
        if self.messages.is_empty() {
            return None;
        }

        let timestamps = self.messages.iter().filter_map(|m| m.timestamp);
        let start_time = timestamps.clone().min();
        let end_time = timestamps.max();
        let topics = extract_topics(&self.messages, self.summary.as_deref());

        Some(ParsedSession {
            session_id: self
                .session_id
                .unwrap_or_else(|| fallback_id.to_string()),
            project: self.project.unwrap_or_default(),
            git_branch: self.git_branch,
            start_time,
            end_time,
            messages: self.messages,
            summary: self.summary,
            topics,
            files_modified: self.files_modified,
            tools_used: self.tools_used,
        })
    }
}

/// Run the topic table over all message text plus the summary.
pub fn extract_topics(messages: &[SessionMessage], summary: Option<&str>) -> Vec<String> {
    let mut text = messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    if let Some(summary) = summary {
        text.push(' ');
        text.push_str(summary);
    }

    let mut topics: Vec<String> = Vec::new();
    for (pattern, topic) in TOPIC_PATTERNS.iter() {
        if pattern.is_match(&text) {
            push_unique(&mut topics, topic);
        }
    }
    topics
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn keep_first(slot: &mut Option<String>, candidate: Option<String>) {
    if slot.is_none() {
        *slot = candidate.filter(|s| !s.is_empty());
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
