//! Turn Claude Code session transcripts into draft how-to articles.

pub mod content;
pub mod session_log;
