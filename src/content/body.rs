use super::niche::Niche;
use crate::session_log::ParsedSession;

const MAX_LISTED_FILES: usize = 5;
const MAX_SUMMARY_CHARS: usize = 1000;

/// Which voice the article is written in. Chosen once per article so every
/// section agrees.
#[derive(Debug, Clone, Copy)]
pub enum Angle<'a> {
    /// Confident niche: platform and app type appear throughout.
    Niche(&'a Niche),
    /// Topic-driven fallback phrasing.
    Topics,
}

/// Render the markdown body. Sections, in order: Introduction, What We're
/// Building, Tools and Techniques, Key Patterns, Session Summary, Conclusion.
pub fn render_body(session: &ParsedSession, angle: Angle<'_>) -> String {
    let mut sections: Vec<String> = Vec::new();

    sections.push("## Introduction\n".to_string());
    match angle {
        Angle::Niche(niche) => {
            let platform_clause = if niche.has_platform() {
                format!(" using {}", niche.platform)
            } else {
                String::new()
            };
            sections.push(format!(
                "This guide shows you how to build {} applications{platform_clause} with vibe coding. \
                 Vibe coding is AI-assisted development: you describe what you want, and AI handles the implementation.\n",
                niche.app_type.to_lowercase()
            ));
            if niche.has_platform() {
                sections.push(format!(
                    "We'll focus specifically on the {} ecosystem, covering the patterns and practices that work best for {} development.\n",
                    niche.platform,
                    niche.app_type.to_lowercase()
                ));
            }
        }
        Angle::Topics => {
            sections.push(format!(
                "This guide covers {} based on real-world vibe coding sessions. \
                 Vibe coding is an AI-assisted development approach where you describe what you want and let AI handle the implementation details.\n",
                topic_list(session, ", ")
            ));
        }
    }

    if !session.files_modified.is_empty() {
        sections.push("## What We're Building\n".to_string());
        sections.push(format!(
            "In this session, we modified {} files to implement the feature. The key files involved:\n",
            session.files_modified.len()
        ));
        for file in session.files_modified.iter().take(MAX_LISTED_FILES) {
            sections.push(format!("- `{}`", short_path(file)));
        }
        sections.push(String::new());
    }

    if !session.tools_used.is_empty() {
        sections.push("## Tools and Techniques\n".to_string());
        sections.push("The following tools were used in this vibe coding session:\n".to_string());
        for tool in &session.tools_used {
            sections.push(format!("- **{tool}**: {}", tool_description(tool)));
        }
        sections.push(String::new());
    }

    sections.push("## Key Patterns\n".to_string());
    sections.push(format!(
        "When working with {}, several patterns emerged:\n",
        session.topics.first().map_or("this technology", String::as_str)
    ));
    sections.push("1. **Start with the end in mind** - Describe the desired outcome clearly".to_string());
    sections.push("2. **Iterate quickly** - Make small changes and verify frequently".to_string());
    sections.push("3. **Trust but verify** - Use screenshots and tests to confirm behavior".to_string());
    sections.push(String::new());

    if let Some(first_para) = session
        .summary
        .as_deref()
        .and_then(|s| s.split("\n\n").next())
        .filter(|p| !p.is_empty() && p.chars().count() < MAX_SUMMARY_CHARS)
    {
        sections.push("## Session Summary\n".to_string());
        sections.push(first_para.to_string());
        sections.push(String::new());
    }

    sections.push("## Conclusion\n".to_string());
    match angle {
        Angle::Niche(niche) => {
            let platform_clause = if niche.has_platform() {
                format!(" in {}", niche.platform)
            } else {
                String::new()
            };
            sections.push(format!(
                "Vibe coding transforms how we build {} applications{platform_clause}. \
                 By focusing on outcomes rather than syntax, we can ship faster and with fewer errors.\n",
                niche.app_type.to_lowercase()
            ));
        }
        Angle::Topics => {
            sections.push(format!(
                "Vibe coding transforms how we approach {}. \
                 By focusing on outcomes rather than syntax, we can build faster and with fewer errors.\n",
                topic_list(session, " and ")
            ));
        }
    }
    sections.push(format!(
        "This guide was derived from a real vibe coding session with {} interactions.\n",
        session.messages.len()
    ));

    sections.join("\n")
}

fn topic_list(session: &ParsedSession, sep: &str) -> String {
    if session.topics.is_empty() {
        "this project".to_string()
    } else {
        session.topics.join(sep)
    }
}

/// Last two path segments, e.g. `/repo/src/app.ts` -> `src/app.ts`.
pub fn short_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let start = segments.len().saturating_sub(2);
    segments[start..].join("/")
}

/// One-line description of a Claude Code tool for the article.
pub fn tool_description(name: &str) -> &'static str {
    match name {
        "Read" => "Reading and understanding existing code",
        "Edit" => "Making targeted changes to files",
        "Write" => "Creating new files",
        "Bash" => "Running shell commands",
        "Glob" => "Finding files by pattern",
        "Grep" => "Searching code content",
        "Task" => "Spawning specialized agents for complex tasks",
        "WebFetch" => "Fetching documentation and resources",
        "WebSearch" => "Searching for solutions online",
        _ => "Specialized development tool",
    }
}
