pub mod body;
pub mod niche;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::session_log::claude_parser::parse_session_file;
use crate::session_log::ParsedSession;
use body::{render_body, Angle};
use niche::{identify_niche, Niche};

/// Niche confidence above which the niche title and voice are used.
pub const NICHE_CONFIDENCE_THRESHOLD: f64 = 0.3;

/// Most articles a single batch run writes.
pub const BATCH_LIMIT: usize = 10;

/// An article ready to be written to disk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedContent {
    pub title: String,
    pub slug: String,
    pub category: String,
    pub tags: Vec<String>,
    pub summary: String,
    pub body: String,
    pub source_session: String,
    pub generated_at: DateTime<Utc>,
}

/// Specific topics mapped to broader article subjects.
fn generalize_topic(topic: &str) -> Option<&'static str> {
    let general = match topic {
        "react" => "React Applications",
        "vue" => "Vue.js Applications",
        "express" => "Node.js Backend Services",
        "postgres" => "PostgreSQL Databases",
        "mongodb" => "MongoDB Applications",
        "docker" => "Containerized Applications",
        "kubernetes" => "Kubernetes Deployments",
        "github-actions" => "CI/CD Pipelines",
        "authentication" => "User Authentication Systems",
        "testing" => "Test-Driven Development",
        "api-development" => "RESTful APIs",
        "payments" => "Payment Processing",
        "deployment" => "Production Deployments",
        "typescript" => "TypeScript Projects",
        "mobile" => "Mobile Applications",
        "realtime" => "Real-time Features",
        "database-migrations" => "Database Schema Management",
        _ => return None,
    };
    Some(general)
}

/// Build an article from a session, identifying its niche against the
/// session's working directory.
pub fn generate_content(session: &ParsedSession) -> GeneratedContent {
    let repo = (!session.project.is_empty()).then(|| Path::new(&session.project));
    let niche = identify_niche(session, repo);
    generate_content_with_niche(session, &niche)
}

/// Build an article from a session and an already identified niche.
pub fn generate_content_with_niche(session: &ParsedSession, niche: &Niche) -> GeneratedContent {
    let confident = niche.confidence > NICHE_CONFIDENCE_THRESHOLD;

    let (title, angle, summary) = if confident {
        let platform_clause = if niche.has_platform() {
            format!(" with {}", niche.platform)
        } else {
            String::new()
        };
        (
            niche.title.clone(),
            Angle::Niche(niche),
            format!(
                "A vibe coding guide to building {} applications{platform_clause}",
                niche.app_type.to_lowercase()
            ),
        )
    } else {
        let summary = if session.topics.is_empty() {
            "A vibe coding guide drawn from a real session".to_string()
        } else {
            format!("A vibe coding guide to {}", session.topics.join(", "))
        };
        (generate_title(session), Angle::Topics, summary)
    };

    let mut tags = session.topics.clone();
    for tag in [
        niche.platform.to_lowercase(),
        niche
            .app_type
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
            .to_lowercase(),
    ] {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    GeneratedContent {
        slug: slugify(&title),
        category: categorize(session).to_string(),
        tags,
        summary,
        body: render_body(session, angle),
        source_session: session.session_id.clone(),
        generated_at: Utc::now(),
        title,
    }
}

/// Topic-driven title used when the niche is not confident enough.
pub fn generate_title(session: &ParsedSession) -> String {
    let Some(primary) = session.topics.first() else {
        let project = session
            .project
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("Project");
        return format!("Vibe Coding Session: {project}");
    };

    let general = generalize_topic(primary)
        .map(str::to_string)
        .unwrap_or_else(|| capitalize_first(primary));

    if session.has_topic("deployment") || session.has_topic("ci-cd") {
        format!("Setting Up {general}")
    } else if session.used_tool("Edit") {
        format!("How to Build {general} with Vibe Coding")
    } else {
        format!("Working with {general}")
    }
}

/// Lower-case, collapse every non-alphanumeric run into one hyphen, trim
/// hyphens at both ends. Applying it to its own output is a no-op.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Fixed priority order; the first matching rule wins.
pub fn categorize(session: &ParsedSession) -> &'static str {
    if has_any(session, &["deployment", "ci-cd"]) {
        "devops"
    } else if has_any(session, &["testing"]) {
        "testing"
    } else if has_any(session, &["frontend", "mobile"]) {
        "frontend"
    } else if has_any(session, &["backend", "api-development"]) {
        "backend"
    } else if has_any(session, &["database", "database-migrations"]) {
        "database"
    } else {
        "general"
    }
}

/// Frontmatter plus body, as written to disk.
pub fn render_markdown(content: &GeneratedContent) -> String {
    let tags = content
        .tags
        .iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(", ");

    let frontmatter = [
        "---".to_string(),
        format!("title: \"{}\"", content.title.replace('"', "\\\"")),
        format!("date: {}", content.generated_at.format("%Y-%m-%d")),
        format!("category: {}", content.category),
        format!("tags: [{tags}]"),
        "status: draft".to_string(),
        format!("source_session: {}", content.source_session),
        "---".to_string(),
        String::new(),
        String::new(),
    ]
    .join("\n");

    frontmatter + &content.body
}

/// Write `<slug>.md` into `output_dir`, creating the directory if needed.
/// An existing article with the same slug is overwritten.
pub fn save_content(content: &GeneratedContent, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory: {}", output_dir.display()))?;

    let path = output_dir.join(format!("{}.md", content.slug));
    std::fs::write(&path, render_markdown(content))
        .with_context(|| format!("failed to write article: {}", path.display()))?;

    Ok(path)
}

/// Generate articles for `sessions` in order, stopping after
/// [`BATCH_LIMIT`] articles. Sessions with fewer than `min_messages` messages
/// are skipped; a failing session is logged and does not stop the batch.
pub fn generate_batch(sessions: &[PathBuf], output_dir: &Path, min_messages: usize) -> Vec<PathBuf> {
    let mut saved = Vec::new();

    for path in sessions {
        if saved.len() >= BATCH_LIMIT {
            break;
        }

        match generate_one(path, output_dir, min_messages) {
            Ok(Some(article)) => {
                info!("Generated: {}", article.display());
                saved.push(article);
            }
            Ok(None) => debug!("skipping short session {}", path.display()),
            Err(e) => error!("Failed to process {}: {e:#}", path.display()),
        }
    }

    saved
}

fn generate_one(path: &Path, output_dir: &Path, min_messages: usize) -> Result<Option<PathBuf>> {
    let Some(session) = parse_session_file(path)? else {
        return Ok(None);
    };
    if session.messages.len() < min_messages {
        return Ok(None);
    }

    let content = generate_content(&session);
    save_content(&content, output_dir).map(Some)
}

fn has_any(session: &ParsedSession, topics: &[&str]) -> bool {
    topics.iter().any(|t| session.has_topic(t))
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
