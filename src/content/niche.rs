//! Niche identification: turn a session (and optionally its repository) into
//! a publishable "[app type] in [platform]" angle.

use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::session_log::ParsedSession;

/// Platform reported when no platform pattern matches.
pub const FALLBACK_PLATFORM: &str = "TypeScript";

/// App type reported when no app-type pattern qualifies.
pub const FALLBACK_APP_TYPE: &str = "Application";

const PLATFORM_CONFIDENCE: f64 = 0.8;
const README_LIMIT: usize = 2000;
const MARKER_LIMIT: usize = 1000;

const README_NAMES: &[&str] = &["README.md", "readme.md", "Readme.md"];
const MARKER_FILES: &[&str] = &[
    "package.json",
    "app.json",
    "game.project",
    "project.godot",
    "Cargo.toml",
    "pubspec.yaml",
    "pyproject.toml",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Niche {
    pub platform: String,
    pub app_type: String,
    pub title: String,
    pub confidence: f64,
    pub signals: Vec<String>,
}

impl Niche {
    pub fn has_platform(&self) -> bool {
        self.platform != FALLBACK_PLATFORM
    }

    pub fn has_app_type(&self) -> bool {
        self.app_type != FALLBACK_APP_TYPE
    }
}

fn compile(table: &[(&str, &'static str)]) -> Vec<(Regex, &'static str)> {
    table
        .iter()
        .map(|(pattern, name)| {
            let re = Regex::new(&format!("(?i){pattern}")).expect("valid niche regex");
            (re, *name)
        })
        .collect()
}

lazy_static! {
    /// First match wins, so order matters.
    static ref PLATFORM_PATTERNS: Vec<(Regex, &'static str)> = compile(&[
        (r"roblox|rbxl|luau", "Roblox"),
        (r"react-native|expo", "React Native"),
        (r"discord\.js|discord-api", "Discord"),
        (r"electron", "Electron"),
        (r"unity|\.unity|UnityEngine", "Unity"),
        (r"godot|\.gd$", "Godot"),
        (r"flutter|dart", "Flutter"),
        (r"next\.js|nextjs", "Next.js"),
        (r"vue", "Vue.js"),
        (r"svelte", "SvelteKit"),
        (r"fastapi|django|flask", "Python Web"),
        (r"rails", "Ruby on Rails"),
        (r"shopify|liquid", "Shopify"),
        (r"wordpress|wp-", "WordPress"),
        (r"supabase", "Supabase"),
        (r"firebase", "Firebase"),
        (r"aws-cdk|cloudformation", "AWS"),
        (r"terraform", "Terraform"),
        (r"kubernetes|k8s|helm", "Kubernetes"),
    ]);

    /// The first pattern with more than two hits wins, even if a later one
    /// would score higher.
    static ref APP_TYPE_PATTERNS: Vec<(Regex, &'static str)> = compile(&[
        // Games
        (r"game|player|score|level|spawn|enemy|health|inventory", "Game"),
        (r"adventure|quest|rpg|dungeon|character", "Adventure Game"),
        (r"platformer|jump|collision|physics", "Platformer Game"),
        (r"puzzle|match|tile|grid", "Puzzle Game"),
        (r"multiplayer|lobby|matchmaking", "Multiplayer Game"),
        // Business
        (r"patient|hipaa|ehr|medical|healthcare|clinic", "Healthcare Application"),
        (r"invoice|billing|subscription|payment|stripe", "Billing System"),
        (r"crm|customer|lead|sales|pipeline", "CRM"),
        (r"inventory|warehouse|shipping|fulfillment", "Inventory System"),
        (r"booking|appointment|calendar|schedule", "Booking System"),
        (r"hr|employee|payroll|timesheet", "HR System"),
        // Social
        (r"chat|message|conversation|dm", "Chat Application"),
        (r"forum|thread|post|comment|discussion", "Forum"),
        (r"social|feed|follow|like|share", "Social Platform"),
        (r"community|member|moderation|ban", "Community Platform"),
        (r"bot|command|slash|webhook", "Bot"),
        // Content
        (r"blog|article|cms|content", "Content Management System"),
        (r"video|stream|player|media", "Media Platform"),
        (r"podcast|audio|episode", "Podcast Platform"),
        (r"newsletter|email|subscriber", "Newsletter System"),
        (r"magazine|publication|editorial", "Publishing Platform"),
        // E-commerce
        (r"shop|cart|checkout|product|catalog", "E-commerce Store"),
        (r"marketplace|seller|buyer|listing", "Marketplace"),
        // Developer tools
        (r"cli|command.line|terminal|shell", "CLI Tool"),
        (r"api|endpoint|rest|graphql", "API Service"),
        (r"sdk|library|package|module", "SDK/Library"),
        (r"dashboard|analytics|metrics|monitoring", "Analytics Dashboard"),
        (r"deploy|ci|cd|pipeline|workflow", "DevOps Tool"),
        // Mobile
        (r"fitness|workout|exercise|health", "Fitness App"),
        (r"tracker|habit|goal|progress", "Tracking App"),
        (r"camera|photo|image|gallery", "Photo App"),
        (r"map|location|gps|navigation", "Location App"),
        (r"todo|task|reminder|note", "Productivity App"),
    ]);
}

/// Identify the best-guess niche for a session.
///
/// `repo_path` adds README and manifest context when given. Never fails: with
/// nothing to go on the result is the generic fallback.
pub fn identify_niche(session: &ParsedSession, repo_path: Option<&Path>) -> Niche {
    let mut corpus = session_corpus(session);
    if let Some(repo) = repo_path {
        corpus.push(' ');
        corpus.push_str(&read_repo_context(repo));
    }
    classify(&corpus, &session.topics)
}

/// Classify a prepared corpus. `topics` feeds the fallback title.
pub fn classify(corpus: &str, topics: &[String]) -> Niche {
    let mut signals = Vec::new();

    let (platform, platform_confidence) = match PLATFORM_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(corpus))
    {
        Some((_, name)) => {
            signals.push(format!("Platform detected: {name} (pattern match)"));
            (*name, PLATFORM_CONFIDENCE)
        }
        None => (FALLBACK_PLATFORM, 0.0),
    };

    let mut app_type = FALLBACK_APP_TYPE;
    let mut app_type_confidence = 0.0;
    for (pattern, name) in APP_TYPE_PATTERNS.iter() {
        let hits = pattern.find_iter(corpus).count();
        if hits > 2 {
            app_type = *name;
            app_type_confidence = f64::min(0.9, 0.5 + 0.1 * hits as f64);
            signals.push(format!("App type detected: {name} ({hits} matches)"));
            break;
        }
    }

    let platform_found = platform != FALLBACK_PLATFORM;
    let app_type_found = app_type != FALLBACK_APP_TYPE;

    let title = if !platform_found && !app_type_found {
        signals.push("Fell back to generic title from topics".to_string());
        match topics.first() {
            Some(topic) => format!(
                "How to Vibe Code {}",
                capitalize_words(&topic.replace('-', " "))
            ),
            None => "How to Vibe Code This Project".to_string(),
        }
    } else if !platform_found {
        format!("How to Vibe Code {} {app_type}", article_for(app_type))
    } else {
        format!(
            "How to Vibe Code {} {app_type} in {platform}",
            article_for(app_type)
        )
    };

    Niche {
        platform: platform.to_string(),
        app_type: app_type.to_string(),
        title,
        confidence: (platform_confidence + app_type_confidence) / 2.0,
        signals,
    }
}

fn session_corpus(session: &ParsedSession) -> String {
    let mut parts: Vec<&str> = session.messages.iter().map(|m| m.content.as_str()).collect();
    parts.push(session.summary.as_deref().unwrap_or_default());
    parts.extend(session.files_modified.iter().map(String::as_str));
    parts.extend(session.topics.iter().map(String::as_str));
    parts.join(" ")
}

/// Best-effort read of README and ecosystem marker files. Any file that
/// cannot be read is left out.
fn read_repo_context(repo: &Path) -> String {
    let mut parts = Vec::new();

    if let Some(readme) = README_NAMES
        .iter()
        .map(|name| repo.join(name))
        .find(|path| path.is_file())
    {
        if let Ok(text) = std::fs::read_to_string(&readme) {
            parts.push(truncate_chars(&text, README_LIMIT));
        }
    }

    for marker in MARKER_FILES {
        if let Ok(text) = std::fs::read_to_string(repo.join(marker)) {
            parts.push(truncate_chars(&text, MARKER_LIMIT));
        }
    }

    parts.join("\n")
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

fn article_for(word: &str) -> &'static str {
    match word.chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('a' | 'e' | 'i' | 'o' | 'u') => "an",
        _ => "a",
    }
}

/// Upper-case the first letter of every word.
pub fn capitalize_words(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if at_word_start && c.is_alphanumeric() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !(c.is_alphanumeric() || c == '_');
    }
    out
}
