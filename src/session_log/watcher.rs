use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::claude_parser::parse_session_file;
use super::scan::{is_sidechain, is_transcript};
use crate::content::{generate_content, save_content};

pub const DEFAULT_OUTPUT_DIR: &str = "./content/generated";
pub const DEFAULT_DEBOUNCE_MS: u64 = 5000;

/// Files smaller than this are not worth an article.
pub const MIN_SESSION_BYTES: u64 = 1000;

/// Sessions with fewer retained messages are skipped.
pub const MIN_SESSION_MESSAGES: usize = 5;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub claude_dir: PathBuf,
    pub projects_dir: PathBuf,
    pub output_dir: PathBuf,
    pub debounce: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let claude_dir = home.join(".claude");
        Self {
            projects_dir: claude_dir.join("projects"),
            claude_dir,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }
}

// ---------------------------------------------------------------------------
// Events and outcomes
// ---------------------------------------------------------------------------

/// Everything the watcher loop reacts to. `notify` callbacks and debounce
/// timers both feed the same channel.
#[derive(Debug)]
pub enum WatchEvent {
    /// A transcript inside a project directory was created or written.
    FileWritten(PathBuf),
    /// Something appeared directly under the projects root.
    ProjectAppeared(PathBuf),
    /// A debounce timer ran out. Only the latest `generation` for a path counts.
    DebounceElapsed { path: PathBuf, generation: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Unparseable,
    TooFewMessages(usize),
    NoTopics,
}

/// Result of one processing attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Generated(PathBuf),
    Skipped(SkipReason),
    Failed(String),
}

struct PendingRun {
    generation: u64,
    handle: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// Session watcher
// ---------------------------------------------------------------------------

/// Watches every project directory under the projects root and turns
/// quiescent transcripts into articles.
///
/// All state lives here and is only touched from the task driving
/// [`SessionWatcher::run`], so no locking is needed. The `notify` watchers
/// stored in `watchers` **must be kept alive**: dropping one stops its
/// notifications.
pub struct SessionWatcher {
    config: WatcherConfig,
    last_processed: HashMap<PathBuf, SystemTime>,
    debounce_timers: HashMap<PathBuf, PendingRun>,
    watchers: HashMap<PathBuf, RecommendedWatcher>,
    next_generation: u64,
    event_tx: mpsc::UnboundedSender<WatchEvent>,
    event_rx: mpsc::UnboundedReceiver<WatchEvent>,
}

impl SessionWatcher {
    pub fn new(config: WatcherConfig) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            config,
            last_processed: HashMap::new(),
            debounce_timers: HashMap::new(),
            watchers: HashMap::new(),
            next_generation: 0,
            event_tx,
            event_rx,
        }
    }

    /// Number of directories with a live watch, the projects root included.
    pub fn watched_dirs(&self) -> usize {
        self.watchers.len()
    }

    /// Number of debounce timers still waiting to fire.
    pub fn pending_timers(&self) -> usize {
        self.debounce_timers.len()
    }

    /// Install watches on every existing project directory and on the
    /// projects root itself so new projects are picked up.
    pub fn start(&mut self) {
        info!("Starting Claude Code session watcher...");
        info!("  Claude directory: {}", self.config.claude_dir.display());
        info!("  Output directory: {}", self.config.output_dir.display());
        info!("  Debounce: {}ms", self.config.debounce.as_millis());

        if !self.config.projects_dir.is_dir() {
            error!(
                "Projects directory not found: {}",
                self.config.projects_dir.display()
            );
            return;
        }

        self.discover_projects();
        self.watch_projects_root();

        info!("Watcher started. Press Ctrl+C to stop.");
    }

    /// Drive the watcher until `shutdown` resolves, then clean up.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(event) = self.next_event() => {
                    self.handle_event(event);
                }
            }
        }
        self.stop();
    }

    /// Wait for the next event. The watcher holds a sender itself, so this
    /// only yields `None` if the channel is somehow closed.
    pub async fn next_event(&mut self) -> Option<WatchEvent> {
        self.event_rx.recv().await
    }

    /// React to one event. Returns an outcome only when a processing attempt
    /// actually ran.
    pub fn handle_event(&mut self, event: WatchEvent) -> Option<ProcessOutcome> {
        match event {
            WatchEvent::FileWritten(path) => {
                if is_transcript(&path) {
                    self.schedule(path);
                }
                None
            }
            WatchEvent::ProjectAppeared(path) => {
                if path.is_dir() && !self.watchers.contains_key(&path) {
                    self.watch_project_dir(&path);
                }
                None
            }
            WatchEvent::DebounceElapsed { path, generation } => {
                match self.debounce_timers.get(&path) {
                    Some(pending) if pending.generation == generation => {
                        self.debounce_timers.remove(&path);
                    }
                    _ => {
                        debug!("stale debounce timer for {}", path.display());
                        return None;
                    }
                }

                if !self.is_eligible(&path) {
                    debug!("not eligible: {}", path.display());
                    return None;
                }

                Some(self.process_session(&path))
            }
        }
    }

    /// Cancel every pending timer, close every watch and forget all state.
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        info!(
            "Stopping watcher ({} pending timers, {} watches)...",
            self.pending_timers(),
            self.watched_dirs()
        );
        self.clear();
        info!("Watcher stopped.");
    }

    fn clear(&mut self) {
        for (_, pending) in self.debounce_timers.drain() {
            pending.handle.abort();
        }
        // Dropping a RecommendedWatcher closes its watch.
        self.watchers.clear();
        self.last_processed.clear();
    }

    // -----------------------------------------------------------------------
    // Debounce
    // -----------------------------------------------------------------------

    /// Cancel any pending run for `path` and start a fresh timer.
    fn schedule(&mut self, path: PathBuf) {
        if let Some(pending) = self.debounce_timers.remove(&path) {
            pending.handle.abort();
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let delay = self.config.debounce;
        let tx = self.event_tx.clone();
        let timer_path = path.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(WatchEvent::DebounceElapsed {
                path: timer_path,
                generation,
            });
        });

        self.debounce_timers
            .insert(path, PendingRun { generation, handle });
    }

    /// Checked when the timer fires, against the file as it is now.
    fn is_eligible(&self, path: &Path) -> bool {
        if !is_transcript(path) || is_sidechain(path) {
            return false;
        }

        let Ok(meta) = std::fs::metadata(path) else {
            return false;
        };
        let Ok(modified) = meta.modified() else {
            return false;
        };

        if let Some(last) = self.last_processed.get(path) {
            if modified <= *last {
                return false;
            }
        }

        meta.len() >= MIN_SESSION_BYTES
    }

    fn process_session(&mut self, path: &Path) -> ProcessOutcome {
        info!("Processing: {}", path.display());

        let session = match parse_session_file(path) {
            Ok(Some(session)) => session,
            Ok(None) => {
                info!("  Skipped: could not parse session");
                return ProcessOutcome::Skipped(SkipReason::Unparseable);
            }
            Err(e) => {
                error!("  Error processing session {}: {e:#}", path.display());
                return ProcessOutcome::Failed(e.to_string());
            }
        };

        if session.messages.len() < MIN_SESSION_MESSAGES {
            info!("  Skipped: too few messages ({})", session.messages.len());
            return ProcessOutcome::Skipped(SkipReason::TooFewMessages(session.messages.len()));
        }

        if session.topics.is_empty() {
            info!("  Skipped: no detectable topics");
            return ProcessOutcome::Skipped(SkipReason::NoTopics);
        }

        let content = generate_content(&session);
        match save_content(&content, &self.config.output_dir) {
            Ok(saved) => {
                info!("  Generated: {}", saved.display());
                info!("  Title: {}", content.title);
                info!("  Topics: {}", content.tags.join(", "));
                self.last_processed
                    .insert(path.to_path_buf(), SystemTime::now());
                ProcessOutcome::Generated(saved)
            }
            Err(e) => {
                error!("  Error processing session {}: {e:#}", path.display());
                ProcessOutcome::Failed(e.to_string())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Directory watches
    // -----------------------------------------------------------------------

    fn discover_projects(&mut self) {
        let entries = match std::fs::read_dir(&self.config.projects_dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!(
                    "Failed to read projects directory {}: {e}",
                    self.config.projects_dir.display()
                );
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.watch_project_dir(&path);
            }
        }
    }

    fn watch_project_dir(&mut self, project: &Path) {
        if self.watchers.contains_key(project) {
            return;
        }

        let tx = self.event_tx.clone();
        let result = watch_dir(project, move |event| {
            if !(event.kind.is_modify() || event.kind.is_create()) {
                return;
            }
            for path in event.paths {
                if is_transcript(&path) {
                    let _ = tx.send(WatchEvent::FileWritten(path));
                }
            }
        });

        match result {
            Ok(watcher) => {
                self.watchers.insert(project.to_path_buf(), watcher);
                info!("  Watching: {}", project.display());
            }
            Err(e) => error!("  Failed to watch {}: {e}", project.display()),
        }
    }

    fn watch_projects_root(&mut self) {
        let root = self.config.projects_dir.clone();
        if self.watchers.contains_key(&root) {
            return;
        }

        let tx = self.event_tx.clone();
        let result = watch_dir(&root, move |event| {
            for path in event.paths {
                let _ = tx.send(WatchEvent::ProjectAppeared(path));
            }
        });

        match result {
            Ok(watcher) => {
                info!("Watching for new projects in: {}", root.display());
                self.watchers.insert(root, watcher);
            }
            Err(e) => error!("Failed to watch projects directory: {e}"),
        }
    }
}

impl Drop for SessionWatcher {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Non-recursive `notify` watch on `dir`. Errors from the backend are logged
/// and otherwise ignored.
fn watch_dir<F>(dir: &Path, mut on_event: F) -> notify::Result<RecommendedWatcher>
where
    F: FnMut(notify::Event) + Send + 'static,
{
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => on_event(event),
            Err(e) => error!("notify error: {e}"),
        }
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::time::Instant;

    fn transcript(messages: usize) -> String {
        transcript_saying(messages, "Fix the login bug")
    }

    fn transcript_saying(messages: usize, text: &str) -> String {
        (0..messages)
            .map(|i| {
                let kind = if i % 2 == 0 { "user" } else { "assistant" };
                json!({
                    "type": kind,
                    "timestamp": format!("2026-02-24T10:00:{i:02}Z"),
                    "sessionId": "watch-session",
                    "cwd": "/nonexistent/repo",
                    "message": {
                        "role": kind,
                        "content": format!("{text}, step {i}. {}", "padding ".repeat(40)),
                    },
                })
                .to_string()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn config_in(root: &Path) -> WatcherConfig {
        WatcherConfig {
            claude_dir: root.to_path_buf(),
            projects_dir: root.join("projects"),
            output_dir: root.join("out"),
            debounce: Duration::from_millis(5000),
        }
    }

    fn watcher_in(root: &Path) -> SessionWatcher {
        SessionWatcher::new(config_in(root))
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_writes_coalesce_into_one_run() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("session.jsonl");
        std::fs::write(&path, transcript(6)).unwrap();
        let mut watcher = watcher_in(root.path());

        assert!(watcher.handle_event(WatchEvent::FileWritten(path.clone())).is_none());
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(watcher.handle_event(WatchEvent::FileWritten(path.clone())).is_none());
        assert_eq!(watcher.pending_timers(), 1);
        let second_write = Instant::now();

        let event = watcher.next_event().await.expect("timer event");
        let waited = second_write.elapsed();
        assert!(waited >= Duration::from_millis(5000));
        assert!(waited < Duration::from_millis(5100), "fired after {waited:?}");

        let outcome = watcher.handle_event(event).expect("processing ran");
        let article = match outcome {
            ProcessOutcome::Generated(article) => article,
            other => panic!("expected article, got {other:?}"),
        };
        assert!(article.starts_with(root.path().join("out")));
        assert!(article.exists());
        assert_eq!(watcher.pending_timers(), 0);

        // The cancelled first timer never fires.
        let more = tokio::time::timeout(Duration::from_secs(60), watcher.next_event()).await;
        assert!(more.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_file_is_not_processed_twice() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("session.jsonl");
        std::fs::write(&path, transcript(6)).unwrap();
        let mut watcher = watcher_in(root.path());

        watcher.handle_event(WatchEvent::FileWritten(path.clone()));
        let event = watcher.next_event().await.unwrap();
        assert!(matches!(
            watcher.handle_event(event),
            Some(ProcessOutcome::Generated(_))
        ));

        watcher.handle_event(WatchEvent::FileWritten(path.clone()));
        let event = watcher.next_event().await.unwrap();
        assert!(watcher.handle_event(event).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn small_and_sidechain_files_are_ineligible() {
        let root = tempfile::tempdir().unwrap();
        let small = root.path().join("small.jsonl");
        std::fs::write(&small, transcript(1).chars().take(200).collect::<String>()).unwrap();
        let sidechain = root.path().join("agent-1234.jsonl");
        std::fs::write(&sidechain, transcript(6)).unwrap();
        let mut watcher = watcher_in(root.path());

        for path in [small, sidechain] {
            watcher.handle_event(WatchEvent::FileWritten(path));
            let event = watcher.next_event().await.unwrap();
            assert!(watcher.handle_event(event).is_none());
        }
        assert!(!root.path().join("out").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn short_sessions_are_skipped() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("short.jsonl");
        std::fs::write(&path, transcript(4)).unwrap();
        let mut watcher = watcher_in(root.path());

        watcher.handle_event(WatchEvent::FileWritten(path));
        let event = watcher.next_event().await.unwrap();
        assert_eq!(
            watcher.handle_event(event),
            Some(ProcessOutcome::Skipped(SkipReason::TooFewMessages(4)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_without_topics_are_skipped() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("chatter.jsonl");
        std::fs::write(&path, transcript_saying(6, "Hello there, nice weather")).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > MIN_SESSION_BYTES);
        let mut watcher = watcher_in(root.path());

        watcher.handle_event(WatchEvent::FileWritten(path));
        let event = watcher.next_event().await.unwrap();
        assert_eq!(
            watcher.handle_event(event),
            Some(ProcessOutcome::Skipped(SkipReason::NoTopics))
        );
        assert!(!root.path().join("out").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_generation_is_ignored() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("session.jsonl");
        std::fs::write(&path, transcript(6)).unwrap();
        let mut watcher = watcher_in(root.path());

        watcher.handle_event(WatchEvent::FileWritten(path.clone()));
        let stale = WatchEvent::DebounceElapsed {
            path: path.clone(),
            generation: 0,
        };
        assert!(watcher.handle_event(stale).is_none());
        assert_eq!(watcher.pending_timers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transcripts_are_not_scheduled() {
        let root = tempfile::tempdir().unwrap();
        let mut watcher = watcher_in(root.path());
        watcher.handle_event(WatchEvent::FileWritten(root.path().join("notes.txt")));
        assert_eq!(watcher.pending_timers(), 0);
    }

    #[tokio::test]
    async fn start_watches_projects_and_stop_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let projects = root.path().join("projects");
        std::fs::create_dir_all(projects.join("-home-a")).unwrap();
        std::fs::create_dir_all(projects.join("-home-b")).unwrap();
        std::fs::write(projects.join("stray.jsonl"), "").unwrap();
        let mut watcher = watcher_in(root.path());

        watcher.start();
        // Two projects plus the root.
        assert_eq!(watcher.watched_dirs(), 3);

        let new_project = projects.join("-home-c");
        std::fs::create_dir(&new_project).unwrap();
        watcher.handle_event(WatchEvent::ProjectAppeared(new_project.clone()));
        watcher.handle_event(WatchEvent::ProjectAppeared(new_project));
        assert_eq!(watcher.watched_dirs(), 4);

        watcher.handle_event(WatchEvent::FileWritten(projects.join("-home-a").join("x.jsonl")));
        assert_eq!(watcher.pending_timers(), 1);

        watcher.stop();
        watcher.stop();
        assert_eq!(watcher.watched_dirs(), 0);
        assert_eq!(watcher.pending_timers(), 0);
    }

    #[tokio::test]
    async fn missing_projects_root_installs_nothing() {
        let root = tempfile::tempdir().unwrap();
        let mut watcher = watcher_in(root.path());
        watcher.start();
        assert_eq!(watcher.watched_dirs(), 0);
    }

    #[tokio::test]
    async fn filesystem_changes_flow_through_notify() {
        let root = tempfile::tempdir().unwrap();
        let projects = root.path().join("projects");
        std::fs::create_dir_all(&projects).unwrap();
        let mut watcher = SessionWatcher::new(WatcherConfig {
            debounce: Duration::from_millis(200),
            ..config_in(root.path())
        });
        watcher.start();
        assert_eq!(watcher.watched_dirs(), 1);

        let project = projects.join("-home-dev-app");
        std::fs::create_dir(&project).unwrap();
        tokio::time::timeout(Duration::from_secs(10), async {
            while watcher.watched_dirs() < 2 {
                if let Some(event) = watcher.next_event().await {
                    watcher.handle_event(event);
                }
            }
        })
        .await
        .expect("new project picked up");

        std::fs::write(project.join("notes.txt"), "not a transcript").unwrap();
        std::fs::write(project.join("session.jsonl"), transcript(6)).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let event = watcher.next_event().await?;
                if let Some(outcome) = watcher.handle_event(event) {
                    return Some(outcome);
                }
            }
        })
        .await
        .expect("transcript processed");

        match outcome {
            Some(ProcessOutcome::Generated(article)) => assert!(article.exists()),
            other => panic!("expected article, got {other:?}"),
        }
        assert_eq!(std::fs::read_dir(root.path().join("out")).unwrap().count(), 1);
        watcher.stop();
    }
}
