//! Context store: the ordered, bounded history fed back into prompts.
//!
//! Entries are append-only. When the count passes the ceiling, the oldest
//! half is folded into one summary note at the front.
//!
//! A session holds a [`SessionLease`] for its whole run, so sessions sharing
//! one store take turns instead of interleaving their writes.

use shellpilot_config::ContextConfig;
use shellpilot_core::context::{ContextEntry, EntryKind};
use shellpilot_core::token::{HeuristicCounter, TokenCounter};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

pub const DEFAULT_MAX_ENTRIES: usize = 3200;

/// Longest rendered snippet kept per summarized entry, in characters.
pub const SNIPPET_CHARS: usize = 100;

pub const SUMMARY_PREFIX: &str = "[Summary of earlier context]: ";

pub struct ContextStore {
    log: Mutex<Log>,
    session: Arc<Mutex<()>>,
    max_entries: usize,
    counter: Arc<dyn TokenCounter>,
}

#[derive(Default)]
struct Log {
    entries: Vec<ContextEntry>,
    /// Entries appended since the last clear, summarized ones included.
    appended: usize,
}

/// Exclusive use of a store for one session. Released on drop.
pub struct SessionLease {
    _guard: OwnedMutexGuard<()>,
}

impl ContextStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            log: Mutex::new(Log::default()),
            session: Arc::new(Mutex::new(())),
            max_entries: max_entries.max(2),
            counter: Arc::new(HeuristicCounter),
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(config.max_entries)
    }

    pub fn with_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Append an entry, summarizing once if the ceiling is exceeded.
    pub async fn add_entry(&self, entry: ContextEntry) {
        let mut log = self.log.lock().await;
        log.entries.push(entry);
        log.appended += 1;
        if log.entries.len() > self.max_entries {
            let before = log.entries.len();
            summarize(&mut log.entries);
            info!(before, after = log.entries.len(), "Summarized context");
        }
    }

    /// Wait for any other session on this store to finish, then start from
    /// an empty log.
    pub async fn begin_session(&self) -> SessionLease {
        let guard = self.session.clone().lock_owned().await;
        self.clear().await;
        SessionLease { _guard: guard }
    }

    /// Every entry rendered with its prefix, one per line.
    pub async fn build_prompt_context(&self) -> String {
        render(&self.log.lock().await.entries)
    }

    /// Tokens in the rendered prompt. Zero when the counter fails.
    pub async fn context_token_count(&self) -> usize {
        let prompt = self.build_prompt_context().await;
        self.token_count(&prompt)
    }

    pub fn token_count(&self, text: &str) -> usize {
        self.counter.count(text).unwrap_or_else(|| {
            debug!("Token counter failed, reporting zero");
            0
        })
    }

    pub async fn clear(&self) {
        let mut log = self.log.lock().await;
        log.entries.clear();
        log.appended = 0;
    }

    pub async fn len(&self) -> usize {
        self.log.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.log.lock().await.entries.is_empty()
    }

    /// A snapshot of the current entries.
    pub async fn entries(&self) -> Vec<ContextEntry> {
        self.log.lock().await.entries.clone()
    }

    /// Position for [`new_entries_since`]. Unlike [`len`] it keeps counting
    /// across summary passes.
    ///
    /// [`new_entries_since`]: ContextStore::new_entries_since
    /// [`len`]: ContextStore::len
    pub async fn cursor(&self) -> usize {
        self.log.lock().await.appended
    }

    /// Entries appended after `cursor`.
    ///
    /// When a summary pass has folded some of them away, the whole log is
    /// returned so the summary note is not missed either.
    pub async fn new_entries_since(&self, cursor: usize) -> Vec<ContextEntry> {
        let log = self.log.lock().await;
        let fresh = log.appended.saturating_sub(cursor);
        let start = log.entries.len().saturating_sub(fresh);
        log.entries[start..].to_vec()
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

fn render(entries: &[ContextEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.render());
        out.push('\n');
    }
    out
}

/// Fold the oldest half of `entries` into one note at the front.
fn summarize(entries: &mut Vec<ContextEntry>) {
    let half = entries.len() / 2;
    let removed: Vec<ContextEntry> = entries.drain(..half).collect();
    entries.insert(0, summary_note(&removed));
}

/// The note that replaces `removed`.
pub fn summary_note(removed: &[ContextEntry]) -> ContextEntry {
    let joined = removed
        .iter()
        .map(|e| snippet(&e.render()))
        .collect::<Vec<_>>()
        .join(" ");
    ContextEntry::new(
        EntryKind::SystemNote,
        format!("{SUMMARY_PREFIX}{}", joined.trim()),
    )
}

fn snippet(rendered: &str) -> String {
    if rendered.chars().count() <= SNIPPET_CHARS {
        rendered.to_string()
    } else {
        let head: String = rendered.chars().take(SNIPPET_CHARS).collect();
        format!("{head}...")
    }
}
