use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use imaginize_core::Phase;
use imaginize_store::{atomic_write, read_atomic, AtomicStoreError, FileLock};

const DEFAULT_BACKLOG: usize = 1000;
const LOG_LOCK_TIMEOUT: Duration = Duration::from_secs(60);
const PROGRESS_LOG_FILE: &str = "progress.md";

/// Event kinds a phase may emit (spec §4.12).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EventKind {
    PhaseStart { phase: Phase },
    PhaseComplete { phase: Phase },
    ChapterStart { chapter_index: u32 },
    ChapterComplete { chapter_index: u32 },
    ImageComplete { chapter_index: u32, scene_id: String },
    RateLimit { attempt: u32 },
    ProgressLog { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Event { timestamp: Utc::now(), kind }
    }

    fn as_log_line(&self) -> String {
        match &self.kind {
            EventKind::PhaseStart { phase } => {
                format!("- [{}] phase-start: {}", self.timestamp.to_rfc3339(), phase.as_str())
            }
            EventKind::PhaseComplete { phase } => {
                format!("- [{}] phase-complete: {}", self.timestamp.to_rfc3339(), phase.as_str())
            }
            EventKind::ChapterStart { chapter_index } => {
                format!("- [{}] chapter-start: chapter {chapter_index}", self.timestamp.to_rfc3339())
            }
            EventKind::ChapterComplete { chapter_index } => {
                format!("- [{}] chapter-complete: chapter {chapter_index}", self.timestamp.to_rfc3339())
            }
            EventKind::ImageComplete { chapter_index, scene_id } => {
                format!("- [{}] image-complete: {scene_id} (chapter {chapter_index})", self.timestamp.to_rfc3339())
            }
            EventKind::RateLimit { attempt } => {
                format!("- [{}] rate-limit: attempt {attempt}", self.timestamp.to_rfc3339())
            }
            EventKind::ProgressLog { message } => format!("- [{}] {message}", self.timestamp.to_rfc3339()),
        }
    }
}

/// In-process pub/sub plus an append-only `progress.md` log (spec §4.12).
/// A slow subscriber is dropped once it falls `DEFAULT_BACKLOG` events
/// behind — `tokio::sync::broadcast`'s lagged-receiver semantics give this
/// for free.
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(DEFAULT_BACKLOG);
        EventBus { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Non-blocking publish: if there are no subscribers, or a subscriber
    /// has fallen behind, this never blocks the publisher (spec §4.12).
    pub fn publish(&self, kind: EventKind) {
        let _ = self.sender.send(Event::new(kind));
    }

    /// Appends one line to `{book_dir}/progress.md` under an exclusive
    /// lock held only for the duration of the append (spec §4.12, §5).
    pub fn append_to_log(&self, book_dir: &Path, event: &Event) -> Result<(), AtomicStoreError> {
        let path = book_dir.join(PROGRESS_LOG_FILE);
        let _lock = FileLock::acquire(&path, LOG_LOCK_TIMEOUT)?;
        let mut contents = read_atomic(&path)?.unwrap_or_default();
        contents.extend_from_slice(event.as_log_line().as_bytes());
        contents.push(b'\n');
        atomic_write(&path, &contents)
    }

    /// Publishes to subscribers and appends to the log in one call — the
    /// common case for phase code.
    pub fn emit(&self, book_dir: &Path, kind: EventKind) -> Result<(), AtomicStoreError> {
        let event = Event::new(kind);
        let result = self.append_to_log(book_dir, &event);
        let _ = self.sender.send(event);
        result
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(EventKind::ChapterStart { chapter_index: 1 });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event.kind, EventKind::ChapterStart { chapter_index: 1 }));
    }

    #[test]
    fn emit_appends_a_line_to_progress_md() {
        let dir = tempdir().unwrap();
        let bus = EventBus::new();
        bus.emit(dir.path(), EventKind::PhaseStart { phase: Phase::Analyze }).unwrap();
        bus.emit(dir.path(), EventKind::PhaseComplete { phase: Phase::Analyze }).unwrap();

        let contents = std::fs::read_to_string(dir.path().join(PROGRESS_LOG_FILE)).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("phase-start"));
        assert!(contents.contains("phase-complete"));
    }

    #[test]
    fn publish_with_no_subscribers_never_blocks() {
        let bus = EventBus::new();
        bus.publish(EventKind::RateLimit { attempt: 1 });
    }
}
