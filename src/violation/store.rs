//! In-memory store for sandbox violation events.

use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;

/// Bounded history; older events are dropped first.
const MAX_VIOLATIONS: usize = 100;

/// Where a violation line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationSource {
    /// macOS unified-log sandbox denial.
    MacosLog,
    /// Linux bpftrace observer.
    LinuxTrace,
}

/// One observed denial.
#[derive(Debug, Clone)]
pub struct ViolationEvent {
    /// The raw line as printed by the monitor.
    pub line: String,
    pub source: ViolationSource,
    /// Denied operation (e.g. `file-write-data`), when parsed.
    pub operation: Option<String>,
    /// Process name, when parsed.
    pub process: Option<String>,
    pub timestamp: SystemTime,
}

impl ViolationEvent {
    pub fn new(line: String, source: ViolationSource) -> Self {
        Self {
            line,
            source,
            operation: None,
            process: None,
            timestamp: SystemTime::now(),
        }
    }

    pub fn parsed(
        line: String,
        source: ViolationSource,
        operation: String,
        process: String,
    ) -> Self {
        Self {
            line,
            source,
            operation: Some(operation),
            process: Some(process),
            timestamp: SystemTime::now(),
        }
    }
}

pub type ViolationListener = Box<dyn Fn(&ViolationEvent) + Send + Sync>;

/// Shared store; monitors push, the supervisor reads at exit.
pub struct ViolationStore {
    events: RwLock<Vec<ViolationEvent>>,
    total: RwLock<usize>,
    listeners: RwLock<Vec<Arc<ViolationListener>>>,
}

impl Default for ViolationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ViolationStore {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            total: RwLock::new(0),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add(&self, event: ViolationEvent) {
        let listeners = self.listeners.read();
        for listener in listeners.iter() {
            listener(&event);
        }
        drop(listeners);

        let mut events = self.events.write();
        let mut total = self.total.write();
        events.push(event);
        *total += 1;
        if events.len() > MAX_VIOLATIONS {
            events.remove(0);
        }
    }

    pub fn recent(&self, limit: Option<usize>) -> Vec<ViolationEvent> {
        let events = self.events.read();
        let limit = limit.unwrap_or(events.len());
        events.iter().rev().take(limit).rev().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.events.read().len()
    }

    pub fn total_count(&self) -> usize {
        *self.total.read()
    }

    pub fn clear(&self) {
        self.events.write().clear();
        *self.total.write() = 0;
    }

    pub fn subscribe(&self, listener: ViolationListener) {
        self.listeners.write().push(Arc::new(listener));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn add_and_read_back() {
        let store = ViolationStore::new();
        store.add(ViolationEvent::new(
            "DENIED: one".to_string(),
            ViolationSource::LinuxTrace,
        ));
        store.add(ViolationEvent::new(
            "DENIED: two".to_string(),
            ViolationSource::LinuxTrace,
        ));
        assert_eq!(store.count(), 2);
        assert_eq!(store.total_count(), 2);
        let recent = store.recent(Some(1));
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].line, "DENIED: two");
    }

    #[test]
    fn history_is_bounded_but_total_keeps_counting() {
        let store = ViolationStore::new();
        for i in 0..(MAX_VIOLATIONS + 25) {
            store.add(ViolationEvent::new(
                format!("line {i}"),
                ViolationSource::MacosLog,
            ));
        }
        assert_eq!(store.count(), MAX_VIOLATIONS);
        assert_eq!(store.total_count(), MAX_VIOLATIONS + 25);
    }

    #[test]
    fn listeners_fire_per_event() {
        static FIRED: AtomicUsize = AtomicUsize::new(0);
        let store = ViolationStore::new();
        store.subscribe(Box::new(|_| {
            FIRED.fetch_add(1, Ordering::SeqCst);
        }));
        store.add(ViolationEvent::new(
            "x".to_string(),
            ViolationSource::MacosLog,
        ));
        assert_eq!(FIRED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_resets_both_counters() {
        let store = ViolationStore::new();
        store.add(ViolationEvent::new(
            "x".to_string(),
            ViolationSource::MacosLog,
        ));
        store.clear();
        assert_eq!(store.count(), 0);
        assert_eq!(store.total_count(), 0);
    }
}
