//! In-memory history.
//!
//! Keeps a stack of entries with a cursor, like a browser session history,
//! and broadcasts every change to its subscribers.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::location::{Location, LocationError, LocationSource};

struct HistoryState {
    entries: Vec<Location>,
    index: usize,
    subscribers: Vec<mpsc::UnboundedSender<Location>>,
}

impl HistoryState {
    fn notify(&mut self) {
        let current = self.entries[self.index].clone();
        self.subscribers.retain(|tx| tx.send(current.clone()).is_ok());
    }
}

/// History kept entirely in memory.
pub struct MemoryHistory {
    state: Mutex<HistoryState>,
}

impl MemoryHistory {
    /// Create a history whose only entry is `initial`.
    pub fn new(initial: &str) -> Result<Self, LocationError> {
        let location = Location::parse(initial)?;
        Ok(Self {
            state: Mutex::new(HistoryState {
                entries: vec![location],
                index: 0,
                subscribers: Vec::new(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HistoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Vec<Location> {
        self.lock().entries.clone()
    }

    /// Move the cursor one entry back. Returns the new current location.
    pub fn back(&self) -> Option<Location> {
        let mut state = self.lock();
        if state.index == 0 {
            return None;
        }
        state.index -= 1;
        state.notify();
        Some(state.entries[state.index].clone())
    }

    /// Move the cursor one entry forward. Returns the new current location.
    pub fn forward(&self) -> Option<Location> {
        let mut state = self.lock();
        if state.index + 1 >= state.entries.len() {
            return None;
        }
        state.index += 1;
        state.notify();
        Some(state.entries[state.index].clone())
    }
}

#[async_trait]
impl LocationSource for MemoryHistory {
    fn current(&self) -> Location {
        let state = self.lock();
        state.entries[state.index].clone()
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<Location> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        rx
    }

    async fn push(&self, reference: &str) -> Result<(), LocationError> {
        let location = Location::parse(reference)?;
        let mut state = self.lock();
        let keep = state.index + 1;
        state.entries.truncate(keep);
        state.entries.push(location);
        state.index = keep;
        state.notify();
        tracing::trace!(reference, depth = state.entries.len(), "History push");
        Ok(())
    }

    async fn replace(&self, reference: &str) -> Result<(), LocationError> {
        let location = Location::parse(reference)?;
        let mut state = self.lock();
        let index = state.index;
        state.entries[index] = location;
        state.notify();
        tracing::trace!(reference, "History replace");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_truncates_forward_entries() {
        let history = MemoryHistory::new("/").unwrap();
        history.push("/a").await.unwrap();
        history.push("/b").await.unwrap();
        assert_eq!(history.back().unwrap().path(), "/a");

        history.push("/c").await.unwrap();
        let paths: Vec<_> = history.entries().iter().map(|l| l.path().to_string()).collect();
        assert_eq!(paths, vec!["/", "/a", "/c"]);
        assert!(history.forward().is_none());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes_in_order() {
        let history = MemoryHistory::new("/").unwrap();
        let mut rx = history.subscribe();

        history.push("/a").await.unwrap();
        history.replace("/b").await.unwrap();

        assert_eq!(rx.recv().await.unwrap().path(), "/a");
        assert_eq!(rx.recv().await.unwrap().path(), "/b");
        assert_eq!(history.current().path(), "/b");
        assert_eq!(history.entries().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_reference_is_rejected() {
        let history = MemoryHistory::new("/").unwrap();
        assert!(history.push("nope").await.is_err());
        assert_eq!(history.entries().len(), 1);
    }
}
