//! History bridge
//!
//! Every history mutation goes through [`HistoryBridge`], which stamps each
//! entry with a restoration identifier and a monotonically increasing
//! restoration index. Comparing the index of a popped entry with the current
//! one tells back from forward.

use crate::view::ScrollPosition;
use std::collections::HashMap;
use veer_net::{Location, RequestIdGenerator};

/// State stored with every entry we create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryState {
    pub restoration_identifier: String,
    pub restoration_index: u64,
}

/// History entry
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub location: Location,
    /// `None` for entries created outside the session
    pub state: Option<HistoryState>,
}

/// The browser's session history
pub trait BrowserHistory {
    fn push_state(&mut self, location: &Location, state: HistoryState);
    fn replace_state(&mut self, location: &Location, state: HistoryState);
    /// Move by `delta` entries; `None` when out of range
    fn go(&mut self, delta: i64) -> Option<HistoryEntry>;
    fn len(&self) -> usize;
}

/// In-memory history stack
#[derive(Debug, Clone)]
pub struct MemoryHistory {
    entries: Vec<HistoryEntry>,
    current: usize,
}

impl MemoryHistory {
    pub fn new(initial: &Location) -> Self {
        Self {
            entries: vec![HistoryEntry { location: initial.clone(), state: None }],
            current: 0,
        }
    }

    pub fn current(&self) -> &HistoryEntry {
        // `entries` is never empty and `current` is kept in range
        &self.entries[self.current]
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn index(&self) -> usize {
        self.current
    }
}

impl BrowserHistory for MemoryHistory {
    fn push_state(&mut self, location: &Location, state: HistoryState) {
        // Remove forward history
        self.entries.truncate(self.current + 1);
        self.entries.push(HistoryEntry { location: location.clone(), state: Some(state) });
        self.current = self.entries.len() - 1;
    }

    fn replace_state(&mut self, location: &Location, state: HistoryState) {
        if let Some(entry) = self.entries.get_mut(self.current) {
            entry.location = location.clone();
            entry.state = Some(state);
        }
    }

    fn go(&mut self, delta: i64) -> Option<HistoryEntry> {
        let target = self.current as i64 + delta;
        if delta == 0 || target < 0 || target as usize >= self.entries.len() {
            return None;
        }
        self.current = target as usize;
        Some(self.current().clone())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Navigation direction inferred from restoration indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Back,
    None,
}

/// Per-entry data restored on back/forward
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestorationData {
    pub scroll_position: Option<ScrollPosition>,
}

/// A pop the session should turn into a restore visit
#[derive(Debug, Clone, PartialEq)]
pub struct PoppedEntry {
    pub location: Location,
    pub restoration_identifier: String,
    pub direction: Direction,
}

/// Owns the browser history and the restoration bookkeeping
pub struct HistoryBridge {
    history: Box<dyn BrowserHistory>,
    location: Location,
    restoration_identifier: String,
    current_index: u64,
    restoration_data: HashMap<String, RestorationData>,
    ids: RequestIdGenerator,
}

impl HistoryBridge {
    /// Take over `history`, stamping its current entry
    pub fn new(mut history: Box<dyn BrowserHistory>, location: &Location) -> Self {
        let ids = RequestIdGenerator::new();
        let restoration_identifier = ids.next_id();
        history.replace_state(
            location,
            HistoryState { restoration_identifier: restoration_identifier.clone(), restoration_index: 0 },
        );
        Self {
            history,
            location: location.clone(),
            restoration_identifier,
            current_index: 0,
            restoration_data: HashMap::new(),
            ids,
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn restoration_identifier(&self) -> &str {
        &self.restoration_identifier
    }

    pub fn restoration_index(&self) -> u64 {
        self.current_index
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Add an entry
    pub fn push(&mut self, location: &Location) {
        self.current_index += 1;
        let state = self.fresh_state();
        tracing::debug!(%location, index = self.current_index, "history push");
        self.history.push_state(location, state);
        self.location = location.clone();
    }

    /// Overwrite the current entry, keeping its index
    pub fn replace(&mut self, location: &Location) {
        let state = self.fresh_state();
        tracing::debug!(%location, index = self.current_index, "history replace");
        self.history.replace_state(location, state);
        self.location = location.clone();
    }

    /// Overwrite the current entry's location without minting a new
    /// restoration identifier (used after a restore visit redirects)
    pub fn rewrite_location(&mut self, location: &Location) {
        let state = HistoryState {
            restoration_identifier: self.restoration_identifier.clone(),
            restoration_index: self.current_index,
        };
        self.history.replace_state(location, state);
        self.location = location.clone();
    }

    fn fresh_state(&mut self) -> HistoryState {
        self.restoration_identifier = self.ids.next_id();
        HistoryState {
            restoration_identifier: self.restoration_identifier.clone(),
            restoration_index: self.current_index,
        }
    }

    /// Move through the underlying history, returning what popped
    pub fn go(&mut self, delta: i64) -> Option<PoppedEntry> {
        let entry = self.history.go(delta)?;
        self.popped(entry.location, entry.state)
    }

    /// Handle a pop event. Entries we did not create are ignored.
    pub fn popped(&mut self, location: Location, state: Option<HistoryState>) -> Option<PoppedEntry> {
        let state = state?;
        let direction = if state.restoration_index > self.current_index {
            Direction::Forward
        } else if state.restoration_index < self.current_index {
            Direction::Back
        } else {
            Direction::None
        };
        self.location = location.clone();
        self.restoration_identifier = state.restoration_identifier.clone();
        self.current_index = state.restoration_index;
        tracing::debug!(%location, ?direction, "history popped");
        Some(PoppedEntry { location, restoration_identifier: state.restoration_identifier, direction })
    }

    pub fn restoration_data(&self, restoration_identifier: &str) -> RestorationData {
        self.restoration_data.get(restoration_identifier).cloned().unwrap_or_default()
    }

    /// Merge into the current entry's restoration data
    pub fn update_restoration_data(&mut self, data: RestorationData) {
        let entry = self.restoration_data.entry(self.restoration_identifier.clone()).or_default();
        if data.scroll_position.is_some() {
            entry.scroll_position = data.scroll_position;
        }
    }
}

impl std::fmt::Debug for HistoryBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryBridge")
            .field("location", &self.location)
            .field("restoration_identifier", &self.restoration_identifier)
            .field("current_index", &self.current_index)
            .finish()
    }
}
