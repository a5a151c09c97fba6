use std::collections::VecDeque;

use crate::Action;
use crate::PoolError;
use crate::Result;

/// One change retained for incremental catch-up
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetItem<T> {
    pub payload: T,
    pub name: String,
    pub sequence: u32,
    pub action: Action,
}

impl<T> OffsetItem<T> {
    pub fn is_delete(&self) -> bool {
        self.action == Action::Delete
    }
}

/// Bounded, sequence-ordered buffer of the most recent changes.
///
/// Items are appended with strictly increasing sequences, so the front is the
/// oldest retained change.
#[derive(Debug, Clone)]
pub struct OffsetWindow<T> {
    items: VecDeque<OffsetItem<T>>,
}

impl<T> Default for OffsetWindow<T> {
    fn default() -> Self {
        Self { items: VecDeque::new() }
    }
}

impl<T: Clone> OffsetWindow<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        sequence: u32,
        name: &str,
        action: Action,
        payload: T,
    ) {
        debug_assert!(
            self.last_sequence().map_or(true, |last| sequence > last),
            "window sequences must increase"
        );
        self.items.push_back(OffsetItem {
            payload,
            name: name.to_string(),
            sequence,
            action,
        });
    }

    /// Drops the oldest items until at most `max_size` remain
    pub fn trim(
        &mut self,
        max_size: usize,
    ) -> usize {
        let excess = self.items.len().saturating_sub(max_size);
        self.items.drain(..excess);
        excess
    }

    /// Items with `sequence > start`, ascending.
    ///
    /// `start` is the last sequence the caller has consumed. It fails with
    /// `OutOfBounds` when changes after `start` were already trimmed away.
    pub fn pool(
        &self,
        start: u32,
    ) -> Result<Vec<OffsetItem<T>>> {
        let Some(first) = self.first_sequence() else {
            return Ok(Vec::new());
        };

        if start < first.saturating_sub(1) {
            return Err(PoolError::OutOfBounds {
                start,
                first_retained: first,
            }
            .into());
        }

        let from = self.items.partition_point(|item| item.sequence <= start);
        Ok(self.items.range(from..).cloned().collect())
    }

    pub fn first_sequence(&self) -> Option<u32> {
        self.items.front().map(|item| item.sequence)
    }

    pub fn last_sequence(&self) -> Option<u32> {
        self.items.back().map(|item| item.sequence)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
