//! Circular playlist navigation.
//!
//! The starting index is drawn uniformly at random when the catalog loads so
//! each session tunes in somewhere different.  Every transition records the
//! index it left in `history`, which is append-only.

use rand::Rng;
use tracing::debug;

use crate::error::NavigationError;
use crate::gesture::NavBounds;
use crate::protocol::Station;

#[derive(Debug, Clone, Default)]
pub struct Navigator {
    stations: Vec<Station>,
    index: usize,
    history: Vec<usize>,
}

impl Navigator {
    /// Start at a uniformly random index.
    pub fn with_random_start<R: Rng>(stations: Vec<Station>, rng: &mut R) -> Self {
        let index = if stations.is_empty() {
            0
        } else {
            rng.gen_range(0..stations.len())
        };
        debug!("navigation: {} stations, starting at {}", stations.len(), index);
        Self {
            stations,
            index,
            history: Vec::new(),
        }
    }

    /// Start at a fixed index (clamped into range).
    pub fn with_start(stations: Vec<Station>, index: usize) -> Self {
        let index = if stations.is_empty() {
            0
        } else {
            index.min(stations.len() - 1)
        };
        Self {
            stations,
            index,
            history: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    /// Current index, `None` for an empty playlist.
    pub fn index(&self) -> Option<usize> {
        (!self.is_empty()).then_some(self.index)
    }

    pub fn history(&self) -> &[usize] {
        &self.history
    }

    pub fn next_index(&self) -> Option<usize> {
        (!self.is_empty()).then(|| (self.index + 1) % self.len())
    }

    pub fn previous_index(&self) -> Option<usize> {
        (!self.is_empty()).then(|| (self.index + self.len() - 1) % self.len())
    }

    pub fn current(&self) -> Option<&Station> {
        self.stations.get(self.index)
    }

    pub fn peek_next(&self) -> Option<&Station> {
        self.next_index().and_then(|i| self.stations.get(i))
    }

    pub fn peek_previous(&self) -> Option<&Station> {
        self.previous_index().and_then(|i| self.stations.get(i))
    }

    pub fn bounds(&self) -> NavBounds {
        NavBounds {
            can_go_next: self.peek_next().is_some(),
            can_go_previous: self.peek_previous().is_some(),
        }
    }

    /// Advance with wrap-around.  Returns the new index; no-op when empty.
    pub fn next(&mut self) -> Option<usize> {
        let target = self.next_index()?;
        self.move_to(target);
        Some(target)
    }

    /// Step back with wrap-around.  Returns the new index; no-op when empty.
    pub fn previous(&mut self) -> Option<usize> {
        let target = self.previous_index()?;
        self.move_to(target);
        Some(target)
    }

    pub fn go_to(&mut self, target: usize) -> Result<usize, NavigationError> {
        if target >= self.len() {
            return Err(NavigationError::OutOfRange {
                index: target,
                len: self.len(),
            });
        }
        self.move_to(target);
        Ok(target)
    }

    fn move_to(&mut self, target: usize) {
        self.history.push(self.index);
        debug!("navigation: {} → {}", self.index, target);
        self.index = target;
    }
}
