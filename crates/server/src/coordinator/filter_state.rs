use std::mem;

use shared::domain::FilterId;

/// The session-wide active filter. Starts at `none` and survives reconnects.
#[derive(Debug, Default)]
pub(crate) struct FilterState {
    current: FilterId,
}

impl FilterState {
    /// Replaces the current filter and hands back the one it replaced.
    pub(crate) fn set(&mut self, filter: FilterId) -> FilterId {
        mem::replace(&mut self.current, filter)
    }

    pub(crate) fn get(&self) -> &FilterId {
        &self.current
    }
}
