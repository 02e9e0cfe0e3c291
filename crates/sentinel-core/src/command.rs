//! Follow-up commands queued by callbacks and applied once the current
//! engine operation has finished.

use std::collections::VecDeque;

/// Engine mutation requested from inside a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineCommand {
    /// Remove every watch.
    ClearWatches,
    /// Remove the watch registered at the address.
    RemoveWatch(u32),
    /// Remove every validation condition.
    ClearConditions,
    /// Remove every protected region.
    ClearProtectedRegions,
    /// Switch hardcore mode on or off.
    SetHardcore(bool),
    /// Switch access tracking on or off.
    EnableTracking(bool),
    /// Drop the active game context.
    UnloadGame,
    /// Disable achievements for the rest of the session.
    DisableAchievements,
}

/// FIFO of commands handed to callbacks.
///
/// Callbacks run while the engine is mid-iteration over its own tables, so
/// they cannot call back into it directly; they push commands here instead.
#[derive(Debug, Default)]
pub struct Followups {
    queue: VecDeque<EngineCommand>,
}

impl Followups {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a command to run after the current operation.
    pub fn push(&mut self, command: EngineCommand) {
        self.queue.push_back(command);
    }

    /// Number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn pop(&mut self) -> Option<EngineCommand> {
        self.queue.pop_front()
    }
}
