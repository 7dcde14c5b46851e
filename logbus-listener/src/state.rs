// Copyright 2025 The Logbus Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Listener lifecycle state and its lock-free cell.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of an [`EventListener`](crate::EventListener).
///
/// `Initialized -> Starting -> Started -> Stopping -> Stopped`. A listener
/// leaves `Initialized` at most once and is never restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ListenerState {
    Initialized = 0,
    Starting = 1,
    Started = 2,
    Stopping = 3,
    Stopped = 4,
}

impl ListenerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ListenerState::Initialized,
            1 => ListenerState::Starting,
            2 => ListenerState::Started,
            3 => ListenerState::Stopping,
            _ => ListenerState::Stopped,
        }
    }
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListenerState::Initialized => "initialized",
            ListenerState::Starting => "starting",
            ListenerState::Started => "started",
            ListenerState::Stopping => "stopping",
            ListenerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Atomically readable and compare-and-swappable [`ListenerState`].
#[derive(Debug)]
pub struct AtomicListenerState(AtomicU8);

impl AtomicListenerState {
    pub fn new() -> Self {
        Self(AtomicU8::new(ListenerState::Initialized as u8))
    }

    pub fn get(&self) -> ListenerState {
        ListenerState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `new` only if the cell currently holds `current`.
    ///
    /// Returns `true` for the single caller that won the transition.
    pub fn compare_and_set(&self, current: ListenerState, new: ListenerState) -> bool {
        self.0
            .compare_exchange(current as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn set(&self, new: ListenerState) {
        self.0.store(new as u8, Ordering::Release);
    }
}

impl Default for AtomicListenerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_starts_initialized() {
        let state = AtomicListenerState::new();
        assert_eq!(state.get(), ListenerState::Initialized);
    }

    #[test]
    fn test_compare_and_set_only_from_expected() {
        let state = AtomicListenerState::new();
        assert!(!state.compare_and_set(ListenerState::Started, ListenerState::Stopping));
        assert!(state.compare_and_set(ListenerState::Initialized, ListenerState::Starting));
        assert!(!state.compare_and_set(ListenerState::Initialized, ListenerState::Starting));
        assert_eq!(state.get(), ListenerState::Starting);
    }

    #[test]
    fn test_single_winner_across_threads() {
        let state = Arc::new(AtomicListenerState::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let state = state.clone();
                std::thread::spawn(move || {
                    state.compare_and_set(ListenerState::Initialized, ListenerState::Starting)
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(ListenerState::Stopping.to_string(), "stopping");
    }
}
