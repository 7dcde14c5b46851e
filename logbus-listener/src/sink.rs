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

//! Downstream sinks for validated events.

use log::{debug, log, log_enabled};
use tokio::sync::mpsc::UnboundedSender;

use crate::message::LoggableEvent;

/// Receives every event the listener accepts.
///
/// Calls are fire-and-forget and may arrive concurrently from several
/// provider delivery threads.
pub trait EventSink: Send + Sync {
    fn accept(&self, event: LoggableEvent);
}

/// Re-emits received events through the process logger.
///
/// The event's logger name becomes the log target (falling back to
/// `default_target`), so the local logger configuration decides what is kept.
#[derive(Debug, Clone)]
pub struct LogSink {
    default_target: String,
}

impl LogSink {
    pub fn new(default_target: impl Into<String>) -> Self {
        Self {
            default_target: default_target.into(),
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new("logbus::remote")
    }
}

impl EventSink for LogSink {
    fn accept(&self, event: LoggableEvent) {
        let target = event.logger.as_deref().unwrap_or(&self.default_target);
        let level = log::Level::from(event.level);
        if !log_enabled!(target: target, level) {
            return;
        }
        match &event.thread {
            Some(thread) => log!(target: target, level, "[{thread}] {}", event.text),
            None => log!(target: target, level, "{}", event.text),
        }
    }
}

/// Forwards events into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<LoggableEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<LoggableEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn accept(&self, event: LoggableEvent) {
        if self.tx.send(event).is_err() {
            debug!("Event channel closed, dropping event");
        }
    }
}
