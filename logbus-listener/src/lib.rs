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

//! Log event listener for message destinations.
//!
//! Binds to a publish/subscribe destination through a pluggable
//! [`ConnectionFactory`], validates inbound messages, and forwards the
//! [`LoggableEvent`]s they carry to an [`EventSink`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use logbus_listener::{EventListener, ListenerConfig, LogSink, MemoryBroker};
//!
//! let config = ListenerConfig::builder("local", "app-logs")
//!     .username("reader")
//!     .password("secret")
//!     .build();
//!
//! let broker = MemoryBroker::new();
//! let listener = EventListener::new(config, &broker, Arc::new(LogSink::default()))?;
//! listener.start().await?;
//! // ...
//! listener.stop().await;
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod listener;
pub mod memory;
pub mod message;
pub mod provider;
pub mod sink;
pub mod state;

pub use config::{ListenerConfig, ListenerConfigBuilder};
pub use diagnostics::{Diagnostics, LogDiagnostics};
pub use error::ProviderError;
pub use listener::EventListener;
pub use memory::MemoryBroker;
pub use message::{CarriedObject, InboundMessage, Level, LoggableEvent, MessageKind, ObjectType};
pub use provider::{
    Connection, ConnectionFactory, ConnectionParams, ManagerHandle, ManagerRegistry,
    MessageListener, Receiver,
};
pub use sink::{ChannelSink, EventSink, LogSink};
pub use state::{AtomicListenerState, ListenerState};
