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

//! MQTT messaging provider for logbus listeners.
//!
//! Connection-factory binding names resolve to [`MqttBrokerConfig`]s and
//! destination binding names are MQTT topic filters. Payloads are JSON
//! message envelopes; anything else is delivered as a raw bytes message.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use logbus_listener::{EventListener, ListenerConfig, LogSink};
//! use logbus_provider_mqtt::{MqttBrokerConfig, MqttConnectionFactory};
//!
//! let factory = MqttConnectionFactory::new()
//!     .with_binding("local", MqttBrokerConfig::builder("broker.local").port(1883).build());
//!
//! let config = ListenerConfig::builder("local", "logs/#").build();
//! let listener = EventListener::new(config, &factory, Arc::new(LogSink::default()))?;
//! listener.start().await?;
//! ```

pub mod codec;
pub mod config;
pub mod connection;

pub use config::{MqttBrokerConfig, MqttBrokerConfigBuilder};
pub use connection::{MqttConnection, MqttConnectionFactory, MqttReceiver};
