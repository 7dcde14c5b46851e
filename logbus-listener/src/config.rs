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

//! Configuration types for the event listener.

use serde::Deserialize;

use crate::provider::ConnectionParams;

/// Configuration for an [`EventListener`](crate::EventListener).
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    /// Unique listener identifier. Also the key under which the listener's
    /// connection manager is registered.
    #[serde(default = "generated_id")]
    pub id: String,
    /// Binding name of the connection factory to resolve.
    pub connection_factory_binding: String,
    /// Binding name of the destination to receive from.
    pub destination_binding: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

fn generated_id() -> String {
    format!("logbus-listener-{}", uuid::Uuid::new_v4())
}

impl ListenerConfig {
    /// Start building a new config with the required bindings.
    pub fn builder(
        connection_factory_binding: impl Into<String>,
        destination_binding: impl Into<String>,
    ) -> ListenerConfigBuilder {
        ListenerConfigBuilder {
            id: None,
            connection_factory_binding: connection_factory_binding.into(),
            destination_binding: destination_binding.into(),
            username: None,
            password: None,
        }
    }

    pub fn params(&self) -> ConnectionParams {
        ConnectionParams {
            connection_factory_binding: self.connection_factory_binding.clone(),
            destination_binding: self.destination_binding.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

/// Builder for [`ListenerConfig`].
pub struct ListenerConfigBuilder {
    id: Option<String>,
    connection_factory_binding: String,
    destination_binding: String,
    username: Option<String>,
    password: Option<String>,
}

impl ListenerConfigBuilder {
    /// Use an explicit identifier instead of a generated one.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Build the config.
    pub fn build(self) -> ListenerConfig {
        ListenerConfig {
            id: self.id.unwrap_or_else(generated_id),
            connection_factory_binding: self.connection_factory_binding,
            destination_binding: self.destination_binding,
            username: self.username,
            password: self.password,
        }
    }
}
