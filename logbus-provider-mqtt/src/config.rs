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

//! Configuration types for the MQTT provider.

use std::time::Duration;

use rumqttc::MqttOptions;
use serde::Deserialize;

use logbus_listener::ConnectionParams;

/// Broker settings registered under a connection-factory binding name.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttBrokerConfig {
    /// MQTT broker hostname or IP.
    pub broker_host: String,
    /// MQTT broker port (default: 1883).
    pub port: u16,
    /// MQTT client ID. Defaults to `"logbus-{broker_host}"`.
    pub client_id: String,
    /// Username used when the listener supplies none.
    pub username: Option<String>,
    pub password: Option<String>,
    /// Keep-alive interval in seconds (default: 30).
    pub keep_alive_secs: u64,
    /// Request channel capacity of the client (default: 100).
    pub capacity: usize,
    /// How long to wait for the broker's CONNACK, in seconds (default: 10).
    pub connect_timeout_secs: u64,
}

impl MqttBrokerConfig {
    /// Start building a new config for `broker_host`.
    pub fn builder(broker_host: impl Into<String>) -> MqttBrokerConfigBuilder {
        let broker_host = broker_host.into();
        MqttBrokerConfigBuilder {
            client_id: format!("logbus-{broker_host}"),
            broker_host,
            port: 1883,
            username: None,
            password: None,
            keep_alive_secs: 30,
            capacity: 100,
            connect_timeout_secs: 10,
        }
    }

    /// MQTT options for a connection opened with `params`.
    ///
    /// Credentials in `params` take precedence over the broker defaults.
    pub fn mqtt_options(&self, params: &ConnectionParams) -> MqttOptions {
        let mut opts = MqttOptions::new(&self.client_id, &self.broker_host, self.port);
        opts.set_keep_alive(Duration::from_secs(self.keep_alive_secs));

        let username = params.username.as_ref().or(self.username.as_ref());
        let password = params.password.as_ref().or(self.password.as_ref());
        if let (Some(user), Some(pass)) = (username, password) {
            opts.set_credentials(user, pass);
        }
        opts
    }
}

/// Builder for [`MqttBrokerConfig`].
pub struct MqttBrokerConfigBuilder {
    broker_host: String,
    port: u16,
    client_id: String,
    username: Option<String>,
    password: Option<String>,
    keep_alive_secs: u64,
    capacity: usize,
    connect_timeout_secs: u64,
}

impl MqttBrokerConfigBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
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

    pub fn keep_alive_secs(mut self, secs: u64) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Build the config.
    pub fn build(self) -> MqttBrokerConfig {
        MqttBrokerConfig {
            broker_host: self.broker_host,
            port: self.port,
            client_id: self.client_id,
            username: self.username,
            password: self.password,
            keep_alive_secs: self.keep_alive_secs,
            capacity: self.capacity,
            connect_timeout_secs: self.connect_timeout_secs,
        }
    }
}
