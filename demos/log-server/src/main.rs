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

//! Log server: receives log events from an MQTT topic and writes them to the
//! local logger.

use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::info;

use logbus_listener::{EventListener, ListenerConfig, LogSink};
use logbus_provider_mqtt::{MqttBrokerConfig, MqttConnectionFactory};

const BINDING: &str = "broker";

#[derive(Debug, Clone, PartialEq)]
struct ServerConfig {
    broker_host: String,
    port: u16,
    topic: String,
    client_id: String,
    username: Option<String>,
    password: Option<String>,
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let broker_host =
            lookup("LOGBUS_BROKER_HOST").ok_or_else(|| anyhow!("LOGBUS_BROKER_HOST not set"))?;
        let port = match lookup("LOGBUS_PORT") {
            Some(port) => port
                .parse::<u16>()
                .with_context(|| format!("Invalid LOGBUS_PORT '{port}'"))?,
            None => 1883,
        };
        let topic = lookup("LOGBUS_TOPIC").unwrap_or_else(|| "logs/#".to_string());
        let client_id = lookup("LOGBUS_CLIENT_ID")
            .unwrap_or_else(|| format!("logbus-server-{}", uuid::Uuid::new_v4()));

        Ok(ServerConfig {
            broker_host,
            port,
            topic,
            client_id,
            username: lookup("LOGBUS_USERNAME"),
            password: lookup("LOGBUS_PASSWORD"),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = ServerConfig::from_env()?;
    info!(
        "Starting log server (broker={}:{}, topic={})",
        config.broker_host, config.port, config.topic
    );

    let factory = MqttConnectionFactory::new().with_binding(
        BINDING,
        MqttBrokerConfig::builder(&config.broker_host)
            .port(config.port)
            .client_id(&config.client_id)
            .build(),
    );

    let mut listener_config = ListenerConfig::builder(BINDING, &config.topic).id(&config.client_id);
    if let (Some(user), Some(pass)) = (&config.username, &config.password) {
        listener_config = listener_config.username(user).password(pass);
    }

    let listener = EventListener::new(listener_config.build(), &factory, Arc::new(LogSink::default()))?;
    listener.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    listener.stop().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[("LOGBUS_BROKER_HOST", "broker.local")])).unwrap();

        assert_eq!(config.broker_host, "broker.local");
        assert_eq!(config.port, 1883);
        assert_eq!(config.topic, "logs/#");
        assert!(config.client_id.starts_with("logbus-server-"));
        assert!(config.username.is_none());
    }

    #[test]
    fn test_missing_broker_host() {
        assert!(ServerConfig::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn test_invalid_port() {
        let result = ServerConfig::from_lookup(lookup(&[
            ("LOGBUS_BROKER_HOST", "broker.local"),
            ("LOGBUS_PORT", "not-a-port"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("LOGBUS_BROKER_HOST", "10.0.0.2"),
            ("LOGBUS_PORT", "8883"),
            ("LOGBUS_TOPIC", "apps/+/logs"),
            ("LOGBUS_CLIENT_ID", "server-a"),
            ("LOGBUS_USERNAME", "reader"),
            ("LOGBUS_PASSWORD", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8883);
        assert_eq!(config.topic, "apps/+/logs");
        assert_eq!(config.client_id, "server-a");
        assert_eq!(config.username.as_deref(), Some("reader"));
        assert_eq!(config.password.as_deref(), Some("secret"));
    }
}
