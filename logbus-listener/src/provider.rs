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

//! Messaging provider seams and the shared connection manager.
//!
//! A provider supplies a [`ConnectionFactory`]. Connections are shared through
//! a [`ManagerRegistry`]: every [`ManagerRegistry::resolve`] under the same
//! name reuses one [`Connection`] and takes a reference on it, and the last
//! [`ManagerHandle::release`] closes it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info, warn};

use crate::error::ProviderError;
use crate::message::InboundMessage;

/// Callback invoked by a provider once per delivered message.
///
/// Providers may call this from any thread, concurrently with itself.
pub trait MessageListener: Send + Sync {
    fn on_message(&self, message: InboundMessage);
}

/// Provider subscription bound to a destination.
#[async_trait]
pub trait Receiver: Send + Sync {
    /// Register the callback for messages arriving on this receiver.
    fn set_listener(&self, listener: Arc<dyn MessageListener>) -> Result<(), ProviderError>;

    async fn close(&self) -> Result<(), ProviderError>;
}

/// Provider connection to a resolved connection factory and destination.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn create_receiver(&self) -> Result<Box<dyn Receiver>, ProviderError>;

    async fn close(&self) -> Result<(), ProviderError>;
}

/// Opens provider connections from binding names.
pub trait ConnectionFactory: Send + Sync {
    fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn Connection>, ProviderError>;
}

/// Binding names and credentials for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub connection_factory_binding: String,
    pub destination_binding: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

struct ManagerEntry {
    connection: Arc<dyn Connection>,
    refs: usize,
}

/// Named, reference-counted connections.
#[derive(Clone, Default)]
pub struct ManagerRegistry {
    entries: Arc<DashMap<String, ManagerEntry>>,
}

impl ManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry.
    pub fn global() -> &'static ManagerRegistry {
        static GLOBAL: OnceLock<ManagerRegistry> = OnceLock::new();
        GLOBAL.get_or_init(ManagerRegistry::new)
    }

    /// Take a reference on the connection registered under `name`, opening it
    /// through `factory` if none exists yet.
    pub fn resolve(
        &self,
        name: &str,
        params: &ConnectionParams,
        factory: &dyn ConnectionFactory,
    ) -> Result<ManagerHandle, ProviderError> {
        let connection = match self.entries.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().refs += 1;
                debug!("Reusing connection manager '{name}' ({} refs)", entry.get().refs);
                entry.get().connection.clone()
            }
            Entry::Vacant(entry) => {
                let connection = factory.connect(params)?;
                info!(
                    "Opened connection manager '{name}' (factory={}, destination={})",
                    params.connection_factory_binding, params.destination_binding
                );
                entry.insert(ManagerEntry {
                    connection: connection.clone(),
                    refs: 1,
                });
                connection
            }
        };

        Ok(ManagerHandle {
            name: name.to_string(),
            registry: self.clone(),
            connection,
            released: AtomicBool::new(false),
        })
    }

    /// Current reference count for `name`, zero if not registered.
    pub fn ref_count(&self, name: &str) -> usize {
        self.entries.get(name).map(|e| e.refs).unwrap_or(0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Drop one reference on `name`, returning the connection if it was the
    /// last one.
    fn detach(&self, name: &str) -> Option<Arc<dyn Connection>> {
        if let Some(mut entry) = self.entries.get_mut(name) {
            entry.refs = entry.refs.saturating_sub(1);
        }
        // A concurrent resolve may have taken a new reference in between.
        let (_, entry) = self.entries.remove_if(name, |_, e| e.refs == 0)?;
        info!("Closing connection manager '{name}'");
        Some(entry.connection)
    }
}

async fn close_manager(name: &str, connection: Arc<dyn Connection>) {
    if let Err(e) = connection.close().await {
        warn!("Failed to close connection manager '{name}': {e}");
    }
}

/// One holder's reference on a shared connection.
///
/// Call [`release`](Self::release) to close the connection deterministically.
/// A handle dropped without it releases its reference anyway and closes the
/// connection on a spawned task, provided a tokio runtime is available.
pub struct ManagerHandle {
    name: String,
    registry: ManagerRegistry,
    connection: Arc<dyn Connection>,
    released: AtomicBool,
}

impl ManagerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn create_receiver(&self) -> Result<Box<dyn Receiver>, ProviderError> {
        self.connection.create_receiver().await
    }

    /// Drop this holder's reference. Only the first call has an effect.
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(connection) = self.registry.detach(&self.name) {
            close_manager(&self.name, connection).await;
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for ManagerHandle {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(connection) = self.registry.detach(&self.name) else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let name = self.name.clone();
                runtime.spawn(async move { close_manager(&name, connection).await });
            }
            Err(_) => warn!(
                "Connection manager '{}' dropped outside a tokio runtime, not closed",
                self.name
            ),
        }
    }
}
