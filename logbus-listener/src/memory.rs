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

//! In-process messaging provider.
//!
//! [`MemoryBroker::publish`] delivers synchronously on the publishing thread
//! to every listener registered on the destination. Clones of a broker share
//! the same destinations and counters.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;
use uuid::Uuid;

use crate::error::ProviderError;
use crate::message::InboundMessage;
use crate::provider::{Connection, ConnectionFactory, ConnectionParams, MessageListener, Receiver};

type Subscribers = Arc<DashMap<Uuid, Arc<dyn MessageListener>>>;

#[derive(Default)]
struct BrokerState {
    destinations: DashMap<String, Subscribers>,
    connections_opened: AtomicUsize,
    connections_closed: AtomicUsize,
    receivers_created: AtomicUsize,
    unavailable: AtomicBool,
    fail_close: AtomicBool,
}

impl BrokerState {
    fn subscribers(&self, destination: &str) -> Subscribers {
        self.destinations
            .entry(destination.to_string())
            .or_default()
            .clone()
    }
}

/// In-memory [`ConnectionFactory`].
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
    credentials: Option<(String, String)>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require these credentials when creating receivers.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Deliver `message` to every receiver on `destination`.
    ///
    /// Returns the number of listeners invoked.
    pub fn publish(&self, destination: &str, message: InboundMessage) -> usize {
        let Some(subscribers) = self.state.destinations.get(destination).map(|s| s.clone()) else {
            return 0;
        };
        let listeners: Vec<_> = subscribers.iter().map(|e| e.value().clone()).collect();
        for listener in &listeners {
            listener.on_message(message.clone());
        }
        listeners.len()
    }

    /// Make receiver creation fail as if the destination were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make receiver close report a failure (the receiver is still removed).
    pub fn set_close_failure(&self, fail: bool) {
        self.state.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn receiver_count(&self, destination: &str) -> usize {
        self.state
            .destinations
            .get(destination)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    pub fn connections_opened(&self) -> usize {
        self.state.connections_opened.load(Ordering::SeqCst)
    }

    pub fn connections_closed(&self) -> usize {
        self.state.connections_closed.load(Ordering::SeqCst)
    }

    pub fn receivers_created(&self) -> usize {
        self.state.receivers_created.load(Ordering::SeqCst)
    }
}

impl ConnectionFactory for MemoryBroker {
    fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn Connection>, ProviderError> {
        self.state.connections_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryConnection {
            state: self.state.clone(),
            destination: params.destination_binding.clone(),
            expected: self.credentials.clone(),
            username: params.username.clone(),
            password: params.password.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemoryConnection {
    state: Arc<BrokerState>,
    destination: String,
    expected: Option<(String, String)>,
    username: Option<String>,
    password: Option<String>,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn create_receiver(&self) -> Result<Box<dyn Receiver>, ProviderError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProviderError::Connection("connection is closed".into()));
        }
        if self.state.unavailable.load(Ordering::SeqCst) {
            return Err(ProviderError::Connection(format!(
                "destination '{}' is unavailable",
                self.destination
            )));
        }
        if let Some((user, pass)) = &self.expected {
            if self.username.as_ref() != Some(user) || self.password.as_ref() != Some(pass) {
                return Err(ProviderError::CredentialsRejected(
                    self.username.clone().unwrap_or_default(),
                ));
            }
        }

        self.state.receivers_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryReceiver {
            id: Uuid::new_v4(),
            subscribers: self.state.subscribers(&self.destination),
            state: self.state.clone(),
        }))
    }

    async fn close(&self) -> Result<(), ProviderError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.connections_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct MemoryReceiver {
    id: Uuid,
    subscribers: Subscribers,
    state: Arc<BrokerState>,
}

#[async_trait]
impl Receiver for MemoryReceiver {
    fn set_listener(&self, listener: Arc<dyn MessageListener>) -> Result<(), ProviderError> {
        self.subscribers.insert(self.id, listener);
        Ok(())
    }

    async fn close(&self) -> Result<(), ProviderError> {
        self.subscribers.remove(&self.id);
        debug!("Closed memory receiver {}", self.id);
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(ProviderError::Close("broker connection lost".into()));
        }
        Ok(())
    }
}
