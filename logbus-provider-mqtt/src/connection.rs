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

//! MQTT implementation of the provider traits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use log::{error, info, warn};
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Incoming, Outgoing, QoS,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use logbus_listener::{
    Connection, ConnectionFactory, ConnectionParams, InboundMessage, MessageListener, ProviderError,
    Receiver,
};

use crate::codec;
use crate::config::MqttBrokerConfig;

type Listeners = Arc<DashMap<Uuid, Arc<dyn MessageListener>>>;

/// How long `close` waits for the event loop to flush DISCONNECT.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Resolves connection-factory binding names to MQTT brokers.
#[derive(Debug, Clone, Default)]
pub struct MqttConnectionFactory {
    bindings: HashMap<String, MqttBrokerConfig>,
}

impl MqttConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `config` under the binding name `name`.
    pub fn with_binding(mut self, name: impl Into<String>, config: MqttBrokerConfig) -> Self {
        self.bindings.insert(name.into(), config);
        self
    }
}

impl ConnectionFactory for MqttConnectionFactory {
    fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn Connection>, ProviderError> {
        let config = self
            .bindings
            .get(&params.connection_factory_binding)
            .ok_or_else(|| ProviderError::UnknownBinding(params.connection_factory_binding.clone()))?;

        Ok(Arc::new(MqttConnection::new(config, params)))
    }
}

/// Client connection to one broker, subscribed to one destination topic.
///
/// The event loop runs on a spawned task from the first receiver onwards and
/// delivers every publish to all registered listeners.
pub struct MqttConnection {
    binding: String,
    topic: String,
    username: Option<String>,
    connect_timeout: Duration,
    client: AsyncClient,
    /// Held across the CONNACK wait so concurrent receivers share one attempt.
    event_loop: tokio::sync::Mutex<EventLoopState>,
    listeners: Listeners,
    subscription: Arc<Subscription>,
}

enum EventLoopState {
    /// Not connected yet, or the last connection attempt failed.
    Idle(EventLoop),
    Running {
        task: JoinHandle<()>,
        shutdown_tx: oneshot::Sender<()>,
    },
    Closed,
}

impl MqttConnection {
    fn new(config: &MqttBrokerConfig, params: &ConnectionParams) -> Self {
        let (client, eventloop) = AsyncClient::new(config.mqtt_options(params), config.capacity);
        let topic = params.destination_binding.clone();

        MqttConnection {
            binding: params.connection_factory_binding.clone(),
            username: params.username.clone().or_else(|| config.username.clone()),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            subscription: Arc::new(Subscription::new(topic.clone(), client.clone())),
            topic,
            client,
            event_loop: tokio::sync::Mutex::new(EventLoopState::Idle(eventloop)),
            listeners: Arc::new(DashMap::new()),
        }
    }

    /// Poll until the broker acknowledges the connection.
    async fn establish(&self, eventloop: &mut EventLoop) -> Result<(), ProviderError> {
        let wait = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => return Ok(()),
                    Ok(_) => {}
                    Err(ConnectionError::ConnectionRefused(
                        ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized,
                    )) => {
                        return Err(ProviderError::CredentialsRejected(
                            self.username.clone().unwrap_or_default(),
                        ))
                    }
                    Err(e) => return Err(ProviderError::Connection(e.to_string())),
                }
            }
        };

        tokio::time::timeout(self.connect_timeout, wait)
            .await
            .map_err(|_| {
                ProviderError::Connection(format!(
                    "no CONNACK from '{}' within {:?}",
                    self.binding, self.connect_timeout
                ))
            })?
    }

    /// Connect and spawn the event loop if that has not happened yet.
    ///
    /// Callers arriving while a connection attempt is in flight wait for it;
    /// after a failed attempt the next caller tries again.
    async fn ensure_running(&self) -> Result<(), ProviderError> {
        let mut state = self.event_loop.lock().await;
        match std::mem::replace(&mut *state, EventLoopState::Closed) {
            running @ EventLoopState::Running { .. } => {
                *state = running;
                Ok(())
            }
            EventLoopState::Closed => Err(ProviderError::Connection(format!(
                "connection '{}' is closed",
                self.binding
            ))),
            EventLoopState::Idle(mut eventloop) => {
                if let Err(e) = self.establish(&mut eventloop).await {
                    *state = EventLoopState::Idle(eventloop);
                    return Err(e);
                }
                info!("[{}] Connected, delivering from '{}'", self.binding, self.topic);

                let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
                let task = tokio::spawn(run_event_loop(
                    self.binding.clone(),
                    eventloop,
                    self.listeners.clone(),
                    self.subscription.clone(),
                    shutdown_rx,
                ));
                *state = EventLoopState::Running { task, shutdown_tx };
                Ok(())
            }
        }
    }
}

async fn run_event_loop(
    binding: String,
    mut eventloop: EventLoop,
    listeners: Listeners,
    subscription: Arc<Subscription>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    info!("[{binding}] MQTT event loop started");
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("[{binding}] Shutdown signal received");
                break;
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        let message = codec::payload_to_message(&publish.payload, &publish.topic);
                        deliver(&listeners, message);
                    }
                    Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                        // Reconnected. A clean session has lost the subscription.
                        if !ack.session_present {
                            subscription.resubscribe();
                        }
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        info!("[{binding}] Disconnected");
                        break;
                    }
                    Ok(_) => {} // SubAck, PingResp, ...
                    Err(e) => {
                        error!("[{binding}] MQTT connection error: {e}");
                        // rumqttc reconnects on the next poll()
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

/// Hand `message` to every registered listener.
fn deliver(listeners: &DashMap<Uuid, Arc<dyn MessageListener>>, message: InboundMessage) {
    let snapshot: Vec<_> = listeners.iter().map(|e| e.value().clone()).collect();
    for listener in snapshot {
        listener.on_message(message.clone());
    }
}

/// Number of open receivers on the destination topic.
///
/// SUBSCRIBE and UNSUBSCRIBE requests are queued while the count is locked,
/// so they reach the broker in the order the count changed.
struct Subscription {
    topic: String,
    client: AsyncClient,
    receivers: Mutex<usize>,
}

impl Subscription {
    fn new(topic: String, client: AsyncClient) -> Self {
        Self {
            topic,
            client,
            receivers: Mutex::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.receivers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count a new receiver, subscribing if it is the first.
    fn acquire(&self) -> Result<(), ProviderError> {
        let mut receivers = self.lock();
        if *receivers == 0 {
            self.client
                .try_subscribe(&self.topic, QoS::AtLeastOnce)
                .map_err(|e| ProviderError::Subscribe {
                    destination: self.topic.clone(),
                    reason: e.to_string(),
                })?;
        }
        *receivers += 1;
        Ok(())
    }

    /// Drop a receiver, unsubscribing after the last one.
    ///
    /// Returns `true` if the topic was unsubscribed.
    fn release(&self) -> Result<bool, ProviderError> {
        let mut receivers = self.lock();
        *receivers = receivers.saturating_sub(1);
        if *receivers > 0 {
            return Ok(false);
        }
        self.client
            .try_unsubscribe(&self.topic)
            .map_err(|e| ProviderError::Close(e.to_string()))?;
        Ok(true)
    }

    fn resubscribe(&self) {
        let receivers = self.lock();
        if *receivers == 0 {
            return;
        }
        match self.client.try_subscribe(&self.topic, QoS::AtLeastOnce) {
            Ok(()) => info!("Resubscribed to '{}'", self.topic),
            Err(e) => warn!("Failed to resubscribe to '{}': {e}", self.topic),
        }
    }

    fn count(&self) -> usize {
        *self.lock()
    }
}

#[async_trait]
impl Connection for MqttConnection {
    async fn create_receiver(&self) -> Result<Box<dyn Receiver>, ProviderError> {
        self.ensure_running().await?;
        self.subscription.acquire()?;

        Ok(Box::new(MqttReceiver::new(
            self.listeners.clone(),
            self.subscription.clone(),
        )))
    }

    async fn close(&self) -> Result<(), ProviderError> {
        let previous = std::mem::replace(&mut *self.event_loop.lock().await, EventLoopState::Closed);
        let EventLoopState::Running {
            mut task,
            shutdown_tx,
        } = previous
        else {
            return Ok(());
        };

        let result = self
            .client
            .disconnect()
            .await
            .map_err(|e| ProviderError::Close(e.to_string()));

        // The loop exits once DISCONNECT is flushed; stop it if it does not.
        if result.is_err() || tokio::time::timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
            let _ = shutdown_tx.send(());
        }
        result
    }
}

/// Subscription handle registered on an [`MqttConnection`].
pub struct MqttReceiver {
    id: Uuid,
    listeners: Listeners,
    subscription: Arc<Subscription>,
    closed: AtomicBool,
}

impl MqttReceiver {
    fn new(listeners: Listeners, subscription: Arc<Subscription>) -> Self {
        Self {
            id: Uuid::new_v4(),
            listeners,
            subscription,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Receiver for MqttReceiver {
    fn set_listener(&self, listener: Arc<dyn MessageListener>) -> Result<(), ProviderError> {
        self.listeners.insert(self.id, listener);
        Ok(())
    }

    async fn close(&self) -> Result<(), ProviderError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.listeners.remove(&self.id);
        if let Err(e) = self.subscription.release() {
            warn!("Failed to unsubscribe from '{}': {e}", self.subscription.topic);
            return Err(e);
        }
        Ok(())
    }
}
