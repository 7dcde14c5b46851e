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

//! Event listener bound to a message destination.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::config::ListenerConfig;
use crate::diagnostics::{Diagnostics, LogDiagnostics};
use crate::message::{InboundMessage, LoggableEvent, MessageKind, ObjectType};
use crate::provider::{ConnectionFactory, ManagerHandle, ManagerRegistry, MessageListener, Receiver};
use crate::sink::EventSink;
use crate::state::{AtomicListenerState, ListenerState};

/// Receives messages from a destination and forwards the [`LoggableEvent`]s
/// they carry to an [`EventSink`].
///
/// The connection manager is resolved at construction under the listener id.
/// [`start`](Self::start) creates a receiver and registers the dispatcher on
/// it; [`stop`](Self::stop) closes the receiver and releases the manager.
/// A listener is started at most once and cannot be restarted. Dropping it
/// without `stop` still releases the manager, but closes the connection in
/// the background.
pub struct EventListener {
    config: ListenerConfig,
    state: AtomicListenerState,
    manager: ManagerHandle,
    /// Set on start, taken on stop.
    receiver: Mutex<Option<Box<dyn Receiver>>>,
    dispatcher: Arc<Dispatcher>,
}

impl EventListener {
    /// Create a listener whose connection manager lives in the global registry.
    pub fn new(
        config: ListenerConfig,
        factory: &dyn ConnectionFactory,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        Self::with_registry(config, ManagerRegistry::global(), factory, sink)
    }

    pub fn with_registry(
        config: ListenerConfig,
        registry: &ManagerRegistry,
        factory: &dyn ConnectionFactory,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let manager = registry
            .resolve(&config.id, &config.params(), factory)
            .with_context(|| {
                format!(
                    "[{}] Failed to resolve connection factory '{}'",
                    config.id, config.connection_factory_binding
                )
            })?;
        let dispatcher = Arc::new(Dispatcher {
            sink,
            diagnostics: Arc::new(LogDiagnostics::new(&config.id)),
        });

        Ok(Self {
            config,
            state: AtomicListenerState::new(),
            manager,
            receiver: Mutex::new(None),
            dispatcher,
        })
    }

    /// Replace the diagnostics stream. Only meaningful before [`start`](Self::start).
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.dispatcher = Arc::new(Dispatcher {
            sink: self.dispatcher.sink.clone(),
            diagnostics,
        });
        self
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn state(&self) -> ListenerState {
        self.state.get()
    }

    pub fn is_started(&self) -> bool {
        self.state.get() == ListenerState::Started
    }

    pub fn is_stopped(&self) -> bool {
        self.state.get() == ListenerState::Stopped
    }

    /// Create the receiver and register this listener on it.
    ///
    /// Only the first call does anything; later or concurrent calls return
    /// `Ok(())` immediately. A provider failure is returned to the caller and
    /// leaves the listener in [`ListenerState::Starting`].
    pub async fn start(&self) -> Result<()> {
        if !self
            .state
            .compare_and_set(ListenerState::Initialized, ListenerState::Starting)
        {
            debug!("[{}] Start ignored in state {}", self.id(), self.state());
            return Ok(());
        }

        info!(
            "[{}] Starting listener (factory={}, destination={})",
            self.id(),
            self.config.connection_factory_binding,
            self.config.destination_binding
        );

        let receiver = self.manager.create_receiver().await.with_context(|| {
            format!(
                "[{}] Failed to create receiver on '{}'",
                self.id(),
                self.config.destination_binding
            )
        })?;

        {
            let mut slot = self.receiver.lock().await;
            let receiver = slot.insert(receiver);
            receiver
                .set_listener(self.dispatcher.clone())
                .with_context(|| format!("[{}] Failed to register message listener", self.id()))?;
        }

        if !self
            .state
            .compare_and_set(ListenerState::Starting, ListenerState::Started)
        {
            // stop() ran while the receiver was being created.
            let receiver = self.receiver.lock().await.take();
            if let Some(receiver) = receiver {
                if let Err(e) = receiver.close().await {
                    warn!("[{}] Ignoring receiver close failure: {e}", self.id());
                }
            }
            info!("[{}] Listener stopped during start", self.id());
            return Ok(());
        }

        info!("[{}] Listener started", self.id());
        Ok(())
    }

    /// Close the receiver and release the connection manager.
    ///
    /// Never fails. Safe to call before `start` and more than once.
    pub async fn stop(&self) {
        loop {
            let current = self.state.get();
            if matches!(current, ListenerState::Stopping | ListenerState::Stopped) {
                debug!("[{}] Stop ignored in state {current}", self.id());
                return;
            }
            if self.state.compare_and_set(current, ListenerState::Stopping) {
                break;
            }
        }

        let receiver = self.receiver.lock().await.take();
        if let Some(receiver) = receiver {
            if let Err(e) = receiver.close().await {
                warn!("[{}] Ignoring receiver close failure: {e}", self.id());
            }
        }
        self.manager.release().await;

        self.state.set(ListenerState::Stopped);
        info!("[{}] Listener stopped", self.id());
    }

    /// Handle one inbound message. Providers normally call this through the
    /// registered receiver callback.
    pub fn on_message(&self, message: InboundMessage) {
        self.dispatcher.on_message(message);
    }
}

/// Validates inbound messages and forwards their events to the sink.
struct Dispatcher {
    sink: Arc<dyn EventSink>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl MessageListener for Dispatcher {
    fn on_message(&self, message: InboundMessage) {
        if message.kind() != MessageKind::Object {
            self.diagnostics.warn(&format!(
                "Received message of kind {} and type {} which cannot be handled",
                message.kind(),
                message.message_type().unwrap_or("<none>")
            ));
            return;
        }

        let carried = match message.object_body() {
            Ok(carried) => carried,
            Err(e) => {
                self.diagnostics.failure(&e);
                return;
            }
        };

        let type_name = carried.type_name().to_string();
        match carried.into_typed::<LoggableEvent>() {
            Ok(Some(event)) => self.sink.accept(event),
            Ok(None) => self.diagnostics.warn(&format!(
                "Expected object message to carry {}, got type {type_name} instead",
                LoggableEvent::TYPE_NAME
            )),
            Err(e) => self.diagnostics.failure(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::memory::MemoryBroker;
    use crate::provider::{Connection, ConnectionParams};
    use async_trait::async_trait;
    use serde_json::json;
    use std::error::Error;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct RecordingSink(StdMutex<Vec<LoggableEvent>>);

    impl RecordingSink {
        fn events(&self) -> Vec<LoggableEvent> {
            self.0.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn accept(&self, event: LoggableEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[derive(Default)]
    struct RecordingDiagnostics {
        warnings: StdMutex<Vec<String>>,
        failures: StdMutex<Vec<String>>,
    }

    impl RecordingDiagnostics {
        fn total(&self) -> usize {
            self.warnings.lock().unwrap().len() + self.failures.lock().unwrap().len()
        }
    }

    impl Diagnostics for RecordingDiagnostics {
        fn warn(&self, message: &str) {
            self.warnings.lock().unwrap().push(message.to_string());
        }

        fn failure(&self, err: &dyn Error) {
            self.failures.lock().unwrap().push(err.to_string());
        }
    }

    #[derive(Default)]
    struct ReceiverRecord {
        registered: AtomicBool,
        closes: AtomicUsize,
    }

    struct GatedReceiver(Arc<ReceiverRecord>);

    #[async_trait]
    impl Receiver for GatedReceiver {
        fn set_listener(&self, _listener: Arc<dyn MessageListener>) -> Result<(), ProviderError> {
            self.0.registered.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) -> Result<(), ProviderError> {
            self.0.registered.store(false, Ordering::SeqCst);
            self.0.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Hands out receivers only once `gate` is notified.
    struct GatedConnection {
        gate: Arc<Notify>,
        record: Arc<ReceiverRecord>,
    }

    #[async_trait]
    impl Connection for GatedConnection {
        async fn create_receiver(&self) -> Result<Box<dyn Receiver>, ProviderError> {
            self.gate.notified().await;
            Ok(Box::new(GatedReceiver(self.record.clone())))
        }

        async fn close(&self) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    struct GatedFactory(Arc<GatedConnection>);

    impl ConnectionFactory for GatedFactory {
        fn connect(&self, _params: &ConnectionParams) -> Result<Arc<dyn Connection>, ProviderError> {
            Ok(self.0.clone())
        }
    }

    struct Fixture {
        broker: MemoryBroker,
        registry: ManagerRegistry,
        sink: Arc<RecordingSink>,
        diagnostics: Arc<RecordingDiagnostics>,
        listener: EventListener,
    }

    fn fixture_with(broker: MemoryBroker, config: ListenerConfig) -> Fixture {
        let registry = ManagerRegistry::new();
        let sink = Arc::new(RecordingSink::default());
        let diagnostics = Arc::new(RecordingDiagnostics::default());
        let listener = EventListener::with_registry(config, &registry, &broker, sink.clone())
            .unwrap()
            .with_diagnostics(diagnostics.clone());
        Fixture {
            broker,
            registry,
            sink,
            diagnostics,
            listener,
        }
    }

    fn fixture() -> Fixture {
        let config = ListenerConfig::builder("cf1", "dest1")
            .id("listener-1")
            .username("u")
            .password("p")
            .build();
        fixture_with(MemoryBroker::new().with_credentials("u", "p"), config)
    }

    #[tokio::test]
    async fn test_forwards_event_and_releases_on_stop() {
        let f = fixture();
        f.listener.start().await.unwrap();

        let event = LoggableEvent::new("hello");
        f.broker
            .publish("dest1", InboundMessage::object(&event).unwrap());

        assert_eq!(f.sink.events(), vec![event]);
        assert_eq!(f.diagnostics.total(), 0);

        f.listener.stop().await;
        assert!(!f.registry.contains("listener-1"));
        assert_eq!(f.broker.connections_closed(), 1);
        assert_eq!(f.broker.receiver_count("dest1"), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_create_one_receiver() {
        let f = fixture();
        let listener = Arc::new(f.listener);

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let listener = listener.clone();
                tokio::spawn(async move { listener.start().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(f.broker.receivers_created(), 1);
        assert_eq!(f.broker.receiver_count("dest1"), 1);
        assert!(listener.is_started());
    }

    #[tokio::test]
    async fn test_state_reaches_started_then_stopped() {
        let f = fixture();
        assert!(!f.listener.is_started());
        assert!(!f.listener.is_stopped());
        assert_eq!(f.listener.state(), ListenerState::Initialized);

        f.listener.start().await.unwrap();
        assert!(f.listener.is_started());

        f.listener.stop().await;
        assert!(!f.listener.is_started());
        assert!(f.listener.is_stopped());
    }

    #[tokio::test]
    async fn test_stop_during_start_closes_new_receiver() {
        let gate = Arc::new(Notify::new());
        let record = Arc::new(ReceiverRecord::default());
        let factory = GatedFactory(Arc::new(GatedConnection {
            gate: gate.clone(),
            record: record.clone(),
        }));
        let registry = ManagerRegistry::new();
        let config = ListenerConfig::builder("cf1", "dest1").id("gated").build();
        let listener = Arc::new(
            EventListener::with_registry(config, &registry, &factory, Arc::new(RecordingSink::default()))
                .unwrap(),
        );

        let starting = tokio::spawn({
            let listener = listener.clone();
            async move { listener.start().await }
        });
        while listener.state() != ListenerState::Starting {
            tokio::task::yield_now().await;
        }

        listener.stop().await;
        assert!(listener.is_stopped());
        assert!(!registry.contains("gated"));
        assert_eq!(record.closes.load(Ordering::SeqCst), 0);

        gate.notify_one();
        starting.await.unwrap().unwrap();

        assert_eq!(record.closes.load(Ordering::SeqCst), 1);
        assert!(!record.registered.load(Ordering::SeqCst));
        assert!(listener.is_stopped());
        assert!(!listener.is_started());
    }

    #[tokio::test]
    async fn test_stop_before_start_is_harmless() {
        let f = fixture();
        f.listener.stop().await;

        assert!(f.listener.is_stopped());
        assert!(!f.registry.contains("listener-1"));

        // Not restartable.
        f.listener.start().await.unwrap();
        assert_eq!(f.broker.receivers_created(), 0);
        assert!(f.listener.is_stopped());
    }

    #[tokio::test]
    async fn test_stop_twice() {
        let f = fixture();
        f.listener.start().await.unwrap();

        f.listener.stop().await;
        f.listener.stop().await;

        assert!(f.listener.is_stopped());
        assert_eq!(f.broker.connections_closed(), 1);
    }

    #[tokio::test]
    async fn test_start_failure_leaves_listener_starting() {
        let f = fixture();
        f.broker.set_unavailable(true);

        let err = f.listener.start().await.unwrap_err();
        assert!(err.to_string().contains("Failed to create receiver"));
        assert_eq!(f.listener.state(), ListenerState::Starting);
        assert!(!f.listener.is_started());

        // No retry on a second call.
        f.broker.set_unavailable(false);
        f.listener.start().await.unwrap();
        assert_eq!(f.broker.receivers_created(), 0);

        f.listener.stop().await;
        assert!(f.listener.is_stopped());
        assert!(!f.registry.contains("listener-1"));
    }

    #[tokio::test]
    async fn test_rejected_credentials_fail_start() {
        let config = ListenerConfig::builder("cf1", "dest1")
            .username("u")
            .password("wrong")
            .build();
        let f = fixture_with(MemoryBroker::new().with_credentials("u", "p"), config);

        let err = f.listener.start().await.unwrap_err();
        assert!(err.chain().any(|cause| cause.to_string().contains("credentials rejected")));
    }

    #[tokio::test]
    async fn test_close_failure_is_swallowed() {
        let f = fixture();
        f.listener.start().await.unwrap();
        f.broker.set_close_failure(true);

        f.listener.stop().await;

        assert!(f.listener.is_stopped());
        assert!(!f.registry.contains("listener-1"));
    }

    #[tokio::test]
    async fn test_non_object_message_is_diagnosed() {
        let f = fixture();
        f.listener.start().await.unwrap();

        f.broker
            .publish("dest1", InboundMessage::text("hello").with_message_type("note"));

        assert!(f.sink.events().is_empty());
        let warnings = f.diagnostics.warnings.lock().unwrap().clone();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("kind text"));
        assert!(warnings[0].contains("type note"));
        assert_eq!(f.diagnostics.total(), 1);
    }

    #[tokio::test]
    async fn test_other_object_type_is_diagnosed() {
        let f = fixture();
        f.listener.start().await.unwrap();

        f.broker.publish(
            "dest1",
            InboundMessage::object_raw(json!({"type": "Invoice", "value": {"total": 10}})),
        );

        assert!(f.sink.events().is_empty());
        let warnings = f.diagnostics.warnings.lock().unwrap().clone();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Invoice"));
        assert_eq!(f.diagnostics.total(), 1);
    }

    #[tokio::test]
    async fn test_extraction_failure_does_not_stop_listener() {
        let f = fixture();
        f.listener.start().await.unwrap();

        f.broker
            .publish("dest1", InboundMessage::object_raw(json!([1, 2, 3])));
        assert!(f.sink.events().is_empty());
        assert_eq!(f.diagnostics.failures.lock().unwrap().len(), 1);
        assert_eq!(f.diagnostics.total(), 1);

        let next = LoggableEvent::new("still alive");
        f.broker
            .publish("dest1", InboundMessage::object(&next).unwrap());
        assert_eq!(f.sink.events(), vec![next]);
        assert_eq!(f.diagnostics.total(), 1);
    }

    #[tokio::test]
    async fn test_malformed_event_fields_are_diagnosed() {
        let f = fixture();
        f.listener.start().await.unwrap();

        f.broker.publish(
            "dest1",
            InboundMessage::object_raw(json!({"type": "LoggableEvent", "value": {"level": "INFO"}})),
        );

        assert!(f.sink.events().is_empty());
        assert_eq!(f.diagnostics.failures.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_direct_dispatch_without_start() {
        let f = fixture();
        let event = LoggableEvent::new("direct");
        f.listener.on_message(InboundMessage::object(&event).unwrap());

        assert_eq!(f.sink.events(), vec![event]);
    }

    #[tokio::test]
    async fn test_messages_after_stop_are_not_delivered() {
        let f = fixture();
        f.listener.start().await.unwrap();
        f.listener.stop().await;

        let delivered = f.broker.publish(
            "dest1",
            InboundMessage::object(&LoggableEvent::new("late")).unwrap(),
        );

        assert_eq!(delivered, 0);
        assert!(f.sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_listeners_sharing_an_id_share_the_connection() {
        let broker = MemoryBroker::new();
        let registry = ManagerRegistry::new();
        let config = ListenerConfig::builder("cf1", "dest1").id("shared").build();
        let sink_a = Arc::new(RecordingSink::default());
        let sink_b = Arc::new(RecordingSink::default());

        let a = EventListener::with_registry(config.clone(), &registry, &broker, sink_a.clone()).unwrap();
        let b = EventListener::with_registry(config, &registry, &broker, sink_b.clone()).unwrap();
        assert_eq!(broker.connections_opened(), 1);
        assert_eq!(registry.ref_count("shared"), 2);

        a.start().await.unwrap();
        b.start().await.unwrap();
        a.stop().await;
        assert_eq!(broker.connections_closed(), 0);

        broker.publish("dest1", InboundMessage::object(&LoggableEvent::new("b only")).unwrap());
        assert!(sink_a.events().is_empty());
        assert_eq!(sink_b.events().len(), 1);

        b.stop().await;
        assert_eq!(broker.connections_closed(), 1);
    }
}
