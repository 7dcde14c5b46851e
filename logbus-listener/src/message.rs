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

//! Inbound message envelopes and the payload types they carry.
//!
//! An [`InboundMessage`] is opaque to the listener apart from its
//! [`MessageKind`] and optional type tag. Object envelopes carry a single
//! application object which is only decoded when
//! [`InboundMessage::object_body`] is called.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;

/// Envelope kind of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Body is a single application object.
    Object,
    Text,
    Bytes,
    Map,
    Stream,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Object => "object",
            MessageKind::Text => "text",
            MessageKind::Bytes => "bytes",
            MessageKind::Map => "map",
            MessageKind::Stream => "stream",
        };
        f.write_str(name)
    }
}

/// A message as handed over by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    kind: MessageKind,
    /// Free-form type tag set by the producer.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    message_type: Option<String>,
    #[serde(default)]
    body: Value,
}

impl InboundMessage {
    /// Wrap `object` in an object envelope.
    pub fn object<T: ObjectType + Serialize>(object: &T) -> Result<Self, ProviderError> {
        let carried = CarriedObject {
            type_name: T::TYPE_NAME.to_string(),
            value: serde_json::to_value(object)?,
        };
        Ok(Self {
            kind: MessageKind::Object,
            message_type: None,
            body: serde_json::to_value(carried)?,
        })
    }

    /// Object envelope around an already encoded body.
    pub fn object_raw(body: Value) -> Self {
        Self {
            kind: MessageKind::Object,
            message_type: None,
            body,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            message_type: None,
            body: Value::String(text.into()),
        }
    }

    pub fn bytes(bytes: &[u8]) -> Self {
        Self {
            kind: MessageKind::Bytes,
            message_type: None,
            body: Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        }
    }

    pub fn with_message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn message_type(&self) -> Option<&str> {
        self.message_type.as_deref()
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Extract the carried object of an object envelope.
    pub fn object_body(&self) -> Result<CarriedObject, ProviderError> {
        if self.kind != MessageKind::Object {
            return Err(ProviderError::NotAnObject(self.kind.to_string()));
        }
        Ok(serde_json::from_value(self.body.clone())?)
    }

    /// Decode an envelope from its JSON wire form.
    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Object carried by an object envelope, tagged with its type name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarriedObject {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    value: Value,
}

impl CarriedObject {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Decode into `T` when the carried type is `T`, `None` otherwise.
    pub fn into_typed<T: ObjectType>(self) -> Result<Option<T>, ProviderError> {
        if self.type_name != T::TYPE_NAME {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(self.value)?))
    }
}

/// Application type that can travel inside an object envelope.
pub trait ObjectType: DeserializeOwned {
    const TYPE_NAME: &'static str;
}

/// Severity of a [`LoggableEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<Level> for log::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Trace => log::Level::Trace,
            Level::Debug => log::Level::Debug,
            Level::Info => log::Level::Info,
            Level::Warn => log::Level::Warn,
            Level::Error => log::Level::Error,
        }
    }
}

/// Log event forwarded by the listener to its [`EventSink`](crate::EventSink).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggableEvent {
    pub text: String,
    #[serde(default)]
    pub level: Level,
    /// Name of the logger that produced the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_millis: Option<u64>,
}

impl LoggableEvent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: Level::default(),
            logger: None,
            thread: None,
            timestamp_millis: None,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = Some(logger.into());
        self
    }

    pub fn with_thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = Some(thread.into());
        self
    }

    pub fn with_timestamp_millis(mut self, millis: u64) -> Self {
        self.timestamp_millis = Some(millis);
        self
    }
}

impl ObjectType for LoggableEvent {
    const TYPE_NAME: &'static str = "LoggableEvent";
}
