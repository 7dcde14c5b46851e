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

//! Conversion between MQTT payloads and message envelopes.

use log::debug;

use logbus_listener::{InboundMessage, LoggableEvent, ProviderError};

/// Decode an MQTT payload into an envelope.
///
/// Payloads that are not a JSON envelope are passed on as raw
/// [`MessageKind::Bytes`](logbus_listener::MessageKind::Bytes) messages.
pub fn payload_to_message(payload: &[u8], topic: &str) -> InboundMessage {
    match InboundMessage::from_json(payload) {
        Ok(message) => message,
        Err(e) => {
            debug!("Payload on topic '{topic}' is not an envelope: {e}");
            InboundMessage::bytes(payload).with_message_type(topic)
        }
    }
}

/// Encode `event` as an object envelope payload.
pub fn event_to_payload(event: &LoggableEvent) -> Result<Vec<u8>, ProviderError> {
    Ok(InboundMessage::object(event)?.to_json()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use logbus_listener::{Level, MessageKind};

    #[test]
    fn test_event_payload_decodes_to_object_envelope() {
        let event = LoggableEvent::new("disk full")
            .with_level(Level::Error)
            .with_logger("app.storage");
        let payload = event_to_payload(&event).unwrap();

        let message = payload_to_message(&payload, "logs/app");
        assert_eq!(message.kind(), MessageKind::Object);
        let decoded = message
            .object_body()
            .unwrap()
            .into_typed::<LoggableEvent>()
            .unwrap();
        assert_eq!(decoded, Some(event));
    }

    #[test]
    fn test_non_envelope_payload_becomes_bytes() {
        let message = payload_to_message(b"temperature=21", "sensors/kitchen");

        assert_eq!(message.kind(), MessageKind::Bytes);
        assert_eq!(message.message_type(), Some("sensors/kitchen"));
    }

    #[test]
    fn test_text_envelope_kept() {
        let message = payload_to_message(br#"{"kind":"text","type":"note","body":"hi"}"#, "logs");

        assert_eq!(message.kind(), MessageKind::Text);
        assert_eq!(message.message_type(), Some("note"));
    }
}
