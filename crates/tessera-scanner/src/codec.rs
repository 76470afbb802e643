//! Tokio codec for the scanner-bridge wire format.
//!
//! The bridge speaks newline-delimited JSON. Inbound messages are objects
//! carrying at minimum one recognized identifier field; everything else on
//! the wire (heartbeats, status blobs from other consumers) is surfaced as
//! an unrecognized [`BridgeMessage`] and skipped by the client.
//!
//! # Wire examples
//!
//! ```text
//! {"tagId":"04AB12CD"}
//! {"tag_id":"TAG-04ab12cd","rssi":-41}
//! {"type":"heartbeat","uptime":12049}        <- ignored, no identifier
//! ```

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::client::BridgeError;

/// Maximum accepted line length in bytes.
///
/// Bridge messages are tiny; anything larger is a misbehaving peer and is
/// rejected before it can grow the buffer unbounded.
const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Identifier fields recognized in inbound bridge messages, in priority
/// order. Different bridge firmware revisions used different names; the
/// first present string-valued field wins.
const IDENTIFIER_FIELDS: [&str; 4] = ["tagId", "tag_id", "uid", "id"];

/// One decoded line from the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeMessage {
    /// The raw identifier, when the message carried a recognized field.
    /// `None` means the line parsed as JSON but is not a scan.
    pub tag_id: Option<String>,
}

impl BridgeMessage {
    /// Returns `true` if this message carries a scan identifier.
    #[must_use]
    pub fn is_scan(&self) -> bool {
        self.tag_id.is_some()
    }

    fn from_value(value: &Value) -> Self {
        let tag_id = IDENTIFIER_FIELDS
            .iter()
            .find_map(|field| value.get(field).and_then(Value::as_str))
            .map(str::to_string);

        Self { tag_id }
    }
}

/// Outbound commands to the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum BridgeCommand {
    /// Ask the bridge to start forwarding scans to this connection.
    Subscribe,
    /// Ask the bridge to stop forwarding scans.
    Unsubscribe,
}

/// Newline-delimited JSON codec for the bridge channel.
#[derive(Debug, Default)]
pub struct BridgeCodec;

impl BridgeCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for BridgeCodec {
    type Item = BridgeMessage;
    type Error = BridgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(newline) = src.iter().position(|&b| b == b'\n') else {
            if src.len() > MAX_LINE_LENGTH {
                return Err(BridgeError::Codec(format!(
                    "line exceeds {MAX_LINE_LENGTH} bytes without terminator"
                )));
            }
            return Ok(None);
        };

        let line = src.split_to(newline + 1);
        let line = &line[..newline];
        // Tolerate CRLF bridges
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        if line.is_empty() {
            // Blank keepalive line
            return Ok(Some(BridgeMessage { tag_id: None }));
        }

        let text = std::str::from_utf8(line)
            .map_err(|e| BridgeError::Codec(format!("invalid UTF-8 from bridge: {e}")))?;

        match serde_json::from_str::<Value>(text) {
            Ok(value) => Ok(Some(BridgeMessage::from_value(&value))),
            Err(e) => {
                // A malformed line is logged and skipped rather than killing
                // the channel; the bridge interleaves debug output on some
                // firmware versions.
                debug!(line = text, error = %e, "Ignoring non-JSON line from bridge");
                Ok(Some(BridgeMessage { tag_id: None }))
            }
        }
    }
}

impl Encoder<BridgeCommand> for BridgeCodec {
    type Error = BridgeError;

    fn encode(&mut self, command: BridgeCommand, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_string(&command)
            .map_err(|e| BridgeError::Codec(format!("failed to encode command: {e}")))?;

        dst.reserve(json.len() + 1);
        dst.put_slice(json.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
