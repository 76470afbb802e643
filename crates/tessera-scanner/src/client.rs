//! TCP client for the scanner bridge.
//!
//! The client is a thin transport layer in the same spirit as the rest of
//! the workspace: no automatic retry, no reconnection, no scan buffering.
//! The session layer decides what to do when the channel fails, and it is
//! also the layer that owns the scan timeout: [`BridgeClient::next_scan`]
//! waits indefinitely so that the session's deadline is the only clock.
//!
//! # Connection lifecycle
//!
//! 1. Create the client with [`BridgeClient::new`]
//! 2. [`connect`](BridgeClient::connect) opens the socket and subscribes
//! 3. [`next_scan`](BridgeClient::next_scan) yields raw identifiers
//! 4. [`close`](BridgeClient::close) is idempotent teardown

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};

use crate::codec::{BridgeCodec, BridgeCommand};

/// Configuration for the bridge client.
///
/// The bridge always runs on the same host as the scanning station, so the
/// default address is loopback on the bridge's fixed port.
#[derive(Debug, Clone)]
pub struct BridgeClientConfig {
    /// Address of the local scanner bridge.
    pub bridge_addr: SocketAddr,

    /// Timeout for connect and command writes. Scan waits are not bounded
    /// here; the session arms its own deadline.
    pub io_timeout: Duration,
}

impl Default for BridgeClientConfig {
    fn default() -> Self {
        Self {
            bridge_addr: SocketAddr::from(([127, 0, 0, 1], 7070)),
            io_timeout: Duration::from_millis(3000),
        }
    }
}

/// Errors from the bridge channel.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Client is not connected to the bridge
    #[error("Not connected to scanner bridge")]
    NotConnected,

    /// Connection attempt timed out
    #[error("Bridge connection timeout after {0}ms")]
    ConnectionTimeout(u64),

    /// Command write timed out
    #[error("Bridge write timeout after {0}ms")]
    WriteTimeout(u64),

    /// Channel closed while a scan was in flight
    #[error("Bridge connection lost: {0}")]
    ConnectionLost(String),

    /// Wire-format error
    #[error("Bridge codec error: {0}")]
    Codec(String),

    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// TCP client for the scanner bridge.
///
/// Each scanning station owns one client on a single task; the client is
/// never shared. Starting a new scan attempt while another client instance is
/// connected must close the old one first, which the session layer enforces.
pub struct BridgeClient {
    bridge_addr: SocketAddr,
    /// Framed stream (None if not connected)
    framed: Option<Framed<TcpStream, BridgeCodec>>,
    io_timeout: Duration,
}

impl BridgeClient {
    /// Create a new client. No connection is made until [`connect`].
    ///
    /// [`connect`]: BridgeClient::connect
    pub fn new(config: BridgeClientConfig) -> Self {
        debug!("Creating bridge client for {}", config.bridge_addr);

        Self {
            bridge_addr: config.bridge_addr,
            framed: None,
            io_timeout: config.io_timeout,
        }
    }

    /// Connect to the bridge and subscribe to scan events.
    ///
    /// Opening the channel is what makes the station visibly "scanning": the
    /// bridge lights the reader once a subscriber is attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection times out, is refused, or the
    /// subscribe command cannot be written.
    pub async fn connect(&mut self) -> Result<(), BridgeError> {
        info!("Connecting to scanner bridge at {}", self.bridge_addr);

        let stream =
            match tokio::time::timeout(self.io_timeout, TcpStream::connect(self.bridge_addr)).await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    warn!("Bridge connection failed: {}", e);
                    return Err(e.into());
                }
                Err(_) => {
                    warn!(
                        "Bridge connection timeout after {}ms",
                        self.io_timeout.as_millis()
                    );
                    return Err(BridgeError::ConnectionTimeout(
                        self.io_timeout.as_millis() as u64
                    ));
                }
            };

        // Scans are single small packets and the user is standing at the
        // reader; never let Nagle batch them.
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY on bridge socket: {}", e);
        }

        let mut framed = Framed::new(stream, BridgeCodec::new());
        match tokio::time::timeout(self.io_timeout, framed.send(BridgeCommand::Subscribe)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(BridgeError::WriteTimeout(self.io_timeout.as_millis() as u64));
            }
        }

        self.framed = Some(framed);
        debug!("Bridge client connected and subscribed");
        Ok(())
    }

    /// Wait for the next scanned identifier.
    ///
    /// Messages without a recognized identifier field are skipped silently
    /// (at debug level). This call does not time out on its own; wrap it in
    /// the session's scan deadline.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` if called before [`connect`], or
    /// `ConnectionLost` if the bridge closes the channel mid-scan.
    ///
    /// [`connect`]: BridgeClient::connect
    pub async fn next_scan(&mut self) -> Result<String, BridgeError> {
        let framed = self.framed.as_mut().ok_or(BridgeError::NotConnected)?;

        loop {
            match framed.next().await {
                Some(Ok(message)) => match message.tag_id {
                    Some(tag_id) => {
                        trace!(tag_id = %tag_id, "Scan received from bridge");
                        return Ok(tag_id);
                    }
                    None => {
                        trace!("Skipping bridge message without identifier");
                    }
                },
                Some(Err(e)) => return Err(e),
                None => {
                    warn!("Scanner bridge closed the connection");
                    self.framed = None;
                    return Err(BridgeError::ConnectionLost(
                        "bridge closed connection".to_string(),
                    ));
                }
            }
        }
    }

    /// Check if the client holds an open channel.
    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Close the channel. Idempotent; safe to call while never connected.
    ///
    /// An unsubscribe is attempted best-effort so the bridge can turn the
    /// reader light off, but failures during teardown are only logged.
    pub async fn close(&mut self) {
        if let Some(mut framed) = self.framed.take() {
            info!("Closing bridge connection to {}", self.bridge_addr);

            let teardown_timeout = Duration::from_millis(500);
            match tokio::time::timeout(teardown_timeout, framed.send(BridgeCommand::Unsubscribe))
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Error sending unsubscribe during close: {}", e),
                Err(_) => warn!("Unsubscribe timeout during close"),
            }

            let mut stream = framed.into_inner();
            match tokio::time::timeout(teardown_timeout, stream.shutdown()).await {
                Ok(Ok(())) => debug!("Bridge socket shut down"),
                Ok(Err(e)) => warn!("Error during bridge socket shutdown: {}", e),
                Err(_) => warn!("Shutdown timeout during close"),
            }
        }
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        if self.framed.is_some() {
            debug!("BridgeClient dropped while connected - socket will be closed");
        }
    }
}
