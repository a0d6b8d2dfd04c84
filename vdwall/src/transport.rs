//! The single TCP link to a processor.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

use crate::address::DeviceAddress;
use crate::command::{self, Command, EncodeError};
use crate::options::ResolvedOptions;

/// Upper bound for a single connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}

/// Receives every state transition of a [`Transport`], in order.
///
/// Called with the transport's internal lock held, so it must not call
/// back into the transport.
pub trait StatusObserver: Send + Sync {
    fn status_changed(&self, state: &ConnectionState);
}

impl<F> StatusObserver for F
where
    F: Fn(&ConnectionState) + Send + Sync,
{
    fn status_changed(&self, state: &ConnectionState) {
        self(state)
    }
}

type SharedStream = Arc<tokio::sync::Mutex<TcpStream>>;

struct Link {
    address: Option<DeviceAddress>,
    state: ConnectionState,
    stream: Option<SharedStream>,
    /// Bumped whenever the current socket is replaced or dropped. Results of
    /// older connection attempts are discarded.
    generation: u64,
}

struct Shared {
    link: Mutex<Link>,
    observer: Option<Box<dyn StatusObserver>>,
    span: tracing::Span,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, link: &mut Link, state: ConnectionState) {
        if link.state == state {
            return;
        }

        debug!(parent: &self.span, from = %link.state, to = %state, "state change");
        link.state = state;
        if let Some(observer) = &self.observer {
            observer.status_changed(&link.state);
        }
    }
}

/// Owns the TCP connection to one device and writes commands to it.
///
/// Clones share the same connection. Writes are fire and forget: nothing
/// is queued and nothing is retried.
#[derive(Clone)]
pub struct Transport {
    shared: Arc<Shared>,
}

impl Transport {
    /// `span` is the parent of everything this transport logs.
    pub fn new(span: tracing::Span) -> Self {
        Self::build(span, None)
    }

    pub fn with_observer(span: tracing::Span, observer: impl StatusObserver + 'static) -> Self {
        Self::build(span, Some(Box::new(observer)))
    }

    fn build(span: tracing::Span, observer: Option<Box<dyn StatusObserver>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                link: Mutex::new(Link {
                    address: None,
                    state: ConnectionState::Disconnected,
                    stream: None,
                    generation: 0,
                }),
                observer,
                span,
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state.clone()
    }

    pub fn address(&self) -> Option<DeviceAddress> {
        self.shared.lock().address.clone()
    }

    /// Drops the current socket, then opens a new one to `address`.
    ///
    /// Nothing is opened when the host is empty. Returns once the attempt
    /// has either connected or failed; failures only show up as
    /// [`ConnectionState::Error`].
    pub async fn connect(&self, address: DeviceAddress) {
        let shared = &self.shared;
        let generation = {
            let mut link = shared.lock();
            link.generation += 1;
            if link.stream.take().is_some() {
                debug!(parent: &shared.span, "closed previous connection");
            }
            link.address = Some(address.clone());

            if !address.is_configured() {
                debug!(parent: &shared.span, "no host configured, not connecting");
                shared.set_state(&mut link, ConnectionState::Disconnected);
                return;
            }

            shared.set_state(&mut link, ConnectionState::Connecting);
            link.generation
        };

        info!(parent: &shared.span, %address, "connecting");
        let result = tokio::time::timeout(
            CONNECT_TIMEOUT,
            TcpStream::connect((address.host(), address.port())),
        )
        .await;

        let mut link = shared.lock();
        if link.generation != generation {
            debug!(parent: &shared.span, %address, "discarding superseded connection attempt");
            return;
        }

        match result {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    trace!(parent: &shared.span, "set_nodelay: {}", e);
                }
                link.stream = Some(Arc::new(tokio::sync::Mutex::new(stream)));
                info!(parent: &shared.span, %address, "connected");
                shared.set_state(&mut link, ConnectionState::Connected);
            }
            Ok(Err(e)) => {
                warn!(parent: &shared.span, %address, "network error: {}", e);
                shared.set_state(&mut link, ConnectionState::Error(e.to_string()));
            }
            Err(_) => {
                warn!(parent: &shared.span, %address, "connect timed out");
                shared.set_state(
                    &mut link,
                    ConnectionState::Error("connect timed out".to_string()),
                );
            }
        }
    }

    /// Connects to `address` unless it is the address already in use.
    ///
    /// An unchanged address is only reconnected when the link is down, i.e.
    /// the last attempt failed or the transport was closed.
    pub async fn reconfigure(&self, address: DeviceAddress) {
        {
            let link = self.shared.lock();
            let link_up = matches!(
                link.state,
                ConnectionState::Connecting | ConnectionState::Connected
            );
            if link.address.as_ref() == Some(&address) && (link_up || !address.is_configured()) {
                trace!(parent: &self.shared.span, %address, "address unchanged");
                return;
            }
        }

        self.connect(address).await
    }

    /// Writes `bytes` to the device. Returns false without touching the
    /// network when not connected, and false when the write fails.
    pub async fn send(&self, bytes: &[u8]) -> bool {
        let shared = &self.shared;
        let (generation, stream) = {
            let link = shared.lock();
            match (&link.state, &link.stream) {
                (ConnectionState::Connected, Some(stream)) => (link.generation, stream.clone()),
                _ => {
                    debug!(parent: &shared.span, "socket not connected");
                    return false;
                }
            }
        };

        trace!(parent: &shared.span, len = bytes.len(), "sending {:02x?}", bytes);
        let result = stream.lock().await.write_all(bytes).await;

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(parent: &shared.span, "write failed: {}", e);
                let mut link = shared.lock();
                if link.generation == generation {
                    link.generation += 1;
                    link.stream = None;
                    shared.set_state(&mut link, ConnectionState::Error(e.to_string()));
                }
                false
            }
        }
    }

    pub async fn send_command(&self, command: &Command) -> bool {
        self.send(command.as_ref()).await
    }

    /// Encodes `action_name` for the configured serial number and sends it.
    ///
    /// Encoding problems are returned; transport problems only make the
    /// result `Ok(false)`.
    pub async fn execute(
        &self,
        action_name: &str,
        options: &ResolvedOptions,
    ) -> Result<bool, EncodeError> {
        let serial_number = self
            .address()
            .map(|a| a.serial_number())
            .unwrap_or_default();
        let command = command::encode(action_name, options, serial_number)?;
        debug!(parent: &self.shared.span, action = action_name, %command, "execute");
        Ok(self.send_command(&command).await)
    }

    /// Closes the socket if there is one. Safe to call repeatedly.
    pub fn close(&self) {
        let shared = &self.shared;
        let mut link = shared.lock();
        link.generation += 1;
        if link.stream.take().is_some() {
            info!(parent: &shared.span, "connection closed");
        }
        shared.set_state(&mut link, ConnectionState::Disconnected);
    }
}
