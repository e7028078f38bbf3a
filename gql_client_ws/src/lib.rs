#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod client_message;
mod server_message;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt as _, Stream, StreamExt as _};
use gql_client::{
    ExecutionResult, ExecutionResultStream, Request, SubscriptionTransport, Transport,
    TransportError,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

pub use self::client_message::{ClientMessage, StartPayload};
pub use self::server_message::ServerMessage;

use self::server_message::error_entries;

/// The WebSocket subprotocol the transport speaks.
pub const GRAPHQL_WS_PROTOCOL: &str = "graphql-ws";

const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Listener = mpsc::UnboundedSender<Result<ExecutionResult, TransportError>>;

/// Lifecycle of the transport connection.
///
/// Transitions are monotonic, except that any state may move to `Closed`.
/// A transport serves exactly one connection; once `Closed` it cannot be
/// reconnected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    /// No connection attempt has been made.
    Disconnected,
    /// The WebSocket handshake is in progress.
    Connecting,
    /// `connection_init` was sent; waiting for `connection_ack`.
    WaitingAck,
    /// The connection is established and accepting operations.
    Ready,
    /// `connection_terminate` is being delivered.
    Closing,
    /// The connection is gone.
    Closed,
}

/// Intents posted by callers to the connection actor.
///
/// The actor owns both the socket's write half and the subscription
/// registry, so routing every mutation through this channel serializes
/// writes and guarantees an operation is registered before its `start`
/// frame is flushed.
enum Command {
    Start {
        id: String,
        payload: StartPayload,
        listener: Listener,
    },
    Stop {
        id: String,
    },
    Terminate,
}

struct Shared {
    state: Mutex<ConnectionState>,
    next_id: AtomicU64,
    commands: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    actor: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn commands(&self) -> Option<mpsc::UnboundedSender<Command>> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Builds a [`WsTransport`] with non-default settings.
pub struct WsTransportBuilder {
    url: Url,
    init_payload: Option<serde_json::Value>,
    ack_timeout: Duration,
}

impl WsTransportBuilder {
    /// The payload attached to the `connection_init` frame, typically used
    /// for authentication.
    #[must_use]
    pub fn init_payload(mut self, payload: serde_json::Value) -> Self {
        self.init_payload = Some(payload);
        self
    }

    /// How long `connect` waits for the server's `connection_ack`.
    #[must_use]
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Finishes the builder.
    pub fn build(self) -> WsTransport {
        WsTransport {
            url: self.url,
            init_payload: self.init_payload,
            ack_timeout: self.ack_timeout,
            shared: Arc::new(Shared {
                state: Mutex::new(ConnectionState::Disconnected),
                next_id: AtomicU64::new(1),
                commands: Mutex::new(None),
                actor: Mutex::new(None),
            }),
        }
    }
}

/// WebSocket transport implementing the legacy `graphql-ws` subprotocol.
///
/// One connection multiplexes any number of concurrent operations. A
/// background task reads frames and fans them out to per-operation
/// channels; callers post `start`/`stop` intents to it over a command
/// channel, which serializes all socket writes.
pub struct WsTransport {
    url: Url,
    init_payload: Option<serde_json::Value>,
    ack_timeout: Duration,
    shared: Arc<Shared>,
}

impl WsTransport {
    /// A transport for `url` with default settings.
    pub fn new(url: Url) -> Self {
        Self::builder(url).build()
    }

    /// Starts building a transport for `url`.
    pub fn builder(url: Url) -> WsTransportBuilder {
        WsTransportBuilder {
            url,
            init_payload: None,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }

    /// The endpoint this transport connects to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    async fn handshake(&self) -> Result<WsStream, TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(TransportError::network)?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(GRAPHQL_WS_PROTOCOL),
        );

        let (mut socket, _response) = connect_async(request)
            .await
            .map_err(TransportError::network)?;

        let init = encode(&ClientMessage::ConnectionInit {
            payload: self.init_payload.clone(),
        })?;
        socket.send(init).await.map_err(TransportError::network)?;
        self.shared.set_state(ConnectionState::WaitingAck);

        match tokio::time::timeout(self.ack_timeout, wait_for_ack(&mut socket)).await {
            Ok(Ok(())) => Ok(socket),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(TransportError::Protocol(format!(
                "no connection_ack within {:?}",
                self.ack_timeout,
            ))),
        }
    }

    /// Registers an operation with the connection actor and returns the
    /// stream its frames are delivered on.
    fn start_operation(&self, request: Request<'_>) -> Result<SubscriptionStream, TransportError> {
        if self.shared.state() != ConnectionState::Ready {
            return Err(TransportError::Closed);
        }
        let commands = self.shared.commands().ok_or(TransportError::Closed)?;

        let id = self
            .shared
            .next_id
            .fetch_add(1, Ordering::Relaxed)
            .to_string();
        let payload = StartPayload {
            query: request.query(),
            variables: request.variables.cloned().unwrap_or_default(),
            operation_name: request.operation_name.map(str::to_owned),
        };

        let (listener, events) = mpsc::unbounded_channel();
        commands
            .send(Command::Start {
                id: id.clone(),
                payload,
                listener,
            })
            .map_err(|_| TransportError::Closed)?;

        Ok(SubscriptionStream {
            id,
            events,
            commands,
            finished: false,
        })
    }
}

#[async_trait]
impl Transport for WsTransport {
    /// Unary execution over the subscription machinery: start the
    /// operation, take its first result, then cancel. Frames the server
    /// sends for the id afterwards are discarded.
    async fn execute(&self, request: Request<'_>) -> Result<ExecutionResult, TransportError> {
        let mut stream = self.start_operation(request)?;
        let first = match request.timeout {
            Some(limit) => tokio::time::timeout(limit, stream.next())
                .await
                .map_err(|_| TransportError::Timeout)?,
            None => stream.next().await,
        };
        match first {
            Some(Ok(result)) => Ok(result),
            Some(Err(error)) => Err(error),
            None => Err(TransportError::Closed),
        }
    }

    /// Sends `connection_terminate`, tears the connection down and waits
    /// for the reader task to finish. Outstanding subscribers observe
    /// [`TransportError::Closed`].
    async fn close(&self) -> Result<(), TransportError> {
        let commands = self
            .shared
            .commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(commands) = commands {
            let _ = commands.send(Command::Terminate);
        }

        let actor = self
            .shared
            .actor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(actor) = actor {
            let _ = actor.await;
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionTransport for WsTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        {
            let mut state = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != ConnectionState::Disconnected {
                return Err(TransportError::AlreadyConnected);
            }
            *state = ConnectionState::Connecting;
        }

        match self.handshake().await {
            Ok(socket) => {
                let (command_tx, command_rx) = mpsc::unbounded_channel();
                *self
                    .shared
                    .commands
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(command_tx);
                // Become ready before the actor runs, so its exit can only
                // ever move the state forward to closed.
                self.shared.set_state(ConnectionState::Ready);
                let actor = tokio::spawn(run_connection(
                    socket,
                    command_rx,
                    Arc::clone(&self.shared),
                ));
                *self
                    .shared
                    .actor
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(actor);
                Ok(())
            }
            Err(error) => {
                self.shared.set_state(ConnectionState::Closed);
                Err(error)
            }
        }
    }

    async fn subscribe(
        &self,
        request: Request<'_>,
    ) -> Result<ExecutionResultStream, TransportError> {
        Ok(self.start_operation(request)?.boxed())
    }
}

/// The per-operation stream handed to subscribers.
///
/// Yields results in server order. Ends cleanly after the server's
/// `complete`; a server `error` frame or a connection-level failure is
/// yielded once and ends the stream. Dropping the stream before its
/// terminal event sends a best-effort `stop` for the operation.
pub struct SubscriptionStream {
    id: String,
    events: mpsc::UnboundedReceiver<Result<ExecutionResult, TransportError>>,
    commands: mpsc::UnboundedSender<Command>,
    finished: bool,
}

impl SubscriptionStream {
    /// The operation id assigned by the transport.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Stream for SubscriptionStream {
    type Item = Result<ExecutionResult, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let next = ready!(self.events.poll_recv(cx));
        match &next {
            Some(Err(_)) | None => self.finished = true,
            Some(Ok(_)) => {}
        }
        Poll::Ready(next)
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.commands.send(Command::Stop {
                id: std::mem::take(&mut self.id),
            });
        }
    }
}

async fn wait_for_ack(socket: &mut WsStream) -> Result<(), TransportError> {
    loop {
        match socket.next().await {
            None | Some(Ok(Message::Close(_))) => return Err(TransportError::Closed),
            Some(Err(error)) => return Err(TransportError::network(error)),
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
            Some(Ok(message)) => {
                return match decode(message)? {
                    ServerMessage::ConnectionAck => Ok(()),
                    other => Err(TransportError::Protocol(format!(
                        "expected connection_ack, got: {other:?}",
                    ))),
                };
            }
        }
    }
}

/// The connection actor: owns the socket and the subscription registry,
/// reacting to caller intents and inbound frames until either side ends the
/// connection. Every remaining subscriber is notified with the outcome.
async fn run_connection(
    mut socket: WsStream,
    mut commands: mpsc::UnboundedReceiver<Command>,
    shared: Arc<Shared>,
) {
    let mut registry: HashMap<String, Listener> = HashMap::new();

    let outcome = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Start { id, payload, listener }) => {
                    tracing::debug!(%id, "starting operation");
                    // Register before flushing so a reply can never find an
                    // unknown id.
                    registry.insert(id.clone(), listener);
                    match encode(&ClientMessage::Start { id, payload }) {
                        Ok(frame) => {
                            if let Err(error) = socket.send(frame).await {
                                break TransportError::network(error);
                            }
                        }
                        Err(error) => break error,
                    }
                }
                Some(Command::Stop { id }) => {
                    if registry.remove(&id).is_some() {
                        tracing::debug!(%id, "stopping operation");
                        match encode(&ClientMessage::Stop { id }) {
                            Ok(frame) => {
                                if let Err(error) = socket.send(frame).await {
                                    break TransportError::network(error);
                                }
                            }
                            Err(error) => break error,
                        }
                    }
                }
                Some(Command::Terminate) | None => {
                    shared.set_state(ConnectionState::Closing);
                    if let Ok(frame) = encode(&ClientMessage::ConnectionTerminate) {
                        let _ = socket.send(frame).await;
                    }
                    let _ = socket.close(None).await;
                    break TransportError::Closed;
                }
            },
            frame = socket.next() => match frame {
                None | Some(Ok(Message::Close(_))) => break TransportError::Closed,
                Some(Err(error)) => break TransportError::network(error),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(message)) => {
                    if let Err(fatal) = dispatch(message, &mut registry) {
                        break fatal;
                    }
                }
            },
        }
    };

    tracing::debug!(outcome = %outcome, "connection finished");
    for (_, listener) in registry.drain() {
        let _ = listener.send(Err(outcome.clone()));
    }
    *shared
        .commands
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = None;
    shared.set_state(ConnectionState::Closed);
}

/// Routes one inbound frame. `Err` means the violation is fatal to the
/// whole connection.
fn dispatch(
    message: Message,
    registry: &mut HashMap<String, Listener>,
) -> Result<(), TransportError> {
    match decode(message)? {
        ServerMessage::ConnectionAck => {
            tracing::debug!("ignoring redundant connection_ack");
        }
        ServerMessage::ConnectionKeepAlive => {
            tracing::trace!("keep-alive");
        }
        ServerMessage::ConnectionError { payload } => {
            let detail = payload.unwrap_or(serde_json::Value::Null);
            return Err(TransportError::Protocol(format!(
                "server reported a connection error: {detail}",
            )));
        }
        ServerMessage::Data { id, payload } => {
            if !payload.has_payload() {
                return Err(TransportError::Protocol(format!(
                    "data payload for operation {id} carries neither data nor errors",
                )));
            }
            match registry.get(&id) {
                Some(listener) => {
                    let _ = listener.send(Ok(payload));
                }
                // Stale after a stop; the server may still be flushing.
                None => tracing::debug!(%id, "ignoring data for unknown operation"),
            }
        }
        ServerMessage::Error { id, payload } => {
            let errors = error_entries(payload)?;
            match registry.remove(&id) {
                Some(listener) => {
                    let _ = listener.send(Err(TransportError::Query(errors)));
                }
                None => tracing::debug!(%id, "ignoring error for unknown operation"),
            }
        }
        ServerMessage::Complete { id } => {
            // Dropping the listener ends the subscriber's stream cleanly.
            if registry.remove(&id).is_none() {
                tracing::debug!(%id, "ignoring complete for unknown operation");
            }
        }
    }
    Ok(())
}

fn decode(message: Message) -> Result<ServerMessage, TransportError> {
    match message {
        Message::Text(text) => serde_json::from_str(&text).map_err(|error| {
            TransportError::Protocol(format!("invalid message: {text:?}: {error}"))
        }),
        Message::Binary(_) => Err(TransportError::Protocol("unexpected binary frame".into())),
        other => Err(TransportError::Protocol(format!(
            "unexpected frame: {other:?}",
        ))),
    }
}

fn encode(message: &ClientMessage) -> Result<Message, TransportError> {
    serde_json::to_string(message)
        .map(Message::Text)
        .map_err(|error| TransportError::Protocol(format!("failed to encode message: {error}")))
}
