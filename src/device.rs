// src/device.rs - Headset session: ordered handshake and inbound dispatch
use crate::credentials::Credentials;
use crate::protocol::{CommandEvent, Inbound, RequestId, RpcRequest, WARNING_DISCOVERY_COMPLETE};
use crate::transport::{self, TransportChannels};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    #[default]
    Idle,
    Connecting,
    RequestingAccess,
    QueryingDevices,
    ConnectingDevice,
    Authorizing,
    CreatingSession,
    Subscribing,
    Subscribed,
    DeviceNotFound,
    Failed,
    Closed,
}

impl ConnectionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::RequestingAccess => "requesting access",
            Self::QueryingDevices => "querying headsets",
            Self::ConnectingDevice => "connecting headset",
            Self::Authorizing => "authorizing",
            Self::CreatingSession => "creating session",
            Self::Subscribing => "subscribing",
            Self::Subscribed => "subscribed",
            Self::DeviceNotFound => "no headset found",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    pub phase: ConnectionPhase,
    pub device_id: Option<String>,
    pub auth_token: Option<String>,
    pub session_id: Option<String>,
    pub connected: bool,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no headset found")]
    DeviceNotFound,
    #[error("transport closed")]
    TransportClosed,
    #[error("{method} response is missing `{field}`")]
    MissingField {
        method: &'static str,
        field: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub streams: Vec<String>,
    pub intensity_threshold: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            streams: vec!["com".to_string()],
            intensity_threshold: 0.5,
        }
    }
}

pub type SharedSessionInfo = Arc<Mutex<SessionInfo>>;
type PendingCalls = Arc<Mutex<HashMap<RequestId, oneshot::Sender<Value>>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Routes decoded inbound frames: responses to their pending continuation,
/// command events to the listener.
pub struct Dispatcher {
    pending: PendingCalls,
    listener: mpsc::UnboundedSender<CommandEvent>,
    intensity_threshold: f64,
}

impl Dispatcher {
    pub fn dispatch(&self, text: &str) {
        let Some(message) = Inbound::decode(text) else {
            debug!("Dropping unrecognised frame");
            return;
        };

        match message {
            Inbound::Warning(warning) if warning.code == WARNING_DISCOVERY_COMPLETE => {
                info!("Headset discovery complete (warning {})", warning.code);
            }
            Inbound::Warning(warning) => {
                warn!("Headset service warning {}: {}", warning.code, warning.message);
            }
            Inbound::Error { id, error } => {
                error!(
                    "Headset service error (id {:?}) {}: {} {}",
                    id, error.code, error.message, error.data
                );
            }
            Inbound::Response { id, result } => {
                let handler = RequestId::from_u64(id).and_then(|r| lock(&self.pending).remove(&r));
                match handler {
                    Some(tx) => {
                        let _ = tx.send(result);
                    }
                    None => debug!("No pending call for id {}, dropping response", id),
                }
            }
            Inbound::Command(event) => {
                if event.intensity > self.intensity_threshold {
                    debug!("Command {} ({:.2})", event.name, event.intensity);
                    let _ = self.listener.send(event);
                }
            }
        }
    }

    async fn pump(self, mut inbound: mpsc::UnboundedReceiver<String>) {
        while let Some(text) = inbound.recv().await {
            self.dispatch(&text);
        }
        // Dropping the senders wakes any call still awaiting a response.
        lock(&self.pending).clear();
    }
}

pub struct DeviceSession {
    credentials: Credentials,
    config: SessionConfig,
    outbound: mpsc::UnboundedSender<String>,
    pending: PendingCalls,
    info: SharedSessionInfo,
    listener: mpsc::UnboundedSender<CommandEvent>,
}

impl DeviceSession {
    pub fn new(
        credentials: Credentials,
        config: SessionConfig,
        outbound: mpsc::UnboundedSender<String>,
        listener: mpsc::UnboundedSender<CommandEvent>,
    ) -> Self {
        Self {
            credentials,
            config,
            outbound,
            pending: Arc::new(Mutex::new(HashMap::new())),
            info: Arc::new(Mutex::new(SessionInfo::default())),
            listener,
        }
    }

    pub fn with_info(mut self, info: SharedSessionInfo) -> Self {
        self.info = info;
        self
    }

    pub fn info(&self) -> SharedSessionInfo {
        self.info.clone()
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            pending: self.pending.clone(),
            listener: self.listener.clone(),
            intensity_threshold: self.config.intensity_threshold,
        }
    }

    /// Drive the handshake and inbound dispatch until the transport closes.
    /// Failures end up in the log and in `SessionInfo`, never in the caller.
    pub async fn run(self, inbound: mpsc::UnboundedReceiver<String>) -> SessionInfo {
        let pump = self.dispatcher().pump(inbound);
        tokio::pin!(pump);

        tokio::select! {
            result = self.handshake() => {
                match result {
                    Ok(()) => info!("Headset session ready"),
                    Err(SessionError::DeviceNotFound) => warn!("No headset found; not retrying"),
                    Err(e) => {
                        error!("Headset handshake failed: {}", e);
                        self.set_phase(ConnectionPhase::Failed);
                    }
                }
                (&mut pump).await;
            }
            _ = &mut pump => {
                warn!("Transport closed during handshake");
            }
        }

        let mut info = lock(&self.info);
        // Terminal handshake outcomes survive the transport closing.
        if !matches!(info.phase, ConnectionPhase::DeviceNotFound | ConnectionPhase::Failed) {
            info.phase = ConnectionPhase::Closed;
        }
        info.connected = false;
        info.clone()
    }

    async fn handshake(&self) -> Result<(), SessionError> {
        let credentials = json!({
            "clientId": self.credentials.client_id,
            "clientSecret": self.credentials.client_secret,
        });

        self.set_phase(ConnectionPhase::RequestingAccess);
        let access = self.call(RequestId::Access, credentials.clone()).await?;
        debug!("Access response: {}", access);

        self.set_phase(ConnectionPhase::QueryingDevices);
        let devices = self.call(RequestId::QueryHeadsets, json!({})).await?;
        let device_id = devices
            .as_array()
            .and_then(|list| list.first())
            .and_then(|d| d.get("id"))
            .and_then(Value::as_str)
            .map(str::to_owned);
        let Some(device_id) = device_id else {
            let mut info = lock(&self.info);
            info.connected = false;
            info.phase = ConnectionPhase::DeviceNotFound;
            return Err(SessionError::DeviceNotFound);
        };
        {
            let mut info = lock(&self.info);
            info.device_id = Some(device_id.clone());
            info.connected = true;
        }
        info!("Found headset {}", device_id);

        self.set_phase(ConnectionPhase::ConnectingDevice);
        self.call(
            RequestId::ControlDevice,
            json!({ "command": "connect", "headset": device_id }),
        )
        .await?;

        self.set_phase(ConnectionPhase::Authorizing);
        let auth = self.call(RequestId::Authorize, credentials).await?;
        let token = string_field(&auth, RequestId::Authorize, "cortexToken")?;
        lock(&self.info).auth_token = Some(token.clone());

        self.set_phase(ConnectionPhase::CreatingSession);
        let session = self
            .call(
                RequestId::CreateSession,
                json!({ "cortexToken": token, "headset": device_id, "status": "active" }),
            )
            .await?;
        let session_id = string_field(&session, RequestId::CreateSession, "id")?;
        lock(&self.info).session_id = Some(session_id.clone());

        self.set_phase(ConnectionPhase::Subscribing);
        self.call(
            RequestId::Subscribe,
            json!({ "cortexToken": token, "session": session_id, "streams": self.config.streams }),
        )
        .await?;

        self.set_phase(ConnectionPhase::Subscribed);
        Ok(())
    }

    /// Register the one-shot continuation for `id`, send, and wait for the
    /// matching response. No timeout: an unanswered call stays pending.
    async fn call(&self, id: RequestId, params: Value) -> Result<Value, SessionError> {
        let (tx, rx) = oneshot::channel();
        if lock(&self.pending).insert(id, tx).is_some() {
            warn!("Replaced pending call for {}", id.method());
        }

        debug!("--> {} (id {})", id.method(), id.as_u64());
        self.outbound
            .send(RpcRequest::new(id, params).to_text())
            .map_err(|_| SessionError::TransportClosed)?;

        rx.await.map_err(|_| SessionError::TransportClosed)
    }

    fn set_phase(&self, phase: ConnectionPhase) {
        debug!("Session phase: {}", phase.as_str());
        lock(&self.info).phase = phase;
    }
}

fn string_field(value: &Value, id: RequestId, field: &'static str) -> Result<String, SessionError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(SessionError::MissingField {
            method: id.method(),
            field,
        })
}

/// Open the WebSocket and run a session over it.
pub async fn connect_and_run(
    url: &str,
    credentials: Credentials,
    config: SessionConfig,
    listener: mpsc::UnboundedSender<CommandEvent>,
    info: SharedSessionInfo,
) -> SessionInfo {
    lock(&info).phase = ConnectionPhase::Connecting;
    let TransportChannels { outbound, inbound } = match transport::connect_websocket(url).await {
        Ok(channels) => channels,
        Err(e) => {
            error!("Could not reach headset service at {}: {}", url, e);
            let mut guard = lock(&info);
            guard.phase = ConnectionPhase::Failed;
            return guard.clone();
        }
    };

    DeviceSession::new(credentials, config, outbound, listener)
        .with_info(info)
        .run(inbound)
        .await
}
