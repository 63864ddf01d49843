//! obs-websocket v5 client.
//!
//! Requests are synchronous: each call sends one request and reads frames until
//! the matching response arrives. `RecordStateChanged` events seen while reading
//! are stamped on the session clock as they are received. After a record
//! request the client keeps reading until the corresponding state event shows
//! up, so the stamp lands close to the actual transition.

use super::{RecordState, RecordStateEvent, ScreenRecorder};
use crate::config::ObsConfig;
use crate::error::RecorderError;
use crate::session::clock::Clock;
use base64::engine::general_purpose::STANDARD as Base64Engine;
use base64::Engine;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::net::TcpStream;
use std::path::Path;
use std::time::{Duration, Instant};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

const OP_HELLO: i64 = 0;
const OP_IDENTIFY: i64 = 1;
const OP_IDENTIFIED: i64 = 2;
const OP_EVENT: i64 = 5;
const OP_REQUEST: i64 = 6;
const OP_REQUEST_RESPONSE: i64 = 7;

const RPC_VERSION: i64 = 1;
/// Outputs category; carries `RecordStateChanged`.
const EVENT_SUBSCRIPTIONS: i64 = 64;

/// How long `stop_recording` waits for the recorder to report it has stopped.
const STOP_CONFIRM_TIMEOUT: Duration = Duration::from_secs(3);

/// Compute the `authentication` string for an Identify message.
pub fn build_auth(password: &str, salt: &str, challenge: &str) -> String {
    let mut sha = Sha256::new();
    sha.update(format!("{password}{salt}").as_bytes());
    let secret = Base64Engine.encode(sha.finalize_reset());
    sha.update(format!("{secret}{challenge}").as_bytes());
    Base64Engine.encode(sha.finalize())
}

pub struct ObsClient {
    config: ObsConfig,
    socket: Option<Socket>,
    request_counter: u64,
    clock: Clock,
    original_profile: Option<String>,
    original_record_directory: Option<String>,
    events: Vec<RecordStateEvent>,
}

impl ObsClient {
    pub fn new(config: ObsConfig) -> Self {
        Self {
            config,
            socket: None,
            request_counter: 0,
            clock: Clock::new(),
            original_profile: None,
            original_record_directory: None,
            events: Vec::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Open the websocket and complete the Hello/Identify handshake.
    pub fn connect(&mut self) -> Result<(), RecorderError> {
        if self.socket.is_some() {
            return Ok(());
        }

        let url = Url::parse(&self.config.url()).map_err(|e| RecorderError::Connect(e.to_string()))?;
        tracing::info!(url = %url, "Connecting to OBS");
        let (mut socket, _) =
            tungstenite::connect(url.as_str()).map_err(|e| RecorderError::Connect(e.to_string()))?;

        if let MaybeTlsStream::Plain(stream) = socket.get_mut() {
            stream
                .set_read_timeout(Some(self.config.request_timeout))
                .map_err(|e| RecorderError::Connect(e.to_string()))?;
        }

        let password = self.config.resolved_password();
        let deadline = Instant::now() + self.config.request_timeout;
        loop {
            let message = read_json(&mut socket, "Hello")?;
            match op_of(&message) {
                OP_HELLO => {
                    let auth = identify_auth(&message, password.as_deref())?;
                    send_identify(&mut socket, auth.as_deref())?;
                }
                OP_IDENTIFIED => break,
                _ => {}
            }
            if Instant::now() > deadline {
                return Err(RecorderError::Timeout("Identified".into()));
            }
        }

        tracing::info!("Identified with OBS");
        self.socket = Some(socket);
        Ok(())
    }

    /// Send a request and wait for its response data.
    pub fn request(&mut self, request_type: &str, request_data: Value) -> Result<Value, RecorderError> {
        self.request_counter += 1;
        let request_id = format!("activity-recorder-{}", self.request_counter);
        let payload = json!({
            "op": OP_REQUEST,
            "d": {
                "requestType": request_type,
                "requestId": request_id,
                "requestData": request_data,
            }
        });

        let socket = self.socket.as_mut().ok_or(RecorderError::NotConnected)?;
        tracing::debug!(request_type, "OBS request");
        socket
            .send(Message::Text(payload.to_string()))
            .map_err(|e| RecorderError::Protocol(e.to_string()))?;

        let deadline = Instant::now() + self.config.request_timeout;
        loop {
            let message = self.next_message(request_type)?;
            if op_of(&message) == OP_REQUEST_RESPONSE {
                let data = &message["d"];
                if data["requestId"].as_str() == Some(request_id.as_str()) {
                    return response_data(request_type, data);
                }
            }
            if Instant::now() > deadline {
                return Err(RecorderError::Timeout(request_type.to_string()));
            }
        }
    }

    /// Keep reading until the recorder reports `target`.
    fn await_state(&mut self, target: RecordState, timeout: Duration) -> Result<(), RecorderError> {
        let deadline = Instant::now() + timeout;
        while self.last_state() != Some(target) {
            if Instant::now() > deadline {
                return Err(RecorderError::Timeout(format!("{target:?} state")));
            }
            self.next_message("RecordStateChanged")?;
        }
        Ok(())
    }

    fn last_state(&self) -> Option<RecordState> {
        self.events.last().map(|e| e.state)
    }

    /// Read one frame, recording any state event it carries.
    fn next_message(&mut self, waiting_for: &str) -> Result<Value, RecorderError> {
        let socket = self.socket.as_mut().ok_or(RecorderError::NotConnected)?;
        let message = read_json(socket, waiting_for)?;
        if op_of(&message) == OP_EVENT {
            self.handle_event(&message["d"]);
        }
        Ok(message)
    }

    fn handle_event(&mut self, data: &Value) {
        if data["eventType"].as_str() != Some("RecordStateChanged") {
            return;
        }
        let output_state = data["eventData"]["outputState"].as_str().unwrap_or("unknown");
        let state = RecordState::from_output_state(output_state);
        tracing::info!(?state, "OBS record state changed");
        self.events.push(RecordStateEvent::now(state, &self.clock));
    }

    /// Record a state change triggered by a request, then wait for confirmation.
    fn record_request(
        &mut self,
        request_type: &str,
        confirm: RecordState,
        timeout: Duration,
    ) -> Result<(), RecorderError> {
        self.request(request_type, json!({}))?;
        if let Err(e) = self.await_state(confirm, timeout) {
            tracing::warn!("OBS did not confirm {request_type}: {e}");
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None);
            let _ = socket.flush();
        }
    }
}

impl ScreenRecorder for ObsClient {
    fn name(&self) -> &'static str {
        "obs"
    }

    fn start_recording(&mut self, output_dir: &Path, clock: Clock) -> Result<(), RecorderError> {
        self.clock = clock;
        self.events.clear();
        self.connect()?;

        let profiles = self.request("GetProfileList", json!({}))?;
        self.original_profile = profiles["currentProfileName"].as_str().map(String::from);

        if let Some(profile) = self.config.profile.clone() {
            if self.original_profile.as_deref() != Some(profile.as_str()) {
                tracing::info!(%profile, "Switching OBS profile");
                self.request("SetCurrentProfile", json!({ "profileName": profile }))?;
            }
        }

        let current = self.request("GetRecordDirectory", json!({}))?;
        self.original_record_directory = current["recordDirectory"].as_str().map(String::from);
        self.request(
            "SetRecordDirectory",
            json!({ "recordDirectory": output_dir.to_string_lossy() }),
        )?;

        let timeout = self.config.request_timeout;
        self.record_request("StartRecord", RecordState::Started, timeout)
    }

    fn pause_recording(&mut self) -> Result<(), RecorderError> {
        let timeout = self.config.request_timeout;
        self.record_request("PauseRecord", RecordState::Paused, timeout)
    }

    fn resume_recording(&mut self) -> Result<(), RecorderError> {
        let timeout = self.config.request_timeout;
        self.record_request("ResumeRecord", RecordState::Resumed, timeout)
    }

    fn stop_recording(&mut self) -> Result<(), RecorderError> {
        self.record_request("StopRecord", RecordState::Stopped, STOP_CONFIRM_TIMEOUT)
    }

    /// Put back the record directory, then the profile, and disconnect.
    ///
    /// The record directory belongs to the active profile, so it is restored
    /// before switching away from it.
    fn restore_profile(&mut self) -> Result<(), RecorderError> {
        let directory = match self.original_record_directory.take() {
            Some(original) if self.socket.is_some() => {
                tracing::info!(directory = %original, "Restoring OBS record directory");
                self.request("SetRecordDirectory", json!({ "recordDirectory": original }))
                    .map(|_| ())
            }
            _ => Ok(()),
        };

        let switched = self.config.profile.is_some()
            && self.config.profile.as_deref() != self.original_profile.as_deref();
        let profile = match self.original_profile.take() {
            Some(original) if switched && self.socket.is_some() => {
                tracing::info!(profile = %original, "Restoring OBS profile");
                self.request("SetCurrentProfile", json!({ "profileName": original }))
                    .map(|_| ())
            }
            _ => Ok(()),
        };

        self.disconnect();
        directory.and(profile)
    }

    fn record_state_events(&self) -> Vec<RecordStateEvent> {
        self.events.clone()
    }
}

impl Drop for ObsClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn op_of(message: &Value) -> i64 {
    message.get("op").and_then(|v| v.as_i64()).unwrap_or(-1)
}

/// Read frames until a JSON text/binary message arrives.
fn read_json(socket: &mut Socket, waiting_for: &str) -> Result<Value, RecorderError> {
    loop {
        let message = socket.read().map_err(|e| match e {
            tungstenite::Error::Io(io)
                if matches!(
                    io.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                RecorderError::Timeout(waiting_for.to_string())
            }
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                RecorderError::Protocol("connection closed".into())
            }
            other => RecorderError::Protocol(other.to_string()),
        })?;

        let text = match message {
            Message::Text(text) => text,
            Message::Binary(bin) => String::from_utf8_lossy(&bin).into_owned(),
            Message::Close(frame) => {
                let reason = frame
                    .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                    .unwrap_or_else(|| "no reason".into());
                // 4009 is AuthenticationFailed
                return Err(if reason.starts_with("4009") {
                    RecorderError::Auth(reason)
                } else {
                    RecorderError::Protocol(format!("closed by server: {reason}"))
                });
            }
            _ => continue,
        };

        return serde_json::from_str(&text).map_err(|e| RecorderError::Protocol(e.to_string()));
    }
}

/// Authentication string for a Hello message, if the server asks for one.
fn identify_auth(hello: &Value, password: Option<&str>) -> Result<Option<String>, RecorderError> {
    let auth = match hello["d"].get("authentication").and_then(|a| a.as_object()) {
        Some(auth) => auth,
        None => return Ok(None),
    };
    let password =
        password.ok_or_else(|| RecorderError::Auth("server requires a password".into()))?;
    let challenge = auth.get("challenge").and_then(|v| v.as_str()).unwrap_or("");
    let salt = auth.get("salt").and_then(|v| v.as_str()).unwrap_or("");
    if challenge.is_empty() || salt.is_empty() {
        return Err(RecorderError::Protocol("malformed authentication challenge".into()));
    }
    Ok(Some(build_auth(password, salt, challenge)))
}

fn send_identify(socket: &mut Socket, auth: Option<&str>) -> Result<(), RecorderError> {
    let mut payload = json!({
        "op": OP_IDENTIFY,
        "d": {
            "rpcVersion": RPC_VERSION,
            "eventSubscriptions": EVENT_SUBSCRIPTIONS,
        }
    });
    if let Some(auth) = auth {
        payload["d"]["authentication"] = Value::String(auth.to_string());
    }
    socket
        .send(Message::Text(payload.to_string()))
        .map_err(|e| RecorderError::Protocol(e.to_string()))
}

fn response_data(request_type: &str, data: &Value) -> Result<Value, RecorderError> {
    let status = &data["requestStatus"];
    if status["result"].as_bool() == Some(true) {
        return Ok(data.get("responseData").cloned().unwrap_or(json!({})));
    }
    let code = status["code"].as_i64().unwrap_or(0);
    let comment = status["comment"].as_str().unwrap_or("no comment");
    Err(RecorderError::Request {
        request: request_type.to_string(),
        reason: format!("{code}: {comment}"),
    })
}
