//! Chat session state machine.
//!
//! [`ChatSession`] holds everything the UI reads (connection state and the
//! message log) and reacts to transport events. It performs no I/O: the
//! transport task in [`ConnectionManager`](crate::ConnectionManager) feeds
//! it and forwards the frames it returns.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use hiroba_shared::{
    protocol::{
        ACK_EVENT, AckId, AckPayload, CHAT_EVENT, ChatMessage, EXCEPTION_EVENT,
        ExceptionEnvelope, Frame,
    },
    time::Clock,
    validation::validate_broadcast,
};

use crate::{
    config::ClientConfig,
    state::{BOT_NICKNAME, ConnectionState, ERROR_NICKNAME, LogEntry, SYSTEM_NICKNAME},
};

const CONNECTING_TEXT: &str = "Connecting to chat...";
const CONNECTED_TEXT: &str = "Connected! How may I help you?";
const UNKNOWN_EXCEPTION_TEXT: &str = "An unknown server error occurred.";
const ACK_TIMEOUT_REASON: &str = "acknowledgment timed out";

/// Change notification produced by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    MessageAppended(LogEntry),
}

/// Connection state, message log and pending acknowledgments of one client
pub struct ChatSession {
    nickname: String,
    clock: Arc<dyn Clock>,
    state: ConnectionState,
    log: VecDeque<LogEntry>,
    log_capacity: Option<usize>,
    ever_connected: bool,
    next_ack_id: AckId,
    /// ack id → time the message was sent
    pending_acks: HashMap<AckId, i64>,
    ack_timeout_millis: i64,
    events: Vec<SessionEvent>,
}

impl ChatSession {
    pub fn new(config: &ClientConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_millis();
        let mut session = Self {
            nickname: config.nickname.clone(),
            clock,
            state: ConnectionState::Connecting,
            log: VecDeque::new(),
            log_capacity: config.log_capacity,
            ever_connected: false,
            next_ack_id: 1,
            pending_acks: HashMap::new(),
            ack_timeout_millis: i64::try_from(config.ack_timeout.as_millis()).unwrap_or(i64::MAX),
            events: Vec::new(),
        };
        session.append(LogEntry::new(CONNECTING_TEXT, SYSTEM_NICKNAME, now));
        // the seed entry is part of the initial snapshot, not a change
        session.events.clear();
        session
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Snapshot of the message log, oldest first
    pub fn messages(&self) -> Vec<LogEntry> {
        self.log.iter().cloned().collect()
    }

    /// Number of sent messages still waiting for an acknowledgment
    pub fn pending_ack_count(&self) -> usize {
        self.pending_acks.len()
    }

    /// Drain the change notifications accumulated since the last call
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// A connection attempt is starting
    pub fn on_connecting(&mut self) {
        self.set_state(ConnectionState::Connecting);
    }

    pub fn on_connected(&mut self) {
        self.ever_connected = true;
        self.set_state(ConnectionState::Connected);
        self.remove_connecting_entry();
        let now = self.clock.now_millis();
        self.append(LogEntry::new(CONNECTED_TEXT, BOT_NICKNAME, now));
    }

    /// An established connection was lost
    pub fn on_disconnected(&mut self, reason: &str) {
        if !self.state.is_connected() {
            tracing::debug!("Ignoring disconnect while {}: {}", self.state, reason);
            return;
        }

        self.set_state(ConnectionState::Disconnected(reason.to_string()));
        let now = self.clock.now_millis();
        self.append(LogEntry::new(
            format!("Disconnected: {}. Reconnecting...", reason),
            ERROR_NICKNAME,
            now,
        ));
    }

    /// A connection attempt failed
    pub fn on_connect_error(&mut self, reason: &str) {
        if self.ever_connected {
            // reconnect loop after a lost connection; the disconnect is already logged
            self.set_state(ConnectionState::Disconnected(reason.to_string()));
            return;
        }

        self.set_state(ConnectionState::Errored(reason.to_string()));
        self.remove_connecting_entry();
        let now = self.clock.now_millis();
        self.append(LogEntry::new(
            format!("Connection failed: {}.", reason),
            ERROR_NICKNAME,
            now,
        ));
    }

    /// Handle one text frame received from the server
    pub fn on_frame(&mut self, text: &str) {
        let frame = match Frame::from_json(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Dropping undecodable frame: {}", e);
                return;
            }
        };

        let now = self.clock.now_millis();
        match frame.event.as_str() {
            CHAT_EVENT => match validate_broadcast(&frame.data, now) {
                Some(broadcast) => self.append(LogEntry::new(
                    broadcast.message,
                    broadcast.nickname,
                    broadcast.time,
                )),
                None => tracing::warn!("Dropping malformed chat payload: {}", frame.data),
            },
            EXCEPTION_EVENT => {
                let text = serde_json::from_value::<ExceptionEnvelope>(frame.data)
                    .map(|envelope| envelope.message)
                    .unwrap_or_else(|_| UNKNOWN_EXCEPTION_TEXT.to_string());
                self.append(LogEntry::new(text, ERROR_NICKNAME, now));
            }
            ACK_EVENT => self.on_ack(frame.ack, frame.data, now),
            other => tracing::debug!("Ignoring unknown event '{}'", other),
        }
    }

    fn on_ack(&mut self, ack: Option<AckId>, data: serde_json::Value, now: i64) {
        let Some(id) = ack else {
            tracing::warn!("Dropping ack frame without an id");
            return;
        };
        if self.pending_acks.remove(&id).is_none() {
            // already reported as timed out
            tracing::debug!("Ignoring ack for unknown id {}", id);
            return;
        }

        match serde_json::from_value::<AckPayload>(data) {
            Ok(AckPayload { error: None }) => tracing::trace!("Message {} acknowledged", id),
            Ok(AckPayload { error: Some(reason) }) => self.append_send_failure(&reason, now),
            Err(e) => tracing::warn!("Malformed ack payload for {}: {}", id, e),
        }
    }

    /// Record an outgoing message and build the frame to transmit.
    ///
    /// Returns `None` without touching the log when the trimmed text is empty
    /// or the session is not connected.
    pub fn send_message(&mut self, text: &str) -> Option<Frame> {
        let text = text.trim();
        if text.is_empty() || !self.state.is_connected() {
            return None;
        }

        let now = self.clock.now_millis();
        self.append(LogEntry::new(text, self.nickname.clone(), now));

        let id = self.next_ack_id;
        self.next_ack_id += 1;
        self.pending_acks.insert(id, now);

        let message = ChatMessage {
            nickname: self.nickname.clone(),
            message: text.to_string(),
        };
        Some(Frame::chat(&message, Some(id)))
    }

    /// Report sent messages whose acknowledgment did not arrive in time
    pub fn expire_acks(&mut self) {
        let now = self.clock.now_millis();
        let mut expired: Vec<AckId> = self
            .pending_acks
            .iter()
            .filter(|(_, sent_at)| now - **sent_at >= self.ack_timeout_millis)
            .map(|(id, _)| *id)
            .collect();
        expired.sort_unstable();

        for id in expired {
            self.pending_acks.remove(&id);
            tracing::warn!("Message {} was not acknowledged in time", id);
            self.append_send_failure(ACK_TIMEOUT_REASON, now);
        }
    }

    fn append_send_failure(&mut self, reason: &str, now: i64) {
        self.append(LogEntry::new(
            format!("Message failed to send: {}", reason),
            ERROR_NICKNAME,
            now,
        ));
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        tracing::debug!("Connection state: {} -> {}", self.state, state);
        self.state = state.clone();
        self.events.push(SessionEvent::StateChanged(state));
    }

    fn append(&mut self, entry: LogEntry) {
        if let Some(capacity) = self.log_capacity {
            while self.log.len() >= capacity.max(1) {
                self.log.pop_front();
            }
        }
        self.log.push_back(entry.clone());
        self.events.push(SessionEvent::MessageAppended(entry));
    }

    fn remove_connecting_entry(&mut self) {
        let is_seed = self
            .log
            .front()
            .is_some_and(|entry| entry.text == CONNECTING_TEXT && entry.nickname == SYSTEM_NICKNAME);
        if is_seed {
            self.log.pop_front();
        }
    }
}
