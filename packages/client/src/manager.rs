//! Connection manager: the UI-facing handle around [`ChatSession`].

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use hiroba_shared::{
    protocol::Frame,
    time::{Clock, SystemClock},
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    config::ClientConfig,
    error::ClientError,
    runner::{Transport, run_ack_expiry, run_transport},
    session::{ChatSession, SessionEvent},
    state::{ConnectionState, LogEntry},
};

const MAX_ACK_CHECK_INTERVAL: Duration = Duration::from_secs(1);
const MIN_ACK_CHECK_INTERVAL: Duration = Duration::from_millis(10);

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registered listeners, independent from any transport instance
#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Listener)>>,
}

impl Listeners {
    fn add(&self, listener: Listener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.entries).push((id, listener));
        id
    }

    fn remove(&self, id: u64) {
        lock(&self.entries).retain(|(entry_id, _)| *entry_id != id);
    }

    fn clear(&self) {
        lock(&self.entries).clear();
    }

    fn dispatch(&self, events: &[SessionEvent]) {
        if events.is_empty() {
            return;
        }
        // call listeners without holding the lock so they may (un)subscribe
        let snapshot: Vec<Listener> = lock(&self.entries)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for event in events {
            for listener in &snapshot {
                listener(event);
            }
        }
    }
}

/// Events waiting to be delivered, in log order
#[derive(Default)]
struct Outbox {
    queue: VecDeque<SessionEvent>,
    /// Some thread is currently draining `queue`
    dispatching: bool,
}

/// Releases the dispatcher role if a listener panics
struct DispatchGuard<'a>(&'a Mutex<Outbox>);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            lock(self.0).dispatching = false;
        }
    }
}

/// Session state shared between the manager handle and the background tasks
pub(crate) struct Shared {
    session: Mutex<ChatSession>,
    outbox: Mutex<Outbox>,
    listeners: Arc<Listeners>,
}

impl Shared {
    /// Mutate the session, then notify listeners once the session lock is released.
    ///
    /// Events are queued while the session lock is held and delivered by a
    /// single dispatcher at a time, so listeners observe them in log order.
    /// A listener may call back into the manager: its events are queued and
    /// delivered by the dispatcher already running.
    pub(crate) fn apply<R>(&self, f: impl FnOnce(&mut ChatSession) -> R) -> R {
        let result = {
            let mut session = lock(&self.session);
            let result = f(&mut session);
            let events = session.take_events();
            if !events.is_empty() {
                lock(&self.outbox).queue.extend(events);
            }
            result
        };
        self.flush();
        result
    }

    fn flush(&self) {
        {
            let mut outbox = lock(&self.outbox);
            if outbox.dispatching || outbox.queue.is_empty() {
                return;
            }
            outbox.dispatching = true;
        }

        let _guard = DispatchGuard(&self.outbox);
        loop {
            let batch: Vec<SessionEvent> = {
                let mut outbox = lock(&self.outbox);
                if outbox.queue.is_empty() {
                    outbox.dispatching = false;
                    return;
                }
                outbox.queue.drain(..).collect()
            };
            self.listeners.dispatch(&batch);
        }
    }

    fn read<R>(&self, f: impl FnOnce(&ChatSession) -> R) -> R {
        f(&lock(&self.session))
    }
}

/// Handle returned by [`ConnectionManager::subscribe`].
///
/// The listener stays registered until this handle is dropped or
/// [`unsubscribe`](Subscription::unsubscribe) is called.
#[must_use = "dropping a Subscription detaches the listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.remove(self.id);
        }
    }
}

/// Owns the connection to the chat server and the conversation log.
///
/// Reconnects automatically after network interruptions. Every transport
/// created by a reconnect reports to the same session and listeners.
///
/// # Example
///
/// ```ignore
/// let manager = ConnectionManager::connect(ClientConfig::default());
/// let _subscription = manager.subscribe(|event| println!("{:?}", event));
/// manager.send_message("hello")?;
/// manager.dispose().await;
/// ```
pub struct ConnectionManager {
    config: ClientConfig,
    shared: Arc<Shared>,
    outbound: Option<mpsc::UnboundedSender<Frame>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    ack_task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Create a manager without connecting yet (see [`start`](Self::start))
    pub fn new(config: ClientConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ClientConfig, clock: Arc<dyn Clock>) -> Self {
        let session = ChatSession::new(&config, clock);
        let shared = Arc::new(Shared {
            session: Mutex::new(session),
            outbox: Mutex::new(Outbox::default()),
            listeners: Arc::new(Listeners::default()),
        });

        Self {
            config,
            shared,
            outbound: None,
            shutdown: None,
            task: None,
            ack_task: None,
        }
    }

    /// Create a manager and start connecting right away
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(config: ClientConfig) -> Self {
        let mut manager = Self::new(config);
        manager.start();
        manager
    }

    /// Spawn the transport task and the acknowledgment timer. Calling it again has no effect.
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let transport = Transport {
            url: self.config.url.clone(),
            reconnect_interval: self.config.reconnect_interval,
            max_reconnect_attempts: self.config.max_reconnect_attempts,
            shared: self.shared.clone(),
            outbound: outbound_rx,
            shutdown: shutdown_rx,
        };

        self.outbound = Some(outbound_tx);
        self.shutdown = Some(shutdown_tx);
        self.task = Some(tokio::spawn(run_transport(transport)));
        // pending acks expire whether or not a connection is up
        self.ack_task = Some(tokio::spawn(run_ack_expiry(
            self.shared.clone(),
            self.config
                .ack_timeout
                .clamp(MIN_ACK_CHECK_INTERVAL, MAX_ACK_CHECK_INTERVAL),
        )));
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.read(|session| session.state().clone())
    }

    pub fn is_connected(&self) -> bool {
        self.shared.read(ChatSession::is_connected)
    }

    /// Snapshot of the message log, oldest first
    pub fn messages(&self) -> Vec<LogEntry> {
        self.shared.read(ChatSession::messages)
    }

    /// Send a chat message.
    ///
    /// The message is appended to the log before it is queued to the
    /// transport. Nothing happens when the text is blank or the manager is not
    /// connected.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::EmptyMessage`], [`ClientError::NotConnected`]
    /// or [`ClientError::Closed`] when the message was not queued.
    pub fn send_message(&self, text: &str) -> Result<(), ClientError> {
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let frame = self
            .shared
            .apply(|session| session.send_message(text))
            .ok_or(ClientError::NotConnected)?;

        self.outbound
            .as_ref()
            .ok_or(ClientError::Closed)?
            .send(frame)
            .map_err(|_| ClientError::Closed)
    }

    /// Register a listener for state changes and appended messages
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = self.shared.listeners.add(Arc::new(listener));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.shared.listeners),
        }
    }

    /// Detach every listener, close the connection and wait for the background tasks.
    ///
    /// No listener is invoked once this returns.
    pub async fn dispose(mut self) {
        self.shared.listeners.clear();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!("Transport task ended abnormally: {}", e);
        }
        if let Some(ack_task) = self.ack_task.take() {
            ack_task.abort();
            if let Err(e) = ack_task.await
                && !e.is_cancelled()
            {
                tracing::warn!("Acknowledgment timer ended abnormally: {}", e);
            }
        }
        tracing::debug!("Connection manager disposed");
    }
}

/// Detaches listeners and aborts the background tasks without waiting.
///
/// A dispatch already running on another worker may still invoke a listener
/// after `drop` returns; use [`ConnectionManager::dispose`] when no late
/// callback is acceptable.
impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.listeners.clear();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(ack_task) = self.ack_task.take() {
            ack_task.abort();
        }
    }
}
