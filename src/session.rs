use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;
use crate::discovery;
use crate::logger::MessageLogger;
use crate::paths::StatusPath;
use crate::protocol::{Frame, PendingCommand, SequenceNumber};
use crate::status::{diff, Status};
use crate::transport::{EventSink, Transport};
use crate::types::{Address, ConnectionState, Event};
use crate::wait::timed_wait;
use crate::{Error, Result};

/// A `get` within this window of the last frame is answered from cache.
pub(crate) const CACHE_WINDOW: Duration = Duration::from_millis(1000);
/// An open session with no frame for this long is assumed dead.
pub(crate) const FRESHNESS_LIMIT: Duration = Duration::from_millis(2000);
pub(crate) const STATUS_WAIT: Duration = Duration::from_millis(5000);
pub(crate) const CLOSE_WAIT: Duration = Duration::from_millis(5000);
pub(crate) const CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_BACKOFF: Duration = Duration::from_millis(500);
const CONNECT_BACKOFF_MAX: Duration = Duration::from_millis(1000);

pub(crate) type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;

/// Latest status frame and when it arrived.
#[derive(Debug, Clone, Default)]
pub(crate) struct Snapshot {
    pub status: Option<Arc<Status>>,
    pub received_at: Option<Instant>,
    /// Bumped on every parsed status frame, changed or not.
    pub generation: u64,
    pub sequence: SequenceNumber,
}

/// Owns the cached status and the connection state, and fans out events.
pub(crate) struct StatusFeed {
    snapshot: watch::Sender<Snapshot>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<Event>,
    callbacks: Vec<EventCallback>,
    logger: Option<Mutex<MessageLogger>>,
}

impl StatusFeed {
    pub fn new(callbacks: Vec<EventCallback>, logger: Option<MessageLogger>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            snapshot: watch::Sender::new(Snapshot::default()),
            state: watch::Sender::new(ConnectionState::Closed),
            events,
            callbacks,
            logger: logger.map(Mutex::new),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Cached status if a frame arrived within `window`.
    pub fn fresh(&self, window: Duration) -> Option<Arc<Status>> {
        let snap = self.snapshot.borrow();
        match (&snap.status, snap.received_at) {
            (Some(status), Some(at)) if at.elapsed() <= window => Some(status.clone()),
            _ => None,
        }
    }

    pub fn last_frame_age(&self) -> Option<Duration> {
        self.snapshot.borrow().received_at.map(|at| at.elapsed())
    }

    pub fn set_state(&self, state: ConnectionState, address: Option<Address>) {
        let previous = self.state.send_replace(state);
        if previous == state {
            return;
        }
        info!(from = %previous, to = %state, "connection state changed");
        self.with_logger(|l| l.log_connection(&state.to_string(), address.map(|a| a.to_string())));
        self.publish(Event::ConnectionStateChanged { state });
    }

    /// Handle one inbound frame: update the cache and notify on change.
    pub fn ingest(&self, frame: Frame) {
        self.with_logger(|l| l.log_frame(&frame));

        let status = match Status::parse(&frame.body) {
            Ok(status) => Arc::new(status),
            Err(e) => {
                debug!(error = %e, seq = frame.sequence.value(), "ignoring non-status frame");
                return;
            }
        };

        let mut previous = None;
        let mut changed = false;
        self.snapshot.send_modify(|snap| {
            snap.generation += 1;
            snap.received_at = Some(Instant::now());
            snap.sequence = frame.sequence;
            if diff(snap.status.as_deref(), &status) {
                changed = true;
                previous = snap.status.replace(status.clone());
            }
        });
        trace!(seq = frame.sequence.value(), changed, "status frame");

        if !changed {
            return;
        }
        let changes = match &previous {
            Some(prev) => status.changes_since(prev),
            None => Vec::new(),
        };
        if let Some(prev) = &previous
            && prev.mode() != status.mode()
        {
            self.publish(Event::ModeChanged { mode: status.mode() });
        }
        self.publish(Event::StatusChanged { status, changes });
    }

    pub fn log_command(&self, frame: &Frame, attempt: u32) {
        self.with_logger(|l| l.log_command(frame, attempt));
    }

    fn publish(&self, event: Event) {
        for cb in &self.callbacks {
            cb(&event);
        }
        let _ = self.events.send(event);
    }

    fn with_logger(&self, f: impl FnOnce(&mut MessageLogger)) {
        if let Some(logger) = &self.logger
            && let Ok(mut logger) = logger.lock()
        {
            f(&mut logger);
        }
    }
}

/// The connection lifecycle: CLOSED -> OPEN -> CLOSING -> CLOSED.
///
/// Owned by the request worker; nothing else touches the transport.
pub(crate) struct Session {
    config: ClientConfig,
    feed: Arc<StatusFeed>,
    sink: EventSink,
    transport: Option<Transport>,
    discovered: Option<Address>,
    shutdown: watch::Receiver<bool>,
    settle: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(
        config: ClientConfig,
        feed: Arc<StatusFeed>,
        sink: EventSink,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            feed,
            sink,
            transport: None,
            discovered: None,
            shutdown,
            settle: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.feed.connection_state()
    }

    pub fn transport_alive(&self) -> bool {
        self.transport.as_ref().is_some_and(Transport::is_alive)
    }

    /// Forget the discovered address so the next connect rediscovers.
    pub fn invalidate_address(&mut self) {
        if self.discovered.take().is_some() {
            debug!("discovered address invalidated");
        }
    }

    /// Make sure an open, live session exists.
    pub async fn ensure_open(&mut self) -> Result<()> {
        if self.state() == ConnectionState::Open {
            let alive = self.transport_alive();
            let stale = self.feed.last_frame_age().is_none_or(|age| age > FRESHNESS_LIMIT);
            if !alive {
                self.invalidate_address();
            }
            if !alive || stale {
                debug!(alive, stale, "reopening session");
                self.close();
            }
        }

        if self.state() == ConnectionState::Closing {
            let mut rx = self.feed.subscribe_state();
            if timed_wait(&mut rx, CLOSE_WAIT, |s| *s == ConnectionState::Closed)
                .await
                .is_none()
            {
                return Err(Error::CloseTimeout);
            }
        }

        if self.state() == ConnectionState::Closed {
            self.connect().await?;
        }
        Ok(())
    }

    async fn connect(&mut self) -> Result<()> {
        for attempt in 1..=CONNECT_ATTEMPTS {
            match self.try_connect().await {
                Ok(transport) => {
                    let address = transport.address();
                    self.transport = Some(transport);
                    self.feed.set_state(ConnectionState::Open, Some(address));
                    return Ok(());
                }
                Err(e) => {
                    self.invalidate_address();
                    warn!(attempt, of = CONNECT_ATTEMPTS, error = %e, "connect failed");
                    if attempt < CONNECT_ATTEMPTS {
                        let backoff = (CONNECT_BACKOFF * attempt).min(CONNECT_BACKOFF_MAX);
                        if timed_wait(&mut self.shutdown, backoff, |stop| *stop).await.is_some() {
                            return Err(Error::NotConnected);
                        }
                    }
                }
            }
        }
        Err(Error::ConnectFailed {
            attempts: CONNECT_ATTEMPTS,
        })
    }

    async fn try_connect(&mut self) -> Result<Transport> {
        let address = match self.config.static_address().or(self.discovered) {
            Some(address) => address,
            None => {
                let address = discovery::resolve_address_on(
                    self.config.discovery_port,
                    self.config.discovery_timeout(),
                )
                .await?;
                self.discovered = Some(address);
                address
            }
        };
        Transport::connect(address, self.config.connect_timeout(), self.sink.clone()).await
    }

    /// Begin closing. The state reaches CLOSED after the settle delay.
    pub fn close(&mut self) {
        if self.state() != ConnectionState::Open {
            return;
        }
        let address = self.transport.as_ref().map(Transport::address);
        self.feed.set_state(ConnectionState::Closing, address);
        if let Some(mut transport) = self.transport.take() {
            transport.destroy();
        }

        let feed = self.feed.clone();
        let delay = self.config.settle_delay();
        self.settle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            feed.set_state(ConnectionState::Closed, address);
        }));
    }

    /// Answer a `get`: cached if fresh, else the next frame from the unit.
    pub async fn fetch_status(&mut self) -> Result<Arc<Status>> {
        if let Some(status) = self.feed.fresh(CACHE_WINDOW) {
            trace!("status cache hit");
            return Ok(status);
        }

        let mut rx = self.feed.subscribe_snapshots();
        let since = rx.borrow_and_update().generation;
        self.ensure_open().await?;

        match timed_wait(&mut rx, STATUS_WAIT, |snap| {
            snap.generation > since && snap.status.is_some()
        })
        .await
        {
            Some(Snapshot {
                status: Some(status),
                ..
            }) => Ok(status),
            _ => Err(Error::StatusUnavailable),
        }
    }

    /// Write a command and wait for a status frame showing its effect.
    ///
    /// Retries reuse the open session; only a dead socket is reopened.
    pub async fn send_and_confirm(
        &mut self,
        path: StatusPath,
        value: String,
    ) -> Result<Arc<Status>> {
        self.ensure_open().await?;

        let sequence = self.feed.snapshot().sequence.next();
        let command = PendingCommand::new(sequence, path, value);
        let attempts = self.config.command_attempts();
        let window = self.config.command_timeout();
        info!(command = %command.frame, "sending command");

        let mut rx = self.feed.subscribe_snapshots();
        for attempt in 1..=attempts {
            if attempt > 1 && !self.transport_alive() {
                self.ensure_open().await?;
            }
            let since = rx.borrow_and_update().generation;
            self.feed.log_command(&command.frame, attempt);

            let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
            if let Err(e) = transport.write(&command.frame).await {
                warn!(attempt, of = attempts, error = %e, "command write failed");
                continue;
            }

            let started = Instant::now();
            let confirmed = timed_wait(&mut rx, window, |snap| {
                snap.generation > since
                    && snap
                        .status
                        .as_ref()
                        .is_some_and(|s| s.matches(&command.path, &command.value))
            })
            .await;

            if let Some(Snapshot {
                status: Some(status),
                ..
            }) = confirmed
            {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "command confirmed"
                );
                return Ok(status);
            }
            warn!(
                attempt,
                of = attempts,
                path = %command.path,
                value = %command.value,
                "expected state not observed"
            );
        }

        Err(Error::CommandFailed {
            path: command.path.to_string(),
            value: command.value,
            attempts,
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.destroy();
            self.feed.set_state(ConnectionState::Closed, None);
        }
        if let Some(settle) = self.settle.take()
            && !settle.is_finished()
        {
            settle.abort();
            self.feed.set_state(ConnectionState::Closed, None);
        }
    }
}
