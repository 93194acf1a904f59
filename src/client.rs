use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::{ClientConfig, IdleClose};
use crate::logger::{MessageLogMode, MessageLogger};
use crate::paths::{Field, PathTable, StatusPath};
use crate::session::{EventCallback, Session, StatusFeed};
use crate::status::Status;
use crate::transport::{EventSink, TransportEvent};
use crate::types::{celsius_to_comfort, ConnectionState, Event, Mode, Zone};
use crate::{Error, Result};

/// The operations the request worker accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get,
    Set { path: StatusPath, value: String },
    Close,
}

struct Job {
    request: Request,
    reply: oneshot::Sender<Result<Option<Arc<Status>>>>,
}

pub struct RinnaiClientBuilder {
    config: ClientConfig,
    event_callbacks: Vec<EventCallback>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl RinnaiClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            event_callbacks: Vec::new(),
            log_mode: None,
            log_path: None,
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Connect to a fixed address instead of listening for discovery.
    pub fn address(mut self, host: IpAddr) -> Self {
        self.config.address = Some(host);
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = Some(port);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Milliseconds of inactivity before the session is closed; `0` closes
    /// after every request and a negative value never closes.
    pub fn idle_close_ms(mut self, ms: i64) -> Self {
        self.config.idle_close_ms = ms;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.settle_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn command_attempts(mut self, attempts: u32) -> Self {
        self.config.command_attempts = attempts;
        self
    }

    pub fn discovery(mut self, port: u16, timeout: Duration) -> Self {
        self.config.discovery_port = port;
        self.config.discovery_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn multi_set_point(mut self, multi: bool) -> Self {
        self.config.multi_set_point = multi;
        self
    }

    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.event_callbacks.push(Box::new(f));
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    /// Start the request worker. Must be called inside a tokio runtime.
    pub fn build(self) -> Result<RinnaiClient> {
        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(MessageLogger::new(mode, &path).map_err(Error::Io)?),
            _ => None,
        };

        let feed = Arc::new(StatusFeed::new(self.event_callbacks, logger));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let sink_feed = feed.clone();
        let sink: EventSink = Arc::new(move |event| match event {
            TransportEvent::Frame(frame) => sink_feed.ingest(frame),
            other => {
                let _ = control_tx.send(other);
            }
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let idle = self.config.idle_close();
        let path_table = PathTable::new(self.config.multi_set_point);
        let session = Session::new(self.config, feed.clone(), sink, shutdown_rx.clone());

        tokio::spawn(run_worker(session, jobs_rx, control_rx, shutdown_rx, idle));

        Ok(RinnaiClient {
            jobs: jobs_tx,
            feed,
            shutdown: Arc::new(shutdown_tx),
            path_table,
        })
    }
}

impl Default for RinnaiClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a unit. Cheap to clone; all clones share one request queue.
#[derive(Clone)]
pub struct RinnaiClient {
    jobs: mpsc::UnboundedSender<Job>,
    feed: Arc<StatusFeed>,
    shutdown: Arc<watch::Sender<bool>>,
    path_table: PathTable,
}

impl RinnaiClient {
    pub fn builder() -> RinnaiClientBuilder {
        RinnaiClientBuilder::new()
    }

    /// Queue a request and wait for its result.
    pub async fn execute(&self, request: Request) -> Result<Option<Arc<Status>>> {
        let (reply, rx) = oneshot::channel();
        self.jobs
            .send(Job { request, reply })
            .map_err(|_| Error::NotConnected)?;
        rx.await.map_err(|_| Error::NotConnected)?
    }

    pub async fn get_status(&self) -> Result<Arc<Status>> {
        self.execute(Request::Get)
            .await?
            .ok_or(Error::StatusUnavailable)
    }

    /// Send `value` to `path` (e.g. `"SYST.OSS.MD"`) and wait until the unit
    /// reports it. Returns the confirming status.
    pub async fn send_command(&self, path: &str, value: impl Into<String>) -> Result<Arc<Status>> {
        let path: StatusPath = path.parse()?;
        self.execute(Request::Set {
            path,
            value: value.into(),
        })
        .await?
        .ok_or(Error::StatusUnavailable)
    }

    /// Set a semantic field for the currently active mode.
    pub async fn set_field(
        &self,
        field: Field,
        zone: Option<Zone>,
        value: impl Into<String>,
    ) -> Result<Arc<Status>> {
        let status = self.get_status().await?;
        let path = self
            .path_table
            .resolve(field, status.mode(), zone)
            .ok_or_else(|| Error::InvalidPath(format!("{field:?} in {:?}", status.mode())))?;
        self.execute(Request::Set {
            path,
            value: value.into(),
        })
        .await?
        .ok_or(Error::StatusUnavailable)
    }

    /// Switch the unit's operating mode.
    pub async fn set_mode(&self, mode: Mode) -> Result<Arc<Status>> {
        self.set_field(Field::Mode, None, mode.as_code()).await
    }

    /// Set the target temperature in Celsius, converting to a comfort level
    /// when the evaporative cooler is active.
    pub async fn set_target_temperature(
        &self,
        zone: Option<Zone>,
        celsius: i32,
    ) -> Result<Arc<Status>> {
        let status = self.get_status().await?;
        let value = match status.mode() {
            Mode::Evaporative => celsius_to_comfort(celsius),
            Mode::Heat | Mode::Cool => celsius,
        };
        self.set_field(Field::TargetTemp, zone, format!("{value:02}")).await
    }

    /// Close the session now rather than waiting for the idle timer.
    pub async fn close(&self) -> Result<()> {
        self.execute(Request::Close).await.map(|_| ())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.feed.subscribe_events()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.feed.connection_state()
    }

    pub fn watch_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.feed.subscribe_state()
    }

    /// Last status received, however old.
    pub fn cached_status(&self) -> Option<Arc<Status>> {
        self.feed.snapshot().status
    }

    pub fn path_table(&self) -> &PathTable {
        &self.path_table
    }

    /// Stop the worker. Queued requests fail with `NotConnected`.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

async fn process(session: &mut Session, request: Request) -> Result<Option<Arc<Status>>> {
    debug!(?request, "process");
    match request {
        Request::Close => {
            session.close();
            Ok(None)
        }
        Request::Get => session.fetch_status().await.map(Some),
        Request::Set { path, value } => session.send_and_confirm(path, value).await.map(Some),
    }
}

async fn run_worker(
    mut session: Session,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    mut control: mpsc::UnboundedReceiver<TransportEvent>,
    mut shutdown: watch::Receiver<bool>,
    idle: IdleClose,
) {
    let mut idle_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;

            _ = async { shutdown.wait_for(|stop| *stop).await.is_ok() } => break,

            job = jobs.recv() => {
                let Some(job) = job else { break };
                idle_deadline = None;
                let result = process(&mut session, job.request).await;
                if let Err(e) = &result {
                    warn!(error = %e, "request failed");
                }
                let _ = job.reply.send(result);

                if jobs.is_empty() && session.state() == ConnectionState::Open {
                    match idle {
                        IdleClose::Immediately => session.close(),
                        IdleClose::After(delay) => idle_deadline = Some(Instant::now() + delay),
                        IdleClose::Never => {}
                    }
                }
            }

            Some(event) = control.recv() => match event {
                TransportEvent::Timeout if idle == IdleClose::Never => {
                    debug!("no unsolicited status, refreshing");
                    if let Err(e) = session.fetch_status().await {
                        warn!(error = %e, "status refresh failed");
                    }
                }
                TransportEvent::Error(_) | TransportEvent::Closed if !session.transport_alive() => {
                    session.invalidate_address();
                    session.close();
                }
                _ => {}
            },

            _ = tokio::time::sleep_until(idle_deadline.unwrap_or_else(Instant::now)),
                if idle_deadline.is_some() =>
            {
                debug!("idle timeout, closing session");
                idle_deadline = None;
                session.close();
            }
        }
    }

    jobs.close();
    while let Ok(job) = jobs.try_recv() {
        let _ = job.reply.send(Err(Error::NotConnected));
    }
    drop(session);
    debug!("request worker stopped");
}
