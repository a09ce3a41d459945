use std::collections::VecDeque;
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, warn};

use crate::config::ConsoleConfig;
use crate::error::{ConsoleError, Result};
use crate::http::RestClient;
use crate::metrics::MetricSeries;
use crate::session::{Effect, Session, SessionEvent, UserCommand};
use crate::supervisor::ConnectionId;
use crate::transport::{
    ConnectRequest, Connector, EventSender, Link, TransportEvent, TransportEventKind, WsConnector,
};
use crate::view::DashboardView;

const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Handle to a running session.
///
/// Dropping the handle shuts the session down and waits for its thread.
pub struct SessionHandle {
    events: EventSender,
    view: watch::Receiver<Arc<DashboardView>>,
    thread: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn send(&self, command: UserCommand) -> Result<()> {
        self.events
            .send(SessionEvent::User(command))
            .map_err(|_| ConsoleError::SessionClosed)
    }

    /// Latest published view.
    pub fn view(&self) -> Arc<DashboardView> {
        Arc::clone(&self.view.borrow())
    }

    /// A receiver that is notified on every publish.
    pub fn watch(&self) -> watch::Receiver<Arc<DashboardView>> {
        self.view.clone()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.events.send(SessionEvent::User(UserCommand::Shutdown));
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("session thread panicked");
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts a session against the configured backend over WebSocket.
pub fn spawn_session(config: ConsoleConfig) -> Result<SessionHandle> {
    spawn_session_with(config, WsConnector)
}

/// Starts a session with a custom stream [`Connector`].
pub fn spawn_session_with<C>(config: ConsoleConfig, connector: C) -> Result<SessionHandle>
where
    C: Connector + 'static,
{
    let mut session = Session::new(config.clone())?;
    let rest = RestClient::new(&config);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (view_tx, view_rx) = watch::channel(Arc::new(session.view()));

    let driver = Driver {
        session,
        connector,
        rest,
        bearer: config.bearer(),
        events: events_tx.clone(),
        view: view_tx,
        link: None,
        closing: None,
        retry: None,
        heartbeat: None,
        metrics_poll: None,
    };

    let thread = std::thread::Builder::new()
        .name("proxy-console-session".into())
        .spawn(move || {
            runtime.block_on(driver.run(events_rx));
            // In-flight REST calls are abandoned rather than awaited.
            runtime.shutdown_background();
        })?;

    Ok(SessionHandle {
        events: events_tx,
        view: view_rx,
        thread: Some(thread),
    })
}

struct Driver<C> {
    session: Session,
    connector: C,
    rest: RestClient,
    bearer: Option<String>,
    events: EventSender,
    view: watch::Sender<Arc<DashboardView>>,
    link: Option<(ConnectionId, Box<dyn Link>)>,
    /// Link closed by us whose close event has not come back yet.
    closing: Option<ConnectionId>,
    retry: Option<Pin<Box<Sleep>>>,
    heartbeat: Option<Interval>,
    metrics_poll: Option<Interval>,
}

impl<C: Connector> Driver<C> {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        let mut queued = VecDeque::from([SessionEvent::Mount]);
        loop {
            let event = match queued.pop_front() {
                Some(event) => event,
                None => tokio::select! {
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => {
                            debug!("all session handles dropped");
                            SessionEvent::User(UserCommand::Shutdown)
                        }
                    },
                    _ = wait_sleep(&mut self.retry) => {
                        self.retry = None;
                        SessionEvent::RetryDue
                    }
                    _ = wait_tick(&mut self.heartbeat) => SessionEvent::HeartbeatDue,
                    _ = wait_tick(&mut self.metrics_poll) => SessionEvent::MetricsPollDue,
                },
            };

            if let SessionEvent::Transport(TransportEvent {
                id,
                kind: TransportEventKind::Closed(_),
            }) = &event
            {
                if self.closing == Some(*id) {
                    self.closing = None;
                }
            }

            let effects = self.session.handle(event);
            for effect in effects {
                if !self.execute(effect) {
                    self.drain(&mut events).await;
                    info!("session stopped");
                    return;
                }
            }
        }
    }

    /// Waits a short while for the last closed link to finish its close
    /// handshake so the server sees code 1000 rather than a dropped socket.
    async fn drain(&mut self, events: &mut mpsc::UnboundedReceiver<SessionEvent>) {
        let Some(closing) = self.closing.take() else {
            return;
        };
        let wait = async {
            while let Some(event) = events.recv().await {
                if let SessionEvent::Transport(TransportEvent {
                    id,
                    kind: TransportEventKind::Closed(_),
                }) = event
                {
                    if id == closing {
                        break;
                    }
                }
            }
        };
        if tokio::time::timeout(CLOSE_GRACE, wait).await.is_err() {
            debug!(id = closing.0, "close handshake did not finish in time");
        }
    }

    /// Returns false once the session asked to stop.
    fn execute(&mut self, effect: Effect) -> bool {
        match effect {
            Effect::Connect { id, url } => {
                if let Some((old, mut link)) = self.link.take() {
                    debug!(id = old.0, "closing superseded link");
                    link.close();
                }
                let request = ConnectRequest {
                    url,
                    bearer: self.bearer.clone(),
                };
                let link = self.connector.open(id, request, self.events.clone());
                self.link = Some((id, link));
            }
            Effect::Send { id, frame } => match &mut self.link {
                Some((current, link)) if *current == id => match frame.encode() {
                    Ok(text) => {
                        if !link.send(text) {
                            warn!(id = id.0, "link gone, frame dropped");
                        }
                    }
                    Err(e) => error!(error = %e, "cannot encode frame"),
                },
                _ => debug!(id = id.0, "no link for frame"),
            },
            Effect::CloseTransport { id } => {
                if let Some((current, mut link)) = self.link.take() {
                    if current == id {
                        link.close();
                        self.closing = Some(id);
                    } else {
                        self.link = Some((current, link));
                    }
                }
            }
            Effect::ArmRetry(delay) => self.retry = Some(Box::pin(sleep(delay))),
            Effect::CancelRetry => self.retry = None,
            Effect::ArmHeartbeat(period) => self.heartbeat = Some(periodic(period)),
            Effect::CancelHeartbeat => self.heartbeat = None,
            Effect::ArmMetricsPoll(period) => self.metrics_poll = Some(periodic(period)),
            Effect::CancelMetricsPoll => self.metrics_poll = None,
            Effect::FetchSnapshot { lines } => {
                let rest = self.rest.clone();
                self.blocking(move || SessionEvent::SnapshotLoaded(rest.fetch_log_tail(lines)));
            }
            Effect::FetchMetricsHistory { seconds } => {
                for series in MetricSeries::ALL {
                    let rest = self.rest.clone();
                    self.blocking(move || {
                        SessionEvent::MetricsLoaded(series, rest.fetch_metrics_history(series, seconds))
                    });
                }
            }
            Effect::FetchAggregate(lookback) => {
                let rest = self.rest.clone();
                self.blocking(move || {
                    SessionEvent::AggregateLoaded(lookback, rest.fetch_aggregated(lookback))
                });
            }
            Effect::Publish => {
                self.view.send_replace(Arc::new(self.session.view()));
            }
            Effect::Stop => {
                if let Some((id, mut link)) = self.link.take() {
                    link.close();
                    self.closing = Some(id);
                }
                return false;
            }
        }
        true
    }

    /// Runs a blocking REST call off the event loop and feeds its result back.
    fn blocking<F>(&self, call: F)
    where
        F: FnOnce() -> SessionEvent + Send + 'static,
    {
        let events = self.events.clone();
        tokio::task::spawn_blocking(move || {
            let _ = events.send(call());
        });
    }
}

/// Interval whose first tick is one full period away.
fn periodic(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn wait_sleep(sleep: &mut Option<Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

async fn wait_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}
