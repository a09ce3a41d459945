use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::buffer::EventBuffer;
use crate::config::ConsoleConfig;
use crate::error::Result;
use crate::filter::{FilterState, FilteredView};
use crate::metrics::{LookBack, MetricSample, MetricSeries, MetricsHistory};
use crate::protocol::{BufferInfo, ClientFrame, PageInfo, ServerFrame};
use crate::snapshot::SnapshotReconciler;
use crate::subscription::SubscriptionController;
use crate::supervisor::{ConnectionId, ConnectionState, Directive, Supervisor};
use crate::transport::{TransportEvent, TransportEventKind};
use crate::view::{Banner, BufferStats, DashboardView, SessionStats};
use crate::WireRecord;

/// Everything a user can ask of a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    Subscribe(FilterState),
    UpdateFilter(FilterState),
    Unsubscribe,
    Pause,
    Resume,
    Clear,
    Reconnect,
    DismissBanner,
    SelectLookBack(LookBack),
    RequestPage(u32),
    RequestBufferInfo,
    Shutdown,
}

#[derive(Debug)]
pub enum SessionEvent {
    Mount,
    Transport(TransportEvent),
    RetryDue,
    HeartbeatDue,
    MetricsPollDue,
    SnapshotLoaded(Result<Vec<WireRecord>>),
    MetricsLoaded(MetricSeries, Result<Vec<MetricSample>>),
    AggregateLoaded(LookBack, Result<Vec<MetricSample>>),
    User(UserCommand),
}

impl From<UserCommand> for SessionEvent {
    fn from(command: UserCommand) -> Self {
        SessionEvent::User(command)
    }
}

/// Side effects requested by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Connect { id: ConnectionId, url: url::Url },
    Send { id: ConnectionId, frame: ClientFrame },
    CloseTransport { id: ConnectionId },
    ArmRetry(Duration),
    CancelRetry,
    ArmHeartbeat(Duration),
    CancelHeartbeat,
    FetchSnapshot { lines: usize },
    FetchMetricsHistory { seconds: u32 },
    FetchAggregate(LookBack),
    ArmMetricsPoll(Duration),
    CancelMetricsPoll,
    /// State changed; rebuild and publish the view.
    Publish,
    /// The session is finished; the runtime should exit.
    Stop,
}

/// The dashboard session as a state machine. [`Session::handle`] performs no
/// I/O and reads no clock; the runtime executes the returned effects in order.
pub struct Session {
    config: ConsoleConfig,
    supervisor: Supervisor,
    subscription: SubscriptionController,
    buffer: EventBuffer,
    filtered: FilteredView,
    snapshot: SnapshotReconciler,
    metrics: Arc<MetricsHistory>,
    banner: Option<Banner>,
    next_banner: u64,
    failure: Option<String>,
    next_retry: Option<Duration>,
    server_buffer: Option<BufferInfo>,
    page: Option<PageInfo>,
    server_message: Option<String>,
    stats: SessionStats,
    revision: u64,
    mounted: bool,
    stopped: bool,
}

impl Session {
    pub fn new(config: ConsoleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            supervisor: Supervisor::new(config.backoff_policy(), config.heartbeat_interval),
            subscription: SubscriptionController::new(config.initial_filter.clone()),
            buffer: EventBuffer::new(config.buffer_capacity),
            filtered: FilteredView::default(),
            snapshot: SnapshotReconciler::new(config.snapshot_lines()),
            metrics: Arc::new(MetricsHistory::new(config.metrics_window)),
            banner: None,
            next_banner: 0,
            failure: None,
            next_retry: None,
            server_buffer: None,
            page: None,
            server_message: None,
            stats: SessionStats::default(),
            revision: 0,
            mounted: false,
            stopped: false,
            config,
        })
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn current_connection(&self) -> ConnectionId {
        self.supervisor.current()
    }

    pub fn buffer(&self) -> &EventBuffer {
        &self.buffer
    }

    pub fn filter(&self) -> &FilterState {
        self.subscription.desired()
    }

    pub fn metrics(&self) -> &MetricsHistory {
        &self.metrics
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Applies one event. Events that change nothing observable (stale
    /// transport events, anything after shutdown) yield no effects.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Effect> {
        if self.stopped {
            debug!(?event, "session stopped, event dropped");
            return Vec::new();
        }
        match self.dispatch(event) {
            Some(mut effects) => {
                self.revision += 1;
                if !self.stopped {
                    effects.push(Effect::Publish);
                }
                effects
            }
            None => Vec::new(),
        }
    }

    /// Builds the render snapshot. The visible record list is recomputed only
    /// when the buffer or the filter changed since the last call.
    pub fn view(&mut self) -> DashboardView {
        let filter = self.subscription.desired().clone();
        DashboardView {
            revision: self.revision,
            buffer_revision: self.buffer.revision(),
            connection: self.supervisor.state(),
            attempt: self.supervisor.attempt(),
            max_attempts: self.config.max_reconnect_attempts,
            next_retry: self.next_retry,
            failure: self.failure.clone(),
            records: self.filtered.get(&self.buffer, &filter),
            filter,
            paused: self.subscription.is_paused(),
            pending_changes: self.subscription.has_pending(),
            buffer: BufferStats {
                len: self.buffer.len(),
                capacity: self.buffer.capacity(),
                evicted: self.buffer.evicted(),
                dropped_while_paused: self.buffer.dropped_while_paused(),
            },
            banner: self.banner.clone(),
            snapshot: self.snapshot.state().clone(),
            server_buffer: self.server_buffer.clone(),
            page: self.page,
            server_message: self.server_message.clone(),
            metrics: Arc::clone(&self.metrics),
            stats: self.stats.clone(),
        }
    }

    fn dispatch(&mut self, event: SessionEvent) -> Option<Vec<Effect>> {
        match event {
            SessionEvent::Mount => self.mount(),
            SessionEvent::Transport(event) => self.on_transport(event),
            SessionEvent::RetryDue => {
                self.next_retry = None;
                let directives = self.supervisor.on_retry_due();
                Some(self.apply(directives))
            }
            SessionEvent::HeartbeatDue => {
                let directives = self.supervisor.on_heartbeat_due();
                if directives.is_empty() {
                    return None;
                }
                Some(self.apply(directives))
            }
            SessionEvent::MetricsPollDue => Some(vec![Effect::FetchMetricsHistory {
                seconds: self.config.history_seconds(),
            }]),
            SessionEvent::SnapshotLoaded(outcome) => {
                self.snapshot.resolve(&mut self.buffer, outcome);
                Some(Vec::new())
            }
            SessionEvent::MetricsLoaded(series, outcome) => {
                match outcome {
                    Ok(samples) => Arc::make_mut(&mut self.metrics).replace(series, samples),
                    Err(e) => warn!(%series, error = %e, "metrics history fetch failed"),
                }
                Some(Vec::new())
            }
            SessionEvent::AggregateLoaded(lookback, outcome) => {
                match outcome {
                    Ok(buckets) => Arc::make_mut(&mut self.metrics).set_aggregate(lookback, buckets),
                    Err(e) => warn!(lookback = lookback.label(), error = %e, "aggregated metrics fetch failed"),
                }
                Some(Vec::new())
            }
            SessionEvent::User(command) => Some(self.on_command(command)),
        }
    }

    /// Snapshot fetch and first connect are issued together; neither waits
    /// for the other.
    fn mount(&mut self) -> Option<Vec<Effect>> {
        if self.mounted {
            return None;
        }
        self.mounted = true;
        info!(base_url = %self.config.base_url, "session mounted");

        let mut effects = Vec::new();
        if let Some(lines) = self.snapshot.begin() {
            effects.push(Effect::FetchSnapshot { lines });
        }
        let directives = self.supervisor.start();
        effects.extend(self.apply(directives));
        effects.push(Effect::FetchMetricsHistory {
            seconds: self.config.history_seconds(),
        });
        effects.push(Effect::FetchAggregate(self.metrics.lookback()));
        effects.push(Effect::ArmMetricsPoll(self.config.metrics_poll_interval));
        Some(effects)
    }

    fn on_transport(&mut self, event: TransportEvent) -> Option<Vec<Effect>> {
        let TransportEvent { id, kind } = event;
        match kind {
            TransportEventKind::Opened => {
                let directives = self.supervisor.on_open(id);
                if directives.is_empty() {
                    return None;
                }
                Some(self.apply(directives))
            }
            TransportEventKind::Closed(kind) => {
                if id != self.supervisor.current() {
                    debug!(id = id.0, "close from superseded connection ignored");
                    return None;
                }
                self.subscription.on_closed();
                let directives = self.supervisor.on_close(id, kind);
                Some(self.apply(directives))
            }
            TransportEventKind::Text(text) => {
                if id != self.supervisor.current()
                    || self.supervisor.state() != ConnectionState::Open
                {
                    debug!(id = id.0, "frame from inactive connection ignored");
                    return None;
                }
                match ServerFrame::decode(&text) {
                    Ok(frame) => {
                        self.stats.frames += 1;
                        self.on_frame(id, frame)
                    }
                    Err(e) => {
                        self.stats.protocol_errors += 1;
                        warn!(error = %e, "dropping malformed frame");
                        Some(Vec::new())
                    }
                }
            }
        }
    }

    fn on_frame(&mut self, id: ConnectionId, frame: ServerFrame) -> Option<Vec<Effect>> {
        match frame {
            ServerFrame::Realtime { logs } => {
                for record in &logs {
                    *self.stats.received.entry(record.level).or_default() += 1;
                }
                self.buffer.append(logs);
                Some(Vec::new())
            }
            ServerFrame::Data {
                logs,
                page,
                total_pages,
                total_logs,
            } => {
                self.page = Some(PageInfo {
                    page,
                    total_pages,
                    total_logs,
                });
                self.buffer.replace_all(logs);
                Some(Vec::new())
            }
            ServerFrame::Info {
                message,
                buffer_info,
            } => {
                if let Some(message) = message {
                    debug!(%message, "server info");
                    self.server_message = Some(message);
                }
                if buffer_info.is_some() {
                    self.server_buffer = buffer_info;
                }
                Some(Vec::new())
            }
            ServerFrame::Error { message, error } => {
                let message = ServerFrame::error_text(message, error);
                warn!(%message, "server reported an error");
                self.stats.server_errors += 1;
                self.next_banner += 1;
                self.banner = Some(Banner {
                    id: self.next_banner,
                    message,
                });
                Some(Vec::new())
            }
            ServerFrame::Metrics { series, data } => match MetricSample::from_json(&data) {
                Some(sample) => {
                    Arc::make_mut(&mut self.metrics).push(series, sample);
                    Some(Vec::new())
                }
                None => {
                    self.stats.protocol_errors += 1;
                    warn!(%series, "metrics frame without a usable timestamp");
                    Some(Vec::new())
                }
            },
            ServerFrame::Ping => {
                let directives = self.supervisor.on_server_ping(id);
                Some(self.apply(directives))
            }
            ServerFrame::Pong => None,
        }
    }

    fn on_command(&mut self, command: UserCommand) -> Vec<Effect> {
        debug!(?command, "user command");
        match command {
            UserCommand::Subscribe(filter) => {
                let frame = self.subscription.subscribe(filter);
                self.send(frame)
            }
            UserCommand::UpdateFilter(filter) => {
                let frame = self.subscription.update_filter(filter);
                self.send(frame)
            }
            UserCommand::Unsubscribe => {
                let frame = self.subscription.unsubscribe();
                self.send(frame)
            }
            UserCommand::Pause => {
                self.subscription.pause();
                self.buffer.set_paused(true);
                Vec::new()
            }
            UserCommand::Resume => {
                self.subscription.resume();
                self.buffer.set_paused(false);
                Vec::new()
            }
            UserCommand::Clear => {
                self.buffer.clear();
                self.page = None;
                Vec::new()
            }
            UserCommand::Reconnect => {
                self.subscription.on_closed();
                self.failure = None;
                self.next_retry = None;
                let directives = self.supervisor.manual_reconnect();
                self.apply(directives)
            }
            UserCommand::DismissBanner => {
                self.banner = None;
                Vec::new()
            }
            UserCommand::SelectLookBack(lookback) => {
                if lookback == self.metrics.lookback() {
                    return Vec::new();
                }
                Arc::make_mut(&mut self.metrics).set_lookback(lookback);
                vec![Effect::FetchAggregate(lookback)]
            }
            UserCommand::RequestPage(page) => {
                let frame = self.subscription.request_page(page);
                self.send(frame)
            }
            UserCommand::RequestBufferInfo => {
                let frame = self.subscription.request_buffer_info();
                self.send(frame)
            }
            UserCommand::Shutdown => {
                info!("session shutting down");
                let directives = self.supervisor.close();
                let mut effects = self.apply(directives);
                effects.push(Effect::CancelMetricsPoll);
                effects.push(Effect::Stop);
                self.subscription.on_closed();
                self.stopped = true;
                effects
            }
        }
    }

    fn send(&self, frame: Option<ClientFrame>) -> Vec<Effect> {
        frame
            .map(|frame| Effect::Send {
                id: self.supervisor.current(),
                frame,
            })
            .into_iter()
            .collect()
    }

    /// Translates supervisor directives into effects.
    fn apply(&mut self, directives: Vec<Directive>) -> Vec<Effect> {
        let mut effects = Vec::with_capacity(directives.len());
        for directive in directives {
            match directive {
                Directive::Connect(id) => {
                    match self.config.stream_url(self.subscription.desired()) {
                        Ok(url) => effects.push(Effect::Connect { id, url }),
                        Err(e) => {
                            // Config is validated up front, so this only
                            // happens for a path that cannot be joined.
                            warn!(error = %e, "cannot build stream url");
                            self.failure = Some(e.to_string());
                        }
                    }
                }
                Directive::Close(id) => effects.push(Effect::CloseTransport { id }),
                Directive::ScheduleRetry(delay) => {
                    self.next_retry = Some(delay);
                    effects.push(Effect::ArmRetry(delay));
                }
                Directive::CancelRetry => {
                    self.next_retry = None;
                    effects.push(Effect::CancelRetry);
                }
                Directive::StartHeartbeat(period) => effects.push(Effect::ArmHeartbeat(period)),
                Directive::StopHeartbeat => effects.push(Effect::CancelHeartbeat),
                Directive::SendProbe(id) => effects.push(Effect::Send {
                    id,
                    frame: ClientFrame::Ping,
                }),
                Directive::Opened(id) => {
                    self.failure = None;
                    self.stats.reconnects = self.supervisor.reconnects();
                    for frame in self.subscription.on_open(id) {
                        effects.push(Effect::Send { id, frame });
                    }
                }
                Directive::GaveUp { attempts } => {
                    self.failure = Some(format!(
                        "stream unavailable after {attempts} reconnect attempts"
                    ));
                }
            }
        }
        effects
    }
}
