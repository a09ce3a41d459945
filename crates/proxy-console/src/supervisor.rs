use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::protocol::CloseKind;

pub const BACKOFF_SCHEDULE: [Duration; 5] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(8),
    Duration::from_secs(16),
];
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Generation number of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct ConnectionId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Connect(ConnectionId),
    Close(ConnectionId),
    ScheduleRetry(Duration),
    CancelRetry,
    StartHeartbeat(Duration),
    StopHeartbeat,
    SendProbe(ConnectionId),
    /// The connection is usable; resend subscription state.
    Opened(ConnectionId),
    /// Retries are exhausted.
    GaveUp { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    schedule: Vec<Duration>,
    max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            schedule: BACKOFF_SCHEDULE.to_vec(),
            max_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl BackoffPolicy {
    /// An empty schedule falls back to the default one.
    pub fn new(schedule: Vec<Duration>, max_attempts: u32) -> Self {
        let schedule = if schedule.is_empty() {
            BACKOFF_SCHEDULE.to_vec()
        } else {
            schedule
        };
        Self {
            schedule,
            max_attempts,
        }
    }

    /// Delay before retry number `attempt` (zero based), capped at the last
    /// entry of the schedule.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let index = (attempt as usize).min(self.schedule.len() - 1);
        self.schedule[index]
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[derive(Debug, Clone)]
pub struct Supervisor {
    state: ConnectionState,
    attempt: u32,
    current: ConnectionId,
    policy: BackoffPolicy,
    heartbeat: Duration,
    last_close: Option<CloseKind>,
    opened_once: bool,
    reconnects: u64,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(BackoffPolicy::default(), HEARTBEAT_INTERVAL)
    }
}

impl Supervisor {
    pub fn new(policy: BackoffPolicy, heartbeat: Duration) -> Self {
        Self {
            state: ConnectionState::Idle,
            attempt: 0,
            current: ConnectionId::default(),
            policy,
            heartbeat,
            last_close: None,
            opened_once: false,
            reconnects: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn current(&self) -> ConnectionId {
        self.current
    }

    pub fn last_close(&self) -> Option<&CloseKind> {
        self.last_close.as_ref()
    }

    /// Number of connections opened after the first successful one.
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// First connect on mount. Only valid from `Idle`.
    pub fn start(&mut self) -> Vec<Directive> {
        if self.state != ConnectionState::Idle {
            debug!(state = %self.state, "start ignored");
            return Vec::new();
        }
        self.attempt = 0;
        vec![self.begin_connect()]
    }

    pub fn on_open(&mut self, id: ConnectionId) -> Vec<Directive> {
        if id != self.current || self.state != ConnectionState::Connecting {
            debug!(?id, state = %self.state, "stale open ignored");
            return Vec::new();
        }
        if self.opened_once {
            self.reconnects += 1;
        }
        self.opened_once = true;
        self.attempt = 0;
        self.transition(ConnectionState::Open);
        vec![
            Directive::StartHeartbeat(self.heartbeat),
            Directive::Opened(id),
        ]
    }

    pub fn on_close(&mut self, id: ConnectionId, kind: CloseKind) -> Vec<Directive> {
        if id != self.current
            || !matches!(
                self.state,
                ConnectionState::Connecting | ConnectionState::Open
            )
        {
            debug!(?id, state = %self.state, "stale close ignored");
            return Vec::new();
        }

        let was_open = self.state == ConnectionState::Open;
        self.last_close = Some(kind.clone());
        let mut directives = Vec::new();
        if was_open {
            directives.push(Directive::StopHeartbeat);
        }

        if kind.is_clean() {
            self.transition(ConnectionState::Idle);
            return directives;
        }

        warn!(?kind, attempt = self.attempt, "stream closed abnormally");
        self.transition(ConnectionState::Reconnecting);

        if self.attempt >= self.policy.max_attempts() {
            self.transition(ConnectionState::Failed);
            directives.push(Directive::GaveUp {
                attempts: self.attempt,
            });
            return directives;
        }

        let delay = self.policy.delay_for(self.attempt);
        self.attempt += 1;
        info!(
            delay_ms = delay.as_millis() as u64,
            attempt = self.attempt,
            "reconnect scheduled"
        );
        directives.push(Directive::ScheduleRetry(delay));
        directives
    }

    pub fn on_retry_due(&mut self) -> Vec<Directive> {
        if self.state != ConnectionState::Reconnecting {
            return Vec::new();
        }
        vec![self.begin_connect()]
    }

    pub fn on_heartbeat_due(&mut self) -> Vec<Directive> {
        if self.state != ConnectionState::Open {
            return Vec::new();
        }
        vec![Directive::SendProbe(self.current)]
    }

    /// A server ping is answered at once and the local heartbeat restarts.
    pub fn on_server_ping(&mut self, id: ConnectionId) -> Vec<Directive> {
        if id != self.current || self.state != ConnectionState::Open {
            return Vec::new();
        }
        vec![
            Directive::SendProbe(id),
            Directive::StartHeartbeat(self.heartbeat),
        ]
    }

    /// User-requested reconnect. Valid from any state; resets the attempt
    /// counter.
    pub fn manual_reconnect(&mut self) -> Vec<Directive> {
        let mut directives = vec![Directive::CancelRetry];
        match self.state {
            ConnectionState::Open => {
                directives.push(Directive::StopHeartbeat);
                directives.push(Directive::Close(self.current));
            }
            ConnectionState::Connecting => directives.push(Directive::Close(self.current)),
            _ => {}
        }
        self.attempt = 0;
        directives.push(self.begin_connect());
        directives
    }

    /// Clean, user-initiated close. Timers are cancelled before the transport
    /// is closed so nothing fires afterwards.
    pub fn close(&mut self) -> Vec<Directive> {
        let mut directives = vec![Directive::CancelRetry, Directive::StopHeartbeat];
        if matches!(
            self.state,
            ConnectionState::Open | ConnectionState::Connecting
        ) {
            directives.push(Directive::Close(self.current));
        }
        self.transition(ConnectionState::Idle);
        directives
    }

    fn begin_connect(&mut self) -> Directive {
        self.current = ConnectionId(self.current.0 + 1);
        self.transition(ConnectionState::Connecting);
        Directive::Connect(self.current)
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            info!(from = %self.state, to = %next, id = self.current.0, "connection state");
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn abnormal() -> CloseKind {
        CloseKind::Abnormal {
            code: Some(1006),
            reason: "connection reset".into(),
        }
    }

    fn connect_id(directives: &[Directive]) -> ConnectionId {
        directives
            .iter()
            .find_map(|d| match d {
                Directive::Connect(id) => Some(*id),
                _ => None,
            })
            .expect("no connect directive")
    }

    fn retry_delay(directives: &[Directive]) -> Option<Duration> {
        directives.iter().find_map(|d| match d {
            Directive::ScheduleRetry(delay) => Some(*delay),
            _ => None,
        })
    }

    #[test]
    fn test_start_connects_once() {
        let mut sup = Supervisor::default();
        let directives = sup.start();
        assert_eq!(directives, vec![Directive::Connect(ConnectionId(1))]);
        assert_eq!(sup.state(), ConnectionState::Connecting);
        assert!(sup.start().is_empty());
    }

    #[test]
    fn test_open_starts_heartbeat_and_resyncs() {
        let mut sup = Supervisor::default();
        let id = connect_id(&sup.start());
        let directives = sup.on_open(id);
        assert_eq!(
            directives,
            vec![
                Directive::StartHeartbeat(HEARTBEAT_INTERVAL),
                Directive::Opened(id)
            ]
        );
        assert_eq!(sup.state(), ConnectionState::Open);
    }

    #[test]
    fn test_backoff_schedule_then_failed() {
        let mut sup = Supervisor::default();
        let mut id = connect_id(&sup.start());
        let mut delays = Vec::new();

        for _ in 0..5 {
            let directives = sup.on_close(id, abnormal());
            assert_eq!(sup.state(), ConnectionState::Reconnecting);
            delays.push(retry_delay(&directives).unwrap());
            id = connect_id(&sup.on_retry_due());
        }
        assert_eq!(delays, BACKOFF_SCHEDULE.to_vec());

        let directives = sup.on_close(id, abnormal());
        assert_eq!(sup.state(), ConnectionState::Failed);
        assert!(retry_delay(&directives).is_none());
        assert!(directives.contains(&Directive::GaveUp { attempts: 5 }));

        // Nothing brings it back on its own.
        assert!(sup.on_retry_due().is_empty());
        assert!(sup.on_heartbeat_due().is_empty());
    }

    #[test]
    fn test_reconnects_count_only_after_first_successful_open() {
        let mut sup = Supervisor::default();
        let id = connect_id(&sup.start());
        sup.on_close(id, abnormal());
        let id = connect_id(&sup.on_retry_due());
        sup.on_open(id);
        assert_eq!(sup.reconnects(), 0);

        sup.on_close(id, abnormal());
        let id = connect_id(&sup.on_retry_due());
        sup.on_open(id);
        assert_eq!(sup.reconnects(), 1);
    }

    #[test]
    fn test_manual_reconnect_from_failed_resets_backoff() {
        let mut sup = Supervisor::default();
        let mut id = connect_id(&sup.start());
        for _ in 0..5 {
            sup.on_close(id, abnormal());
            id = connect_id(&sup.on_retry_due());
        }
        sup.on_close(id, abnormal());
        assert_eq!(sup.state(), ConnectionState::Failed);

        let directives = sup.manual_reconnect();
        assert_eq!(directives[0], Directive::CancelRetry);
        assert_eq!(sup.attempt(), 0);
        let id = connect_id(&directives);
        sup.on_open(id);

        let directives = sup.on_close(id, abnormal());
        assert_eq!(retry_delay(&directives), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_open_resets_attempt_counter() {
        let mut sup = Supervisor::default();
        let id = connect_id(&sup.start());
        sup.on_close(id, abnormal());
        let id = connect_id(&sup.on_retry_due());
        sup.on_close(id, abnormal());
        assert_eq!(sup.attempt(), 2);

        let id = connect_id(&sup.on_retry_due());
        sup.on_open(id);
        assert_eq!(sup.attempt(), 0);
        let directives = sup.on_close(id, abnormal());
        assert_eq!(retry_delay(&directives), Some(Duration::from_secs(1)));
        assert!(directives.contains(&Directive::StopHeartbeat));
    }

    #[test]
    fn test_stale_events_are_ignored() {
        let mut sup = Supervisor::default();
        let old = connect_id(&sup.start());
        sup.on_open(old);
        let new = connect_id(&sup.manual_reconnect());
        assert_ne!(old, new);

        assert!(sup.on_close(old, abnormal()).is_empty());
        assert!(sup.on_open(old).is_empty());
        assert_eq!(sup.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_user_close_cancels_timers_before_transport() {
        let mut sup = Supervisor::default();
        let id = connect_id(&sup.start());
        sup.on_open(id);

        let directives = sup.close();
        assert_eq!(
            directives,
            vec![
                Directive::CancelRetry,
                Directive::StopHeartbeat,
                Directive::Close(id)
            ]
        );
        assert_eq!(sup.state(), ConnectionState::Idle);
        assert!(sup.on_close(id, CloseKind::Clean).is_empty());
    }

    #[test]
    fn test_close_while_reconnecting_goes_idle() {
        let mut sup = Supervisor::default();
        let id = connect_id(&sup.start());
        sup.on_close(id, abnormal());
        assert_eq!(sup.state(), ConnectionState::Reconnecting);

        let directives = sup.close();
        assert!(!directives.iter().any(|d| matches!(d, Directive::Close(_))));
        assert_eq!(sup.state(), ConnectionState::Idle);
        assert!(sup.on_retry_due().is_empty());
    }

    #[test]
    fn test_heartbeat_and_server_ping() {
        let mut sup = Supervisor::default();
        let id = connect_id(&sup.start());
        assert!(sup.on_heartbeat_due().is_empty());
        sup.on_open(id);

        assert_eq!(sup.on_heartbeat_due(), vec![Directive::SendProbe(id)]);
        assert_eq!(
            sup.on_server_ping(id),
            vec![
                Directive::SendProbe(id),
                Directive::StartHeartbeat(HEARTBEAT_INTERVAL)
            ]
        );
    }

    #[test]
    fn test_policy_caps_at_last_entry() {
        let policy = BackoffPolicy::new(Vec::new(), 10);
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
        assert_eq!(policy.delay_for(9), Duration::from_secs(16));
    }

    #[derive(Debug, Clone)]
    enum Input {
        Open,
        Abnormal,
        RetryDue,
        Manual,
        Close,
    }

    fn arb_input() -> impl Strategy<Value = Input> {
        prop_oneof![
            Just(Input::Open),
            Just(Input::Abnormal),
            Just(Input::RetryDue),
            Just(Input::Manual),
            Just(Input::Close),
        ]
    }

    proptest! {
        #[test]
        fn prop_attempts_bounded_and_failed_only_at_cap(
            inputs in prop::collection::vec(arb_input(), 0..60),
        ) {
            let mut sup = Supervisor::default();
            sup.start();
            for input in inputs {
                let id = sup.current();
                let directives = match input {
                    Input::Open => sup.on_open(id),
                    Input::Abnormal => sup.on_close(id, abnormal()),
                    Input::RetryDue => sup.on_retry_due(),
                    Input::Manual => sup.manual_reconnect(),
                    Input::Close => sup.close(),
                };
                prop_assert!(sup.attempt() <= MAX_RECONNECT_ATTEMPTS);
                if sup.state() == ConnectionState::Failed {
                    prop_assert_eq!(sup.attempt(), MAX_RECONNECT_ATTEMPTS);
                }
                if let Some(delay) = retry_delay(&directives) {
                    prop_assert!(BACKOFF_SCHEDULE.contains(&delay));
                }
            }
        }
    }
}
