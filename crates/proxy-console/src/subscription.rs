use tracing::debug;

use crate::filter::FilterState;
use crate::protocol::ClientFrame;
use crate::supervisor::ConnectionId;

#[derive(Debug, Clone, Default)]
pub struct SubscriptionController {
    desired: FilterState,
    paused: bool,
    open: Option<ConnectionId>,
    pending: bool,
}

impl SubscriptionController {
    pub fn new(initial: FilterState) -> Self {
        Self {
            desired: initial,
            ..Self::default()
        }
    }

    pub fn desired(&self) -> &FilterState {
        &self.desired
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// True when a change made offline is still waiting for the next open.
    pub fn has_pending(&self) -> bool {
        self.pending
    }

    pub fn subscribe(&mut self, filter: FilterState) -> Option<ClientFrame> {
        self.desired = FilterState {
            streaming_enabled: true,
            ..filter
        };
        let frame = self.subscribe_frame();
        self.emit(frame)
    }

    /// Changes level and search. The streaming flag is left as is; use
    /// [`subscribe`](Self::subscribe) / [`unsubscribe`](Self::unsubscribe) for that.
    pub fn update_filter(&mut self, filter: FilterState) -> Option<ClientFrame> {
        self.desired.level_threshold = filter.level_threshold;
        self.desired.search_text = filter.search_text;
        let frame = ClientFrame::UpdateFilter {
            level: self.desired.level_threshold,
            search: self.desired.search(),
        };
        self.emit(frame)
    }

    pub fn unsubscribe(&mut self) -> Option<ClientFrame> {
        self.desired.streaming_enabled = false;
        self.emit(ClientFrame::Unsubscribe)
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Paged fetches are request/response and are not replayed after a
    /// reconnect.
    pub fn request_page(&self, page: u32) -> Option<ClientFrame> {
        self.open?;
        Some(ClientFrame::GetPage {
            page: page.max(1),
            level: self.desired.level_threshold,
            search: self.desired.search(),
        })
    }

    pub fn request_buffer_info(&self) -> Option<ClientFrame> {
        self.open.map(|_| ClientFrame::GetBufferInfo)
    }

    /// Frames to send right after `id` opens. A fresh connection carries no
    /// server-side subscription, so only an active subscription is replayed.
    pub fn on_open(&mut self, id: ConnectionId) -> Vec<ClientFrame> {
        self.open = Some(id);
        self.pending = false;
        if self.desired.streaming_enabled {
            vec![self.subscribe_frame()]
        } else {
            Vec::new()
        }
    }

    pub fn on_closed(&mut self) {
        self.open = None;
    }

    fn subscribe_frame(&self) -> ClientFrame {
        ClientFrame::Subscribe {
            level: self.desired.level_threshold,
            search: self.desired.search(),
        }
    }

    fn emit(&mut self, frame: ClientFrame) -> Option<ClientFrame> {
        if self.open.is_some() {
            Some(frame)
        } else {
            debug!(?frame, "connection not open, deferring");
            self.pending = true;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Level;

    fn filter(level: Level, search: &str) -> FilterState {
        FilterState {
            level_threshold: level,
            search_text: search.to_string(),
            streaming_enabled: true,
        }
    }

    #[test]
    fn test_messages_sent_only_when_open() {
        let mut controller = SubscriptionController::default();
        assert_eq!(controller.subscribe(filter(Level::Error, "")), None);
        assert!(controller.has_pending());

        let frames = controller.on_open(ConnectionId(1));
        assert_eq!(
            frames,
            vec![ClientFrame::Subscribe {
                level: Level::Error,
                search: None
            }]
        );
        assert!(!controller.has_pending());

        assert_eq!(
            controller.update_filter(filter(Level::Warning, " denied ")),
            Some(ClientFrame::UpdateFilter {
                level: Level::Warning,
                search: Some("denied".into())
            })
        );
    }

    #[test]
    fn test_offline_filter_change_is_replayed_on_open() {
        let mut controller = SubscriptionController::new(filter(Level::Connect, ""));
        controller.on_open(ConnectionId(1));
        controller.on_closed();

        assert_eq!(controller.update_filter(filter(Level::Critical, "dns")), None);
        let frames = controller.on_open(ConnectionId(2));
        assert_eq!(
            frames,
            vec![ClientFrame::Subscribe {
                level: Level::Critical,
                search: Some("dns".into())
            }]
        );
    }

    #[test]
    fn test_unsubscribed_state_replays_nothing() {
        let mut controller = SubscriptionController::default();
        controller.unsubscribe();
        assert!(controller.on_open(ConnectionId(1)).is_empty());
        assert_eq!(controller.unsubscribe(), Some(ClientFrame::Unsubscribe));
    }

    #[test]
    fn test_update_filter_keeps_streaming_flag() {
        let mut controller = SubscriptionController::default();
        controller.unsubscribe();
        controller.update_filter(filter(Level::Info, ""));
        assert!(!controller.desired().streaming_enabled);
    }

    #[test]
    fn test_pause_is_local_only() {
        let mut controller = SubscriptionController::default();
        controller.on_open(ConnectionId(1));
        controller.pause();
        assert!(controller.is_paused());
        assert!(controller.desired().streaming_enabled);
        controller.resume();
        assert!(!controller.is_paused());
    }

    #[test]
    fn test_page_requests_need_open_connection() {
        let mut controller = SubscriptionController::default();
        assert_eq!(controller.request_page(2), None);
        controller.on_open(ConnectionId(1));
        assert!(matches!(
            controller.request_page(0),
            Some(ClientFrame::GetPage { page: 1, .. })
        ));
        assert_eq!(
            controller.request_buffer_info(),
            Some(ClientFrame::GetBufferInfo)
        );
    }
}
