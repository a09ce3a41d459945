use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};
use url::Url;

use crate::protocol::{CloseKind, NORMAL_CLOSURE};
use crate::session::SessionEvent;
use crate::supervisor::ConnectionId;

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEventKind {
    Opened,
    Text(String),
    Closed(CloseKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub id: ConnectionId,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn new(id: ConnectionId, kind: TransportEventKind) -> Self {
        Self { id, kind }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub url: Url,
    pub bearer: Option<String>,
}

/// Opens stream connections.
pub trait Connector: Send {
    fn open(&mut self, id: ConnectionId, request: ConnectRequest, events: EventSender)
        -> Box<dyn Link>;
}

/// Outbound half of an open (or opening) connection.
pub trait Link: Send {
    /// Queues a text frame. Returns false once the connection is gone.
    fn send(&mut self, text: String) -> bool;

    /// Starts a clean close with code 1000.
    fn close(&mut self);
}

enum Outbound {
    Text(String),
    Close,
}

/// [`Connector`] over `tokio-tungstenite`. Must be used from inside a tokio
/// runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(
        &mut self,
        id: ConnectionId,
        request: ConnectRequest,
        events: EventSender,
    ) -> Box<dyn Link> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_link(id, request, rx, events));
        Box::new(WsLink { outbound: tx })
    }
}

struct WsLink {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Link for WsLink {
    fn send(&mut self, text: String) -> bool {
        self.outbound.send(Outbound::Text(text)).is_ok()
    }

    fn close(&mut self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

fn report(events: &EventSender, id: ConnectionId, kind: TransportEventKind) {
    // The session may already be gone during teardown.
    let _ = events.send(SessionEvent::Transport(TransportEvent::new(id, kind)));
}

async fn run_link(
    id: ConnectionId,
    request: ConnectRequest,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: EventSender,
) {
    let mut client_request = match request.url.as_str().into_client_request() {
        Ok(r) => r,
        Err(e) => {
            report(&events, id, closed_abnormally(None, e.to_string()));
            return;
        }
    };
    if let Some(bearer) = &request.bearer {
        match HeaderValue::from_str(bearer) {
            Ok(value) => {
                client_request.headers_mut().insert(AUTHORIZATION, value);
            }
            Err(e) => warn!(error = %e, "bearer token is not a valid header value, connecting without it"),
        }
    }

    debug!(id = id.0, url = %request.url, "connecting");
    let stream = match tokio_tungstenite::connect_async(client_request).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            warn!(id = id.0, error = %e, "connect failed");
            report(&events, id, closed_abnormally(None, e.to_string()));
            return;
        }
    };
    report(&events, id, TransportEventKind::Opened);

    let (mut sink, mut stream) = stream.split();

    loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    trace!(id = id.0, %text, "send");
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        report(&events, id, closed_abnormally(None, e.to_string()));
                        return;
                    }
                }
                // Explicit close, or the link handle was dropped.
                Some(Outbound::Close) | None => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client closed".into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    let _ = sink.close().await;
                    report(
                        &events,
                        id,
                        TransportEventKind::Closed(CloseKind::observed(true, Some(NORMAL_CLOSURE), "client closed")),
                    );
                    return;
                }
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    report(&events, id, TransportEventKind::Text(text));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (Some(u16::from(f.code)), f.reason.into_owned()))
                        .unwrap_or((None, String::from("closed without frame")));
                    report(
                        &events,
                        id,
                        TransportEventKind::Closed(CloseKind::observed(false, code, reason)),
                    );
                    return;
                }
                // Control frames are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    report(&events, id, closed_abnormally(None, e.to_string()));
                    return;
                }
                None => {
                    report(&events, id, closed_abnormally(None, "stream ended"));
                    return;
                }
            },
        }
    }
}

fn closed_abnormally(code: Option<u16>, reason: impl Into<String>) -> TransportEventKind {
    TransportEventKind::Closed(CloseKind::Abnormal {
        code,
        reason: reason.into(),
    })
}
