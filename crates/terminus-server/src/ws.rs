//! WebSocket feed of ownership changes.
//!
//! Connect to `/ws` to receive:
//!
//! - a `Snapshot` of every reserved item on connect
//! - `ItemClaimed` / `ItemReleased` / `AllReleased` as transitions commit
//! - a `Heartbeat` every heartbeat interval
//!
//! Each connection has its own broadcast receiver. A connection that falls
//! behind is resynchronised with a fresh snapshot; it never holds up the
//! coordinator or other observers.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use terminus_core::{ClaimRecord, ReservationEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::node::AppState;

/// Messages pushed to feed clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum FeedMessage {
    /// Every currently reserved item
    Snapshot { reserved: Vec<ClaimRecord> },
    ItemClaimed { item: String, handle: Option<String> },
    ItemReleased { item: String },
    AllReleased,
    /// Keep-alive, seconds since the Unix epoch
    Heartbeat { timestamp: u64 },
}

impl From<ReservationEvent> for FeedMessage {
    fn from(event: ReservationEvent) -> Self {
        match event {
            ReservationEvent::ItemClaimed { item, handle } => Self::ItemClaimed { item, handle },
            ReservationEvent::ItemReleased { item } => Self::ItemReleased { item },
            ReservationEvent::AllReleased => Self::AllReleased,
        }
    }
}

/// WebSocket handler for the live feed
pub async fn ws_feed_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_feed_socket(socket, state))
}

async fn handle_feed_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let coordinator = &state.coordinator;
    let (snapshot, mut events) = coordinator.subscribe_with_snapshot().await;
    info!(
        "Feed client connected ({} observers)",
        coordinator.notifier().observer_count()
    );

    if let Err(e) = send_message(&mut socket, &FeedMessage::Snapshot { reserved: snapshot }).await {
        warn!("Failed to send initial snapshot: {}", e);
        return;
    }

    let mut heartbeat = tokio::time::interval(state.heartbeat_interval);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = socket.send(Message::Pong(data)).await {
                            warn!("Failed to send pong: {}", e);
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!("Ignoring client message: {}", text.as_str());
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            event = events.recv() => {
                let message = match event {
                    Ok(event) => FeedMessage::from(event),
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Feed client lagged by {} events, resending snapshot", missed);
                        let (snapshot, rx) = coordinator.subscribe_with_snapshot().await;
                        events = rx;
                        FeedMessage::Snapshot { reserved: snapshot }
                    }
                    Err(RecvError::Closed) => break,
                };
                if let Err(e) = send_message(&mut socket, &message).await {
                    warn!("Failed to send feed update: {}", e);
                    break;
                }
            }
            _ = heartbeat.tick() => {
                let timestamp = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                if let Err(e) = send_message(&mut socket, &FeedMessage::Heartbeat { timestamp }).await {
                    warn!("Failed to send heartbeat: {}", e);
                    break;
                }
            }
        }
    }

    info!("Feed client disconnected");
}

async fn send_message(socket: &mut WebSocket, message: &FeedMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(message).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::build_router;
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::time::Duration;
    use terminus_core::{AddressResolver, Catalog, ClientAddr, Coordinator, CoordinatorConfig};
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

    async fn next_json<S>(ws: &mut S) -> Value
    where
        S: futures::Stream<Item = Result<WsMessage, WsError>> + Unpin,
    {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        serde_json::from_str(msg.to_text().unwrap()).unwrap()
    }

    #[test]
    fn event_wire_format() {
        let msg = FeedMessage::from(ReservationEvent::ItemReleased { item: "A".into() });
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({ "type": "ItemReleased", "item": "A" })
        );

        let snapshot = FeedMessage::Snapshot {
            reserved: vec![ClaimRecord {
                item: "B".into(),
                handle: Some("bob".into()),
                claimant: None,
            }],
        };
        assert_eq!(
            serde_json::to_value(&snapshot).unwrap(),
            json!({ "type": "Snapshot", "reserved": [{ "item": "B", "handle": "bob" }] })
        );
    }

    #[tokio::test]
    async fn feed_streams_snapshot_then_events() {
        let coordinator = Arc::new(Coordinator::with_resolver(
            Catalog::new(["A", "B"]).unwrap(),
            CoordinatorConfig::default(),
            AddressResolver::anonymous(),
        ));
        coordinator.claim(&ClientAddr::new("10.0.0.1"), "A").await.unwrap();

        let state = Arc::new(AppState {
            coordinator: Arc::clone(&coordinator),
            trust_proxy: false,
            heartbeat_interval: Duration::from_secs(3600),
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                build_router(state).into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();

        assert_eq!(
            next_json(&mut ws).await,
            json!({ "type": "Snapshot", "reserved": [{ "item": "A", "handle": null }] })
        );

        coordinator.claim(&ClientAddr::new("10.0.0.2"), "B").await.unwrap();
        assert_eq!(
            next_json(&mut ws).await,
            json!({ "type": "ItemClaimed", "item": "B", "handle": null })
        );

        coordinator.release(&ClientAddr::new("10.0.0.1")).await.unwrap();
        assert_eq!(next_json(&mut ws).await, json!({ "type": "ItemReleased", "item": "A" }));

        coordinator.reset_all("reset123").await.unwrap();
        assert_eq!(next_json(&mut ws).await, json!({ "type": "AllReleased" }));
    }
}
