use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::fanout::{FanoutHub, Scope, TrackingEvent};

#[derive(Clone)]
pub struct WsState {
    pub hub: Arc<FanoutHub>,
}

/// Client subscription message
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
enum ClientMessage {
    /// Join one scope: `monitoring` or `driver.{id}`
    Subscribe { scope: String },
    /// Leave the current scope
    Unsubscribe,
}

/// Server control message; tracking events are forwarded as their own
/// `{ type, payload }` envelope
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
enum ServerMessage {
    Connected { message: String },
    Subscribed { scope: String },
    Error { message: String },
}

enum SubCommand {
    Join(String),
    Leave,
}

async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), ()> {
    let json = serde_json::to_string(message).map_err(|_| ())?;
    sender.send(Message::Text(json.into())).await.map_err(|_| ())
}

/// WebSocket endpoint for tracking events
pub async fn ws_tracking(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let (mut sender, mut receiver) = socket.split();

    let connected = ServerMessage::Connected {
        message: "Connected to tracking updates. Send subscribe message with a scope.".to_string(),
    };
    let _ = send_message(&mut sender, &connected).await;

    // Channel to communicate subscription changes from receiver task to
    // sender task
    let (sub_tx, mut sub_rx) = tokio::sync::mpsc::channel::<SubCommand>(16);

    let hub = state.hub.clone();
    let forward_task = tokio::spawn(async move {
        'session: loop {
            // wait for the first (or next) subscription
            let (mut scope, mut events) = loop {
                match sub_rx.recv().await {
                    Some(SubCommand::Join(requested)) => {
                        match join(&hub, &mut sender, &requested).await {
                            Ok(Some(joined)) => break joined,
                            Ok(None) => continue,
                            Err(()) => break 'session,
                        }
                    }
                    Some(SubCommand::Leave) => continue,
                    None => break 'session,
                }
            };

            loop {
                tokio::select! {
                    cmd = sub_rx.recv() => match cmd {
                        Some(SubCommand::Join(requested)) => {
                            // re-joining the current scope keeps the existing
                            // subscription so no event is delivered twice
                            if Scope::parse(&requested) == Some(scope) {
                                let ack = ServerMessage::Subscribed { scope: scope.channel_name() };
                                if send_message(&mut sender, &ack).await.is_err() {
                                    break 'session;
                                }
                            } else {
                                match join(&hub, &mut sender, &requested).await {
                                    Ok(Some(joined)) => (scope, events) = joined,
                                    Ok(None) => {}
                                    Err(()) => break 'session,
                                }
                            }
                        }
                        Some(SubCommand::Leave) => continue 'session,
                        None => break 'session,
                    },
                    result = events.recv() => match result {
                        Ok(event) => {
                            match serde_json::to_string(&event) {
                                Ok(json) => {
                                    if sender.send(Message::Text(json.into())).await.is_err() {
                                        break 'session;
                                    }
                                }
                                Err(e) => tracing::warn!("Failed to serialize tracking event: {e}"),
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(scope = %scope, skipped, "WS subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => continue 'session,
                    },
                }
            }
        }
    });

    // Handle incoming messages from the client
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Subscribe { scope }) => {
                    let _ = sub_tx.send(SubCommand::Join(scope)).await;
                }
                Ok(ClientMessage::Unsubscribe) => {
                    let _ = sub_tx.send(SubCommand::Leave).await;
                }
                Err(_) => {}
            },
            Ok(Message::Ping(_)) => {
                // Axum handles pong automatically
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    // Cleanup: aborting the forward task drops its broadcast receiver,
    // which leaves the scope
    forward_task.abort();
}

/// Subscribe to a requested scope and ack, or report an invalid scope.
/// `Err(())` means the socket is gone.
async fn join(
    hub: &FanoutHub,
    sender: &mut SplitSink<WebSocket, Message>,
    requested: &str,
) -> Result<Option<(Scope, broadcast::Receiver<TrackingEvent>)>, ()> {
    match Scope::parse(requested) {
        Some(scope) => {
            let events = hub.subscribe(&scope);
            let ack = ServerMessage::Subscribed {
                scope: scope.channel_name(),
            };
            send_message(sender, &ack).await?;
            Ok(Some((scope, events)))
        }
        None => {
            let error = ServerMessage::Error {
                message: format!("Unknown scope '{requested}'"),
            };
            send_message(sender, &error).await?;
            Ok(None)
        }
    }
}
