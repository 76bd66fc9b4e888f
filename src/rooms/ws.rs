use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::relay::Relay;

#[debug_handler(state = crate::AppState)]
pub async fn relay_ws(State(relay): State<Arc<Relay>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |stream| serve_connection(relay, stream))
}

async fn serve_connection(relay: Arc<Relay>, stream: WebSocket) {
    let (tx, mut rx) = mpsc::channel::<Arc<str>>(relay.config().outbound_capacity);
    let player = relay.connect(tx);
    let (mut sender, mut receiver) = stream.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => relay.handle_frame(&player, text.as_str().as_bytes()),
                Some(Ok(Message::Binary(bytes))) => relay.handle_frame(&player, &bytes),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(err)) => {
                    warn!(player = %player, error = %err, "websocket read failed");
                    break;
                }
            },
            _ = &mut send_task => {
                debug!(player = %player, "websocket writer stopped");
                break;
            }
        }
    }

    relay.disconnect(&player);
    send_task.abort();
}
