use std::sync::Arc;

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket, close_code},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{debug, warn};

use crate::state::AppState;

#[derive(Deserialize)]
pub struct SocketParams {
    client_id: Option<String>,
}

pub async fn socket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<SocketParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let client_id = params.client_id.filter(|id| !id.is_empty());

    ws.on_upgrade(move |socket| async move {
        match client_id {
            Some(client_id) => serve(socket, client_id, state).await,
            None => reject(socket).await,
        }
    })
}

async fn reject(mut socket: WebSocket) {
    warn!("Closing realtime connection without client_id");

    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: "Client ID is required".into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

async fn serve(socket: WebSocket, client_id: String, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let (outbox, mut inbox) = unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(text) = inbox.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    state.registry.connect(&client_id, outbox.clone());

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => debug!("Client {client_id} sent: {}", text.as_str()),
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.registry.release(&client_id, &outbox);
    writer.abort();
}
