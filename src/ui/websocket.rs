//! Admin and viewer websocket sessions

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use std::sync::Arc;

use crate::field::Field;

use super::handlers::{dispatch, ApiResponse, OperatorCommand};

pub async fn admin_ws(ws: WebSocketUpgrade, State(field): State<Arc<Field>>) -> Response {
    ws.on_upgrade(move |socket| admin_session(socket, field))
}

pub async fn viewer_ws(ws: WebSocketUpgrade, State(field): State<Arc<Field>>) -> Response {
    ws.on_upgrade(move |socket| viewer_session(socket, field))
}

async fn admin_session(mut socket: WebSocket, field: Arc<Field>) {
    while let Some(Ok(message)) = socket.recv().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let reply = match serde_json::from_str::<OperatorCommand>(&text) {
            Ok(command) => match dispatch(&field, command) {
                Ok(Some(status)) => serde_json::to_string(&status).ok(),
                Ok(None) => None,
                Err(e) => serde_json::to_string(&ApiResponse::<()>::error(e)).ok(),
            },
            Err(e) => {
                tracing::debug!("read: {}", e);
                serde_json::to_string(&ApiResponse::<()>::error(e.to_string())).ok()
            }
        };

        if let Some(reply) = reply {
            if let Err(e) = socket.send(Message::Text(reply)).await {
                tracing::debug!("write: {}", e);
                break;
            }
        }
    }
}

/// Every message from a viewer is answered with the field status
async fn viewer_session(mut socket: WebSocket, field: Arc<Field>) {
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Close(_) => break,
            Message::Text(_) | Message::Binary(_) => {
                let Ok(status) = serde_json::to_string(&field.status()) else {
                    continue;
                };
                if let Err(e) = socket.send(Message::Text(status)).await {
                    tracing::debug!("write: {}", e);
                    break;
                }
            }
            _ => {}
        }
    }
}
