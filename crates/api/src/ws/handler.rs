use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use sculpt_core::task::TaskRecord;
use sculpt_store::StoreError;
use serde_json::json;

use crate::state::AppState;

type WsSink = SplitSink<WebSocket, Message>;

/// GET /api/v1/tasks/{id}/ws
///
/// Upgrade to a push channel for one task.
pub async fn task_ws_handler(
    ws: WebSocketUpgrade,
    Path(task_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, task_id, state))
}

/// Drive one push-channel connection.
///
///   1. Watch the task, then send the current record as the first frame.
///   2. Forward every newer record as a JSON text frame.
///   3. Close after a terminal record, on client close, or on shutdown.
async fn handle_socket(socket: WebSocket, task_id: String, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let mut watch = match state.service.watch(&task_id).await {
        Ok(watch) => watch,
        Err(e) => {
            tracing::debug!(task_id = %task_id, error = %e, "Push channel rejected");
            let _ = sink.send(error_frame(&e)).await;
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };

    let conn_id = uuid::Uuid::new_v4().to_string();
    let mut control = state.ws_manager.add(conn_id.clone(), task_id.clone()).await;
    let watchers = state.ws_manager.watchers(&task_id).await;
    tracing::info!(conn_id = %conn_id, task_id = %task_id, watchers, "WebSocket connected");

    let mut finished = watch.current().is_terminal();
    let mut open = send_record(&mut sink, watch.current()).await;

    while open && !finished {
        tokio::select! {
            update = watch.next() => match update {
                Some(record) => {
                    finished = record.is_terminal();
                    open = send_record(&mut sink, &record).await;
                }
                None => break,
            },
            frame = control.recv() => match frame {
                Some(Message::Close(frame)) => {
                    let _ = sink.send(Message::Close(frame)).await;
                    open = false;
                }
                Some(frame) => open = sink.send(frame).await.is_ok(),
                None => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => open = false,
                Some(Ok(Message::Pong(_))) => {
                    tracing::trace!(conn_id = %conn_id, "Pong received");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                    open = false;
                }
            },
        }
    }

    if open {
        let _ = sink.send(Message::Close(None)).await;
    }
    state.ws_manager.remove(&conn_id).await;
    tracing::info!(conn_id = %conn_id, task_id = %task_id, finished, "WebSocket disconnected");
}

/// Returns whether the socket is still writable.
async fn send_record(sink: &mut WsSink, record: &TaskRecord) -> bool {
    let payload = match serde_json::to_string(record) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(task_id = %record.task_id, error = %e, "Failed to encode task record");
            return false;
        }
    };
    sink.send(Message::Text(payload.into())).await.is_ok()
}

fn error_frame(err: &StoreError) -> Message {
    let (code, message) = match err {
        StoreError::NotFound { task_id } => ("NOT_FOUND", format!("Task {task_id} not found")),
        StoreError::Unavailable(_) => ("STORE_UNAVAILABLE", "Storage backend is unavailable".to_string()),
        _ => ("INTERNAL_ERROR", "An internal error occurred".to_string()),
    };
    let body = json!({
        "error": message,
        "code": code,
    });
    Message::Text(body.to_string().into())
}
