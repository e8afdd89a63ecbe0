use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        admin::CommandResponse,
        sse::ServerEvent,
        ws::{BroadcastFrame, ClientMessage, ServerMessage},
    },
    error::ServiceError,
    services::{race_service, sse_service},
    state::SharedState,
};

/// Per-connection state.
#[derive(Debug)]
struct Session {
    id: Uuid,
    is_admin: bool,
}

/// Handle the full lifecycle of one client WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session {
        id: Uuid::new_v4(),
        is_admin: false,
    };
    info!(connection = %session.id, "websocket client connected");

    // Subscribe before building the initial snapshot so no event slips in between.
    let events = sse_service::subscribe(&state);
    match race_service::snapshot(&state).await {
        Ok(snapshot) => {
            if send_message_to_websocket(&outbound_tx, &ServerMessage::InitState { snapshot })
                .is_err()
            {
                finalize(writer_task, outbound_tx).await;
                return;
            }
        }
        Err(err) => {
            warn!(connection = %session.id, error = %err, "failed to build initial snapshot");
            let _ = send_message_to_websocket(
                &outbound_tx,
                &ServerMessage::Error {
                    request: None,
                    message: err.to_string(),
                },
            );
        }
    }

    let forwarder = spawn_forwarder(state.clone(), events, outbound_tx.clone());

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(connection = %session.id, payload = %text, "received client message");
                let reply = handle_text(&state, &mut session, &text).await;
                if send_message_to_websocket(&outbound_tx, &reply).is_err() {
                    break;
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(connection = %session.id, error = %err, "websocket error");
                break;
            }
        }
    }

    forwarder.abort();
    info!(connection = %session.id, "websocket client disconnected");
    finalize(writer_task, outbound_tx).await;
}

/// Forward every broadcast event to the connection, resending a full snapshot
/// when the subscriber lagged behind.
fn spawn_forwarder(
    state: SharedState,
    mut events: tokio::sync::broadcast::Receiver<ServerEvent>,
    tx: mpsc::UnboundedSender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "websocket subscriber lagged; resending snapshot");
                    match sse_service::snapshot_event(&state).await {
                        Some(snapshot) => snapshot,
                        None => continue,
                    }
                }
            };
            let frame = BroadcastFrame {
                kind: &event.event,
                payload: &event.payload,
            };
            if send_message_to_websocket(&tx, &frame).is_err() {
                break;
            }
        }
    })
}

/// Decode one text frame and produce the reply for it.
async fn handle_text(state: &SharedState, session: &mut Session, text: &str) -> ServerMessage {
    match ClientMessage::from_json_str(text) {
        Ok(message) => handle_message(state, session, message).await,
        Err(err) => {
            warn!(connection = %session.id, error = %err, "failed to parse or validate client message");
            ServerMessage::Error {
                request: None,
                message: err.to_string(),
            }
        }
    }
}

async fn handle_message(
    state: &SharedState,
    session: &mut Session,
    message: ClientMessage,
) -> ServerMessage {
    let request = message.name();

    if message.requires_admin() && !session.is_admin {
        warn!(connection = %session.id, request, "admin command refused before login");
        return ServerMessage::Error {
            request: Some(request.to_string()),
            message: ServiceError::Unauthorized("admin login required".into()).to_string(),
        };
    }

    match message {
        ClientMessage::Login { token } => {
            session.is_admin = token == state.config().admin_token();
            if session.is_admin {
                info!(connection = %session.id, "admin logged in");
            } else {
                warn!(connection = %session.id, "admin login rejected");
            }
            ServerMessage::LoginResult {
                success: session.is_admin,
            }
        }
        ClientMessage::PingCheck { sent_at } => ServerMessage::PongCheck { sent_at },
        command => match dispatch(state, command).await {
            Ok(response) => ServerMessage::CommandResult {
                request: request.to_string(),
                response,
            },
            Err(err) => ServerMessage::Error {
                request: Some(request.to_string()),
                message: err.to_string(),
            },
        },
    }
}

/// Route a race command to the race service.
async fn dispatch(
    state: &SharedState,
    message: ClientMessage,
) -> Result<CommandResponse, ServiceError> {
    match message {
        ClientMessage::CreateRace { group, request } => {
            race_service::create_race(state, group, request).await
        }
        ClientMessage::SelectRace { group, race_id } => {
            race_service::select_race(state, group, race_id).await
        }
        ClientMessage::StartRace { group, request } => {
            race_service::start_race(state, group, request).await
        }
        ClientMessage::PauseRace { group } => race_service::pause_race(state, group).await,
        ClientMessage::EndRace { group } => race_service::end_race(state, group).await,
        ClientMessage::RegisterLap { group, request } => {
            race_service::register_lap(state, group, request).await
        }
        ClientMessage::InjureStudent { group, request } => {
            race_service::injure_student(state, group, request).await
        }
        ClientMessage::ReassignStudent { group, request } => {
            race_service::reassign_student(state, group, request).await
        }
        ClientMessage::EditTime { group, request } => {
            race_service::edit_time(state, group, request).await
        }
        ClientMessage::RemoveLap { group, request } => {
            race_service::remove_lap(state, group, request).await
        }
        ClientMessage::Login { .. } | ClientMessage::PingCheck { .. } => Err(
            ServiceError::InvalidInput("not a race command".into()),
        ),
    }
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Serialization failures are logged and swallowed; `Err` means the writer is gone.
fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), ServiceError>
where
    T: ?Sized + serde::Serialize,
{
    let payload = match serde_json::to_string(value) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize websocket message");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| ServiceError::TaskFailed("websocket writer closed".into()))
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{config::AppConfig, dao::race_store::MemoryRaceStore, state::AppState};

    fn state() -> SharedState {
        AppState::new(
            AppConfig::default().with_admin_token("secret"),
            Arc::new(MemoryRaceStore::new()),
        )
    }

    fn session() -> Session {
        Session {
            id: Uuid::new_v4(),
            is_admin: false,
        }
    }

    async fn send(state: &SharedState, session: &mut Session, text: &str) -> serde_json::Value {
        serde_json::to_value(handle_text(state, session, text).await).unwrap()
    }

    #[tokio::test]
    async fn admin_commands_require_login() {
        let state = state();
        let mut session = session();

        let reply = send(&state, &mut session, r#"{"type": "create_race", "group": "minis", "laps": 2}"#).await;
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["request"], "create_race");
        assert_eq!(state.registry().active(&"minis".into()), None);

        let reply = send(&state, &mut session, r#"{"type": "login", "token": "wrong"}"#).await;
        assert_eq!(reply, serde_json::json!({"type": "login_result", "success": false}));

        let reply = send(&state, &mut session, r#"{"type": "login", "token": "secret"}"#).await;
        assert_eq!(reply["success"], true);

        let reply = send(&state, &mut session, r#"{"type": "create_race", "group": "minis", "laps": 2}"#).await;
        assert_eq!(reply["type"], "command_result");
        assert_eq!(reply["request"], "create_race");
        assert_eq!(reply["applied"], true);
        assert_eq!(reply["race"]["laps"], 2);
    }

    #[tokio::test]
    async fn operators_register_laps_without_login() {
        let state = state();
        let mut admin = session();
        admin.is_admin = true;
        send(&state, &mut admin, r#"{"type": "create_race", "group": "minis"}"#).await;
        send(&state, &mut admin, r#"{"type": "start_race", "group": "minis"}"#).await;

        let mut operator = session();
        let reply = send(
            &state,
            &mut operator,
            r#"{"type": "register_lap", "group": "minis", "student": "Ben", "time": 42.25}"#,
        )
        .await;
        assert_eq!(reply["applied"], true);
        assert_eq!(reply["race"]["finalTimes"]["Ben"], 42.25);
    }

    #[tokio::test]
    async fn malformed_and_failed_messages_report_errors() {
        let state = state();
        let mut session = session();

        let reply = send(&state, &mut session, "not json").await;
        assert_eq!(reply["type"], "error");
        assert!(reply.get("request").is_none());

        let reply = send(&state, &mut session, r#"{"type": "remove_lap", "group": "minis", "student": "Ben"}"#).await;
        assert_eq!(reply["type"], "error");
        assert!(reply["message"].as_str().unwrap().contains("no active race"));

        let reply = send(&state, &mut session, r#"{"type": "ping_check", "sentAt": 17}"#).await;
        assert_eq!(reply, serde_json::json!({"type": "pong_check", "sentAt": 17}));
    }
}
