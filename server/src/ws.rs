//! WebSocket-Abonnenten
//!
//! Jede Verbindung auf `/ws` wird als Abonnent beim `EventBroadcaster`
//! registriert. Ablauf pro Verbindung:
//!
//! ```text
//! Upgrade -> abonnieren -> {"type":"connection"} -> active_calls-Snapshot
//!         -> jede Payload als Text-Nachricht -> entfernen
//! ```

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use switchboard_ami::AmiClient;
use switchboard_core::{EventPayload, PbxEvent};

use crate::http::AppState;

/// `GET /ws` – Upgrade auf eine Live-Verbindung
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| abonnent_bedienen(socket, state.client))
}

/// Begruessung direkt nach dem Upgrade
pub fn begruessung() -> String {
    serde_json::json!({
        "type": "connection",
        "status": "connected",
        "timestamp": Utc::now(),
    })
    .to_string()
}

/// Serialisiert eine Payload als Text-Nachricht
pub fn als_nachricht(payload: &EventPayload) -> Option<Message> {
    match serde_json::to_string(payload) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            tracing::warn!(fehler = %e, event = payload.event.art(), "Payload nicht serialisierbar");
            None
        }
    }
}

async fn abonnent_bedienen(mut socket: WebSocket, client: AmiClient) {
    let broadcaster = client.broadcaster().clone();
    // Erst registrieren, dann Snapshot: kein Ereignis faellt dazwischen durch
    let (id, mut rx) = broadcaster.abonnieren();
    tracing::info!(subscriber = %id, "WebSocket-Abonnent verbunden");

    let snapshot = EventPayload::neu(PbxEvent::ActiveCalls {
        active_calls: client.aktive_kanaele(),
    });
    let mut bereit = socket.send(Message::Text(begruessung())).await.is_ok();
    if bereit {
        if let Some(nachricht) = als_nachricht(&snapshot) {
            bereit = socket.send(nachricht).await.is_ok();
        }
    }

    while bereit {
        tokio::select! {
            payload = rx.recv() => {
                // None: vom Broadcaster entfernt
                let Some(payload) = payload else { break };
                let Some(nachricht) = als_nachricht(&payload) else { continue };
                if let Err(e) = socket.send(nachricht).await {
                    tracing::debug!(subscriber = %id, fehler = %e, "Senden fehlgeschlagen");
                    break;
                }
            }
            eingang = socket.recv() => match eingang {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(subscriber = %id, fehler = %e, "WebSocket-Fehler");
                    break;
                }
            },
        }
    }

    broadcaster.entfernen(&id);
    tracing::info!(subscriber = %id, "WebSocket-Abonnent getrennt");
}
