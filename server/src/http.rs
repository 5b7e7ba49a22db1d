//! HTTP-Schnittstelle des Servers
//!
//! Routen:
//! - `GET /api/health` – Health-Check (observability)
//! - `GET /api/calls/active` – aktive Kanaele als Momentaufnahme
//! - `GET /metrics` – Prometheus-Export (observability)
//! - `GET /ws` – Live-Abonnement per WebSocket

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, Method};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::{middleware, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use switchboard_ami::AmiClient;
use switchboard_core::ChannelState;
use switchboard_observability::{
    health_router, metrics_router, request_timing_layer, timing_middleware, Kennzahlen,
    StatusQuelle, SwitchboardMetrics,
};
use tower_http::cors::CorsLayer;

use crate::ws::ws_handler;

/// Geteilter Zustand der Handler
#[derive(Clone)]
pub struct AppState {
    pub client: AmiClient,
}

// ---------------------------------------------------------------------------
// Statusquelle
// ---------------------------------------------------------------------------

/// Stellt den Laufzeitstatus des Clients fuer Health und Metriken bereit
pub struct ClientStatus {
    client: AmiClient,
}

impl ClientStatus {
    pub fn neu(client: AmiClient) -> Self {
        Self { client }
    }
}

impl StatusQuelle for ClientStatus {
    fn pbx_verbunden(&self) -> bool {
        self.client.ist_verbunden()
    }

    fn aktive_kanaele(&self) -> usize {
        self.client.anzahl_kanaele()
    }

    fn abonnenten(&self) -> usize {
        self.client.broadcaster().anzahl()
    }

    fn kennzahlen(&self) -> Kennzahlen {
        let s = self.client.statistik();
        Kennzahlen {
            frames_empfangen: s.frames_empfangen,
            ereignisse: s.ereignisse,
            verworfene_frames: s.verworfene_frames,
            verworfene_zeilen: s.verworfene_zeilen,
            verbindungsversuche: s.verbindungsversuche,
            sitzungen: s.sitzungen,
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Baut den vollstaendigen Router
///
/// Leere `cors_origins` erlauben alle Origins.
pub fn router(client: AmiClient, metriken: SwitchboardMetrics, cors_origins: &[String]) -> Router {
    let quelle: Arc<dyn StatusQuelle> = Arc::new(ClientStatus::neu(client.clone()));

    let cors = if cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers(tower_http::cors::Any)
    };

    Router::new()
        .route("/api/calls/active", get(aktive_anrufe))
        .route("/ws", get(ws_handler))
        .with_state(AppState { client })
        .merge(health_router(Arc::clone(&quelle)))
        .merge(metrics_router(metriken.clone(), quelle))
        // Route-Layer: MatchedPath ist hier bereits gesetzt
        .route_layer(middleware::from_fn_with_state(metriken, timing_middleware))
        .layer(request_timing_layer())
        .layer(cors)
}

/// Antwort von `GET /api/calls/active`
#[derive(Debug, Serialize)]
pub struct AktiveAnrufe {
    pub calls: Vec<ChannelState>,
    pub count: usize,
    pub timestamp: DateTime<Utc>,
}

impl AktiveAnrufe {
    pub fn aus_kanaelen(calls: Vec<ChannelState>) -> Self {
        Self {
            count: calls.len(),
            calls,
            timestamp: Utc::now(),
        }
    }
}

/// `GET /api/calls/active` – Momentaufnahme der Kanaltabelle
async fn aktive_anrufe(State(state): State<AppState>) -> impl IntoResponse {
    Json(AktiveAnrufe::aus_kanaelen(state.client.aktive_kanaele()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use switchboard_ami::AmiKonfig;
    use switchboard_signaling::EventBroadcaster;
    use tower::ServiceExt;

    fn app() -> (Router, AmiClient) {
        let client = AmiClient::neu(AmiKonfig::default(), EventBroadcaster::neu());
        let metriken = SwitchboardMetrics::neu().unwrap();
        (router(client.clone(), metriken, &[]), client)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn aktive_anrufe_leer_solange_getrennt() {
        let (app, _client) = app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/calls/active")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["count"], 0);
        assert_eq!(json["calls"], serde_json::json!([]));
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn health_meldet_getrennte_anlage() {
        let (app, _client) = app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["asterisk"], "disconnected");
        assert_eq!(json["active_channels"], 0);
    }

    #[tokio::test]
    async fn metriken_zaehlen_http_anfragen() {
        let client = AmiClient::neu(AmiKonfig::default(), EventBroadcaster::neu());
        let metriken = SwitchboardMetrics::neu().unwrap();
        let app = router(client, metriken.clone(), &["http://localhost:3000".into()]);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("switchboard_ami_connected 0"));
        assert_eq!(
            metriken
                .http_requests_total
                .with_label_values(&["GET", "/metrics", "200"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn unbekannte_route_liefert_404() {
        let (app, _client) = app();
        let response = app
            .oneshot(Request::builder().uri("/gibt/es/nicht").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn status_quelle_spiegelt_client() {
        let client = AmiClient::neu(AmiKonfig::default(), EventBroadcaster::neu());
        let (_id, _rx) = client.broadcaster().abonnieren();
        let quelle = ClientStatus::neu(client);
        assert!(!quelle.pbx_verbunden());
        assert_eq!(quelle.aktive_kanaele(), 0);
        assert_eq!(quelle.abonnenten(), 1);
        assert_eq!(quelle.kennzahlen(), Kennzahlen::default());
    }
}
