//! Health-Check-Endpunkt fuer Switchboard
//!
//! Endpoint: `GET /api/health`
//! Response: JSON mit Status, Version, Uptime, Verbindungsstatus zur Anlage,
//! Anzahl aktiver Kanaele und Abonnenten

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::status::StatusQuelle;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    /// "connected" oder "disconnected"
    pub asterisk: String,
    pub active_channels: usize,
    pub subscribers: usize,
    pub timestamp: DateTime<Utc>,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    pub quelle: Arc<dyn StatusQuelle>,
}

impl HealthState {
    pub fn neu(quelle: Arc<dyn StatusQuelle>) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            quelle,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Baut die Antwort aus dem aktuellen Status
    pub fn antwort(&self) -> (StatusCode, HealthResponse) {
        let verbunden = self.quelle.pbx_verbunden();
        let status = if verbunden {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        // 200 auch bei degraded, der Prozess selbst laeuft
        let http_status = StatusCode::OK;

        let response = HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            asterisk: if verbunden { "connected" } else { "disconnected" }.to_string(),
            active_channels: self.quelle.aktive_kanaele(),
            subscribers: self.quelle.abonnenten(),
            timestamp: Utc::now(),
        };
        (http_status, response)
    }
}

/// Axum-Router fuer den `/api/health`-Endpunkt
pub fn health_router(quelle: Arc<dyn StatusQuelle>) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .with_state(HealthState::neu(quelle))
}

/// `GET /api/health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let (http_status, response) = state.antwort();
    (http_status, Json(response))
}
