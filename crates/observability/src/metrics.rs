//! Prometheus-kompatible Metriken fuer Switchboard
//!
//! Registrierte Metriken:
//! - `switchboard_ami_connected` – Gauge: 1 wenn die Sitzung zur Anlage live ist
//! - `switchboard_active_channels` – Gauge: Aktive Kanaele
//! - `switchboard_subscribers` – Gauge: Registrierte Live-Abonnenten
//! - `switchboard_ami_frames_total` – Counter: Empfangene Frames
//! - `switchboard_ami_events_total` – Counter: Interpretierte Ereignisse
//! - `switchboard_ami_dropped_frames_total` – Counter: Verworfene Frames
//! - `switchboard_ami_dropped_lines_total` – Counter: Vom Codec verworfene Zeilen
//! - `switchboard_ami_connect_attempts_total` – Counter: Verbindungsversuche
//! - `switchboard_ami_sessions_total` – Counter: Sitzungen die live gingen
//! - `switchboard_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `switchboard_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit
//!
//! Status-Gauges und Client-Zaehler werden bei jedem Scrape aus der
//! `StatusQuelle` uebernommen.

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use crate::status::StatusQuelle;

/// Alle Switchboard-Prometheus-Metriken
#[derive(Clone)]
pub struct SwitchboardMetrics {
    pub registry: Arc<Registry>,

    // Status
    pub ami_connected: IntGauge,
    pub active_channels: IntGauge,
    pub subscribers: IntGauge,

    // Client-Zaehler
    pub frames_total: IntCounter,
    pub events_total: IntCounter,
    pub dropped_frames_total: IntCounter,
    pub dropped_lines_total: IntCounter,
    pub connect_attempts_total: IntCounter,
    pub sessions_total: IntCounter,

    // HTTP-Metriken
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

fn gauge(registry: &Registry, name: &str, hilfe: &str) -> Result<IntGauge> {
    let gauge = IntGauge::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn zaehler(registry: &Registry, name: &str, hilfe: &str) -> Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

/// Zieht einen monotonen Zaehler auf den Stand der Quelle nach
fn nachziehen(counter: &IntCounter, stand: u64) {
    let differenz = stand.saturating_sub(counter.get());
    if differenz > 0 {
        counter.inc_by(differenz);
    }
}

impl SwitchboardMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Status ---
        let ami_connected = gauge(
            &registry,
            "switchboard_ami_connected",
            "1 wenn die Sitzung zur Manager-Schnittstelle live ist",
        )?;
        let active_channels = gauge(
            &registry,
            "switchboard_active_channels",
            "Anzahl aktiver Kanaele der Anlage",
        )?;
        let subscribers = gauge(
            &registry,
            "switchboard_subscribers",
            "Anzahl registrierter Live-Abonnenten",
        )?;

        // --- Client-Zaehler ---
        let frames_total = zaehler(
            &registry,
            "switchboard_ami_frames_total",
            "Empfangene Frames der Manager-Schnittstelle",
        )?;
        let events_total = zaehler(
            &registry,
            "switchboard_ami_events_total",
            "Interpretierte Ereignisse",
        )?;
        let dropped_frames_total = zaehler(
            &registry,
            "switchboard_ami_dropped_frames_total",
            "Verworfene, nicht auswertbare Frames",
        )?;
        let dropped_lines_total = zaehler(
            &registry,
            "switchboard_ami_dropped_lines_total",
            "Verworfene Zeilen ohne Doppelpunkt oder ueber der Maximallaenge",
        )?;
        let connect_attempts_total = zaehler(
            &registry,
            "switchboard_ami_connect_attempts_total",
            "Verbindungsversuche zur Anlage",
        )?;
        let sessions_total = zaehler(
            &registry,
            "switchboard_ami_sessions_total",
            "Sitzungen die den Live-Zustand erreicht haben",
        )?;

        // --- HTTP-Metriken ---
        let http_requests_total = IntCounterVec::new(
            Opts::new(
                "switchboard_http_requests_total",
                "Gesamtanzahl HTTP-Anfragen",
            ),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "switchboard_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            ami_connected,
            active_channels,
            subscribers,
            frames_total,
            events_total,
            dropped_frames_total,
            dropped_lines_total,
            connect_attempts_total,
            sessions_total,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Uebernimmt Status und Zaehlerstaende aus der Quelle
    pub fn aktualisieren(&self, quelle: &dyn StatusQuelle) {
        self.ami_connected.set(i64::from(quelle.pbx_verbunden()));
        self.active_channels.set(quelle.aktive_kanaele() as i64);
        self.subscribers.set(quelle.abonnenten() as i64);

        let k = quelle.kennzahlen();
        nachziehen(&self.frames_total, k.frames_empfangen);
        nachziehen(&self.events_total, k.ereignisse);
        nachziehen(&self.dropped_frames_total, k.verworfene_frames);
        nachziehen(&self.dropped_lines_total, k.verworfene_zeilen);
        nachziehen(&self.connect_attempts_total, k.verbindungsversuche);
        nachziehen(&self.sessions_total, k.sitzungen);
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[derive(Clone)]
struct MetrikState {
    metriken: SwitchboardMetrics,
    quelle: Arc<dyn StatusQuelle>,
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: SwitchboardMetrics, quelle: Arc<dyn StatusQuelle>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(MetrikState { metriken, quelle })
}

async fn metrics_handler(State(state): State<MetrikState>) -> impl IntoResponse {
    state.metriken.aktualisieren(state.quelle.as_ref());
    match state.metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
