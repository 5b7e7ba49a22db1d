//! switchboard-server – Bibliotheks-Root
//!
//! Verdrahtet Manager-Client, Supervisor, Broadcaster und HTTP-Oberflaeche
//! und stellt den Einstiegspunkt fuer Integrationstests bereit.

pub mod config;
pub mod http;
pub mod ws;

use anyhow::Result;
use config::ServerConfig;
use switchboard_ami::{AmiClient, Supervisor};
use switchboard_observability::SwitchboardMetrics;
use switchboard_signaling::EventBroadcaster;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Broadcaster und Manager-Client erzeugen
    /// 2. Supervisor starten (verbindet im Hintergrund)
    /// 3. HTTP/WebSocket-Listener starten
    /// 4. Auf Ctrl-C warten, dann Supervisor stoppen
    pub async fn starten(self) -> Result<()> {
        let bind_adresse = self.config.http_bind_adresse();
        tracing::info!(
            ami = %format!("{}:{}", self.config.ami.host, self.config.ami.port),
            http = %bind_adresse,
            "Server startet"
        );

        let broadcaster = EventBroadcaster::mit_queue_groesse(self.config.broadcast.queue_groesse);
        let client = AmiClient::neu(self.config.ami.clone(), broadcaster);
        let metriken = SwitchboardMetrics::neu()?;
        let supervisor = Supervisor::starten(client.clone())?;

        let app = http::router(client, metriken, &self.config.http.cors_origins);
        let listener = tokio::net::TcpListener::bind(&bind_adresse).await?;
        tracing::info!(adresse = %bind_adresse, "HTTP-Schnittstelle bereit");

        let ergebnis = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        tracing::info!("Server wird beendet");
        supervisor.stoppen().await;
        ergebnis?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(fehler = %e, "Ctrl-C-Handler konnte nicht installiert werden");
        return;
    }
    tracing::info!("Shutdown-Signal empfangen");
}
