//! Konfiguration des Manager-Clients
//!
//! Wird als Abschnitt `[ami]` aus der Server-Konfiguration gelesen. Alle
//! Felder haben Standardwerte; Zeiten sind in Millisekunden angegeben.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backoff::Backoff;

/// Verbindungs- und Zeitparameter fuer die Manager-Schnittstelle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmiKonfig {
    /// Hostname oder IP der Anlage
    pub host: String,
    /// TCP-Port der Manager-Schnittstelle
    pub port: u16,
    /// Manager-Benutzer
    pub username: String,
    /// Manager-Secret
    pub secret: String,
    /// Ereignismaske fuer den Login ("on", "off", "call,system", ...)
    pub events: String,
    /// Zeitlimit fuer den TCP-Verbindungsaufbau
    pub connect_timeout_ms: u64,
    /// Zeitlimit fuer Begruessung und Login-Antwort
    pub login_timeout_ms: u64,
    /// Standard-Zeitlimit fuer Aktionen
    pub action_timeout_ms: u64,
    /// Abstand der Keepalive-Pings
    pub keepalive_ms: u64,
    /// Ohne eingehenden Frame in dieser Zeit gilt die Sitzung als tot
    pub lese_timeout_ms: u64,
    /// Erste Wartezeit vor einem Neuverbindungsversuch
    pub backoff_initial_ms: u64,
    /// Obergrenze der Wartezeit
    pub backoff_max_ms: u64,
    /// Relativer Zufallsanteil der Wartezeit (0.0 bis 1.0)
    pub backoff_jitter: f64,
    /// Nach jedem Login die aktiven Kanaele per CoreShowChannels laden
    pub kanaele_beim_start_laden: bool,
}

impl Default for AmiKonfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5038,
            username: "admin".into(),
            secret: String::new(),
            events: "on".into(),
            connect_timeout_ms: 5_000,
            login_timeout_ms: 5_000,
            action_timeout_ms: 5_000,
            keepalive_ms: 20_000,
            lese_timeout_ms: 60_000,
            backoff_initial_ms: 1_000,
            backoff_max_ms: 30_000,
            backoff_jitter: 0.2,
            kanaele_beim_start_laden: true,
        }
    }
}

impl AmiKonfig {
    /// `host:port` fuer den Verbindungsaufbau
    pub fn adresse(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_millis(self.keepalive_ms.max(1))
    }

    pub fn lese_timeout(&self) -> Duration {
        Duration::from_millis(self.lese_timeout_ms.max(1))
    }

    /// Backoff-Zustand nach diesen Parametern
    pub fn backoff(&self) -> Backoff {
        Backoff::neu(
            Duration::from_millis(self.backoff_initial_ms),
            Duration::from_millis(self.backoff_max_ms),
            self.backoff_jitter,
        )
    }
}
