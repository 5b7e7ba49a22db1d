//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use serde::{Deserialize, Serialize};
use switchboard_ami::AmiKonfig;
use switchboard_observability::logging::{log_format_gueltig, log_level_gueltig};
use switchboard_signaling::broadcast::SEND_QUEUE_GROESSE;

/// Umgebungsvariable mit dem Pfad zur Konfigurationsdatei
pub const ENV_CONFIG: &str = "SWITCHBOARD_CONFIG";
/// Umgebungsvariable die das Manager-Secret aus der Datei ueberschreibt
pub const ENV_AMI_SECRET: &str = "SWITCHBOARD_AMI_SECRET";

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Verbindung zur Manager-Schnittstelle der Anlage
    pub ami: AmiKonfig,
    /// HTTP-/WebSocket-Schnittstelle
    pub http: HttpEinstellungen,
    /// Live-Verteilung an Abonnenten
    pub broadcast: BroadcastEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// HTTP-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpEinstellungen {
    /// Bind-Adresse fuer HTTP und WebSocket
    pub bind_adresse: String,
    /// Port fuer HTTP und WebSocket
    pub port: u16,
    /// CORS-Origins (leer = alle erlaubt)
    pub cors_origins: Vec<String>,
}

impl Default for HttpEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 8000,
            cors_origins: vec![],
        }
    }
}

/// Einstellungen fuer die Live-Verteilung
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastEinstellungen {
    /// Send-Queue pro Abonnent; wer sie voll laufen laesst, wird entfernt
    pub queue_groesse: usize,
}

impl Default for BroadcastEinstellungen {
    fn default() -> Self {
        Self {
            queue_groesse: SEND_QUEUE_GROESSE,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    /// `SWITCHBOARD_AMI_SECRET` ueberschreibt das Secret aus der Datei.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let mut config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str::<Self>(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.secret_ueberschreiben(std::env::var(ENV_AMI_SECRET).ok());
        config.validieren()?;
        Ok(config)
    }

    /// Prueft Werte die serde nicht abfangen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        if !log_format_gueltig(&self.logging.format) {
            anyhow::bail!(
                "Ungueltiges Log-Format '{}' (erlaubt: text, json)",
                self.logging.format
            );
        }
        if !log_level_gueltig(&self.logging.level) {
            // Filter-Direktiven wie "switchboard_ami=debug" sind erlaubt
            tracing::debug!(level = %self.logging.level, "Log-Level wird als Filter interpretiert");
        }
        if !self.ami.backoff_jitter.is_finite() {
            anyhow::bail!("ami.backoff_jitter muss eine endliche Zahl sein");
        }
        if self.ami.backoff_initial_ms == 0 {
            anyhow::bail!("ami.backoff_initial_ms muss groesser als 0 sein");
        }
        if self.broadcast.queue_groesse == 0 {
            anyhow::bail!("broadcast.queue_groesse muss groesser als 0 sein");
        }
        Ok(())
    }

    /// Setzt das Manager-Secret, falls ein nicht-leerer Wert vorliegt
    pub fn secret_ueberschreiben(&mut self, secret: Option<String>) {
        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            self.ami.secret = secret;
        }
    }

    /// Gibt die Bind-Adresse fuer die HTTP-Schnittstelle zurueck
    pub fn http_bind_adresse(&self) -> String {
        format!("{}:{}", self.http.bind_adresse, self.http.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.ami.port, 5038);
        assert_eq!(cfg.http.port, 8000);
        assert_eq!(cfg.broadcast.queue_groesse, SEND_QUEUE_GROESSE);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.http_bind_adresse(), "0.0.0.0:8000");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [ami]
            host = "pbx.intern"
            username = "monitor"
            secret = "geheim"
            backoff_max_ms = 60000

            [http]
            port = 9000

            [logging]
            format = "json"
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.ami.host, "pbx.intern");
        assert_eq!(cfg.ami.username, "monitor");
        assert_eq!(cfg.ami.backoff_max_ms, 60_000);
        assert_eq!(cfg.http.port, 9000);
        assert_eq!(cfg.logging.format, "json");
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.ami.port, 5038);
        assert_eq!(cfg.ami.backoff_initial_ms, 1_000);
        assert_eq!(cfg.http.bind_adresse, "0.0.0.0");
    }

    #[test]
    fn secret_aus_umgebung_hat_vorrang() {
        let mut cfg: ServerConfig = toml::from_str("[ami]\nsecret = \"datei\"").unwrap();
        cfg.secret_ueberschreiben(None);
        assert_eq!(cfg.ami.secret, "datei");
        cfg.secret_ueberschreiben(Some(String::new()));
        assert_eq!(cfg.ami.secret, "datei");
        cfg.secret_ueberschreiben(Some("umgebung".into()));
        assert_eq!(cfg.ami.secret, "umgebung");
    }

    #[test]
    fn validierung_lehnt_ungueltige_werte_ab() {
        let mut cfg = ServerConfig::default();
        assert!(cfg.validieren().is_ok());

        cfg.logging.level = "switchboard_ami=debug".into();
        assert!(cfg.validieren().is_ok());

        cfg.logging.format = "xml".into();
        assert!(cfg.validieren().is_err());

        cfg.logging.format = "json".into();
        cfg.broadcast.queue_groesse = 0;
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.ami.backoff_jitter = f64::NAN;
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.ami.backoff_initial_ms = 0;
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/switchboard.toml").unwrap();
        assert_eq!(cfg.ami.host, "127.0.0.1");
    }
}
