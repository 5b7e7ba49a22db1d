//! Fehlertypen fuer den Broadcaster

use thiserror::Error;

/// Zustellung an einen einzelnen Abonnenten fehlgeschlagen
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZustellFehler {
    /// Send-Queue voll (Abonnent liest nicht schnell genug)
    #[error("Send-Queue voll")]
    QueueVoll,

    /// Gegenseite hat die Verbindung geschlossen
    #[error("Abonnent getrennt")]
    Geschlossen,

    /// Abonnent meldet sich selbst als nicht mehr gesund
    #[error("Abonnent nicht gesund")]
    Ungesund,
}

/// Result-Alias fuer Zustellungen
pub type SignalingResult<T> = std::result::Result<T, ZustellFehler>;
