//! Fehlertypen fuer den Manager-Client
//!
//! Jeder Fehlerpfad endet in genau einer dieser Varianten. Nichts davon
//! darf den Prozess beenden: Verbindungs- und Anmeldefehler behandelt der
//! Supervisor selbst, alles andere geht typisiert an den Aufrufer.

use std::time::Duration;
use thiserror::Error;

/// Fehlertyp fuer den Manager-Client
#[derive(Debug, Error)]
pub enum AmiError {
    /// Socket- oder DNS-Fehler beim Verbindungsaufbau
    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(#[from] std::io::Error),

    /// Anmeldung abgelehnt (falsche Zugangsdaten oder Anlage startet neu)
    #[error("Anmeldung abgelehnt: {0}")]
    Anmeldung(String),

    /// Antwort kam nicht rechtzeitig
    #[error("Zeitlimit ueberschritten nach {0:?}")]
    Zeitlimit(Duration),

    /// Sitzung wurde beendet bevor eine Antwort kam
    #[error("Verbindung getrennt")]
    Getrennt,

    /// Eingehender Frame war nicht auswertbar
    #[error("Ungueltiger Frame: {0}")]
    UngueltigerFrame(String),

    /// Aufruferfehler, z.B. doppelte ActionID
    #[error("Ungueltige Aktion: {0}")]
    UngueltigeAktion(String),

    /// Supervisor wurde fuer diesen Client bereits gestartet
    #[error("Supervisor laeuft bereits")]
    BereitsGestartet,
}

impl AmiError {
    /// Gibt true zurueck wenn der Supervisor nach diesem Fehler neu verbinden soll
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(
            self,
            Self::Verbindung(_) | Self::Anmeldung(_) | Self::Zeitlimit(_) | Self::Getrennt
        )
    }
}

/// Result-Typ fuer den Manager-Client
pub type AmiResult<T> = Result<T, AmiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = AmiError::Anmeldung("Authentication failed".into());
        assert_eq!(e.to_string(), "Anmeldung abgelehnt: Authentication failed");
    }

    #[test]
    fn wiederholbar_erkennung() {
        assert!(AmiError::Getrennt.ist_wiederholbar());
        assert!(AmiError::Anmeldung("x".into()).ist_wiederholbar());
        assert!(AmiError::Zeitlimit(Duration::from_secs(1)).ist_wiederholbar());
        assert!(!AmiError::UngueltigeAktion("x".into()).ist_wiederholbar());
        assert!(!AmiError::BereitsGestartet.ist_wiederholbar());
    }

    #[test]
    fn io_fehler_wird_verbindungsfehler() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let e: AmiError = io.into();
        assert!(matches!(e, AmiError::Verbindung(_)));
    }
}
