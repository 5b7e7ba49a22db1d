//! Statusquelle fuer Health-Check und Metriken
//!
//! Die Observability-Crate kennt den Manager-Client nicht. Der Server
//! implementiert `StatusQuelle` und reicht sie an die Router weiter.

use serde::Serialize;

/// Zaehlerstaende des Manager-Clients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Kennzahlen {
    pub frames_empfangen: u64,
    pub ereignisse: u64,
    pub verworfene_frames: u64,
    pub verworfene_zeilen: u64,
    pub verbindungsversuche: u64,
    pub sitzungen: u64,
}

/// Lesender Zugriff auf den Laufzeitstatus
pub trait StatusQuelle: Send + Sync + 'static {
    /// `true` nur waehrend die Sitzung zur Anlage live ist
    fn pbx_verbunden(&self) -> bool;

    /// Anzahl der aktuell bekannten Kanaele
    fn aktive_kanaele(&self) -> usize;

    /// Anzahl der registrierten Live-Abonnenten
    fn abonnenten(&self) -> usize;

    fn kennzahlen(&self) -> Kennzahlen {
        Kennzahlen::default()
    }
}
