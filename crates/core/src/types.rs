//! Gemeinsame Domaenentypen fuer Switchboard
//!
//! `ChannelState` beschreibt ein aktives Gespraechsbein der Telefonanlage,
//! `SubscriberId` identifiziert einen Live-Abonnenten im Broadcaster.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige ID eines Live-Abonnenten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub Uuid);

impl SubscriberId {
    /// Erstellt eine neue zufaellige SubscriberId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// CallStatus
// ---------------------------------------------------------------------------

/// Grober Gespraechsstatus, abgeleitet aus der Zustandsbeschreibung der Anlage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Connected,
    Ringing,
    Dialing,
    Busy,
    Down,
    Unknown,
}

impl CallStatus {
    /// Leitet den Status aus einer Zustandsbeschreibung wie "Up" oder "Ring" ab
    pub fn aus_beschreibung(beschreibung: &str) -> Self {
        match beschreibung.trim().to_ascii_lowercase().as_str() {
            "up" => Self::Connected,
            "ring" | "ringing" => Self::Ringing,
            "dialing" | "dialing offhook" | "pre-ring" => Self::Dialing,
            "busy" => Self::Busy,
            "down" | "rsrvd" | "offhook" => Self::Down,
            _ => Self::Unknown,
        }
    }
}

/// Uebersetzt den numerischen Kanalzustand (0-9) in die Textbeschreibung
///
/// Aeltere Anlagen senden teilweise nur den Code.
pub fn zustand_aus_code(code: &str) -> Option<&'static str> {
    let beschreibung = match code.trim().parse::<u8>().ok()? {
        0 => "Down",
        1 => "Rsrvd",
        2 => "OffHook",
        3 => "Dialing",
        4 => "Ring",
        5 => "Ringing",
        6 => "Up",
        7 => "Busy",
        8 => "Dialing Offhook",
        9 => "Pre-ring",
        _ => return None,
    };
    Some(beschreibung)
}

// ---------------------------------------------------------------------------
// ChannelState
// ---------------------------------------------------------------------------

/// Ein aktives Gespraechsbein (Kanal) der Telefonanlage
///
/// Schluessel in der Kanal-Tabelle ist `channel`. `linked_channel` zeigt
/// entweder auf einen anderen lebenden Eintrag oder ist `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelState {
    /// Kanalname, z.B. "SIP/100-00000001"
    pub channel: String,
    /// Eindeutige ID der Anlage (Uniqueid)
    pub unique_id: Option<String>,
    /// Rufnummer des Anrufers
    pub caller_id_num: Option<String>,
    /// Anzeigename des Anrufers
    pub caller_id_name: Option<String>,
    /// Gewaehltes Ziel (Extension oder Dial-String)
    pub destination: Option<String>,
    /// Zustandsbeschreibung wie von der Anlage gemeldet ("Down", "Ring", "Up", ...)
    pub state: String,
    /// Abgeleiteter Gespraechsstatus
    pub status: CallStatus,
    /// Das andere Bein eines verbundenen Gespraechs
    pub linked_channel: Option<String>,
    /// Zeitpunkt der Kanalerzeugung
    pub start_time: DateTime<Utc>,
}

impl ChannelState {
    /// Erstellt einen neuen Kanal im Zustand "Down"
    pub fn neu(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            unique_id: None,
            caller_id_num: None,
            caller_id_name: None,
            destination: None,
            state: "Down".to_string(),
            status: CallStatus::Down,
            linked_channel: None,
            start_time: Utc::now(),
        }
    }

    /// Setzt die Zustandsbeschreibung und aktualisiert den abgeleiteten Status
    pub fn zustand_setzen(&mut self, beschreibung: impl Into<String>) {
        self.state = beschreibung.into();
        self.status = CallStatus::aus_beschreibung(&self.state);
    }

    /// Anzeige des Anrufers im Format `Name <Nummer>`
    pub fn anrufer(&self) -> String {
        match (self.caller_id_name.as_deref(), self.caller_id_num.as_deref()) {
            (Some(name), Some(nummer)) if name != nummer => format!("{name} <{nummer}>"),
            (_, Some(nummer)) => nummer.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => String::new(),
        }
    }
}
