//! Normalisierte Ereignisse fuer Live-Abonnenten
//!
//! Der Event-Interpreter uebersetzt rohe Manager-Frames in `PbxEvent`.
//! Unbekannte Ereignisarten werden als `Raw` weitergereicht, damit neuere
//! Anlagenversionen ohne Codeaenderung durchgereicht werden.
//!
//! Serialisiert wird mit `type`-Tag, z.B.:
//! ```json
//! {"type":"channel_hangup","channel":"SIP/100-1","cause":"16","cause_text":"Normal Clearing","timestamp":"..."}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ChannelState;

/// Alle Ereignisse die an Live-Abonnenten verteilt werden
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PbxEvent {
    /// Ein neuer Kanal wurde erzeugt
    ChannelCreated { channel: ChannelState },
    /// Zustand, Anrufer oder Ziel eines Kanals hat sich geaendert
    ChannelUpdated { channel: ChannelState },
    /// Ein Kanal wurde aufgelegt und aus der Tabelle entfernt
    ChannelHangup {
        channel: String,
        cause: Option<String>,
        cause_text: Option<String>,
    },
    /// Zwei Kanaele wurden zu einem Gespraech verbunden
    ChannelsLinked {
        channel: String,
        linked_channel: String,
    },
    /// Eine Verbindung zwischen zwei Kanaelen wurde aufgehoben
    ChannelsUnlinked {
        channel: String,
        linked_channel: Option<String>,
    },
    /// Ein Kanal wurde umbenannt
    ChannelRenamed { old_name: String, new_name: String },
    /// Registrierungsstatus eines Endgeraets hat sich geaendert
    PeerStatus {
        peer: String,
        status: String,
        address: Option<String>,
    },
    /// Registrierungsstatus eines Trunks hat sich geaendert
    Registry {
        channel_type: Option<String>,
        domain: Option<String>,
        username: Option<String>,
        status: String,
    },
    /// Die Anlage faehrt herunter
    PbxShutdown { restart: bool },
    /// Verbindung zur Manager-Schnittstelle wurde hergestellt oder getrennt
    ///
    /// `connected: false` bedeutet gleichzeitig: alle aktiven Kanaele verworfen.
    ConnectionStatus { connected: bool },
    /// Momentaufnahme aller aktiven Kanaele
    ActiveCalls { active_calls: Vec<ChannelState> },
    /// Unbekannte Ereignisart, unveraendert weitergereicht
    Raw {
        event: String,
        fields: serde_json::Value,
    },
}

impl PbxEvent {
    /// Kurzname des Ereignisses fuer Logs
    pub fn art(&self) -> &'static str {
        match self {
            Self::ChannelCreated { .. } => "channel_created",
            Self::ChannelUpdated { .. } => "channel_updated",
            Self::ChannelHangup { .. } => "channel_hangup",
            Self::ChannelsLinked { .. } => "channels_linked",
            Self::ChannelsUnlinked { .. } => "channels_unlinked",
            Self::ChannelRenamed { .. } => "channel_renamed",
            Self::PeerStatus { .. } => "peer_status",
            Self::Registry { .. } => "registry",
            Self::PbxShutdown { .. } => "pbx_shutdown",
            Self::ConnectionStatus { .. } => "connection_status",
            Self::ActiveCalls { .. } => "active_calls",
            Self::Raw { .. } => "raw",
        }
    }
}

/// Ein Ereignis mit Zeitstempel, so wie es an Abonnenten geht
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(flatten)]
    pub event: PbxEvent,
    pub timestamp: DateTime<Utc>,
}

impl EventPayload {
    /// Versieht ein Ereignis mit dem aktuellen Zeitstempel
    pub fn neu(event: PbxEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }
}
