//! switchboard-core – Gemeinsame Typen und Ereignisse
//!
//! Dieses Crate stellt die Bausteine bereit, die zwischen Manager-Client,
//! Broadcaster und HTTP-Oberflaeche geteilt werden.

pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use event::{EventPayload, PbxEvent};
pub use types::{CallStatus, ChannelState, SubscriberId};
