//! switchboard-ami – Client fuer die Manager-Schnittstelle der Telefonanlage
//!
//! Stellt bereit:
//! - `AmiClient`: geteilter Handle fuer Aktionen und Abfragen
//! - `Supervisor`: Verbindungsaufbau, Login, Neuverbindung mit Backoff
//! - `ChannelTable`: Live-Abbild der aktiven Kanaele
//! - `EventInterpreter`: Manager-Ereignisse -> `PbxEvent`
//! - `Correlator`: Zuordnung Antwort -> Aktion per ActionID

pub mod backoff;
pub mod channels;
pub mod client;
pub mod config;
pub mod correlator;
pub mod error;
pub mod interpreter;
mod session;
pub mod supervisor;

pub use backoff::Backoff;
pub use channels::ChannelTable;
pub use client::{AmiClient, StatistikSnapshot};
pub use config::AmiKonfig;
pub use correlator::{Correlator, ListenAntwort};
pub use error::{AmiError, AmiResult};
pub use interpreter::EventInterpreter;
pub use supervisor::{Supervisor, VerbindungsZustand};

// Haeufig zusammen genutzte Typen der Nachbar-Crates
pub use switchboard_protocol::{Action, Frame};
