//! switchboard-protocol – Frame-Format der Manager-Schnittstelle
//!
//! - `frame`: geordnete Feldliste mit case-insensitiver Suche
//! - `action`: ausgehende Anfragen und Korrelations-IDs
//! - `wire`: tokio-util Codec fuer das zeilenbasierte Wire-Format

pub mod action;
pub mod frame;
pub mod wire;

pub use action::{Action, ActionIdGenerator};
pub use frame::{Frame, FrameArt};
pub use wire::AmiCodec;
