//! Aktionen – Anfragen an die Manager-Schnittstelle
//!
//! Eine `Action` ist ein Frame mit `Action:`-Feld. Die Korrelations-ID
//! (`ActionID`) wird erst beim Absenden vergeben, entweder explizit durch
//! den Aufrufer oder durch den `ActionIdGenerator`.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::frame::{Frame, FELD_ACTION, FELD_ACTION_ID};

/// Eine ausgehende Anfrage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    name: String,
    felder: Vec<(String, String)>,
    action_id: Option<String>,
}

impl Action {
    /// Erstellt eine Aktion ohne weitere Felder
    pub fn neu(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            felder: Vec::new(),
            action_id: None,
        }
    }

    /// Haengt ein Feld an
    pub fn feld(mut self, name: impl Into<String>, wert: impl Into<String>) -> Self {
        self.felder.push((name.into(), wert.into()));
        self
    }

    /// Setzt eine feste Korrelations-ID statt einer generierten
    pub fn mit_action_id(mut self, id: impl Into<String>) -> Self {
        self.action_id = Some(id.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action_id(&self) -> Option<&str> {
        self.action_id.as_deref()
    }

    /// Anmeldung mit Benutzername und Secret
    ///
    /// `events` ist die Ereignismaske, z.B. "on", "off" oder "call,system".
    pub fn login(benutzer: &str, secret: &str, events: &str) -> Self {
        Self::neu("Login")
            .feld("Username", benutzer)
            .feld("Secret", secret)
            .feld("Events", events)
    }

    pub fn logoff() -> Self {
        Self::neu("Logoff")
    }

    pub fn ping() -> Self {
        Self::neu("Ping")
    }

    /// Listet alle aktiven Kanaele als Event-Liste
    pub fn core_show_channels() -> Self {
        Self::neu("CoreShowChannels")
    }

    /// Legt einen Kanal auf
    pub fn hangup(kanal: &str) -> Self {
        Self::neu("Hangup").feld("Channel", kanal)
    }

    /// Baut den Wire-Frame mit der gegebenen Korrelations-ID
    ///
    /// Ein eventuell manuell gesetztes `ActionID`-Feld in `felder` wird
    /// durch `action_id` ersetzt.
    pub fn in_frame(&self, action_id: &str) -> Frame {
        let mut frame = Frame::neu().mit_feld(FELD_ACTION, self.name.as_str());
        for (name, wert) in &self.felder {
            if name.eq_ignore_ascii_case(FELD_ACTION_ID) {
                continue;
            }
            frame.hinzufuegen(name.as_str(), wert.as_str());
        }
        frame.hinzufuegen(FELD_ACTION_ID, action_id);
        frame
    }
}

// ---------------------------------------------------------------------------
// ActionIdGenerator
// ---------------------------------------------------------------------------

/// Erzeugt fortlaufende, prozessweit eindeutige Korrelations-IDs
///
/// Format: `<praefix>-<zaehler>`. Der Praefix trennt IDs verschiedener
/// Client-Instanzen, falls mehrere dieselbe Anlage ansprechen.
#[derive(Debug)]
pub struct ActionIdGenerator {
    praefix: String,
    zaehler: AtomicU64,
}

impl ActionIdGenerator {
    /// Generator mit zufaelligem Praefix
    pub fn neu() -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self::mit_praefix(&uuid[..8])
    }

    pub fn mit_praefix(praefix: &str) -> Self {
        Self {
            praefix: praefix.to_string(),
            zaehler: AtomicU64::new(1),
        }
    }

    /// Naechste ID
    pub fn naechste(&self) -> String {
        let n = self.zaehler.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.praefix, n)
    }
}

impl Default for ActionIdGenerator {
    fn default() -> Self {
        Self::neu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_enthaelt_action_und_id_am_ende() {
        let frame = Action::ping().in_frame("42");
        assert_eq!(frame.felder()[0], ("Action".to_string(), "Ping".to_string()));
        assert_eq!(frame.felder().last().unwrap().1, "42");
        assert_eq!(frame.action_id(), Some("42"));
    }

    #[test]
    fn login_felder() {
        let frame = Action::login("admin", "geheim", "on").in_frame("x-1");
        assert_eq!(frame.get("Action"), Some("Login"));
        assert_eq!(frame.get("Username"), Some("admin"));
        assert_eq!(frame.get("Secret"), Some("geheim"));
        assert_eq!(frame.get("Events"), Some("on"));
    }

    #[test]
    fn manuelles_action_id_feld_wird_ersetzt() {
        let frame = Action::neu("Status")
            .feld("ActionID", "falsch")
            .in_frame("richtig");
        assert_eq!(frame.alle("ActionID").collect::<Vec<_>>(), vec!["richtig"]);
    }

    #[test]
    fn generator_ist_fortlaufend_und_eindeutig() {
        let generator = ActionIdGenerator::mit_praefix("swb");
        assert_eq!(generator.naechste(), "swb-1");
        assert_eq!(generator.naechste(), "swb-2");

        let a = ActionIdGenerator::neu();
        let b = ActionIdGenerator::neu();
        assert_ne!(a.naechste(), b.naechste());
    }
}
