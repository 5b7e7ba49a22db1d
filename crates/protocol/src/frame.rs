//! Frame – eine Protokolleinheit der Manager-Schnittstelle
//!
//! Ein Frame ist eine geordnete Liste von `Name: Wert`-Feldern. Gleichnamige
//! Felder (z.B. mehrfaches `Variable:`) bleiben in Reihenfolge erhalten.
//! Die Suche nach Feldnamen ignoriert Gross-/Kleinschreibung.

use serde_json::{Map, Value};

/// Feldname der Aktion in Anfragen
pub const FELD_ACTION: &str = "Action";
/// Feldname fuer die Korrelations-ID
pub const FELD_ACTION_ID: &str = "ActionID";
/// Feldname des Status in Antworten
pub const FELD_RESPONSE: &str = "Response";
/// Feldname der Ereignisart
pub const FELD_EVENT: &str = "Event";
/// Feldname fuer Event-Listen ("start" / "Complete")
pub const FELD_EVENT_LIST: &str = "EventList";
/// Feldname der Klartextmeldung
pub const FELD_MESSAGE: &str = "Message";

/// Art eines eingehenden Frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameArt {
    /// Antwort auf eine Aktion (hat `Response:`)
    Antwort,
    /// Unaufgefordertes Ereignis (hat `Event:`)
    Ereignis,
    /// Weder noch – wird verworfen
    Unbekannt,
}

/// Eine geordnete Menge von Feldern, abgeschlossen durch eine Leerzeile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    felder: Vec<(String, String)>,
}

impl Frame {
    /// Erstellt einen leeren Frame
    pub fn neu() -> Self {
        Self::default()
    }

    /// Builder-Variante von `hinzufuegen`
    pub fn mit_feld(mut self, name: impl Into<String>, wert: impl Into<String>) -> Self {
        self.hinzufuegen(name, wert);
        self
    }

    /// Haengt ein Feld an (bestehende gleichnamige Felder bleiben erhalten)
    pub fn hinzufuegen(&mut self, name: impl Into<String>, wert: impl Into<String>) {
        self.felder.push((name.into(), wert.into()));
    }

    /// Ersetzt alle Felder dieses Namens durch genau einen Wert
    pub fn setzen(&mut self, name: &str, wert: impl Into<String>) {
        self.felder.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.felder.push((name.to_string(), wert.into()));
    }

    /// Erster Wert eines Feldes
    pub fn get(&self, name: &str) -> Option<&str> {
        self.felder
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, w)| w.as_str())
    }

    /// Alle Werte eines Feldes in Eingangsreihenfolge
    pub fn alle<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.felder
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, w)| w.as_str())
    }

    /// Alle Felder in Eingangsreihenfolge
    pub fn felder(&self) -> &[(String, String)] {
        &self.felder
    }

    pub fn len(&self) -> usize {
        self.felder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.felder.is_empty()
    }

    /// Klassifiziert den Frame als Antwort, Ereignis oder unbekannt
    pub fn art(&self) -> FrameArt {
        if self.get(FELD_RESPONSE).is_some() {
            FrameArt::Antwort
        } else if self.get(FELD_EVENT).is_some() {
            FrameArt::Ereignis
        } else {
            FrameArt::Unbekannt
        }
    }

    pub fn action_id(&self) -> Option<&str> {
        self.get(FELD_ACTION_ID)
    }

    /// Ereignisart, z.B. "Newchannel"
    pub fn ereignis(&self) -> Option<&str> {
        self.get(FELD_EVENT)
    }

    /// Antwortstatus, z.B. "Success" oder "Error"
    pub fn status(&self) -> Option<&str> {
        self.get(FELD_RESPONSE)
    }

    /// `true` wenn der Antwortstatus "Success" ist
    pub fn ist_erfolg(&self) -> bool {
        self.status()
            .is_some_and(|s| s.eq_ignore_ascii_case("Success"))
    }

    pub fn nachricht(&self) -> Option<&str> {
        self.get(FELD_MESSAGE)
    }

    /// `true` wenn eine Antwort den Beginn einer Event-Liste ankuendigt
    pub fn startet_liste(&self) -> bool {
        self.get(FELD_EVENT_LIST)
            .is_some_and(|s| s.eq_ignore_ascii_case("start"))
    }

    /// `true` wenn ein Ereignis eine Event-Liste abschliesst
    pub fn beendet_liste(&self) -> bool {
        self.get(FELD_EVENT_LIST)
            .is_some_and(|s| s.eq_ignore_ascii_case("Complete"))
    }

    /// JSON-Objekt der Felder; mehrfach vorkommende Namen werden zu Arrays
    pub fn als_json(&self) -> Value {
        let mut objekt = Map::new();
        for (name, wert) in &self.felder {
            match objekt.get_mut(name) {
                None => {
                    objekt.insert(name.clone(), Value::String(wert.clone()));
                }
                Some(Value::Array(werte)) => werte.push(Value::String(wert.clone())),
                Some(vorhanden) => {
                    let erster = vorhanden.take();
                    *vorhanden = Value::Array(vec![erster, Value::String(wert.clone())]);
                }
            }
        }
        Value::Object(objekt)
    }
}

impl<K, V> FromIterator<(K, V)> for Frame
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            felder: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
