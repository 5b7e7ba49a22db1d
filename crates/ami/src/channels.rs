//! Aktive Kanaele – Live-Abbild der Gespraechsbeine der Anlage
//!
//! Einziger Schreiber ist der Event-Interpreter im Lese-Task der Sitzung;
//! alle Mutationen sind deshalb `pub(crate)`. Leser (HTTP, neue Abonnenten)
//! erhalten ueber `snapshot()` eine Kopie.
//!
//! ## Invarianten
//! - Nach einem verarbeiteten Hangup ist der Kanal nicht mehr enthalten
//! - `linked_channel` zeigt nur auf lebende Eintraege; Entfernen oder
//!   Umbenennen eines Kanals bereinigt alle Rueckverweise

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use switchboard_core::ChannelState;

/// Geteilte Tabelle der aktiven Kanaele
///
/// Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct ChannelTable {
    inner: Arc<RwLock<KanalMap>>,
}

#[derive(Default)]
struct KanalMap {
    /// Kanaele nach Kanalname
    kanaele: HashMap<String, ChannelState>,
    /// Bridge-ID -> Mitglieder in Eintrittsreihenfolge
    bruecken: HashMap<String, Vec<String>>,
}

impl KanalMap {
    /// Setzt den Verweis von `kanal` zurueck und den des Partners, falls er zurueckzeigt
    fn verweis_loesen(&mut self, kanal: &str) -> Option<String> {
        let partner = self.kanaele.get_mut(kanal)?.linked_channel.take()?;
        if let Some(p) = self.kanaele.get_mut(&partner) {
            if p.linked_channel.as_deref() == Some(kanal) {
                p.linked_channel = None;
            }
        }
        Some(partner)
    }

    fn verknuepfen(&mut self, a: &str, b: &str) -> bool {
        if a == b || !self.kanaele.contains_key(a) || !self.kanaele.contains_key(b) {
            return false;
        }
        // Alte Verbindungen beider Seiten aufloesen
        self.verweis_loesen(a);
        self.verweis_loesen(b);
        if let Some(k) = self.kanaele.get_mut(a) {
            k.linked_channel = Some(b.to_string());
        }
        if let Some(k) = self.kanaele.get_mut(b) {
            k.linked_channel = Some(a.to_string());
        }
        true
    }

    fn entfernen(&mut self, kanal: &str) -> Option<ChannelState> {
        self.verweis_loesen(kanal);
        self.aus_bruecken_entfernen(kanal);
        let entfernt = self.kanaele.remove(kanal)?;
        for anderer in self.kanaele.values_mut() {
            if anderer.linked_channel.as_deref() == Some(kanal) {
                anderer.linked_channel = None;
            }
        }
        Some(entfernt)
    }

    fn aus_bruecken_entfernen(&mut self, kanal: &str) {
        for mitglieder in self.bruecken.values_mut() {
            mitglieder.retain(|m| m != kanal);
        }
        self.bruecken.retain(|_, mitglieder| !mitglieder.is_empty());
    }
}

impl ChannelTable {
    /// Erstellt eine leere Tabelle
    pub fn neu() -> Self {
        Self::default()
    }

    /// Momentaufnahme aller Kanaele, sortiert nach Startzeit und Name
    pub fn snapshot(&self) -> Vec<ChannelState> {
        let mut kanaele: Vec<ChannelState> = self.inner.read().kanaele.values().cloned().collect();
        kanaele.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.channel.cmp(&b.channel))
        });
        kanaele
    }

    /// Kopie eines einzelnen Kanals
    pub fn get(&self, kanal: &str) -> Option<ChannelState> {
        self.inner.read().kanaele.get(kanal).cloned()
    }

    pub fn enthaelt(&self, kanal: &str) -> bool {
        self.inner.read().kanaele.contains_key(kanal)
    }

    pub fn anzahl(&self) -> usize {
        self.inner.read().kanaele.len()
    }

    // -----------------------------------------------------------------------
    // Mutationen (nur Event-Interpreter / Sitzungsende)
    // -----------------------------------------------------------------------

    /// Legt einen Kanal an oder ersetzt einen gleichnamigen
    ///
    /// Ein bestehender Verweis des alten Eintrags wird aufgeloest.
    pub(crate) fn einfuegen(&self, kanal: ChannelState) -> ChannelState {
        let mut map = self.inner.write();
        map.verweis_loesen(&kanal.channel);
        let mut kanal = kanal;
        kanal.linked_channel = None;
        map.kanaele.insert(kanal.channel.clone(), kanal.clone());
        kanal
    }

    /// Aendert einen Kanal; legt ihn mit `ChannelState::neu` an falls unbekannt
    pub(crate) fn aktualisieren<F>(&self, kanal: &str, aendern: F) -> ChannelState
    where
        F: FnOnce(&mut ChannelState),
    {
        let mut map = self.inner.write();
        let eintrag = map
            .kanaele
            .entry(kanal.to_string())
            .or_insert_with(|| ChannelState::neu(kanal));
        let verweis_vorher = eintrag.linked_channel.clone();
        aendern(eintrag);
        // Verweise werden nur ueber verknuepfen/trennen gesetzt
        eintrag.linked_channel = verweis_vorher;
        eintrag.clone()
    }

    /// Entfernt einen Kanal samt aller Rueckverweise und Bridge-Mitgliedschaften
    pub(crate) fn entfernen(&self, kanal: &str) -> Option<ChannelState> {
        self.inner.write().entfernen(kanal)
    }

    /// Verbindet zwei lebende Kanaele gegenseitig
    ///
    /// Gibt `false` zurueck wenn einer der beiden unbekannt ist.
    pub(crate) fn verknuepfen(&self, a: &str, b: &str) -> bool {
        self.inner.write().verknuepfen(a, b)
    }

    /// Loest die Verbindung eines Kanals; gibt den bisherigen Partner zurueck
    pub(crate) fn trennen(&self, kanal: &str) -> Option<String> {
        self.inner.write().verweis_loesen(kanal)
    }

    /// Kanal tritt einer Bridge bei
    ///
    /// Ist bereits ein anderes Mitglied vorhanden, werden beide verknuepft
    /// und der Partner zurueckgegeben.
    pub(crate) fn bruecke_betreten(&self, bruecke: &str, kanal: &str) -> Option<String> {
        let mut map = self.inner.write();
        if !map.kanaele.contains_key(kanal) {
            return None;
        }
        map.aus_bruecken_entfernen(kanal);
        let mitglieder = map.bruecken.entry(bruecke.to_string()).or_default();
        let partner = mitglieder.iter().find(|m| m.as_str() != kanal).cloned();
        mitglieder.push(kanal.to_string());

        let partner = partner?;
        map.verknuepfen(kanal, &partner).then_some(partner)
    }

    /// Kanal verlaesst eine Bridge; gibt den bisherigen Partner zurueck
    pub(crate) fn bruecke_verlassen(&self, bruecke: &str, kanal: &str) -> Option<String> {
        let mut map = self.inner.write();
        if let Some(mitglieder) = map.bruecken.get_mut(bruecke) {
            mitglieder.retain(|m| m != kanal);
            if mitglieder.is_empty() {
                map.bruecken.remove(bruecke);
            }
        }
        map.verweis_loesen(kanal)
    }

    /// Benennt einen Kanal um und schreibt alle Verweise nach
    pub(crate) fn umbenennen(&self, alt: &str, neu: &str) -> Option<ChannelState> {
        let mut map = self.inner.write();
        if alt == neu || !map.kanaele.contains_key(alt) {
            return map.kanaele.get(alt).cloned();
        }
        // Ein bereits vorhandener Eintrag unter dem neuen Namen wird ersetzt
        map.entfernen(neu);
        let mut kanal = map.kanaele.remove(alt)?;
        kanal.channel = neu.to_string();
        for anderer in map.kanaele.values_mut() {
            if anderer.linked_channel.as_deref() == Some(alt) {
                anderer.linked_channel = Some(neu.to_string());
            }
        }
        for mitglieder in map.bruecken.values_mut() {
            for m in mitglieder.iter_mut().filter(|m| m.as_str() == alt) {
                *m = neu.to_string();
            }
        }
        map.kanaele.insert(neu.to_string(), kanal.clone());
        Some(kanal)
    }

    /// Verwirft alle Kanaele und Bridges
    pub(crate) fn leeren(&self) -> usize {
        let mut map = self.inner.write();
        let anzahl = map.kanaele.len();
        map.kanaele.clear();
        map.bruecken.clear();
        anzahl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tabelle_mit(kanaele: &[&str]) -> ChannelTable {
        let tabelle = ChannelTable::neu();
        for k in kanaele {
            tabelle.einfuegen(ChannelState::neu(*k));
        }
        tabelle
    }

    /// Jeder Verweis zeigt auf einen lebenden Eintrag, der zurueckzeigt
    fn verweise_konsistent(tabelle: &ChannelTable) {
        let snapshot = tabelle.snapshot();
        for kanal in &snapshot {
            if let Some(partner) = &kanal.linked_channel {
                let p = tabelle.get(partner).expect("Verweis auf toten Kanal");
                assert_eq!(p.linked_channel.as_deref(), Some(kanal.channel.as_str()));
            }
        }
    }

    #[test]
    fn einfuegen_und_entfernen() {
        let tabelle = tabelle_mit(&["SIP/100-1"]);
        assert!(tabelle.enthaelt("SIP/100-1"));
        assert!(tabelle.entfernen("SIP/100-1").is_some());
        assert!(!tabelle.enthaelt("SIP/100-1"));
        assert!(tabelle.entfernen("SIP/100-1").is_none());
    }

    #[test]
    fn entfernen_loescht_rueckverweis() {
        let tabelle = tabelle_mit(&["A", "B"]);
        assert!(tabelle.verknuepfen("A", "B"));
        assert_eq!(tabelle.get("B").unwrap().linked_channel.as_deref(), Some("A"));

        tabelle.entfernen("A");
        assert!(tabelle.get("B").unwrap().linked_channel.is_none());
        verweise_konsistent(&tabelle);
    }

    #[test]
    fn verknuepfen_mit_unbekanntem_kanal_schlaegt_fehl() {
        let tabelle = tabelle_mit(&["A"]);
        assert!(!tabelle.verknuepfen("A", "X"));
        assert!(tabelle.get("A").unwrap().linked_channel.is_none());
    }

    #[test]
    fn neu_verknuepfen_loest_alte_verbindung() {
        let tabelle = tabelle_mit(&["A", "B", "C"]);
        tabelle.verknuepfen("A", "B");
        tabelle.verknuepfen("A", "C");
        assert!(tabelle.get("B").unwrap().linked_channel.is_none());
        assert_eq!(tabelle.get("C").unwrap().linked_channel.as_deref(), Some("A"));
        verweise_konsistent(&tabelle);
    }

    #[test]
    fn aktualisieren_legt_unbekannten_kanal_an_und_behaelt_verweis() {
        let tabelle = tabelle_mit(&["A", "B"]);
        tabelle.verknuepfen("A", "B");
        let kanal = tabelle.aktualisieren("A", |k| {
            k.zustand_setzen("Up");
            k.linked_channel = None;
        });
        assert_eq!(kanal.state, "Up");
        assert_eq!(kanal.linked_channel.as_deref(), Some("B"));

        let neu = tabelle.aktualisieren("C", |k| k.zustand_setzen("Ring"));
        assert_eq!(neu.channel, "C");
        assert!(tabelle.enthaelt("C"));
    }

    #[test]
    fn bruecke_verknuepft_zweites_mitglied() {
        let tabelle = tabelle_mit(&["A", "B"]);
        assert_eq!(tabelle.bruecke_betreten("br-1", "A"), None);
        assert_eq!(tabelle.bruecke_betreten("br-1", "B").as_deref(), Some("A"));
        assert_eq!(tabelle.get("A").unwrap().linked_channel.as_deref(), Some("B"));

        assert_eq!(tabelle.bruecke_verlassen("br-1", "B").as_deref(), Some("A"));
        assert!(tabelle.get("A").unwrap().linked_channel.is_none());
        verweise_konsistent(&tabelle);
    }

    #[test]
    fn umbenennen_schreibt_verweise_nach() {
        let tabelle = tabelle_mit(&["A", "B"]);
        tabelle.verknuepfen("A", "B");
        let kanal = tabelle.umbenennen("A", "A<ZOMBIE>").unwrap();
        assert_eq!(kanal.channel, "A<ZOMBIE>");
        assert!(!tabelle.enthaelt("A"));
        assert_eq!(
            tabelle.get("B").unwrap().linked_channel.as_deref(),
            Some("A<ZOMBIE>")
        );
        verweise_konsistent(&tabelle);
    }

    #[test]
    fn leeren_verwirft_alles() {
        let tabelle = tabelle_mit(&["A", "B", "C"]);
        tabelle.bruecke_betreten("br", "A");
        assert_eq!(tabelle.leeren(), 3);
        assert_eq!(tabelle.anzahl(), 0);
        assert!(tabelle.snapshot().is_empty());
    }

    #[test]
    fn snapshot_ist_nach_startzeit_sortiert() {
        let tabelle = ChannelTable::neu();
        let mut spaet = ChannelState::neu("Z");
        spaet.start_time = chrono::Utc::now();
        let mut frueh = ChannelState::neu("Y");
        frueh.start_time = spaet.start_time - chrono::Duration::seconds(10);
        tabelle.einfuegen(spaet);
        tabelle.einfuegen(frueh);

        let namen: Vec<String> = tabelle.snapshot().into_iter().map(|k| k.channel).collect();
        assert_eq!(namen, vec!["Y", "Z"]);
    }
}
