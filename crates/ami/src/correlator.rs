//! Zuordnung von Antworten zu ausstehenden Aktionen
//!
//! Jede gesendete Aktion bekommt einen Eintrag mit einem Einmal-Slot
//! (`oneshot`). Die Antwort mit gleicher ActionID fuellt den Slot; bei
//! Sitzungsende werden alle Slots mit `Getrennt` gefuellt. Ein Slot wird
//! genau einmal gefuellt: Zuordnung, Zeitlimit und Trennung entfernen den
//! Eintrag jeweils unter demselben Lock.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;
use switchboard_protocol::Frame;
use tokio::sync::oneshot;

use crate::error::{AmiError, AmiResult};

/// Antwort einer Aktion samt zugehoeriger Event-Liste
///
/// Bei einfachen Aktionen ist `ereignisse` leer.
#[derive(Debug, Clone)]
pub struct ListenAntwort {
    pub antwort: Frame,
    pub ereignisse: Vec<Frame>,
}

/// Empfangsseite eines ausstehenden Slots
pub(crate) type AntwortEmpfaenger = oneshot::Receiver<AmiResult<ListenAntwort>>;

struct Ausstehend {
    gesendet_um: Instant,
    slot: oneshot::Sender<AmiResult<ListenAntwort>>,
    /// Aktion antwortet mit einer Event-Liste
    ist_liste: bool,
    /// Bereits erhaltene Antwort einer laufenden Liste
    antwort: Option<Frame>,
    ereignisse: Vec<Frame>,
}

impl Ausstehend {
    fn erfuellen(self, id: &str, ergebnis: AmiResult<ListenAntwort>) {
        tracing::trace!(
            action_id = %id,
            dauer_ms = self.gesendet_um.elapsed().as_millis() as u64,
            "Aktion abgeschlossen"
        );
        if self.slot.send(ergebnis).is_err() {
            tracing::debug!(action_id = %id, "Aufrufer wartet nicht mehr");
        }
    }
}

#[derive(Default)]
struct CorrelatorInner {
    /// `false` zwischen Sitzungsende und naechstem Live-Zustand
    offen: bool,
    ausstehend: HashMap<String, Ausstehend>,
}

/// Tabelle der ausstehenden Aktionen einer Client-Instanz
#[derive(Default)]
pub struct Correlator {
    inner: Mutex<CorrelatorInner>,
}

impl Correlator {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Nimmt Registrierungen wieder an (Sitzung ist live)
    pub(crate) fn oeffnen(&self) {
        self.inner.lock().offen = true;
    }

    /// Legt einen Eintrag fuer `id` an
    ///
    /// Schlaegt mit `Getrennt` fehl wenn keine Sitzung live ist und mit
    /// `UngueltigeAktion` wenn die ID bereits aussteht.
    pub(crate) fn registrieren(&self, id: &str, ist_liste: bool) -> AmiResult<AntwortEmpfaenger> {
        let mut inner = self.inner.lock();
        if !inner.offen {
            return Err(AmiError::Getrennt);
        }
        if inner.ausstehend.contains_key(id) {
            return Err(AmiError::UngueltigeAktion(format!(
                "ActionID {id} steht bereits aus"
            )));
        }
        let (slot, rx) = oneshot::channel();
        inner.ausstehend.insert(
            id.to_string(),
            Ausstehend {
                gesendet_um: Instant::now(),
                slot,
                ist_liste,
                antwort: None,
                ereignisse: Vec::new(),
            },
        );
        Ok(rx)
    }

    /// Ordnet eine Antwort ihrer Aktion zu
    ///
    /// Antworten ohne oder mit unbekannter ActionID werden verworfen.
    /// Gibt `true` zurueck wenn die Antwort zugeordnet wurde.
    pub(crate) fn antwort_zustellen(&self, antwort: Frame) -> bool {
        let Some(id) = antwort.action_id().map(str::to_owned) else {
            tracing::debug!(status = ?antwort.status(), "Antwort ohne ActionID verworfen");
            return false;
        };

        let mut inner = self.inner.lock();
        let Some(eintrag) = inner.ausstehend.get_mut(&id) else {
            tracing::debug!(action_id = %id, "Antwort mit unbekannter ActionID verworfen");
            return false;
        };

        // Erfolgreiche Listenantwort: auf die Ereignisse warten
        if eintrag.ist_liste && antwort.ist_erfolg() && antwort.startet_liste() {
            eintrag.antwort = Some(antwort);
            return true;
        }

        if let Some(eintrag) = inner.ausstehend.remove(&id) {
            drop(inner);
            eintrag.erfuellen(
                &id,
                Ok(ListenAntwort {
                    antwort,
                    ereignisse: Vec::new(),
                }),
            );
        }
        true
    }

    /// Haengt ein Ereignis mit ActionID an die laufende Liste an
    ///
    /// Das Ereignis mit `EventList: Complete` schliesst die Liste ab.
    /// Gibt `true` zurueck wenn das Ereignis zu einer ausstehenden Aktion gehoerte.
    pub(crate) fn listen_ereignis_zustellen(&self, ereignis: Frame) -> bool {
        let Some(id) = ereignis.action_id().map(str::to_owned) else {
            return false;
        };

        let mut inner = self.inner.lock();
        let Some(eintrag) = inner.ausstehend.get_mut(&id) else {
            return false;
        };
        if !eintrag.ist_liste {
            return false;
        }

        if !ereignis.beendet_liste() {
            eintrag.ereignisse.push(ereignis);
            return true;
        }

        if let Some(mut eintrag) = inner.ausstehend.remove(&id) {
            drop(inner);
            let ereignisse = std::mem::take(&mut eintrag.ereignisse);
            // Abschluss ohne vorherige Antwort: Abschluss-Ereignis als Antwort
            let antwort = eintrag.antwort.take().unwrap_or(ereignis);
            eintrag.erfuellen(&id, Ok(ListenAntwort { antwort, ereignisse }));
        }
        true
    }

    /// Entfernt einen Eintrag ohne ihn zu erfuellen (Zeitlimit, Sendefehler)
    pub(crate) fn entfernen(&self, id: &str) -> bool {
        self.inner.lock().ausstehend.remove(id).is_some()
    }

    /// Erfuellt alle ausstehenden Aktionen mit `Getrennt` und schliesst die Tabelle
    pub(crate) fn alle_trennen(&self) -> usize {
        let ausstehend: Vec<(String, Ausstehend)> = {
            let mut inner = self.inner.lock();
            inner.offen = false;
            inner.ausstehend.drain().collect()
        };
        let anzahl = ausstehend.len();
        for (id, eintrag) in ausstehend {
            eintrag.erfuellen(&id, Err(AmiError::Getrennt));
        }
        if anzahl > 0 {
            tracing::info!(anzahl, "Ausstehende Aktionen mit Getrennt beendet");
        }
        anzahl
    }

    /// Anzahl der aktuell ausstehenden Aktionen
    pub fn anzahl_ausstehend(&self) -> usize {
        self.inner.lock().ausstehend.len()
    }
}
