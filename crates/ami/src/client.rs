//! AmiClient – Geteilter Handle auf eine Manager-Verbindung
//!
//! Der Client wird explizit erzeugt und an alle Aufrufer weitergegeben
//! (HTTP-Handler, Supervisor, Tests). Clone ist billig und teilt den Zustand.
//!
//! ```text
//! AmiClient::neu(konfig, broadcaster)
//!     -> Supervisor::starten(client.clone())
//!     -> client.senden(Action::ping()).await
//!     -> supervisor.stoppen().await
//! ```

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::{ChannelState, PbxEvent};
use switchboard_protocol::{Action, ActionIdGenerator, Frame};
use switchboard_signaling::EventBroadcaster;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::channels::ChannelTable;
use crate::config::AmiKonfig;
use crate::correlator::{Correlator, ListenAntwort};
use crate::error::{AmiError, AmiResult};
use crate::interpreter::EventInterpreter;
use crate::supervisor::VerbindungsZustand;

/// Kapazitaet der Ausgangs-Queue zur Sitzung
pub(crate) const AUSGANG_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// Statistik
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct Zaehler {
    pub(crate) frames_empfangen: AtomicU64,
    pub(crate) ereignisse: AtomicU64,
    pub(crate) verworfene_frames: AtomicU64,
    pub(crate) verworfene_zeilen: AtomicU64,
    pub(crate) verbindungsversuche: AtomicU64,
    pub(crate) sitzungen: AtomicU64,
}

impl Zaehler {
    pub(crate) fn erhoehen(zaehler: &AtomicU64) {
        zaehler.fetch_add(1, Ordering::Relaxed);
    }
}

/// Momentaufnahme der Zaehler eines Clients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatistikSnapshot {
    /// Alle empfangenen Frames (Antworten und Ereignisse)
    pub frames_empfangen: u64,
    /// Interpretierte Ereignisse
    pub ereignisse: u64,
    /// Nicht klassifizierbare oder unvollstaendige Frames
    pub verworfene_frames: u64,
    /// Vom Codec verworfene Zeilen (ohne Doppelpunkt oder zu lang)
    pub verworfene_zeilen: u64,
    /// Gestartete Verbindungsversuche
    pub verbindungsversuche: u64,
    /// Sitzungen die den Live-Zustand erreicht haben
    pub sitzungen: u64,
}

// ---------------------------------------------------------------------------
// AmiClient
// ---------------------------------------------------------------------------

/// Handle auf die Manager-Verbindung
#[derive(Clone)]
pub struct AmiClient {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) konfig: AmiKonfig,
    pub(crate) correlator: Correlator,
    pub(crate) interpreter: EventInterpreter,
    /// Sender zur laufenden Sitzung; `None` wenn nicht live
    pub(crate) ausgang: Mutex<Option<mpsc::Sender<Frame>>>,
    pub(crate) zustand_tx: watch::Sender<VerbindungsZustand>,
    pub(crate) ids: ActionIdGenerator,
    pub(crate) statistik: Zaehler,
    /// Verhindert einen zweiten Supervisor fuer denselben Client
    pub(crate) gestartet: AtomicBool,
}

impl AmiClient {
    /// Erstellt einen getrennten Client
    ///
    /// Ereignisse gehen an `broadcaster`. Die Verbindung baut erst der
    /// Supervisor auf.
    pub fn neu(konfig: AmiKonfig, broadcaster: EventBroadcaster) -> Self {
        let (zustand_tx, _) = watch::channel(VerbindungsZustand::Getrennt);
        Self {
            inner: Arc::new(ClientInner {
                konfig,
                correlator: Correlator::neu(),
                interpreter: EventInterpreter::neu(ChannelTable::neu(), broadcaster),
                ausgang: Mutex::new(None),
                zustand_tx,
                ids: ActionIdGenerator::neu(),
                statistik: Zaehler::default(),
                gestartet: AtomicBool::new(false),
            }),
        }
    }

    pub fn konfig(&self) -> &AmiKonfig {
        &self.inner.konfig
    }

    /// Sendet eine Aktion und wartet auf ihre Antwort (Standard-Zeitlimit)
    pub async fn senden(&self, action: Action) -> AmiResult<Frame> {
        self.senden_mit_timeout(action, self.inner.konfig.action_timeout())
            .await
    }

    /// Sendet eine Aktion und wartet hoechstens `zeitlimit` auf ihre Antwort
    ///
    /// Liefert genau eines von: Antwort, `Zeitlimit`, `Getrennt`. Eine
    /// Antwort mit `Response: Error` ist kein Fehler dieser Methode.
    pub async fn senden_mit_timeout(&self, action: Action, zeitlimit: Duration) -> AmiResult<Frame> {
        self.ausfuehren(action, false, zeitlimit)
            .await
            .map(|ergebnis| ergebnis.antwort)
    }

    /// Sendet eine Aktion die mit einer Event-Liste antwortet
    ///
    /// Sammelt alle Ereignisse mit gleicher ActionID bis `EventList: Complete`.
    pub async fn liste_abfragen(&self, action: Action) -> AmiResult<ListenAntwort> {
        self.ausfuehren(action, true, self.inner.konfig.action_timeout())
            .await
    }

    async fn ausfuehren(
        &self,
        action: Action,
        ist_liste: bool,
        zeitlimit: Duration,
    ) -> AmiResult<ListenAntwort> {
        let ausgang = self
            .inner
            .ausgang
            .lock()
            .clone()
            .ok_or(AmiError::Getrennt)?;

        let id = match action.action_id() {
            Some(id) => id.to_string(),
            None => self.inner.ids.naechste(),
        };
        let empfaenger = self.inner.correlator.registrieren(&id, ist_liste)?;

        // Das Zeitlimit gilt ab hier fuer Einreihen und Antwort zusammen
        let frist = Instant::now() + zeitlimit;

        tracing::debug!(action = %action.name(), action_id = %id, "Sende Aktion");
        match tokio::time::timeout_at(frist, ausgang.send(action.in_frame(&id))).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                // Sitzung endete zwischen Lookup und Senden
                self.inner.correlator.entfernen(&id);
                return Err(AmiError::Getrennt);
            }
            Err(_) => return Err(self.zeitlimit_ueberschritten(&action, &id, zeitlimit)),
        }

        match tokio::time::timeout_at(frist, empfaenger).await {
            Ok(Ok(ergebnis)) => ergebnis,
            Ok(Err(_)) => Err(AmiError::Getrennt),
            Err(_) => Err(self.zeitlimit_ueberschritten(&action, &id, zeitlimit)),
        }
    }

    fn zeitlimit_ueberschritten(&self, action: &Action, id: &str, zeitlimit: Duration) -> AmiError {
        self.inner.correlator.entfernen(id);
        tracing::warn!(
            action = %action.name(),
            action_id = %id,
            zeitlimit_ms = zeitlimit.as_millis() as u64,
            "Keine Antwort innerhalb des Zeitlimits"
        );
        AmiError::Zeitlimit(zeitlimit)
    }

    /// Momentaufnahme der aktiven Kanaele
    ///
    /// Sortiert nach Startzeit; leer solange keine Sitzung live ist.
    pub fn aktive_kanaele(&self) -> Vec<ChannelState> {
        self.inner.interpreter.kanaele().snapshot()
    }

    pub fn anzahl_kanaele(&self) -> usize {
        self.inner.interpreter.kanaele().anzahl()
    }

    /// `true` nur im Zustand `Live`
    pub fn ist_verbunden(&self) -> bool {
        *self.inner.zustand_tx.borrow() == VerbindungsZustand::Live
    }

    pub fn zustand(&self) -> VerbindungsZustand {
        *self.inner.zustand_tx.borrow()
    }

    /// Empfaenger fuer Zustandswechsel (Health-Checks, Tests)
    pub fn zustand_beobachten(&self) -> watch::Receiver<VerbindungsZustand> {
        self.inner.zustand_tx.subscribe()
    }

    /// Anzahl der Aktionen die noch auf eine Antwort warten
    pub fn ausstehende_aktionen(&self) -> usize {
        self.inner.correlator.anzahl_ausstehend()
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        self.inner.interpreter.broadcaster()
    }

    pub fn statistik(&self) -> StatistikSnapshot {
        let z = &self.inner.statistik;
        StatistikSnapshot {
            frames_empfangen: z.frames_empfangen.load(Ordering::Relaxed),
            ereignisse: z.ereignisse.load(Ordering::Relaxed),
            verworfene_frames: z.verworfene_frames.load(Ordering::Relaxed),
            verworfene_zeilen: z.verworfene_zeilen.load(Ordering::Relaxed),
            verbindungsversuche: z.verbindungsversuche.load(Ordering::Relaxed),
            sitzungen: z.sitzungen.load(Ordering::Relaxed),
        }
    }

    // -----------------------------------------------------------------------
    // Sitzungsverwaltung (Supervisor / Sitzung)
    // -----------------------------------------------------------------------

    pub(crate) fn zustand_setzen(&self, zustand: VerbindungsZustand) {
        let vorher = self.inner.zustand_tx.send_replace(zustand);
        if vorher != zustand {
            tracing::debug!(von = ?vorher, nach = ?zustand, "Zustandswechsel");
        }
    }

    pub(crate) fn naechste_action_id(&self) -> String {
        self.inner.ids.naechste()
    }

    /// Schaltet den Client live: Ausgangs-Queue, Correlator, Zustand, Abonnenten
    pub(crate) fn sitzung_beginnen(&self) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel(AUSGANG_QUEUE_GROESSE);
        self.inner.correlator.oeffnen();
        *self.inner.ausgang.lock() = Some(tx);
        Zaehler::erhoehen(&self.inner.statistik.sitzungen);
        self.zustand_setzen(VerbindungsZustand::Live);
        self.broadcaster()
            .an_alle_senden(PbxEvent::ConnectionStatus { connected: true });
        rx
    }

    /// Raeumt nach einer Sitzung auf
    ///
    /// Danach ist nichts mehr ausstehend und die Kanal-Tabelle leer.
    pub(crate) fn sitzung_beenden(&self) {
        self.inner.ausgang.lock().take();
        if self.zustand() != VerbindungsZustand::Gestoppt {
            self.zustand_setzen(VerbindungsZustand::Getrennt);
        }
        let verworfen = self.inner.interpreter.kanaele().leeren();
        let abgebrochen = self.inner.correlator.alle_trennen();
        self.broadcaster()
            .an_alle_senden(PbxEvent::ConnectionStatus { connected: false });
        tracing::info!(abgebrochen, verworfen, "Sitzung beendet");
    }

    /// Laedt die aktiven Kanaele per CoreShowChannels und verteilt eine Momentaufnahme
    pub(crate) async fn kanaele_laden(&self) {
        match self.liste_abfragen(Action::core_show_channels()).await {
            Ok(ergebnis) if ergebnis.antwort.ist_erfolg() => {
                let active_calls = self.aktive_kanaele();
                tracing::info!(
                    kanaele = active_calls.len(),
                    "Aktive Kanaele geladen"
                );
                self.broadcaster()
                    .an_alle_senden(PbxEvent::ActiveCalls { active_calls });
            }
            Ok(ergebnis) => {
                tracing::warn!(
                    nachricht = ?ergebnis.antwort.nachricht(),
                    "CoreShowChannels abgelehnt"
                );
            }
            Err(e) => {
                tracing::warn!(fehler = %e, "Aktive Kanaele konnten nicht geladen werden");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AmiClient {
        AmiClient::neu(AmiKonfig::default(), EventBroadcaster::neu())
    }

    #[tokio::test]
    async fn senden_ohne_sitzung_ist_getrennt() {
        let client = client();
        assert!(!client.ist_verbunden());
        assert!(matches!(
            client.senden(Action::ping()).await,
            Err(AmiError::Getrennt)
        ));
        assert_eq!(client.ausstehende_aktionen(), 0);
    }

    #[tokio::test]
    async fn antwort_wird_zugeordnet() {
        let client = client();
        let mut ausgang = client.sitzung_beginnen();
        assert!(client.ist_verbunden());

        let c = client.clone();
        let anfrage = tokio::spawn(async move {
            c.senden(Action::ping().mit_action_id("42")).await
        });

        let gesendet = ausgang.recv().await.unwrap();
        assert_eq!(gesendet.get("Action"), Some("Ping"));
        assert_eq!(gesendet.action_id(), Some("42"));

        client.inner.correlator.antwort_zustellen(
            Frame::neu()
                .mit_feld("Response", "Success")
                .mit_feld("ActionID", "42"),
        );
        let antwort = anfrage.await.unwrap().unwrap();
        assert!(antwort.ist_erfolg());
    }

    #[tokio::test]
    async fn zeitlimit_entfernt_eintrag() {
        let client = client();
        let _ausgang = client.sitzung_beginnen();

        let ergebnis = client
            .senden_mit_timeout(Action::ping(), Duration::from_millis(20))
            .await;
        assert!(matches!(ergebnis, Err(AmiError::Zeitlimit(_))));
        assert_eq!(client.ausstehende_aktionen(), 0);
    }

    #[tokio::test]
    async fn sitzungsende_beendet_ausstehende_mit_getrennt() {
        let client = client();
        let mut ausgang = client.sitzung_beginnen();

        let c = client.clone();
        let anfrage = tokio::spawn(async move { c.senden(Action::ping().mit_action_id("7")).await });
        ausgang.recv().await.unwrap();

        client.sitzung_beenden();
        assert!(matches!(anfrage.await.unwrap(), Err(AmiError::Getrennt)));
        assert_eq!(client.zustand(), VerbindungsZustand::Getrennt);
        assert!(client.aktive_kanaele().is_empty());
    }

    #[tokio::test]
    async fn verbindungsstatus_wird_verteilt() {
        let client = client();
        let (_id, mut rx) = client.broadcaster().abonnieren();

        let _ausgang = client.sitzung_beginnen();
        client.sitzung_beenden();

        let status: Vec<PbxEvent> = [rx.try_recv().unwrap(), rx.try_recv().unwrap()]
            .into_iter()
            .map(|p| p.event.clone())
            .collect();
        assert_eq!(
            status,
            vec![
                PbxEvent::ConnectionStatus { connected: true },
                PbxEvent::ConnectionStatus { connected: false },
            ]
        );
        assert_eq!(client.statistik().sitzungen, 1);
    }
}
