//! Event-Broadcaster – Verteilt normalisierte Ereignisse an alle Abonnenten
//!
//! Der EventBroadcaster verwaltet die Menge der Live-Abonnenten. Jeder
//! Abonnent ist ein `EventSink`; der Transport dahinter (WebSocket, Queue,
//! Test-Sammler) ist dem Broadcaster unbekannt.
//!
//! ## Zustellung
//! - Best-Effort: kein Retry, kein Blockieren des Erzeugers
//! - Schlaegt die Zustellung an einen Abonnenten fehl, wird er im selben
//!   Aufruf entfernt; alle anderen erhalten das Ereignis trotzdem

use dashmap::DashMap;
use std::sync::Arc;
use switchboard_core::{EventPayload, PbxEvent, SubscriberId};
use tokio::sync::mpsc;

use crate::error::{SignalingResult, ZustellFehler};

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Standardgroesse der Send-Queue pro Abonnent
pub const SEND_QUEUE_GROESSE: usize = 256;

// ---------------------------------------------------------------------------
// EventSink
// ---------------------------------------------------------------------------

/// Empfaenger normalisierter Ereignisse
///
/// `zustellen` darf nicht blockieren. Ein Fehler fuehrt zum Entfernen des
/// Abonnenten.
pub trait EventSink: Send + Sync + 'static {
    /// Stellt ein Ereignis zu
    fn zustellen(&self, payload: &Arc<EventPayload>) -> SignalingResult<()>;

    /// `false` wenn der Abonnent bekanntermassen tot ist
    fn ist_gesund(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// QueueSink
// ---------------------------------------------------------------------------

/// Abonnent hinter einer begrenzten tokio-Queue
///
/// Die Gegenseite (z.B. ein WebSocket-Task) liest aus dem Receiver.
#[derive(Clone, Debug)]
pub struct QueueSink {
    tx: mpsc::Sender<Arc<EventPayload>>,
}

impl QueueSink {
    /// Erstellt Sink und zugehoerigen Receiver
    pub fn neu(groesse: usize) -> (Self, mpsc::Receiver<Arc<EventPayload>>) {
        let (tx, rx) = mpsc::channel(groesse.max(1));
        (Self { tx }, rx)
    }
}

impl EventSink for QueueSink {
    fn zustellen(&self, payload: &Arc<EventPayload>) -> SignalingResult<()> {
        match self.tx.try_send(Arc::clone(payload)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(ZustellFehler::QueueVoll),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ZustellFehler::Geschlossen),
        }
    }

    fn ist_gesund(&self) -> bool {
        !self.tx.is_closed()
    }
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Zentraler Broadcaster fuer alle Live-Abonnenten
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<EventBroadcasterInner>,
}

struct EventBroadcasterInner {
    /// Abonnenten, indiziert nach SubscriberId
    abonnenten: DashMap<SubscriberId, Arc<dyn EventSink>>,
    /// Queue-Groesse fuer `abonnieren`
    queue_groesse: usize,
}

impl EventBroadcaster {
    /// Erstellt einen neuen EventBroadcaster
    pub fn neu() -> Self {
        Self::mit_queue_groesse(SEND_QUEUE_GROESSE)
    }

    /// Erstellt einen Broadcaster mit eigener Queue-Groesse pro Abonnent
    pub fn mit_queue_groesse(queue_groesse: usize) -> Self {
        Self {
            inner: Arc::new(EventBroadcasterInner {
                abonnenten: DashMap::new(),
                queue_groesse,
            }),
        }
    }

    /// Registriert einen beliebigen Sink
    pub fn registrieren(&self, sink: Arc<dyn EventSink>) -> SubscriberId {
        let id = SubscriberId::new();
        self.inner.abonnenten.insert(id, sink);
        tracing::debug!(
            subscriber = %id,
            anzahl = self.inner.abonnenten.len(),
            "Abonnent registriert"
        );
        id
    }

    /// Registriert einen Queue-Abonnenten und gibt seine Empfangs-Queue zurueck
    pub fn abonnieren(&self) -> (SubscriberId, mpsc::Receiver<Arc<EventPayload>>) {
        let (sink, rx) = QueueSink::neu(self.inner.queue_groesse);
        let id = self.registrieren(Arc::new(sink));
        (id, rx)
    }

    /// Entfernt einen Abonnenten
    ///
    /// Gibt `true` zurueck wenn er registriert war.
    pub fn entfernen(&self, id: &SubscriberId) -> bool {
        let entfernt = self.inner.abonnenten.remove(id).is_some();
        if entfernt {
            tracing::debug!(
                subscriber = %id,
                anzahl = self.inner.abonnenten.len(),
                "Abonnent entfernt"
            );
        }
        entfernt
    }

    /// Versieht ein Ereignis mit Zeitstempel und sendet es an alle Abonnenten
    ///
    /// Gibt die Anzahl der erfolgreichen Zustellungen zurueck.
    pub fn an_alle_senden(&self, event: PbxEvent) -> usize {
        self.payload_senden(Arc::new(EventPayload::neu(event)))
    }

    /// Sendet eine fertige Payload an alle Abonnenten
    ///
    /// Tote Abonnenten werden im selben Aufruf entfernt.
    pub fn payload_senden(&self, payload: Arc<EventPayload>) -> usize {
        // Momentaufnahme ohne gehaltene Shard-Locks: ein Sink darf waehrend
        // der Zustellung selbst `entfernen` aufrufen
        let abonnenten: Vec<(SubscriberId, Arc<dyn EventSink>)> = self
            .inner
            .abonnenten
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let mut zugestellt = 0;
        let mut tote = Vec::new();
        for (id, sink) in abonnenten {
            if !sink.ist_gesund() {
                tote.push((id, ZustellFehler::Ungesund));
                continue;
            }
            match sink.zustellen(&payload) {
                Ok(()) => zugestellt += 1,
                Err(fehler) => tote.push((id, fehler)),
            }
        }

        for (id, fehler) in tote {
            tracing::warn!(
                subscriber = %id,
                fehler = %fehler,
                event = payload.event.art(),
                "Zustellung fehlgeschlagen – Abonnent entfernt"
            );
            self.inner.abonnenten.remove(&id);
        }

        zugestellt
    }

    /// Gibt die Anzahl der registrierten Abonnenten zurueck
    pub fn anzahl(&self) -> usize {
        self.inner.abonnenten.len()
    }

    /// Prueft ob ein Abonnent registriert ist
    pub fn ist_registriert(&self, id: &SubscriberId) -> bool {
        self.inner.abonnenten.contains_key(id)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
