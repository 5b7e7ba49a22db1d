//! Reconnect-Supervisor – Besitzt den Lebenszyklus der Sitzungen
//!
//! ## State Machine
//! ```text
//! Getrennt -> Verbinde -> Authentifiziere -> Live
//!    ^                                         |
//!    +---------- Backoff <----- Fehler --------+
//!
//! Gestoppt: von jedem Zustand aus per `stoppen()`
//! ```
//!
//! Anmeldefehler werden wie Verbindungsfehler wiederholt: eine neu startende
//! Anlage ist von einem falschen Secret nicht zu unterscheiden.

use serde::Serialize;
use std::sync::atomic::Ordering;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::client::{AmiClient, Zaehler};
use crate::error::{AmiError, AmiResult};
use crate::session::{stop_abwarten, Sitzung};

/// Von aussen beobachtbarer Verbindungszustand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerbindungsZustand {
    /// Keine Verbindung (Start oder Backoff)
    Getrennt,
    /// TCP-Verbindungsaufbau laeuft
    Verbinde,
    /// Begruessung und Login laufen
    Authentifiziere,
    /// Angemeldet, Ereignisse fliessen
    Live,
    /// Explizit gestoppt
    Gestoppt,
}

/// Laufender Supervisor-Task eines Clients
pub struct Supervisor {
    client: AmiClient,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Supervisor {
    /// Startet den Supervisor-Task fuer `client`
    ///
    /// Pro Client laeuft hoechstens ein Supervisor gleichzeitig.
    pub fn starten(client: AmiClient) -> AmiResult<Self> {
        if client.inner.gestartet.swap(true, Ordering::SeqCst) {
            return Err(AmiError::BereitsGestartet);
        }
        client.zustand_setzen(VerbindungsZustand::Getrennt);

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(schleife(client.clone(), stop_rx));

        tracing::info!(adresse = %client.konfig().adresse(), "Supervisor gestartet");
        Ok(Self {
            client,
            stop_tx,
            handle,
        })
    }

    pub fn client(&self) -> &AmiClient {
        &self.client
    }

    /// Stoppt den Supervisor und wartet auf das Ende des Tasks
    ///
    /// Danach ist der Zustand `Gestoppt`, keine Aktion steht aus und die
    /// Kanal-Tabelle ist leer.
    pub async fn stoppen(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(fehler = %e, "Supervisor-Task abgebrochen");
            // Guard der Sitzung ist beim Unwinding bereits gelaufen
            self.client.sitzung_beenden();
        }
        self.client.zustand_setzen(VerbindungsZustand::Gestoppt);
        self.client.inner.gestartet.store(false, Ordering::SeqCst);
        tracing::info!("Supervisor gestoppt");
    }
}

async fn schleife(client: AmiClient, mut stop_rx: watch::Receiver<bool>) {
    let mut backoff = client.konfig().backoff();

    loop {
        if *stop_rx.borrow() {
            break;
        }
        Zaehler::erhoehen(&client.inner.statistik.verbindungsversuche);

        let sitzung = tokio::select! {
            sitzung = Sitzung::aufbauen(&client) => sitzung,
            _ = stop_abwarten(&mut stop_rx) => break,
        };

        let ergebnis = match sitzung {
            Ok(sitzung) => {
                backoff.zuruecksetzen();
                sitzung.ausfuehren(&client, &mut stop_rx).await
            }
            Err(e) => Err(e),
        };

        let fehler = match ergebnis {
            Ok(()) => break,
            Err(e) => e,
        };

        client.zustand_setzen(VerbindungsZustand::Getrennt);
        let wartezeit = backoff.naechste();
        match &fehler {
            AmiError::Anmeldung(_) => tracing::error!(
                fehler = %fehler,
                benutzer = %client.konfig().username,
                wartezeit_ms = wartezeit.as_millis() as u64,
                "Anmeldung fehlgeschlagen – erneuter Versuch nach Backoff"
            ),
            e if e.ist_wiederholbar() => tracing::warn!(
                fehler = %fehler,
                wartezeit_ms = wartezeit.as_millis() as u64,
                "Sitzung beendet – erneuter Versuch nach Backoff"
            ),
            _ => tracing::error!(
                fehler = %fehler,
                wartezeit_ms = wartezeit.as_millis() as u64,
                "Unerwarteter Sitzungsfehler – erneuter Versuch nach Backoff"
            ),
        }

        tokio::select! {
            _ = tokio::time::sleep(wartezeit) => {}
            _ = stop_abwarten(&mut stop_rx) => break,
        }
    }

    client.zustand_setzen(VerbindungsZustand::Gestoppt);
}
