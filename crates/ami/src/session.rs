//! Sitzung – Eine TCP-Verbindung zur Manager-Schnittstelle
//!
//! Ablauf:
//! 1. TCP-Verbindung aufbauen (Zeitlimit `connect_timeout`)
//! 2. Begruessungszeile lesen ("Asterisk Call Manager/x.y")
//! 3. `Action: Login` senden und auf die Antwort warten
//! 4. Lese-Schleife bis Socketfehler, Leerlauf-Timeout oder Stop-Signal
//!
//! Die Lese-Schleife ist der einzige Schreiber der Kanal-Tabelle und die
//! einzige Quelle von Ereignissen fuer den Broadcaster. Beim Verlassen
//! raeumt ein Drop-Guard auf, auch bei einem Panic.

use futures_util::{SinkExt, StreamExt};
use std::io;
use std::sync::atomic::Ordering;
use std::time::Duration;
use switchboard_protocol::{Action, AmiCodec, Frame, FrameArt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::codec::Framed;

use crate::client::{AmiClient, Zaehler};
use crate::error::{AmiError, AmiResult};
use crate::supervisor::VerbindungsZustand;

/// Zeitlimit fuer das Logoff beim Stoppen
const LOGOFF_TIMEOUT: Duration = Duration::from_secs(1);

type AmiFramed = Framed<BufReader<TcpStream>, AmiCodec>;

/// Wartet bis Stop angefordert wurde oder der Supervisor verschwunden ist
pub(crate) async fn stop_abwarten(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stop| *stop).await;
}

// ---------------------------------------------------------------------------
// Sitzung
// ---------------------------------------------------------------------------

/// Angemeldete Verbindung, bereit fuer die Lese-Schleife
pub(crate) struct Sitzung {
    framed: AmiFramed,
    banner: String,
}

impl Sitzung {
    /// Verbindet, liest die Begruessung und meldet sich an
    pub(crate) async fn aufbauen(client: &AmiClient) -> AmiResult<Self> {
        let konfig = client.konfig();
        let adresse = konfig.adresse();

        client.zustand_setzen(VerbindungsZustand::Verbinde);
        tracing::info!(adresse = %adresse, "Verbinde mit Manager-Schnittstelle");

        let stream = match tokio::time::timeout(
            konfig.connect_timeout(),
            TcpStream::connect(&adresse),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(AmiError::Verbindung(e)),
            Err(_) => {
                return Err(AmiError::Verbindung(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("Verbindungsaufbau zu {adresse} dauerte zu lange"),
                )))
            }
        };
        stream.set_nodelay(true)?;

        client.zustand_setzen(VerbindungsZustand::Authentifiziere);
        let login_timeout = konfig.login_timeout();
        let mut reader = BufReader::new(stream);

        let banner = match tokio::time::timeout(login_timeout, banner_lesen(&mut reader)).await {
            Ok(ergebnis) => ergebnis?,
            Err(_) => return Err(AmiError::Zeitlimit(login_timeout)),
        };
        tracing::debug!(banner = %banner, "Begruessung empfangen");

        let mut sitzung = Self {
            framed: Framed::new(reader, AmiCodec::new()),
            banner,
        };

        let action_id = client.naechste_action_id();
        let login = Action::login(&konfig.username, &konfig.secret, &konfig.events);
        match tokio::time::timeout(login_timeout, sitzung.anmelden(login, &action_id)).await {
            Ok(ergebnis) => ergebnis?,
            Err(_) => return Err(AmiError::Zeitlimit(login_timeout)),
        }

        tracing::info!(
            adresse = %adresse,
            benutzer = %konfig.username,
            banner = %sitzung.banner,
            "Anmeldung erfolgreich"
        );
        Ok(sitzung)
    }

    async fn anmelden(&mut self, login: Action, action_id: &str) -> AmiResult<()> {
        self.framed.send(login.in_frame(action_id)).await?;

        while let Some(frame) = self.framed.next().await {
            let frame = frame?;
            if frame.art() != FrameArt::Antwort || frame.action_id() != Some(action_id) {
                tracing::trace!(event = ?frame.ereignis(), "Frame vor Login-Antwort ignoriert");
                continue;
            }
            if frame.ist_erfolg() {
                return Ok(());
            }
            let nachricht = frame.nachricht().unwrap_or("Login abgelehnt").to_string();
            return Err(AmiError::Anmeldung(nachricht));
        }

        Err(AmiError::Verbindung(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "Verbindung waehrend der Anmeldung geschlossen",
        )))
    }

    /// Lese-Schleife einer angemeldeten Sitzung
    ///
    /// Liefert `Ok(())` wenn Stop angefordert wurde, sonst den Grund fuer
    /// das Sitzungsende.
    pub(crate) async fn ausfuehren(
        mut self,
        client: &AmiClient,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> AmiResult<()> {
        let konfig = client.konfig().clone();
        let keepalive = konfig.keepalive();
        let lese_timeout = konfig.lese_timeout();

        let mut ausgang_rx = client.sitzung_beginnen();
        let _guard = SitzungsGuard {
            client: client.clone(),
        };

        if konfig.kanaele_beim_start_laden {
            let c = client.clone();
            tokio::spawn(async move { c.kanaele_laden().await });
        }

        let mut letzter_empfang = Instant::now();
        let mut naechster_ping = Instant::now() + keepalive;
        let mut zeilen_gemeldet = self.framed.codec().verworfene_zeilen();

        loop {
            let frist = (letzter_empfang + lese_timeout).min(naechster_ping);

            tokio::select! {
                frame = self.framed.next() => match frame {
                    Some(Ok(frame)) => {
                        letzter_empfang = Instant::now();
                        zeilen_gemeldet = verworfene_zeilen_melden(client, &self.framed, zeilen_gemeldet);
                        frame_verteilen(client, frame);
                    }
                    Some(Err(e)) => {
                        tracing::warn!(fehler = %e, "Lesefehler");
                        return Err(AmiError::Verbindung(e));
                    }
                    None => {
                        tracing::warn!("Verbindung von der Anlage geschlossen");
                        return Err(AmiError::Getrennt);
                    }
                },

                Some(ausgehend) = ausgang_rx.recv() => {
                    // Liest die Anlage nicht mehr, darf das Senden weder Stop
                    // noch die Leerlauf-Erkennung aufhalten
                    tokio::select! {
                        ergebnis = tokio::time::timeout(lese_timeout, self.framed.send(ausgehend)) => {
                            match ergebnis {
                                Ok(Ok(())) => {}
                                Ok(Err(e)) => {
                                    tracing::warn!(fehler = %e, "Senden fehlgeschlagen");
                                    return Err(AmiError::Verbindung(e));
                                }
                                Err(_) => {
                                    tracing::warn!(
                                        zeitlimit_ms = lese_timeout.as_millis() as u64,
                                        "Anlage nimmt keine Daten an – Sitzung gilt als tot"
                                    );
                                    return Err(AmiError::Zeitlimit(lese_timeout));
                                }
                            }
                        }
                        _ = stop_abwarten(stop_rx) => {
                            tracing::debug!("Stop waehrend blockiertem Senden, kein Logoff");
                            return Ok(());
                        }
                    }
                }

                _ = tokio::time::sleep_until(frist) => {
                    let jetzt = Instant::now();
                    if jetzt.duration_since(letzter_empfang) >= lese_timeout {
                        tracing::warn!(
                            leerlauf_ms = lese_timeout.as_millis() as u64,
                            "Keine Daten von der Anlage – Sitzung gilt als tot"
                        );
                        return Err(AmiError::Zeitlimit(lese_timeout));
                    }
                    if jetzt >= naechster_ping {
                        naechster_ping = jetzt + keepalive;
                        let c = client.clone();
                        tokio::spawn(async move {
                            if let Err(e) = c.senden(Action::ping()).await {
                                tracing::debug!(fehler = %e, "Keepalive-Ping fehlgeschlagen");
                            }
                        });
                    }
                }

                _ = stop_abwarten(stop_rx) => {
                    let logoff = Action::logoff().in_frame(&client.naechste_action_id());
                    match tokio::time::timeout(LOGOFF_TIMEOUT, self.framed.send(logoff)).await {
                        Ok(Ok(())) => tracing::debug!("Logoff gesendet"),
                        Ok(Err(e)) => tracing::debug!(fehler = %e, "Logoff fehlgeschlagen"),
                        Err(_) => tracing::debug!("Logoff-Zeitlimit ueberschritten"),
                    }
                    return Ok(());
                }
            }
        }
    }
}

/// Liest die Begruessungszeile der Anlage
async fn banner_lesen(reader: &mut BufReader<TcpStream>) -> AmiResult<String> {
    let mut zeile = String::new();
    if reader.read_line(&mut zeile).await? == 0 {
        return Err(AmiError::Verbindung(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "Verbindung vor der Begruessung geschlossen",
        )));
    }
    let banner = zeile.trim_end().to_string();
    if !banner.starts_with("Asterisk Call Manager") {
        tracing::warn!(banner = %banner, "Unerwartete Begruessung");
    }
    Ok(banner)
}

/// Uebertraegt neu verworfene Zeilen des Codecs in die Client-Statistik
fn verworfene_zeilen_melden(client: &AmiClient, framed: &AmiFramed, gemeldet: u64) -> u64 {
    let stand = framed.codec().verworfene_zeilen();
    let neu = stand.saturating_sub(gemeldet);
    if neu > 0 {
        client
            .inner
            .statistik
            .verworfene_zeilen
            .fetch_add(neu, Ordering::Relaxed);
    }
    stand
}

/// Ordnet ein eingehendes Frame Correlator und Interpreter zu
fn frame_verteilen(client: &AmiClient, frame: Frame) {
    let inner = &client.inner;
    Zaehler::erhoehen(&inner.statistik.frames_empfangen);

    match frame.art() {
        FrameArt::Antwort => {
            inner.correlator.antwort_zustellen(frame);
        }
        FrameArt::Ereignis => {
            Zaehler::erhoehen(&inner.statistik.ereignisse);
            // Ereignisse mit ActionID sind Ausgabe einer Aktion: nur Tabelle, kein Broadcast
            let zu_aktion = frame.action_id().is_some();
            if let Err(e) = inner.interpreter.verarbeiten(&frame, !zu_aktion) {
                Zaehler::erhoehen(&inner.statistik.verworfene_frames);
                tracing::warn!(fehler = %e, event = ?frame.ereignis(), "Ereignis verworfen");
            }
            if zu_aktion {
                inner.correlator.listen_ereignis_zustellen(frame);
            }
        }
        FrameArt::Unbekannt => {
            Zaehler::erhoehen(&inner.statistik.verworfene_frames);
            tracing::warn!(felder = frame.len(), "Frame weder Antwort noch Ereignis");
        }
    }
}

// ---------------------------------------------------------------------------
// SitzungsGuard
// ---------------------------------------------------------------------------

/// Raeumt beim Verlassen der Lese-Schleife auf
///
/// Laeuft auf jedem Ausgang: Fehler, Stop und Panic.
struct SitzungsGuard {
    client: AmiClient,
}

impl Drop for SitzungsGuard {
    fn drop(&mut self) {
        self.client.sitzung_beenden();
    }
}
