//! Event-Interpreter – Uebersetzt Manager-Ereignisse in `PbxEvent`
//!
//! Laeuft ausschliesslich im Lese-Task der Sitzung und ist damit der einzige
//! Schreiber der Kanal-Tabelle. Ablauf je Ereignis:
//!
//! 1. Ereignisart in der festen Tabelle nachschlagen
//! 2. Kanal-Tabelle anpassen (falls die Art Gespraechszustand betrifft)
//! 3. Normalisiertes Ereignis an den Broadcaster geben
//!
//! Unbekannte Arten werden unveraendert als `PbxEvent::Raw` weitergereicht
//! und aendern die Tabelle nicht.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use switchboard_core::types::zustand_aus_code;
use switchboard_core::{ChannelState, PbxEvent};
use switchboard_protocol::Frame;
use switchboard_signaling::EventBroadcaster;

use crate::channels::ChannelTable;
use crate::error::{AmiError, AmiResult};

// ---------------------------------------------------------------------------
// Bekannte Ereignisarten
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Art {
    Newchannel,
    Newstate,
    NewCallerid,
    DialBegin,
    Hangup,
    Link,
    Unlink,
    Bridge,
    BridgeEnter,
    BridgeLeave,
    Rename,
    PeerStatus,
    ContactStatus,
    Registry,
    Shutdown,
    CoreShowChannel,
}

impl Art {
    fn aus_name(name: &str) -> Option<Self> {
        let art = match name.to_ascii_lowercase().as_str() {
            "newchannel" => Self::Newchannel,
            "newstate" => Self::Newstate,
            "newcallerid" => Self::NewCallerid,
            "dialbegin" => Self::DialBegin,
            "hangup" => Self::Hangup,
            "link" => Self::Link,
            "unlink" => Self::Unlink,
            "bridge" => Self::Bridge,
            "bridgeenter" => Self::BridgeEnter,
            "bridgeleave" => Self::BridgeLeave,
            "rename" => Self::Rename,
            "peerstatus" => Self::PeerStatus,
            "contactstatus" => Self::ContactStatus,
            "registry" => Self::Registry,
            "shutdown" => Self::Shutdown,
            "coreshowchannel" => Self::CoreShowChannel,
            _ => return None,
        };
        Some(art)
    }
}

// ---------------------------------------------------------------------------
// EventInterpreter
// ---------------------------------------------------------------------------

/// Wendet Ereignisse auf die Kanal-Tabelle an und verteilt sie
#[derive(Clone)]
pub struct EventInterpreter {
    kanaele: ChannelTable,
    broadcaster: EventBroadcaster,
}

impl EventInterpreter {
    pub fn neu(kanaele: ChannelTable, broadcaster: EventBroadcaster) -> Self {
        Self {
            kanaele,
            broadcaster,
        }
    }

    pub fn kanaele(&self) -> &ChannelTable {
        &self.kanaele
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    /// Verarbeitet ein Ereignis-Frame
    ///
    /// Mit `weiterleiten = false` wird nur die Tabelle angepasst (Ausgabe
    /// einer Aktion, z.B. CoreShowChannels). Fehlt ein Pflichtfeld, bleibt
    /// die Tabelle unveraendert und es wird `UngueltigerFrame` geliefert.
    pub fn verarbeiten(&self, frame: &Frame, weiterleiten: bool) -> AmiResult<PbxEvent> {
        let name = frame
            .ereignis()
            .ok_or_else(|| AmiError::UngueltigerFrame("Frame ohne Event-Feld".into()))?;

        let event = match Art::aus_name(name) {
            Some(art) => self.anwenden(art, frame)?,
            None => {
                tracing::trace!(event = %name, "Unbekannte Ereignisart");
                PbxEvent::Raw {
                    event: name.to_string(),
                    fields: frame.als_json(),
                }
            }
        };

        if weiterleiten {
            let zugestellt = self.broadcaster.an_alle_senden(event.clone());
            tracing::trace!(event = event.art(), zugestellt, "Ereignis verteilt");
        }
        Ok(event)
    }

    fn anwenden(&self, art: Art, frame: &Frame) -> AmiResult<PbxEvent> {
        let event = match art {
            Art::Newchannel => {
                let mut kanal = ChannelState::neu(pflicht(frame, "Channel")?);
                kanal_felder_uebernehmen(&mut kanal, frame);
                kanal.destination = wert(frame, "Exten");
                let kanal = self.kanaele.einfuegen(kanal);
                tracing::debug!(channel = %kanal.channel, state = %kanal.state, "Kanal angelegt");
                PbxEvent::ChannelCreated { channel: kanal }
            }

            Art::Newstate | Art::NewCallerid => {
                let name = pflicht(frame, "Channel")?;
                let kanal = self
                    .kanaele
                    .aktualisieren(name, |k| kanal_felder_uebernehmen(k, frame));
                PbxEvent::ChannelUpdated { channel: kanal }
            }

            Art::DialBegin => {
                let name = pflicht(frame, "Channel")?;
                let ziel = wert(frame, "DialString")
                    .or_else(|| wert(frame, "DestCallerIDNum"))
                    .or_else(|| wert(frame, "DestExten"))
                    .or_else(|| wert(frame, "DestChannel"));
                let kanal = self.kanaele.aktualisieren(name, |k| {
                    if ziel.is_some() {
                        k.destination = ziel;
                    }
                });
                PbxEvent::ChannelUpdated { channel: kanal }
            }

            Art::Hangup => {
                let name = pflicht(frame, "Channel")?;
                if self.kanaele.entfernen(name).is_none() {
                    tracing::debug!(channel = %name, "Hangup fuer unbekannten Kanal");
                } else {
                    tracing::debug!(channel = %name, "Kanal entfernt");
                }
                PbxEvent::ChannelHangup {
                    channel: name.to_string(),
                    cause: wert(frame, "Cause"),
                    cause_text: wert(frame, "Cause-txt"),
                }
            }

            Art::Link => self.verknuepfen(frame)?,
            Art::Unlink => self.trennen(frame)?,
            Art::Bridge => match frame.get("Bridgestate") {
                Some(s) if s.eq_ignore_ascii_case("Unlink") => self.trennen(frame)?,
                _ => self.verknuepfen(frame)?,
            },

            Art::BridgeEnter => {
                let name = pflicht(frame, "Channel")?;
                let bruecke = pflicht(frame, "BridgeUniqueid")?;
                match self.kanaele.bruecke_betreten(bruecke, name) {
                    Some(partner) => PbxEvent::ChannelsLinked {
                        channel: name.to_string(),
                        linked_channel: partner,
                    },
                    None => self.kanal_oder_roh(name, frame),
                }
            }

            Art::BridgeLeave => {
                let name = pflicht(frame, "Channel")?;
                let bruecke = pflicht(frame, "BridgeUniqueid")?;
                PbxEvent::ChannelsUnlinked {
                    channel: name.to_string(),
                    linked_channel: self.kanaele.bruecke_verlassen(bruecke, name),
                }
            }

            Art::Rename => {
                // Aeltere Anlagen senden Oldname, neuere Channel
                let alt = frame
                    .get("Oldname")
                    .or_else(|| frame.get("Channel"))
                    .ok_or_else(|| fehlendes_feld("Oldname"))?;
                let neu = pflicht(frame, "Newname")?;
                if self.kanaele.umbenennen(alt, neu).is_none() {
                    tracing::debug!(channel = %alt, "Rename fuer unbekannten Kanal");
                }
                PbxEvent::ChannelRenamed {
                    old_name: alt.to_string(),
                    new_name: neu.to_string(),
                }
            }

            Art::PeerStatus => PbxEvent::PeerStatus {
                peer: pflicht(frame, "Peer")?.to_string(),
                status: pflicht(frame, "PeerStatus")?.to_string(),
                address: wert(frame, "Address"),
            },

            Art::ContactStatus => PbxEvent::PeerStatus {
                peer: frame
                    .get("EndpointName")
                    .or_else(|| frame.get("AOR"))
                    .ok_or_else(|| fehlendes_feld("AOR"))?
                    .to_string(),
                status: pflicht(frame, "ContactStatus")?.to_string(),
                address: wert(frame, "URI"),
            },

            Art::Registry => PbxEvent::Registry {
                channel_type: wert(frame, "ChannelType"),
                domain: wert(frame, "Domain"),
                username: wert(frame, "Username"),
                status: pflicht(frame, "Status")?.to_string(),
            },

            Art::Shutdown => {
                let restart = frame
                    .get("Restart")
                    .is_some_and(|r| r.eq_ignore_ascii_case("true"));
                let verworfen = self.kanaele.leeren();
                tracing::warn!(restart, verworfen, "Anlage faehrt herunter");
                PbxEvent::PbxShutdown { restart }
            }

            Art::CoreShowChannel => {
                let mut kanal = ChannelState::neu(pflicht(frame, "Channel")?);
                kanal_felder_uebernehmen(&mut kanal, frame);
                kanal.destination = wert(frame, "Exten");
                if let Some(start) = frame.get("Duration").and_then(startzeit_aus_dauer) {
                    kanal.start_time = start;
                }
                let name = kanal.channel.clone();
                let mut kanal = self.kanaele.einfuegen(kanal);
                if let Some(bruecke) = frame.get("BridgeId").filter(|b| !b.is_empty()) {
                    if let Some(partner) = self.kanaele.bruecke_betreten(bruecke, &name) {
                        kanal.linked_channel = Some(partner);
                    }
                }
                PbxEvent::ChannelUpdated { channel: kanal }
            }
        };
        Ok(event)
    }

    /// Link / Bridge mit `Channel1` und `Channel2`
    fn verknuepfen(&self, frame: &Frame) -> AmiResult<PbxEvent> {
        let a = pflicht(frame, "Channel1")?;
        let b = pflicht(frame, "Channel2")?;
        if !self.kanaele.verknuepfen(a, b) {
            tracing::debug!(channel1 = %a, channel2 = %b, "Verknuepfung mit unbekanntem Kanal ignoriert");
        }
        Ok(PbxEvent::ChannelsLinked {
            channel: a.to_string(),
            linked_channel: b.to_string(),
        })
    }

    fn trennen(&self, frame: &Frame) -> AmiResult<PbxEvent> {
        let a = pflicht(frame, "Channel1")?;
        let partner = self.kanaele.trennen(a);
        Ok(PbxEvent::ChannelsUnlinked {
            channel: a.to_string(),
            linked_channel: partner.or_else(|| wert(frame, "Channel2")),
        })
    }

    fn kanal_oder_roh(&self, name: &str, frame: &Frame) -> PbxEvent {
        match self.kanaele.get(name) {
            Some(kanal) => PbxEvent::ChannelUpdated { channel: kanal },
            None => PbxEvent::Raw {
                event: frame.ereignis().unwrap_or_default().to_string(),
                fields: frame.als_json(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen
// ---------------------------------------------------------------------------

fn fehlendes_feld(name: &str) -> AmiError {
    AmiError::UngueltigerFrame(format!("Pflichtfeld {name} fehlt"))
}

fn pflicht<'a>(frame: &'a Frame, name: &str) -> AmiResult<&'a str> {
    frame
        .get(name)
        .filter(|w| !w.is_empty())
        .ok_or_else(|| fehlendes_feld(name))
}

/// Optionales Feld; leere Werte und `<unknown>` gelten als fehlend
fn wert(frame: &Frame, name: &str) -> Option<String> {
    frame
        .get(name)
        .filter(|w| !w.is_empty() && !w.eq_ignore_ascii_case("<unknown>"))
        .map(str::to_owned)
}

/// Uebernimmt Zustand, Anrufer und Uniqueid aus einem Kanal-Ereignis
fn kanal_felder_uebernehmen(kanal: &mut ChannelState, frame: &Frame) {
    let beschreibung = frame
        .get("ChannelStateDesc")
        .filter(|d| !d.is_empty())
        .or_else(|| frame.get("ChannelState").and_then(zustand_aus_code))
        .or_else(|| frame.get("State"));
    if let Some(beschreibung) = beschreibung {
        kanal.zustand_setzen(beschreibung);
    }
    if let Some(nummer) = wert(frame, "CallerIDNum") {
        kanal.caller_id_num = Some(nummer);
    }
    if let Some(name) = wert(frame, "CallerIDName") {
        kanal.caller_id_name = Some(name);
    }
    if let Some(id) = wert(frame, "Uniqueid") {
        kanal.unique_id = Some(id);
    }
}

/// "HH:MM:SS" wie im CoreShowChannel-Ereignis
///
/// `None` bei unlesbaren oder nicht darstellbaren Werten.
fn dauer_parsen(text: &str) -> Option<ChronoDuration> {
    let mut teile = text.trim().splitn(3, ':');
    let stunden: i64 = teile.next()?.parse().ok()?;
    let minuten: i64 = teile.next()?.parse().ok()?;
    let sekunden: i64 = teile.next()?.parse().ok()?;
    let gesamt = stunden
        .checked_mul(3600)?
        .checked_add(minuten.checked_mul(60)?)?
        .checked_add(sekunden)?;
    ChronoDuration::try_seconds(gesamt)
}

/// Startzeit aus der bisherigen Dauer; `None` behaelt die Einfuegezeit
fn startzeit_aus_dauer(text: &str) -> Option<DateTime<Utc>> {
    let start = dauer_parsen(text).and_then(|dauer| Utc::now().checked_sub_signed(dauer));
    if start.is_none() {
        tracing::debug!(dauer = %text, "Dauer nicht auswertbar");
    }
    start
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::CallStatus;

    fn interpreter() -> (EventInterpreter, EventBroadcaster) {
        let broadcaster = EventBroadcaster::neu();
        (
            EventInterpreter::neu(ChannelTable::neu(), broadcaster.clone()),
            broadcaster,
        )
    }

    fn ereignis(art: &str, felder: &[(&str, &str)]) -> Frame {
        felder
            .iter()
            .fold(Frame::neu().mit_feld("Event", art), |f, (n, w)| f.mit_feld(*n, *w))
    }

    #[tokio::test]
    async fn newchannel_dann_hangup() {
        let (interpreter, broadcaster) = interpreter();
        let (_id, mut rx) = broadcaster.abonnieren();

        interpreter
            .verarbeiten(
                &ereignis(
                    "Newchannel",
                    &[
                        ("Channel", "SIP/100-1"),
                        ("ChannelState", "4"),
                        ("CallerIDNum", "100"),
                        ("Exten", "200"),
                    ],
                ),
                true,
            )
            .unwrap();
        let snapshot = interpreter.kanaele().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].channel, "SIP/100-1");
        assert_eq!(snapshot[0].state, "Ring");
        assert_eq!(snapshot[0].status, CallStatus::Ringing);
        assert_eq!(snapshot[0].destination.as_deref(), Some("200"));

        interpreter
            .verarbeiten(
                &ereignis(
                    "Hangup",
                    &[("Channel", "SIP/100-1"), ("Cause", "16"), ("Cause-txt", "Normal Clearing")],
                ),
                true,
            )
            .unwrap();
        assert!(interpreter.kanaele().snapshot().is_empty());

        assert!(matches!(
            rx.try_recv().unwrap().event,
            PbxEvent::ChannelCreated { .. }
        ));
        match &rx.try_recv().unwrap().event {
            PbxEvent::ChannelHangup {
                channel,
                cause,
                cause_text,
            } => {
                assert_eq!(channel, "SIP/100-1");
                assert_eq!(cause.as_deref(), Some("16"));
                assert_eq!(cause_text.as_deref(), Some("Normal Clearing"));
            }
            anderes => panic!("unerwartet: {anderes:?}"),
        }
    }

    #[tokio::test]
    async fn unbekannte_art_wird_roh_weitergereicht() {
        let (interpreter, broadcaster) = interpreter();
        let (_id, mut rx) = broadcaster.abonnieren();

        let event = interpreter
            .verarbeiten(
                &ereignis("FutureFeatureX", &[("Channel", "SIP/100-1"), ("Foo", "bar")]),
                true,
            )
            .unwrap();
        assert_eq!(interpreter.kanaele().anzahl(), 0);

        match event {
            PbxEvent::Raw { event, fields } => {
                assert_eq!(event, "FutureFeatureX");
                assert_eq!(fields["Foo"], "bar");
            }
            anderes => panic!("unerwartet: {anderes:?}"),
        }
        assert!(matches!(rx.try_recv().unwrap().event, PbxEvent::Raw { .. }));
    }

    #[test]
    fn newstate_aktualisiert_und_legt_unbekannte_an() {
        let (interpreter, _) = interpreter();
        interpreter
            .verarbeiten(&ereignis("Newchannel", &[("Channel", "A"), ("ChannelStateDesc", "Ring")]), false)
            .unwrap();
        interpreter
            .verarbeiten(&ereignis("Newstate", &[("Channel", "A"), ("ChannelStateDesc", "Up")]), false)
            .unwrap();
        assert_eq!(interpreter.kanaele().get("A").unwrap().status, CallStatus::Connected);

        interpreter
            .verarbeiten(&ereignis("Newstate", &[("Channel", "B"), ("ChannelState", "6")]), false)
            .unwrap();
        assert_eq!(interpreter.kanaele().get("B").unwrap().state, "Up");
    }

    #[test]
    fn fehlendes_pflichtfeld_aendert_nichts() {
        let (interpreter, _) = interpreter();
        let ergebnis = interpreter.verarbeiten(&ereignis("Newchannel", &[]), true);
        assert!(matches!(ergebnis, Err(AmiError::UngueltigerFrame(_))));
        assert_eq!(interpreter.kanaele().anzahl(), 0);
    }

    #[test]
    fn bridge_enter_und_leave_verknuepfen() {
        let (interpreter, _) = interpreter();
        for kanal in ["A", "B"] {
            interpreter
                .verarbeiten(&ereignis("Newchannel", &[("Channel", kanal)]), false)
                .unwrap();
        }
        interpreter
            .verarbeiten(&ereignis("BridgeEnter", &[("Channel", "A"), ("BridgeUniqueid", "br")]), false)
            .unwrap();
        let event = interpreter
            .verarbeiten(&ereignis("BridgeEnter", &[("Channel", "B"), ("BridgeUniqueid", "br")]), false)
            .unwrap();
        assert_eq!(
            event,
            PbxEvent::ChannelsLinked {
                channel: "B".into(),
                linked_channel: "A".into()
            }
        );
        assert_eq!(interpreter.kanaele().get("A").unwrap().linked_channel.as_deref(), Some("B"));

        // Hangup eines Beins loest den Rueckverweis
        interpreter
            .verarbeiten(&ereignis("Hangup", &[("Channel", "B")]), false)
            .unwrap();
        assert!(interpreter.kanaele().get("A").unwrap().linked_channel.is_none());
    }

    #[test]
    fn legacy_link_und_unlink() {
        let (interpreter, _) = interpreter();
        for kanal in ["A", "B"] {
            interpreter
                .verarbeiten(&ereignis("Newchannel", &[("Channel", kanal)]), false)
                .unwrap();
        }
        interpreter
            .verarbeiten(
                &ereignis("Bridge", &[("Bridgestate", "Link"), ("Channel1", "A"), ("Channel2", "B")]),
                false,
            )
            .unwrap();
        assert_eq!(interpreter.kanaele().get("B").unwrap().linked_channel.as_deref(), Some("A"));

        let event = interpreter
            .verarbeiten(&ereignis("Unlink", &[("Channel1", "A"), ("Channel2", "B")]), false)
            .unwrap();
        assert_eq!(
            event,
            PbxEvent::ChannelsUnlinked {
                channel: "A".into(),
                linked_channel: Some("B".into())
            }
        );
        assert!(interpreter.kanaele().get("B").unwrap().linked_channel.is_none());
    }

    #[test]
    fn rename_und_shutdown() {
        let (interpreter, _) = interpreter();
        interpreter
            .verarbeiten(&ereignis("Newchannel", &[("Channel", "A")]), false)
            .unwrap();
        interpreter
            .verarbeiten(&ereignis("Rename", &[("Channel", "A"), ("Newname", "A<MASQ>")]), false)
            .unwrap();
        assert!(interpreter.kanaele().enthaelt("A<MASQ>"));
        assert!(!interpreter.kanaele().enthaelt("A"));

        let event = interpreter
            .verarbeiten(&ereignis("Shutdown", &[("Shutdown", "Cleanly"), ("Restart", "True")]), false)
            .unwrap();
        assert_eq!(event, PbxEvent::PbxShutdown { restart: true });
        assert_eq!(interpreter.kanaele().anzahl(), 0);
    }

    #[test]
    fn peer_und_registry_aendern_tabelle_nicht() {
        let (interpreter, _) = interpreter();
        let event = interpreter
            .verarbeiten(
                &ereignis(
                    "PeerStatus",
                    &[("Peer", "SIP/100"), ("PeerStatus", "Reachable"), ("Address", "10.0.0.5:5060")],
                ),
                false,
            )
            .unwrap();
        assert_eq!(
            event,
            PbxEvent::PeerStatus {
                peer: "SIP/100".into(),
                status: "Reachable".into(),
                address: Some("10.0.0.5:5060".into())
            }
        );
        let event = interpreter
            .verarbeiten(
                &ereignis("Registry", &[("ChannelType", "SIP"), ("Domain", "sip.example"), ("Status", "Registered")]),
                false,
            )
            .unwrap();
        assert!(matches!(event, PbxEvent::Registry { ref status, .. } if status == "Registered"));
        assert_eq!(interpreter.kanaele().anzahl(), 0);
    }

    #[tokio::test]
    async fn core_show_channel_seedet_ohne_verteilen() {
        let (interpreter, broadcaster) = interpreter();
        let (_id, mut rx) = broadcaster.abonnieren();

        interpreter
            .verarbeiten(
                &ereignis(
                    "CoreShowChannel",
                    &[
                        ("ActionID", "L1"),
                        ("Channel", "SIP/300-9"),
                        ("ChannelStateDesc", "Up"),
                        ("Duration", "00:01:30"),
                    ],
                ),
                false,
            )
            .unwrap();

        let kanal = interpreter.kanaele().get("SIP/300-9").unwrap();
        assert_eq!(kanal.status, CallStatus::Connected);
        let alter = Utc::now() - kanal.start_time;
        assert!(alter.num_seconds() >= 89 && alter.num_seconds() <= 95);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dauer_format() {
        assert_eq!(dauer_parsen("01:02:03"), Some(ChronoDuration::seconds(3723)));
        assert_eq!(dauer_parsen("kaputt"), None);
        assert!(startzeit_aus_dauer("99999999999:00:00").is_none());
        assert!(startzeit_aus_dauer("00:00:05").is_some());
        assert_eq!(dauer_parsen("9223372036854775807:59:59"), None);
    }

    #[test]
    fn riesige_dauer_behaelt_einfuegezeit() {
        let (interpreter, _broadcaster) = interpreter();
        let vorher = Utc::now();

        let event = interpreter
            .verarbeiten(
                &ereignis(
                    "CoreShowChannel",
                    &[
                        ("ActionID", "L2"),
                        ("Channel", "SIP/400-1"),
                        ("ChannelStateDesc", "Up"),
                        ("Duration", "99999999999:00:00"),
                    ],
                ),
                false,
            )
            .unwrap();

        assert!(matches!(event, PbxEvent::ChannelUpdated { .. }));
        let kanal = interpreter.kanaele().get("SIP/400-1").unwrap();
        assert!(kanal.start_time >= vorher);
        assert!(kanal.start_time <= Utc::now());
    }
}
