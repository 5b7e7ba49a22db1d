//! Wire-Format der Manager-Schnittstelle
//!
//! Zeilenbasiertes Textprotokoll ueber TCP:
//!
//! ```text
//! Event: Newchannel\r\n
//! Channel: SIP/100-00000001\r\n
//! ChannelStateDesc: Down\r\n
//! \r\n
//! ```
//!
//! Ein Frame endet mit einer Leerzeile. Zeilen ohne Doppelpunkt sind
//! ungueltig und werden mit einer Warnung verworfen, der Strom laeuft weiter.
//! Ueberlange Zeilen werden bis zum naechsten Zeilenende uebersprungen,
//! danach synchronisiert der Decoder wieder auf die naechste Leerzeile.

use bytes::{BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::Frame;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Zeilenlaenge (64 KB)
pub const DEFAULT_MAX_ZEILEN_LAENGE: usize = 64 * 1024;

/// Zeilenende auf dem Draht
const ZEILENENDE: &[u8] = b"\r\n";

// ---------------------------------------------------------------------------
// AmiCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer Manager-Frames
///
/// Der Decoder haelt den teilweise gelesenen Frame zwischen Aufrufen, ein
/// Frame wird erst bei der abschliessenden Leerzeile ausgegeben.
#[derive(Debug, Clone)]
pub struct AmiCodec {
    /// Felder des aktuell gelesenen Frames
    aktuell: Frame,
    /// Maximale erlaubte Zeilenlaenge in Bytes
    max_zeilen_laenge: usize,
    /// Rest einer ueberlangen Zeile wird verworfen
    verwerfe_zeile: bool,
    /// Anzahl verworfener Zeilen seit Erstellung
    verworfene_zeilen: u64,
}

impl AmiCodec {
    /// Erstellt einen neuen `AmiCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self::with_max_zeilen_laenge(DEFAULT_MAX_ZEILEN_LAENGE)
    }

    /// Erstellt einen `AmiCodec` mit benutzerdefinierter Zeilenlaenge
    pub fn with_max_zeilen_laenge(max_zeilen_laenge: usize) -> Self {
        Self {
            aktuell: Frame::neu(),
            max_zeilen_laenge,
            verwerfe_zeile: false,
            verworfene_zeilen: 0,
        }
    }

    /// Anzahl ungueltiger oder ueberlanger Zeilen, die verworfen wurden
    pub fn verworfene_zeilen(&self) -> u64 {
        self.verworfene_zeilen
    }

    /// Verarbeitet eine vollstaendige Zeile (ohne Zeilenende)
    ///
    /// Gibt `true` zurueck wenn die Zeile den Frame abschliesst.
    fn zeile_verarbeiten(&mut self, zeile: &[u8]) -> bool {
        let zeile = String::from_utf8_lossy(zeile);
        if zeile.trim().is_empty() {
            return true;
        }

        match zeile.split_once(':') {
            Some((name, wert)) if !name.trim().is_empty() => {
                self.aktuell.hinzufuegen(name.trim(), wert.trim_start());
            }
            _ => {
                self.verworfene_zeilen += 1;
                tracing::warn!(zeile = %zeile, "Ungueltige Zeile ohne Feldname verworfen");
            }
        }
        false
    }
}

impl Default for AmiCodec {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl Decoder for AmiCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let zeilenende = src.iter().position(|b| *b == b'\n');

            // Rest einer ueberlangen Zeile ueberspringen
            if self.verwerfe_zeile {
                match zeilenende {
                    Some(pos) => {
                        let _ = src.split_to(pos + 1);
                        self.verwerfe_zeile = false;
                        continue;
                    }
                    None => {
                        src.clear();
                        return Ok(None);
                    }
                }
            }

            let Some(pos) = zeilenende else {
                if src.len() > self.max_zeilen_laenge {
                    self.verworfene_zeilen += 1;
                    tracing::warn!(
                        laenge = src.len(),
                        max = self.max_zeilen_laenge,
                        "Zeile zu lang – wird bis zum Zeilenende verworfen"
                    );
                    src.clear();
                    self.verwerfe_zeile = true;
                }
                return Ok(None);
            };

            let zeile = src.split_to(pos + 1);
            let mut inhalt = &zeile[..pos];
            if let Some(ohne_cr) = inhalt.strip_suffix(b"\r") {
                inhalt = ohne_cr;
            }

            if inhalt.len() > self.max_zeilen_laenge {
                self.verworfene_zeilen += 1;
                tracing::warn!(laenge = inhalt.len(), "Zeile zu lang – verworfen");
                continue;
            }

            if self.zeile_verarbeiten(inhalt) && !self.aktuell.is_empty() {
                return Ok(Some(std::mem::take(&mut self.aktuell)));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if !self.aktuell.is_empty() || !src.is_empty() {
            tracing::warn!(
                felder = self.aktuell.len(),
                rest_bytes = src.len(),
                "Verbindungsende mitten im Frame – unvollstaendiger Frame verworfen"
            );
            self.aktuell = Frame::neu();
            src.clear();
        }
        self.verwerfe_zeile = false;
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl Encoder<Frame> for AmiCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        frame_schreiben(&item, dst);
        Ok(())
    }
}

impl Encoder<&Frame> for AmiCodec {
    type Error = io::Error;

    fn encode(&mut self, item: &Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        frame_schreiben(item, dst);
        Ok(())
    }
}

/// Serialisiert einen Frame in die Wire-Darstellung
pub fn serialisieren(frame: &Frame) -> BytesMut {
    let mut buf = BytesMut::new();
    frame_schreiben(frame, &mut buf);
    buf
}

fn frame_schreiben(frame: &Frame, dst: &mut BytesMut) {
    for (name, wert) in frame.felder() {
        let name = ohne_zeilenumbruch(name);
        let wert = ohne_zeilenumbruch(wert);
        dst.reserve(name.len() + wert.len() + 4);
        dst.put_slice(name.as_bytes());
        dst.put_slice(b": ");
        dst.put_slice(wert.as_bytes());
        dst.put_slice(ZEILENENDE);
    }
    dst.put_slice(ZEILENENDE);
}

/// CR/LF in Werten wuerden eine Frame-Grenze vortaeuschen
fn ohne_zeilenumbruch(s: &str) -> std::borrow::Cow<'_, str> {
    if s.contains(['\r', '\n']) {
        std::borrow::Cow::Owned(s.replace(['\r', '\n'], " "))
    } else {
        std::borrow::Cow::Borrowed(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn alle_frames(codec: &mut AmiCodec, buf: &mut BytesMut) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn einfacher_frame() {
        let mut codec = AmiCodec::new();
        let mut buf = BytesMut::from(&b"Response: Success\r\nActionID: 42\r\nPing: Pong\r\n\r\n"[..]);
        let frame = codec.decode(&mut buf).unwrap().expect("Frame erwartet");
        assert_eq!(frame.status(), Some("Success"));
        assert_eq!(frame.action_id(), Some("42"));
        assert_eq!(frame.get("Ping"), Some("Pong"));
        assert!(buf.is_empty());
    }

    #[test]
    fn serialisieren_und_parsen_erhaelt_mehrfachfelder() {
        let original = Frame::neu()
            .mit_feld("Event", "VarSet")
            .mit_feld("Variable", "a=1")
            .mit_feld("Channel", "SIP/100-1")
            .mit_feld("Variable", "b=2: mit Doppelpunkt");

        let mut buf = serialisieren(&original);
        let mut codec = AmiCodec::new();
        let zurueck = codec.decode(&mut buf).unwrap().expect("Frame erwartet");

        assert_eq!(zurueck, original);
        assert_eq!(
            zurueck.alle("Variable").collect::<Vec<_>>(),
            vec!["a=1", "b=2: mit Doppelpunkt"]
        );
    }

    #[test]
    fn unvollstaendiger_frame_wartet_auf_mehr_daten() {
        let mut codec = AmiCodec::new();
        let mut buf = BytesMut::from(&b"Event: Hangup\r\nChannel: SIP/1"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"00-1\r\n\r\n");
        let frame = codec.decode(&mut buf).unwrap().expect("Frame erwartet");
        assert_eq!(frame.get("Channel"), Some("SIP/100-1"));
    }

    #[test]
    fn mehrere_frames_im_buffer() {
        let mut codec = AmiCodec::new();
        let mut buf = BytesMut::from(
            &b"Event: Newchannel\r\nChannel: A\r\n\r\nEvent: Hangup\r\nChannel: A\r\n\r\n"[..],
        );
        let frames = alle_frames(&mut codec, &mut buf);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].ereignis(), Some("Newchannel"));
        assert_eq!(frames[1].ereignis(), Some("Hangup"));
    }

    #[test]
    fn ungueltige_zeile_wird_verworfen() {
        let mut codec = AmiCodec::new();
        let mut buf =
            BytesMut::from(&b"Event: Hangup\r\nMuell ohne Doppelpunkt\r\nChannel: A\r\n\r\n"[..]);
        let frame = codec.decode(&mut buf).unwrap().expect("Frame erwartet");
        assert_eq!(frame.len(), 2);
        assert_eq!(codec.verworfene_zeilen(), 1);
    }

    #[test]
    fn leerzeilen_ohne_felder_erzeugen_keinen_frame() {
        let mut codec = AmiCodec::new();
        let mut buf = BytesMut::from(&b"\r\n\r\n\nEvent: Hangup\r\n\r\n"[..]);
        let frames = alle_frames(&mut codec, &mut buf);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn nur_lf_als_zeilenende() {
        let mut codec = AmiCodec::new();
        let mut buf = BytesMut::from(&b"Event: Hangup\nChannel: A\n\n"[..]);
        let frame = codec.decode(&mut buf).unwrap().expect("Frame erwartet");
        assert_eq!(frame.get("Channel"), Some("A"));
    }

    #[test]
    fn ueberlange_zeile_resynchronisiert() {
        let mut codec = AmiCodec::with_max_zeilen_laenge(16);
        let mut buf = BytesMut::from(&b"Event: Hangup\r\nChannel: "[..]);
        buf.extend_from_slice(&[b'x'; 64]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        // Rest der langen Zeile kommt spaeter, danach normaler Verkehr
        buf.extend_from_slice(b"xxxx\r\n\r\nEvent: Ping\r\n\r\n");
        let frames = alle_frames(&mut codec, &mut buf);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].ereignis(), Some("Hangup"));
        assert!(frames[0].get("Channel").is_none());
        assert_eq!(frames[1].ereignis(), Some("Ping"));
        assert!(codec.verworfene_zeilen() >= 1);
    }

    #[test]
    fn eof_mitten_im_frame_verwirft_rest() {
        let mut codec = AmiCodec::new();
        let mut buf = BytesMut::from(&b"Event: Hangup\r\nChannel: A\r\n"[..]);
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());

        // Neuer Strom beginnt mit leerem Zustand
        let mut buf = BytesMut::from(&b"Event: Ping\r\n\r\n"[..]);
        let frame = codec.decode(&mut buf).unwrap().expect("Frame erwartet");
        assert_eq!(frame.len(), 1);
    }

    #[test]
    fn encode_ersetzt_zeilenumbrueche_in_werten() {
        let frame = Frame::neu()
            .mit_feld("Action", "Command")
            .mit_feld("Command", "core show\r\n\r\nAction: Logoff");
        let mut buf = serialisieren(&frame);

        let mut codec = AmiCodec::new();
        let frames = alle_frames(&mut codec, &mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].get("Action"), Some("Command"));
        assert!(frames[0].get("Command").unwrap().contains("Logoff"));
    }

    #[test]
    fn encoder_schreibt_leerzeile_am_ende() {
        let mut codec = AmiCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Frame::neu().mit_feld("Action", "Ping"), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"Action: Ping\r\n\r\n");
    }
}
