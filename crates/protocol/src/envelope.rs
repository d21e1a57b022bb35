//! Signaling-Envelopes (TCP)
//!
//! Zeilenbasiertes Textprotokoll: ein Envelope pro Zeile (UTF-8,
//! `\n`-terminiert), Felder durch `|` getrennt. Feld 0 ist das
//! Kommando-Tag, alle weiteren Felder sind kommandospezifisch.
//!
//! ## Zeilenformat
//!
//! ```text
//! KOMMANDO|feld1|feld2|...\n
//! ```
//!
//! Es gibt kein Escaping fuer den Feldtrenner: ein Feldwert darf kein
//! `|` enthalten (dokumentierte Einschraenkung, wird nicht erzwungen).

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Feldtrenner innerhalb einer Envelope-Zeile
pub const FELD_TRENNER: char = '|';

/// Trenner innerhalb des Online-Listen-Felds
pub const LISTEN_TRENNER: char = ',';

/// Standard-maximale Zeilenlaenge (64 KiB, FILE_CHUNK-Zeilen sind gross)
pub const DEFAULT_MAX_ZEILEN_LAENGE: usize = 64 * 1024;

/// Kommando-Tags des Signaling-Protokolls
pub mod kommando {
    pub const REGISTER: &str = "REGISTER";
    pub const LOGIN: &str = "LOGIN";
    pub const OK: &str = "OK";
    pub const FAIL: &str = "FAIL";
    pub const GET_ONLINE: &str = "GET_ONLINE";
    pub const ONLINE_LIST: &str = "ONLINE_LIST";
    pub const MSG: &str = "MSG";
    pub const FILE_REQUEST: &str = "FILE_REQUEST";
    pub const FILE_CHUNK: &str = "FILE_CHUNK";
    pub const FILE_END: &str = "FILE_END";
    pub const CALL_REQUEST: &str = "CALL_REQUEST";
    pub const CALL_ACCEPT: &str = "CALL_ACCEPT";
    pub const LOGOUT: &str = "LOGOUT";
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Ein Signaling-Envelope – geordnete Liste von String-Feldern
///
/// Fehlende Felder werden beim Zugriff als leerer String gelesen, damit
/// verkuerzte Envelopes den Handler nie zum Absturz bringen. Die
/// kommandospezifische Validierung entscheidet dann ueber Ablehnung.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    felder: Vec<String>,
}

impl Envelope {
    /// Erstellt ein Envelope aus fertigen Feldern
    pub fn neu(felder: Vec<String>) -> Self {
        Self { felder }
    }

    /// Parst eine Zeile (ohne Zeilenende) in ein Envelope
    pub fn parse(zeile: &str) -> Self {
        Self {
            felder: zeile.split(FELD_TRENNER).map(str::to_string).collect(),
        }
    }

    /// Gibt das Kommando-Tag zurueck (leer bei leerer Zeile)
    pub fn kommando(&self) -> &str {
        self.feld(0)
    }

    /// Gibt das Feld am Index zurueck, leerer String wenn nicht vorhanden
    pub fn feld(&self, index: usize) -> &str {
        self.felder.get(index).map(String::as_str).unwrap_or("")
    }

    /// Anzahl der vorhandenen Felder
    pub fn feld_anzahl(&self) -> usize {
        self.felder.len()
    }

    /// Serialisiert das Envelope in eine Zeile (ohne Zeilenende)
    pub fn serialisieren(&self) -> String {
        self.felder.join("|")
    }

    // -----------------------------------------------------------------------
    // Typisierte Konstruktoren fuer Server-Antworten
    // -----------------------------------------------------------------------

    /// `OK|anzeigename`
    pub fn ok(anzeigename: &str) -> Self {
        Self::neu(vec![kommando::OK.into(), anzeigename.into()])
    }

    /// `FAIL|grund`
    pub fn fail(grund: &str) -> Self {
        Self::neu(vec![kommando::FAIL.into(), grund.into()])
    }

    /// `ONLINE_LIST|name1,name2,...`
    pub fn online_liste(namen: &[String]) -> Self {
        Self::neu(vec![kommando::ONLINE_LIST.into(), namen.join(",")])
    }

    /// Parst das Listen-Feld eines `ONLINE_LIST`-Envelopes
    pub fn online_namen(&self) -> Vec<String> {
        self.feld(1)
            .split(LISTEN_TRENNER)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl std::fmt::Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.serialisieren())
    }
}

// ---------------------------------------------------------------------------
// EnvelopeCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer das zeilenbasierte Signaling-Protokoll
///
/// Implementiert `Decoder` und `Encoder<Envelope>` fuer die Verwendung
/// mit `tokio_util::codec::Framed`. Zeilen laenger als das konfigurierte
/// Maximum werden als Fehler abgelehnt (Schutz gegen unbegrenzte Puffer).
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    /// Maximale erlaubte Zeilenlaenge in Bytes (ohne Zeilenende)
    max_zeilen_laenge: usize,
}

impl EnvelopeCodec {
    /// Erstellt einen neuen `EnvelopeCodec` mit Standard-Limit
    pub fn new() -> Self {
        Self {
            max_zeilen_laenge: DEFAULT_MAX_ZEILEN_LAENGE,
        }
    }

    /// Erstellt einen Codec mit benutzerdefinierter maximaler Zeilenlaenge
    pub fn with_max_laenge(max_zeilen_laenge: usize) -> Self {
        Self { max_zeilen_laenge }
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Zeilenende suchen
        let newline = src.iter().position(|b| *b == b'\n');

        let ende = match newline {
            Some(pos) => pos,
            None => {
                // Noch keine vollstaendige Zeile – Limit pruefen
                if src.len() > self.max_zeilen_laenge {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "Zeile zu lang: ueber {} Bytes ohne Zeilenende",
                            self.max_zeilen_laenge
                        ),
                    ));
                }
                return Ok(None);
            }
        };

        if ende > self.max_zeilen_laenge {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Zeile zu lang: {} Bytes (Maximum {})",
                    ende, self.max_zeilen_laenge
                ),
            ));
        }

        let mut zeile = src.split_to(ende);
        src.advance(1); // '\n' verbrauchen

        // Optionales '\r' (CRLF) entfernen
        if zeile.last() == Some(&b'\r') {
            zeile.truncate(zeile.len() - 1);
        }

        let text = std::str::from_utf8(&zeile).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Zeile ist kein gueltiges UTF-8: {}", e),
            )
        })?;

        Ok(Some(Envelope::parse(text)))
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let zeile = item.serialisieren();

        if zeile.len() > self.max_zeilen_laenge {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Envelope zu gross: {} Bytes (Maximum {})",
                    zeile.len(),
                    self.max_zeilen_laenge
                ),
            ));
        }

        if zeile.contains('\n') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Envelope-Feld enthaelt ein Zeilenende",
            ));
        }

        dst.reserve(zeile.len() + 1);
        dst.put_slice(zeile.as_bytes());
        dst.put_u8(b'\n');

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_und_serialisieren_round_trip() {
        let env = Envelope::parse("MSG|alice|bob|hallo welt");
        assert_eq!(env.kommando(), "MSG");
        assert_eq!(env.feld(1), "alice");
        assert_eq!(env.feld(2), "bob");
        assert_eq!(env.feld(3), "hallo welt");
        assert_eq!(env.serialisieren(), "MSG|alice|bob|hallo welt");
    }

    #[test]
    fn fehlende_felder_sind_leer() {
        let env = Envelope::parse("LOGIN");
        assert_eq!(env.kommando(), "LOGIN");
        assert_eq!(env.feld(1), "");
        assert_eq!(env.feld(7), "");
        assert_eq!(env.feld_anzahl(), 1);
    }

    #[test]
    fn leere_zeile_hat_leeres_kommando() {
        let env = Envelope::parse("");
        assert_eq!(env.kommando(), "");
        assert_eq!(env.feld_anzahl(), 1);
    }

    #[test]
    fn online_liste_erstellen_und_parsen() {
        let namen = vec!["anna".to_string(), "bob".to_string()];
        let env = Envelope::online_liste(&namen);
        assert_eq!(env.serialisieren(), "ONLINE_LIST|anna,bob");
        assert_eq!(env.online_namen(), namen);
    }

    #[test]
    fn leere_online_liste() {
        let env = Envelope::online_liste(&[]);
        assert_eq!(env.serialisieren(), "ONLINE_LIST|");
        assert!(env.online_namen().is_empty());
    }

    #[test]
    fn codec_encode_decode_round_trip() {
        let mut codec = EnvelopeCodec::new();
        let original = Envelope::parse("CALL_REQUEST|anna|bob");

        let mut buf = BytesMut::new();
        codec.encode(original.clone(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"CALL_REQUEST|anna|bob\n");

        let decoded = codec.decode(&mut buf).unwrap().expect("Envelope erwartet");
        assert_eq!(decoded, original);
        assert!(buf.is_empty());
    }

    #[test]
    fn codec_unvollstaendige_zeile() {
        let mut codec = EnvelopeCodec::new();
        let mut buf = BytesMut::from(&b"GET_ONL"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"INE\n");
        let env = codec.decode(&mut buf).unwrap().expect("Envelope erwartet");
        assert_eq!(env.kommando(), "GET_ONLINE");
    }

    #[test]
    fn codec_mehrere_zeilen_im_buffer() {
        let mut codec = EnvelopeCodec::new();
        let mut buf = BytesMut::from(&b"LOGOUT\nGET_ONLINE\n"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().kommando(), "LOGOUT");
        assert_eq!(
            codec.decode(&mut buf).unwrap().unwrap().kommando(),
            "GET_ONLINE"
        );
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn codec_crlf_wird_toleriert() {
        let mut codec = EnvelopeCodec::new();
        let mut buf = BytesMut::from(&b"LOGIN|anna|geheim\r\n"[..]);
        let env = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(env.feld(2), "geheim");
    }

    #[test]
    fn codec_ablehnung_zu_lange_zeile() {
        let mut codec = EnvelopeCodec::with_max_laenge(16);
        let mut buf = BytesMut::from(&b"MSG|aaaaaaaaaaaaaaaaaaaaaaaa"[..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn codec_ablehnung_beim_encode_zu_grosses_envelope() {
        let mut codec = EnvelopeCodec::with_max_laenge(8);
        let mut buf = BytesMut::new();
        let env = Envelope::parse("MSG|anna|bob|viel zu langer inhalt");
        assert!(codec.encode(env, &mut buf).is_err());
    }

    #[test]
    fn codec_ablehnung_ungueltiges_utf8() {
        let mut codec = EnvelopeCodec::new();
        let mut buf = BytesMut::from(&[0xFF, 0xFE, b'\n'][..]);
        assert!(codec.decode(&mut buf).is_err());
    }
}
