//! Medien-Protokoll (UDP)
//!
//! Definiert das binaere Fragment-Format fuer die Video-/Audio-Uebertragung
//! via UDP. Ein Frame wird in Fragmente zerlegt, jedes Fragment traegt
//! einen 8-Byte-Header mit Nachrichten-ID, Gesamtanzahl und Index.
//!
//! ## Datagramm-Format (Header = 8 Bytes, kein serde)
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       4   NachrichtenId (little-endian u32)
//!  4       2   Gesamtanzahl Fragmente (little-endian u16)
//!  6       2   Fragment-Index (little-endian u16)
//!  8+      N   Nutzdaten
//! ```
//!
//! Datagramme kuerzer als der Header werden vom Empfaenger kommentarlos
//! verworfen (der Transport ist unbestaetigt).

use std::io;

/// Maximale Datagramm-Groesse inkl. Header
pub const MAX_DATAGRAMM_LAENGE: usize = 5000;

/// Maximale Nutzdaten pro Fragment
pub const MAX_FRAGMENT_NUTZDATEN: usize = MAX_DATAGRAMM_LAENGE - FragmentHeader::SIZE;

// ---------------------------------------------------------------------------
// FragmentHeader
// ---------------------------------------------------------------------------

/// 8-Byte Header eines Medien-Fragments
///
/// Direkte Byte-Serialisierung, kein serde (Hot Path).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    /// Monoton steigende Nachrichten-ID, eindeutig pro Absender-Instanz
    /// (Wraparound bei u32 ist eine dokumentierte Einschraenkung)
    pub nachricht_id: u32,
    /// Gesamtanzahl der Fragmente dieser Nachricht
    pub gesamt_anzahl: u16,
    /// Index dieses Fragments in `[0, gesamt_anzahl)`
    pub index: u16,
}

impl FragmentHeader {
    /// Header-Groesse in Bytes
    pub const SIZE: usize = 8;

    /// Erstellt einen neuen Header
    pub fn new(nachricht_id: u32, gesamt_anzahl: u16, index: u16) -> Self {
        Self {
            nachricht_id,
            gesamt_anzahl,
            index,
        }
    }

    /// Serialisiert den Header in ein 8-Byte-Array (little-endian)
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.nachricht_id.to_le_bytes());
        buf[4..6].copy_from_slice(&self.gesamt_anzahl.to_le_bytes());
        buf[6..8].copy_from_slice(&self.index.to_le_bytes());
        buf
    }

    /// Deserialisiert einen Header aus einem Byte-Slice
    ///
    /// # Fehler
    /// - `InvalidData` wenn das Slice kuerzer als 8 Bytes ist
    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Header zu kurz: {} Bytes (erwartet {})",
                    buf.len(),
                    Self::SIZE
                ),
            ));
        }

        let nachricht_id = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let gesamt_anzahl = u16::from_le_bytes([buf[4], buf[5]]);
        let index = u16::from_le_bytes([buf[6], buf[7]]);

        Ok(Self {
            nachricht_id,
            gesamt_anzahl,
            index,
        })
    }
}

// ---------------------------------------------------------------------------
// Fragment
// ---------------------------------------------------------------------------

/// Vollstaendiges Medien-Fragment (Header + Nutzdaten)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// 8-Byte Header
    pub header: FragmentHeader,
    /// Fragment-Nutzdaten (max. `MAX_FRAGMENT_NUTZDATEN` Bytes)
    pub nutzdaten: Vec<u8>,
}

impl Fragment {
    /// Erstellt ein neues Fragment
    pub fn neu(nachricht_id: u32, gesamt_anzahl: u16, index: u16, nutzdaten: Vec<u8>) -> Self {
        Self {
            header: FragmentHeader::new(nachricht_id, gesamt_anzahl, index),
            nutzdaten,
        }
    }

    /// Serialisiert das gesamte Fragment in einen Byte-Vec
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FragmentHeader::SIZE + self.nutzdaten.len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.nutzdaten);
        buf
    }

    /// Deserialisiert ein Fragment aus einem Byte-Slice und validiert es
    ///
    /// # Fehler
    /// - Header zu kurz
    /// - Nutzdaten ueberschreiten `MAX_FRAGMENT_NUTZDATEN`
    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        let header = FragmentHeader::decode(buf)?;
        let nutzdaten = &buf[FragmentHeader::SIZE..];

        if nutzdaten.len() > MAX_FRAGMENT_NUTZDATEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Nutzdaten zu lang: {} Bytes (Maximum {})",
                    nutzdaten.len(),
                    MAX_FRAGMENT_NUTZDATEN
                ),
            ));
        }

        Ok(Self {
            header,
            nutzdaten: nutzdaten.to_vec(),
        })
    }

    /// Gesamtgroesse des Fragments in Bytes
    pub fn groesse(&self) -> usize {
        FragmentHeader::SIZE + self.nutzdaten.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
