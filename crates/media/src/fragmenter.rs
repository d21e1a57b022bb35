//! Fragmentierer – zerlegt Frames in UDP-taugliche Fragmente
//!
//! Jeder Frame bekommt eine frisch vergebene, prozessweit monoton
//! steigende Nachrichten-ID; alle Fragmente eines Frames tragen dieselbe
//! ID. Der Empfaenger setzt die Fragmente anhand von Gesamtanzahl und
//! Index wieder zusammen.

use std::sync::atomic::{AtomicU32, Ordering};

use sichtruf_protocol::Fragment;

/// Harte Obergrenze fuer die Fragmentanzahl eines Frames
///
/// Groessere Frames werden abgeschnitten statt unbegrenzt zu wachsen –
/// verlustbehaftet fuer pathologische Eingaben, kein Fehler.
pub const MAX_FRAGMENTE: usize = 1024;

/// Vergibt Nachrichten-IDs und zerlegt Frames in Fragmente
///
/// Die ID-Vergabe ist prozessweit monoton (AtomicU32); der Wraparound
/// bei u32 ist eine dokumentierte Einschraenkung.
pub struct Fragmentierer {
    naechste_id: AtomicU32,
}

impl Fragmentierer {
    /// Erstellt einen neuen Fragmentierer (IDs beginnen bei 1)
    pub fn neu() -> Self {
        Self {
            naechste_id: AtomicU32::new(1),
        }
    }

    /// Zerlegt einen Frame in Fragmente mit gemeinsamer Nachrichten-ID
    ///
    /// Es entstehen `ceil(len/max_nutzdaten)` Fragmente, mindestens aber
    /// eines – auch ein leerer Frame muss den Empfaenger erreichen.
    /// Ueberschreitet die Anzahl `MAX_FRAGMENTE`, wird abgeschnitten.
    pub fn fragmentieren(&self, frame: &[u8], max_nutzdaten: usize) -> Vec<Fragment> {
        let max_nutzdaten = max_nutzdaten.max(1);
        let id = self.naechste_id.fetch_add(1, Ordering::Relaxed);

        let mut anzahl = frame.len().div_ceil(max_nutzdaten).max(1);
        if anzahl > MAX_FRAGMENTE {
            tracing::debug!(
                nachricht_id = id,
                fragmente = anzahl,
                maximum = MAX_FRAGMENTE,
                "Frame zu gross, Fragmentanzahl wird abgeschnitten"
            );
            anzahl = MAX_FRAGMENTE;
        }

        (0..anzahl)
            .map(|index| {
                let start = index * max_nutzdaten;
                let ende = ((index + 1) * max_nutzdaten).min(frame.len());
                Fragment::neu(id, anzahl as u16, index as u16, frame[start..ende].to_vec())
            })
            .collect()
    }
}

impl Default for Fragmentierer {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genau_eine_fragmentgrenze() {
        let f = Fragmentierer::neu();
        let fragmente = f.fragmentieren(&vec![0xAB; 100], 100);
        assert_eq!(fragmente.len(), 1);
        assert_eq!(fragmente[0].header.gesamt_anzahl, 1);
        assert_eq!(fragmente[0].nutzdaten.len(), 100);
    }

    #[test]
    fn ein_byte_ueber_der_grenze() {
        let f = Fragmentierer::neu();
        let fragmente = f.fragmentieren(&vec![0xAB; 101], 100);
        assert_eq!(fragmente.len(), 2);
        assert_eq!(fragmente[0].nutzdaten.len(), 100);
        assert_eq!(fragmente[1].nutzdaten.len(), 1);
    }

    #[test]
    fn beispiel_aus_dem_datenblatt() {
        // 12000 Bytes mit 4992er-Fragmenten -> 3 Fragmente: 4992, 4992, 2016
        let f = Fragmentierer::neu();
        let fragmente = f.fragmentieren(&vec![0x42; 12000], 4992);
        assert_eq!(fragmente.len(), 3);
        assert_eq!(fragmente[0].nutzdaten.len(), 4992);
        assert_eq!(fragmente[1].nutzdaten.len(), 4992);
        assert_eq!(fragmente[2].nutzdaten.len(), 2016);
    }

    #[test]
    fn leerer_frame_ergibt_ein_leeres_fragment() {
        let f = Fragmentierer::neu();
        let fragmente = f.fragmentieren(&[], 4992);
        assert_eq!(fragmente.len(), 1);
        assert!(fragmente[0].nutzdaten.is_empty());
        assert_eq!(fragmente[0].header.gesamt_anzahl, 1);
    }

    #[test]
    fn alle_fragmente_teilen_die_id_und_zaehlen_hoch() {
        let f = Fragmentierer::neu();
        let erste = f.fragmentieren(&vec![1; 250], 100);
        let zweite = f.fragmentieren(&vec![2; 50], 100);

        let id1 = erste[0].header.nachricht_id;
        assert!(erste.iter().all(|fr| fr.header.nachricht_id == id1));
        for (i, fr) in erste.iter().enumerate() {
            assert_eq!(fr.header.index as usize, i);
            assert_eq!(fr.header.gesamt_anzahl, 3);
        }

        assert!(zweite[0].header.nachricht_id > id1, "IDs muessen monoton steigen");
    }

    #[test]
    fn zu_grosser_frame_wird_abgeschnitten() {
        let f = Fragmentierer::neu();
        // 2000 Fragmente a 10 Bytes waeren noetig, Obergrenze ist 1024
        let fragmente = f.fragmentieren(&vec![0; 20_000], 10);
        assert_eq!(fragmente.len(), MAX_FRAGMENTE);
        assert_eq!(fragmente[0].header.gesamt_anzahl as usize, MAX_FRAGMENTE);
    }
}
