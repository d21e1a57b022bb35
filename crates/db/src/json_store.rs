//! JSON-Datei-Store fuer Benutzerkonten
//!
//! Der gesamte Bestand liegt als pretty-printed JSON-Array in einer
//! einzigen Datei. Jede Mutation laeuft als Read-Modify-Write unter einem
//! einzigen Lock und schreibt die komplette Datei neu.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{DbError, DbResult};
use crate::models::KontoRecord;
use crate::repository::KontenRepository;

/// Datei-gestuetzter Konten-Store
///
/// Thread-safe: alle Zugriffe laufen ueber das innere Mutex.
pub struct JsonKontenStore {
    pfad: PathBuf,
    konten: Mutex<Vec<KontoRecord>>,
}

impl JsonKontenStore {
    /// Laedt den Bestand aus der Datei, leerer Bestand wenn sie fehlt
    ///
    /// Eine nicht parsebare Datei ist ein harter Fehler, kein leerer
    /// Bestand – der naechste Schreibzugriff wuerde sonst alle Konten
    /// ueberschreiben.
    pub fn laden(pfad: impl Into<PathBuf>) -> DbResult<Self> {
        let pfad = pfad.into();

        let konten: Vec<KontoRecord> = match std::fs::read_to_string(&pfad) {
            Ok(inhalt) => serde_json::from_str(&inhalt)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(pfad = %pfad.display(), "Konten-Datei nicht gefunden, starte leer");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            pfad = %pfad.display(),
            anzahl = konten.len(),
            "Konten-Bestand geladen"
        );

        Ok(Self {
            pfad,
            konten: Mutex::new(konten),
        })
    }

    /// Gibt den Datei-Pfad zurueck
    pub fn pfad(&self) -> &Path {
        &self.pfad
    }

    /// Schreibt den Bestand – muss unter dem Lock aufgerufen werden
    fn speichern_gesperrt(&self, konten: &[KontoRecord]) -> DbResult<()> {
        let json = serde_json::to_string_pretty(konten)?;
        std::fs::write(&self.pfad, json)?;
        Ok(())
    }
}

impl KontenRepository for JsonKontenStore {
    fn laden(&self, username: &str) -> Option<KontoRecord> {
        self.konten
            .lock()
            .iter()
            .find(|k| k.username == username)
            .cloned()
    }

    fn anlegen(&self, konto: KontoRecord) -> DbResult<()> {
        let mut konten = self.konten.lock();

        if konten
            .iter()
            .any(|k| k.username.eq_ignore_ascii_case(&konto.username))
        {
            return Err(DbError::Eindeutigkeit(konto.username));
        }

        konten.push(konto);

        // Schreibfehler macht das Anlegen rueckgaengig
        if let Err(e) = self.speichern_gesperrt(&konten) {
            konten.pop();
            return Err(e);
        }

        Ok(())
    }

    fn aktualisieren(&self, konto: &KontoRecord) -> DbResult<()> {
        let mut konten = self.konten.lock();

        let eintrag = konten
            .iter_mut()
            .find(|k| k.username == konto.username)
            .ok_or_else(|| DbError::nicht_gefunden(&konto.username))?;

        let vorher = std::mem::replace(eintrag, konto.clone());

        if let Err(e) = self.speichern_gesperrt(&konten) {
            // Schreibfehler: alten Zustand wiederherstellen
            if let Some(eintrag) = konten.iter_mut().find(|k| k.username == konto.username) {
                *eintrag = vorher;
            }
            return Err(e);
        }

        Ok(())
    }

    fn alle(&self) -> Vec<KontoRecord> {
        self.konten.lock().clone()
    }
}
