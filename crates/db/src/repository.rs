//! Repository-Trait fuer den Konten-Zugriff
//!
//! Entkoppelt den Auth-Service von der konkreten Ablage. Alle
//! Implementierungen serialisieren Schreibzugriffe (Read-Modify-Write des
//! gesamten Bestands) hinter einem einzigen Lock, damit parallele
//! Registrierungen keine Updates verlieren.

use parking_lot::Mutex;

use crate::error::{DbError, DbResult};
use crate::models::KontoRecord;

/// Zugriff auf den Konten-Bestand
///
/// `laden` vergleicht case-sensitiv (Session-Schluessel), `anlegen`
/// prueft die Eindeutigkeit case-insensitiv (Registrierung).
pub trait KontenRepository: Send + Sync {
    /// Laedt ein Konto anhand des Benutzernamens (case-sensitiv)
    fn laden(&self, username: &str) -> Option<KontoRecord>;

    /// Legt ein neues Konto an und persistiert den Bestand
    ///
    /// Schlaegt mit `DbError::Eindeutigkeit` fehl wenn der Benutzername
    /// (case-insensitiv) bereits vergeben ist. Pruefung und Einfuegen
    /// laufen atomar unter dem Store-Lock.
    fn anlegen(&self, konto: KontoRecord) -> DbResult<()>;

    /// Ersetzt ein bestehendes Konto und persistiert den Bestand
    ///
    /// Wird nur fuer die Klartext-Migration verwendet. Schlaegt mit
    /// `DbError::NichtGefunden` fehl wenn das Konto nicht existiert.
    fn aktualisieren(&self, konto: &KontoRecord) -> DbResult<()>;

    /// Gibt einen Schnappschuss aller Konten zurueck
    fn alle(&self) -> Vec<KontoRecord>;
}

// ---------------------------------------------------------------------------
// SpeicherKontenStore – fluechtige Implementierung fuer Tests
// ---------------------------------------------------------------------------

/// In-Memory-Implementierung des `KontenRepository`
///
/// Identische Semantik wie der Datei-Store, nur ohne Persistenz.
#[derive(Default)]
pub struct SpeicherKontenStore {
    konten: Mutex<Vec<KontoRecord>>,
}

impl SpeicherKontenStore {
    /// Erstellt einen leeren Store
    pub fn neu() -> Self {
        Self::default()
    }
}

impl KontenRepository for SpeicherKontenStore {
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
        Ok(())
    }

    fn aktualisieren(&self, konto: &KontoRecord) -> DbResult<()> {
        let mut konten = self.konten.lock();
        match konten.iter_mut().find(|k| k.username == konto.username) {
            Some(eintrag) => {
                *eintrag = konto.clone();
                Ok(())
            }
            None => Err(DbError::nicht_gefunden(&konto.username)),
        }
    }

    fn alle(&self) -> Vec<KontoRecord> {
        self.konten.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn konto(name: &str) -> KontoRecord {
        KontoRecord {
            username: name.into(),
            passwort: None,
            passwort_hash: Some("aGFzaA==".into()),
            salt: Some("c2FsdA==".into()),
            iterationen: 100_000,
            display_name: None,
        }
    }

    #[test]
    fn anlegen_und_laden() {
        let store = SpeicherKontenStore::neu();
        store.anlegen(konto("anna")).unwrap();

        assert!(store.laden("anna").is_some());
        assert!(store.laden("bob").is_none());
        assert_eq!(store.alle().len(), 1);
    }

    #[test]
    fn laden_ist_case_sensitiv() {
        let store = SpeicherKontenStore::neu();
        store.anlegen(konto("Anna")).unwrap();
        assert!(store.laden("anna").is_none());
        assert!(store.laden("Anna").is_some());
    }

    #[test]
    fn anlegen_prueft_eindeutigkeit_case_insensitiv() {
        let store = SpeicherKontenStore::neu();
        store.anlegen(konto("Anna")).unwrap();

        let fehler = store.anlegen(konto("anna")).unwrap_err();
        assert!(fehler.ist_eindeutigkeit());
        assert_eq!(store.alle().len(), 1);
    }

    #[test]
    fn aktualisieren_unbekanntes_konto() {
        let store = SpeicherKontenStore::neu();
        let fehler = store.aktualisieren(&konto("nix")).unwrap_err();
        assert!(matches!(fehler, DbError::NichtGefunden(_)));
    }
}
