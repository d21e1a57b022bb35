//! Datensaetze des Konten-Speichers
//!
//! `KontoRecord` ist das persistierte Abbild eines Benutzerkontos. Die
//! Felder entsprechen exakt dem Datei-Format: Benutzername, optionales
//! Legacy-Klartextpasswort (nur fuer die Migration), Passwort-Hash, Salt,
//! Iterationszahl und Anzeigename.

use serde::{Deserialize, Serialize};

/// Persistiertes Benutzerkonto
///
/// Neue Konten werden immer mit `passwort_hash` + `salt` angelegt; das
/// Feld `passwort` existiert nur noch fuer Alt-Datenbestaende und wird
/// beim ersten erfolgreichen Login geleert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KontoRecord {
    /// Eindeutiger Benutzername (Eindeutigkeit case-insensitiv)
    pub username: String,

    /// Legacy-Klartextpasswort – nur fuer die Migration, nie neu geschrieben
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passwort: Option<String>,

    /// PBKDF2-Hash, base64-kodiert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passwort_hash: Option<String>,

    /// Salt, base64-kodiert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,

    /// Iterationszahl mit der `passwort_hash` abgeleitet wurde
    #[serde(default = "standard_iterationen")]
    pub iterationen: u32,

    /// Anzeigename (Fallback: Benutzername)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

fn standard_iterationen() -> u32 {
    100_000
}

impl KontoRecord {
    /// Gibt den Anzeigenamen zurueck, Fallback auf den Benutzernamen
    pub fn anzeigename(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }

    /// Prueft ob das Konto bereits auf Hash-Speicherung migriert ist
    pub fn hat_hash(&self) -> bool {
        self.passwort_hash.is_some() && self.salt.is_some()
    }
}
