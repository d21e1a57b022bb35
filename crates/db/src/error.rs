//! Fehlertypen fuer das Konten-Crate

use thiserror::Error;

/// Fehlertypen des Konten-Speichers
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Konto nicht gefunden: {0}")]
    NichtGefunden(String),

    #[error("Benutzername bereits vergeben: {0}")]
    Eindeutigkeit(String),

    #[error("Ungueltige Daten: {0}")]
    UngueltigeDaten(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),
}

impl DbError {
    pub fn nicht_gefunden(msg: impl Into<String>) -> Self {
        Self::NichtGefunden(msg.into())
    }

    /// Gibt true zurueck wenn es sich um einen Eindeutigkeitsfehler handelt
    pub fn ist_eindeutigkeit(&self) -> bool {
        matches!(self, Self::Eindeutigkeit(_))
    }
}

/// Result-Typ fuer den Konten-Speicher
pub type DbResult<T> = Result<T, DbError>;
