//! Fehlertypen fuer den Auth-Service

use thiserror::Error;

/// Alle moeglichen Fehler im Auth-Service
#[derive(Debug, Error)]
pub enum AuthError {
    // --- Eingabe ---
    #[error("Benutzername und Passwort erforderlich")]
    EingabeFehlt,

    // --- Authentifizierung ---
    #[error("Konto nicht gefunden")]
    KontoNichtGefunden,

    #[error("Falsches Passwort")]
    FalschesPasswort,

    // --- Registrierung ---
    #[error("Benutzername bereits vergeben: {0}")]
    BenutzernameVergeben(String),

    // --- Persistenz ---
    #[error("Konten-Speicher-Fehler: {0}")]
    Datenbank(#[from] sichtruf_db::DbError),
}

/// Result-Alias fuer den Auth-Service
pub type AuthResult<T> = Result<T, AuthError>;
