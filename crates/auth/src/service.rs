//! Auth-Service fuer Sichtruf
//!
//! Registrierung und Anmeldung gegen den Konten-Speicher. Alt-Konten mit
//! Klartextpasswort werden beim ersten erfolgreichen Login auf die
//! Hash-Ablage migriert.

use std::sync::Arc;

use sichtruf_db::{KontenRepository, KontoRecord};

use crate::error::{AuthError, AuthResult};
use crate::password::{
    passwort_hashen, passwort_verifizieren, salt_erzeugen, HASH_LAENGE, PBKDF2_ITERATIONEN,
};

fn base64_kodieren(bytes: &[u8]) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)
}

fn base64_dekodieren(text: &str) -> Option<Vec<u8>> {
    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, text).ok()
}

/// Auth-Service – Registrierung, Anmeldung, Klartext-Migration
pub struct AuthService<K: KontenRepository> {
    konten: Arc<K>,
}

impl<K: KontenRepository> AuthService<K> {
    /// Erstellt einen neuen AuthService
    pub fn neu(konten: Arc<K>) -> Self {
        Self { konten }
    }

    /// Registriert einen neuen Benutzer und gibt den Anzeigenamen zurueck
    ///
    /// Schlaegt fehl wenn Benutzername oder Passwort leer sind oder der
    /// Benutzername (case-insensitiv) bereits vergeben ist. Ein
    /// Schreibfehler des Speichers laesst die Registrierung fehlschlagen.
    pub fn registrieren(
        &self,
        username: &str,
        passwort: &str,
        anzeigename: &str,
    ) -> AuthResult<String> {
        if username.trim().is_empty() || passwort.trim().is_empty() {
            return Err(AuthError::EingabeFehlt);
        }

        let anzeigename = if anzeigename.trim().is_empty() {
            username
        } else {
            anzeigename
        };

        let salt = salt_erzeugen();
        let hash = passwort_hashen(passwort, &salt, PBKDF2_ITERATIONEN);

        let konto = KontoRecord {
            username: username.to_string(),
            passwort: None,
            passwort_hash: Some(base64_kodieren(&hash)),
            salt: Some(base64_kodieren(&salt)),
            iterationen: PBKDF2_ITERATIONEN,
            display_name: Some(anzeigename.to_string()),
        };
        let anzeige = konto.anzeigename().to_string();

        self.konten.anlegen(konto).map_err(|e| {
            if e.ist_eindeutigkeit() {
                AuthError::BenutzernameVergeben(username.to_string())
            } else {
                AuthError::Datenbank(e)
            }
        })?;

        tracing::info!(username = %username, "Neuer Benutzer registriert");
        Ok(anzeige)
    }

    /// Meldet einen Benutzer an und gibt den Anzeigenamen zurueck
    ///
    /// Konten mit Hash werden in konstanter Zeit verifiziert. Alt-Konten
    /// mit Klartextpasswort werden direkt verglichen und bei Erfolg
    /// migriert; ein Fehlschlag der Migrations-Persistenz wird geloggt,
    /// die Anmeldung bleibt erfolgreich.
    pub fn anmelden(&self, username: &str, passwort: &str) -> AuthResult<String> {
        let konto = self
            .konten
            .laden(username)
            .ok_or(AuthError::KontoNichtGefunden)?;

        let ok = if konto.hat_hash() {
            self.hash_pruefen(&konto, passwort)
        } else if let Some(klartext) = &konto.passwort {
            let stimmt = klartext == passwort;
            if stimmt {
                self.klartext_migrieren(&konto, passwort);
            }
            stimmt
        } else {
            // Konto ohne Hash und ohne Klartext kann nie verifizieren
            false
        };

        if !ok {
            tracing::warn!(username = %username, "Fehlgeschlagener Login-Versuch");
            return Err(AuthError::FalschesPasswort);
        }

        tracing::info!(username = %username, "Benutzer angemeldet");
        Ok(konto.anzeigename().to_string())
    }

    /// Verifiziert gegen die gespeicherten Hash-Parameter
    fn hash_pruefen(&self, konto: &KontoRecord, passwort: &str) -> bool {
        let (Some(salt_b64), Some(hash_b64)) = (&konto.salt, &konto.passwort_hash) else {
            return false;
        };

        let (Some(salt), Some(erwartet)) = (base64_dekodieren(salt_b64), base64_dekodieren(hash_b64))
        else {
            tracing::warn!(username = %konto.username, "Konto mit nicht dekodierbarem Salt/Hash");
            return false;
        };

        passwort_verifizieren(passwort, &salt, &erwartet, konto.iterationen)
    }

    /// Ersetzt das Klartextpasswort durch einen frischen Salt+Hash
    ///
    /// Best-effort: ein Persistenzfehler darf die Anmeldung nicht kippen.
    fn klartext_migrieren(&self, konto: &KontoRecord, passwort: &str) {
        let salt = salt_erzeugen();
        let hash: [u8; HASH_LAENGE] = passwort_hashen(passwort, &salt, PBKDF2_ITERATIONEN);

        let migriert = KontoRecord {
            passwort: None,
            passwort_hash: Some(base64_kodieren(&hash)),
            salt: Some(base64_kodieren(&salt)),
            iterationen: PBKDF2_ITERATIONEN,
            ..konto.clone()
        };

        match self.konten.aktualisieren(&migriert) {
            Ok(()) => {
                tracing::info!(username = %konto.username, "Klartextpasswort auf Hash migriert");
            }
            Err(e) => {
                tracing::warn!(
                    username = %konto.username,
                    fehler = %e,
                    "Migration des Klartextpassworts konnte nicht gespeichert werden"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use sichtruf_db::SpeicherKontenStore;

    fn service() -> AuthService<SpeicherKontenStore> {
        AuthService::neu(Arc::new(SpeicherKontenStore::neu()))
    }

    #[test]
    fn registrieren_und_anmelden() {
        let auth = service();
        let anzeige = auth
            .registrieren("anna", "geheim123", "Anna A.")
            .expect("Registrierung muss klappen");
        assert_eq!(anzeige, "Anna A.");

        let anzeige = auth.anmelden("anna", "geheim123").expect("Login muss klappen");
        assert_eq!(anzeige, "Anna A.");
    }

    #[test]
    fn anzeigename_fallback_auf_benutzername() {
        let auth = service();
        let anzeige = auth.registrieren("bob", "pw12345", "").unwrap();
        assert_eq!(anzeige, "bob");
    }

    #[test]
    fn leere_felder_werden_abgelehnt() {
        let auth = service();
        assert!(matches!(
            auth.registrieren("", "pw", "X"),
            Err(AuthError::EingabeFehlt)
        ));
        assert!(matches!(
            auth.registrieren("anna", "   ", "X"),
            Err(AuthError::EingabeFehlt)
        ));
    }

    #[test]
    fn doppelte_registrierung_case_insensitiv() {
        let auth = service();
        auth.registrieren("Anna", "pw12345", "").unwrap();

        assert!(matches!(
            auth.registrieren("anna", "anderes", ""),
            Err(AuthError::BenutzernameVergeben(_))
        ));
    }

    #[test]
    fn falsches_passwort() {
        let auth = service();
        auth.registrieren("anna", "richtig", "").unwrap();

        assert!(matches!(
            auth.anmelden("anna", "falsch"),
            Err(AuthError::FalschesPasswort)
        ));
    }

    #[test]
    fn unbekanntes_konto() {
        let auth = service();
        assert!(matches!(
            auth.anmelden("niemand", "pw"),
            Err(AuthError::KontoNichtGefunden)
        ));
    }

    #[test]
    fn klartext_wird_niemals_gespeichert() {
        let konten = Arc::new(SpeicherKontenStore::neu());
        let auth = AuthService::neu(Arc::clone(&konten));
        auth.registrieren("anna", "geheim123", "").unwrap();

        let konto = konten.laden("anna").unwrap();
        assert!(konto.passwort.is_none());
        assert!(konto.hat_hash());
        assert_eq!(konto.iterationen, PBKDF2_ITERATIONEN);
    }

    #[test]
    fn legacy_konto_wird_beim_login_migriert() {
        let konten = Arc::new(SpeicherKontenStore::neu());
        konten
            .anlegen(KontoRecord {
                username: "alt".into(),
                passwort: Some("geheim".into()),
                passwort_hash: None,
                salt: None,
                iterationen: PBKDF2_ITERATIONEN,
                display_name: Some("Alter Hase".into()),
            })
            .unwrap();

        let auth = AuthService::neu(Arc::clone(&konten));
        let anzeige = auth.anmelden("alt", "geheim").expect("Legacy-Login muss klappen");
        assert_eq!(anzeige, "Alter Hase");

        // Konto ist jetzt migriert: Klartext weg, Hash da
        let konto = konten.laden("alt").unwrap();
        assert!(konto.passwort.is_none());
        assert!(konto.hat_hash());

        // Folge-Login laeuft ueber den Hash-Pfad
        assert!(auth.anmelden("alt", "geheim").is_ok());
        assert!(matches!(
            auth.anmelden("alt", "falsch"),
            Err(AuthError::FalschesPasswort)
        ));
    }

    #[test]
    fn legacy_konto_falsches_passwort_migriert_nicht() {
        let konten = Arc::new(SpeicherKontenStore::neu());
        konten
            .anlegen(KontoRecord {
                username: "alt".into(),
                passwort: Some("geheim".into()),
                passwort_hash: None,
                salt: None,
                iterationen: PBKDF2_ITERATIONEN,
                display_name: None,
            })
            .unwrap();

        let auth = AuthService::neu(Arc::clone(&konten));
        assert!(auth.anmelden("alt", "falsch").is_err());

        let konto = konten.laden("alt").unwrap();
        assert_eq!(konto.passwort.as_deref(), Some("geheim"));
        assert!(!konto.hat_hash());
    }
}
