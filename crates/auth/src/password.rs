//! Passwort-Hashing mit PBKDF2-HMAC-SHA256
//!
//! Der Konten-Speicher haelt Salt, Hash und Iterationszahl als getrennte
//! Felder, daher PBKDF2 mit festen Parametern statt eines selbst
//! beschreibenden PHC-Strings. Klartextpasswoerter werden nie gespeichert.

use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Iterationszahl fuer neue Hashes
pub const PBKDF2_ITERATIONEN: u32 = 100_000;

/// Salt-Laenge in Bytes
pub const SALT_LAENGE: usize = 16;

/// Hash-Laenge in Bytes
pub const HASH_LAENGE: usize = 32;

/// Erzeugt einen zufaelligen Salt
pub fn salt_erzeugen() -> [u8; SALT_LAENGE] {
    let mut salt = [0u8; SALT_LAENGE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Leitet den Passwort-Hash mit den gegebenen Parametern ab
pub fn passwort_hashen(passwort: &str, salt: &[u8], iterationen: u32) -> [u8; HASH_LAENGE] {
    let mut hash = [0u8; HASH_LAENGE];
    pbkdf2_hmac::<Sha256>(passwort.as_bytes(), salt, iterationen, &mut hash);
    hash
}

/// Verifiziert ein Passwort gegen den gespeicherten Hash
///
/// Der Vergleich laeuft in konstanter Zeit. Ein Hash mit abweichender
/// Laenge verifiziert nie.
pub fn passwort_verifizieren(
    passwort: &str,
    salt: &[u8],
    erwartet: &[u8],
    iterationen: u32,
) -> bool {
    let hash = passwort_hashen(passwort, salt, iterationen);
    hash.as_slice().ct_eq(erwartet).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passwort_hashen_und_verifizieren() {
        let salt = salt_erzeugen();
        let hash = passwort_hashen("sicheres_passwort_123!", &salt, PBKDF2_ITERATIONEN);

        assert!(passwort_verifizieren(
            "sicheres_passwort_123!",
            &salt,
            &hash,
            PBKDF2_ITERATIONEN
        ));
    }

    #[test]
    fn falsches_passwort_wird_abgelehnt() {
        let salt = salt_erzeugen();
        let hash = passwort_hashen("richtiges_passwort", &salt, PBKDF2_ITERATIONEN);

        assert!(!passwort_verifizieren(
            "falsches_passwort",
            &salt,
            &hash,
            PBKDF2_ITERATIONEN
        ));
    }

    #[test]
    fn gleiche_passwoerter_unterschiedliche_salts_unterschiedliche_hashes() {
        let salt1 = salt_erzeugen();
        let salt2 = salt_erzeugen();
        assert_ne!(salt1, salt2, "Zwei Salts muessen verschieden sein");

        let hash1 = passwort_hashen("gleiches_passwort", &salt1, PBKDF2_ITERATIONEN);
        let hash2 = passwort_hashen("gleiches_passwort", &salt2, PBKDF2_ITERATIONEN);
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn abweichende_iterationszahl_aendert_den_hash() {
        let salt = [7u8; SALT_LAENGE];
        let hash1 = passwort_hashen("passwort", &salt, 1000);
        let hash2 = passwort_hashen("passwort", &salt, 1001);
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn falsche_hash_laenge_verifiziert_nie() {
        let salt = salt_erzeugen();
        assert!(!passwort_verifizieren("passwort", &salt, b"zu_kurz", PBKDF2_ITERATIONEN));
    }

    #[test]
    fn zufallspasswoerter_verifizieren_nur_mit_sich_selbst() {
        // Kleine Iterationszahl damit der Test schnell bleibt
        let iterationen = 1000;
        for i in 0..8 {
            let passwort = format!("passwort_{i}");
            let anderes = format!("passwort_{}", i + 1);
            let salt = salt_erzeugen();
            let hash = passwort_hashen(&passwort, &salt, iterationen);

            assert!(passwort_verifizieren(&passwort, &salt, &hash, iterationen));
            assert!(!passwort_verifizieren(&anderes, &salt, &hash, iterationen));
        }
    }
}
