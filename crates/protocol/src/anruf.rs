//! Anruf-Vermittlung – typisierte Sicht auf das vermittelte `CALL_ACCEPT`
//!
//! Der Server sendet beiden Teilnehmern dasselbe Envelope:
//!
//! ```text
//! CALL_ACCEPT|anrufer|angerufener|adresseAnrufer|adresseAngerufener|p1|p2|p3|p4
//! ```
//!
//! Die vier Ports sind eine Konvention: der Anrufer sendet Video auf `p1`
//! und Audio auf `p2` und lauscht auf `p3`/`p4`; der Angerufene spiegelt
//! das. Jede Seite leitet ihre Sende- und Empfangs-Endpunkte allein aus
//! diesem einen Envelope ab – einen weiteren Rendezvous-Schritt gibt es
//! nicht.

use sichtruf_core::AnrufPorts;

use crate::envelope::{kommando, Envelope};

// ---------------------------------------------------------------------------
// AnrufRolle
// ---------------------------------------------------------------------------

/// Rolle eines Teilnehmers in einem vermittelten Anruf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnrufRolle {
    /// Hat den Anruf angefordert (`CALL_REQUEST` gesendet)
    Anrufer,
    /// Hat den Anruf angenommen (`CALL_ACCEPT` gesendet)
    Angerufener,
}

// ---------------------------------------------------------------------------
// AnrufEndpunkte
// ---------------------------------------------------------------------------

/// Lokale Sende-/Empfangsendpunkte einer Seite, abgeleitet aus der
/// Port-Konvention
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnrufEndpunkte {
    /// Beobachtete Adresse der Gegenstelle
    pub gegenstelle: String,
    /// Remote-Port fuer ausgehendes Video
    pub video_senden: u16,
    /// Remote-Port fuer ausgehendes Audio
    pub audio_senden: u16,
    /// Lokaler Port fuer eingehendes Video
    pub video_empfangen: u16,
    /// Lokaler Port fuer eingehendes Audio
    pub audio_empfangen: u16,
}

// ---------------------------------------------------------------------------
// AnrufSetup
// ---------------------------------------------------------------------------

/// Inhalt des vermittelten `CALL_ACCEPT`-Envelopes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnrufSetup {
    /// Benutzername des Anrufers
    pub anrufer: String,
    /// Benutzername des Angerufenen
    pub angerufener: String,
    /// Beobachtete Adresse des Anrufers
    pub adresse_anrufer: String,
    /// Beobachtete Adresse des Angerufenen
    pub adresse_angerufener: String,
    /// Die vier Medien-Ports
    pub ports: AnrufPorts,
}

impl AnrufSetup {
    /// Serialisiert das Setup in das Envelope das beide Seiten erhalten
    pub fn als_envelope(&self) -> Envelope {
        Envelope::neu(vec![
            kommando::CALL_ACCEPT.into(),
            self.anrufer.clone(),
            self.angerufener.clone(),
            self.adresse_anrufer.clone(),
            self.adresse_angerufener.clone(),
            self.ports.video_a.to_string(),
            self.ports.audio_a.to_string(),
            self.ports.video_b.to_string(),
            self.ports.audio_b.to_string(),
        ])
    }

    /// Parst ein vermitteltes `CALL_ACCEPT`-Envelope
    ///
    /// Gibt `None` zurueck wenn das Kommando nicht passt, Felder fehlen
    /// oder ein Port keine Zahl ist.
    pub fn aus_envelope(env: &Envelope) -> Option<Self> {
        if env.kommando() != kommando::CALL_ACCEPT || env.feld_anzahl() < 9 {
            return None;
        }

        let port = |i: usize| env.feld(i).parse::<u16>().ok();

        Some(Self {
            anrufer: env.feld(1).to_string(),
            angerufener: env.feld(2).to_string(),
            adresse_anrufer: env.feld(3).to_string(),
            adresse_angerufener: env.feld(4).to_string(),
            ports: AnrufPorts {
                video_a: port(5)?,
                audio_a: port(6)?,
                video_b: port(7)?,
                audio_b: port(8)?,
            },
        })
    }

    /// Bestimmt die Rolle des gegebenen Benutzers in diesem Anruf
    pub fn rolle_fuer(&self, benutzername: &str) -> Option<AnrufRolle> {
        if benutzername == self.anrufer {
            Some(AnrufRolle::Anrufer)
        } else if benutzername == self.angerufener {
            Some(AnrufRolle::Angerufener)
        } else {
            None
        }
    }

    /// Leitet die lokalen Endpunkte fuer die gegebene Rolle ab
    pub fn endpunkte_fuer(&self, rolle: AnrufRolle) -> AnrufEndpunkte {
        match rolle {
            AnrufRolle::Anrufer => AnrufEndpunkte {
                gegenstelle: self.adresse_angerufener.clone(),
                video_senden: self.ports.video_a,
                audio_senden: self.ports.audio_a,
                video_empfangen: self.ports.video_b,
                audio_empfangen: self.ports.audio_b,
            },
            AnrufRolle::Angerufener => AnrufEndpunkte {
                gegenstelle: self.adresse_anrufer.clone(),
                video_senden: self.ports.video_b,
                audio_senden: self.ports.audio_b,
                video_empfangen: self.ports.video_a,
                audio_empfangen: self.ports.audio_a,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
