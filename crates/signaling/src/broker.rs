//! Call-Broker – vermittelt den Anruf-Handshake zweier Identitaeten
//!
//! Ablauf pro Anruf-Versuch:
//!
//! ```text
//! Requested --(CALL_REQUEST weitergeleitet)--> Accepted --(CALL_ACCEPT
//! beider Seiten)--> Brokered
//! ```
//!
//! Nach dem Vermitteln verfolgt der Broker nichts weiter – die
//! Medien-Streams laufen direkt zwischen den Peers und tragen kein
//! Session-Objekt. Der Broker selbst ist zustandslos: alles was er
//! braucht steht in der Registry und im jeweiligen Envelope.
//!
//! Das eine an beide Seiten gesendete Setup-Envelope (beobachtete
//! Adressen + vier Ports) ist der gesamte Endpunkt-Austausch; es gibt
//! keinen weiteren Rendezvous-Schritt.

use sichtruf_core::AnrufPorts;
use sichtruf_protocol::{AnrufSetup, Envelope};

use crate::registry::SessionRegistry;

/// Vermittelt Anruf-Anfragen und -Annahmen ueber die Registry
pub struct CallBroker {
    ports: AnrufPorts,
}

impl CallBroker {
    /// Erstellt einen neuen CallBroker mit den konfigurierten Ports
    pub fn neu(ports: AnrufPorts) -> Self {
        Self { ports }
    }

    /// Leitet ein `CALL_REQUEST|von|zu` an den Angerufenen weiter
    ///
    /// Ist der Angerufene offline, wird die Anfrage kommentarlos
    /// verworfen – der Anrufer erhaelt keine Rueckmeldung.
    pub fn anfrage_weiterleiten(&self, registry: &SessionRegistry, envelope: &Envelope) {
        let zu = envelope.feld(2);
        if zu.is_empty() {
            return;
        }

        if registry.senden_an(zu, envelope.clone()) {
            tracing::debug!(von = %envelope.feld(1), zu = %zu, "CALL_REQUEST weitergeleitet");
        } else {
            tracing::debug!(zu = %zu, "Angerufener offline, CALL_REQUEST verworfen");
        }
    }

    /// Vermittelt eine Anruf-Annahme
    ///
    /// Loest die beobachteten Adressen beider Seiten aus der Registry auf
    /// und sendet **beiden** dasselbe Setup-Envelope. Ist eine Seite
    /// offline, passiert nichts (auch keine Benachrichtigung der anderen).
    pub fn annahme_vermitteln(
        &self,
        registry: &SessionRegistry,
        angerufener: &str,
        anrufer: &str,
    ) {
        if angerufener.is_empty() || anrufer.is_empty() {
            return;
        }

        let Some(adresse_anrufer) = registry.peer_addr_von(anrufer) else {
            tracing::debug!(anrufer = %anrufer, "Anrufer offline, Vermittlung verworfen");
            return;
        };
        let Some(adresse_angerufener) = registry.peer_addr_von(angerufener) else {
            tracing::debug!(angerufener = %angerufener, "Angerufener offline, Vermittlung verworfen");
            return;
        };

        let setup = AnrufSetup {
            anrufer: anrufer.to_string(),
            angerufener: angerufener.to_string(),
            adresse_anrufer: adresse_anrufer.ip().to_string(),
            adresse_angerufener: adresse_angerufener.ip().to_string(),
            ports: self.ports,
        };
        let envelope = setup.als_envelope();

        registry.senden_an(anrufer, envelope.clone());
        registry.senden_an(angerufener, envelope);

        tracing::info!(
            anrufer = %anrufer,
            angerufener = %angerufener,
            adresse_anrufer = %setup.adresse_anrufer,
            adresse_angerufener = %setup.adresse_angerufener,
            "Anruf vermittelt"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
