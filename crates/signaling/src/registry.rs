//! Session-Registry – Wer ist online, mit welcher Verbindung?
//!
//! Bildet Benutzernamen auf lebende Verbindungs-Handles ab. Invariante:
//! hoechstens eine Session pro Benutzername; ein zweiter Login wird
//! abgelehnt, nicht zusammengefuehrt. Jede Aenderung broadcastet die
//! Online-Liste an alle Sessions und publiziert ein `RegistryEvent` fuer
//! Subscriber (z.B. eine Praesentationsschicht).

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use sichtruf_protocol::Envelope;
use tokio::sync::{broadcast, mpsc, watch};

// ---------------------------------------------------------------------------
// Registry-Events
// ---------------------------------------------------------------------------

/// Events die die Registry versendet
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// Benutzer hat eine Session aufgebaut
    BenutzerOnline { benutzername: String },
    /// Session eines Benutzers wurde entfernt
    BenutzerOffline { benutzername: String },
}

// ---------------------------------------------------------------------------
// VerbindungsHandle
// ---------------------------------------------------------------------------

/// Handle auf die Verbindung einer Session
///
/// `sende_tx` ist der serialisierte Schreibpfad der Verbindung: alle
/// Envelopes laufen durch diese Queue und werden vom Verbindungs-Task
/// nacheinander geschrieben – zwei Envelopes koennen sich nie byteweise
/// vermischen. `schliessen_tx` beendet den Verbindungs-Task.
#[derive(Debug)]
pub struct VerbindungsHandle {
    pub(crate) peer_addr: SocketAddr,
    pub(crate) sende_tx: mpsc::Sender<Envelope>,
    pub(crate) schliessen_tx: watch::Sender<bool>,
}

impl VerbindungsHandle {
    /// Erstellt ein neues Handle
    pub fn neu(
        peer_addr: SocketAddr,
        sende_tx: mpsc::Sender<Envelope>,
        schliessen_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            peer_addr,
            sende_tx,
            schliessen_tx,
        }
    }

    /// Beobachtete Netzwerk-Adresse der Verbindung
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Versucht ein Envelope einzureihen; `false` bei voller Queue oder
    /// beendetem Verbindungs-Task
    pub fn senden_versuchen(&self, envelope: Envelope) -> bool {
        self.sende_tx.try_send(envelope).is_ok()
    }

    /// Signalisiert dem Verbindungs-Task das Ende – idempotent
    pub fn schliessen(&self) {
        let _ = self.schliessen_tx.send(true);
    }
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// Groesse des Broadcast-Kanals fuer Registry-Events
const EVENT_KANAL_GROESSE: usize = 256;

/// Verwaltet alle aktiven Sessions
///
/// Thread-safe via Arc + DashMap. Clone der Registry teilt den inneren
/// Zustand.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<SessionRegistryInner>,
}

struct SessionRegistryInner {
    /// Aktive Sessions, indiziert nach Benutzername (case-sensitiv)
    sessions: DashMap<String, VerbindungsHandle>,
    /// Broadcast-Sender fuer Registry-Events
    event_tx: broadcast::Sender<RegistryEvent>,
}

impl SessionRegistry {
    /// Erstellt eine leere Registry
    pub fn neu() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_KANAL_GROESSE);
        Self {
            inner: Arc::new(SessionRegistryInner {
                sessions: DashMap::new(),
                event_tx,
            }),
        }
    }

    /// Atomares Test-and-Set: fuegt eine Session ein
    ///
    /// Gibt das Handle unveraendert zurueck wenn fuer den Benutzernamen
    /// bereits eine Session existiert – der bestehende Eintrag bleibt
    /// unberuehrt. Bei Erfolg wird die Online-Liste broadcastet und ein
    /// `BenutzerOnline`-Event publiziert.
    pub fn einfuegen(
        &self,
        benutzername: &str,
        handle: VerbindungsHandle,
    ) -> Result<(), VerbindungsHandle> {
        use dashmap::mapref::entry::Entry;

        match self.inner.sessions.entry(benutzername.to_string()) {
            Entry::Occupied(_) => return Err(handle),
            Entry::Vacant(eintrag) => {
                eintrag.insert(handle);
            }
        }

        tracing::info!(benutzername = %benutzername, "Session aufgebaut");
        self.online_liste_broadcasten();
        let _ = self.inner.event_tx.send(RegistryEvent::BenutzerOnline {
            benutzername: benutzername.to_string(),
        });
        Ok(())
    }

    /// Entfernt eine Session und schliesst deren Verbindung
    ///
    /// Idempotent: das Entfernen eines unbekannten Benutzernamens ist ein
    /// No-op ohne Broadcast.
    pub fn entfernen(&self, benutzername: &str) {
        if let Some((_, handle)) = self.inner.sessions.remove(benutzername) {
            handle.schliessen();

            tracing::info!(benutzername = %benutzername, "Session entfernt");
            self.online_liste_broadcasten();
            let _ = self.inner.event_tx.send(RegistryEvent::BenutzerOffline {
                benutzername: benutzername.to_string(),
            });
        }
    }

    /// Prueft ob ein Benutzer eine aktive Session hat
    pub fn ist_online(&self, benutzername: &str) -> bool {
        self.inner.sessions.contains_key(benutzername)
    }

    /// Anzahl der aktiven Sessions
    pub fn anzahl(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Deterministischer Schnappschuss der Online-Benutzernamen
    ///
    /// Aufsteigend sortiert (ordinaler String-Vergleich), damit jeder
    /// Client dieselbe Darstellung derselben Menge erhaelt.
    pub fn online_schnappschuss(&self) -> Vec<String> {
        let mut namen: Vec<String> = self
            .inner
            .sessions
            .iter()
            .map(|eintrag| eintrag.key().clone())
            .collect();
        namen.sort_unstable();
        namen
    }

    /// Versucht ein Envelope an die Session eines Benutzers zu senden
    ///
    /// `false` wenn der Benutzer offline ist oder das Einreihen scheitert.
    pub fn senden_an(&self, benutzername: &str, envelope: Envelope) -> bool {
        match self.inner.sessions.get(benutzername) {
            Some(handle) => handle.senden_versuchen(envelope),
            None => false,
        }
    }

    /// Beobachtete Adresse der Session eines Benutzers
    pub fn peer_addr_von(&self, benutzername: &str) -> Option<SocketAddr> {
        self.inner
            .sessions
            .get(benutzername)
            .map(|handle| handle.peer_addr())
    }

    /// Abonniert Registry-Events
    pub fn events_abonnieren(&self) -> broadcast::Receiver<RegistryEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Schliesst alle Sessions (Server-Shutdown)
    pub fn alle_schliessen(&self) {
        for eintrag in self.inner.sessions.iter() {
            eintrag.value().schliessen();
        }
        self.inner.sessions.clear();
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    /// Broadcastet die aktuelle Online-Liste an alle Sessions
    ///
    /// Iteriert ueber einen Schnappschuss der Schluessel; Sessions deren
    /// Send fehlschlaegt werden gesammelt und **nach** der Iteration
    /// entfernt. Diese Entfernungen broadcasten nicht erneut – die
    /// naechste Zustandsaenderung publiziert die korrigierte Liste.
    fn online_liste_broadcasten(&self) {
        let namen = self.online_schnappschuss();
        let envelope = Envelope::online_liste(&namen);

        let mut tote = Vec::new();
        for name in &namen {
            if let Some(handle) = self.inner.sessions.get(name) {
                if !handle.senden_versuchen(envelope.clone()) {
                    tote.push(name.clone());
                }
            }
        }

        for name in tote {
            if let Some((_, handle)) = self.inner.sessions.remove(&name) {
                handle.schliessen();
                tracing::warn!(benutzername = %name, "Session nach Sendefehler entfernt");
                let _ = self.inner.event_tx.send(RegistryEvent::BenutzerOffline {
                    benutzername: name,
                });
            }
        }

        tracing::debug!(liste = %namen.join(","), "Online-Liste broadcastet");
    }
}

impl Default for SessionRegistry {
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
    use std::net::{IpAddr, Ipv4Addr};

    fn test_handle(port: u16) -> (VerbindungsHandle, mpsc::Receiver<Envelope>) {
        let (sende_tx, sende_rx) = mpsc::channel(16);
        let (schliessen_tx, _schliessen_rx) = watch::channel(false);
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        (VerbindungsHandle::neu(addr, sende_tx, schliessen_tx), sende_rx)
    }

    #[test]
    fn einfuegen_und_entfernen() {
        let registry = SessionRegistry::neu();
        let (handle, _rx) = test_handle(1000);

        assert!(registry.einfuegen("anna", handle).is_ok());
        assert!(registry.ist_online("anna"));
        assert_eq!(registry.anzahl(), 1);

        registry.entfernen("anna");
        assert!(!registry.ist_online("anna"));
        assert_eq!(registry.anzahl(), 0);
    }

    #[test]
    fn doppelte_session_wird_abgelehnt() {
        let registry = SessionRegistry::neu();
        let (erste, _rx1) = test_handle(1000);
        let (zweite, _rx2) = test_handle(2000);

        assert!(registry.einfuegen("anna", erste).is_ok());
        let zurueck = registry.einfuegen("anna", zweite).unwrap_err();

        // Der bestehende Eintrag bleibt unberuehrt
        assert_eq!(registry.anzahl(), 1);
        assert_eq!(registry.peer_addr_von("anna").unwrap().port(), 1000);
        assert_eq!(zurueck.peer_addr().port(), 2000);
    }

    #[test]
    fn entfernen_ist_idempotent() {
        let registry = SessionRegistry::neu();
        registry.entfernen("niemand");
        assert_eq!(registry.anzahl(), 0);
    }

    #[test]
    fn schnappschuss_ist_sortiert() {
        let registry = SessionRegistry::neu();
        for (name, port) in [("zoe", 1), ("anna", 2), ("Bob", 3)] {
            let (handle, rx) = test_handle(port);
            std::mem::forget(rx);
            registry.einfuegen(name, handle).unwrap();
        }

        // Ordinal: Grossbuchstaben vor Kleinbuchstaben
        assert_eq!(registry.online_schnappschuss(), vec!["Bob", "anna", "zoe"]);
    }

    #[test]
    fn broadcast_erreicht_alle_sessions() {
        let registry = SessionRegistry::neu();
        let (handle_a, mut rx_a) = test_handle(1);
        registry.einfuegen("anna", handle_a).unwrap();

        let (handle_b, mut rx_b) = test_handle(2);
        registry.einfuegen("bob", handle_b).unwrap();

        // anna: Broadcast vom eigenen Login + Broadcast von bobs Login
        let erste = rx_a.try_recv().unwrap();
        assert_eq!(erste.serialisieren(), "ONLINE_LIST|anna");
        let zweite = rx_a.try_recv().unwrap();
        assert_eq!(zweite.serialisieren(), "ONLINE_LIST|anna,bob");

        // bob: nur der Broadcast seines eigenen Logins
        assert_eq!(rx_b.try_recv().unwrap().serialisieren(), "ONLINE_LIST|anna,bob");
    }

    #[test]
    fn tote_session_wird_beim_broadcast_entfernt() {
        let registry = SessionRegistry::neu();

        let (handle_tot, rx_tot) = test_handle(1);
        registry.einfuegen("tot", handle_tot).unwrap();
        drop(rx_tot); // Verbindungs-Task weg -> Queue geschlossen

        let (handle_b, _rx_b) = test_handle(2);
        registry.einfuegen("bob", handle_b).unwrap();

        // Der Broadcast von bobs Login scheitert an "tot" und entfernt ihn
        assert!(!registry.ist_online("tot"));
        assert!(registry.ist_online("bob"));
        assert_eq!(registry.anzahl(), 1);
    }

    #[test]
    fn senden_an_offline_benutzer_schlaegt_fehl() {
        let registry = SessionRegistry::neu();
        assert!(!registry.senden_an("niemand", Envelope::parse("MSG|a|b|x")));
    }

    #[tokio::test]
    async fn events_werden_publiziert() {
        let registry = SessionRegistry::neu();
        let mut events = registry.events_abonnieren();

        let (handle, _rx) = test_handle(1);
        registry.einfuegen("anna", handle).unwrap();
        registry.entfernen("anna");

        assert!(matches!(
            events.try_recv().unwrap(),
            RegistryEvent::BenutzerOnline { .. }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            RegistryEvent::BenutzerOffline { .. }
        ));
    }

    #[tokio::test]
    async fn parallele_einfuegungen_genau_eine_gewinnt() {
        let registry = SessionRegistry::neu();
        let vorher = registry.anzahl();

        let mut tasks = Vec::new();
        for port in 1..=8 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (handle, rx) = test_handle(port);
                std::mem::forget(rx);
                registry.einfuegen("anna", handle).is_ok()
            }));
        }

        let mut erfolge = 0;
        for task in tasks {
            if task.await.unwrap() {
                erfolge += 1;
            }
        }

        assert_eq!(erfolge, 1, "Genau ein einfuegen darf gewinnen");
        assert_eq!(registry.anzahl(), vorher + 1);
    }
}
