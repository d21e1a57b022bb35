//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt alle geteilten Services als Arc-Referenzen, die sicher zwischen
//! tokio-Tasks geteilt werden koennen. Der Zustand wird einmal beim
//! Server-Start gebaut und per Handle in jeden Verbindungs-Task gereicht –
//! es gibt keinen ambienten/statischen Zustand.

use std::sync::Arc;
use std::time::Instant;

use sichtruf_auth::AuthService;
use sichtruf_core::AnrufPorts;
use sichtruf_db::KontenRepository;

use crate::broker::CallBroker;
use crate::registry::SessionRegistry;

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Anzeigename des Servers
    pub server_name: String,
    /// Maximale Anzahl gleichzeitiger Clients
    pub max_clients: u32,
    /// Die vier Medien-Ports die der Broker an beide Anruf-Seiten gibt
    pub anruf_ports: AnrufPorts,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_name: "Sichtruf Server".to_string(),
            max_clients: 512,
            anruf_ports: AnrufPorts::default(),
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState<K: KontenRepository + 'static> {
    /// Server-Konfiguration
    pub config: Arc<SignalingConfig>,
    /// Auth-Service (Registrierung, Anmeldung)
    pub auth_service: Arc<AuthService<K>>,
    /// Session-Registry (Wer ist online, mit welcher Verbindung)
    pub registry: SessionRegistry,
    /// Call-Broker (Anruf-Handshake vermitteln)
    pub broker: CallBroker,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

impl<K: KontenRepository + 'static> SignalingState<K> {
    /// Erstellt einen neuen SignalingState
    pub fn neu(config: SignalingConfig, auth_service: Arc<AuthService<K>>) -> Arc<Self> {
        let broker = CallBroker::neu(config.anruf_ports);
        Arc::new(Self {
            config: Arc::new(config),
            auth_service,
            registry: SessionRegistry::neu(),
            broker,
            start_time: Instant::now(),
        })
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
