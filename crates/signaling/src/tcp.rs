//! TCP-Listener – bindet den Socket, akzeptiert Verbindungen
//!
//! Der `SignalingServer` bindet einen TCP-Socket und startet fuer jede
//! eingehende Verbindung einen eigenen tokio-Task mit einer
//! `ClientConnection`. Ist der konfigurierte Port belegt, weicht er auf
//! einen vom Betriebssystem vergebenen Port aus und loggt die Ersetzung.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use sichtruf_db::KontenRepository;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::connection::ClientConnection;
use crate::server_state::SignalingState;

/// TCP-Signaling-Server
///
/// `binden` reserviert den Socket, `starten` akzeptiert Verbindungen bis
/// zum Shutdown-Signal. Die tatsaechlich gebundene Adresse liefert
/// `lokale_adresse` (wichtig beim Port-Fallback und fuer Tests).
pub struct SignalingServer<K: KontenRepository + 'static> {
    state: Arc<SignalingState<K>>,
    listener: TcpListener,
}

impl<K: KontenRepository + 'static> SignalingServer<K> {
    /// Bindet den TCP-Socket
    ///
    /// Ist die Adresse bereits belegt, wird stattdessen ein freier Port
    /// auf derselben IP gebunden.
    pub async fn binden(
        state: Arc<SignalingState<K>>,
        bind_addr: SocketAddr,
    ) -> io::Result<Self> {
        let listener = match TcpListener::bind(bind_addr).await {
            Ok(listener) => listener,
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                tracing::warn!(
                    adresse = %bind_addr,
                    "Port belegt, weiche auf freien Port aus"
                );
                TcpListener::bind(SocketAddr::new(bind_addr.ip(), 0)).await?
            }
            Err(e) => return Err(e),
        };

        tracing::info!(
            adresse = %listener.local_addr()?,
            "TCP Signaling-Server gebunden"
        );

        Ok(Self { state, listener })
    }

    /// Gibt die tatsaechlich gebundene Adresse zurueck
    pub fn lokale_adresse(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Akzeptiert Verbindungen bis `shutdown_rx` ein `true`-Signal empfaengt
    pub async fn starten(self, mut shutdown_rx: watch::Receiver<bool>) -> io::Result<()> {
        loop {
            tokio::select! {
                // Neue eingehende Verbindung
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            // Client-Limit pruefen
                            let online = self.state.registry.anzahl() as u32;
                            if online >= self.state.config.max_clients {
                                tracing::warn!(
                                    peer = %peer_addr,
                                    max = self.state.config.max_clients,
                                    "Server voll – Verbindung abgelehnt"
                                );
                                drop(stream);
                                continue;
                            }

                            tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");

                            let verbindung = ClientConnection::neu(
                                Arc::clone(&self.state),
                                peer_addr,
                            );
                            let shutdown_rx_clone = shutdown_rx.clone();

                            tokio::spawn(async move {
                                verbindung.verarbeiten(stream, shutdown_rx_clone).await;
                            });
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Signaling-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        // Listener fallen lassen, bestehende Sessions schliessen
        self.state.registry.alle_schliessen();

        tracing::info!("TCP Signaling-Server gestoppt");
        Ok(())
    }
}
