//! Client-Verbindung – verwaltet genau einen TCP-Stream
//!
//! Jede akzeptierte Verbindung laeuft in einem eigenen tokio-Task. Der
//! Task liest zeilenweise Envelopes, dispatcht sie und schreibt alle
//! ausgehenden Envelopes selbst – sowohl direkte Antworten als auch
//! Envelopes die Registry oder Broker ueber die Sende-Queue einreihen.
//! Damit sind die Schreibzugriffe einer Verbindung strikt serialisiert.
//!
//! ## Lebenszyklus
//! ```text
//! accept -> Lese-Loop -> (EOF | Lesefehler | Schreibfehler |
//!            Registry-Schliessen | Server-Shutdown) -> Cleanup
//! ```
//!
//! Das Cleanup entfernt eine gebundene Session aus der Registry und ist
//! idempotent – die Registry toleriert doppeltes Entfernen.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use sichtruf_db::KontenRepository;
use sichtruf_protocol::{Envelope, EnvelopeCodec};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;

use crate::dispatcher::{DispatcherContext, MessageDispatcher};
use crate::server_state::SignalingState;

/// Groesse der ausgehenden Envelope-Queue pro Verbindung
const SENDE_QUEUE_GROESSE: usize = 64;

/// Verarbeitet eine einzelne TCP-Verbindung
///
/// Liest Envelopes via `EnvelopeCodec`, dispatcht an den
/// `MessageDispatcher` und sendet Antworten zurueck.
pub struct ClientConnection<K: KontenRepository + 'static> {
    state: Arc<SignalingState<K>>,
    peer_addr: SocketAddr,
}

impl<K: KontenRepository + 'static> ClientConnection<K> {
    /// Erstellt eine neue ClientConnection
    pub fn neu(state: Arc<SignalingState<K>>, peer_addr: SocketAddr) -> Self {
        Self { state, peer_addr }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung getrennt wird, die Registry sie
    /// schliesst oder ein Server-Shutdown-Signal eingeht.
    pub async fn verarbeiten(
        self,
        stream: TcpStream,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let peer_addr = self.peer_addr;
        tracing::info!(peer = %peer_addr, "Neue Verbindung");

        let mut framed = Framed::new(stream, EnvelopeCodec::new());

        // Ausgehende Envelope-Queue (Registry/Broker -> dieser Task)
        let (sende_tx, mut sende_rx) = mpsc::channel::<Envelope>(SENDE_QUEUE_GROESSE);

        // Schliess-Signal: wandert beim Login ins Registry-Handle
        let (schliessen_tx, mut schliessen_rx) = watch::channel(false);

        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));
        let mut ctx = DispatcherContext {
            peer_addr,
            benutzername: None,
            sende_tx: sende_tx.clone(),
            schliessen_tx: Some(schliessen_tx),
        };

        loop {
            tokio::select! {
                // Eingehendes Envelope vom Client
                frame = framed.next() => {
                    match frame {
                        Some(Ok(envelope)) => {
                            tracing::trace!(
                                peer = %peer_addr,
                                kommando = %envelope.kommando(),
                                "Envelope empfangen"
                            );

                            if let Some(antwort) = dispatcher.dispatch(envelope, &mut ctx) {
                                if let Err(e) = framed.send(antwort).await {
                                    tracing::warn!(
                                        peer = %peer_addr,
                                        fehler = %e,
                                        "Senden fehlgeschlagen"
                                    );
                                    break;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "Lesefehler");
                            break;
                        }
                        None => {
                            tracing::info!(peer = %peer_addr, "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                // Ausgehendes Envelope aus Registry oder Broker
                Some(ausgehend) = sende_rx.recv() => {
                    if let Err(e) = framed.send(ausgehend).await {
                        tracing::warn!(
                            peer = %peer_addr,
                            fehler = %e,
                            "Weiterleitungs-Senden fehlgeschlagen"
                        );
                        break;
                    }
                }

                // Registry schliesst diese Verbindung (Logout, Ersetzung)
                Ok(()) = schliessen_rx.changed() => {
                    if *schliessen_rx.borrow() {
                        tracing::debug!(peer = %peer_addr, "Verbindung durch Registry geschlossen");
                        break;
                    }
                }

                // Server-Shutdown
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %peer_addr, "Shutdown-Signal – Verbindung wird getrennt");
                        break;
                    }
                }
            }
        }

        // Cleanup beim Verbindungsende
        if let Some(benutzername) = ctx.benutzername.take() {
            self.state.registry.entfernen(&benutzername);
        }

        tracing::info!(peer = %peer_addr, "Verbindungs-Task beendet");
    }
}
