//! Empfangs-Pipeline – Datagramm-Loop, Reassembly, Frame-Ausgabe
//!
//! Ein Loop pro Medien-Stream (Video und Audio getrennt, nie ein geteilter
//! Puffer): blockierende Datagramm-Reads fuettern die Reassembly-Tabelle,
//! fertige Frames gehen ueber einen begrenzten Kanal an den Render-
//! Kollaborateur. Zu kurze oder kaputte Datagramme werden kommentarlos
//! verworfen – ein gestoerter Anruf zeigt sich als eingefrorenes Bild,
//! nicht als Fehlerdialog.

use std::sync::Arc;

use sichtruf_core::StreamArt;
use sichtruf_protocol::media::MAX_DATAGRAMM_LAENGE;
use sichtruf_protocol::{Fragment, FragmentHeader};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};

use crate::reassembly::{sweep_starten, ReassemblyConfig, ReassemblyTabelle};

/// Empfangspuffer-Groesse (max. Datagramm + Reserve)
const UDP_BUFFER_SIZE: usize = MAX_DATAGRAMM_LAENGE + 200;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration der Empfangs-Pipeline
#[derive(Debug, Clone, Default)]
pub struct EmpfangsConfig {
    /// Reassembly-Timeout und Sweep-Intervall
    pub reassembly: ReassemblyConfig,
    /// Kapazitaet des Frame-Ausgabekanals
    pub frame_queue_kapazitaet: usize,
}

impl EmpfangsConfig {
    fn frame_queue(&self) -> usize {
        if self.frame_queue_kapazitaet == 0 {
            8
        } else {
            self.frame_queue_kapazitaet
        }
    }
}

// ---------------------------------------------------------------------------
// EmpfangsPipeline
// ---------------------------------------------------------------------------

/// Empfangs-Pipeline fuer einen Medien-Stream
///
/// Haelt den Empfangs-Loop und den Sweep-Task; fertige Frames kommen aus
/// dem beim Start zurueckgegebenen Receiver.
pub struct EmpfangsPipeline {
    tabelle: Arc<ReassemblyTabelle>,
    _empfangs_task: tokio::task::JoinHandle<()>,
    _sweep_task: tokio::task::JoinHandle<()>,
}

impl EmpfangsPipeline {
    /// Startet Empfangs-Loop und Sweep-Task fuer den gegebenen Socket
    ///
    /// Gibt die Pipeline und den Kanal mit den fertigen Frames zurueck.
    pub fn starten(
        socket: Arc<UdpSocket>,
        art: StreamArt,
        config: EmpfangsConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let tabelle = Arc::new(ReassemblyTabelle::neu(&config.reassembly));
        let (frame_tx, frame_rx) = mpsc::channel(config.frame_queue());

        let empfangs_task = tokio::spawn(empfangs_loop(
            socket,
            art,
            Arc::clone(&tabelle),
            frame_tx,
            shutdown_rx.clone(),
        ));
        let sweep_task = sweep_starten(
            Arc::clone(&tabelle),
            config.reassembly.sweep_intervall,
            shutdown_rx,
        );

        (
            Self {
                tabelle,
                _empfangs_task: empfangs_task,
                _sweep_task: sweep_task,
            },
            frame_rx,
        )
    }

    /// Anzahl der offenen Reassembly-Puffer
    pub fn offene_puffer(&self) -> usize {
        self.tabelle.puffer_anzahl()
    }
}

/// Der Empfangs-Loop: Datagramme lesen, reassemblieren, Frames ausgeben
async fn empfangs_loop(
    socket: Arc<UdpSocket>,
    art: StreamArt,
    tabelle: Arc<ReassemblyTabelle>,
    frame_tx: mpsc::Sender<Vec<u8>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    // Stack-allokierter Empfangspuffer – wird wiederverwendet
    let mut buf = [0u8; UDP_BUFFER_SIZE];

    tracing::debug!(stream = %art, "Empfangs-Loop gestartet");

    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, absender)) => {
                        // Zu kurze Datagramme (z.B. Proben) kommentarlos verwerfen
                        if len < FragmentHeader::SIZE {
                            continue;
                        }

                        let fragment = match Fragment::decode(&buf[..len]) {
                            Ok(f) => f,
                            Err(e) => {
                                tracing::trace!(
                                    fehler = %e,
                                    absender = %absender,
                                    "Ungueltiges Fragment verworfen"
                                );
                                continue;
                            }
                        };

                        if let Some(frame) = tabelle.fragment_hinzufuegen(absender, fragment) {
                            // Kanal voll -> Frame verwerfen, der Stream ist verlustbehaftet
                            if frame_tx.try_send(frame).is_err() {
                                tracing::trace!(stream = %art, "Frame-Kanal voll, Frame verworfen");
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(fehler = %e, stream = %art, "UDP-Empfangsfehler");
                        // Kurze Pause um Busy-Loop bei persistentem Fehler zu vermeiden
                        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                    }
                }
            }

            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    tracing::debug!(stream = %art, "Empfangs-Loop beendet");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
