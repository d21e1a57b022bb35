//! Sende-Pipeline – entkoppelt Frame-Produktion von der Uebertragung
//!
//! Eine kleine, begrenzte Queue sitzt zwischen Produzent (Kamera/Mikrofon-
//! Callback) und dem einen Sende-Task. Laeuft die Produktion der Queue
//! davon, wird der **gerade produzierte** Frame verworfen – der Sende-Task
//! arbeitet so immer auf dem neuesten angenommenen Frame, ohne dass sich
//! ein Rueckstau aufbaut. Zusaetzlich drosselt ein monotones
//! Mindest-Sendeintervall die Produktion unabhaengig vom Queue-Zustand.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sichtruf_core::StreamArt;
use sichtruf_protocol::media::MAX_FRAGMENT_NUTZDATEN;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};

use crate::fragmenter::Fragmentierer;

/// Sentinel fuer "noch nie gesendet"
const NIE_GESENDET: u64 = u64::MAX;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration der Sende-Pipeline
#[derive(Debug, Clone)]
pub struct SendeConfig {
    /// Queue-Kapazitaet zwischen Produzent und Sende-Task
    pub queue_kapazitaet: usize,
    /// Monotones Mindest-Intervall zwischen zwei angenommenen Frames
    pub min_sende_intervall: Duration,
    /// Maximale Nutzdaten pro Fragment
    pub max_fragment_nutzdaten: usize,
}

impl Default for SendeConfig {
    fn default() -> Self {
        Self {
            queue_kapazitaet: 2,
            min_sende_intervall: Duration::from_millis(60),
            max_fragment_nutzdaten: MAX_FRAGMENT_NUTZDATEN,
        }
    }
}

// ---------------------------------------------------------------------------
// SendePipeline
// ---------------------------------------------------------------------------

/// Sende-Pipeline fuer einen Medien-Stream
///
/// `frame_einreihen` ist der nicht-blockierende Produzenten-Eingang; der
/// eine Sende-Task fragmentiert und verschickt. Beim Shutdown werden noch
/// eingereihte Frames verworfen.
pub struct SendePipeline {
    frame_tx: mpsc::Sender<Vec<u8>>,
    start: Instant,
    letzter_frame_ms: AtomicU64,
    min_intervall_ms: u64,
    verworfen: AtomicU64,
    _task: tokio::task::JoinHandle<()>,
}

impl SendePipeline {
    /// Startet die Pipeline samt Sende-Task
    pub fn starten(
        socket: Arc<UdpSocket>,
        ziel: SocketAddr,
        art: StreamArt,
        fragmentierer: Arc<Fragmentierer>,
        config: SendeConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let (frame_tx, frame_rx) = mpsc::channel(config.queue_kapazitaet.max(1));

        let max_nutzdaten = config.max_fragment_nutzdaten;
        let task = tokio::spawn(sende_loop(
            socket,
            ziel,
            art,
            fragmentierer,
            frame_rx,
            max_nutzdaten,
            shutdown_rx,
        ));

        Self {
            frame_tx,
            start: Instant::now(),
            letzter_frame_ms: AtomicU64::new(NIE_GESENDET),
            min_intervall_ms: config.min_sende_intervall.as_millis() as u64,
            verworfen: AtomicU64::new(0),
            _task: task,
        }
    }

    /// Reiht einen produzierten Frame ein (nicht-blockierend)
    ///
    /// Gibt `false` zurueck wenn der Frame verworfen wurde – entweder
    /// weil das Mindest-Sendeintervall noch nicht verstrichen ist oder
    /// weil die Queue voll war. Der Zeitstempel wird nur bei
    /// erfolgreicher Einreihung fortgeschrieben.
    pub fn frame_einreihen(&self, frame: Vec<u8>) -> bool {
        let jetzt_ms = self.start.elapsed().as_millis() as u64;
        let letzter = self.letzter_frame_ms.load(Ordering::Acquire);

        if letzter != NIE_GESENDET && jetzt_ms.saturating_sub(letzter) < self.min_intervall_ms {
            self.verworfen.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        match self.frame_tx.try_send(frame) {
            Ok(()) => {
                self.letzter_frame_ms.store(jetzt_ms, Ordering::Release);
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                // Queue voll: der neueste Frame ist der, der faellt
                self.verworfen.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Sende-Queue voll, Frame verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.verworfen.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Anzahl der bislang verworfenen Frames
    pub fn verworfene_frames(&self) -> u64 {
        self.verworfen.load(Ordering::Relaxed)
    }
}

/// Der eine Sende-Task: Queue entnehmen, fragmentieren, verschicken
async fn sende_loop(
    socket: Arc<UdpSocket>,
    ziel: SocketAddr,
    art: StreamArt,
    fragmentierer: Arc<Fragmentierer>,
    mut frame_rx: mpsc::Receiver<Vec<u8>>,
    max_nutzdaten: usize,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tracing::debug!(ziel = %ziel, stream = %art, "Sende-Task gestartet");

    loop {
        tokio::select! {
            frame = frame_rx.recv() => {
                let Some(frame) = frame else {
                    break;
                };

                let fragmente = fragmentierer.fragmentieren(&frame, max_nutzdaten);
                let anzahl = fragmente.len();
                for fragment in fragmente {
                    if let Err(e) = socket.send_to(&fragment.encode(), ziel).await {
                        tracing::warn!(fehler = %e, ziel = %ziel, "UDP-Sendefehler");
                    }
                }

                tracing::trace!(
                    ziel = %ziel,
                    stream = %art,
                    bytes = frame.len(),
                    fragmente = anzahl,
                    "Frame fragmentiert gesendet"
                );
            }

            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    // Restliche Frames verwerfen
    while frame_rx.try_recv().is_ok() {}
    tracing::debug!(ziel = %ziel, stream = %art, "Sende-Task beendet");
}

// ---------------------------------------------------------------------------
// Verbindungs-Probe
// ---------------------------------------------------------------------------

/// Startet eine leichte Verbindungs-Probe
///
/// Sendet im Intervall ein kurzes `PING`-Datagramm an die Gegenstelle.
/// Die Probe liegt unter der Header-Groesse und wird vom Empfaenger als
/// zu kurzes Datagramm ignoriert.
pub fn probe_starten(
    socket: Arc<UdpSocket>,
    ziel: SocketAddr,
    intervall: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut takt = tokio::time::interval(intervall);
        takt.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = takt.tick() => {
                    if let Err(e) = socket.send_to(b"PING", ziel).await {
                        tracing::trace!(fehler = %e, ziel = %ziel, "Probe-Sendefehler");
                    }
                }
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
