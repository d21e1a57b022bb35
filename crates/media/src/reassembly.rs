//! Reassembly – setzt Fragmente unter Verlust und Umordnung wieder zusammen
//!
//! Pro Absender-Peer wird die hoechste gesehene Nachrichten-ID verfolgt.
//! Trifft ein Fragment mit einer neueren ID ein, werden alle noch
//! unvollstaendigen Puffer mit niedrigerer ID verworfen (**newest wins**):
//! bei Live-Video zaehlt nur der neueste Frame, begrenzte Latenz schlaegt
//! Vollstaendigkeit alter Frames.
//!
//! Speicher ist doppelt begrenzt: Puffer werden nur bis zu einer harten
//! Fragment- und Byte-Obergrenze angelegt, und ein periodischer Sweep
//! raeumt Puffer weg die nie vollstaendig werden (der Transport kennt
//! keine Neuuebertragung).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sichtruf_protocol::Fragment;
use tokio::sync::watch;

use crate::fragmenter::MAX_FRAGMENTE;

/// Maximale Groesse eines zusammengesetzten Frames (512 KiB)
pub const MAX_FRAME_BYTES: usize = 512 * 1024;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration fuer Reassembly-Timeout und Sweep
#[derive(Debug, Clone)]
pub struct ReassemblyConfig {
    /// Alter ab dem ein unvollstaendiger Puffer verworfen wird
    pub timeout: Duration,
    /// Intervall des Sweep-Tasks
    pub sweep_intervall: Duration,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(700),
            sweep_intervall: Duration::from_millis(250),
        }
    }
}

// ---------------------------------------------------------------------------
// ReassemblyPuffer
// ---------------------------------------------------------------------------

/// Fragment-Sammler fuer eine einzelne Nachrichten-ID
///
/// Haelt `gesamt_anzahl` Plaetze, den Fuellstand, den Zeitpunkt des ersten
/// Fragments und die laufende Byte-Summe.
pub struct ReassemblyPuffer {
    plaetze: Vec<Option<Vec<u8>>>,
    gefuellt: usize,
    erster_empfang: Instant,
    gesamt_bytes: usize,
}

impl ReassemblyPuffer {
    fn neu(gesamt_anzahl: u16) -> Self {
        Self {
            plaetze: (0..gesamt_anzahl).map(|_| None).collect(),
            gefuellt: 0,
            erster_empfang: Instant::now(),
            gesamt_bytes: 0,
        }
    }

    /// Traegt ein Fragment ein – idempotent bei Duplikaten
    fn fragment_einfuegen(&mut self, index: u16, nutzdaten: Vec<u8>) {
        let Some(platz) = self.plaetze.get_mut(index as usize) else {
            return;
        };
        if platz.is_none() {
            self.gesamt_bytes += nutzdaten.len();
            *platz = Some(nutzdaten);
            self.gefuellt += 1;
        }
    }

    fn ist_vollstaendig(&self) -> bool {
        self.gefuellt == self.plaetze.len()
    }

    fn alter(&self) -> Duration {
        self.erster_empfang.elapsed()
    }

    /// Konkateniert alle Plaetze in Index-Reihenfolge
    fn zusammensetzen(self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.gesamt_bytes);
        for platz in self.plaetze {
            if let Some(bytes) = platz {
                frame.extend_from_slice(&bytes);
            }
        }
        frame
    }
}

// ---------------------------------------------------------------------------
// ReassemblyTabelle
// ---------------------------------------------------------------------------

/// Zustand pro Absender-Peer
///
/// Jeder Peer hat seinen eigenen ID-Raum; die hoechste gesehene ID wird
/// pro Peer verfolgt, damit parallele Absender sich nicht gegenseitig
/// die Frames verdraengen.
#[derive(Default)]
struct PeerZustand {
    hoechste_id: Option<u32>,
    puffer: HashMap<u32, ReassemblyPuffer>,
}

/// Reassembly-Tabelle, pro Peer nach Nachrichten-ID organisiert
///
/// Thread-safe via DashMap; wird vom Empfangs-Loop und dem Sweep-Task
/// gleichzeitig benutzt.
pub struct ReassemblyTabelle {
    peers: DashMap<SocketAddr, PeerZustand>,
    timeout: Duration,
}

impl ReassemblyTabelle {
    /// Erstellt eine leere Tabelle
    pub fn neu(config: &ReassemblyConfig) -> Self {
        Self {
            peers: DashMap::new(),
            timeout: config.timeout,
        }
    }

    /// Verarbeitet ein eingetroffenes Fragment
    ///
    /// Gibt den fertigen Frame zurueck sobald das letzte Fragment einer
    /// Nachricht eingetroffen ist, sonst `None`. Verworfen werden ohne
    /// Rueckmeldung:
    /// - Fragmente mit `gesamt_anzahl` 0 oder ueber `MAX_FRAGMENTE`
    ///   (Ablehnung vor jeder Allokation)
    /// - Fragmente mit Index ausserhalb von `[0, gesamt_anzahl)`
    /// - Fragmente fuer IDs unterhalb der hoechsten bekannten ID des
    ///   Peers (verdraengt oder bereits abgeschlossen – keine
    ///   Wiederbelebung entfernter Puffer)
    /// - fertige Frames ueber `MAX_FRAME_BYTES`
    pub fn fragment_hinzufuegen(&self, absender: SocketAddr, fragment: Fragment) -> Option<Vec<u8>> {
        let header = fragment.header;

        if header.gesamt_anzahl == 0 || header.gesamt_anzahl as usize > MAX_FRAGMENTE {
            tracing::debug!(
                absender = %absender,
                nachricht_id = header.nachricht_id,
                gesamt = header.gesamt_anzahl,
                "Fragment mit ungueltiger Gesamtanzahl verworfen"
            );
            return None;
        }
        if header.index >= header.gesamt_anzahl {
            return None;
        }

        let mut zustand = self.peers.entry(absender).or_default();
        let id = header.nachricht_id;

        match zustand.hoechste_id {
            None => {
                zustand.hoechste_id = Some(id);
                zustand.puffer.insert(id, ReassemblyPuffer::neu(header.gesamt_anzahl));
            }
            Some(hoechste) if id > hoechste => {
                // Newest wins: alle aelteren unvollstaendigen Puffer verwerfen
                let vorher = zustand.puffer.len();
                zustand.puffer.retain(|puffer_id, _| *puffer_id >= id);
                let verdraengt = vorher - zustand.puffer.len();
                if verdraengt > 0 {
                    tracing::trace!(
                        absender = %absender,
                        neue_id = id,
                        verdraengt,
                        "Aeltere unvollstaendige Puffer verdraengt"
                    );
                }

                zustand.hoechste_id = Some(id);
                zustand.puffer.insert(id, ReassemblyPuffer::neu(header.gesamt_anzahl));
            }
            Some(hoechste) if id < hoechste => {
                // Verspaetetes Fragment eines verdraengten Frames
                return None;
            }
            Some(_) => {
                // Gleiche ID: nur annehmen solange der Puffer noch lebt –
                // abgeschlossene oder verworfene IDs werden nicht wiederbelebt
                if !zustand.puffer.contains_key(&id) {
                    return None;
                }
            }
        }

        let puffer = zustand.puffer.get_mut(&id)?;
        puffer.fragment_einfuegen(header.index, fragment.nutzdaten);

        if !puffer.ist_vollstaendig() {
            return None;
        }

        let puffer = zustand.puffer.remove(&id)?;
        if puffer.gesamt_bytes > MAX_FRAME_BYTES {
            tracing::debug!(
                absender = %absender,
                nachricht_id = id,
                bytes = puffer.gesamt_bytes,
                maximum = MAX_FRAME_BYTES,
                "Zusammengesetzter Frame ueberschreitet die Byte-Obergrenze"
            );
            return None;
        }

        Some(puffer.zusammensetzen())
    }

    /// Verwirft alle Puffer die aelter als der Timeout sind
    ///
    /// Gibt die Anzahl der entfernten Puffer zurueck. Der Fortschritt des
    /// Puffers spielt keine Rolle – ein fehlendes Fragment wird nie
    /// nachgeliefert.
    pub fn aufraeumen(&self) -> usize {
        let mut entfernt = 0;
        for mut eintrag in self.peers.iter_mut() {
            let vorher = eintrag.puffer.len();
            let timeout = self.timeout;
            eintrag.puffer.retain(|_, puffer| puffer.alter() <= timeout);
            entfernt += vorher - eintrag.puffer.len();
        }
        if entfernt > 0 {
            tracing::trace!(entfernt, "Reassembly-Sweep hat Puffer entfernt");
        }
        entfernt
    }

    /// Anzahl aller offenen Puffer (ueber alle Peers)
    pub fn puffer_anzahl(&self) -> usize {
        self.peers.iter().map(|e| e.puffer.len()).sum()
    }
}

/// Startet den periodischen Sweep-Task fuer eine Tabelle
///
/// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
pub fn sweep_starten(
    tabelle: Arc<ReassemblyTabelle>,
    intervall: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut takt = tokio::time::interval(intervall);
        takt.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = takt.tick() => {
                    tabelle.aufraeumen();
                }
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Reassembly-Sweep-Task beendet");
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
