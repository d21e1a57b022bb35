//! sichtruf-media – Medien-Pipeline ueber verlustbehaftetem Transport
//!
//! Zerlegt Frames in UDP-Fragmente, setzt sie unter Verlust, Umordnung
//! und Duplikaten wieder zusammen und begrenzt Speicher wie Latenz durch
//! Newest-wins-Verdraengung, harte Obergrenzen und einen Timeout-Sweep.
//!
//! - [`fragmenter`]: ID-Vergabe und Frame-Zerlegung
//! - [`reassembly`]: Fragment-Tabelle pro Peer mit Sweep-Task
//! - [`sende`]: begrenzte Queue + Sende-Task (drop-newest, Drossel)
//! - [`empfang`]: Datagramm-Loop + Frame-Ausgabe

pub mod empfang;
pub mod fragmenter;
pub mod reassembly;
pub mod sende;

pub use empfang::{EmpfangsConfig, EmpfangsPipeline};
pub use fragmenter::{Fragmentierer, MAX_FRAGMENTE};
pub use reassembly::{ReassemblyConfig, ReassemblyTabelle, MAX_FRAME_BYTES};
pub use sende::{SendeConfig, SendePipeline};
