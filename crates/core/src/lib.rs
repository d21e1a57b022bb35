//! sichtruf-core – Gemeinsame Typen
//!
//! Kleine, I/O-freie Typen die von mehreren Crates geteilt werden.

pub mod types;

pub use types::{AnrufPorts, StreamArt};
