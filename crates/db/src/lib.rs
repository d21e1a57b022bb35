//! sichtruf-db – Konten-Speicher
//!
//! Persistiert Benutzerkonten in einer einzelnen JSON-Datei. Das
//! `KontenRepository`-Trait entkoppelt den Auth-Service von der konkreten
//! Ablage; `JsonKontenStore` ist die Datei-Implementierung,
//! `SpeicherKontenStore` die fluechtige Variante fuer Tests.

pub mod error;
pub mod json_store;
pub mod models;
pub mod repository;

pub use error::{DbError, DbResult};
pub use json_store::JsonKontenStore;
pub use models::KontoRecord;
pub use repository::{KontenRepository, SpeicherKontenStore};
