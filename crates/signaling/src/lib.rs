//! sichtruf-signaling – Praesenz- und Vermittlungs-Broker
//!
//! Der Signaling-Server authentifiziert Identitaeten, haelt die Menge der
//! Online-Benutzer konsistent, leitet Punkt-zu-Punkt-Envelopes weiter und
//! vermittelt den Anruf-Handshake durch Austausch der beobachteten
//! Adressen beider Seiten.
//!
//! - [`registry`]: Session-Registry (hoechstens eine Session pro Identitaet)
//! - [`dispatcher`]: Kommando-Dispatch pro Verbindung
//! - [`broker`]: Anruf-Vermittlung
//! - [`connection`]: Lese-Loop + serialisierter Schreibpfad
//! - [`tcp`]: Listener und Accept-Loop
//! - [`server_state`]: geteilter Zustand der Subsysteme

pub mod broker;
pub mod connection;
pub mod dispatcher;
pub mod registry;
pub mod server_state;
pub mod tcp;

pub use broker::CallBroker;
pub use connection::ClientConnection;
pub use dispatcher::{DispatcherContext, MessageDispatcher};
pub use registry::{RegistryEvent, SessionRegistry, VerbindungsHandle};
pub use server_state::{SignalingConfig, SignalingState};
pub use tcp::SignalingServer;
