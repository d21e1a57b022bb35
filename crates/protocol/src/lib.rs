//! sichtruf-protocol – Wire-Formate fuer Sichtruf
//!
//! - [`envelope`]: zeilenbasiertes Signaling-Protokoll (TCP)
//! - [`media`]: binaeres Fragment-Format fuer Medien-Datagramme (UDP)
//! - [`anruf`]: typisierte Sicht auf das vermittelte Call-Setup

pub mod anruf;
pub mod envelope;
pub mod media;

pub use anruf::{AnrufEndpunkte, AnrufRolle, AnrufSetup};
pub use envelope::{Envelope, EnvelopeCodec};
pub use media::{Fragment, FragmentHeader};
