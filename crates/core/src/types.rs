//! Gemeinsame Typen fuer Sichtruf
//!
//! Die vier Medien-Ports sind eine reine Konvention zwischen den beiden
//! Anruf-Teilnehmern: der Anrufer sendet auf den A-Ports und lauscht auf
//! den B-Ports, der Angerufene umgekehrt. Der Server gibt alle vier Ports
//! unveraendert an beide Seiten weiter.

use serde::{Deserialize, Serialize};

/// Die vier festen UDP-Ports eines vermittelten Anrufs
///
/// `video_a`/`audio_a` sind die Ports auf denen der **Anrufer** sendet,
/// `video_b`/`audio_b` die Ports auf denen der **Angerufene** sendet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnrufPorts {
    /// Video-Sendeport des Anrufers
    pub video_a: u16,
    /// Audio-Sendeport des Anrufers
    pub audio_a: u16,
    /// Video-Sendeport des Angerufenen
    pub video_b: u16,
    /// Audio-Sendeport des Angerufenen
    pub audio_b: u16,
}

impl Default for AnrufPorts {
    fn default() -> Self {
        Self {
            video_a: 6000,
            audio_a: 6001,
            video_b: 6002,
            audio_b: 6003,
        }
    }
}

/// Art eines Medien-Streams
///
/// Video und Audio laufen ueber getrennte Sockets und teilen nie einen
/// Reassembly-Puffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamArt {
    Video,
    Audio,
}

impl StreamArt {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl std::fmt::Display for StreamArt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}
