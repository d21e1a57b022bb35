//! sichtruf-server – Bibliotheks-Root
//!
//! Komponiert Konten-Store, Auth-Service und Signaling-Server und
//! verwaltet den Lebenszyklus vom Start bis zum Shutdown.

pub mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sichtruf_auth::AuthService;
use sichtruf_db::JsonKontenStore;
use sichtruf_signaling::{SignalingConfig, SignalingServer, SignalingState};
use tokio::sync::watch;

use config::ServerConfig;

/// Gnadenfrist fuer laufende Tasks beim Shutdown
const SHUTDOWN_GNADENFRIST: Duration = Duration::from_millis(1500);

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Konten-Store laden
    /// 2. Auth-Service und Signaling-Zustand bauen
    /// 3. TCP-Listener binden und Accept-Loop starten
    /// 4. Auf Ctrl-C warten, dann Shutdown signalisieren und eine
    ///    begrenzte Gnadenfrist auf das Loop-Ende warten
    pub async fn starten(self) -> Result<()> {
        tracing::info!(
            server_name = %self.config.server.name,
            tcp = %self.config.tcp_bind_adresse(),
            konten = %self.config.konten.pfad,
            "Server startet"
        );

        // Konten-Store laden
        let konten = Arc::new(
            JsonKontenStore::laden(&self.config.konten.pfad)
                .context("Konten-Store konnte nicht geladen werden")?,
        );
        let auth_service = Arc::new(AuthService::neu(konten));

        // Signaling-Zustand bauen
        let signaling_config = SignalingConfig {
            server_name: self.config.server.name.clone(),
            max_clients: self.config.server.max_clients,
            anruf_ports: self.config.anruf,
        };
        let state = SignalingState::neu(signaling_config, auth_service);

        // Listener binden und starten
        let bind_addr = self
            .config
            .tcp_bind_adresse()
            .parse()
            .context("Ungueltige Bind-Adresse")?;
        let server = SignalingServer::binden(Arc::clone(&state), bind_addr).await?;
        tracing::info!(adresse = %server.lokale_adresse()?, "Signaling bereit");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener_task = tokio::spawn(server.starten(shutdown_rx));

        // Auf Shutdown-Signal warten
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

        // Idempotent: weitere Sends auf dem Watch-Kanal sind No-ops
        let _ = shutdown_tx.send(true);

        match tokio::time::timeout(SHUTDOWN_GNADENFRIST, listener_task).await {
            Ok(Ok(Ok(()))) => tracing::info!("Server sauber beendet"),
            Ok(Ok(Err(e))) => tracing::warn!(fehler = %e, "Listener endete mit Fehler"),
            Ok(Err(e)) => tracing::warn!(fehler = %e, "Listener-Task abgestuerzt"),
            Err(_) => tracing::warn!("Gnadenfrist abgelaufen, verbleibende Tasks werden verworfen"),
        }

        Ok(())
    }
}
