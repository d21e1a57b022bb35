//! Envelope-Dispatcher – routet Envelopes an Registry, Broker und Auth
//!
//! Der Dispatcher bekommt jedes geparste Envelope einer ClientConnection,
//! verzweigt ueber das Kommando-Tag und gibt die direkte Antwort zurueck
//! (oder `None` wenn keine faellig ist). Verkuerzte Envelopes stuerzen nie
//! ab: fehlende Felder lesen sich als leere Strings, die
//! kommandospezifische Validierung lehnt dann ab.
//!
//! Weiterleitungs-Kommandos (`MSG`, `FILE_*`, `CALL_REQUEST`) werden
//! unveraendert an den Empfaenger aus Feld 2 re-serialisiert; ist der
//! offline, verschwindet das Envelope kommentarlos.

use std::net::SocketAddr;
use std::sync::Arc;

use sichtruf_db::KontenRepository;
use sichtruf_protocol::envelope::kommando;
use sichtruf_protocol::Envelope;
use tokio::sync::{mpsc, watch};

use crate::registry::VerbindungsHandle;
use crate::server_state::SignalingState;

/// Mindest-Feldzahl pro Weiterleitungs-Kommando; kuerzere Envelopes
/// werden ignoriert
fn mindest_felder(tag: &str) -> usize {
    match tag {
        kommando::MSG => 4,
        kommando::FILE_REQUEST | kommando::FILE_CHUNK => 5,
        kommando::FILE_END => 4,
        kommando::CALL_REQUEST => 3,
        _ => 1,
    }
}

/// Dispatcher-Kontext – Informationen ueber die aktuelle Verbindung
pub struct DispatcherContext {
    /// Beobachtete Peer-Adresse der Verbindung
    pub peer_addr: SocketAddr,
    /// Gebundener Benutzername (None solange nicht angemeldet)
    pub benutzername: Option<String>,
    /// Sender-Haelfte des serialisierten Schreibpfads der Verbindung
    pub sende_tx: mpsc::Sender<Envelope>,
    /// Schliess-Signal der Verbindung – wandert beim Login ins
    /// Registry-Handle und kommt bei Ablehnung zurueck
    pub schliessen_tx: Option<watch::Sender<bool>>,
}

/// Zentraler Envelope-Dispatcher
pub struct MessageDispatcher<K: KontenRepository + 'static> {
    state: Arc<SignalingState<K>>,
}

impl<K: KontenRepository + 'static> MessageDispatcher<K> {
    /// Erstellt einen neuen Dispatcher
    pub fn neu(state: Arc<SignalingState<K>>) -> Self {
        Self { state }
    }

    /// Verarbeitet ein eingehendes Envelope und gibt die Antwort zurueck
    ///
    /// `None` wenn keine direkte Antwort gesendet werden soll
    /// (Weiterleitungen, LOGOUT, unbekannte Kommandos).
    pub fn dispatch(&self, envelope: Envelope, ctx: &mut DispatcherContext) -> Option<Envelope> {
        match envelope.kommando() {
            kommando::REGISTER => Some(self.registrieren(&envelope)),
            kommando::LOGIN => Some(self.anmelden(&envelope, ctx)),
            kommando::GET_ONLINE => Some(Envelope::online_liste(
                &self.state.registry.online_schnappschuss(),
            )),

            kommando::MSG | kommando::FILE_REQUEST | kommando::FILE_CHUNK | kommando::FILE_END => {
                self.weiterleiten(&envelope);
                None
            }

            kommando::CALL_REQUEST => {
                if envelope.feld_anzahl() >= mindest_felder(kommando::CALL_REQUEST) {
                    self.state
                        .broker
                        .anfrage_weiterleiten(&self.state.registry, &envelope);
                }
                None
            }
            kommando::CALL_ACCEPT => {
                // CALL_ACCEPT|angerufener|anrufer (Client -> Server)
                self.state.broker.annahme_vermitteln(
                    &self.state.registry,
                    envelope.feld(1),
                    envelope.feld(2),
                );
                None
            }

            kommando::LOGOUT => {
                if let Some(name) = ctx.benutzername.take() {
                    // Entfernen schliesst auch diese Verbindung
                    self.state.registry.entfernen(&name);
                }
                None
            }

            unbekannt => {
                tracing::debug!(
                    peer = %ctx.peer_addr,
                    kommando = %unbekannt,
                    "Unbekanntes Kommando ignoriert"
                );
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Kommando-Handler
    // -----------------------------------------------------------------------

    /// `REGISTER|benutzer|passwort|anzeigename`
    fn registrieren(&self, envelope: &Envelope) -> Envelope {
        let benutzer = envelope.feld(1);
        let passwort = envelope.feld(2);
        let anzeigename = envelope.feld(3);

        match self
            .state
            .auth_service
            .registrieren(benutzer, passwort, anzeigename)
        {
            Ok(anzeige) => Envelope::ok(&anzeige),
            Err(e) => Envelope::fail(&e.to_string()),
        }
    }

    /// `LOGIN|benutzer|passwort`
    fn anmelden(&self, envelope: &Envelope, ctx: &mut DispatcherContext) -> Envelope {
        if ctx.benutzername.is_some() {
            return Envelope::fail("Bereits angemeldet");
        }

        let benutzer = envelope.feld(1);
        let passwort = envelope.feld(2);

        let anzeige = match self.state.auth_service.anmelden(benutzer, passwort) {
            Ok(anzeige) => anzeige,
            Err(e) => return Envelope::fail(&e.to_string()),
        };

        // Verbindung an die Identitaet binden
        let Some(schliessen_tx) = ctx.schliessen_tx.take() else {
            // Diese Verbindung hatte schon eine Session; nach LOGOUT ist
            // sie ohnehin auf dem Weg zu
            return Envelope::fail("Bereits angemeldet");
        };

        let handle = VerbindungsHandle::neu(ctx.peer_addr, ctx.sende_tx.clone(), schliessen_tx);

        match self.state.registry.einfuegen(benutzer, handle) {
            Ok(()) => {
                ctx.benutzername = Some(benutzer.to_string());
                tracing::debug!(
                    peer = %ctx.peer_addr,
                    benutzername = %benutzer,
                    "Verbindung authentifiziert"
                );
                Envelope::ok(&anzeige)
            }
            Err(handle) => {
                // Registry hat abgelehnt: Schliess-Signal zurueckholen
                ctx.schliessen_tx = Some(handle.schliessen_tx);
                Envelope::fail("Bereits angemeldet")
            }
        }
    }

    /// Pure Weiterleitung an den Empfaenger aus Feld 2
    fn weiterleiten(&self, envelope: &Envelope) {
        if envelope.feld_anzahl() < mindest_felder(envelope.kommando()) {
            tracing::debug!(
                kommando = %envelope.kommando(),
                felder = envelope.feld_anzahl(),
                "Verkuerztes Envelope ignoriert"
            );
            return;
        }

        let empfaenger = envelope.feld(2);
        if self.state.registry.senden_an(empfaenger, envelope.clone()) {
            tracing::debug!(
                kommando = %envelope.kommando(),
                empfaenger = %empfaenger,
                "Envelope weitergeleitet"
            );
        } else {
            // Empfaenger offline: kommentarlos verwerfen
            tracing::debug!(
                kommando = %envelope.kommando(),
                empfaenger = %empfaenger,
                "Empfaenger offline, Envelope verworfen"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_state::SignalingConfig;
    use sichtruf_auth::AuthService;
    use sichtruf_db::SpeicherKontenStore;
    use std::net::{IpAddr, Ipv4Addr};

    fn test_state() -> Arc<SignalingState<SpeicherKontenStore>> {
        let auth = Arc::new(AuthService::neu(Arc::new(SpeicherKontenStore::neu())));
        SignalingState::neu(SignalingConfig::default(), auth)
    }

    fn test_ctx(port: u16) -> (DispatcherContext, mpsc::Receiver<Envelope>) {
        let (sende_tx, sende_rx) = mpsc::channel(16);
        let (schliessen_tx, _) = watch::channel(false);
        (
            DispatcherContext {
                peer_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
                benutzername: None,
                sende_tx,
                schliessen_tx: Some(schliessen_tx),
            },
            sende_rx,
        )
    }

    fn angemeldet(
        dispatcher: &MessageDispatcher<SpeicherKontenStore>,
        name: &str,
        port: u16,
    ) -> (DispatcherContext, mpsc::Receiver<Envelope>) {
        let (mut ctx, rx) = test_ctx(port);
        let antwort = dispatcher
            .dispatch(
                Envelope::parse(&format!("REGISTER|{name}|pw12345|{name}")),
                &mut ctx,
            )
            .unwrap();
        assert_eq!(antwort.kommando(), "OK");
        let antwort = dispatcher
            .dispatch(Envelope::parse(&format!("LOGIN|{name}|pw12345")), &mut ctx)
            .unwrap();
        assert_eq!(antwort.kommando(), "OK", "Login muss klappen: {antwort}");
        (ctx, rx)
    }

    #[test]
    fn register_und_login() {
        let state = test_state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let (ctx, _rx) = angemeldet(&dispatcher, "anna", 1);

        assert_eq!(ctx.benutzername.as_deref(), Some("anna"));
        assert!(state.registry.ist_online("anna"));
    }

    #[test]
    fn login_mit_falschem_passwort() {
        let state = test_state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let (mut ctx, _rx) = test_ctx(1);

        dispatcher.dispatch(Envelope::parse("REGISTER|anna|pw12345|"), &mut ctx);
        let antwort = dispatcher
            .dispatch(Envelope::parse("LOGIN|anna|falsch"), &mut ctx)
            .unwrap();

        assert_eq!(antwort.kommando(), "FAIL");
        assert_eq!(antwort.feld(1), "Falsches Passwort");
        assert!(!state.registry.ist_online("anna"));
    }

    #[test]
    fn verkuerztes_login_envelope_faellt_durch_validierung() {
        let state = test_state();
        let dispatcher = MessageDispatcher::neu(state);
        let (mut ctx, _rx) = test_ctx(1);

        // LOGIN ohne Felder: leerer Benutzername existiert nicht
        let antwort = dispatcher.dispatch(Envelope::parse("LOGIN"), &mut ctx).unwrap();
        assert_eq!(antwort.kommando(), "FAIL");
    }

    #[test]
    fn doppelte_session_wird_abgelehnt() {
        let state = test_state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let (_ctx_a, _rx_a) = angemeldet(&dispatcher, "anna", 1);

        // Zweite Verbindung versucht denselben Benutzer
        let (mut ctx_b, _rx_b) = test_ctx(2);
        let antwort = dispatcher
            .dispatch(Envelope::parse("LOGIN|anna|pw12345"), &mut ctx_b)
            .unwrap();

        assert_eq!(antwort.serialisieren(), "FAIL|Bereits angemeldet");
        assert!(ctx_b.benutzername.is_none());
        assert!(
            ctx_b.schliessen_tx.is_some(),
            "Schliess-Signal muss zurueckkommen"
        );
        assert_eq!(state.registry.anzahl(), 1);
    }

    #[test]
    fn get_online_liefert_sortierten_schnappschuss() {
        let state = test_state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let (_ctx_z, _rx_z) = angemeldet(&dispatcher, "zoe", 1);
        let (mut ctx_a, _rx_a) = angemeldet(&dispatcher, "anna", 2);

        let antwort = dispatcher
            .dispatch(Envelope::parse("GET_ONLINE"), &mut ctx_a)
            .unwrap();
        assert_eq!(antwort.serialisieren(), "ONLINE_LIST|anna,zoe");
    }

    #[test]
    fn msg_wird_unveraendert_weitergeleitet() {
        let state = test_state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let (mut ctx_a, _rx_a) = angemeldet(&dispatcher, "anna", 1);
        let (_ctx_b, mut rx_b) = angemeldet(&dispatcher, "bob", 2);

        let antwort = dispatcher.dispatch(Envelope::parse("MSG|anna|bob|hallo du"), &mut ctx_a);
        assert!(antwort.is_none(), "Weiterleitung hat keine direkte Antwort");

        // bob bekommt das identische Envelope (nach den Broadcasts)
        let mut gefunden = None;
        while let Ok(env) = rx_b.try_recv() {
            if env.kommando() == "MSG" {
                gefunden = Some(env);
            }
        }
        assert_eq!(gefunden.unwrap().serialisieren(), "MSG|anna|bob|hallo du");
    }

    #[test]
    fn msg_an_offline_empfaenger_verpufft_ohne_antwort() {
        let state = test_state();
        let dispatcher = MessageDispatcher::neu(state);
        let (mut ctx_a, _rx_a) = angemeldet(&dispatcher, "anna", 1);

        let antwort = dispatcher.dispatch(Envelope::parse("MSG|anna|bob|hallo"), &mut ctx_a);
        assert!(antwort.is_none(), "Kein FAIL an den Absender");
    }

    #[test]
    fn verkuerzte_weiterleitung_wird_ignoriert() {
        let state = test_state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let (mut ctx_a, _rx_a) = angemeldet(&dispatcher, "anna", 1);
        let (_ctx_b, mut rx_b) = angemeldet(&dispatcher, "bob", 2);

        // MSG braucht 4 Felder, FILE_REQUEST 5
        assert!(dispatcher
            .dispatch(Envelope::parse("MSG|anna|bob"), &mut ctx_a)
            .is_none());
        assert!(dispatcher
            .dispatch(Envelope::parse("FILE_REQUEST|anna|bob|datei.txt"), &mut ctx_a)
            .is_none());

        while let Ok(env) = rx_b.try_recv() {
            assert_eq!(env.kommando(), "ONLINE_LIST");
        }
    }

    #[test]
    fn file_envelopes_werden_weitergeleitet() {
        let state = test_state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let (mut ctx_a, _rx_a) = angemeldet(&dispatcher, "anna", 1);
        let (_ctx_b, mut rx_b) = angemeldet(&dispatcher, "bob", 2);

        for zeile in [
            "FILE_REQUEST|anna|bob|urlaub.jpg|10240",
            "FILE_CHUNK|anna|bob|urlaub.jpg|QUJDRA==",
            "FILE_END|anna|bob",
        ] {
            assert!(dispatcher.dispatch(Envelope::parse(zeile), &mut ctx_a).is_none());
        }

        let weitergeleitet: Vec<String> = std::iter::from_fn(|| rx_b.try_recv().ok())
            .filter(|env| env.kommando().starts_with("FILE_"))
            .map(|env| env.serialisieren())
            .collect();
        assert_eq!(
            weitergeleitet,
            vec![
                "FILE_REQUEST|anna|bob|urlaub.jpg|10240",
                "FILE_CHUNK|anna|bob|urlaub.jpg|QUJDRA==",
                "FILE_END|anna|bob",
            ]
        );
    }

    #[test]
    fn logout_entfernt_die_session() {
        let state = test_state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let (mut ctx, _rx) = angemeldet(&dispatcher, "anna", 1);

        let antwort = dispatcher.dispatch(Envelope::parse("LOGOUT"), &mut ctx);
        assert!(antwort.is_none());
        assert!(ctx.benutzername.is_none());
        assert!(!state.registry.ist_online("anna"));

        // Erneutes LOGOUT ist ein No-op
        assert!(dispatcher.dispatch(Envelope::parse("LOGOUT"), &mut ctx).is_none());
    }

    #[test]
    fn unbekanntes_kommando_wird_ignoriert() {
        let state = test_state();
        let dispatcher = MessageDispatcher::neu(state);
        let (mut ctx, _rx) = test_ctx(1);

        assert!(dispatcher
            .dispatch(Envelope::parse("WAS_IST_DAS|x|y"), &mut ctx)
            .is_none());
    }
}
