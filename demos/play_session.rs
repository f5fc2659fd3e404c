//! # Play Session Example
//!
//! Joins a Secret Hitler Online lobby and plays along with the simplest
//! possible strategy:
//!
//! 1. Wake the server and create a lobby (or join an existing one)
//! 2. Check the login over HTTP, then open the game connection
//! 3. Log every presentation, dismiss alerts and answer every prompt with
//!    the first option offered
//! 4. Shut down on Ctrl+C or disconnect
//!
//! ## Running
//!
//! ```sh
//! SH_SERVER_URL=http://localhost:4040 cargo run --example play_session --features http-client
//!
//! # Join an existing lobby under another name:
//! SH_LOBBY=ABCD SH_NAME=bob cargo run --example play_session --features http-client
//! ```

use secret_hitler_client::http::LobbyApi;
use secret_hitler_client::presentation::{ExecutivePower, Presentation, TaskId};
use secret_hitler_client::transports::WebSocketConnector;
use secret_hitler_client::{ClientConfig, ClientEvent, Command, LobbyCode, SecretHitlerClient};

/// Default server URL when `SH_SERVER_URL` is not set.
const DEFAULT_URL: &str = "http://localhost:4040";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("SH_SERVER_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let name = std::env::var("SH_NAME").unwrap_or_else(|_| "RustPlayer".to_string());

    // ── Lobby ───────────────────────────────────────────────────────
    let api = LobbyApi::new(&url)?;
    api.wake().await;
    let lobby = match std::env::var("SH_LOBBY") {
        Ok(code) => LobbyCode::parse(&code)?,
        Err(_) => api.create_lobby().await?,
    };
    api.check_login(&name, &lobby).await?;
    tracing::info!("Joining lobby {lobby} as {name}");

    // ── Connect ─────────────────────────────────────────────────────
    let connector = WebSocketConnector::new(&url)?;
    let (mut client, mut event_rx) =
        SecretHitlerClient::connect(connector, ClientConfig::new(name, lobby)).await?;

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    ClientEvent::Connected { lobby } => {
                        tracing::info!("Connected to lobby {lobby}");
                    }

                    ClientEvent::LobbyUpdated { usernames, .. } => {
                        tracing::info!("Lobby: {}", usernames.join(", "));
                    }

                    ClientEvent::Present { id, presentation } => {
                        tracing::info!("Showing {presentation:?}");
                        respond(&client, id, &presentation).await;
                    }

                    ClientEvent::Notice(text) => tracing::warn!("{text}"),

                    ClientEvent::ProtocolError { reason } => {
                        tracing::error!("Bad packet from server: {reason}");
                    }

                    ClientEvent::Disconnected { message } => {
                        tracing::warn!("Disconnected: {}", message.as_deref().unwrap_or("left"));
                        break;
                    }

                    other => tracing::debug!("Event: {other:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    client.shutdown().await;
    Ok(())
}

/// Pick the first option of every prompt and close every alert.
async fn respond(client: &SecretHitlerClient, id: TaskId, presentation: &Presentation) {
    let command = match presentation {
        Presentation::NominationPrompt { eligible, .. } => {
            eligible.first().map(|target| Command::NominateChancellor {
                target: target.clone(),
            })
        }
        Presentation::VotePrompt { .. } => Some(Command::RegisterVote { vote: true }),
        Presentation::DiscardPrompt { .. } => Some(Command::RegisterPresidentChoice { choice: 0 }),
        Presentation::EnactPrompt { .. } => Some(Command::RegisterChancellorChoice { choice: 0 }),
        Presentation::VetoPrompt { .. } => Some(Command::PresidentVeto { veto: false }),
        Presentation::PeekPrompt { .. } => Some(Command::RegisterPeek),
        Presentation::PlayerSelectPrompt { power, eligible } => {
            eligible.first().cloned().map(|target| match power {
                ExecutivePower::Investigate => Command::GetInvestigation { target },
                ExecutivePower::Execution => Command::RegisterExecution { target },
                ExecutivePower::SpecialElection => Command::RegisterSpecialElection { target },
            })
        }
        Presentation::IconSelection => {
            // The picker stays open until closed.
            if let Err(e) = client.submit(Command::SelectIcon { icon: "p1".into() }).await {
                tracing::warn!("Could not pick an icon: {e}");
            }
            None
        }
        _ => None,
    };

    let result = match command {
        Some(command) => client.submit(command).await,
        None => client.dismiss(id),
    };
    if let Err(e) = result {
        tracing::warn!("Could not respond to {presentation:?}: {e}");
    }
}
