#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Session-level tests for the Secret Hitler client.
//!
//! Uses the shared `MockConnector` from `tests/common` to drive server packets
//! and link drops, and checks the events a renderer would see.

mod common;

use std::time::Duration;

use secret_hitler_client::connection::{ConnectionConfig, TERMINAL_NOTICE};
use secret_hitler_client::presentation::{ExecutivePower, Presentation, PresentationTimings};
use secret_hitler_client::protocol::{Command, LobbyCode, Party, Phase, Role};
use secret_hitler_client::{ClientConfig, ClientError, ClientEvent, SecretHitlerClient};
use tokio::sync::mpsc;

use common::{
    assert_quiet, game_json, investigation_json, lobby_json, mock_server, next_event, ok_json,
    pong_json, table, wait_for, wait_for_present, with_role, MockServer,
};

// ════════════════════════════════════════════════════════════════════
// Helper: start a session against the mock server
// ════════════════════════════════════════════════════════════════════

fn config() -> ClientConfig {
    ClientConfig::new("ann", LobbyCode::parse("ABCD").unwrap())
        .with_timings(PresentationTimings::instant())
}

async fn start(
    config: ClientConfig,
) -> (
    SecretHitlerClient,
    mpsc::Receiver<ClientEvent>,
    MockServer,
) {
    let (connector, server) = mock_server();
    let (client, mut events) = SecretHitlerClient::connect(connector, config)
        .await
        .expect("connect");
    let first = next_event(&mut events).await;
    assert!(
        matches!(first, ClientEvent::Connected { .. }),
        "first event should be Connected, got {first:?}"
    );
    (client, events, server)
}

/// Drain the channel until the session ends.
async fn drain(events: &mut mpsc::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut collected = Vec::new();
    while let Some(event) =
        tokio::time::timeout(Duration::from_secs(5), events.recv()).await.expect("session hung")
    {
        collected.push(event);
    }
    collected
}

async fn wait_until_sent(server: &MockServer, command: &str) {
    for _ in 0..100 {
        if server.sent_commands().iter().any(|c| c == command) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{command} was never sent");
}

// ════════════════════════════════════════════════════════════════════
// Reconnection
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn first_reconnect_is_silent_and_messages_reset_the_budget() {
    let (mut client, mut events, server) = start(config()).await;

    server.drop_link();
    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::Retrying { attempt: 1 }
    );

    // Any packet on the new link resets the failure count.
    server.push(pong_json());
    tokio::time::sleep(Duration::from_millis(50)).await;
    server.drop_link();
    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::Retrying { attempt: 1 }
    );
    assert_quiet(&mut events).await;
    assert_eq!(server.connects(), 3);
    client.shutdown().await;
}

#[tokio::test]
async fn spent_budget_clears_the_active_prompt_and_ends_the_session() {
    let (mut client, mut events, server) = start(config()).await;

    let mut nomination = table(Phase::ChancellorNomination, "ann");
    nomination.liberal_policies = 1;
    server.push(game_json(&nomination));
    let (prompt, _) = wait_for_present(&mut events, |p| {
        matches!(p, Presentation::NominationPrompt { .. })
    })
    .await;

    server.refuse_next(3);
    server.drop_link();
    let collected = drain(&mut events).await;

    let notices = collected
        .iter()
        .filter(|e| matches!(e, ClientEvent::Notice(_)))
        .count();
    assert_eq!(notices, 2, "first retry is silent: {collected:?}");

    let position = |wanted: &ClientEvent| collected.iter().position(|e| e == wanted).unwrap();
    let hidden = position(&ClientEvent::Finished { id: prompt });
    let cleared = position(&ClientEvent::Cleared);
    assert!(hidden < cleared);
    assert_eq!(
        collected.last(),
        Some(&ClientEvent::Disconnected {
            message: Some(TERMINAL_NOTICE.into())
        })
    );
    // One initial connect plus three refused attempts.
    assert_eq!(server.connects(), 4);
    assert!(!client.is_connected());
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn keepalive_pings_while_open() {
    let config = config()
        .with_connection(ConnectionConfig::default().with_keepalive_interval(Duration::from_secs(10)));
    let (mut client, _events, server) = start(config).await;

    tokio::time::sleep(Duration::from_secs(25)).await;

    let pings: Vec<_> = server
        .sent()
        .into_iter()
        .filter(|msg| msg["command"] == "ping")
        .collect();
    assert_eq!(pings.len(), 2);
    assert_eq!(pings[0]["name"], "ann");
    assert_eq!(pings[0]["lobby"], "ABCD");
    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Presentation sequencing
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn ack_during_an_alert_does_not_release_the_later_prompt() {
    let (mut client, mut events, server) = start(config()).await;

    let mut nomination = table(Phase::ChancellorNomination, "bob");
    nomination.liberal_policies = 1;
    server.push(game_json(&nomination));
    wait_for(&mut events, |e| matches!(e, ClientEvent::Idle)).await;

    let mut execution = table(Phase::PresidentialPowerExecution, "ann");
    execution.liberal_policies = 1;
    execution.fascist_policies = 1;
    server.push(game_json(&execution));
    let (alert, _) =
        wait_for_present(&mut events, |p| matches!(p, Presentation::PolicyEnacted { .. })).await;

    // Nobody is waiting for this one.
    server.push(ok_json());
    assert_quiet(&mut events).await;

    client.dismiss(alert).unwrap();
    let (prompt, presentation) = wait_for_present(&mut events, |p| {
        matches!(p, Presentation::PlayerSelectPrompt { .. })
    })
    .await;
    let Presentation::PlayerSelectPrompt { power, eligible } = presentation else {
        unreachable!()
    };
    assert_eq!(power, ExecutivePower::Execution);
    assert!(!eligible.contains(&"ann".to_string()));
    assert_quiet(&mut events).await;

    server.push(ok_json());
    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::Finished { id: prompt }
    );
    client.shutdown().await;
}

#[tokio::test]
async fn rejected_snapshot_keeps_the_previous_one() {
    let (mut client, mut events, server) = start(config()).await;

    // A discard phase without the president's cards.
    server.push(game_json(&table(Phase::LegislativePresident, "ann")));
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::ProtocolError { .. }
    ));

    // Still diffed against the pre-game state, so the board is synced.
    let mut nomination = table(Phase::ChancellorNomination, "bob");
    nomination.fascist_policies = 2;
    server.push(game_json(&nomination));
    let (_, sync) =
        wait_for_present(&mut events, |p| matches!(p, Presentation::BoardSync { .. })).await;
    assert!(matches!(sync, Presentation::BoardSync { fascist: 2, .. }));
    client.shutdown().await;
}

#[tokio::test]
async fn victory_closes_the_link_and_dismissing_it_rejoins() {
    let (mut client, mut events, server) = start(config()).await;

    let mut voting = with_role(table(Phase::ChancellorVoting, "bob"), "ann", Role::Liberal);
    voting.chancellor = Some("cat".into());
    for name in common::TABLE {
        voting.user_votes.insert(name.into(), true);
    }
    server.push(game_json(&voting));
    wait_for(&mut events, |e| matches!(e, ClientEvent::Idle)).await;

    let mut elected = voting.clone();
    elected.phase = Phase::FascistVictoryElection;
    server.push(game_json(&elected));
    let (victory, screen) =
        wait_for_present(&mut events, |p| matches!(p, Presentation::Victory { .. })).await;
    let Presentation::Victory {
        fascists,
        viewer_won,
        ..
    } = screen
    else {
        unreachable!()
    };
    assert!(fascists.is_empty());
    assert_eq!(viewer_won, Some(false));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!client.is_connected());
    assert_eq!(server.closes(), 1);
    assert!(matches!(
        client.submit(Command::GetState).await,
        Err(ClientError::NotConnected)
    ));

    client.dismiss(victory).unwrap();
    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::Finished { id: victory }
    );
    assert_eq!(next_event(&mut events).await, ClientEvent::Cleared);
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::Connected { .. }
    ));
    assert_eq!(server.connects(), 2);
    client.shutdown().await;
}

#[tokio::test]
async fn investigation_result_names_the_requested_target() {
    let (mut client, mut events, server) = start(config()).await;

    client
        .submit(Command::GetInvestigation {
            target: "bob".into(),
        })
        .await
        .unwrap();
    wait_until_sent(&server, "get-investigation").await;

    server.push(investigation_json(Party::Fascist));
    let (_, result) = wait_for_present(&mut events, |p| {
        matches!(p, Presentation::InvestigationResult { .. })
    })
    .await;
    assert_eq!(
        result,
        Presentation::InvestigationResult {
            target: "bob".into(),
            party: Party::Fascist,
        }
    );
    client.shutdown().await;
}

#[tokio::test]
async fn icon_picker_stays_open_until_dismissed() {
    let (mut client, mut events, server) = start(config()).await;

    server.push(lobby_json(&[("ann", "p_default"), ("bob", "p3")]));
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::LobbyUpdated { .. }
    ));
    let (prompt, _) =
        wait_for_present(&mut events, |p| matches!(p, Presentation::IconSelection)).await;

    // Only one picker while it is open.
    server.push(lobby_json(&[("ann", "p_default"), ("bob", "p3"), ("cat", "p1")]));
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::LobbyUpdated { .. }
    ));
    assert_quiet(&mut events).await;

    // Picking is not locked out, and the ack does not close the picker.
    client
        .submit(Command::SelectIcon { icon: "p4".into() })
        .await
        .unwrap();
    client
        .submit(Command::SelectIcon { icon: "p7".into() })
        .await
        .unwrap();
    server.push(ok_json());
    assert_quiet(&mut events).await;
    let picks = server
        .sent()
        .into_iter()
        .filter(|msg| msg["command"] == "select-icon")
        .count();
    assert_eq!(picks, 2);

    client.dismiss(prompt).unwrap();
    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::Finished { id: prompt }
    );
    assert_eq!(next_event(&mut events).await, ClientEvent::Idle);
    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Input and lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn submit_lockout_expires_on_its_own() {
    let (mut client, _events, server) = start(config()).await;

    client.submit(Command::RegisterPeek).await.unwrap();
    assert!(matches!(
        client.submit(Command::EndTerm).await,
        Err(ClientError::InputLocked { .. })
    ));

    tokio::time::sleep(Duration::from_secs(4)).await;
    client.submit(Command::EndTerm).await.unwrap();
    wait_until_sent(&server, "end-term").await;
    client.shutdown().await;
}

#[tokio::test]
async fn leaving_does_not_reconnect() {
    let (mut client, mut events, server) = start(config()).await;

    client.leave().unwrap();
    let collected = drain(&mut events).await;
    assert_eq!(
        collected,
        vec![
            ClientEvent::Cleared,
            ClientEvent::Disconnected { message: None }
        ]
    );
    assert_eq!(server.closes(), 1);
    assert_eq!(server.connects(), 1);
    assert!(matches!(client.leave(), Err(ClientError::NotConnected)));
    client.shutdown().await;
}
