#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire format tests for the Secret Hitler client.
//!
//! Parses JSON fixtures shaped like real server output and checks the exact
//! JSON produced for outbound commands.

use secret_hitler_client::protocol::{
    Command, LobbyCode, OutboundMessage, Party, Phase, PolicyType, Role, ServerMessage, Snapshot,
    INITIAL_DRAW_SIZE,
};
use secret_hitler_client::ClientError;
use serde_json::{json, Value};

// ════════════════════════════════════════════════════════════════════
// Helper
// ════════════════════════════════════════════════════════════════════

fn parse(value: Value) -> ServerMessage {
    serde_json::from_value(value).expect("server message")
}

fn snapshot(value: Value) -> Snapshot {
    match parse(value) {
        ServerMessage::Game(snapshot) => *snapshot,
        other => panic!("expected a game snapshot, got {other:?}"),
    }
}

fn outbound(command: &Command) -> Value {
    let lobby = LobbyCode::parse("QRST").unwrap();
    let text = OutboundMessage::new(command, "ann", &lobby).to_json().unwrap();
    serde_json::from_str(&text).unwrap()
}

// ════════════════════════════════════════════════════════════════════
// Inbound packets
// ════════════════════════════════════════════════════════════════════

#[test]
fn game_snapshot_fixture() {
    let snapshot = snapshot(json!({
        "type": "game",
        "state": "LEGISLATIVE_PRESIDENT",
        "lastState": "CHANCELLOR_VOTING",
        "playerOrder": ["ann", "bob", "cat", "dan", "eve"],
        "players": {
            "ann": { "id": "FASCIST", "alive": true, "investigated": false },
            "bob": { "id": "HITLER", "alive": true, "investigated": false },
            "cat": { "alive": true, "investigated": false },
            "dan": { "alive": true, "investigated": true },
            "eve": { "alive": false, "investigated": false }
        },
        "president": "ann",
        "chancellor": "cat",
        "lastPresident": "dan",
        "lastChancellor": "bob",
        "electionTracker": 1,
        "electionTrackerAdvanced": false,
        "liberalPolicies": 2,
        "fascistPolicies": 3,
        "drawSize": 8,
        "discardSize": 4,
        "userVotes": { "ann": true, "bob": true, "cat": true, "dan": false },
        "vetoOccurred": false,
        "lastPolicy": "FASCIST",
        "presidentChoices": ["FASCIST", "LIBERAL", "FASCIST"],
        "icon": { "ann": "p3", "bob": "p_default" }
    }));

    assert_eq!(snapshot.phase, Phase::LegislativePresident);
    assert_eq!(snapshot.last_phase, Phase::ChancellorVoting);
    assert_eq!(snapshot.players["ann"].role, Some(Role::Fascist));
    assert_eq!(snapshot.players["cat"].role, None);
    assert!(snapshot.players["dan"].investigated);
    assert!(!snapshot.is_alive("eve"));
    assert_eq!(snapshot.alive_count(), 4);
    assert!(snapshot.is_president("ann"));
    assert!(snapshot.is_chancellor("cat"));
    assert!(snapshot.has_voted("dan"));
    assert!(!snapshot.has_voted("eve"));
    assert_eq!(snapshot.last_policy, Some(PolicyType::Fascist));
    assert_eq!(
        snapshot.president_choices().unwrap(),
        &[PolicyType::Fascist, PolicyType::Liberal, PolicyType::Fascist]
    );
    assert_eq!(snapshot.icons["bob"], "p_default");
    snapshot.validate().unwrap();
}

#[test]
fn sparse_snapshot_uses_pre_game_defaults() {
    let snapshot = snapshot(json!({ "type": "game", "state": "SETUP" }));
    assert_eq!(snapshot.last_phase, Phase::Setup);
    assert_eq!(snapshot.draw_size, INITIAL_DRAW_SIZE);
    assert_eq!(snapshot.election_tracker, 0);
    assert!(snapshot.players.is_empty());
    assert_eq!(snapshot, Snapshot::default());
}

#[test]
fn placeholder_last_policy_reads_as_none() {
    for raw in [json!("NONE"), json!(""), json!(null)] {
        let snapshot = snapshot(json!({
            "type": "game",
            "state": "CHANCELLOR_NOMINATION",
            "lastPolicy": raw,
        }));
        assert_eq!(snapshot.last_policy, None);
    }
}

#[test]
fn phase_conditional_fields_are_required() {
    let snapshot = snapshot(json!({
        "type": "game",
        "state": "PRESIDENTIAL_POWER_PEEK",
        "president": "ann",
        "playerOrder": ["ann"],
        "players": { "ann": { "alive": true } }
    }));
    assert!(matches!(
        snapshot.validate(),
        Err(ClientError::MissingField {
            phase: Phase::PresidentialPowerPeek,
            field: "peek"
        })
    ));
}

#[test]
fn office_holder_without_record_is_rejected() {
    let snapshot = snapshot(json!({
        "type": "game",
        "state": "CHANCELLOR_VOTING",
        "president": "zed",
        "playerOrder": [],
        "players": {}
    }));
    assert!(matches!(
        snapshot.validate(),
        Err(ClientError::UnknownPlayer(name)) if name == "zed"
    ));
}

#[test]
fn lobby_fixture() {
    let message = parse(json!({
        "type": "lobby",
        "usernames": ["ann", "bob"],
        "user-count": 2,
        "icon": { "ann": "p_default", "bob": "p4" }
    }));
    let ServerMessage::Lobby(update) = message else {
        panic!("expected a lobby update");
    };
    assert_eq!(update.usernames, vec!["ann", "bob"]);
    assert_eq!(update.user_count, 2);
    assert_eq!(update.lobby_size, None);
    assert_eq!(update.icons["bob"], "p4");
}

#[test]
fn investigation_fixture() {
    assert_eq!(
        parse(json!({ "type": "investigation", "investigation": "LIBERAL" })),
        ServerMessage::Investigation {
            investigation: Party::Liberal,
            target: None,
        }
    );
    assert_eq!(
        parse(json!({
            "type": "investigation",
            "investigation": "FASCIST",
            "target-user": "bob"
        })),
        ServerMessage::Investigation {
            investigation: Party::Fascist,
            target: Some("bob".into()),
        }
    );
}

#[test]
fn bare_packets() {
    assert_eq!(parse(json!({ "type": "ok" })), ServerMessage::Ok);
    assert_eq!(parse(json!({ "type": "pong" })), ServerMessage::Pong);
}

#[test]
fn unknown_packet_type_is_an_error() {
    assert!(serde_json::from_value::<ServerMessage>(json!({ "type": "chat" })).is_err());
    assert!(serde_json::from_value::<ServerMessage>(json!({ "state": "SETUP" })).is_err());
}

#[test]
fn unknown_phase_is_an_error() {
    assert!(serde_json::from_value::<ServerMessage>(json!({
        "type": "game",
        "state": "INTERMISSION"
    }))
    .is_err());
}

// ════════════════════════════════════════════════════════════════════
// Outbound commands
// ════════════════════════════════════════════════════════════════════

#[test]
fn targeted_commands_use_target_user() {
    let cases = [
        (
            Command::NominateChancellor {
                target: "bob".into(),
            },
            "nominate-chancellor",
        ),
        (
            Command::GetInvestigation {
                target: "bob".into(),
            },
            "get-investigation",
        ),
        (
            Command::RegisterExecution {
                target: "bob".into(),
            },
            "register-execution",
        ),
        (
            Command::RegisterSpecialElection {
                target: "bob".into(),
            },
            "register-special-election",
        ),
    ];
    for (command, name) in cases {
        assert_eq!(
            outbound(&command),
            json!({
                "command": name,
                "target-user": "bob",
                "name": "ann",
                "lobby": "QRST"
            })
        );
    }
}

#[test]
fn valued_commands() {
    assert_eq!(
        outbound(&Command::RegisterVote { vote: false }),
        json!({ "command": "register-vote", "vote": false, "name": "ann", "lobby": "QRST" })
    );
    assert_eq!(
        outbound(&Command::RegisterPresidentChoice { choice: 2 }),
        json!({
            "command": "register-president-choice",
            "choice": 2,
            "name": "ann",
            "lobby": "QRST"
        })
    );
    assert_eq!(
        outbound(&Command::RegisterChancellorChoice { choice: 0 }),
        json!({
            "command": "register-chancellor-choice",
            "choice": 0,
            "name": "ann",
            "lobby": "QRST"
        })
    );
    assert_eq!(
        outbound(&Command::PresidentVeto { veto: true }),
        json!({ "command": "president-veto", "veto": true, "name": "ann", "lobby": "QRST" })
    );
    assert_eq!(
        outbound(&Command::SelectIcon { icon: "p7".into() }),
        json!({ "command": "select-icon", "icon": "p7", "name": "ann", "lobby": "QRST" })
    );
}

#[test]
fn commands_parse_back_from_the_wire() {
    let command: Command = serde_json::from_value(json!({
        "command": "register-execution",
        "target-user": "dan",
        "name": "ann",
        "lobby": "QRST"
    }))
    .unwrap();
    assert_eq!(
        command,
        Command::RegisterExecution {
            target: "dan".into()
        }
    );
    let command: Command = serde_json::from_value(json!({ "command": "end-term" })).unwrap();
    assert_eq!(command, Command::EndTerm);
}

// ════════════════════════════════════════════════════════════════════
// Lobby codes
// ════════════════════════════════════════════════════════════════════

#[test]
fn lobby_codes() {
    assert_eq!(LobbyCode::parse(" ab12 ").unwrap().as_str(), "AB12");
    assert_eq!("wxyz".parse::<LobbyCode>().unwrap().to_string(), "WXYZ");
    for bad in ["", "ABC", "ABCDE", "AB-D", "ÄBCD"] {
        assert!(
            matches!(LobbyCode::parse(bad), Err(ClientError::InvalidLobbyCode(_))),
            "{bad:?} should be rejected"
        );
    }
}
