//! Wire-compatible protocol types for the Secret Hitler lobby server.
//!
//! Inbound packets are JSON objects tagged by `"type"`. Game packets carry a
//! full [`Snapshot`] of the game, never a delta. Outbound packets are JSON
//! objects tagged by `"command"` with the sender's `name` and `lobby` code
//! appended (see [`OutboundMessage`]).
//!
//! All maps are `BTreeMap`s so that anything derived from a snapshot iterates
//! in a stable order.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ClientError, Result};

/// Number of characters in a lobby code.
pub const LOBBY_CODE_LENGTH: usize = 4;

/// Size of the policy deck before any card is drawn.
pub const INITIAL_DRAW_SIZE: u32 = 17;

/// Election tracker position that forces a policy from the top of the deck.
pub const TRACKER_MAX: u8 = 3;

/// Liberal policies needed for a liberal victory.
pub const LIBERAL_POLICIES_TO_WIN: u8 = 5;

/// Fascist policies needed for a fascist victory.
pub const FASCIST_POLICIES_TO_WIN: u8 = 6;

/// Icon id the server assigns to players who have not picked a portrait.
pub const DEFAULT_ICON: &str = "p_default";

// ── Enums ───────────────────────────────────────────────────────────

/// Lobby and game phases, as reported in a snapshot's `state` field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Players are gathered but the game has not started.
    #[default]
    Setup,
    /// The president is choosing a chancellor.
    ChancellorNomination,
    /// Everyone votes on the proposed government.
    ChancellorVoting,
    /// The president discards one of three drawn policies.
    LegislativePresident,
    /// The chancellor enacts one of the two remaining policies.
    LegislativeChancellor,
    /// The chancellor asked for a veto; the president decides.
    LegislativePresidentVeto,
    /// The president previews the top three policies.
    PresidentialPowerPeek,
    /// The president learns one player's party.
    PresidentialPowerInvestigate,
    /// The president executes a player.
    PresidentialPowerExecution,
    /// The president picks the next president.
    PresidentialPowerElection,
    /// Waiting for the president to end their term.
    PostLegislative,
    LiberalVictoryPolicy,
    LiberalVictoryExecution,
    FascistVictoryPolicy,
    FascistVictoryElection,
}

impl Phase {
    /// Phases whose snapshots can carry the outcome of a legislative session
    /// or a failed election, i.e. policy and tracker changes.
    pub fn is_reveal_bearing(self) -> bool {
        matches!(
            self,
            Self::PostLegislative
                | Self::PresidentialPowerPeek
                | Self::PresidentialPowerInvestigate
                | Self::PresidentialPowerExecution
                | Self::PresidentialPowerElection
                | Self::FascistVictoryPolicy
                | Self::LiberalVictoryPolicy
        )
    }

    /// Phases in which the president exercises an executive power.
    pub fn is_presidential_power(self) -> bool {
        matches!(
            self,
            Self::PresidentialPowerPeek
                | Self::PresidentialPowerInvestigate
                | Self::PresidentialPowerExecution
                | Self::PresidentialPowerElection
        )
    }

    /// The kind of victory this phase represents, if it ends the game.
    pub fn victory(self) -> Option<VictoryKind> {
        match self {
            Self::LiberalVictoryPolicy => Some(VictoryKind::LiberalPolicy),
            Self::LiberalVictoryExecution => Some(VictoryKind::LiberalExecution),
            Self::FascistVictoryPolicy => Some(VictoryKind::FascistPolicy),
            Self::FascistVictoryElection => Some(VictoryKind::FascistElection),
            _ => None,
        }
    }

    pub fn is_victory(self) -> bool {
        self.victory().is_some()
    }
}

/// Secret role of a player.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Liberal,
    Fascist,
    Hitler,
}

impl Role {
    /// The party this role belongs to. Hitler is a fascist.
    pub fn party(self) -> Party {
        match self {
            Self::Liberal => Party::Liberal,
            Self::Fascist | Self::Hitler => Party::Fascist,
        }
    }
}

/// Party membership, as revealed by an investigation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Party {
    Liberal,
    Fascist,
}

/// Type of a policy card.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyType {
    Liberal,
    Fascist,
}

/// How a game was won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VictoryKind {
    /// Five liberal policies enacted.
    LiberalPolicy,
    /// Hitler was executed.
    LiberalExecution,
    /// Six fascist policies enacted.
    FascistPolicy,
    /// Hitler was elected chancellor late in the game.
    FascistElection,
}

impl VictoryKind {
    pub fn winning_party(self) -> Party {
        match self {
            Self::LiberalPolicy | Self::LiberalExecution => Party::Liberal,
            Self::FascistPolicy | Self::FascistElection => Party::Fascist,
        }
    }
}

// ── Lobby code ──────────────────────────────────────────────────────

/// A validated lobby code: exactly four ASCII letters or digits, upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LobbyCode(String);

impl LobbyCode {
    /// Validate and normalize a lobby code.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidLobbyCode`] unless `code` is exactly
    /// [`LOBBY_CODE_LENGTH`] ASCII alphanumeric characters.
    pub fn parse(code: &str) -> Result<Self> {
        let code = code.trim();
        if code.chars().count() != LOBBY_CODE_LENGTH
            || !code.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ClientError::InvalidLobbyCode(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for LobbyCode {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LobbyCode {
    type Error = ClientError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<LobbyCode> for String {
    fn from(code: LobbyCode) -> Self {
        code.0
    }
}

impl fmt::Display for LobbyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Snapshot ────────────────────────────────────────────────────────

/// Per-player record inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    /// The player's role. Only present when the viewer may see it; absence
    /// says nothing about the role.
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub alive: bool,
    #[serde(default)]
    pub investigated: bool,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            role: None,
            alive: true,
            investigated: false,
        }
    }
}

/// The full authoritative game state pushed by the server.
///
/// Optional fields are only sent in the phases that use them:
/// `presidentChoices` in [`Phase::LegislativePresident`], `chancellorChoices`
/// in [`Phase::LegislativeChancellor`] and `peek` in
/// [`Phase::PresidentialPowerPeek`]. [`Snapshot::validate`] enforces this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(rename = "state")]
    pub phase: Phase,
    #[serde(rename = "lastState", default)]
    pub last_phase: Phase,
    #[serde(default)]
    pub player_order: Vec<String>,
    #[serde(default)]
    pub players: BTreeMap<String, PlayerState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub president: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chancellor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_president: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_chancellor: Option<String>,
    /// Player targeted by the most recent executive power.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user: Option<String>,

    #[serde(default)]
    pub election_tracker: u8,
    /// Set when the tracker just hit its maximum and wrapped back to zero.
    #[serde(default)]
    pub election_tracker_advanced: bool,
    #[serde(default)]
    pub liberal_policies: u8,
    #[serde(default)]
    pub fascist_policies: u8,
    #[serde(default = "initial_draw_size")]
    pub draw_size: u32,
    #[serde(default)]
    pub discard_size: u32,

    #[serde(default)]
    pub user_votes: BTreeMap<String, bool>,
    #[serde(default)]
    pub veto_occurred: bool,
    #[serde(
        default,
        deserialize_with = "lenient_policy",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_policy: Option<PolicyType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub president_choices: Option<Vec<PolicyType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chancellor_choices: Option<Vec<PolicyType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peek: Option<Vec<PolicyType>>,

    /// Portrait id per player name.
    #[serde(rename = "icon", default)]
    pub icons: BTreeMap<String, String>,
}

fn initial_draw_size() -> u32 {
    INITIAL_DRAW_SIZE
}

/// The server reports "no policy yet" with assorted placeholder strings.
fn lenient_policy<'de, D>(deserializer: D) -> std::result::Result<Option<PolicyType>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(match raw.as_deref() {
        Some("LIBERAL") => Some(PolicyType::Liberal),
        Some("FASCIST") => Some(PolicyType::Fascist),
        _ => None,
    })
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            phase: Phase::Setup,
            last_phase: Phase::Setup,
            player_order: Vec::new(),
            players: BTreeMap::new(),
            president: None,
            chancellor: None,
            last_president: None,
            last_chancellor: None,
            target_user: None,
            election_tracker: 0,
            election_tracker_advanced: false,
            liberal_policies: 0,
            fascist_policies: 0,
            draw_size: INITIAL_DRAW_SIZE,
            discard_size: 0,
            user_votes: BTreeMap::new(),
            veto_occurred: false,
            last_policy: None,
            president_choices: None,
            chancellor_choices: None,
            peek: None,
            icons: BTreeMap::new(),
        }
    }
}

impl Snapshot {
    /// Check the structural and phase-conditional invariants of a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MalformedSnapshot`] for out-of-range counters or
    /// players without a record, and [`ClientError::MissingField`] when the
    /// phase requires a field the snapshot does not carry.
    pub fn validate(&self) -> Result<()> {
        if self.election_tracker > TRACKER_MAX {
            return Err(ClientError::MalformedSnapshot(format!(
                "election tracker at {} (max {TRACKER_MAX})",
                self.election_tracker
            )));
        }
        if self.liberal_policies > LIBERAL_POLICIES_TO_WIN {
            return Err(ClientError::MalformedSnapshot(format!(
                "{} liberal policies enacted",
                self.liberal_policies
            )));
        }
        if self.fascist_policies > FASCIST_POLICIES_TO_WIN {
            return Err(ClientError::MalformedSnapshot(format!(
                "{} fascist policies enacted",
                self.fascist_policies
            )));
        }
        if let Some(name) = self
            .player_order
            .iter()
            .find(|name| !self.players.contains_key(*name))
        {
            return Err(ClientError::MalformedSnapshot(format!(
                "player {name:?} is seated but has no record"
            )));
        }
        for office in [&self.president, &self.chancellor].into_iter().flatten() {
            if !self.players.contains_key(office) {
                return Err(ClientError::UnknownPlayer(office.clone()));
            }
        }

        match self.phase {
            Phase::LegislativePresident => {
                self.president_choices()?;
            }
            Phase::LegislativeChancellor => {
                self.chancellor_choices()?;
            }
            Phase::PresidentialPowerPeek => {
                self.peek()?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Look up a player record.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnknownPlayer`] if `name` has no record.
    pub fn player(&self, name: &str) -> Result<&PlayerState> {
        self.players
            .get(name)
            .ok_or_else(|| ClientError::UnknownPlayer(name.to_string()))
    }

    pub fn is_alive(&self, name: &str) -> bool {
        self.players.get(name).is_some_and(|p| p.alive)
    }

    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.alive).count()
    }

    pub fn has_voted(&self, name: &str) -> bool {
        self.user_votes.contains_key(name)
    }

    pub fn is_president(&self, name: &str) -> bool {
        self.president.as_deref() == Some(name)
    }

    pub fn is_chancellor(&self, name: &str) -> bool {
        self.chancellor.as_deref() == Some(name)
    }

    /// The president's three drawn policies.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MissingField`] if the snapshot does not carry them.
    pub fn president_choices(&self) -> Result<&[PolicyType]> {
        self.require(self.president_choices.as_deref(), "presidentChoices")
    }

    /// The chancellor's two remaining policies.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MissingField`] if the snapshot does not carry them.
    pub fn chancellor_choices(&self) -> Result<&[PolicyType]> {
        self.require(self.chancellor_choices.as_deref(), "chancellorChoices")
    }

    /// The three policies revealed by a peek.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MissingField`] if the snapshot does not carry them.
    pub fn peek(&self) -> Result<&[PolicyType]> {
        self.require(self.peek.as_deref(), "peek")
    }

    /// The target of the last executive power.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MissingField`] if no target is recorded.
    pub fn target(&self) -> Result<&str> {
        self.require(self.target_user.as_deref(), "targetUser")
    }

    fn require<'a, T: ?Sized>(&self, value: Option<&'a T>, field: &'static str) -> Result<&'a T> {
        value.ok_or(ClientError::MissingField {
            phase: self.phase,
            field,
        })
    }
}

// ── Inbound packets ─────────────────────────────────────────────────

/// Roster update sent while the lobby is not in a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyUpdate {
    #[serde(default)]
    pub usernames: Vec<String>,
    #[serde(rename = "user-count", default)]
    pub user_count: u32,
    #[serde(rename = "lobby-size", default, skip_serializing_if = "Option::is_none")]
    pub lobby_size: Option<u32>,
    #[serde(rename = "icon", default)]
    pub icons: BTreeMap<String, String>,
}

/// Packets sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// The lobby roster changed.
    Lobby(LobbyUpdate),
    /// A full game snapshot.
    Game(Box<Snapshot>),
    /// Answer to an investigation, sent only to the investigating president.
    Investigation {
        investigation: Party,
        #[serde(rename = "target-user", default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    /// The last command succeeded.
    Ok,
    /// Keep-alive reply.
    Pong,
}

// ── Outbound commands ───────────────────────────────────────────────

/// Commands a client can send over the game connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Command {
    /// Keep-alive.
    Ping,
    StartGame,
    /// Ask the server to resend the current state.
    GetState,
    SelectIcon {
        icon: String,
    },
    NominateChancellor {
        #[serde(rename = "target-user")]
        target: String,
    },
    RegisterVote {
        vote: bool,
    },
    /// Index of the policy the president discards.
    RegisterPresidentChoice {
        choice: usize,
    },
    /// Index of the policy the chancellor enacts.
    RegisterChancellorChoice {
        choice: usize,
    },
    ChancellorVeto,
    PresidentVeto {
        veto: bool,
    },
    RegisterPeek,
    GetInvestigation {
        #[serde(rename = "target-user")]
        target: String,
    },
    RegisterExecution {
        #[serde(rename = "target-user")]
        target: String,
    },
    RegisterSpecialElection {
        #[serde(rename = "target-user")]
        target: String,
    },
    EndTerm,
}

impl Command {
    /// Whether this command is a player decision subject to the submit lockout.
    ///
    /// Icon picks are not: the picker stays open and may be used repeatedly.
    pub fn is_player_action(&self) -> bool {
        !matches!(
            self,
            Self::Ping | Self::GetState | Self::StartGame | Self::SelectIcon { .. }
        )
    }

    /// Wire name of the command, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::StartGame => "start-game",
            Self::GetState => "get-state",
            Self::SelectIcon { .. } => "select-icon",
            Self::NominateChancellor { .. } => "nominate-chancellor",
            Self::RegisterVote { .. } => "register-vote",
            Self::RegisterPresidentChoice { .. } => "register-president-choice",
            Self::RegisterChancellorChoice { .. } => "register-chancellor-choice",
            Self::ChancellorVeto => "chancellor-veto",
            Self::PresidentVeto { .. } => "president-veto",
            Self::RegisterPeek => "register-peek",
            Self::GetInvestigation { .. } => "get-investigation",
            Self::RegisterExecution { .. } => "register-execution",
            Self::RegisterSpecialElection { .. } => "register-special-election",
            Self::EndTerm => "end-term",
        }
    }
}

/// A command addressed to a lobby, as it goes on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage<'a> {
    #[serde(flatten)]
    pub command: &'a Command,
    pub name: &'a str,
    pub lobby: &'a LobbyCode,
}

impl<'a> OutboundMessage<'a> {
    pub fn new(command: &'a Command, name: &'a str, lobby: &'a LobbyCode) -> Self {
        Self {
            command,
            name,
            lobby,
        }
    }

    /// Serialize to the JSON text sent over the transport.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn phase_wire_names() {
        let phase: Phase = serde_json::from_str("\"PRESIDENTIAL_POWER_PEEK\"").unwrap();
        assert_eq!(phase, Phase::PresidentialPowerPeek);
        assert_eq!(
            serde_json::to_string(&Phase::LegislativePresidentVeto).unwrap(),
            "\"LEGISLATIVE_PRESIDENT_VETO\""
        );
    }

    #[test]
    fn reveal_bearing_phases() {
        assert!(Phase::PostLegislative.is_reveal_bearing());
        assert!(Phase::FascistVictoryPolicy.is_reveal_bearing());
        assert!(!Phase::FascistVictoryElection.is_reveal_bearing());
        assert!(!Phase::ChancellorNomination.is_reveal_bearing());
        assert!(!Phase::LiberalVictoryExecution.is_reveal_bearing());
    }

    #[test]
    fn lobby_code_is_normalized() {
        let code = LobbyCode::parse(" abcd ").unwrap();
        assert_eq!(code.as_str(), "ABCD");
        assert!(LobbyCode::parse("ABC").is_err());
        assert!(LobbyCode::parse("AB-D").is_err());
        assert!(LobbyCode::parse("ABCDE").is_err());
    }

    #[test]
    fn lobby_code_rejected_on_deserialize() {
        let err = serde_json::from_str::<LobbyCode>("\"TOOLONG\"");
        assert!(err.is_err());
    }

    #[test]
    fn snapshot_defaults_match_setup() {
        let snapshot: Snapshot = serde_json::from_value(json!({ "state": "SETUP" })).unwrap();
        assert_eq!(snapshot, Snapshot::default());
        assert_eq!(snapshot.draw_size, INITIAL_DRAW_SIZE);
    }

    #[test]
    fn unknown_last_policy_is_none() {
        let snapshot: Snapshot =
            serde_json::from_value(json!({ "state": "SETUP", "lastPolicy": "NONE" })).unwrap();
        assert_eq!(snapshot.last_policy, None);
        let snapshot: Snapshot =
            serde_json::from_value(json!({ "state": "SETUP", "lastPolicy": "FASCIST" }))
                .unwrap();
        assert_eq!(snapshot.last_policy, Some(PolicyType::Fascist));
    }

    #[test]
    fn hidden_role_stays_hidden() {
        let snapshot: Snapshot = serde_json::from_value(json!({
            "state": "CHANCELLOR_NOMINATION",
            "playerOrder": ["ann", "bob"],
            "players": {
                "ann": { "id": "HITLER", "alive": true, "investigated": false },
                "bob": { "alive": true, "investigated": false }
            },
            "president": "ann"
        }))
        .unwrap();
        assert_eq!(snapshot.players["ann"].role, Some(Role::Hitler));
        assert_eq!(snapshot.players["bob"].role, None);
    }

    #[test]
    fn validate_requires_phase_fields() {
        let snapshot = Snapshot {
            phase: Phase::LegislativePresident,
            ..Snapshot::default()
        };
        let err = snapshot.validate().unwrap_err();
        assert!(matches!(
            err,
            ClientError::MissingField {
                field: "presidentChoices",
                ..
            }
        ));
    }

    #[test]
    fn validate_rejects_unseated_records() {
        let snapshot = Snapshot {
            phase: Phase::ChancellorNomination,
            player_order: vec!["ghost".into()],
            ..Snapshot::default()
        };
        assert!(matches!(
            snapshot.validate(),
            Err(ClientError::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn validate_rejects_tracker_overflow() {
        let snapshot = Snapshot {
            election_tracker: 4,
            ..Snapshot::default()
        };
        assert!(matches!(
            snapshot.validate(),
            Err(ClientError::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn outbound_message_flattens_command() {
        let lobby = LobbyCode::parse("WXYZ").unwrap();
        let command = Command::NominateChancellor {
            target: "bob".into(),
        };
        let json = OutboundMessage::new(&command, "ann", &lobby).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["command"], "nominate-chancellor");
        assert_eq!(value["target-user"], "bob");
        assert_eq!(value["name"], "ann");
        assert_eq!(value["lobby"], "WXYZ");
    }

    #[test]
    fn unit_commands_carry_only_routing_fields() {
        let lobby = LobbyCode::parse("WXYZ").unwrap();
        let json = OutboundMessage::new(&Command::ChancellorVeto, "ann", &lobby)
            .to_json()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            json!({ "command": "chancellor-veto", "name": "ann", "lobby": "WXYZ" })
        );
    }

    #[test]
    fn command_names_match_wire_tags() {
        let commands = [
            Command::Ping,
            Command::EndTerm,
            Command::RegisterPeek,
            Command::PresidentVeto { veto: true },
            Command::RegisterSpecialElection {
                target: "x".into(),
            },
        ];
        for command in commands {
            let value = serde_json::to_value(&command).unwrap();
            assert_eq!(value["command"], command.name());
        }
    }

    #[test]
    fn lockout_applies_to_player_actions_only() {
        assert!(!Command::Ping.is_player_action());
        assert!(!Command::GetState.is_player_action());
        assert!(!Command::SelectIcon { icon: "p4".into() }.is_player_action());
        assert!(Command::RegisterVote { vote: true }.is_player_action());
        assert!(Command::EndTerm.is_player_action());
    }
}
