//! Text wire protocol spoken over UDP, one message per datagram.
//!
//! Every message is a verb optionally followed by `key=value` fields separated
//! by `;`. Both directions are modelled as closed enums so the server never
//! matches on raw substrings; the wire text itself is kept byte-compatible
//! with existing clients.

use crate::PlayerId;
use std::fmt::{self, Write};
use std::str::FromStr;
use thiserror::Error;

const DISCOVER: &str = "Hello_There";
const DISCOVER_REPLY: &str = "General_Kenobi";
const CONNECT: &str = "Conectar";
const CONNECTED: &str = "Conectado";
const REGISTERED_PREFIX: &str = "Registrado con ID ";
const NOT_REGISTERED: &str = "No_registrado";
const PING: &str = "PING";
const PONG: &str = "PONG";
const DISCONNECT: &str = "DISCONNECT";
const READY_PREFIX: &str = "READY=";
const INPUT_PREFIX: &str = "INPUT;";
const LOBBY_PREFIX: &str = "LOBBY;";
const MATCH_STARTED: &str = "PARTIDA_INICIADA";
const MATCH_ABORTED: &str = "PARTIDA_ABORTADA";
const ERROR_PREFIX: &str = "SERVER_ERROR;";
const STATE_PREFIX: &str = "STATE;";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("missing field `{field}` in {verb}")]
    MissingField {
        verb: &'static str,
        field: &'static str,
    },
    #[error("malformed field `{field}` in {verb}")]
    MalformedField { verb: &'static str, field: String },
}

/// Commands a client may send to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `Hello_There`, answered without registration.
    Discover,
    /// `Conectar`
    Connect,
    Ping,
    Disconnect,
    /// `READY=1` / `READY=0`
    Ready(bool),
    /// `INPUT;jump=<0|1>;seq=<n>`. The sequence number is informational, so
    /// an unreadable one decodes as `None` instead of rejecting the jump.
    Input { jump: bool, seq: Option<u64> },
}

impl ClientMessage {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ProtocolError::Empty);
        }

        match text {
            DISCOVER => return Ok(ClientMessage::Discover),
            CONNECT => return Ok(ClientMessage::Connect),
            PING => return Ok(ClientMessage::Ping),
            DISCONNECT => return Ok(ClientMessage::Disconnect),
            _ => {}
        }

        if let Some(value) = text.strip_prefix(READY_PREFIX) {
            return parse_flag("READY", "READY", value).map(ClientMessage::Ready);
        }

        if let Some(rest) = text.strip_prefix(INPUT_PREFIX) {
            let mut jump = false;
            let mut seq = None;
            for field in fields("INPUT", rest) {
                match field? {
                    ("jump", value) => jump = parse_flag("INPUT", "jump", value)?,
                    ("seq", value) => seq = value.trim().parse().ok(),
                    _ => {}
                }
            }
            return Ok(ClientMessage::Input { jump, seq });
        }

        Err(ProtocolError::Unknown(text.to_string()))
    }

    pub fn encode(&self) -> String {
        match self {
            ClientMessage::Discover => DISCOVER.to_string(),
            ClientMessage::Connect => CONNECT.to_string(),
            ClientMessage::Ping => PING.to_string(),
            ClientMessage::Disconnect => DISCONNECT.to_string(),
            ClientMessage::Ready(ready) => format!("{}{}", READY_PREFIX, flag(*ready)),
            ClientMessage::Input { jump, seq } => match seq {
                Some(seq) => format!("{}jump={};seq={}", INPUT_PREFIX, flag(*jump), seq),
                None => format!("{}jump={}", INPUT_PREFIX, flag(*jump)),
            },
        }
    }
}

/// `code=` values carried by `SERVER_ERROR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Full,
    InGame,
    Abort,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Full => "FULL",
            ErrorCode::InGame => "IN_GAME",
            ErrorCode::Abort => "ABORT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FULL" => Ok(ErrorCode::Full),
            "IN_GAME" => Ok(ErrorCode::InGame),
            "ABORT" => Ok(ErrorCode::Abort),
            other => Err(ProtocolError::MalformedField {
                verb: "SERVER_ERROR",
                field: format!("code={}", other),
            }),
        }
    }
}

/// Per-player portion of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerState {
    pub y: f32,
    pub vy: f32,
    pub alive: bool,
    pub score: u32,
}

/// Obstacles are sent as position and gap center only; clients rebuild the
/// collision boxes from the shared balance constants.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ObstacleState {
    pub x: f32,
    pub gap_center: f32,
}

/// Full world state broadcast once per simulation tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub tick: u64,
    pub players: [PlayerState; 2],
    pub obstacles: Vec<ObstacleState>,
}

impl Snapshot {
    pub fn player(&self, id: PlayerId) -> &PlayerState {
        &self.players[id.index()]
    }

    /// `STATE;tick=<n>;P1=<y>,<vy>,<alive>,<score>;P2=...;T=<x>,<gap>|...;`
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(64 + self.obstacles.len() * 16);
        let _ = write!(out, "{}tick={};", STATE_PREFIX, self.tick);
        for id in PlayerId::ALL {
            let p = self.player(id);
            let _ = write!(
                out,
                "P{}={:.2},{:.2},{},{};",
                id,
                p.y,
                p.vy,
                flag(p.alive),
                p.score
            );
        }
        out.push_str("T=");
        for (i, o) in self.obstacles.iter().enumerate() {
            if i > 0 {
                out.push('|');
            }
            let _ = write!(out, "{:.2},{:.2}", o.x, o.gap_center);
        }
        out.push(';');
        out
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let rest = text
            .trim()
            .strip_prefix(STATE_PREFIX)
            .ok_or_else(|| ProtocolError::Unknown(text.to_string()))?;

        let mut tick = None;
        let mut players = [None, None];
        let mut obstacles = None;

        for field in fields("STATE", rest) {
            match field? {
                ("tick", value) => tick = Some(parse_number("STATE", "tick", value)?),
                ("P1", value) => players[0] = Some(parse_player(value)?),
                ("P2", value) => players[1] = Some(parse_player(value)?),
                ("T", value) => obstacles = Some(parse_obstacles(value)?),
                _ => {}
            }
        }

        let missing = |field| ProtocolError::MissingField {
            verb: "STATE",
            field,
        };
        Ok(Snapshot {
            tick: tick.ok_or_else(|| missing("tick"))?,
            players: [
                players[0].ok_or_else(|| missing("P1"))?,
                players[1].ok_or_else(|| missing("P2"))?,
            ],
            obstacles: obstacles.ok_or_else(|| missing("T"))?,
        })
    }
}

/// Replies and broadcasts sent by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// `General_Kenobi`
    DiscoveryReply,
    /// `Conectado`
    Connected,
    /// `Registrado con ID <n>`
    Registered(PlayerId),
    /// `No_registrado`
    NotRegistered,
    Pong,
    /// `LOBBY;READY_P1=<0|1>;READY_P2=<0|1>`
    Lobby { ready: [bool; 2] },
    /// `PARTIDA_INICIADA`
    MatchStarted,
    /// `PARTIDA_ABORTADA`
    MatchAborted,
    /// `SERVER_ERROR;code=<code>;detail=<text>`
    Error { code: ErrorCode, detail: String },
    State(Snapshot),
}

impl ServerMessage {
    pub fn error(code: ErrorCode, detail: impl Into<String>) -> Self {
        ServerMessage::Error {
            code,
            detail: detail.into(),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            ServerMessage::DiscoveryReply => DISCOVER_REPLY.to_string(),
            ServerMessage::Connected => CONNECTED.to_string(),
            ServerMessage::Registered(id) => format!("{}{}", REGISTERED_PREFIX, id),
            ServerMessage::NotRegistered => NOT_REGISTERED.to_string(),
            ServerMessage::Pong => PONG.to_string(),
            ServerMessage::Lobby { ready } => format!(
                "{}READY_P1={};READY_P2={}",
                LOBBY_PREFIX,
                flag(ready[0]),
                flag(ready[1])
            ),
            ServerMessage::MatchStarted => MATCH_STARTED.to_string(),
            ServerMessage::MatchAborted => MATCH_ABORTED.to_string(),
            ServerMessage::Error { code, detail } => {
                format!("{}code={};detail={}", ERROR_PREFIX, code, detail)
            }
            ServerMessage::State(snapshot) => snapshot.encode(),
        }
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ProtocolError::Empty);
        }

        match text {
            DISCOVER_REPLY => return Ok(ServerMessage::DiscoveryReply),
            CONNECTED => return Ok(ServerMessage::Connected),
            NOT_REGISTERED => return Ok(ServerMessage::NotRegistered),
            PONG => return Ok(ServerMessage::Pong),
            MATCH_STARTED => return Ok(ServerMessage::MatchStarted),
            MATCH_ABORTED => return Ok(ServerMessage::MatchAborted),
            _ => {}
        }

        if let Some(value) = text.strip_prefix(REGISTERED_PREFIX) {
            let id = value
                .parse::<u8>()
                .ok()
                .and_then(PlayerId::from_number)
                .ok_or_else(|| ProtocolError::MalformedField {
                    verb: "Registrado",
                    field: value.to_string(),
                })?;
            return Ok(ServerMessage::Registered(id));
        }

        if let Some(rest) = text.strip_prefix(LOBBY_PREFIX) {
            let mut ready = [None, None];
            for field in fields("LOBBY", rest) {
                match field? {
                    ("READY_P1", value) => ready[0] = Some(parse_flag("LOBBY", "READY_P1", value)?),
                    ("READY_P2", value) => ready[1] = Some(parse_flag("LOBBY", "READY_P2", value)?),
                    _ => {}
                }
            }
            let missing = |field| ProtocolError::MissingField {
                verb: "LOBBY",
                field,
            };
            return Ok(ServerMessage::Lobby {
                ready: [
                    ready[0].ok_or_else(|| missing("READY_P1"))?,
                    ready[1].ok_or_else(|| missing("READY_P2"))?,
                ],
            });
        }

        if let Some(rest) = text.strip_prefix(ERROR_PREFIX) {
            let mut code = None;
            let mut detail = String::new();
            for field in fields("SERVER_ERROR", rest) {
                match field? {
                    ("code", value) => code = Some(value.parse::<ErrorCode>()?),
                    ("detail", value) => detail = value.to_string(),
                    _ => {}
                }
            }
            let code = code.ok_or(ProtocolError::MissingField {
                verb: "SERVER_ERROR",
                field: "code",
            })?;
            return Ok(ServerMessage::Error { code, detail });
        }

        if text.starts_with(STATE_PREFIX) {
            return Snapshot::decode(text).map(ServerMessage::State);
        }

        Err(ProtocolError::Unknown(text.to_string()))
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn flag(value: bool) -> u8 {
    u8::from(value)
}

/// Splits `k=v;k=v;` into pairs, skipping empty segments.
fn fields<'a>(
    verb: &'static str,
    rest: &'a str,
) -> impl Iterator<Item = Result<(&'a str, &'a str), ProtocolError>> + 'a {
    rest.split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(move |segment| {
            segment
                .split_once('=')
                .ok_or_else(|| ProtocolError::MalformedField {
                    verb,
                    field: segment.to_string(),
                })
        })
}

fn parse_flag(verb: &'static str, name: &str, value: &str) -> Result<bool, ProtocolError> {
    match value.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(ProtocolError::MalformedField {
            verb,
            field: format!("{}={}", name, value),
        }),
    }
}

fn parse_number<T: FromStr>(verb: &'static str, name: &str, value: &str) -> Result<T, ProtocolError> {
    value.trim().parse().map_err(|_| ProtocolError::MalformedField {
        verb,
        field: format!("{}={}", name, value),
    })
}

fn parse_player(value: &str) -> Result<PlayerState, ProtocolError> {
    let parts: Vec<&str> = value.split(',').collect();
    if parts.len() != 4 {
        return Err(ProtocolError::MalformedField {
            verb: "STATE",
            field: value.to_string(),
        });
    }
    Ok(PlayerState {
        y: parse_number("STATE", "y", parts[0])?,
        vy: parse_number("STATE", "vy", parts[1])?,
        alive: parse_flag("STATE", "alive", parts[2])?,
        score: parse_number("STATE", "score", parts[3])?,
    })
}

fn parse_obstacles(value: &str) -> Result<Vec<ObstacleState>, ProtocolError> {
    value
        .split('|')
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (x, gap) = entry
                .split_once(',')
                .ok_or_else(|| ProtocolError::MalformedField {
                    verb: "STATE",
                    field: entry.to_string(),
                })?;
            Ok(ObstacleState {
                x: parse_number("STATE", "x", x)?,
                gap_center: parse_number("STATE", "gap", gap)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_decode_fixed_commands() {
        assert_eq!(ClientMessage::decode("Hello_There"), Ok(ClientMessage::Discover));
        assert_eq!(ClientMessage::decode("Conectar"), Ok(ClientMessage::Connect));
        assert_eq!(ClientMessage::decode("PING"), Ok(ClientMessage::Ping));
        assert_eq!(ClientMessage::decode("DISCONNECT"), Ok(ClientMessage::Disconnect));
    }

    #[test]
    fn test_decode_trims_whitespace() {
        assert_eq!(ClientMessage::decode("  PING\r\n"), Ok(ClientMessage::Ping));
    }

    #[test]
    fn test_decode_ready() {
        assert_eq!(ClientMessage::decode("READY=1"), Ok(ClientMessage::Ready(true)));
        assert_eq!(ClientMessage::decode("READY=0"), Ok(ClientMessage::Ready(false)));
        assert!(matches!(
            ClientMessage::decode("READY=yes"),
            Err(ProtocolError::MalformedField { verb: "READY", .. })
        ));
    }

    #[test]
    fn test_decode_input_fields() {
        assert_eq!(
            ClientMessage::decode("INPUT;jump=1;seq=123"),
            Ok(ClientMessage::Input {
                jump: true,
                seq: Some(123)
            })
        );
        assert_eq!(
            ClientMessage::decode("INPUT;seq=7;jump=0;"),
            Ok(ClientMessage::Input {
                jump: false,
                seq: Some(7)
            })
        );
        // Missing jump is treated as no jump
        assert_eq!(
            ClientMessage::decode("INPUT;seq=9"),
            Ok(ClientMessage::Input {
                jump: false,
                seq: Some(9)
            })
        );
        assert!(ClientMessage::decode("INPUT;jump").is_err());
    }

    #[test]
    fn test_decode_input_tolerates_bad_seq() {
        for text in ["INPUT;jump=1;seq=abc", "INPUT;jump=1;seq=", "INPUT;jump=1;seq=-1"] {
            assert_eq!(
                ClientMessage::decode(text),
                Ok(ClientMessage::Input {
                    jump: true,
                    seq: None
                }),
                "{:?}",
                text
            );
        }
        // A bad jump flag still rejects the message
        assert!(ClientMessage::decode("INPUT;jump=2;seq=abc").is_err());
    }

    #[test]
    fn test_decode_unknown_and_empty() {
        assert_eq!(ClientMessage::decode("   "), Err(ProtocolError::Empty));
        assert_eq!(
            ClientMessage::decode("hello_there"),
            Err(ProtocolError::Unknown("hello_there".to_string()))
        );
        // Prefix matching only applies to the parameterised verbs
        assert!(ClientMessage::decode("PINGPING").is_err());
    }

    #[test]
    fn test_client_messages_roundtrip() {
        let messages = vec![
            ClientMessage::Discover,
            ClientMessage::Connect,
            ClientMessage::Ping,
            ClientMessage::Disconnect,
            ClientMessage::Ready(true),
            ClientMessage::Ready(false),
            ClientMessage::Input {
                jump: true,
                seq: Some(42),
            },
            ClientMessage::Input {
                jump: false,
                seq: None,
            },
        ];

        for message in messages {
            assert_eq!(ClientMessage::decode(&message.encode()), Ok(message));
        }
    }

    #[test]
    fn test_server_wire_text() {
        assert_eq!(ServerMessage::DiscoveryReply.encode(), "General_Kenobi");
        assert_eq!(ServerMessage::Connected.encode(), "Conectado");
        assert_eq!(
            ServerMessage::Registered(PlayerId::Two).encode(),
            "Registrado con ID 2"
        );
        assert_eq!(ServerMessage::NotRegistered.encode(), "No_registrado");
        assert_eq!(
            ServerMessage::Lobby {
                ready: [false, true]
            }
            .encode(),
            "LOBBY;READY_P1=0;READY_P2=1"
        );
        assert_eq!(
            ServerMessage::error(ErrorCode::Abort, "player_left_1").encode(),
            "SERVER_ERROR;code=ABORT;detail=player_left_1"
        );
        assert_eq!(
            ServerMessage::error(ErrorCode::InGame, "match_in_progress").encode(),
            "SERVER_ERROR;code=IN_GAME;detail=match_in_progress"
        );
    }

    #[test]
    fn test_server_messages_roundtrip() {
        let messages = vec![
            ServerMessage::DiscoveryReply,
            ServerMessage::Registered(PlayerId::One),
            ServerMessage::Lobby {
                ready: [true, false],
            },
            ServerMessage::MatchStarted,
            ServerMessage::MatchAborted,
            ServerMessage::error(ErrorCode::Full, "server_full"),
        ];

        for message in messages {
            assert_eq!(ServerMessage::decode(&message.encode()), Ok(message));
        }
    }

    #[test]
    fn test_snapshot_encoding_two_decimals() {
        let snapshot = Snapshot {
            tick: 10,
            players: [
                PlayerState {
                    y: 400.0,
                    vy: -12.345,
                    alive: true,
                    score: 3,
                },
                PlayerState {
                    y: 101.999,
                    vy: 0.0,
                    alive: false,
                    score: 0,
                },
            ],
            obstacles: vec![
                ObstacleState {
                    x: 520.0,
                    gap_center: 350.5,
                },
                ObstacleState {
                    x: 260.25,
                    gap_center: 410.0,
                },
            ],
        };

        assert_eq!(
            snapshot.encode(),
            "STATE;tick=10;P1=400.00,-12.35,1,3;P2=102.00,0.00,0,0;T=520.00,350.50|260.25,410.00;"
        );
    }

    #[test]
    fn test_snapshot_without_obstacles() {
        let snapshot = Snapshot::default();
        let text = snapshot.encode();
        assert_eq!(text, "STATE;tick=0;P1=0.00,0.00,0,0;P2=0.00,0.00,0,0;T=;");

        let decoded = Snapshot::decode(&text).unwrap();
        assert!(decoded.obstacles.is_empty());
    }

    #[test]
    fn test_snapshot_decode() {
        let decoded =
            Snapshot::decode("STATE;tick=5;P1=1.50,-2.25,1,4;P2=3.00,0.00,0,1;T=10.00,20.00;")
                .unwrap();
        assert_eq!(decoded.tick, 5);
        assert_approx_eq!(decoded.players[0].y, 1.5);
        assert_approx_eq!(decoded.players[0].vy, -2.25);
        assert!(decoded.players[0].alive);
        assert_eq!(decoded.players[0].score, 4);
        assert!(!decoded.players[1].alive);
        assert_eq!(decoded.obstacles.len(), 1);
        assert_approx_eq!(decoded.obstacles[0].gap_center, 20.0);
    }

    #[test]
    fn test_snapshot_decode_missing_field() {
        assert_eq!(
            Snapshot::decode("STATE;tick=5;P1=1,2,1,0;T=;"),
            Err(ProtocolError::MissingField {
                verb: "STATE",
                field: "P2"
            })
        );
    }
}
