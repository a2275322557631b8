//! Command vocabulary shared by the voice path and manual control.
//!
//! The actuator understands a fixed set of Korean words; operators and UIs
//! deal in logical direction tokens. The mapping lives here so every path
//! that produces commands agrees on the wire words.

use crate::error::VoxrelayError;
use std::fmt;
use std::str::FromStr;

/// Logical direction tokens consumed by drive-control surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    Reset,
    Start,
    Stop,
}

/// Static mapping from logical tokens to the words sent on the wire.
///
/// `Start` intentionally shares a wire word with `Up`: starting the vehicle
/// is expressed as driving forward.
pub const COMMAND_TABLE: &[(Direction, &str)] = &[
    (Direction::Up, "앞으로"),
    (Direction::Down, "뒤로"),
    (Direction::Left, "왼쪽"),
    (Direction::Right, "오른쪽"),
    (Direction::Reset, "중앙"),
    (Direction::Start, "앞으로"),
    (Direction::Stop, "정지"),
];

impl Direction {
    /// All logical tokens, in table order.
    pub const ALL: [Direction; 7] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
        Direction::Reset,
        Direction::Start,
        Direction::Stop,
    ];

    /// The localized word transmitted to the actuator for this token.
    pub fn wire_word(self) -> &'static str {
        match self {
            Direction::Up | Direction::Start => "앞으로",
            Direction::Down => "뒤로",
            Direction::Left => "왼쪽",
            Direction::Right => "오른쪽",
            Direction::Reset => "중앙",
            Direction::Stop => "정지",
        }
    }

    /// The logical token name shown to operators.
    pub fn label(self) -> &'static str {
        match self {
            Direction::Up => "Up",
            Direction::Down => "Down",
            Direction::Left => "Left",
            Direction::Right => "Right",
            Direction::Reset => "Reset",
            Direction::Start => "Start",
            Direction::Stop => "Stop",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Direction {
    type Err = VoxrelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            "reset" => Ok(Direction::Reset),
            "start" => Ok(Direction::Start),
            "stop" => Ok(Direction::Stop),
            _ => Err(VoxrelayError::UnknownDirection {
                word: s.to_string(),
            }),
        }
    }
}
