// Text commands accepted by the dispatcher

use std::fmt;
use std::str::FromStr;

use crate::sequencer::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    StopDrive,
    Stop,
    LiftFront,
    LowerFront,
    StopFront,
    LiftBack,
    LowerBack,
    StopBack,
    LiftBoth,
    LowerBoth,
    Climb,
    Descend,
    FindWall,
    Zero,
    Sensors,
}

impl Command {
    /// The autonomous operation this command starts, if any
    pub fn operation(self) -> Option<Operation> {
        match self {
            Command::Climb => Some(Operation::Climb),
            Command::Descend => Some(Operation::Descend),
            Command::FindWall => Some(Operation::FindWall),
            Command::Zero => Some(Operation::Zero),
            _ => None,
        }
    }

    /// Direct mechanism motion, refused while an operation runs
    pub fn is_manual(self) -> bool {
        !matches!(self, Command::Stop | Command::Sensors) && self.operation().is_none()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Forward => "forward",
            Command::Backward => "backward",
            Command::TurnLeft => "turn left",
            Command::TurnRight => "turn right",
            Command::StopDrive => "stop drive",
            Command::Stop => "stop",
            Command::LiftFront => "lift front",
            Command::LowerFront => "lower front",
            Command::StopFront => "stop front",
            Command::LiftBack => "lift back",
            Command::LowerBack => "lower back",
            Command::StopBack => "stop back",
            Command::LiftBoth => "lift both",
            Command::LowerBoth => "lower both",
            Command::Climb => "climb",
            Command::Descend => "downstairs",
            Command::FindWall => "find wall",
            Command::Zero => "zero",
            Command::Sensors => "sensors",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown command: {0}")]
pub struct ParseCommandError(pub String);

impl FromStr for Command {
    type Err = ParseCommandError;

    /// Case, whitespace, underscore and dash insensitive. The app's toggle
    /// buttons send `stop <action>`, which stops that action's mechanism.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        let command = match key.as_str() {
            "forward" => Command::Forward,
            "backward" => Command::Backward,
            "turnleft" | "left" => Command::TurnLeft,
            "turnright" | "right" => Command::TurnRight,
            "stop" | "stopall" | "stopliftboth" | "stoplowerboth" => Command::Stop,
            "stopdrive" | "stopforward" | "stopbackward" | "stopturnleft" | "stopturnright" => {
                Command::StopDrive
            }
            "liftfront" => Command::LiftFront,
            "lowerfront" => Command::LowerFront,
            "stopfront" | "stopliftfront" | "stoplowerfront" => Command::StopFront,
            "liftback" => Command::LiftBack,
            "lowerback" => Command::LowerBack,
            "stopback" | "stopliftback" | "stoplowerback" => Command::StopBack,
            "liftboth" => Command::LiftBoth,
            "lowerboth" => Command::LowerBoth,
            "climb" => Command::Climb,
            "downstairs" | "descend" => Command::Descend,
            "findwall" => Command::FindWall,
            "zero" => Command::Zero,
            "sensors" | "sensor" => Command::Sensors,
            _ => return Err(ParseCommandError(s.trim().to_string())),
        };
        Ok(command)
    }
}
