use std::{fmt, ops::Sub};

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(CommandId);
id_newtype!(RunId);
id_newtype!(ProtocolId);
id_newtype!(LabwareId);
id_newtype!(PipetteId);
id_newtype!(ModuleId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Idle,
    Running,
    PauseRequested,
    Paused,
    StopRequested,
    Stopped,
    Failed,
    Succeeded,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed | Self::Succeeded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mount {
    Left,
    Right,
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementAxis {
    X,
    Y,
    Z,
}

impl std::str::FromStr for MovementAxis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x" => Ok(Self::X),
            "y" => Ok(Self::Y),
            "z" => Ok(Self::Z),
            other => Err(format!("unknown movement axis '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModuleModel {
    TemperatureModuleV1,
    TemperatureModuleV2,
    MagneticModuleV1,
    MagneticModuleV2,
    ThermocyclerModuleV1,
}

impl ModuleModel {
    pub fn is_thermocycler(self) -> bool {
        matches!(self, Self::ThermocyclerModuleV1)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::TemperatureModuleV1 | Self::TemperatureModuleV2 => "Temperature Module",
            Self::MagneticModuleV1 | Self::MagneticModuleV2 => "Magnetic Module",
            Self::ThermocyclerModuleV1 => "Thermocycler Module",
        }
    }
}

/// Where a piece of labware sits: directly in a deck slot or on a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabwareLocation {
    Slot {
        #[serde(rename = "slotName")]
        slot_name: String,
    },
    Module {
        #[serde(rename = "moduleId")]
        module_id: ModuleId,
    },
}

/// Absolute deck coordinate in millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DeckPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl DeckPoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn moved(self, axis: MovementAxis, distance: f64) -> Self {
        match axis {
            MovementAxis::X => Self { x: self.x + distance, ..self },
            MovementAxis::Y => Self { y: self.y + distance, ..self },
            MovementAxis::Z => Self { z: self.z + distance, ..self },
        }
    }
}

/// Delta between two deck points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OffsetVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Sub for DeckPoint {
    type Output = OffsetVector;

    fn sub(self, rhs: Self) -> OffsetVector {
        OffsetVector {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

impl fmt::Display for OffsetVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x {:.2} y {:.2} z {:.2}", self.x, self.y, self.z)
    }
}
