use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{
    de::DeserializeOwned, ser::SerializeMap, Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::{Map, Value};

use crate::domain::{
    CommandId, CommandStatus, DeckPoint, LabwareId, LabwareLocation, ModuleId, ModuleModel, Mount,
    MovementAxis, PipetteId, ProtocolId, RunId, RunStatus,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadPipetteParams {
    pub pipette_id: PipetteId,
    pub pipette_name: String,
    pub mount: Mount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadLabwareParams {
    pub labware_id: LabwareId,
    pub load_name: String,
    pub location: LabwareLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadModuleParams {
    pub module_id: ModuleId,
    pub model: ModuleModel,
    pub slot_name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HomeParams {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WellParams {
    pub pipette_id: PipetteId,
    pub labware_id: LabwareId,
    pub well_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidParams {
    pub pipette_id: PipetteId,
    pub labware_id: LabwareId,
    pub well_name: String,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRelativeParams {
    pub pipette_id: PipetteId,
    pub axis: MovementAxis,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePositionParams {
    pub pipette_id: PipetteId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PauseParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleParams {
    pub module_id: ModuleId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTemperatureParams {
    pub module_id: ModuleId,
    pub celsius: f64,
}

/// Command type plus parameters, as created by a client or predicted by
/// protocol analysis. Serialized as adjacent `commandType` and `params`
/// fields.
///
/// Types this crate does not model, and modelled types whose params do not
/// match, are kept as [`CommandKind::Other`] with their raw params.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    LoadPipette(LoadPipetteParams),
    LoadLabware(LoadLabwareParams),
    LoadModule(LoadModuleParams),
    Home(HomeParams),
    PickUpTip(WellParams),
    DropTip(WellParams),
    Aspirate(LiquidParams),
    Dispense(LiquidParams),
    BlowOut(WellParams),
    MoveToWell(WellParams),
    MoveRelative(MoveRelativeParams),
    SavePosition(SavePositionParams),
    Pause(PauseParams),
    ThermocyclerOpenLid(ModuleParams),
    SetTargetTemperature(SetTemperatureParams),
    DeactivateTemperature(ModuleParams),
    Other { command_type: String, params: Value },
}

impl CommandKind {
    pub fn command_type(&self) -> &str {
        match self {
            Self::LoadPipette(_) => "loadPipette",
            Self::LoadLabware(_) => "loadLabware",
            Self::LoadModule(_) => "loadModule",
            Self::Home(_) => "home",
            Self::PickUpTip(_) => "pickUpTip",
            Self::DropTip(_) => "dropTip",
            Self::Aspirate(_) => "aspirate",
            Self::Dispense(_) => "dispense",
            Self::BlowOut(_) => "blowOut",
            Self::MoveToWell(_) => "moveToWell",
            Self::MoveRelative(_) => "moveRelative",
            Self::SavePosition(_) => "savePosition",
            Self::Pause(_) => "pause",
            Self::ThermocyclerOpenLid(_) => "thermocycler/openLid",
            Self::SetTargetTemperature(_) => "temperatureModule/setTargetTemperature",
            Self::DeactivateTemperature(_) => "temperatureModule/deactivate",
            Self::Other { command_type, .. } => command_type.as_str(),
        }
    }

    /// Builds a kind from its wire parts. Missing params count as `{}`.
    pub fn from_parts(command_type: String, params: Value) -> Self {
        fn parse<T: DeserializeOwned>(params: &Value) -> Option<T> {
            T::deserialize(params).ok()
        }

        let params = if params.is_null() {
            Value::Object(Map::new())
        } else {
            params
        };
        let known = match command_type.as_str() {
            "loadPipette" => parse(&params).map(Self::LoadPipette),
            "loadLabware" => parse(&params).map(Self::LoadLabware),
            "loadModule" => parse(&params).map(Self::LoadModule),
            "home" => parse(&params).map(Self::Home),
            "pickUpTip" => parse(&params).map(Self::PickUpTip),
            "dropTip" => parse(&params).map(Self::DropTip),
            "aspirate" => parse(&params).map(Self::Aspirate),
            "dispense" => parse(&params).map(Self::Dispense),
            "blowOut" => parse(&params).map(Self::BlowOut),
            "moveToWell" => parse(&params).map(Self::MoveToWell),
            "moveRelative" => parse(&params).map(Self::MoveRelative),
            "savePosition" => parse(&params).map(Self::SavePosition),
            "pause" => parse(&params).map(Self::Pause),
            "thermocycler/openLid" => parse(&params).map(Self::ThermocyclerOpenLid),
            "temperatureModule/setTargetTemperature" => {
                parse(&params).map(Self::SetTargetTemperature)
            }
            "temperatureModule/deactivate" => parse(&params).map(Self::DeactivateTemperature),
            _ => None,
        };
        match known {
            Some(kind) => kind,
            None => Self::Other {
                command_type,
                params,
            },
        }
    }

    /// Load commands make up the setup portion of a protocol.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            Self::LoadLabware(_) | Self::LoadPipette(_) | Self::LoadModule(_)
        )
    }

    /// Pipette and labware a pipetting command operates on.
    pub fn pipetting_target(&self) -> Option<(&PipetteId, &LabwareId)> {
        match self {
            Self::PickUpTip(p) | Self::DropTip(p) | Self::BlowOut(p) | Self::MoveToWell(p) => {
                Some((&p.pipette_id, &p.labware_id))
            }
            Self::Aspirate(p) | Self::Dispense(p) => Some((&p.pipette_id, &p.labware_id)),
            _ => None,
        }
    }
}

impl Serialize for CommandKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        fn tagged<S: Serializer, P: Serialize>(
            serializer: S,
            command_type: &str,
            params: &P,
        ) -> Result<S::Ok, S::Error> {
            let mut map = serializer.serialize_map(Some(2))?;
            map.serialize_entry("commandType", command_type)?;
            map.serialize_entry("params", params)?;
            map.end()
        }

        let command_type = self.command_type();
        match self {
            Self::LoadPipette(p) => tagged(serializer, command_type, p),
            Self::LoadLabware(p) => tagged(serializer, command_type, p),
            Self::LoadModule(p) => tagged(serializer, command_type, p),
            Self::Home(p) => tagged(serializer, command_type, p),
            Self::PickUpTip(p) | Self::DropTip(p) | Self::BlowOut(p) | Self::MoveToWell(p) => {
                tagged(serializer, command_type, p)
            }
            Self::Aspirate(p) | Self::Dispense(p) => tagged(serializer, command_type, p),
            Self::MoveRelative(p) => tagged(serializer, command_type, p),
            Self::SavePosition(p) => tagged(serializer, command_type, p),
            Self::Pause(p) => tagged(serializer, command_type, p),
            Self::ThermocyclerOpenLid(p) | Self::DeactivateTemperature(p) => {
                tagged(serializer, command_type, p)
            }
            Self::SetTargetTemperature(p) => tagged(serializer, command_type, p),
            Self::Other { params, .. } => tagged(serializer, command_type, params),
        }
    }
}

impl<'de> Deserialize<'de> for CommandKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Tagged {
            command_type: String,
            #[serde(default)]
            params: Value,
        }

        let Tagged {
            command_type,
            params,
        } = Tagged::deserialize(deserializer)?;
        Ok(Self::from_parts(command_type, params))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<DeckPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: CommandId,
    #[serde(flatten)]
    pub kind: CommandKind,
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CommandResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Command {
    pub fn new(id: impl Into<CommandId>, kind: CommandKind, status: CommandStatus) -> Self {
        Self {
            id: id.into(),
            kind,
            status,
            result: None,
            error: None,
            created_at: None,
        }
    }

    /// The same command as predicted ahead of time: always queued, no outcome.
    pub fn anticipated(&self) -> Self {
        Self {
            status: CommandStatus::Queued,
            result: None,
            error: None,
            ..self.clone()
        }
    }

    pub fn command_type(&self) -> &str {
        self.kind.command_type()
    }

    pub fn saved_position(&self) -> Option<DeckPoint> {
        self.result.as_ref().and_then(|result| result.position)
    }

    /// What a run reports for this command in its command list.
    pub fn summary(&self) -> RunCommandSummary {
        RunCommandSummary {
            id: self.id.clone(),
            command_type: self.command_type().to_string(),
            status: self.status,
            created_at: self.created_at,
        }
    }
}

/// Entry of a run's command list. The robot reports identity and status only;
/// full commands are fetched one at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCommandSummary {
    pub id: CommandId,
    pub command_type: String,
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabwareInfo {
    pub load_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_tiprack: bool,
    pub location: LabwareLocation,
}

impl LabwareInfo {
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.load_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipetteInfo {
    pub pipette_name: String,
    pub mount: Mount,
    pub channels: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub model: ModuleModel,
    pub slot_name: String,
}

/// Result of statically analyzing a protocol: the commands it is expected to
/// issue and the equipment it loads, keyed by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolAnalysis {
    pub commands: Vec<Command>,
    #[serde(default)]
    pub labware: HashMap<LabwareId, LabwareInfo>,
    #[serde(default)]
    pub pipettes: HashMap<PipetteId, PipetteInfo>,
    #[serde(default)]
    pub modules: HashMap<ModuleId, ModuleInfo>,
}

impl ProtocolAnalysis {
    pub fn anticipated_commands(&self) -> Vec<Command> {
        self.commands.iter().map(Command::anticipated).collect()
    }

    /// Deck slot a labware occupies, resolving module locations through the
    /// module map.
    pub fn slot_of<'a>(&'a self, location: &'a LabwareLocation) -> Option<&'a str> {
        match location {
            LabwareLocation::Slot { slot_name } => Some(slot_name),
            LabwareLocation::Module { module_id } => self
                .modules
                .get(module_id)
                .map(|module| module.slot_name.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: String,
    pub status: AnalysisStatus,
    #[serde(flatten)]
    pub analysis: ProtocolAnalysis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolRecord {
    pub id: ProtocolId,
    #[serde(default)]
    pub analyses: Vec<AnalysisRecord>,
}

impl ProtocolRecord {
    pub fn latest_completed_analysis(&self) -> Option<&ProtocolAnalysis> {
        self.analyses
            .iter()
            .rev()
            .find(|record| record.status == AnalysisStatus::Completed)
            .map(|record| &record.analysis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: RunId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_id: Option<ProtocolId>,
    pub status: RunStatus,
    #[serde(default)]
    pub current: bool,
    #[serde(default)]
    pub commands: Vec<RunCommandSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunRequest {
    pub protocol_id: ProtocolId,
}

/// `{"data": ...}` wrapper used by every robot-server request and response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}
