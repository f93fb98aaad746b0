//! In-memory robot used for dry runs and tests. Every accepted motion
//! completes immediately and the pipette position is tracked on a coarse deck
//! grid so saved positions are meaningful.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{CommandId, CommandStatus, DeckPoint, PipetteId, ProtocolId, RunId, RunStatus},
    protocol::{Command, CommandKind, CommandResult, ProtocolAnalysis, RunRecord},
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{CommandDispatch, DispatchError, ProtocolResource, RunControl, RunResource};

const SLOT_PITCH_X: f64 = 132.5;
const SLOT_PITCH_Y: f64 = 90.5;

/// Origin of a numbered deck slot on a three-column grid. Unknown slot names
/// resolve to the deck origin.
pub fn slot_origin(slot_name: &str) -> DeckPoint {
    match slot_name.parse::<u32>() {
        Ok(slot) if slot >= 1 => {
            let index = f64::from(slot - 1);
            DeckPoint::new(
                (index % 3.0) * SLOT_PITCH_X,
                (index / 3.0).floor() * SLOT_PITCH_Y,
                0.0,
            )
        }
        _ => DeckPoint::default(),
    }
}

#[derive(Default)]
struct SimState {
    protocols: HashMap<ProtocolId, ProtocolAnalysis>,
    runs: HashMap<RunId, RunRecord>,
    commands: HashMap<RunId, Vec<Command>>,
    positions: HashMap<PipetteId, DeckPoint>,
    reject_command_type: Option<String>,
    next_command: u64,
    next_run: u64,
    next_position: u64,
    restarts: usize,
}

impl SimState {
    fn allocate_command_id(&mut self) -> CommandId {
        self.next_command += 1;
        CommandId::new(format!("cmd-{}", self.next_command))
    }

    fn create_run(&mut self, protocol_id: &ProtocolId) -> RunId {
        self.next_run += 1;
        let run_id = RunId::new(format!("run-{}", self.next_run));
        for run in self.runs.values_mut() {
            run.current = false;
        }
        self.runs.insert(
            run_id.clone(),
            RunRecord {
                id: run_id.clone(),
                protocol_id: Some(protocol_id.clone()),
                status: RunStatus::Idle,
                current: true,
                commands: Vec::new(),
                created_at: Some(Utc::now()),
            },
        );
        self.commands.insert(run_id.clone(), Vec::new());
        run_id
    }

    fn execute(&mut self, protocol_id: Option<&ProtocolId>, kind: &CommandKind) -> CommandResult {
        match kind {
            CommandKind::MoveToWell(params) => {
                let slot = protocol_id
                    .and_then(|id| self.protocols.get(id))
                    .and_then(|analysis| {
                        let labware = analysis.labware.get(&params.labware_id)?;
                        analysis.slot_of(&labware.location)
                    })
                    .map(slot_origin)
                    .unwrap_or_default();
                self.positions.insert(params.pipette_id.clone(), slot);
                CommandResult::default()
            }
            CommandKind::MoveRelative(params) => {
                let position = self.positions.entry(params.pipette_id.clone()).or_default();
                *position = position.moved(params.axis, params.distance);
                CommandResult::default()
            }
            CommandKind::SavePosition(params) => {
                let position_id = params.position_id.clone().unwrap_or_else(|| {
                    self.next_position += 1;
                    format!("position-{}", self.next_position)
                });
                let position = self
                    .positions
                    .get(&params.pipette_id)
                    .copied()
                    .unwrap_or_default();
                CommandResult {
                    position_id: Some(position_id),
                    position: Some(position),
                }
            }
            _ => CommandResult::default(),
        }
    }
}

#[derive(Default)]
pub struct SimulatedRobot {
    state: Mutex<SimState>,
}

impl SimulatedRobot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_protocol(&self, protocol_id: impl Into<ProtocolId>, analysis: ProtocolAnalysis) {
        let mut state = self.state.lock().await;
        state.protocols.insert(protocol_id.into(), analysis);
    }

    pub async fn create_run(&self, protocol_id: &ProtocolId) -> Result<RunId> {
        let mut state = self.state.lock().await;
        if !state.protocols.contains_key(protocol_id) {
            return Err(anyhow!("protocol {protocol_id} not found"));
        }
        Ok(state.create_run(protocol_id))
    }

    /// Makes every later command of this type fail with a rejection.
    pub async fn reject_command_type(&self, command_type: impl Into<String>) {
        self.state.lock().await.reject_command_type = Some(command_type.into());
    }

    pub async fn set_run_status(&self, run_id: &RunId, status: RunStatus) -> Result<()> {
        let mut state = self.state.lock().await;
        let run = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| anyhow!("run {run_id} not found"))?;
        run.status = status;
        Ok(())
    }

    pub async fn restart_count(&self) -> usize {
        self.state.lock().await.restarts
    }

    pub async fn pipette_position(&self, pipette_id: &PipetteId) -> Option<DeckPoint> {
        self.state.lock().await.positions.get(pipette_id).copied()
    }

    /// Full commands of a run, in dispatch order.
    pub async fn commands(&self, run_id: &RunId) -> Vec<Command> {
        let state = self.state.lock().await;
        state.commands.get(run_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CommandDispatch for SimulatedRobot {
    async fn dispatch(
        &self,
        run_id: &RunId,
        command: CommandKind,
    ) -> Result<Command, DispatchError> {
        let command_type = command.command_type().to_string();
        let rejected = |reason: String| DispatchError::Rejected {
            command_type: command_type.clone(),
            reason,
        };

        let mut state = self.state.lock().await;
        let (protocol_id, status) = match state.runs.get(run_id) {
            Some(run) => (run.protocol_id.clone(), run.status),
            None => return Err(rejected(format!("run {run_id} not found"))),
        };
        if status.is_terminal() {
            return Err(rejected(format!("run {run_id} is no longer active")));
        }
        if state.reject_command_type.as_deref() == Some(command_type.as_str()) {
            return Err(rejected(format!("{command_type} is not allowed right now")));
        }

        let result = state.execute(protocol_id.as_ref(), &command);
        let mut accepted = Command::new(
            state.allocate_command_id(),
            command,
            CommandStatus::Succeeded,
        );
        accepted.result = Some(result);
        accepted.created_at = Some(Utc::now());
        debug!(%run_id, %command_type, command_id = %accepted.id, "simulated command");

        if let Some(run) = state.runs.get_mut(run_id) {
            run.commands.push(accepted.summary());
        }
        state
            .commands
            .entry(run_id.clone())
            .or_default()
            .push(accepted.clone());
        Ok(accepted)
    }
}

#[async_trait]
impl RunResource for SimulatedRobot {
    async fn run(&self, run_id: &RunId) -> Result<RunRecord> {
        let state = self.state.lock().await;
        state
            .runs
            .get(run_id)
            .cloned()
            .ok_or_else(|| anyhow!("run {run_id} not found"))
    }

    async fn command(&self, run_id: &RunId, command_id: &CommandId) -> Result<Command> {
        let state = self.state.lock().await;
        state
            .commands
            .get(run_id)
            .and_then(|commands| commands.iter().find(|c| &c.id == command_id))
            .cloned()
            .ok_or_else(|| anyhow!("command {command_id} not found in run {run_id}"))
    }
}

#[async_trait]
impl ProtocolResource for SimulatedRobot {
    async fn protocol_analysis(&self, protocol_id: &ProtocolId) -> Result<ProtocolAnalysis> {
        let state = self.state.lock().await;
        state
            .protocols
            .get(protocol_id)
            .cloned()
            .ok_or_else(|| anyhow!("protocol {protocol_id} not found"))
    }
}

#[async_trait]
impl RunControl for SimulatedRobot {
    async fn restart_run(&self, run_id: &RunId) -> Result<RunId> {
        let mut state = self.state.lock().await;
        let protocol_id = state
            .runs
            .get(run_id)
            .and_then(|run| run.protocol_id.clone())
            .ok_or_else(|| anyhow!("run {run_id} has no protocol to restart"))?;
        state.restarts += 1;
        Ok(state.create_run(&protocol_id))
    }
}
