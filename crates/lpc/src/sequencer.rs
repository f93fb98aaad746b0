use std::sync::Arc;

use client_core::{CommandDispatch, DispatchError, ProtocolResource};
use serde::Serialize;
use shared::{
    domain::{LabwareId, MovementAxis, ProtocolId, RunId},
    protocol::{
        Command, CommandKind, ModuleParams, MoveRelativeParams, SavePositionParams, WellParams,
    },
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    error::LpcError,
    session::{Cursor, LpcSession, SavePositionCommandData},
    steps::{intro_info, IntroInfo, LpcSection, LpcStep, StepKind, CHECK_WELL},
};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LpcFailure {
    pub command_type: String,
    pub reason: String,
    pub cursor: Cursor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LpcState {
    NotStarted,
    InProgress { cursor: Cursor },
    ExitConfirmationPending { resume: Cursor },
    Errored { failure: LpcFailure },
    Complete,
    Exited,
}

impl LpcState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NotStarted => "not started",
            Self::InProgress { .. } => "in progress",
            Self::ExitConfirmationPending { .. } => "awaiting exit confirmation",
            Self::Errored { .. } => "errored",
            Self::Complete => "complete",
            Self::Exited => "exited",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LpcEvent {
    /// A coarse transition is about to dispatch robot commands.
    Busy { title: String },
    StepChanged {
        cursor: Cursor,
        current_step_index: usize,
    },
    Completed,
    Errored { failure: LpcFailure },
    ExitRequested,
    Exited,
}

pub struct LpcSequencer {
    run_id: RunId,
    protocol_id: ProtocolId,
    dispatcher: Arc<dyn CommandDispatch>,
    protocols: Arc<dyn ProtocolResource>,
    state: LpcState,
    intro: Option<IntroInfo>,
    session: Option<LpcSession>,
    events: broadcast::Sender<LpcEvent>,
}

impl LpcSequencer {
    pub fn new(
        run_id: RunId,
        protocol_id: ProtocolId,
        dispatcher: Arc<dyn CommandDispatch>,
        protocols: Arc<dyn ProtocolResource>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            run_id,
            protocol_id,
            dispatcher,
            protocols,
            state: LpcState::NotStarted,
            intro: None,
            session: None,
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<LpcEvent> {
        self.events.subscribe()
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn current_state(&self) -> &LpcState {
        &self.state
    }

    pub fn intro_info(&self) -> Option<&IntroInfo> {
        self.intro.as_ref()
    }

    pub fn failure(&self) -> Option<&LpcFailure> {
        match &self.state {
            LpcState::Errored { failure } => Some(failure),
            _ => None,
        }
    }

    pub fn sections(&self) -> &[LpcSection] {
        self.session
            .as_ref()
            .map(LpcSession::sections)
            .unwrap_or(&[])
    }

    pub fn save_positions(&self) -> Option<SavePositionCommandData> {
        self.session
            .as_ref()
            .map(|session| session.save_positions().clone())
    }

    pub fn current_step_index(&self) -> Option<usize> {
        self.session.as_ref().map(LpcSession::current_step_index)
    }

    /// Step shown to the operator, including while an exit is being confirmed.
    pub fn current_step(&self) -> Option<LpcStep> {
        let cursor = match &self.state {
            LpcState::InProgress { cursor } => *cursor,
            LpcState::ExitConfirmationPending { resume } => *resume,
            _ => return None,
        };
        let section = self.session.as_ref()?.sections().get(cursor.section_index)?;
        Some(LpcStep {
            section_index: cursor.section_index,
            kind: cursor.step_kind()?,
            section: section.clone(),
        })
    }

    pub fn title_text(&self) -> String {
        match &self.state {
            LpcState::NotStarted => "Labware Position Check".to_string(),
            LpcState::InProgress { .. } => match self.current_step() {
                Some(step) => match step.kind {
                    StepKind::MoveToLabware => format!(
                        "Prepare to check {} in {}",
                        step.section.labware_name,
                        step.section.location_text()
                    ),
                    StepKind::ConfirmPosition => format!(
                        "Check {} in {}",
                        step.section.labware_name,
                        step.section.location_text()
                    ),
                },
                None => "Labware Position Check".to_string(),
            },
            LpcState::ExitConfirmationPending { .. } => "Exit Labware Position Check?".to_string(),
            LpcState::Errored { .. } => "Labware Position Check failed".to_string(),
            LpcState::Complete => "Labware Position Check complete".to_string(),
            LpcState::Exited => "Labware Position Check closed".to_string(),
        }
    }

    pub fn cta_text(&self) -> String {
        match &self.state {
            LpcState::NotStarted => "Begin labware position check".to_string(),
            LpcState::InProgress { .. } => {
                let Some(step) = self.current_step() else {
                    return String::new();
                };
                match step.kind {
                    StepKind::MoveToLabware => {
                        format!("Move to {}", step.section.location_text())
                    }
                    StepKind::ConfirmPosition => self.confirm_cta(&step.section),
                }
            }
            LpcState::ExitConfirmationPending { .. } => "Exit and discard offsets".to_string(),
            LpcState::Errored { .. } => "Exit".to_string(),
            LpcState::Complete => "Close".to_string(),
            LpcState::Exited => String::new(),
        }
    }

    fn confirm_cta(&self, section: &LpcSection) -> String {
        if section.picks_up_tip {
            return "Confirm position, pick up tip".to_string();
        }
        let Some(session) = self.session.as_ref() else {
            return String::new();
        };
        match session.next_section() {
            Some(next) => format!("Confirm position, move to {}", next.location_text()),
            None if session.tip_source().is_some() => "Confirm position, return tip".to_string(),
            None => "Confirm position".to_string(),
        }
    }

    pub async fn begin_lpc(&mut self) -> Result<(), LpcError> {
        match &self.state {
            LpcState::NotStarted => {}
            LpcState::Exited => return Err(LpcError::SessionClosed),
            other => {
                return Err(LpcError::InvalidState {
                    action: "begin",
                    state: other.name(),
                })
            }
        }

        let analysis = self
            .protocols
            .protocol_analysis(&self.protocol_id)
            .await
            .map_err(|err| LpcError::NotReady(format!("{err:#}")))?;
        let intro = intro_info(&analysis).ok_or_else(|| {
            LpcError::NotReady(format!(
                "protocol {} has no labware to check",
                self.protocol_id
            ))
        })?;

        info!(
            run_id = %self.run_id,
            sections = intro.sections.len(),
            primary_mount = %intro.primary_pipette_mount,
            "starting labware position check"
        );
        self.session = Some(LpcSession::new(self.run_id.clone(), &intro));
        self.intro = Some(intro);
        self.enter_step(Cursor::default());
        Ok(())
    }

    pub async fn proceed(&mut self) -> Result<(), LpcError> {
        let cursor = self.in_progress_cursor("proceed")?;
        let (section, is_last) = match self.session.as_ref() {
            Some(session) => match session.current_section() {
                Some(section) => (section.clone(), session.is_last_section()),
                None => return Err(LpcError::SessionClosed),
            },
            None => return Err(LpcError::SessionClosed),
        };
        let Some(step) = cursor.step_kind() else {
            return Err(LpcError::SessionClosed);
        };

        let outcome = match step {
            StepKind::MoveToLabware => self.move_to_labware(&section).await,
            StepKind::ConfirmPosition => self.confirm_position(&section, is_last).await,
        };
        if let Err(err) = outcome {
            return Err(self.fail(err, cursor));
        }

        let Some(session) = self.session.as_mut() else {
            return Err(LpcError::SessionClosed);
        };
        match session.advance() {
            Some(next) => self.enter_step(next),
            None => {
                debug_assert!(session.all_sections_saved());
                info!(run_id = %self.run_id, "labware position check complete");
                self.state = LpcState::Complete;
                let _ = self.events.send(LpcEvent::Completed);
            }
        }
        Ok(())
    }

    pub async fn jog(&mut self, axis: MovementAxis, distance: f64) -> Result<(), LpcError> {
        let cursor = self.in_progress_cursor("jog")?;
        let pipette_id = self
            .session
            .as_ref()
            .and_then(LpcSession::current_section)
            .map(|section| section.pipette_id.clone())
            .ok_or(LpcError::SessionClosed)?;

        debug!(run_id = %self.run_id, ?axis, distance, "jogging pipette");
        let command = CommandKind::MoveRelative(MoveRelativeParams {
            pipette_id,
            axis,
            distance,
        });
        if let Err(err) = self.send(command).await {
            return Err(self.fail(err, cursor));
        }
        Ok(())
    }

    pub fn request_exit(&mut self) -> Result<(), LpcError> {
        match &self.state {
            LpcState::InProgress { cursor } => {
                self.state = LpcState::ExitConfirmationPending { resume: *cursor };
                let _ = self.events.send(LpcEvent::ExitRequested);
                Ok(())
            }
            LpcState::NotStarted | LpcState::Complete => {
                self.teardown();
                Ok(())
            }
            LpcState::Exited => Err(LpcError::SessionClosed),
            other => Err(LpcError::InvalidState {
                action: "exit",
                state: other.name(),
            }),
        }
    }

    pub fn confirm_exit(&mut self) -> Result<(), LpcError> {
        match &self.state {
            LpcState::ExitConfirmationPending { .. } => {
                self.teardown();
                Ok(())
            }
            LpcState::Exited => Err(LpcError::SessionClosed),
            other => Err(LpcError::InvalidState {
                action: "confirm exit",
                state: other.name(),
            }),
        }
    }

    pub fn cancel_exit(&mut self) -> Result<(), LpcError> {
        match &self.state {
            LpcState::ExitConfirmationPending { resume } => {
                let resume = *resume;
                self.enter_step(resume);
                Ok(())
            }
            LpcState::Exited => Err(LpcError::SessionClosed),
            other => Err(LpcError::InvalidState {
                action: "cancel exit",
                state: other.name(),
            }),
        }
    }

    /// Closes an errored session. The hosting run must be restarted afterwards.
    pub fn acknowledge_error(&mut self) -> Result<LpcFailure, LpcError> {
        match &self.state {
            LpcState::Errored { failure } => {
                let failure = failure.clone();
                self.teardown();
                Ok(failure)
            }
            LpcState::Exited => Err(LpcError::SessionClosed),
            other => Err(LpcError::InvalidState {
                action: "acknowledge error",
                state: other.name(),
            }),
        }
    }

    async fn move_to_labware(&mut self, section: &LpcSection) -> Result<(), DispatchError> {
        self.busy(format!("Moving to {}", section.location_text()));
        if let Some(module) = section.module.as_ref().filter(|_| section.sits_on_thermocycler()) {
            self.send(CommandKind::ThermocyclerOpenLid(ModuleParams {
                module_id: module.module_id.clone(),
            }))
            .await?;
        }
        self.send(CommandKind::MoveToWell(WellParams {
            pipette_id: section.pipette_id.clone(),
            labware_id: section.labware_id.clone(),
            well_name: CHECK_WELL.to_string(),
        }))
        .await?;
        self.save_position(section).await
    }

    async fn confirm_position(
        &mut self,
        section: &LpcSection,
        is_last: bool,
    ) -> Result<(), DispatchError> {
        self.busy(format!("Saving position of {}", section.labware_name));
        self.save_position(section).await?;

        if section.picks_up_tip {
            self.send(CommandKind::PickUpTip(WellParams {
                pipette_id: section.pipette_id.clone(),
                labware_id: section.labware_id.clone(),
                well_name: CHECK_WELL.to_string(),
            }))
            .await?;
            if let Some(session) = self.session.as_mut() {
                session.set_tip_source(Some(section.labware_id.clone()));
            }
        }

        if is_last {
            let tip_source = self
                .session
                .as_ref()
                .and_then(|session| session.tip_source().cloned());
            if let Some(tiprack) = tip_source {
                self.return_tip(section, tiprack).await?;
            }
        }
        Ok(())
    }

    async fn return_tip(
        &mut self,
        section: &LpcSection,
        tiprack: LabwareId,
    ) -> Result<(), DispatchError> {
        self.busy("Returning tip".to_string());
        let well = WellParams {
            pipette_id: section.pipette_id.clone(),
            labware_id: tiprack,
            well_name: CHECK_WELL.to_string(),
        };
        self.send(CommandKind::MoveToWell(well.clone())).await?;
        self.send(CommandKind::DropTip(well)).await?;
        if let Some(session) = self.session.as_mut() {
            session.set_tip_source(None);
        }
        Ok(())
    }

    async fn save_position(&mut self, section: &LpcSection) -> Result<(), DispatchError> {
        let saved = self
            .send(CommandKind::SavePosition(SavePositionParams {
                pipette_id: section.pipette_id.clone(),
                position_id: None,
            }))
            .await?;
        debug!(
            labware_id = %section.labware_id,
            command_id = %saved.id,
            "recorded saved position"
        );
        if let Some(session) = self.session.as_mut() {
            session.record_save_position(&section.labware_id, saved.id);
        }
        Ok(())
    }

    async fn send(&self, command: CommandKind) -> Result<Command, DispatchError> {
        self.dispatcher.dispatch(&self.run_id, command).await
    }

    fn in_progress_cursor(&self, action: &'static str) -> Result<Cursor, LpcError> {
        match &self.state {
            LpcState::InProgress { cursor } => Ok(*cursor),
            LpcState::Exited => Err(LpcError::SessionClosed),
            other => Err(LpcError::InvalidState {
                action,
                state: other.name(),
            }),
        }
    }

    fn enter_step(&mut self, cursor: Cursor) {
        self.state = LpcState::InProgress { cursor };
        let _ = self.events.send(LpcEvent::StepChanged {
            cursor,
            current_step_index: cursor.flattened(),
        });
    }

    fn busy(&self, title: String) {
        let _ = self.events.send(LpcEvent::Busy { title });
    }

    fn fail(&mut self, err: DispatchError, cursor: Cursor) -> LpcError {
        warn!(
            run_id = %self.run_id,
            command_type = err.command_type(),
            reason = err.reason(),
            "labware position check failed"
        );
        let failure = LpcFailure {
            command_type: err.command_type().to_string(),
            reason: err.reason().to_string(),
            cursor,
        };
        self.state = LpcState::Errored {
            failure: failure.clone(),
        };
        let _ = self.events.send(LpcEvent::Errored { failure });
        LpcError::Dispatch(err)
    }

    fn teardown(&mut self) {
        info!(run_id = %self.run_id, "closing labware position check");
        self.session = None;
        self.state = LpcState::Exited;
        let _ = self.events.send(LpcEvent::Exited);
    }
}

#[cfg(test)]
#[path = "tests/sequencer_tests.rs"]
mod tests;
