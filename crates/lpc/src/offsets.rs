//! Turns the pair of saved positions recorded for each labware into the offset
//! the operator applies to the run.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use client_core::RunResource;
use serde::Serialize;
use shared::{
    domain::{CommandId, CommandStatus, LabwareId, LabwareLocation, OffsetVector, RunId},
    protocol::Command,
};
use thiserror::Error;
use tracing::debug;

use crate::{session::SavePositionCommandData, steps::LpcSection};

#[derive(Debug, Error)]
pub enum OffsetError {
    /// The robot has not reported the saved position yet. Retry later.
    #[error("saved position from command {command_id} is not available yet")]
    DataUnavailable { command_id: CommandId },
    #[error("labware {labware_id} does not have two saved positions")]
    Incomplete { labware_id: LabwareId },
    #[error("failed to look up saved positions: {0}")]
    Lookup(String),
}

#[async_trait]
pub trait OffsetCalculator: Send + Sync {
    /// Offset of the second (confirmed) position relative to the first.
    async fn labware_offset(
        &self,
        labware_id: &LabwareId,
        first: &CommandId,
        second: &CommandId,
    ) -> Result<OffsetVector, OffsetError>;
}

/// Reads both savePosition commands back from the run.
pub struct RunCommandOffsetCalculator {
    runs: Arc<dyn RunResource>,
    run_id: RunId,
}

impl RunCommandOffsetCalculator {
    pub fn new(runs: Arc<dyn RunResource>, run_id: RunId) -> Self {
        Self { runs, run_id }
    }

    async fn saved_position(&self, command_id: &CommandId) -> Result<Command, OffsetError> {
        let command = self
            .runs
            .command(&self.run_id, command_id)
            .await
            .map_err(|err| OffsetError::Lookup(format!("{err:#}")))?;
        if command.status != CommandStatus::Succeeded || command.saved_position().is_none() {
            return Err(OffsetError::DataUnavailable {
                command_id: command_id.clone(),
            });
        }
        Ok(command)
    }
}

#[async_trait]
impl OffsetCalculator for RunCommandOffsetCalculator {
    async fn labware_offset(
        &self,
        labware_id: &LabwareId,
        first: &CommandId,
        second: &CommandId,
    ) -> Result<OffsetVector, OffsetError> {
        let initial = self.saved_position(first).await?;
        let confirmed = self.saved_position(second).await?;
        match (initial.saved_position(), confirmed.saved_position()) {
            (Some(initial), Some(confirmed)) => {
                let vector = confirmed - initial;
                debug!(%labware_id, %vector, "computed labware offset");
                Ok(vector)
            }
            (None, _) => Err(OffsetError::DataUnavailable {
                command_id: first.clone(),
            }),
            (_, None) => Err(OffsetError::DataUnavailable {
                command_id: second.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabwareOffset {
    pub labware_id: LabwareId,
    pub labware_name: String,
    pub location: LabwareLocation,
    pub vector: OffsetVector,
}

/// One calculator call per section, in section order.
pub async fn summarize_offsets(
    calculator: &dyn OffsetCalculator,
    sections: &[LpcSection],
    save_positions: &SavePositionCommandData,
) -> Result<Vec<LabwareOffset>, OffsetError> {
    let mut offsets = Vec::with_capacity(sections.len());
    for section in sections {
        let [first, second] = save_positions.get(&section.labware_id) else {
            return Err(OffsetError::Incomplete {
                labware_id: section.labware_id.clone(),
            });
        };
        let vector = calculator
            .labware_offset(&section.labware_id, first, second)
            .await?;
        offsets.push(LabwareOffset {
            labware_id: section.labware_id.clone(),
            labware_name: section.labware_name.clone(),
            location: section.location.clone(),
            vector,
        });
    }
    Ok(offsets)
}

/// Retries [`summarize_offsets`] while saved positions are still arriving.
pub async fn poll_offsets(
    calculator: &dyn OffsetCalculator,
    sections: &[LpcSection],
    save_positions: &SavePositionCommandData,
    every: Duration,
    max_attempts: usize,
) -> Result<Vec<LabwareOffset>, OffsetError> {
    let mut attempt = 1;
    loop {
        match summarize_offsets(calculator, sections, save_positions).await {
            Err(OffsetError::DataUnavailable { command_id }) if attempt < max_attempts => {
                debug!(%command_id, attempt, "saved position not ready, polling again");
                attempt += 1;
                tokio::time::sleep(every).await;
            }
            other => return other,
        }
    }
}
