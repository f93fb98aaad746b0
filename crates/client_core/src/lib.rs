use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use shared::{
    domain::{CommandId, ProtocolId, RunId},
    protocol::{Command, CommandKind, ProtocolAnalysis, RunRecord},
};
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;

mod http;
pub mod simulator;

pub use http::HttpRobotClient;
pub use simulator::SimulatedRobot;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("robot rejected {command_type} command: {reason}")]
    Rejected {
        command_type: String,
        reason: String,
    },
    #[error("failed to reach robot while sending {command_type} command: {reason}")]
    Transport {
        command_type: String,
        reason: String,
    },
}

impl DispatchError {
    pub fn command_type(&self) -> &str {
        match self {
            Self::Rejected { command_type, .. } | Self::Transport { command_type, .. } => {
                command_type
            }
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Rejected { reason, .. } | Self::Transport { reason, .. } => reason,
        }
    }
}

/// Enqueues robot-directed commands on a run. `Ok` means the robot accepted
/// the command; it has not necessarily executed yet.
#[async_trait]
pub trait CommandDispatch: Send + Sync {
    async fn dispatch(&self, run_id: &RunId, command: CommandKind)
        -> Result<Command, DispatchError>;
}

#[async_trait]
pub trait RunResource: Send + Sync {
    async fn run(&self, run_id: &RunId) -> Result<RunRecord>;
    async fn command(&self, run_id: &RunId, command_id: &CommandId) -> Result<Command>;
}

#[async_trait]
pub trait ProtocolResource: Send + Sync {
    /// Latest completed analysis of the protocol. Fails while analysis is
    /// still pending.
    async fn protocol_analysis(&self, protocol_id: &ProtocolId) -> Result<ProtocolAnalysis>;
}

#[async_trait]
pub trait RunControl: Send + Sync {
    /// Replaces the run with a fresh run of the same protocol and returns the
    /// new run id.
    async fn restart_run(&self, run_id: &RunId) -> Result<RunId>;
}

pub struct MissingCommandDispatch;

#[async_trait]
impl CommandDispatch for MissingCommandDispatch {
    async fn dispatch(
        &self,
        _run_id: &RunId,
        command: CommandKind,
    ) -> Result<Command, DispatchError> {
        Err(DispatchError::Transport {
            command_type: command.command_type().to_string(),
            reason: "command dispatch is unavailable".to_string(),
        })
    }
}

pub struct MissingRunResource;

#[async_trait]
impl RunResource for MissingRunResource {
    async fn run(&self, run_id: &RunId) -> Result<RunRecord> {
        Err(anyhow!("run resource unavailable for run {run_id}"))
    }

    async fn command(&self, run_id: &RunId, command_id: &CommandId) -> Result<Command> {
        Err(anyhow!(
            "run resource unavailable for run {run_id} command {command_id}"
        ))
    }
}

pub struct MissingProtocolResource;

#[async_trait]
impl ProtocolResource for MissingProtocolResource {
    async fn protocol_analysis(&self, protocol_id: &ProtocolId) -> Result<ProtocolAnalysis> {
        Err(anyhow!(
            "protocol resource unavailable for protocol {protocol_id}"
        ))
    }
}

pub struct MissingRunControl;

#[async_trait]
impl RunControl for MissingRunControl {
    async fn restart_run(&self, run_id: &RunId) -> Result<RunId> {
        Err(anyhow!("run control unavailable for run {run_id}"))
    }
}

/// Polls a run at a fixed period. Every tick yields the freshly fetched
/// record (or the fetch error) so consumers can recompute derived views.
pub fn watch_run(
    runs: Arc<dyn RunResource>,
    run_id: RunId,
    every: Duration,
) -> impl Stream<Item = Result<RunRecord>> {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    IntervalStream::new(interval).then(move |_| {
        let runs = Arc::clone(&runs);
        let run_id = run_id.clone();
        async move { runs.run(&run_id).await }
    })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
