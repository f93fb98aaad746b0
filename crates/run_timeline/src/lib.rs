//! Merges a protocol's anticipated command list with the live command log of
//! a run into the single ordered timeline shown to the operator.

use std::collections::HashSet;

use serde::Serialize;
use shared::{
    domain::{CommandId, CommandStatus, RunStatus},
    protocol::{Command, RunCommandSummary},
};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    /// Reported by the executing run.
    Live,
    /// Predicted by protocol analysis and not yet seen in the run.
    Anticipated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub command: RunCommandSummary,
    pub source: EntrySource,
}

impl TimelineEntry {
    fn live(command: &RunCommandSummary) -> Self {
        Self {
            command: command.clone(),
            source: EntrySource::Live,
        }
    }

    fn anticipated(command: &Command) -> Self {
        Self {
            command: command.anticipated().summary(),
            source: EntrySource::Anticipated,
        }
    }

    pub fn id(&self) -> &CommandId {
        &self.command.id
    }

    pub fn status(&self) -> CommandStatus {
        self.command.status
    }

    pub fn command_type(&self) -> &str {
        &self.command.command_type
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandTimeline {
    pub setup_commands: Vec<Command>,
    pub display_timeline: Vec<TimelineEntry>,
    pub is_deterministic: bool,
}

impl CommandTimeline {
    /// Entry the robot is executing right now, if any.
    pub fn current_entry(&self) -> Option<(usize, &TimelineEntry)> {
        self.display_timeline
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.status() == CommandStatus::Running)
    }

    pub fn display_ids(&self) -> impl Iterator<Item = &CommandId> {
        self.display_timeline.iter().map(TimelineEntry::id)
    }
}

/// Index one past the last load command, so `anticipated[..n]` is the setup
/// prefix. Zero when the protocol loads nothing.
pub fn setup_boundary(anticipated: &[Command]) -> usize {
    anticipated
        .iter()
        .rposition(|command| command.kind.is_setup())
        .map_or(0, |last| last + 1)
}

pub fn partition_setup(anticipated: &[Command]) -> (&[Command], &[Command]) {
    anticipated.split_at(setup_boundary(anticipated))
}

/// Only the id and status of live commands are consulted.
pub fn reconcile(anticipated: &[Command], live: &[RunCommandSummary]) -> CommandTimeline {
    let (setup, post_setup) = partition_setup(anticipated);
    let setup_commands: Vec<Command> = setup.iter().map(Command::anticipated).collect();

    let Some(first_post_setup) = post_setup.first() else {
        return CommandTimeline {
            setup_commands,
            display_timeline: Vec::new(),
            is_deterministic: true,
        };
    };

    if live.is_empty() {
        return CommandTimeline {
            setup_commands,
            display_timeline: dedup_entries(post_setup.iter().map(TimelineEntry::anticipated)),
            is_deterministic: true,
        };
    }

    let (live_suffix, anchored) = match live
        .iter()
        .position(|command| command.id == first_post_setup.id)
    {
        Some(anchor) => (live[anchor..].to_vec(), true),
        None => {
            let setup_ids: HashSet<&CommandId> = setup.iter().map(|c| &c.id).collect();
            let unanchored = live
                .iter()
                .filter(|command| !setup_ids.contains(&command.id))
                .cloned()
                .collect();
            (unanchored, false)
        }
    };

    let live_ids: HashSet<&CommandId> = live_suffix.iter().map(|c| &c.id).collect();
    let has_duplicates = live_ids.len() != live_suffix.len();

    let matches_plan = live_suffix
        .iter()
        .zip(post_setup)
        .all(|(live_command, planned)| live_command.id == planned.id);
    let is_deterministic = anchored && !has_duplicates && matches_plan;

    if !is_deterministic {
        debug!(
            anchored,
            has_duplicates,
            live_len = live_suffix.len(),
            "live run diverged from anticipated plan"
        );
    }

    let live_entries = live_suffix.iter().map(TimelineEntry::live);
    let display_timeline = if is_deterministic {
        let remaining = post_setup
            .iter()
            .skip_while(|planned| live_ids.contains(&planned.id))
            .map(TimelineEntry::anticipated);
        dedup_entries(live_entries.chain(remaining))
    } else {
        dedup_entries(live_entries)
    };

    CommandTimeline {
        setup_commands,
        display_timeline,
        is_deterministic,
    }
}

fn dedup_entries(entries: impl Iterator<Item = TimelineEntry>) -> Vec<TimelineEntry> {
    let mut seen = HashSet::new();
    entries
        .filter(|entry| seen.insert(entry.id().clone()))
        .collect()
}

/// Banner shown above the timeline once a run has reached an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunBanner {
    Failed,
    Canceled,
    Complete,
}

impl RunBanner {
    pub fn for_status(status: RunStatus) -> Option<Self> {
        match status {
            RunStatus::Failed => Some(Self::Failed),
            RunStatus::StopRequested => Some(Self::Canceled),
            RunStatus::Succeeded => Some(Self::Complete),
            _ => None,
        }
    }

    pub fn is_error(self) -> bool {
        matches!(self, Self::Failed | Self::Canceled)
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Failed => "Protocol run failed",
            Self::Canceled => "Protocol run canceled",
            Self::Complete => "Protocol run complete",
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
