//! Labware position check: derives the sections to verify from a protocol
//! analysis and drives the operator through them, one robot command at a time.

pub mod error;
pub mod offsets;
pub mod restart;
pub mod sequencer;
pub mod session;
pub mod steps;

pub use error::LpcError;
pub use offsets::{
    poll_offsets, summarize_offsets, LabwareOffset, OffsetCalculator, OffsetError,
    RunCommandOffsetCalculator,
};
pub use restart::{DelayedRunRestart, RUN_RESTART_GRACE};
pub use sequencer::{LpcEvent, LpcFailure, LpcSequencer, LpcState};
pub use session::{Cursor, LpcSession, SavePositionCommandData};
pub use steps::{intro_info, IntroInfo, LpcSection, LpcStep, SectionKind, StepKind};
