use std::collections::HashMap;

use serde::Serialize;
use shared::domain::{CommandId, LabwareId, RunId};

use crate::steps::{IntroInfo, LpcSection, StepKind, SECTION_STEPS};

/// Saved-position command ids per labware, in dispatch order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SavePositionCommandData(HashMap<LabwareId, Vec<CommandId>>);

impl SavePositionCommandData {
    pub fn record(&mut self, labware_id: &LabwareId, command_id: CommandId) {
        let ids = self.0.entry(labware_id.clone()).or_default();
        debug_assert!(ids.len() < 2, "labware {labware_id} already has two saved positions");
        ids.push(command_id);
    }

    pub fn get(&self, labware_id: &LabwareId) -> &[CommandId] {
        self.0.get(labware_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Both the initial and the confirmed position were saved.
    pub fn is_complete(&self, labware_id: &LabwareId) -> bool {
        self.get(labware_id).len() == 2
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Cursor {
    pub section_index: usize,
    pub step_index: usize,
}

impl Cursor {
    pub fn step_kind(self) -> Option<StepKind> {
        SECTION_STEPS.get(self.step_index).copied()
    }

    /// Position in the flattened list of all steps of all sections.
    pub fn flattened(self) -> usize {
        self.section_index * SECTION_STEPS.len() + self.step_index
    }
}

#[derive(Debug, Clone)]
pub struct LpcSession {
    pub run_id: RunId,
    sections: Vec<LpcSection>,
    cursor: Cursor,
    save_positions: SavePositionCommandData,
    tip_source: Option<LabwareId>,
}

impl LpcSession {
    pub fn new(run_id: RunId, intro: &IntroInfo) -> Self {
        Self {
            run_id,
            sections: intro.sections.clone(),
            cursor: Cursor::default(),
            save_positions: SavePositionCommandData::default(),
            tip_source: None,
        }
    }

    pub fn sections(&self) -> &[LpcSection] {
        &self.sections
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn current_step_index(&self) -> usize {
        self.cursor.flattened()
    }

    pub fn current_section(&self) -> Option<&LpcSection> {
        self.sections.get(self.cursor.section_index)
    }

    pub fn next_section(&self) -> Option<&LpcSection> {
        self.sections.get(self.cursor.section_index + 1)
    }

    pub fn is_last_section(&self) -> bool {
        self.cursor.section_index + 1 == self.sections.len()
    }

    pub fn is_finished(&self) -> bool {
        self.cursor.section_index >= self.sections.len()
    }

    pub fn save_positions(&self) -> &SavePositionCommandData {
        &self.save_positions
    }

    pub fn record_save_position(&mut self, labware_id: &LabwareId, command_id: CommandId) {
        self.save_positions.record(labware_id, command_id);
    }

    pub fn tip_source(&self) -> Option<&LabwareId> {
        self.tip_source.as_ref()
    }

    pub fn set_tip_source(&mut self, labware_id: Option<LabwareId>) {
        self.tip_source = labware_id;
    }

    /// Moves to the next step, rolling into the next section once the current
    /// one is exhausted. Returns `None` once every section is done.
    pub fn advance(&mut self) -> Option<Cursor> {
        if self.is_finished() {
            return None;
        }
        if self.cursor.step_index + 1 < SECTION_STEPS.len() {
            self.cursor.step_index += 1;
        } else {
            self.cursor = Cursor {
                section_index: self.cursor.section_index + 1,
                step_index: 0,
            };
        }
        (!self.is_finished()).then_some(self.cursor)
    }

    /// Every section holds both of its saved positions.
    pub fn all_sections_saved(&self) -> bool {
        self.sections
            .iter()
            .all(|section| self.save_positions.is_complete(&section.labware_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{LpcSection, SectionKind};
    use shared::domain::{LabwareLocation, Mount};

    fn section(labware_id: &str) -> LpcSection {
        LpcSection {
            kind: SectionKind::CheckRemainingLabwareWithPrimaryPipette,
            labware_id: labware_id.into(),
            labware_name: labware_id.to_string(),
            pipette_id: "p1".into(),
            mount: Mount::Left,
            location: LabwareLocation::Slot {
                slot_name: "1".into(),
            },
            slot_name: "1".into(),
            module: None,
            picks_up_tip: false,
        }
    }

    fn session(labware: &[&str]) -> LpcSession {
        let intro = IntroInfo {
            primary_pipette_mount: Mount::Left,
            secondary_pipette_mount: None,
            section_kinds: vec![SectionKind::CheckRemainingLabwareWithPrimaryPipette],
            sections: labware.iter().map(|id| section(id)).collect(),
        };
        LpcSession::new(RunId::from("run-1"), &intro)
    }

    #[test]
    fn advance_walks_steps_then_sections() {
        let mut session = session(&["a", "b"]);
        assert_eq!(session.cursor().step_kind(), Some(StepKind::MoveToLabware));

        let mut seen = vec![session.current_step_index()];
        while session.advance().is_some() {
            seen.push(session.current_step_index());
        }
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert!(session.is_finished());
        assert!(session.current_section().is_none());
        assert!(session.advance().is_none());
        assert_eq!(session.current_step_index(), 4);
    }

    #[test]
    fn saved_positions_complete_after_two_records() {
        let mut session = session(&["plate"]);
        let plate = LabwareId::from("plate");
        session.record_save_position(&plate, CommandId::from("cmd-1"));
        assert!(!session.save_positions().is_complete(&plate));
        assert!(!session.all_sections_saved());

        session.record_save_position(&plate, CommandId::from("cmd-2"));
        assert!(session.all_sections_saved());
        assert_eq!(
            session.save_positions().get(&plate),
            &[CommandId::from("cmd-1"), CommandId::from("cmd-2")]
        );
        assert!(session.save_positions().get(&LabwareId::from("other")).is_empty());
    }
}
