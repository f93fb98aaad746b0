//! Derives the ordered labware sections a position check walks through from a
//! protocol analysis.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use shared::{
    domain::{LabwareId, LabwareLocation, ModuleId, ModuleModel, Mount, PipetteId},
    protocol::{CommandKind, ProtocolAnalysis},
};

/// Well every check moves to and picks tips from.
pub const CHECK_WELL: &str = "A1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    PrimaryPipetteTipracks,
    SecondaryPipetteTipracks,
    CheckRemainingLabwareWithPrimaryPipette,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    MoveToLabware,
    ConfirmPosition,
}

/// Steps visited inside every section, in order.
pub const SECTION_STEPS: [StepKind; 2] = [StepKind::MoveToLabware, StepKind::ConfirmPosition];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionModule {
    pub module_id: ModuleId,
    pub model: ModuleModel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LpcSection {
    pub kind: SectionKind,
    pub labware_id: LabwareId,
    pub labware_name: String,
    pub pipette_id: PipetteId,
    pub mount: Mount,
    pub location: LabwareLocation,
    pub slot_name: String,
    pub module: Option<SectionModule>,
    /// The check tip is picked up from this labware once it is confirmed.
    pub picks_up_tip: bool,
}

impl LpcSection {
    pub fn sits_on_thermocycler(&self) -> bool {
        self.module
            .as_ref()
            .is_some_and(|module| module.model.is_thermocycler())
    }

    pub fn location_text(&self) -> String {
        match &self.module {
            Some(module) => format!("{} in slot {}", module.model.display_name(), self.slot_name),
            None => format!("slot {}", self.slot_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LpcStep {
    pub section_index: usize,
    pub kind: StepKind,
    pub section: LpcSection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntroInfo {
    pub primary_pipette_mount: Mount,
    pub secondary_pipette_mount: Option<Mount>,
    pub section_kinds: Vec<SectionKind>,
    pub sections: Vec<LpcSection>,
}

struct TipUser {
    pipette_id: PipetteId,
    mount: Mount,
    channels: u8,
    tipracks: Vec<LabwareId>,
}

/// Returns `None` when nothing can be checked: no pipette picks up tips, or the
/// protocol references no labware the analysis knows about.
pub fn intro_info(analysis: &ProtocolAnalysis) -> Option<IntroInfo> {
    let tip_users = tip_users(analysis);
    let primary = tip_users
        .iter()
        .max_by_key(|user| (user.channels, user.mount == Mount::Left))?;
    let secondary = tip_users
        .iter()
        .find(|user| user.pipette_id != primary.pipette_id);

    let mut sections = Vec::new();
    let mut covered: HashSet<&LabwareId> = HashSet::new();

    for labware_id in &primary.tipracks {
        if covered.insert(labware_id) {
            sections.extend(section_for(
                analysis,
                SectionKind::PrimaryPipetteTipracks,
                labware_id,
                primary,
            ));
        }
    }
    if let Some(secondary) = secondary {
        for labware_id in &secondary.tipracks {
            if covered.insert(labware_id) {
                sections.extend(section_for(
                    analysis,
                    SectionKind::SecondaryPipetteTipracks,
                    labware_id,
                    secondary,
                ));
            }
        }
    }

    let mut remaining: Vec<LpcSection> = Vec::new();
    for command in &analysis.commands {
        let Some((_, labware_id)) = command.kind.pipetting_target() else {
            continue;
        };
        let is_tiprack = analysis
            .labware
            .get(labware_id)
            .is_some_and(|labware| labware.is_tiprack);
        if is_tiprack || !covered.insert(labware_id) {
            continue;
        }
        remaining.extend(section_for(
            analysis,
            SectionKind::CheckRemainingLabwareWithPrimaryPipette,
            labware_id,
            primary,
        ));
    }
    remaining.sort_by(|a, b| slot_order(&a.slot_name).cmp(&slot_order(&b.slot_name)));

    if !remaining.is_empty() {
        if let Some(tip_source) = sections
            .iter_mut()
            .rev()
            .find(|section| section.kind == SectionKind::PrimaryPipetteTipracks)
        {
            tip_source.picks_up_tip = true;
        }
    }
    sections.extend(remaining);

    if sections.is_empty() {
        return None;
    }

    let mut section_kinds = Vec::new();
    for section in &sections {
        if !section_kinds.contains(&section.kind) {
            section_kinds.push(section.kind);
        }
    }

    Some(IntroInfo {
        primary_pipette_mount: primary.mount,
        secondary_pipette_mount: secondary.map(|user| user.mount),
        section_kinds,
        sections,
    })
}

fn tip_users(analysis: &ProtocolAnalysis) -> Vec<TipUser> {
    let mut users: Vec<TipUser> = Vec::new();
    let mut index: HashMap<&PipetteId, usize> = HashMap::new();

    for command in &analysis.commands {
        let CommandKind::PickUpTip(params) = &command.kind else {
            continue;
        };
        let Some(pipette) = analysis.pipettes.get(&params.pipette_id) else {
            continue;
        };
        let slot = *index.entry(&params.pipette_id).or_insert_with(|| {
            users.push(TipUser {
                pipette_id: params.pipette_id.clone(),
                mount: pipette.mount,
                channels: pipette.channels,
                tipracks: Vec::new(),
            });
            users.len() - 1
        });
        let tipracks = &mut users[slot].tipracks;
        if !tipracks.contains(&params.labware_id) {
            tipracks.push(params.labware_id.clone());
        }
    }
    users
}

fn section_for(
    analysis: &ProtocolAnalysis,
    kind: SectionKind,
    labware_id: &LabwareId,
    pipette: &TipUser,
) -> Option<LpcSection> {
    let labware = analysis.labware.get(labware_id)?;
    let slot_name = analysis.slot_of(&labware.location)?.to_string();
    let module = match &labware.location {
        LabwareLocation::Module { module_id } => {
            analysis.modules.get(module_id).map(|module| SectionModule {
                module_id: module_id.clone(),
                model: module.model,
            })
        }
        LabwareLocation::Slot { .. } => None,
    };
    Some(LpcSection {
        kind,
        labware_id: labware_id.clone(),
        labware_name: labware.name().to_string(),
        pipette_id: pipette.pipette_id.clone(),
        mount: pipette.mount,
        location: labware.location.clone(),
        slot_name,
        module,
        picks_up_tip: false,
    })
}

fn slot_order(slot_name: &str) -> (u32, &str) {
    (slot_name.parse().unwrap_or(u32::MAX), slot_name)
}
