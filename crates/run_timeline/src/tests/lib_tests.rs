use super::*;
use shared::{
    domain::{LabwareLocation, ModuleModel, Mount},
    protocol::{
        CommandKind, HomeParams, LiquidParams, LoadLabwareParams, LoadModuleParams,
        LoadPipetteParams, RunCommandSummary, WellParams,
    },
};

fn load_pipette(id: &str) -> Command {
    Command::new(
        id,
        CommandKind::LoadPipette(LoadPipetteParams {
            pipette_id: "p300".into(),
            pipette_name: "p300_single".into(),
            mount: Mount::Left,
        }),
        CommandStatus::Queued,
    )
}

fn load_module(id: &str) -> Command {
    Command::new(
        id,
        CommandKind::LoadModule(LoadModuleParams {
            module_id: "tempdeck".into(),
            model: ModuleModel::TemperatureModuleV2,
            slot_name: "3".into(),
        }),
        CommandStatus::Queued,
    )
}

fn load_labware(id: &str) -> Command {
    Command::new(
        id,
        CommandKind::LoadLabware(LoadLabwareParams {
            labware_id: "plate".into(),
            load_name: "corning_96_wellplate_360ul_flat".into(),
            location: LabwareLocation::Slot {
                slot_name: "1".into(),
            },
        }),
        CommandStatus::Queued,
    )
}

fn pick_up_tip(id: &str) -> Command {
    Command::new(
        id,
        CommandKind::PickUpTip(WellParams {
            pipette_id: "p300".into(),
            labware_id: "tiprack".into(),
            well_name: "A1".into(),
        }),
        CommandStatus::Queued,
    )
}

fn aspirate(id: &str) -> Command {
    Command::new(
        id,
        CommandKind::Aspirate(LiquidParams {
            pipette_id: "p300".into(),
            labware_id: "plate".into(),
            well_name: "B2".into(),
            volume: 50.0,
        }),
        CommandStatus::Queued,
    )
}

fn home(id: &str) -> Command {
    Command::new(id, CommandKind::Home(HomeParams::default()), CommandStatus::Queued)
}

fn live(command: Command, status: CommandStatus) -> RunCommandSummary {
    RunCommandSummary {
        status,
        ..command.summary()
    }
}

fn ids(timeline: &CommandTimeline) -> Vec<&str> {
    timeline.display_ids().map(CommandId::as_str).collect()
}

fn protocol() -> Vec<Command> {
    vec![
        load_pipette("s1"),
        load_module("s2"),
        load_labware("s3"),
        pick_up_tip("c1"),
        aspirate("c2"),
        home("c3"),
    ]
}

#[test]
fn partitions_setup_at_last_load_command() {
    let anticipated = vec![
        load_pipette("s1"),
        load_module("s2"),
        load_labware("s3"),
        pick_up_tip("c1"),
        aspirate("c2"),
    ];
    let (setup, post_setup) = partition_setup(&anticipated);
    assert_eq!(setup.len(), 3);
    assert_eq!(post_setup.len(), 2);
    assert_eq!(post_setup[0].id.as_str(), "c1");
    assert_eq!(post_setup[1].id.as_str(), "c2");
}

#[test]
fn setup_prefix_includes_interleaved_commands_before_last_load() {
    let anticipated = vec![
        load_pipette("s1"),
        home("h1"),
        load_labware("s2"),
        aspirate("c1"),
    ];
    let (setup, post_setup) = partition_setup(&anticipated);
    assert_eq!(setup.len(), 3);
    assert_eq!(post_setup.len(), 1);
}

#[test]
fn no_load_commands_means_empty_setup() {
    let anticipated = vec![home("c1"), aspirate("c2")];
    assert_eq!(setup_boundary(&anticipated), 0);

    let timeline = reconcile(&anticipated, &[]);
    assert!(timeline.setup_commands.is_empty());
    assert_eq!(ids(&timeline), vec!["c1", "c2"]);
}

#[test]
fn setup_only_protocol_has_empty_timeline() {
    let anticipated = vec![load_pipette("s1"), load_labware("s2")];
    let live_commands = vec![live(load_pipette("s1"), CommandStatus::Succeeded)];

    let timeline = reconcile(&anticipated, &live_commands);
    assert_eq!(timeline.setup_commands.len(), 2);
    assert!(timeline.display_timeline.is_empty());
    assert!(timeline.is_deterministic);
}

#[test]
fn empty_live_run_shows_anticipated_plan() {
    let timeline = reconcile(&protocol(), &[]);
    assert!(timeline.is_deterministic);
    assert_eq!(ids(&timeline), vec!["c1", "c2", "c3"]);
    assert!(timeline
        .display_timeline
        .iter()
        .all(|entry| entry.source == EntrySource::Anticipated
            && entry.status() == CommandStatus::Queued));
}

#[test]
fn anticipated_commands_are_reported_queued_even_if_analysis_says_otherwise() {
    let mut anticipated = protocol();
    anticipated[4].status = CommandStatus::Succeeded;

    let timeline = reconcile(&anticipated, &[]);
    assert!(timeline
        .display_timeline
        .iter()
        .all(|entry| entry.status() == CommandStatus::Queued));
}

#[test]
fn consistent_live_prefix_is_followed_by_remaining_plan() {
    let live_commands = vec![
        live(load_pipette("s1"), CommandStatus::Succeeded),
        live(load_module("s2"), CommandStatus::Succeeded),
        live(load_labware("s3"), CommandStatus::Succeeded),
        live(pick_up_tip("c1"), CommandStatus::Succeeded),
        live(aspirate("c2"), CommandStatus::Running),
    ];

    let timeline = reconcile(&protocol(), &live_commands);
    assert!(timeline.is_deterministic);
    assert_eq!(ids(&timeline), vec!["c1", "c2", "c3"]);
    assert_eq!(timeline.display_timeline.len(), 2 + 1);

    let sources: Vec<EntrySource> = timeline
        .display_timeline
        .iter()
        .map(|entry| entry.source)
        .collect();
    assert_eq!(
        sources,
        vec![
            EntrySource::Live,
            EntrySource::Live,
            EntrySource::Anticipated
        ]
    );

    let (index, current) = timeline.current_entry().expect("running command");
    assert_eq!(index, 1);
    assert_eq!(current.id().as_str(), "c2");
}

#[test]
fn setup_and_calibration_commands_before_anchor_are_not_displayed() {
    let live_commands = vec![
        live(load_pipette("s1"), CommandStatus::Succeeded),
        live(home("lpc-home"), CommandStatus::Succeeded),
        live(pick_up_tip("c1"), CommandStatus::Running),
    ];

    let timeline = reconcile(&protocol(), &live_commands);
    assert!(timeline.is_deterministic);
    assert_eq!(ids(&timeline), vec!["c1", "c2", "c3"]);
}

#[test]
fn divergence_drops_anticipated_tail() {
    let live_commands = vec![
        live(pick_up_tip("c1"), CommandStatus::Succeeded),
        live(home("unexpected"), CommandStatus::Running),
    ];

    let timeline = reconcile(&protocol(), &live_commands);
    assert!(!timeline.is_deterministic);
    assert_eq!(ids(&timeline), vec!["c1", "unexpected"]);
    assert!(timeline
        .display_timeline
        .iter()
        .all(|entry| entry.source == EntrySource::Live));
}

#[test]
fn live_run_longer_than_plan_compares_only_overlap() {
    let anticipated = vec![load_pipette("s1"), pick_up_tip("c1")];
    let live_commands = vec![
        live(pick_up_tip("c1"), CommandStatus::Succeeded),
        live(home("extra"), CommandStatus::Queued),
    ];

    let timeline = reconcile(&anticipated, &live_commands);
    assert!(timeline.is_deterministic);
    assert_eq!(ids(&timeline), vec!["c1", "extra"]);
}

#[test]
fn missing_anchor_is_non_deterministic() {
    let live_commands = vec![
        live(load_pipette("s1"), CommandStatus::Succeeded),
        live(aspirate("c2"), CommandStatus::Succeeded),
        live(home("c3"), CommandStatus::Running),
    ];

    let timeline = reconcile(&protocol(), &live_commands);
    assert!(!timeline.is_deterministic);
    assert_eq!(ids(&timeline), vec!["c2", "c3"]);
}

#[test]
fn duplicate_live_ids_degrade_without_duplicating_entries() {
    let live_commands = vec![
        live(pick_up_tip("c1"), CommandStatus::Succeeded),
        live(pick_up_tip("c1"), CommandStatus::Succeeded),
    ];

    let timeline = reconcile(&protocol(), &live_commands);
    assert!(!timeline.is_deterministic);
    assert_eq!(ids(&timeline), vec!["c1"]);
}

#[test]
fn displayed_prefix_is_stable_as_run_grows() {
    let anticipated = protocol();
    let full_run = vec![
        live(pick_up_tip("c1"), CommandStatus::Succeeded),
        live(aspirate("c2"), CommandStatus::Succeeded),
        live(home("c3"), CommandStatus::Succeeded),
    ];

    let mut previous: Vec<String> = reconcile(&anticipated, &[])
        .display_ids()
        .map(|id| id.to_string())
        .collect();
    for observed in 1..=full_run.len() {
        let current: Vec<String> = reconcile(&anticipated, &full_run[..observed])
            .display_ids()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(current, previous);
        previous = current;
    }
}

#[test]
fn live_commands_match_by_id_regardless_of_reported_type() {
    let anticipated = vec![
        load_labware("s1"),
        Command::new(
            "c1",
            CommandKind::from_parts("delay".into(), serde_json::json!({"seconds": 5})),
            CommandStatus::Queued,
        ),
        home("c2"),
    ];
    let live_commands: Vec<RunCommandSummary> = serde_json::from_str(
        r#"[
            {"id": "s1", "commandType": "loadLabware", "status": "succeeded"},
            {"id": "c1", "commandType": "delay", "status": "running"}
        ]"#,
    )
    .expect("summaries");

    let timeline = reconcile(&anticipated, &live_commands);
    assert!(timeline.is_deterministic);
    assert_eq!(ids(&timeline), vec!["c1", "c2"]);
    assert_eq!(timeline.display_timeline[0].command_type(), "delay");
    assert_eq!(timeline.display_timeline[0].source, EntrySource::Live);
    assert_eq!(timeline.display_timeline[1].command_type(), "home");
    let (index, _) = timeline.current_entry().expect("running command");
    assert_eq!(index, 0);
}

#[test]
fn banner_follows_terminal_run_status() {
    assert_eq!(RunBanner::for_status(RunStatus::Failed), Some(RunBanner::Failed));
    assert_eq!(
        RunBanner::for_status(RunStatus::StopRequested),
        Some(RunBanner::Canceled)
    );
    assert_eq!(
        RunBanner::for_status(RunStatus::Succeeded),
        Some(RunBanner::Complete)
    );
    assert_eq!(RunBanner::for_status(RunStatus::Running), None);
    assert!(RunBanner::Canceled.is_error());
    assert!(!RunBanner::Complete.is_error());
}
