use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use client_core::{RunResource, SimulatedRobot};
use lpc::{
    summarize_offsets, DelayedRunRestart, LpcError, LpcSequencer, LpcState, OffsetCalculator,
    OffsetError, RunCommandOffsetCalculator, RUN_RESTART_GRACE,
};
use shared::{
    domain::{
        CommandId, CommandStatus, LabwareId, LabwareLocation, Mount, MovementAxis, OffsetVector,
        ProtocolId,
    },
    protocol::{
        Command, CommandKind, LabwareInfo, LiquidParams, PipetteInfo, ProtocolAnalysis, WellParams,
    },
};
use tokio::sync::Mutex;

fn two_labware_protocol() -> ProtocolAnalysis {
    let mut analysis = ProtocolAnalysis::default();
    analysis.pipettes.insert(
        "p20".into(),
        PipetteInfo {
            pipette_name: "p20_single_gen2".into(),
            mount: Mount::Right,
            channels: 1,
        },
    );
    analysis.labware.insert(
        "tiprack".into(),
        LabwareInfo {
            load_name: "opentrons_96_tiprack_20ul".into(),
            display_name: None,
            is_tiprack: true,
            location: LabwareLocation::Slot {
                slot_name: "4".into(),
            },
        },
    );
    analysis.labware.insert(
        "plate".into(),
        LabwareInfo {
            load_name: "nest_96_wellplate_100ul_pcr_full_skirt".into(),
            display_name: None,
            is_tiprack: false,
            location: LabwareLocation::Slot {
                slot_name: "2".into(),
            },
        },
    );
    analysis.commands = vec![
        Command::new(
            "pick",
            CommandKind::PickUpTip(WellParams {
                pipette_id: "p20".into(),
                labware_id: "tiprack".into(),
                well_name: "A1".into(),
            }),
            CommandStatus::Queued,
        ),
        Command::new(
            "mix",
            CommandKind::Dispense(LiquidParams {
                pipette_id: "p20".into(),
                labware_id: "plate".into(),
                well_name: "C3".into(),
                volume: 10.0,
            }),
            CommandStatus::Queued,
        ),
    ];
    analysis
}

/// Records every request and delegates to the run-backed calculator.
struct RecordingCalculator {
    inner: RunCommandOffsetCalculator,
    calls: Mutex<Vec<(LabwareId, CommandId, CommandId)>>,
}

#[async_trait]
impl OffsetCalculator for RecordingCalculator {
    async fn labware_offset(
        &self,
        labware_id: &LabwareId,
        first: &CommandId,
        second: &CommandId,
    ) -> Result<OffsetVector, OffsetError> {
        self.calls
            .lock()
            .await
            .push((labware_id.clone(), first.clone(), second.clone()));
        self.inner.labware_offset(labware_id, first, second).await
    }
}

async fn start(robot: &Arc<SimulatedRobot>) -> LpcSequencer {
    robot.add_protocol("proto", two_labware_protocol()).await;
    let run_id = robot
        .create_run(&ProtocolId::from("proto"))
        .await
        .expect("create run");
    let mut sequencer = LpcSequencer::new(
        run_id,
        ProtocolId::from("proto"),
        robot.clone(),
        robot.clone(),
    );
    sequencer.begin_lpc().await.expect("begin");
    sequencer
}

#[tokio::test]
async fn two_labware_check_completes_and_computes_offsets() {
    let robot = Arc::new(SimulatedRobot::new());
    let mut sequencer = start(&robot).await;
    let run_id = sequencer.run_id().clone();
    assert_eq!(sequencer.sections().len(), 2);

    // tiprack: move, nudge up, confirm
    sequencer.proceed().await.expect("move to tiprack");
    sequencer.jog(MovementAxis::Z, 1.5).await.expect("jog");
    sequencer.proceed().await.expect("confirm tiprack");

    // plate: move, nudge left, confirm
    sequencer.proceed().await.expect("move to plate");
    sequencer.jog(MovementAxis::X, -0.25).await.expect("jog");
    sequencer.proceed().await.expect("confirm plate");

    assert_eq!(sequencer.current_state(), &LpcState::Complete);

    let commands = robot.commands(&run_id).await;
    let saves: Vec<CommandId> = commands
        .iter()
        .filter(|command| command.command_type() == "savePosition")
        .map(|command| command.id.clone())
        .collect();
    assert_eq!(saves.len(), 4);

    let save_positions = sequencer.save_positions().expect("session");
    let runs: Arc<dyn RunResource> = robot.clone();
    let calculator = RecordingCalculator {
        inner: RunCommandOffsetCalculator::new(runs, run_id),
        calls: Mutex::new(Vec::new()),
    };
    let offsets = summarize_offsets(&calculator, sequencer.sections(), &save_positions)
        .await
        .expect("offsets");

    let calls = calculator.calls.lock().await;
    assert_eq!(
        *calls,
        vec![
            (LabwareId::from("tiprack"), saves[0].clone(), saves[1].clone()),
            (LabwareId::from("plate"), saves[2].clone(), saves[3].clone()),
        ]
    );

    assert_eq!(offsets.len(), 2);
    assert_eq!(
        offsets[0].vector,
        OffsetVector {
            x: 0.0,
            y: 0.0,
            z: 1.5
        }
    );
    assert_eq!(
        offsets[1].vector,
        OffsetVector {
            x: -0.25,
            y: 0.0,
            z: 0.0
        }
    );
}

#[tokio::test(start_paused = true)]
async fn rejected_command_restarts_run_once_after_grace() {
    let robot = Arc::new(SimulatedRobot::new());
    let mut sequencer = start(&robot).await;
    robot.reject_command_type("moveToWell").await;

    let err = sequencer.proceed().await.expect_err("rejected");
    assert!(matches!(err, LpcError::Dispatch(_)));
    assert!(sequencer.failure().is_some());

    let restart = DelayedRunRestart::new(robot.clone());
    let handle = restart
        .schedule(sequencer.run_id().clone())
        .expect("schedule");
    assert!(restart.schedule(sequencer.run_id().clone()).is_none());
    sequencer.acknowledge_error().expect("acknowledge");

    tokio::time::sleep(RUN_RESTART_GRACE - Duration::from_millis(10)).await;
    assert_eq!(robot.restart_count().await, 0);

    let new_run = handle.await.expect("join").expect("restart");
    assert_ne!(&new_run, sequencer.run_id());
    assert_eq!(robot.restart_count().await, 1);

    tokio::time::sleep(RUN_RESTART_GRACE * 2).await;
    assert_eq!(robot.restart_count().await, 1);
}
