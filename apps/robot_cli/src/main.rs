use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    watch_run, CommandDispatch, HttpRobotClient, ProtocolResource, RunControl, RunResource,
    SimulatedRobot,
};
use futures::StreamExt;
use lpc::{
    poll_offsets, DelayedRunRestart, LpcError, LpcEvent, LpcSequencer, LpcState,
    RunCommandOffsetCalculator,
};
use run_timeline::{reconcile, CommandTimeline, EntrySource, RunBanner};
use shared::{
    domain::{CommandStatus, ProtocolId, RunId, RunStatus},
    protocol::ProtocolAnalysis,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod input;

use input::{parse_input, OperatorInput, HELP};

#[derive(Parser, Debug)]
#[command(name = "robot_cli", about = "Protocol run timeline and labware position check")]
struct Args {
    /// Robot server base url. Overrides robot.toml and the environment.
    #[arg(long, global = true)]
    robot_url: Option<String>,
    /// Run against an in-memory robot loaded with this analysis JSON.
    #[arg(long, global = true)]
    simulate: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the reconciled command timeline of a run.
    Timeline {
        #[arg(long)]
        run: Option<String>,
        #[arg(long)]
        protocol: String,
        /// Keep polling and reprint whenever the timeline changes.
        #[arg(long)]
        watch: bool,
    },
    /// Walk through labware position check interactively.
    Lpc {
        #[arg(long)]
        run: Option<String>,
        #[arg(long)]
        protocol: String,
    },
}

struct Robot {
    dispatch: Arc<dyn CommandDispatch>,
    runs: Arc<dyn RunResource>,
    protocols: Arc<dyn ProtocolResource>,
    control: Arc<dyn RunControl>,
    run_id: RunId,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    if let Some(url) = args.robot_url.clone() {
        settings.robot_url = url;
    }

    match args.command {
        Command::Timeline {
            run,
            protocol,
            watch,
        } => {
            let protocol_id = ProtocolId::new(protocol);
            let robot = connect(args.simulate.as_deref(), &settings, &protocol_id, run).await?;
            show_timeline(&robot, &protocol_id, watch, settings.poll_interval()).await
        }
        Command::Lpc { run, protocol } => {
            let protocol_id = ProtocolId::new(protocol);
            let robot = connect(args.simulate.as_deref(), &settings, &protocol_id, run).await?;
            run_lpc(&robot, protocol_id, &settings).await
        }
    }
}

async fn connect(
    simulate: Option<&std::path::Path>,
    settings: &config::Settings,
    protocol_id: &ProtocolId,
    run: Option<String>,
) -> Result<Robot> {
    if let Some(path) = simulate {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read analysis '{}'", path.display()))?;
        let analysis: ProtocolAnalysis = serde_json::from_str(&raw)
            .with_context(|| format!("'{}' is not a protocol analysis", path.display()))?;

        let robot = Arc::new(SimulatedRobot::new());
        robot.add_protocol(protocol_id.clone(), analysis).await;
        let run_id = robot.create_run(protocol_id).await?;
        info!(%run_id, %protocol_id, "using simulated robot");
        return Ok(Robot {
            dispatch: robot.clone(),
            runs: robot.clone(),
            protocols: robot.clone(),
            control: robot,
            run_id,
        });
    }

    let Some(run) = run else {
        bail!("--run is required unless --simulate is given");
    };
    let client = Arc::new(HttpRobotClient::new(&settings.robot_url)?);
    info!(robot_url = %client.base_url(), run_id = %run, "connecting to robot server");
    Ok(Robot {
        dispatch: client.clone(),
        runs: client.clone(),
        protocols: client.clone(),
        control: client,
        run_id: RunId::new(run),
    })
}

async fn show_timeline(
    robot: &Robot,
    protocol_id: &ProtocolId,
    watch: bool,
    every: Duration,
) -> Result<()> {
    let analysis = robot
        .protocols
        .protocol_analysis(protocol_id)
        .await
        .with_context(|| format!("failed to load analysis of protocol {protocol_id}"))?;

    if !watch {
        let run = robot.runs.run(&robot.run_id).await?;
        print_timeline(&reconcile(&analysis.commands, &run.commands), run.status);
        return Ok(());
    }

    let mut updates = Box::pin(watch_run(
        Arc::clone(&robot.runs),
        robot.run_id.clone(),
        every,
    ));
    let mut shown: Option<CommandTimeline> = None;
    while let Some(update) = updates.next().await {
        let run = match update {
            Ok(run) => run,
            Err(err) => {
                warn!(run_id = %robot.run_id, error = %format!("{err:#}"), "failed to poll run");
                continue;
            }
        };
        let timeline = reconcile(&analysis.commands, &run.commands);
        if shown.as_ref() != Some(&timeline) {
            print_timeline(&timeline, run.status);
            shown = Some(timeline);
        }
        if run.status.is_terminal() {
            break;
        }
    }
    Ok(())
}

fn print_timeline(timeline: &CommandTimeline, status: RunStatus) {
    println!("setup commands: {}", timeline.setup_commands.len());
    let current = timeline.current_entry().map(|(index, _)| index);
    for (index, entry) in timeline.display_timeline.iter().enumerate() {
        let marker = if Some(index) == current { ">" } else { " " };
        let source = match entry.source {
            EntrySource::Live => "live",
            EntrySource::Anticipated => "anticipated",
        };
        println!(
            "{marker}{:>4}  {:<9}  {:<11}  {}  ({})",
            index + 1,
            status_label(entry.status()),
            source,
            entry.command_type(),
            entry.id()
        );
    }
    if !timeline.is_deterministic {
        println!("run has diverged from the protocol analysis; upcoming steps unknown");
    }
    if let Some(banner) = RunBanner::for_status(status) {
        println!("{}", banner.title());
    }
}

fn status_label(status: CommandStatus) -> &'static str {
    match status {
        CommandStatus::Queued => "queued",
        CommandStatus::Running => "running",
        CommandStatus::Succeeded => "succeeded",
        CommandStatus::Failed => "failed",
    }
}

async fn run_lpc(robot: &Robot, protocol_id: ProtocolId, settings: &config::Settings) -> Result<()> {
    let mut sequencer = LpcSequencer::new(
        robot.run_id.clone(),
        protocol_id,
        Arc::clone(&robot.dispatch),
        Arc::clone(&robot.protocols),
    );
    let mut events = sequencer.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let LpcEvent::Busy { title } = event {
                println!("  ... {title}");
            }
        }
    });

    if let Err(err) = sequencer.begin_lpc().await {
        println!("{err}");
        return Ok(());
    }
    if let Some(intro) = sequencer.intro_info() {
        println!(
            "{} labware to check with the {} pipette",
            intro.sections.len(),
            intro.primary_pipette_mount
        );
    }
    println!("{HELP}");
    prompt(&sequencer);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = match parse_input(&line) {
            Ok(input) => input,
            Err(reason) => {
                println!("{reason}");
                continue;
            }
        };
        let outcome = match input {
            OperatorInput::Proceed => sequencer.proceed().await,
            OperatorInput::Jog { axis, distance } => sequencer.jog(axis, distance).await,
            OperatorInput::Exit => sequencer.request_exit(),
            OperatorInput::ConfirmExit => sequencer.confirm_exit(),
            OperatorInput::CancelExit => sequencer.cancel_exit(),
        };

        match outcome {
            Err(LpcError::Dispatch(_)) => return recover(robot, &mut sequencer, settings).await,
            Err(err) => println!("{err}"),
            Ok(()) => {}
        }

        match sequencer.current_state() {
            LpcState::Complete => {
                print_offsets(robot, &sequencer, settings).await?;
                sequencer.request_exit()?;
                return Ok(());
            }
            LpcState::Exited => {
                println!("labware position check closed, offsets discarded");
                return Ok(());
            }
            _ => prompt(&sequencer),
        }
    }
    Ok(())
}

fn prompt(sequencer: &LpcSequencer) {
    println!("{}", sequencer.title_text());
    println!("[{}]", sequencer.cta_text());
}

async fn print_offsets(
    robot: &Robot,
    sequencer: &LpcSequencer,
    settings: &config::Settings,
) -> Result<()> {
    let Some(save_positions) = sequencer.save_positions() else {
        return Ok(());
    };
    let calculator =
        RunCommandOffsetCalculator::new(Arc::clone(&robot.runs), robot.run_id.clone());
    let offsets = poll_offsets(
        &calculator,
        sequencer.sections(),
        &save_positions,
        settings.poll_interval(),
        settings.offset_poll_attempts,
    )
    .await
    .context("failed to compute labware offsets")?;

    println!("{}", sequencer.title_text());
    for offset in offsets {
        println!("  {:<40} {}", offset.labware_name, offset.vector);
    }
    Ok(())
}

async fn recover(
    robot: &Robot,
    sequencer: &mut LpcSequencer,
    settings: &config::Settings,
) -> Result<()> {
    let failure = sequencer.acknowledge_error()?;
    println!(
        "{} command failed: {}. Restarting run in {}s.",
        failure.command_type,
        failure.reason,
        settings.restart_grace().as_secs()
    );

    let restart =
        DelayedRunRestart::with_grace(Arc::clone(&robot.control), settings.restart_grace());
    let Some(handle) = restart.schedule(robot.run_id.clone()) else {
        return Ok(());
    };
    let new_run = handle.await.context("run restart task panicked")??;
    println!("run restarted as {new_run}");
    Ok(())
}
