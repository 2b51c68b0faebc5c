use anyhow::Result;
use clap::Parser;
use locator_cli::{
    command::{self, Command, HELP},
    logging,
};
use locator_controller::{
    config::TeachConfig,
    deck::Deck,
    geometry::format_coordinate,
    session::{HeldItem, Outcome, TeachSession},
    setup::spawn_setup,
    simulated::SimulatedGateway,
};
use std::{io::Write, time::Duration};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version)]
struct Args {
    /// Deck layout to teach
    #[arg()]
    layout: String,

    /// Teaching configuration, json or yaml
    #[arg(short, long)]
    config: Option<String>,

    /// Where save writes, defaults to the layout file
    #[arg(short, long)]
    output: Option<String>,

    /// Number of pipetting channels of the simulated robot
    #[arg(long, default_value_t = 8)]
    channels: usize,

    /// Log as json lines
    #[arg(long)]
    json_logs: bool,

    /// Sets the level of verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::setup_tracing(args.verbose, args.json_logs);

    let config = match &args.config {
        Some(path) => TeachConfig::load(path)?,
        None => TeachConfig::included(),
    };
    let deck = Deck::load_json(&args.layout)?;
    if deck.tip_racks().next().is_none() {
        warn!("Layout contains no tip racks, resources can not be taught");
    }
    if deck.plates().all(|plate| !plate.is_located()) {
        warn!("Layout contains no located plates, paths can not be taught");
    }
    let output = args.output.clone().unwrap_or_else(|| args.layout.clone());

    println!("Setting up robot...");
    let simulated =
        SimulatedGateway::new(args.channels).with_setup_delay(Duration::from_millis(500));
    let gateway = tokio::select! {
        ready = spawn_setup(Box::new(simulated)).wait() => ready?,
        _ = tokio::signal::ctrl_c() => {
            info!("Detected Ctrl+c during setup");
            return Ok(());
        }
    };
    println!(
        "Warning: moves are not checked for collisions, keep the deck clear.\nType help for commands."
    );
    warn!("Collision checking is not implemented");

    let mut session = TeachSession::new(gateway, deck, config)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Detected Ctrl+c");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        let command = match command::parse(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("{}", err);
                continue;
            }
        };
        if let Err(err) = execute(&mut session, command, &output).await {
            println!("Error: {:?}", err);
        }
    }

    let held = session.held_item();
    if held != HeldItem::None {
        warn!("Exiting while holding {}", held);
    }
    Ok(())
}

async fn execute(session: &mut TeachSession, command: Command, output: &str) -> Result<()> {
    match command {
        Command::Dispatch(action) => match session.dispatch(action).await {
            Ok(outcome) => print_outcome(session, outcome),
            Err(err) if err.is_ignorable() => println!("Nothing selected"),
            Err(err) => return Err(err.into()),
        },
        Command::Press(id) => {
            let control = session
                .controls()
                .into_iter()
                .find(|control| control.id == id);
            match control {
                Some(control) if control.enabled => {
                    let outcome = session.dispatch(control.action).await?;
                    print_outcome(session, outcome);
                }
                Some(control) => println!("{} is disabled", control.label),
                None => println!("No control {:?}", id),
            }
        }
        Command::Code => println!("{}", session.generate_transfer_specification()),
        Command::Controls => {
            for control in session.controls() {
                let marker = if control.enabled { " " } else { "x" };
                println!("[{}] {:<28} {}", marker, control.id, control.label);
            }
        }
        Command::Status => print_status(session),
        Command::Save(path) => {
            let path = path.as_deref().unwrap_or(output);
            session.save(path)?;
            println!("Saved {}", path);
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
    Ok(())
}

fn print_outcome(session: &TeachSession, outcome: Outcome) {
    match outcome {
        Outcome::Done => print_status(session),
        Outcome::Moved(position) => println!("{}", format_coordinate(&position)),
        Outcome::Taught { resource, location } => println!(
            "{} is at {} relative to its parent",
            resource,
            format_coordinate(&location)
        ),
        Outcome::WaypointAdded(index) => println!("Added point {}", index),
        Outcome::WaypointRemoved(point) => {
            println!("Removed point {}", format_coordinate(&point))
        }
        Outcome::Transfer(specification) => println!("{}", specification),
    }
}

fn print_status(session: &TeachSession) {
    let mode = session
        .mode()
        .map(|mode| mode.to_string())
        .unwrap_or_else(|| "none".to_owned());
    let position = session
        .position()
        .map(|position| format_coordinate(&position))
        .unwrap_or_else(|| "unknown".to_owned());
    let jog = session.jog();
    println!(
        "mode: {}, holding: {}, position: {}, step: {} mm{}",
        mode,
        session.held_item(),
        position,
        jog.step(),
        if jog.is_locked() { ", locked" } else { "" }
    );
}
