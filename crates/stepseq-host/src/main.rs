//! stepseq: headless grid step sequencer driving external MIDI gear

mod console;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use stepseq_core::{NoteSink, SequencerConfig};
use stepseq_services::{
    config_path, input_port_names, load_config, output_port_names, LoggingSink, MidiInputListener, MidirSink,
    SequencerEngine, ThreadClock,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use console::Action;

#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    dry_run: bool,
    list_ports: bool,
}

fn parse_options() -> Result<Options> {
    let mut options = Options::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                options.config = Some(args.next().context("--config needs a path")?.into());
            }
            "--dry-run" => options.dry_run = true,
            "--list-ports" => options.list_ports = true,
            other => bail!("unknown argument '{other}'\nusage: stepseq [--config PATH] [--dry-run] [--list-ports]"),
        }
    }
    Ok(options)
}

fn list_ports() -> Result<()> {
    println!("outputs:");
    for (idx, name) in output_port_names()?.iter().enumerate() {
        println!("  {idx}: {name}");
    }
    println!("inputs:");
    for (idx, name) in input_port_names()?.iter().enumerate() {
        println!("  {idx}: {name}");
    }
    Ok(())
}

fn open_sink(config: &SequencerConfig, dry_run: bool) -> Result<Box<dyn NoteSink>> {
    if dry_run {
        info!("Dry run, notes are logged only");
        return Ok(Box::new(LoggingSink::new(config.outputs.len().max(1))));
    }
    let sink = MidirSink::connect(&config.outputs).context("opening MIDI outputs")?;
    Ok(Box::new(sink))
}

fn run_console(engine: &SequencerEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    println!("{}", console::HELP);

    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        match console::parse_line(&line) {
            Ok(None) => {}
            Ok(Some(Action::Engine(command))) => engine.submit(command)?,
            Ok(Some(Action::Show)) => {
                if let Some(snapshot) = engine.snapshot() {
                    println!("{}", serde_json::to_string_pretty(&snapshot)?);
                }
            }
            Ok(Some(Action::Grid)) => {
                if let Some(snapshot) = engine.snapshot() {
                    print!("{}", console::render_grid(&snapshot));
                }
            }
            Ok(Some(Action::Help)) => println!("{}", console::HELP),
            Ok(Some(Action::Quit)) => break,
            Err(e) => println!("error: {e:#}"),
        }
        stdout.flush()?;
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("stepseq=debug".parse()?))
        .init();

    let options = parse_options()?;
    if options.list_ports {
        return list_ports();
    }

    let path = options.config.unwrap_or_else(config_path);
    let config = load_config(&path).with_context(|| format!("loading {}", path.display()))?;
    info!(bpm = config.bpm, steps = config.steps, tracks = config.tracks.len(), "Starting stepseq");

    let sink = open_sink(&config, options.dry_run)?;
    let mut engine = SequencerEngine::new(&config, sink, Box::new(ThreadClock::new()))
        .context("building sequencer")?;

    // Recording and note learning need an input; playback works without one
    let _input = if options.dry_run {
        None
    } else {
        match MidiInputListener::connect(config.input.as_deref(), engine.commands()) {
            Ok(listener) => Some(listener),
            Err(e) => {
                warn!("No MIDI input: {e}");
                None
            }
        }
    };

    engine.start()?;
    let result = run_console(&engine);
    engine.stop()?;
    info!("Bye");
    result
}
