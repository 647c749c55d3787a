//! Line-oriented command console

use anyhow::{anyhow, bail, Context, Result};
use stepseq_core::{
    Command, DeviceId, InstrumentChoice, SequencerSnapshot, TrackId, TrackRenderState, TransportButton,
};

pub const HELP: &str = "\
commands:
  play | stop | rec           transport (play again to pause)
  step <track> <step>         press a step (toggle, or set length in length mode)
  len                         enter/leave step length select
  max <track> <steps>         set loop length
  mute <track>                toggle mute
  note <track> <pitch>        set note for new steps
  chan <track> <channel>      set MIDI channel (0-15)
  dev <track> <device>        set output device
  arp <track> on|off          arpeggiator
  lane <track> <lane>         select sub-lane for editing
  sel <track>                 select instrument (again to cancel)
  ok [pitch] [channel]        confirm instrument
  show                        print state as JSON
  grid                        print the grid
  quit";

/// A parsed console line
#[derive(Debug, PartialEq)]
pub enum Action {
    Engine(Command),
    Show,
    Grid,
    Help,
    Quit,
}

fn arg<T: std::str::FromStr>(args: &[&str], idx: usize, what: &str) -> Result<T> {
    let raw = args.get(idx).with_context(|| format!("missing {what}"))?;
    raw.parse().map_err(|_| anyhow!("invalid {what}: '{raw}'"))
}

fn opt_arg<T: std::str::FromStr>(args: &[&str], idx: usize, what: &str) -> Result<Option<T>> {
    args.get(idx).map(|_| arg(args, idx, what)).transpose()
}

fn track(args: &[&str]) -> Result<TrackId> {
    arg(args, 1, "track").map(TrackId)
}

pub fn parse_line(line: &str) -> Result<Option<Action>> {
    let args: Vec<&str> = line.split_whitespace().collect();
    let Some(&verb) = args.first() else {
        return Ok(None);
    };

    let command = match verb {
        "play" => Command::Transport(TransportButton::Play),
        "stop" => Command::Transport(TransportButton::Stop),
        "rec" => Command::Transport(TransportButton::Record),
        "step" => Command::StepPressed { track: track(&args)?, step: arg(&args, 2, "step")? },
        "len" => Command::StepLengthSelect,
        "max" => Command::SetMaxSteps { track: track(&args)?, steps: arg(&args, 2, "steps")? },
        "mute" => Command::ToggleMute { track: track(&args)? },
        "note" => Command::SetNote { track: track(&args)?, note: arg(&args, 2, "pitch")? },
        "chan" => Command::SetChannel { track: track(&args)?, channel: arg(&args, 2, "channel")? },
        "dev" => Command::SetDevice { track: track(&args)?, device: DeviceId(arg(&args, 2, "device")?) },
        "arp" => {
            let enabled = match args.get(2).copied() {
                Some("on") => true,
                Some("off") => false,
                _ => bail!("usage: arp <track> on|off"),
            };
            Command::SetArpeggiator { track: track(&args)?, enabled }
        }
        "lane" => Command::SelectLane { track: track(&args)?, lane: arg(&args, 2, "lane")? },
        "sel" => Command::SelectInstrument { track: track(&args)? },
        "ok" => Command::ConfirmInstrument(InstrumentChoice {
            device: None,
            channel: opt_arg(&args, 2, "channel")?,
            note: opt_arg(&args, 1, "pitch")?,
        }),
        "show" => return Ok(Some(Action::Show)),
        "grid" => return Ok(Some(Action::Grid)),
        "help" | "?" => return Ok(Some(Action::Help)),
        "quit" | "exit" => return Ok(Some(Action::Quit)),
        other => bail!("unknown command '{other}' (try 'help')"),
    };
    Ok(Some(Action::Engine(command)))
}

fn render_row(track: &TrackRenderState) -> String {
    let mut row = String::with_capacity(track.active.len() + track.active.len() / track.steps_per_beat.max(1));
    for (step, &active) in track.active.iter().enumerate() {
        if step > 0 && step % track.steps_per_beat.max(1) == 0 {
            row.push(' ');
        }
        row.push(match (active, step == track.cursor, step == track.max_step) {
            (_, _, true) => '|',
            (true, true, _) => '@',
            (true, false, _) => 'x',
            (false, true, _) => '>',
            (false, false, _) => '.',
        });
    }
    row
}

/// Grid as text: one row per track, `x` for active steps, `>`/`@` for the
/// cursor, `|` at the loop length marker
pub fn render_grid(snapshot: &SequencerSnapshot) -> String {
    let mut out = format!("{:?} {} ({:.0} bpm) {:?}\n", snapshot.phase, snapshot.position, snapshot.bpm, snapshot.input_mode);
    for (idx, track) in snapshot.tracks.iter().enumerate() {
        let flags = format!(
            "{}{}{}{}",
            if track.muted { 'M' } else { ' ' },
            if track.looper { 'L' } else { ' ' },
            if track.recording { 'R' } else { ' ' },
            if track.arp_enabled { 'A' } else { ' ' },
        );
        out.push_str(&format!(
            "{idx} {:<12} {flags} {} ch{:<2} n{:<3} {}\n",
            track.name,
            track.device,
            track.channel,
            track.note,
            render_row(track)
        ));
    }
    out
}
