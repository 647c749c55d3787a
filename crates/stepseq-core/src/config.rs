//! Sequencer setup: tempo, grid geometry and the static track mapping

use serde::{Deserialize, Serialize};

use crate::arpeggiator::DEFAULT_ARP_OFFSETS;
use crate::error::{Result, SequencerError};
use crate::midi::{MAX_CHANNEL, MAX_PITCH};
use crate::transport::{MAX_BPM, MIN_BPM};

/// General MIDI percussion channel (0-based)
pub const DRUM_CHANNEL: u8 = 9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Tempo in BPM
    pub bpm: f64,
    /// Step capacity of every track
    pub steps: usize,
    pub steps_per_beat: u32,
    /// Arpeggiator ticks per step
    pub arp_subdivision: u32,
    /// Note-on velocity for programmed and arpeggiated notes
    pub velocity: u8,
    /// Pending commands kept between ticks before the oldest is dropped
    pub command_queue_capacity: usize,
    /// MIDI output port name patterns; entry N becomes device N
    pub outputs: Vec<String>,
    /// MIDI input port name pattern used for recording and note learning
    pub input: Option<String>,
    pub tracks: Vec<TrackConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    pub name: String,
    /// Index into `outputs`
    pub device: usize,
    pub channel: u8,
    pub note: u8,
    /// Looper tracks capture external notes while recording
    pub looper: bool,
    pub arpeggiator: ArpConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArpConfig {
    pub enabled: bool,
    pub offsets: Vec<i8>,
}

impl Default for ArpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            offsets: DEFAULT_ARP_OFFSETS.to_vec(),
        }
    }
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            device: 0,
            channel: DRUM_CHANNEL,
            note: 36,
            looper: false,
            arpeggiator: ArpConfig::default(),
        }
    }
}

impl TrackConfig {
    pub fn new(name: impl Into<String>, channel: u8, note: u8) -> Self {
        Self {
            name: name.into(),
            channel,
            note,
            ..Default::default()
        }
    }

    pub fn looper(mut self) -> Self {
        self.looper = true;
        self
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        let drums = [
            ("kick", 36),
            ("snare", 38),
            ("clap", 39),
            ("closed hat", 42),
            ("floor tom", 43),
            ("open hat", 46),
            ("high tom", 50),
        ];
        let mut tracks: Vec<TrackConfig> = drums
            .iter()
            .map(|&(name, note)| TrackConfig::new(name, DRUM_CHANNEL, note))
            .collect();
        tracks.push(TrackConfig::new("looper", DRUM_CHANNEL, 75).looper());

        Self {
            bpm: 140.0,
            steps: 32,
            steps_per_beat: 4,
            arp_subdivision: 4,
            velocity: 127,
            command_queue_capacity: 256,
            outputs: Vec::new(),
            input: None,
            tracks,
        }
    }
}

impl SequencerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tracks.is_empty() {
            return Err(SequencerError::config("at least one track is required"));
        }
        if self.steps == 0 || self.steps_per_beat == 0 {
            return Err(SequencerError::config("steps and steps_per_beat must be positive"));
        }
        if !(MIN_BPM..=MAX_BPM).contains(&self.bpm) {
            return Err(SequencerError::config(format!("bpm {} out of range {MIN_BPM}..={MAX_BPM}", self.bpm)));
        }
        if self.arp_subdivision == 0 {
            return Err(SequencerError::config("arp_subdivision must be positive"));
        }
        if self.velocity == 0 || self.velocity > MAX_PITCH {
            return Err(SequencerError::config(format!("velocity {} out of range 1..=127", self.velocity)));
        }
        if self.command_queue_capacity == 0 {
            return Err(SequencerError::config("command_queue_capacity must be positive"));
        }

        for (idx, track) in self.tracks.iter().enumerate() {
            let label = if track.name.is_empty() { format!("#{idx}") } else { track.name.clone() };
            if track.channel > MAX_CHANNEL {
                return Err(SequencerError::config(format!("track {label}: channel {} out of range", track.channel)));
            }
            if track.note > MAX_PITCH {
                return Err(SequencerError::config(format!("track {label}: note {} out of range", track.note)));
            }
            if !self.outputs.is_empty() && track.device >= self.outputs.len() {
                return Err(SequencerError::config(format!(
                    "track {label}: device {} not among {} outputs",
                    track.device,
                    self.outputs.len()
                )));
            }
            if track.arpeggiator.offsets.is_empty() {
                return Err(SequencerError::config(format!("track {label}: arpeggiator offsets are empty")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mapping() {
        let config = SequencerConfig::default();
        config.validate().unwrap();
        let notes: Vec<u8> = config.tracks.iter().map(|t| t.note).collect();
        assert_eq!(notes, vec![36, 38, 39, 42, 43, 46, 50, 75]);
        assert!(config.tracks.iter().all(|t| t.channel == DRUM_CHANNEL));
        assert_eq!(config.tracks.iter().filter(|t| t.looper).count(), 1);
    }

    #[test]
    fn test_rejects_bad_assignment() {
        let mut config = SequencerConfig::default();
        config.tracks[0].channel = 16;
        assert!(matches!(config.validate(), Err(SequencerError::Configuration(_))));

        let mut config = SequencerConfig::default();
        config.outputs = vec!["synth".into()];
        config.tracks[2].device = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let mut config = SequencerConfig::default();
        config.steps = 0;
        assert!(config.validate().is_err());

        let mut config = SequencerConfig::default();
        config.tracks.clear();
        assert!(config.validate().is_err());

        let mut config = SequencerConfig::default();
        config.bpm = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bpm_range() {
        for bpm in [1e-20, 0.5, 1000.0, f64::INFINITY] {
            let config = SequencerConfig { bpm, ..Default::default() };
            assert!(matches!(config.validate(), Err(SequencerError::Configuration(_))), "bpm {bpm}");
        }
        for bpm in [1.0, 999.0] {
            SequencerConfig { bpm, ..Default::default() }.validate().unwrap();
        }
    }
}
