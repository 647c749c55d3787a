//! Arpeggiator: cycles a fixed offset shape above the last played grid note

use crate::midi::MAX_PITCH;

/// Minor-triad-like default shape
pub const DEFAULT_ARP_OFFSETS: [i8; 3] = [3, 5, 8];

#[derive(Debug, Clone)]
pub struct Arpeggiator {
    enabled: bool,
    offsets: Vec<i8>,
    root: Option<u8>,
    cursor: usize,
}

impl Default for Arpeggiator {
    fn default() -> Self {
        Self::new(DEFAULT_ARP_OFFSETS.to_vec())
    }
}

impl Arpeggiator {
    /// An empty offset list falls back to the default shape
    pub fn new(offsets: Vec<i8>) -> Self {
        let offsets = if offsets.is_empty() { DEFAULT_ARP_OFFSETS.to_vec() } else { offsets };
        Self {
            enabled: false,
            offsets,
            root: None,
            cursor: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn offsets(&self) -> &[i8] {
        &self.offsets
    }

    pub fn root(&self) -> Option<u8> {
        self.root
    }

    /// Restart the shape on `root_pitch`
    pub fn reload(&mut self, root_pitch: u8) {
        self.root = Some(root_pitch);
        self.cursor = 0;
    }

    /// Next pitch of the shape, or None while disabled or before any root was played
    pub fn next(&mut self) -> Option<u8> {
        if !self.enabled {
            return None;
        }
        let root = self.root?;
        let offset = self.offsets[self.cursor];
        self.cursor = (self.cursor + 1) % self.offsets.len();
        Some((root as i16 + offset as i16).clamp(0, MAX_PITCH as i16) as u8)
    }
}
