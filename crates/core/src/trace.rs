//! Waveform capture for the oscilloscope view and headless runs.
//!
//! Keeps the most recent `capacity` ticks in a ring buffer, oldest first when
//! iterated, plus running totals that survive wraparound: ticks spent in
//! each state and the number of completed sequences.

use crate::controller::BurstState;

/// One captured tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceSample {
    pub tick: u64,
    pub tone_out: bool,
    /// Controller state at the start of the tick.
    pub state: BurstState,
}

/// Ring buffer of recent samples.
pub struct WaveformTrace {
    buf: Vec<Option<TraceSample>>,
    /// Write position (next slot to overwrite)
    write_pos: usize,
    /// Number of valid samples
    count: usize,
    /// Ticks observed per state, indexed by state code
    occupancy: [u64; 5],
    /// Transitions into Done
    completed: u64,
    last_state: Option<BurstState>,
}

impl WaveformTrace {
    pub fn new(capacity: usize) -> Self {
        WaveformTrace {
            buf: vec![None; capacity.max(1)],
            write_pos: 0,
            count: 0,
            occupancy: [0; 5],
            completed: 0,
            last_state: None,
        }
    }

    pub fn push(&mut self, sample: TraceSample) {
        self.buf[self.write_pos] = Some(sample);
        self.write_pos = (self.write_pos + 1) % self.buf.len();
        if self.count < self.buf.len() {
            self.count += 1;
        }
        self.occupancy[sample.state.code() as usize] += 1;
        if sample.state == BurstState::Done && self.last_state != Some(BurstState::Done) {
            self.completed += 1;
        }
        self.last_state = Some(sample.state);
    }

    /// Samples in capture order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TraceSample> + '_ {
        let cap = self.buf.len();
        let start = (self.write_pos + cap - self.count) % cap;
        (0..self.count).filter_map(move |i| self.buf[(start + i) % cap].as_ref())
    }

    /// Most recent sample.
    pub fn last(&self) -> Option<&TraceSample> {
        if self.count == 0 { return None; }
        let cap = self.buf.len();
        self.buf[(self.write_pos + cap - 1) % cap].as_ref()
    }

    pub fn len(&self) -> usize { self.count }

    pub fn is_empty(&self) -> bool { self.count == 0 }

    pub fn capacity(&self) -> usize { self.buf.len() }

    /// Ticks observed in `state` since the last clear.
    pub fn ticks_in(&self, state: BurstState) -> u64 {
        self.occupancy[state.code() as usize]
    }

    /// Sequences that reached Done since the last clear.
    pub fn completed(&self) -> u64 { self.completed }

    pub fn clear(&mut self) {
        for slot in self.buf.iter_mut() { *slot = None; }
        self.write_pos = 0;
        self.count = 0;
        self.occupancy = [0; 5];
        self.completed = 0;
        self.last_state = None;
    }

    /// Collapse the buffer into runs of identical (state, level).
    ///
    /// Returns `(state, tone_out, first_tick, length)` per run.
    pub fn runs(&self) -> Vec<(BurstState, bool, u64, u64)> {
        let mut runs: Vec<(BurstState, bool, u64, u64)> = Vec::new();
        for s in self.iter() {
            match runs.last_mut() {
                Some(r) if r.0 == s.state && r.1 == s.tone_out => r.3 += 1,
                _ => runs.push((s.state, s.tone_out, s.tick, 1)),
            }
        }
        runs
    }
}
