//! Beat quantization of event offsets.

/// Snaps offsets to the nearest beat of a fixed tempo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantizer {
    bpm: f64,
}

impl Quantizer {
    /// Creates a quantizer for a tempo in beats per minute.
    ///
    /// # Returns
    ///
    /// None unless `bpm` is finite and positive
    pub fn new(bpm: f64) -> Option<Self> {
        (bpm.is_finite() && bpm > 0.0).then_some(Self { bpm })
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Length of one beat in milliseconds (`60000 / bpm`).
    pub fn beat_duration_ms(&self) -> f64 {
        60_000.0 / self.bpm
    }

    /// Rounds an offset to the nearest beat boundary, in whole milliseconds.
    pub fn quantize(&self, offset_ms: u64) -> u64 {
        let beat = self.beat_duration_ms();
        let beats = (offset_ms as f64 / beat).round();
        (beats * beat).round() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_tempo() {
        assert!(Quantizer::new(0.0).is_none());
        assert!(Quantizer::new(-120.0).is_none());
        assert!(Quantizer::new(f64::NAN).is_none());
    }

    #[test]
    fn test_snaps_to_nearest_beat() {
        // 120 BPM = 500ms per beat
        let q = Quantizer::new(120.0).unwrap();
        assert_eq!(q.beat_duration_ms(), 500.0);
        assert_eq!(q.quantize(0), 0);
        assert_eq!(q.quantize(249), 0);
        assert_eq!(q.quantize(250), 500);
        assert_eq!(q.quantize(730), 500);
        assert_eq!(q.quantize(1260), 1500);
    }

    #[test]
    fn test_fractional_beats_round_to_ms() {
        // 90 BPM = 666.67ms per beat
        let q = Quantizer::new(90.0).unwrap();
        assert_eq!(q.quantize(600), 667);
        assert_eq!(q.quantize(1400), 1333);
    }
}
