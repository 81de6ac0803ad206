//! Optional whole-mix audio transforms.

use cadence_model::AudioBuffers;

/// A transform applied to the mixed output audio before it is merged.
pub trait AudioProcessor: Send {
    fn name(&self) -> &str;

    /// Process `input`, producing `channels` output channels.
    fn run(&mut self, input: &AudioBuffers, channels: usize) -> AudioBuffers;

    /// Forget internal state (after a seek).
    fn flush(&mut self);
}

/// Splits a stereo pair into side (L/R) and mid (centre) signals.
#[derive(Debug, Default)]
pub struct MidSideDecoder;

impl AudioProcessor for MidSideDecoder {
    fn name(&self) -> &str {
        "mid-side"
    }

    fn run(&mut self, input: &AudioBuffers, channels: usize) -> AudioBuffers {
        let mut out = AudioBuffers::silent(channels, input.frames());
        if input.channels() == 0 {
            return out;
        }
        let right_channel = if input.channels() > 1 { 1 } else { 0 };
        let used = channels.min(3);
        for n in 0..input.frames() {
            let left = input.channel(0)[n];
            let right = input.channel(right_channel)[n];
            let mid = (left + right) / 2.0;
            let values = [left - mid, right - mid, mid];
            for (c, value) in values.iter().enumerate().take(used) {
                out.channel_mut(c)[n] = *value;
            }
        }
        out
    }

    fn flush(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mid_side_split() {
        let input = AudioBuffers::from_channels(vec![vec![1.0], vec![0.0]]);
        let out = MidSideDecoder.run(&input, 6);
        assert_eq!(out.channel(0), &[0.5]);
        assert_eq!(out.channel(1), &[-0.5]);
        assert_eq!(out.channel(2), &[0.5]);
        assert_eq!(out.channel(3), &[0.0]);
    }
}
