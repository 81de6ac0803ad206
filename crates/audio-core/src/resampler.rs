//! Sample-rate conversion.

use cadence_model::AudioBuffers;

/// Streaming sample-rate converter.
///
/// Implementations may hold samples back between calls; `flush` returns
/// whatever is still owed once the input has ended.
pub trait Resampler: Send {
    fn run(&mut self, input: &AudioBuffers) -> AudioBuffers;

    /// Drain any held-back output. `None` when nothing is owed.
    fn flush(&mut self) -> Option<AudioBuffers>;

    /// Forget all history (after a seek).
    fn reset(&mut self);

    fn input_rate(&self) -> u32;
    fn output_rate(&self) -> u32;
}

/// Linear-interpolating resampler.
///
/// Output sample `k` sits at input position `k * in / out`, tracked with
/// integer arithmetic so that `S` input frames always produce exactly
/// `ceil(S * out / in)` output frames once flushed, however the input was
/// split into blocks.
pub struct LinearResampler {
    in_rate: u32,
    out_rate: u32,
    channels: usize,
    /// Input frames received since the last reset.
    consumed: u64,
    /// Output frames produced since the last reset.
    produced: u64,
    /// Input samples still needed, per channel, starting at input index `held_from`.
    held: Vec<Vec<f32>>,
    held_from: u64,
}

impl LinearResampler {
    pub fn new(in_rate: u32, out_rate: u32, channels: usize) -> Self {
        assert!(in_rate > 0 && out_rate > 0, "sample rates must be positive");
        tracing::debug!(in_rate, out_rate, channels, "Creating linear resampler");
        Self {
            in_rate,
            out_rate,
            channels,
            consumed: 0,
            produced: 0,
            held: vec![Vec::new(); channels],
            held_from: 0,
        }
    }

    /// Input index and fractional offset of output sample `k`.
    fn source_position(&self, k: u64) -> (u64, f32) {
        let num = u128::from(k) * u128::from(self.in_rate);
        let den = u128::from(self.out_rate);
        ((num / den) as u64, (num % den) as f32 / self.out_rate as f32)
    }

    fn sample(&self, channel: usize, index: u64, frac: f32) -> f32 {
        let held = &self.held[channel];
        let at = (index - self.held_from) as usize;
        let a = held[at];
        match held.get(at + 1) {
            Some(b) if frac > 0.0 => a + (b - a) * frac,
            _ => a,
        }
    }

    /// Produce output while `ready(index)` says the samples are there.
    fn produce(&mut self, ready: impl Fn(u64, u64) -> bool) -> AudioBuffers {
        let mut out = vec![Vec::new(); self.channels];
        loop {
            let (index, frac) = self.source_position(self.produced);
            if !ready(index, self.consumed) {
                break;
            }
            for (c, channel) in out.iter_mut().enumerate() {
                channel.push(self.sample(c, index, frac));
            }
            self.produced += 1;
        }

        // Drop input the next output sample no longer needs.
        let (next, _) = self.source_position(self.produced);
        let drop = next.saturating_sub(self.held_from).min(self.consumed - self.held_from);
        for channel in &mut self.held {
            channel.drain(..drop as usize);
        }
        self.held_from += drop;

        AudioBuffers::from_channels(out)
    }
}

impl Resampler for LinearResampler {
    fn run(&mut self, input: &AudioBuffers) -> AudioBuffers {
        assert_eq!(input.channels(), self.channels, "resampler channel mismatch");
        for (c, held) in self.held.iter_mut().enumerate() {
            held.extend_from_slice(input.channel(c));
        }
        self.consumed += input.frames() as u64;
        self.produce(|index, consumed| index + 1 < consumed)
    }

    fn flush(&mut self) -> Option<AudioBuffers> {
        let out = self.produce(|index, consumed| index < consumed);
        (!out.is_empty()).then_some(out)
    }

    fn reset(&mut self) {
        self.consumed = 0;
        self.produced = 0;
        self.held_from = 0;
        for channel in &mut self.held {
            channel.clear();
        }
    }

    fn input_rate(&self) -> u32 {
        self.in_rate
    }

    fn output_rate(&self) -> u32 {
        self.out_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ramp(channels: usize, frames: usize, start: usize) -> AudioBuffers {
        AudioBuffers::from_channels(
            (0..channels)
                .map(|_| (start..start + frames).map(|i| i as f32).collect())
                .collect(),
        )
    }

    fn total_output(resampler: &mut LinearResampler, blocks: &[usize]) -> usize {
        let mut total = 0;
        let mut start = 0;
        for &frames in blocks {
            total += resampler.run(&ramp(1, frames, start)).frames();
            start += frames;
        }
        total + resampler.flush().map(|b| b.frames()).unwrap_or(0)
    }

    #[test]
    fn test_upsample_interpolates_ramp() {
        let mut resampler = LinearResampler::new(1, 2, 1);
        let out = resampler.run(&ramp(1, 4, 0));
        assert_eq!(out.channel(0), &[0.0, 0.5, 1.0, 1.5, 2.0, 2.5]);
        let tail = resampler.flush().unwrap();
        assert_eq!(tail.channel(0), &[3.0, 3.0]);
    }

    #[test]
    fn test_downsample_picks_every_other() {
        let mut resampler = LinearResampler::new(2, 1, 1);
        let out = resampler.run(&ramp(1, 6, 0));
        assert_eq!(out.channel(0), &[0.0, 2.0, 4.0]);
        assert!(resampler.flush().is_none());
    }

    #[test]
    fn test_44k1_to_48k_count() {
        let mut resampler = LinearResampler::new(44_100, 48_000, 1);
        assert_eq!(total_output(&mut resampler, &[44_100]), 48_000);
    }

    #[test]
    fn test_reset_restarts_accounting() {
        let mut resampler = LinearResampler::new(44_100, 48_000, 1);
        resampler.run(&ramp(1, 1000, 0));
        resampler.reset();
        assert_eq!(total_output(&mut resampler, &[441]), 480);
    }

    proptest! {
        #[test]
        fn prop_block_split_does_not_change_count(
            blocks in prop::collection::vec(0usize..3000, 1..12),
            rates in prop::sample::select(vec![(44_100u32, 48_000u32), (48_000, 44_100), (32_000, 48_000), (96_000, 48_000), (48_000, 50_000)]),
        ) {
            let (input, output) = rates;
            let total_in: usize = blocks.iter().sum();
            let expected = (total_in as u64 * u64::from(output)).div_ceil(u64::from(input)) as usize;
            let mut resampler = LinearResampler::new(input, output, 1);
            prop_assert_eq!(total_output(&mut resampler, &blocks), expected);
        }

        #[test]
        fn prop_ramp_stays_monotonic(blocks in prop::collection::vec(1usize..500, 1..8)) {
            let mut resampler = LinearResampler::new(44_100, 48_000, 1);
            let mut start = 0;
            let mut last = f32::MIN;
            for frames in blocks {
                let out = resampler.run(&ramp(1, frames, start));
                start += frames;
                for &s in out.channel(0) {
                    prop_assert!(s >= last);
                    last = s;
                }
            }
        }
    }
}
