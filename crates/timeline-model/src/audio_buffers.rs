//! Planar floating-point audio.

/// `channels × frames` samples, one `Vec` per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffers {
    data: Vec<Vec<f32>>,
    frames: usize,
}

impl AudioBuffers {
    /// Zero-filled buffers.
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            data: vec![vec![0.0; frames]; channels],
            frames,
        }
    }

    pub fn silent(channels: usize, frames: usize) -> Self {
        Self::new(channels, frames)
    }

    /// Build from per-channel sample vectors, which must all be the same length.
    pub fn from_channels(data: Vec<Vec<f32>>) -> Self {
        let frames = data.first().map(Vec::len).unwrap_or(0);
        assert!(
            data.iter().all(|c| c.len() == frames),
            "channels must have equal length"
        );
        Self { data, frames }
    }

    pub fn channels(&self) -> usize {
        self.data.len()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.data[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.data[index]
    }

    /// Change the frame count; new frames are silent.
    pub fn set_frames(&mut self, frames: usize) {
        for channel in &mut self.data {
            channel.resize(frames, 0.0);
        }
        self.frames = frames;
    }

    /// Grow (never shrink) to hold at least `frames`.
    pub fn ensure_size(&mut self, frames: usize) {
        if frames > self.frames {
            self.set_frames(frames);
        }
    }

    pub fn make_silent(&mut self) {
        for channel in &mut self.data {
            channel.fill(0.0);
        }
    }

    /// Zero `frames` samples starting at `offset`.
    pub fn make_silent_range(&mut self, offset: usize, frames: usize) {
        assert!(offset + frames <= self.frames);
        for channel in &mut self.data {
            channel[offset..offset + frames].fill(0.0);
        }
    }

    /// Overwrite `frames` samples at `write_offset` with `src` from `read_offset`.
    pub fn copy_from(
        &mut self,
        src: &AudioBuffers,
        frames: usize,
        read_offset: usize,
        write_offset: usize,
    ) {
        assert_eq!(src.channels(), self.channels(), "channel count mismatch");
        assert!(read_offset + frames <= src.frames);
        assert!(write_offset + frames <= self.frames);
        for (dst, from) in self.data.iter_mut().zip(&src.data) {
            dst[write_offset..write_offset + frames]
                .copy_from_slice(&from[read_offset..read_offset + frames]);
        }
    }

    /// Move `frames` samples from index `from` to index `to` within this buffer.
    pub fn move_frames(&mut self, from: usize, to: usize, frames: usize) {
        if frames == 0 {
            return;
        }
        assert!(from + frames <= self.frames && to + frames <= self.frames);
        for channel in &mut self.data {
            channel.copy_within(from..from + frames, to);
        }
    }

    /// Mix `frames` samples of `src` (from `read_offset`) into this buffer at `write_offset`.
    pub fn accumulate_frames(
        &mut self,
        src: &AudioBuffers,
        frames: usize,
        read_offset: usize,
        write_offset: usize,
    ) {
        assert_eq!(src.channels(), self.channels(), "channel count mismatch");
        assert!(read_offset + frames <= src.frames);
        assert!(write_offset + frames <= self.frames);
        for (dst, from) in self.data.iter_mut().zip(&src.data) {
            for (d, s) in dst[write_offset..write_offset + frames]
                .iter_mut()
                .zip(&from[read_offset..read_offset + frames])
            {
                *d += *s;
            }
        }
    }

    /// Add one channel of `src` into one channel of this buffer, scaled.
    pub fn accumulate_channel(
        &mut self,
        src: &AudioBuffers,
        from_channel: usize,
        to_channel: usize,
        gain: f32,
    ) {
        let frames = self.frames.min(src.frames);
        let from = &src.data[from_channel][..frames];
        for (d, s) in self.data[to_channel][..frames].iter_mut().zip(from) {
            *d += *s * gain;
        }
    }

    /// Append all of `other` to the end.
    pub fn append(&mut self, other: &AudioBuffers) {
        assert_eq!(other.channels(), self.channels(), "channel count mismatch");
        for (dst, from) in self.data.iter_mut().zip(&other.data) {
            dst.extend_from_slice(from);
        }
        self.frames += other.frames;
    }

    /// Drop the first `frames` samples.
    pub fn trim_start(&mut self, frames: usize) {
        assert!(frames <= self.frames);
        for channel in &mut self.data {
            channel.drain(..frames);
        }
        self.frames -= frames;
    }

    /// Copy of `frames` samples starting at `offset`.
    pub fn slice(&self, offset: usize, frames: usize) -> AudioBuffers {
        assert!(offset + frames <= self.frames);
        Self {
            data: self
                .data
                .iter()
                .map(|c| c[offset..offset + frames].to_vec())
                .collect(),
            frames,
        }
    }

    /// Multiply every sample by the linear equivalent of `db`.
    pub fn apply_gain(&mut self, db: f64) {
        let linear = 10f64.powf(db / 20.0) as f32;
        for channel in &mut self.data {
            for sample in channel.iter_mut() {
                *sample *= linear;
            }
        }
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.data
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}
