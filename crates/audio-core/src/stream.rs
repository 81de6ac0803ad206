//! Per-stream audio buffering.
//!
//! An [`AudioDecoderStream`] sits between a decoder's raw audio output and its
//! consumers. It resamples to the target rate, stamps each sample with a frame
//! index by counting (decoder timestamps jitter; sample counts do not), lines
//! the first block after an accurate seek up with the seek target, and keeps a
//! bounded window of decoded audio that callers read from.
//!
//! ```text
//!   decoder ──raw──> [resampler] ──> decoded window ──get()/take_decoded()──>
//!                                    ^ frame            ^ position (next frame)
//! ```

use crate::resampler::{LinearResampler, Resampler};
use cadence_model::{AudioBuffers, ContentTime, Frame};

/// Seconds of output audio the window may hold before the oldest is dropped.
const MAX_BUFFERED_SECONDS: usize = 10;

/// A seek is forced when the requested window ends this many lengths past the buffer start.
const FAR_JUMP_FACTOR: Frame = 4;

/// Decoded audio tagged with the frame index (at the stream's target rate) of its first sample.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentAudio {
    pub audio: AudioBuffers,
    pub frame: Frame,
}

impl ContentAudio {
    pub fn new(audio: AudioBuffers, frame: Frame) -> Self {
        Self { audio, frame }
    }

    fn empty(channels: usize, frame: Frame) -> Self {
        Self::new(AudioBuffers::new(channels, 0), frame)
    }

    pub fn end(&self) -> Frame {
        self.frame + self.audio.frames() as Frame
    }
}

/// Something that can be asked to decode more audio.
pub trait AudioSource {
    /// Decode a little more, handing each raw block and its timestamp to
    /// `sink`. Returns true once the source is exhausted.
    fn pass(&mut self, sink: &mut dyn FnMut(AudioBuffers, ContentTime)) -> bool;

    fn seek(&mut self, time: ContentTime, accurate: bool);
}

pub struct AudioDecoderStream {
    target_rate: u32,
    channels: usize,
    resampler: Option<Box<dyn Resampler>>,
    decoded: ContentAudio,
    /// Frame index the next incoming sample will get; unknown until data arrives after a seek.
    position: Option<Frame>,
    /// Target of the last accurate seek, until the first block has been lined up with it.
    seek_reference: Option<ContentTime>,
}

impl AudioDecoderStream {
    /// A stream whose native rate is `stream_rate`, delivering at `target_rate`.
    pub fn new(stream_rate: u32, target_rate: u32, channels: usize) -> Self {
        let resampler = (stream_rate != target_rate).then(|| {
            Box::new(LinearResampler::new(stream_rate, target_rate, channels)) as Box<dyn Resampler>
        });
        Self::with_resampler(target_rate, channels, resampler)
    }

    /// A stream using a caller-supplied resampler (or none).
    pub fn with_resampler(
        target_rate: u32,
        channels: usize,
        resampler: Option<Box<dyn Resampler>>,
    ) -> Self {
        Self {
            target_rate,
            channels,
            resampler,
            decoded: ContentAudio::empty(channels, 0),
            position: None,
            seek_reference: None,
        }
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn position(&self) -> Option<Frame> {
        self.position
    }

    /// Frame index of the first buffered sample.
    pub fn buffer_start(&self) -> Frame {
        self.decoded.frame
    }

    pub fn buffered_frames(&self) -> usize {
        self.decoded.audio.frames()
    }

    fn max_buffered(&self) -> usize {
        MAX_BUFFERED_SECONDS * self.target_rate as usize
    }

    fn rate(&self) -> f64 {
        f64::from(self.target_rate)
    }

    /// Read `length` frames starting at `frame`, decoding from `source` as needed.
    ///
    /// With `accurate` the result starts exactly at `frame` (missing head
    /// samples are silence); otherwise whatever is buffered comes back, with
    /// its real start frame. Near the end of the source fewer frames may be
    /// returned.
    pub fn get(
        &mut self,
        source: &mut dyn AudioSource,
        frame: Frame,
        length: Frame,
        accurate: bool,
    ) -> ContentAudio {
        let end = frame + length;

        if frame < self.decoded.frame || end > self.decoded.frame + length * FAR_JUMP_FACTOR {
            let time = ContentTime::from_frames(frame, self.rate());
            tracing::debug!(
                frame,
                length,
                buffer_start = self.decoded.frame,
                "Audio request out of range; seeking"
            );
            self.seek(time, accurate);
            source.seek(time, accurate);
        }

        if accurate {
            while (self.decoded.frame > frame || self.decoded.end() < end) && !self.pull(source) {}
            self.copy_out_accurate(frame, length)
        } else {
            while (self.decoded.audio.frames() as Frame) < length && !self.pull(source) {}
            let frames = (length.max(0) as usize).min(self.decoded.audio.frames());
            let start = self.decoded.frame;
            let audio = self.decoded.audio.slice(0, frames);
            self.consume(frames);
            ContentAudio::new(audio, start)
        }
    }

    fn copy_out_accurate(&mut self, frame: Frame, length: Frame) -> ContentAudio {
        let end = frame + length;
        let available_end = self.decoded.end().min(end);
        let out_frames = (available_end - frame).clamp(0, length.max(0));
        let mut out = AudioBuffers::silent(self.channels, out_frames as usize);

        let copy_from = frame.max(self.decoded.frame);
        if available_end > copy_from {
            out.copy_from(
                &self.decoded.audio,
                (available_end - copy_from) as usize,
                (copy_from - self.decoded.frame) as usize,
                (copy_from - frame) as usize,
            );
        }

        let used = (end - self.decoded.frame).clamp(0, self.decoded.audio.frames() as Frame);
        self.consume(used as usize);
        ContentAudio::new(out, frame)
    }

    /// Drop `frames` from the front of the window, sliding the rest down.
    fn consume(&mut self, frames: usize) {
        let remaining = self.decoded.audio.frames() - frames;
        self.decoded.audio.move_frames(frames, 0, remaining);
        self.decoded.audio.set_frames(remaining);
        self.decoded.frame += frames as Frame;
    }

    fn pull(&mut self, source: &mut dyn AudioSource) -> bool {
        let done = source.pass(&mut |data, time| self.audio(data, time));
        if done {
            self.flush();
        }
        done
    }

    /// Accept a raw block from the decoder, stamped `time`.
    pub fn audio(&mut self, data: AudioBuffers, time: ContentTime) {
        let mut data = match self.resampler.as_mut() {
            Some(resampler) => resampler.run(&data),
            None => data,
        };
        if data.is_empty() {
            return;
        }

        let mut time = time;
        if let Some(reference) = self.seek_reference {
            let delta = (time - reference).frames_round(self.rate());
            if delta > 0 {
                // Data starts after the seek target: pad so it lines up.
                let mut padded = AudioBuffers::silent(self.channels, delta as usize);
                padded.append(&data);
                data = padded;
            } else if delta < 0 {
                let remove = (-delta) as usize;
                if remove >= data.frames() {
                    // Entirely before the target; wait for the next block.
                    return;
                }
                data.trim_start(remove);
            }
            time = reference;
            self.seek_reference = None;
        }

        if self.position.is_none() {
            self.position = Some(time.frames_round(self.rate()));
        }

        self.add(data);
    }

    fn add(&mut self, data: AudioBuffers) {
        let Some(position) = self.position else {
            return;
        };
        assert!(
            self.decoded.audio.is_empty() || position >= self.decoded.end(),
            "audio went backwards: position {} before buffered end {}",
            position,
            self.decoded.end()
        );

        if self.decoded.audio.is_empty() {
            self.decoded.frame = position;
        }
        self.position = Some(position + data.frames() as Frame);
        self.decoded.audio.append(&data);

        let max = self.max_buffered();
        let buffered = self.decoded.audio.frames();
        if buffered > max {
            let excess = buffered - max;
            tracing::trace!(excess, "Audio window full; dropping oldest samples");
            self.consume(excess);
        }
    }

    /// Drain resampler latency once the source has ended.
    pub fn flush(&mut self) {
        let tail = self.resampler.as_mut().and_then(|r| r.flush());
        if let Some(tail) = tail {
            self.add(tail);
        }
    }

    /// Forget everything buffered; remember `time` if the seek is accurate.
    pub fn seek(&mut self, time: ContentTime, accurate: bool) {
        self.decoded = ContentAudio::empty(self.channels, 0);
        self.position = None;
        self.seek_reference = accurate.then_some(time);
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }

    /// Hand everything buffered to a push-mode consumer.
    pub fn take_decoded(&mut self) -> Option<ContentAudio> {
        if self.decoded.audio.is_empty() {
            return None;
        }
        let next = ContentAudio::empty(self.channels, self.decoded.end());
        Some(std::mem::replace(&mut self.decoded, next))
    }
}
