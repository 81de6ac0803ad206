//! Audio half of a decoder implementation.

use crate::stream::{AudioDecoderStream, ContentAudio};
use cadence_model::{AudioBuffers, AudioContent, ContentTime};

/// One [`AudioDecoderStream`] per audio stream of a piece of content.
///
/// Decoder implementations feed raw blocks in with [`emit`](Self::emit) and
/// forward whatever comes out; the output is resampled and stamped with
/// frame indices at the content's resampled rate.
pub struct AudioDecoder {
    streams: Vec<AudioDecoderStream>,
    ignore: bool,
}

impl AudioDecoder {
    pub fn new(content: &AudioContent, resampled_rate: u32) -> Self {
        Self {
            streams: content
                .streams
                .iter()
                .map(|s| AudioDecoderStream::new(s.frame_rate, resampled_rate, s.channels))
                .collect(),
            ignore: false,
        }
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn stream_mut(&mut self, index: usize) -> Option<&mut AudioDecoderStream> {
        self.streams.get_mut(index)
    }

    pub fn set_ignore(&mut self) {
        self.ignore = true;
    }

    /// Feed a raw block for `stream`; returns the audio now ready for it.
    pub fn emit(
        &mut self,
        stream: usize,
        data: AudioBuffers,
        time: ContentTime,
    ) -> Option<ContentAudio> {
        if self.ignore {
            return None;
        }
        let Some(target) = self.streams.get_mut(stream) else {
            tracing::warn!(stream, "Audio for unknown stream dropped");
            return None;
        };
        target.audio(data, time);
        target.take_decoded()
    }

    /// End of input: drain resampler tails.
    pub fn flush(&mut self) -> Vec<(usize, ContentAudio)> {
        if self.ignore {
            return Vec::new();
        }
        self.streams
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| {
                s.flush();
                s.take_decoded().map(|audio| (i, audio))
            })
            .collect()
    }

    pub fn seek(&mut self, time: ContentTime, accurate: bool) {
        for stream in &mut self.streams {
            stream.seek(time, accurate);
        }
    }

    /// Earliest "next sample" time across streams that have started.
    pub fn position(&self) -> Option<ContentTime> {
        self.streams
            .iter()
            .filter_map(|s| {
                s.position()
                    .map(|p| ContentTime::from_frames(p, f64::from(s.target_rate())))
            })
            .min()
    }
}
