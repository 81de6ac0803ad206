//! Mixing of overlapping audio on the output timeline.
//!
//! Pieces push blocks at output positions; where blocks overlap their samples
//! are summed. The player pulls everything that ends before the point all
//! streams have reached, so audio leaves the merger in timeline order.

use cadence_model::{AudioBuffers, DcpTime, Frame};

#[derive(Debug)]
struct Buffer {
    frame: Frame,
    audio: AudioBuffers,
}

impl Buffer {
    fn end(&self) -> Frame {
        self.frame + self.audio.frames() as Frame
    }
}

/// Sorted, non-overlapping blocks of mixed audio awaiting emission.
#[derive(Debug)]
pub struct AudioMerger {
    frame_rate: u32,
    buffers: Vec<Buffer>,
}

impl AudioMerger {
    pub fn new(frame_rate: u32) -> Self {
        Self {
            frame_rate,
            buffers: Vec::new(),
        }
    }

    fn rate(&self) -> f64 {
        f64::from(self.frame_rate)
    }

    /// Mix `audio` in at output time `time`. Panics on an empty block.
    pub fn push(&mut self, audio: AudioBuffers, time: DcpTime) {
        assert!(!audio.is_empty(), "empty audio pushed to merger");
        let start = time.frames_round(self.rate());
        let end = start + audio.frames() as Frame;

        for buffer in &mut self.buffers {
            let from = start.max(buffer.frame);
            let to = end.min(buffer.end());
            if from < to {
                buffer.audio.accumulate_frames(
                    &audio,
                    (to - from) as usize,
                    (from - start) as usize,
                    (from - buffer.frame) as usize,
                );
            }
        }

        // Parts not already covered become new buffers.
        let mut fresh = Vec::new();
        let mut cursor = start;
        for buffer in &self.buffers {
            if buffer.end() <= cursor {
                continue;
            }
            if buffer.frame >= end {
                break;
            }
            if buffer.frame > cursor {
                fresh.push((cursor, buffer.frame));
            }
            cursor = cursor.max(buffer.end());
        }
        if cursor < end {
            fresh.push((cursor, end));
        }
        for (from, to) in fresh {
            self.buffers.push(Buffer {
                frame: from,
                audio: audio.slice((from - start) as usize, (to - from) as usize),
            });
        }

        self.buffers.sort_by_key(|b| b.frame);
        self.coalesce();
    }

    fn coalesce(&mut self) {
        let mut merged: Vec<Buffer> = Vec::with_capacity(self.buffers.len());
        for buffer in self.buffers.drain(..) {
            match merged.last_mut() {
                Some(last) if last.end() == buffer.frame => last.audio.append(&buffer.audio),
                _ => merged.push(buffer),
            }
        }
        self.buffers = merged;
    }

    /// Remove and return all audio before `time`, earliest first.
    pub fn pull(&mut self, time: DcpTime) -> Vec<(AudioBuffers, DcpTime)> {
        let rate = self.rate();
        let to = time.frames_floor(rate);
        let mut out = Vec::new();
        let mut keep = Vec::new();

        for mut buffer in self.buffers.drain(..) {
            if buffer.end() <= to {
                out.push((buffer.audio, DcpTime::from_frames(buffer.frame, rate)));
            } else if buffer.frame < to {
                let head = (to - buffer.frame) as usize;
                out.push((
                    buffer.audio.slice(0, head),
                    DcpTime::from_frames(buffer.frame, rate),
                ));
                buffer.audio.trim_start(head);
                buffer.frame = to;
                keep.push(buffer);
            } else {
                keep.push(buffer);
            }
        }

        self.buffers = keep;
        out
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
