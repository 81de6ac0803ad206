//! Routing stream channels onto output channels.

use cadence_model::{AudioBuffers, AudioMapping};

/// Mix `input` into `output_channels` channels according to `mapping`.
pub fn remap(input: &AudioBuffers, output_channels: usize, mapping: &AudioMapping) -> AudioBuffers {
    let mut out = AudioBuffers::silent(output_channels, input.frames());
    let inputs = input.channels().min(mapping.input_channels());
    let outputs = output_channels.min(mapping.output_channels());
    for i in 0..inputs {
        for o in 0..outputs {
            let gain = mapping.get(i, o);
            if gain != 0.0 {
                out.accumulate_channel(input, i, o, gain);
            }
        }
    }
    out
}
