//! Gain matrix routing a stream's channels onto output channels.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioMapping {
    input_channels: usize,
    output_channels: usize,
    /// Row-major `input × output` gains.
    gains: Vec<f32>,
}

impl AudioMapping {
    /// A mapping that routes nothing.
    pub fn new(input_channels: usize, output_channels: usize) -> Self {
        Self {
            input_channels,
            output_channels,
            gains: vec![0.0; input_channels * output_channels],
        }
    }

    /// Channel N to channel N, for as many channels as both sides have.
    pub fn identity(input_channels: usize, output_channels: usize) -> Self {
        let mut mapping = Self::new(input_channels, output_channels);
        for c in 0..input_channels.min(output_channels) {
            mapping.set(c, c, 1.0);
        }
        mapping
    }

    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    pub fn get(&self, input: usize, output: usize) -> f32 {
        self.gains[input * self.output_channels + output]
    }

    pub fn set(&mut self, input: usize, output: usize, gain: f32) {
        self.gains[input * self.output_channels + output] = gain;
    }

    /// Output channels that receive anything at all.
    pub fn mapped_output_channels(&self) -> Vec<usize> {
        (0..self.output_channels)
            .filter(|&o| (0..self.input_channels).any(|i| self.get(i, o).abs() > 0.0))
            .collect()
    }
}
