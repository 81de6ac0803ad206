//! Drives a [`Player`] into a [`J2kEncoder`] until the timeline is done.

use cadence_common::CadenceResult;
use cadence_model::DcpTime;
use cadence_player::{Player, PlayerVideo};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::encoder::J2kEncoder;

type Pending = Arc<Mutex<VecDeque<(Arc<PlayerVideo>, DcpTime)>>>;

/// Owns the player and feeds each emitted frame to the encoder in order.
pub struct Transcoder {
    player: Player,
    encoder: Arc<J2kEncoder>,
    pending: Pending,
}

impl Transcoder {
    pub fn new(mut player: Player, encoder: Arc<J2kEncoder>) -> Self {
        let pending: Pending = Arc::new(Mutex::new(VecDeque::new()));
        let sink = pending.clone();
        player.on_video(move |video, time| sink.lock().push_back((video, time)));
        Self {
            player,
            encoder,
            pending,
        }
    }

    pub fn player_mut(&mut self) -> &mut Player {
        &mut self.player
    }

    pub fn encoder(&self) -> &Arc<J2kEncoder> {
        &self.encoder
    }

    /// Run the whole timeline through the encoder.
    ///
    /// The encoder is always ended, even after a failure, so every frame that
    /// made it into the queue is written.
    pub fn run(&mut self) -> CadenceResult<()> {
        self.encoder.begin()?;
        let result = self.pump();
        let ended = self.encoder.end();
        tracing::info!(
            frames = self.encoder.frames_done(),
            ok = result.is_ok(),
            "Transcode finished"
        );
        result.and(ended)
    }

    fn pump(&mut self) -> CadenceResult<()> {
        loop {
            let done = self.player.pass()?;
            // Take the batch first; encode() may block on a full queue.
            let batch: Vec<_> = self.pending.lock().drain(..).collect();
            for (video, time) in batch {
                self.encoder.encode(video, time)?;
            }
            if done {
                return Ok(());
            }
        }
    }
}
