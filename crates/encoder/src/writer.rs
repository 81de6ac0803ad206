//! Collaborators the scheduler hands work to.

use cadence_common::CadenceResult;
use cadence_model::{Eyes, Frame};
use cadence_player::EncodedData;

use crate::job::DcpVideo;
use crate::server::EncodeServerDescription;

/// Receives finished frames. Called from the producer and from every worker
/// thread, so implementations synchronize internally.
///
/// Frames may arrive out of order; putting them back in order is the
/// writer's job.
pub trait Writer: Send + Sync {
    /// Whether `frame` is already available from an earlier identical run.
    fn can_fake_write(&self, frame: Frame) -> bool;

    fn fake_write(&self, frame: Frame, eyes: Eyes);

    fn write(&self, data: EncodedData, frame: Frame, eyes: Eyes);

    /// Whether `frame` can be written as a copy of the previous frame.
    fn can_repeat(&self, frame: Frame) -> bool;

    fn repeat(&self, frame: Frame, eyes: Eyes);

    /// Surface any error the writer hit on its own threads.
    fn rethrow(&self) -> CadenceResult<()>;

    /// Told whenever the worker pool is rebuilt.
    fn set_encoder_threads(&self, threads: usize);
}

/// Compresses one frame, here or on an encode server.
pub trait FrameEncoder: Send + Sync {
    /// A failure here is fatal to the worker pool.
    fn encode_locally(&self, job: &DcpVideo) -> CadenceResult<EncodedData>;

    /// Failures are retried after a backoff. The call is expected to carry its
    /// own timeout.
    fn encode_remotely(
        &self,
        job: &DcpVideo,
        server: &EncodeServerDescription,
    ) -> anyhow::Result<EncodedData>;
}
