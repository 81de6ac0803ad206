//! The frame-encoding scheduler.
//!
//! ```text
//!              encode()                       ┌─ local worker ──┐
//!  producer ──────────────> [ job queue ] ───┼─ local worker ──┼──> Writer
//!     │  fake / passthrough /   ≤ 2W+1 jobs   └─ remote worker ─┘
//!     └─ repeat fast paths ─────────────────────────────────────────> Writer
//! ```
//!
//! One producer calls [`J2kEncoder::encode`] in output order; W worker
//! threads pop jobs and compress them locally or on an encode server. The
//! queue is the only shared mutable state, guarded by one mutex with two
//! condition variables: "became non-empty" wakes workers, "became non-full"
//! wakes the producer.

use cadence_common::{CadenceError, CadenceResult, EncoderConfig, EventHistory};
use cadence_model::{DcpTime, Eyes, Frame};
use cadence_player::PlayerVideo;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::backoff::{CancellationToken, RemoteBackoff};
use crate::job::DcpVideo;
use crate::server::{EncodeServerDescription, ServerFinder, Subscription};
use crate::writer::{FrameEncoder, Writer};

/// Lifecycle of a [`J2kEncoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    /// Created; no workers yet.
    Idle,
    /// Workers running, accepting frames.
    Running,
    /// `end()` in progress: no new frames, queue emptying.
    Draining,
    Stopped,
}

impl fmt::Display for EncoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EncoderState::Idle => "idle",
            EncoderState::Running => "running",
            EncoderState::Draining => "draining",
            EncoderState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// State shared between the producer and the workers.
struct Shared {
    queue: Mutex<VecDeque<DcpVideo>>,
    /// Signalled when the queue may have become non-empty.
    empty_condition: Condvar,
    /// Signalled when the queue may have become non-full.
    full_condition: Condvar,
    /// First fatal worker error, until someone rethrows it.
    error: Mutex<Option<CadenceError>>,
    writer: Arc<dyn Writer>,
    frame_encoder: Arc<dyn FrameEncoder>,
    history: Mutex<EventHistory>,
    frames_done: AtomicU64,
    /// Size of the current pool; sets the backpressure bound.
    pool_size: AtomicUsize,
    /// Worker threads that have not exited.
    live_workers: AtomicUsize,
}

impl Shared {
    fn frame_done(&self) {
        self.history.lock().event();
        self.frames_done.fetch_add(1, Ordering::Relaxed);
    }

    fn store_error(&self, error: CadenceError) {
        let mut stored = self.error.lock();
        if stored.is_none() {
            *stored = Some(error);
        }
    }

    fn has_error(&self) -> bool {
        self.error.lock().is_some()
    }

    fn rethrow(&self) -> CadenceResult<()> {
        match self.error.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn requeue(&self, job: DcpVideo) {
        self.queue.lock().push_front(job);
        self.empty_condition.notify_all();
    }
}

struct Worker {
    host: Option<String>,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Marks a worker as gone however its thread ends.
struct LiveGuard(Arc<Shared>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.live_workers.fetch_sub(1, Ordering::AcqRel);
        let _queue = self.0.queue.lock();
        self.0.full_condition.notify_all();
    }
}

/// Schedules frame compression across local threads and encode servers.
pub struct J2kEncoder {
    shared: Arc<Shared>,
    config: Mutex<EncoderConfig>,
    finder: Arc<dyn ServerFinder>,
    /// Held for the whole of a pool rebuild or teardown.
    workers: Mutex<Vec<Worker>>,
    subscription: Mutex<Option<Subscription>>,
    state: Mutex<EncoderState>,
    video_frame_rate: u32,
    last_player_video: Mutex<[Option<Arc<PlayerVideo>>; Eyes::COUNT]>,
    last_player_video_time: Mutex<Option<DcpTime>>,
}

impl J2kEncoder {
    pub fn new(
        config: EncoderConfig,
        writer: Arc<dyn Writer>,
        frame_encoder: Arc<dyn FrameEncoder>,
        finder: Arc<dyn ServerFinder>,
        video_frame_rate: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                empty_condition: Condvar::new(),
                full_condition: Condvar::new(),
                error: Mutex::new(None),
                writer,
                frame_encoder,
                history: Mutex::new(EventHistory::new(config.history_size)),
                frames_done: AtomicU64::new(0),
                pool_size: AtomicUsize::new(0),
                live_workers: AtomicUsize::new(0),
            }),
            config: Mutex::new(config),
            finder,
            workers: Mutex::new(Vec::new()),
            subscription: Mutex::new(None),
            state: Mutex::new(EncoderState::Idle),
            video_frame_rate,
            last_player_video: Mutex::new([None, None, None]),
            last_player_video_time: Mutex::new(None),
        })
    }

    /// Start the worker pool and follow changes to the server list.
    pub fn begin(self: &Arc<Self>) -> CadenceResult<()> {
        self.config.lock().validate()?;
        {
            let mut state = self.state.lock();
            if *state != EncoderState::Idle {
                return Err(CadenceError::invalid_state(format!(
                    "begin() on an encoder that is {state}"
                )));
            }
            *state = EncoderState::Running;
        }

        // Weak, so a pending notification cannot keep a dropped encoder alive.
        let weak = Arc::downgrade(self);
        let subscription = self.finder.subscribe(Box::new(move || {
            if let Some(encoder) = weak.upgrade() {
                if let Err(e) = encoder.servers_list_changed() {
                    tracing::error!(error = %e, "Failed to rebuild encoder pool");
                }
            }
        }));
        *self.subscription.lock() = Some(subscription);

        self.servers_list_changed()
    }

    /// Queue the frame at `time` for encoding.
    ///
    /// Must be called in output order. Blocks while the queue holds
    /// `2 × workers + 1` jobs.
    pub fn encode(&self, video: Arc<PlayerVideo>, time: DcpTime) -> CadenceResult<()> {
        let state = *self.state.lock();
        if state != EncoderState::Running {
            return Err(CadenceError::invalid_state(format!(
                "encode() on an encoder that is {state}"
            )));
        }

        let shared = &self.shared;
        let mut queue = shared.queue.lock();
        loop {
            // Allow one job in the queue even with no workers.
            let pool = shared.pool_size.load(Ordering::Acquire);
            if queue.len() < pool * 2 + 1 || shared.has_error() {
                break;
            }
            if pool == 0 {
                // Only servers encode and none are known yet; a pool rebuild wakes us.
                tracing::info!("No encoder threads; waiting for encode servers");
            } else if shared.live_workers.load(Ordering::Acquire) == 0 {
                return Err(CadenceError::thread("no encoder threads are running"));
            }
            tracing::trace!(queue = queue.len(), workers = pool, "Producer waiting for queue space");
            shared.full_condition.wait(&mut queue);
            tracing::trace!(queue = queue.len(), workers = pool, "Producer woken");
        }

        shared.writer.rethrow()?;
        shared.rethrow()?;

        let position = time.frames_floor(f64::from(self.video_frame_rate));
        let eyes = video.eyes;
        let mut last = self.last_player_video.lock();

        if shared.writer.can_fake_write(position) {
            tracing::debug!(frame = position, "Frame fake-written");
            shared.writer.fake_write(position, eyes);
            shared.frame_done();
        } else if let Some(encoded) = &video.encoded {
            tracing::debug!(frame = position, "Frame already compressed; written as-is");
            shared.writer.write(encoded.clone(), position, eyes);
        } else if last[eyes.index()]
            .as_ref()
            .is_some_and(|previous| shared.writer.can_repeat(position) && video.same(previous))
        {
            tracing::debug!(frame = position, "Frame repeats the previous one");
            shared.writer.repeat(position, eyes);
        } else {
            tracing::debug!(frame = position, queue = queue.len(), "Frame queued for encoding");
            queue.push_back(DcpVideo::new(
                video.clone(),
                position,
                self.video_frame_rate,
            ));
            shared.empty_condition.notify_all();
        }

        last[eyes.index()] = Some(video);
        *self.last_player_video_time.lock() = Some(time);
        Ok(())
    }

    /// Finish every queued frame, stop the workers and encode anything they
    /// left behind.
    pub fn end(&self) -> CadenceResult<()> {
        {
            let mut state = self.state.lock();
            match *state {
                EncoderState::Running => *state = EncoderState::Draining,
                EncoderState::Idle => {
                    *state = EncoderState::Stopped;
                    return Ok(());
                }
                other => {
                    return Err(CadenceError::invalid_state(format!(
                        "end() on an encoder that is {other}"
                    )))
                }
            }
        }

        let drained = self.drain();

        self.subscription.lock().take();
        tracing::info!("Terminating encoder threads");
        self.terminate_threads(&mut self.workers.lock());
        let drained = drained.and_then(|_| self.shared.rethrow());

        let mopped = self.mop_up();
        *self.state.lock() = EncoderState::Stopped;
        drained.and(mopped)
    }

    /// Keep waking workers until the queue is empty.
    fn drain(&self) -> CadenceResult<()> {
        let shared = &self.shared;
        let mut queue = shared.queue.lock();
        tracing::info!(queued = queue.len(), "Clearing queue");
        while !queue.is_empty() {
            shared.rethrow()?;
            if shared.live_workers.load(Ordering::Acquire) == 0 {
                // Nobody to drain it; the mop-up takes over.
                break;
            }
            shared.empty_condition.notify_all();
            shared.full_condition.wait(&mut queue);
        }
        Ok(())
    }

    /// Encode locally whatever workers left on the queue.
    ///
    /// A remote worker can pop the last job, fail, and put it back just as it
    /// is cancelled; this is where such jobs get done.
    fn mop_up(&self) -> CadenceResult<()> {
        let remaining: Vec<DcpVideo> = self.shared.queue.lock().drain(..).collect();
        tracing::info!(count = remaining.len(), "Mopping up");

        let mut first_error = None;
        for job in remaining {
            tracing::info!(frame = job.index(), "Encoding left-over frame");
            match self.shared.frame_encoder.encode_locally(&job) {
                Ok(data) => {
                    self.shared.writer.write(data, job.index(), job.eyes());
                    self.shared.frame_done();
                }
                Err(e) => {
                    tracing::error!(frame = job.index(), error = %e, "Local encode failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Cancel and join every worker in `workers`.
    fn terminate_threads(&self, workers: &mut Vec<Worker>) {
        let workers = std::mem::take(workers);
        self.shared.pool_size.store(0, Ordering::Release);
        for worker in &workers {
            worker.token.cancel();
        }
        {
            let _queue = self.shared.queue.lock();
            self.shared.empty_condition.notify_all();
        }

        let total = workers.len();
        for (n, worker) in workers.into_iter().enumerate() {
            let host = worker.host.as_deref().unwrap_or("localhost");
            tracing::debug!(thread = n + 1, of = total, host, "Terminating thread");
            if worker.handle.join().is_err() {
                tracing::error!(host, "Encoder thread panicked");
                self.shared
                    .store_error(CadenceError::thread(format!("encoder thread for {host} panicked")));
            }
        }
        if total > 0 {
            tracing::debug!(count = total, "Encoder threads terminated");
        }
    }

    /// Tear down the pool and build a new one from the configuration and
    /// the current server list. Does nothing unless the encoder is running.
    pub fn servers_list_changed(&self) -> CadenceResult<()> {
        let mut workers = self.workers.lock();
        if *self.state.lock() != EncoderState::Running {
            return Ok(());
        }

        self.terminate_threads(&mut workers);

        let config = self.config.lock().clone();
        let local = config.local_threads();
        for n in 0..local {
            workers.push(self.spawn_worker(None, &config, n)?);
        }

        let servers = self.finder.servers();
        for server in &servers {
            tracing::info!(host = %server.host, threads = server.threads, "Adding encode server");
            for n in 0..server.threads {
                workers.push(self.spawn_worker(Some(server.clone()), &config, n)?);
            }
        }

        let total = workers.len();
        self.shared.pool_size.store(total, Ordering::Release);
        self.shared.writer.set_encoder_threads(total);
        tracing::info!(
            local,
            remote = total - local,
            servers = servers.len(),
            "Encoder pool rebuilt"
        );

        let _queue = self.shared.queue.lock();
        self.shared.empty_condition.notify_all();
        self.shared.full_condition.notify_all();
        Ok(())
    }

    fn spawn_worker(
        &self,
        server: Option<EncodeServerDescription>,
        config: &EncoderConfig,
        n: usize,
    ) -> CadenceResult<Worker> {
        let host = server.as_ref().map(|s| s.host.clone());
        let name = format!("j2k-{}-{n}", host.as_deref().unwrap_or("local"));
        let token = CancellationToken::new();
        let backoff = RemoteBackoff::from_config(config);

        let shared = self.shared.clone();
        let worker_token = token.clone();
        shared.live_workers.fetch_add(1, Ordering::AcqRel);
        let spawned = std::thread::Builder::new()
            .name(name)
            .spawn(move || run_worker(shared, server, worker_token, backoff));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.live_workers.fetch_sub(1, Ordering::AcqRel);
                return Err(CadenceError::thread(format!("failed to start encoder thread: {e}")));
            }
        };

        Ok(Worker {
            host,
            token,
            handle,
        })
    }

    /// Replace the configuration; a running pool is rebuilt to match. An
    /// invalid configuration is refused and the old one kept.
    pub fn set_config(&self, config: EncoderConfig) -> CadenceResult<()> {
        config.validate()?;
        *self.config.lock() = config;
        self.servers_list_changed()
    }

    /// Frames finished per second, or 0 when not yet known.
    pub fn current_rate(&self) -> f32 {
        self.shared.history.lock().rate()
    }

    pub fn frames_done(&self) -> u64 {
        self.shared.frames_done.load(Ordering::Relaxed)
    }

    /// Index of the last frame handed to [`encode`](Self::encode).
    pub fn video_frames_enqueued(&self) -> Frame {
        self.last_player_video_time
            .lock()
            .map_or(0, |t| t.frames_floor(f64::from(self.video_frame_rate)))
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    pub fn state(&self) -> EncoderState {
        *self.state.lock()
    }
}

impl Drop for J2kEncoder {
    fn drop(&mut self) {
        self.subscription.get_mut().take();
        let mut workers = std::mem::take(self.workers.get_mut());
        self.terminate_threads(&mut workers);
    }
}

fn run_worker(
    shared: Arc<Shared>,
    server: Option<EncodeServerDescription>,
    token: CancellationToken,
    mut backoff: RemoteBackoff,
) {
    let _live = LiveGuard(shared.clone());
    let host = server.as_ref().map_or("localhost", |s| s.host.as_str());
    tracing::trace!(host, "Encoder thread started");

    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if token.is_cancelled() {
                    return;
                }
                if let Some(job) = queue.pop_front() {
                    break job;
                }
                shared.empty_condition.wait(&mut queue);
            }
        };

        // From here until the job is written or requeued we do not look at the token.
        tracing::trace!(host, frame = job.index(), eyes = ?job.eyes(), "Encoder popped frame");
        let encoded = match &server {
            Some(server) => match shared.frame_encoder.encode_remotely(&job, server) {
                Ok(data) => {
                    if backoff.succeeded() {
                        tracing::info!(host, "Encode server was lost but is back; removing backoff");
                    }
                    Some(data)
                }
                Err(e) => {
                    let error = CadenceError::remote_encode(host, format!("{e:#}"));
                    let backoff_ms = backoff.failed().as_millis() as u64;
                    tracing::error!(
                        frame = job.index(),
                        error = %error,
                        backoff_ms,
                        "Remote encode failed; thread sleeping"
                    );
                    None
                }
            },
            None => match shared.frame_encoder.encode_locally(&job) {
                Ok(data) => Some(data),
                Err(e) => {
                    tracing::error!(frame = job.index(), error = %e, "Local encode failed");
                    shared.requeue(job);
                    shared.store_error(e);
                    return;
                }
            },
        };

        match encoded {
            Some(data) => {
                shared.writer.write(data, job.index(), job.eyes());
                shared.frame_done();
            }
            None => {
                tracing::info!(host, frame = job.index(), "Pushing frame back onto queue after failure");
                shared.requeue(job);
            }
        }

        if backoff.is_backing_off() && !token.sleep(backoff.current()) {
            return;
        }

        let _queue = shared.queue.lock();
        shared.full_condition.notify_all();
    }
}
