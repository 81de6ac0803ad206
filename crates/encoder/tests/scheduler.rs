//! Scheduler behaviour with a recording writer and a scripted frame encoder.

use cadence_common::{CadenceError, CadenceResult, EncoderConfig};
use cadence_encoder::{
    DcpVideo, EncodeServerDescription, EncoderState, FrameEncoder, J2kEncoder, ServerFinder,
    ServerList, ServersChanged, Subscription, Transcoder, Writer,
};
use cadence_model::{
    Content, ContentTime, DcpTime, Eyes, Frame, Image, OutputSettings, PixelFormat, Playlist,
    Size, VideoContent,
};
use cadence_player::{
    ContentVideo, Decoder, DecoderCapabilities, DecoderEvent, DecoderFactory, EncodedData,
    PassReason, Player, PlayerVideo,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const RATE: u32 = 24;

fn at(frame: Frame) -> DcpTime {
    DcpTime::from_frames(frame, f64::from(RATE))
}

fn frame(value: u8) -> Arc<PlayerVideo> {
    let image = Arc::new(Image::filled(
        PixelFormat::Rgb24,
        Size::new(4, 4),
        &[value, 0, 0],
    ));
    Arc::new(PlayerVideo::black(image, Eyes::Both))
}

fn config(local_threads: usize) -> EncoderConfig {
    EncoderConfig {
        master_encoding_threads: local_threads,
        only_servers_encode: false,
        remote_backoff_step_ms: 1,
        remote_backoff_max_ms: 5,
        history_size: 50,
    }
}

#[derive(Default)]
struct RecordingWriter {
    written: Mutex<Vec<(Frame, EncodedData)>>,
    faked: Mutex<Vec<Frame>>,
    repeated: Mutex<Vec<Frame>>,
    threads: Mutex<Vec<usize>>,
    fake_frames: HashSet<Frame>,
    allow_repeat: bool,
    failure: Mutex<Option<String>>,
}

impl RecordingWriter {
    fn written_frames(&self) -> Vec<Frame> {
        let mut frames: Vec<Frame> = self.written.lock().iter().map(|(f, _)| *f).collect();
        frames.sort_unstable();
        frames
    }
}

impl Writer for RecordingWriter {
    fn can_fake_write(&self, frame: Frame) -> bool {
        self.fake_frames.contains(&frame)
    }

    fn fake_write(&self, frame: Frame, _eyes: Eyes) {
        self.faked.lock().push(frame);
    }

    fn write(&self, data: EncodedData, frame: Frame, _eyes: Eyes) {
        self.written.lock().push((frame, data));
    }

    fn can_repeat(&self, _frame: Frame) -> bool {
        self.allow_repeat
    }

    fn repeat(&self, frame: Frame, _eyes: Eyes) {
        self.repeated.lock().push(frame);
    }

    fn rethrow(&self) -> CadenceResult<()> {
        match self.failure.lock().take() {
            Some(message) => Err(CadenceError::writer(message)),
            None => Ok(()),
        }
    }

    fn set_encoder_threads(&self, threads: usize) {
        self.threads.lock().push(threads);
    }
}

#[derive(Default)]
struct ScriptedEncoder {
    delay: Duration,
    fail_locally_at: Option<Frame>,
    remote_failures: AtomicUsize,
    local_calls: AtomicUsize,
    remote_calls: AtomicUsize,
}

impl ScriptedEncoder {
    fn compressed(job: &DcpVideo) -> EncodedData {
        EncodedData::new(vec![job.index() as u8])
    }
}

impl FrameEncoder for ScriptedEncoder {
    fn encode_locally(&self, job: &DcpVideo) -> CadenceResult<EncodedData> {
        self.local_calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        if self.fail_locally_at == Some(job.index()) {
            return Err(CadenceError::encode(format!("frame {} is corrupt", job.index())));
        }
        Ok(Self::compressed(job))
    }

    fn encode_remotely(
        &self,
        job: &DcpVideo,
        server: &EncodeServerDescription,
    ) -> anyhow::Result<EncodedData> {
        self.remote_calls.fetch_add(1, Ordering::SeqCst);
        let fail = self
            .remote_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            anyhow::bail!("{} refused the connection", server.host);
        }
        Ok(Self::compressed(job))
    }
}

fn build(
    config: EncoderConfig,
    writer: &Arc<RecordingWriter>,
    frame_encoder: &Arc<ScriptedEncoder>,
    servers: &ServerList,
) -> Arc<J2kEncoder> {
    cadence_common::logging::init_default_logging();
    J2kEncoder::new(
        config,
        writer.clone(),
        frame_encoder.clone(),
        Arc::new(servers.clone()),
        RATE,
    )
}

#[test]
fn encodes_every_frame_once() {
    let writer = Arc::new(RecordingWriter::default());
    let frame_encoder = Arc::new(ScriptedEncoder::default());
    let encoder = build(config(2), &writer, &frame_encoder, &ServerList::new());

    encoder.begin().unwrap();
    assert_eq!(encoder.worker_count(), 2);
    for n in 0..20 {
        encoder.encode(frame(n as u8), at(n)).unwrap();
    }
    assert_eq!(encoder.video_frames_enqueued(), 19);
    encoder.end().unwrap();

    assert_eq!(writer.written_frames(), (0..20).collect::<Vec<_>>());
    assert_eq!(encoder.frames_done(), 20);
    assert_eq!(encoder.state(), EncoderState::Stopped);
    assert_eq!(*writer.threads.lock(), vec![2]);
}

#[test]
fn producer_is_held_back_by_a_full_queue() {
    let writer = Arc::new(RecordingWriter::default());
    let frame_encoder = Arc::new(ScriptedEncoder {
        delay: Duration::from_millis(15),
        ..Default::default()
    });
    let encoder = build(config(1), &writer, &frame_encoder, &ServerList::new());

    encoder.begin().unwrap();
    for n in 0..12 {
        encoder.encode(frame(n as u8), at(n)).unwrap();
        assert!(encoder.queue_len() <= 3, "queue grew to {}", encoder.queue_len());
    }
    encoder.end().unwrap();
    assert_eq!(writer.written_frames().len(), 12);
}

#[test]
fn identical_frames_are_repeated() {
    let writer = Arc::new(RecordingWriter {
        allow_repeat: true,
        ..Default::default()
    });
    let frame_encoder = Arc::new(ScriptedEncoder::default());
    let encoder = build(config(1), &writer, &frame_encoder, &ServerList::new());

    encoder.begin().unwrap();
    let still = frame(7);
    for n in 0..3 {
        encoder.encode(still.clone(), at(n)).unwrap();
    }
    // Same pixels in a different allocation still count as a repeat.
    encoder.encode(frame(7), at(3)).unwrap();
    encoder.encode(frame(8), at(4)).unwrap();
    encoder.end().unwrap();

    assert_eq!(writer.written_frames(), vec![0, 4]);
    assert_eq!(*writer.repeated.lock(), vec![1, 2, 3]);
}

#[test]
fn repeats_need_the_writers_consent() {
    let writer = Arc::new(RecordingWriter::default());
    let frame_encoder = Arc::new(ScriptedEncoder::default());
    let encoder = build(config(1), &writer, &frame_encoder, &ServerList::new());

    encoder.begin().unwrap();
    let still = frame(7);
    for n in 0..3 {
        encoder.encode(still.clone(), at(n)).unwrap();
    }
    encoder.end().unwrap();

    assert_eq!(writer.written_frames(), vec![0, 1, 2]);
    assert!(writer.repeated.lock().is_empty());
}

#[test]
fn fake_writes_skip_encoding() {
    let writer = Arc::new(RecordingWriter {
        fake_frames: [0, 1].into_iter().collect(),
        ..Default::default()
    });
    let frame_encoder = Arc::new(ScriptedEncoder::default());
    let encoder = build(config(2), &writer, &frame_encoder, &ServerList::new());

    encoder.begin().unwrap();
    for n in 0..4 {
        encoder.encode(frame(n as u8), at(n)).unwrap();
    }
    encoder.end().unwrap();

    assert_eq!(*writer.faked.lock(), vec![0, 1]);
    assert_eq!(writer.written_frames(), vec![2, 3]);
    assert_eq!(frame_encoder.local_calls.load(Ordering::SeqCst), 2);
    assert_eq!(encoder.frames_done(), 4);
}

#[test]
fn precompressed_frames_pass_through() {
    let writer = Arc::new(RecordingWriter::default());
    let frame_encoder = Arc::new(ScriptedEncoder::default());
    let encoder = build(config(1), &writer, &frame_encoder, &ServerList::new());

    let data = EncodedData::new(vec![0xff, 0x4f, 0xff, 0x51]);
    let mut video = (*frame(1)).clone();
    video.encoded = Some(data.clone());

    encoder.begin().unwrap();
    encoder.encode(Arc::new(video), at(0)).unwrap();
    encoder.end().unwrap();

    assert_eq!(*writer.written.lock(), vec![(0, data)]);
    assert_eq!(frame_encoder.local_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn flaky_server_loses_no_frames() {
    let writer = Arc::new(RecordingWriter::default());
    let frame_encoder = Arc::new(ScriptedEncoder {
        remote_failures: AtomicUsize::new(5),
        ..Default::default()
    });
    let servers = ServerList::with_servers(vec![EncodeServerDescription::new("render-01", 2)]);
    let encoder = build(
        EncoderConfig {
            only_servers_encode: true,
            ..config(0)
        },
        &writer,
        &frame_encoder,
        &servers,
    );

    encoder.begin().unwrap();
    assert_eq!(encoder.worker_count(), 2);
    for n in 0..10 {
        encoder.encode(frame(n as u8), at(n)).unwrap();
    }
    encoder.end().unwrap();

    // Each frame written exactly once, whoever ended up encoding it.
    assert_eq!(writer.written_frames(), (0..10).collect::<Vec<_>>());
    assert!(frame_encoder.remote_calls.load(Ordering::SeqCst) >= 10);
    assert_eq!(frame_encoder.remote_failures.load(Ordering::SeqCst), 0);
}

#[test]
fn local_failure_is_reported() {
    let writer = Arc::new(RecordingWriter::default());
    let frame_encoder = Arc::new(ScriptedEncoder {
        fail_locally_at: Some(3),
        ..Default::default()
    });
    let encoder = build(config(1), &writer, &frame_encoder, &ServerList::new());

    encoder.begin().unwrap();
    for n in 0..10 {
        if encoder.encode(frame(n as u8), at(n)).is_err() {
            break;
        }
    }
    // The failed frame is still queued, so finishing fails again.
    assert!(encoder.end().is_err());
    assert!(!writer.written_frames().contains(&3));
    assert_eq!(encoder.state(), EncoderState::Stopped);
}

#[test]
fn server_changes_rebuild_the_pool() {
    let writer = Arc::new(RecordingWriter::default());
    let frame_encoder = Arc::new(ScriptedEncoder::default());
    let servers = ServerList::new();
    let encoder = build(config(1), &writer, &frame_encoder, &servers);

    encoder.begin().unwrap();
    assert_eq!(encoder.worker_count(), 1);
    assert_eq!(servers.subscriber_count(), 1);

    servers.add_server(EncodeServerDescription::new("render-01", 3));
    assert_eq!(encoder.worker_count(), 4);
    assert_eq!(*writer.threads.lock(), vec![1, 4]);

    for n in 0..8 {
        encoder.encode(frame(n as u8), at(n)).unwrap();
    }
    encoder.end().unwrap();

    assert_eq!(writer.written_frames(), (0..8).collect::<Vec<_>>());
    assert_eq!(servers.subscriber_count(), 0);
    assert_eq!(encoder.worker_count(), 0);
}

#[test]
fn config_change_rebuilds_a_running_pool() {
    let writer = Arc::new(RecordingWriter::default());
    let frame_encoder = Arc::new(ScriptedEncoder::default());
    let encoder = build(config(1), &writer, &frame_encoder, &ServerList::new());

    encoder.set_config(config(2)).unwrap();
    assert_eq!(encoder.worker_count(), 0);

    encoder.begin().unwrap();
    assert_eq!(encoder.worker_count(), 2);
    encoder.set_config(config(3)).unwrap();
    assert_eq!(encoder.worker_count(), 3);
    encoder.end().unwrap();
}

#[test]
fn invalid_config_is_refused() {
    let writer = Arc::new(RecordingWriter::default());
    let frame_encoder = Arc::new(ScriptedEncoder::default());
    let no_step = EncoderConfig {
        remote_backoff_step_ms: 0,
        ..config(1)
    };

    let encoder = build(no_step.clone(), &writer, &frame_encoder, &ServerList::new());
    let err = encoder.begin().unwrap_err();
    assert!(matches!(err, CadenceError::Config { .. }), "{err}");
    assert_eq!(encoder.state(), EncoderState::Idle);

    let encoder = build(config(1), &writer, &frame_encoder, &ServerList::new());
    encoder.begin().unwrap();
    let err = encoder.set_config(no_step).unwrap_err();
    assert!(matches!(err, CadenceError::Config { .. }), "{err}");
    assert_eq!(encoder.worker_count(), 1);
    encoder.end().unwrap();
}

#[test]
fn writer_failure_reaches_the_producer() {
    let writer = Arc::new(RecordingWriter::default());
    let frame_encoder = Arc::new(ScriptedEncoder::default());
    let encoder = build(config(1), &writer, &frame_encoder, &ServerList::new());

    encoder.begin().unwrap();
    encoder.encode(frame(0), at(0)).unwrap();
    *writer.failure.lock() = Some("disk full".to_string());
    let err = encoder.encode(frame(1), at(1)).unwrap_err();
    assert!(matches!(err, CadenceError::Writer { .. }), "{err}");

    encoder.encode(frame(1), at(1)).unwrap();
    encoder.end().unwrap();
    assert_eq!(writer.written_frames(), vec![0, 1]);
}

#[test]
fn producer_waits_for_a_server_when_only_servers_encode() {
    let writer = Arc::new(RecordingWriter::default());
    let frame_encoder = Arc::new(ScriptedEncoder::default());
    let servers = ServerList::new();
    let encoder = build(
        EncoderConfig {
            only_servers_encode: true,
            ..config(4)
        },
        &writer,
        &frame_encoder,
        &servers,
    );

    encoder.begin().unwrap();
    assert_eq!(encoder.worker_count(), 0);
    // One job may wait in the queue with nobody to take it.
    encoder.encode(frame(0), at(0)).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let producer = {
        let encoder = encoder.clone();
        let done = done.clone();
        std::thread::spawn(move || {
            let result = encoder.encode(frame(1), at(1));
            done.store(true, Ordering::SeqCst);
            result
        })
    };

    std::thread::sleep(Duration::from_millis(50));
    assert!(!done.load(Ordering::SeqCst), "encode returned with no workers");

    servers.add_server(EncodeServerDescription::new("render-01", 1));
    producer.join().unwrap().unwrap();
    assert!(done.load(Ordering::SeqCst));
    encoder.end().unwrap();

    assert_eq!(writer.written_frames(), vec![0, 1]);
    assert_eq!(*writer.threads.lock(), vec![0, 1]);
    assert_eq!(frame_encoder.local_calls.load(Ordering::SeqCst), 0);
}

/// A finder that keeps calling its subscriber after the subscription is
/// dropped.
#[derive(Default)]
struct LateFinder {
    servers: Mutex<Vec<EncodeServerDescription>>,
    callback: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
}

impl LateFinder {
    fn announce(&self, server: EncodeServerDescription) {
        self.servers.lock().push(server);
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl ServerFinder for LateFinder {
    fn servers(&self) -> Vec<EncodeServerDescription> {
        self.servers.lock().clone()
    }

    fn subscribe(&self, callback: ServersChanged) -> Subscription {
        *self.callback.lock() = Some(Arc::from(callback));
        Subscription::detached()
    }
}

/// Announces a server the first time it is asked to encode locally.
struct AnnouncingEncoder {
    finder: Arc<LateFinder>,
    announced: AtomicBool,
}

impl FrameEncoder for AnnouncingEncoder {
    fn encode_locally(&self, job: &DcpVideo) -> CadenceResult<EncodedData> {
        if !self.announced.swap(true, Ordering::SeqCst) {
            self.finder
                .announce(EncodeServerDescription::new("render-late", 2));
        }
        Ok(ScriptedEncoder::compressed(job))
    }

    fn encode_remotely(
        &self,
        job: &DcpVideo,
        _server: &EncodeServerDescription,
    ) -> anyhow::Result<EncodedData> {
        Ok(ScriptedEncoder::compressed(job))
    }
}

#[test]
fn server_news_during_end_does_not_restart_workers() {
    cadence_common::logging::init_default_logging();
    let writer = Arc::new(RecordingWriter::default());
    let finder = Arc::new(LateFinder::default());
    let frame_encoder = Arc::new(AnnouncingEncoder {
        finder: finder.clone(),
        announced: AtomicBool::new(false),
    });
    let encoder = J2kEncoder::new(
        EncoderConfig {
            only_servers_encode: true,
            ..config(0)
        },
        writer.clone(),
        frame_encoder,
        finder.clone(),
        RATE,
    );

    encoder.begin().unwrap();
    encoder.encode(frame(0), at(0)).unwrap();
    // No workers, so end() encodes frame 0 itself and the server shows up meanwhile.
    encoder.end().unwrap();

    assert_eq!(finder.servers().len(), 1);
    assert_eq!(encoder.state(), EncoderState::Stopped);
    assert_eq!(encoder.worker_count(), 0);
    assert_eq!(*writer.threads.lock(), vec![0]);
    assert_eq!(writer.written_frames(), vec![0]);
}

#[test]
fn lifecycle_is_enforced() {
    let writer = Arc::new(RecordingWriter::default());
    let frame_encoder = Arc::new(ScriptedEncoder::default());
    let encoder = build(config(1), &writer, &frame_encoder, &ServerList::new());

    let err = encoder.encode(frame(0), at(0)).unwrap_err();
    assert!(matches!(err, CadenceError::InvalidState { .. }));
    assert_eq!(encoder.video_frames_enqueued(), 0);

    encoder.end().unwrap();
    assert_eq!(encoder.state(), EncoderState::Stopped);
    assert!(encoder.begin().is_err());
    assert!(encoder.end().is_err());
}

#[test]
fn dropping_a_running_encoder_stops_its_workers() {
    let writer = Arc::new(RecordingWriter::default());
    let frame_encoder = Arc::new(ScriptedEncoder::default());
    let servers = ServerList::with_servers(vec![EncodeServerDescription::new("render-01", 1)]);
    let encoder = build(config(2), &writer, &frame_encoder, &servers);

    encoder.begin().unwrap();
    for n in 0..3 {
        encoder.encode(frame(n as u8), at(n)).unwrap();
    }
    drop(encoder);

    assert_eq!(servers.subscriber_count(), 0);
    assert_eq!(servers.servers().len(), 1);
}

struct CountingDecoder {
    frames: Frame,
    next: Frame,
    position: ContentTime,
}

impl Decoder for CountingDecoder {
    fn capabilities(&self) -> DecoderCapabilities {
        DecoderCapabilities {
            video: true,
            ..Default::default()
        }
    }

    fn pass(&mut self, _reason: PassReason, events: &mut Vec<DecoderEvent>) -> CadenceResult<bool> {
        if self.next >= self.frames {
            return Ok(true);
        }
        let image = Arc::new(Image::filled(
            PixelFormat::Rgb24,
            Size::new(4, 4),
            &[self.next as u8, 0, 0],
        ));
        events.push(DecoderEvent::Video(ContentVideo::new(image, self.next)));
        self.position = ContentTime::from_frames(self.next, f64::from(RATE));
        self.next += 1;
        Ok(false)
    }

    fn seek(&mut self, time: ContentTime, _accurate: bool) -> CadenceResult<()> {
        self.next = time.frames_floor(f64::from(RATE));
        self.position = time;
        Ok(())
    }

    fn position(&self) -> ContentTime {
        self.position
    }
}

struct CountingFactory;

impl DecoderFactory for CountingFactory {
    fn create(&self, content: &Arc<Content>) -> Option<Box<dyn Decoder>> {
        Some(Box::new(CountingDecoder {
            frames: content.length.frames_round(f64::from(RATE)),
            next: 0,
            position: ContentTime::zero(),
        }))
    }
}

#[test]
fn transcoder_encodes_the_whole_timeline() {
    let mut clip = Content::new(
        "clip",
        DcpTime::zero(),
        ContentTime::from_frames(12, f64::from(RATE)),
    );
    clip.video = Some(VideoContent::new(Size::new(4, 4)));
    let output = OutputSettings {
        video_frame_rate: RATE,
        frame_size: Size::new(32, 16),
        ..Default::default()
    };
    let player = Player::new(
        output,
        Playlist::new(vec![Arc::new(clip)]),
        Arc::new(CountingFactory),
    )
    .unwrap();

    let writer = Arc::new(RecordingWriter::default());
    let frame_encoder = Arc::new(ScriptedEncoder::default());
    let encoder = build(config(2), &writer, &frame_encoder, &ServerList::new());

    let mut transcoder = Transcoder::new(player, encoder);
    transcoder.run().unwrap();

    assert_eq!(writer.written_frames(), (0..12).collect::<Vec<_>>());
    assert_eq!(transcoder.encoder().frames_done(), 12);
    assert_eq!(transcoder.encoder().state(), EncoderState::Stopped);
}
