//! The timeline synchronizer.
//!
//! ```text
//!  piece A decoder ──┐                       ┌──> video callbacks  (one frame per output instant)
//!  piece B decoder ──┼── pass(): earliest ───┼──> audio callbacks  (mixed, in timeline order)
//!  black / silence ──┘   wins, is serviced   └──> subtitle callbacks (non-burnt periods)
//! ```
//!
//! Each [`Player::pass`] services exactly one source: whichever of the pieces,
//! the black filler or the silence filler is furthest behind. Video is gap
//! filled so every output frame instant is emitted once; audio goes through an
//! [`AudioMerger`] and is released only up to the point every active stream
//! has reached.

use cadence_audio::{remap, AudioMerger, AudioProcessor, ContentAudio};
use cadence_common::{CadenceError, CadenceResult};
use cadence_model::{
    merge, AudioBuffers, Content, ContentProperty, ContentTime, DcpTime, DcpTimePeriod, Eyes,
    Frame, Image, OutputSettings, Playlist, PlayerSubtitles, Position, PositionImage, Rect, Size,
    SubtitleContent, TextSubtitle,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::active_subtitles::ActiveSubtitles;
use crate::decoder::{
    ContentImageSubtitle, ContentTextSubtitle, ContentVideo, DecoderEvent, DecoderFactory,
    PassReason,
};
use crate::empty::Empty;
use crate::piece::{Piece, PieceRef};
use crate::player_video::PlayerVideo;

/// Longest block of silence emitted at once.
const SILENCE_BLOCK_SECONDS: f64 = 0.5;

/// Subtitle scales below this are treated as unset.
const SUBTITLE_SCALE_EPSILON: f64 = 1e-5;

/// Aspect adjustments closer to 1 than this are ignored.
const ASPECT_ADJUST_EPSILON: f64 = 1e-3;

pub type VideoCallback = Box<dyn FnMut(Arc<PlayerVideo>, DcpTime) + Send>;
pub type AudioCallback = Box<dyn FnMut(&AudioBuffers, DcpTime) + Send>;
pub type SubtitleCallback = Box<dyn FnMut(&PlayerSubtitles, DcpTimePeriod) + Send>;
/// Called with `frequent = true` for changes that arrive in bursts (e.g. dragging).
pub type ChangedCallback = Box<dyn FnMut(bool) + Send>;

/// Rasterizes text subtitles for burning in.
pub trait SubtitleRenderer: Send {
    fn render(&self, subtitles: &[TextSubtitle], container: Size, time: DcpTime)
        -> Vec<PositionImage>;
}

#[derive(Debug, Clone, Copy)]
struct StreamState {
    piece: PieceRef,
    stream: usize,
    /// End of the most recent audio pushed into the merger for this stream.
    last_push_end: DcpTime,
}

#[derive(Default)]
struct Callbacks {
    video: Vec<VideoCallback>,
    audio: Vec<AudioCallback>,
    subtitle: Vec<SubtitleCallback>,
    changed: Vec<ChangedCallback>,
}

enum Next {
    Piece(usize),
    Black,
    Silent,
}

pub struct Player {
    output: OutputSettings,
    playlist: Playlist,
    factory: Arc<dyn DecoderFactory>,

    pieces: Vec<Piece>,
    /// Bumped on every piece rebuild; stale [`PieceRef`]s resolve to nothing.
    generation: u64,
    have_valid_pieces: bool,

    video_container_size: Size,
    black_image: Arc<Image>,
    ignore_video: bool,
    ignore_subtitle: bool,
    always_burn_subtitles: bool,

    /// Time of the next video frame we expect to emit.
    last_video_time: Option<DcpTime>,
    /// Eyes of the next video frame we expect to emit.
    last_video_eyes: Option<Eyes>,
    last_video: HashMap<PieceRef, Arc<PlayerVideo>>,
    /// End of the last audio emitted.
    last_audio_time: Option<DcpTime>,

    stream_states: Vec<StreamState>,
    audio_merger: AudioMerger,
    audio_processor: Option<Box<dyn AudioProcessor>>,
    active_subtitles: ActiveSubtitles,
    subtitle_renderer: Option<Box<dyn SubtitleRenderer>>,

    black: Empty,
    silent: Empty,
    emitted_empty_frame: bool,

    events: Vec<DecoderEvent>,
    callbacks: Callbacks,
}

impl Player {
    /// Create a player positioned (accurately) at the start of the timeline.
    pub fn new(
        output: OutputSettings,
        playlist: Playlist,
        factory: Arc<dyn DecoderFactory>,
    ) -> CadenceResult<Self> {
        let mut player = Self {
            audio_merger: AudioMerger::new(output.audio_frame_rate),
            video_container_size: output.frame_size,
            black_image: PlayerVideo::black_image(output.frame_size),
            output,
            playlist,
            factory,
            pieces: Vec::new(),
            generation: 0,
            have_valid_pieces: false,
            ignore_video: false,
            ignore_subtitle: false,
            always_burn_subtitles: false,
            last_video_time: None,
            last_video_eyes: None,
            last_video: HashMap::new(),
            last_audio_time: None,
            stream_states: Vec::new(),
            audio_processor: None,
            active_subtitles: ActiveSubtitles::new(),
            subtitle_renderer: None,
            black: Empty::default(),
            silent: Empty::default(),
            emitted_empty_frame: false,
            events: Vec::new(),
            callbacks: Callbacks::default(),
        };
        player.seek(DcpTime::zero(), true)?;
        Ok(player)
    }

    pub fn output(&self) -> &OutputSettings {
        &self.output
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn video_container_size(&self) -> Size {
        self.video_container_size
    }

    /// Output length: the playlist rounded up to a whole frame.
    pub fn length(&self) -> DcpTime {
        self.output.length(&self.playlist)
    }

    // Callback registration ------------------------------------------------

    pub fn on_video(&mut self, callback: impl FnMut(Arc<PlayerVideo>, DcpTime) + Send + 'static) {
        self.callbacks.video.push(Box::new(callback));
    }

    pub fn on_audio(&mut self, callback: impl FnMut(&AudioBuffers, DcpTime) + Send + 'static) {
        self.callbacks.audio.push(Box::new(callback));
    }

    pub fn on_subtitle(
        &mut self,
        callback: impl FnMut(&PlayerSubtitles, DcpTimePeriod) + Send + 'static,
    ) {
        self.callbacks.subtitle.push(Box::new(callback));
    }

    pub fn on_changed(&mut self, callback: impl FnMut(bool) + Send + 'static) {
        self.callbacks.changed.push(Box::new(callback));
    }

    // Settings -------------------------------------------------------------

    pub fn set_video_container_size(&mut self, size: Size) {
        if size == self.video_container_size {
            return;
        }
        self.video_container_size = size;
        self.black_image = PlayerVideo::black_image(size);
        self.changed(false);
    }

    pub fn set_ignore_video(&mut self) {
        self.ignore_video = true;
        self.have_valid_pieces = false;
    }

    pub fn set_ignore_subtitle(&mut self) {
        self.ignore_subtitle = true;
        self.have_valid_pieces = false;
    }

    /// Burn every used subtitle, whatever its content says.
    pub fn set_always_burn_subtitles(&mut self, burn: bool) {
        self.always_burn_subtitles = burn;
    }

    pub fn set_audio_processor(&mut self, processor: Option<Box<dyn AudioProcessor>>) {
        self.audio_processor = processor;
    }

    pub fn set_subtitle_renderer(&mut self, renderer: Box<dyn SubtitleRenderer>) {
        self.subtitle_renderer = Some(renderer);
    }

    /// Replace the playlist; pieces are rebuilt on the next pass or seek.
    pub fn playlist_changed(&mut self, playlist: Playlist) {
        self.playlist = playlist;
        self.have_valid_pieces = false;
        self.changed(false);
    }

    pub fn content_changed(&mut self, property: ContentProperty, frequent: bool) {
        if property.requires_rebuild() {
            tracing::debug!(?property, "Content change invalidates pieces");
            self.have_valid_pieces = false;
        }
        self.changed(frequent);
    }

    pub fn output_changed(&mut self, output: OutputSettings) {
        self.audio_merger = AudioMerger::new(output.audio_frame_rate);
        self.output = output;
        self.have_valid_pieces = false;
        self.changed(false);
    }

    fn changed(&mut self, frequent: bool) {
        for callback in &mut self.callbacks.changed {
            callback(frequent);
        }
    }

    // Pieces ---------------------------------------------------------------

    fn setup_pieces(&mut self) {
        self.generation += 1;
        self.pieces.clear();
        self.last_video.clear();
        self.active_subtitles.clear();
        self.audio_merger.clear();

        for content in &self.playlist.content {
            let Some(mut decoder) = self.factory.create(content) else {
                tracing::warn!(content = %content.name, "No decoder for content; filling with black and silence");
                continue;
            };
            let capabilities = decoder.capabilities();
            if capabilities.video && self.ignore_video {
                decoder.set_ignore_video();
            }
            if capabilities.subtitle && self.ignore_subtitle {
                decoder.set_ignore_subtitle();
            }
            let frc = content.frame_rate_change(self.output.video_frame_rate);
            tracing::debug!(content = %content.name, frc = %frc.description(), "Adding piece");
            self.pieces.push(Piece::new(content.clone(), decoder, frc));
        }

        let generation = self.generation;
        self.stream_states = self
            .pieces
            .iter()
            .enumerate()
            .flat_map(|(index, piece)| {
                let streams = piece.content.audio.as_ref().map_or(0, |a| a.streams.len());
                (0..streams).map(move |stream| StreamState {
                    piece: PieceRef { generation, index },
                    stream,
                    last_push_end: piece.position(),
                })
            })
            .collect();

        // Content we could not decode is a gap like any other.
        let length = self.output.length(&self.playlist);
        let rate = self.output.video_frame_rate;
        let decoded = || self.pieces.iter().map(|p| p.content.as_ref());
        self.black = Empty::new(decoded(), length, rate, Content::has_video);
        self.silent = Empty::new(decoded(), length, rate, Content::has_audio);
        self.have_valid_pieces = true;
        tracing::debug!(pieces = self.pieces.len(), generation, "Pieces rebuilt");
    }

    fn piece_ref(&self, index: usize) -> PieceRef {
        PieceRef {
            generation: self.generation,
            index,
        }
    }

    fn piece(&self, piece: PieceRef) -> Option<&Piece> {
        if piece.generation != self.generation {
            return None;
        }
        self.pieces.get(piece.index)
    }

    fn one_video_frame(&self) -> DcpTime {
        self.output.one_video_frame()
    }

    fn black_player_video(&self, eyes: Eyes) -> Arc<PlayerVideo> {
        Arc::new(PlayerVideo::black(self.black_image.clone(), eyes))
    }

    // Driving --------------------------------------------------------------

    /// Service whichever source is furthest behind. Returns true when
    /// everything has been emitted.
    pub fn pass(&mut self) -> CadenceResult<bool> {
        if !self.have_valid_pieces {
            self.setup_pieces();
        }

        let mut earliest: Option<(usize, DcpTime)> = None;
        for (index, piece) in self.pieces.iter_mut().enumerate() {
            if piece.done {
                continue;
            }
            let time = piece.content_time_to_dcp(piece.decoder.position());
            if time > piece.end() {
                piece.done = true;
                continue;
            }
            // On a tie prefer the piece with subtitles so they arrive before the video they cover.
            let has_subtitle = piece.decoder.capabilities().subtitle;
            let better = match earliest {
                None => true,
                Some((_, best)) => time < best || (time == best && has_subtitle),
            };
            if better {
                earliest = Some((index, time));
            }
        }

        let mut next = earliest.map(|(index, time)| (Next::Piece(index), time));
        if !self.ignore_video
            && !self.black.done()
            && next.as_ref().map_or(true, |(_, t)| self.black.position() < *t)
        {
            next = Some((Next::Black, self.black.position()));
        }
        if !self.silent.done() && next.as_ref().map_or(true, |(_, t)| self.silent.position() < *t)
        {
            next = Some((Next::Silent, self.silent.position()));
        }

        let mut done = false;
        match next {
            Some((Next::Piece(index), _)) => self.pass_piece(index)?,
            Some((Next::Black, position)) => {
                let black = self.black_player_video(Eyes::Both);
                self.emit_video(black, position);
                self.black.set_position(position + self.one_video_frame());
            }
            Some((Next::Silent, _)) => match self.silent.period_at_position() {
                Some(mut period) => {
                    let one = self.one_video_frame();
                    if period.duration() > one {
                        period.to = period.from + one;
                    }
                    self.fill_audio(period);
                    self.silent.set_position(period.to);
                }
                None => {
                    tracing::warn!(position = %self.silent.position(), "Silence cursor outside any gap");
                    self.silent.set_position(DcpTime::max_value());
                }
            },
            None => {
                if self.length() == DcpTime::zero() && !self.emitted_empty_frame {
                    self.emitted_empty_frame = true;
                    let black = self.black_player_video(Eyes::Both);
                    self.emit_video(black, DcpTime::zero());
                } else {
                    done = true;
                }
            }
        }

        self.pull_audio();
        Ok(done)
    }

    fn pass_piece(&mut self, index: usize) -> CadenceResult<()> {
        let mut events = std::mem::take(&mut self.events);
        let piece = &mut self.pieces[index];
        let capabilities = piece.decoder.capabilities();
        let reason = if capabilities.video && !self.ignore_video {
            PassReason::Video
        } else if capabilities.audio {
            PassReason::Audio
        } else {
            PassReason::Subtitle
        };

        if piece.decoder.pass(reason, &mut events)? {
            piece.done = true;
        }

        let piece_ref = self.piece_ref(index);
        for event in events.drain(..) {
            match event {
                DecoderEvent::Video(video) => self.video(piece_ref, video),
                DecoderEvent::Audio { stream, audio } => self.audio(piece_ref, stream, audio)?,
                DecoderEvent::ImageSubtitleStart(subtitle) => {
                    self.image_subtitle_start(piece_ref, subtitle)
                }
                DecoderEvent::TextSubtitleStart(subtitle) => {
                    self.text_subtitle_start(piece_ref, subtitle)
                }
                DecoderEvent::SubtitleStop(to) => self.subtitle_stop(piece_ref, to),
            }
        }
        self.events = events;
        Ok(())
    }

    /// Release merged audio up to the point every unfinished stream has reached.
    fn pull_audio(&mut self) {
        let mut pull_to = self.length();
        for state in &self.stream_states {
            let active = self.piece(state.piece).is_some_and(|p| !p.done);
            if active && state.last_push_end < pull_to {
                pull_to = state.last_push_end;
            }
        }

        let rate = self.output.audio_frame_rate;
        for (audio, time) in self.audio_merger.pull(pull_to) {
            let (audio, time) = match self.last_audio_time {
                Some(last) if time < last => match discard_audio(audio, time, last, rate) {
                    Some(kept) => kept,
                    None => continue,
                },
                _ => (audio, time),
            };
            self.emit_audio(&audio, time);
        }
    }

    /// Reposition every piece so the next output starts at `time`.
    pub fn seek(&mut self, time: DcpTime, accurate: bool) -> CadenceResult<()> {
        if !self.have_valid_pieces {
            self.setup_pieces();
        }
        tracing::debug!(%time, accurate, "Seeking");

        if let Some(processor) = self.audio_processor.as_mut() {
            processor.flush();
        }
        self.audio_merger.clear();
        self.active_subtitles.clear();

        for piece in &mut self.pieces {
            let position = piece.position();
            if time < position {
                // Before this piece: get it ready to start from its beginning.
                let start = piece.dcp_to_content_time(position);
                piece.decoder.seek(start, true)?;
                piece.done = false;
            } else if time < piece.end() {
                let target = piece.dcp_to_content_time(time);
                piece.decoder.seek(target, accurate)?;
                piece.done = false;
            } else {
                piece.done = true;
            }
        }

        for state in &mut self.stream_states {
            let position = self
                .pieces
                .get(state.piece.index)
                .map_or(time, |p| p.position());
            state.last_push_end = time.max(position);
        }

        if accurate {
            self.last_video_time = Some(time);
            self.last_video_eyes = Some(Eyes::Left);
            self.last_audio_time = Some(time);
        } else {
            self.last_video_time = None;
            self.last_video_eyes = None;
            self.last_audio_time = None;
        }

        self.black.set_position(time);
        self.silent.set_position(time);
        self.last_video.clear();
        self.emitted_empty_frame = false;
        Ok(())
    }

    // Video ----------------------------------------------------------------

    fn video(&mut self, piece_ref: PieceRef, video: ContentVideo) {
        if self.ignore_video {
            return;
        }
        let Some(piece) = self.piece(piece_ref) else {
            return;
        };
        let frc = piece.frc;
        if frc.skip && video.frame % 2 == 1 {
            return;
        }

        let time = piece.content_video_to_dcp(video.frame);
        let position = piece.position();
        let end = piece.end();
        let content = piece.content.clone();
        let Some(video_content) = content.video.as_ref() else {
            tracing::warn!(content = %content.name, "Video from content without video; dropped");
            return;
        };

        // Already emitted (overlapping content, or before an accurate seek target).
        if self.last_video_time.is_some_and(|last| time < last) {
            return;
        }
        // Trimmed away.
        if time < position {
            return;
        }

        if let Some(last) = self.last_video_time {
            self.fill_video(piece_ref, last.max(position), time.min(end), video.eyes);
        }

        let cropped = video_content.crop.apply(video.image.size());
        let player_video = Arc::new(PlayerVideo {
            source: video.image,
            crop: video_content.crop,
            fade: content.video_fade(video.frame, self.output.video_frame_rate),
            inter_size: video_content
                .scale
                .size(cropped, self.video_container_size),
            out_size: self.video_container_size,
            eyes: video.eyes,
            colour_conversion: video_content.colour_conversion,
            subtitle: None,
            encoded: video.encoded,
        });
        self.last_video.insert(piece_ref, player_video.clone());

        let one = self.one_video_frame();
        let mut t = time;
        for _ in 0..frc.repeat {
            if t < end {
                self.emit_video(player_video.clone(), t);
            }
            t += one;
        }
    }

    /// Emit the piece's last frame (or black) for every frame instant in `[from, to)`.
    fn fill_video(&mut self, piece_ref: PieceRef, from: DcpTime, to: DcpTime, eyes: Eyes) {
        let one = self.one_video_frame();
        let filler = self.last_video.get(&piece_ref).cloned();
        let frame = |player: &Self, eyes: Eyes| match &filler {
            Some(last) if last.eyes == eyes => last.clone(),
            Some(last) => Arc::new(last.with_eyes(eyes)),
            None => player.black_player_video(eyes),
        };

        let mut t = from;
        if eyes == Eyes::Both {
            while t < to {
                let pv = frame(self, Eyes::Both);
                self.emit_video(pv, t);
                t += one;
            }
            return;
        }

        let mut fill_eyes = match self.last_video_eyes {
            Some(Eyes::Left) | Some(Eyes::Both) | None => Eyes::Left,
            Some(Eyes::Right) => Eyes::Right,
        };
        while t < to || fill_eyes != eyes {
            let pv = frame(self, fill_eyes);
            self.emit_video(pv, t);
            if fill_eyes == Eyes::Right {
                t += one;
            }
            fill_eyes = next_eyes(fill_eyes);
        }
    }

    fn emit_video(&mut self, player_video: Arc<PlayerVideo>, time: DcpTime) {
        let completes = player_video.eyes.completes_frame();
        if completes {
            self.active_subtitles.clear_before(time);
        }

        let player_video = match self.subtitles_for_frame(time) {
            Some(subtitle) => {
                let mut with_subtitle = (*player_video).clone();
                with_subtitle.set_subtitle(subtitle);
                Arc::new(with_subtitle)
            }
            None => player_video,
        };

        for callback in &mut self.callbacks.video {
            callback(player_video.clone(), time);
        }

        if completes {
            self.last_video_time = Some(time + self.one_video_frame());
        }
        self.last_video_eyes = Some(next_eyes(player_video.eyes));
    }

    /// Everything to burn into the frame at `time`, flattened.
    fn subtitles_for_frame(&self, time: DcpTime) -> Option<PositionImage> {
        let generation = self.generation;
        let always_burn = self.always_burn_subtitles;
        let pieces = &self.pieces;
        let burnt = self.active_subtitles.get_burnt(time, |piece| {
            piece.generation == generation
                && pieces
                    .get(piece.index)
                    .and_then(|p| p.content.subtitle)
                    .is_some_and(|s| s.use_subtitles && (always_burn || s.burn))
        });
        if burnt.is_empty() {
            return None;
        }

        let container = self.video_container_size;
        let mut images = Vec::new();
        for subtitles in &burnt {
            images.extend(
                subtitles
                    .image
                    .iter()
                    .filter_map(|s| place_image_subtitle(&s.image, &s.rectangle, container)),
            );
            if !subtitles.text.is_empty() {
                match &self.subtitle_renderer {
                    Some(renderer) => {
                        images.extend(renderer.render(&subtitles.text, container, time))
                    }
                    None => tracing::debug!("No subtitle renderer; text subtitles not burnt"),
                }
            }
        }
        (!images.is_empty()).then(|| merge(&images))
    }

    // Audio ----------------------------------------------------------------

    fn audio(
        &mut self,
        piece_ref: PieceRef,
        stream: usize,
        content_audio: ContentAudio,
    ) -> CadenceResult<()> {
        let Some(piece) = self.piece(piece_ref) else {
            return Ok(());
        };
        let rate = self.output.audio_frame_rate;
        let mut time = piece.resampled_audio_to_dcp(content_audio.frame, rate);
        let position = piece.position();
        let end = piece.end();
        let content = piece.content.clone();
        let Some(stream_info) = content.audio.as_ref().and_then(|a| a.streams.get(stream)) else {
            return Err(CadenceError::decode(format!(
                "{} produced audio for stream {stream}, which it does not have",
                content.name
            )));
        };

        let mut audio = content_audio.audio;
        if time < position {
            match discard_audio(audio, time, position, rate) {
                Some((kept, kept_time)) => {
                    audio = kept;
                    time = kept_time;
                }
                None => return Ok(()),
            }
        }
        if time >= end {
            return Ok(());
        }
        let block_end = time + DcpTime::from_frames(audio.frames() as Frame, f64::from(rate));
        if block_end > end {
            let remaining = (end - time).frames_round(f64::from(rate));
            if remaining <= 0 {
                return Ok(());
            }
            audio.set_frames(remaining as usize);
        }

        let gain = content.audio.as_ref().map_or(0.0, |a| a.gain_db);
        if gain != 0.0 {
            audio.apply_gain(gain);
        }

        let channels = self.output.audio_channels;
        let mut audio = remap(&audio, channels, &stream_info.mapping);
        if let Some(processor) = self.audio_processor.as_mut() {
            audio = processor.run(&audio, channels);
        }
        if audio.is_empty() {
            return Ok(());
        }

        let pushed_end = time + DcpTime::from_frames(audio.frames() as Frame, f64::from(rate));
        self.audio_merger.push(audio, time);
        if let Some(state) = self
            .stream_states
            .iter_mut()
            .find(|s| s.piece == piece_ref && s.stream == stream)
        {
            state.last_push_end = pushed_end;
        }
        Ok(())
    }

    /// Emit silence over `period` in blocks of at most half a second.
    fn fill_audio(&mut self, period: DcpTimePeriod) {
        let rate = f64::from(self.output.audio_frame_rate);
        let block = DcpTime::from_seconds(SILENCE_BLOCK_SECONDS);
        let mut t = period.from;
        while t < period.to {
            let to = (t + block).min(period.to);
            let frames = (to - t).frames_round(rate);
            if frames > 0 {
                let silence = AudioBuffers::silent(self.output.audio_channels, frames as usize);
                self.emit_audio(&silence, t);
            }
            t = to;
        }
    }

    fn emit_audio(&mut self, audio: &AudioBuffers, time: DcpTime) {
        for callback in &mut self.callbacks.audio {
            callback(audio, time);
        }
        self.last_audio_time = Some(
            time + DcpTime::from_frames(
                audio.frames() as Frame,
                f64::from(self.output.audio_frame_rate),
            ),
        );
    }

    // Subtitles ------------------------------------------------------------

    fn image_subtitle_start(&mut self, piece_ref: PieceRef, subtitle: ContentImageSubtitle) {
        if self.ignore_subtitle {
            return;
        }
        let Some(piece) = self.piece(piece_ref) else {
            return;
        };
        let Some(settings) = piece.content.subtitle else {
            return;
        };
        let from = piece.content_time_to_dcp(subtitle.from);
        let mut image = subtitle.subtitle;
        image.rectangle = adjust_image_rect(image.rectangle, &settings);
        self.active_subtitles.add_from(
            piece_ref,
            PlayerSubtitles {
                image: vec![image],
                text: Vec::new(),
            },
            from,
        );
    }

    fn text_subtitle_start(&mut self, piece_ref: PieceRef, subtitle: ContentTextSubtitle) {
        if self.ignore_subtitle {
            return;
        }
        let Some(piece) = self.piece(piece_ref) else {
            return;
        };
        let Some(settings) = piece.content.subtitle else {
            return;
        };
        let from = piece.content_time_to_dcp(subtitle.from);
        let mut text = subtitle.subtitles;
        for line in &mut text {
            adjust_text_subtitle(line, &settings);
            line.in_time = from;
        }
        self.active_subtitles.add_from(
            piece_ref,
            PlayerSubtitles {
                image: Vec::new(),
                text,
            },
            from,
        );
    }

    fn subtitle_stop(&mut self, piece_ref: PieceRef, to: ContentTime) {
        if !self.active_subtitles.have(piece_ref) {
            return;
        }
        let Some(piece) = self.piece(piece_ref) else {
            return;
        };
        let settings = piece.content.subtitle;
        let to = piece.content_time_to_dcp(to);
        let Some((subtitles, from)) = self.active_subtitles.add_to(piece_ref, to) else {
            return;
        };

        // Burnt subtitles reach the output through the video instead.
        let deliver = settings
            .is_some_and(|s| s.use_subtitles && !s.burn && !self.always_burn_subtitles);
        if deliver {
            let period = DcpTimePeriod::new(from, to);
            for callback in &mut self.callbacks.subtitle {
                callback(&subtitles, period);
            }
        }
    }
}

fn next_eyes(eyes: Eyes) -> Eyes {
    match eyes {
        Eyes::Left => Eyes::Right,
        Eyes::Right => Eyes::Left,
        Eyes::Both => Eyes::Both,
    }
}

/// Drop the part of `audio` (starting at `time`) that lies before `discard_to`.
fn discard_audio(
    mut audio: AudioBuffers,
    time: DcpTime,
    discard_to: DcpTime,
    rate: u32,
) -> Option<(AudioBuffers, DcpTime)> {
    let remove = (discard_to - time).frames_round(f64::from(rate)).max(0);
    if remove as usize >= audio.frames() {
        return None;
    }
    audio.trim_start(remove as usize);
    Some((audio, time + DcpTime::from_frames(remove, f64::from(rate))))
}

/// Apply the content's subtitle offset and scale, keeping the centre in place.
fn adjust_image_rect(mut rect: Rect, settings: &SubtitleContent) -> Rect {
    rect.x += settings.x_offset - rect.width * (settings.x_scale - 1.0) / 2.0;
    rect.y += settings.y_offset - rect.height * (settings.y_scale - 1.0) / 2.0;
    rect.width *= settings.x_scale;
    rect.height *= settings.y_scale;
    rect
}

fn adjust_text_subtitle(text: &mut TextSubtitle, settings: &SubtitleContent) {
    text.h_position += settings.x_offset;
    text.v_position += settings.y_offset;

    let (xs, ys) = (settings.x_scale, settings.y_scale);
    if xs > SUBTITLE_SCALE_EPSILON && ys > SUBTITLE_SCALE_EPSILON {
        // The uniform part of the scale goes into the size, the rest into the aspect.
        text.size *= xs.min(ys);
        if (1.0 - xs / ys).abs() > ASPECT_ADJUST_EPSILON {
            text.aspect_adjust = xs / ys;
        }
    }
}

/// Scale and position an image subtitle on a `container`-sized frame.
fn place_image_subtitle(image: &Image, rect: &Rect, container: Size) -> Option<PositionImage> {
    let width = (rect.width * f64::from(container.width)).round();
    let height = (rect.height * f64::from(container.height)).round();
    if width < 1.0 || height < 1.0 {
        return None;
    }
    let scaled = image.scale(Size::new(width as u32, height as u32));
    Some(PositionImage::new(
        Arc::new(scaled),
        Position::new(
            (rect.x * f64::from(container.width)).round() as i32,
            (rect.y * f64::from(container.height)).round() as i32,
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_model::PixelFormat;
    use proptest::prelude::*;

    fn settings(x_scale: f64, y_scale: f64) -> SubtitleContent {
        SubtitleContent {
            x_scale,
            y_scale,
            ..Default::default()
        }
    }

    #[test]
    fn test_scaled_image_subtitle_keeps_centre() {
        let rect = Rect::new(0.2, 0.7, 0.4, 0.1);
        let adjusted = adjust_image_rect(rect, &settings(1.5, 2.0));
        let (cx, cy) = rect.centre();
        let (ax, ay) = adjusted.centre();
        assert!((cx - ax).abs() < 1e-9);
        assert!((cy - ay).abs() < 1e-9);
        assert!((adjusted.width - 0.6).abs() < 1e-9);
        assert!((adjusted.height - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_image_subtitle_offset() {
        let s = SubtitleContent {
            x_offset: 0.1,
            y_offset: -0.05,
            ..Default::default()
        };
        let adjusted = adjust_image_rect(Rect::new(0.2, 0.7, 0.4, 0.1), &s);
        assert!((adjusted.x - 0.3).abs() < 1e-9);
        assert!((adjusted.y - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_text_subtitle_uniform_scale() {
        let mut text = TextSubtitle::new("hi");
        text.size = 40.0;
        adjust_text_subtitle(&mut text, &settings(0.5, 0.5));
        assert!((text.size - 20.0).abs() < 1e-9);
        assert_eq!(text.aspect_adjust, 1.0);
    }

    #[test]
    fn test_text_subtitle_anamorphic_scale() {
        let mut text = TextSubtitle::new("hi");
        text.size = 40.0;
        adjust_text_subtitle(&mut text, &settings(2.0, 1.0));
        assert!((text.size - 40.0).abs() < 1e-9);
        assert!((text.aspect_adjust - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_discard_audio_cuts_head() {
        let audio = AudioBuffers::from_channels(vec![(0..100).map(|i| i as f32).collect()]);
        let time = DcpTime::zero();
        let to = DcpTime::from_frames(30, 48_000.0);
        let (kept, kept_time) = discard_audio(audio, time, to, 48_000).unwrap();
        assert_eq!(kept.frames(), 70);
        assert_eq!(kept.channel(0)[0], 30.0);
        assert_eq!(kept_time, to);
    }

    #[test]
    fn test_discard_audio_whole_block() {
        let audio = AudioBuffers::new(1, 10);
        let to = DcpTime::from_frames(10, 48_000.0);
        assert!(discard_audio(audio, DcpTime::zero(), to, 48_000).is_none());
    }

    #[test]
    fn test_place_image_subtitle() {
        let image = Image::filled(PixelFormat::Rgba, Size::new(10, 10), &[1, 2, 3, 255]);
        let placed =
            place_image_subtitle(&image, &Rect::new(0.5, 0.25, 0.25, 0.5), Size::new(100, 40))
                .unwrap();
        assert_eq!(placed.position, Position::new(50, 10));
        assert_eq!(placed.image.size(), Size::new(25, 20));
    }

    #[test]
    fn test_place_degenerate_subtitle_skipped() {
        let image = Image::filled(PixelFormat::Rgba, Size::new(10, 10), &[1, 2, 3, 255]);
        assert!(
            place_image_subtitle(&image, &Rect::new(0.0, 0.0, 0.001, 0.5), Size::new(100, 40))
                .is_none()
        );
    }

    #[test]
    fn test_next_eyes_alternates() {
        assert_eq!(next_eyes(Eyes::Left), Eyes::Right);
        assert_eq!(next_eyes(Eyes::Right), Eyes::Left);
        assert_eq!(next_eyes(Eyes::Both), Eyes::Both);
    }

    proptest! {
        #[test]
        fn prop_discard_never_emits_before_cut(
            start in 0i64..10_000,
            frames in 1usize..2_000,
            cut in 0i64..14_000,
        ) {
            let time = DcpTime::from_frames(start, 48_000.0);
            let to = DcpTime::from_frames(cut, 48_000.0);
            match discard_audio(AudioBuffers::new(2, frames), time, to, 48_000) {
                Some((kept, kept_time)) => {
                    prop_assert!(kept_time >= to || kept_time == time);
                    prop_assert!(kept_time >= time);
                    let end = kept_time + DcpTime::from_frames(kept.frames() as i64, 48_000.0);
                    prop_assert_eq!(end, time + DcpTime::from_frames(frames as i64, 48_000.0));
                }
                None => prop_assert!(cut >= start + frames as i64),
            }
        }
    }
}
