// Media player module
//
// Wraps a GStreamer playbin pipeline behind a small playback API and
// decouples its streaming threads from the render thread:
//
// - decoded video frames land in a single-slot appsink (max-buffers=1,
//   drop=true) and are pulled non-blockingly during rendering; if the
//   render thread is slow the decoder overwrites the pending frame
//   instead of stalling,
// - subtitles land in a second appsink and are delivered as events,
// - all engine notifications (state, buffering, duration, end of
//   stream) are marshaled through a FIFO queue and applied only when
//   the consumer polls.

mod events;
mod sample;
pub mod subtitle;

pub use events::PlayerEvent;
pub use sample::VideoSample;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use events::{EventQueue, EventSender};
use sample::CapsTracker;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("Failed to initialize player: {0}")]
    Init(String),
    #[error("State change failed: {0}")]
    StateChange(String),
    #[error("Seek failed: {0}")]
    Seek(String),
}

/// Playback state as reflected from the engine.
///
/// Transitions to and from `Buffering` are entirely engine-driven; the
/// player only reports them, it never pauses or resumes playback itself
/// to service buffering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Idle; playback can be started with a URL and `play()`.
    Stopped,
    /// The engine is filling its buffers; playback is held.
    Buffering,
    /// Paused at the user's request.
    Paused,
    /// Playing.
    Playing,
}

/// GStreamer-based media player.
///
/// Playback is started by calling `set_url` and then `play()`. The
/// state change to Playing is asynchronous; observe
/// `PlayerEvent::StateChanged` via `poll_events`. `stop()` is the one
/// blocking call: it returns only once the pipeline reached the idle
/// state.
///
/// Make sure `set_sink_formats` is called before playback starts so the
/// pipeline only produces frames the texture uploader can consume.
pub struct Player {
    playbin: gst::Element,
    video_appsink: gst_app::AppSink,
    capsfilter: gst::Element,

    url: Option<String>,
    state: PlayerState,
    subtitle: String,
    caps_tracker: CapsTracker,

    queue: EventQueue,
    sender: EventSender,
    shutdown: Arc<AtomicBool>,
    bus_thread: Option<std::thread::JoinHandle<()>>,
}

impl Player {
    /// Builds the playbin pipeline with the video and subtitle sinks.
    ///
    /// `on_frame_available` is invoked from a GStreamer streaming
    /// thread whenever a new video frame is waiting in the sink; use it
    /// to wake the render loop, not to touch player state.
    pub fn new(
        on_frame_available: impl Fn() + Send + Sync + 'static,
    ) -> Result<Self, PlayerError> {
        let playbin = gst::ElementFactory::make("playbin")
            .name("player")
            .build()
            .map_err(|e| PlayerError::Init(format!("Failed to create playbin: {}", e)))?;

        let (video_sink, video_appsink, capsfilter) = build_video_sink(on_frame_available)?;
        playbin.set_property("video-sink", &video_sink);

        let (sender, queue) = EventQueue::new();

        let subtitle_appsink = build_subtitle_sink(sender.clone())?;
        playbin.set_property("text-sink", &subtitle_appsink);
        let local_sender = sender.clone();

        // Enable video and text output, keep software volume/color
        // balance, and leave audio disabled; this demo has no audio
        // output.
        playbin.set_property_from_str("flags", "video+text+soft-volume+soft-colorbalance");

        let shutdown = Arc::new(AtomicBool::new(false));
        let bus = playbin
            .bus()
            .ok_or_else(|| PlayerError::Init("playbin has no bus".into()))?;
        let bus_thread = spawn_bus_watch(bus, playbin.clone(), sender, shutdown.clone());

        Ok(Self {
            playbin,
            video_appsink,
            capsfilter,
            url: None,
            state: PlayerState::Stopped,
            subtitle: String::new(),
            caps_tracker: CapsTracker::default(),
            queue,
            sender: local_sender,
            shutdown,
            bus_thread: Some(bus_thread),
        })
    }

    /// Installs a hook invoked whenever a notification is queued, so
    /// the consumer's event loop can schedule a `poll_events` call.
    pub fn set_wake(&self, wake: impl Fn() + Send + Sync + 'static) {
        self.queue.set_wake(wake);
    }

    /// Sets the next URL to play. No-op if unchanged. Takes effect when
    /// playback is (re)started from Stopped.
    pub fn set_url(&mut self, url: &str) {
        if self.url.as_deref() == Some(url) {
            return;
        }
        self.url = Some(url.to_string());
        self.playbin.set_property("uri", url);
        // The consumer learns about the change the same way it learns
        // about engine-driven changes.
        self.queue_local(PlayerEvent::UrlChanged);
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Current state as of the last `poll_events` (or `stop()`).
    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// The most recent subtitle line, plain text.
    pub fn subtitle(&self) -> &str {
        &self.subtitle
    }

    /// Current playback position in milliseconds, -1 if unknown.
    pub fn position(&self) -> i64 {
        self.playbin
            .query_position::<gst::ClockTime>()
            .map(|p| p.mseconds() as i64)
            .unwrap_or(-1)
    }

    /// Current playback duration in milliseconds, -1 if unknown. Known
    /// durations are never reported as less than 1 ms.
    pub fn duration(&self) -> i64 {
        self.playbin
            .query_duration::<gst::ClockTime>()
            .map(|d| (d.mseconds() as i64).max(1))
            .unwrap_or(-1)
    }

    /// True if `seek()` is supported by the current stream.
    pub fn is_seekable(&self) -> bool {
        let mut query = gst::query::Seeking::new(gst::Format::Time);
        if self.playbin.query(&mut query) {
            query.result().0
        } else {
            false
        }
    }

    /// Enables or disables subtitle decoding by adding or removing the
    /// text flag on the pipeline. Takes effect on the next playback
    /// start.
    pub fn set_subtitles_enabled(&self, enabled: bool) {
        let flags = if enabled {
            "video+text+soft-volume+soft-colorbalance"
        } else {
            "video+soft-volume+soft-colorbalance"
        };
        self.playbin.set_property_from_str("flags", flags);
    }

    /// Restricts the pixel formats the video sink may produce. Must be
    /// called before playback starts; the pipeline converts frames if
    /// necessary. `formats` must not be empty.
    pub fn set_sink_formats(&self, formats: &[gst_video::VideoFormat]) {
        assert!(!formats.is_empty(), "sink format list must not be empty");

        // Width, height and framerate stay unrestricted; only the
        // format set is pinned down.
        let caps = gst_video::VideoCapsBuilder::new()
            .format_list(formats.iter().copied())
            .build();
        log::debug!("Restricting video sink caps to {}", caps);
        self.capsfilter.set_property("caps", &caps);
    }

    /// Starts playback if stopped (URL must be set), resumes if paused,
    /// does nothing if already playing. The transition is asynchronous.
    pub fn play(&mut self) -> Result<(), PlayerError> {
        match self.state {
            PlayerState::Stopped => {
                if self.url.is_none() {
                    log::warn!("play() called without a URL set");
                    return Ok(());
                }
                self.playbin
                    .set_state(gst::State::Playing)
                    .map_err(|e| PlayerError::StateChange(format!("play: {}", e)))?;
            }
            PlayerState::Paused => {
                self.playbin
                    .set_state(gst::State::Playing)
                    .map_err(|e| PlayerError::StateChange(format!("resume: {}", e)))?;
            }
            PlayerState::Playing | PlayerState::Buffering => {}
        }
        Ok(())
    }

    /// Requests a pause if playing; otherwise does nothing.
    pub fn pause(&mut self) -> Result<(), PlayerError> {
        if self.state == PlayerState::Playing {
            self.playbin
                .set_state(gst::State::Paused)
                .map_err(|e| PlayerError::StateChange(format!("pause: {}", e)))?;
        }
        Ok(())
    }

    /// Stops playback. Unlike the other calls this blocks until the
    /// idle state is reached. Always safe to call.
    pub fn stop(&mut self) {
        if let Err(e) = self.playbin.set_state(gst::State::Null) {
            log::error!("Failed to stop pipeline: {}", e);
        }
        self.state = PlayerState::Stopped;
        self.caps_tracker = CapsTracker::default();
    }

    /// Requests a flushing seek to an absolute position in
    /// milliseconds. The effect is asynchronous.
    pub fn seek(&mut self, position_ms: i64) -> Result<(), PlayerError> {
        let position = gst::ClockTime::from_mseconds(position_ms.max(0) as u64);
        self.playbin
            .seek_simple(gst::SeekFlags::FLUSH, position)
            .map_err(|e| PlayerError::Seek(e.to_string()))
    }

    /// Pulls the pending video sample from the frame sink without
    /// blocking. The returned sample is empty if nothing is pending.
    /// Caps changes relative to the previously pulled sample are
    /// flagged on the sample.
    pub fn pull_video_sample(&mut self) -> VideoSample {
        let Some(sample) = self.video_appsink.try_pull_sample(gst::ClockTime::ZERO) else {
            return VideoSample::empty();
        };

        let has_new_caps = self.caps_tracker.track(sample.caps());
        VideoSample::new(Some(sample), has_new_caps)
    }

    /// Drains queued engine notifications in FIFO order, applies them
    /// to the player's cached state, and returns them. Must be called
    /// from the consumer thread.
    pub fn poll_events(&mut self) -> Vec<PlayerEvent> {
        let events = self.queue.drain();
        for event in &events {
            match event {
                PlayerEvent::StateChanged(state) => self.state = *state,
                PlayerEvent::SubtitleChanged(text) => self.subtitle = text.clone(),
                _ => {}
            }
        }
        events
    }

    /// Queues a locally originated event so consumers see one uniform
    /// notification stream.
    fn queue_local(&self, event: PlayerEvent) {
        self.sender.send(event);
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        // Order matters: stop the engine first so no new notifications
        // are produced, then disconnect the bus watch, then let the
        // queue go down with the player. Events still queued at this
        // point are dropped without ever running.
        log::debug!("Stopping pipeline and shutting down bus watch");
        if let Err(e) = self.playbin.set_state(gst::State::Null) {
            log::error!("Failed to stop pipeline during teardown: {}", e);
        }
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.bus_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Builds the video output bin: videoconvert ! capsfilter ! appsink.
///
/// The appsink holds at most one buffer and drops the pending one when
/// a new frame arrives, so the decoder never blocks on a slow consumer;
/// the most recent frame wins.
fn build_video_sink(
    on_frame_available: impl Fn() + Send + Sync + 'static,
) -> Result<(gst::Bin, gst_app::AppSink, gst::Element), PlayerError> {
    let bin = gst::Bin::builder().name("video-sink-bin").build();

    let videoconvert = gst::ElementFactory::make("videoconvert")
        .build()
        .map_err(|e| PlayerError::Init(format!("Failed to create videoconvert: {}", e)))?;

    let capsfilter = gst::ElementFactory::make("capsfilter")
        .build()
        .map_err(|e| PlayerError::Init(format!("Failed to create capsfilter: {}", e)))?;

    let appsink = gst_app::AppSink::builder()
        .name("video-appsink")
        .max_buffers(1)
        .drop(true)
        .build();

    appsink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |_| {
                // Notification only; the sample stays queued until the
                // render thread pulls it.
                on_frame_available();
                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );

    bin.add_many([&videoconvert, &capsfilter, appsink.upcast_ref()])
        .map_err(|e| PlayerError::Init(format!("Failed to assemble video sink: {}", e)))?;
    gst::Element::link_many([&videoconvert, &capsfilter, appsink.upcast_ref()])
        .map_err(|e| PlayerError::Init(format!("Failed to link video sink: {}", e)))?;

    // Ghost pad so the bin looks like a single sink element to playbin.
    let pad = videoconvert
        .static_pad("sink")
        .ok_or_else(|| PlayerError::Init("videoconvert has no sink pad".into()))?;
    let ghost = gst::GhostPad::with_target(&pad)
        .map_err(|e| PlayerError::Init(format!("Failed to create ghost pad: {}", e)))?;
    bin.add_pad(&ghost)
        .map_err(|e| PlayerError::Init(format!("Failed to add ghost pad: {}", e)))?;

    Ok((bin, appsink, capsfilter))
}

/// Builds the subtitle appsink. Subtitle samples are decoded on the
/// streaming thread and forwarded as events; they are never pulled by
/// the consumer directly.
fn build_subtitle_sink(sender: EventSender) -> Result<gst_app::AppSink, PlayerError> {
    let appsink = gst_app::AppSink::builder().name("subtitle-appsink").build();

    appsink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let Ok(sample) = sink.pull_sample() else {
                    return Ok(gst::FlowSuccess::Ok);
                };
                let Some(buffer) = sample.buffer() else {
                    return Ok(gst::FlowSuccess::Ok);
                };
                let Ok(map) = buffer.map_readable() else {
                    return Ok(gst::FlowSuccess::Ok);
                };
                if map.is_empty() {
                    return Ok(gst::FlowSuccess::Ok);
                }

                match std::str::from_utf8(&map) {
                    Ok(markup) => {
                        let text = subtitle::markup_to_plain(markup);
                        sender.send(PlayerEvent::SubtitleChanged(text));
                    }
                    Err(e) => log::warn!("Dropping non-UTF-8 subtitle sample: {}", e),
                }

                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );

    Ok(appsink)
}

/// Spawns the bus watch thread. It translates bus messages into player
/// events and emits periodic position updates while playing. All events
/// cross to the consumer via the FIFO queue.
fn spawn_bus_watch(
    bus: gst::Bus,
    playbin: gst::Element,
    sender: EventSender,
    shutdown: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("player-bus".into())
        .spawn(move || {
            let mut watch = BusWatch::new(playbin, sender);
            while !shutdown.load(Ordering::SeqCst) {
                match bus.timed_pop(gst::ClockTime::from_mseconds(100)) {
                    Some(msg) => watch.handle_message(&msg),
                    None => watch.tick(),
                }
            }
        })
        .expect("failed to spawn bus watch thread")
}

/// Per-thread state of the bus watch.
struct BusWatch {
    playbin: gst::Element,
    sender: EventSender,
    state: PlayerState,
    buffering: bool,
    seekable: Option<bool>,
    duration: Option<i64>,
}

impl BusWatch {
    fn new(playbin: gst::Element, sender: EventSender) -> Self {
        Self {
            playbin,
            sender,
            state: PlayerState::Stopped,
            buffering: false,
            seekable: None,
            duration: None,
        }
    }

    fn handle_message(&mut self, msg: &gst::Message) {
        use gst::MessageView;

        match msg.view() {
            MessageView::StateChanged(sc) => {
                // Only the top-level pipeline's state is the playback
                // state; child elements churn through states constantly.
                if msg
                    .src()
                    .is_some_and(|s| s == self.playbin.upcast_ref::<gst::Object>())
                {
                    if let Some(mapped) =
                        map_gst_state(sc.current(), sc.pending(), self.buffering)
                    {
                        self.set_state(mapped);
                        if matches!(mapped, PlayerState::Paused | PlayerState::Playing) {
                            self.refresh_media_info();
                        }
                    }
                }
            }
            MessageView::Buffering(b) => {
                let percent = b.percent();
                self.sender.send(PlayerEvent::Buffering(percent));
                if percent < 100 {
                    self.buffering = true;
                    if self.state != PlayerState::Stopped {
                        self.set_state(PlayerState::Buffering);
                    }
                } else {
                    self.buffering = false;
                    // Reflect whatever the pipeline settles back to. A
                    // pending state means the settling is still in
                    // progress and its bus message will report it.
                    let (_, current, pending) = self.playbin.state(gst::ClockTime::ZERO);
                    if let Some(mapped) = map_gst_state(current, pending, false) {
                        self.set_state(mapped);
                    }
                }
            }
            MessageView::DurationChanged(_) => {
                self.refresh_media_info();
            }
            MessageView::Eos(_) => {
                log::debug!("End of stream");
                let _ = self.playbin.set_state(gst::State::Null);
                self.set_state(PlayerState::Stopped);
                self.sender.send(PlayerEvent::EndOfStream);
            }
            MessageView::Error(err) => {
                // Playback errors have no separate notification; they
                // surface as a transition to Stopped. The error itself
                // is only logged.
                log::error!(
                    "Pipeline error: {} ({})",
                    err.error(),
                    err.debug().unwrap_or_default()
                );
                let _ = self.playbin.set_state(gst::State::Null);
                self.set_state(PlayerState::Stopped);
            }
            MessageView::Warning(warn) => {
                log::warn!(
                    "Pipeline warning: {} ({})",
                    warn.error(),
                    warn.debug().unwrap_or_default()
                );
            }
            MessageView::AsyncDone(_) => {
                self.refresh_media_info();
            }
            _ => {}
        }
    }

    /// Runs on pop timeout (~100 ms). Emits position updates while
    /// playing, mirroring the position tick of full-blown player
    /// frameworks.
    fn tick(&mut self) {
        if self.state != PlayerState::Playing {
            return;
        }
        let position = self
            .playbin
            .query_position::<gst::ClockTime>()
            .map(|p| p.mseconds() as i64)
            .unwrap_or(-1);
        self.sender.send(PlayerEvent::PositionUpdated(position));
    }

    fn set_state(&mut self, state: PlayerState) {
        if self.state != state {
            log::debug!("Player state: {:?} -> {:?}", self.state, state);
            self.state = state;
            self.sender.send(PlayerEvent::StateChanged(state));
        }
    }

    /// Re-queries seekability and duration; emits events on change or
    /// on first availability.
    fn refresh_media_info(&mut self) {
        let mut query = gst::query::Seeking::new(gst::Format::Time);
        if self.playbin.query(&mut query) {
            let seekable = query.result().0;
            if self.seekable != Some(seekable) {
                self.seekable = Some(seekable);
                self.sender.send(PlayerEvent::SeekableChanged(seekable));
            }
        }

        let queried = self
            .playbin
            .query_duration::<gst::ClockTime>()
            .map(|d| d.mseconds() as i64);
        if let Some(duration) = updated_duration(&mut self.duration, queried) {
            self.sender.send(PlayerEvent::DurationChanged(duration));
        }
    }
}

/// Deduplicates duration reports. Returns the duration to emit when the
/// queried value is known and differs from the last reported one. Known
/// durations are never reported as less than 1 ms.
fn updated_duration(last: &mut Option<i64>, queried_ms: Option<i64>) -> Option<i64> {
    let duration = queried_ms?.max(1);
    if *last == Some(duration) {
        None
    } else {
        *last = Some(duration);
        Some(duration)
    }
}

/// Maps a pipeline state to the reported playback state.
///
/// A pending state means the pipeline is mid-transition: starting
/// playback walks Null -> Ready -> Paused -> Playing and posts a state
/// change for every hop. Those hops are not observable playback states,
/// so they map to `None`; the final hop arrives with no pending state
/// and reports the settled target.
fn map_gst_state(current: gst::State, pending: gst::State, buffering: bool) -> Option<PlayerState> {
    if pending != gst::State::VoidPending {
        return None;
    }
    Some(match current {
        gst::State::Playing => PlayerState::Playing,
        gst::State::Paused => {
            if buffering {
                PlayerState::Buffering
            } else {
                PlayerState::Paused
            }
        }
        _ => PlayerState::Stopped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_gst_state_settled() {
        let settled = gst::State::VoidPending;
        assert_eq!(
            map_gst_state(gst::State::Playing, settled, false),
            Some(PlayerState::Playing)
        );
        assert_eq!(
            map_gst_state(gst::State::Paused, settled, false),
            Some(PlayerState::Paused)
        );
        assert_eq!(
            map_gst_state(gst::State::Paused, settled, true),
            Some(PlayerState::Buffering)
        );
        assert_eq!(
            map_gst_state(gst::State::Ready, settled, false),
            Some(PlayerState::Stopped)
        );
        assert_eq!(
            map_gst_state(gst::State::Null, settled, false),
            Some(PlayerState::Stopped)
        );
    }

    #[test]
    fn test_map_gst_state_skips_transition_hops() {
        // Starting from idle, the pipeline passes through Ready and
        // Paused on its way to Playing. Neither hop may surface as a
        // playback state, in particular not as Paused.
        assert_eq!(
            map_gst_state(gst::State::Ready, gst::State::Paused, false),
            None
        );
        assert_eq!(
            map_gst_state(gst::State::Paused, gst::State::Playing, false),
            None
        );
        // Same on the way down when playback stops.
        assert_eq!(
            map_gst_state(gst::State::Paused, gst::State::Null, false),
            None
        );
    }

    #[test]
    fn test_updated_duration_reports_changes_once() {
        let mut last = None;
        assert_eq!(updated_duration(&mut last, None), None);
        assert_eq!(updated_duration(&mut last, Some(2000)), Some(2000));
        assert_eq!(updated_duration(&mut last, Some(2000)), None);
        assert_eq!(updated_duration(&mut last, Some(3000)), Some(3000));
    }

    #[test]
    fn test_updated_duration_clamps_to_one_ms() {
        let mut last = None;
        assert_eq!(updated_duration(&mut last, Some(0)), Some(1));
    }
}
