// Frame sink overwrite behavior
//
// The video appsink is configured as a single-slot sink: max-buffers=1
// with drop=true. When the consumer does not pull, newly decoded frames
// overwrite the pending one instead of blocking the producer. These
// tests push several buffers through a live appsrc ! appsink pipeline
// without pulling in between and check that only the newest survives.

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;

const WIDTH: i32 = 4;
const HEIGHT: i32 = 4;
const FRAME_SIZE: usize = (WIDTH * HEIGHT * 4) as usize;

fn video_caps() -> gst::Caps {
    gst::Caps::builder("video/x-raw")
        .field("format", "RGBx")
        .field("width", WIDTH)
        .field("height", HEIGHT)
        .field("framerate", gst::Fraction::new(30, 1))
        .build()
}

fn build_pipeline() -> (gst::Pipeline, gst_app::AppSrc, gst_app::AppSink) {
    let pipeline = gst::Pipeline::new();

    let appsrc = gst_app::AppSrc::builder()
        .caps(&video_caps())
        .format(gst::Format::Time)
        .build();

    // Same sink configuration the player uses: one pending buffer,
    // newest wins, no blocking.
    let appsink = gst_app::AppSink::builder().max_buffers(1).drop(true).build();

    pipeline
        .add_many([
            appsrc.upcast_ref::<gst::Element>(),
            appsink.upcast_ref(),
        ])
        .unwrap();
    gst::Element::link_many([appsrc.upcast_ref::<gst::Element>(), appsink.upcast_ref()]).unwrap();

    (pipeline, appsrc, appsink)
}

/// Pushes `count` frames, each filled with its own index byte, then
/// signals end of stream and waits for it to drain through.
fn push_frames(pipeline: &gst::Pipeline, appsrc: &gst_app::AppSrc, count: u8) {
    for i in 0..count {
        let mut buffer = gst::Buffer::with_size(FRAME_SIZE).unwrap();
        {
            let buffer = buffer.get_mut().unwrap();
            buffer.set_pts(gst::ClockTime::from_mseconds(i as u64 * 33));
            let mut map = buffer.map_writable().unwrap();
            map.fill(i);
        }
        appsrc.push_buffer(buffer).unwrap();
    }
    appsrc.end_of_stream().unwrap();

    let bus = pipeline.bus().unwrap();
    let msg = bus.timed_pop_filtered(
        gst::ClockTime::from_seconds(10),
        &[gst::MessageType::Eos, gst::MessageType::Error],
    );
    match msg.map(|m| m.type_()) {
        Some(gst::MessageType::Eos) => {}
        other => panic!("expected EOS, got {:?}", other),
    }
}

fn first_byte(sample: &gst::Sample) -> u8 {
    let buffer = sample.buffer().unwrap();
    let map = buffer.map_readable().unwrap();
    map[0]
}

#[test]
fn test_unpulled_frames_are_overwritten_by_newer_ones() {
    gst::init().unwrap();

    let (pipeline, appsrc, appsink) = build_pipeline();
    pipeline.set_state(gst::State::Playing).unwrap();

    push_frames(&pipeline, &appsrc, 5);

    // Nothing was pulled while frames arrived, so only the newest
    // frame must be left in the sink.
    let sample = appsink
        .try_pull_sample(gst::ClockTime::ZERO)
        .expect("one pending sample");
    assert_eq!(first_byte(&sample), 4);

    assert!(
        appsink.try_pull_sample(gst::ClockTime::ZERO).is_none(),
        "older frames must have been dropped, not queued"
    );

    pipeline.set_state(gst::State::Null).unwrap();
}

#[test]
fn test_pull_without_pending_frame_returns_none() {
    gst::init().unwrap();

    let (pipeline, _appsrc, appsink) = build_pipeline();
    pipeline.set_state(gst::State::Playing).unwrap();

    // Never blocks, even though nothing was ever produced.
    assert!(appsink.try_pull_sample(gst::ClockTime::ZERO).is_none());

    pipeline.set_state(gst::State::Null).unwrap();
}

#[test]
fn test_single_frame_is_delivered_intact() {
    gst::init().unwrap();

    let (pipeline, appsrc, appsink) = build_pipeline();
    pipeline.set_state(gst::State::Playing).unwrap();

    push_frames(&pipeline, &appsrc, 1);

    let sample = appsink
        .try_pull_sample(gst::ClockTime::ZERO)
        .expect("one pending sample");
    assert_eq!(first_byte(&sample), 0);
    let caps = sample.caps().expect("sample carries caps");
    let s = caps.structure(0).unwrap();
    assert_eq!(s.get::<i32>("width").unwrap(), WIDTH);
    assert_eq!(s.get::<i32>("height").unwrap(), HEIGHT);

    pipeline.set_state(gst::State::Null).unwrap();
}
