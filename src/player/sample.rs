// Ownership-transferring wrapper around one pulled appsink sample

use gstreamer as gst;

/// One decoded video sample pulled from the frame sink, together with a
/// flag that says whether its caps differ from the previous sample's.
///
/// The caps flag is what lets the render side reconfigure GPU textures
/// only when the frame format actually changed (new width/height, new
/// pixel format) instead of on every frame.
///
/// The wrapped `gst::Sample` keeps a reference on the underlying frame
/// buffer; dropping the `VideoSample` releases it. The type is move-only
/// (no `Clone`), so at most one consumer-side owner exists per pull.
#[derive(Debug)]
pub struct VideoSample {
    sample: Option<gst::Sample>,
    has_new_caps: bool,
}

impl VideoSample {
    pub(crate) fn new(sample: Option<gst::Sample>, has_new_caps: bool) -> Self {
        Self {
            sample,
            has_new_caps,
        }
    }

    /// An empty sample, returned when the sink had nothing pending.
    pub(crate) fn empty() -> Self {
        Self {
            sample: None,
            has_new_caps: false,
        }
    }

    /// Returns the pulled sample, or `None` if no frame was available.
    pub fn sample(&self) -> Option<&gst::Sample> {
        self.sample.as_ref()
    }

    /// Consumes the wrapper and hands out the sample.
    pub fn into_sample(self) -> Option<gst::Sample> {
        self.sample
    }

    /// True if this sample's caps differ from the previous sample's.
    /// Always false for an empty sample.
    pub fn has_new_caps(&self) -> bool {
        self.has_new_caps
    }
}

/// Remembers the caps of the last pulled sample so format changes can be
/// detected by comparison.
#[derive(Debug, Default)]
pub(crate) struct CapsTracker {
    last_caps: Option<gst::Caps>,
}

impl CapsTracker {
    /// Records `caps` and reports whether they differ from the last
    /// recorded ones. The very first sample always counts as new.
    pub(crate) fn track(&mut self, caps: Option<&gst::CapsRef>) -> bool {
        let Some(caps) = caps else {
            return false;
        };

        let changed = match &self.last_caps {
            Some(last) => last.as_ref() != caps,
            None => true,
        };
        self.last_caps = Some(caps.to_owned());
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(width: i32, height: i32) -> gst::Caps {
        gst::Caps::builder("video/x-raw")
            .field("format", "RGBx")
            .field("width", width)
            .field("height", height)
            .build()
    }

    #[test]
    fn test_first_caps_are_new() {
        gst::init().unwrap();

        let mut tracker = CapsTracker::default();
        assert!(tracker.track(Some(caps(320, 240).as_ref())));
    }

    #[test]
    fn test_same_caps_not_new() {
        gst::init().unwrap();

        let mut tracker = CapsTracker::default();
        assert!(tracker.track(Some(caps(320, 240).as_ref())));
        assert!(!tracker.track(Some(caps(320, 240).as_ref())));
        assert!(!tracker.track(Some(caps(320, 240).as_ref())));
    }

    #[test]
    fn test_caps_change_detected_exactly_once() {
        gst::init().unwrap();

        let mut tracker = CapsTracker::default();
        assert!(tracker.track(Some(caps(320, 240).as_ref())));
        assert!(tracker.track(Some(caps(640, 480).as_ref())));
        assert!(!tracker.track(Some(caps(640, 480).as_ref())));
    }

    #[test]
    fn test_missing_caps_ignored() {
        gst::init().unwrap();

        let mut tracker = CapsTracker::default();
        assert!(!tracker.track(None));
        // A later sample with caps still registers as new.
        assert!(tracker.track(Some(caps(320, 240).as_ref())));
    }

    #[test]
    fn test_empty_sample() {
        let sample = VideoSample::empty();
        assert!(sample.sample().is_none());
        assert!(!sample.has_new_caps());
    }
}
