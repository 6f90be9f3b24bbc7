//! Static pose classification plus the per-hand temporal pipeline
//! (stability window, swipe override, hold timing).

use std::fmt;
use std::time::Instant;

use crate::config::Thresholds;
use crate::landmarks::{
    HandPose, INDEX_PIP, INDEX_TIP, MIDDLE_PIP, MIDDLE_TIP, PINKY_PIP, PINKY_TIP, RING_PIP,
    RING_TIP, THUMB_IP, THUMB_TIP,
};
use crate::util::RingBuffer;

/// A finger counts as extended when its tip sits meaningfully farther
/// from the wrist than its proximal joint (normalized units).
const FINGER_EXTENDED_MARGIN: f32 = 0.02;

const SWIPE_CONFIDENCE: f32 = 0.90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GestureKind {
    Unknown,
    Pinch,
    Fist,
    OpenPalm,
    TwoFingers,
    ThumbsUp,
    ThumbsDown,
    PointUp,
    PointDown,
    SwipeLeft,
    SwipeRight,
}

impl GestureKind {
    /// Stable snake_case form used in binding keys and status output.
    pub fn as_key(self) -> &'static str {
        match self {
            GestureKind::Unknown => "unknown",
            GestureKind::Pinch => "pinch",
            GestureKind::Fist => "fist",
            GestureKind::OpenPalm => "open_palm",
            GestureKind::TwoFingers => "two_fingers",
            GestureKind::ThumbsUp => "thumbs_up",
            GestureKind::ThumbsDown => "thumbs_down",
            GestureKind::PointUp => "point_up",
            GestureKind::PointDown => "point_down",
            GestureKind::SwipeLeft => "swipe_left",
            GestureKind::SwipeRight => "swipe_right",
        }
    }

    pub fn from_key(s: &str) -> Option<Self> {
        let kind = match s {
            "unknown" => GestureKind::Unknown,
            "pinch" => GestureKind::Pinch,
            "fist" => GestureKind::Fist,
            "open_palm" => GestureKind::OpenPalm,
            "two_fingers" => GestureKind::TwoFingers,
            "thumbs_up" => GestureKind::ThumbsUp,
            "thumbs_down" => GestureKind::ThumbsDown,
            "point_up" => GestureKind::PointUp,
            "point_down" => GestureKind::PointDown,
            "swipe_left" => GestureKind::SwipeLeft,
            "swipe_right" => GestureKind::SwipeRight,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for GestureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

/// Per-hand, per-frame classification outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureResult {
    pub kind: GestureKind,
    pub confidence: f32,
    pub is_hold: bool,
    pub hold_seconds: f32,
}

impl GestureResult {
    pub fn unknown() -> Self {
        Self {
            kind: GestureKind::Unknown,
            confidence: 0.0,
            is_hold: false,
            hold_seconds: 0.0,
        }
    }
}

fn finger_extended(pose: &HandPose, tip: usize, pip: usize) -> bool {
    let wrist = pose.wrist();
    pose.point(tip).distance(wrist) - pose.point(pip).distance(wrist) > FINGER_EXTENDED_MARGIN
}

/// Classify one pose in isolation. Pure; depends only on the 21 points.
pub fn classify_static(pose: &HandPose, th: &Thresholds) -> (GestureKind, f32) {
    let thumb = finger_extended(pose, THUMB_TIP, THUMB_IP);
    let index = finger_extended(pose, INDEX_TIP, INDEX_PIP);
    let middle = finger_extended(pose, MIDDLE_TIP, MIDDLE_PIP);
    let ring = finger_extended(pose, RING_TIP, RING_PIP);
    let pinky = finger_extended(pose, PINKY_TIP, PINKY_PIP);

    // Thumb-index proximity wins over the extension counts below, even
    // when other fingers would match two_fingers.
    if pose.point(THUMB_TIP).distance(pose.point(INDEX_TIP)) <= th.pinch_distance_threshold {
        return (GestureKind::Pinch, 0.95);
    }

    let extended = [thumb, index, middle, ring, pinky]
        .iter()
        .filter(|e| **e)
        .count();

    if extended == 0 {
        return (GestureKind::Fist, 0.95);
    }
    if extended == 5 {
        return (GestureKind::OpenPalm, 0.95);
    }
    if index && middle && !ring && !pinky && !thumb {
        return (GestureKind::TwoFingers, 0.90);
    }
    if thumb && !index && !middle && !ring && !pinky {
        // image-space y grows downward
        if pose.point(THUMB_TIP).y < pose.wrist().y {
            return (GestureKind::ThumbsUp, 0.90);
        }
        return (GestureKind::ThumbsDown, 0.90);
    }
    if index && !middle && !ring && !pinky {
        if pose.point(INDEX_TIP).y < pose.wrist().y {
            return (GestureKind::PointUp, 0.85);
        }
        return (GestureKind::PointDown, 0.85);
    }

    (GestureKind::Unknown, 0.30)
}

/// Temporal bookkeeping for one tracked hand: the raw-label stability
/// window, the timestamped wrist history for swipes, and the hold timer.
#[derive(Debug)]
struct TemporalState {
    last_gesture: Option<GestureKind>,
    last_change: Instant,
    wrist_history: RingBuffer<(Instant, (f32, f32))>,
    stability: RingBuffer<GestureKind>,
}

impl TemporalState {
    fn new(th: &Thresholds, now: Instant) -> Self {
        Self {
            last_gesture: None,
            last_change: now,
            wrist_history: RingBuffer::new(th.wrist_history_frames),
            stability: RingBuffer::new(th.stability_frames),
        }
    }

    fn update_wrist(&mut self, now: Instant, xy: (f32, f32)) {
        self.wrist_history.push((now, xy));
    }

    /// Horizontal wrist displacement, oldest vs newest buffered sample,
    /// scaled to pixels. Under two samples there is nothing to compare.
    fn check_swipe(&self, width_px: f32, th: &Thresholds) -> Option<GestureKind> {
        if self.wrist_history.len() < 2 {
            return None;
        }
        let (_, first) = self.wrist_history.front()?;
        let (_, last) = self.wrist_history.back()?;
        let dx = (last.0 - first.0) * width_px;
        if dx.abs() >= th.swipe_min_displacement_px {
            return Some(if dx > 0.0 {
                GestureKind::SwipeRight
            } else {
                GestureKind::SwipeLeft
            });
        }
        None
    }

    /// Unanimous-window filter: a label is stable only once the window is
    /// full and every sample in it agrees.
    fn stable_label(&mut self, kind: GestureKind) -> Option<GestureKind> {
        self.stability.push(kind);
        if !self.stability.is_full() {
            return None;
        }
        if self.stability.iter().all(|k| *k == kind) {
            Some(kind)
        } else {
            None
        }
    }
}

/// One per-hand pipeline instance. The daemon owns two of these, one per
/// side; they never share state.
#[derive(Debug)]
pub struct GestureClassifier {
    th: Thresholds,
    state: TemporalState,
}

impl GestureClassifier {
    pub fn new(th: Thresholds, now: Instant) -> Self {
        let state = TemporalState::new(&th, now);
        Self { th, state }
    }

    /// Run the full per-frame pipeline for this hand. `now` must come
    /// from a monotonic clock; the caller samples it once per frame.
    pub fn infer(&mut self, pose: &HandPose, frame_size: (u32, u32), now: Instant) -> GestureResult {
        let (width_px, _) = frame_size;
        let wrist = pose.wrist();
        self.state.update_wrist(now, (wrist.x, wrist.y));

        let (raw, mut confidence) = classify_static(pose, &self.th);

        // Indecisive window: report nothing rather than flap. Swipe and
        // hold are not evaluated on unstable frames.
        let Some(mut kind) = self.state.stable_label(raw) else {
            return GestureResult::unknown();
        };

        // Strong horizontal movement reinterprets open/ambiguous shapes
        // only; a stabilized fist stays a fist no matter how it moved.
        if let Some(swipe) = self.state.check_swipe(width_px as f32, &self.th) {
            if matches!(
                kind,
                GestureKind::OpenPalm | GestureKind::TwoFingers | GestureKind::Unknown
            ) {
                kind = swipe;
                confidence = SWIPE_CONFIDENCE;
            }
        }

        let mut is_hold = false;
        let mut hold_seconds = 0.0;
        if self.state.last_gesture == Some(kind) {
            hold_seconds = now
                .saturating_duration_since(self.state.last_change)
                .as_secs_f32();
            if hold_seconds >= self.th.hold_min_duration_s {
                is_hold = true;
            }
        } else {
            self.state.last_gesture = Some(kind);
            self.state.last_change = now;
        }

        GestureResult {
            kind,
            confidence,
            is_hold,
            hold_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{LANDMARK_COUNT, Point};
    use std::time::Duration;

    const FINGERS: [(usize, usize); 5] = [
        (THUMB_TIP, THUMB_IP),
        (INDEX_TIP, INDEX_PIP),
        (MIDDLE_TIP, MIDDLE_PIP),
        (RING_TIP, RING_PIP),
        (PINKY_TIP, PINKY_PIP),
    ];

    /// Hand pointing up, wrist at the bottom of the image. Extended
    /// fingers get tips well above their pip joints; curled fingers get
    /// tips pulled back toward the wrist.
    fn pose_with(ext: [bool; 5]) -> HandPose {
        let mut pts = [Point::new(0.5, 0.9, 0.0); LANDMARK_COUNT];
        for (f, (tip, pip)) in FINGERS.iter().enumerate() {
            let x = 0.30 + 0.10 * f as f32;
            pts[*pip] = Point::new(x, 0.70, 0.0);
            pts[*tip] = Point::new(x, if ext[f] { 0.45 } else { 0.80 }, 0.0);
        }
        HandPose::from_points(&pts).unwrap()
    }

    /// Same hand shifted horizontally; translation preserves the shape.
    fn shifted(ext: [bool; 5], dx: f32) -> HandPose {
        let base = pose_with(ext);
        let pts: Vec<Point> = (0..LANDMARK_COUNT)
            .map(|i| {
                let p = base.point(i);
                Point::new(p.x + dx, p.y, p.z)
            })
            .collect();
        HandPose::from_points(&pts).unwrap()
    }

    /// Hand pointing down, wrist at the top of the image.
    fn inverted_pose(thumb_down: bool) -> HandPose {
        let mut pts = [Point::new(0.5, 0.2, 0.0); LANDMARK_COUNT];
        for (f, (tip, pip)) in FINGERS.iter().enumerate() {
            let x = 0.35 + 0.10 * f as f32;
            pts[*pip] = Point::new(x, 0.35, 0.0);
            pts[*tip] = Point::new(x, 0.25, 0.0);
        }
        if thumb_down {
            pts[THUMB_IP] = Point::new(0.35, 0.30, 0.0);
            pts[THUMB_TIP] = Point::new(0.30, 0.45, 0.0);
        } else {
            // index extended downward instead
            pts[INDEX_PIP] = Point::new(0.55, 0.35, 0.0);
            pts[INDEX_TIP] = Point::new(0.55, 0.50, 0.0);
        }
        HandPose::from_points(&pts).unwrap()
    }

    fn th() -> Thresholds {
        Thresholds::default()
    }

    #[test]
    fn static_fist_open_palm_two_fingers() {
        let t = th();
        assert_eq!(
            classify_static(&pose_with([false; 5]), &t),
            (GestureKind::Fist, 0.95)
        );
        assert_eq!(
            classify_static(&pose_with([true; 5]), &t),
            (GestureKind::OpenPalm, 0.95)
        );
        assert_eq!(
            classify_static(&pose_with([false, true, true, false, false]), &t),
            (GestureKind::TwoFingers, 0.90)
        );
    }

    #[test]
    fn static_thumbs_up_and_down_follow_y_rule() {
        let t = th();
        // thumb tip above the wrist in image space
        assert_eq!(
            classify_static(&pose_with([true, false, false, false, false]), &t),
            (GestureKind::ThumbsUp, 0.90)
        );
        // thumb tip below the wrist
        assert_eq!(
            classify_static(&inverted_pose(true), &t),
            (GestureKind::ThumbsDown, 0.90)
        );
    }

    #[test]
    fn static_point_up_and_down() {
        let t = th();
        assert_eq!(
            classify_static(&pose_with([false, true, false, false, false]), &t),
            (GestureKind::PointUp, 0.85)
        );
        assert_eq!(
            classify_static(&inverted_pose(false), &t),
            (GestureKind::PointDown, 0.85)
        );
    }

    #[test]
    fn static_pinch_beats_extension_counts() {
        // open palm, but thumb tip brought onto the index tip
        let base = pose_with([true; 5]);
        let mut pts: Vec<Point> = (0..LANDMARK_COUNT).map(|i| *base.point(i)).collect();
        pts[THUMB_TIP] = Point::new(0.41, 0.46, 0.0);
        let pose = HandPose::from_points(&pts).unwrap();
        assert_eq!(classify_static(&pose, &th()), (GestureKind::Pinch, 0.95));
    }

    #[test]
    fn static_partial_extension_is_unknown() {
        // only the middle finger extended matches no rule
        assert_eq!(
            classify_static(&pose_with([false, false, true, false, false]), &th()),
            (GestureKind::Unknown, 0.30)
        );
    }

    #[test]
    fn stability_gate_holds_back_first_frames() {
        let t0 = Instant::now();
        let mut clf = GestureClassifier::new(th(), t0);
        let fist = pose_with([false; 5]);
        for i in 0..4 {
            let now = t0 + Duration::from_millis(33 * i);
            assert_eq!(clf.infer(&fist, (1280, 720), now), GestureResult::unknown());
        }
        let res = clf.infer(&fist, (1280, 720), t0 + Duration::from_millis(33 * 4));
        assert_eq!(res.kind, GestureKind::Fist);
        assert_eq!(res.confidence, 0.95);
        assert!(!res.is_hold);
        assert_eq!(res.hold_seconds, 0.0);
    }

    #[test]
    fn mixed_window_stays_unknown_until_unanimous() {
        let t0 = Instant::now();
        let mut clf = GestureClassifier::new(th(), t0);
        let fist = pose_with([false; 5]);
        let palm = pose_with([true; 5]);
        for i in 0..4 {
            clf.infer(&fist, (1280, 720), t0 + Duration::from_millis(33 * i));
        }
        // window now [F F F F P]: not unanimous
        let mut now = t0 + Duration::from_millis(33 * 4);
        assert_eq!(clf.infer(&palm, (1280, 720), now), GestureResult::unknown());
        // three more palms still leave a fist in the window
        for i in 5..8 {
            now = t0 + Duration::from_millis(33 * i);
            assert_eq!(clf.infer(&palm, (1280, 720), now), GestureResult::unknown());
        }
        // fifth consecutive palm fills the window unanimously
        now = t0 + Duration::from_millis(33 * 8);
        let res = clf.infer(&palm, (1280, 720), now);
        assert_eq!(res.kind, GestureKind::OpenPalm);
    }

    #[test]
    fn open_palm_with_displacement_becomes_swipe() {
        let t0 = Instant::now();
        let mut clf = GestureClassifier::new(th(), t0);
        let mut last = GestureResult::unknown();
        for i in 0..10 {
            let now = t0 + Duration::from_millis(33 * i);
            last = clf.infer(&shifted([true; 5], 0.03 * i as f32), (1280, 720), now);
        }
        assert_eq!(last.kind, GestureKind::SwipeRight);
        assert_eq!(last.confidence, 0.90);

        // and the mirror image swipes left
        let mut clf = GestureClassifier::new(th(), t0);
        for i in 0..10 {
            let now = t0 + Duration::from_millis(33 * i);
            last = clf.infer(&shifted([true; 5], -0.03 * i as f32), (1280, 720), now);
        }
        assert_eq!(last.kind, GestureKind::SwipeLeft);
    }

    #[test]
    fn fist_is_never_reinterpreted_as_swipe() {
        let t0 = Instant::now();
        let mut clf = GestureClassifier::new(th(), t0);
        let mut last = GestureResult::unknown();
        for i in 0..10 {
            let now = t0 + Duration::from_millis(33 * i);
            last = clf.infer(&shifted([false; 5], 0.03 * i as f32), (1280, 720), now);
        }
        assert_eq!(last.kind, GestureKind::Fist);
    }

    #[test]
    fn small_displacement_does_not_swipe() {
        let t0 = Instant::now();
        let mut clf = GestureClassifier::new(th(), t0);
        let mut last = GestureResult::unknown();
        for i in 0..10 {
            let now = t0 + Duration::from_millis(33 * i);
            // 9 * 0.01 * 1280 = 115 px, under the 160 px threshold
            last = clf.infer(&shifted([true; 5], 0.01 * i as f32), (1280, 720), now);
        }
        assert_eq!(last.kind, GestureKind::OpenPalm);
    }

    #[test]
    fn hold_grows_monotonically_and_resets_on_change() {
        let t0 = Instant::now();
        let mut clf = GestureClassifier::new(th(), t0);
        let fist = pose_with([false; 5]);
        let palm = pose_with([true; 5]);

        for i in 0..5 {
            clf.infer(&fist, (1280, 720), t0 + Duration::from_millis(33 * i));
        }
        let t_stable = t0 + Duration::from_millis(33 * 4);

        let r1 = clf.infer(&fist, (1280, 720), t_stable + Duration::from_secs(1));
        assert!(!r1.is_hold);
        let r2 = clf.infer(&fist, (1280, 720), t_stable + Duration::from_millis(1500));
        assert!(r2.hold_seconds > r1.hold_seconds);
        let r3 = clf.infer(&fist, (1280, 720), t_stable + Duration::from_millis(2500));
        assert!(r3.is_hold);
        assert!(r3.hold_seconds >= 2.0);

        // switch to palm: five frames to restabilize, then a fresh timer
        let mut now = t_stable + Duration::from_millis(2600);
        let mut res = GestureResult::unknown();
        for _ in 0..5 {
            now += Duration::from_millis(33);
            res = clf.infer(&palm, (1280, 720), now);
        }
        assert_eq!(res.kind, GestureKind::OpenPalm);
        assert!(!res.is_hold);
        assert_eq!(res.hold_seconds, 0.0);
    }

    #[test]
    fn gesture_key_round_trip() {
        for kind in [
            GestureKind::Pinch,
            GestureKind::OpenPalm,
            GestureKind::SwipeLeft,
            GestureKind::ThumbsDown,
        ] {
            assert_eq!(GestureKind::from_key(kind.as_key()), Some(kind));
        }
        assert_eq!(GestureKind::from_key("wave"), None);
    }
}
