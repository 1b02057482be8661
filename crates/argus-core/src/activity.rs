//! Pose-derived activity classification.
//!
//! A memoryless classifier over one person's landmarks: an ordered rule
//! table is evaluated top-down and the first matching rule wins, which makes
//! the priority between overlapping gestures (a wrist at the ear also counts
//! as "above the shoulder") an explicit contract rather than an accident of
//! code order. All coordinates are normalized to the analyzed region, so
//! the thresholds hold at any resolution.

use crate::pose::{Landmark, PoseLandmarks};
use std::fmt;

/// Wrist-to-ear proximity (both axes) for the phone rule.
const PHONE_NEAR: f32 = 0.08;
/// How far above the shoulder line a wrist must be to count as raised.
const RAISE_MARGIN: f32 = 0.05;
/// Slack below the nose line for the hand-near-face rule.
const FACE_MARGIN: f32 = 0.03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Closed set of activity labels. Derived per person per frame; no
/// cross-frame state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    OnPhone(Side),
    BothHandsUp,
    RaisingHand(Side),
    HandNearFace,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activity::Idle => write!(f, "Idle"),
            Activity::OnPhone(Side::Left) => write!(f, "Talking on phone (L)"),
            Activity::OnPhone(Side::Right) => write!(f, "Talking on phone (R)"),
            Activity::BothHandsUp => write!(f, "Both hands up"),
            Activity::RaisingHand(Side::Left) => write!(f, "Raising hand (Left)"),
            Activity::RaisingHand(Side::Right) => write!(f, "Raising hand (Right)"),
            Activity::HandNearFace => write!(f, "Hand near face"),
        }
    }
}

type RuleFn = fn(&PoseLandmarks) -> Option<Activity>;

/// Rule table in priority order. First `Some` wins.
const RULES: &[(&str, RuleFn)] = &[
    ("phone-at-ear", phone_at_ear),
    ("both-hands-up", both_hands_up),
    ("raising-hand", raising_hand),
    ("hand-near-face", hand_near_face),
];

/// Classify one person's activity from their landmarks.
///
/// A rule is skipped whenever a landmark it needs is not visible; if no
/// rule fires the result is `Idle`. Callers with no landmarks at all
/// (pose estimation failed or found nobody) report `Idle` directly.
pub fn classify(landmarks: &PoseLandmarks) -> Activity {
    RULES
        .iter()
        .find_map(|(_, rule)| rule(landmarks))
        .unwrap_or(Activity::Idle)
}

fn near(a: Landmark, b: Landmark) -> bool {
    (a.y - b.y).abs() < PHONE_NEAR && (a.x - b.x).abs() < PHONE_NEAR
}

/// Wrist held within a small box of the same-side ear. Right side is
/// checked first.
fn phone_at_ear(lm: &PoseLandmarks) -> Option<Activity> {
    let pairs = [
        (lm.right_wrist(), lm.right_ear(), Side::Right),
        (lm.left_wrist(), lm.left_ear(), Side::Left),
    ];
    for (wrist, ear, side) in pairs {
        if wrist.is_visible() && ear.is_visible() && near(wrist, ear) {
            return Some(Activity::OnPhone(side));
        }
    }
    None
}

/// Average shoulder height, requiring both shoulders visible.
fn shoulder_line(lm: &PoseLandmarks) -> Option<f32> {
    let (ls, rs) = (lm.left_shoulder(), lm.right_shoulder());
    if ls.is_visible() && rs.is_visible() {
        Some((ls.y + rs.y) / 2.0)
    } else {
        None
    }
}

fn is_raised(wrist: Landmark, shoulder_y: f32) -> bool {
    wrist.is_visible() && wrist.y < shoulder_y - RAISE_MARGIN
}

fn both_hands_up(lm: &PoseLandmarks) -> Option<Activity> {
    let shoulder_y = shoulder_line(lm)?;
    if is_raised(lm.left_wrist(), shoulder_y) && is_raised(lm.right_wrist(), shoulder_y) {
        Some(Activity::BothHandsUp)
    } else {
        None
    }
}

/// One wrist above the shoulder line. Right before left.
fn raising_hand(lm: &PoseLandmarks) -> Option<Activity> {
    let shoulder_y = shoulder_line(lm)?;
    if is_raised(lm.right_wrist(), shoulder_y) {
        Some(Activity::RaisingHand(Side::Right))
    } else if is_raised(lm.left_wrist(), shoulder_y) {
        Some(Activity::RaisingHand(Side::Left))
    } else {
        None
    }
}

/// Wrist lifted above the nose line (with a little slack below it).
fn hand_near_face(lm: &PoseLandmarks) -> Option<Activity> {
    let nose = lm.nose();
    if !nose.is_visible() {
        return None;
    }
    let lifted = |wrist: Landmark| wrist.is_visible() && wrist.y < nose.y + FACE_MARGIN;
    if lifted(lm.right_wrist()) || lifted(lm.left_wrist()) {
        Some(Activity::HandNearFace)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Landmark, PoseLandmarks, KEYPOINT_COUNT};

    // Keypoint slots (COCO order) used by the builder below.
    const NOSE: usize = 0;
    const LEFT_EAR: usize = 3;
    const RIGHT_EAR: usize = 4;
    const LEFT_SHOULDER: usize = 5;
    const RIGHT_SHOULDER: usize = 6;
    const LEFT_WRIST: usize = 9;
    const RIGHT_WRIST: usize = 10;
    const LEFT_HIP: usize = 11;
    const RIGHT_HIP: usize = 12;

    fn at(x: f32, y: f32) -> Landmark {
        Landmark { x, y, score: 0.95 }
    }

    fn hidden() -> Landmark {
        Landmark {
            x: 0.0,
            y: 0.0,
            score: 0.1,
        }
    }

    /// A person standing at rest: nose up top, shoulders mid, wrists down
    /// by the hips.
    fn standing() -> [Landmark; KEYPOINT_COUNT] {
        let mut points = [hidden(); KEYPOINT_COUNT];
        points[NOSE] = at(0.50, 0.15);
        points[LEFT_EAR] = at(0.42, 0.16);
        points[RIGHT_EAR] = at(0.58, 0.16);
        points[LEFT_SHOULDER] = at(0.35, 0.35);
        points[RIGHT_SHOULDER] = at(0.65, 0.35);
        points[LEFT_WRIST] = at(0.30, 0.70);
        points[RIGHT_WRIST] = at(0.70, 0.70);
        points[LEFT_HIP] = at(0.40, 0.62);
        points[RIGHT_HIP] = at(0.60, 0.62);
        points
    }

    fn pose(points: [Landmark; KEYPOINT_COUNT]) -> PoseLandmarks {
        PoseLandmarks::new(points)
    }

    #[test]
    fn standing_is_idle() {
        assert_eq!(classify(&pose(standing())), Activity::Idle);
    }

    #[test]
    fn wrist_at_ear_is_phone() {
        let mut p = standing();
        p[RIGHT_WRIST] = at(0.59, 0.18); // within 0.08 of the right ear
        assert_eq!(classify(&pose(p)), Activity::OnPhone(Side::Right));
    }

    #[test]
    fn phone_outranks_raised_hand() {
        // A wrist at ear height is also far above the shoulder line; the
        // phone rule must win.
        let mut p = standing();
        p[LEFT_WRIST] = at(0.43, 0.17);
        assert_eq!(classify(&pose(p)), Activity::OnPhone(Side::Left));
    }

    #[test]
    fn both_wrists_above_shoulders() {
        let mut p = standing();
        p[LEFT_WRIST] = at(0.30, 0.20);
        p[RIGHT_WRIST] = at(0.70, 0.20);
        assert_eq!(classify(&pose(p)), Activity::BothHandsUp);
    }

    #[test]
    fn single_raised_hand_reports_side() {
        let mut p = standing();
        p[RIGHT_WRIST] = at(0.72, 0.22);
        assert_eq!(classify(&pose(p)), Activity::RaisingHand(Side::Right));

        let mut p = standing();
        p[LEFT_WRIST] = at(0.28, 0.22);
        assert_eq!(classify(&pose(p)), Activity::RaisingHand(Side::Left));
    }

    #[test]
    fn barely_raised_wrist_is_not_raised() {
        // Above the shoulder line but inside the margin.
        let mut p = standing();
        p[RIGHT_WRIST] = at(0.72, 0.33);
        assert_eq!(classify(&pose(p)), Activity::Idle);
    }

    #[test]
    fn hand_near_face_needs_shoulders_hidden_or_wrist_below_margin() {
        // Wrist above the nose but shoulders invisible: raise rules are
        // skipped and the face rule fires.
        let mut p = standing();
        p[LEFT_SHOULDER] = hidden();
        p[RIGHT_SHOULDER] = hidden();
        p[RIGHT_WRIST] = at(0.70, 0.12);
        assert_eq!(classify(&pose(p)), Activity::HandNearFace);
    }

    #[test]
    fn invisible_wrist_cannot_trigger_phone() {
        let mut p = standing();
        p[RIGHT_WRIST] = Landmark {
            x: 0.58,
            y: 0.16,
            score: 0.2,
        };
        assert_eq!(classify(&pose(p)), Activity::Idle);
    }

    #[test]
    fn all_hidden_is_idle() {
        assert_eq!(classify(&pose([hidden(); KEYPOINT_COUNT])), Activity::Idle);
    }

    #[test]
    fn labels_match_log_vocabulary() {
        assert_eq!(Activity::Idle.to_string(), "Idle");
        assert_eq!(
            Activity::OnPhone(Side::Left).to_string(),
            "Talking on phone (L)"
        );
        assert_eq!(Activity::BothHandsUp.to_string(), "Both hands up");
        assert_eq!(
            Activity::RaisingHand(Side::Right).to_string(),
            "Raising hand (Right)"
        );
        assert_eq!(Activity::HandNearFace.to_string(), "Hand near face");
    }
}
