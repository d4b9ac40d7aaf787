//! Palm position estimation from hand keypoints.

use std::fmt;

use crate::landmark::{HandKeypoints, LandmarkIdx, PALM_LANDMARKS};

/// Approximate center of a detected hand, in mirrored video frame pixel coordinates.
#[derive(Debug, Default, PartialEq, Clone, Copy)]
pub struct PalmPosition {
    pub x: f32,
    pub y: f32,
}

/// Error returned by [`palm_position`] when a hand lacks one of the [`PALM_LANDMARKS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PalmError {
    missing: LandmarkIdx,
    len: usize,
}

impl PalmError {
    /// Returns the first palm landmark that was missing.
    pub fn missing(&self) -> LandmarkIdx {
        self.missing
    }
}

impl fmt::Display for PalmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hand is missing keypoint {:?} (index {}, got {} keypoints)",
            self.missing, self.missing as usize, self.len,
        )
    }
}

impl std::error::Error for PalmError {}

/// Averages the palm landmarks of `hand` and mirrors the result horizontally.
///
/// `frame_width` is the width of the frame the keypoints are relative to. The mirrored X
/// coordinate is `frame_width - avg_x`, the Y coordinate is passed through.
pub fn palm_position(hand: &HandKeypoints, frame_width: f32) -> Result<PalmPosition, PalmError> {
    let (mut sum_x, mut sum_y) = (0.0, 0.0);
    for &lm in PALM_LANDMARKS {
        let kp = hand.landmark(lm).ok_or(PalmError {
            missing: lm,
            len: hand.len(),
        })?;
        sum_x += kp.x;
        sum_y += kp.y;
    }

    let count = PALM_LANDMARKS.len() as f32;
    Ok(PalmPosition {
        x: frame_width - sum_x / count,
        y: sum_y / count,
    })
}

/// Computes one [`PalmPosition`] per hand, preserving the order of `hands`.
pub fn palm_positions(
    hands: &[HandKeypoints],
    frame_width: f32,
) -> Result<Vec<PalmPosition>, PalmError> {
    hands
        .iter()
        .map(|hand| palm_position(hand, frame_width))
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::landmark::{HandKeypoints, Keypoint};

    use super::*;

    const WIDTH: f32 = 640.0;

    /// Builds a full hand where every palm landmark sits at `palm[i]` and all other keypoints are
    /// far away, so that using the wrong indices is noticeable.
    fn hand_with_palm(palm: [(f32, f32); 5]) -> HandKeypoints {
        let mut kps = vec![Keypoint::new(-1000.0, -1000.0); HandKeypoints::NUM_LANDMARKS];
        for (lm, (x, y)) in PALM_LANDMARKS.iter().zip(palm) {
            kps[*lm as usize] = Keypoint::new(x, y);
        }
        HandKeypoints::new(kps)
    }

    #[test]
    fn averages_and_mirrors() {
        let hand = hand_with_palm([(0.0, 0.0), (10.0, 0.0), (20.0, 0.0), (30.0, 0.0), (40.0, 0.0)]);
        let pos = palm_position(&hand, WIDTH).unwrap();
        assert_relative_eq!(pos.x, 620.0);
        assert_relative_eq!(pos.y, 0.0);
    }

    #[test]
    fn mirror_boundaries() {
        let left = hand_with_palm([(0.0, 5.0); 5]);
        let right = hand_with_palm([(640.0, 5.0); 5]);
        assert_eq!(palm_position(&left, WIDTH).unwrap(), PalmPosition { x: 640.0, y: 5.0 });
        assert_eq!(palm_position(&right, WIDTH).unwrap(), PalmPosition { x: 0.0, y: 5.0 });
    }

    #[test]
    fn mirror_and_passthrough_laws() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        for _ in 0..500 {
            let x = rng.f32() * WIDTH;
            let y = rng.f32() * 480.0;
            let pos = palm_position(&hand_with_palm([(x, y); 5]), WIDTH).unwrap();
            assert_relative_eq!(pos.x, WIDTH - x, epsilon = 1e-3);
            assert_relative_eq!(pos.y, y, epsilon = 1e-3);
        }
    }

    #[test]
    fn averages_independently() {
        let hand = hand_with_palm([(100.0, 10.0), (100.0, 20.0), (100.0, 30.0), (200.0, 40.0), (0.0, 50.0)]);
        let pos = palm_position(&hand, WIDTH).unwrap();
        assert_relative_eq!(pos.x, 540.0);
        assert_relative_eq!(pos.y, 30.0);
    }

    #[test]
    fn minimal_hand() {
        // 18 keypoints are enough to reach the pinky MCP.
        let hand = (0..18).map(|_| Keypoint::new(40.0, 2.0)).collect::<HandKeypoints>();
        assert_eq!(palm_position(&hand, WIDTH).unwrap(), PalmPosition { x: 600.0, y: 2.0 });
    }

    #[test]
    fn missing_landmark() {
        let hand = (0..17).map(|_| Keypoint::default()).collect::<HandKeypoints>();
        let err = palm_position(&hand, WIDTH).unwrap_err();
        assert_eq!(err.missing(), LandmarkIdx::PinkyMcp);
        assert_eq!(
            err.to_string(),
            "hand is missing keypoint PinkyMcp (index 17, got 17 keypoints)"
        );
    }

    #[test]
    fn preserves_hand_order() {
        let hands = [
            hand_with_palm([(10.0, 1.0); 5]),
            hand_with_palm([(20.0, 2.0); 5]),
        ];
        let positions = palm_positions(&hands, WIDTH).unwrap();
        assert_eq!(
            positions,
            [PalmPosition { x: 630.0, y: 1.0 }, PalmPosition { x: 620.0, y: 2.0 }]
        );
        assert!(palm_positions(&[], WIDTH).unwrap().is_empty());
    }
}
