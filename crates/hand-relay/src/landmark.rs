//! Hand keypoints as reported by a landmark detector.

/// A single 2D landmark point, in video frame pixel coordinates.
#[derive(Debug, Default, PartialEq, Clone, Copy)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
}

impl Keypoint {
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// The keypoints of a single hand detected in a single frame.
///
/// Keypoints are ordered as in [`LandmarkIdx`]. Detectors are expected to report all 21 of them,
/// but only the ones in [`PALM_LANDMARKS`] are required for computing a palm position.
#[derive(Debug, Default, Clone)]
pub struct HandKeypoints {
    keypoints: Vec<Keypoint>,
}

impl HandKeypoints {
    /// Number of landmarks produced by MediaPipe-style hand landmark models.
    pub const NUM_LANDMARKS: usize = 21;

    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self { keypoints }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    /// Returns the keypoint at `index`, or `None` if the detector didn't report that many.
    pub fn get(&self, index: usize) -> Option<Keypoint> {
        self.keypoints.get(index).copied()
    }

    /// Returns a named landmark's keypoint.
    pub fn landmark(&self, idx: LandmarkIdx) -> Option<Keypoint> {
        self.get(idx as usize)
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }
}

impl FromIterator<Keypoint> for HandKeypoints {
    fn from_iter<T: IntoIterator<Item = Keypoint>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Names for the hand landmarks.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// The landmarks averaged to estimate the center of the palm.
///
/// The thumb is left out, since it moves independently of the palm.
pub const PALM_LANDMARKS: &[LandmarkIdx] = {
    use LandmarkIdx::*;
    &[
        Wrist,
        IndexFingerMcp,
        MiddleFingerMcp,
        RingFingerMcp,
        PinkyMcp,
    ]
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palm_landmark_indices() {
        let indices = PALM_LANDMARKS
            .iter()
            .map(|lm| *lm as usize)
            .collect::<Vec<_>>();
        assert_eq!(indices, [0, 5, 9, 13, 17]);
        assert_eq!(LandmarkIdx::PinkyTip as usize, HandKeypoints::NUM_LANDMARKS - 1);
    }

    #[test]
    fn missing_keypoints() {
        let hand = (0..10).map(|i| Keypoint::new(i as f32, 0.0)).collect::<HandKeypoints>();
        assert_eq!(hand.len(), 10);
        assert_eq!(hand.landmark(LandmarkIdx::MiddleFingerMcp), Some(Keypoint::new(9.0, 0.0)));
        assert_eq!(hand.landmark(LandmarkIdx::RingFingerMcp), None);
    }
}
