use crate::geometry::Point;

/// MoveNet (COCO) の 17 キーポイントインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl KeypointIndex {
    pub const COUNT: usize = 17;

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Nose),
            1 => Some(Self::LeftEye),
            2 => Some(Self::RightEye),
            3 => Some(Self::LeftEar),
            4 => Some(Self::RightEar),
            5 => Some(Self::LeftShoulder),
            6 => Some(Self::RightShoulder),
            7 => Some(Self::LeftElbow),
            8 => Some(Self::RightElbow),
            9 => Some(Self::LeftWrist),
            10 => Some(Self::RightWrist),
            11 => Some(Self::LeftHip),
            12 => Some(Self::RightHip),
            13 => Some(Self::LeftKnee),
            14 => Some(Self::RightKnee),
            15 => Some(Self::LeftAnkle),
            16 => Some(Self::RightAnkle),
            _ => None,
        }
    }

    /// 部位名（MLランタイムの出力形式と同じ表記）
    pub fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        (0..Self::COUNT)
            .filter_map(Self::from_index)
            .find(|part| part.name() == name)
    }
}

/// MLランタイムが1フレームごとに返す生キーポイント
///
/// 座標はフレームのピクセル座標。zは2Dモデルでは0.0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawKeypoint {
    pub part: KeypointIndex,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub score: f32,
}

/// 1フレーム分の生ポーズ検出結果（キーポイント列 + 全体信頼度）
#[derive(Debug, Clone, PartialEq)]
pub struct RawPose {
    pub keypoints: Vec<RawKeypoint>,
    pub score: f32,
}

/// 信頼度フィルタを通過したキーポイント
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub part: KeypointIndex,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub score: f32,
}

impl Keypoint {
    pub fn point(&self) -> Point {
        Point::with_z(self.x, self.y, self.z)
    }
}

/// 部位名で引けるキーポイント集合
///
/// 閾値を超えたキーポイントのみを保持する。存在しない部位は「確信を
/// 持って検出されなかった」を意味し、ゼロ点などで補完してはならない。
#[derive(Debug, Clone, Default)]
pub struct KeypointSet {
    slots: [Option<Keypoint>; KeypointIndex::COUNT],
}

impl KeypointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, keypoint: Keypoint) {
        self.slots[keypoint.part as usize] = Some(keypoint);
    }

    pub fn get(&self, part: KeypointIndex) -> Option<&Keypoint> {
        self.slots[part as usize].as_ref()
    }

    pub fn point(&self, part: KeypointIndex) -> Option<Point> {
        self.get(part).map(Keypoint::point)
    }

    /// 保持しているキーポイント数
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_none())
    }
}

/// 生キーポイント列を信頼度でフィルタして部位名で索引付けする
///
/// `score > min_confidence` のエントリのみを残す。同じ部位が複数回
/// 現れた場合は後勝ち（正しいモデルでは起こらないが、起きても
/// クラッシュさせない）。
pub fn map_keypoints(raw: &[RawKeypoint], min_confidence: f32) -> KeypointSet {
    let mut set = KeypointSet::new();
    for kp in raw {
        if kp.score > min_confidence {
            set.insert(Keypoint {
                part: kp.part,
                x: kp.x,
                y: kp.y,
                z: kp.z,
                score: kp.score,
            });
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(part: KeypointIndex, x: f32, y: f32, score: f32) -> RawKeypoint {
        RawKeypoint {
            part,
            x,
            y,
            z: 0.0,
            score,
        }
    }

    #[test]
    fn test_keypoint_index_count() {
        assert_eq!(KeypointIndex::COUNT, 17);
    }

    #[test]
    fn test_keypoint_index_from_index() {
        assert_eq!(KeypointIndex::from_index(0), Some(KeypointIndex::Nose));
        assert_eq!(KeypointIndex::from_index(16), Some(KeypointIndex::RightAnkle));
        assert_eq!(KeypointIndex::from_index(17), None);
    }

    #[test]
    fn test_name_roundtrip() {
        for i in 0..KeypointIndex::COUNT {
            let part = KeypointIndex::from_index(i).unwrap();
            assert_eq!(KeypointIndex::from_name(part.name()), Some(part));
        }
        assert_eq!(KeypointIndex::from_name("left_toe"), None);
    }

    #[test]
    fn test_map_keypoints_filters_by_confidence() {
        let raw_keypoints = [
            raw(KeypointIndex::Nose, 10.0, 20.0, 0.9),
            raw(KeypointIndex::LeftKnee, 30.0, 40.0, 0.5),
            raw(KeypointIndex::RightKnee, 50.0, 60.0, 0.51),
        ];
        let set = map_keypoints(&raw_keypoints, 0.5);
        assert!(set.get(KeypointIndex::Nose).is_some());
        // 閾値ちょうどは通過しない（score > min_confidence）
        assert!(set.get(KeypointIndex::LeftKnee).is_none());
        assert!(set.get(KeypointIndex::RightKnee).is_some());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_map_keypoints_missing_part_stays_absent() {
        let set = map_keypoints(&[], 0.5);
        assert!(set.is_empty());
        assert!(set.get(KeypointIndex::LeftHip).is_none());
        assert!(set.point(KeypointIndex::LeftHip).is_none());
    }

    #[test]
    fn test_map_keypoints_duplicate_part_last_wins() {
        let raw_keypoints = [
            raw(KeypointIndex::Nose, 1.0, 1.0, 0.8),
            raw(KeypointIndex::Nose, 9.0, 9.0, 0.7),
        ];
        let set = map_keypoints(&raw_keypoints, 0.5);
        let nose = set.get(KeypointIndex::Nose).unwrap();
        assert_eq!(nose.x, 9.0);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_keypoint_point_carries_z() {
        let mut set = KeypointSet::new();
        set.insert(Keypoint {
            part: KeypointIndex::Nose,
            x: 1.0,
            y: 2.0,
            z: 3.0,
            score: 0.9,
        });
        let p = set.point(KeypointIndex::Nose).unwrap();
        assert_eq!((p.x, p.y, p.z), (1.0, 2.0, 3.0));
    }
}
