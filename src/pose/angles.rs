use crate::geometry::{angle_at, Point};

use super::keypoint::{KeypointIndex, KeypointSet};

use KeypointIndex::*;

/// 1フレーム分の関節角度（度数 [0, 180]）
///
/// 計算に必要なキーポイントが欠けた角度は`None`のまま残る。体の一部が
/// 隠れている・フレーム外にあるのは定常状態であり、エラーではない。
/// 角度同士は独立で、ある角度の入力欠落が他の角度を無効にすることはない。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyAngles {
    pub knee: Option<f32>,
    pub hip: Option<f32>,
    pub shoulder: Option<f32>,
    pub elbow: Option<f32>,
    pub ankle: Option<f32>,
    pub neck: Option<f32>,
}

/// 優先順位付きの3点組（右側優先、左側フォールバック）
/// 角度の頂点は中央のキーポイント
const KNEE_TRIPLETS: [[KeypointIndex; 3]; 2] = [
    [RightHip, RightKnee, RightAnkle],
    [LeftHip, LeftKnee, LeftAnkle],
];

const HIP_TRIPLETS: [[KeypointIndex; 3]; 2] = [
    [RightShoulder, RightHip, RightKnee],
    [LeftShoulder, LeftHip, LeftKnee],
];

const SHOULDER_TRIPLETS: [[KeypointIndex; 3]; 2] = [
    [RightElbow, RightShoulder, RightHip],
    [LeftElbow, LeftShoulder, LeftHip],
];

const ELBOW_TRIPLETS: [[KeypointIndex; 3]; 2] = [
    [RightShoulder, RightElbow, RightWrist],
    [LeftShoulder, LeftElbow, LeftWrist],
];

/// 足首角度用: 膝・足首のペア（右側優先）
const ANKLE_PAIRS: [[KeypointIndex; 2]; 2] = [
    [RightKnee, RightAnkle],
    [LeftKnee, LeftAnkle],
];

/// 首角度用: 肩（右側優先）。鼻と合わせて使う
const NECK_SHOULDERS: [KeypointIndex; 2] = [RightShoulder, LeftShoulder];

/// 足首の真下に置く地面参照点のオフセット（ピクセル、画像Y軸は下向き）
///
/// 検出キーポイントではなく合成点。オフセット量は撮影スケールに依存する
/// 設計値で、物理定数ではない。
const ANKLE_GROUND_OFFSET_PX: f32 = 50.0;

/// 肩の真上に置く鉛直参照点のオフセット（ピクセル）
const NECK_VERTICAL_OFFSET_PX: f32 = 100.0;

/// キーポイント集合から6つの関節角度を計算する
///
/// 各角度は3点組の優先リストを順に試し、3点すべてが存在する最初の組で
/// 計算する。どの組も揃わなければ`None`
pub fn compute_body_angles(keypoints: &KeypointSet) -> BodyAngles {
    BodyAngles {
        knee: angle_from_triplets(keypoints, &KNEE_TRIPLETS),
        hip: angle_from_triplets(keypoints, &HIP_TRIPLETS),
        shoulder: angle_from_triplets(keypoints, &SHOULDER_TRIPLETS),
        elbow: angle_from_triplets(keypoints, &ELBOW_TRIPLETS),
        ankle: ankle_angle(keypoints),
        neck: neck_angle(keypoints),
    }
}

fn angle_from_triplets(
    keypoints: &KeypointSet,
    triplets: &[[KeypointIndex; 3]],
) -> Option<f32> {
    for [a, b, c] in triplets {
        if let (Some(pa), Some(pb), Some(pc)) = (
            keypoints.point(*a),
            keypoints.point(*b),
            keypoints.point(*c),
        ) {
            return Some(angle_at(pa, pb, pc));
        }
    }
    None
}

/// 足首角度: 膝-足首-地面参照点
///
/// 地面参照点は足首の鉛直下方に合成し、地面に対するおおよその角度を得る
fn ankle_angle(keypoints: &KeypointSet) -> Option<f32> {
    for [knee, ankle] in &ANKLE_PAIRS {
        if let (Some(knee_pt), Some(ankle_pt)) =
            (keypoints.point(*knee), keypoints.point(*ankle))
        {
            let ground = Point::new(ankle_pt.x, ankle_pt.y + ANKLE_GROUND_OFFSET_PX);
            return Some(angle_at(knee_pt, ankle_pt, ground));
        }
    }
    None
}

/// 首角度: 鉛直参照点-肩-鼻
///
/// 鉛直参照点は肩の真上に合成し、頭部の前傾を肩基準で測る
fn neck_angle(keypoints: &KeypointSet) -> Option<f32> {
    let nose = keypoints.point(Nose)?;
    for shoulder in &NECK_SHOULDERS {
        if let Some(shoulder_pt) = keypoints.point(*shoulder) {
            let vertical = Point::new(shoulder_pt.x, shoulder_pt.y - NECK_VERTICAL_OFFSET_PX);
            return Some(angle_at(vertical, shoulder_pt, nose));
        }
    }
    None
}
