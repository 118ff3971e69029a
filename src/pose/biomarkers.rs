use super::angles::BodyAngles;

/// 関節角度と姿勢信頼度から導出する運動バイオマーカー（各 [0, 100]）
///
/// 純粋な値オブジェクトで、毎フレーム再計算される。入力が欠けた
/// スコアは`None`。`symmetry`と`balance`は未実装で常に`None`を返す。
/// 左右比較には片側ずつの角度ペアが必要だが、`BodyAngles`は関節ごとに
/// 片側の角度しか保持しないため、定数を測定値のように返すことはしない。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionBiomarkers {
    pub posture_score: Option<f32>,
    pub movement_quality: Option<f32>,
    pub range_of_motion: Option<f32>,
    pub stability_score: Option<f32>,
    pub symmetry: Option<f32>,
    pub balance: Option<f32>,
}

/// 股関節角度の姿勢サブスコア（伸展しているほど高い）
fn hip_posture_score(angle: f32) -> f32 {
    if angle > 160.0 {
        100.0
    } else if angle > 140.0 {
        90.0
    } else if angle > 120.0 {
        70.0
    } else if angle > 100.0 {
        50.0
    } else {
        30.0
    }
}

/// 肩角度の姿勢サブスコア
fn shoulder_posture_score(angle: f32) -> f32 {
    if angle > 160.0 {
        100.0
    } else if angle > 140.0 {
        80.0
    } else if angle > 120.0 {
        60.0
    } else {
        40.0
    }
}

/// 膝角度の可動域スコア（深く曲げるほど高い）
fn knee_rom_score(angle: f32) -> f32 {
    if angle < 90.0 {
        100.0
    } else if angle < 100.0 {
        90.0
    } else if angle < 120.0 {
        70.0
    } else if angle < 140.0 {
        50.0
    } else if angle < 160.0 {
        30.0
    } else {
        10.0
    }
}

/// 1フレーム分の角度と姿勢信頼度からバイオマーカーを導出する
pub fn extract_biomarkers(
    angles: &BodyAngles,
    pose_confidence: Option<f32>,
) -> MotionBiomarkers {
    let posture_score = match (angles.hip, angles.shoulder) {
        (Some(hip), Some(shoulder)) => {
            Some((hip_posture_score(hip) * 0.4 + shoulder_posture_score(shoulder) * 0.6).round())
        }
        _ => None,
    };

    let range_of_motion = angles.knee.map(knee_rom_score);

    let stability_score = pose_confidence.map(|c| (c * 100.0).round());

    let movement_quality = match (posture_score, range_of_motion, stability_score) {
        (Some(posture), Some(rom), Some(stability)) => {
            Some((posture * 0.4 + rom * 0.4 + stability * 0.2).round())
        }
        _ => None,
    };

    MotionBiomarkers {
        posture_score,
        movement_quality,
        range_of_motion,
        stability_score,
        symmetry: None,
        balance: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn angles(knee: Option<f32>, hip: Option<f32>, shoulder: Option<f32>) -> BodyAngles {
        BodyAngles {
            knee,
            hip,
            shoulder,
            ..BodyAngles::default()
        }
    }

    #[test]
    fn test_full_scores() {
        let b = extract_biomarkers(&angles(Some(85.0), Some(170.0), Some(170.0)), Some(0.9));
        assert_eq!(b.posture_score, Some(100.0));
        assert_eq!(b.range_of_motion, Some(100.0));
        assert_eq!(b.stability_score, Some(90.0));
        // 100*0.4 + 100*0.4 + 90*0.2
        assert_eq!(b.movement_quality, Some(98.0));
    }

    #[test]
    fn test_posture_weighted_average() {
        // hip 150 → 90, shoulder 130 → 60: 90*0.4 + 60*0.6 = 72
        let b = extract_biomarkers(&angles(None, Some(150.0), Some(130.0)), None);
        assert_eq!(b.posture_score, Some(72.0));
    }

    #[test]
    fn test_posture_none_when_either_angle_missing() {
        let b = extract_biomarkers(&angles(Some(85.0), Some(170.0), None), Some(0.9));
        assert_eq!(b.posture_score, None);
        assert_eq!(b.movement_quality, None);
        // 他のスコアには影響しない
        assert_eq!(b.range_of_motion, Some(100.0));
        assert_eq!(b.stability_score, Some(90.0));
    }

    #[test]
    fn test_rom_monotonicity() {
        // 深い屈曲ほどスコアが高い（単調非増加）
        let deep = extract_biomarkers(&angles(Some(80.0), None, None), None);
        let mid = extract_biomarkers(&angles(Some(95.0), None, None), None);
        let shallow = extract_biomarkers(&angles(Some(150.0), None, None), None);
        assert!(deep.range_of_motion.unwrap() >= mid.range_of_motion.unwrap());
        assert!(mid.range_of_motion.unwrap() >= shallow.range_of_motion.unwrap());
    }

    #[test]
    fn test_stability_none_without_confidence() {
        let b = extract_biomarkers(&angles(Some(85.0), Some(170.0), Some(170.0)), None);
        assert_eq!(b.stability_score, None);
        assert_eq!(b.movement_quality, None);
    }

    #[test]
    fn test_stability_rounds_confidence() {
        let b = extract_biomarkers(&BodyAngles::default(), Some(0.876));
        assert_eq!(b.stability_score, Some(88.0));
    }

    #[test]
    fn test_symmetry_and_balance_not_measured() {
        let b = extract_biomarkers(&angles(Some(85.0), Some(170.0), Some(170.0)), Some(0.9));
        assert_eq!(b.symmetry, None);
        assert_eq!(b.balance, None);
    }

    #[test]
    fn test_empty_angles_all_none() {
        let b = extract_biomarkers(&BodyAngles::default(), None);
        assert_eq!(b, MotionBiomarkers::default());
    }
}
