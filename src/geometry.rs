use log::warn;

/// 2D/3D座標点。2Dで使う場合はz=0.0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    pub fn with_z(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// 頂点bにおける角度∠abcを度数 [0, 180] で返す
///
/// 内積公式 θ = acos((v1·v2) / (|v1||v2|)) を使用。
/// 浮動小数点誤差で比が[-1, 1]を外れるとacosがNaNになるためクランプする。
/// ゼロ長ベクトル（同一点の入力）は0.0を返す。検出ループを1つの不正な
/// 角度で止めないため、ここでは決してpanic/NaNを返さない。
#[inline]
pub fn angle_at(a: Point, b: Point, c: Point) -> f32 {
    let v1 = (a.x - b.x, a.y - b.y, a.z - b.z);
    let v2 = (c.x - b.x, c.y - b.y, c.z - b.z);

    let n1 = (v1.0 * v1.0 + v1.1 * v1.1 + v1.2 * v1.2).sqrt();
    let n2 = (v2.0 * v2.0 + v2.1 * v2.1 + v2.2 * v2.2).sqrt();

    if n1 <= f32::EPSILON || n2 <= f32::EPSILON {
        warn!(
            "degenerate angle input: zero-length ray at vertex ({:.1}, {:.1})",
            b.x, b.y
        );
        return 0.0;
    }

    let dot = v1.0 * v2.0 + v1.1 * v2.1 + v1.2 * v2.2;
    let ratio = (dot / (n1 * n2)).clamp(-1.0, 1.0);
    ratio.acos().to_degrees()
}
