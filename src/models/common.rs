use std::ops::Add;

use serde::{Deserialize, Serialize};

/// 3次元位置を表す構造体
///
/// ワールド座標（メートル）。x が東、y が北、z が高度です。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position3D {
    pub x: f64, // m
    pub y: f64, // m
    pub z: f64, // m (altitude)
}

impl Position3D {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// XY平面での2次元距離を計算
    pub fn distance_xy(&self, other: &Position3D) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// 3次元距離を計算
    pub fn distance_3d(&self, other: &Position3D) -> f64 {
        self.distance_xy(other).hypot(self.z - other.z)
    }
}

impl Add for Position3D {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

/// 3次元速度を表す構造体
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity3D {
    pub x: f64, // m/s
    pub y: f64, // m/s
    pub z: f64, // m/s
}

impl Velocity3D {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// 速度ベクトルの大きさ
    pub fn magnitude(&self) -> f64 {
        (self.x.powi(2) + self.y.powi(2) + self.z.powi(2)).sqrt()
    }

    /// dt 秒間の変位
    pub fn displacement(&self, dt: f64) -> Position3D {
        Position3D::new(self.x * dt, self.y * dt, self.z * dt)
    }
}

/// 姿勢（ラジアン）
///
/// heading は北から時計回り、pitch は機首上げ正、bank は右翼下げ正。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Direction3D {
    pub heading: f64,
    pub pitch: f64,
    pub bank: f64,
}

impl Direction3D {
    pub fn new(heading: f64, pitch: f64, bank: f64) -> Self {
        Self { heading, pitch, bank }
    }

    /// heading のみの姿勢
    pub fn from_heading(heading: f64) -> Self {
        Self::new(heading, 0.0, 0.0)
    }

    /// 機体ローカルのオフセットをワールド方向へ回転
    ///
    /// bank → pitch → heading の順に適用します。bank は符号反転して渡します。
    pub fn rotate_offset(&self, offset: Position3D) -> Position3D {
        let r = math_utils::rotate_bank(offset, -self.bank);
        let r = math_utils::rotate_pitch(r, self.pitch);
        math_utils::rotate_heading(r, self.heading)
    }
}

/// 数学ユーティリティ関数
pub mod math_utils {
    use super::Position3D;

    /// 度をラジアンに変換
    pub fn deg_to_rad(degrees: f64) -> f64 {
        degrees.to_radians()
    }

    /// z軸まわりに時計回りで回転
    pub fn rotate_heading(a: Position3D, theta: f64) -> Position3D {
        let (s, c) = theta.sin_cos();
        Position3D::new(a.x * c + a.y * s, a.y * c - a.x * s, a.z)
    }

    /// x軸まわりに回転
    pub fn rotate_pitch(a: Position3D, theta: f64) -> Position3D {
        let (s, c) = theta.sin_cos();
        Position3D::new(a.x, a.y * c + a.z * s, a.z * c - a.y * s)
    }

    /// y軸まわりに回転
    pub fn rotate_bank(a: Position3D, theta: f64) -> Position3D {
        let (s, c) = theta.sin_cos();
        Position3D::new(a.x * c - a.z * s, a.y, a.x * s + a.z * c)
    }

    /// XY差分を、cos(-heading)/sin(-heading) のキャッシュで局所座標へ逆回転
    pub fn inverse_rotate_xy(dx: f64, dy: f64, cos_heading: f64, sin_heading: f64) -> (f64, f64) {
        (
            cos_heading * dx + sin_heading * dy,
            cos_heading * dy - sin_heading * dx,
        )
    }

    /// 2つの区間 [a_min, a_max] と [b_min, b_max] が重なるか
    pub fn bands_overlap(a_min: f64, a_max: f64, b_min: f64, b_max: f64) -> bool {
        a_min <= b_max && b_min <= a_max
    }
}
