use std::f64::consts::{PI, TAU};
use std::fmt;
use std::ops::Sub;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 3次元位置を表す構造体
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position3D {
    pub x: f64, // m
    pub y: f64, // m
    pub z: f64, // m
}

impl Position3D {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// 3次元距離を計算
    pub fn distance_3d(&self, other: &Position3D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2)).sqrt()
    }

    /// XY平面への射影
    pub fn xy(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }
}

impl Sub for Position3D {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

/// 2次元の点（壁マップ用）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// 姿勢クォータニオン（x, y, z, w）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Orientation {
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// 鉛直軸まわりの回転のみを持つクォータニオンを生成
    pub fn from_yaw(yaw: f64) -> Self {
        let half = yaw / 2.0;
        Self::new(0.0, 0.0, half.sin(), half.cos())
    }

    pub fn norm(&self) -> f64 {
        (self.x.powi(2) + self.y.powi(2) + self.z.powi(2) + self.w.powi(2)).sqrt()
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }
}

/// エージェントの姿勢（位置 + 正規化済みヨー角）
///
/// オドメトリを受信するたびに上書きされ、履歴は保持しません。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub position: Position3D,
    /// ヨー角（ラジアン、(-π, π]）
    pub yaw: f64,
}

impl Pose {
    /// オドメトリ入力から姿勢を構築
    ///
    /// クォータニオンが単位回転でない場合は呼び出し側の契約違反としてエラーを返します。
    pub fn from_odometry(position: Position3D, orientation: Orientation) -> Result<Self, GeometryError> {
        let yaw = math_utils::yaw(orientation)?;
        Ok(Self { position, yaw })
    }
}

/// 速度指令（並進 x、回転 z）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VelocityCommand {
    /// 並進速度（m/s）
    pub linear_x: f64,
    /// 角速度（rad/s）
    pub angular_z: f64,
}

impl VelocityCommand {
    pub fn new(linear_x: f64, angular_z: f64) -> Self {
        Self { linear_x, angular_z }
    }

    /// 停止指令
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.linear_x == 0.0 && self.angular_z == 0.0
    }
}

/// 測域センサーのスキャン
///
/// `ranges[i]` は `angle_min + i * angle_increment` 方向の距離です。
/// 無限大・NaN は「反射なし」を表します。
#[derive(Debug, Clone, PartialEq)]
pub struct RangeScan {
    pub angle_min: f64,
    pub angle_increment: f64,
    pub ranges: Vec<f64>,
}

impl RangeScan {
    pub fn new(angle_min: f64, angle_increment: f64, ranges: Vec<f64>) -> Self {
        Self { angle_min, angle_increment, ranges }
    }

    /// i番目の測定値の方位（ラジアン）
    pub fn angle_at(&self, index: usize) -> f64 {
        self.angle_min + index as f64 * self.angle_increment
    }

    /// 最も近い有限の測定値（距離, 方位）
    ///
    /// 有限値が一つもない場合は `None`。最小値が複数あるときは先頭を採用します。
    pub fn nearest(&self) -> Option<(f64, f64)> {
        let mut best: Option<(f64, f64)> = None;
        for (i, &range) in self.ranges.iter().enumerate() {
            if !range.is_finite() || range < 0.0 {
                continue;
            }
            match best {
                Some((best_range, _)) if range >= best_range => {}
                _ => best = Some((range, self.angle_at(i))),
            }
        }
        best
    }

    /// 指定方位に最も近いビームの測定値
    pub fn range_towards(&self, angle: f64) -> f64 {
        if self.ranges.is_empty() || self.angle_increment == 0.0 {
            return f64::INFINITY;
        }
        // 走査方向（増分の符号）に沿った angle_min からの角度
        let offset = if self.angle_increment > 0.0 {
            math_utils::wrap_two_pi(angle - self.angle_min)
        } else {
            math_utils::wrap_two_pi(self.angle_min - angle)
        };
        let len = self.ranges.len();
        let index = (offset / self.angle_increment.abs()).round() as usize % len;
        self.ranges[index]
    }
}

/// エージェント識別子
///
/// シナリオYAMLでは `hider` / `seeker_<番号>` の文字列で表します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum AgentId {
    Hider,
    Seeker(u32),
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentId::Hider => write!(f, "hider"),
            AgentId::Seeker(id) => write!(f, "seeker_{}", id),
        }
    }
}

impl FromStr for AgentId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "hider" {
            return Ok(AgentId::Hider);
        }
        s.strip_prefix("seeker_")
            .and_then(|n| n.parse::<u32>().ok())
            .map(AgentId::Seeker)
            .ok_or_else(|| format!("無効なエージェントID: {}. 利用可能: hider, seeker_<番号>", s))
    }
}

impl TryFrom<String> for AgentId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AgentId> for String {
    fn from(id: AgentId) -> Self {
        id.to_string()
    }
}

/// エージェントの状態を表す列挙型
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AgentStatus {
    Waiting,  // 開始信号待ち
    Active,   // 行動中
    GameOver, // 終了信号受信済み
}

/// 追従対象（割り当て済みターゲットの方位と距離）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FollowTarget {
    /// 方位（ラジアン、(-π, π]）
    pub angle: f64,
    pub distance: f64,
}

/// 幾何入力エラー
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// 単位クォータニオンでない、または有限でない
    InvalidQuaternion { norm: f64 },
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometryError::InvalidQuaternion { norm } => {
                write!(f, "有効な回転ではないクォータニオン (ノルム: {})", norm)
            }
        }
    }
}

impl std::error::Error for GeometryError {}

/// 方位計算ユーティリティ
///
/// 角度はすべてラジアンで、保存・比較・送信の前に (-π, π] に正規化します。
/// +π と -π はともに +π に寄せます。
pub mod math_utils {
    use super::*;

    /// 単位クォータニオンとみなす許容誤差
    pub const QUATERNION_NORM_TOLERANCE: f64 = 1e-3;

    /// 角度を (-π, π] の範囲に正規化
    pub fn normalize_angle(angle: f64) -> f64 {
        let mut normalized = angle % TAU;
        if normalized <= -PI {
            normalized += TAU;
        } else if normalized > PI {
            normalized -= TAU;
        }
        normalized
    }

    /// 角度を [0, 2π) の範囲に正規化
    pub fn wrap_two_pi(angle: f64) -> f64 {
        let wrapped = angle.rem_euclid(TAU);
        // 負の微小値は rem_euclid で TAU に丸まる
        if wrapped >= TAU { 0.0 } else { wrapped }
    }

    /// クォータニオンからヨー角を取り出す
    pub fn yaw(q: Orientation) -> Result<f64, GeometryError> {
        let norm = q.norm();
        if !norm.is_finite() || (norm - 1.0).abs() > QUATERNION_NORM_TOLERANCE {
            return Err(GeometryError::InvalidQuaternion { norm });
        }
        let siny_cosp = 2.0 * (q.w * q.z + q.x * q.y);
        let cosy_cosp = 1.0 - 2.0 * (q.y * q.y + q.z * q.z);
        Ok(normalize_angle(siny_cosp.atan2(cosy_cosp)))
    }

    /// 観測者の機首方向から見たターゲットの方位
    ///
    /// 同一位置の場合は方位が定義できないため 0 を返します。
    pub fn bearing(observer: &Position3D, observer_yaw: f64, target: &Position3D) -> f64 {
        let delta = *target - *observer;
        if delta.x == 0.0 && delta.y == 0.0 {
            return 0.0;
        }
        let absolute = wrap_two_pi(delta.y.atan2(delta.x));
        normalize_angle(absolute - observer_yaw)
    }
}

#[cfg(test)]
mod tests {
    use super::math_utils::*;
    use super::*;

    #[test]
    fn test_normalize_angle_bounds() {
        assert_eq!(normalize_angle(PI), PI);
        assert_eq!(normalize_angle(-PI), PI);
        assert!((normalize_angle(5.0 * PI / 2.0) - PI / 2.0).abs() < 1e-12);
        assert!((normalize_angle(-PI / 2.0) + PI / 2.0).abs() < 1e-12);
        assert!((normalize_angle(7.0 * PI / 4.0) + PI / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_bearing_always_in_range() {
        let observer = Position3D::new(0.3, -1.2, 0.0);
        for i in 0..72 {
            let yaw = normalize_angle(i as f64 * 0.37 - 3.0);
            for j in 0..24 {
                let a = j as f64 * TAU / 24.0;
                let target = Position3D::new(0.3 + a.cos() * 2.0, -1.2 + a.sin() * 2.0, 0.0);
                let b = bearing(&observer, yaw, &target);
                assert!(b > -PI && b <= PI, "bearing {} out of range", b);
            }
        }
    }

    #[test]
    fn test_bearing_same_position_is_defined() {
        let p = Position3D::new(1.0, 1.0, 0.0);
        assert_eq!(bearing(&p, 1.3, &p), 0.0);
    }

    #[test]
    fn test_bearing_relative_to_yaw() {
        let origin = Position3D::new(0.0, 0.0, 0.0);
        let ahead = Position3D::new(1.0, 0.0, 0.0);
        let left = Position3D::new(0.0, 1.0, 0.0);
        assert_eq!(bearing(&origin, 0.0, &ahead), 0.0);
        assert!((bearing(&origin, 0.0, &left) - PI / 2.0).abs() < 1e-12);
        assert!((bearing(&origin, PI / 2.0, &ahead) + PI / 2.0).abs() < 1e-12);
        // 真後ろは +π
        assert_eq!(bearing(&ahead, 0.0, &origin), PI);
    }

    #[test]
    fn test_yaw_from_quaternion() {
        let yaw_in = 0.8;
        let q = Orientation::from_yaw(yaw_in);
        assert!((yaw(q).unwrap() - yaw_in).abs() < 1e-9);
        assert_eq!(yaw(Orientation::default()).unwrap(), 0.0);
    }

    #[test]
    fn test_yaw_rejects_non_unit_quaternion() {
        let q = Orientation::new(0.0, 0.0, 0.0, 0.0);
        assert!(yaw(q).is_err());
        let q = Orientation::new(0.0, 0.0, 1.0, 1.0);
        assert!(matches!(yaw(q), Err(GeometryError::InvalidQuaternion { .. })));
        let q = Orientation::new(f64::NAN, 0.0, 0.0, 1.0);
        assert!(yaw(q).is_err());
    }

    #[test]
    fn test_scan_nearest_skips_infinite() {
        let scan = RangeScan::new(0.0, PI / 2.0, vec![f64::INFINITY, 2.0, 1.0, f64::NAN]);
        let (range, angle) = scan.nearest().unwrap();
        assert_eq!(range, 1.0);
        assert!((angle - PI).abs() < 1e-12);

        let empty = RangeScan::new(0.0, 0.1, vec![f64::INFINITY; 4]);
        assert!(empty.nearest().is_none());
    }

    #[test]
    fn test_range_towards_follows_scan_direction() {
        let ccw = RangeScan::new(0.0, PI / 2.0, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(ccw.range_towards(PI / 2.0), 2.0);
        assert_eq!(ccw.range_towards(-PI / 2.0), 4.0);

        // 時計回りのスキャン: ranges[1] は -π/2、ranges[3] は +π/2
        let cw = RangeScan::new(0.0, -PI / 2.0, vec![1.0, 2.0, 3.0, 4.0]);
        assert!((cw.angle_at(3) - -3.0 * PI / 2.0).abs() < 1e-12);
        assert_eq!(cw.range_towards(PI / 2.0), 4.0);
        assert_eq!(cw.range_towards(-PI / 2.0), 2.0);
        assert_eq!(cw.range_towards(0.0), 1.0);
        assert_eq!(cw.range_towards(PI), 3.0);
    }

    #[test]
    fn test_agent_id_round_trip() {
        assert_eq!("hider".parse::<AgentId>(), Ok(AgentId::Hider));
        assert_eq!("seeker_3".parse::<AgentId>(), Ok(AgentId::Seeker(3)));
        assert_eq!(AgentId::Seeker(2).to_string(), "seeker_2");
        assert!("robot".parse::<AgentId>().is_err());
    }
}
