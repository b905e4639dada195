//! # Protocol モジュール
//!
//! ゲーム信号チャネルと探す側同士の共有チャネルで流れるメッセージの型と、
//! テキスト形式（ワイヤ形式）のスキーマを定義します。
//!
//! ## ゲーム信号（1メッセージ = 1文字列）
//!
//! | 信号 | 形式 |
//! |------|------|
//! | 開始 | `START` |
//! | 終了 | `GAMEOVER` |
//! | 方位報告 | `Angle <rad>` の後に任意で改行 + `Distance <m>` |
//! | 候補一覧 | `Targets` の後に1行1候補で `<rad> <m>` |
//!
//! ## 共有チャネル
//!
//! 候補ごとの距離を改行区切りで並べたもの。順序は送信側が決め、受信側は位置で対応付けます。

use std::fmt;

use crate::models::common::{math_utils, AgentId};

pub const START_MSG: &str = "START";
pub const GAMEOVER_MSG: &str = "GAMEOVER";
pub const ANGLE_HEADER: &str = "Angle";
pub const DISTANCE_HEADER: &str = "Distance";
pub const TARGETS_HEADER: &str = "Targets";

/// 候補ターゲット1件分の方位と距離
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetReport {
    /// 方位（ラジアン、(-π, π]）
    pub angle: f64,
    /// 距離（m、非負。無限大は不明）
    pub distance: f64,
}

impl TargetReport {
    pub fn new(angle: f64, distance: f64) -> Self {
        Self { angle: math_utils::normalize_angle(angle), distance }
    }
}

/// 観測者からターゲットへの方位報告
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BearingReport {
    pub observer: AgentId,
    pub target: AgentId,
    pub angle: f64,
    pub distance: f64,
}

impl BearingReport {
    pub fn report(&self) -> TargetReport {
        TargetReport::new(self.angle, self.distance)
    }
}

/// ゲーム信号
#[derive(Debug, Clone, PartialEq)]
pub enum GameSignal {
    Start,
    Bearing(TargetReport),
    Targets(Vec<TargetReport>),
    GameOver,
}

impl GameSignal {
    pub fn to_wire(&self) -> String {
        match self {
            GameSignal::Start => START_MSG.to_string(),
            GameSignal::GameOver => GAMEOVER_MSG.to_string(),
            GameSignal::Bearing(report) => {
                if report.distance.is_finite() {
                    format!("{} {}\n{} {}", ANGLE_HEADER, report.angle, DISTANCE_HEADER, report.distance)
                } else {
                    format!("{} {}", ANGLE_HEADER, report.angle)
                }
            }
            GameSignal::Targets(reports) => {
                let mut out = String::from(TARGETS_HEADER);
                for report in reports {
                    out.push_str(&format!("\n{} {}", report.angle, report.distance));
                }
                out
            }
        }
    }

    pub fn from_wire(payload: &str) -> Result<Self, ProtocolError> {
        let payload = payload.trim_end();
        let mut lines = payload.lines();
        let first = lines.next().map(str::trim).unwrap_or_default();
        if first.is_empty() {
            return Err(ProtocolError::Empty);
        }

        match first {
            START_MSG | GAMEOVER_MSG => {
                if let Some(extra) = lines.next() {
                    return Err(ProtocolError::MalformedRecord(extra.to_string()));
                }
                return Ok(if first == START_MSG { GameSignal::Start } else { GameSignal::GameOver });
            }
            TARGETS_HEADER => {
                let reports = lines
                    .filter(|line| !line.trim().is_empty())
                    .map(parse_target_line)
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(GameSignal::Targets(reports));
            }
            _ => {}
        }

        let angle = parse_angle(header_field(first, ANGLE_HEADER)?)?;
        let distance = match lines.next() {
            Some(line) => parse_distance(header_field(line.trim(), DISTANCE_HEADER)?)?,
            None => f64::INFINITY,
        };
        // Distance 行の後には何も続かない
        if let Some(extra) = lines.next() {
            return Err(ProtocolError::MalformedRecord(extra.to_string()));
        }
        Ok(GameSignal::Bearing(TargetReport::new(angle, distance)))
    }
}

/// `"<header> <field>"` 形式の行から、見出しが完全一致する場合のみ値部分を取り出す
fn header_field<'a>(line: &'a str, header: &str) -> Result<&'a str, ProtocolError> {
    match line.split_once(' ') {
        Some((h, field)) if h == header => Ok(field),
        _ => Err(ProtocolError::UnknownHeader(line.to_string())),
    }
}

fn parse_number(field: &str) -> Result<f64, ProtocolError> {
    let field = field.trim();
    field
        .parse::<f64>()
        .map_err(|_| ProtocolError::InvalidNumber(field.to_string()))
}

fn parse_angle(field: &str) -> Result<f64, ProtocolError> {
    let angle = parse_number(field)?;
    if !angle.is_finite() {
        return Err(ProtocolError::InvalidNumber(field.trim().to_string()));
    }
    Ok(angle)
}

fn parse_distance(field: &str) -> Result<f64, ProtocolError> {
    let distance = parse_number(field)?;
    if distance.is_nan() || distance < 0.0 {
        return Err(ProtocolError::InvalidNumber(field.trim().to_string()));
    }
    Ok(distance)
}

fn parse_target_line(line: &str) -> Result<TargetReport, ProtocolError> {
    let mut fields = line.split_whitespace();
    match (fields.next(), fields.next(), fields.next()) {
        (Some(angle), Some(distance), None) => {
            Ok(TargetReport::new(parse_angle(angle)?, parse_distance(distance)?))
        }
        _ => Err(ProtocolError::MalformedRecord(line.to_string())),
    }
}

/// 探す側が共有する距離ベクトル
///
/// 要素の順序は送信側の候補順で、IDは持ちません。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SeekerDistanceVector(pub Vec<f64>);

impl SeekerDistanceVector {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn to_wire(&self) -> String {
        self.0.iter().map(|d| format!("{}\n", d)).collect()
    }

    pub fn from_wire(payload: &str) -> Result<Self, ProtocolError> {
        let payload = payload.trim_end();
        if payload.is_empty() {
            return Ok(Self::default());
        }
        payload
            .split('\n')
            .map(parse_distance)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

/// メッセージ解析エラー
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    Empty,
    UnknownHeader(String),
    InvalidNumber(String),
    MalformedRecord(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Empty => write!(f, "空のメッセージ"),
            ProtocolError::UnknownHeader(header) => write!(f, "不明なヘッダ: {}", header),
            ProtocolError::InvalidNumber(value) => write!(f, "数値として解釈できません: {}", value),
            ProtocolError::MalformedRecord(line) => write!(f, "不正なレコード: {}", line),
        }
    }
}

impl std::error::Error for ProtocolError {}
