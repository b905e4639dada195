use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::f64::consts::TAU;
use std::fs;
use std::path::Path;

use crate::models::{
    AgentId, GameConfig, Orientation, Point2D, Position3D as ModelPosition3D, RangeScan, WallMap, WallSegment,
};

/// シナリオメタデータ
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioMeta {
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// 壁セグメント設定（[x, y] の2端点）
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct WallConfig {
    pub start: [f64; 2],
    pub end: [f64; 2],
}

/// アリーナ設定
///
/// `walls` を省略すると標準アリーナを使います。空配列なら壁なし。
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ArenaConfig {
    #[serde(default)]
    pub walls: Option<Vec<WallConfig>>,
}

impl ArenaConfig {
    pub fn wall_map(&self) -> WallMap {
        match &self.walls {
            None => WallMap::reference_arena(),
            Some(walls) => WallMap::new(
                walls
                    .iter()
                    .map(|w| WallSegment::new(Point2D::new(w.start[0], w.start[1]), Point2D::new(w.end[0], w.end[1])))
                    .collect(),
            ),
        }
    }
}

/// 探す側の行動ポリシー
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeekerPolicyKind {
    /// 反応型操舵
    #[default]
    Reactive,
    /// 常に前進する離散行動ポリシー（学習済みモデルの代替）
    Forward,
}

/// エージェント構成
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentsConfig {
    #[serde(default = "default_seekers")]
    pub seekers: Vec<u32>,
    #[serde(default)]
    pub seeker_policy: SeekerPolicyKind,
}

fn default_seekers() -> Vec<u32> {
    vec![1]
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            seekers: default_seekers(),
            seeker_policy: SeekerPolicyKind::default(),
        }
    }
}

impl AgentsConfig {
    /// 登録済みのエージェントかどうか
    pub fn knows(&self, agent: AgentId) -> bool {
        match agent {
            AgentId::Hider => true,
            AgentId::Seeker(id) => self.seekers.contains(&id),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct Position3D {
    pub x_m: f64,
    pub y_m: f64,
    #[serde(default)]
    pub z_m: f64,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct QuaternionConfig {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

/// 個別の測定値の上書き
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ScanReturn {
    pub index: usize,
    pub range: f64,
}

/// スキャン設定
///
/// `ranges` を直接与えるか、`fill` の値を `count` 本並べてから `returns` で上書きします。
/// `angle_increment` を省略すると全周を等分します。
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub angle_min: f64,
    #[serde(default)]
    pub angle_increment: Option<f64>,
    #[serde(default)]
    pub ranges: Vec<f64>,
    #[serde(default)]
    pub fill: Option<f64>,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub returns: Vec<ScanReturn>,
}

impl ScanConfig {
    pub const DEFAULT_BEAMS: usize = 360;

    pub fn to_scan(&self) -> RangeScan {
        let mut ranges = if self.ranges.is_empty() {
            vec![self.fill.unwrap_or(f64::INFINITY); self.count.unwrap_or(Self::DEFAULT_BEAMS)]
        } else {
            self.ranges.clone()
        };
        for ret in &self.returns {
            if let Some(slot) = ranges.get_mut(ret.index) {
                *slot = ret.range;
            }
        }
        let increment = match self.angle_increment {
            Some(inc) => inc,
            None if ranges.is_empty() => 0.0,
            None => TAU / ranges.len() as f64,
        };
        RangeScan::new(self.angle_min, increment, ranges)
    }
}

/// 入力イベント
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioEvent {
    /// 時計（秒）
    Clock { sec: i64 },
    /// オドメトリ（`orientation` が優先、なければ `yaw` から生成）
    Odometry {
        agent: AgentId,
        position: Position3D,
        #[serde(default)]
        orientation: Option<QuaternionConfig>,
        #[serde(default)]
        yaw: Option<f64>,
    },
    /// 測域スキャン
    Scan { agent: AgentId, scan: ScanConfig },
    /// ゲーム信号チャネルへ直接送る文字列
    Signal { agent: AgentId, payload: String },
    /// 探す側の共有チャネルへ直接送る文字列
    Peer { agent: AgentId, payload: String },
}

impl ScenarioEvent {
    /// イベントの宛先エージェント（時計は全員）
    pub fn agent(&self) -> Option<AgentId> {
        match self {
            ScenarioEvent::Clock { .. } => None,
            ScenarioEvent::Odometry { agent, .. }
            | ScenarioEvent::Scan { agent, .. }
            | ScenarioEvent::Signal { agent, .. }
            | ScenarioEvent::Peer { agent, .. } => Some(*agent),
        }
    }

    pub fn odometry(agent: AgentId, x: f64, y: f64, yaw: f64) -> Self {
        ScenarioEvent::Odometry {
            agent,
            position: Position3D { x_m: x, y_m: y, z_m: 0.0 },
            orientation: None,
            yaw: Some(yaw),
        }
    }
}

/// オドメトリイベントの位置と姿勢を変換
pub fn odometry_input(
    position: &Position3D,
    orientation: Option<&QuaternionConfig>,
    yaw: Option<f64>,
) -> (ModelPosition3D, Orientation) {
    let pos = ModelPosition3D::new(position.x_m, position.y_m, position.z_m);
    let orient = match orientation {
        Some(q) => Orientation::new(q.x, q.y, q.z, q.w),
        None => Orientation::from_yaw(yaw.unwrap_or(0.0)),
    };
    (pos, orient)
}

/// 完全なシナリオ設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    pub meta: ScenarioMeta,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub arena: ArenaConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub events: Vec<ScenarioEvent>,
}

impl ScenarioConfig {
    /// YAMLファイルからシナリオ設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();

        // ファイル存在チェック
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path).map_err(|e| ScenarioError::IoError(path.to_path_buf(), e))?;

        let config: ScenarioConfig =
            serde_yaml::from_str(&contents).map_err(|e| ScenarioError::ParseError(path.to_path_buf(), e))?;

        config.validate()?;

        Ok(config)
    }

    /// 組み込みの捕獲シナリオ
    ///
    /// 隠れる側 (0,0,0)・探す側 (1,0,0) から開始し、探す側の開始後に (0.2,0,0) まで接近して捕獲します。
    pub fn demo() -> Self {
        let hider = AgentId::Hider;
        let seeker = AgentId::Seeker(1);
        let open = ScenarioEvent::Scan {
            agent: hider,
            scan: ScanConfig { fill: Some(3.0), ..ScanConfig::default() },
        };
        let seeker_scan = ScenarioEvent::Scan {
            agent: seeker,
            scan: ScanConfig { fill: Some(3.0), ..ScanConfig::default() },
        };
        Self {
            meta: ScenarioMeta {
                version: "1.0".to_string(),
                name: "demo_capture".to_string(),
                description: "探す側が隠れる側に接近して捕獲する基本シナリオ".to_string(),
            },
            game: GameConfig::default(),
            arena: ArenaConfig::default(),
            agents: AgentsConfig::default(),
            events: vec![
                ScenarioEvent::Clock { sec: 0 },
                ScenarioEvent::odometry(hider, 0.0, 0.0, 0.0),
                ScenarioEvent::odometry(seeker, 1.0, 0.0, std::f64::consts::PI),
                ScenarioEvent::odometry(hider, 0.0, 0.0, 0.0),
                open.clone(),
                seeker_scan.clone(),
                ScenarioEvent::Clock { sec: 10 },
                ScenarioEvent::odometry(seeker, 1.0, 0.0, std::f64::consts::PI),
                seeker_scan.clone(),
                open.clone(),
                ScenarioEvent::Clock { sec: 11 },
                ScenarioEvent::odometry(seeker, 0.2, 0.0, std::f64::consts::PI),
                open,
                seeker_scan,
                ScenarioEvent::Clock { sec: 12 },
            ],
        }
    }

    /// 設定の基本的な検証
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let game = &self.game;

        // 速度・閾値の検証
        let positive = [
            ("hider_linear_speed", game.hider_linear_speed),
            ("seeker_linear_speed", game.seeker_linear_speed),
            ("angular_speed", game.angular_speed),
            ("turn_ratio", game.turn_ratio),
            ("distance_endgame", game.distance_endgame),
            ("fov_angle_deg", game.fov_angle_deg),
        ];
        for (name, value) in positive {
            if !(value > 0.0) || !value.is_finite() {
                return Err(ScenarioError::ValidationError(format!("{} must be positive", name)));
            }
        }
        if !(game.min_distance_to_wall >= 0.0) || !(game.speed_near_wall >= 0.0) {
            return Err(ScenarioError::ValidationError("wall thresholds must be non-negative".to_string()));
        }
        if game.fov_angle_deg > 180.0 {
            return Err(ScenarioError::ValidationError("fov_angle_deg must be <= 180".to_string()));
        }

        // 時刻設定の検証
        if game.seconds_seeker_start < game.seconds_hider_start {
            return Err(ScenarioError::ValidationError(format!(
                "seeker start {} < hider start {}",
                game.seconds_seeker_start, game.seconds_hider_start
            )));
        }
        if game.game_time_limit <= game.seconds_seeker_start {
            return Err(ScenarioError::ValidationError(format!(
                "time limit {} <= seeker start {}",
                game.game_time_limit, game.seconds_seeker_start
            )));
        }

        // 探す側IDの検証
        if self.agents.seekers.is_empty() {
            return Err(ScenarioError::ValidationError("at least one seeker is required".to_string()));
        }
        let mut seen = BTreeSet::new();
        for id in &self.agents.seekers {
            if !seen.insert(*id) {
                return Err(ScenarioError::ValidationError(format!("duplicate seeker id {}", id)));
            }
        }

        // イベントの検証
        for (index, event) in self.events.iter().enumerate() {
            if let Some(agent) = event.agent() {
                if !self.agents.knows(agent) {
                    return Err(ScenarioError::ValidationError(format!("event {}: unknown agent {}", index, agent)));
                }
            }
            if let ScenarioEvent::Scan { scan, .. } = event {
                if scan.angle_increment.is_some_and(|inc| !inc.is_finite()) || !scan.angle_min.is_finite() {
                    return Err(ScenarioError::ValidationError(format!("event {}: invalid scan angles", index)));
                }
                if scan.ranges.iter().chain(scan.fill.iter()).any(|r| *r < 0.0) {
                    return Err(ScenarioError::ValidationError(format!("event {}: negative range", index)));
                }
            }
        }

        Ok(())
    }

    /// シナリオの概要を表示
    pub fn print_summary(&self) {
        println!("=== シナリオ情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        println!("=== ゲーム設定 ===");
        println!("隠れる側の開始: {}秒", self.game.seconds_hider_start);
        println!("探す側の開始: {}秒", self.game.seconds_seeker_start);
        println!("制限時間: {}秒", self.game.game_time_limit);
        println!("捕獲距離: {:.2}m", self.game.distance_endgame);
        println!("視野: ±{:.0}度", self.game.fov_angle_deg);
        println!();

        println!("=== エージェント ===");
        println!("隠れる側: 1台");
        println!("探す側: {}台 ({:?})", self.agents.seekers.len(), self.agents.seeker_policy);
        let walls = self.arena.wall_map();
        let points = walls.walls().iter().filter(|w| w.is_degenerate()).count();
        println!("壁: {}枚 (長さ0: {}枚)", walls.len(), points);
        println!();

        println!("=== 入力イベント ===");
        println!("イベント数: {}", self.events.len());
        let clocks: Vec<i64> = self
            .events
            .iter()
            .filter_map(|e| match e {
                ScenarioEvent::Clock { sec } => Some(*sec),
                _ => None,
            })
            .collect();
        if let (Some(first), Some(last)) = (clocks.first(), clocks.last()) {
            println!("時計: {}秒 → {}秒 ({}件)", first, last, clocks.len());
        }
    }
}

/// シナリオ読み込みエラー
#[derive(Debug)]
pub enum ScenarioError {
    FileNotFound(std::path::PathBuf),
    IoError(std::path::PathBuf, std::io::Error),
    ParseError(std::path::PathBuf, serde_yaml::Error),
    ValidationError(String),
}

impl std::fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioError::FileNotFound(path) => {
                write!(f, "シナリオファイルが見つかりません: {}", path.display())
            }
            ScenarioError::IoError(path, err) => {
                write!(f, "ファイル読み込みエラー {}: {}", path.display(), err)
            }
            ScenarioError::ParseError(path, err) => {
                write!(f, "YAML解析エラー {}: {}", path.display(), err)
            }
            ScenarioError::ValidationError(msg) => {
                write!(f, "設定検証エラー: {}", msg)
            }
        }
    }
}

impl std::error::Error for ScenarioError {}
