use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::models::common::{math_utils, AgentId, Pose};
use crate::models::config::GameConfig;
use crate::models::protocol::{BearingReport, GameSignal, TargetReport};
use crate::models::visibility::{VisibilityOracle, WallMap};

/// ゲームの段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    Idle,
    HiderActive,
    BothActive,
    Over,
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GamePhase::Idle => "待機",
            GamePhase::HiderActive => "隠れる側のみ行動中",
            GamePhase::BothActive => "両者行動中",
            GamePhase::Over => "終了",
        };
        write!(f, "{}", name)
    }
}

/// 勝者
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    /// 制限時間まで逃げ切った
    Hider,
    /// 捕獲距離まで接近した探す側
    Seeker(AgentId),
}

/// ゲーム結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameOutcome {
    pub winner: Winner,
    /// 終了時の時計の値（秒、未受信なら None）
    pub clock: Option<i64>,
    /// 捕獲時の3次元距離
    pub distance: Option<f64>,
}

/// 信号の宛先
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Agent(AgentId),
    AllSeekers,
    All,
}

/// コントローラが送出する信号
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub to: Recipient,
    pub signal: GameSignal,
}

impl Dispatch {
    fn new(to: Recipient, signal: GameSignal) -> Self {
        Self { to, signal }
    }
}

/// ゲーム進行コントローラ
///
/// 時計と各エージェントの姿勢を受け取り、段階遷移・開始信号・方位報告・終了判定を行います。
///
/// - `Idle → HiderActive`: 時計が隠れる側の開始時刻に到達（隠れる側へ開始信号）
/// - `HiderActive → BothActive`: 探す側の開始時刻に到達（探す側へ開始信号）
/// - `BothActive → Over`: 制限時間到達（隠れる側の勝ち）または捕獲距離以内（探す側の勝ち）
///
/// 時計の値が前回より小さくなった場合は外部の再起動とみなし、`Idle` に戻して派生状態を破棄します。
pub struct GamePhaseController {
    config: Arc<GameConfig>,
    oracle: VisibilityOracle,
    phase: GamePhase,
    last_clock: Option<i64>,
    hider_pose: Option<Pose>,
    seeker_poses: BTreeMap<AgentId, Pose>,
    outcome: Option<GameOutcome>,
}

impl GamePhaseController {
    pub fn new(config: Arc<GameConfig>, walls: Arc<WallMap>) -> Self {
        let oracle = VisibilityOracle::new(walls, config.fov_angle());
        Self {
            config,
            oracle,
            phase: GamePhase::Idle,
            last_clock: None,
            hider_pose: None,
            seeker_poses: BTreeMap::new(),
            outcome: None,
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn outcome(&self) -> Option<GameOutcome> {
        self.outcome
    }

    pub fn last_clock(&self) -> Option<i64> {
        self.last_clock
    }

    /// 時計の受信
    pub fn on_clock(&mut self, sec: i64) -> Vec<Dispatch> {
        let mut out = Vec::new();

        if let Some(last) = self.last_clock {
            if sec < last {
                info!(previous = last, current = sec, phase = %self.phase, "時計の巻き戻りを検知: ゲームをリセットします");
                self.reset();
            }
        }
        self.last_clock = Some(sec);

        loop {
            match self.phase {
                GamePhase::Idle if sec >= self.config.seconds_hider_start => {
                    self.transition(GamePhase::HiderActive, sec);
                    out.push(Dispatch::new(Recipient::Agent(AgentId::Hider), GameSignal::Start));
                }
                GamePhase::HiderActive if sec >= self.config.seconds_seeker_start => {
                    self.transition(GamePhase::BothActive, sec);
                    out.push(Dispatch::new(Recipient::AllSeekers, GameSignal::Start));
                    out.extend(self.check_proximity());
                }
                GamePhase::BothActive if sec >= self.config.game_time_limit => {
                    out.extend(self.finish(Winner::Hider, None));
                }
                _ => break,
            }
        }
        out
    }

    /// 姿勢の受信
    pub fn on_pose(&mut self, agent: AgentId, pose: Pose) -> Vec<Dispatch> {
        let mut out = Vec::new();
        match agent {
            AgentId::Hider => self.hider_pose = Some(pose),
            AgentId::Seeker(_) => {
                self.seeker_poses.insert(agent, pose);
            }
        }

        if self.phase == GamePhase::Over {
            return out;
        }

        match agent {
            AgentId::Hider => {
                if let Some(report) = self.hider_report() {
                    out.push(Dispatch::new(Recipient::Agent(AgentId::Hider), GameSignal::Bearing(report.report())));
                }
            }
            AgentId::Seeker(_) => {
                let targets = self.seeker_targets(agent);
                out.push(Dispatch::new(Recipient::Agent(agent), GameSignal::Targets(targets)));
            }
        }

        out.extend(self.check_proximity());
        out
    }

    /// 隠れる側から最も近い探す側への方位
    pub fn hider_report(&self) -> Option<BearingReport> {
        let hider = self.hider_pose?;
        self.seeker_poses
            .iter()
            .map(|(id, pose)| (*id, hider.position.distance_3d(&pose.position), pose))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, distance, pose)| BearingReport {
                observer: AgentId::Hider,
                target: id,
                angle: math_utils::bearing(&hider.position, hider.yaw, &pose.position),
                distance,
            })
    }

    /// 探す側が現在認識している候補ターゲット
    pub fn seeker_targets(&self, seeker: AgentId) -> Vec<TargetReport> {
        let (Some(own), Some(hider)) = (self.seeker_poses.get(&seeker), self.hider_pose) else {
            return Vec::new();
        };
        let angle = math_utils::bearing(&own.position, own.yaw, &hider.position);
        if self.config.require_line_of_sight && !self.oracle.can_see(angle, &own.position, &hider.position) {
            return Vec::new();
        }
        vec![TargetReport::new(angle, own.position.distance_3d(&hider.position))]
    }

    /// 捕獲判定（両者の開始後のみ）
    fn check_proximity(&mut self) -> Vec<Dispatch> {
        if self.phase != GamePhase::BothActive {
            return Vec::new();
        }
        let Some(hider) = self.hider_pose else {
            return Vec::new();
        };
        let captured = self
            .seeker_poses
            .iter()
            .map(|(id, pose)| (*id, hider.position.distance_3d(&pose.position)))
            .find(|(_, distance)| *distance <= self.config.distance_endgame);

        match captured {
            Some((id, distance)) => self.finish(Winner::Seeker(id), Some(distance)),
            None => Vec::new(),
        }
    }

    fn finish(&mut self, winner: Winner, distance: Option<f64>) -> Vec<Dispatch> {
        if self.phase == GamePhase::Over {
            return Vec::new();
        }
        let clock = self.last_clock;
        self.transition(GamePhase::Over, clock.unwrap_or_default());
        self.outcome = Some(GameOutcome { winner, clock, distance });
        info!(winner = ?winner, clock = ?clock, distance = ?distance, "GAME_OVER: ゲーム終了");
        vec![Dispatch::new(Recipient::All, GameSignal::GameOver)]
    }

    fn transition(&mut self, next: GamePhase, clock: i64) {
        debug!(from = %self.phase, to = %next, clock, "PHASE_TRANSITION: 段階が切り替わりました");
        self.phase = next;
    }

    fn reset(&mut self) {
        self.phase = GamePhase::Idle;
        self.hider_pose = None;
        self.seeker_poses.clear();
        self.outcome = None;
    }
}
