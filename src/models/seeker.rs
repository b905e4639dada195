use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::models::{
    assignment::{AssignmentOutcome, TargetAssignmentCoordinator},
    common::{AgentId, AgentStatus, FollowTarget, GeometryError, Orientation, Pose, Position3D, RangeScan, VelocityCommand},
    config::GameConfig,
    decision::{MotionPolicy, PolicyInput},
    protocol::{GameSignal, SeekerDistanceVector},
    steering::SteeringPolicy,
    traits::{IAgent, Outbound},
};

/// 探す側エージェント
///
/// 候補一覧を受け取るたびに距離ベクトルを共有チャネルへ流し、共有チャネルで受け取った
/// ベクトルから追従対象を選び直します。スキャンごとの速度指令は [`MotionPolicy`] に委ねます。
pub struct Seeker {
    id: AgentId,
    config: Arc<GameConfig>,
    policy: Box<dyn MotionPolicy>,
    coordinator: TargetAssignmentCoordinator,
    status: AgentStatus,
    pose: Option<Pose>,
    clock: Option<i64>,
}

impl Seeker {
    /// 反応型操舵を使う探す側を作成
    pub fn new(id: u32, config: Arc<GameConfig>) -> Self {
        let policy = Box::new(SteeringPolicy::for_seeker(&config));
        Self::with_policy(id, config, policy)
    }

    /// 任意の行動ポリシーを使う探す側を作成
    pub fn with_policy(id: u32, config: Arc<GameConfig>, policy: Box<dyn MotionPolicy>) -> Self {
        Self {
            id: AgentId::Seeker(id),
            config,
            policy,
            coordinator: TargetAssignmentCoordinator::new(),
            status: AgentStatus::Waiting,
            pose: None,
            clock: None,
        }
    }

    pub fn pose(&self) -> Option<Pose> {
        self.pose
    }

    pub fn follow(&self) -> Option<FollowTarget> {
        self.coordinator.follow()
    }

    pub fn coordinator(&self) -> &TargetAssignmentCoordinator {
        &self.coordinator
    }

    /// 時計の値（未受信なら -1）
    pub fn time(&self) -> i64 {
        self.clock.unwrap_or(-1)
    }

    fn reset(&mut self) {
        self.status = AgentStatus::Waiting;
        self.coordinator.reset();
    }
}

impl IAgent for Seeker {
    fn get_id(&self) -> AgentId {
        self.id
    }

    fn status(&self) -> AgentStatus {
        self.status
    }

    fn on_clock(&mut self, sec: i64) {
        if self.clock.is_some_and(|last| sec < last) {
            info!(agent = %self.id, current = sec, "時計の巻き戻り: 状態をリセットします");
            self.reset();
        }
        self.clock = Some(sec);
    }

    fn on_odometry(&mut self, position: Position3D, orientation: Orientation) -> Result<(), GeometryError> {
        self.pose = Some(Pose::from_odometry(position, orientation)?);
        Ok(())
    }

    fn on_game_message(&mut self, payload: &str) -> Vec<Outbound> {
        let signal = match GameSignal::from_wire(payload) {
            Ok(signal) => signal,
            Err(e) => {
                warn!(agent = %self.id, payload, error = %e, "不正なゲーム信号を破棄しました");
                return Vec::new();
            }
        };

        match signal {
            GameSignal::Start => {
                if self.status == AgentStatus::Waiting {
                    info!(agent = %self.id, clock = self.time(), "開始信号を受信");
                    self.status = AgentStatus::Active;
                }
                Vec::new()
            }
            GameSignal::Targets(candidates) => {
                let distances = self.coordinator.update_candidates(candidates);
                trace!(agent = %self.id, candidates = distances.len(), "候補一覧を更新");
                vec![Outbound::PeerBroadcast(distances.to_wire())]
            }
            GameSignal::Bearing(_) => {
                debug!(agent = %self.id, "単独の方位報告は探す側では使用しません");
                Vec::new()
            }
            GameSignal::GameOver => {
                if self.status == AgentStatus::GameOver {
                    return Vec::new();
                }
                info!(agent = %self.id, "終了信号を受信: 停止します");
                self.status = AgentStatus::GameOver;
                vec![Outbound::Velocity(VelocityCommand::zero())]
            }
        }
    }

    fn on_peer_message(&mut self, payload: &str) -> Vec<Outbound> {
        let peer = match SeekerDistanceVector::from_wire(payload) {
            Ok(peer) => peer,
            Err(e) => {
                warn!(agent = %self.id, error = %e, "不正な距離ベクトルを破棄しました");
                return Vec::new();
            }
        };
        let outcome = self.coordinator.on_peer_vector(&peer, self.time(), self.config.seconds_seeker_start);
        if let AssignmentOutcome::ShapeMismatch { local, peer } = outcome {
            debug!(agent = %self.id, local, peer, "形状の合わない距離ベクトル");
        }
        Vec::new()
    }

    fn on_scan(&mut self, scan: &RangeScan) -> Vec<Outbound> {
        if self.time() < self.config.seconds_seeker_start || !self.is_active() {
            return Vec::new();
        }
        let input = PolicyInput {
            scan,
            follow: self.coordinator.follow(),
            elapsed: self.time(),
        };
        self.policy
            .command(&input)
            .map(Outbound::Velocity)
            .into_iter()
            .collect()
    }
}
