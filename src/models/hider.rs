use tracing::{debug, info, warn};

use crate::models::{
    common::{AgentId, AgentStatus, FollowTarget, GeometryError, Orientation, Pose, Position3D, RangeScan, VelocityCommand},
    config::GameConfig,
    protocol::GameSignal,
    steering::SteeringPolicy,
    traits::{IAgent, Outbound},
};

/// 隠れる側エージェント
///
/// 開始信号を受けるまでは動かず、開始後はスキャンのたびに
/// 探す側への方位報告から逃げる向きへ操舵します。終了信号で停止指令を一度だけ出し、以後は指令を出しません。
#[derive(Debug, Clone)]
pub struct Hider {
    steering: SteeringPolicy,
    status: AgentStatus,
    pose: Option<Pose>,
    /// 最後に報告された探す側への方位
    follow: Option<FollowTarget>,
    clock: Option<i64>,
}

impl Hider {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            steering: SteeringPolicy::for_hider(config),
            status: AgentStatus::Waiting,
            pose: None,
            follow: None,
            clock: None,
        }
    }

    pub fn pose(&self) -> Option<Pose> {
        self.pose
    }

    pub fn follow(&self) -> Option<FollowTarget> {
        self.follow
    }

    fn reset(&mut self) {
        self.status = AgentStatus::Waiting;
        self.follow = None;
    }
}

impl IAgent for Hider {
    fn get_id(&self) -> AgentId {
        AgentId::Hider
    }

    fn status(&self) -> AgentStatus {
        self.status
    }

    fn on_clock(&mut self, sec: i64) {
        if self.clock.is_some_and(|last| sec < last) {
            info!(agent = %AgentId::Hider, current = sec, "時計の巻き戻り: 状態をリセットします");
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
                warn!(agent = %AgentId::Hider, payload, error = %e, "不正なゲーム信号を破棄しました");
                return Vec::new();
            }
        };

        match signal {
            GameSignal::Start => {
                if self.status == AgentStatus::Waiting {
                    info!(agent = %AgentId::Hider, "開始信号を受信");
                    self.status = AgentStatus::Active;
                }
                Vec::new()
            }
            GameSignal::Bearing(report) => {
                self.follow = Some(FollowTarget { angle: report.angle, distance: report.distance });
                Vec::new()
            }
            GameSignal::Targets(_) => {
                debug!(agent = %AgentId::Hider, "候補一覧は隠れる側では使用しません");
                Vec::new()
            }
            GameSignal::GameOver => {
                if self.status == AgentStatus::GameOver {
                    return Vec::new();
                }
                info!(agent = %AgentId::Hider, "終了信号を受信: 停止します");
                self.status = AgentStatus::GameOver;
                vec![Outbound::Velocity(VelocityCommand::zero())]
            }
        }
    }

    fn on_scan(&mut self, scan: &RangeScan) -> Vec<Outbound> {
        if !self.is_active() {
            return Vec::new();
        }
        self.steering
            .steer(scan, self.follow)
            .map(Outbound::Velocity)
            .into_iter()
            .collect()
    }
}
