//! # Decision モジュール
//!
//! 探す側の行動決定を差し替え可能にするための境界です。
//!
//! - [`MotionPolicy`]: スキャン1回ごとに速度指令を返す戦略。既定は反応型の [`SteeringPolicy`]。
//! - [`DecisionPolicy`]: 外部の学習済みポリシーとの契約。11要素の観測ベクトルを受け取り、
//!   5種類の離散行動のいずれかを返します。[`DiscretePolicyAdapter`] で [`MotionPolicy`] に変換します。

use std::f64::consts::PI;

use tracing::trace;

use crate::models::common::{FollowTarget, RangeScan, VelocityCommand};
use crate::models::config::GameConfig;
use crate::models::steering::SteeringPolicy;

/// 観測ベクトルの要素数（レイ8本 + 追従方位 + 追従距離 + 経過時間）
pub const OBSERVATION_LEN: usize = 11;

/// レイの本数（45°刻み）
pub const RAY_COUNT: usize = 8;

/// ポリシーへの入力（スキャン1回分）
#[derive(Debug, Clone, Copy)]
pub struct PolicyInput<'a> {
    pub scan: &'a RangeScan,
    pub follow: Option<FollowTarget>,
    /// 時計の値（秒）
    pub elapsed: i64,
}

/// スキャン1回ごとに速度指令を決める戦略
pub trait MotionPolicy {
    /// `None` は「指令なし（直前の動きを維持）」
    fn command(&mut self, input: &PolicyInput<'_>) -> Option<VelocityCommand>;
}

impl MotionPolicy for SteeringPolicy {
    fn command(&mut self, input: &PolicyInput<'_>) -> Option<VelocityCommand> {
        self.steer(input.scan, input.follow)
    }
}

/// 固定順の観測ベクトル
///
/// `[ray_0°, ray_45°, …, ray_315°, follow_angle, follow_distance, elapsed_time]`。
/// 追従対象がない場合、方位と距離は無限大になります。
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationVector(pub [f64; OBSERVATION_LEN]);

impl ObservationVector {
    pub fn from_input(input: &PolicyInput<'_>) -> Self {
        let mut values = [0.0; OBSERVATION_LEN];
        for (k, value) in values.iter_mut().take(RAY_COUNT).enumerate() {
            *value = input.scan.range_towards(k as f64 * PI / 4.0);
        }
        let (angle, distance) = input
            .follow
            .map(|f| (f.angle, f.distance))
            .unwrap_or((f64::INFINITY, f64::INFINITY));
        values[RAY_COUNT] = angle;
        values[RAY_COUNT + 1] = distance;
        values[RAY_COUNT + 2] = input.elapsed as f64;
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// 離散行動
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscreteAction {
    Forward,
    RotateLeft,
    RotateRight,
    Stop,
    Backward,
}

impl DiscreteAction {
    pub fn to_command(self, linear_speed: f64, angular_speed: f64) -> VelocityCommand {
        match self {
            DiscreteAction::Forward => VelocityCommand::new(linear_speed, 0.0),
            DiscreteAction::RotateLeft => VelocityCommand::new(0.0, angular_speed),
            DiscreteAction::RotateRight => VelocityCommand::new(0.0, -angular_speed),
            DiscreteAction::Stop => VelocityCommand::zero(),
            DiscreteAction::Backward => VelocityCommand::new(-linear_speed, 0.0),
        }
    }
}

/// 外部の意思決定ポリシー（観測 → 離散行動）
pub trait DecisionPolicy {
    fn decide(&mut self, observation: &ObservationVector) -> DiscreteAction;
}

/// 離散行動ポリシーを速度指令ポリシーとして使うアダプタ
pub struct DiscretePolicyAdapter<P> {
    policy: P,
    linear_speed: f64,
    angular_speed: f64,
}

impl<P: DecisionPolicy> DiscretePolicyAdapter<P> {
    pub fn new(policy: P, config: &GameConfig) -> Self {
        Self {
            policy,
            linear_speed: config.seeker_linear_speed,
            angular_speed: config.angular_speed,
        }
    }
}

impl<P: DecisionPolicy> MotionPolicy for DiscretePolicyAdapter<P> {
    fn command(&mut self, input: &PolicyInput<'_>) -> Option<VelocityCommand> {
        let observation = ObservationVector::from_input(input);
        let action = self.policy.decide(&observation);
        trace!(observation = ?observation.as_slice(), action = ?action, "離散行動を選択");
        Some(action.to_command(self.linear_speed, self.angular_speed))
    }
}

/// 常に同じ行動を返すポリシー（学習済みモデルの代替）
#[derive(Debug, Clone, Copy)]
pub struct FixedActionPolicy(pub DiscreteAction);

impl DecisionPolicy for FixedActionPolicy {
    fn decide(&mut self, _observation: &ObservationVector) -> DiscreteAction {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recording {
        seen: Vec<ObservationVector>,
    }

    impl DecisionPolicy for Recording {
        fn decide(&mut self, observation: &ObservationVector) -> DiscreteAction {
            self.seen.push(observation.clone());
            DiscreteAction::RotateLeft
        }
    }

    fn scan_360() -> RangeScan {
        let ranges = (0..360).map(|i| i as f64).collect();
        RangeScan::new(0.0, (1.0f64).to_radians(), ranges)
    }

    #[test]
    fn test_observation_layout() {
        let scan = scan_360();
        let input = PolicyInput {
            scan: &scan,
            follow: Some(FollowTarget { angle: 0.5, distance: 1.5 }),
            elapsed: 12,
        };
        let obs = ObservationVector::from_input(&input);
        assert_eq!(&obs.as_slice()[..RAY_COUNT], &[0.0, 45.0, 90.0, 135.0, 180.0, 225.0, 270.0, 315.0]);
        assert_eq!(&obs.as_slice()[8..], &[0.5, 1.5, 12.0]);
    }

    #[test]
    fn test_observation_without_target() {
        let scan = scan_360();
        let input = PolicyInput { scan: &scan, follow: None, elapsed: 0 };
        let obs = ObservationVector::from_input(&input);
        assert!(obs.0[8].is_infinite());
        assert!(obs.0[9].is_infinite());
    }

    #[test]
    fn test_action_mapping() {
        assert_eq!(DiscreteAction::Forward.to_command(0.2, 0.5), VelocityCommand::new(0.2, 0.0));
        assert_eq!(DiscreteAction::RotateRight.to_command(0.2, 0.5), VelocityCommand::new(0.0, -0.5));
        assert_eq!(DiscreteAction::Backward.to_command(0.2, 0.5), VelocityCommand::new(-0.2, 0.0));
        assert!(DiscreteAction::Stop.to_command(0.2, 0.5).is_zero());
    }

    #[test]
    fn test_adapter_substitutes_reactive_policy() {
        let config = GameConfig::default();
        let scan = scan_360();
        let input = PolicyInput { scan: &scan, follow: None, elapsed: 20 };

        let mut adapter = DiscretePolicyAdapter::new(Recording { seen: Vec::new() }, &config);
        let cmd = adapter.command(&input).unwrap();
        assert_eq!(cmd, VelocityCommand::new(0.0, 0.5));
        assert_eq!(adapter.policy.seen.len(), 1);
        assert_eq!(adapter.policy.seen[0].0[10], 20.0);

        let mut reactive: Box<dyn MotionPolicy> = Box::new(SteeringPolicy::for_seeker(&config));
        assert!(reactive.command(&input).is_some());
    }
}
