use std::f64::consts::PI;

use tracing::trace;

use crate::models::common::{math_utils, FollowTarget, RangeScan, VelocityCommand};
use crate::models::config::GameConfig;

/// 操舵の振る舞い
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SteeringVariant {
    /// 追従方位から逃げる（方位は探す側への方位）
    Evade,
    /// 追従方位へ向かう
    Pursue,
}

/// 障害物が機体のどちら側にあるか
///
/// 方位 [0, 2π) を45°ずつ8区画に分け、前方左3区画・前方右3区画・後方2区画にまとめます。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WallSide {
    Left,
    Right,
    Rear,
}

impl WallSide {
    pub fn classify(angle: f64) -> Self {
        let a = math_utils::wrap_two_pi(angle);
        if a < 5.0 * PI / 8.0 {
            WallSide::Left
        } else if a > 11.0 * PI / 8.0 {
            WallSide::Right
        } else {
            WallSide::Rear
        }
    }
}

/// 反応型の操舵パラメータ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringParams {
    pub linear_speed: f64,
    pub min_distance_to_wall: f64,
    pub speed_near_wall: f64,
    pub turn_ratio: f64,
}

/// 反応型操舵ポリシー
///
/// 最寄り障害物の距離・方位と追従方位から速度指令を生成します。
/// 壁に近い場合は回避旋回（必要に応じて前後の微速）、
/// 離れている場合は追従方位に沿って（逃げる側は反対向きに）旋回します。
#[derive(Debug, Clone, PartialEq)]
pub struct SteeringPolicy {
    pub variant: SteeringVariant,
    pub params: SteeringParams,
}

impl SteeringPolicy {
    pub fn new(variant: SteeringVariant, params: SteeringParams) -> Self {
        Self { variant, params }
    }

    pub fn for_hider(config: &GameConfig) -> Self {
        Self::new(
            SteeringVariant::Evade,
            SteeringParams {
                linear_speed: config.hider_linear_speed,
                min_distance_to_wall: config.min_distance_to_wall,
                speed_near_wall: config.speed_near_wall,
                turn_ratio: config.turn_ratio,
            },
        )
    }

    pub fn for_seeker(config: &GameConfig) -> Self {
        Self::new(
            SteeringVariant::Pursue,
            SteeringParams {
                linear_speed: config.seeker_linear_speed,
                min_distance_to_wall: config.min_distance_to_wall,
                speed_near_wall: config.speed_near_wall,
                turn_ratio: config.turn_ratio,
            },
        )
    }

    /// スキャン1回分の速度指令
    ///
    /// 有限の測定値が一つもない場合は `None`（直前の指令を維持）。
    pub fn steer(&self, scan: &RangeScan, follow: Option<FollowTarget>) -> Option<VelocityCommand> {
        let (range, angle) = scan.nearest()?;
        Some(self.evaluate(range, angle, follow.map(|f| f.angle)))
    }

    /// 最寄り障害物と追従方位から指令を計算
    pub fn evaluate(&self, obstacle_range: f64, obstacle_angle: f64, follow_angle: Option<f64>) -> VelocityCommand {
        let follow_angle = follow_angle.filter(|a| a.is_finite());
        let mut linear = self.params.linear_speed;

        let steering = if obstacle_range <= self.params.min_distance_to_wall {
            let a = math_utils::wrap_two_pi(obstacle_angle);
            let side = WallSide::classify(a);
            if let Some(creep) = self.creep(a, side) {
                linear = creep;
            }
            trace!(range = obstacle_range, angle = a, side = ?side, "壁回避モード");
            match side {
                WallSide::Left => a + self.avoidance_offset(5.0 * PI / 8.0, side, follow_angle),
                WallSide::Right => a + self.avoidance_offset(11.0 * PI / 8.0, side, follow_angle),
                WallSide::Rear => self.clear_path_bearing(follow_angle),
            }
        } else {
            self.clear_path_bearing(follow_angle)
        };

        VelocityCommand::new(linear, math_utils::normalize_angle(steering) * self.params.turn_ratio)
    }

    /// 正面付近なら後退、斜め前方なら前進の微速
    fn creep(&self, a: f64, side: WallSide) -> Option<f64> {
        let slow = self.params.speed_near_wall;
        match side {
            WallSide::Left if a < PI / 8.0 => Some(-slow),
            WallSide::Left if a < 3.0 * PI / 8.0 => Some(slow),
            WallSide::Right if a > 15.0 * PI / 8.0 => Some(-slow),
            WallSide::Right if a > 13.0 * PI / 8.0 => Some(slow),
            _ => None,
        }
    }

    /// 回避旋回のオフセット
    ///
    /// 基本は障害物と反対側へ（負のオフセット）。追う側でターゲットが障害物と
    /// 同じ側にある場合は符号を反転し、ターゲットから真っ直ぐ離れる旋回を避けます。
    fn avoidance_offset(&self, magnitude: f64, side: WallSide, follow_angle: Option<f64>) -> f64 {
        let target_on_obstacle_side = match (self.variant, follow_angle) {
            (SteeringVariant::Pursue, Some(f)) => match side {
                WallSide::Left => f >= 0.0,
                WallSide::Right => f < 0.0,
                WallSide::Rear => false,
            },
            _ => false,
        };
        if target_on_obstacle_side { magnitude } else { -magnitude }
    }

    /// 壁から離れているときの操舵方位
    fn clear_path_bearing(&self, follow_angle: Option<f64>) -> f64 {
        match (self.variant, follow_angle) {
            (SteeringVariant::Pursue, Some(f)) => f,
            (SteeringVariant::Evade, Some(f)) => math_utils::normalize_angle(f + PI),
            (_, None) => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeker() -> SteeringPolicy {
        SteeringPolicy::for_seeker(&GameConfig::default())
    }

    fn hider() -> SteeringPolicy {
        SteeringPolicy::for_hider(&GameConfig::default())
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_no_finite_reading_holds_motion() {
        let scan = RangeScan::new(0.0, PI / 180.0, vec![f64::INFINITY; 360]);
        assert!(seeker().steer(&scan, None).is_none());
        assert!(hider().steer(&scan, None).is_none());
    }

    #[test]
    fn test_clear_path_pursues_follow_bearing() {
        let cmd = seeker().evaluate(2.0, 1.0, Some(0.4));
        assert!(close(cmd.linear_x, 0.2));
        assert!(close(cmd.angular_z, 0.4 * 0.75));
    }

    #[test]
    fn test_clear_path_without_target_goes_straight() {
        let cmd = seeker().evaluate(2.0, 1.0, None);
        assert!(close(cmd.angular_z, 0.0));
        let cmd = seeker().evaluate(2.0, 1.0, Some(f64::INFINITY));
        assert!(close(cmd.angular_z, 0.0));
    }

    #[test]
    fn test_hider_evades_follow_bearing() {
        // 探す側が正面 → 反転して真後ろへ
        let cmd = hider().evaluate(2.0, 0.0, Some(0.0));
        assert!(close(cmd.linear_x, 0.25));
        assert!(close(cmd.angular_z, PI * 0.75));
        // 探す側が左前方 → 右後方へ
        let cmd = hider().evaluate(2.0, 0.0, Some(PI / 4.0));
        assert!(close(cmd.angular_z, -3.0 * PI / 4.0 * 0.75));
        // 真後ろなら直進
        let cmd = hider().evaluate(2.0, 0.0, Some(PI));
        assert!(close(cmd.angular_z, 0.0));
    }

    #[test]
    fn test_head_on_wall_reverses_and_turns_away() {
        let a = PI / 16.0;
        let cmd = seeker().evaluate(0.2, a, None);
        assert!(close(cmd.linear_x, -0.1));
        assert!(close(cmd.angular_z, (a - 5.0 * PI / 8.0) * 0.75));
        assert!(cmd.angular_z < 0.0);
    }

    #[test]
    fn test_creep_sectors() {
        let s = seeker();
        assert!(close(s.evaluate(0.3, PI / 4.0, None).linear_x, 0.1));
        assert!(close(s.evaluate(0.3, PI / 2.0, None).linear_x, 0.2));
        assert!(close(s.evaluate(0.3, 31.0 * PI / 16.0, None).linear_x, -0.1));
        assert!(close(s.evaluate(0.3, 7.0 * PI / 4.0, None).linear_x, 0.1));
        assert!(close(s.evaluate(0.3, 3.0 * PI / 2.0, None).linear_x, 0.2));
        // 負の方位は [0, 2π) に折り返して判定
        assert!(close(s.evaluate(0.3, -PI / 4.0, None).linear_x, 0.1));
    }

    #[test]
    fn test_right_wall_turns_left() {
        let a = 7.0 * PI / 4.0;
        let cmd = hider().evaluate(0.3, a, Some(0.0));
        assert!(close(cmd.angular_z, (a - 11.0 * PI / 8.0) * 0.75));
        assert!(cmd.angular_z > 0.0);
    }

    #[test]
    fn test_seeker_offset_depends_on_target_side() {
        let a = PI / 4.0;
        let s = seeker();
        // ターゲットが右（障害物の反対側）→ 右へ回避
        let away = s.evaluate(0.3, a, Some(-0.5));
        assert!(close(away.angular_z, (a - 5.0 * PI / 8.0) * 0.75));
        // ターゲットが左（障害物と同じ側）→ 反転オフセット
        let toward = s.evaluate(0.3, a, Some(0.5));
        assert!(close(toward.angular_z, (a + 5.0 * PI / 8.0) * 0.75));
        // 逃げる側はターゲット位置に関係なく回避
        let h = hider().evaluate(0.3, a, Some(0.5));
        assert!(close(h.angular_z, (a - 5.0 * PI / 8.0) * 0.75));
    }

    #[test]
    fn test_seeker_offset_flips_on_right_side() {
        let a = 7.0 * PI / 4.0;
        let s = seeker();
        let slow = GameConfig::default().speed_near_wall;
        // ターゲットが左（障害物の反対側）→ a - 11π/8
        let away = s.evaluate(0.3, a, Some(0.5));
        assert!(close(away.linear_x, slow));
        assert!(close(away.angular_z, 3.0 * PI / 8.0 * 0.75));
        // ターゲットが右（障害物と同じ側）→ a + 11π/8 を正規化
        let toward = s.evaluate(0.3, a, Some(-0.5));
        assert!(close(toward.linear_x, slow));
        assert!(close(toward.angular_z, math_utils::normalize_angle(a + 11.0 * PI / 8.0) * 0.75));
        assert!(close(toward.angular_z, -7.0 * PI / 8.0 * 0.75));
        // 負の角度で渡しても同じ分類
        let wrapped = s.evaluate(0.3, -PI / 4.0, Some(-0.5));
        assert!(close(wrapped.angular_z, toward.angular_z));
        // 逃げる側は常に a - 11π/8
        let h = hider().evaluate(0.3, a, Some(-0.5));
        assert!(close(h.angular_z, 3.0 * PI / 8.0 * 0.75));
    }

    #[test]
    fn test_rear_obstacle_keeps_following() {
        let cmd = seeker().evaluate(0.1, PI, Some(0.3));
        assert!(close(cmd.linear_x, 0.2));
        assert!(close(cmd.angular_z, 0.3 * 0.75));
    }

    #[test]
    fn test_steer_uses_nearest_reading() {
        let mut ranges = vec![3.0; 8];
        ranges[1] = 0.2;
        let scan = RangeScan::new(0.0, PI / 4.0, ranges);
        let cmd = seeker().steer(&scan, None).unwrap();
        // π/4 → 前進微速、右へ回避
        assert!(close(cmd.linear_x, 0.1));
        assert!(close(cmd.angular_z, (PI / 4.0 - 5.0 * PI / 8.0) * 0.75));
    }
}
