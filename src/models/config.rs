use serde::{Deserialize, Serialize};

/// ゲーム定数
///
/// 起動時に一度だけ構築され、`Arc` でコントローラと各エージェントに共有されます。
/// シナリオYAMLの `game` セクションで個別に上書きできます。
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GameConfig {
    /// 隠れる側の巡航速度（m/s）
    pub hider_linear_speed: f64,
    /// 探す側の巡航速度（m/s）
    pub seeker_linear_speed: f64,
    /// 離散行動ポリシーの回転速度（rad/s）
    pub angular_speed: f64,
    /// 隠れる側の開始時刻（秒）
    pub seconds_hider_start: i64,
    /// 探す側の開始時刻（秒）
    pub seconds_seeker_start: i64,
    /// 制限時間（秒、時計の値と比較）
    pub game_time_limit: i64,
    /// 旋回ゲイン
    pub turn_ratio: f64,
    /// 壁回避モードに入る距離（m）
    pub min_distance_to_wall: f64,
    /// 壁際での微速（m/s）
    pub speed_near_wall: f64,
    /// 捕獲判定距離（m、3次元）
    pub distance_endgame: f64,
    /// 視野の半角（度）
    pub fov_angle_deg: f64,
    /// 候補ターゲットの報告に見通し判定を使うか
    pub require_line_of_sight: bool,
}

impl GameConfig {
    /// 視野の半角（ラジアン）
    pub fn fov_angle(&self) -> f64 {
        self.fov_angle_deg.to_radians()
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            hider_linear_speed: 0.25,
            seeker_linear_speed: 0.2,
            angular_speed: 0.5,
            seconds_hider_start: 0,
            seconds_seeker_start: 10,
            game_time_limit: 60,
            turn_ratio: 0.75,
            min_distance_to_wall: 0.35,
            speed_near_wall: 0.1,
            distance_endgame: 0.3,
            fov_angle_deg: 60.0,
            require_line_of_sight: true,
        }
    }
}
