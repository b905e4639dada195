use crate::models::common::{AgentId, AgentStatus, GeometryError, Orientation, Position3D, RangeScan, VelocityCommand};

/// エージェントが送出するメッセージ
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// 速度指令
    Velocity(VelocityCommand),
    /// 探す側の共有チャネルへの距離ベクトル（ワイヤ形式）
    PeerBroadcast(String),
}

/// 全てのゲームエージェント（隠れる側・探す側）が実装する基本インターフェース
///
/// 各ハンドラは1メッセージを最後まで処理してから戻ります。
pub trait IAgent {
    /// エージェントIDの取得
    fn get_id(&self) -> AgentId;

    /// 現在の状態
    fn status(&self) -> AgentStatus;

    /// 移動指令を出せる状態かどうか
    fn is_active(&self) -> bool {
        self.status() == AgentStatus::Active
    }

    /// 時計の受信（巻き戻りでローカル状態をリセット）
    fn on_clock(&mut self, sec: i64);

    /// 自身のオドメトリの受信
    fn on_odometry(&mut self, position: Position3D, orientation: Orientation) -> Result<(), GeometryError>;

    /// ゲーム信号チャネルの受信（解析できないメッセージは破棄）
    fn on_game_message(&mut self, payload: &str) -> Vec<Outbound>;

    /// 測域スキャンの受信
    fn on_scan(&mut self, scan: &RangeScan) -> Vec<Outbound>;

    /// 探す側の共有チャネルの受信
    fn on_peer_message(&mut self, _payload: &str) -> Vec<Outbound> {
        Vec::new()
    }
}
