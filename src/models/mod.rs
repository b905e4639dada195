// 基本的なデータ型と数学ユーティリティ
pub mod common;

// ゲーム定数
pub mod config;

// エージェントの基本インターフェース（trait）定義
pub mod traits;

// 壁地図と視認判定
pub mod visibility;

// 反応型操舵と差し替え可能な行動ポリシー
pub mod steering;
pub mod decision;

// ゲーム信号・共有チャネルのメッセージ
pub mod protocol;

// ゲーム進行と探す側どうしの割り当て
pub mod game_controller;
pub mod assignment;

// 各エージェントモデルの実装
pub mod hider;
pub mod seeker;

// 便利な re-export
pub use common::*;
pub use config::GameConfig;
pub use traits::*;
pub use visibility::{WallMap, WallSegment};
pub use decision::{DiscreteAction, DiscretePolicyAdapter, FixedActionPolicy};
pub use game_controller::{Dispatch, GameOutcome, GamePhase, GamePhaseController, Recipient, Winner};
pub use hider::Hider;
pub use seeker::Seeker;
