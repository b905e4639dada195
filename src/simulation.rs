//! # Simulation モジュール
//!
//! かくれんぼゲームのシナリオ実行エンジンを提供します。
//!
//! シナリオに記述された入力イベント（時計・オドメトリ・スキャン・生の信号）を順番に
//! ゲーム進行コントローラと各エージェントへ配送し、エージェントが出力した速度指令を記録します。
//! 通信路はプロセス内のメッセージキューで表し、ゲーム信号と共有チャネルはワイヤ形式の文字列で流します。
//!
//! ## 処理順序
//!
//! 1. **時計**: 各エージェント → コントローラ（段階遷移と開始・終了信号）
//! 2. **オドメトリ**: 対象エージェント → コントローラ（方位報告・候補一覧・捕獲判定）
//! 3. **スキャン**: 対象エージェントの行動ポリシー
//! 4. **キュー処理**: 1イベントごとに、キューが空になるまで信号と共有チャネルを配送
//!
//! 各メッセージは最後まで処理してから次を取り出すため、エージェント内の処理順は到着順と一致します。
//!
//! ## 使用例
//!
//! ```rust,ignore
//! let config = ScenarioConfig::from_file("scenarios/capture.yaml")?;
//! let mut engine = SimulationEngine::new(config, 1);
//! let report = engine.run()?;
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::models::*;
use crate::scenario::{self, ScenarioConfig, ScenarioEvent, SeekerPolicyKind};

/// キュー上のメッセージ
#[derive(Debug, Clone, PartialEq)]
enum Envelope {
    Game { to: AgentId, payload: String },
    Peer { to: AgentId, payload: String },
}

/// 記録された速度指令
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandRecord {
    /// 指令のきっかけとなった入力イベントの位置
    pub event_index: usize,
    pub clock: Option<i64>,
    pub agent: AgentId,
    pub command: VelocityCommand,
}

/// 実行統計
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimulationStats {
    pub events: usize,
    pub game_messages: usize,
    pub peer_messages: usize,
    pub velocity_commands: usize,
}

/// 実行結果
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub phase: GamePhase,
    pub outcome: Option<GameOutcome>,
    pub stats: SimulationStats,
}

/// シミュレーション実行エラー
#[derive(Debug)]
pub enum SimulationError {
    /// 不正なオドメトリ（回復不能）
    Geometry {
        event_index: usize,
        agent: AgentId,
        source: GeometryError,
    },
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::Geometry { event_index, agent, source } => {
                write!(f, "イベント{} ({}) の姿勢入力が不正です: {}", event_index, agent, source)
            }
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::Geometry { source, .. } => Some(source),
        }
    }
}

pub struct SimulationEngine {
    pub scenario_config: ScenarioConfig,
    pub verbose_level: u8,

    controller: GamePhaseController,
    hider: Hider,
    seekers: BTreeMap<AgentId, Seeker>,

    queue: VecDeque<Envelope>,
    commands: Vec<CommandRecord>,
    stats: SimulationStats,
    current_event: usize,
}

impl SimulationEngine {
    pub fn new(scenario: ScenarioConfig, verbose_level: u8) -> Self {
        let config = Arc::new(scenario.game.clone());
        let walls = Arc::new(scenario.arena.wall_map());

        let seekers = scenario
            .agents
            .seekers
            .iter()
            .map(|&id| {
                let seeker = match scenario.agents.seeker_policy {
                    SeekerPolicyKind::Reactive => Seeker::new(id, Arc::clone(&config)),
                    SeekerPolicyKind::Forward => {
                        let policy = DiscretePolicyAdapter::new(FixedActionPolicy(DiscreteAction::Forward), &config);
                        Seeker::with_policy(id, Arc::clone(&config), Box::new(policy))
                    }
                };
                (AgentId::Seeker(id), seeker)
            })
            .collect();

        if verbose_level > 1 {
            debug!(walls = walls.len(), seekers = scenario.agents.seekers.len(), "シミュレーションエンジンを構築");
        }

        Self {
            controller: GamePhaseController::new(Arc::clone(&config), walls),
            hider: Hider::new(&config),
            seekers,
            queue: VecDeque::new(),
            commands: Vec::new(),
            stats: SimulationStats::default(),
            current_event: 0,
            scenario_config: scenario,
            verbose_level,
        }
    }

    pub fn controller(&self) -> &GamePhaseController {
        &self.controller
    }

    pub fn hider(&self) -> &Hider {
        &self.hider
    }

    pub fn seeker(&self, id: u32) -> Option<&Seeker> {
        self.seekers.get(&AgentId::Seeker(id))
    }

    pub fn commands(&self) -> &[CommandRecord] {
        &self.commands
    }

    /// エージェントが最後に出した速度指令
    pub fn last_command(&self, agent: AgentId) -> Option<VelocityCommand> {
        self.commands.iter().rev().find(|r| r.agent == agent).map(|r| r.command)
    }

    pub fn stats(&self) -> SimulationStats {
        self.stats
    }

    /// 全イベントを順に実行
    pub fn run(&mut self) -> Result<SimulationReport, SimulationError> {
        info!(name = %self.scenario_config.meta.name, events = self.scenario_config.events.len(), "=== シミュレーション実行開始 ===");

        let events = std::mem::take(&mut self.scenario_config.events);
        let result = events.iter().enumerate().try_for_each(|(index, event)| self.step(index, event));
        self.scenario_config.events = events;
        result?;

        let report = self.report();
        info!(phase = %report.phase, outcome = ?report.outcome, "=== シミュレーション完了 ===");
        info!(
            events = report.stats.events,
            game_messages = report.stats.game_messages,
            peer_messages = report.stats.peer_messages,
            velocity_commands = report.stats.velocity_commands,
            "実行統計"
        );
        Ok(report)
    }

    pub fn report(&self) -> SimulationReport {
        SimulationReport {
            phase: self.controller.phase(),
            outcome: self.controller.outcome(),
            stats: self.stats,
        }
    }

    /// 1イベントを処理し、キューが空になるまで配送
    pub fn step(&mut self, index: usize, event: &ScenarioEvent) -> Result<(), SimulationError> {
        self.current_event = index;
        self.stats.events += 1;

        match event {
            ScenarioEvent::Clock { sec } => {
                if self.verbose_level > 2 {
                    trace!(index, sec, "時計");
                }
                self.hider.on_clock(*sec);
                for seeker in self.seekers.values_mut() {
                    seeker.on_clock(*sec);
                }
                let dispatches = self.controller.on_clock(*sec);
                self.dispatch(dispatches);
            }
            ScenarioEvent::Odometry { agent, position, orientation, yaw } => {
                let (position, orientation) = scenario::odometry_input(position, orientation.as_ref(), *yaw);
                let geometry_error = |source| SimulationError::Geometry { event_index: index, agent: *agent, source };
                let pose = Pose::from_odometry(position, orientation).map_err(geometry_error)?;
                if let Some(runtime) = self.agent_mut(*agent) {
                    runtime.on_odometry(position, orientation).map_err(geometry_error)?;
                }
                let dispatches = self.controller.on_pose(*agent, pose);
                self.dispatch(dispatches);
            }
            ScenarioEvent::Scan { agent, scan } => {
                let scan = scan.to_scan();
                if let Some(runtime) = self.agent_mut(*agent) {
                    let from = runtime.get_id();
                    let outbound = runtime.on_scan(&scan);
                    self.handle_outbound(from, outbound);
                }
            }
            ScenarioEvent::Signal { agent, payload } => {
                self.queue.push_back(Envelope::Game { to: *agent, payload: payload.clone() });
            }
            ScenarioEvent::Peer { agent, payload } => {
                self.queue.push_back(Envelope::Peer { to: *agent, payload: payload.clone() });
            }
        }

        self.drain();
        Ok(())
    }

    fn agent_mut(&mut self, agent: AgentId) -> Option<&mut dyn IAgent> {
        let runtime: Option<&mut dyn IAgent> = match agent {
            AgentId::Hider => Some(&mut self.hider),
            AgentId::Seeker(_) => self.seekers.get_mut(&agent).map(|s| s as &mut dyn IAgent),
        };
        if runtime.is_none() {
            warn!(agent = %agent, "未登録のエージェント宛てのイベントを無視しました");
        }
        runtime
    }

    fn recipients(&self, to: Recipient) -> Vec<AgentId> {
        match to {
            Recipient::Agent(agent) => vec![agent],
            Recipient::AllSeekers => self.seekers.keys().copied().collect(),
            Recipient::All => std::iter::once(AgentId::Hider).chain(self.seekers.keys().copied()).collect(),
        }
    }

    fn dispatch(&mut self, dispatches: Vec<Dispatch>) {
        for d in dispatches {
            let payload = d.signal.to_wire();
            for to in self.recipients(d.to) {
                self.queue.push_back(Envelope::Game { to, payload: payload.clone() });
            }
        }
    }

    fn handle_outbound(&mut self, from: AgentId, outbound: Vec<Outbound>) {
        for message in outbound {
            match message {
                Outbound::Velocity(command) => {
                    self.stats.velocity_commands += 1;
                    self.commands.push(CommandRecord {
                        event_index: self.current_event,
                        clock: self.controller.last_clock(),
                        agent: from,
                        command,
                    });
                }
                Outbound::PeerBroadcast(payload) => {
                    // 共有チャネルは送信者自身にも届く
                    for to in self.recipients(Recipient::AllSeekers) {
                        self.queue.push_back(Envelope::Peer { to, payload: payload.clone() });
                    }
                }
            }
        }
    }

    fn drain(&mut self) {
        while let Some(envelope) = self.queue.pop_front() {
            let (to, outbound) = match envelope {
                Envelope::Game { to, payload } => {
                    self.stats.game_messages += 1;
                    let outbound = match self.agent_mut(to) {
                        Some(runtime) => runtime.on_game_message(&payload),
                        None => Vec::new(),
                    };
                    (to, outbound)
                }
                Envelope::Peer { to, payload } => {
                    self.stats.peer_messages += 1;
                    let outbound = match self.agent_mut(to) {
                        Some(runtime) => runtime.on_peer_message(&payload),
                        None => Vec::new(),
                    };
                    (to, outbound)
                }
            };
            self.handle_outbound(to, outbound);
        }
    }

    /// 実行結果の概要を表示
    pub fn print_summary(&self) {
        let controller = self.controller();
        let stats = self.stats();
        println!("=== 実行結果 ===");
        println!("最終段階: {}", controller.phase());
        match controller.outcome() {
            Some(outcome) => {
                let winner = match outcome.winner {
                    Winner::Hider => "隠れる側（制限時間）".to_string(),
                    Winner::Seeker(id) => format!("{}（捕獲）", id),
                };
                println!("勝者: {}", winner);
                if let Some(clock) = outcome.clock {
                    println!("終了時刻: {}秒", clock);
                }
                if let Some(distance) = outcome.distance {
                    println!("捕獲距離: {:.3}m", distance);
                }
            }
            None => println!("勝者: 未決定"),
        }
        println!();
        println!("入力イベント: {}件", stats.events);
        println!("ゲーム信号: {}件", stats.game_messages);
        println!("共有チャネル: {}件", stats.peer_messages);
        println!(
            "速度指令: {}件 (停止 {}件)",
            stats.velocity_commands,
            self.commands().iter().filter(|r| r.command.is_zero()).count()
        );

        println!();
        print_agent_line(AgentId::Hider, self.hider().pose(), self.hider().follow(), self.last_command(AgentId::Hider));
        for &id in &self.scenario_config.agents.seekers {
            let Some(seeker) = self.seeker(id) else { continue };
            let agent = AgentId::Seeker(id);
            print_agent_line(agent, seeker.pose(), seeker.follow(), self.last_command(agent));
            let coordinator = seeker.coordinator();
            match coordinator.assignment() {
                Some(a) => println!("    候補 {}件 / 割り当て #{}", coordinator.candidates().len(), a.index),
                None => println!("    候補 {}件 / 割り当てなし", coordinator.candidates().len()),
            }
        }
    }
}

fn print_agent_line(agent: AgentId, pose: Option<Pose>, follow: Option<FollowTarget>, last: Option<VelocityCommand>) {
    let pose = pose.map_or_else(
        || "姿勢未受信".to_string(),
        |p| format!("({:.2}, {:.2}) yaw={:.2}", p.position.x, p.position.y, p.yaw),
    );
    let follow = follow.map_or_else(|| "-".to_string(), |f| format!("{:.2}rad {:.2}m", f.angle, f.distance));
    println!("  {}: {} 追従={}", agent, pose, follow);
    if let Some(cmd) = last {
        println!("    最終指令 linear={:.3} angular={:.3}", cmd.linear_x, cmd.angular_z);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{AgentsConfig, ScanConfig};

    fn run(config: ScenarioConfig) -> SimulationEngine {
        let mut engine = SimulationEngine::new(config, 0);
        engine.run().unwrap();
        engine
    }

    fn open_scan(agent: AgentId) -> ScenarioEvent {
        ScenarioEvent::Scan { agent, scan: ScanConfig { fill: Some(3.0), ..ScanConfig::default() } }
    }

    #[test]
    fn test_demo_capture() {
        let engine = run(ScenarioConfig::demo());
        let seeker = AgentId::Seeker(1);

        assert_eq!(engine.controller().phase(), GamePhase::Over);
        let outcome = engine.controller().outcome().unwrap();
        assert_eq!(outcome.winner, Winner::Seeker(seeker));
        assert_eq!(outcome.clock, Some(11));
        assert!((outcome.distance.unwrap() - 0.2).abs() < 1e-9);

        // 隠れる側は探す側を正面 1.0m に見ていた
        let follow = engine.hider().follow().unwrap();
        assert!(follow.angle.abs() < 1e-9);
        assert!((follow.distance - 1.0).abs() < 1e-9);

        // 終了後はどちらも停止指令が最後
        assert_eq!(engine.last_command(AgentId::Hider), Some(VelocityCommand::zero()));
        assert_eq!(engine.last_command(seeker), Some(VelocityCommand::zero()));
        assert_eq!(engine.hider().status(), AgentStatus::GameOver);
    }

    #[test]
    fn test_no_motion_after_game_over() {
        let engine = run(ScenarioConfig::demo());
        let stop_index = engine
            .commands()
            .iter()
            .position(|r| r.command.is_zero())
            .unwrap();
        // 停止指令の後に出るのは各エージェント1回ずつの停止指令のみ
        let after: Vec<_> = engine.commands()[stop_index..].iter().collect();
        assert_eq!(after.len(), 2);
        assert!(after.iter().all(|r| r.command.is_zero()));
    }

    #[test]
    fn test_seeker_follows_hider_after_start() {
        let mut config = ScenarioConfig::demo();
        // 捕獲の手前で止める
        config.events.truncate(10);
        let engine = run(config);
        assert_eq!(engine.controller().phase(), GamePhase::BothActive);
        let follow = engine.seeker(1).and_then(|s| s.follow()).unwrap();
        assert!(follow.angle.abs() < 1e-9);
        assert!((follow.distance - 1.0).abs() < 1e-9);

        // 開始後の探す側の指令は正面への巡航
        let last = engine.last_command(AgentId::Seeker(1)).unwrap();
        assert_eq!(last.linear_x, 0.2);
        assert!(last.angular_z.abs() < 1e-9);
    }

    #[test]
    fn test_agent_state_visible_to_summary() {
        let mut config = ScenarioConfig::demo();
        config.events.truncate(10);
        let engine = run(config);

        assert!(engine.hider().pose().is_some());
        let seeker = engine.seeker(1).unwrap();
        assert!(seeker.pose().is_some());
        let coordinator = seeker.coordinator();
        assert_eq!(coordinator.candidates().len(), 1);
        assert_eq!(coordinator.assignment().map(|a| a.index), Some(0));
        assert!(engine.seeker(2).is_none());

        assert_eq!(engine.stats().velocity_commands, engine.commands().len());
        // スキャン由来の指令は送信元エージェントで記録される
        assert!(engine.commands().iter().any(|r| r.agent == AgentId::Seeker(1)));
        engine.print_summary();
    }

    #[test]
    fn test_time_limit_hider_wins() {
        let mut config = ScenarioConfig::demo();
        config.events = vec![
            ScenarioEvent::Clock { sec: 0 },
            ScenarioEvent::odometry(AgentId::Hider, 0.0, 0.0, 0.0),
            ScenarioEvent::odometry(AgentId::Seeker(1), 2.0, 2.0, 0.0),
            ScenarioEvent::Clock { sec: 30 },
            ScenarioEvent::Clock { sec: 60 },
            open_scan(AgentId::Hider),
        ];
        let engine = run(config);
        let outcome = engine.controller().outcome().unwrap();
        assert_eq!(outcome.winner, Winner::Hider);
        assert_eq!(outcome.clock, Some(60));
        assert_eq!(engine.last_command(AgentId::Hider), Some(VelocityCommand::zero()));
    }

    #[test]
    fn test_invalid_orientation_aborts() {
        let mut config = ScenarioConfig::demo();
        config.events = vec![
            ScenarioEvent::Clock { sec: 0 },
            ScenarioEvent::Odometry {
                agent: AgentId::Hider,
                position: scenario::Position3D { x_m: 0.0, y_m: 0.0, z_m: 0.0 },
                orientation: Some(scenario::QuaternionConfig { x: 0.0, y: 0.0, z: 0.0, w: 0.0 }),
                yaw: None,
            },
        ];
        let mut engine = SimulationEngine::new(config, 0);
        match engine.run() {
            Err(SimulationError::Geometry { event_index, agent, .. }) => {
                assert_eq!(event_index, 1);
                assert_eq!(agent, AgentId::Hider);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_malformed_signals_are_dropped() {
        let mut config = ScenarioConfig::demo();
        config.events = vec![
            ScenarioEvent::Clock { sec: 0 },
            ScenarioEvent::Signal { agent: AgentId::Hider, payload: "Angle abc".to_string() },
            ScenarioEvent::Signal { agent: AgentId::Hider, payload: "Hello".to_string() },
            ScenarioEvent::Peer { agent: AgentId::Seeker(1), payload: "x\n".to_string() },
            open_scan(AgentId::Hider),
        ];
        let engine = run(config);
        assert!(engine.hider().follow().is_none());
        assert!(engine.hider().is_active());
        assert_eq!(engine.stats().game_messages, 3);
        assert_eq!(engine.stats().peer_messages, 1);
        assert_eq!(engine.commands().len(), 1);
    }

    #[test]
    fn test_clock_rewind_resets_game() {
        let mut config = ScenarioConfig::demo();
        config.events.push(ScenarioEvent::Clock { sec: 3 });
        let engine = run(config);
        assert_eq!(engine.controller().phase(), GamePhase::HiderActive);
        assert!(engine.controller().outcome().is_none());
        assert!(engine.seeker(1).and_then(|s| s.follow()).is_none());
        // 再開後の開始信号で隠れる側は再び動ける
        assert!(engine.hider().is_active());
    }

    #[test]
    fn test_two_seekers_share_distance_vectors() {
        let mut config = ScenarioConfig::demo();
        config.arena.walls = Some(Vec::new());
        config.agents = AgentsConfig { seekers: vec![1, 2], ..AgentsConfig::default() };
        config.events = vec![
            ScenarioEvent::Clock { sec: 0 },
            ScenarioEvent::odometry(AgentId::Hider, 0.0, 0.0, 0.0),
            ScenarioEvent::Clock { sec: 10 },
            ScenarioEvent::odometry(AgentId::Seeker(1), 1.0, 0.0, std::f64::consts::PI),
            ScenarioEvent::odometry(AgentId::Seeker(2), 0.0, 2.0, -std::f64::consts::FRAC_PI_2),
        ];
        let engine = run(config);
        // 各探す側の候補一覧は全探す側へ配送される
        assert_eq!(engine.stats().peer_messages, 4);
        let s1 = engine.seeker(1).and_then(|s| s.follow()).unwrap();
        let s2 = engine.seeker(2).and_then(|s| s.follow()).unwrap();
        assert!((s1.distance - 1.0).abs() < 1e-9);
        assert!((s2.distance - 2.0).abs() < 1e-9);
        assert!(s2.angle.abs() < 1e-9);
    }

    #[test]
    fn test_bundled_scenarios_outcomes() {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios");
        let outcome = |name: &str| {
            let config = ScenarioConfig::from_file(dir.join(name)).unwrap();
            run(config).controller().outcome().unwrap()
        };

        let capture = outcome("capture.yaml");
        assert_eq!(capture.winner, Winner::Seeker(AgentId::Seeker(1)));
        assert_eq!(capture.clock, Some(12));

        // 内壁越しでは候補に入らず、制限時間で隠れる側の勝ち
        let timeout = outcome("timeout.yaml");
        assert_eq!(timeout.winner, Winner::Hider);
        assert_eq!(timeout.clock, Some(30));

        let two = outcome("two_seekers.yaml");
        assert_eq!(two.winner, Winner::Seeker(AgentId::Seeker(2)));
        assert!((two.distance.unwrap() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_forward_policy_seekers() {
        let mut config = ScenarioConfig::demo();
        config.agents.seeker_policy = SeekerPolicyKind::Forward;
        config.events.truncate(9);
        let engine = run(config);
        assert_eq!(engine.last_command(AgentId::Seeker(1)), Some(VelocityCommand::new(0.2, 0.0)));
    }
}
