use tracing::{debug, info};

use crate::models::common::FollowTarget;
use crate::models::protocol::{SeekerDistanceVector, TargetReport};

/// 割り当て結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    /// 候補の位置（送信側の候補順）
    pub index: usize,
    pub angle: f64,
    pub distance: f64,
}

impl Assignment {
    pub fn follow(&self) -> FollowTarget {
        FollowTarget { angle: self.angle, distance: self.distance }
    }
}

/// 相手ベクトルを受信したときの処理結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssignmentOutcome {
    /// 自分の開始時刻前なので無視
    BeforeStart,
    /// 相手のベクトルが自分より長い（形状違反、この更新のみ無視）
    ShapeMismatch { local: usize, peer: usize },
    /// 比較できる要素がない
    NoCandidate,
    Assigned(Assignment),
}

/// 符号付き差 `local[i] - peer[i]` が最小となる位置を選ぶ
///
/// 相手のベクトルが自分より長い場合、または比較可能な要素がない場合は `None`。
/// 同値の場合は先に現れた位置を採用します（安定走査）。
/// これは重複回避のための経験則であり、最適な割り当てを保証するものではありません。
pub fn select_target(local: &[f64], peer: &[f64]) -> Option<usize> {
    if peer.len() > local.len() {
        return None;
    }
    let mut best: Option<(usize, f64)> = None;
    for (i, (&mine, &theirs)) in local.iter().zip(peer).enumerate() {
        let diff = mine - theirs;
        if diff.is_nan() {
            continue;
        }
        match best {
            Some((_, best_diff)) if diff >= best_diff => {}
            _ => best = Some((i, diff)),
        }
    }
    best.map(|(i, _)| i)
}

/// 複数の探す側でターゲット選択が重ならないよう調整するコーディネータ
///
/// 各探す側が自分の候補ごとの距離を共有チャネルに流し、相手のベクトルを受け取るたびに
/// [`select_target`] で自分の追従対象を選び直します。古いデータは次の受信で上書きされます。
#[derive(Debug, Clone, Default)]
pub struct TargetAssignmentCoordinator {
    candidates: Vec<TargetReport>,
    assignment: Option<Assignment>,
}

impl TargetAssignmentCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 自分が認識している候補を更新し、共有すべき距離ベクトルを返す
    pub fn update_candidates(&mut self, candidates: Vec<TargetReport>) -> SeekerDistanceVector {
        self.candidates = candidates;
        self.local_distances()
    }

    pub fn local_distances(&self) -> SeekerDistanceVector {
        SeekerDistanceVector(self.candidates.iter().map(|c| c.distance).collect())
    }

    pub fn candidates(&self) -> &[TargetReport] {
        &self.candidates
    }

    pub fn assignment(&self) -> Option<Assignment> {
        self.assignment
    }

    pub fn follow(&self) -> Option<FollowTarget> {
        self.assignment.map(|a| a.follow())
    }

    /// 相手の距離ベクトルを受信
    pub fn on_peer_vector(&mut self, peer: &SeekerDistanceVector, now: i64, start_time: i64) -> AssignmentOutcome {
        if now < start_time {
            return AssignmentOutcome::BeforeStart;
        }
        if peer.is_empty() {
            return AssignmentOutcome::NoCandidate;
        }
        let local = self.local_distances();
        if peer.len() > local.len() {
            debug!(local = local.len(), peer = peer.len(), "相手の距離ベクトルが長いため無視します");
            return AssignmentOutcome::ShapeMismatch { local: local.len(), peer: peer.len() };
        }
        let Some(index) = select_target(local.as_slice(), peer.as_slice()) else {
            return AssignmentOutcome::NoCandidate;
        };

        let candidate = self.candidates[index];
        let assignment = Assignment { index, angle: candidate.angle, distance: candidate.distance };
        if self.assignment.map(|a| a.index) != Some(index) {
            info!(index, angle = assignment.angle, distance = assignment.distance, "追従ターゲットを割り当てました");
        }
        self.assignment = Some(assignment);
        AssignmentOutcome::Assigned(assignment)
    }

    pub fn reset(&mut self) {
        self.candidates.clear();
        self.assignment = None;
    }
}
