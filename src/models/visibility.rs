use std::sync::Arc;

use crate::models::common::{Point2D, Position3D};

/// 壁セグメント（2端点）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallSegment {
    pub start: Point2D,
    pub end: Point2D,
}

impl WallSegment {
    pub fn new(start: Point2D, end: Point2D) -> Self {
        Self { start, end }
    }

    /// 長さ0の壁（点）かどうか
    pub fn is_degenerate(&self) -> bool {
        self.start == self.end
    }
}

/// 静的な壁マップ
///
/// 起動時に一度だけ読み込まれ、以後は読み取り専用で共有されます。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WallMap {
    walls: Vec<WallSegment>,
}

impl WallMap {
    pub fn new(walls: Vec<WallSegment>) -> Self {
        Self { walls }
    }

    /// 標準アリーナ（5m四方の外壁 + 目・口の内壁）
    pub fn reference_arena() -> Self {
        let wall = |x1: f64, y1: f64, x2: f64, y2: f64| {
            WallSegment::new(Point2D::new(x1, y1), Point2D::new(x2, y2))
        };
        Self::new(vec![
            // 外壁
            wall(-2.5, 2.5, 2.5, 2.5),
            wall(-2.5, -2.5, 2.5, -2.5),
            wall(2.5, -2.5, 2.5, 2.5),
            wall(-2.5, -2.5, -2.5, 2.5),
            // 左目
            wall(1.0, 0.5, 1.0, 2.5),
            wall(2.0, 0.5, 2.0, 1.5),
            wall(1.0, 1.5, 2.0, 1.5),
            // 右目
            wall(1.0, -0.5, 1.0, -2.5),
            wall(2.0, -0.5, 2.0, -1.5),
            wall(1.0, -1.5, 2.0, -1.5),
            // 口
            wall(-2.0, 0.5, -1.0, 0.5),
            wall(-2.0, -0.5, -1.0, -0.5),
            wall(-1.0, -0.5, -1.0, 0.5),
            wall(-2.0, -0.5, -2.0, -0.5),
        ])
    }

    pub fn walls(&self) -> &[WallSegment] {
        &self.walls
    }

    pub fn len(&self) -> usize {
        self.walls.len()
    }

    /// 線分 (a, b) がいずれかの壁と交差するか
    pub fn blocks(&self, a: Point2D, b: Point2D) -> bool {
        self.walls
            .iter()
            .filter(|wall| !wall.is_degenerate())
            .any(|wall| segments_intersect(a, b, wall.start, wall.end))
    }
}

/// 3点の向き
#[derive(Debug, Clone, Copy, PartialEq)]
enum Turn {
    Clockwise,
    CounterClockwise,
    Collinear,
}

fn orientation(p: Point2D, q: Point2D, r: Point2D) -> Turn {
    let val = (q.y - p.y) * (r.x - q.x) - (q.x - p.x) * (r.y - q.y);
    if val > 0.0 {
        Turn::Clockwise
    } else if val < 0.0 {
        Turn::CounterClockwise
    } else {
        Turn::Collinear
    }
}

/// 一般位置の線分交差判定
///
/// 共線・端点接触のケースは交差なしとして扱います（見通しを遮らない）。
pub fn segments_intersect(p1: Point2D, q1: Point2D, p2: Point2D, q2: Point2D) -> bool {
    let o1 = orientation(p1, q1, p2);
    let o2 = orientation(p1, q1, q2);
    let o3 = orientation(p2, q2, p1);
    let o4 = orientation(p2, q2, q1);

    if [o1, o2, o3, o4].contains(&Turn::Collinear) {
        return false;
    }
    o1 != o2 && o3 != o4
}

/// 見通し判定
///
/// 観測者から見た方位が視野の半角以内で、かつ2点を結ぶ線分が
/// どの壁とも交差しない場合に「見える」と判定します。壁数に対して O(n)。
#[derive(Debug, Clone)]
pub struct VisibilityOracle {
    walls: Arc<WallMap>,
    fov_angle: f64,
}

impl VisibilityOracle {
    pub fn new(walls: Arc<WallMap>, fov_angle: f64) -> Self {
        Self { walls, fov_angle }
    }

    pub fn can_see(&self, bearing: f64, from: &Position3D, to: &Position3D) -> bool {
        if !(bearing.abs() <= self.fov_angle) {
            return false;
        }
        !self.walls.blocks(from.xy(), to.xy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::common::math_utils::bearing;
    use std::f64::consts::PI;

    fn oracle() -> VisibilityOracle {
        VisibilityOracle::new(Arc::new(WallMap::reference_arena()), PI / 3.0)
    }

    #[test]
    fn test_outside_fov_is_rejected() {
        let o = oracle();
        let a = Position3D::new(0.0, 0.0, 0.0);
        let b = Position3D::new(0.5, 0.0, 0.0);
        assert!(o.can_see(0.0, &a, &b));
        assert!(o.can_see(PI / 3.0, &a, &b));
        assert!(!o.can_see(PI / 3.0 + 1e-6, &a, &b));
        assert!(!o.can_see(-PI / 2.0, &a, &b));
        assert!(!o.can_see(f64::NAN, &a, &b));
    }

    #[test]
    fn test_wall_blocks_line_of_sight() {
        let o = oracle();
        // 左目の縦壁 x=1.0 (y: 0.5..2.5) を挟む
        let a = Position3D::new(0.5, 1.0, 0.0);
        let b = Position3D::new(1.5, 1.0, 0.0);
        assert!(!o.can_see(0.0, &a, &b));

        let c = Position3D::new(0.5, 0.0, 0.0);
        let d = Position3D::new(1.5, 0.0, 0.0);
        assert!(o.can_see(0.0, &c, &d));
    }

    #[test]
    fn test_visibility_is_symmetric() {
        let o = oracle();
        let pairs = [
            (Position3D::new(0.5, 1.0, 0.0), Position3D::new(1.5, 1.0, 0.0)),
            (Position3D::new(0.0, 0.0, 0.0), Position3D::new(0.8, 0.2, 0.0)),
            (Position3D::new(-0.5, 0.0, 0.0), Position3D::new(-1.5, 0.0, 0.0)),
        ];
        for (a, b) in pairs {
            // 互いに正面を向いている
            let yaw_a = (b.y - a.y).atan2(b.x - a.x);
            let yaw_b = (a.y - b.y).atan2(a.x - b.x);
            let ab = bearing(&a, yaw_a, &b);
            let ba = bearing(&b, yaw_b, &a);
            assert_eq!(o.can_see(ab, &a, &b), o.can_see(ba, &b, &a));
        }
    }

    #[test]
    fn test_collinear_and_touching_do_not_block() {
        let map = WallMap::new(vec![WallSegment::new(Point2D::new(0.0, 0.0), Point2D::new(2.0, 0.0))]);
        // 壁と同一直線上
        assert!(!map.blocks(Point2D::new(0.5, 0.0), Point2D::new(1.5, 0.0)));
        // 端点が壁上に接する
        assert!(!map.blocks(Point2D::new(1.0, 0.0), Point2D::new(1.0, 1.0)));
        // 完全に横切る
        assert!(map.blocks(Point2D::new(1.0, -1.0), Point2D::new(1.0, 1.0)));
    }

    #[test]
    fn test_degenerate_wall_never_blocks() {
        let wall = WallSegment::new(Point2D::new(-2.0, -0.5), Point2D::new(-2.0, -0.5));
        assert!(wall.is_degenerate());
        let map = WallMap::new(vec![wall]);
        assert!(!map.blocks(Point2D::new(-3.0, -0.5), Point2D::new(-1.0, -0.5)));
        assert!(!map.blocks(Point2D::new(-2.0, -1.0), Point2D::new(-2.0, 0.0)));
    }
}
