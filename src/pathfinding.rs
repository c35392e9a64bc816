use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::VecDeque;
use std::f32::consts::SQRT_2;

/// An ordered run of grid points, consumed front-to-back while an
/// agent walks it. One-shot: points are popped, not indexed.
///
/// A path may carry a trailing facing requirement; after the last
/// point is consumed the follower issues a rotate-only step toward
/// `rotation_after`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    points: VecDeque<(i32, i32)>,
    initial_len: usize,
    rotation_after: Option<(i32, i32)>,
}

impl Path {
    pub fn new(points: Vec<(i32, i32)>) -> Self {
        let initial_len = points.len();
        Path {
            points: points.into(),
            initial_len,
            rotation_after: None,
        }
    }

    pub fn with_rotation_after(points: Vec<(i32, i32)>, face_point: (i32, i32)) -> Self {
        let mut path = Path::new(points);
        path.rotation_after = Some(face_point);
        path
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Point count at construction time, before any consumption.
    pub fn initial_len(&self) -> usize {
        self.initial_len
    }

    pub fn rotation_after(&self) -> Option<(i32, i32)> {
        self.rotation_after
    }

    /// Peek at the next point without consuming it.
    pub fn next_point(&self) -> Option<(i32, i32)> {
        self.points.front().copied()
    }

    /// Pop the next point.
    pub fn consume_next_point(&mut self) -> Option<(i32, i32)> {
        self.points.pop_front()
    }

    pub fn points(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.points.iter().copied()
    }
}

/// Open-list entry. Orders as a min-heap on priority; equal
/// priorities pop in insertion order.
#[derive(Debug, Clone, Copy)]
struct OpenNode {
    x: i32,
    y: i32,
    cost: f32,
    priority: f32,
    seq: u64,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap, so reverse both keys
        other
            .priority
            .partial_cmp(&self.priority)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

fn manhattan(x1: i32, y1: i32, x2: i32, y2: i32) -> f32 {
    ((x1 - x2).abs() + (y1 - y2).abs()) as f32
}

fn octile(x1: i32, y1: i32, x2: i32, y2: i32) -> f32 {
    let dx = (x1 - x2).abs() as f32;
    let dy = (y1 - y2).abs() as f32;
    dx.max(dy) + (SQRT_2 - 1.0) * dx.min(dy)
}

/// 4-directional A* with the Manhattan heuristic. Returns `None`
/// when no path exists. The returned path starts at `start`.
pub fn astar4(
    start: (i32, i32),
    goal: (i32, i32),
    width: i32,
    height: i32,
    can_pass: impl Fn(i32, i32) -> bool,
    get_cost: impl Fn(i32, i32) -> f32,
) -> Option<Path> {
    const DX: [i32; 4] = [0, 1, 0, -1];
    const DY: [i32; 4] = [-1, 0, 1, 0];
    astar_impl(start, goal, width, height, can_pass, get_cost, &DX, &DY, &[1.0; 4], manhattan)
}

/// 8-directional A* with the octile heuristic. Diagonal steps cost
/// sqrt(2) times the tile's base cost.
pub fn astar8(
    start: (i32, i32),
    goal: (i32, i32),
    width: i32,
    height: i32,
    can_pass: impl Fn(i32, i32) -> bool,
    get_cost: impl Fn(i32, i32) -> f32,
) -> Option<Path> {
    const DX: [i32; 8] = [0, 1, 1, 1, 0, -1, -1, -1];
    const DY: [i32; 8] = [-1, -1, 0, 1, 1, 1, 0, -1];
    const STEP: [f32; 8] = [1.0, SQRT_2, 1.0, SQRT_2, 1.0, SQRT_2, 1.0, SQRT_2];
    astar_impl(start, goal, width, height, can_pass, get_cost, &DX, &DY, &STEP, octile)
}

#[allow(clippy::too_many_arguments)]
fn astar_impl(
    start: (i32, i32),
    goal: (i32, i32),
    width: i32,
    height: i32,
    can_pass: impl Fn(i32, i32) -> bool,
    get_cost: impl Fn(i32, i32) -> f32,
    dx: &[i32],
    dy: &[i32],
    step_cost: &[f32],
    heuristic: fn(i32, i32, i32, i32) -> f32,
) -> Option<Path> {
    let n = (width * height) as usize;
    let idx = |x: i32, y: i32| (x + y * width) as usize;
    let mut came_from: Vec<Option<(i32, i32)>> = vec![None; n];
    let mut cost_so_far: Vec<f32> = vec![f32::MAX; n];
    let mut visited: Vec<bool> = vec![false; n];
    let mut open: BinaryHeap<OpenNode> = BinaryHeap::new();
    let mut seq = 0u64;

    cost_so_far[idx(start.0, start.1)] = 0.0;
    open.push(OpenNode {
        x: start.0,
        y: start.1,
        cost: 0.0,
        priority: heuristic(start.0, start.1, goal.0, goal.1),
        seq,
    });

    while let Some(current) = open.pop() {
        let (x, y) = (current.x, current.y);
        if visited[idx(x, y)] {
            continue;
        }
        visited[idx(x, y)] = true;

        if (x, y) == goal {
            return Some(Path::new(reconstruct(&came_from, width, x, y)));
        }

        for i in 0..dx.len() {
            let nx = x + dx[i];
            let ny = y + dy[i];
            if nx < 0 || ny < 0 || nx >= width || ny >= height {
                continue;
            }
            if !can_pass(nx, ny) {
                continue;
            }
            let new_cost = cost_so_far[idx(x, y)] + get_cost(nx, ny) * step_cost[i];
            if new_cost < cost_so_far[idx(nx, ny)] {
                cost_so_far[idx(nx, ny)] = new_cost;
                came_from[idx(nx, ny)] = Some((x, y));
                seq += 1;
                open.push(OpenNode {
                    x: nx,
                    y: ny,
                    cost: new_cost,
                    priority: new_cost + heuristic(nx, ny, goal.0, goal.1),
                    seq,
                });
            }
        }
    }

    None
}

fn reconstruct(came_from: &[Option<(i32, i32)>], width: i32, end_x: i32, end_y: i32) -> Vec<(i32, i32)> {
    let mut points = Vec::new();
    let (mut x, mut y) = (end_x, end_y);
    points.push((x, y));
    while let Some((px, py)) = came_from[(x + y * width) as usize] {
        points.push((px, py));
        x = px;
        y = py;
    }
    points.reverse();
    points
}

fn unit_dir(dx: i32, dy: i32) -> (i32, i32) {
    (dx.signum(), dy.signum())
}

/// Single forward pass over a path: collapses runs of points sharing
/// one unit direction into their corner points, and replaces an
/// orthogonal two-step ladder A-B-C (C diagonal from A) with the
/// direct diagonal when both flanking cells are passable. Output
/// length never exceeds input length and never enters a blocked cell.
pub fn optimize_path(path: &Path, can_pass: impl Fn(i32, i32) -> bool) -> Path {
    let input: Vec<(i32, i32)> = path.points().collect();
    if input.len() < 3 {
        return path.clone();
    }

    let mut optimized: Vec<(i32, i32)> = Vec::new();
    let mut i = 0usize;
    while i < input.len() {
        let start = input[i];
        optimized.push(start);

        let mut j = i + 1;
        if j >= input.len() {
            break;
        }

        let dir = unit_dir(input[j].0 - start.0, input[j].1 - start.1);
        while j + 1 < input.len()
            && unit_dir(input[j + 1].0 - input[j].0, input[j + 1].1 - input[j].1) == dir
        {
            j += 1;
        }

        if i + 2 < input.len() {
            let a = input[i];
            let c = input[i + 2];
            let dx_ac = c.0 - a.0;
            let dy_ac = c.1 - a.1;
            // ladder shortcut: both flanks must be open for the diagonal
            if dx_ac.abs() == 1
                && dy_ac.abs() == 1
                && can_pass(c.0, c.1)
                && can_pass(a.0, c.1)
                && can_pass(c.0, a.1)
            {
                optimized.push(c);
                i += 3;
                continue;
            }
        }

        i = j;
    }

    if optimized.last() != input.last() {
        optimized.push(*input.last().expect("non-empty path"));
    }

    let mut out = Path::new(optimized);
    out.rotation_after = path.rotation_after();
    out
}

/// Bounded Dijkstra flood fill over 4-directional moves. Visits cells
/// in increasing cumulative cost, never expanding past `max_cost`,
/// and collects every visited point satisfying `predicate` in visit
/// order (cheapest first).
pub fn find_reachable_points_with_cost4(
    start: (i32, i32),
    width: i32,
    height: i32,
    max_cost: f32,
    can_pass: impl Fn(i32, i32) -> bool,
    get_cost: impl Fn(i32, i32) -> f32,
    predicate: impl Fn((i32, i32)) -> bool,
) -> Vec<(i32, i32)> {
    const DX: [i32; 4] = [0, 1, 0, -1];
    const DY: [i32; 4] = [-1, 0, 1, 0];

    let n = (width * height) as usize;
    let idx = |x: i32, y: i32| (x + y * width) as usize;
    let mut cost_so_far: Vec<f32> = vec![f32::MAX; n];
    let mut visited: Vec<bool> = vec![false; n];
    let mut queue: BinaryHeap<OpenNode> = BinaryHeap::new();
    let mut seq = 0u64;
    let mut result = Vec::new();

    cost_so_far[idx(start.0, start.1)] = 0.0;
    queue.push(OpenNode {
        x: start.0,
        y: start.1,
        cost: 0.0,
        priority: 0.0,
        seq,
    });

    while let Some(current) = queue.pop() {
        let (x, y) = (current.x, current.y);
        if visited[idx(x, y)] {
            continue;
        }
        visited[idx(x, y)] = true;

        if predicate((x, y)) {
            result.push((x, y));
        }

        for i in 0..4 {
            let nx = x + DX[i];
            let ny = y + DY[i];
            if nx < 0 || ny < 0 || nx >= width || ny >= height {
                continue;
            }
            if !can_pass(nx, ny) {
                continue;
            }
            let new_cost = current.cost + get_cost(nx, ny);
            if new_cost > max_cost || new_cost >= cost_so_far[idx(nx, ny)] {
                continue;
            }
            cost_so_far[idx(nx, ny)] = new_cost;
            seq += 1;
            queue.push(OpenNode {
                x: nx,
                y: ny,
                cost: new_cost,
                priority: new_cost,
                seq,
            });
        }
    }

    result
}

/// Cheapest reachable point satisfying the predicate, if any.
pub fn find_closest_point(
    start: (i32, i32),
    width: i32,
    height: i32,
    max_cost: f32,
    can_pass: impl Fn(i32, i32) -> bool,
    get_cost: impl Fn(i32, i32) -> f32,
    predicate: impl Fn((i32, i32)) -> bool,
) -> Option<(i32, i32)> {
    find_reachable_points_with_cost4(start, width, height, max_cost, can_pass, get_cost, predicate)
        .into_iter()
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(_x: i32, _y: i32) -> bool {
        true
    }

    fn unit(_x: i32, _y: i32) -> f32 {
        1.0
    }

    #[test]
    fn astar4_open_grid_matches_manhattan_distance() {
        let path = astar4((0, 0), (3, 4), 10, 10, open, unit).unwrap();
        // includes the start point, so steps = len - 1
        assert_eq!(path.len() - 1, 7);
        assert_eq!(path.next_point(), Some((0, 0)));
    }

    #[test]
    fn astar4_start_equals_goal_yields_trivial_path() {
        let path = astar4((2, 2), (2, 2), 5, 5, open, unit).unwrap();
        assert_eq!(path.len(), 1);
    }

    #[test]
    fn astar4_returns_none_when_walled_off() {
        // vertical wall at x == 2
        let can_pass = |x: i32, _y: i32| x != 2;
        assert!(astar4((0, 0), (4, 0), 5, 5, can_pass, unit).is_none());
    }

    #[test]
    fn astar4_routes_around_walls() {
        // wall at x == 2 except a gap at y == 4
        let can_pass = |x: i32, y: i32| x != 2 || y == 4;
        let path = astar4((0, 0), (4, 0), 5, 5, can_pass, unit).unwrap();
        let points: Vec<_> = path.points().collect();
        assert!(points.contains(&(2, 4)));
        assert_eq!(*points.last().unwrap(), (4, 0));
        for &(x, y) in &points {
            assert!(can_pass(x, y));
        }
    }

    #[test]
    fn astar8_uses_diagonals() {
        let path = astar8((0, 0), (4, 4), 10, 10, open, unit).unwrap();
        // pure diagonal run: 4 steps
        assert_eq!(path.len() - 1, 4);
    }

    #[test]
    fn optimize_collapses_straight_runs() {
        let path = Path::new(vec![(0, 0), (1, 0), (2, 0), (3, 0), (4, 0)]);
        let optimized = optimize_path(&path, open);
        let points: Vec<_> = optimized.points().collect();
        assert_eq!(points.first(), Some(&(0, 0)));
        assert_eq!(points.last(), Some(&(4, 0)));
        assert!(points.len() <= 5);
    }

    #[test]
    fn optimize_takes_ladder_diagonal_when_flanks_open() {
        let path = Path::new(vec![(0, 0), (1, 0), (1, 1)]);
        let optimized = optimize_path(&path, open);
        let points: Vec<_> = optimized.points().collect();
        assert_eq!(points, vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn optimize_keeps_ladder_when_flank_blocked() {
        let blocked = |x: i32, y: i32| !(x == 0 && y == 1);
        let path = Path::new(vec![(0, 0), (1, 0), (1, 1)]);
        let optimized = optimize_path(&path, blocked);
        let points: Vec<_> = optimized.points().collect();
        assert_eq!(points.last(), Some(&(1, 1)));
        for &(x, y) in &points {
            assert!(blocked(x, y));
        }
    }

    #[test]
    fn optimize_never_lengthens() {
        let can_pass = |x: i32, y: i32| x != 2 || y == 4;
        let path = astar4((0, 0), (4, 0), 5, 5, can_pass, unit).unwrap();
        let before = path.len();
        let optimized = optimize_path(&path, can_pass);
        assert!(optimized.len() <= before);
        for (x, y) in optimized.points() {
            assert!(can_pass(x, y));
        }
    }

    #[test]
    fn reachable_points_respect_cost_budget() {
        let points =
            find_reachable_points_with_cost4((5, 5), 11, 11, 3.0, open, unit, |_| true);
        for &(x, y) in &points {
            assert!(manhattan(x, y, 5, 5) <= 3.0);
        }
        // the budget-3 diamond around the start
        assert_eq!(points.len(), 25);
    }

    #[test]
    fn reachable_points_come_cheapest_first() {
        let points =
            find_reachable_points_with_cost4((5, 5), 11, 11, 4.0, open, unit, |_| true);
        let costs: Vec<f32> = points.iter().map(|&(x, y)| manhattan(x, y, 5, 5)).collect();
        for pair in costs.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn closest_point_picks_cheapest_match() {
        let target = |p: (i32, i32)| p == (5, 8) || p == (5, 1);
        let found = find_closest_point((5, 5), 11, 11, 10.0, open, unit, target);
        assert_eq!(found, Some((5, 8)));
    }

    #[test]
    fn path_consumes_front_to_back() {
        let mut path = Path::new(vec![(0, 0), (1, 0)]);
        assert_eq!(path.next_point(), Some((0, 0)));
        assert_eq!(path.consume_next_point(), Some((0, 0)));
        assert_eq!(path.consume_next_point(), Some((1, 0)));
        assert_eq!(path.consume_next_point(), None);
        assert_eq!(path.initial_len(), 2);
    }

    #[test]
    fn rotation_survives_optimization() {
        let path = Path::with_rotation_after(vec![(0, 0), (1, 0), (2, 0)], (2, 1));
        let optimized = optimize_path(&path, open);
        assert_eq!(optimized.rotation_after(), Some((2, 1)));
    }
}
