use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet, VecDeque},
    fmt,
    str::FromStr,
    time::{Duration, Instant},
};

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::{Position, world::World};

/// Number of independent hill-climbing attempts per greedy-local call.
const RESTART_ATTEMPTS: usize = 10;
/// Moves a single hill-climbing attempt may make before giving up.
const ATTEMPT_ITERATION_CAP: usize = 1000;
/// Expansion budget multiplier: a search may expand at most
/// `rows * cols * TIME_HORIZON_FACTOR` states. Bounds time-aware
/// exploration, where the time dimension is in principle unbounded while
/// an obstacle schedule is active.
const TIME_HORIZON_FACTOR: usize = 8;

/// Represents errors raised when resolving a planning request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error(
        "Unknown strategy '{0}': expected breadth-first, uniform-cost, heuristic, or greedy-local"
    )]
    UnknownStrategy(String),
    #[error("Unknown mode '{0}': expected static or time-aware")]
    UnknownMode(String),
}

/// The four interchangeable planning strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// FIFO exploration, every move costs 1. Fewest moves.
    BreadthFirst,
    /// Least accumulated terrain cost first. Optimal for costs >= 1.
    UniformCost,
    /// Uniform cost plus an admissible Manhattan estimate. Same optimal
    /// cost, usually fewer expansions.
    Heuristic,
    /// Hill-climbing with seeded random restarts. Cheap, incomplete.
    GreedyLocal,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::BreadthFirst,
        Strategy::UniformCost,
        Strategy::Heuristic,
        Strategy::GreedyLocal,
    ];
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::BreadthFirst => "breadth-first",
            Strategy::UniformCost => "uniform-cost",
            Strategy::Heuristic => "heuristic",
            Strategy::GreedyLocal => "greedy-local",
        };
        f.write_str(name)
    }
}

impl FromStr for Strategy {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "breadth-first" | "bfs" => Ok(Strategy::BreadthFirst),
            "uniform-cost" | "ucs" => Ok(Strategy::UniformCost),
            "heuristic" | "a-star" => Ok(Strategy::Heuristic),
            "greedy-local" | "local" => Ok(Strategy::GreedyLocal),
            other => Err(PlanError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Which state space a search runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// States are grid positions; scheduled obstacles are only consulted
    /// at time 0.
    Static,
    /// States are `(position, time)` pairs, so the same position at
    /// different times is explored separately and a cell can legally be
    /// re-entered once an obstacle has vacated it.
    TimeAware,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Static => "static",
            Mode::TimeAware => "time-aware",
        };
        f.write_str(name)
    }
}

impl FromStr for Mode {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(Mode::Static),
            "time-aware" | "dynamic" => Ok(Mode::TimeAware),
            other => Err(PlanError::UnknownMode(other.to_string())),
        }
    }
}

/// A single planning request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub start: Position,
    pub goal: Position,
    pub mode: Mode,
    pub strategy: Strategy,
    /// Time step at which the agent occupies `start`. Zero for fresh
    /// plans; the replanning loop passes the current simulation time so
    /// spliced paths line up with obstacle schedules. Ignored in static
    /// mode.
    pub depart_time: u32,
    /// Seed for the greedy-local restart randomization.
    pub seed: u64,
}

impl PlanRequest {
    pub fn new(start: Position, goal: Position, mode: Mode, strategy: Strategy) -> Self {
        PlanRequest {
            start,
            goal,
            mode,
            strategy,
            depart_time: 0,
            seed: 0,
        }
    }

    pub fn departing_at(mut self, time: u32) -> Self {
        self.depart_time = time;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// The outcome of a planning call.
///
/// `total_cost` is the sum of destination-cell costs along the path,
/// excluding the start cell. A failed search has `found == false`, an
/// empty path, and zero cost; callers must check the flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanResult {
    pub path: Vec<Position>,
    pub total_cost: u32,
    pub steps: usize,
    pub elapsed: Duration,
    pub found: bool,
}

/// Computes a path for the request using its strategy. Pure: the world is
/// only queried, never mutated.
pub fn plan(world: &World, request: &PlanRequest) -> PlanResult {
    let started = Instant::now();
    let path = match request.strategy {
        Strategy::BreadthFirst => best_first(world, request, Frontier::fifo(), true, false),
        Strategy::UniformCost => best_first(world, request, Frontier::priority(), false, false),
        Strategy::Heuristic => best_first(world, request, Frontier::priority(), false, true),
        Strategy::GreedyLocal => greedy_local(world, request),
    };
    let elapsed = started.elapsed();
    match path {
        Some(path) => {
            let total_cost = path_cost(world, &path);
            let steps = path.len().saturating_sub(1);
            debug!(strategy = %request.strategy, total_cost, steps, "plan found");
            PlanResult {
                path,
                total_cost,
                steps,
                elapsed,
                found: true,
            }
        }
        None => {
            debug!(strategy = %request.strategy, "no path found");
            PlanResult {
                path: Vec::new(),
                total_cost: 0,
                steps: 0,
                elapsed,
                found: false,
            }
        }
    }
}

/// A node in the search space: a grid position at a discrete time step.
/// Static-mode searches collapse the time component for deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SearchState {
    position: Position,
    time: u32,
}

/// State identity for visited-set deduplication: position-only in static
/// mode, position plus time when obstacles move.
fn identity(state: SearchState, mode: Mode) -> SearchState {
    match mode {
        Mode::Static => SearchState { time: 0, ..state },
        Mode::TimeAware => state,
    }
}

#[derive(Clone, Eq, PartialEq)]
struct OpenEntry {
    priority: u32,
    /// Insertion counter. Equal priorities pop in insertion order, so the
    /// first-discovered state wins ties deterministically.
    seq: u64,
    cost: u32,
    state: SearchState,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The frontier ordering policy shared by the systematic strategies:
/// first-in-first-out for breadth-first, a priority heap for the
/// cost-ordered searches.
enum Frontier {
    Fifo(VecDeque<(SearchState, u32)>),
    Priority { heap: BinaryHeap<OpenEntry>, seq: u64 },
}

impl Frontier {
    fn fifo() -> Self {
        Frontier::Fifo(VecDeque::new())
    }

    fn priority() -> Self {
        Frontier::Priority {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    fn push(&mut self, state: SearchState, cost: u32, priority: u32) {
        match self {
            Frontier::Fifo(queue) => queue.push_back((state, cost)),
            Frontier::Priority { heap, seq } => {
                heap.push(OpenEntry {
                    priority,
                    seq: *seq,
                    cost,
                    state,
                });
                *seq += 1;
            }
        }
    }

    fn pop(&mut self) -> Option<(SearchState, u32)> {
        match self {
            Frontier::Fifo(queue) => queue.pop_front(),
            Frontier::Priority { heap, .. } => heap.pop().map(|entry| (entry.state, entry.cost)),
        }
    }
}

/// The shared best-first skeleton behind breadth-first, uniform-cost, and
/// heuristic search.
///
/// A neighbor is relaxed only when the move yields a strictly lower
/// accumulated cost than previously recorded for its destination position;
/// visited-state deduplication uses the mode's state identity. The search
/// gives up once the expansion budget is exhausted.
fn best_first(
    world: &World,
    request: &PlanRequest,
    mut frontier: Frontier,
    unit_cost: bool,
    use_heuristic: bool,
) -> Option<Vec<Position>> {
    let heuristic = |position: Position| -> u32 {
        if use_heuristic {
            position.manhattan_distance(&request.goal) as u32
        } else {
            0
        }
    };
    let start_time = match request.mode {
        Mode::TimeAware => request.depart_time,
        Mode::Static => 0,
    };
    let start = SearchState {
        position: request.start,
        time: start_time,
    };
    let budget = world.rows() * world.cols() * TIME_HORIZON_FACTOR;

    let mut visited: HashSet<SearchState> = HashSet::new();
    let mut best_cost: HashMap<Position, u32> = HashMap::new();
    let mut parent: HashMap<SearchState, SearchState> = HashMap::new();

    best_cost.insert(start.position, 0);
    frontier.push(start, 0, heuristic(start.position));

    let mut expanded = 0usize;
    while let Some((state, cost)) = frontier.pop() {
        if state.position == request.goal {
            trace!(expanded, "goal state dequeued");
            return Some(reconstruct_path(&parent, state));
        }
        if !visited.insert(identity(state, request.mode)) {
            continue;
        }
        expanded += 1;
        if expanded > budget {
            warn!(budget, "search expansion budget exhausted");
            return None;
        }
        for neighbor in world.neighbors(state.position) {
            let next_time = match request.mode {
                Mode::TimeAware => state.time + 1,
                Mode::Static => 0,
            };
            if world.is_blocked_or_occupied(neighbor, next_time) {
                continue;
            }
            let next_state = SearchState {
                position: neighbor,
                time: next_time,
            };
            if visited.contains(&identity(next_state, request.mode)) {
                continue;
            }
            let step = if unit_cost { 1 } else { world.cost_of(neighbor) };
            let next_cost = cost + step;
            if best_cost.get(&neighbor).is_none_or(|&c| next_cost < c) {
                best_cost.insert(neighbor, next_cost);
                parent.insert(next_state, state);
                frontier.push(next_state, next_cost, next_cost + heuristic(neighbor));
            }
        }
    }
    None
}

/// Hill-climbing with seeded random restarts.
///
/// Each attempt starts over from the request's start position and walks to
/// the unvisited, unoccupied neighbor nearest the goal, with distance ties
/// broken by a per-restart shuffle. An attempt that runs out of candidate
/// neighbors is stuck and fails outright; the cheapest successful attempt
/// wins. Incomplete by design: failure means "not found by this
/// heuristic", not that no path exists.
fn greedy_local(world: &World, request: &PlanRequest) -> Option<Vec<Position>> {
    let mut rng = StdRng::seed_from_u64(request.seed);
    let mut best: Option<(u32, Vec<Position>)> = None;

    for attempt in 0..RESTART_ATTEMPTS {
        let mut current = request.start;
        let mut time = match request.mode {
            Mode::TimeAware => request.depart_time,
            Mode::Static => 0,
        };
        let mut visited = HashSet::from([current]);
        let mut path = vec![current];
        let mut cost = 0u32;

        for _ in 0..ATTEMPT_ITERATION_CAP {
            if current == request.goal {
                break;
            }
            let arrival = match request.mode {
                Mode::TimeAware => time + 1,
                Mode::Static => 0,
            };
            let mut candidates: Vec<Position> = world
                .neighbors(current)
                .into_iter()
                .filter(|n| !visited.contains(n) && !world.is_blocked_or_occupied(*n, arrival))
                .collect();
            if candidates.is_empty() {
                // stuck: no retry within an attempt
                break;
            }
            candidates.shuffle(&mut rng);
            candidates.sort_by_key(|n| n.manhattan_distance(&request.goal));
            let next = candidates[0];
            visited.insert(next);
            path.push(next);
            cost += world.cost_of(next);
            current = next;
            if matches!(request.mode, Mode::TimeAware) {
                time += 1;
            }
        }

        if current == request.goal
            && best.as_ref().is_none_or(|(best_cost, _)| cost < *best_cost)
        {
            trace!(attempt, cost, "greedy attempt reached the goal");
            best = Some((cost, path));
        }
    }
    best.map(|(_, path)| path)
}

/// Walks the predecessor chain back from the goal state and reverses it.
fn reconstruct_path(
    parent: &HashMap<SearchState, SearchState>,
    goal: SearchState,
) -> Vec<Position> {
    let mut path = vec![goal.position];
    let mut current = goal;
    while let Some(&prev) = parent.get(&current) {
        path.push(prev.position);
        current = prev;
    }
    path.reverse();
    path
}

fn path_cost(world: &World, path: &[Position]) -> u32 {
    path.iter().skip(1).map(|&p| world.cost_of(p)).sum()
}
