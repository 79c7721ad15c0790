use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    Position,
    planner::{Mode, PlanRequest, Strategy, plan},
    world::World,
};

/// The replanning loop's state machine.
///
/// `Traveling` follows the committed path one cell per time step;
/// `Replanning` marks a detected occupancy conflict one step ahead;
/// `Stuck` and `Arrived` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Traveling,
    Replanning,
    Stuck,
    Arrived,
}

/// The simulated agent: a position, the remaining fuel, and the elapsed
/// time. Mutated only by the replanning loop's move step; fuel only
/// decreases and time only increases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub position: Position,
    pub fuel: u32,
    pub time: u32,
}

/// One snapshot per state-machine transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEvent {
    pub time: u32,
    pub position: Position,
    pub fuel_remaining: u32,
    pub phase: Phase,
}

/// How a simulation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationOutcome {
    /// The agent reached the goal.
    Arrived,
    /// Fuel ran out or a replan failed; the loop never retries from here.
    Stuck,
    /// The initial plan found no path at all.
    NoInitialPath,
}

/// The full record of one simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub outcome: SimulationOutcome,
    pub events: Vec<StepEvent>,
}

/// Steps a fuel-constrained agent from `start` to `goal` along a committed
/// path, replanning around occupancy conflicts discovered one step ahead.
///
/// The initial path comes from the heuristic planner in static mode: the
/// committed route treats the obstacle schedule as not yet discovered, and
/// conflicts surface while traveling. Each replan invokes the greedy-local
/// strategy in time-aware mode, departing at the current simulation time so
/// the spliced path lines up with the schedule. Running out of fuel before
/// a move, or a failed replan, ends the run as `Stuck`.
pub fn run_replanning_simulation(
    world: &World,
    start: Position,
    goal: Position,
    initial_fuel: u32,
    seed: u64,
) -> SimulationReport {
    let initial = plan(
        world,
        &PlanRequest::new(start, goal, Mode::Static, Strategy::Heuristic),
    );
    if !initial.found {
        debug!("initial plan found no path");
        return SimulationReport {
            outcome: SimulationOutcome::NoInitialPath,
            events: Vec::new(),
        };
    }

    let mut agent = AgentState {
        position: start,
        fuel: initial_fuel,
        time: 0,
    };
    let mut path = initial.path;
    let mut index = 0;
    let mut events = Vec::new();

    if agent.position == goal {
        events.push(snapshot(&agent, Phase::Arrived));
        return SimulationReport {
            outcome: SimulationOutcome::Arrived,
            events,
        };
    }
    events.push(snapshot(&agent, Phase::Traveling));

    loop {
        let Some(&next) = path.get(index + 1) else {
            // committed paths end at the goal, so this is unreachable in
            // practice; treat a truncated path as being stuck
            events.push(snapshot(&agent, Phase::Stuck));
            return SimulationReport {
                outcome: SimulationOutcome::Stuck,
                events,
            };
        };

        if world.is_blocked_or_occupied(next, agent.time + 1) {
            debug!(position = ?next, time = agent.time + 1, "conflict ahead, replanning");
            events.push(snapshot(&agent, Phase::Replanning));
            let replan = plan(
                world,
                &PlanRequest::new(agent.position, goal, Mode::TimeAware, Strategy::GreedyLocal)
                    .departing_at(agent.time)
                    .with_seed(seed),
            );
            if !replan.found {
                debug!("replan failed, agent is stuck");
                events.push(snapshot(&agent, Phase::Stuck));
                return SimulationReport {
                    outcome: SimulationOutcome::Stuck,
                    events,
                };
            }
            path = replan.path;
            index = 0;
            continue;
        }

        let move_cost = world.cost_of(next);
        if agent.fuel < move_cost {
            debug!(needed = move_cost, have = agent.fuel, "insufficient fuel");
            events.push(snapshot(&agent, Phase::Stuck));
            return SimulationReport {
                outcome: SimulationOutcome::Stuck,
                events,
            };
        }

        agent.fuel -= move_cost;
        agent.time += 1;
        agent.position = next;
        index += 1;

        if agent.position == goal {
            events.push(snapshot(&agent, Phase::Arrived));
            return SimulationReport {
                outcome: SimulationOutcome::Arrived,
                events,
            };
        }
        events.push(snapshot(&agent, Phase::Traveling));
    }
}

fn snapshot(agent: &AgentState, phase: Phase) -> StepEvent {
    StepEvent {
        time: agent.time,
        position: agent.position,
        fuel_remaining: agent.fuel,
        phase,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::ScheduledObstacle;

    #[test]
    fn arrives_on_an_open_grid() {
        let world = World::new(3, 3);
        let report =
            run_replanning_simulation(&world, Position::new(0, 0), Position::new(2, 2), 20, 1);
        assert_eq!(report.outcome, SimulationOutcome::Arrived);
        let last = report.events.last().unwrap();
        assert_eq!(last.phase, Phase::Arrived);
        assert_eq!(last.position, Position::new(2, 2));
        assert_eq!(last.time, 4);
        assert_eq!(last.fuel_remaining, 20 - 4);
    }

    #[test]
    fn events_are_monotone_in_time_with_non_increasing_fuel() {
        let world = World::new(4, 4);
        let report =
            run_replanning_simulation(&world, Position::new(0, 0), Position::new(3, 3), 30, 1);
        for pair in report.events.windows(2) {
            assert!(pair[1].time >= pair[0].time);
            assert!(pair[1].fuel_remaining <= pair[0].fuel_remaining);
        }
    }

    #[test]
    fn stuck_at_time_zero_when_first_move_is_unaffordable() {
        // Every first move out of the corner costs 2, but only 1 fuel.
        let mut world = World::new(5, 5);
        world.set_cost(Position::new(0, 1), 2).unwrap();
        world.set_cost(Position::new(1, 0), 2).unwrap();
        let report =
            run_replanning_simulation(&world, Position::new(0, 0), Position::new(4, 4), 1, 1);
        assert_eq!(report.outcome, SimulationOutcome::Stuck);
        let last = report.events.last().unwrap();
        assert_eq!(last.phase, Phase::Stuck);
        assert_eq!(last.time, 0);
        assert_eq!(last.position, Position::new(0, 0));
        assert_eq!(last.fuel_remaining, 1);
    }

    #[test]
    fn replans_around_a_scheduled_conflict() {
        // The committed route runs along row 0; the obstacle squats on
        // (0, 2) exactly when the agent would arrive, forcing a greedy
        // detour through the open rows below. Blocking (0, 0) leaves the
        // detour five moves long whichever way the greedy ties fall.
        let mut world = World::new(3, 5);
        world.set_blocked(Position::new(0, 0)).unwrap();
        world
            .add_obstacle(ScheduledObstacle::new(vec![Position::new(0, 2)], vec![1]).unwrap())
            .unwrap();
        let report =
            run_replanning_simulation(&world, Position::new(0, 1), Position::new(0, 4), 20, 3);
        assert_eq!(report.outcome, SimulationOutcome::Arrived);
        assert!(
            report
                .events
                .iter()
                .any(|event| event.phase == Phase::Replanning),
            "no replanning event recorded"
        );
        let last = report.events.last().unwrap();
        assert_eq!(last.position, Position::new(0, 4));
        assert_eq!(last.time, 5);
        assert_eq!(last.fuel_remaining, 20 - 5);
    }

    #[test]
    fn failed_replan_ends_stuck() {
        // A one-row corridor leaves the greedy replanner nowhere to go
        // once the cell ahead is claimed.
        let mut world = World::new(1, 5);
        world
            .add_obstacle(ScheduledObstacle::new(vec![Position::new(0, 2)], vec![2]).unwrap())
            .unwrap();
        let report =
            run_replanning_simulation(&world, Position::new(0, 0), Position::new(0, 4), 20, 3);
        assert_eq!(report.outcome, SimulationOutcome::Stuck);
        let last = report.events.last().unwrap();
        assert_eq!(last.phase, Phase::Stuck);
        assert_eq!(last.position, Position::new(0, 1));
        assert_eq!(last.time, 1);
    }

    #[test]
    fn unreachable_goal_reports_no_initial_path() {
        let mut world = World::new(3, 3);
        for row in 0..3 {
            for col in 0..3 {
                let position = Position::new(row, col);
                if position != Position::new(0, 0) && position != Position::new(2, 2) {
                    world.set_blocked(position).unwrap();
                }
            }
        }
        let report =
            run_replanning_simulation(&world, Position::new(0, 0), Position::new(2, 2), 10, 1);
        assert_eq!(report.outcome, SimulationOutcome::NoInitialPath);
        assert!(report.events.is_empty());
    }

    #[test]
    fn start_at_goal_arrives_immediately() {
        let world = World::new(2, 2);
        let report =
            run_replanning_simulation(&world, Position::new(1, 1), Position::new(1, 1), 5, 1);
        assert_eq!(report.outcome, SimulationOutcome::Arrived);
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].phase, Phase::Arrived);
        assert_eq!(report.events[0].time, 0);
        assert_eq!(report.events[0].fuel_remaining, 5);
    }
}
