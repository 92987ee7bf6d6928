use crate::constants::{
    get_antagonist_profile, BODY_RADIUS, DOOR_ARRIVE_DISTANCE, DOOR_PASS_OFFSET, ROOM_HEIGHT,
    ROOM_WIDTH, STUN_DURATION_MS, TARGET_AURA_WEIGHT, WAYPOINT_EPSILON,
};
use crate::rng::RandomSource;
use crate::types::{AgentMode, AntagonistKind, AntagonistView, DoorState, DoorView, Orientation};
use crate::world::{distance, room_cell, NavigationIndex};

#[derive(Clone, Debug, PartialEq)]
pub enum AgentState {
    Patrol { waypoint: (f32, f32) },
    Hunt { target_id: String },
    Stunned { until_ms: u64 },
}

#[derive(Clone, Debug)]
pub struct Antagonist {
    pub id: String,
    pub kind: AntagonistKind,
    pub x: f32,
    pub y: f32,
    pub state: AgentState,
    pub speed_multiplier: f32,
}

impl Antagonist {
    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn is_stunned(&self) -> bool {
        matches!(self.state, AgentState::Stunned { .. })
    }

    pub fn is_hunting(&self, player_id: &str) -> bool {
        matches!(&self.state, AgentState::Hunt { target_id } if target_id == player_id)
    }

    pub fn stun(&mut self, now_ms: u64) -> u64 {
        let until_ms = now_ms + STUN_DURATION_MS;
        self.state = AgentState::Stunned { until_ms };
        until_ms
    }

    pub fn view(&self) -> AntagonistView {
        let (state, target_id, stunned_until) = match &self.state {
            AgentState::Patrol { .. } => (AgentMode::Patrol, None, None),
            AgentState::Hunt { target_id } => (AgentMode::Hunt, Some(target_id.clone()), None),
            AgentState::Stunned { until_ms } => (AgentMode::Stunned, None, Some(*until_ms)),
        };
        AntagonistView {
            id: self.id.clone(),
            kind: self.kind,
            x: self.x,
            y: self.y,
            state,
            target_id,
            stunned_until,
        }
    }
}

/// A living cooperator as the agent sees it.
#[derive(Clone, Debug)]
pub struct AgentTarget {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub aura: f32,
}

pub struct AgentWorld<'a> {
    pub nav: &'a NavigationIndex,
    pub doors: &'a [DoorView],
    pub targets: &'a [AgentTarget],
    pub now_ms: u64,
    pub dt_ms: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AgentStep {
    pub state: AgentState,
    pub x: f32,
    pub y: f32,
}

/// Computes the agent's next state and position. Reads nothing but its inputs.
pub fn advance(
    agent: &Antagonist,
    world: &AgentWorld<'_>,
    rng: &mut dyn RandomSource,
) -> AgentStep {
    let (patrol_speed, hunt_speed, detect_radius, lose_radius) =
        get_antagonist_profile(agent.kind);
    let pos = agent.position();
    let hold = |state: AgentState| AgentStep {
        state,
        x: pos.0,
        y: pos.1,
    };

    match &agent.state {
        AgentState::Stunned { until_ms } => {
            if world.now_ms >= *until_ms {
                hold(fresh_patrol(world, rng))
            } else {
                hold(agent.state.clone())
            }
        }
        AgentState::Patrol { waypoint } => {
            if let Some(target) = pick_target(pos, world.targets, detect_radius) {
                return hold(AgentState::Hunt {
                    target_id: target.id.clone(),
                });
            }
            if distance(pos, *waypoint) < WAYPOINT_EPSILON {
                return hold(fresh_patrol(world, rng));
            }
            let budget = patrol_speed * agent.speed_multiplier * world.dt_ms as f32 / 1000.0;
            match steer(pos, *waypoint, budget, world) {
                Some((x, y)) => AgentStep {
                    state: agent.state.clone(),
                    x,
                    y,
                },
                None => hold(fresh_patrol(world, rng)),
            }
        }
        AgentState::Hunt { target_id } => {
            let Some(target) = world.targets.iter().find(|t| &t.id == target_id) else {
                return hold(fresh_patrol(world, rng));
            };
            let goal = (target.x, target.y);
            if distance(pos, goal) > lose_radius {
                return hold(fresh_patrol(world, rng));
            }
            let budget = hunt_speed * agent.speed_multiplier * world.dt_ms as f32 / 1000.0;
            match steer(pos, goal, budget, world) {
                Some((x, y)) => AgentStep {
                    state: agent.state.clone(),
                    x,
                    y,
                },
                None => hold(agent.state.clone()),
            }
        }
    }
}

/// Lowest `distance + weight * aura` inside the detect radius.
pub fn pick_target<'a>(
    pos: (f32, f32),
    targets: &'a [AgentTarget],
    detect_radius: f32,
) -> Option<&'a AgentTarget> {
    targets
        .iter()
        .filter_map(|target| {
            let d = distance(pos, (target.x, target.y));
            (d <= detect_radius).then_some((target, d + TARGET_AURA_WEIGHT * target.aura))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(target, _)| target)
}

fn fresh_patrol(world: &AgentWorld<'_>, rng: &mut dyn RandomSource) -> AgentState {
    AgentState::Patrol {
        waypoint: world
            .nav
            .random_open_point(BODY_RADIUS, world.doors, rng),
    }
}

fn steer(
    pos: (f32, f32),
    goal: (f32, f32),
    budget: f32,
    world: &AgentWorld<'_>,
) -> Option<(f32, f32)> {
    let waypoint = route_waypoint(pos, goal, world.doors)?;
    let next = step_toward(pos, waypoint, budget);
    world.nav.try_move(pos, next, BODY_RADIUS, world.doors)
}

pub fn step_toward(from: (f32, f32), to: (f32, f32), max_distance: f32) -> (f32, f32) {
    let d = distance(from, to);
    if d <= max_distance || d <= f32::EPSILON {
        return to;
    }
    let scale = max_distance / d;
    (from.0 + (to.0 - from.0) * scale, from.1 + (to.1 - from.1) * scale)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

/// Next intermediate point from `pos` toward `goal` through open doors.
///
/// Returns `goal` itself when both share a room cell and `None` when every
/// boundary that reduces the cell distance is closed.
pub fn route_waypoint(
    pos: (f32, f32),
    goal: (f32, f32),
    doors: &[DoorView],
) -> Option<(f32, f32)> {
    let from_cell = room_cell(pos.0, pos.1);
    let goal_cell = room_cell(goal.0, goal.1);
    if from_cell == goal_cell {
        return Some(goal);
    }

    let dx = goal_cell.0 - from_cell.0;
    let dy = goal_cell.1 - from_cell.1;
    let axes = if dx.abs() >= dy.abs() {
        [Axis::X, Axis::Y]
    } else {
        [Axis::Y, Axis::X]
    };

    for axis in axes {
        let step = match axis {
            Axis::X => dx.signum(),
            Axis::Y => dy.signum(),
        };
        if step == 0 {
            continue;
        }
        if let Some(door) = nearest_boundary_door(pos, from_cell, axis, step, doors) {
            let door_pos = (door.x, door.y);
            if distance(pos, door_pos) < DOOR_ARRIVE_DISTANCE {
                let offset = step as f32 * DOOR_PASS_OFFSET;
                return Some(match axis {
                    Axis::X => (door.x + offset, door.y),
                    Axis::Y => (door.x, door.y + offset),
                });
            }
            return Some(door_pos);
        }
    }
    None
}

fn nearest_boundary_door<'a>(
    pos: (f32, f32),
    cell: (i32, i32),
    axis: Axis,
    step: i32,
    doors: &'a [DoorView],
) -> Option<&'a DoorView> {
    let (orientation, boundary, span_lo, span_hi) = match axis {
        Axis::X => {
            let boundary = (cell.0 + step.max(0)) as f32 * ROOM_WIDTH;
            let lo = cell.1 as f32 * ROOM_HEIGHT;
            (Orientation::Vertical, boundary, lo, lo + ROOM_HEIGHT)
        }
        Axis::Y => {
            let boundary = (cell.1 + step.max(0)) as f32 * ROOM_HEIGHT;
            let lo = cell.0 as f32 * ROOM_WIDTH;
            (Orientation::Horizontal, boundary, lo, lo + ROOM_WIDTH)
        }
    };

    doors
        .iter()
        .filter(|door| door.state == DoorState::Open && door.orientation == orientation)
        .filter(|door| {
            let (along, cross) = match axis {
                Axis::X => (door.x, door.y),
                Axis::Y => (door.y, door.x),
            };
            (along - boundary).abs() < 1.0 && cross >= span_lo && cross < span_hi
        })
        .min_by(|a, b| {
            distance(pos, (a.x, a.y)).total_cmp(&distance(pos, (b.x, b.y)))
        })
}
