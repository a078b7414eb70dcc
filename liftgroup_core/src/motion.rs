//! The "MOTION" Engine - acceleration-limited lift kinematics
//!
//! A car accelerates at `a` up to `max_v`, cruises, and decelerates at the
//! same `a`. Every trip is planned as a short list of phase segments
//! (accelerating, cruising, decelerating) so the car's state can be read at
//! any instant and a new trip can be planned from any in-flight state.
//! Redirects rely on that: the state sampled at the redirect becomes the
//! origin of the next plan.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Height/velocity comparisons closer than this are treated as equal.
pub const EPSILON: f64 = 1e-9;

/// Default acceleration magnitude (m/s²)
pub const DEFAULT_ACCELERATION: f64 = 1.0;

/// Default cruise velocity (m/s)
pub const DEFAULT_MAX_VELOCITY: f64 = 4.0;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MotionError {
    #[error("Invalid movement parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}

// ============================================================================
// DIRECTION AND STATE
// ============================================================================

/// Travel direction of a car or of a passenger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Stationary,
}

impl Direction {
    /// Opposite travel direction. Stationary stays Stationary.
    pub fn reverse(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Stationary => Direction::Stationary,
        }
    }

    /// Direction of travel from one height to another.
    pub fn between(from: f64, to: f64) -> Self {
        if to > from + EPSILON {
            Direction::Up
        } else if to < from - EPSILON {
            Direction::Down
        } else {
            Direction::Stationary
        }
    }

    /// +1 for Up, -1 for Down, 0 when stationary.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => -1.0,
            Direction::Stationary => 0.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Direction::Up => "U",
            Direction::Down => "D",
            Direction::Stationary => "S",
        };
        write!(f, "{}", code)
    }
}

/// Instantaneous state of a car: where it is, which way it moves, how fast.
///
/// `velocity` is a non-negative speed; the sign lives in `direction`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KinematicState {
    pub height: f64,
    pub direction: Direction,
    pub velocity: f64,
}

impl KinematicState {
    pub fn new(height: f64, direction: Direction, velocity: f64) -> Self {
        Self {
            height,
            direction,
            velocity: velocity.max(0.0),
        }
    }

    /// A car standing still at `height`.
    pub fn at_rest(height: f64) -> Self {
        Self::new(height, Direction::Stationary, 0.0)
    }

    pub fn is_at_rest(&self) -> bool {
        self.velocity <= EPSILON || self.direction == Direction::Stationary
    }
}

// ============================================================================
// PHASES
// ============================================================================

/// Motion phase of a trip segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Accelerating,
    Cruising,
    Decelerating,
    Stopped,
}

impl Phase {
    /// Advances `state` by `dt` seconds while in this phase.
    pub fn advance(self, state: KinematicState, dt: f64, acceleration: f64) -> KinematicState {
        let dt = dt.max(0.0);
        let sign = state.direction.sign();
        let v0 = state.velocity;

        match self {
            Phase::Accelerating => KinematicState {
                height: state.height + sign * (v0 * dt + 0.5 * acceleration * dt * dt),
                direction: state.direction,
                velocity: v0 + acceleration * dt,
            },
            Phase::Cruising => KinematicState {
                height: state.height + sign * v0 * dt,
                ..state
            },
            Phase::Decelerating => {
                // Never decelerate past zero
                let dt = dt.min(v0 / acceleration);
                KinematicState {
                    height: state.height + sign * (v0 * dt - 0.5 * acceleration * dt * dt),
                    direction: state.direction,
                    velocity: (v0 - acceleration * dt).max(0.0),
                }
            }
            Phase::Stopped => KinematicState {
                velocity: 0.0,
                ..state
            },
        }
    }
}

/// One phase of a planned trip, starting from `start` and lasting `duration` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub phase: Phase,
    pub start: KinematicState,
    pub duration: f64,
}

// ============================================================================
// TRAJECTORY
// ============================================================================

/// A planned trip from an arbitrary kinematic state to a target height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    origin: KinematicState,
    target_height: f64,
    acceleration: f64,
    segments: Vec<Segment>,
}

impl Trajectory {
    fn empty(origin: KinematicState, target_height: f64, acceleration: f64) -> Self {
        Self {
            origin,
            target_height,
            acceleration,
            segments: Vec::new(),
        }
    }

    /// State at the end of the segments pushed so far.
    fn current(&self) -> KinematicState {
        match self.segments.last() {
            Some(last) => last.phase.advance(last.start, last.duration, self.acceleration),
            None => self.origin,
        }
    }

    fn push(&mut self, phase: Phase, duration: f64) {
        if duration <= EPSILON {
            return;
        }
        let start = self.current();
        self.segments.push(Segment {
            phase,
            start,
            duration,
        });
    }

    /// Starts a fresh leg from rest towards `direction`.
    fn turn(&mut self, direction: Direction) {
        let current = self.current();
        let start = KinematicState::new(current.height, direction, 0.0);
        self.segments.push(Segment {
            phase: Phase::Stopped,
            start,
            duration: 0.0,
        });
    }

    pub fn origin(&self) -> KinematicState {
        self.origin
    }

    pub fn target_height(&self) -> f64 {
        self.target_height
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Total trip time in seconds.
    pub fn duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }

    /// Direction the car is heading when it reaches the target.
    pub fn final_direction(&self) -> Direction {
        self.segments
            .iter()
            .rev()
            .map(|s| s.start.direction)
            .find(|d| *d != Direction::Stationary)
            .unwrap_or(self.origin.direction)
    }

    /// State `elapsed` seconds after the trip started.
    ///
    /// Clamps to the target (at rest) once the trip is over.
    pub fn state_at(&self, elapsed: f64) -> KinematicState {
        let mut remaining = elapsed.max(0.0);
        for segment in &self.segments {
            if remaining < segment.duration {
                return segment.phase.advance(segment.start, remaining, self.acceleration);
            }
            remaining -= segment.duration;
        }
        KinematicState::new(self.target_height, self.final_direction(), 0.0)
    }
}

// ============================================================================
// MOVEMENT MODEL
// ============================================================================

/// Symmetric acceleration / cruise / deceleration model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementModel {
    /// Acceleration and deceleration magnitude (m/s²)
    pub acceleration: f64,
    /// Cruise velocity (m/s)
    pub max_velocity: f64,
}

impl Default for MovementModel {
    fn default() -> Self {
        Self {
            acceleration: DEFAULT_ACCELERATION,
            max_velocity: DEFAULT_MAX_VELOCITY,
        }
    }
}

impl MovementModel {
    pub fn new(acceleration: f64, max_velocity: f64) -> Result<Self, MotionError> {
        if !(acceleration.is_finite() && acceleration > 0.0) {
            return Err(MotionError::InvalidParameter {
                name: "acceleration",
                value: acceleration,
            });
        }
        if !(max_velocity.is_finite() && max_velocity > 0.0) {
            return Err(MotionError::InvalidParameter {
                name: "max_velocity",
                value: max_velocity,
            });
        }
        Ok(Self {
            acceleration,
            max_velocity,
        })
    }

    /// Distance needed to reach cruise speed from rest and stop again.
    pub fn cruise_threshold(&self) -> f64 {
        self.max_velocity * self.max_velocity / self.acceleration
    }

    /// Rest-to-rest travel time over `distance` (sign ignored).
    pub fn travel_time(&self, distance: f64) -> f64 {
        let d = distance.abs();
        if d < self.cruise_threshold() {
            // Triangular profile: never reaches cruise speed
            2.0 * (d / self.acceleration).sqrt()
        } else {
            2.0 * self.max_velocity / self.acceleration
                + (d - self.cruise_threshold()) / self.max_velocity
        }
    }

    /// State after `elapsed` seconds of a direct trip between two heights.
    pub fn state_at(&self, elapsed: f64, source_height: f64, target_height: f64) -> KinematicState {
        self.plan(KinematicState::at_rest(source_height), target_height)
            .state_at(elapsed)
    }

    pub fn stopping_distance(&self, velocity: f64) -> f64 {
        velocity * velocity / (2.0 * self.acceleration)
    }

    /// Height where the car comes to rest if it starts braking now.
    pub fn stopping_height(&self, state: &KinematicState) -> f64 {
        state.height + state.direction.sign() * self.stopping_distance(state.velocity)
    }

    /// Whether braking from `state` ends at or before `candidate_height`.
    pub fn can_stop_at(&self, state: &KinematicState, candidate_height: f64) -> bool {
        if state.is_at_rest() {
            return true;
        }
        let stop = self.stopping_height(state);
        match state.direction {
            Direction::Up => stop <= candidate_height + EPSILON,
            Direction::Down => stop >= candidate_height - EPSILON,
            Direction::Stationary => true,
        }
    }

    /// Remaining time from `state` to rest at `candidate_height`.
    pub fn time_to(&self, state: &KinematicState, candidate_height: f64) -> f64 {
        self.plan(*state, candidate_height).duration()
    }

    /// Plans a trip from any state to rest at `target_height`.
    ///
    /// A car that can still stop in time runs accelerate/cruise/decelerate
    /// straight to the target. One that would overshoot brakes to a full
    /// stop first and then makes a fresh rest-to-rest trip back.
    pub fn plan(&self, from: KinematicState, target_height: f64) -> Trajectory {
        let mut trajectory = Trajectory::empty(from, target_height, self.acceleration);

        if from.is_at_rest() {
            self.push_rest_trip(&mut trajectory, from.height, target_height);
        } else if self.can_stop_at(&from, target_height) {
            self.push_forward(&mut trajectory, from.velocity, (target_height - from.height).abs());
        } else {
            trajectory.push(Phase::Decelerating, from.velocity / self.acceleration);
            let stop = trajectory.current().height;
            self.push_rest_trip(&mut trajectory, stop, target_height);
        }
        trajectory
    }

    fn push_rest_trip(&self, trajectory: &mut Trajectory, from: f64, to: f64) {
        let direction = Direction::between(from, to);
        if direction == Direction::Stationary {
            return;
        }
        trajectory.turn(direction);
        self.push_forward(trajectory, 0.0, (to - from).abs());
    }

    /// Accelerate from `v0`, cruise if there is room, and stop after `distance`.
    fn push_forward(&self, trajectory: &mut Trajectory, v0: f64, distance: f64) {
        let a = self.acceleration;
        let vm = self.max_velocity;
        let accel_distance = (vm * vm - v0 * v0) / (2.0 * a);
        let decel_distance = vm * vm / (2.0 * a);

        if accel_distance + decel_distance <= distance {
            trajectory.push(Phase::Accelerating, (vm - v0) / a);
            trajectory.push(Phase::Cruising, (distance - accel_distance - decel_distance) / vm);
            trajectory.push(Phase::Decelerating, vm / a);
        } else {
            let peak = (a * distance + v0 * v0 / 2.0).sqrt().max(v0);
            trajectory.push(Phase::Accelerating, (peak - v0) / a);
            trajectory.push(Phase::Decelerating, peak / a);
        }
    }
}

/// Converts model seconds into a `Duration`, treating bad values as zero.
pub fn to_duration(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn model() -> MovementModel {
        MovementModel::new(1.0, 2.0).unwrap()
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(MovementModel::new(0.0, 2.0).is_err());
        assert!(MovementModel::new(1.0, f64::NAN).is_err());
        assert!(MovementModel::new(-1.0, 2.0).is_err());
    }

    #[test]
    fn test_travel_time_profiles() {
        let m = model();
        // threshold = 4m; triangular below it
        assert_relative_eq!(m.travel_time(1.0), 2.0, epsilon = 1e-12);
        assert_relative_eq!(m.travel_time(4.0), 4.0, epsilon = 1e-12);
        // trapezoidal: 4s accel+decel + 6m at 2 m/s
        assert_relative_eq!(m.travel_time(10.0), 7.0, epsilon = 1e-12);
        assert_relative_eq!(m.travel_time(0.0), 0.0);
    }

    #[test]
    fn test_rest_plan_matches_travel_time() {
        let m = model();
        for d in [0.5, 3.9, 4.0, 12.0, 45.0] {
            let plan = m.plan(KinematicState::at_rest(0.0), d);
            assert_relative_eq!(plan.duration(), m.travel_time(d), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_state_at_phases_and_clamp() {
        let m = model();
        // 0 -> 10m: accelerate 2s, cruise 3s, decelerate 2s
        let s = m.state_at(1.0, 0.0, 10.0);
        assert_relative_eq!(s.height, 0.5, epsilon = 1e-12);
        assert_relative_eq!(s.velocity, 1.0, epsilon = 1e-12);
        assert_eq!(s.direction, Direction::Up);

        let s = m.state_at(3.0, 0.0, 10.0);
        assert_relative_eq!(s.height, 4.0, epsilon = 1e-12);
        assert_relative_eq!(s.velocity, 2.0, epsilon = 1e-12);

        let s = m.state_at(6.0, 0.0, 10.0);
        assert_relative_eq!(s.height, 9.5, epsilon = 1e-12);
        assert_relative_eq!(s.velocity, 1.0, epsilon = 1e-12);

        let s = m.state_at(100.0, 0.0, 10.0);
        assert_relative_eq!(s.height, 10.0);
        assert_eq!(s.velocity, 0.0);
    }

    #[test]
    fn test_state_at_going_down() {
        let m = model();
        let s = m.state_at(1.0, 10.0, 0.0);
        assert_eq!(s.direction, Direction::Down);
        assert_relative_eq!(s.height, 9.5, epsilon = 1e-12);
    }

    #[test]
    fn test_can_stop_at() {
        let m = model();
        let up = KinematicState::new(2.0, Direction::Up, 2.0); // stops at 4.0
        assert!(m.can_stop_at(&up, 5.0));
        assert!(m.can_stop_at(&up, 4.0));
        assert!(!m.can_stop_at(&up, 3.0));

        let down = KinematicState::new(8.0, Direction::Down, 2.0); // stops at 6.0
        assert!(m.can_stop_at(&down, 3.0));
        assert!(!m.can_stop_at(&down, 7.0));

        assert!(m.can_stop_at(&KinematicState::at_rest(5.0), 0.0));
    }

    #[test]
    fn test_time_to_when_stoppable() {
        let m = model();
        // v=1 at 0.5m, target 6m: accelerate 1s, cruise 1s, decelerate 2s
        let state = KinematicState::new(0.5, Direction::Up, 1.0);
        assert_relative_eq!(m.time_to(&state, 6.0), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_time_to_overshoot_reverses() {
        let m = model();
        // v=2 at 3.0 stops at 5.0 after 2s, then 2m back from rest
        let state = KinematicState::new(3.0, Direction::Up, 2.0);
        let expected = 2.0 + m.travel_time(2.0);
        assert_relative_eq!(m.time_to(&state, 3.0), expected, epsilon = 1e-9);

        let plan = m.plan(state, 3.0);
        assert_eq!(plan.final_direction(), Direction::Down);
        let mid = plan.state_at(2.0);
        assert_relative_eq!(mid.height, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_chained_redirects_are_continuous() {
        let m = model();
        let first = m.plan(KinematicState::at_rest(0.0), 30.0);
        let snapshot = first.state_at(1.5);
        let second = m.plan(snapshot, 20.0);
        let snapshot2 = second.state_at(2.0);
        let third = m.plan(snapshot2, 12.0);

        // Sampling the new plan at t=0 returns the snapshot it started from
        let start = third.state_at(0.0);
        assert_relative_eq!(start.height, snapshot2.height, epsilon = 1e-9);
        assert_relative_eq!(start.velocity, snapshot2.velocity, epsilon = 1e-9);
        assert_relative_eq!(third.state_at(third.duration()).height, 12.0, epsilon = 1e-9);
    }

    #[test]
    fn test_to_duration_clamps() {
        assert_eq!(to_duration(-1.0), Duration::ZERO);
        assert_eq!(to_duration(f64::NAN), Duration::ZERO);
        assert_eq!(to_duration(1.5), Duration::from_millis(1500));
    }

    proptest! {
        #[test]
        fn prop_travel_time_symmetric_and_monotonic(d in 0.0f64..200.0, extra in 0.0f64..50.0) {
            let m = model();
            prop_assert_eq!(m.travel_time(d), m.travel_time(-d));
            prop_assert!(m.travel_time(d + extra) + 1e-12 >= m.travel_time(d));
        }

        #[test]
        fn prop_time_to_never_worse_than_stop_and_restart(
            height in 0.0f64..50.0,
            velocity in 0.0f64..2.0,
            offset in 0.0f64..60.0,
        ) {
            let m = model();
            let state = KinematicState::new(height, Direction::Up, velocity);
            let candidate = height + offset;
            if m.can_stop_at(&state, candidate) {
                let direct = m.time_to(&state, candidate);
                let stop = m.stopping_height(&state);
                let fallback = velocity / m.acceleration + m.travel_time(candidate - stop);
                prop_assert!(direct.is_finite());
                prop_assert!(direct <= fallback + 1e-9);
            }
        }

        #[test]
        fn prop_plan_ends_at_target(
            height in 0.0f64..50.0,
            velocity in 0.0f64..2.0,
            target in 0.0f64..50.0,
            up in any::<bool>(),
        ) {
            let m = model();
            let direction = if up { Direction::Up } else { Direction::Down };
            let plan = m.plan(KinematicState::new(height, direction, velocity), target);
            let end = plan.state_at(plan.duration() - 1e-9);
            prop_assert!((end.height - target).abs() < 1e-3);
        }
    }
}
