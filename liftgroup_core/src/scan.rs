//! SCAN target selection.
//!
//! Pure functions over a lift's outstanding requests: where to go next and
//! which way to face once there. The lift actor gathers the requests from
//! the passenger registry and feeds them in.

use liftgroup_env::FloorId;
use std::collections::BTreeSet;

use crate::motion::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequestKind {
    /// An onboard passenger's destination
    DropOff,
    /// A waiting passenger's source floor
    Pickup,
}

/// One floor a lift has a reason to visit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Request {
    pub floor: FloorId,
    pub height: f64,
    /// Travel direction of the passenger behind the request
    pub direction: Direction,
    pub kind: RequestKind,
}

impl Request {
    fn key(&self) -> (FloorId, Direction, RequestKind) {
        (self.floor, self.direction, self.kind)
    }
}

/// Requests deduplicated by floor, direction and kind.
#[derive(Debug, Clone, Default)]
pub struct RequestSet {
    requests: Vec<Request>,
}

impl RequestSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, request: Request) {
        if !self.requests.iter().any(|r| r.key() == request.key()) {
            self.requests.push(request);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        self.requests.iter()
    }

    /// Distinct (floor, direction) pairs, ignoring the request kind.
    fn distinct_stops(&self) -> BTreeSet<(FloorId, Direction)> {
        self.requests.iter().map(|r| (r.floor, r.direction)).collect()
    }
}

impl FromIterator<Request> for RequestSet {
    fn from_iter<I: IntoIterator<Item = Request>>(iter: I) -> Self {
        let mut set = RequestSet::new();
        for request in iter {
            set.insert(request);
        }
        set
    }
}

/// Position of the car making the decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub floor: FloorId,
    pub height: f64,
    pub direction: Direction,
}

fn is_ahead(floor: FloorId, of: FloorId, direction: Direction) -> bool {
    match direction {
        Direction::Up => floor > of,
        Direction::Down => floor < of,
        Direction::Stationary => false,
    }
}

fn nearest<'a>(height: f64, candidates: impl Iterator<Item = &'a Request>) -> Option<&'a Request> {
    candidates.min_by(|a, b| {
        (a.height - height)
            .abs()
            .total_cmp(&(b.height - height).abs())
            .then(a.floor.cmp(&b.floor))
    })
}

/// Picks the next floor to visit.
///
/// 1. nearest request strictly ahead (drop-offs, or pickups going our way)
/// 2. otherwise the opposite-direction request furthest along our direction
/// 3. otherwise the nearest request anywhere
pub fn choose_target(position: &Position, requests: &RequestSet) -> Option<FloorId> {
    if requests.is_empty() {
        return None;
    }
    let direction = position.direction;

    let ahead = nearest(
        position.height,
        requests.iter().filter(|r| {
            is_ahead(r.floor, position.floor, direction)
                && (r.kind == RequestKind::DropOff || r.direction == direction)
        }),
    );
    if let Some(request) = ahead {
        return Some(request.floor);
    }

    if direction != Direction::Stationary {
        let opposite = direction.reverse();
        let furthest = requests
            .iter()
            .filter(|r| r.direction == opposite)
            .max_by(|a, b| {
                (a.height * direction.sign())
                    .total_cmp(&(b.height * direction.sign()))
                    .then(b.floor.cmp(&a.floor))
            });
        if let Some(request) = furthest {
            return Some(request.floor);
        }
    }

    nearest(position.height, requests.iter()).map(|r| r.floor)
}

/// Decides which way the car faces after reaching `target`.
///
/// A single outstanding request dictates the direction outright. Otherwise
/// the car keeps its travel direction while anything remains beyond the
/// target and turns around when everything left lies behind it.
pub fn decide_next_direction(position: &Position, target: FloorId, requests: &RequestSet) -> Direction {
    let stops = requests.distinct_stops();
    if stops.len() == 1 {
        if let Some((_, direction)) = stops.into_iter().next() {
            return direction;
        }
    }

    let travel = if target > position.floor {
        Direction::Up
    } else if target < position.floor {
        Direction::Down
    } else {
        position.direction
    };

    let pickups_here: Vec<Direction> = requests
        .iter()
        .filter(|r| r.floor == target && r.kind == RequestKind::Pickup)
        .map(|r| r.direction)
        .collect();
    let others: Vec<&Request> = requests.iter().filter(|r| r.floor != target).collect();

    if travel == Direction::Stationary {
        // Parked car serving its own floor: face the nearest other work if a
        // pickup here agrees with it
        let toward_others = nearest(position.height, others.iter().copied()).map(|r| {
            if r.floor > target {
                Direction::Up
            } else {
                Direction::Down
            }
        });
        return match toward_others {
            Some(d) if pickups_here.is_empty() || pickups_here.contains(&d) => d,
            _ => pickups_here.first().copied().unwrap_or(Direction::Stationary),
        };
    }

    if others.iter().any(|r| is_ahead(r.floor, target, travel)) {
        return travel;
    }
    if others.iter().any(|r| is_ahead(r.floor, target, travel.reverse())) {
        return travel.reverse();
    }

    // Only work at the target itself
    if pickups_here.is_empty() || pickups_here.contains(&travel) {
        travel
    } else {
        pickups_here[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(floor: usize, direction: Direction, kind: RequestKind) -> Request {
        Request {
            floor: FloorId(floor),
            height: floor as f64 * 3.0,
            direction,
            kind,
        }
    }

    fn pos(floor: usize, direction: Direction) -> Position {
        Position {
            floor: FloorId(floor),
            height: floor as f64 * 3.0,
            direction,
        }
    }

    use Direction::{Down, Stationary, Up};
    use RequestKind::{DropOff, Pickup};

    #[test]
    fn test_no_requests_no_target() {
        assert_eq!(choose_target(&pos(3, Up), &RequestSet::new()), None);
    }

    #[test]
    fn test_prefers_nearest_ahead() {
        let requests: RequestSet = [
            req(8, Up, DropOff),
            req(5, Up, Pickup),
            req(4, Down, Pickup),
            req(1, Up, Pickup),
        ]
        .into_iter()
        .collect();
        assert_eq!(choose_target(&pos(3, Up), &requests), Some(FloorId(5)));
    }

    #[test]
    fn test_reverses_to_furthest_opposite_request() {
        // Going up, nothing ahead that goes up: take the highest down call
        let requests: RequestSet = [req(2, Down, Pickup), req(7, Down, Pickup)]
            .into_iter()
            .collect();
        assert_eq!(choose_target(&pos(4, Up), &requests), Some(FloorId(7)));

        // Going down: lowest up call
        let requests: RequestSet = [req(6, Up, Pickup), req(1, Up, Pickup)]
            .into_iter()
            .collect();
        assert_eq!(choose_target(&pos(4, Down), &requests), Some(FloorId(1)));
    }

    #[test]
    fn test_falls_back_to_nearest_overall() {
        let requests: RequestSet = [req(1, Up, Pickup), req(6, Up, Pickup)]
            .into_iter()
            .collect();
        // Going up from 7: up calls are behind, no down calls
        assert_eq!(choose_target(&pos(7, Up), &requests), Some(FloorId(6)));
        // Parked car goes to its own floor first
        let requests: RequestSet = [req(2, Up, Pickup), req(4, Down, Pickup)]
            .into_iter()
            .collect();
        assert_eq!(choose_target(&pos(2, Stationary), &requests), Some(FloorId(2)));
    }

    #[test]
    fn test_single_request_overrides_direction() {
        let requests: RequestSet = [req(3, Up, Pickup)].into_iter().collect();
        // Coming down from the top to a lone up call
        assert_eq!(decide_next_direction(&pos(4, Down), FloorId(3), &requests), Up);

        // Several passengers behind one call still count once
        let requests: RequestSet = [req(2, Down, Pickup), req(2, Down, DropOff)]
            .into_iter()
            .collect();
        assert_eq!(decide_next_direction(&pos(5, Down), FloorId(2), &requests), Down);
    }

    #[test]
    fn test_keeps_direction_while_work_remains_ahead() {
        let requests: RequestSet = [req(5, Up, DropOff), req(9, Up, DropOff)]
            .into_iter()
            .collect();
        assert_eq!(decide_next_direction(&pos(2, Up), FloorId(5), &requests), Up);
    }

    #[test]
    fn test_flips_when_everything_is_behind() {
        let requests: RequestSet = [req(8, Down, Pickup), req(3, Down, Pickup)]
            .into_iter()
            .collect();
        assert_eq!(decide_next_direction(&pos(2, Up), FloorId(8), &requests), Down);
    }

    #[test]
    fn test_pickup_at_target_sets_direction() {
        let requests: RequestSet = [req(5, Up, DropOff), req(5, Down, Pickup)]
            .into_iter()
            .collect();
        assert_eq!(decide_next_direction(&pos(2, Up), FloorId(5), &requests), Down);
    }

    #[test]
    fn test_parked_car_faces_remaining_work() {
        let requests: RequestSet = [req(2, Up, Pickup), req(2, Down, Pickup), req(6, Up, Pickup)]
            .into_iter()
            .collect();
        assert_eq!(decide_next_direction(&pos(2, Stationary), FloorId(2), &requests), Up);
    }
}
