//! Deterministic lift scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// One passenger, one lift, straight trip
    SingleTrip,

    /// A moving lift picks up a passenger on its way
    Redirect,

    /// Arrivals spread over two lifts by time-to-reach
    SharedLoad,

    /// A lone request near the top sets the car's direction
    BoundaryTurn,

    /// More passengers than seats at one floor
    Capacity,

    /// Lift parks Stationary after its last drop-off
    StationaryOnArrival,

    /// Opposite-direction call served after the car turns around
    UTurn,

    /// Poisson traffic over the whole building
    Traffic,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SingleTrip,
            ScenarioId::Redirect,
            ScenarioId::SharedLoad,
            ScenarioId::BoundaryTurn,
            ScenarioId::Capacity,
            ScenarioId::StationaryOnArrival,
            ScenarioId::UTurn,
            ScenarioId::Traffic,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SingleTrip => "single_trip",
            ScenarioId::Redirect => "redirect",
            ScenarioId::SharedLoad => "shared_load",
            ScenarioId::BoundaryTurn => "boundary_turn",
            ScenarioId::Capacity => "capacity",
            ScenarioId::StationaryOnArrival => "stationary_on_arrival",
            ScenarioId::UTurn => "u_turn",
            ScenarioId::Traffic => "traffic",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SingleTrip => "Passenger 0->5 with one lift; timeline is ordered",
            ScenarioId::Redirect => "Lift bound for 5 takes a passenger appearing at 3 on the way",
            ScenarioId::SharedLoad => "Three passengers, two lifts: assignment follows time-to-reach",
            ScenarioId::BoundaryTurn => "Lift at the top serves 3->4 and faces Up at 3",
            ScenarioId::Capacity => "Three passengers for a two-seat car; nobody exceeds capacity",
            ScenarioId::StationaryOnArrival => "Parked lift is Stationary and then serves a down call",
            ScenarioId::UTurn => "Down call behind an up-bound car is served after the turn",
            ScenarioId::Traffic => "Seeded Poisson traffic; invariants hold for the whole run",
        }
    }

    /// True for scenarios driven by random arrivals rather than a fixed script.
    pub fn is_stochastic(&self) -> bool {
        matches!(self, ScenarioId::Traffic)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single_trip" | "single" => Ok(ScenarioId::SingleTrip),
            "redirect" | "redirection" => Ok(ScenarioId::Redirect),
            "shared_load" | "multiple_lift" => Ok(ScenarioId::SharedLoad),
            "boundary_turn" | "boundary" => Ok(ScenarioId::BoundaryTurn),
            "capacity" => Ok(ScenarioId::Capacity),
            "stationary_on_arrival" | "stationary" => Ok(ScenarioId::StationaryOnArrival),
            "u_turn" | "uturn" => Ok(ScenarioId::UTurn),
            "traffic" => Ok(ScenarioId::Traffic),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
