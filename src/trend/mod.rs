// Trend engine: per-period scoring, composite weighting, per-symbol state machines
pub mod composite;
pub mod engine;
pub mod scorer;
pub mod state_machine;

pub use composite::{calc_scores, Regime};
pub use engine::{TrendEngine, TrendPass};
pub use scorer::score_for_period;
pub use state_machine::TrendStateMachine;
