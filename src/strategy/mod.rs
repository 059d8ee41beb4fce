// Signal strategy: raw 15m detection, then trend gating
pub mod decision;
pub mod signals;

pub use decision::{Decision, DecisionTree};
pub use signals::{SignalConfig, SignalGenerator};
