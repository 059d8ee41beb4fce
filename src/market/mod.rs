pub mod kline_cache;
pub mod kline_manager;
pub mod schedule;

pub use kline_cache::KlineCache;
pub use kline_manager::{KlineManager, RefreshReport, UpdateTick};
