//! External-side correlation and session statistics.

pub mod categorize;
pub mod engine;
pub mod service;

pub use categorize::{OTHER_CATEGORY, categorize};
pub use engine::StatisticsEngine;
pub use service::StatisticsService;
