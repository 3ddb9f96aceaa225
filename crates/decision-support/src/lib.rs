pub mod engine;
pub mod models;

pub use engine::DecisionSupportEngine;
pub use models::*;
