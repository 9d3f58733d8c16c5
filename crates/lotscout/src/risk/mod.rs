pub mod ai_score;
pub mod engine;
pub mod reconcile;

pub use ai_score::score_ai;
pub use engine::{derive_landlocked, overall_risk};
pub use reconcile::reconcile;
