//! Arena entities.
//!
//! Players are the moving blobs; food items are stationary and only ever
//! eaten or expire.

mod food;
mod player;

pub use food::{Food, FoodGrade, FoodKind};
pub use player::{AiMode, Player, color_from_name, radius_for_score};
