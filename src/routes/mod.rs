pub mod health;
mod index;

pub use health::{health_check, metrics};
pub use index::index;
