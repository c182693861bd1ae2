pub mod effects;
pub mod health;
