pub mod eval;
pub mod health;
