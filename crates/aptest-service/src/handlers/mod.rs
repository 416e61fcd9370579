//! API handlers.

pub mod dashboard;
pub mod health;
pub mod institutes;
pub mod payments;
pub mod products;
pub mod signup;
