mod handler;
pub mod model;

pub use handler::{checkout, payment_notify};
