mod handler;
pub mod model;

pub use handler::{submit_contact, subscribe_newsletter};
