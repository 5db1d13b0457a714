pub mod flow;
mod handler;
pub mod model;

pub use handler::{get_form, list_forms, submit_form, validate_form_step};
