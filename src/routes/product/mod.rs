mod handler;
pub mod model;

pub use handler::{get_product, list_products};
