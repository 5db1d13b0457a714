mod handler;
pub mod model;

pub use handler::{add_message, create_ticket, get_ticket, list_my_tickets, set_status};
