pub mod admin;
pub mod bot;
pub mod contact;
pub mod form;
pub mod payment;
pub mod product;
pub mod ticket;
pub mod upload;
pub mod user;
