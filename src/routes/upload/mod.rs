mod handler;

pub use handler::{sign_download, sign_upload};
