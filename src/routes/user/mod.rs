mod handler;
pub mod model;

pub use handler::{
    forgot_password,
    login,
    me,
    pending_services,
    register,
    reset_password,
    update_password,
    update_profile,
    upload_profile_image,
};
