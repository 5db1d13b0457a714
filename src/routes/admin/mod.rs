mod handler;

pub use handler::{
    create_bot_response,
    delete_bot_response,
    list_bot_responses,
    list_contact_submissions,
    list_files,
    list_newsletter_subscribers,
    list_submissions,
    list_tickets,
    set_submission_status,
    update_bot_response,
};
