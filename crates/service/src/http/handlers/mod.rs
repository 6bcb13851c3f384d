mod not_found;
mod repository;

pub use not_found::not_found_handler;
pub use repository::{into_http_response, repository_handler};
