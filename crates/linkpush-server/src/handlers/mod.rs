//! HTTP handlers for submission and redirect.

pub mod errors;
pub mod redirect;
pub mod submit;

pub use errors::ApiError;
pub use redirect::redirect;
pub use submit::{SubmitRequest, submit_url};
