pub mod auth;
pub mod response;
pub mod session;

pub use auth::{require_page_user, require_user};
pub use response::{ApiResponse, ApiResult, Envelope};
pub use session::{refreshes_session, update_session};
