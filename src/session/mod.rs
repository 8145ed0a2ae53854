pub mod api_client;
pub mod auth;
pub mod types;
pub mod urls;

pub use api_client::ApiClient;
pub use auth::AuthState;
pub use types::{ApiError, ApiTransport};
pub use urls::*;
