mod auth;
mod request_id;

pub use auth::{auth_middleware, AuthConfig};
pub use request_id::{
    default_request_id_headers, request_id_middleware, RequestId, RequestIdConfig,
};
