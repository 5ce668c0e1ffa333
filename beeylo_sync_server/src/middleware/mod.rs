mod admin_token;
mod hmac;

pub use admin_token::{AdminTokenMiddlewareFactory, AdminTokenMiddlewareService};
pub use hmac::{HmacMiddlewareFactory, HmacMiddlewareService};
