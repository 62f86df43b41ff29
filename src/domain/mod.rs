pub mod caller;
pub mod entry;
pub mod session;

pub use caller::{CallerContext, Method, GET_FORM_PARAM, RESERVED_PARAM_PREFIX};
pub use entry::{expiry_after, CacheEntry};
pub use session::AuthSession;
