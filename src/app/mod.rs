pub mod context;
pub mod error;

pub use context::ProxyContext;
pub use error::{ProxyError, Result};
