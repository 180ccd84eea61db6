pub mod context;
pub mod error;
pub mod service;

pub use context::AppContext;
pub use error::{EstuaryError, Result};
pub use service::Service;
