pub mod layout;
pub mod queue;
pub mod tenant_config;

mod error;

pub use error::Error;
pub use layout::TenantLayout;
pub use queue::RedisQueue;

pub type Result<T, E = Error> = std::result::Result<T, E>;
