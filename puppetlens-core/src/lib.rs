pub mod errors;

pub type Result<T> = std::result::Result<T, errors::CoreError>;

pub mod catalogs;
pub mod config;
pub mod environment;
pub mod inventory;
pub mod pagination;
pub mod puppetdb;
pub mod radiator;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub mod prelude {
    pub use super::errors::CoreError;
    pub use super::Result;
}
