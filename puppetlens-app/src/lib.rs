pub mod errors;
pub mod logger;
pub mod pages;
pub mod routes;
