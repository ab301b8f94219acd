pub mod prediction;
pub mod request;
pub mod user;
