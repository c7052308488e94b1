pub mod follows;
pub mod likes;
pub mod message;
pub mod session;
pub mod user;
