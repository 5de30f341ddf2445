pub mod append;
pub mod health;
pub mod read;
