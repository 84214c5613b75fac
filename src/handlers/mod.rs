pub mod admin;
pub mod display;
