pub mod answers;
pub mod catalog;
pub mod core;
pub mod operators;
