pub mod command;
pub mod extract;
pub mod info;
