mod extract_impl;
pub mod producer;
pub mod progress;
pub mod sink;

pub use extract_impl::cmd_extract;
