pub mod content;
pub mod reputation;
pub mod scanner;
pub mod security_manager;
pub mod staging;
