pub mod attributes;
pub mod core;
pub mod records;
pub mod settings;
pub mod transfer;
