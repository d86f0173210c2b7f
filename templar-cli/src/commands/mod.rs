pub mod diff;
pub mod generate;
pub mod order;
pub mod settings;
