pub mod price;
pub mod settings;
