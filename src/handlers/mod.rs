pub mod companies;
pub mod mail;
pub mod menu;
