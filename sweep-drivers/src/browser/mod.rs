pub mod dom;
pub mod driver;
mod scripts;
