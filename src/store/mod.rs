pub mod gateway;
pub mod scripts;

pub use gateway::{Gateway, StateGateway};
