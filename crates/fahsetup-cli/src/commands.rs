pub mod protocol;
pub mod setup;
