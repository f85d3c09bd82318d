pub mod decoder;
pub mod publisher;
pub mod reading;
pub mod state;
