pub mod btle;
pub mod connection;
pub mod constants;
pub mod transport;
pub mod types;

#[cfg(test)]
pub mod testing;
