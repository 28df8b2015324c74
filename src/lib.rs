pub mod cli;
pub mod client;
pub mod config;
pub mod context;
pub mod logging;
pub mod notify;
pub mod server;

#[cfg(test)]
mod test_support;
