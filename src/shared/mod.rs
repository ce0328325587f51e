#[cfg(test)]
pub mod stub_server;
pub mod wait;
