pub mod bootstrap;
pub mod config;
pub mod csv;
pub mod google;
pub mod security;
pub mod storage;
pub mod webdriver;
