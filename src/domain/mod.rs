pub mod credentials;
pub mod error;
pub mod report;
pub mod sync_report;
