use crate::domain::error::{AppError, Result};
use keyring::Entry;

pub struct KeyringManager {
    service: String,
}

impl KeyringManager {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    pub fn get_secret(&self, key: &str) -> Result<String> {
        let entry = Entry::new(&self.service, key)
            .map_err(|e| AppError::SecurityError(format!("Failed to create entry: {}", e)))?;

        entry
            .get_password()
            .map_err(|e| AppError::SecurityError(format!("Failed to get password: {}", e)))
    }
}
