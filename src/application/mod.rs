pub mod use_cases;

pub use use_cases::cleanup_scope::CleanupScope;
pub use use_cases::portal_export::{PortalExportUseCase, PortalSettings};
pub use use_cases::sheet_sync::{SheetSyncUseCase, SyncSettings};
