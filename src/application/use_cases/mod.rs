pub mod cleanup_scope;
pub mod portal_export;
pub mod sheet_sync;
