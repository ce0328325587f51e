use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::domain::error::AppError;
use crate::infrastructure::bootstrap::run_pipeline;
use crate::infrastructure::config::ConfigService;

/// Loads configuration, runs export and sync once, and maps the outcome to
/// the process exit status.
pub fn run() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let config = match ConfigService::new().load() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    exit_code(runtime.block_on(run_pipeline(&config)).map(|report| {
        info!(leaked = report.leaked.len(), "Run complete");
    }))
}

/// Google API error responses are handled failures and still exit 0.
fn exit_code(outcome: Result<(), AppError>) -> ExitCode {
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_remote_api() => {
            error!(error = %err, "Google API request failed");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "Run failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_errors_exit_zero() {
        let code = exit_code(Err(AppError::ApiError {
            status: 404,
            message: "Requested entity was not found.".to_string(),
        }));
        assert_eq!(code, ExitCode::SUCCESS);
    }

    #[test]
    fn test_other_errors_exit_one() {
        assert_eq!(
            exit_code(Err(AppError::Timeout("[name=password]".to_string()))),
            ExitCode::FAILURE
        );
        assert_eq!(
            exit_code(Err(AppError::AuthError("refresh revoked".to_string()))),
            ExitCode::FAILURE
        );
        assert_eq!(exit_code(Ok(())), ExitCode::SUCCESS);
    }
}
