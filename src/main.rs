use std::process::ExitCode;

fn main() -> ExitCode {
    enrollment_sync_lib::run()
}
