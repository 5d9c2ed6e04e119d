use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = gesture_prep_lib::Args::parse();
    gesture_prep_lib::init_tracing(args.verbose);

    match gesture_prep_lib::run(args) {
        Ok(summary) => {
            if let Some(error) = &summary.combine_error {
                tracing::warn!("Combined table was not written: {}", error);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
