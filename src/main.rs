use image_sinker::cli::{Args, Runner};
use image_sinker::logging::Logger;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_args();

    let runner = match Runner::new(args) {
        Ok(runner) => runner,
        Err(e) => {
            Logger::new(false).error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    match runner.run().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            runner.output().error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
