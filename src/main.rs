use anyhow::Result;
use killtracer::cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse cli and handle clap errors
    let options = cli::parse_from_args();

    killtracer::init_logger(Some(options.log_level()));

    match killtracer::killtracerd::killtracer_run(&options).await {
        Ok(_) => std::process::exit(0),
        Err(e) => {
            killtracer::utils::report_error(&e);
            std::process::exit(1);
        }
    }
}
