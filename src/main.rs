use edge_limiter::{config::LimiterConfig, init_limiter, init_tracing};
use std::env;
use std::path::PathBuf;
use std::process;

#[tokio::main]
async fn main() {
    // Initialize tracing
    init_tracing();

    // Optional YAML file; environment variables are applied on top
    let config_path = env::args().nth(1).map(PathBuf::from);

    // Load configuration
    let config = match LimiterConfig::load(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            eprintln!("Usage: edge-limiter [config_file]");
            process::exit(1);
        }
    };

    // Start the server
    if let Err(e) = init_limiter(config).await {
        eprintln!("Edge limiter error: {}", e);
        process::exit(1);
    }
}
