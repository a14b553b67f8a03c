use clap::Parser;
use tokenward::cli::{Args, build_config, build_token_config, init_logging, open_database};
use tokenward::config::TokenConfig;
use tokenward::run_server;
use tracing::{error, info};

fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    // Secrets are read (and their env vars cleared) before any runtime
    // threads exist.
    let Some(token_config) = build_token_config(&args) else {
        std::process::exit(1);
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start async runtime");
            std::process::exit(1);
        }
    };

    runtime.block_on(serve(args, token_config));
}

async fn serve(args: Args, token_config: TokenConfig) {
    let Some(db) = open_database(&args.database, args.max_connections).await else {
        std::process::exit(1);
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, "Listening"),
        Err(e) => error!(error = %e, "Failed to read local address"),
    }

    if args.insecure_cookies {
        info!("Cookies are sent without the Secure flag");
    }

    let config = build_config(&args, db, token_config);
    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
