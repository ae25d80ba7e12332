use clap::Parser;
use finops_cd_parser::cli::Cli;
use finops_cd_parser::config::load_config;
use finops_cd_parser::run_server;

#[tokio::main]
async fn main() {
    // TLS to the Kubernetes API and chart hosts
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    config.apply(cli.overrides());
    cli.init_logging(config.log_level);

    let settings = match config.validate() {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Configuration missing: {}", e);
            std::process::exit(1);
        }
    };
    log::debug!("Effective settings: {:?}", settings);

    if let Err(e) = run_server(settings).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
