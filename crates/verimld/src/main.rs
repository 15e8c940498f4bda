use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;
use veriml_core::RuntimeArgs;
use verimld::{AppState, DEFAULT_MAX_UPLOAD_BYTES};

#[derive(Parser)]
#[command(name = "verimld")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "HTTP daemon for the veriml pipeline", long_about = None)]
struct Args {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Listen address
    #[arg(long, env = "VERIMLD_ADDR", default_value = "0.0.0.0:5000")]
    addr: SocketAddr,

    /// Largest accepted request body in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,

    #[command(flatten)]
    runtime: RuntimeArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    veriml_core::init_tracing(args.json, level);

    let coordinator = args
        .runtime
        .coordinator()
        .context("invalid chain configuration")?;
    let app = verimld::router(AppState::new(coordinator), args.max_upload_bytes);

    verimld::serve(args.addr, app)
        .await
        .with_context(|| format!("server on {} failed", args.addr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults_listen_on_port_5000() {
        let args = Args::parse_from(["verimld"]);
        assert_eq!(args.addr.port(), 5000);
        assert_eq!(args.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }
}
