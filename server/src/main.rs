use clap::Parser;
use server::config::Config;
use server::lifecycle::GameServer;
use std::path::PathBuf;

/// Main-method of the application.
/// Parses command-line arguments, builds the startup configuration, then
/// hands control to the server orchestrator until shutdown.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Tick rate (updates per second)
        #[clap(short, long, default_value = "20")]
        tick_rate: u32,
        /// Maximum simultaneous client connections
        #[clap(short, long, default_value = "100")]
        max_connections: usize,
        /// Persistence backend (mongo, mongodb or mysql)
        #[clap(short, long, default_value = "mongo")]
        database: String,
        /// Database connection url
        #[clap(long, default_value = "mongodb://localhost:27017/game")]
        database_url: String,
        /// Asset download provider name
        #[clap(long, default_value = "google")]
        download_provider: String,
        /// Asset download provider username
        #[clap(long, default_value = "")]
        download_username: String,
        /// Asset download provider password
        #[clap(long, default_value = "")]
        download_password: String,
        /// Directory for debug traffic dumps
        #[clap(long, default_value = "dumps")]
        debug_dump_path: PathBuf,
        /// Default ANSI console color
        #[clap(long, default_value = "37")]
        console_color: u8,
    }

    env_logger::init();
    let args = Args::parse();

    let config = Config {
        host: args.host,
        port: args.port,
        tick_rate: args.tick_rate,
        max_connections: args.max_connections,
        database_backend: args.database,
        database_url: args.database_url,
        download_provider: args.download_provider,
        download_username: args.download_username,
        download_password: args.download_password,
        debug_dump_path: args.debug_dump_path,
        default_console_color: args.console_color,
        ..Config::default()
    };

    let mut server = GameServer::new(config)?;
    server.run().await?;

    Ok(())
}
