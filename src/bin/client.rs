//! Client entry point: connects to one channel's port under a chosen
//! username.

use clap::Parser;

/// Line-oriented chat client.
#[derive(Parser, Debug)]
#[command(name = "client", about = "Line-oriented chat client")]
struct Args {
    /// Port the target channel is listening on.
    port: u16,

    /// Username to announce to the server.
    username: String,

    /// Server host to connect to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    linechat::client::run(&args.host, args.port, &args.username).await
}
