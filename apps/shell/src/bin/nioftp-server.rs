//! nioftp server shell.

use std::io;
use std::path::PathBuf;

use clap::Parser;

use nioftp_server::Server;
use nioftp_shell::config::ShellConfig;
use nioftp_shell::shell::{self, Flow, SERVER_USAGE, ServerCommand, error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "nioftp server shell")]
struct Args {
    /// TOML configuration file with a [server] table
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the configuration file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory to serve right away
    root: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    nioftp_shell::init_logging();
    let args = Args::parse();

    let mut config = ShellConfig::load(args.config.as_deref())?.server;
    if let Some(port) = args.port {
        config.port = port;
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), port = config.port, "nioftp server shell");

    let mut server = Server::new(config);
    if let Some(root) = &args.root {
        server.start(root)?;
        println!("{}", info("Server started."));
    }

    println!("{SERVER_USAGE}");
    let stdin = io::stdin();
    shell::run("nioftp-srv", stdin.lock(), io::stdout(), |line| {
        match ServerCommand::parse(line) {
            Ok(ServerCommand::Start(root)) => match server.start(&root) {
                Ok(()) => {
                    let addr = server
                        .local_addr()
                        .map(|a| a.to_string())
                        .unwrap_or_default();
                    (Flow::Continue, info(&format!("Server started on {addr}.")))
                }
                Err(e) => (Flow::Continue, error(&shell::describe_server_error(&e))),
            },
            Ok(ServerCommand::Stop) => {
                if server.is_running() {
                    server.stop();
                    (Flow::Continue, info("Server stopped."))
                } else {
                    (Flow::Continue, error("Server is not running."))
                }
            }
            Ok(ServerCommand::Help) => (Flow::Continue, SERVER_USAGE.to_owned()),
            Ok(ServerCommand::Exit) => (Flow::Exit, String::new()),
            Err(message) => (Flow::Continue, error(&message)),
        }
    })?;

    server.stop();
    Ok(())
}
