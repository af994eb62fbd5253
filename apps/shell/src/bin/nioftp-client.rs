//! nioftp client shell.

use std::io;
use std::path::PathBuf;

use clap::Parser;

use nioftp_client::{Client, ClientError};
use nioftp_shell::config::ShellConfig;
use nioftp_shell::shell::{self, CLIENT_USAGE, ClientCommand, Flow, error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "nioftp client shell")]
struct Args {
    /// TOML configuration file with a [client] table
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server port used when `connect` is given no port
    #[arg(short, long)]
    port: Option<u16>,

    /// Server to connect to right away
    #[arg(long)]
    connect: Option<String>,
}

fn main() -> anyhow::Result<()> {
    nioftp_shell::init_logging();
    let args = Args::parse();

    let mut config = ShellConfig::load(args.config.as_deref())?.client;
    if let Some(port) = args.port {
        config.port = port;
    }

    let mut client = Client::new(config);
    if let Some(address) = &args.connect {
        if client.connect(address) {
            println!("{}", info("Connected."));
        } else {
            println!("{}", error("Unable to connect."));
        }
    }

    println!("{CLIENT_USAGE}");
    let stdin = io::stdin();
    shell::run("nioftp-cli", stdin.lock(), io::stdout(), |line| {
        let reply = match ClientCommand::parse(line) {
            Ok(ClientCommand::Connect(address)) => {
                if client.connect(&address) {
                    match client.peer_addr() {
                        Some(peer) => info(&format!("Connected to {peer}.")),
                        None => info("Connected."),
                    }
                } else {
                    error("Unable to connect.")
                }
            }
            Ok(ClientCommand::Disconnect) => match client.disconnect() {
                Ok(()) => info("Disconnected."),
                Err(e) => error(&shell::describe_client_error(&e)),
            },
            Ok(ClientCommand::List(path)) => match client.execute_list(&path) {
                Ok(entries) if entries.is_empty() => info("Empty directory."),
                Ok(entries) => shell::format_listing(&entries),
                Err(e) => failure(&client, &e),
            },
            Ok(ClientCommand::Get { src, dst }) => match client.execute_get(&src, &dst) {
                Ok(bytes) => info(&format!("Ok, {bytes} bytes.")),
                Err(e) => failure(&client, &e),
            },
            Ok(ClientCommand::Help) => CLIENT_USAGE.to_owned(),
            Ok(ClientCommand::Exit) => return (Flow::Exit, String::new()),
            Err(message) => error(&message),
        };
        (Flow::Continue, reply)
    })?;

    if client.is_connected() {
        client.disconnect()?;
    }
    Ok(())
}

/// Error line for a failed request, noting when it ended the session.
fn failure(client: &Client, err: &ClientError) -> String {
    let message = shell::describe_client_error(err);
    if err.is_remote() || client.is_connected() || matches!(err, ClientError::NotConnected) {
        error(&message)
    } else {
        error(&format!("{message} Disconnected."))
    }
}
