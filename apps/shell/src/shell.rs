//! Line-oriented command loop shared by both shells.

use std::io::{self, BufRead, Write};

use nioftp_client::{ClientError, RemoteEntry};
use nioftp_server::ServerError;

pub const SERVER_USAGE: &str = "usage:
    start <root> - serve the directory <root>
    stop - stop serving
    help
    exit";

pub const CLIENT_USAGE: &str = "usage:
    connect <host[:port]> - connect to a server
    disconnect - disconnect
    list <path> - show files and directories in <path>
    get <src> <dst> - download remote file <src> to local path <dst>
    help
    exit";

/// Formats an informational line.
pub fn info(message: &str) -> String {
    format!("[i] {message}")
}

/// Formats an error line.
pub fn error(message: &str) -> String {
    format!("[!] {message}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    Start(String),
    Stop,
    Help,
    Exit,
}

impl ServerCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["start", root] => Ok(ServerCommand::Start((*root).to_owned())),
            ["start", ..] => Err("usage: start <root>".into()),
            ["stop"] => Ok(ServerCommand::Stop),
            ["help"] => Ok(ServerCommand::Help),
            ["exit"] | ["quit"] => Ok(ServerCommand::Exit),
            [other, ..] => Err(format!("unknown command: {other}")),
            [] => Err(String::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Connect(String),
    Disconnect,
    List(String),
    Get { src: String, dst: String },
    Help,
    Exit,
}

impl ClientCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["connect", address] => Ok(ClientCommand::Connect((*address).to_owned())),
            ["connect", ..] => Err("usage: connect <host[:port]>".into()),
            ["disconnect"] => Ok(ClientCommand::Disconnect),
            ["list"] => Ok(ClientCommand::List(".".into())),
            ["list", path] => Ok(ClientCommand::List((*path).to_owned())),
            ["list", ..] => Err("usage: list <path>".into()),
            ["get", src, dst] => Ok(ClientCommand::Get {
                src: (*src).to_owned(),
                dst: (*dst).to_owned(),
            }),
            ["get", ..] => Err("usage: get <src> <dst>".into()),
            ["help"] => Ok(ClientCommand::Help),
            ["exit"] | ["quit"] => Ok(ClientCommand::Exit),
            [other, ..] => Err(format!("unknown command: {other}")),
            [] => Err(String::new()),
        }
    }
}

/// Short message for a failed server command.
pub fn describe_server_error(err: &ServerError) -> String {
    match err {
        ServerError::AlreadyStarted => "Server has already started.".into(),
        ServerError::InvalidRoot { path, .. } => {
            format!("Not a directory: {}", path.display())
        }
        other => format!("Unable to start: {other}"),
    }
}

/// Short message for a failed client command.
pub fn describe_client_error(err: &ClientError) -> String {
    match err {
        ClientError::NotConnected => "Not connected.".into(),
        ClientError::NotFound(p) => format!("No such file or directory: {p}"),
        ClientError::NotADirectory(p) => format!("Not a directory: {p}"),
        ClientError::AccessDenied(p) => format!("Access denied: {p}"),
        ClientError::RemoteIo(p) => format!("Server I/O error: {p}"),
        ClientError::Io(e) => format!("I/O error: {e}"),
        ClientError::Protocol(e) => format!("Protocol error: {e}"),
    }
}

/// One line per entry, directories marked with a trailing `/`.
pub fn format_listing(entries: &[RemoteEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            if e.is_dir {
                format!("{}/", e.name)
            } else {
                e.name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether the loop should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Reads commands from `input` until `exit` or end of input. Each non-empty
/// line is passed to `handle`, whose output is written to `output`.
pub fn run<R, W, F>(prompt: &str, mut input: R, mut output: W, mut handle: F) -> io::Result<()>
where
    R: BufRead,
    W: Write,
    F: FnMut(&str) -> (Flow, String),
{
    let mut line = String::new();
    loop {
        write!(output, "{prompt}> ")?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }

        let (flow, reply) = handle(line.trim());
        if !reply.is_empty() {
            writeln!(output, "{reply}")?;
        }
        if flow == Flow::Exit {
            return Ok(());
        }
    }
}
