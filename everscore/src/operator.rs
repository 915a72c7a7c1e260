use crate::app::AppMessage;
use crossbeam_channel::Sender;
use log::*;
use std::{
    io::{self, BufRead},
    str::FromStr,
    thread::{self, JoinHandle},
};
use thiserror::Error;

pub const HELP: &str = "\
commands:
  auto        take state from the console
  manual      stop following the console
  send        share state with peers
  receive     stop sending, follow peers instead
  peer ADDR   only accept packets from ADDR
  peer        accept packets from anyone
  push        send what the board shows (manual + send)
  status      show the modes and the board
  quit        shut down";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    SetAuto(bool),
    SetSend(bool),
    SetPeerFilter(Option<String>),
    Push,
    Status,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?}")]
    Unknown(String),
    #[error("{0} takes no arguments")]
    UnexpectedArgument(&'static str),
}

impl FromStr for OperatorCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = words.next().ok_or(ParseCommandError::Empty)?;
        let argument = words.next();

        let no_argument = |name, cmd| match argument {
            Some(_) => Err(ParseCommandError::UnexpectedArgument(name)),
            None => Ok(cmd),
        };

        match command.to_lowercase().as_str() {
            "auto" => no_argument("auto", Self::SetAuto(true)),
            "manual" => no_argument("manual", Self::SetAuto(false)),
            "send" => no_argument("send", Self::SetSend(true)),
            "receive" => no_argument("receive", Self::SetSend(false)),
            "peer" => Ok(Self::SetPeerFilter(argument.map(str::to_string))),
            "push" => no_argument("push", Self::Push),
            "status" => no_argument("status", Self::Status),
            "quit" | "exit" => no_argument("quit", Self::Quit),
            _ => Err(ParseCommandError::Unknown(command.to_string())),
        }
    }
}

/// Reads operator commands from stdin on a detached thread. End of input
/// only stops the reader; the relay keeps running until `quit` or Ctrl-C.
pub fn spawn_console_reader(tx: Sender<AppMessage>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("operator-console".to_string())
        .spawn(move || {
            println!("{HELP}");
            read_commands(io::stdin().lock(), &tx);
        })
}

fn read_commands<R: BufRead>(input: R, tx: &Sender<AppMessage>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read operator input: {e}");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<OperatorCommand>() {
            Ok(cmd) => {
                let quit = cmd == OperatorCommand::Quit;
                if tx.send(AppMessage::Operator(cmd)).is_err() || quit {
                    return;
                }
            }
            Err(e) => println!("{e}\n{HELP}"),
        }
    }
    debug!("Operator input closed, console commands are no longer available");
}

#[tokio::main(flavor = "current_thread")]
pub async fn ctrl_c_thread(tx: Sender<AppMessage>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Interrupt received, shutting down");
            let _ = tx.send(AppMessage::Quit);
        }
        Err(e) => error!("Unable to listen for Ctrl-C: {e}"),
    }
}
