use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use super::{make_record, CommandSource, Feedback};
use crate::command::Command;
use crate::config::{Config, KeyType};
use crate::error::Error;

const DELIMITERS: &str = " \t\n\r(),\"";

/// Replays a textual trace, one command per line.
///
/// The whole file is read into owned lines up front and parsed eagerly, so
/// a malformed line is reported (with its 1-based number and the offending
/// token) before any command executes.
pub struct ScriptSource {
    lines: Vec<String>,
    commands: Vec<ParsedLine>,
    cur: usize,
}

struct ParsedLine {
    command: Command,
    break_marker: bool,
}

impl ScriptSource {
    pub fn from_path(conf: Arc<Config>, path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(conf, file)
    }

    pub fn from_reader(conf: Arc<Config>, reader: impl Read) -> Result<Self, Error> {
        let mut lines = Vec::new();
        for line in BufReader::new(reader).lines() {
            lines.push(line?);
        }
        let commands = parse_lines(&conf, &lines)?;
        Ok(Self {
            lines,
            commands,
            cur: 0,
        })
    }

    pub fn max_lines(&self) -> u64 {
        self.lines.len() as u64
    }

    /// 0-based line access for diagnostics.
    pub fn line(&self, idx: u64) -> Option<&str> {
        self.lines.get(idx as usize).map(|s| s.as_str())
    }
}

impl CommandSource for ScriptSource {
    fn next_command(&mut self, _feedback: &Feedback) -> Option<Command> {
        let parsed = self.commands.get(self.cur)?;
        if parsed.break_marker {
            warn!("break at line {}", self.cur + 1);
        }
        let cmd = parsed.command.clone();
        self.cur += 1;
        Some(cmd)
    }

    fn len_hint(&self) -> Option<u64> {
        Some(self.commands.len() as u64)
    }
}

fn parse_lines(conf: &Config, lines: &[String]) -> Result<Vec<ParsedLine>, Error> {
    let mut commands = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        let lineno = idx as u64 + 1;
        let tokens = tokenize(line);
        let mut break_marker = false;
        let command = match tokens.first().copied() {
            None | Some("--") => Command::Nop,
            Some("BREAK") => {
                break_marker = true;
                Command::Nop
            }
            Some("CREATE") => Command::Create,
            Some("OPEN") => Command::Open,
            Some("CLOSE") => Command::Close,
            Some("BEGIN_TXN") => Command::TxnBegin,
            Some("CLOSE_TXN") => Command::TxnCommit,
            Some("FLUSH") => Command::Flush,
            Some("FULLCHECK") => Command::Fullcheck,
            Some("INSERT") => {
                let (key, size) = match tokens.len() {
                    // without a key: INSERT flags record
                    3 => (Vec::new(), parse_size(tokens[2], lineno)?),
                    4 => (
                        parse_key(conf.key_type, tokens[2], lineno)?,
                        parse_size(tokens[3], lineno)?,
                    ),
                    _ => return Err(parse_error(lineno, line)),
                };
                let mut record = Vec::new();
                make_record(idx as u64, size, &mut record);
                Command::Insert { key, record }
            }
            Some("ERASE") => {
                if tokens.len() < 3 {
                    return Err(parse_error(lineno, line));
                }
                Command::Erase {
                    key: parse_key(conf.key_type, tokens[2], lineno)?,
                }
            }
            Some("FIND") => {
                if tokens.len() != 3 {
                    return Err(parse_error(lineno, line));
                }
                Command::Find {
                    key: parse_key(conf.key_type, tokens[2], lineno)?,
                }
            }
            Some(verb) => {
                return Err(Error::Parse {
                    line: lineno,
                    token: verb.to_string(),
                })
            }
        };
        commands.push(ParsedLine {
            command,
            break_marker,
        });
    }
    Ok(commands)
}

pub(crate) fn tokenize(line: &str) -> Vec<&str> {
    line.split(|c| DELIMITERS.contains(c))
        .filter(|t| !t.is_empty())
        .collect()
}

fn parse_error(lineno: u64, line: &str) -> Error {
    Error::Parse {
        line: lineno,
        token: line.trim().to_string(),
    }
}

fn parse_size(token: &str, lineno: u64) -> Result<usize, Error> {
    token.parse::<usize>().map_err(|_| Error::Parse {
        line: lineno,
        token: token.to_string(),
    })
}

fn parse_key(key_type: KeyType, token: &str, lineno: u64) -> Result<Vec<u8>, Error> {
    match key_type.width() {
        Some(width) => {
            let value = token.parse::<u64>().map_err(|_| Error::Parse {
                line: lineno,
                token: token.to_string(),
            })?;
            if width < 8 && value >> (width * 8) != 0 {
                return Err(Error::Parse {
                    line: lineno,
                    token: token.to_string(),
                });
            }
            Ok(value.to_le_bytes()[..width].to_vec())
        }
        None => Ok(token.as_bytes().to_vec()),
    }
}
