//! Parses trace files.
//!
//! A trace drives one connection through the engine, one directive per line:
//!
//! ```text
//! # comments run to the end of the line
//! config mss=100 cwnd=1 algorithm=vegas
//! establish iss=1000 irs=5000 window=4096
//! send 300 @0
//! recv seq=5001 ack=1101 win=4096 flags=AP len=20 @12
//! tick @300
//! read @310
//! close @320
//! ```
//!
//! `@T` stamps the tick at which the directive happens. Without a stamp the
//! directive happens at the tick of the one before it.

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{alpha1, char, space0, space1, u64 as ticks},
    combinator::{all_consuming, map, opt, rest},
    error::{context, VerboseError},
    multi::many0,
    sequence::{preceded, separated_pair, terminated, tuple},
    IResult,
};
use sluice_core::{
    tcp::{CongestionAlgorithm, Handshake, Ticks},
    Message, Segment,
};
use std::str::FromStr;

pub type Res<T, U> = IResult<T, U, VerboseError<T>>;

/// One parsed line of a trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// The line number in the file, counting from one
    pub number: usize,
    /// The tick stamped on the line, if any
    pub at: Option<Ticks>,
    pub directive: Directive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Override configuration before the connection exists
    Config(Vec<ConfigOption>),
    /// Create the connection as if its handshake just completed
    Establish(Handshake),
    /// Queue `len` octets for transmission
    Send(usize),
    /// Close our half of the connection
    Close,
    /// Drain the receive queue
    Read,
    /// Only move the clock
    Tick,
    /// A segment arrives from the remote TCP
    Recv(Segment),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOption {
    Mss(u32),
    Cwnd(u32),
    Ssthresh(u32),
    Algorithm(CongestionAlgorithm),
    ReceiveBuffer(usize),
    Retries(u32),
    Probes(u32),
    Keepalive(Ticks),
    TimeWait(Ticks),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Line {line}: unable to parse '{text}'")]
    Syntax { line: usize, text: String },
    #[error("Line {line}: unknown directive '{directive}'")]
    UnknownDirective { line: usize, directive: String },
    #[error("Line {line}: {directive} needs '{argument}'")]
    MissingArgument {
        line: usize,
        directive: &'static str,
        argument: &'static str,
    },
    #[error("Line {line}: invalid value '{value}' for '{argument}'")]
    InvalidValue {
        line: usize,
        argument: String,
        value: String,
    },
    #[error("Line {line}: unexpected argument '{argument}'")]
    UnexpectedArgument { line: usize, argument: String },
}

/// Parses a whole trace. Blank lines and comments are skipped.
pub fn parse_trace(text: &str) -> Result<Vec<Line>, ParseError> {
    let mut lines = vec![];
    for (i, text) in text.lines().enumerate() {
        let number = i + 1;
        let statement = match line(text) {
            Ok((_, statement)) => statement,
            Err(_) => {
                return Err(ParseError::Syntax {
                    line: number,
                    text: text.trim().to_string(),
                })
            }
        };
        if let Some((name, args, at)) = statement {
            let directive = directive(number, name, args)?;
            lines.push(Line {
                number,
                at,
                directive,
            });
        }
    }
    Ok(lines)
}

/// A directive argument, either `key=value` or a bare value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arg<'a> {
    Pair(&'a str, &'a str),
    Bare(&'a str),
}

type Statement<'a> = (&'a str, Vec<Arg<'a>>, Option<Ticks>);

/// A full line: an optional statement followed by an optional comment.
fn line(input: &str) -> Res<&str, Option<Statement>> {
    all_consuming(terminated(
        preceded(space0, opt(statement)),
        tuple((space0, opt(comment))),
    ))(input)
}

fn statement(input: &str) -> Res<&str, Statement> {
    tuple((
        context("directive", alpha1),
        many0(preceded(space1, arg)),
        opt(preceded(space1, stamp)),
    ))(input)
}

fn arg(input: &str) -> Res<&str, Arg> {
    context(
        "argument",
        alt((
            map(separated_pair(key, char('='), value), |(key, value)| {
                Arg::Pair(key, value)
            }),
            map(value, Arg::Bare),
        )),
    )(input)
}

fn key(input: &str) -> Res<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn value(input: &str) -> Res<&str, &str> {
    take_while1(|c: char| !c.is_whitespace() && c != '#' && c != '@' && c != '=')(input)
}

fn stamp(input: &str) -> Res<&str, Ticks> {
    context("tick stamp", preceded(char('@'), ticks))(input)
}

fn comment(input: &str) -> Res<&str, &str> {
    preceded(char('#'), rest)(input)
}

fn directive(line: usize, name: &str, args: Vec<Arg>) -> Result<Directive, ParseError> {
    let mut args = Args::new(line, args);
    let directive = match name.to_ascii_lowercase().as_str() {
        "config" => Directive::Config(args.config_options()?),
        "establish" => {
            args.directive = "establish";
            Directive::Establish(Handshake {
                iss: args.take("iss")?,
                irs: args.take("irs")?,
                peer_window: args.take("window")?,
            })
        }
        "send" => {
            args.directive = "send";
            Directive::Send(args.take_bare("length")?)
        }
        "close" => Directive::Close,
        "read" => Directive::Read,
        "tick" => Directive::Tick,
        "recv" => {
            args.directive = "recv";
            Directive::Recv(args.segment()?)
        }
        _ => {
            return Err(ParseError::UnknownDirective {
                line,
                directive: name.to_string(),
            })
        }
    };
    args.finish()?;
    Ok(directive)
}

/// The arguments of one directive, consumed as the directive is built.
struct Args<'a> {
    line: usize,
    directive: &'static str,
    args: Vec<Arg<'a>>,
}

impl<'a> Args<'a> {
    fn new(line: usize, args: Vec<Arg<'a>>) -> Self {
        Self {
            line,
            directive: "",
            args,
        }
    }

    fn take_raw(&mut self, key: &str) -> Option<&'a str> {
        let i = self
            .args
            .iter()
            .position(|arg| matches!(arg, Arg::Pair(k, _) if k.eq_ignore_ascii_case(key)))?;
        match self.args.remove(i) {
            Arg::Pair(_, value) => Some(value),
            Arg::Bare(value) => Some(value),
        }
    }

    fn take_optional<T: FromStr>(&mut self, key: &'static str) -> Result<Option<T>, ParseError> {
        self.take_raw(key)
            .map(|value| self.parse(key, value))
            .transpose()
    }

    fn take<T: FromStr>(&mut self, key: &'static str) -> Result<T, ParseError> {
        self.take_optional(key)?
            .ok_or(ParseError::MissingArgument {
                line: self.line,
                directive: self.directive,
                argument: key,
            })
    }

    fn take_bare<T: FromStr>(&mut self, name: &'static str) -> Result<T, ParseError> {
        let i = self
            .args
            .iter()
            .position(|arg| matches!(arg, Arg::Bare(_)))
            .ok_or(ParseError::MissingArgument {
                line: self.line,
                directive: self.directive,
                argument: name,
            })?;
        match self.args.remove(i) {
            Arg::Bare(value) | Arg::Pair(_, value) => self.parse(name, value),
        }
    }

    fn parse<T: FromStr>(&self, key: &str, value: &str) -> Result<T, ParseError> {
        value.parse().map_err(|_| ParseError::InvalidValue {
            line: self.line,
            argument: key.to_string(),
            value: value.to_string(),
        })
    }

    fn config_options(&mut self) -> Result<Vec<ConfigOption>, ParseError> {
        let mut options = vec![];
        for arg in std::mem::take(&mut self.args) {
            let (key, value) = match arg {
                Arg::Pair(key, value) => (key, value),
                Arg::Bare(value) => {
                    return Err(ParseError::UnexpectedArgument {
                        line: self.line,
                        argument: value.to_string(),
                    })
                }
            };
            let option = match key.to_ascii_lowercase().as_str() {
                "mss" => ConfigOption::Mss(self.parse(key, value)?),
                "cwnd" => ConfigOption::Cwnd(self.parse(key, value)?),
                "ssthresh" => ConfigOption::Ssthresh(self.parse(key, value)?),
                "algorithm" => ConfigOption::Algorithm(self.algorithm(value)?),
                "rcvbuf" => ConfigOption::ReceiveBuffer(self.parse(key, value)?),
                "retries" => ConfigOption::Retries(self.parse(key, value)?),
                "probes" => ConfigOption::Probes(self.parse(key, value)?),
                "keepalive" => ConfigOption::Keepalive(self.parse(key, value)?),
                "timewait" => ConfigOption::TimeWait(self.parse(key, value)?),
                _ => {
                    return Err(ParseError::UnexpectedArgument {
                        line: self.line,
                        argument: key.to_string(),
                    })
                }
            };
            options.push(option);
        }
        Ok(options)
    }

    fn algorithm(&self, value: &str) -> Result<CongestionAlgorithm, ParseError> {
        match value.to_ascii_lowercase().as_str() {
            "classic" | "reno" => Ok(CongestionAlgorithm::Classic),
            "vegas" => Ok(CongestionAlgorithm::Vegas),
            _ => Err(ParseError::InvalidValue {
                line: self.line,
                argument: "algorithm".to_string(),
                value: value.to_string(),
            }),
        }
    }

    fn segment(&mut self) -> Result<Segment, ParseError> {
        let seq = self.take("seq")?;
        let ack: Option<u32> = self.take_optional("ack")?;
        let wnd = self.take_optional("win")?.unwrap_or(0);
        let flags = self.take_raw("flags").unwrap_or("");
        let urg: Option<u16> = self.take_optional("urg")?;
        let len: Option<usize> = self.take_optional("len")?;
        let data = self.take_raw("data");

        let mut builder = Segment::builder(seq).wnd(wnd);
        for flag in flags.chars() {
            builder = match flag.to_ascii_uppercase() {
                'A' => builder.ack(ack.unwrap_or(0)),
                'F' => builder.fin(),
                'R' => builder.rst(),
                'S' => builder.syn(),
                'U' => builder.urg(urg.unwrap_or(0)),
                'P' => builder.psh(),
                '-' => builder,
                _ => {
                    return Err(ParseError::InvalidValue {
                        line: self.line,
                        argument: "flags".to_string(),
                        value: flags.to_string(),
                    })
                }
            };
        }
        let text = match (data, len) {
            (Some(data), _) => Message::new(data.as_bytes()),
            (None, Some(len)) => Message::new(vec![b'x'; len]),
            (None, None) => Message::default(),
        };
        Ok(builder.text(text).build())
    }

    /// Fails on arguments the directive did not use.
    fn finish(self) -> Result<(), ParseError> {
        match self.args.first() {
            None => Ok(()),
            Some(Arg::Pair(key, _)) => Err(ParseError::UnexpectedArgument {
                line: self.line,
                argument: key.to_string(),
            }),
            Some(Arg::Bare(value)) => Err(ParseError::UnexpectedArgument {
                line: self.line,
                argument: value.to_string(),
            }),
        }
    }
}
