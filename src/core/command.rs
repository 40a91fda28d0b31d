//! Wire commands
//!
//! One datagram carries one text command. The first whitespace-delimited
//! token selects the command (case-insensitive), everything after it is a
//! single argument.

/// Parsed request
///
/// Borrows from the datagram payload, so parsing never allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCommand<'a> {
    Ping,
    /// Text to echo back, `None` when the argument is missing
    Echo(Option<&'a str>),
    Time,
    Stats,
    /// Iteration count, `None` when the argument is missing
    Load(Option<u64>),
    Quit,
    /// First token as received
    Unknown(&'a str),
}

/// Argument errors detected while parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("invalid load parameter")]
    InvalidLoadParameter,
}

impl<'a> ServiceCommand<'a> {
    /// Parse a text payload into a command
    ///
    /// Leading and trailing whitespace is ignored. Whitespace inside the
    /// argument is preserved, which matters for `ECHO`.
    pub fn parse(message: &'a str) -> Result<Self, CommandError> {
        let (token, argument) = split_command(message);

        let command = if token.eq_ignore_ascii_case("PING") {
            Self::Ping
        } else if token.eq_ignore_ascii_case("ECHO") {
            Self::Echo(argument)
        } else if token.eq_ignore_ascii_case("TIME") {
            Self::Time
        } else if token.eq_ignore_ascii_case("STATS") {
            Self::Stats
        } else if token.eq_ignore_ascii_case("LOAD") {
            match argument {
                Some(arg) => Self::Load(Some(
                    arg.parse::<u64>()
                        .map_err(|_| CommandError::InvalidLoadParameter)?,
                )),
                None => Self::Load(None),
            }
        } else if token.eq_ignore_ascii_case("QUIT") {
            Self::Quit
        } else {
            Self::Unknown(token)
        };

        Ok(command)
    }
}

/// Split a message into command token and optional argument
#[inline]
fn split_command(message: &str) -> (&str, Option<&str>) {
    let trimmed = message.trim();
    match trimmed.find(char::is_whitespace) {
        Some(idx) => {
            let rest = trimmed[idx..].trim_start();
            (&trimmed[..idx], (!rest.is_empty()).then_some(rest))
        }
        None => (trimmed, None),
    }
}
