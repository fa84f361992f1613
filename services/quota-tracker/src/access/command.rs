use std::net::Ipv4Addr;

use thiserror::Error;

pub const ADD_USAGE: &str = "/add name|IP";
pub const REMOVE_USAGE: &str = "/remove IP";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Add { name: String, ip: Ipv4Addr },
    List,
    Quota,
    Remove { ip: Ipv4Addr },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("not a command")]
    NotACommand,
    #[error("unknown command /{0}")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("invalid IPv4 address: {0}")]
    InvalidIp(String),
}

impl Command {
    /// Parses chat text such as `/add office|10.0.0.7`. A trailing
    /// `@botname` on the command word is ignored. The legacy words
    /// `/addakses`, `/myip`, `/ceklimit` and `/delakses` are still accepted.
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let text = text.trim();
        let body = text.strip_prefix('/').ok_or(CommandError::NotACommand)?;

        let (word, args) = match body.split_once(char::is_whitespace) {
            Some((word, args)) => (word, args.trim()),
            None => (body, ""),
        };
        let word = word.split('@').next().unwrap_or_default().to_ascii_lowercase();

        match word.as_str() {
            "start" => Ok(Command::Start),
            "help" => Ok(Command::Help),
            "list" | "myip" => Ok(Command::List),
            "quota" | "ceklimit" => Ok(Command::Quota),
            "add" | "addakses" => {
                let (name, ip) = args.split_once('|').ok_or(CommandError::Usage(ADD_USAGE))?;
                let name = name.trim();
                if name.is_empty() {
                    return Err(CommandError::Usage(ADD_USAGE));
                }
                Ok(Command::Add {
                    name: name.to_string(),
                    ip: parse_ip(ip)?,
                })
            }
            "remove" | "delakses" => {
                let ip = args
                    .split_whitespace()
                    .next()
                    .ok_or(CommandError::Usage(REMOVE_USAGE))?;
                Ok(Command::Remove { ip: parse_ip(ip)? })
            }
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }

    /// Whether the command spends quota.
    pub fn consumes_quota(&self) -> bool {
        matches!(self, Command::Add { .. })
    }
}

fn parse_ip(raw: &str) -> Result<Ipv4Addr, CommandError> {
    let raw = raw.trim();
    raw.parse()
        .map_err(|_| CommandError::InvalidIp(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_add_with_spacing() {
        let cmd = Command::parse("/add  home office | 192.168.1.20 ").unwrap();
        assert_eq!(
            cmd,
            Command::Add {
                name: "home office".into(),
                ip: Ipv4Addr::new(192, 168, 1, 20)
            }
        );
        assert!(cmd.consumes_quota());
    }

    #[test]
    fn strips_bot_mention() {
        assert_eq!(Command::parse("/quota@AccessBot").unwrap(), Command::Quota);
        assert_eq!(Command::parse("/HELP").unwrap(), Command::Help);
    }

    #[test]
    fn rejects_malformed_add() {
        assert_eq!(
            Command::parse("/add 10.0.0.1"),
            Err(CommandError::Usage(ADD_USAGE))
        );
        assert_eq!(
            Command::parse("/add |10.0.0.1"),
            Err(CommandError::Usage(ADD_USAGE))
        );
        assert_eq!(
            Command::parse("/add lab|300.1.1.1"),
            Err(CommandError::InvalidIp("300.1.1.1".into()))
        );
    }

    #[test]
    fn remove_requires_an_address() {
        assert_eq!(
            Command::parse("/remove"),
            Err(CommandError::Usage(REMOVE_USAGE))
        );
        assert_eq!(
            Command::parse("/remove 10.1.2.3").unwrap(),
            Command::Remove {
                ip: Ipv4Addr::new(10, 1, 2, 3)
            }
        );
    }

    #[test]
    fn legacy_command_words_are_aliases() {
        assert_eq!(
            Command::parse("/addakses home|10.0.0.7").unwrap(),
            Command::parse("/add home|10.0.0.7").unwrap()
        );
        assert_eq!(Command::parse("/myip").unwrap(), Command::List);
        assert_eq!(Command::parse("/CekLimit@AccessBot").unwrap(), Command::Quota);
        assert_eq!(
            Command::parse("/delakses 10.0.0.7").unwrap(),
            Command::Remove {
                ip: Ipv4Addr::new(10, 0, 0, 7)
            }
        );
        assert_eq!(
            Command::parse("/addakses 10.0.0.7"),
            Err(CommandError::Usage(ADD_USAGE))
        );
    }

    #[test]
    fn plain_text_and_unknown_commands() {
        assert_eq!(Command::parse("hello"), Err(CommandError::NotACommand));
        assert_eq!(
            Command::parse("/delete x"),
            Err(CommandError::Unknown("delete".into()))
        );
    }
}
