//! Broadcast command parsing.
//!
//! Tokens are matched on exact lowercase keywords; only pin names are
//! case-insensitive. Parsing is pure: applying a [`Command`] is up to the
//! listener.

use crate::error::ParseError;

/// A parsed broadcast token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `pin<NAME>on` / `pin<NAME>off`. The name is uppercased.
    SetPin { name: String, on: bool },
    /// `allon` / `alloff`.
    SetAll { on: bool },
    /// `pinpattern<bits>`.
    SetPattern { bits: String },
    /// `sghdebugon` / `sghdebugoff`.
    SetDebug { on: bool },
    GetTime,
    GetIp,
    GetVersion,
    Shutdown,
    StopHandler,
}

/// Parses one broadcast token. Surrounding whitespace is ignored, and so is
/// whitespace between a keyword and its argument (`sghdebug on`,
/// `pinpattern 0110`).
pub fn parse_broadcast(token: &str) -> Result<Command, ParseError> {
    let token = token.trim();
    let unknown = || ParseError::UnknownCommand(token.to_string());

    if let Some(bits) = token.strip_prefix("pinpattern") {
        return Ok(Command::SetPattern {
            bits: bits.trim().to_string(),
        });
    }
    if let Some(rest) = token.strip_prefix("pin") {
        let (name, on) = on_off_suffix(rest).ok_or_else(unknown)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(unknown());
        }
        return Ok(Command::SetPin {
            name: name.to_ascii_uppercase(),
            on,
        });
    }
    if let Some(rest) = token.strip_prefix("all") {
        return match on_off_suffix(rest) {
            Some((arg, on)) if arg.trim().is_empty() => Ok(Command::SetAll { on }),
            _ => Err(unknown()),
        };
    }
    if let Some(rest) = token.strip_prefix("sghdebug") {
        return match on_off_suffix(rest) {
            Some((arg, on)) if arg.trim().is_empty() => Ok(Command::SetDebug { on }),
            _ => Err(unknown()),
        };
    }

    match token {
        "gettime" => Ok(Command::GetTime),
        "getip" => Ok(Command::GetIp),
        "getversion" => Ok(Command::GetVersion),
        "shutdown" => Ok(Command::Shutdown),
        "stophandler" => Ok(Command::StopHandler),
        _ => Err(unknown()),
    }
}

fn on_off_suffix(rest: &str) -> Option<(&str, bool)> {
    if let Some(head) = rest.strip_suffix("on") {
        Some((head, true))
    } else {
        rest.strip_suffix("off").map(|head| (head, false))
    }
}

/// A parsed value token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// Empty token: nothing to do.
    Empty,
    Number(f64),
}

impl Value {
    /// Returns the value as a pin level if it is exactly 0 or 1.
    pub fn as_binary(&self) -> Option<i64> {
        match self {
            Value::Number(n) if *n == 0.0 => Some(0),
            Value::Number(n) if *n == 1.0 => Some(1),
            _ => None,
        }
    }
}

/// Parses a value token: `on`/`1` are 1, `off`/`0` are 0, other numbers
/// stand for themselves and the empty token is [`Value::Empty`].
pub fn parse_value(token: &str) -> Result<Value, ParseError> {
    let token = token.trim();
    match token {
        "" => Ok(Value::Empty),
        "on" | "1" => Ok(Value::Number(1.0)),
        "off" | "0" => Ok(Value::Number(0.0)),
        _ => token
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Value::Number)
            .ok_or_else(|| ParseError::InvalidValue(token.to_string())),
    }
}

/// Extracts the pin name from a `pin<NAME>` sensor-update key.
pub fn parse_sensor_key(key: &str) -> Option<&str> {
    let name = key.trim().strip_prefix("pin")?;
    if name.is_empty() { None } else { Some(name) }
}

#[cfg(test)]
mod command_tests {
    use super::*;

    #[test]
    fn test_parse_set_pin() {
        assert_eq!(
            parse_broadcast("pinPA25on"),
            Ok(Command::SetPin {
                name: "PA25".to_string(),
                on: true
            })
        );
        assert_eq!(
            parse_broadcast(" pinj4.7off "),
            Ok(Command::SetPin {
                name: "J4.7".to_string(),
                on: false
            })
        );
        assert!(parse_broadcast("pinon").is_err());
        assert!(parse_broadcast("pinPA25").is_err());
    }

    #[test]
    fn test_parse_pattern() {
        assert_eq!(
            parse_broadcast("pinpattern0110"),
            Ok(Command::SetPattern {
                bits: "0110".to_string()
            })
        );
        assert_eq!(
            parse_broadcast("pinpattern 0110"),
            Ok(Command::SetPattern {
                bits: "0110".to_string()
            })
        );
        assert_eq!(
            parse_broadcast("pinpattern"),
            Ok(Command::SetPattern {
                bits: String::new()
            })
        );
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(parse_broadcast("allon"), Ok(Command::SetAll { on: true }));
        assert_eq!(parse_broadcast("alloff"), Ok(Command::SetAll { on: false }));
        assert_eq!(parse_broadcast("sghdebugon"), Ok(Command::SetDebug { on: true }));
        assert_eq!(parse_broadcast("sghdebug off"), Ok(Command::SetDebug { on: false }));
        assert_eq!(parse_broadcast("gettime"), Ok(Command::GetTime));
        assert_eq!(parse_broadcast("getip"), Ok(Command::GetIp));
        assert_eq!(parse_broadcast("getversion"), Ok(Command::GetVersion));
        assert_eq!(parse_broadcast("shutdown"), Ok(Command::Shutdown));
        assert_eq!(parse_broadcast("stophandler"), Ok(Command::StopHandler));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(
            parse_broadcast("bogus"),
            Err(ParseError::UnknownCommand("bogus".to_string()))
        );
        assert!(parse_broadcast("GETTIME").is_err());
        assert!(parse_broadcast("allmaybe").is_err());
        assert!(parse_broadcast("allxon").is_err());
        assert!(parse_broadcast("").is_err());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value(""), Ok(Value::Empty));
        assert_eq!(parse_value("on"), Ok(Value::Number(1.0)));
        assert_eq!(parse_value("1"), Ok(Value::Number(1.0)));
        assert_eq!(parse_value("off"), Ok(Value::Number(0.0)));
        assert_eq!(parse_value("0"), Ok(Value::Number(0.0)));
        assert_eq!(parse_value("2.5"), Ok(Value::Number(2.5)));
        assert!(parse_value("high").is_err());
        assert!(parse_value("NaN").is_err());

        assert_eq!(parse_value("on").unwrap().as_binary(), Some(1));
        assert_eq!(parse_value("2.5").unwrap().as_binary(), None);
        assert_eq!(Value::Empty.as_binary(), None);
    }

    #[test]
    fn test_parse_sensor_key() {
        assert_eq!(parse_sensor_key("pinJ4.7"), Some("J4.7"));
        assert_eq!(parse_sensor_key("pin"), None);
        assert_eq!(parse_sensor_key("ipaddress"), None);
    }
}
