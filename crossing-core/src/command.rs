/*
 * The serial command vocabulary: newline-terminated ASCII tokens that
 * name a color for the RGB indicator or ask for a tone. Parsing and the
 * reply texts live here so the interpreter is the same over any byte
 * stream; the transport and the pins stay with the caller.
 */

use core::fmt::Write;

use enum_ordinalize::Ordinalize;
use heapless::String;

/// Longest reply the interpreter produces (the vocabulary listing).
pub const MAX_RESPONSE: usize = 96;

#[derive(Ordinalize, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Red,
    Green,
    Blue,
    Yellow,
    Purple,
    Cyan,
    Off,
    Beep,
}

impl Command {
    pub const fn name(self) -> &'static str {
        match self {
            Command::Red => "red",
            Command::Green => "green",
            Command::Blue => "blue",
            Command::Yellow => "yellow",
            Command::Purple => "purple",
            Command::Cyan => "cyan",
            Command::Off => "off",
            Command::Beep => "beep",
        }
    }

    /// Match one received line against the vocabulary. The line may
    /// still carry its CR/LF terminator; anything else must match a
    /// command name exactly.
    pub fn parse(line: &str) -> Option<Command> {
        let token = line.trim_end_matches(['\r', '\n']);
        Command::VARIANTS.into_iter().find(|cmd| cmd.name() == token).copied()
    }

    /// The three-channel level combination this command asks of the RGB
    /// indicator, or `None` for the tone command.
    pub const fn rgb(self) -> Option<(bool, bool, bool)> {
        match self {
            Command::Red => Some((true, false, false)),
            Command::Green => Some((false, true, false)),
            Command::Blue => Some((false, false, true)),
            Command::Yellow => Some((true, true, false)),
            Command::Purple => Some((true, false, true)),
            Command::Cyan => Some((false, true, true)),
            Command::Off => Some((false, false, false)),
            Command::Beep => None,
        }
    }
}

/// The reply for input that matches nothing: name the problem and list
/// every valid token. No state changes on the way here.
pub fn unknown_response() -> String<MAX_RESPONSE> {
    let mut reply = String::new();
    let _ = reply.push_str("invalid command. use:");
    for (i, cmd) in Command::VARIANTS.into_iter().enumerate() {
        let _ = write!(reply, "{}{}", if i == 0 { " " } else { ", " }, cmd.name());
    }
    reply
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_name_parses_back() {
        for &cmd in Command::VARIANTS {
            assert_eq!(Command::parse(cmd.name()), Some(cmd));
        }
    }

    #[test]
    fn line_terminators_are_stripped() {
        assert_eq!(Command::parse("red\n"), Some(Command::Red));
        assert_eq!(Command::parse("red\r\n"), Some(Command::Red));
        assert_eq!(Command::parse("beep\r"), Some(Command::Beep));
    }

    #[test]
    fn near_misses_are_rejected() {
        assert_eq!(Command::parse("RED"), None);
        assert_eq!(Command::parse("reddish"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn unknown_reply_lists_the_whole_vocabulary() {
        let reply = unknown_response();
        assert!(reply.starts_with("invalid command."));
        for cmd in Command::VARIANTS {
            assert!(reply.contains(cmd.name()));
        }
    }

    #[test]
    fn color_table_covers_all_eight_combinations() {
        // Each color command claims a distinct combination of the
        // three binary channels; only the tone command has no levels.
        let mut seen: std::vec::Vec<(bool, bool, bool)> = std::vec::Vec::new();
        for &cmd in Command::VARIANTS {
            match cmd.rgb() {
                Some(levels) => {
                    assert!(!seen.contains(&levels));
                    seen.push(levels);
                }
                None => assert_eq!(cmd, Command::Beep),
            }
        }
        assert_eq!(seen.len(), 7);
    }
}
