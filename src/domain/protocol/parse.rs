//! Line-oriented parsing for the Twitch IRC-with-tags dialect.
//!
//! Only the pieces this core needs: tag blocks, the `user!host PRIVMSG
//! #channel :text` form, and `PING`. Everything else is passed through as an
//! opaque line for the caller to log and ignore.

use std::collections::HashMap;

/// A received chat message, already stripped of protocol framing.
#[derive(Debug, Clone, PartialEq)]
pub struct PrivmsgEvent {
    /// Lowercased, `#`-stripped channel name.
    pub channel: String,
    pub username: String,
    pub display_name: Option<String>,
    pub text: String,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Ping { suffix: String },
    Privmsg(PrivmsgEvent),
    Other,
}

/// Parse the optional leading `@k=v;k=v ` tag block, returning the tags and
/// the remainder of the line. A trailing tag with no `=` is a boolean-style
/// flag stored with an empty value.
fn take_tags(line: &str) -> (HashMap<String, String>, &str) {
    let Some(rest) = line.strip_prefix('@') else {
        return (HashMap::new(), line);
    };
    let Some(space) = rest.find(' ') else {
        return (HashMap::new(), line);
    };
    let block = &rest[..space];
    let remainder = &rest[space + 1..];

    let tags = block
        .split(';')
        .filter(|p| !p.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect();

    (tags, remainder)
}

/// Parse `:user!host PRIVMSG #channel :text` (tags already stripped).
fn parse_privmsg_body(body: &str, tags: HashMap<String, String>) -> Option<PrivmsgEvent> {
    let prefix = body.strip_prefix(':')?;
    let (prefix, rest) = prefix.split_once(' ')?;
    let username = prefix.split('!').next().unwrap_or(prefix).to_lowercase();

    let rest = rest.strip_prefix("PRIVMSG ")?;
    let (target, text) = rest.split_once(" :")?;
    let channel = target.trim_start_matches('#').to_lowercase();
    if channel.is_empty() || username.is_empty() {
        return None;
    }

    let display_name = tags.get("display-name").filter(|s| !s.is_empty()).cloned();

    Some(PrivmsgEvent {
        channel,
        username,
        display_name,
        text: text.to_string(),
        tags,
    })
}

/// Parse one CR-LF-stripped protocol line.
pub fn parse_line(line: &str) -> Line {
    if let Some(suffix) = line.strip_prefix("PING ") {
        return Line::Ping {
            suffix: suffix.to_string(),
        };
    }
    if line.strip_prefix("PING").is_some() && line.len() == 4 {
        return Line::Ping {
            suffix: String::new(),
        };
    }

    let (tags, body) = take_tags(line);
    if body.contains("PRIVMSG") {
        if let Some(event) = parse_privmsg_body(body, tags) {
            return Line::Privmsg(event);
        }
    }
    Line::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagless_privmsg() {
        let line = ":someuser!someuser@someuser.tmi.twitch.tv PRIVMSG #somechannel :hello world";
        let Line::Privmsg(ev) = parse_line(line) else {
            panic!("expected privmsg");
        };
        assert_eq!(ev.channel, "somechannel");
        assert_eq!(ev.username, "someuser");
        assert_eq!(ev.text, "hello world");
        assert!(ev.display_name.is_none());
    }

    #[test]
    fn parses_tagged_privmsg_with_display_name() {
        let line = "@badge-info=;display-name=SomeUser;user-id=123 :someuser!someuser@someuser.tmi.twitch.tv PRIVMSG #somechannel :hi";
        let Line::Privmsg(ev) = parse_line(line) else {
            panic!("expected privmsg");
        };
        assert_eq!(ev.display_name.as_deref(), Some("SomeUser"));
        assert_eq!(ev.tags.get("user-id").map(String::as_str), Some("123"));
    }

    #[test]
    fn parses_boolean_style_tag() {
        let line = "@subscriber;display-name=X :u!u@u PRIVMSG #c :m";
        let Line::Privmsg(ev) = parse_line(line) else {
            panic!("expected privmsg");
        };
        assert_eq!(ev.tags.get("subscriber").map(String::as_str), Some(""));
    }

    #[test]
    fn parses_ping_preserving_suffix() {
        assert_eq!(
            parse_line("PING :tmi.twitch.tv"),
            Line::Ping {
                suffix: ":tmi.twitch.tv".to_string()
            }
        );
    }

    #[test]
    fn ignores_text_containing_privmsg_but_not_matching_shape() {
        assert_eq!(parse_line(":tmi.twitch.tv NOTICE * :PRIVMSG malformed"), Line::Other);
    }

    #[test]
    fn channel_is_lowercased_and_hash_stripped() {
        let line = ":u!u@u PRIVMSG #SomeChannel :Hi";
        let Line::Privmsg(ev) = parse_line(line) else {
            panic!("expected privmsg");
        };
        assert_eq!(ev.channel, "somechannel");
    }
}
