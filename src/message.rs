//! Line protocol definitions
//!
//! Every line is either chat text or a control directive. Directives start
//! with [`DIRECTIVE_SENTINEL`]; the first whitespace-delimited token is the
//! keyword (matched case-insensitively), the rest are arguments.
//!
//! | Line                    | Parsed as                         |
//! |-------------------------|-----------------------------------|
//! | `!EXIT`                 | `Directive::Exit`                 |
//! | `!RENAME Bob`           | `Directive::Rename { name }`      |
//! | `!PRIVATE Bob hi there` | `Directive::Private { .. }`       |
//! | `hello`                 | `Inbound::Text("hello")`          |

/// First character of every control directive
pub const DIRECTIVE_SENTINEL: char = '!';

/// Terminating directive sent to a client before its socket is closed
pub const EXIT_DIRECTIVE: &str = "!EXIT";

/// Notice broadcast to every client when the server shuts down
pub const FAREWELL_NOTICE: &str =
    "Oh, looks like you were removed from the server! Have a nice day anyway.";

/// Prefix for router-assigned display names
pub const DEFAULT_NAME_PREFIX: &str = "Guest";

/// A parsed line received from a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Plain chat text, to be tagged and broadcast
    Text(String),
    /// Control directive
    Directive(Directive),
}

/// Control instructions embedded in the chat stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Leave the server
    Exit,
    /// Change own display name
    Rename { name: String },
    /// Send text to one named client
    Private { target: String, text: String },
    /// Known keyword with missing arguments
    Malformed { keyword: String },
    /// Keyword outside the vocabulary
    Unknown { keyword: String },
}

impl Inbound {
    /// Classify one received line
    pub fn parse(line: &str) -> Self {
        match line.strip_prefix(DIRECTIVE_SENTINEL) {
            Some(rest) => Inbound::Directive(Directive::parse(rest)),
            None => Inbound::Text(line.to_string()),
        }
    }
}

impl Directive {
    /// Parse the part of a directive line after the sentinel
    fn parse(body: &str) -> Self {
        let (keyword, args) = split_token(body);
        match keyword.to_ascii_uppercase().as_str() {
            "EXIT" => Directive::Exit,
            "RENAME" | "CHATNAME" => {
                let (name, _) = split_token(args);
                if name.is_empty() {
                    Directive::Malformed {
                        keyword: keyword.to_string(),
                    }
                } else {
                    Directive::Rename {
                        name: name.to_string(),
                    }
                }
            }
            "PRIVATE" => {
                let (target, text) = split_token(args);
                if target.is_empty() || text.is_empty() {
                    Directive::Malformed {
                        keyword: keyword.to_string(),
                    }
                } else {
                    Directive::Private {
                        target: target.to_string(),
                        text: text.to_string(),
                    }
                }
            }
            _ => Directive::Unknown {
                keyword: keyword.to_string(),
            },
        }
    }
}

/// Split off the first whitespace-delimited token; the remainder keeps its
/// inner spacing but loses surrounding whitespace.
fn split_token(input: &str) -> (&str, &str) {
    let input = input.trim();
    match input.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim()),
        None => (input, ""),
    }
}

/// Chat text tagged with the sender's display name
pub fn text_message(sender: &str, text: &str) -> String {
    format!("{}: {}", sender, text)
}

/// Directed message as seen by its recipient
pub fn private_message(sender: &str, text: &str) -> String {
    format!("{} (private): {}", sender, text)
}

/// Confirmation sent to a client after a rename
pub fn name_confirmation(name: &str) -> String {
    format!("Your chat name is: {}", name)
}

/// Router-assigned name for the n-th registered session
///
/// Contains no whitespace so it can be addressed by `PRIVATE`.
pub fn default_name(n: u64) -> String {
    format!("{}{}", DEFAULT_NAME_PREFIX, n)
}
