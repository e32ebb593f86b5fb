//! Classifies inbound GroupMe callbacks into point and membership events.

use regex::Regex;
use serde::Deserialize;

/// Callback body posted by GroupMe. Only the fields the bot reads are kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub system: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Someone was added to the group.
    NewMember { name: String },
    /// A member changed their nickname.
    NameChange { old_name: String, new_name: String },
    PointIncrement { target: String, reason: String },
    PointDecrement { target: String, reason: String },
    Ignore,
}

pub struct Interpreter {
    bot_name: String,
    new_member: Regex,
    name_change: Regex,
    plus_plus: Regex,
    minus_minus: Regex,
}

impl Interpreter {
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
            new_member: Regex::new(r"^(.*?)\s+added\s+(.*?)\s+to the group").unwrap(),
            name_change: Regex::new(r"^(.*?)\s+changed name to\s+(.*)").unwrap(),
            plus_plus: Regex::new(r"^(.*?) \+\+(.*)").unwrap(),
            minus_minus: Regex::new(r"^(.*?) --(.*)").unwrap(),
        }
    }

    pub fn classify(&self, payload: &Payload) -> Event {
        let Some(text) = payload.text.as_deref() else {
            return Event::Ignore;
        };

        if payload.system.unwrap_or(false) {
            return self.classify_system(text);
        }

        match payload.name.as_deref() {
            Some(name) if name != self.bot_name => self.classify_user(text),
            _ => Event::Ignore,
        }
    }

    fn classify_system(&self, text: &str) -> Event {
        if let Some(caps) = self.new_member.captures(text) {
            let name = caps[2].trim();
            if !name.is_empty() {
                return Event::NewMember { name: name.to_string() };
            }
        }

        if let Some(caps) = self.name_change.captures(text) {
            let old_name = caps[1].trim();
            let new_name = caps[2].trim();
            if !old_name.is_empty() && !new_name.is_empty() {
                return Event::NameChange {
                    old_name: old_name.to_string(),
                    new_name: new_name.to_string(),
                };
            }
        }

        Event::Ignore
    }

    fn classify_user(&self, text: &str) -> Event {
        if let Some(caps) = self.plus_plus.captures(text) {
            return match clean_target(&caps[1]) {
                Some(target) => Event::PointIncrement {
                    target,
                    reason: clean_reason(&caps[2], &[" for ", " because "]),
                },
                None => Event::Ignore,
            };
        }

        if let Some(caps) = self.minus_minus.captures(text) {
            return match clean_target(&caps[1]) {
                Some(target) => Event::PointDecrement {
                    target,
                    reason: clean_reason(&caps[2], &[" for "]),
                },
                None => Event::Ignore,
            };
        }

        Event::Ignore
    }
}

/// Trim and drop a leading `@` mention marker. `None` when nothing is left.
fn clean_target(raw: &str) -> Option<String> {
    let target = raw.trim();
    let target = target.strip_prefix('@').unwrap_or(target).trim();
    if target.is_empty() {
        None
    } else {
        Some(target.to_string())
    }
}

/// Strip at most one of `prefixes` (first match wins), then trim.
fn clean_reason(raw: &str, prefixes: &[&str]) -> String {
    let stripped = prefixes
        .iter()
        .find_map(|prefix| raw.strip_prefix(prefix))
        .unwrap_or(raw);
    stripped.trim().to_string()
}
