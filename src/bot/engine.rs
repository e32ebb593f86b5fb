//! Turns classified callbacks into ledger changes and chat replies.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::bot::ledger::{Key, Ledger};
use crate::groupme::{MemberDirectory, MessagePoster};
use crate::interpreter::{Event, Interpreter, Payload};

pub struct PointBot {
    interpreter: Interpreter,
    ledger: Ledger,
    poster: Arc<dyn MessagePoster>,
    members: Arc<dyn MemberDirectory>,
    /// Group searched when resolving nicknames to user ids.
    group_name: String,
    /// Held for the whole of each callback so events are handled one at a time.
    serial: Mutex<()>,
}

impl PointBot {
    pub fn new(
        bot_name: &str,
        group_name: impl Into<String>,
        ledger: Ledger,
        poster: Arc<dyn MessagePoster>,
        members: Arc<dyn MemberDirectory>,
    ) -> Self {
        info!("Point bot up and running as '{bot_name}'.");
        Self {
            interpreter: Interpreter::new(bot_name),
            ledger,
            poster,
            members,
            group_name: group_name.into(),
            serial: Mutex::new(()),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Handle one callback end to end. Returns the reply that was posted,
    /// if any.
    pub async fn handle_payload(&self, payload: &Payload) -> Option<String> {
        let _serial = self.serial.lock().await;

        let event = self.interpreter.classify(payload);
        if event == Event::Ignore {
            info!("No matches; ignoring.");
            return None;
        }

        let reply = self.respond(&event).await?;
        if let Err(e) = self.poster.post(&reply).await {
            warn!("Failed to post reply: {e}");
        }
        Some(reply)
    }

    /// Apply `event` to the ledger and compose the reply. `None` means
    /// nothing should be posted.
    pub async fn respond(&self, event: &Event) -> Option<String> {
        match event {
            Event::NewMember { name } => self.on_new_member(name).await,
            Event::NameChange { old_name, new_name } => self.on_name_change(old_name, new_name).await,
            Event::PointIncrement { target, reason } => {
                info!("MATCH: plusplus to {target}.");
                let points = self.ledger.add_point(&Key::ByName(target.clone())).ok()?;
                Some(points_reply(target, points, reason))
            }
            Event::PointDecrement { target, reason } => {
                info!("MATCH: minusminus to {target}.");
                let points = self.ledger.sub_point(&Key::ByName(target.clone())).ok()?;
                Some(points_reply(target, points, reason))
            }
            Event::Ignore => None,
        }
    }

    async fn on_new_member(&self, name: &str) -> Option<String> {
        info!("SYSTEM MATCH: new user {name} detected.");

        let user_id = match self.members.find_member(&self.group_name, name).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!("New member {name} not found in group {}", self.group_name);
                return None;
            }
            Err(e) => {
                warn!("Failed to look up new member {name}: {e}");
                return None;
            }
        };

        if !self.ledger.exists(user_id).ok()? {
            // A failed insert still leaves get_points below to create the row.
            let _ = self.ledger.add_player(user_id, name, 0);
        }

        let points = self.ledger.get_points(&Key::ById(user_id)).ok()?;
        Some(welcome_reply(name, points))
    }

    async fn on_name_change(&self, old_name: &str, new_name: &str) -> Option<String> {
        info!("SYSTEM MATCH: nickname change {old_name} -> {new_name} detected.");

        let resolved = match self.members.find_member(&self.group_name, new_name).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Failed to look up {new_name}, falling back to name: {e}");
                None
            }
        };

        // `rename_key` addresses the row before the rename, `lookup_key` after.
        let (rename_key, lookup_key) = match resolved {
            Some(user_id) => {
                if !self.ledger.exists(user_id).ok()? {
                    error!("DB: user {user_id} ({new_name}) not found in ledger but should have been.");
                    return None;
                }
                (Key::ById(user_id), Key::ById(user_id))
            }
            None => (
                Key::ByName(old_name.to_string()),
                Key::ByName(new_name.to_string()),
            ),
        };

        self.ledger.change_player_name(new_name, &rename_key).ok()?;
        let points = self.ledger.get_points(&lookup_key).ok()?;
        Some(rename_reply(new_name, points))
    }
}

pub fn points_reply(target: &str, points: i64, reason: &str) -> String {
    if reason.is_empty() {
        format!("{target} now has {points} point(s).")
    } else {
        format!("{target} now has {points} point(s), most recently for {reason}.")
    }
}

pub fn welcome_reply(name: &str, points: i64) -> String {
    format!("Welcome {name}. You have {points} points.")
}

pub fn rename_reply(new_name: &str, points: i64) -> String {
    format!("Don't worry {new_name}, you still have your {points} point(s).")
}
