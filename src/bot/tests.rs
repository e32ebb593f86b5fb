//! End-to-end tests for the point bot: payload in, ledger change and reply out.

use super::*;
use crate::bot::ledger::Key;
use crate::groupme::{self, MemberDirectory, MessagePoster};
use crate::interpreter::{Event, Payload};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Records posts and answers member lookups from a fixed table.
#[derive(Default)]
struct FakeChat {
    posted: Mutex<Vec<String>>,
    members: HashMap<String, i64>,
    fail_lookups: bool,
    fail_posts: bool,
}

impl FakeChat {
    fn with_members(members: &[(&str, i64)]) -> Self {
        Self {
            members: members.iter().map(|(n, id)| (n.to_string(), *id)).collect(),
            ..Default::default()
        }
    }

    fn posted(&self) -> Vec<String> {
        self.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagePoster for FakeChat {
    async fn post(&self, text: &str) -> Result<(), groupme::Error> {
        if self.fail_posts {
            return Err(groupme::Error::Http("connection refused".into()));
        }
        self.posted.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

#[async_trait]
impl MemberDirectory for FakeChat {
    async fn find_member(&self, group_name: &str, nickname: &str) -> Result<Option<i64>, groupme::Error> {
        assert_eq!(group_name, "bot_Test");
        if self.fail_lookups {
            return Err(groupme::Error::Api("500 Internal Server Error".into()));
        }
        Ok(self.members.get(nickname).copied())
    }
}

fn bot_with(chat: FakeChat, ledger: Ledger) -> (PointBot, Arc<FakeChat>) {
    let chat = Arc::new(chat);
    let bot = PointBot::new("ripbot", "bot_Test", ledger, chat.clone(), chat.clone());
    (bot, chat)
}

fn user(name: &str, text: &str) -> Payload {
    Payload {
        name: Some(name.to_string()),
        text: Some(text.to_string()),
        system: Some(false),
    }
}

fn system(text: &str) -> Payload {
    Payload {
        name: Some("GroupMe".to_string()),
        text: Some(text.to_string()),
        system: Some(true),
    }
}

// =============================================================================
// POINT CHANGES
// =============================================================================

mod points {
    use super::*;

    #[tokio::test]
    async fn test_increment_with_reason() {
        let (bot, chat) = bot_with(FakeChat::default(), Ledger::in_memory());

        let reply = bot.handle_payload(&user("alice", "@bob ++ for winning")).await;

        assert_eq!(reply.as_deref(), Some("bob now has 1 point(s), most recently for winning."));
        assert_eq!(chat.posted(), vec!["bob now has 1 point(s), most recently for winning."]);
    }

    #[tokio::test]
    async fn test_increment_accumulates() {
        let (bot, _chat) = bot_with(FakeChat::default(), Ledger::in_memory());

        bot.handle_payload(&user("alice", "bob ++")).await;
        let reply = bot.handle_payload(&user("carol", "bob ++")).await;

        assert_eq!(reply.as_deref(), Some("bob now has 2 point(s)."));
    }

    #[tokio::test]
    async fn test_decrement_goes_negative() {
        let (bot, chat) = bot_with(FakeChat::default(), Ledger::in_memory());

        for _ in 0..3 {
            bot.handle_payload(&user("alice", "dave -- for spam")).await;
        }

        assert_eq!(
            chat.posted(),
            vec![
                "dave now has -1 point(s), most recently for spam.",
                "dave now has -2 point(s), most recently for spam.",
                "dave now has -3 point(s), most recently for spam.",
            ]
        );
    }

    #[tokio::test]
    async fn test_own_messages_do_nothing() {
        let (bot, chat) = bot_with(FakeChat::default(), Ledger::in_memory());

        assert!(bot.handle_payload(&user("ripbot", "bob ++")).await.is_none());
        assert!(chat.posted().is_empty());
        assert_eq!(bot.ledger().player_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unmatched_text_does_nothing() {
        let (bot, chat) = bot_with(FakeChat::default(), Ledger::in_memory());

        assert!(bot.handle_payload(&user("alice", "lunch anyone?")).await.is_none());
        assert!(chat.posted().is_empty());
    }

    #[tokio::test]
    async fn test_store_unavailable_posts_nothing() {
        let (bot, chat) = bot_with(FakeChat::default(), Ledger::unavailable());

        assert!(bot.handle_payload(&user("alice", "bob ++")).await.is_none());
        assert!(chat.posted().is_empty());

        // The next callback is still handled.
        assert!(bot.handle_payload(&user("alice", "bob --")).await.is_none());
    }

    #[tokio::test]
    async fn test_post_failure_still_counts() {
        let chat = FakeChat { fail_posts: true, ..Default::default() };
        let (bot, _chat) = bot_with(chat, Ledger::in_memory());

        let reply = bot.handle_payload(&user("alice", "bob ++")).await;

        assert_eq!(reply.as_deref(), Some("bob now has 1 point(s)."));
        assert_eq!(bot.ledger().get_points(&Key::ByName("bob".into())).unwrap(), 1);
    }
}

// =============================================================================
// NEW MEMBERS
// =============================================================================

mod new_member {
    use super::*;

    #[tokio::test]
    async fn test_welcome_creates_row_under_user_id() {
        let (bot, chat) = bot_with(FakeChat::with_members(&[("Bob", 5551234)]), Ledger::in_memory());

        let reply = bot.handle_payload(&system("Alice added Bob to the group.")).await;

        assert_eq!(reply.as_deref(), Some("Welcome Bob. You have 0 points."));
        assert_eq!(chat.posted().len(), 1);
        let player = bot.ledger().player(&Key::ById(5551234)).unwrap().unwrap();
        assert_eq!(player.name, "Bob");
        assert_eq!(player.points, 0);
    }

    #[tokio::test]
    async fn test_rejoining_member_keeps_points() {
        let ledger = Ledger::in_memory();
        ledger.add_player(5551234, "Bob", 4).unwrap();
        let (bot, _chat) = bot_with(FakeChat::with_members(&[("Bob", 5551234)]), ledger);

        let reply = bot.handle_payload(&system("Alice added Bob to the group")).await;

        assert_eq!(reply.as_deref(), Some("Welcome Bob. You have 4 points."));
        assert_eq!(bot.ledger().player_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unresolved_member_is_skipped() {
        let (bot, chat) = bot_with(FakeChat::default(), Ledger::in_memory());

        assert!(bot.handle_payload(&system("Alice added Bob to the group")).await.is_none());
        assert!(chat.posted().is_empty());
        assert_eq!(bot.ledger().player_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_skipped() {
        let chat = FakeChat { fail_lookups: true, ..FakeChat::with_members(&[("Bob", 1)]) };
        let (bot, chat) = bot_with(chat, Ledger::in_memory());

        assert!(bot.handle_payload(&system("Alice added Bob to the group")).await.is_none());
        assert!(chat.posted().is_empty());
    }
}

// =============================================================================
// NAME CHANGES
// =============================================================================

mod name_change {
    use super::*;

    #[tokio::test]
    async fn test_fallback_to_old_name() {
        let ledger = Ledger::in_memory();
        for _ in 0..5 {
            ledger.add_point(&Key::ByName("carol".into())).unwrap();
        }
        let (bot, chat) = bot_with(FakeChat::default(), ledger);

        let reply = bot.handle_payload(&system("carol changed name to caroline")).await;

        assert_eq!(reply.as_deref(), Some("Don't worry caroline, you still have your 5 point(s)."));
        assert_eq!(chat.posted().len(), 1);
        assert!(bot.ledger().player(&Key::ByName("carol".into())).unwrap().is_none());
        assert_eq!(bot.ledger().get_points(&Key::ByName("caroline".into())).unwrap(), 5);
    }

    #[tokio::test]
    async fn test_rename_by_user_id() {
        let ledger = Ledger::in_memory();
        ledger.add_player(777, "carol", 3).unwrap();
        let (bot, _chat) = bot_with(FakeChat::with_members(&[("caroline", 777)]), ledger);

        let reply = bot.handle_payload(&system("carol changed name to caroline")).await;

        assert_eq!(reply.as_deref(), Some("Don't worry caroline, you still have your 3 point(s)."));
        let player = bot.ledger().player(&Key::ById(777)).unwrap().unwrap();
        assert_eq!(player.name, "caroline");
    }

    #[tokio::test]
    async fn test_resolved_but_missing_from_ledger_is_dropped() {
        let (bot, chat) = bot_with(FakeChat::with_members(&[("caroline", 777)]), Ledger::in_memory());

        assert!(bot.handle_payload(&system("carol changed name to caroline")).await.is_none());
        assert!(chat.posted().is_empty());
        assert!(!bot.ledger().exists(777).unwrap());
    }

    #[tokio::test]
    async fn test_lookup_failure_falls_back_to_name() {
        let ledger = Ledger::in_memory();
        ledger.add_player(777, "carol", 2).unwrap();
        let chat = FakeChat { fail_lookups: true, ..Default::default() };
        let (bot, _chat) = bot_with(chat, ledger);

        let reply = bot.handle_payload(&system("carol changed name to caroline")).await;

        assert_eq!(reply.as_deref(), Some("Don't worry caroline, you still have your 2 point(s)."));
    }

    #[tokio::test]
    async fn test_points_follow_new_name() {
        let (bot, _chat) = bot_with(FakeChat::default(), Ledger::in_memory());
        bot.handle_payload(&user("alice", "carol ++")).await;
        bot.handle_payload(&user("alice", "carol ++")).await;

        bot.handle_payload(&system("carol changed name to caroline")).await;
        let reply = bot.handle_payload(&user("alice", "caroline ++")).await;

        assert_eq!(reply.as_deref(), Some("caroline now has 3 point(s)."));
    }
}

// =============================================================================
// REPLY TEXT
// =============================================================================

mod replies {
    use super::*;
    use crate::bot::engine::{points_reply, rename_reply, welcome_reply};

    #[test]
    fn test_points_reply() {
        assert_eq!(points_reply("bob", 1, ""), "bob now has 1 point(s).");
        assert_eq!(points_reply("bob", -2, "lying"), "bob now has -2 point(s), most recently for lying.");
    }

    #[test]
    fn test_welcome_and_rename_replies() {
        assert_eq!(welcome_reply("Bob", 0), "Welcome Bob. You have 0 points.");
        assert_eq!(rename_reply("caroline", 5), "Don't worry caroline, you still have your 5 point(s).");
    }

    #[tokio::test]
    async fn test_respond_ignore_is_none() {
        let (bot, _chat) = bot_with(FakeChat::default(), Ledger::in_memory());
        assert!(bot.respond(&Event::Ignore).await.is_none());
    }
}
