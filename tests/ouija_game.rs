use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use ouijabot::bot::ouija::OuijaGame;
use ouijabot::bot::{BotCommand, GameBot};
use ouijabot::config::{BotConfiguration, OuijaConfig};
use ouijabot::platforms::memory::{InMemoryPlatform, PlatformAction};
use ouijabot::platforms::DiscussionPlatform;
use ouijabot::types::{Comment, Post, PostFlair};

fn t(minutes: i64) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z").unwrap().with_timezone(&Utc) + Duration::minutes(minutes)
}

fn question(id: &str, author: &str, comments: Vec<Comment>) -> Post {
    Post {
        id: id.to_string(),
        title: "What is my name?".to_string(),
        author: Some(author.to_string()),
        body: String::new(),
        flair: None,
        created: t(0),
        stickied: false,
        distinguished: false,
        permalink: format!("/r/test/comments/{}", id),
        comments,
    }
}

fn letter(id: &str, author: &str, body: &str, minute: i64) -> Comment {
    Comment::new(id, Some(author), body, t(minute))
}

fn setup(posts: Vec<Post>) -> (Arc<InMemoryPlatform>, OuijaGame) {
    let platform = Arc::new(InMemoryPlatform::new("ouijabot", t(0)));
    for post in posts {
        platform.add_post(post);
    }
    let game = OuijaGame::new(platform.clone(), OuijaConfig::default(), "ouijabot".to_string()).unwrap();
    (platform, game)
}

#[test_log::test(tokio::test)]
async fn test_answer_is_flaired_and_cheaters_removed() {
    let tree = vec![
        letter("a", "u1", "a", 1)
            .with_reply(letter("b", "u2", "B", 2).with_reply(letter("c", "u3", "goodbye", 3).with_score(7)))
            .with_reply(letter("self", "u1", "X", 2).with_reply(letter("below", "u4", "Y", 3))),
        letter("op", "asker", "Z", 1),
        letter("noise", "u5", "hello", 1),
    ];
    let (platform, game) = setup(vec![question("p", "asker", tree)]);

    let report = game.check(t(120)).await.unwrap();
    assert_eq!(report.posts_walked, 1);
    assert_eq!(report.answered, 1);
    assert_eq!(report.failed_actions, 0);

    let post = platform.post("p").unwrap();
    assert_eq!(post.flair, Some(PostFlair { text: "Ouija says: AB".to_string(), css_class: Some("answered".to_string()) }));

    for id in ["self", "below", "op", "noise"] {
        assert!(platform.comment(id).unwrap().removed, "{} should be removed", id);
    }
    for id in ["a", "b", "c"] {
        assert!(!platform.comment(id).unwrap().removed, "{} should stay", id);
    }

    // Explanations for the two thread removals only.
    let explained: Vec<String> = platform.replies().into_iter().map(|(parent, _)| parent).collect();
    assert_eq!(explained, vec!["self", "op"]);

    let messages: Vec<PlatformAction> = platform
        .actions()
        .into_iter()
        .filter(|a| matches!(a, PlatformAction::Messaged { .. }))
        .collect();
    assert_eq!(messages.len(), 1);
}

#[tokio::test]
async fn test_answered_post_is_left_alone() {
    let tree = vec![letter("a", "u1", "a", 1).with_reply(letter("c", "u3", "Addio", 3).with_score(9))];
    let (platform, game) = setup(vec![question("p", "asker", tree)]);

    game.check(t(120)).await.unwrap();
    platform.clear_actions();

    platform.add_comment("p", letter("late", "asker", "Q", 200)).unwrap();
    let report = game.check(t(240)).await.unwrap();
    assert_eq!(report.posts_walked, 0);
    assert!(platform.actions().is_empty());
}

#[tokio::test]
async fn test_unanswered_flair_set_once() {
    let (platform, game) = setup(vec![question("p", "asker", vec![letter("a", "u1", "a", 1)])]);

    game.check(t(10)).await.unwrap();
    assert_eq!(platform.post("p").unwrap().flair_text(), Some("Unanswered"));

    platform.clear_actions();
    let report = game.check(t(20)).await.unwrap();
    assert_eq!(report.posts_walked, 1);
    assert!(platform.actions().is_empty());
}

#[tokio::test]
async fn test_mod_and_bot_posts_are_skipped() {
    let mut pinned = question("pinned", "moderator", vec![letter("x", "moderator", "hello", 1)]);
    pinned.stickied = true;
    let own = question("own", "ouijabot", vec![letter("y", "u1", "hello", 1)]);
    let (platform, game) = setup(vec![pinned, own]);

    let report = game.check(t(10)).await.unwrap();
    assert_eq!(report.posts_walked, 0);
    assert_eq!(platform.post("pinned").unwrap().flair_text(), Some("Ouija"));
    assert!(platform.post("own").unwrap().flair.is_none());
    assert!(platform.removals().is_empty());
}

#[tokio::test]
async fn test_blocked_messages_do_not_stop_flair() {
    let tree = vec![letter("a", "u1", "a", 1).with_reply(letter("c", "u3", "Goodbye", 3).with_score(9))];
    let (platform, game) = setup(vec![question("p", "asker", tree)]);
    platform.fail_messages(true);

    let report = game.check(t(120)).await.unwrap();
    assert_eq!(report.failed_actions, 1);
    assert_eq!(platform.post("p").unwrap().flair_text(), Some("Ouija says: A"));
}

const AUTOMOD: &str = "type: submission\nauthor:\n    name: [placeholder]\n    # DummyUtente9510\naction: remove";

fn answered(id: &str) -> Post {
    let mut post = question(id, "asker", Vec::new());
    post.flair = Some(PostFlair { text: "Ouija says: YES".to_string(), css_class: Some("answered".to_string()) });
    post
}

#[tokio::test]
async fn test_close_announces_open_questions() {
    let (platform, game) = setup(vec![question("p", "asker", Vec::new()), answered("q")]);
    platform.set_document("config/automoderator", AUTOMOD, t(0));

    let closing = game.close(t(0)).await.unwrap();
    assert_eq!(closing.title, "We reopen on 15 March");
    assert!(closing.body.contains("* [What is my name?](/r/test/comments/p)"));
    assert!(!closing.body.contains("/r/test/comments/q"));

    let rules = platform.document("config/automoderator").unwrap();
    assert!(rules.contains("    ~name: [placeholder]"));

    let closing = platform.post(&closing.id).unwrap();
    assert!(closing.stickied);
    assert!(closing.distinguished);
    assert_eq!(closing.comments.len(), 1);
    assert!(closing.comments[0].distinguished);
    assert!(closing.comments[0].stickied);
}

#[test_log::test(tokio::test)]
async fn test_open_notifies_subscribers_once() {
    let (platform, game) = setup(vec![question("p", "asker", Vec::new())]);
    platform.set_document("config/automoderator", AUTOMOD, t(0));
    let closing = game.close(t(0)).await.unwrap();
    let subscription = platform.post(&closing.id).unwrap().comments[0].id.clone();
    platform.add_comment(&subscription, letter("s1", "u1", "me!", 10)).unwrap();
    platform.add_comment(&subscription, letter("s2", "u2", "me too", 11)).unwrap();
    platform.add_comment(&closing.id, letter("chat", "u3", "nice round", 12)).unwrap();
    platform.clear_actions();

    assert_eq!(game.open().await.unwrap(), 2);
    assert_eq!(platform.document("config/automoderator").unwrap(), AUTOMOD);
    assert!(!platform.post(&closing.id).unwrap().stickied);
    let mut notified: Vec<String> = platform.replies().into_iter().map(|(parent, _)| parent).collect();
    notified.sort();
    assert_eq!(notified, vec!["s1", "s2"]);

    platform.clear_actions();
    assert_eq!(game.open().await.unwrap(), 0);
    assert!(platform.replies().is_empty());
    assert!(!platform.actions().iter().any(|a| matches!(a, PlatformAction::DocumentEdited { .. })));
}

#[tokio::test]
async fn test_missing_automod_rule_alerts_moderators() {
    let (platform, game) = setup(Vec::new());
    platform.set_document("config/automoderator", "type: comment", t(0));

    game.close(t(0)).await.unwrap();
    let actions = platform.actions();
    assert!(actions.contains(&PlatformAction::ModeratorsMessaged { subject: "Closing failed".to_string() }));
    assert!(actions.iter().any(|a| matches!(a, PlatformAction::Submitted { .. })));
    assert_eq!(platform.document("config/automoderator").unwrap(), "type: comment");
}

#[tokio::test]
async fn test_bot_runs_close_command() {
    let platform = Arc::new(InMemoryPlatform::new("ouijabot", t(0)));
    platform.set_document("config/automoderator", AUTOMOD, t(0));
    let bot = GameBot::new(platform.clone(), BotConfiguration::default());

    bot.run(BotCommand::OuijaClose, t(0)).await.unwrap();
    assert_eq!(BotCommand::OuijaClose.to_string(), "ouija-close");
    assert_eq!(platform.fetch_new_posts(10).await.unwrap().len(), 1);
}
