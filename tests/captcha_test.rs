//! Captcha challenge lifecycle tests

mod helpers;

use std::sync::Arc;
use std::time::Duration;
use helpers::*;
use teloxide::types::{MessageId, UserId};

use GroupWarden::models::{CaptchaPolicy, CaseKey, ContentKind};
use GroupWarden::moderation::{captcha, CaptchaModule, Module, Outcome, Verdict};
use GroupWarden::services::{PermissionSet, RecordingTransport};
use GroupWarden::state::PolicyStore;

const NEWBIE: u64 = 7;

fn key() -> CaseKey {
    CaseKey::new(UserId(NEWBIE), CHAT)
}

fn captcha_with(dir: &std::path::Path, policy: CaptchaPolicy) -> (CaptchaModule, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::new());
    let store = PolicyStore::with_policy(dir.join("captcha.json"), captcha::NAME, policy);
    (CaptchaModule::new(store, transport.clone()), transport)
}

async fn expected_answer(module: &CaptchaModule) -> String {
    module.cases().find(key()).await.expect("No pending challenge").puzzle.answer
}

#[tokio::test]
async fn test_three_wrong_answers_kick_the_member() {
    let dir = tempfile::tempdir().unwrap();
    let (module, transport) = captcha_with(dir.path(), CaptchaPolicy::default());

    let verdict = module.handle_event(&join(1, vec![member(NEWBIE, "Newbie")])).await;
    assert_eq!(verdict, Verdict::Continue);
    let answer = expected_answer(&module).await;

    assert_eq!(module.grade(&text(NEWBIE, 2, "wrong"), "wrong").await, Outcome::Rejected(2));
    assert_eq!(module.grade(&text(NEWBIE, 3, "wrong"), "wrong").await, Outcome::Rejected(1));
    assert_eq!(module.grade(&text(NEWBIE, 4, "wrong"), "wrong").await, Outcome::Exhausted);

    let kicks = transport.kicks().await;
    assert_eq!(kicks.len(), 1);
    assert_eq!(kicks[0].1, UserId(NEWBIE));

    // Prompt, two "incorrect" replies and all three answers are cleaned up
    let deleted = transport.deleted().await;
    for id in [2, 3, 4] {
        assert!(deleted.contains(&MessageId(id)));
    }
    assert_eq!(deleted.len(), 6);

    // A late correct answer finds nothing to resolve
    assert_eq!(module.grade(&text(NEWBIE, 5, &answer), &answer).await, Outcome::NoChallenge);
    assert_eq!(module.cases().slot_count(), 0);
}

#[tokio::test]
async fn test_correct_answer_restores_permissions_and_stops_timer() {
    let dir = tempfile::tempdir().unwrap();
    let policy = CaptchaPolicy { challenge_timeout: 300, ..CaptchaPolicy::default() };
    let (module, transport) = captcha_with(dir.path(), policy);

    assert!(module.issue(CHAT, &member(NEWBIE, "Newbie")).await);
    let answer = expected_answer(&module).await;
    assert_eq!(module.grade(&text(NEWBIE, 2, &answer), &answer).await, Outcome::Accepted);

    let restrictions = transport.restrictions().await;
    assert_eq!(restrictions.len(), 2);
    assert_eq!(restrictions[0].1, PermissionSet::Unverified);
    assert_eq!(restrictions[1].1, PermissionSet::Verified);
    assert!(transport.sent_texts().await.iter().any(|t| t.starts_with("Thank you")));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(transport.kicks().await.is_empty());
    assert!(!module.cases().contains(key()).await);
}

#[tokio::test]
async fn test_regeneration_keeps_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let policy = CaptchaPolicy { max_regens: 1, ..CaptchaPolicy::default() };
    let (module, transport) = captcha_with(dir.path(), policy);

    module.issue(CHAT, &member(NEWBIE, "Newbie")).await;
    assert_eq!(module.grade(&text(NEWBIE, 2, "NEW"), "NEW").await, Outcome::Regenerated(0));
    assert_eq!(transport.sent_texts().await.len(), 2);

    // Out of regenerations: the keyword counts as a wrong answer
    assert_eq!(module.grade(&text(NEWBIE, 3, "new"), "new").await, Outcome::Rejected(2));

    let case = module.cases().find(key()).await.unwrap();
    assert_eq!(case.regens_left, 0);
    assert_eq!(case.attempts_left, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_wrong_answers_kick_once() {
    let dir = tempfile::tempdir().unwrap();
    let (module, transport) = captcha_with(dir.path(), CaptchaPolicy::default());
    transport.set_latency(Duration::from_millis(2));
    module.issue(CHAT, &member(NEWBIE, "Newbie")).await;

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let module = module.clone();
            tokio::spawn(async move { module.grade(&text(NEWBIE, 100 + i, "wrong"), "wrong").await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for task in tasks {
        outcomes.push(task.await.unwrap());
    }

    assert_eq!(outcomes.iter().filter(|o| **o == Outcome::Exhausted).count(), 1);
    assert_eq!(outcomes.iter().filter(|o| matches!(o, Outcome::Rejected(_))).count(), 2);
    assert_eq!(outcomes.iter().filter(|o| **o == Outcome::NoChallenge).count(), 7);
    assert_eq!(transport.kicks().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_challenge_expires() {
    let dir = tempfile::tempdir().unwrap();
    let policy = CaptchaPolicy { challenge_timeout: 600, kick_cooldown: 900, ..CaptchaPolicy::default() };
    let (module, transport) = captcha_with(dir.path(), policy);

    module.issue(CHAT, &member(NEWBIE, "Newbie")).await;

    tokio::time::sleep(Duration::from_secs(599)).await;
    assert!(transport.kicks().await.is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    let kicks = transport.kicks().await;
    assert_eq!(kicks.len(), 1);
    assert_eq!(kicks[0].1, UserId(NEWBIE));
    assert!(!module.cases().contains(key()).await);
    assert_eq!(transport.deleted().await.len(), 1);
}

#[tokio::test]
async fn test_expiry_and_answer_race_resolves_once() {
    let dir = tempfile::tempdir().unwrap();
    let (module, transport) = captcha_with(dir.path(), CaptchaPolicy::default());
    module.issue(CHAT, &member(NEWBIE, "Newbie")).await;

    let case = module.cases().find(key()).await.unwrap();
    let event = text(NEWBIE, 2, &case.puzzle.answer);
    let (expired, outcome) = tokio::join!(
        module.expire(key(), case.id),
        module.grade(&event, &case.puzzle.answer)
    );

    match outcome {
        Outcome::Accepted => {
            assert!(!expired);
            assert!(transport.kicks().await.is_empty());
        }
        Outcome::NoChallenge => {
            assert!(expired);
            assert_eq!(transport.kicks().await.len(), 1);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(module.cases().slot_count(), 0);
}

#[tokio::test]
async fn test_stale_timer_does_not_touch_a_new_challenge() {
    let dir = tempfile::tempdir().unwrap();
    let (module, transport) = captcha_with(dir.path(), CaptchaPolicy::default());

    module.issue(CHAT, &member(NEWBIE, "Newbie")).await;
    let stale = module.cases().find(key()).await.unwrap().id;
    assert!(module.abandon(key()).await);
    module.issue(CHAT, &member(NEWBIE, "Newbie")).await;

    assert!(!module.expire(key(), stale).await);
    assert!(module.cases().contains(key()).await);
    assert!(transport.kicks().await.is_empty());
}

#[tokio::test]
async fn test_leaving_abandons_challenge() {
    let dir = tempfile::tempdir().unwrap();
    let (module, transport) = captcha_with(dir.path(), CaptchaPolicy::default());

    module.handle_event(&join(1, vec![member(NEWBIE, "Newbie")])).await;
    module.handle_event(&left(2, member(NEWBIE, "Newbie"))).await;

    assert!(!module.cases().contains(key()).await);
    assert!(transport.kicks().await.is_empty());
    assert_eq!(transport.deleted().await.len(), 1);
}

#[tokio::test]
async fn test_strict_mode_deletes_media_from_challenged_members() {
    let dir = tempfile::tempdir().unwrap();
    let (module, transport) = captcha_with(dir.path(), CaptchaPolicy::default());
    module.issue(CHAT, &member(NEWBIE, "Newbie")).await;

    let verdict = module.handle_event(&media(NEWBIE, 9, ContentKind::Sticker)).await;
    assert_eq!(verdict, Verdict::Handled);
    assert_eq!(transport.deleted().await, vec![MessageId(9)]);

    // Members without a challenge are left alone
    let verdict = module.handle_event(&media(8, 10, ContentKind::Sticker)).await;
    assert_eq!(verdict, Verdict::Continue);
}

#[tokio::test]
async fn test_strict_mode_deletes_commands_from_challenged_members() {
    let ctx = TestContext::new(&["captcha"]).await;
    ctx.moderator.handle(&join(1, vec![member(NEWBIE, "Newbie")])).await;
    let prompts = ctx.transport.sent_texts().await.len();

    ctx.moderator
        .handle(&command(UserId(NEWBIE), 2, "/buy cheap crypto at scam.example"))
        .await;

    assert!(ctx.transport.deleted().await.contains(&MessageId(2)));
    assert_eq!(ctx.transport.sent_texts().await.len(), prompts);
    assert!(ctx.transport.kicks().await.is_empty());
}

#[tokio::test]
async fn test_lenient_mode_lets_commands_through() {
    let dir = tempfile::tempdir().unwrap();
    let policy = CaptchaPolicy { strict: false, ..CaptchaPolicy::default() };
    let (module, transport) = captcha_with(dir.path(), policy);
    module.issue(CHAT, &member(NEWBIE, "Newbie")).await;

    let verdict = module.handle_event(&command(UserId(NEWBIE), 9, "/start")).await;

    assert_eq!(verdict, Verdict::Continue);
    assert!(transport.deleted().await.is_empty());
    assert!(module.cases().contains(key()).await);
}

#[tokio::test]
async fn test_lenient_mode_ignores_media() {
    let dir = tempfile::tempdir().unwrap();
    let policy = CaptchaPolicy { strict: false, ..CaptchaPolicy::default() };
    let (module, transport) = captcha_with(dir.path(), policy);
    module.issue(CHAT, &member(NEWBIE, "Newbie")).await;

    let verdict = module.handle_event(&media(NEWBIE, 9, ContentKind::Sticker)).await;
    assert_eq!(verdict, Verdict::Continue);
    assert!(transport.deleted().await.is_empty());
}

#[tokio::test]
async fn test_bots_and_excluded_chats_are_not_challenged() {
    let dir = tempfile::tempdir().unwrap();
    let (module, transport) = captcha_with(dir.path(), CaptchaPolicy::default());

    let mut bot = member(50, "Helper");
    bot.is_bot = true;
    module.handle_event(&join(1, vec![bot])).await;
    assert_eq!(module.cases().slot_count(), 0);

    let mut policy = CaptchaPolicy::default();
    policy.exclude.insert(CHAT.0);
    let (excluded, _) = captcha_with(dir.path(), policy);
    excluded.handle_event(&join(2, vec![member(NEWBIE, "Newbie")])).await;
    assert!(!excluded.cases().contains(key()).await);
    assert!(transport.calls().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_wrong_answers_each_cost_one_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let policy = CaptchaPolicy { max_attempts: 8, ..CaptchaPolicy::default() };
    let (module, transport) = captcha_with(dir.path(), policy);
    module.issue(CHAT, &member(NEWBIE, "Newbie")).await;

    let tasks: Vec<_> = (0..5)
        .map(|i| {
            let module = module.clone();
            tokio::spawn(async move { module.grade(&text(NEWBIE, 200 + i, "41x"), "41x").await })
        })
        .collect();
    for task in tasks {
        assert_matches::assert_matches!(task.await.unwrap(), Outcome::Rejected(_));
    }

    assert_eq!(module.cases().find(key()).await.unwrap().attempts_left, 3);
    assert!(transport.kicks().await.is_empty());
}
