//! Session agent integration tests
//!
//! Backends are scripted through `common::FakeFactory`; no network.

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::{FakeBehavior, FakeFactory, HANG, review_config};
use nitpick_core::context::{CompactionPolicy, SUMMARY_LABEL};
use nitpick_core::hook::HookEnvelope;
use nitpick_core::provider::Role;
use nitpick_core::review::ReviewRequest;
use nitpick_core::session::strategy::REVIEW_STARTUP_MESSAGE;
use nitpick_core::session::{AgentConfig, HookWatcher, Payload, SessionAgent, SessionKey};
use nitpick_core::{Error, ReviewerConfig};
use serde_json::json;
use tokio::time::timeout;

fn agent(factory: &FakeFactory, config: AgentConfig) -> SessionAgent {
    SessionAgent::new(SessionKey::project("/tmp/proj"), config, Arc::new(factory.clone()))
}

fn text(s: &str) -> Payload {
    Payload::Text(s.to_string())
}

fn hook_event(event: &str, tool: &str) -> Payload {
    Payload::HookEvent(HookEnvelope {
        event: event.into(),
        reported_at: None,
        payload: json!({ "tool_name": tool }),
        source_path: Some("/tmp/proj".into()),
        received_at: None,
    })
}

fn hook_config(smart_triggers: bool) -> AgentConfig {
    let watcher = HookWatcher::new(PathBuf::from("/tmp/proj/.nitpick/s1.txt"), smart_triggers);
    AgentConfig::new(
        std::path::Path::new("/tmp/proj"),
        &ReviewerConfig::default(),
        Arc::new(watcher),
        "Write feedback to /tmp/proj/.nitpick/s1.txt".into(),
    )
}

/// Wait until the fake backend has logged `entry`
async fn wait_for(factory: &FakeFactory, entry: &str) {
    timeout(Duration::from_secs(5), async {
        while factory.log.position(entry).is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("backend never logged {}", entry));
}

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let factory = FakeFactory::new();
        let agent = agent(&factory, review_config("/tmp/proj"));

        agent.start().unwrap();
        agent.start().unwrap();
        assert!(agent.is_running());
        assert_eq!(factory.created(), 1);

        agent.stop().await;
    }

    #[tokio::test]
    async fn test_startup_message_goes_first() {
        let factory = FakeFactory::new();
        let agent = agent(&factory, review_config("/tmp/proj"));
        agent.start().unwrap();

        let reply = agent.submit_request(text("first")).unwrap().await.unwrap();
        assert!(!reply.is_empty());
        assert_eq!(factory.prompts(), vec![REVIEW_STARTUP_MESSAGE.to_string(), "first".into()]);
        assert_eq!(factory.log.entries()[0], "open");

        agent.stop().await;
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_start() {
        let factory = FakeFactory {
            missing_credentials: true,
            ..FakeFactory::new()
        };
        let agent = agent(&factory, review_config("/tmp/proj"));

        let err = agent.start().unwrap_err();
        assert!(matches!(err, Error::Credentials(_)));
        assert!(!agent.is_running());
        assert!(matches!(agent.submit_fire_and_forget(text("x")), Err(Error::SessionStopped)));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_releases_backend() {
        let factory = FakeFactory::new();
        let agent = agent(&factory, review_config("/tmp/proj"));
        agent.start().unwrap();
        agent.submit_request(text("warm up")).unwrap().await.unwrap();

        agent.stop().await;
        agent.stop().await;

        assert!(!agent.is_running());
        assert_eq!(factory.log.count_prefix("close"), 1);
        assert!(matches!(agent.start(), Err(Error::SessionStopped)));
    }

    #[tokio::test]
    async fn test_failed_open_resolves_queued_requests() {
        let factory = FakeFactory::with_behavior(FakeBehavior {
            fail_open: true,
            ..Default::default()
        });
        let agent = agent(&factory, review_config("/tmp/proj"));
        agent.start().unwrap();

        // Either queued before the consumer noticed, or refused afterwards
        match agent.submit_request(text("review")) {
            Ok(pending) => assert!(pending.await.is_err()),
            Err(e) => assert!(matches!(e, Error::Agent(_))),
        }

        timeout(Duration::from_secs(5), async {
            while agent.is_running() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        agent.stop().await;
    }
}

mod ordering_tests {
    use super::*;

    #[tokio::test]
    async fn test_items_are_processed_in_submission_order() {
        let factory = FakeFactory::new();
        let agent = agent(&factory, review_config("/tmp/proj"));
        agent.start().unwrap();

        agent.submit_fire_and_forget(text("one SLOW")).unwrap();
        agent.submit_fire_and_forget(text("two")).unwrap();
        agent.submit_fire_and_forget(text("three SLOW")).unwrap();
        let last = agent.submit_request(text("four")).unwrap();
        last.await.unwrap();

        let entries: Vec<_> = factory
            .log
            .entries()
            .into_iter()
            .filter(|e| e.starts_with("start:") || e.starts_with("end:"))
            .skip(2)
            .collect();
        assert_eq!(
            entries,
            vec![
                "start:one SLOW",
                "end:one SLOW",
                "start:two",
                "end:two",
                "start:three SLOW",
                "end:three SLOW",
                "start:four",
                "end:four",
            ]
        );

        agent.stop().await;
    }

    #[tokio::test]
    async fn test_hook_event_then_review_share_one_conversation() {
        let factory = FakeFactory::new();
        let agent = agent(&factory, hook_config(true));
        agent.start().unwrap();

        agent
            .submit_fire_and_forget(hook_event("PostToolUse", "Write"))
            .unwrap();
        let feedback = agent
            .submit_request(text("review the last change"))
            .unwrap()
            .await
            .unwrap();
        assert!(!feedback.is_empty());

        let prompts = factory.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[1].starts_with("HOOK EVENT: PostToolUse"));
        let hook_end = factory.log.position(&format!("end:{}", prompts[1])).unwrap();
        let review_start = factory.log.position("start:review the last change").unwrap();
        assert!(hook_end < review_start);
        assert_eq!(factory.created(), 1);

        agent.stop().await;
    }

    #[tokio::test]
    async fn test_smart_triggers_skip_noise_without_backend_call() {
        let factory = FakeFactory::new();
        let agent = agent(&factory, hook_config(true));
        agent.start().unwrap();

        agent.submit_fire_and_forget(hook_event("PreToolUse", "Bash")).unwrap();
        agent.submit_fire_and_forget(hook_event("PreToolUse", "Edit")).unwrap();
        agent.submit_request(text("sync")).unwrap().await.unwrap();

        let prompts = factory.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[1].contains("\"tool_name\": \"Edit\""));
        assert_eq!(prompts[2], "sync");

        agent.stop().await;
    }
}

mod reply_tests {
    use super::*;

    #[tokio::test]
    async fn test_failure_resolves_handle_and_loop_continues() {
        let factory = FakeFactory::new();
        let agent = agent(&factory, review_config("/tmp/proj"));
        agent.start().unwrap();

        agent.submit_fire_and_forget(text("event FAIL")).unwrap();
        let failed = agent.submit_request(text("review FAIL")).unwrap();
        let ok = agent.submit_request(text("review again")).unwrap();

        assert!(matches!(failed.await, Err(Error::Provider(_))));
        assert!(ok.await.unwrap().starts_with("feedback #"));
        assert!(agent.is_running());

        agent.stop().await;
    }

    #[tokio::test]
    async fn test_every_request_resolves_once() {
        let factory = FakeFactory::new();
        let roomy = CompactionPolicy {
            max_turns: 100,
            keep_recent: 5,
        };
        let agent = Arc::new(agent(&factory, review_config("/tmp/proj").with_compaction(roomy)));
        agent.start().unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let agent = agent.clone();
            handles.push(tokio::spawn(async move {
                agent
                    .submit_request(Payload::Review(ReviewRequest::new(
                        format!("task {}", i),
                        "done",
                        "/tmp/proj",
                    )))
                    .unwrap()
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        let stats = agent.stats();
        assert_eq!(stats.reviews, 10);
        assert_eq!(stats.pending, 0);
        assert!(stats.running);
        // startup pair plus one pair per review
        assert_eq!(stats.turns, 22);

        agent.stop().await;
    }

    #[tokio::test]
    async fn test_stop_cancels_in_flight_and_queued_requests() {
        let factory = FakeFactory::new();
        let agent = agent(&factory, review_config("/tmp/proj"));
        agent.start().unwrap();

        let in_flight = agent.submit_request(text("HANG")).unwrap();
        let queued = agent.submit_request(text("queued")).unwrap();
        wait_for(&factory, &format!("start:{}", HANG)).await;

        agent.stop().await;

        assert!(matches!(in_flight.await, Err(Error::Cancelled)));
        assert!(matches!(queued.await, Err(Error::Cancelled)));
        assert!(factory.log.position("start:queued").is_none());
        assert_eq!(agent.pending(), 0);
        assert!(matches!(agent.submit_request(text("late")), Err(Error::SessionStopped)));
    }
}

mod compaction_tests {
    use super::*;

    fn small_policy() -> CompactionPolicy {
        CompactionPolicy {
            max_turns: 4,
            keep_recent: 2,
        }
    }

    #[tokio::test]
    async fn test_raw_backend_history_is_compacted() {
        let factory = FakeFactory::new();
        let agent = agent(&factory, review_config("/tmp/proj").with_compaction(small_policy()));
        agent.start().unwrap();

        agent.submit_request(text("first")).unwrap().await.unwrap();
        agent.submit_request(text("second")).unwrap().await.unwrap();

        assert_eq!(factory.log.count_prefix("single_shot"), 1);
        let requests = factory.requests.lock().clone();
        let last = requests.last().unwrap();
        assert_eq!(last.history[0].role, Role::System);
        assert!(last.history[0].content.starts_with(SUMMARY_LABEL));
        assert_eq!(last.history.last().unwrap().content, "second");
        assert_eq!(last.history.len(), 3);
        assert!(agent.stats().has_summary);

        agent.stop().await;
    }

    #[tokio::test]
    async fn test_failed_summary_keeps_full_history() {
        let factory = FakeFactory::with_behavior(FakeBehavior {
            fail_summary: true,
            ..Default::default()
        });
        let agent = agent(&factory, review_config("/tmp/proj").with_compaction(small_policy()));
        agent.start().unwrap();

        agent.submit_request(text("first")).unwrap().await.unwrap();
        let reply = agent.submit_request(text("second")).unwrap().await;
        assert!(reply.is_ok());

        let requests = factory.requests.lock().clone();
        let last = requests.last().unwrap();
        assert_eq!(last.history.len(), 5);
        assert_eq!(last.history[0].content, REVIEW_STARTUP_MESSAGE);
        assert!(!agent.stats().has_summary);

        agent.stop().await;
    }

    #[tokio::test]
    async fn test_native_backend_gets_prompt_only() {
        let factory = FakeFactory::with_behavior(FakeBehavior {
            keeps_own_history: true,
            ..Default::default()
        });
        let agent = agent(&factory, review_config("/tmp/proj").with_compaction(small_policy()));
        agent.start().unwrap();

        for i in 0..6 {
            agent.submit_request(text(&format!("review {}", i))).unwrap().await.unwrap();
        }

        assert_eq!(factory.log.count_prefix("single_shot"), 0);
        assert!(factory.requests.lock().iter().all(|r| r.history.len() == 1));

        agent.stop().await;
    }
}
