// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end processor tests on a temp database with mock collaborators.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use switchboard_agent::{ProcessorConfig, ProcessorState, QueueProcessor};
use switchboard_core::{PluginEvent, ProcessingMode, QueueStatus};
use switchboard_test_utils::{AgentCall, MockAgentClient, MockReply, TestHarness};

const WAIT: Duration = Duration::from_secs(10);

fn processor_with(harness: &TestHarness, config: ProcessorConfig) -> QueueProcessor {
    QueueProcessor::new(
        harness.queue.clone(),
        harness.store.clone(),
        harness.agent.clone(),
        harness.config.agent.mode,
        Some(harness.registry.clone()),
        config,
    )
}

fn processor(harness: &TestHarness) -> QueueProcessor {
    processor_with(harness, ProcessorConfig::from(&harness.config))
}

async fn wait_for_in_flight(processor: &QueueProcessor, n: usize) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while processor.in_flight() != n {
        assert!(tokio::time::Instant::now() < deadline, "in_flight never reached {n}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn count_events(harness: &TestHarness, event_type: &str) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    harness.registry.register_event_handler(
        event_type,
        Arc::new(move |_: &PluginEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    count
}

#[tokio::test]
async fn echo_mode_stores_and_delivers_formatted_message() {
    let harness = TestHarness::new().await.unwrap();
    let user = harness.seed_user("Dana", "dana-1").await.unwrap();
    let (message_id, item_id) = harness.ingest(user, "hello there").await.unwrap();
    let completed = count_events(&harness, "item_completed");

    let processor = processor(&harness);
    processor.start().await.unwrap();
    let item = harness
        .wait_for_status(item_id, QueueStatus::Completed, WAIT)
        .await
        .unwrap();
    processor.stop().await;

    assert_eq!(item.attempts, 0);
    let response = harness.response(message_id).await.unwrap().unwrap();
    assert_eq!(response, "[platform: mock | user: Dana | role: user]\nhello there");

    let delivered = harness.platform.deliveries().await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].text, response);
    assert_eq!(delivered[0].platform_user_id, "dana-1");
    assert_eq!(delivered[0].message_id, message_id);
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert_eq!(harness.agent.dispatch_count().await, 0);
}

#[tokio::test]
async fn always_failing_dispatch_exhausts_attempts() {
    let harness = TestHarness::builder()
        .with_mode(ProcessingMode::Live)
        .with_agent(MockAgentClient::failing())
        .with_max_attempts(2)
        .build()
        .await
        .unwrap();
    let user = harness.seed_user("Dana", "dana-1").await.unwrap();
    let (message_id, item_id) = harness.ingest(user, "ping").await.unwrap();
    let failed = count_events(&harness, "item_failed");

    let processor = processor(&harness);
    processor.start().await.unwrap();
    let item = harness
        .wait_for_status(item_id, QueueStatus::Failed, WAIT)
        .await
        .unwrap();
    processor.stop().await;

    assert_eq!(item.attempts, 2);
    assert_eq!(harness.agent.dispatch_count().await, 2);
    assert!(harness.response(message_id).await.unwrap().is_none());
    assert_eq!(harness.platform.delivery_count().await, 0);
    assert_eq!(failed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fail_twice_then_succeed_completes_on_third_attempt() {
    let agent = MockAgentClient::with_replies(vec![
        MockReply::Fail("502".into()),
        MockReply::Fail("502".into()),
        MockReply::Text("third time lucky".into()),
    ]);
    let harness = TestHarness::builder()
        .with_mode(ProcessingMode::Live)
        .with_agent(agent)
        .with_max_attempts(3)
        .build()
        .await
        .unwrap();
    let user = harness.seed_user("Dana", "dana-1").await.unwrap();
    let (message_id, item_id) = harness.ingest(user, "ping").await.unwrap();

    let processor = processor(&harness);
    processor.start().await.unwrap();
    let item = harness
        .wait_for_status(item_id, QueueStatus::Completed, WAIT)
        .await
        .unwrap();
    processor.stop().await;

    assert_eq!(item.attempts, 2);
    assert_eq!(
        harness.response(message_id).await.unwrap().as_deref(),
        Some("third time lucky")
    );
    let delivered = harness.platform.deliveries().await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].text, "third time lucky");
}

#[tokio::test]
async fn live_dispatch_sends_formatted_text_and_detaches() {
    let harness = TestHarness::builder()
        .with_mode(ProcessingMode::Live)
        .build()
        .await
        .unwrap();
    let user = harness.seed_user("Dana", "dana-1").await.unwrap();
    let (_, item_id) = harness.ingest(user, "what's up").await.unwrap();

    let processor = processor(&harness);
    processor.start().await.unwrap();
    harness
        .wait_for_status(item_id, QueueStatus::Completed, WAIT)
        .await
        .unwrap();
    processor.stop().await;

    assert_eq!(
        harness.agent.calls().await,
        vec![
            AgentCall::Attach(user),
            AgentCall::Dispatch {
                user_id: user,
                text: "[platform: mock | user: Dana | role: user]\nwhat's up".into(),
            },
            AgentCall::Detach(user),
        ]
    );
}

#[tokio::test]
async fn listen_mode_completes_without_response_or_delivery() {
    let harness = TestHarness::builder()
        .with_mode(ProcessingMode::Listen)
        .build()
        .await
        .unwrap();
    let user = harness.seed_user("Dana", "dana-1").await.unwrap();
    let (message_id, item_id) = harness.ingest(user, "just listening").await.unwrap();

    let processor = processor(&harness);
    processor.start().await.unwrap();
    harness
        .wait_for_status(item_id, QueueStatus::Completed, WAIT)
        .await
        .unwrap();
    processor.stop().await;

    assert!(harness.response(message_id).await.unwrap().is_none());
    assert_eq!(harness.platform.delivery_count().await, 0);
    assert_eq!(harness.agent.dispatch_count().await, 0);
}

#[tokio::test]
async fn missing_profile_fails_after_one_requeue() {
    let harness = TestHarness::builder()
        .with_max_attempts(5)
        .build()
        .await
        .unwrap();
    let user = harness.seed_user_without_profile("Ghost").await.unwrap();
    let (_, item_id) = harness.ingest(user, "anyone?").await.unwrap();
    let failed = count_events(&harness, "item_failed");

    let processor = processor(&harness);
    processor.start().await.unwrap();
    let item = harness
        .wait_for_status(item_id, QueueStatus::Failed, WAIT)
        .await
        .unwrap();
    processor.stop().await;

    assert_eq!(item.attempts, 2);
    assert_eq!(failed.load(Ordering::SeqCst), 1);
    assert_eq!(harness.platform.delivery_count().await, 0);
}

#[tokio::test]
async fn missing_resource_handle_goes_through_requeue_path() {
    let agent = MockAgentClient::new().with_attach(switchboard_test_utils::AttachOutcome::NotFound);
    let harness = TestHarness::builder()
        .with_mode(ProcessingMode::Live)
        .with_agent(agent)
        .with_max_attempts(3)
        .build()
        .await
        .unwrap();
    let user = harness.seed_user("Dana", "dana-1").await.unwrap();
    let (_, item_id) = harness.ingest(user, "ping").await.unwrap();

    let processor = processor(&harness);
    processor.start().await.unwrap();
    let item = harness
        .wait_for_status(item_id, QueueStatus::Failed, WAIT)
        .await
        .unwrap();
    processor.stop().await;

    assert_eq!(item.attempts, 3);
    assert_eq!(harness.agent.dispatch_count().await, 0);
    assert_eq!(harness.agent.detach_count().await, 3);
}

#[tokio::test]
async fn graceful_stop_waits_for_in_flight_item() {
    let harness = TestHarness::builder()
        .with_mode(ProcessingMode::Live)
        .with_agent(MockAgentClient::new().with_delay(Duration::from_millis(300)))
        .build()
        .await
        .unwrap();
    let user = harness.seed_user("Dana", "dana-1").await.unwrap();
    let (_, item_id) = harness.ingest(user, "slow one").await.unwrap();

    let processor = processor(&harness);
    processor.start().await.unwrap();
    wait_for_in_flight(&processor, 1).await;
    processor.stop().await;

    assert_eq!(processor.state(), ProcessorState::Stopped);
    assert_eq!(processor.in_flight(), 0);
    let item = harness.item(item_id).await.unwrap();
    assert_eq!(item.status, QueueStatus::Completed);
}

#[tokio::test]
async fn force_cancel_past_grace_releases_and_detaches() {
    let harness = TestHarness::builder()
        .with_mode(ProcessingMode::Live)
        .with_agent(MockAgentClient::new().with_delay(Duration::from_secs(60)))
        .build()
        .await
        .unwrap();
    let user = harness.seed_user("Dana", "dana-1").await.unwrap();
    let (_, item_id) = harness.ingest(user, "never answered").await.unwrap();

    let mut config = ProcessorConfig::from(&harness.config);
    config.shutdown_grace = Duration::from_millis(100);
    let processor = processor_with(&harness, config);
    processor.start().await.unwrap();
    wait_for_in_flight(&processor, 1).await;
    processor.stop().await;

    let item = harness.item(item_id).await.unwrap();
    assert_eq!(item.status, QueueStatus::Pending);
    assert_eq!(item.attempts, 0);
    assert_eq!(harness.agent.detach_count().await, 1);
    assert_eq!(processor.in_flight(), 0);
}

#[tokio::test]
async fn delivery_failure_keeps_item_completed() {
    let harness = TestHarness::new().await.unwrap();
    harness.platform.fail_deliveries(true);
    let user = harness.seed_user("Dana", "dana-1").await.unwrap();
    let (message_id, item_id) = harness.ingest(user, "hello").await.unwrap();
    let delivery_failed = count_events(&harness, "delivery_failed");

    let processor = processor(&harness);
    processor.start().await.unwrap();
    harness
        .wait_for_status(item_id, QueueStatus::Completed, WAIT)
        .await
        .unwrap();
    // Delivery runs after the status write.
    let deadline = tokio::time::Instant::now() + WAIT;
    while delivery_failed.load(Ordering::SeqCst) == 0 {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    processor.stop().await;

    assert!(harness.response(message_id).await.unwrap().is_some());
    assert_eq!(harness.item(item_id).await.unwrap().status, QueueStatus::Completed);
}

#[tokio::test]
async fn stale_processing_items_are_recovered_on_start() {
    let harness = TestHarness::new().await.unwrap();
    let user = harness.seed_user("Dana", "dana-1").await.unwrap();
    let (_, item_id) = harness.ingest(user, "left behind").await.unwrap();
    let orphan = harness.queue.claim_next().await.unwrap().unwrap();
    assert_eq!(orphan.id, item_id);

    let processor = processor(&harness);
    processor.start().await.unwrap();
    harness
        .wait_for_status(item_id, QueueStatus::Completed, WAIT)
        .await
        .unwrap();
    processor.stop().await;
}

#[tokio::test]
async fn mode_change_applies_to_later_claims() {
    let harness = TestHarness::new().await.unwrap();
    let processor = processor(&harness);
    assert_eq!(processor.mode(), ProcessingMode::Echo);

    processor.set_mode(ProcessingMode::Listen);
    assert_eq!(processor.mode(), ProcessingMode::Listen);

    let user = harness.seed_user("Dana", "dana-1").await.unwrap();
    let (message_id, item_id) = harness.ingest(user, "quiet").await.unwrap();
    processor.start().await.unwrap();
    harness
        .wait_for_status(item_id, QueueStatus::Completed, WAIT)
        .await
        .unwrap();
    processor.stop().await;

    assert!(harness.response(message_id).await.unwrap().is_none());
}

#[tokio::test]
async fn lifecycle_transitions_are_idempotent() {
    let harness = TestHarness::new().await.unwrap();
    let processor = processor(&harness);

    processor.stop().await;
    assert_eq!(processor.state(), ProcessorState::NotStarted);

    processor.start().await.unwrap();
    processor.start().await.unwrap();
    assert_eq!(processor.state(), ProcessorState::Running);

    processor.stop().await;
    processor.stop().await;
    assert_eq!(processor.state(), ProcessorState::Stopped);

    processor.start().await.unwrap();
    assert_eq!(processor.state(), ProcessorState::Stopped);
}

#[tokio::test]
async fn concurrent_units_drain_the_queue() {
    let harness = TestHarness::builder()
        .with_mode(ProcessingMode::Live)
        .with_agent(MockAgentClient::new().with_delay(Duration::from_millis(50)))
        .with_concurrency(3)
        .build()
        .await
        .unwrap();
    let user = harness.seed_user("Dana", "dana-1").await.unwrap();
    let mut items = Vec::new();
    for i in 0..6 {
        items.push(harness.ingest(user, &format!("message {i}")).await.unwrap().1);
    }

    let processor = processor(&harness);
    processor.start().await.unwrap();
    for id in &items {
        harness
            .wait_for_status(*id, QueueStatus::Completed, WAIT)
            .await
            .unwrap();
    }
    processor.stop().await;

    let stats = harness.queue.stats().await.unwrap();
    assert_eq!(stats.completed, 6);
    assert_eq!(stats.processing, 0);
    assert_eq!(harness.platform.delivery_count().await, 6);
}

#[tokio::test]
async fn completion_write_failure_goes_through_requeue_path() {
    let harness = TestHarness::builder().with_max_attempts(2).build().await.unwrap();
    harness
        .execute_sql(
            "CREATE TRIGGER reject_completion BEFORE UPDATE OF status ON queue
             WHEN NEW.status = 'completed'
             BEGIN SELECT RAISE(ABORT, 'completion rejected'); END;",
        )
        .await
        .unwrap();
    let user = harness.seed_user("Dana", "dana-1").await.unwrap();
    let (_, item_id) = harness.ingest(user, "never completes").await.unwrap();
    let completed = count_events(&harness, "item_completed");
    let failed = count_events(&harness, "item_failed");

    let processor = processor(&harness);
    processor.start().await.unwrap();
    let item = harness
        .wait_for_status(item_id, QueueStatus::Failed, WAIT)
        .await
        .unwrap();
    processor.stop().await;

    assert_eq!(item.attempts, 2);
    assert_eq!(harness.queue.stats().await.unwrap().processing, 0);
    assert_eq!(harness.platform.delivery_count().await, 0);
    assert_eq!(completed.load(Ordering::SeqCst), 0);
    assert_eq!(failed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn parallel_units_serialize_on_one_user_handle() {
    let harness = TestHarness::builder()
        .with_mode(ProcessingMode::Live)
        .with_agent(MockAgentClient::new().with_delay(Duration::from_millis(200)))
        .with_concurrency(2)
        .build()
        .await
        .unwrap();
    let user = harness.seed_user("Dana", "dana-1").await.unwrap();
    let (_, first) = harness.ingest(user, "first").await.unwrap();
    let (_, second) = harness.ingest(user, "second").await.unwrap();

    let processor = processor(&harness);
    processor.start().await.unwrap();
    wait_for_in_flight(&processor, 2).await;
    for id in [first, second] {
        harness
            .wait_for_status(id, QueueStatus::Completed, WAIT)
            .await
            .unwrap();
    }
    processor.stop().await;

    assert_eq!(harness.agent.dispatch_count().await, 2);
    assert_eq!(harness.agent.detach_count().await, 2);
    assert_eq!(harness.agent.peak_attachments(user).await, 1);
}
