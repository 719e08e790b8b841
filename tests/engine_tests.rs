// ABOUTME: End-to-end engine tests covering splits, joins, races and errors
// ABOUTME: Each scenario drives a dataflow through the in-memory services

mod common;

use common::{harness, ServerMode, TestServer};
use tributary::model::{FlowState, RunState};
use tributary::queue::FlowQueue as _;

#[tokio::test]
async fn test_single_constant_completes() {
    let h = harness(2);
    let run = h
        .run_to_completion(
            r#"{
                "id": "single",
                "steps": [{"id": "emit", "type": "constant", "value": {"x": 1}}],
                "startAt": "emit"
            }"#,
        )
        .await;

    assert_eq!(run.state, RunState::Completed);
    assert!(run.finished_at.is_some());
    assert_eq!(h.storage.flow_count(), 0);
    assert_eq!(h.storage.split_count(), 0);
    assert_eq!(h.storage.counter_count(), 0);
}

#[tokio::test]
async fn test_distribute_join_posts_composed_array() {
    let server = TestServer::spawn(ServerMode::Echo).await;
    let h = harness(4);
    let run = h
        .run_to_completion(&format!(
            r#"{{
                "id": "fan-in",
                "steps": [
                    {{"id": "emit", "type": "constant", "value": [1, 2, 3], "next": "spread"}},
                    {{"id": "spread", "type": "distribute", "next": "pick"}},
                    {{"id": "pick", "type": "select", "selector": "$", "next": "merge"}},
                    {{"id": "merge", "type": "join", "next": "post"}},
                    {{"id": "post", "type": "web-method", "method": "POST", "url": "{}/collect"}}
                ],
                "startAt": "emit"
            }}"#,
            server.url
        ))
        .await;

    assert_eq!(run.state, RunState::Completed);
    // numerical index: the composed array is ordered by split index
    assert_eq!(server.request_bodies(), vec!["[1,2,3]".to_string()]);
    assert_eq!(h.storage.flow_count(), 0);
    assert_eq!(h.storage.split_count(), 0);
    assert_eq!(h.storage.counter_count(), 0);
}

#[tokio::test]
async fn test_broadcast_with_failing_webmethods_errors_run() {
    let server = TestServer::spawn(ServerMode::Fixed {
        status: 500,
        body: "boom",
    })
    .await;
    let h = harness(4);
    let run = h
        .run_to_completion(&format!(
            r#"{{
                "id": "fan-out-errors",
                "steps": [
                    {{"id": "emit", "type": "constant", "value": {{"a": 1, "b": 2}}, "next": "fan"}},
                    {{"id": "fan", "type": "broadcast", "forwardTo": ["left", "right"]}},
                    {{"id": "left", "type": "web-method", "method": "POST", "url": "{url}/l", "next": "merge"}},
                    {{"id": "right", "type": "web-method", "method": "POST", "url": "{url}/r", "next": "merge"}},
                    {{"id": "merge", "type": "join"}}
                ],
                "startAt": "emit"
            }}"#,
            url = server.url
        ))
        .await;

    assert_eq!(run.state, RunState::Error);

    // both errored branch flows and the errored parent remain; nothing else
    let remaining = h.storage.all_flows();
    assert_eq!(remaining.len(), 3);
    assert!(remaining.iter().all(|f| f.state == FlowState::Error));
    let branch_errors = remaining
        .iter()
        .filter(|f| f.message.as_deref().is_some_and(|m| m.contains("boom")))
        .count();
    assert_eq!(branch_errors, 2);
}

#[tokio::test]
async fn test_conditional_excludes_interrupted_sibling_from_join() {
    let server = TestServer::spawn(ServerMode::Echo).await;
    let h = harness(4);
    let run = h
        .run_to_completion(&format!(
            r#"{{
                "id": "filtered-join",
                "steps": [
                    {{"id": "emit", "type": "constant", "value": [1, 2, 3], "next": "spread"}},
                    {{"id": "spread", "type": "distribute", "next": "gate"}},
                    {{"id": "gate", "type": "conditional", "condition": "$ > 1", "next": "merge"}},
                    {{"id": "merge", "type": "join", "next": "post"}},
                    {{"id": "post", "type": "web-method", "method": "POST", "url": "{}/collect"}}
                ],
                "startAt": "emit"
            }}"#,
            server.url
        ))
        .await;

    assert_eq!(run.state, RunState::Completed);
    assert_eq!(server.request_bodies(), vec!["[2,3]".to_string()]);
    assert_eq!(h.storage.flow_count(), 0);
}

#[tokio::test]
async fn test_race_forwards_exactly_one_sibling() {
    let server = TestServer::spawn(ServerMode::Echo).await;
    let h = harness(4);
    let run = h
        .run_to_completion(&format!(
            r#"{{
                "id": "first-wins",
                "steps": [
                    {{"id": "emit", "type": "constant", "value": [1, 2], "next": "spread"}},
                    {{"id": "spread", "type": "distribute", "next": "pick-first"}},
                    {{"id": "pick-first", "type": "race", "next": "post"}},
                    {{"id": "post", "type": "web-method", "method": "POST", "url": "{}/winner"}}
                ],
                "startAt": "emit"
            }}"#,
            server.url
        ))
        .await;

    assert_eq!(run.state, RunState::Completed);
    let bodies = server.request_bodies();
    assert_eq!(bodies.len(), 1);
    assert!(bodies[0] == "1" || bodies[0] == "2");

    // a losing sibling may still be in flight when the run completes; once
    // the queue drains, anything left behind must be in error state
    h.queue.stop().unwrap().wait().await;
    assert!(h
        .storage
        .all_flows()
        .iter()
        .all(|f| f.state == FlowState::Error));
}

#[tokio::test]
async fn test_race_with_no_active_sibling_interrupts() {
    let server = TestServer::spawn(ServerMode::Echo).await;
    let h = harness(4);
    let run = h
        .run_to_completion(&format!(
            r#"{{
                "id": "no-winner",
                "steps": [
                    {{"id": "emit", "type": "constant", "value": [1, 2], "next": "spread"}},
                    {{"id": "spread", "type": "distribute", "next": "gate"}},
                    {{"id": "gate", "type": "conditional", "condition": "false", "next": "pick-first"}},
                    {{"id": "pick-first", "type": "race", "next": "post"}},
                    {{"id": "post", "type": "web-method", "method": "POST", "url": "{}/winner"}}
                ],
                "startAt": "emit"
            }}"#,
            server.url
        ))
        .await;

    // the interrupted parent never reaches the web step
    assert_eq!(run.state, RunState::Completed);
    assert!(server.request_bodies().is_empty());
    assert_eq!(h.storage.flow_count(), 0);
}

#[tokio::test]
async fn test_race_with_all_errored_siblings_interrupts() {
    let server = TestServer::spawn(ServerMode::Fixed {
        status: 500,
        body: "down",
    })
    .await;
    let h = harness(4);
    let run = h
        .run_to_completion(&format!(
            r#"{{
                "id": "all-errored-race",
                "steps": [
                    {{"id": "emit", "type": "constant", "value": [1, 2], "next": "spread"}},
                    {{"id": "spread", "type": "distribute", "next": "call"}},
                    {{"id": "call", "type": "web-method", "method": "POST", "url": "{}/x", "next": "pick-first"}},
                    {{"id": "pick-first", "type": "race"}}
                ],
                "startAt": "emit"
            }}"#,
            server.url
        ))
        .await;

    // the race absorbs errors: no winner means an interrupted parent, and the
    // errored siblings stay behind for diagnostics
    assert_eq!(run.state, RunState::Completed);
    let remaining = h.storage.all_flows();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|f| f.state == FlowState::Error));
}

#[tokio::test]
async fn test_nested_distributes_roll_up_level_by_level() {
    let h = harness(4);
    let run = h
        .run_to_completion(
            r#"{
                "id": "nested",
                "steps": [
                    {"id": "emit", "type": "constant", "value": [[1, 2], [3, 4], [5]], "next": "outer"},
                    {"id": "outer", "type": "distribute", "next": "inner"},
                    {"id": "inner", "type": "distribute"}
                ],
                "startAt": "emit"
            }"#,
        )
        .await;

    assert_eq!(run.state, RunState::Completed);
    assert_eq!(h.storage.flow_count(), 0);
    assert_eq!(h.storage.split_count(), 0);
    assert_eq!(h.storage.counter_count(), 0);
}

#[tokio::test]
async fn test_nested_distribute_with_inner_join() {
    let server = TestServer::spawn(ServerMode::Echo).await;
    let h = harness(4);
    let run = h
        .run_to_completion(&format!(
            r#"{{
                "id": "nested-join",
                "steps": [
                    {{"id": "emit", "type": "constant", "value": [[1, 2], [3, 4]], "next": "outer"}},
                    {{"id": "outer", "type": "distribute", "next": "inner"}},
                    {{"id": "inner", "type": "distribute", "next": "merge"}},
                    {{"id": "merge", "type": "join", "next": "post"}},
                    {{"id": "post", "type": "web-method", "method": "POST", "url": "{}/sum"}}
                ],
                "startAt": "emit"
            }}"#,
            server.url
        ))
        .await;

    assert_eq!(run.state, RunState::Completed);
    let mut bodies = server.request_bodies();
    bodies.sort();
    assert_eq!(bodies, vec!["[1,2]".to_string(), "[3,4]".to_string()]);
    assert_eq!(h.storage.flow_count(), 0);
}

#[tokio::test]
async fn test_empty_distribute_collapses_immediately() {
    let h = harness(2);
    let run = h
        .run_to_completion(
            r#"{
                "id": "empty-split",
                "steps": [
                    {"id": "emit", "type": "constant", "value": [], "next": "spread"},
                    {"id": "spread", "type": "distribute", "next": "pick"},
                    {"id": "pick", "type": "select", "selector": "$"}
                ],
                "startAt": "emit"
            }"#,
        )
        .await;

    assert_eq!(run.state, RunState::Completed);
    assert_eq!(h.storage.flow_count(), 0);
    assert_eq!(h.storage.split_count(), 0);
}

#[tokio::test]
async fn test_conditional_on_non_json_payload_errors() {
    let h = harness(2);
    // the root flow has no payload, so the conditional cannot parse it
    let run = h
        .run_to_completion(
            r#"{
                "id": "bad-payload",
                "steps": [{"id": "gate", "type": "conditional", "condition": "$ == 1"}],
                "startAt": "gate"
            }"#,
        )
        .await;

    assert_eq!(run.state, RunState::Error);
    let remaining = h.storage.all_flows();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].state, FlowState::Error);
}

#[tokio::test]
async fn test_webmethod_non_200_errors_run() {
    let server = TestServer::spawn(ServerMode::Fixed {
        status: 500,
        body: "boom",
    })
    .await;
    let h = harness(2);
    let run = h
        .run_to_completion(&format!(
            r#"{{
                "id": "bad-status",
                "steps": [{{"id": "call", "type": "web-method", "method": "GET", "url": "{}/x"}}],
                "startAt": "call"
            }}"#,
            server.url
        ))
        .await;

    assert_eq!(run.state, RunState::Error);
    let remaining = h.storage.all_flows();
    assert_eq!(remaining.len(), 1);
    let message = remaining[0].message.as_deref().unwrap();
    assert!(message.contains("500"));
    assert!(message.contains("boom"));
}

#[tokio::test]
async fn test_missing_runtime_step_errors_run() {
    use tributary::model::{Dataflow, DataflowRun, Flow};
    use tributary::storage::Storage as _;

    // decode-time resolution catches bad references, so inject a token that
    // points at a step the graph does not contain
    let h = harness(2);
    let dataflow = Dataflow::from_json(
        r#"{
            "id": "dangling",
            "steps": [{"id": "emit", "type": "constant", "value": 1}],
            "startAt": "emit"
        }"#,
    )
    .unwrap();
    let run = DataflowRun::new(dataflow);
    h.storage.store_run(&run).await.unwrap();

    let flow = Flow::root(run.id.clone(), "gone");
    h.storage.store_flow(&flow).await.unwrap();
    h.executor.handle_flow(flow).await.unwrap();

    let run = h.wait_for_terminal(&run.id).await;
    assert_eq!(run.state, RunState::Error);
    let remaining = h.storage.all_flows();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].state, FlowState::Error);
}
