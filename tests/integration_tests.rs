//! Integration tests for Stanford MCP
//!
//! These drive the MCP server end to end against an in-process mock catalog.

use rmcp::model::{CallToolResult, RawContent};
use serde_json::{json, Value};
use stanford_mcp::catalog::{CatalogClient, CatalogService, RateLimiter};
use stanford_mcp::mcp::{schema, McpServer, ToolKind};
use stanford_mcp::models::AcademicYear;
use stanford_mcp::sources::mock::{make_course, schools_xml, MockSource};
use stanford_mcp::utils::RetryPolicy;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

fn cs_courses() -> MockSource {
    MockSource::with_courses(&[
        make_course("105645", "CS", "106A", "Programming Methodology"),
        make_course("105646", "CS", "106B", "Programming Abstractions"),
        make_course("105750", "CS", "107", "Computer Organization and Systems"),
    ])
}

fn server_with(source: Arc<MockSource>, limiter: RateLimiter) -> McpServer {
    let client = CatalogClient::new(
        source,
        Arc::new(limiter),
        RetryPolicy::none(),
        Duration::from_secs(5),
    );
    let catalog = CatalogService::new(
        client,
        Duration::from_secs(600),
        NonZeroUsize::new(64).unwrap(),
        AcademicYear::new(2024),
    );
    McpServer::new(Arc::new(catalog), Duration::from_secs(300))
}

fn server(source: Arc<MockSource>) -> McpServer {
    server_with(source, RateLimiter::new(1000.0, 100, Duration::from_secs(1)))
}

async fn call_result(server: &McpServer, tool: &str, args: Value) -> CallToolResult {
    let session = server.sessions().open();
    server
        .call_tool_in(&session, &CancellationToken::new(), tool, Some(args))
        .await
        .unwrap()
}

async fn call(server: &McpServer, tool: &str, args: Value) -> (bool, Value) {
    let result = call_result(server, tool, args).await;
    (
        result.is_error == Some(true),
        result.structured_content.unwrap_or(Value::Null),
    )
}

fn text(result: &CallToolResult) -> String {
    result
        .content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_search_returns_summaries_in_upstream_order() {
    let source = Arc::new(cs_courses());
    let server = server(Arc::clone(&source));

    let (is_error, structured) = call(
        &server,
        "search_courses",
        json!({"term": "2024-2025 Autumn", "department": "CS"}),
    )
    .await;

    assert!(!is_error);
    let courses = structured["courses"].as_array().unwrap();
    let codes: Vec<_> = courses.iter().map(|c| c["code"].as_str().unwrap()).collect();
    assert_eq!(codes, vec!["CS 106A", "CS 106B", "CS 107"]);
    assert_eq!(courses[0]["course_id"], "105645");
    assert_eq!(courses[0]["title"], "Programming Methodology");
    assert_eq!(source.call_count(), 1);
}

#[tokio::test]
async fn test_get_course_missing_is_absent_not_an_error() {
    let source = Arc::new(cs_courses());
    let server = server(source);

    let result = call_result(
        &server,
        "get_course",
        json!({"course_id": "CS999", "term": "2024-2025 Autumn"}),
    )
    .await;

    assert_ne!(result.is_error, Some(true));
    let structured = result.structured_content.clone().unwrap();
    assert_eq!(structured, json!({"course": null}));
    schema::validate(&ToolKind::GetCourse.output_schema(), &structured).unwrap();
    assert_eq!(text(&result), "No course CS 999 offered in 2024-2025 Autumn.");
}

#[tokio::test]
async fn test_unknown_school_has_no_departments() {
    let source = Arc::new(MockSource::new());
    source.set_schools_payload(schools_xml(&[(
        "School of Engineering",
        &[("CS", "Computer Science")],
    )]));
    let server = server(source);

    let (is_error, structured) = call(
        &server,
        "list_departments",
        json!({"term": "2024-2025", "school": "School of Wizardry"}),
    )
    .await;
    assert!(!is_error);
    assert_eq!(structured, json!({"departments": []}));
}

#[tokio::test]
async fn test_repeated_search_hits_cache() {
    let source = Arc::new(cs_courses());
    let server = server(Arc::clone(&source));
    let args = json!({"term": "2024-2025 Autumn", "department": "CS"});

    let (_, first) = call(&server, "search_courses", args.clone()).await;
    let (_, second) = call(&server, "search_courses", args).await;

    assert_eq!(first, second);
    assert_eq!(source.call_count(), 1);

    // same query spelled differently shares the entry
    let (_, third) = call(
        &server,
        "search_courses",
        json!({"term": "Autumn", "department": " cs "}),
    )
    .await;
    assert_eq!(third, first);
    assert_eq!(source.call_count(), 1);
}

#[tokio::test]
async fn test_concurrent_searches_share_one_fetch() {
    let source = Arc::new(cs_courses());
    source.set_delay(Duration::from_millis(50));
    let server = server(Arc::clone(&source));

    let calls = (0..8).map(|_| {
        let server = server.clone();
        tokio::spawn(async move {
            call(
                &server,
                "search_courses",
                json!({"term": "2024-2025 Autumn", "department": "CS"}),
            )
            .await
        })
    });
    for handle in calls.collect::<Vec<_>>() {
        let (is_error, structured) = handle.await.unwrap();
        assert!(!is_error);
        assert_eq!(structured["courses"].as_array().unwrap().len(), 3);
    }
    assert_eq!(source.call_count(), 1);
}

#[tokio::test]
async fn test_request_over_budget_waits_then_succeeds() {
    let source = Arc::new(cs_courses());
    // one token, refilled every 200ms, callers may wait up to 2s
    let server = server_with(
        Arc::clone(&source),
        RateLimiter::new(5.0, 1, Duration::from_secs(2)),
    );

    let (is_error, _) = call(
        &server,
        "search_courses",
        json!({"term": "2024-2025 Autumn", "department": "CS"}),
    )
    .await;
    assert!(!is_error);

    let started = Instant::now();
    let (is_error, _) = call(
        &server,
        "search_courses",
        json!({"term": "2024-2025 Autumn", "keyword": "programming"}),
    )
    .await;
    assert!(!is_error);
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(source.call_count(), 2);
}

#[tokio::test]
async fn test_request_over_budget_fails_with_rate_limited() {
    let source = Arc::new(cs_courses());
    // one token every 10s, callers may wait only 50ms
    let server = server_with(
        Arc::clone(&source),
        RateLimiter::new(0.1, 1, Duration::from_millis(50)),
    );

    let (is_error, _) = call(
        &server,
        "search_courses",
        json!({"term": "2024-2025 Autumn", "department": "CS"}),
    )
    .await;
    assert!(!is_error);

    let result = call_result(
        &server,
        "search_courses",
        json!({"term": "2024-2025 Autumn", "keyword": "systems"}),
    )
    .await;
    assert_eq!(result.is_error, Some(true));
    assert!(result.structured_content.is_none());
    let text = text(&result);
    assert!(text.starts_with("RateLimited: "));
    assert!(text.contains("retryable: true"));
    let retry_after_ms: u64 = text
        .lines()
        .find_map(|l| l.strip_prefix("retry_after_ms: "))
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after_ms > 0);
    assert_eq!(source.call_count(), 1);
}

#[tokio::test]
async fn test_departments_of_school() {
    let source = Arc::new(MockSource::new());
    source.set_schools_payload(schools_xml(&[
        (
            "School of Engineering",
            &[("CS", "Computer Science"), ("EE", "Electrical Engineering")],
        ),
        ("School of Humanities and Sciences", &[("MATH", "Mathematics")]),
    ]));
    let server = server(Arc::clone(&source));

    let (is_error, structured) = call(
        &server,
        "list_departments",
        json!({"term": "2024-2025", "school": "school of engineering"}),
    )
    .await;
    assert!(!is_error);
    let codes: Vec<_> = structured["departments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["code"].as_str().unwrap())
        .collect();
    assert_eq!(codes, vec!["CS", "EE"]);

    let (is_error, structured) = call(
        &server,
        "list_schools",
        json!({"term": "2024-2025", "include_department_count": true}),
    )
    .await;
    assert!(!is_error);
    assert_eq!(structured["schools"][1]["department_count"], 1);
    assert_eq!(source.call_count(), 1);
}

#[tokio::test]
async fn test_invalid_arguments_are_protocol_errors() {
    let source = Arc::new(cs_courses());
    let server = server(Arc::clone(&source));
    let session = server.sessions().open();

    let error = server
        .call_tool_in(
            &session,
            &CancellationToken::new(),
            "search_courses",
            Some(json!({"term": "Autumn", "days": ["someday"]})),
        )
        .await
        .unwrap_err();

    assert_eq!(error.code.0, -32602);
    assert_eq!(source.call_count(), 0);
}

async fn send(writer: &mut (impl AsyncWriteExt + Unpin), message: Value) {
    writer
        .write_all(format!("{}\n", message).as_bytes())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_stdio_session_end_to_end() {
    let source = Arc::new(cs_courses());
    source.set_delay(Duration::from_millis(100));
    let server = server(Arc::clone(&source));

    let (client, remote) = tokio::io::duplex(64 * 1024);
    let (remote_read, remote_write) = tokio::io::split(remote);
    let serving = {
        let server = server.clone();
        tokio::spawn(async move { server.serve_stream(remote_read, remote_write).await })
    };

    let (client_read, mut client_write) = tokio::io::split(client);
    let mut lines = BufReader::new(client_read).lines();

    send(
        &mut client_write,
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize",
               "params": {"protocolVersion": "2025-06-18", "capabilities": {},
                          "clientInfo": {"name": "test", "version": "0"}}}),
    )
    .await;
    let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["result"]["serverInfo"]["name"], "stanford-mcp");

    send(
        &mut client_write,
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )
    .await;
    send(
        &mut client_write,
        json!({"jsonrpc": "2.0", "id": "schedule-1", "method": "tools/call",
               "params": {"name": "get_schedule",
                          "arguments": {"course_id": "105646", "term": "2024-2025 Autumn"}}}),
    )
    .await;
    // close stdin while the call is still waiting on the catalog
    client_write.shutdown().await.unwrap();

    let reply: Value = loop {
        let line = lines.next_line().await.unwrap().expect("reply before end of output");
        let message: Value = serde_json::from_str(&line).unwrap();
        if message["id"] == "schedule-1" {
            break message;
        }
    };
    let schedule = &reply["result"]["structuredContent"];
    assert_eq!(schedule["course_id"], "105646");
    assert_eq!(schedule["sections"][0]["component"], "LEC");

    serving.await.unwrap().unwrap();
    assert!(server.sessions().is_empty());
    assert_eq!(source.call_count(), 1);
}
