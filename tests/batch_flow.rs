//! End-to-end batch flow against local hyper backends.

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use indexmap::IndexMap;
use paritycheck::{
    BatchConfiguration, Orchestrator, OutboundRequest, RequestBody, RequestDisposition,
    RunContext, RunStatus, SUMMARY_CSV_HEADER,
};
use std::{convert::Infallible, net::SocketAddr, sync::Arc};

/// Binds a throwaway backend on a random loopback port serving fixed bodies
/// by path.
async fn spawn_backend(routes: Vec<(&'static str, &'static str)>) -> String {
    let routes = Arc::new(routes);
    let addr = SocketAddr::from(([127, 0, 0, 1], 0));

    let make_svc = make_service_fn(move |_| {
        let routes = routes.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let routes = routes.clone();
                async move {
                    let path = req.uri().path().to_string();
                    let body = routes
                        .iter()
                        .find(|(route, _)| *route == path)
                        .map(|(_, body)| *body);

                    let response = match body {
                        Some(body) => Response::new(Body::from(body)),
                        None => Response::builder()
                            .status(404)
                            .body(Body::empty())
                            .unwrap(),
                    };

                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    let server = Server::bind(&addr).serve(make_svc);
    let local_addr = server.local_addr();
    tokio::spawn(async move {
        if let Err(e) = server.await {
            eprintln!("test backend error: {}", e);
        }
    });

    format!("http://{}", local_addr)
}

fn get_request(url: String) -> OutboundRequest {
    OutboundRequest {
        method: String::from("GET"),
        url,
        headers: IndexMap::new(),
        body: RequestBody::None,
        disabled_headers: Vec::new(),
        disabled_fields: Vec::new(),
    }
}

#[tokio::test]
async fn sequential_batch_records_one_entry_per_request() {
    let reference_base = spawn_backend(vec![
        (
            "/app/ws/rest/match",
            "{\"id\":1,\"name\":\"A\",\"ts\":\"2026-01-01\"}",
        ),
        ("/app/ws/rest/diff", "{\"id\":2,\"total\":10}"),
    ])
    .await;
    let candidate_base = spawn_backend(vec![
        (
            "/ws/rest/match",
            "{\"id\":1,\"name\":\"A\",\"ts\":\"2026-02-02\"}",
        ),
        ("/ws/rest/diff", "{\"id\":2,\"total\":99}"),
    ])
    .await;

    let mut config = BatchConfiguration::new(reference_base.clone(), candidate_base);
    config.set_exempted_fields(vec!["ts"]);
    config.set_preserved_keys(vec!["source_base_url"]);
    let orchestrator = Orchestrator::new(config).unwrap();

    let mut ctx = RunContext::new();
    ctx.set("source_base_url", reference_base.clone());
    ctx.set("stale_outcome", "leftover");
    orchestrator.reset_run(&mut ctx);

    // Reset keeps the preserve-list, drops everything else.
    assert_eq!(ctx.get("source_base_url"), Some(reference_base.as_str()));
    assert_eq!(ctx.get("stale_outcome"), None);

    let cases = [
        ("Match Customer", "/app/ws/rest/match"),
        ("Diff Totals", "/app/ws/rest/diff"),
    ];

    for (name, path) in &cases {
        let source = get_request(format!("{}{}", reference_base, path));
        let reference = orchestrator.dispatch_reference(&source);
        let disposition = orchestrator
            .run_request(&mut ctx, name, &source, reference)
            .await
            .unwrap();

        assert!(matches!(disposition, RequestDisposition::Recorded(_)));
    }

    let entries = ctx.entries();
    assert_eq!(entries.len(), 2);

    let first = &entries[0];
    assert_eq!(first.serial_number, 1);
    assert_eq!(first.statistics.status, RunStatus::Passed);
    assert_eq!(first.statistics.exempted_lines, 1);
    assert_eq!(first.statistics.mismatched_lines, 0);
    assert_eq!(first.statistics.reference_status, "200");
    assert!(first.replay_command.contains("/ws/rest/match"));
    assert!(!first.replay_command.contains("/app/ws/rest/match"));

    let second = &entries[1];
    assert_eq!(second.serial_number, 2);
    assert_eq!(second.statistics.status, RunStatus::Failed);
    assert_eq!(second.statistics.mismatched_lines, 1);
    assert_eq!(second.statistics.match_percentage, 75);

    let stats = orchestrator.aggregator().overall_stats(&ctx);
    assert_eq!(stats.total_requests, 2);
    assert_eq!(stats.passed_requests, 1);
    assert_eq!(stats.failed_requests, 1);

    let summary = orchestrator.aggregator().export_summary(&ctx);
    let rows: Vec<&str> = summary.lines().collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], SUMMARY_CSV_HEADER);
    assert!(rows[1].starts_with("1,Match Customer,"));
    assert!(rows[2].starts_with("2,Diff Totals,"));

    let full = orchestrator.aggregator().export_full(&ctx);
    assert!(full.contains("curl --location"));
}

#[tokio::test]
async fn unreachable_candidate_is_contained_in_its_entry() {
    let reference_base = spawn_backend(vec![("/app/ws/rest/ping", "{\"ok\":true}")]).await;

    // Grab a loopback port and release it so nothing is listening there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = BatchConfiguration::new(
        reference_base.clone(),
        format!("http://127.0.0.1:{}", dead_port),
    );
    let orchestrator = Orchestrator::new(config).unwrap();
    let mut ctx = RunContext::new();

    let source = get_request(format!("{}/app/ws/rest/ping", reference_base));
    let reference = orchestrator.dispatch_reference(&source);
    let disposition = orchestrator
        .run_request(&mut ctx, "Dead Candidate", &source, reference)
        .await
        .unwrap();

    assert_eq!(disposition, RequestDisposition::Recorded(1));

    let entries = ctx.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].statistics.candidate_status, "ERROR");
    assert_eq!(entries[0].statistics.status, RunStatus::Failed);
    // The pretty-printed reference body compares against nothing.
    assert_eq!(entries[0].statistics.total_lines, 3);
    assert_eq!(entries[0].statistics.mismatched_lines, 3);
}

#[tokio::test]
async fn non_success_statuses_still_compare_normally() {
    let reference_base = spawn_backend(vec![("/app/ws/rest/known", "{\"ok\":true}")]).await;
    let candidate_base = spawn_backend(vec![("/ws/rest/known", "{\"ok\":true}")]).await;

    let config = BatchConfiguration::new(reference_base.clone(), candidate_base);
    let orchestrator = Orchestrator::new(config).unwrap();
    let mut ctx = RunContext::new();

    // Unknown path: both backends answer 404 with empty bodies, which still
    // compare equal and record a passing zero-line entry.
    let source = get_request(format!("{}/app/ws/rest/unknown", reference_base));
    let reference = orchestrator.dispatch_reference(&source);
    orchestrator
        .run_request(&mut ctx, "Unknown Path", &source, reference)
        .await
        .unwrap();

    let entries = ctx.entries();
    assert_eq!(entries[0].statistics.reference_status, "404");
    assert_eq!(entries[0].statistics.candidate_status, "404");
    assert_eq!(entries[0].statistics.total_lines, 0);
    assert_eq!(entries[0].statistics.status, RunStatus::Passed);
}
