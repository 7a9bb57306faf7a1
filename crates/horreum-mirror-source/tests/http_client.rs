use std::collections::HashMap;
use std::sync::mpsc;
use std::thread::JoinHandle;

use horreum_mirror_source::{
    DatasetSource, HorreumClient, HorreumConfig, ListQuery, SourceError, SourceResult,
    list_datasets,
};
use serde_json::json;
use tiny_http::{Header, Response, Server};

struct SeenRequest {
    url: String,
    headers: HashMap<String, String>,
}

/// Serves `responses` in order, one per request, and reports what each request looked like.
fn serve(
    responses: Vec<(u16, String)>,
) -> (String, mpsc::Receiver<SeenRequest>, JoinHandle<()>) {
    let server = Server::http("127.0.0.1:0").expect("http server");
    let addr = server.server_addr().to_ip().expect("ip listener");
    let base_url = format!("http://{}", addr);
    let (tx, rx) = mpsc::channel();
    let handle = std::thread::spawn(move || {
        for (status, body) in responses {
            let Ok(request) = server.recv() else {
                return;
            };
            let headers = request
                .headers()
                .iter()
                .map(|h| {
                    (
                        h.field.as_str().as_str().to_ascii_lowercase(),
                        h.value.as_str().to_string(),
                    )
                })
                .collect();
            tx.send(SeenRequest {
                url: request.url().to_string(),
                headers,
            })
            .expect("report request");
            let response = Response::from_string(body)
                .with_status_code(status)
                .with_header(Header::from_bytes("Content-Type", "application/json").unwrap());
            request.respond(response).expect("respond");
        }
    });
    (base_url, rx, handle)
}

fn client(base_url: &str) -> HorreumClient {
    HorreumClient::new(&HorreumConfig::new(base_url, "secret-token")).expect("client")
}

fn page_body(ids: std::ops::RangeInclusive<i32>) -> String {
    let datasets: Vec<_> = ids
        .map(|id| json!({"id": id, "testId": 7, "runId": 100 + id, "start": 1700000000000i64, "schemas": []}))
        .collect();
    json!({"datasets": datasets, "total": 99}).to_string()
}

#[test]
fn listing_sends_paging_query_and_auth_headers() {
    let (base_url, rx, handle) = serve(vec![(200, page_body(1..=3))]);
    let client = client(&base_url);

    let datasets = client.fetch_page(7, 2, 3).expect("page");
    handle.join().expect("server thread");

    assert_eq!(datasets.len(), 3);
    assert_eq!(datasets[2].run_id, 103);

    let seen = rx.recv().expect("request");
    let (path, query) = seen.url.split_once('?').expect("query string");
    assert_eq!(path, "/api/dataset/list/7");
    let mut params: Vec<&str> = query.split('&').collect();
    params.sort_unstable();
    assert_eq!(
        params,
        vec!["direction=Descending", "limit=3", "page=2", "sort=start"]
    );
    assert_eq!(seen.headers["x-horreum-api-key"], "secret-token");
    assert_eq!(seen.headers["content-type"], "application/json");
}

#[test]
fn label_values_are_keyed_by_name() {
    let body = json!([
        {"name": "throughput", "value": 1200.5},
        {"name": "config", "value": {"threads": 8}},
        {"name": "empty", "value": null}
    ])
    .to_string();
    let (base_url, rx, handle) = serve(vec![(200, body)]);

    let labels = client(&base_url).fetch_label_values(301).expect("labels");
    handle.join().expect("server thread");

    assert_eq!(labels.len(), 3);
    assert_eq!(labels["throughput"], json!(1200.5));
    assert_eq!(labels["config"], json!({"threads": 8}));
    assert!(labels["empty"].is_null());
    assert_eq!(rx.recv().expect("request").url, "/api/dataset/301/labelValues");
}

#[test]
fn non_success_status_is_fatal() {
    let (base_url, _rx, handle) = serve(vec![(401, "{}".to_string())]);

    let err = client(&base_url).fetch_page(7, 1, 10).unwrap_err();
    handle.join().expect("server thread");

    assert!(matches!(err, SourceError::Status { status: 401, .. }));
}

#[test]
fn malformed_body_is_a_decode_error() {
    let (base_url, _rx, handle) = serve(vec![(200, "[1, 2, 3]".to_string())]);

    let err = client(&base_url).fetch_label_values(5).unwrap_err();
    handle.join().expect("server thread");

    assert!(matches!(err, SourceError::Decode { .. }));
}

#[test]
fn cursor_over_http_stops_after_empty_page() {
    let (base_url, rx, handle) = serve(vec![
        (200, page_body(1..=2)),
        (200, page_body(3..=3)),
        (200, json!({"datasets": []}).to_string()),
    ]);
    let client = client(&base_url);
    let query = ListQuery {
        page_size: 2,
        ..ListQuery::new(7)
    };

    let items: Vec<_> = list_datasets(&client, query)
        .collect::<SourceResult<_>>()
        .expect("datasets");
    handle.join().expect("server thread");

    let ids: Vec<i32> = items.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    let pages: Vec<String> = rx
        .try_iter()
        .map(|seen| {
            let (_, query) = seen.url.split_once('?').expect("query string");
            query
                .split('&')
                .find(|p| p.starts_with("page="))
                .expect("page param")
                .to_string()
        })
        .collect();
    assert_eq!(pages, vec!["page=1", "page=2", "page=3"]);
}

#[test]
fn rejects_token_that_cannot_be_a_header() {
    let err = HorreumClient::new(&HorreumConfig::new("http://127.0.0.1:1", "bad\ntoken")).unwrap_err();
    assert!(matches!(err, SourceError::Config(_)));
}
