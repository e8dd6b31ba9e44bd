mod common;

use flate2::read::GzDecoder;
use report_database::Database;
use report_upload_worker::{
    CumulativeStats, HttpTransport, ReportSubmitter, ReportUploader, SubmitOutcome, SyncGate,
    TransportConfig, UploaderConfig,
};
use serde_json::Value;
use std::io::Read;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BODY: &[u8] = br#"{"items":[{"time":"2024-03-01T12:00:00.000Z","lat":1.0,"lon":2.0,"radio":"","cell":[],"wifi":[]}]}"#;

fn transport(server: &MockServer) -> HttpTransport {
    let endpoint = Url::parse(&format!("{}/v1/submit", server.uri())).unwrap();
    let mut config = TransportConfig::new(endpoint);
    config.api_key = Some("test-key".to_string());
    config.nickname = Some("walker".to_string());
    config.timeout = Duration::from_secs(5);
    HttpTransport::new(config).unwrap()
}

fn gunzip(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut out).unwrap();
    out
}

#[tokio::test]
async fn compressed_submission_carries_headers_and_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/submit"))
        .and(query_param("key", "test-key"))
        .and(header("content-encoding", "gzip"))
        .and(header("content-type", "application/json"))
        .and(header("x-nickname", "walker"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = transport(&server).submit(BODY, true).await;
    assert_eq!(outcome, SubmitOutcome::Accepted { status: 204 });

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    assert_eq!(gunzip(&request.body), BODY);

    let declared: usize = request
        .headers
        .get("content-length")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(declared, request.body.len());

    let agent = request.headers.get("user-agent").unwrap().to_str().unwrap();
    assert!(agent.starts_with("stumbler-sync/"));
}

#[tokio::test]
async fn uncompressed_submission_sends_raw_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let outcome = transport(&server).submit(BODY, false).await;
    assert_eq!(outcome, SubmitOutcome::Accepted { status: 200 });

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].body, BODY);
    assert!(requests[0].headers.get("content-encoding").is_none());
}

#[tokio::test]
async fn status_codes_are_classified() {
    for (status, expected) in [
        (400, SubmitOutcome::RejectedMalformed),
        (404, SubmitOutcome::RejectedPermanent { status: 404 }),
        (413, SubmitOutcome::RejectedPermanent { status: 413 }),
        (500, SubmitOutcome::RejectedTransient { status: 500 }),
        (503, SubmitOutcome::RejectedTransient { status: 503 }),
    ] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        let outcome = transport(&server).submit(BODY, true).await;
        assert_eq!(outcome, expected, "status {}", status);
    }
}

#[tokio::test]
async fn connection_refused_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let endpoint = Url::parse(&format!("http://{}/v1/submit", addr)).unwrap();
    let transport = HttpTransport::new(TransportConfig::new(endpoint)).unwrap();

    let outcome = transport.submit(BODY, true).await;
    assert!(matches!(outcome, SubmitOutcome::TransportError { .. }));
}

#[tokio::test]
async fn timeout_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let endpoint = Url::parse(&format!("{}/v1/submit", server.uri())).unwrap();
    let mut config = TransportConfig::new(endpoint);
    config.timeout = Duration::from_millis(200);
    let transport = HttpTransport::new(config).unwrap();

    let outcome = transport.submit(BODY, false).await;
    assert!(matches!(outcome, SubmitOutcome::TransportError { .. }));
}

#[tokio::test]
async fn run_against_server_rejecting_gzip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("content-encoding", "gzip"))
        .respond_with(ResponseTemplate::new(400))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let db = Database::open_in_memory().unwrap();
    common::seed(&db, 7);
    let config = UploaderConfig {
        batch_size: 3,
        ..Default::default()
    };
    let uploader = ReportUploader::new(config, &db, transport(&server));

    let report = uploader
        .run(SyncGate {
            network_acceptable: true,
            force: false,
        })
        .await;

    assert_eq!(report.windows, 3);
    assert_eq!(report.batches_uploaded, 3);
    assert_eq!(report.submissions, 6);
    assert_eq!(report.io_errors, 0);
    assert_eq!(db.report_count().unwrap(), 0);
    assert_eq!(CumulativeStats::load(&db).unwrap().observations_sent, 7);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 6);
    let plain: Vec<Value> = requests
        .iter()
        .filter(|r| r.headers.get("content-encoding").is_none())
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    let items: usize = plain
        .iter()
        .map(|doc| doc["items"].as_array().unwrap().len())
        .sum();
    assert_eq!(items, 7);
}
