//! Mock coordinator wiring over wiremock
//!
//! Helpers mount the endpoints of the default project ("glitch"). Tests
//! asserting on request bodies mount their own mocks before calling these,
//! since wiremock dispatches to the first matching mock in mount order.

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use warc_pipeline::utils::sha256_hex;

use super::fixtures::DICTIONARY;

/// Upload target the mock coordinator assigns
pub const UPLOAD_TARGET: &str = "rsync://upload.invalid/glitch";

/// Serve one batch assignment, then report no work forever
pub async fn mount_single_batch(server: &MockServer, targets: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/glitch/batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "targets": targets })))
        .up_to_n_times(1)
        .mount(server)
        .await;
    mount_no_work(server).await;
}

/// Answer every remaining batch request with no work
pub async fn mount_no_work(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/glitch/batch"))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
}

/// Publish the shared test dictionary under `id`: descriptor plus blob
pub async fn mount_dictionary(server: &MockServer, id: &str) {
    let blob_path = format!("/dictionary-blobs/{id}");
    Mock::given(method("GET"))
        .and(path("/dictionary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "url": format!("{}{blob_path}", server.uri()),
            "sha256": sha256_hex(DICTIONARY),
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(blob_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(DICTIONARY.to_vec()))
        .mount(server)
        .await;
}

/// Accept stats reports, assign [`UPLOAD_TARGET`], accept completions
pub async fn mount_reporting(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/glitch/report"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/glitch/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "url": UPLOAD_TARGET })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/glitch/done"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}
