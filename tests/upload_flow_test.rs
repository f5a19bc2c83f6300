//! Upload protocol tests against a mock asset host

mod common;

use common::{asset_path, assets_path, finish_path, host_config, write_example, TOKEN};
use serde_json::json;
use std::time::{Duration, Instant};
use transform_bench::corpus::ImageFormat;
use transform_bench::host::{AssetHostClient, HostError};
use transform_bench::upload::{UploadError, UploadOrchestrator, UploadStep, Uploader};
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn uploader(server: &MockServer) -> Uploader {
    Uploader::new(AssetHostClient::new(host_config(server)).unwrap())
}

fn descriptor(server: &MockServer, id: u64) -> serde_json::Value {
    json!({
        "id": id,
        "post_url": format!("{}/upload-bucket", server.uri()),
        "fields": {
            "key": format!("f/247220/1080x720/{id}/photo.png"),
            "acl": "public-read",
            "Content-Type": "image/png",
            "policy": "eyJleHBpcmF0aW9uIjoiMjAyNi0xMC0xOCJ9",
            "x-amz-credential": "AKIA/20261018/us-east-1/s3/aws4_request",
            "x-amz-signature": "c0ffee"
        }
    })
}

async fn mount_signed_upload(server: &MockServer, id: u64) {
    Mock::given(method("POST"))
        .and(path(assets_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(descriptor(server, id)))
        .mount(server)
        .await;
}

async fn mount_submit(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path("/upload-bucket"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

async fn mount_finish(server: &MockServer, id: &str, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(finish_path(id)))
        .and(header("authorization", TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": id })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_asset(server: &MockServer, id: &str, filename: &str) {
    Mock::given(method("GET"))
        .and(path(asset_path(id)))
        .and(header("authorization", TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "filename": filename
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_upload_resolves_public_url() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let image = write_example(dir.path(), "photo", 1080, 720, ImageFormat::Png);

    Mock::given(method("POST"))
        .and(path(assets_path()))
        .and(header("authorization", TOKEN))
        .and(body_json(json!({
            "filename": "photo-1080x720.png",
            "size": "1080x720"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(descriptor(&server, 42)))
        .expect(1)
        .mount(&server)
        .await;
    mount_submit(&server, 204).await;
    mount_finish(&server, "42", 1).await;
    mount_asset(
        &server,
        "42",
        "https://s3.amazonaws.com/a.storyblok.com/f/247220/1080x720/42/photo-1080x720.png",
    )
    .await;

    let asset = uploader(&server).upload(&image).await.unwrap();

    assert_eq!(asset.asset_id, "42");
    assert_eq!(
        asset.url,
        "https://a.storyblok.com/f/247220/1080x720/42/photo-1080x720.png"
    );
    assert_eq!(asset.image, image);
}

#[tokio::test]
async fn test_every_signed_field_is_submitted_before_file() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let image = write_example(dir.path(), "photo", 1080, 720, ImageFormat::Png);

    mount_signed_upload(&server, 7).await;
    mount_submit(&server, 204).await;
    mount_finish(&server, "7", 1).await;
    mount_asset(&server, "7", "https://s3.amazonaws.com/cdn/photo.png").await;

    uploader(&server).upload(&image).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let submission = requests
        .iter()
        .find(|r| r.url.path() == "/upload-bucket")
        .expect("form was submitted");
    let body = String::from_utf8_lossy(&submission.body);

    let file_pos = body.find("name=\"file\"").expect("file part present");
    let fields = descriptor(&server, 7);
    for (key, value) in fields["fields"].as_object().unwrap() {
        let expected = format!("name=\"{key}\"\r\n\r\n{}\r\n", value.as_str().unwrap());
        let pos = body
            .find(&expected)
            .unwrap_or_else(|| panic!("field {key} missing from submission"));
        assert!(pos < file_pos, "field {key} must precede the file");
    }
    assert!(body.contains("photo pixels"), "file content streamed");
    assert!(body.contains("filename=\"photo-1080x720.png\""));
}

#[tokio::test]
async fn test_failed_submission_skips_finalize() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let image = write_example(dir.path(), "photo", 640, 480, ImageFormat::Webp);

    mount_signed_upload(&server, 9).await;
    mount_submit(&server, 403).await;
    mount_finish(&server, "9", 0).await;

    let err = uploader(&server).upload(&image).await.unwrap_err();
    assert_eq!(err.step(), Some(UploadStep::Submit));
}

#[tokio::test]
async fn test_failed_finalize_is_reported() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let image = write_example(dir.path(), "photo", 640, 480, ImageFormat::Webp);

    mount_signed_upload(&server, 11).await;
    mount_submit(&server, 204).await;
    Mock::given(method("GET"))
        .and(path(finish_path("11")))
        .respond_with(ResponseTemplate::new(422).set_body_string("asset not found in storage"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(asset_path("11")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = uploader(&server).upload(&image).await.unwrap_err();
    assert_eq!(err.step(), Some(UploadStep::Finalize));
    assert!(format!("{err:?}").contains("asset not found in storage"));
}

#[tokio::test]
async fn test_malformed_finish_response_fails_finalize() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let image = write_example(dir.path(), "photo", 640, 480, ImageFormat::Webp);

    mount_signed_upload(&server, 12).await;
    mount_submit(&server, 204).await;
    Mock::given(method("GET"))
        .and(path(finish_path("12")))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(asset_path("12")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = uploader(&server).upload(&image).await.unwrap_err();
    assert_eq!(err.step(), Some(UploadStep::Finalize));
    assert!(matches!(
        err,
        UploadError::Step {
            source: HostError::Decode(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_rejected_request_is_attributed() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let image = write_example(dir.path(), "photo", 640, 480, ImageFormat::Jpeg);

    Mock::given(method("POST"))
        .and(path(assets_path()))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let err = uploader(&server).upload(&image).await.unwrap_err();
    assert_eq!(err.step(), Some(UploadStep::Request));
}

#[tokio::test]
async fn test_finish_response_id_is_used_for_lookup() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let image = write_example(dir.path(), "photo", 640, 480, ImageFormat::Jpeg);

    mount_signed_upload(&server, 5).await;
    mount_submit(&server, 204).await;
    Mock::given(method("GET"))
        .and(path(finish_path("5")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 777 })))
        .mount(&server)
        .await;
    mount_asset(&server, "777", "https://s3.amazonaws.com/cdn/final.jpeg").await;

    let asset = uploader(&server).upload(&image).await.unwrap();
    assert_eq!(asset.asset_id, "777");
    assert_eq!(asset.url, "https://cdn/final.jpeg");
}

#[tokio::test]
async fn test_orchestrator_keeps_order_and_completes_all() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let images: Vec<_> = (1..=3)
        .map(|i| write_example(dir.path(), &format!("img{i}"), 100 * i, 50 * i, ImageFormat::Png))
        .collect();

    for (i, image) in images.iter().enumerate() {
        let id = (i + 1) as u64;
        Mock::given(method("POST"))
            .and(path(assets_path()))
            .and(body_partial_json(json!({ "filename": image.file_name() })))
            .respond_with(ResponseTemplate::new(200).set_body_json(descriptor(&server, id)))
            .mount(&server)
            .await;
        mount_finish(&server, &id.to_string(), 1).await;
        mount_asset(
            &server,
            &id.to_string(),
            &format!("https://s3.amazonaws.com/cdn/{}", image.file_name()),
        )
        .await;
    }
    mount_submit(&server, 204).await;

    let orchestrator = UploadOrchestrator::new(uploader(&server), Duration::from_millis(5));
    let assets = orchestrator.upload_all(images.clone()).await.unwrap();

    assert_eq!(assets.len(), 3);
    for (asset, image) in assets.iter().zip(&images) {
        assert_eq!(&asset.image, image);
        assert_eq!(asset.url, format!("https://cdn/{}", image.file_name()));
    }
}

#[tokio::test]
async fn test_orchestrator_failure_does_not_cancel_siblings() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let images: Vec<_> = (1..=3)
        .map(|i| write_example(dir.path(), &format!("img{i}"), 100 * i, 50 * i, ImageFormat::Png))
        .collect();

    for (i, image) in images.iter().enumerate() {
        let id = (i + 1) as u64;
        let response = if i == 0 {
            ResponseTemplate::new(500).set_body_string("boom")
        } else {
            ResponseTemplate::new(200).set_body_json(descriptor(&server, id))
        };
        Mock::given(method("POST"))
            .and(path(assets_path()))
            .and(body_partial_json(json!({ "filename": image.file_name() })))
            .respond_with(response)
            .mount(&server)
            .await;
        if i > 0 {
            // Siblings of the failed upload still run to completion
            mount_finish(&server, &id.to_string(), 1).await;
            mount_asset(&server, &id.to_string(), "https://s3.amazonaws.com/cdn/x.png").await;
        }
    }
    mount_submit(&server, 204).await;

    let orchestrator = UploadOrchestrator::new(uploader(&server), Duration::from_millis(5));
    let err = orchestrator.upload_all(images).await.unwrap_err();
    assert_eq!(err.step(), Some(UploadStep::Request));
}

#[tokio::test]
async fn test_orchestrator_overlaps_slow_uploads() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let images: Vec<_> = (1..=4)
        .map(|i| write_example(dir.path(), &format!("slow{i}"), 100 * i, 50 * i, ImageFormat::Png))
        .collect();
    let delay = Duration::from_millis(400);

    for (i, image) in images.iter().enumerate() {
        let id = (i + 1).to_string();
        Mock::given(method("POST"))
            .and(path(assets_path()))
            .and(body_partial_json(json!({ "filename": image.file_name() })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(descriptor(&server, (i + 1) as u64))
                    .set_delay(delay),
            )
            .mount(&server)
            .await;
        mount_finish(&server, &id, 1).await;
        mount_asset(&server, &id, "https://s3.amazonaws.com/cdn/slow.png").await;
    }
    mount_submit(&server, 204).await;

    let orchestrator = UploadOrchestrator::new(uploader(&server), Duration::from_millis(50));
    let started = Instant::now();
    let assets = orchestrator.upload_all(images).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(assets.len(), 4);
    // Awaiting each upload in turn would take at least 4 x 400ms
    assert!(elapsed < Duration::from_millis(1200), "took {elapsed:?}");
}
