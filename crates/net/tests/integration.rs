//! Integration tests for net crate

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};
    use edx_errors::{Error, NetworkError, TransferError};
    use edx_events::{channel, AppEvent, DownloadEvent, GeneralEvent, UploadEvent};
    use edx_net::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn client_with(attempts: u32, threshold: u32) -> NetClient {
        let config = NetConfig {
            retry: RetryPolicy::new(attempts, Duration::ZERO),
            ..NetConfig::default()
        };
        let registry = Arc::new(BreakerRegistry::new(BreakerSettings {
            failure_threshold: threshold,
            cooldown: Duration::from_secs(60),
        }));
        NetClient::with_registry(config, registry).unwrap()
    }

    fn client() -> NetClient {
        client_with(3, 10)
    }

    fn session(url: String) -> UploadSession {
        UploadSession::new(url, Utc::now() + ChronoDuration::hours(1))
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    // Upload

    #[tokio::test]
    async fn test_upload_follows_server_declared_offsets() {
        let server = MockServer::start_async().await;
        let (tx, mut rx) = channel();

        let first = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/up/1")
                    .header("content-range", "bytes 0-3/10")
                    .header("content-type", "application/octet-stream")
                    .body("0123");
                then.status(202).json_body(json!({
                    "NextExpectedRange": ["2-9"],
                    "ExpirationDateTime": "2099-01-01T00:00:00Z"
                }));
            })
            .await;
        // Portal only kept two bytes; the next write restarts at 2, not 4
        let second = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/up/1")
                    .header("content-range", "bytes 2-5/10")
                    .body("2345");
                then.status(202)
                    .json_body(json!({ "NextExpectedRange": ["6-"] }));
            })
            .await;
        let last = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/up/1")
                    .header("content-range", "bytes 6-9/10")
                    .body("6789");
                then.status(201);
            })
            .await;

        let options = UploadOptions {
            chunk_size: 4,
            max_stalled_rounds: 3,
        };
        let mut coordinator = UploadCoordinator::new(client(), options, tx);
        let report = coordinator
            .upload_bytes(&session(server.url("/up/1")), &b"0123456789"[..])
            .await
            .unwrap();

        first.assert_hits_async(1).await;
        second.assert_hits_async(1).await;
        last.assert_hits_async(1).await;
        assert_eq!(report.bytes, 10);
        assert_eq!(report.chunks_sent, 3);
        assert_eq!(report.state, UploadState::Completed);
        assert_eq!(coordinator.state(), UploadState::Completed);

        let mut declared = Vec::new();
        let mut extended = Vec::new();
        let mut completed = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                AppEvent::Upload(UploadEvent::ChunkAccepted { next_offset, .. }) => {
                    declared.push(next_offset);
                }
                AppEvent::General(GeneralEvent::DebugLog { context, .. }) => {
                    extended.push(context["expires_at"].clone());
                }
                AppEvent::Upload(UploadEvent::Completed { chunks_sent, .. }) => {
                    assert_eq!(chunks_sent, 3);
                    completed = true;
                }
                _ => {}
            }
        }
        assert_eq!(declared, vec![2, 6]);
        assert_eq!(extended, vec!["2099-01-01T00:00:00+00:00".to_string()]);
        assert!(completed);
    }

    #[tokio::test]
    async fn test_upload_reads_chunks_from_file() {
        let server = MockServer::start_async().await;
        let (tx, _rx) = channel();
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.xml");
        tokio::fs::write(&path, b"abcdefgh").await.unwrap();

        let first = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/up/f")
                    .header("content-range", "bytes 0-4/8")
                    .body("abcde");
                then.status(202)
                    .json_body(json!({ "NextExpectedRange": ["5-7"] }));
            })
            .await;
        let last = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/up/f")
                    .header("content-range", "bytes 5-7/8")
                    .body("fgh");
                then.status(201);
            })
            .await;

        let options = UploadOptions {
            chunk_size: 5,
            max_stalled_rounds: 3,
        };
        let mut coordinator = UploadCoordinator::new(client(), options, tx);
        let report = coordinator
            .upload_file(&session(server.url("/up/f")), &path)
            .await
            .unwrap();

        first.assert_hits_async(1).await;
        last.assert_hits_async(1).await;
        assert_eq!(report.chunks_sent, 2);
    }

    #[tokio::test]
    async fn test_single_range_upload() {
        let server = MockServer::start_async().await;
        let (tx, _rx) = channel();

        let put = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/up/single")
                    .header("content-range", "bytes 0-4/5")
                    .header("content-length", "5")
                    .body("hello");
                then.status(201);
            })
            .await;

        let options = UploadOptions {
            chunk_size: 0,
            max_stalled_rounds: 3,
        };
        let mut coordinator = UploadCoordinator::new(client(), options, tx);
        let report = coordinator
            .upload_bytes(&session(server.url("/up/single")), &b"hello"[..])
            .await
            .unwrap();

        put.assert_hits_async(1).await;
        assert_eq!(report.chunks_sent, 1);
    }

    #[tokio::test]
    async fn test_single_range_upload_requires_created() {
        let server = MockServer::start_async().await;
        let (tx, _rx) = channel();

        server
            .mock_async(|when, then| {
                when.method(PUT).path("/up/single");
                then.status(202)
                    .json_body(json!({ "NextExpectedRange": ["0-"] }));
            })
            .await;

        let mut coordinator = UploadCoordinator::new(client(), UploadOptions::default(), tx);
        let err = coordinator
            .upload_bytes(&session(server.url("/up/single")), &b"hello"[..])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Transfer(TransferError::UnexpectedStatus { status: 202, .. })
        ));
        assert_eq!(coordinator.state(), UploadState::Failed);
    }

    #[tokio::test]
    async fn test_expired_session_makes_no_request() {
        let server = MockServer::start_async().await;
        let (tx, mut rx) = channel();

        let put = server
            .mock_async(|when, then| {
                when.method(PUT).path("/up/old");
                then.status(201);
            })
            .await;

        let expired = UploadSession::new(server.url("/up/old"), Utc::now() - ChronoDuration::minutes(1));
        let mut coordinator = UploadCoordinator::new(client(), UploadOptions::default(), tx);
        let err = coordinator
            .upload_bytes(&expired, &b"payload"[..])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Transfer(TransferError::SessionExpired { .. })
        ));
        assert_eq!(coordinator.state(), UploadState::Expired);
        put.assert_hits_async(0).await;

        let mut saw_expired = false;
        while let Ok(event) = rx.try_recv() {
            if let AppEvent::Upload(UploadEvent::Expired { offset, .. }) = event {
                assert_eq!(offset, 0);
                saw_expired = true;
            }
        }
        assert!(saw_expired);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start_async().await;
        let (tx, _rx) = channel();

        let put = server
            .mock_async(|when, then| {
                when.method(PUT).path("/up/bad");
                then.status(400).json_body(json!({
                    "HTTPStatus": 400,
                    "ErrorCode": "InvalidContentRange",
                    "ErrorMessage": "Content-Range does not match the session",
                    "MoreInfo": ""
                }));
            })
            .await;

        let mut coordinator = UploadCoordinator::new(client(), UploadOptions::default(), tx);
        let err = coordinator
            .upload_bytes(&session(server.url("/up/bad")), &b"payload"[..])
            .await
            .unwrap_err();

        put.assert_hits_async(1).await;
        match err {
            Error::Transfer(TransferError::UnexpectedStatus {
                status,
                code,
                message,
                ..
            }) => {
                assert_eq!(status, 400);
                assert_eq!(code.as_deref(), Some("InvalidContentRange"));
                assert_eq!(message, "Content-Range does not match the session");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(coordinator.state(), UploadState::Failed);
    }

    #[tokio::test]
    async fn test_gateway_html_is_retried_then_reported() {
        let server = MockServer::start_async().await;
        let (tx, _rx) = channel();

        let put = server
            .mock_async(|when, then| {
                when.method(PUT).path("/up/proxy");
                then.status(502)
                    .header("content-type", "text/html")
                    .body("<html><body>Bad Gateway</body></html>");
            })
            .await;

        let mut coordinator = UploadCoordinator::new(client(), UploadOptions::default(), tx);
        let err = coordinator
            .upload_bytes(&session(server.url("/up/proxy")), &b"payload"[..])
            .await
            .unwrap_err();

        put.assert_hits_async(3).await;
        match err {
            Error::Transfer(TransferError::UnexpectedStatus {
                status,
                code,
                message,
                body,
                ..
            }) => {
                assert_eq!(status, 502);
                assert_eq!(code, None);
                assert_eq!(message, "HTTP 502 Bad Gateway");
                assert!(body.contains("Bad Gateway"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upload_stalls_without_progress() {
        let server = MockServer::start_async().await;
        let (tx, _rx) = channel();

        let put = server
            .mock_async(|when, then| {
                when.method(PUT).path("/up/stuck");
                then.status(202)
                    .json_body(json!({ "NextExpectedRange": ["0-9"] }));
            })
            .await;

        let options = UploadOptions {
            chunk_size: 4,
            max_stalled_rounds: 3,
        };
        let mut coordinator = UploadCoordinator::new(client(), options, tx);
        let err = coordinator
            .upload_bytes(&session(server.url("/up/stuck")), &b"0123456789"[..])
            .await
            .unwrap_err();

        put.assert_hits_async(3).await;
        assert!(matches!(
            err,
            Error::Transfer(TransferError::Stalled { offset: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_declared_offset_past_end_is_invalid() {
        let server = MockServer::start_async().await;
        let (tx, _rx) = channel();

        server
            .mock_async(|when, then| {
                when.method(PUT).path("/up/far");
                then.status(202)
                    .json_body(json!({ "NextExpectedRange": ["10-"] }));
            })
            .await;

        let options = UploadOptions {
            chunk_size: 4,
            max_stalled_rounds: 3,
        };
        let mut coordinator = UploadCoordinator::new(client(), options, tx);
        let err = coordinator
            .upload_bytes(&session(server.url("/up/far")), &b"0123456789"[..])
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transfer(TransferError::InvalidRange(_))));
    }

    #[tokio::test]
    async fn test_empty_payload_is_rejected() {
        let server = MockServer::start_async().await;
        let (tx, _rx) = channel();

        let mut coordinator = UploadCoordinator::new(client(), UploadOptions::default(), tx);
        let err = coordinator
            .upload_bytes(&session(server.url("/up/empty")), Vec::<u8>::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transfer(TransferError::EmptyPayload)));
    }

    #[tokio::test]
    async fn test_create_and_cancel_session() {
        let server = MockServer::start_async().await;
        let (tx, _rx) = channel();
        let upload_url = server.url("/up/42");

        let create = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/messages/42/upload-session")
                    .header("authorization", "Bearer secret");
                then.status(200).json_body(json!({
                    "UploadUrl": upload_url,
                    "ExpirationDateTime": "2099-01-01T00:00:00Z"
                }));
            })
            .await;
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/up/42");
                then.status(204);
            })
            .await;

        let config = NetConfig {
            retry: RetryPolicy::new(1, Duration::ZERO),
            ..NetConfig::default()
        }
        .with_bearer_token(Some("secret".to_string()));
        let client = NetClient::with_registry(
            config,
            Arc::new(BreakerRegistry::new(BreakerSettings::default())),
        )
        .unwrap();

        let mut coordinator = UploadCoordinator::new(client, UploadOptions::default(), tx);
        let session = coordinator
            .create_session(&server.url("/messages/42/upload-session"))
            .await
            .unwrap();
        assert_eq!(session.upload_url, server.url("/up/42"));
        assert_eq!(coordinator.state(), UploadState::RequestingSession);

        coordinator.cancel_session(&session).await.unwrap();
        create.assert_hits_async(1).await;
        delete.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_cancel_of_vanished_session_warns() {
        let server = MockServer::start_async().await;
        let (tx, mut rx) = channel();

        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/up/gone");
                then.status(404);
            })
            .await;

        let coordinator = UploadCoordinator::new(client(), UploadOptions::default(), tx);
        coordinator
            .cancel_session(&session(server.url("/up/gone")))
            .await
            .unwrap();

        delete.assert_hits_async(1).await;
        let mut warned = false;
        while let Ok(event) = rx.try_recv() {
            if let AppEvent::General(GeneralEvent::Warning { context, .. }) = event {
                assert_eq!(context, Some(server.url("/up/gone")));
                warned = true;
            }
        }
        assert!(warned);
    }

    #[tokio::test]
    async fn test_unreadable_session_document() {
        let server = MockServer::start_async().await;
        let (tx, _rx) = channel();

        server
            .mock_async(|when, then| {
                when.method(POST).path("/session");
                then.status(201).body("<html>maintenance</html>");
            })
            .await;

        let mut coordinator = UploadCoordinator::new(client(), UploadOptions::default(), tx);
        let err = coordinator
            .create_session(&server.url("/session"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Transfer(TransferError::InvalidSession(_))
        ));
        assert_eq!(coordinator.state(), UploadState::Failed);
    }

    // Download

    #[tokio::test]
    async fn test_full_download() {
        let server = MockServer::start_async().await;
        let (tx, mut rx) = channel();
        let content = b"test file content";

        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/doc.bin").header_missing("range");
                then.status(200).body(content);
            })
            .await;

        let temp = tempdir().unwrap();
        let dest = temp.path().join("doc.bin");
        let coordinator = DownloadCoordinator::new(client(), tx);
        let report = coordinator
            .download(
                &server.url("/doc.bin"),
                &dest,
                &DownloadOptions::default().with_chunk_size(0),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(report.bytes, content.len() as u64);
        assert_eq!(report.ranges, 1);
        assert!(!report.skipped);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), content);

        let mut saw_start = false;
        let mut saw_complete = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                AppEvent::Download(DownloadEvent::Started { .. }) => saw_start = true,
                AppEvent::Download(DownloadEvent::Completed { .. }) => saw_complete = true,
                _ => {}
            }
        }
        assert!(saw_start);
        assert!(saw_complete);
    }

    #[tokio::test]
    async fn test_download_into_missing_directory() {
        let server = MockServer::start_async().await;
        let (tx, _rx) = channel();

        server
            .mock_async(|when, then| {
                when.method(GET).path("/doc.bin");
                then.status(200).body("nested content");
            })
            .await;

        let temp = tempdir().unwrap();
        let dest = temp.path().join("new/sub/doc.bin");
        let report = DownloadCoordinator::new(client(), tx)
            .download(
                &server.url("/doc.bin"),
                &dest,
                &DownloadOptions::default().with_chunk_size(0),
            )
            .await
            .unwrap();

        assert_eq!(report.bytes, 14);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"nested content");
        assert!(!temp.path().join("new/sub/doc.bin.lock").exists());
    }

    #[tokio::test]
    async fn test_server_may_ignore_range_request() {
        let server = MockServer::start_async().await;
        let (tx, mut rx) = channel();
        let content = payload(10_000);

        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/doc.bin").header("range", "bytes=0-4095");
                then.status(200).body(&content);
            })
            .await;

        let temp = tempdir().unwrap();
        let dest = temp.path().join("doc.bin");
        let report = DownloadCoordinator::new(client(), tx)
            .download(
                &server.url("/doc.bin"),
                &dest,
                &DownloadOptions::default().with_chunk_size(4096),
            )
            .await
            .unwrap();

        mock.assert_hits_async(1).await;
        assert_eq!(report.bytes, 10_000);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), content);
        assert!(std::iter::from_fn(|| rx.try_recv().ok()).any(|event| matches!(
            event,
            AppEvent::General(GeneralEvent::Warning { .. })
        )));
    }

    #[tokio::test]
    async fn test_ranged_download_in_three_parts() {
        let server = MockServer::start_async().await;
        let (tx, _rx) = channel();
        let content = payload(10_000);

        let mut mocks = Vec::new();
        for (from, to) in [(0usize, 4095usize), (4096, 8191), (8192, 9999)] {
            let body = content[from..=to].to_vec();
            mocks.push(
                server
                    .mock_async(|when, then| {
                        when.method(GET)
                            .path("/big.bin")
                            .header("range", format!("bytes={from}-{to}"));
                        then.status(206)
                            .header("content-range", format!("bytes {from}-{to}/10000"))
                            .body(body);
                    })
                    .await,
            );
        }

        let temp = tempdir().unwrap();
        let dest = temp.path().join("big.bin");
        let report = DownloadCoordinator::new(client(), tx)
            .download(
                &server.url("/big.bin"),
                &dest,
                &DownloadOptions::default().with_chunk_size(4096),
            )
            .await
            .unwrap();

        for mock in &mocks {
            mock.assert_hits_async(1).await;
        }
        assert_eq!(report.ranges, 3);
        assert_eq!(report.bytes, 10_000);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), content);
    }

    #[tokio::test]
    async fn test_short_range_resumes_at_written_offset() {
        let server = MockServer::start_async().await;
        let (tx, _rx) = channel();
        let content = payload(10_000);

        // Asked for 4096 bytes, got 3000; later ranges start where the file ends
        let answers = [
            ("bytes=0-4095", 0usize, 2999usize),
            ("bytes=3000-7095", 3000, 7095),
            ("bytes=7096-9999", 7096, 9999),
        ];
        let mut mocks = Vec::new();
        for (range, from, to) in answers {
            let body = content[from..=to].to_vec();
            mocks.push(
                server
                    .mock_async(|when, then| {
                        when.method(GET).path("/short.bin").header("range", range);
                        then.status(206)
                            .header("content-range", format!("bytes {from}-{to}/10000"))
                            .body(body);
                    })
                    .await,
            );
        }

        let temp = tempdir().unwrap();
        let dest = temp.path().join("short.bin");
        let report = DownloadCoordinator::new(client(), tx)
            .download(
                &server.url("/short.bin"),
                &dest,
                &DownloadOptions::default().with_chunk_size(4096),
            )
            .await
            .unwrap();

        for mock in &mocks {
            mock.assert_hits_async(1).await;
        }
        assert_eq!(report.ranges, 3);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), content);
    }

    #[tokio::test]
    async fn test_existing_destination_is_skipped() {
        let server = MockServer::start_async().await;
        let (tx, _rx) = channel();

        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/doc.bin");
                then.status(200).body("fresh");
            })
            .await;

        let temp = tempdir().unwrap();
        let dest = temp.path().join("doc.bin");
        tokio::fs::write(&dest, b"old").await.unwrap();

        let coordinator = DownloadCoordinator::new(client(), tx);
        let report = coordinator
            .download(&server.url("/doc.bin"), &dest, &DownloadOptions::default())
            .await
            .unwrap();
        assert!(report.skipped);
        assert_eq!(report.bytes, 3);
        mock.assert_hits_async(0).await;

        let report = coordinator
            .download(
                &server.url("/doc.bin"),
                &dest,
                &DownloadOptions::default().with_overwrite(true).with_chunk_size(0),
            )
            .await
            .unwrap();
        assert!(!report.skipped);
        mock.assert_hits_async(1).await;
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_failed_continuation_keeps_partial_file() {
        let server = MockServer::start_async().await;
        let (tx, _rx) = channel();

        server
            .mock_async(|when, then| {
                when.method(GET).path("/part.bin").header("range", "bytes=0-3");
                then.status(206)
                    .header("content-range", "bytes 0-3/10")
                    .body("0123");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/part.bin").header("range", "bytes=4-7");
                then.status(404).json_body(json!({
                    "HTTPStatus": 404,
                    "ErrorCode": "NotFound",
                    "ErrorMessage": "Message was withdrawn"
                }));
            })
            .await;

        let temp = tempdir().unwrap();
        let dest = temp.path().join("part.bin");
        let err = DownloadCoordinator::new(client(), tx)
            .download(
                &server.url("/part.bin"),
                &dest,
                &DownloadOptions::default().with_chunk_size(4),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Transfer(TransferError::UnexpectedStatus { status: 404, .. })
        ));
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"0123");
    }

    #[tokio::test]
    async fn test_partial_response_without_content_range() {
        let server = MockServer::start_async().await;
        let (tx, _rx) = channel();

        server
            .mock_async(|when, then| {
                when.method(GET).path("/odd.bin");
                then.status(206).body("0123");
            })
            .await;

        let temp = tempdir().unwrap();
        let err = DownloadCoordinator::new(client(), tx)
            .download(
                &server.url("/odd.bin"),
                &temp.path().join("odd.bin"),
                &DownloadOptions::default().with_chunk_size(4),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Transfer(TransferError::MissingContentRange)
        ));
    }

    #[tokio::test]
    async fn test_misaligned_continuation_is_rejected() {
        let server = MockServer::start_async().await;
        let (tx, _rx) = channel();

        server
            .mock_async(|when, then| {
                when.method(GET).path("/shift.bin").header("range", "bytes=0-3");
                then.status(206)
                    .header("content-range", "bytes 0-3/10")
                    .body("0123");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/shift.bin").header("range", "bytes=4-7");
                then.status(206)
                    .header("content-range", "bytes 2-5/10")
                    .body("2345");
            })
            .await;

        let temp = tempdir().unwrap();
        let dest = temp.path().join("shift.bin");
        let err = DownloadCoordinator::new(client(), tx)
            .download(
                &server.url("/shift.bin"),
                &dest,
                &DownloadOptions::default().with_chunk_size(4),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transfer(TransferError::InvalidRange(_))));
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"0123");
    }

    #[tokio::test]
    async fn test_empty_continuation_stalls() {
        let server = MockServer::start_async().await;
        let (tx, _rx) = channel();

        server
            .mock_async(|when, then| {
                when.method(GET).path("/empty.bin").header("range", "bytes=0-3");
                then.status(206)
                    .header("content-range", "bytes 0-3/10")
                    .body("0123");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/empty.bin").header("range", "bytes=4-7");
                then.status(206).header("content-range", "bytes 4-7/10");
            })
            .await;

        let temp = tempdir().unwrap();
        let err = DownloadCoordinator::new(client(), tx)
            .download(
                &server.url("/empty.bin"),
                &temp.path().join("empty.bin"),
                &DownloadOptions::default().with_chunk_size(4),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Transfer(TransferError::Stalled { offset: 4, .. })
        ));
    }

    // Resilience shared between coordinators

    #[tokio::test]
    async fn test_open_circuit_protects_other_transfers() {
        let server = MockServer::start_async().await;
        let (tx, _rx) = channel();

        let down = server
            .mock_async(|when, then| {
                when.method(GET).path("/flaky.bin");
                then.status(503);
            })
            .await;
        let put = server
            .mock_async(|when, then| {
                when.method(PUT).path("/up/healthy");
                then.status(201);
            })
            .await;

        let client = client_with(1, 2);
        let downloads = DownloadCoordinator::new(client.clone(), tx.clone());
        let temp = tempdir().unwrap();
        let options = DownloadOptions::default().with_chunk_size(0);

        for name in ["a.bin", "b.bin"] {
            let err = downloads
                .download(&server.url("/flaky.bin"), &temp.path().join(name), &options)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                Error::Transfer(TransferError::UnexpectedStatus { status: 503, .. })
            ));
        }
        down.assert_hits_async(2).await;

        let mut uploads = UploadCoordinator::new(client, UploadOptions::default(), tx);
        let err = uploads
            .upload_bytes(&session(server.url("/up/healthy")), &b"data"[..])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Network(NetworkError::CircuitOpen { .. })
        ));
        put.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_download_file_helper() {
        let server = MockServer::start_async().await;
        let (tx, _rx) = channel();

        server
            .mock_async(|when, then| {
                when.method(GET).path("/small.txt");
                then.status(200).body("tiny");
            })
            .await;

        let temp = tempdir().unwrap();
        let dest = temp.path().join("small.txt");
        let report = download_file(&client(), &server.url("/small.txt"), &dest, &tx)
            .await
            .unwrap();
        assert_eq!(report.bytes, 4);
    }
}
