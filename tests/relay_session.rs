//! Producer and consumer sessions run against an in-memory relay.

mod common;

use common::{fast_config, known, MemoryRelay};
use davrelay::consumer::fetch_verified;
use davrelay::producer::wait_for_capacity;
use davrelay::{
    run_consumer, run_producer, CommandAcquirer, ManifestEntry, ProducerRequest, Source,
    TransferError,
};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn position(events: &[String], event: &str) -> usize {
    events
        .iter()
        .position(|e| e == event)
        .unwrap_or_else(|| panic!("no event {:?} in {:?}", event, events))
}

fn local_request(path: &Path) -> ProducerRequest {
    ProducerRequest {
        source: Source::Local(path.to_path_buf()),
        file_name: path.file_name().unwrap().to_string_lossy().into_owned(),
    }
}

#[tokio::test]
async fn file_survives_the_relay_byte_for_byte() {
    let dir = TempDir::new().unwrap();
    let data = payload(2600);
    let source = dir.path().join("payload.bin");
    std::fs::write(&source, &data).unwrap();

    let producer_config = fast_config(&dir.path().join("producer"));
    let mut consumer_config = fast_config(&dir.path().join("consumer"));
    consumer_config.output_dir = Some(dir.path().join("out"));

    let relay = MemoryRelay::new();
    let acquirer = CommandAcquirer::new(Vec::new());
    let request = local_request(&source);

    let (produced, consumed) = tokio::join!(
        run_producer(&producer_config, &relay, &acquirer, &request),
        run_consumer(&consumer_config, &relay),
    );
    let produced = produced.unwrap();
    let consumed = consumed.unwrap();

    assert_eq!(produced.chunks, 3);
    assert_eq!(produced.bytes, 2600);
    assert_eq!(consumed.chunks, 3);
    assert_eq!(consumed.outputs, vec![dir.path().join("out").join("payload.bin")]);
    assert_eq!(std::fs::read(&consumed.outputs[0]).unwrap(), data);

    // Relay drained, scratch space gone, local source untouched.
    assert!(relay.names().is_empty());
    assert!(!producer_config.chunk_dir().exists());
    assert!(!producer_config.manifest_path().exists());
    assert!(!consumer_config.chunk_dir().exists());
    assert!(!consumer_config.manifest_path().exists());
    assert!(source.exists());
}

#[tokio::test]
async fn next_chunk_waits_for_deletion_of_the_previous() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("movie.mkv");
    std::fs::write(&source, payload(3000)).unwrap();

    let producer_config = fast_config(&dir.path().join("producer"));
    let consumer_config = fast_config(&dir.path().join("consumer"));
    let relay = MemoryRelay::new();
    let acquirer = CommandAcquirer::new(Vec::new());

    let request = local_request(&source);
    let (produced, consumed) = tokio::join!(
        run_producer(&producer_config, &relay, &acquirer, &request),
        run_consumer(&consumer_config, &relay),
    );
    produced.unwrap();
    consumed.unwrap();

    let events = relay.events();
    assert!(position(&events, "upload manifest.txt") < position(&events, "upload movie.mkv.part000"));

    let chunks = ["movie.mkv.part000", "movie.mkv.part001", "movie.mkv.part002"];
    for chunk in chunks {
        let uploaded = position(&events, &format!("upload {}", chunk));
        let downloaded = position(&events, &format!("download {}", chunk));
        let deleted = position(&events, &format!("delete {}", chunk));
        assert!(uploaded < downloaded && downloaded < deleted, "{:?}", events);
    }
    for pair in chunks.windows(2) {
        let deleted = position(&events, &format!("delete {}", pair[0]));
        let next_upload = position(&events, &format!("upload {}", pair[1]));
        assert!(deleted < next_upload, "{:?}", events);
    }
    assert_eq!(events.last().map(String::as_str), Some("delete manifest.txt"));
}

#[tokio::test]
async fn rejected_uploads_are_retried_not_skipped() {
    let dir = TempDir::new().unwrap();
    let data = payload(1500);
    let source = dir.path().join("big.iso");
    std::fs::write(&source, &data).unwrap();

    let producer_config = fast_config(&dir.path().join("producer"));
    let consumer_config = fast_config(&dir.path().join("consumer"));
    let relay = MemoryRelay::new();
    relay.fail_next_uploads(2);
    let acquirer = CommandAcquirer::new(Vec::new());

    let request = local_request(&source);
    let (produced, consumed) = tokio::join!(
        run_producer(&producer_config, &relay, &acquirer, &request),
        run_consumer(&consumer_config, &relay),
    );

    assert_eq!(produced.unwrap().chunks, 2);
    let outputs = consumed.unwrap().outputs;
    assert_eq!(std::fs::read(&outputs[0]).unwrap(), data);
    let rejected = relay
        .events()
        .iter()
        .filter(|e| e.starts_with("rejected "))
        .count();
    assert_eq!(rejected, 2);
}

#[tokio::test]
async fn stored_upload_with_lost_reply_is_not_sent_again() {
    let dir = TempDir::new().unwrap();
    let data = payload(2000);
    let source = dir.path().join("f.bin");
    std::fs::write(&source, &data).unwrap();

    let mut producer_config = fast_config(&dir.path().join("producer"));
    producer_config.quota_poll_interval = Duration::from_millis(300);
    producer_config.max_wait = Some(Duration::from_secs(3));
    let mut consumer_config = fast_config(&dir.path().join("consumer"));
    consumer_config.max_wait = Some(Duration::from_secs(3));

    let relay = MemoryRelay::new();
    relay.lose_upload_reply("f.bin.part000");
    let acquirer = CommandAcquirer::new(Vec::new());

    let request = local_request(&source);
    let (produced, consumed) = tokio::join!(
        run_producer(&producer_config, &relay, &acquirer, &request),
        run_consumer(&consumer_config, &relay),
    );

    assert_eq!(produced.unwrap().chunks, 2);
    let outputs = consumed.unwrap().outputs;
    assert_eq!(std::fs::read(&outputs[0]).unwrap(), data);

    let uploads = relay
        .events()
        .iter()
        .filter(|e| *e == "upload f.bin.part000")
        .count();
    assert_eq!(uploads, 1);
    assert!(relay.names().is_empty());
}

#[tokio::test]
async fn local_source_is_relayed_under_requested_name() {
    let dir = TempDir::new().unwrap();
    let data = payload(1800);
    let source = dir.path().join("capture-0042.dat");
    std::fs::write(&source, &data).unwrap();

    let producer_config = fast_config(&dir.path().join("producer"));
    let mut consumer_config = fast_config(&dir.path().join("consumer"));
    consumer_config.output_dir = Some(dir.path().join("out"));
    let relay = MemoryRelay::new();
    let request = ProducerRequest {
        source: Source::Local(source.clone()),
        file_name: "holiday.mkv".to_string(),
    };

    let acquirer = CommandAcquirer::new(Vec::new());
    let (produced, consumed) = tokio::join!(
        run_producer(&producer_config, &relay, &acquirer, &request),
        run_consumer(&consumer_config, &relay),
    );
    produced.unwrap();
    let outputs = consumed.unwrap().outputs;

    assert_eq!(outputs, vec![dir.path().join("out").join("holiday.mkv")]);
    assert_eq!(std::fs::read(&outputs[0]).unwrap(), data);
    assert!(relay.events().contains(&"upload holiday.mkv.part001".to_string()));
    assert!(source.exists());
}

#[tokio::test]
async fn producer_refuses_when_relay_cannot_hold_a_chunk() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("payload.bin");
    std::fs::write(&source, payload(4096)).unwrap();

    let config = fast_config(&dir.path().join("producer"));
    let relay = MemoryRelay::with_quotas([known(512)]);
    let acquirer = CommandAcquirer::new(Vec::new());

    let err = run_producer(&config, &relay, &acquirer, &local_request(&source))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransferError::InsufficientSpace {
            location: "relay",
            ..
        }
    ));
    assert!(relay.events().is_empty());
    assert!(source.exists());
}

#[tokio::test]
async fn producer_requires_a_file_name() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(dir.path());
    let relay = MemoryRelay::new();
    let request = ProducerRequest {
        source: Source::Http("https://example.invalid/file".to_string()),
        file_name: "  ".to_string(),
    };

    let err = run_producer(&config, &relay, &CommandAcquirer::new(Vec::new()), &request)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::MissingInput(_)));
}

#[tokio::test]
async fn corrupt_chunk_is_fetched_again() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(dir.path());
    let data = payload(700);
    let relay = MemoryRelay::new();
    relay.put("f.bin.part000", &data);
    relay.corrupt_next(2);

    let entry = ManifestEntry {
        chunk_name: "f.bin.part000".to_string(),
        checksum: sha256_hex(&data).to_uppercase(),
    };
    let local = fetch_verified(&relay, &entry, dir.path(), &config)
        .await
        .unwrap();

    assert_eq!(relay.downloads.load(Ordering::SeqCst), 3);
    assert_eq!(std::fs::read(local).unwrap(), data);
}

#[tokio::test]
async fn verification_gives_up_after_three_attempts() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(dir.path());
    let data = payload(700);
    let relay = MemoryRelay::new();
    relay.put("f.bin.part000", &data);
    relay.corrupt_next(usize::MAX);

    let entry = ManifestEntry {
        chunk_name: "f.bin.part000".to_string(),
        checksum: sha256_hex(&data),
    };
    let err = fetch_verified(&relay, &entry, dir.path(), &config)
        .await
        .unwrap_err();

    match err {
        TransferError::VerificationFailed {
            chunk,
            attempts,
            source,
        } => {
            assert_eq!(chunk, "f.bin.part000");
            assert_eq!(attempts, 3);
            assert!(matches!(*source, TransferError::ChecksumMismatch { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(relay.downloads.load(Ordering::SeqCst), 3);
    assert!(!dir.path().join("f.bin.part000").exists());
    // The chunk stays on the relay; it was never acknowledged.
    assert_eq!(relay.names(), vec!["f.bin.part000".to_string()]);
}

#[tokio::test]
async fn capacity_gate_waits_for_space() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(dir.path());
    let relay = MemoryRelay::with_quotas([known(512), known(512), known(1024)]);

    wait_for_capacity(&relay, 1024, &config).await.unwrap();
    assert_eq!(relay.quota_probes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn capacity_gate_proceeds_when_quota_turns_unknown() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(dir.path());
    let relay = MemoryRelay::with_quotas([known(512)]);

    wait_for_capacity(&relay, 1024, &config).await.unwrap();
    assert_eq!(relay.quota_probes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn capacity_gate_honours_max_wait() {
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(dir.path());
    config.max_wait = Some(Duration::from_millis(30));
    let relay = MemoryRelay::with_quotas(std::iter::repeat(known(512)).take(100_000));

    let err = wait_for_capacity(&relay, 1024, &config).await.unwrap_err();
    assert!(matches!(err, TransferError::WaitTimedOut { .. }));
}
