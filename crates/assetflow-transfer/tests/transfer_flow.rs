//! End-to-end transfer scenarios against mock HTTP endpoints.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use assetflow_core::{
    AssetId, AssetType, CompletionHandler, Direction, Priority, TransferConfig, TransferError,
    TransferOutcome,
};
use assetflow_store::{ContentStore, LocalContentStore};
use assetflow_transfer::AssetTransferService;
use tempfile::TempDir;
use uuid::Uuid;

type OutcomeLog = Arc<Mutex<Vec<(AssetId, TransferOutcome)>>>;

fn outcome_log() -> OutcomeLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn record_into(log: &OutcomeLog) -> CompletionHandler {
    let log = Arc::clone(log);
    Box::new(move |asset, outcome| log.lock().unwrap().push((asset, outcome)))
}

async fn harness(config: TransferConfig) -> (TempDir, Arc<LocalContentStore>, AssetTransferService) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalContentStore::new(dir.path()).await.unwrap());
    let service = AssetTransferService::new(config, store.clone()).unwrap();
    (dir, store, service)
}

fn config_for(base_url: &str) -> TransferConfig {
    TransferConfig::new(base_url, format!("{base_url}/local"), "sim1")
}

/// Tick until `cond` holds, with a generous bound so a hung transfer fails
/// the test instead of wedging it.
async fn tick_until(service: &mut AssetTransferService, cond: impl Fn() -> bool) {
    for _ in 0..200 {
        service.tick().await;
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within the tick budget");
}

/// A server that accepts connections and never answers, for deadline tests.
async fn stalled_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                use tokio::io::AsyncReadExt;
                let mut buf = [0u8; 1024];
                while let Ok(n) = socket.read(&mut buf).await {
                    if n == 0 {
                        break;
                    }
                }
            });
        }
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn upload_success_delivers_ok_exactly_once() {
    let mut server = mockito::Server::new_async().await;
    let uuid = Uuid::new_v4();
    let mock = server
        .mock("PUT", format!("/{uuid}.sound").as_str())
        .with_status(201)
        .create_async()
        .await;

    let (_dir, store, mut service) = harness(config_for(&server.url())).await;
    let asset = AssetId::new(uuid, AssetType::Sound);
    store.write(&asset, &vec![0x5au8; 10_000]).await.unwrap();

    let log = outcome_log();
    service
        .store(
            uuid,
            AssetType::Sound,
            record_into(&log),
            false,
            Priority::Normal,
            false,
            None,
            false,
            None,
        )
        .await;

    assert_eq!(service.pending_count(Direction::Upload), 1);

    service.tick().await;
    assert_eq!(service.running_count(Direction::Upload), 1);
    assert!(service.is_running(Direction::Upload, AssetType::Sound, uuid));

    tick_until(&mut service, || !log.lock().unwrap().is_empty()).await;

    let delivered = log.lock().unwrap().clone();
    assert_eq!(delivered, vec![(asset, Ok(()))]);
    assert_eq!(service.pending_count(Direction::Upload), 0);
    assert_eq!(service.running_count(Direction::Upload), 0);
    mock.assert_async().await;
}

#[tokio::test]
async fn texture_download_sinks_behind_later_requests() {
    let mut server = mockito::Server::new_async().await;
    let texture_uuid = Uuid::new_v4();
    let sound_uuid = Uuid::new_v4();
    server
        .mock("GET", format!("/{texture_uuid}.texture").as_str())
        .with_body(b"texture bytes")
        .create_async()
        .await;
    server
        .mock("GET", format!("/{sound_uuid}.sound").as_str())
        .with_body(b"sound bytes")
        .create_async()
        .await;

    let (_dir, _store, mut service) = harness(config_for(&server.url())).await;
    let log = outcome_log();

    // Texture submitted first, non-texture second.
    service
        .fetch(texture_uuid, AssetType::Texture, record_into(&log), Priority::Normal)
        .await;
    service
        .fetch(sound_uuid, AssetType::Sound, record_into(&log), Priority::Normal)
        .await;

    service.tick().await;
    assert!(service.is_running(Direction::Download, AssetType::Sound, sound_uuid));
    assert!(!service.is_running(Direction::Download, AssetType::Texture, texture_uuid));

    tick_until(&mut service, || log.lock().unwrap().len() == 2).await;
    assert!(log.lock().unwrap().iter().all(|(_, outcome)| outcome.is_ok()));
}

#[tokio::test]
async fn transient_upload_failure_requeues_without_callback() {
    let mut server = mockito::Server::new_async().await;
    let uuid = Uuid::new_v4();
    server
        .mock("PUT", format!("/{uuid}.sound").as_str())
        .with_status(503)
        .expect_at_least(1)
        .create_async()
        .await;

    let (_dir, store, mut service) = harness(config_for(&server.url())).await;
    let asset = AssetId::new(uuid, AssetType::Sound);
    store.write(&asset, b"payload").await.unwrap();

    let log = outcome_log();
    service
        .store(
            uuid,
            AssetType::Sound,
            record_into(&log),
            false,
            Priority::Normal,
            false,
            None,
            false,
            None,
        )
        .await;

    service.tick().await;
    assert_eq!(service.running_count(Direction::Upload), 1);

    // The 503 must land the request back in pending, not in the callback.
    let mut requeued = false;
    for _ in 0..200 {
        service.tick().await;
        if service.pending_count(Direction::Upload) == 1
            && service.running_count(Direction::Upload) == 0
        {
            requeued = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(requeued);
    assert!(log.lock().unwrap().is_empty());

    service.shutdown();
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn zero_size_upload_never_reaches_the_network() {
    let (_dir, _store, mut service) = harness(config_for("http://127.0.0.1:9")).await;
    let uuid = Uuid::new_v4();

    let log = outcome_log();
    service
        .store(
            uuid,
            AssetType::Sound,
            record_into(&log),
            false,
            Priority::Normal,
            false,
            None,
            false,
            None,
        )
        .await;

    let delivered = log.lock().unwrap().clone();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].1, Err(TransferError::ZeroSizeAsset));
    assert_eq!(service.pending_count(Direction::Upload), 0);
}

#[tokio::test]
async fn download_lands_bytes_in_the_store() {
    let mut server = mockito::Server::new_async().await;
    let uuid = Uuid::new_v4();
    let body: Vec<u8> = (0..4096u32).map(|i| (i % 256) as u8).collect();
    server
        .mock("GET", format!("/{uuid}.notecard").as_str())
        .with_body(body.clone())
        .create_async()
        .await;

    let (_dir, store, mut service) = harness(config_for(&server.url())).await;
    let log = outcome_log();
    service
        .fetch(uuid, AssetType::Notecard, record_into(&log), Priority::Normal)
        .await;

    tick_until(&mut service, || !log.lock().unwrap().is_empty()).await;

    assert_eq!(log.lock().unwrap()[0].1, Ok(()));
    let asset = AssetId::new(uuid, AssetType::Notecard);
    assert_eq!(store.read(&asset).await.unwrap(), body);
}

#[tokio::test]
async fn download_404_reports_not_found() {
    let mut server = mockito::Server::new_async().await;
    let uuid = Uuid::new_v4();
    server
        .mock("GET", format!("/{uuid}.sound").as_str())
        .with_status(404)
        .create_async()
        .await;

    let (_dir, _store, mut service) = harness(config_for(&server.url())).await;
    let log = outcome_log();
    service
        .fetch(uuid, AssetType::Sound, record_into(&log), Priority::Normal)
        .await;

    tick_until(&mut service, || !log.lock().unwrap().is_empty()).await;
    assert_eq!(log.lock().unwrap()[0].1, Err(TransferError::NotFound));
}

#[tokio::test]
async fn cached_asset_completes_without_network() {
    let (_dir, store, mut service) = harness(config_for("http://127.0.0.1:9")).await;
    let uuid = Uuid::new_v4();
    let asset = AssetId::new(uuid, AssetType::Sound);
    store.write(&asset, b"already here").await.unwrap();

    let log = outcome_log();
    service
        .fetch(uuid, AssetType::Sound, record_into(&log), Priority::Normal)
        .await;

    assert_eq!(log.lock().unwrap().clone(), vec![(asset, Ok(()))]);
    assert_eq!(service.pending_count(Direction::Download), 0);
}

#[tokio::test]
async fn nil_uuid_fetch_fails_fast() {
    let (_dir, _store, mut service) = harness(config_for("http://127.0.0.1:9")).await;

    let log = outcome_log();
    service
        .fetch(Uuid::nil(), AssetType::Sound, record_into(&log), Priority::Normal)
        .await;

    assert_eq!(log.lock().unwrap()[0].1, Err(TransferError::NotFound));
}

#[tokio::test]
async fn object_upload_streams_gzip_to_gz_url() {
    let mut server = mockito::Server::new_async().await;
    let uuid = Uuid::new_v4();
    let mock = server
        .mock("PUT", format!("/{uuid}.object.gz").as_str())
        .with_status(201)
        .create_async()
        .await;

    let (_dir, store, mut service) = harness(config_for(&server.url())).await;
    let asset = AssetId::new(uuid, AssetType::Object);
    // Redundant content, the kind the object serialization produces.
    store.write(&asset, &vec![b'x'; 64 * 1024]).await.unwrap();

    let log = outcome_log();
    service
        .store(
            uuid,
            AssetType::Object,
            record_into(&log),
            false,
            Priority::Normal,
            false,
            None,
            false,
            None,
        )
        .await;

    tick_until(&mut service, || !log.lock().unwrap().is_empty()).await;
    assert_eq!(log.lock().unwrap()[0].1, Ok(()));
    mock.assert_async().await;
}

#[tokio::test]
async fn local_upload_registers_temp_asset() {
    let mut server = mockito::Server::new_async().await;
    let uuid = Uuid::new_v4();
    let agent = Uuid::new_v4();
    server
        .mock("PUT", format!("/local/{uuid}.texture").as_str())
        .with_status(201)
        .create_async()
        .await;

    let (_dir, store, mut service) = harness(config_for(&server.url())).await;
    let asset = AssetId::new(uuid, AssetType::Texture);
    store.write(&asset, b"baked texture").await.unwrap();

    let log = outcome_log();
    service
        .store(
            uuid,
            AssetType::Texture,
            record_into(&log),
            true,
            Priority::Normal,
            true,
            Some(agent),
            false,
            None,
        )
        .await;

    tick_until(&mut service, || !log.lock().unwrap().is_empty()).await;

    assert_eq!(log.lock().unwrap()[0].1, Ok(()));
    assert!(service.has_temp_asset(&uuid));
    assert_eq!(service.temp_asset_host(&uuid), Some("sim1"));
    assert_eq!(service.temp_asset_agent(&uuid), Some(agent));

    service.forget_all_temp_assets_for(&agent);
    assert!(!service.has_temp_asset(&uuid));
}

#[tokio::test]
async fn expired_running_upload_is_bumped_within_a_tick() {
    let base_url = stalled_server().await;
    let (_dir, store, mut service) = harness(config_for(&base_url)).await;

    let uuid = Uuid::new_v4();
    let asset = AssetId::new(uuid, AssetType::Sound);
    store.write(&asset, b"slow peer payload").await.unwrap();

    let log = outcome_log();
    service
        .store(
            uuid,
            AssetType::Sound,
            record_into(&log),
            false,
            Priority::Normal,
            false,
            None,
            false,
            Some(Duration::from_millis(50)),
        )
        .await;

    service.tick().await;
    assert_eq!(service.running_count(Direction::Upload), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    service.tick().await;

    // The slot is free again and the request went to the back of the line;
    // nothing was delivered.
    assert_eq!(service.running_count(Direction::Upload), 0);
    assert_eq!(service.pending_count(Direction::Upload), 1);
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn expired_upload_with_waiting_caller_is_dropped() {
    let base_url = stalled_server().await;
    let (_dir, store, mut service) = harness(config_for(&base_url)).await;

    let uuid = Uuid::new_v4();
    let asset = AssetId::new(uuid, AssetType::Sound);
    store.write(&asset, b"slow peer payload").await.unwrap();

    let log = outcome_log();
    service
        .store(
            uuid,
            AssetType::Sound,
            record_into(&log),
            false,
            Priority::Normal,
            false,
            None,
            true,
            Some(Duration::from_millis(50)),
        )
        .await;

    service.tick().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    service.tick().await;

    let delivered = log.lock().unwrap().clone();
    assert_eq!(delivered, vec![(asset, Err(TransferError::Dropped))]);
    assert_eq!(service.pending_count(Direction::Upload), 0);
    assert_eq!(service.running_count(Direction::Upload), 0);
}

#[tokio::test]
async fn cancel_pending_request_delivers_dropped() {
    let (_dir, _store, mut service) = harness(config_for("http://127.0.0.1:9")).await;
    let uuid = Uuid::new_v4();

    let log = outcome_log();
    service
        .fetch(uuid, AssetType::Sound, record_into(&log), Priority::Normal)
        .await;

    assert!(service.cancel(Direction::Download, AssetType::Sound, uuid));
    assert_eq!(log.lock().unwrap()[0].1, Err(TransferError::Dropped));
    assert!(!service.cancel(Direction::Download, AssetType::Sound, uuid));
}

#[tokio::test]
async fn duplicate_downloads_complete_from_one_transfer() {
    let mut server = mockito::Server::new_async().await;
    let uuid = Uuid::new_v4();
    let mock = server
        .mock("GET", format!("/{uuid}.sound").as_str())
        .with_body(b"shared bytes")
        .expect(1)
        .create_async()
        .await;

    let (_dir, _store, mut service) = harness(config_for(&server.url())).await;
    let log = outcome_log();
    service
        .fetch(uuid, AssetType::Sound, record_into(&log), Priority::Normal)
        .await;
    service
        .fetch(uuid, AssetType::Sound, record_into(&log), Priority::Normal)
        .await;
    assert_eq!(service.pending_count(Direction::Download), 2);

    tick_until(&mut service, || log.lock().unwrap().len() == 2).await;
    assert!(log.lock().unwrap().iter().all(|(_, outcome)| outcome.is_ok()));
    mock.assert_async().await;
}

#[tokio::test]
async fn capacity_cap_holds_while_draining_a_backlog() {
    let mut server = mockito::Server::new_async().await;
    let (_dir, store, mut service) = harness(config_for(&server.url())).await;

    let log = outcome_log();
    for _ in 0..3 {
        let uuid = Uuid::new_v4();
        server
            .mock("PUT", format!("/{uuid}.sound").as_str())
            .with_status(201)
            .create_async()
            .await;
        let asset = AssetId::new(uuid, AssetType::Sound);
        store.write(&asset, b"backlog item").await.unwrap();
        service
            .store(
                uuid,
                AssetType::Sound,
                record_into(&log),
                false,
                Priority::Normal,
                false,
                None,
                false,
                None,
            )
            .await;
    }

    for _ in 0..200 {
        service.tick().await;
        assert!(service.running_count(Direction::Upload) <= 1);
        if log.lock().unwrap().len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(log.lock().unwrap().len(), 3);
    assert!(log.lock().unwrap().iter().all(|(_, outcome)| outcome.is_ok()));
}

#[tokio::test]
async fn shutdown_drops_every_outstanding_request() {
    let (_dir, store, mut service) = harness(config_for("http://127.0.0.1:9")).await;

    let log = outcome_log();
    for _ in 0..2 {
        let uuid = Uuid::new_v4();
        let asset = AssetId::new(uuid, AssetType::Sound);
        store.write(&asset, b"queued").await.unwrap();
        service
            .store(
                uuid,
                AssetType::Sound,
                record_into(&log),
                false,
                Priority::Normal,
                false,
                None,
                false,
                None,
            )
            .await;
    }

    service.shutdown();

    let delivered = log.lock().unwrap().clone();
    assert_eq!(delivered.len(), 2);
    assert!(delivered
        .iter()
        .all(|(_, outcome)| *outcome == Err(TransferError::Dropped)));
}

#[tokio::test]
async fn fetch_to_file_writes_and_reports_progress() {
    let mut server = mockito::Server::new_async().await;
    let body: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    server
        .mock("GET", "/bootstrap/world.object")
        .with_body(body.clone())
        .create_async()
        .await;

    let (_dir, _store, service) = harness(config_for(&server.url())).await;
    let target = tempfile::tempdir().unwrap();
    let path = target.path().join("world.object");
    let url = format!("{}/bootstrap/world.object", server.url());

    let mut last_progress = 0u64;
    let mut progress = |received: u64| last_progress = received;
    let outcome = service
        .fetch_to_file(
            Uuid::new_v4(),
            AssetType::Object,
            &url,
            &path,
            Some(&mut progress),
        )
        .await;

    assert_eq!(outcome, Ok(()));
    assert_eq!(last_progress, body.len() as u64);
    assert_eq!(tokio::fs::read(&path).await.unwrap(), body);
}

#[tokio::test]
async fn fetch_to_file_missing_asset_cleans_up() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/bootstrap/missing.sound")
        .with_status(404)
        .create_async()
        .await;

    let (_dir, _store, service) = harness(config_for(&server.url())).await;
    let target = tempfile::tempdir().unwrap();
    let path = target.path().join("missing.sound");
    let url = format!("{}/bootstrap/missing.sound", server.url());

    let outcome = service
        .fetch_to_file(Uuid::new_v4(), AssetType::Sound, &url, &path, None)
        .await;

    assert_eq!(outcome, Err(TransferError::NotFound));
    assert!(!path.exists());
}
