//! Client-side integration against the in-process simulated backend.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};

use fedscope_backend::{
    load_all_experiments, run_metric_feed, BackendClient, BackendConfig, BackendError,
};
use fedscope_protocol::{LogMetricRequest, Metadata, MetricSample, Role, SeriesKey};
use fedscope_sim::{GeneratorConfig, RoundGenerator, SimServer, SimStore};
use fedscope_store::StoreService;

struct Sim {
    http_base: String,
    ws_url: String,
    store: Arc<RwLock<SimStore>>,
    feed: broadcast::Sender<String>,
}

async fn start_sim() -> Sim {
    let server = SimServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let store = server.store();
    let feed = server.feed_sender();
    tokio::spawn(server.run());
    Sim {
        http_base: format!("http://{addr}"),
        ws_url: format!("ws://{addr}/ws"),
        store,
        feed,
    }
}

impl Sim {
    fn config(&self) -> BackendConfig {
        BackendConfig {
            http_base: self.http_base.clone(),
            ws_url: self.ws_url.clone(),
            request_timeout: Duration::from_secs(5),
            ..BackendConfig::default()
        }
    }

    fn client(&self) -> BackendClient {
        BackendClient::new(&self.config()).unwrap()
    }

    /// Play `rounds` full rounds and return the generated experiment id.
    async fn play_rounds(&self, rounds: u64, seed: u64) -> String {
        let mut generator = RoundGenerator::new(
            GeneratorConfig {
                rounds,
                seed: Some(seed),
                ..GeneratorConfig::default()
            },
            self.store.clone(),
            self.feed.clone(),
        );
        generator.setup().await.unwrap();
        for round in 1..=rounds {
            generator.run_round(round).await.unwrap();
        }
        generator.exp_id().to_string()
    }
}

#[tokio::test]
async fn test_load_pass_commits_generated_experiment() {
    let sim = start_sim().await;
    let exp_id = sim.play_rounds(2, 3).await;

    let (service, handle) = StoreService::new();
    tokio::spawn(service.run());

    let report = load_all_experiments(&sim.client(), &handle).await.unwrap();
    assert_eq!(report.loaded, vec![exp_id.clone()]);
    assert!(report.is_complete());

    let snapshot = handle.snapshot();
    let content = snapshot.experiment(&exp_id).unwrap();
    // 8 client series, 2 edge series, 1 central series.
    assert_eq!(content.metrics.len(), 11);
    let central = &content.metrics[&SeriesKey::new(Role::Central, "Central")];
    assert_eq!(central.len(), 2);
    assert_eq!(central[0].round, 1);
    assert_eq!(content.metadata["model"], "lenet");
    assert_eq!(content.distributions.len(), 8);
    assert!(content.topology.contains_key("Central"));
}

#[tokio::test]
async fn test_broken_experiment_does_not_block_the_rest() {
    let sim = start_sim().await;
    {
        let mut store = sim.store.write().await;
        store.create_experiment("good-exp", Metadata::new()).unwrap();
        // A slash in the id breaks its content URLs but not the listing.
        store.create_experiment("bad/exp", Metadata::new()).unwrap();
    }

    let (service, handle) = StoreService::new();
    tokio::spawn(service.run());

    let report = load_all_experiments(&sim.client(), &handle).await.unwrap();
    assert_eq!(report.loaded, vec!["good-exp".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "bad/exp");

    let snapshot = handle.snapshot();
    assert!(snapshot.experiment("good-exp").is_some());
    assert!(snapshot.experiment("bad/exp").is_none());
}

#[tokio::test]
async fn test_missing_experiment_is_a_status_error() {
    let sim = start_sim().await;
    let error = sim.client().fetch_metadata("ghost").await.unwrap_err();
    assert!(
        matches!(error, BackendError::Status { status, .. } if status.as_u16() == 404),
        "unexpected error: {error}"
    );
}

#[tokio::test]
async fn test_feed_streams_samples_into_store() {
    let sim = start_sim().await;
    {
        let mut store = sim.store.write().await;
        store.create_experiment("exp-live", Metadata::new()).unwrap();
    }

    let (service, handle) = StoreService::new();
    tokio::spawn(service.run());
    load_all_experiments(&sim.client(), &handle).await.unwrap();

    let mut watcher = handle.subscribe();
    watcher.borrow_and_update();

    let config = sim.config();
    let feed_store = handle.clone();
    let feed_task = tokio::spawn(async move { run_metric_feed(&config, &feed_store).await });

    // The subscriber only exists once the WebSocket upgrade lands.
    for _ in 0..100 {
        if sim.feed.receiver_count() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(sim.feed.receiver_count() > 0, "feed never connected");

    let sample = sim
        .store
        .write()
        .await
        .add_metric(
            "exp-live",
            Role::Client,
            LogMetricRequest {
                device: "Client-0".to_string(),
                round: 1,
                accuracy: 0.4,
                loss: 0.62,
            },
        )
        .unwrap();
    sim.feed.send(serde_json::to_string(&sample).unwrap()).unwrap();

    tokio::time::timeout(Duration::from_secs(5), watcher.changed())
        .await
        .unwrap()
        .unwrap();
    let snapshot = watcher.borrow_and_update().clone();
    let samples = &snapshot.experiment("exp-live").unwrap().metrics
        [&SeriesKey::new(Role::Client, "Client-0")];
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].round, 1);

    feed_task.abort();
}

#[tokio::test]
async fn test_feed_completes_when_the_server_closes() {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // A bare WebSocket server that pushes one sample and hangs up.
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        let sample = MetricSample {
            round: 1,
            accuracy: 0.4,
            loss: 0.62,
            device: "Client-0".to_string(),
            role: Role::Client,
            exp_id: "exp-live".to_string(),
        };
        socket
            .send(Message::Text(serde_json::to_string(&sample).unwrap()))
            .await
            .unwrap();
        socket.close(None).await.unwrap();
        while socket.next().await.is_some() {}
    });

    let (service, handle) = StoreService::new();
    tokio::spawn(service.run());
    handle
        .load_snapshot(
            "exp-live",
            Default::default(),
            Default::default(),
            Default::default(),
            Default::default(),
        )
        .await
        .unwrap();

    let config = BackendConfig {
        ws_url: format!("ws://{addr}"),
        ..BackendConfig::default()
    };
    // The feed future ends with the connection; there is no reconnect loop
    // to keep it pending.
    tokio::time::timeout(Duration::from_secs(5), run_metric_feed(&config, &handle))
        .await
        .expect("feed future should complete once the server closes")
        .unwrap();

    let snapshot = handle.snapshot();
    let samples = &snapshot.experiment("exp-live").unwrap().metrics
        [&SeriesKey::new(Role::Client, "Client-0")];
    assert_eq!(samples.len(), 1);
    server.await.unwrap();
}

#[tokio::test]
async fn test_reload_without_backend_changes_is_identical() {
    let sim = start_sim().await;
    let exp_id = sim.play_rounds(1, 11).await;

    let (service, handle) = StoreService::new();
    tokio::spawn(service.run());
    let client = sim.client();

    load_all_experiments(&client, &handle).await.unwrap();
    let first = handle.snapshot().experiment(&exp_id).unwrap().clone();
    load_all_experiments(&client, &handle).await.unwrap();
    let second = handle.snapshot().experiment(&exp_id).unwrap().clone();

    assert_eq!(*first, *second);
    assert_eq!(
        serde_json::to_string(&*first).unwrap(),
        serde_json::to_string(&*second).unwrap()
    );
}
