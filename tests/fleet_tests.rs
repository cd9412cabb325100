mod common;

use sea_orm::{EntityTrait, PaginatorTrait};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use exchangedata::entities::prelude::*;
use exchangedata::models::market::{Exchanger, Market};
use exchangedata::services::bootstrap::ExchangerBootstrap;
use exchangedata::services::fleet::FleetCoordinator;
use exchangedata::services::recorder::MarketDataRecorder;
use exchangedata::services::resolver::EntityResolver;
use exchangedata::services::store::SeaOrmStore;
use exchangedata::services::supervisor::SupervisorState;

use crate::common::{
    eventually, frame, setup_test_db, test_config, CollectingSink, Connection, Dial,
    ScriptedClient,
};

#[tokio::test]
async fn test_shutdown_waits_for_every_supervisor() {
    let sink = Arc::new(CollectingSink::default());
    let mut fleet = FleetCoordinator::new(sink.clone(), test_config());

    let connected = Arc::new(ScriptedClient::new(
        "alpha",
        vec![Dial::Open(Connection::reads(vec![frame("trade:1")]))],
    ));
    let dialing = Arc::new(ScriptedClient::new("beta", vec![Dial::Hang]));

    let alpha = fleet.start(connected.clone()).await;
    let beta = fleet.start(dialing.clone()).await;
    let registry = fleet.registry();

    assert!(alpha.wait_for(SupervisorState::Connected).await);
    eventually("beta dialing", || dialing.connects() == 1).await;
    eventually("alpha trade", || sink.len() == 1).await;

    timeout(Duration::from_secs(5), fleet.shutdown())
        .await
        .expect("fleet should shut down");

    assert_eq!(alpha.state(), SupervisorState::Closed);
    assert_eq!(beta.state(), SupervisorState::Closed);
    assert_eq!(connected.closes(), 1);

    let statuses = registry.snapshot();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].exchange, "alpha");
    assert_eq!(statuses[0].recorded, 1);
    assert!(statuses.iter().all(|s| s.state == SupervisorState::Closed));
}

#[tokio::test]
async fn test_run_until_shuts_down_on_interrupt() {
    let sink = Arc::new(CollectingSink::default());
    let mut fleet = FleetCoordinator::new(sink, test_config());
    let handle = fleet
        .start(Arc::new(ScriptedClient::new(
            "alpha",
            vec![Dial::Open(Connection::default())],
        )))
        .await;
    assert!(handle.wait_for(SupervisorState::Connected).await);

    let (interrupt_tx, interrupt_rx) = tokio::sync::oneshot::channel::<()>();
    let run = tokio::spawn(fleet.run_until(async {
        let _ = interrupt_rx.await;
    }));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(handle.state(), SupervisorState::Connected);

    interrupt_tx.send(()).unwrap();
    timeout(Duration::from_secs(5), run)
        .await
        .expect("fleet should stop")
        .unwrap();
    assert_eq!(handle.state(), SupervisorState::Closed);
}

#[tokio::test]
async fn test_markets_are_registered_before_dialing() {
    let db = setup_test_db().await.expect("Failed to set up test DB");
    let resolver = EntityResolver::new(Arc::new(SeaOrmStore::new(db.clone())), 1_000);
    let recorder = Arc::new(MarketDataRecorder::new(resolver.clone()));
    let mut fleet = FleetCoordinator::new(recorder, test_config())
        .with_bootstrap(ExchangerBootstrap::new(resolver));

    let client = Arc::new(
        ScriptedClient::new("demo", vec![Dial::Hang]).with_markets(vec![
            Market::new("LTC-BTC", "LTC_BTC".parse().unwrap(), Exchanger::new("demo")),
            Market::new("ETH-BTC", "ETH_BTC".parse().unwrap(), Exchanger::new("demo")),
        ]),
    );
    fleet.start(client.clone()).await;

    let adopted = client.adopted.lock().clone();
    assert_eq!(adopted.len(), 2);
    assert!(adopted.iter().all(|m| m.id.is_some()));
    assert_eq!(Markets::find().count(&db).await.unwrap(), 2);
    assert_eq!(CurrencyExchangers::find().count(&db).await.unwrap(), 3);

    fleet.shutdown().await;
}
