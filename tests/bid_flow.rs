mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use futures::future::join_all;
use tokio_test::{assert_err, assert_ok};

use haulbid::api::BidAPI;
use haulbid::db::Store;
use haulbid::entities::{BidStatus, RequestKind, RequestStatus, Vehicle, VehicleStatus};
use haulbid::error::expired_error;
use haulbid::notify::Hub;

use common::{admin, draft, driver, engine, seeded_store, FaultyStore, ScriptedLedger};

fn event(message: &str) -> serde_json::Value {
    serde_json::from_str(message).unwrap()
}

#[tokio::test]
async fn create_bid_opens_and_announces() {
    let store = seeded_store().await;
    let engine = engine(store.clone(), ScriptedLedger::new(), Duration::seconds(60));

    let (channel, inbox) = Hub::channel();
    engine.hub().register("driver-2", channel).await;

    let bid = assert_ok!(engine.create_bid(admin(), draft(2)).await);
    assert!(bid.id.starts_with("BID-"));
    assert!(bid.is_bidding());
    assert_eq!(bid.expires_at - bid.created_at, Duration::seconds(60));

    let stored = store.find_bid(&bid.id).await.unwrap().unwrap();
    assert_eq!(stored, bid);

    let announced = event(&inbox.try_recv().unwrap());
    assert_eq!(announced["event"], "new_transport_bid");
    assert_eq!(announced["bid"]["id"], bid.id.as_str());
}

#[tokio::test]
async fn create_bid_rejects_unknown_participants() {
    let store = seeded_store().await;
    let engine = engine(store.clone(), ScriptedLedger::new(), Duration::seconds(60));

    let mut unknown_driver = draft(2);
    unknown_driver.assignments[1].driver_id = "ghost".into();
    let err = assert_err!(engine.create_bid(admin(), unknown_driver).await);
    assert!(err.is_invalid_input_error());

    let mut unknown_vehicle = draft(2);
    unknown_vehicle.assignments[0].vehicle_id = "vehicle-404".into();
    let err = assert_err!(engine.create_bid(admin(), unknown_vehicle).await);
    assert!(err.is_invalid_input_error());

    // an admin profile is not a driver
    let mut not_a_driver = draft(1);
    not_a_driver.assignments[0].driver_id = "admin-1".into();
    assert_err!(engine.create_bid(admin(), not_a_driver).await);

    assert!(store.list_open_bids("driver-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn only_admins_create_and_only_drivers_confirm() {
    let store = seeded_store().await;
    let engine = engine(store, ScriptedLedger::new(), Duration::seconds(60));

    let err = assert_err!(engine.create_bid(driver("driver-1"), draft(2)).await);
    assert_eq!(err.code, 201);

    let bid = assert_ok!(engine.create_bid(admin(), draft(2)).await);
    let err = assert_err!(engine.confirm_bid(admin(), bid.id.clone()).await);
    assert_eq!(err.code, 201);
}

// Two invited drivers, the first confirmation wins and the second is told so.
#[tokio::test]
async fn first_confirmation_wins_and_finalizes() {
    let store = seeded_store().await;
    let ledger = ScriptedLedger::new();
    let engine = engine(store.clone(), ledger.clone(), Duration::seconds(60));

    let bid = assert_ok!(engine.create_bid(admin(), draft(2)).await);

    let (channel, inbox) = Hub::channel();
    engine.hub().register("driver-2", channel).await;

    let confirmation = assert_ok!(engine.confirm_bid(driver("driver-1"), bid.id.clone()).await);
    assert_eq!(confirmation.bid_id, bid.id);
    assert_eq!(confirmation.shipment_id, format!("SHIP-{}", bid.id));
    assert!(confirmation.is_consistent());

    let submissions = ledger.submissions().await;
    assert_eq!(submissions.len(), 1);
    let submission = &submissions[0];
    assert_eq!(submission.identity, "driver-1");
    assert_eq!(submission.name, "CreateShipment");
    assert_eq!(submission.args[0], confirmation.shipment_id);
    assert_eq!(submission.args[1], "DISTRIBUTION");
    assert_eq!(submission.args[2], "driver-1");
    assert_eq!(submission.args[3], "Driver One");
    assert_eq!(submission.args[4], "29C-000.01");
    let stops = event(&submission.args[5]);
    assert_eq!(stops[0]["facilityID"], "farm-A");
    assert_eq!(stops[0]["facilityName"], "Organic Farm A");
    assert_eq!(stops[0]["action"], "PICKUP");
    assert_eq!(stops[1]["facilityAddress"]["fullText"], "Retail Store B address");
    assert_eq!(stops[0]["items"][0]["assetID"], "ASSET-1");
    assert_eq!(stops[0]["items"][0]["quantity"]["value"], 120.0);

    let stored = store.find_bid(&bid.id).await.unwrap().unwrap();
    assert_eq!(stored.status.name(), "completed");
    assert_eq!(stored.shipment_id(), Some(confirmation.shipment_id.as_str()));
    assert_eq!(stored.confirmed_assignment().unwrap().driver_id, "driver-1");

    let vehicle = store.find_vehicle("vehicle-1").await.unwrap().unwrap();
    assert_eq!(vehicle.status, VehicleStatus::InTrip);
    let untouched = store.find_vehicle("vehicle-2").await.unwrap().unwrap();
    assert_eq!(untouched.status, VehicleStatus::Available);

    let dispatch = store.find_request(RequestKind::Dispatch, "DR-1").await.unwrap().unwrap();
    assert_eq!(dispatch.status, RequestStatus::Processed);
    let replenishment = store
        .find_request(RequestKind::Replenishment, "RR-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(replenishment.status, RequestStatus::Fulfilled);

    let taken = event(&inbox.try_recv().unwrap());
    assert_eq!(taken["event"], "bid_confirmed_by_other");
    assert_eq!(taken["bidID"], bid.id.as_str());

    let err = assert_err!(engine.confirm_bid(driver("driver-2"), bid.id.clone()).await);
    assert!(err.is_conflict());
    assert_eq!(err.message, "confirmed by another driver");
    assert_eq!(ledger.submissions().await.len(), 1);
}

#[tokio::test]
async fn confirming_after_deadline_is_expired() {
    let store = seeded_store().await;
    let ledger = ScriptedLedger::new();
    let engine = engine(store.clone(), ledger.clone(), Duration::zero());

    let bid = assert_ok!(engine.create_bid(admin(), draft(2)).await);

    let err = assert_err!(engine.confirm_bid(driver("driver-1"), bid.id.clone()).await);
    assert_eq!(err, expired_error());

    let stored = store.find_bid(&bid.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BidStatus::Expired);
    assert!(ledger.submissions().await.is_empty());

    let err = assert_err!(engine.confirm_bid(driver("driver-2"), bid.id.clone()).await);
    assert_eq!(err, expired_error());
}

// The winner's vehicle goes into maintenance before it is re-validated: the
// win is undone and the other driver can still take the bid.
#[tokio::test]
async fn unavailable_vehicle_reopens_bid() {
    let store = seeded_store().await;
    let ledger = ScriptedLedger::new();
    let engine = engine(store.clone(), ledger.clone(), Duration::seconds(60));

    let bid = assert_ok!(engine.create_bid(admin(), draft(2)).await);
    store
        .update_vehicle_status("vehicle-1", VehicleStatus::Maintenance)
        .await
        .unwrap();

    let (channel, inbox) = Hub::channel();
    engine.hub().register("driver-2", channel).await;

    let err = assert_err!(engine.confirm_bid(driver("driver-1"), bid.id.clone()).await);
    assert!(err.is_conflict());
    assert_eq!(err.message, "assigned vehicle unavailable");

    let stored = store.find_bid(&bid.id).await.unwrap().unwrap();
    assert!(stored.is_bidding());
    assert_eq!(stored.confirmed_assignment(), None);
    assert!(ledger.submissions().await.is_empty());

    let reopened = event(&inbox.try_recv().unwrap());
    assert_eq!(reopened["event"], "bid_reopened");
    assert_eq!(reopened["bidID"], bid.id.as_str());

    let confirmation = assert_ok!(engine.confirm_bid(driver("driver-2"), bid.id.clone()).await);
    assert_eq!(confirmation.shipment_id, format!("SHIP-{}", bid.id));
    let vehicle = store.find_vehicle("vehicle-2").await.unwrap().unwrap();
    assert_eq!(vehicle.status, VehicleStatus::InTrip);
}

#[tokio::test]
async fn unknown_itinerary_facility_reopens_bid() {
    let store = seeded_store().await;
    let ledger = ScriptedLedger::new();
    let engine = engine(store.clone(), ledger.clone(), Duration::seconds(60));

    let mut itinerary = draft(2);
    itinerary.stops[1].facility_id = "depot-X".into();
    let bid = assert_ok!(engine.create_bid(admin(), itinerary).await);

    let err = assert_err!(engine.confirm_bid(driver("driver-1"), bid.id.clone()).await);
    assert!(err.is_conflict());
    assert!(err.message.contains("depot-X"));

    let stored = store.find_bid(&bid.id).await.unwrap().unwrap();
    assert!(stored.is_bidding());
    assert_eq!(stored.confirmed_assignment(), None);
    assert!(ledger.submissions().await.is_empty());

    let vehicle = store.find_vehicle("vehicle-1").await.unwrap().unwrap();
    assert_eq!(vehicle.status, VehicleStatus::Available);
    let dispatch = store.find_request(RequestKind::Dispatch, "DR-1").await.unwrap().unwrap();
    assert!(dispatch.is_pending());
}

#[tokio::test]
async fn vehicle_of_another_driver_reopens_bid() {
    let store = seeded_store().await;
    let ledger = ScriptedLedger::new();
    let engine = engine(store.clone(), ledger.clone(), Duration::seconds(60));

    let bid = assert_ok!(engine.create_bid(admin(), draft(2)).await);

    // vehicle-1 changes hands after the bid went out
    let handed_over = Vehicle {
        owner_driver_id: "driver-3".into(),
        ..store.find_vehicle("vehicle-1").await.unwrap().unwrap()
    };
    store.put_vehicle(&handed_over).await.unwrap();

    let err = assert_err!(engine.confirm_bid(driver("driver-1"), bid.id.clone()).await);
    assert_eq!(err.code, 202);
    assert_eq!(err.status(), StatusCode::FORBIDDEN);

    let stored = store.find_bid(&bid.id).await.unwrap().unwrap();
    assert!(stored.is_bidding());
    assert_eq!(stored.confirmed_assignment(), None);
    assert!(ledger.submissions().await.is_empty());

    let vehicle = store.find_vehicle("vehicle-1").await.unwrap().unwrap();
    assert_eq!(vehicle, handed_over);

    // the other invited driver can still take it
    assert_ok!(engine.confirm_bid(driver("driver-2"), bid.id.clone()).await);
}

#[tokio::test]
async fn ledger_failure_is_compensated() {
    let store = seeded_store().await;
    let ledger = ScriptedLedger::new();
    let engine = engine(store.clone(), ledger.clone(), Duration::seconds(60));

    let bid = assert_ok!(engine.create_bid(admin(), draft(2)).await);

    ledger.fail(true);
    let err = assert_err!(engine.confirm_bid(driver("driver-1"), bid.id.clone()).await);
    assert!(err.is_upstream_error());

    let stored = store.find_bid(&bid.id).await.unwrap().unwrap();
    assert!(stored.is_bidding());
    assert_eq!(stored.confirmed_assignment(), None);
    let vehicle = store.find_vehicle("vehicle-1").await.unwrap().unwrap();
    assert_eq!(vehicle.status, VehicleStatus::Available);
    let dispatch = store.find_request(RequestKind::Dispatch, "DR-1").await.unwrap().unwrap();
    assert!(dispatch.is_pending());

    // the same driver may retry once the ledger recovers
    ledger.fail(false);
    assert_ok!(engine.confirm_bid(driver("driver-1"), bid.id.clone()).await);
}

#[tokio::test]
async fn failures_after_ledger_commit_are_reported_not_undone() {
    let memory = seeded_store().await;
    let store = FaultyStore::new(memory.clone());
    store.fail_vehicle_updates.store(true, Ordering::SeqCst);
    store.fail_request_updates.store(true, Ordering::SeqCst);

    let ledger = ScriptedLedger::new();
    let engine = engine(store.clone(), ledger.clone(), Duration::seconds(60));

    let bid = assert_ok!(engine.create_bid(admin(), draft(2)).await);
    let confirmation = assert_ok!(engine.confirm_bid(driver("driver-1"), bid.id.clone()).await);

    assert!(!confirmation.is_consistent());
    assert_eq!(confirmation.reconciliation_required.len(), 3);
    assert!(confirmation
        .reconciliation_required
        .contains(&"vehicle vehicle-1 not marked IN_TRIP".to_string()));
    assert_eq!(ledger.submissions().await.len(), 1);

    // the bid itself still completes; nothing is rolled back
    let stored = memory.find_bid(&bid.id).await.unwrap().unwrap();
    assert_eq!(stored.shipment_id(), Some(confirmation.shipment_id.as_str()));
    let vehicle = memory.find_vehicle("vehicle-1").await.unwrap().unwrap();
    assert_eq!(vehicle.status, VehicleStatus::Available);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_confirmations_have_one_winner() {
    let store = seeded_store().await;
    let ledger = ScriptedLedger::new();
    let engine = engine(store.clone(), ledger.clone(), Duration::seconds(60));

    let bid = assert_ok!(engine.create_bid(admin(), draft(3)).await);

    let attempts = (0..12).map(|attempt| {
        let engine = Arc::clone(&engine);
        let bid_id = bid.id.clone();
        let driver_id = format!("driver-{}", attempt % 3 + 1);
        tokio::spawn(async move { engine.confirm_bid(driver(&driver_id), bid_id).await })
    });

    let outcomes: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners: Vec<_> = outcomes.iter().filter_map(|outcome| outcome.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    for outcome in &outcomes {
        if let Err(err) = outcome {
            assert!(err.is_conflict(), "unexpected error {}", err);
        }
    }

    assert_eq!(ledger.submissions().await.len(), 1);

    let stored = store.find_bid(&bid.id).await.unwrap().unwrap();
    let winner = stored.confirmed_assignment().unwrap();
    let in_trip = store.find_vehicle(&winner.vehicle_id).await.unwrap().unwrap();
    assert_eq!(in_trip.status, VehicleStatus::InTrip);
}

#[tokio::test]
async fn duplicate_and_uninvited_confirmations_are_explained() {
    let store = seeded_store().await;
    let engine = engine(store, ScriptedLedger::new(), Duration::seconds(60));

    let bid = assert_ok!(engine.create_bid(admin(), draft(2)).await);
    assert_ok!(engine.confirm_bid(driver("driver-1"), bid.id.clone()).await);

    let err = assert_err!(engine.confirm_bid(driver("driver-1"), bid.id.clone()).await);
    assert!(err.is_conflict());
    assert_eq!(err.message, "already confirmed by you");

    let err = assert_err!(engine.confirm_bid(driver("driver-3"), bid.id.clone()).await);
    assert_eq!(err.message, "not available for you, already decided, or unknown bid");

    let err = assert_err!(engine.confirm_bid(driver("driver-1"), "BID-UNKNOWN".into()).await);
    assert_eq!(err.message, "not available for you, already decided, or unknown bid");
}

#[tokio::test]
async fn open_bids_are_listed_per_driver() {
    let store = seeded_store().await;
    let engine = engine(store, ScriptedLedger::new(), Duration::seconds(60));

    let first = assert_ok!(engine.create_bid(admin(), draft(2)).await);
    let second = assert_ok!(engine.create_bid(admin(), draft(1)).await);

    let mine = assert_ok!(engine.list_open_bids(driver("driver-1")).await);
    assert_eq!(mine.len(), 2);
    let mine = assert_ok!(engine.list_open_bids(driver("driver-2")).await);
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, first.id);

    assert_ok!(engine.confirm_bid(driver("driver-1"), first.id.clone()).await);
    assert!(assert_ok!(engine.list_open_bids(driver("driver-2")).await).is_empty());
    let mine = assert_ok!(engine.list_open_bids(driver("driver-1")).await);
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, second.id);

    assert_err!(engine.list_open_bids(admin()).await);
}

#[tokio::test]
async fn bids_are_visible_to_admins_and_invited_drivers() {
    let store = seeded_store().await;
    let engine = engine(store, ScriptedLedger::new(), Duration::seconds(60));

    let bid = assert_ok!(engine.create_bid(admin(), draft(2)).await);

    assert_ok!(engine.find_bid(admin(), bid.id.clone()).await);
    assert_ok!(engine.find_bid(driver("driver-2"), bid.id.clone()).await);

    let err = assert_err!(engine.find_bid(driver("driver-3"), bid.id.clone()).await);
    assert_eq!(err.code, 300);
}

#[tokio::test]
async fn shipment_is_read_back_from_ledger() {
    let store = seeded_store().await;
    let engine = engine(store, ScriptedLedger::new(), Duration::seconds(60));

    let bid = assert_ok!(engine.create_bid(admin(), draft(2)).await);

    let err = assert_err!(engine.find_shipment(admin(), bid.id.clone()).await);
    assert_eq!(err.code, 300);

    let confirmation = assert_ok!(engine.confirm_bid(driver("driver-2"), bid.id.clone()).await);
    let shipment = assert_ok!(engine.find_shipment(driver("driver-2"), bid.id.clone()).await);
    assert_eq!(shipment["shipmentID"], confirmation.shipment_id.as_str());
    assert_eq!(shipment["driverName"], "Driver Two");
}

#[tokio::test]
async fn sweep_expires_only_lapsed_bids() {
    let store = seeded_store().await;
    let lapsing = engine(store.clone(), ScriptedLedger::new(), Duration::zero());
    let lasting = engine(store.clone(), ScriptedLedger::new(), Duration::seconds(60));

    let lapsed = assert_ok!(lapsing.create_bid(admin(), draft(2)).await);
    let open = assert_ok!(lasting.create_bid(admin(), draft(2)).await);

    let err = assert_err!(lasting.expire_lapsed_bids(driver("driver-1")).await);
    assert_eq!(err.code, 201);

    let expired = assert_ok!(lasting.expire_lapsed_bids(admin()).await);
    assert_eq!(expired, vec![lapsed.id.clone()]);

    let stored = store.find_bid(&lapsed.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BidStatus::Expired);
    assert!(store.find_bid(&open.id).await.unwrap().unwrap().is_bidding());

    // a second sweep finds nothing left to do
    assert!(assert_ok!(lasting.expire_lapsed(Utc::now()).await).is_empty());
}

#[tokio::test]
async fn sweep_never_touches_a_confirmed_bid() {
    let store = seeded_store().await;
    let engine = engine(store.clone(), ScriptedLedger::new(), Duration::seconds(60));

    let bid = assert_ok!(engine.create_bid(admin(), draft(2)).await);
    assert_ok!(engine.confirm_bid(driver("driver-1"), bid.id.clone()).await);

    let expired = assert_ok!(engine.expire_lapsed(Utc::now() + Duration::hours(1)).await);
    assert!(expired.is_empty());
    assert_eq!(
        store.find_bid(&bid.id).await.unwrap().unwrap().status.name(),
        "completed"
    );
}

#[tokio::test]
async fn background_reaper_expires_bids() {
    let store = seeded_store().await;
    let engine = engine(store.clone(), ScriptedLedger::new(), Duration::zero());

    let bid = assert_ok!(engine.create_bid(admin(), draft(1)).await);

    let reaper = haulbid::engine::spawn_reaper(
        engine.clone(),
        std::time::Duration::from_millis(10),
    );
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    reaper.abort();

    let stored = store.find_bid(&bid.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BidStatus::Expired);
}
