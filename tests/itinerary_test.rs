mod common;

use assert_matches::assert_matches;
use common::{some_user, TestApp};
use depot_core::{
    entities::{
        itinerary::ItineraryState,
        itinerary_action::{ActionKind, ActionPhase, Entity as ItineraryAction},
        latest_pack_action::Entity as LatestPackAction,
        pack_action::{Entity as PackAction, InputMethod},
        station_order::{Entity as StationOrder, OrderStatus},
        vehicle::{Entity as Vehicle, VehicleStatus},
    },
    errors::ServiceError,
    services::itineraries::{LoadRequest, OrderRef, PackScan, UnloadRequest, UpdateLoadRequest},
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

fn order_ref(station_id: i64, order_no: &str) -> OrderRef {
    OrderRef {
        station_id,
        order_no: order_no.to_string(),
    }
}

fn scanned(pack_id: i64) -> PackScan {
    PackScan {
        pack_id,
        input_method: InputMethod::Scanned,
    }
}

#[tokio::test]
async fn a_driver_runs_one_active_itinerary_at_a_time() {
    let app = TestApp::new().await;
    let driver = some_user();
    let vehicle = app.seed_vehicle("VAN-01").await;
    let itineraries = app.state.itinerary_service();

    let prepared = itineraries.prepare(vehicle.id, driver).await.unwrap();
    assert_eq!(prepared.state(), Some(ItineraryState::Preparing));
    assert!(prepared.is_active);

    let current = itineraries
        .current_itinerary(driver)
        .await
        .unwrap()
        .expect("active itinerary exists");
    assert_eq!(current.id, prepared.id);

    let err = itineraries.prepare(vehicle.id, driver).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn loading_requires_an_itinerary() {
    let app = TestApp::new().await;
    let err = app
        .state
        .itinerary_service()
        .load(LoadRequest::default(), some_user())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn loading_stamps_orders_packs_and_the_vehicle() {
    let app = TestApp::new().await;
    let driver = some_user();
    let vehicle = app.seed_vehicle("VAN-02").await;
    let itineraries = app.state.itinerary_service();
    itineraries.prepare(vehicle.id, driver).await.unwrap();

    let action = itineraries
        .load(
            LoadRequest {
                new_orders: vec![order_ref(1, "ORD-A"), order_ref(1, "ORD-B")],
                packs: vec![scanned(501), scanned(502)],
                collected_blanket_no: 3,
                ..Default::default()
            },
            driver,
        )
        .await
        .unwrap();

    assert_eq!(action.kind(), Some(ActionKind::Load));
    assert_eq!(action.phase(), Some(ActionPhase::Open));
    assert_eq!(action.order_ids().len(), 2);
    assert_eq!(action.collected_blanket_no, 3);

    for order_id in action.order_ids() {
        let order = StationOrder::find_by_id(order_id)
            .one(app.state.db.as_ref())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, OrderStatus::OnRoute.as_str());
        assert!(order.loaded_at.is_some());
    }

    let latest = LatestPackAction::find_by_id(501_i64)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .expect("pack 501 has a latest action");
    assert_eq!(latest.kind.as_deref(), Some("load"));
    assert_eq!(latest.itinerary_id, Some(action.itinerary_id));

    let itinerary = itineraries
        .current_itinerary(driver)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(itinerary.state(), Some(ItineraryState::Loaded));
    let vehicle = Vehicle::find_by_id(vehicle.id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(vehicle.status, VehicleStatus::Loaded.as_str());
}

#[tokio::test]
async fn a_second_load_merges_into_the_open_action() {
    let app = TestApp::new().await;
    let driver = some_user();
    let vehicle = app.seed_vehicle("VAN-03").await;
    let itineraries = app.state.itinerary_service();
    itineraries.prepare(vehicle.id, driver).await.unwrap();

    let first = itineraries
        .load(
            LoadRequest {
                new_orders: vec![order_ref(1, "ORD-A")],
                packs: vec![scanned(601)],
                collected_blanket_no: 2,
                ..Default::default()
            },
            driver,
        )
        .await
        .unwrap();
    let second = itineraries
        .load(
            LoadRequest {
                new_orders: vec![order_ref(1, "ORD-A"), order_ref(2, "ORD-C")],
                packs: vec![scanned(602)],
                collected_blanket_no: 1,
                ..Default::default()
            },
            driver,
        )
        .await
        .unwrap();

    // Same row, merged content: ids deduplicated, blanket counts summed.
    assert_eq!(second.id, first.id);
    assert_eq!(second.order_ids().len(), 2);
    assert_eq!(second.collected_blanket_no, 3);
    assert_eq!(
        ItineraryAction::find()
            .count(app.state.db.as_ref())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn a_corrected_load_rewinds_dropped_packs_and_orders() {
    let app = TestApp::new().await;
    let driver = some_user();
    let vehicle = app.seed_vehicle("VAN-04").await;
    let itineraries = app.state.itinerary_service();
    itineraries.prepare(vehicle.id, driver).await.unwrap();

    let action = itineraries
        .load(
            LoadRequest {
                new_orders: vec![order_ref(1, "ORD-A"), order_ref(1, "ORD-B")],
                packs: vec![scanned(701), scanned(702)],
                collected_blanket_no: 5,
                ..Default::default()
            },
            driver,
        )
        .await
        .unwrap();
    let dropped_order_id = action.order_ids()[0];

    let corrected = itineraries
        .update_load(
            UpdateLoadRequest {
                new_orders: vec![order_ref(1, "ORD-B"), order_ref(1, "ORD-C")],
                packs: vec![
                    scanned(702),
                    PackScan {
                        pack_id: 703,
                        input_method: InputMethod::Manual,
                    },
                ],
                collected_blanket_no: Some(4),
                ..Default::default()
            },
            driver,
        )
        .await
        .unwrap();

    assert_eq!(corrected.id, action.id);
    assert_eq!(corrected.collected_blanket_no, 4);
    assert_eq!(corrected.order_ids().len(), 2);
    assert!(!corrected.order_ids().contains(&dropped_order_id));

    // The dropped order is back where it started.
    let dropped = StationOrder::find_by_id(dropped_order_id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(dropped.status, OrderStatus::Packed.as_str());
    assert_eq!(dropped.loaded_at, None);

    // Pack 701's only action was soft-deleted, so its pointer is cleared.
    let latest_701 = LatestPackAction::find_by_id(701_i64)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest_701.pack_action_id, None);
    assert_eq!(latest_701.kind, None);

    // Pack 702 was re-scanned and points at its fresh action row.
    let latest_702 = LatestPackAction::find_by_id(702_i64)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest_702.kind.as_deref(), Some("load"));
    assert!(latest_702.pack_action_id.is_some());

    // The audit trail keeps the soft-deleted rows.
    let deleted_rows = PackAction::find()
        .filter(depot_core::entities::pack_action::Column::DeletedAt.is_not_null())
        .count(app.state.db.as_ref())
        .await
        .unwrap();
    assert_eq!(deleted_rows, 2);
}

#[tokio::test]
async fn unloading_closes_everything_and_frees_the_vehicle() {
    let app = TestApp::new().await;
    let driver = some_user();
    let vehicle = app.seed_vehicle("VAN-05").await;
    let itineraries = app.state.itinerary_service();
    itineraries.prepare(vehicle.id, driver).await.unwrap();
    let load_action = itineraries
        .load(
            LoadRequest {
                new_orders: vec![order_ref(1, "ORD-A")],
                packs: vec![scanned(801)],
                collected_blanket_no: 1,
                ..Default::default()
            },
            driver,
        )
        .await
        .unwrap();

    let closed = itineraries
        .unload(
            UnloadRequest {
                proof_dropoff: Some(serde_json::json!({"signature": "depot-gate"})),
                comment: Some("evening return".into()),
                ..Default::default()
            },
            driver,
        )
        .await
        .unwrap();

    assert_eq!(closed.state(), Some(ItineraryState::Closed));
    assert!(!closed.is_active);
    assert!(closed.closed_at.is_some());

    let load_action = ItineraryAction::find_by_id(load_action.id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(load_action.phase(), Some(ActionPhase::Closed));

    let unload_action = ItineraryAction::find()
        .filter(
            depot_core::entities::itinerary_action::Column::Kind.eq(ActionKind::Unload.as_str()),
        )
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .expect("unload action recorded");
    assert_eq!(unload_action.phase(), Some(ActionPhase::Closed));

    let latest = LatestPackAction::find_by_id(801_i64)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.kind.as_deref(), Some("unload"));
    assert_eq!(latest.itinerary_action_id, Some(unload_action.id));

    // The unload payload named no orders, so the loaded order keeps its
    // status; the depot unload returns undelivered packs.
    let order = StationOrder::find_by_id(unload_action.order_ids()[0])
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::OnRoute.as_str());

    let vehicle = Vehicle::find_by_id(vehicle.id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(vehicle.status, VehicleStatus::Available.as_str());

    // The driver is free again; the next itinerary starts from scratch and
    // never merges into the closed load.
    let next = itineraries.prepare(vehicle.id, driver).await.unwrap();
    let fresh_action = itineraries
        .load(
            LoadRequest {
                new_orders: vec![order_ref(1, "ORD-Z")],
                packs: vec![scanned(802)],
                ..Default::default()
            },
            driver,
        )
        .await
        .unwrap();
    assert_eq!(fresh_action.itinerary_id, next.id);
    assert_ne!(fresh_action.id, load_action.id);
    assert_eq!(fresh_action.order_ids().len(), 1);
}

#[tokio::test]
async fn loading_accepts_orders_already_known_by_id() {
    let app = TestApp::new().await;
    let driver = some_user();
    let vehicle = app.seed_vehicle("VAN-08").await;
    let known = app.seed_station_order(4, "ORD-KNOWN").await;
    let itineraries = app.state.itinerary_service();
    itineraries.prepare(vehicle.id, driver).await.unwrap();

    let action = itineraries
        .load(
            LoadRequest {
                station_order_ids: vec![known.id],
                new_orders: vec![order_ref(4, "ORD-FRESH")],
                packs: vec![scanned(811)],
                ..Default::default()
            },
            driver,
        )
        .await
        .unwrap();

    assert_eq!(action.order_ids().len(), 2);
    assert!(action.order_ids().contains(&known.id));

    let known = StationOrder::find_by_id(known.id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(known.status, OrderStatus::OnRoute.as_str());
    assert!(known.loaded_at.is_some());
}

#[tokio::test]
async fn a_partial_pack_return_records_only_the_named_packs() {
    let app = TestApp::new().await;
    let driver = some_user();
    let vehicle = app.seed_vehicle("VAN-09").await;
    let itineraries = app.state.itinerary_service();
    itineraries.prepare(vehicle.id, driver).await.unwrap();
    itineraries
        .load(
            LoadRequest {
                new_orders: vec![order_ref(1, "ORD-A")],
                packs: vec![scanned(9901), scanned(9902)],
                ..Default::default()
            },
            driver,
        )
        .await
        .unwrap();

    // Only one of the two loaded packs comes back to the depot.
    itineraries
        .unload(
            UnloadRequest {
                packs: Some(vec![scanned(9901)]),
                ..Default::default()
            },
            driver,
        )
        .await
        .unwrap();

    let unload_rows = PackAction::find()
        .filter(depot_core::entities::pack_action::Column::Kind.eq(ActionKind::Unload.as_str()))
        .all(app.state.db.as_ref())
        .await
        .unwrap();
    assert_eq!(unload_rows.len(), 1);
    assert_eq!(unload_rows[0].pack_id, 9901);

    let returned = LatestPackAction::find_by_id(9901_i64)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(returned.kind.as_deref(), Some("unload"));

    // The undelivered pack still points at its load action.
    let kept_out = LatestPackAction::find_by_id(9902_i64)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kept_out.kind.as_deref(), Some("load"));
}

#[tokio::test]
async fn unloading_delivers_only_explicitly_confirmed_orders() {
    let app = TestApp::new().await;
    let driver = some_user();
    let vehicle = app.seed_vehicle("VAN-10").await;
    let itineraries = app.state.itinerary_service();
    itineraries.prepare(vehicle.id, driver).await.unwrap();
    let action = itineraries
        .load(
            LoadRequest {
                new_orders: vec![order_ref(1, "ORD-A"), order_ref(1, "ORD-B")],
                packs: vec![scanned(821)],
                ..Default::default()
            },
            driver,
        )
        .await
        .unwrap();
    let confirmed_id = action.order_ids()[0];
    let pending_id = action.order_ids()[1];

    itineraries
        .unload(
            UnloadRequest {
                station_order_ids: vec![confirmed_id],
                ..Default::default()
            },
            driver,
        )
        .await
        .unwrap();

    let confirmed = StationOrder::find_by_id(confirmed_id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(confirmed.status, OrderStatus::Delivered.as_str());

    let pending = StationOrder::find_by_id(pending_id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.status, OrderStatus::OnRoute.as_str());

    // The unload action logs the confirmed set, not the loaded one.
    let unload_action = ItineraryAction::find()
        .filter(
            depot_core::entities::itinerary_action::Column::Kind.eq(ActionKind::Unload.as_str()),
        )
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unload_action.order_ids(), vec![confirmed_id]);
}

#[tokio::test]
async fn a_merging_load_replaces_the_route_endpoints() {
    let app = TestApp::new().await;
    let driver = some_user();
    let vehicle = app.seed_vehicle("VAN-11").await;
    let itineraries = app.state.itinerary_service();
    itineraries.prepare(vehicle.id, driver).await.unwrap();

    itineraries
        .load(
            LoadRequest {
                new_orders: vec![order_ref(1, "ORD-A")],
                pickup: Some(serde_json::json!({"gate": 1})),
                dropoff: Some(serde_json::json!({"gate": 2})),
                ..Default::default()
            },
            driver,
        )
        .await
        .unwrap();

    // The second load restates the endpoints from scratch: the absent
    // pickup clears the stored one.
    let merged = itineraries
        .load(
            LoadRequest {
                dropoff: Some(serde_json::json!({"gate": 7})),
                ..Default::default()
            },
            driver,
        )
        .await
        .unwrap();

    assert_eq!(merged.pickup, None);
    assert_eq!(merged.dropoff, Some(serde_json::json!({"gate": 7})));
}

#[tokio::test]
async fn an_unload_can_be_redone_while_the_itinerary_is_not_cancelled() {
    let app = TestApp::new().await;
    let driver = some_user();
    let vehicle = app.seed_vehicle("VAN-06").await;
    let itineraries = app.state.itinerary_service();
    itineraries.prepare(vehicle.id, driver).await.unwrap();
    itineraries
        .load(
            LoadRequest {
                new_orders: vec![order_ref(1, "ORD-A")],
                packs: vec![scanned(901), scanned(902)],
                ..Default::default()
            },
            driver,
        )
        .await
        .unwrap();

    itineraries
        .unload(UnloadRequest::default(), driver)
        .await
        .unwrap();
    let redone = itineraries
        .unload(
            UnloadRequest {
                comment: Some("forgot the dropoff proof the first time".into()),
                ..Default::default()
            },
            driver,
        )
        .await
        .unwrap();
    assert_eq!(redone.state(), Some(ItineraryState::Closed));

    // Only the final unload survives.
    let unload_count = ItineraryAction::find()
        .filter(
            depot_core::entities::itinerary_action::Column::Kind.eq(ActionKind::Unload.as_str()),
        )
        .count(app.state.db.as_ref())
        .await
        .unwrap();
    assert_eq!(unload_count, 1);

    let unload_pack_rows = PackAction::find()
        .filter(depot_core::entities::pack_action::Column::Kind.eq(ActionKind::Unload.as_str()))
        .count(app.state.db.as_ref())
        .await
        .unwrap();
    assert_eq!(unload_pack_rows, 2);

    let latest = LatestPackAction::find_by_id(901_i64)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.kind.as_deref(), Some("unload"));
}

#[tokio::test]
async fn correcting_without_an_open_load_is_rejected() {
    let app = TestApp::new().await;
    let driver = some_user();
    let vehicle = app.seed_vehicle("VAN-07").await;
    let itineraries = app.state.itinerary_service();
    itineraries.prepare(vehicle.id, driver).await.unwrap();

    let err = itineraries
        .update_load(UpdateLoadRequest::default(), driver)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}
