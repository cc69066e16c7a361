use crate::{
    db::DbPool,
    entities::{
        itinerary::{self, Entity as Itinerary, ItineraryState},
        itinerary_action::{self, ActionKind, ActionPhase, Entity as ItineraryAction},
        latest_pack_action::{self, Entity as LatestPackAction},
        pack_action::{self, Entity as PackAction, InputMethod},
        station_order::{self, Entity as StationOrder, OrderStatus},
        vehicle::{self, Entity as Vehicle, VehicleStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionError, TransactionTrait,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// A station order referenced by its business key. Orders are created on
/// first sight; the depot learns about them from the loading flow.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRef {
    pub station_id: i64,
    pub order_no: String,
}

/// One pack presented at the vehicle door.
#[derive(Debug, Clone, Deserialize)]
pub struct PackScan {
    pub pack_id: i64,
    pub input_method: InputMethod,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoadRequest {
    /// Ids of orders the depot already knows about.
    #[serde(default)]
    pub station_order_ids: Vec<i64>,
    #[serde(default)]
    pub new_orders: Vec<OrderRef>,
    #[serde(default)]
    pub packs: Vec<PackScan>,
    #[serde(default)]
    pub collected_blanket_no: i32,
    pub pickup: Option<serde_json::Value>,
    pub dropoff: Option<serde_json::Value>,
    pub proof_pickup: Option<serde_json::Value>,
    pub comment: Option<String>,
}

/// A corrected load: the full intended order and pack sets, plus whichever
/// scalar fields should be overwritten. Absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateLoadRequest {
    #[serde(default)]
    pub station_order_ids: Vec<i64>,
    #[serde(default)]
    pub new_orders: Vec<OrderRef>,
    #[serde(default)]
    pub packs: Vec<PackScan>,
    pub collected_blanket_no: Option<i32>,
    pub pickup: Option<serde_json::Value>,
    pub dropoff: Option<serde_json::Value>,
    pub proof_pickup: Option<serde_json::Value>,
    pub comment: Option<String>,
}

/// The unload payload. Orders named here (by id or business key) are the
/// ones confirmed delivered; when `packs` is absent the whole surviving
/// load set is treated as returned.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnloadRequest {
    #[serde(default)]
    pub station_order_ids: Vec<i64>,
    #[serde(default)]
    pub new_orders: Vec<OrderRef>,
    #[serde(default)]
    pub packs: Option<Vec<PackScan>>,
    #[serde(default)]
    pub collected_blanket_no: i32,
    pub pickup: Option<serde_json::Value>,
    pub dropoff: Option<serde_json::Value>,
    pub proof_pickup: Option<serde_json::Value>,
    pub proof_dropoff: Option<serde_json::Value>,
    pub comment: Option<String>,
}

fn order_ids_to_json(ids: &[i64]) -> serde_json::Value {
    serde_json::Value::Array(ids.iter().map(|id| serde_json::Value::from(*id)).collect())
}

/// Points the pack's latest-action row at the given pack action, creating
/// the row on first sight of the pack.
pub(crate) async fn point_latest_at<C: ConnectionTrait>(
    conn: &C,
    action: &pack_action::Model,
) -> Result<(), ServiceError> {
    let now = Utc::now();
    match LatestPackAction::find_by_id(action.pack_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
    {
        Some(existing) => {
            let mut active: latest_pack_action::ActiveModel = existing.into();
            active.pack_action_id = Set(Some(action.id));
            active.kind = Set(Some(action.kind.clone()));
            active.user_id = Set(Some(action.user_id));
            active.itinerary_id = Set(Some(action.itinerary_id));
            active.itinerary_action_id = Set(action.itinerary_action_id);
            active.updated_at = Set(now);
            active.update(conn).await.map_err(ServiceError::db_error)?;
        }
        None => {
            latest_pack_action::ActiveModel {
                pack_id: Set(action.pack_id),
                pack_action_id: Set(Some(action.id)),
                kind: Set(Some(action.kind.clone())),
                user_id: Set(Some(action.user_id)),
                itinerary_id: Set(Some(action.itinerary_id)),
                itinerary_action_id: Set(action.itinerary_action_id),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(conn)
            .await
            .map_err(ServiceError::db_error)?;
        }
    }
    Ok(())
}

/// Rewinds the pack's latest-action row to the highest-id surviving
/// (non-deleted) pack action, clearing every pointer field when none is
/// left.
pub(crate) async fn rewind_latest<C: ConnectionTrait>(
    conn: &C,
    pack_id: i64,
) -> Result<(), ServiceError> {
    let survivor = PackAction::find()
        .filter(pack_action::Column::PackId.eq(pack_id))
        .filter(pack_action::Column::DeletedAt.is_null())
        .order_by_desc(pack_action::Column::Id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if let Some(survivor) = survivor {
        return point_latest_at(conn, &survivor).await;
    }

    if let Some(existing) = LatestPackAction::find_by_id(pack_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
    {
        let mut active: latest_pack_action::ActiveModel = existing.into();
        active.pack_action_id = Set(None);
        active.kind = Set(None);
        active.user_id = Set(None);
        active.itinerary_id = Set(None);
        active.itinerary_action_id = Set(None);
        active.updated_at = Set(Utc::now());
        active.update(conn).await.map_err(ServiceError::db_error)?;
    }
    Ok(())
}

async fn resolve_or_create_order<C: ConnectionTrait>(
    conn: &C,
    order_ref: &OrderRef,
) -> Result<station_order::Model, ServiceError> {
    if let Some(existing) = StationOrder::find()
        .filter(station_order::Column::StationId.eq(order_ref.station_id))
        .filter(station_order::Column::OrderNo.eq(order_ref.order_no.clone()))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
    {
        return Ok(existing);
    }

    let now = Utc::now();
    station_order::ActiveModel {
        station_id: Set(order_ref.station_id),
        order_no: Set(order_ref.order_no.clone()),
        status: Set(OrderStatus::Packed.as_str().to_string()),
        loaded_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)
}

/// The order set referenced by a request: known ids first, then orders
/// resolved (or created) from their business keys, deduplicated in order.
async fn resolve_order_set<C: ConnectionTrait>(
    conn: &C,
    known_ids: &[i64],
    new_orders: &[OrderRef],
) -> Result<Vec<i64>, ServiceError> {
    let mut ids = Vec::new();
    for id in known_ids {
        if !ids.contains(id) {
            ids.push(*id);
        }
    }
    for order_ref in new_orders {
        let order = resolve_or_create_order(conn, order_ref).await?;
        if !ids.contains(&order.id) {
            ids.push(order.id);
        }
    }
    Ok(ids)
}

async fn stamp_orders_on_route<C: ConnectionTrait>(
    conn: &C,
    order_ids: &[i64],
) -> Result<(), ServiceError> {
    if order_ids.is_empty() {
        return Ok(());
    }
    let now = Utc::now();
    StationOrder::update_many()
        .col_expr(
            station_order::Column::Status,
            Expr::value(OrderStatus::OnRoute.as_str()),
        )
        .col_expr(station_order::Column::LoadedAt, Expr::value(Some(now)))
        .col_expr(station_order::Column::UpdatedAt, Expr::value(now))
        .filter(station_order::Column::Id.is_in(order_ids.to_vec()))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(())
}

async fn set_vehicle_status<C: ConnectionTrait>(
    conn: &C,
    vehicle_id: i64,
    status: VehicleStatus,
) -> Result<(), ServiceError> {
    let vehicle = Vehicle::find_by_id(vehicle_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("vehicle {} not found", vehicle_id)))?;
    let mut active: vehicle::ActiveModel = vehicle.into();
    active.status = Set(status.as_str().to_string());
    active.updated_at = Set(Utc::now());
    active.update(conn).await.map_err(ServiceError::db_error)?;
    Ok(())
}

/// Vehicle itinerary lifecycle: prepare, load, correct a load, unload.
#[derive(Clone)]
pub struct ItineraryService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl ItineraryService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// The driver's active itinerary, newest first.
    #[instrument(skip(self))]
    pub async fn current_itinerary(
        &self,
        user_id: Uuid,
    ) -> Result<Option<itinerary::Model>, ServiceError> {
        Itinerary::find()
            .filter(itinerary::Column::UserId.eq(user_id))
            .filter(itinerary::Column::IsActive.eq(true))
            .order_by_desc(itinerary::Column::Id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn active_itinerary_on<C: ConnectionTrait>(
        conn: &C,
        user_id: Uuid,
    ) -> Result<Option<itinerary::Model>, ServiceError> {
        Itinerary::find()
            .filter(itinerary::Column::UserId.eq(user_id))
            .filter(itinerary::Column::IsActive.eq(true))
            .order_by_desc(itinerary::Column::Id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Opens a fresh itinerary for a driver and vehicle.
    ///
    /// A driver may run at most one active itinerary at a time.
    #[instrument(skip(self))]
    pub async fn prepare(
        &self,
        vehicle_id: i64,
        user_id: Uuid,
    ) -> Result<itinerary::Model, ServiceError> {
        let db = self.db_pool.as_ref();

        let created = db
            .transaction::<_, itinerary::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    Vehicle::find_by_id(vehicle_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("vehicle {} not found", vehicle_id))
                        })?;

                    if Self::active_itinerary_on(txn, user_id).await?.is_some() {
                        return Err(ServiceError::InvalidOperation(
                            "driver already has an active itinerary".into(),
                        ));
                    }

                    let now = Utc::now();
                    itinerary::ActiveModel {
                        vehicle_id: Set(vehicle_id),
                        user_id: Set(user_id),
                        state: Set(ItineraryState::Preparing.as_str().to_string()),
                        is_active: Set(true),
                        auto_cancelled: Set(false),
                        prepared_at: Set(Some(now)),
                        loaded_at: Set(None),
                        closed_at: Set(None),
                        created_at: Set(now),
                        updated_at: Set(now),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(
            itinerary_id = created.id,
            vehicle_id = created.vehicle_id,
            "itinerary prepared"
        );

        self.event_sender
            .send_post_commit(Event::ItineraryPrepared {
                itinerary_id: created.id,
                vehicle_id: created.vehicle_id,
                user_id,
            })
            .await;

        Ok(created)
    }

    /// Loads packs and orders onto the driver's active itinerary.
    ///
    /// When the newest action is still an open load, the request merges into
    /// it: order ids union, blanket counts sum, pickup and dropoff replaced
    /// wholesale, remaining present scalar fields overwrite. Otherwise a
    /// fresh open load action is appended. Loading is rejected once the
    /// route has begun (more than one action logged).
    #[instrument(skip(self, request))]
    pub async fn load(
        &self,
        request: LoadRequest,
        user_id: Uuid,
    ) -> Result<itinerary_action::Model, ServiceError> {
        let db = self.db_pool.as_ref();

        let (action, vehicle_id, order_ids, pack_count, merged) = db
            .transaction::<_, (itinerary_action::Model, i64, Vec<i64>, usize, bool), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let itinerary = Self::active_itinerary_on(txn, user_id)
                            .await?
                            .ok_or_else(|| {
                                ServiceError::InvalidOperation(
                                    "driver has no active itinerary".into(),
                                )
                            })?;

                        let actions = ItineraryAction::find()
                            .filter(itinerary_action::Column::ItineraryId.eq(itinerary.id))
                            .order_by_desc(itinerary_action::Column::Id)
                            .all(txn)
                            .await
                            .map_err(ServiceError::db_error)?;
                        if actions.len() > 1 {
                            return Err(ServiceError::InvalidOperation(
                                "route has begun; the load can no longer change".into(),
                            ));
                        }

                        let new_ids = resolve_order_set(
                            txn,
                            &request.station_order_ids,
                            &request.new_orders,
                        )
                        .await?;
                        stamp_orders_on_route(txn, &new_ids).await?;

                        let open_load = actions.into_iter().next().filter(|a| {
                            a.kind() == Some(ActionKind::Load)
                                && a.phase() == Some(ActionPhase::Open)
                        });
                        let merged = open_load.is_some();

                        let action = match open_load {
                            Some(existing) => {
                                let mut order_ids = existing.order_ids();
                                for id in &new_ids {
                                    if !order_ids.contains(id) {
                                        order_ids.push(*id);
                                    }
                                }
                                let blanket_no =
                                    existing.collected_blanket_no + request.collected_blanket_no;
                                let mut active: itinerary_action::ActiveModel = existing.into();
                                active.station_order_ids = Set(order_ids_to_json(&order_ids));
                                active.collected_blanket_no = Set(blanket_no);
                                // The latest load owns the route endpoints:
                                // an absent field clears the stored one.
                                active.pickup = Set(request.pickup.clone());
                                active.dropoff = Set(request.dropoff.clone());
                                if let Some(proof) = request.proof_pickup.clone() {
                                    active.proof_pickup = Set(Some(proof));
                                }
                                if let Some(comment) = request.comment.clone() {
                                    active.comment = Set(Some(comment));
                                }
                                active.update(txn).await.map_err(ServiceError::db_error)?
                            }
                            None => itinerary_action::ActiveModel {
                                itinerary_id: Set(itinerary.id),
                                user_id: Set(user_id),
                                kind: Set(ActionKind::Load.as_str().to_string()),
                                phase: Set(ActionPhase::Open.as_str().to_string()),
                                station_order_ids: Set(order_ids_to_json(&new_ids)),
                                collected_blanket_no: Set(request.collected_blanket_no),
                                pickup: Set(request.pickup.clone()),
                                dropoff: Set(request.dropoff.clone()),
                                proof_pickup: Set(request.proof_pickup.clone()),
                                proof_dropoff: Set(None),
                                comment: Set(request.comment.clone()),
                                ..Default::default()
                            }
                            .insert(txn)
                            .await
                            .map_err(ServiceError::db_error)?,
                        };

                        for scan in &request.packs {
                            let pack_action = pack_action::ActiveModel {
                                pack_id: Set(scan.pack_id),
                                user_id: Set(user_id),
                                kind: Set(ActionKind::Load.as_str().to_string()),
                                input_method: Set(scan.input_method.as_str().to_string()),
                                itinerary_id: Set(itinerary.id),
                                itinerary_action_id: Set(None),
                                deleted_at: Set(None),
                                ..Default::default()
                            }
                            .insert(txn)
                            .await
                            .map_err(ServiceError::db_error)?;
                            point_latest_at(txn, &pack_action).await?;
                        }

                        let now = Utc::now();
                        let vehicle_id = itinerary.vehicle_id;
                        let mut active_itinerary: itinerary::ActiveModel = itinerary.into();
                        active_itinerary.state =
                            Set(ItineraryState::Loaded.as_str().to_string());
                        active_itinerary.loaded_at = Set(Some(now));
                        active_itinerary.updated_at = Set(now);
                        active_itinerary
                            .update(txn)
                            .await
                            .map_err(ServiceError::db_error)?;
                        set_vehicle_status(txn, vehicle_id, VehicleStatus::Loaded).await?;

                        let order_ids = action.order_ids();
                        Ok((action, vehicle_id, order_ids, request.packs.len(), merged))
                    })
                },
            )
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(
            itinerary_id = action.itinerary_id,
            action_id = action.id,
            orders = order_ids.len(),
            packs = pack_count,
            merged,
            "vehicle loaded"
        );

        self.event_sender
            .send_post_commit(Event::VehicleLoaded {
                itinerary_id: action.itinerary_id,
                action_id: action.id,
                vehicle_id,
                station_order_ids: order_ids,
                pack_count,
                user_id,
            })
            .await;

        Ok(action)
    }

    /// Corrects the newest open load action before the route begins.
    ///
    /// The request carries the full intended order and pack sets. Prior load
    /// pack actions are soft-deleted and re-created; packs no longer present
    /// have their latest pointer rewound; orders dropped from the set revert
    /// to `packed`.
    #[instrument(skip(self, request))]
    pub async fn update_load(
        &self,
        request: UpdateLoadRequest,
        user_id: Uuid,
    ) -> Result<itinerary_action::Model, ServiceError> {
        let db = self.db_pool.as_ref();

        let (action, vehicle_id, order_ids, pack_count) = db
            .transaction::<_, (itinerary_action::Model, i64, Vec<i64>, usize), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let itinerary = Self::active_itinerary_on(txn, user_id)
                            .await?
                            .ok_or_else(|| {
                                ServiceError::InvalidOperation(
                                    "driver has no active itinerary".into(),
                                )
                            })?;

                        let action = ItineraryAction::find()
                            .filter(itinerary_action::Column::ItineraryId.eq(itinerary.id))
                            .filter(
                                itinerary_action::Column::Kind.eq(ActionKind::Load.as_str()),
                            )
                            .filter(
                                itinerary_action::Column::Phase.eq(ActionPhase::Open.as_str()),
                            )
                            .order_by_desc(itinerary_action::Column::Id)
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?
                            .ok_or_else(|| {
                                ServiceError::InvalidOperation(
                                    "no open load action to correct".into(),
                                )
                            })?;

                        // Soft-delete every live load pack action, then
                        // re-create the corrected set.
                        let prior_pack_rows = PackAction::find()
                            .filter(pack_action::Column::ItineraryId.eq(itinerary.id))
                            .filter(pack_action::Column::Kind.eq(ActionKind::Load.as_str()))
                            .filter(pack_action::Column::DeletedAt.is_null())
                            .all(txn)
                            .await
                            .map_err(ServiceError::db_error)?;
                        let now = Utc::now();
                        let mut prior_pack_ids = Vec::new();
                        for row in prior_pack_rows {
                            if !prior_pack_ids.contains(&row.pack_id) {
                                prior_pack_ids.push(row.pack_id);
                            }
                            let mut active_row: pack_action::ActiveModel = row.into();
                            active_row.deleted_at = Set(Some(now));
                            active_row.update(txn).await.map_err(ServiceError::db_error)?;
                        }

                        let mut kept_pack_ids = Vec::new();
                        for scan in &request.packs {
                            kept_pack_ids.push(scan.pack_id);
                            let pack_action = pack_action::ActiveModel {
                                pack_id: Set(scan.pack_id),
                                user_id: Set(user_id),
                                kind: Set(ActionKind::Load.as_str().to_string()),
                                input_method: Set(scan.input_method.as_str().to_string()),
                                itinerary_id: Set(itinerary.id),
                                itinerary_action_id: Set(None),
                                deleted_at: Set(None),
                                ..Default::default()
                            }
                            .insert(txn)
                            .await
                            .map_err(ServiceError::db_error)?;
                            point_latest_at(txn, &pack_action).await?;
                        }
                        for pack_id in prior_pack_ids {
                            if !kept_pack_ids.contains(&pack_id) {
                                rewind_latest(txn, pack_id).await?;
                            }
                        }

                        let corrected_ids = resolve_order_set(
                            txn,
                            &request.station_order_ids,
                            &request.new_orders,
                        )
                        .await?;
                        let dropped: Vec<i64> = action
                            .order_ids()
                            .into_iter()
                            .filter(|id| !corrected_ids.contains(id))
                            .collect();
                        if !dropped.is_empty() {
                            StationOrder::update_many()
                                .col_expr(
                                    station_order::Column::Status,
                                    Expr::value(OrderStatus::Packed.as_str()),
                                )
                                .col_expr(
                                    station_order::Column::LoadedAt,
                                    Expr::value(Option::<chrono::DateTime<Utc>>::None),
                                )
                                .col_expr(station_order::Column::UpdatedAt, Expr::value(now))
                                .filter(station_order::Column::Id.is_in(dropped))
                                .exec(txn)
                                .await
                                .map_err(ServiceError::db_error)?;
                        }
                        stamp_orders_on_route(txn, &corrected_ids).await?;

                        let vehicle_id = itinerary.vehicle_id;
                        let mut active_action: itinerary_action::ActiveModel = action.into();
                        active_action.station_order_ids =
                            Set(order_ids_to_json(&corrected_ids));
                        if let Some(blanket_no) = request.collected_blanket_no {
                            active_action.collected_blanket_no = Set(blanket_no);
                        }
                        if let Some(pickup) = request.pickup.clone() {
                            active_action.pickup = Set(Some(pickup));
                        }
                        if let Some(dropoff) = request.dropoff.clone() {
                            active_action.dropoff = Set(Some(dropoff));
                        }
                        if let Some(proof) = request.proof_pickup.clone() {
                            active_action.proof_pickup = Set(Some(proof));
                        }
                        if let Some(comment) = request.comment.clone() {
                            active_action.comment = Set(Some(comment));
                        }
                        let action = active_action
                            .update(txn)
                            .await
                            .map_err(ServiceError::db_error)?;

                        Ok((action, vehicle_id, corrected_ids, request.packs.len()))
                    })
                },
            )
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(
            itinerary_id = action.itinerary_id,
            action_id = action.id,
            orders = order_ids.len(),
            packs = pack_count,
            "vehicle load corrected"
        );

        self.event_sender
            .send_post_commit(Event::VehicleLoadCorrected {
                itinerary_id: action.itinerary_id,
                action_id: action.id,
                vehicle_id,
                station_order_ids: order_ids,
                pack_count,
                user_id,
            })
            .await;

        Ok(action)
    }

    /// Records the unload, closing the itinerary and freeing the vehicle.
    ///
    /// An inactive, non-auto-cancelled itinerary may re-do its unload: the
    /// prior unload action and its pack actions are hard-deleted first, as
    /// only the final unload is meaningful. Each returned pack gets an
    /// `unload` pack action tied to the new action row; orders the payload
    /// names explicitly move to `delivered`, the rest keep their status.
    #[instrument(skip(self, request))]
    pub async fn unload(
        &self,
        request: UnloadRequest,
        user_id: Uuid,
    ) -> Result<itinerary::Model, ServiceError> {
        let db = self.db_pool.as_ref();

        let (closed, action_id, pack_count) = db
            .transaction::<_, (itinerary::Model, i64, usize), ServiceError>(move |txn| {
                Box::pin(async move {
                    let itinerary = match Self::active_itinerary_on(txn, user_id).await? {
                        Some(active) => active,
                        None => Itinerary::find()
                            .filter(itinerary::Column::UserId.eq(user_id))
                            .order_by_desc(itinerary::Column::Id)
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?
                            .ok_or_else(|| {
                                ServiceError::InvalidOperation(
                                    "driver has no itinerary to unload".into(),
                                )
                            })?,
                    };

                    if !itinerary.is_active {
                        if itinerary.auto_cancelled {
                            return Err(ServiceError::InvalidOperation(
                                "itinerary was auto-cancelled and cannot be unloaded".into(),
                            ));
                        }
                        // Re-doing the unload: only the final one counts.
                        if let Some(prior) = ItineraryAction::find()
                            .filter(itinerary_action::Column::ItineraryId.eq(itinerary.id))
                            .filter(
                                itinerary_action::Column::Kind.eq(ActionKind::Unload.as_str()),
                            )
                            .order_by_desc(itinerary_action::Column::Id)
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?
                        {
                            let prior_packs = PackAction::find()
                                .filter(
                                    pack_action::Column::ItineraryActionId.eq(prior.id),
                                )
                                .all(txn)
                                .await
                                .map_err(ServiceError::db_error)?;
                            let affected: Vec<i64> =
                                prior_packs.iter().map(|p| p.pack_id).collect();
                            PackAction::delete_many()
                                .filter(
                                    pack_action::Column::ItineraryActionId.eq(prior.id),
                                )
                                .exec(txn)
                                .await
                                .map_err(ServiceError::db_error)?;
                            ItineraryAction::delete_by_id(prior.id)
                                .exec(txn)
                                .await
                                .map_err(ServiceError::db_error)?;
                            for pack_id in affected {
                                rewind_latest(txn, pack_id).await?;
                            }
                            warn!(
                                itinerary_id = itinerary.id,
                                prior_action_id = prior.id,
                                "discarded prior unload for re-do"
                            );
                        }
                    }

                    let delivered_ids = resolve_order_set(
                        txn,
                        &request.station_order_ids,
                        &request.new_orders,
                    )
                    .await?;

                    // A different-kind append closes the open load.
                    let open_load = ItineraryAction::find()
                        .filter(itinerary_action::Column::ItineraryId.eq(itinerary.id))
                        .filter(itinerary_action::Column::Kind.eq(ActionKind::Load.as_str()))
                        .filter(itinerary_action::Column::Phase.eq(ActionPhase::Open.as_str()))
                        .order_by_desc(itinerary_action::Column::Id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    // An empty payload set falls back to the loaded orders.
                    let order_ids = if delivered_ids.is_empty() {
                        open_load
                            .as_ref()
                            .map(|a| a.order_ids())
                            .unwrap_or_default()
                    } else {
                        delivered_ids.clone()
                    };
                    if let Some(load) = open_load {
                        let mut active_load: itinerary_action::ActiveModel = load.into();
                        active_load.phase = Set(ActionPhase::Closed.as_str().to_string());
                        active_load.update(txn).await.map_err(ServiceError::db_error)?;
                    }

                    let unload_action = itinerary_action::ActiveModel {
                        itinerary_id: Set(itinerary.id),
                        user_id: Set(user_id),
                        kind: Set(ActionKind::Unload.as_str().to_string()),
                        phase: Set(ActionPhase::Closed.as_str().to_string()),
                        station_order_ids: Set(order_ids_to_json(&order_ids)),
                        collected_blanket_no: Set(request.collected_blanket_no),
                        pickup: Set(request.pickup.clone()),
                        dropoff: Set(request.dropoff.clone()),
                        proof_pickup: Set(request.proof_pickup.clone()),
                        proof_dropoff: Set(request.proof_dropoff.clone()),
                        comment: Set(request.comment.clone()),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                    // The payload names the returned packs; without one the
                    // whole surviving load set counts as returned, each pack
                    // keeping the input method of its latest load row.
                    let mut returned_packs: BTreeMap<i64, String> = BTreeMap::new();
                    match &request.packs {
                        Some(scans) => {
                            for scan in scans {
                                returned_packs.insert(
                                    scan.pack_id,
                                    scan.input_method.as_str().to_string(),
                                );
                            }
                        }
                        None => {
                            let load_rows = PackAction::find()
                                .filter(pack_action::Column::ItineraryId.eq(itinerary.id))
                                .filter(
                                    pack_action::Column::Kind.eq(ActionKind::Load.as_str()),
                                )
                                .filter(pack_action::Column::DeletedAt.is_null())
                                .order_by_asc(pack_action::Column::Id)
                                .all(txn)
                                .await
                                .map_err(ServiceError::db_error)?;
                            for row in load_rows {
                                returned_packs.insert(row.pack_id, row.input_method);
                            }
                        }
                    }
                    let pack_count = returned_packs.len();
                    for (pack_id, input_method) in returned_packs {
                        let pack_action = pack_action::ActiveModel {
                            pack_id: Set(pack_id),
                            user_id: Set(user_id),
                            kind: Set(ActionKind::Unload.as_str().to_string()),
                            input_method: Set(input_method),
                            itinerary_id: Set(itinerary.id),
                            itinerary_action_id: Set(Some(unload_action.id)),
                            deleted_at: Set(None),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                        point_latest_at(txn, &pack_action).await?;
                    }

                    // Only orders the payload names explicitly are confirmed
                    // delivered; orders inherited from the load keep their
                    // status.
                    if !delivered_ids.is_empty() {
                        StationOrder::update_many()
                            .col_expr(
                                station_order::Column::Status,
                                Expr::value(OrderStatus::Delivered.as_str()),
                            )
                            .col_expr(
                                station_order::Column::UpdatedAt,
                                Expr::value(Utc::now()),
                            )
                            .filter(station_order::Column::Id.is_in(delivered_ids))
                            .exec(txn)
                            .await
                            .map_err(ServiceError::db_error)?;
                    }

                    let now = Utc::now();
                    let vehicle_id = itinerary.vehicle_id;
                    let mut active_itinerary: itinerary::ActiveModel = itinerary.into();
                    active_itinerary.state = Set(ItineraryState::Closed.as_str().to_string());
                    active_itinerary.is_active = Set(false);
                    active_itinerary.closed_at = Set(Some(now));
                    active_itinerary.updated_at = Set(now);
                    let closed = active_itinerary
                        .update(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    set_vehicle_status(txn, vehicle_id, VehicleStatus::Available).await?;

                    Ok((closed, unload_action.id, pack_count))
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(
            itinerary_id = closed.id,
            action_id,
            packs = pack_count,
            "vehicle unloaded"
        );

        self.event_sender
            .send_post_commit(Event::VehicleUnloaded {
                itinerary_id: closed.id,
                action_id,
                vehicle_id: closed.vehicle_id,
                pack_count,
                user_id,
            })
            .await;

        Ok(closed)
    }
}
