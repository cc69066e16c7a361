use crate::{
    db::DbPool,
    entities::{
        batch::{self, Entity as Batch},
        drug::Entity as Drug,
        workstation::{self, Entity as Workstation},
        workstation_audit::{self, Entity as WorkstationAudit},
        workstation_transaction::{self, Entity as WorkstationTransaction, TransactionType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{NaiveDate, NaiveTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionError, TransactionTrait,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Derived batch-id -> quantity mapping. Keys are batch ids; the JSON column
/// form stores them as strings, as the audit trail always has.
pub type BatchQuantities = BTreeMap<i64, i64>;

pub(crate) fn quantities_to_json(map: &BatchQuantities) -> serde_json::Value {
    serde_json::Value::Object(
        map.iter()
            .map(|(batch_id, qty)| (batch_id.to_string(), serde_json::Value::from(*qty)))
            .collect(),
    )
}

pub(crate) fn quantities_from_json(
    value: &serde_json::Value,
) -> Result<BatchQuantities, ServiceError> {
    serde_json::from_value(value.clone())
        .map_err(|e| ServiceError::InternalError(format!("corrupt batch quantity map: {}", e)))
}

/// Most recent audit for a workstation, by creation order. There is no
/// "current" flag; greatest id wins.
pub(crate) async fn latest_audit_on<C: ConnectionTrait>(
    conn: &C,
    workstation_id: i64,
) -> Result<Option<workstation_audit::Model>, ServiceError> {
    WorkstationAudit::find()
        .filter(workstation_audit::Column::WorkstationId.eq(workstation_id))
        .order_by_desc(workstation_audit::Column::Id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Reconciles current on-hand quantities from the latest audit baseline plus
/// the transactions logged against it.
///
/// For every batch with at least one transaction since the baseline, the
/// greatest-id transaction's `running_total` overrides the baseline value.
/// Entries that land at zero or below are pruned: "not in inventory".
/// The result depends only on the audit id and its transaction set.
pub(crate) async fn derive_inventory_on<C: ConnectionTrait>(
    conn: &C,
    workstation_id: i64,
) -> Result<BatchQuantities, ServiceError> {
    let Some(audit) = latest_audit_on(conn, workstation_id).await? else {
        return Ok(BatchQuantities::new());
    };

    let mut inventory = quantities_from_json(&audit.batch_quantities)?;

    let transactions = WorkstationTransaction::find()
        .filter(workstation_transaction::Column::AuditId.eq(audit.id))
        .order_by_asc(workstation_transaction::Column::Id)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    // Ascending scan: the last write per batch is the authoritative total.
    for tx in transactions {
        inventory.insert(tx.batch_id, tx.running_total);
    }

    inventory.retain(|_, quantity| *quantity > 0);
    Ok(inventory)
}

/// Unpruned on-hand quantity for a single batch. Used to materialize
/// `running_total` at write time; a drained batch reads as its true signed
/// total here, not as "absent".
pub(crate) async fn on_hand_for_batch<C: ConnectionTrait>(
    conn: &C,
    workstation_id: i64,
    batch_id: i64,
) -> Result<i64, ServiceError> {
    let Some(audit) = latest_audit_on(conn, workstation_id).await? else {
        return Ok(0);
    };

    let last = WorkstationTransaction::find()
        .filter(workstation_transaction::Column::AuditId.eq(audit.id))
        .filter(workstation_transaction::Column::BatchId.eq(batch_id))
        .order_by_desc(workstation_transaction::Column::Id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;

    match last {
        Some(tx) => Ok(tx.running_total),
        None => Ok(quantities_from_json(&audit.batch_quantities)?
            .get(&batch_id)
            .copied()
            .unwrap_or(0)),
    }
}

/// Resolves a batch by `(drug_id, batch_no)`, creating it if missing.
/// An unknown drug id aborts the caller's transaction.
pub(crate) async fn resolve_or_create_batch<C: ConnectionTrait>(
    conn: &C,
    drug_id: i64,
    batch_no: &str,
    expiry_date: NaiveDate,
) -> Result<batch::Model, ServiceError> {
    Drug::find_by_id(drug_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("drug {} not found", drug_id)))?;

    if let Some(existing) = Batch::find()
        .filter(batch::Column::DrugId.eq(drug_id))
        .filter(batch::Column::BatchNo.eq(batch_no))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
    {
        return Ok(existing);
    }

    batch::ActiveModel {
        drug_id: Set(drug_id),
        batch_no: Set(batch_no.to_string()),
        expiry_date: Set(expiry_date),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)
}

/// One observed batch within an audit report.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchCount {
    /// Id of an already-known batch; required unless `is_new`.
    pub batch_id: Option<i64>,
    /// Batch number printed on the lot; required when `is_new`.
    pub batch_no: Option<String>,
    /// Expiry date printed on the lot; required when `is_new`.
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_new: bool,
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DrugCount {
    pub drug_id: i64,
    pub batches: Vec<BatchCount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditRequest {
    pub workstation_id: i64,
    pub drugs: Vec<DrugCount>,
    pub comment: Option<String>,
}

/// Workstation inventory service: the state reconciler plus the audit half
/// of the transfer engine.
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl InventoryService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Current derived inventory for a workstation.
    #[instrument(skip(self))]
    pub async fn current_inventory(
        &self,
        workstation_id: i64,
    ) -> Result<BatchQuantities, ServiceError> {
        derive_inventory_on(self.db_pool.as_ref(), workstation_id).await
    }

    /// Signed delta taking `current` to `observed`.
    ///
    /// Missing entries count as zero and equal-value batches are omitted.
    /// An empty `current` (first-ever audit) returns `observed` verbatim:
    /// the report is the fresh baseline.
    pub fn compute_delta(observed: &BatchQuantities, current: &BatchQuantities) -> BatchQuantities {
        if current.is_empty() {
            return observed.clone();
        }

        let mut changes = BatchQuantities::new();
        for batch_id in observed.keys().chain(current.keys()) {
            let reported = observed.get(batch_id).copied().unwrap_or(0);
            let on_hand = current.get(batch_id).copied().unwrap_or(0);
            if reported != on_hand {
                changes.insert(*batch_id, reported - on_hand);
            }
        }
        changes
    }

    /// Records an inventory audit for a workstation.
    ///
    /// Resolves (or creates) every reported batch, computes the delta against
    /// the derived inventory, writes the audit row, and stamps the
    /// workstation's audited-by/at metadata, all in one transaction. Nothing
    /// is visible if batch resolution fails. Depot management is notified
    /// exactly once, after commit.
    #[instrument(skip(self, request))]
    pub async fn record_audit(
        &self,
        request: AuditRequest,
        auditor_id: Uuid,
    ) -> Result<(workstation_audit::Model, BatchQuantities), ServiceError> {
        let db = self.db_pool.as_ref();

        let (audit, changes, workstation_name) = db
            .transaction::<_, (workstation_audit::Model, BatchQuantities, String), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let station = Workstation::find_by_id(request.workstation_id)
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "workstation {} not found",
                                    request.workstation_id
                                ))
                            })?;

                        let mut observed = BatchQuantities::new();
                        for drug_count in &request.drugs {
                            for batch_count in &drug_count.batches {
                                let batch_id = if batch_count.is_new {
                                    let batch_no =
                                        batch_count.batch_no.as_deref().ok_or_else(|| {
                                            ServiceError::ValidationError(
                                                "batch_no is required for a new batch".into(),
                                            )
                                        })?;
                                    let expiry_date =
                                        batch_count.expiry_date.ok_or_else(|| {
                                            ServiceError::ValidationError(
                                                "expiry_date is required for a new batch".into(),
                                            )
                                        })?;
                                    resolve_or_create_batch(
                                        txn,
                                        drug_count.drug_id,
                                        batch_no,
                                        expiry_date,
                                    )
                                    .await?
                                    .id
                                } else {
                                    let batch_id = batch_count.batch_id.ok_or_else(|| {
                                        ServiceError::ValidationError(
                                            "batch_id is required for an existing batch".into(),
                                        )
                                    })?;
                                    Batch::find_by_id(batch_id)
                                        .one(txn)
                                        .await
                                        .map_err(ServiceError::db_error)?
                                        .ok_or_else(|| {
                                            ServiceError::NotFound(format!(
                                                "batch {} not found",
                                                batch_id
                                            ))
                                        })?;
                                    batch_id
                                };
                                observed.insert(batch_id, batch_count.quantity);
                            }
                        }

                        let current = derive_inventory_on(txn, station.id).await?;
                        let changes = InventoryService::compute_delta(&observed, &current);

                        let audit = workstation_audit::ActiveModel {
                            workstation_id: Set(station.id),
                            auditor_id: Set(auditor_id),
                            comment: Set(request.comment.clone()),
                            batch_quantities: Set(quantities_to_json(&observed)),
                            inventory_changes: Set(quantities_to_json(&changes)),
                            created_at: Set(Utc::now()),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                        let workstation_name = station.name.clone();
                        let mut active_station: workstation::ActiveModel = station.into();
                        active_station.audited_by = Set(Some(auditor_id));
                        active_station.audited_at = Set(Some(Utc::now()));
                        active_station.updated_at = Set(Utc::now());
                        active_station
                            .update(txn)
                            .await
                            .map_err(ServiceError::db_error)?;

                        Ok((audit, changes, workstation_name))
                    })
                },
            )
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(
            audit_id = audit.id,
            workstation_id = audit.workstation_id,
            changed_batches = changes.len(),
            "workstation audited"
        );

        self.event_sender
            .send_post_commit(Event::WorkstationAudited {
                audit_id: audit.id,
                workstation_id: audit.workstation_id,
                workstation_name,
                auditor_id,
                inventory_changes: quantities_to_json(&changes),
            })
            .await;

        Ok((audit, changes))
    }

    /// Appends a single signed ledger row with its materialized running
    /// total. Used by replenishment flows and the external import feed.
    #[instrument(skip(self))]
    pub async fn record_adjustment(
        &self,
        workstation_id: i64,
        batch_id: i64,
        quantity: i64,
        transaction_type: TransactionType,
        user_id: Uuid,
        comment: Option<String>,
    ) -> Result<workstation_transaction::Model, ServiceError> {
        if quantity == 0 {
            return Err(ServiceError::ValidationError(
                "transaction quantity must not be zero".into(),
            ));
        }

        let db = self.db_pool.as_ref();

        let transaction = db
            .transaction::<_, workstation_transaction::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    Workstation::find_by_id(workstation_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!(
                                "workstation {} not found",
                                workstation_id
                            ))
                        })?;
                    Batch::find_by_id(batch_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("batch {} not found", batch_id))
                        })?;

                    let audit = latest_audit_on(txn, workstation_id).await?;
                    let on_hand = on_hand_for_batch(txn, workstation_id, batch_id).await?;

                    workstation_transaction::ActiveModel {
                        workstation_id: Set(workstation_id),
                        audit_id: Set(audit.map(|a| a.id)),
                        user_id: Set(user_id),
                        batch_id: Set(batch_id),
                        transaction_type: Set(transaction_type.as_str().to_string()),
                        quantity: Set(quantity),
                        running_total: Set(on_hand + quantity),
                        comment: Set(comment),
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

        self.event_sender
            .send_post_commit(Event::InventoryAdjusted {
                transaction_id: transaction.id,
                workstation_id,
                batch_id,
                quantity,
                transaction_type: transaction.transaction_type.clone(),
                user_id,
            })
            .await;

        Ok(transaction)
    }

    /// Most recent external-import row for a workstation, if any.
    #[instrument(skip(self))]
    pub async fn latest_external_import(
        &self,
        workstation_id: i64,
    ) -> Result<Option<workstation_transaction::Model>, ServiceError> {
        WorkstationTransaction::find()
            .filter(workstation_transaction::Column::WorkstationId.eq(workstation_id))
            .filter(
                workstation_transaction::Column::TransactionType
                    .eq(TransactionType::ExternalImport.as_str()),
            )
            .order_by_desc(workstation_transaction::Column::Id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Associates a tablet/scanner device with a workstation.
    ///
    /// A workstation already associated elsewhere may only be re-associated
    /// when its latest audit predates the start of the current day (the
    /// overnight "workstation stealing" window); otherwise the request is an
    /// invalid operation. Whatever workstation currently holds the device id
    /// is disassociated in the same transaction.
    #[instrument(skip(self))]
    pub async fn associate_device(
        &self,
        workstation_id: i64,
        device_id: Option<String>,
        user_id: Uuid,
    ) -> Result<workstation::Model, ServiceError> {
        let device_id = device_id
            .filter(|d| !d.is_empty())
            .ok_or_else(|| ServiceError::ValidationError("device id missing".into()))?;

        let db = self.db_pool.as_ref();
        let event_device_id = device_id.clone();

        let station = db
            .transaction::<_, workstation::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let station = Workstation::find_by_id(workstation_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!(
                                "workstation {} not found",
                                workstation_id
                            ))
                        })?;

                    if station.associated_device_id.is_some() {
                        let start_of_day = Utc::now()
                            .date_naive()
                            .and_time(NaiveTime::MIN)
                            .and_utc();
                        let stealable = latest_audit_on(txn, station.id)
                            .await?
                            .map(|audit| audit.created_at < start_of_day)
                            .unwrap_or(false);
                        if !stealable {
                            return Err(ServiceError::InvalidOperation(
                                "workstation already associated to another device".into(),
                            ));
                        }
                    }

                    // Disassociate whichever workstation currently holds the device.
                    if let Some(holder) = Workstation::find()
                        .filter(workstation::Column::AssociatedDeviceId.eq(device_id.clone()))
                        .filter(workstation::Column::Id.ne(station.id))
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                    {
                        let mut active_holder: workstation::ActiveModel = holder.into();
                        active_holder.associated_device_id = Set(None);
                        active_holder.updated_at = Set(Utc::now());
                        active_holder
                            .update(txn)
                            .await
                            .map_err(ServiceError::db_error)?;
                    }

                    let mut active_station: workstation::ActiveModel = station.into();
                    active_station.associated_device_id = Set(Some(device_id));
                    active_station.updated_at = Set(Utc::now());
                    active_station
                        .update(txn)
                        .await
                        .map_err(ServiceError::db_error)
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        self.event_sender
            .send_post_commit(Event::WorkstationDeviceChanged {
                workstation_id: station.id,
                workstation_name: station.name.clone(),
                device_id: event_device_id,
                user_id,
            })
            .await;

        Ok(station)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quantities(pairs: &[(i64, i64)]) -> BatchQuantities {
        pairs.iter().copied().collect()
    }

    #[test]
    fn delta_against_empty_inventory_is_the_observed_map() {
        let observed = quantities(&[(1, 10), (2, 0)]);
        let delta = InventoryService::compute_delta(&observed, &BatchQuantities::new());
        assert_eq!(delta, observed);
    }

    #[test]
    fn delta_omits_unchanged_batches() {
        // Worked example: current {B1: 7, B2: 5}, observed {B1: 7, B2: 0, B3: 4}
        let current = quantities(&[(1, 7), (2, 5)]);
        let observed = quantities(&[(1, 7), (2, 0), (3, 4)]);
        let delta = InventoryService::compute_delta(&observed, &current);
        assert_eq!(delta, quantities(&[(2, -5), (3, 4)]));
    }

    #[test]
    fn delta_treats_missing_entries_as_zero() {
        let current = quantities(&[(9, 3)]);
        let observed = BatchQuantities::new();
        let delta = InventoryService::compute_delta(&observed, &current);
        assert_eq!(delta, quantities(&[(9, -3)]));
    }

    #[test]
    fn quantity_maps_round_trip_through_json() {
        let map = quantities(&[(4, 12), (17, -2)]);
        let json = quantities_to_json(&map);
        assert_eq!(json["4"], 12);
        assert_eq!(quantities_from_json(&json).unwrap(), map);
    }

    #[test]
    fn corrupt_quantity_maps_are_an_internal_error() {
        let err = quantities_from_json(&serde_json::json!({"not a number": "x"})).unwrap_err();
        assert!(matches!(err, ServiceError::InternalError(_)));
    }
}
