use crate::{
    db::DbPool,
    entities::{
        batch::Entity as Batch,
        workstation::Entity as Workstation,
        workstation_transaction::{self, TransactionType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory::{latest_audit_on, on_hand_for_batch},
};
use sea_orm::{
    ActiveModelTrait, EntityTrait, Set, TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// A request to move stock of one batch between two workstations.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TransferRequest {
    pub source_workstation_id: i64,
    pub destination_workstation_id: i64,
    pub batch_id: i64,
    #[validate(range(min = 1, message = "quantity must be positive"))]
    pub quantity: i64,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub source_transaction_id: i64,
    pub destination_transaction_id: i64,
}

/// Moves inventory between workstations as an atomic pair of ledger rows.
#[derive(Clone)]
pub struct TransferService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl TransferService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Executes a transfer: a `move_out` row at the source and a `move_in`
    /// row at the destination, each carrying its own materialized running
    /// total, cross-linked by id and by the counterparty's name. Both rows
    /// commit or neither does.
    ///
    /// Only receiving workstations may be a destination. The source is
    /// allowed to go negative; the discrepancy surfaces at its next audit.
    #[instrument(skip(self, request), fields(batch_id = request.batch_id, quantity = request.quantity))]
    pub async fn transfer(
        &self,
        request: TransferRequest,
        user_id: Uuid,
    ) -> Result<TransferOutcome, ServiceError> {
        request.validate()?;
        if request.source_workstation_id == request.destination_workstation_id {
            return Err(ServiceError::ValidationError(
                "source and destination workstations must differ".into(),
            ));
        }

        let db = self.db_pool.as_ref();
        let comment = request.comment.clone();

        let (source_tx, dest_tx, source_name, dest_name, drug_id) = db
            .transaction::<_, (
                workstation_transaction::Model,
                workstation_transaction::Model,
                String,
                String,
                i64,
            ), ServiceError>(move |txn| {
                Box::pin(async move {
                    let source = Workstation::find_by_id(request.source_workstation_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!(
                                "workstation {} not found",
                                request.source_workstation_id
                            ))
                        })?;
                    let destination = Workstation::find_by_id(request.destination_workstation_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!(
                                "workstation {} not found",
                                request.destination_workstation_id
                            ))
                        })?;

                    // An unrecognized kind string means the station cannot receive.
                    if !destination.kind().is_some_and(|k| k.is_receiving()) {
                        return Err(ServiceError::InvalidOperation(format!(
                            "workstation '{}' cannot receive transfers",
                            destination.name
                        )));
                    }

                    let batch = Batch::find_by_id(request.batch_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("batch {} not found", request.batch_id))
                        })?;

                    let source_audit = latest_audit_on(txn, source.id).await?;
                    let dest_audit = latest_audit_on(txn, destination.id).await?;
                    let source_on_hand =
                        on_hand_for_batch(txn, source.id, batch.id).await?;
                    let dest_on_hand =
                        on_hand_for_batch(txn, destination.id, batch.id).await?;

                    let source_tx = workstation_transaction::ActiveModel {
                        workstation_id: Set(source.id),
                        audit_id: Set(source_audit.map(|a| a.id)),
                        user_id: Set(user_id),
                        batch_id: Set(batch.id),
                        transaction_type: Set(TransactionType::MoveOut.as_str().to_string()),
                        quantity: Set(-request.quantity),
                        running_total: Set(source_on_hand - request.quantity),
                        linked_workstation_name: Set(Some(destination.name.clone())),
                        comment: Set(request.comment.clone()),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                    let dest_tx = workstation_transaction::ActiveModel {
                        workstation_id: Set(destination.id),
                        audit_id: Set(dest_audit.map(|a| a.id)),
                        user_id: Set(user_id),
                        batch_id: Set(batch.id),
                        transaction_type: Set(TransactionType::MoveIn.as_str().to_string()),
                        quantity: Set(request.quantity),
                        running_total: Set(dest_on_hand + request.quantity),
                        linked_transaction_id: Set(Some(source_tx.id)),
                        linked_workstation_name: Set(Some(source.name.clone())),
                        comment: Set(request.comment.clone()),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                    // Backfill the mutual link now that both ids exist.
                    let mut active_source: workstation_transaction::ActiveModel =
                        source_tx.clone().into();
                    active_source.linked_transaction_id = Set(Some(dest_tx.id));
                    let source_tx = active_source
                        .update(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    Ok((
                        source_tx,
                        dest_tx,
                        source.name,
                        destination.name,
                        batch.drug_id,
                    ))
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(
            source_tx_id = source_tx.id,
            dest_tx_id = dest_tx.id,
            batch_id = source_tx.batch_id,
            "inventory transferred"
        );

        self.event_sender
            .send_post_commit(Event::InventoryMoved {
                source_tx_id: source_tx.id,
                dest_tx_id: dest_tx.id,
                source_workstation_name: source_name,
                dest_workstation_name: dest_name,
                batch_id: source_tx.batch_id,
                drug_id,
                quantity: dest_tx.quantity,
                user_id,
                comment,
            })
            .await;

        Ok(TransferOutcome {
            source_transaction_id: source_tx.id,
            destination_transaction_id: dest_tx.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_requests_reject_non_positive_quantities() {
        let request = TransferRequest {
            source_workstation_id: 1,
            destination_workstation_id: 2,
            batch_id: 3,
            quantity: 0,
            comment: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn transfer_requests_accept_positive_quantities() {
        let request = TransferRequest {
            source_workstation_id: 1,
            destination_workstation_id: 2,
            batch_id: 3,
            quantity: 5,
            comment: Some("restock".into()),
        };
        assert!(request.validate().is_ok());
    }
}
