mod common;

use assert_matches::assert_matches;
use common::{some_user, TestApp};
use depot_core::{
    entities::{
        workstation::WorkstationKind,
        workstation_transaction::{Entity as WorkstationTransaction, TransactionType},
    },
    errors::ServiceError,
    services::{
        inventory::{AuditRequest, BatchCount, DrugCount},
        transfers::TransferRequest,
    },
};
use sea_orm::{EntityTrait, PaginatorTrait};

async fn audit_source(app: &TestApp, workstation_id: i64, drug_id: i64, batch_id: i64, qty: i64) {
    app.state
        .inventory_service()
        .record_audit(
            AuditRequest {
                workstation_id,
                drugs: vec![DrugCount {
                    drug_id,
                    batches: vec![BatchCount {
                        batch_id: Some(batch_id),
                        batch_no: None,
                        expiry_date: None,
                        is_new: false,
                        quantity: qty,
                    }],
                }],
                comment: None,
            },
            some_user(),
        )
        .await
        .expect("seed audit for transfer tests");
}

#[tokio::test]
async fn transfers_write_a_linked_pair_of_ledger_rows() {
    let app = TestApp::new().await;
    let user = some_user();
    let drug = app.seed_drug("Warfarin").await;
    let batch = app.seed_batch(drug.id, "LOT-100").await;
    let storage = app.seed_workstation("storage-1", WorkstationKind::Storage).await;
    let packing = app.seed_workstation("packing-1", WorkstationKind::Packing).await;
    audit_source(&app, storage.id, drug.id, batch.id, 10).await;

    let outcome = app
        .state
        .transfer_service()
        .transfer(
            TransferRequest {
                source_workstation_id: storage.id,
                destination_workstation_id: packing.id,
                batch_id: batch.id,
                quantity: 4,
                comment: Some("restock the line".into()),
            },
            user,
        )
        .await
        .expect("transfer should succeed");

    let source_tx = WorkstationTransaction::find_by_id(outcome.source_transaction_id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    let dest_tx = WorkstationTransaction::find_by_id(outcome.destination_transaction_id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(source_tx.transaction_type, TransactionType::MoveOut.as_str());
    assert_eq!(source_tx.quantity, -4);
    assert_eq!(source_tx.running_total, 6);
    assert_eq!(source_tx.linked_transaction_id, Some(dest_tx.id));
    assert_eq!(source_tx.linked_workstation_name.as_deref(), Some("packing-1"));

    assert_eq!(dest_tx.transaction_type, TransactionType::MoveIn.as_str());
    assert_eq!(dest_tx.quantity, 4);
    assert_eq!(dest_tx.running_total, 4);
    assert_eq!(dest_tx.linked_transaction_id, Some(source_tx.id));
    assert_eq!(dest_tx.linked_workstation_name.as_deref(), Some("storage-1"));

    let inventory = app.state.inventory_service();
    let source_inventory = inventory.current_inventory(storage.id).await.unwrap();
    assert_eq!(source_inventory.get(&batch.id), Some(&6));
    let dest_inventory = inventory.current_inventory(packing.id).await.unwrap();
    // The destination has never been audited, so its derived inventory stays
    // empty until its next audit even though the ledger row exists.
    assert!(dest_inventory.is_empty());
}

#[tokio::test]
async fn only_receiving_workstations_accept_transfers() {
    let app = TestApp::new().await;
    let drug = app.seed_drug("Heparin").await;
    let batch = app.seed_batch(drug.id, "LOT-101").await;
    let storage = app.seed_workstation("storage-2", WorkstationKind::Storage).await;
    let checking = app.seed_workstation("checking-1", WorkstationKind::Checking).await;
    audit_source(&app, storage.id, drug.id, batch.id, 10).await;

    let err = app
        .state
        .transfer_service()
        .transfer(
            TransferRequest {
                source_workstation_id: storage.id,
                destination_workstation_id: checking.id,
                batch_id: batch.id,
                quantity: 1,
                comment: None,
            },
            some_user(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    // Rejected before any row was written: the ledger still only holds the
    // seed audit's baseline (no transactions at all).
    assert_eq!(
        WorkstationTransaction::find()
            .count(app.state.db.as_ref())
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn an_unrecognized_workstation_kind_cannot_receive() {
    use chrono::Utc;
    use depot_core::entities::workstation;
    use sea_orm::{ActiveModelTrait, Set};

    let app = TestApp::new().await;
    let drug = app.seed_drug("Morphine").await;
    let batch = app.seed_batch(drug.id, "LOT-104").await;
    let storage = app.seed_workstation("storage-5", WorkstationKind::Storage).await;
    audit_source(&app, storage.id, drug.id, batch.id, 10).await;

    // A row whose kind string predates (or postdates) the known taxonomy.
    let now = Utc::now();
    let oddball = workstation::ActiveModel {
        name: Set("mixing-1".to_string()),
        kind: Set("mixing".to_string()),
        associated_device_id: Set(None),
        audited_by: Set(None),
        audited_at: Set(None),
        deleted_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(app.state.db.as_ref())
    .await
    .unwrap();

    let err = app
        .state
        .transfer_service()
        .transfer(
            TransferRequest {
                source_workstation_id: storage.id,
                destination_workstation_id: oddball.id,
                batch_id: batch.id,
                quantity: 1,
                comment: None,
            },
            some_user(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn a_source_may_go_negative_until_its_next_audit() {
    let app = TestApp::new().await;
    let drug = app.seed_drug("Insulin").await;
    let batch = app.seed_batch(drug.id, "LOT-102").await;
    let storage = app.seed_workstation("storage-3", WorkstationKind::Storage).await;
    let packing = app.seed_workstation("packing-2", WorkstationKind::Packing).await;

    let outcome = app
        .state
        .transfer_service()
        .transfer(
            TransferRequest {
                source_workstation_id: storage.id,
                destination_workstation_id: packing.id,
                batch_id: batch.id,
                quantity: 4,
                comment: None,
            },
            some_user(),
        )
        .await
        .expect("negative stock is a discrepancy, not an error");

    let source_tx = WorkstationTransaction::find_by_id(outcome.source_transaction_id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(source_tx.running_total, -4);
}

#[tokio::test]
async fn degenerate_transfer_requests_are_rejected() {
    let app = TestApp::new().await;
    let drug = app.seed_drug("Codeine").await;
    let batch = app.seed_batch(drug.id, "LOT-103").await;
    let storage = app.seed_workstation("storage-4", WorkstationKind::Storage).await;
    let packing = app.seed_workstation("packing-3", WorkstationKind::Packing).await;
    let transfers = app.state.transfer_service();

    let err = transfers
        .transfer(
            TransferRequest {
                source_workstation_id: storage.id,
                destination_workstation_id: packing.id,
                batch_id: batch.id,
                quantity: 0,
                comment: None,
            },
            some_user(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = transfers
        .transfer(
            TransferRequest {
                source_workstation_id: packing.id,
                destination_workstation_id: packing.id,
                batch_id: batch.id,
                quantity: 2,
                comment: None,
            },
            some_user(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}
