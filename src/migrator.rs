use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250110_000001_create_drugs_and_batches::Migration),
            Box::new(m20250110_000002_create_workstations::Migration),
            Box::new(m20250110_000003_create_workstation_audits::Migration),
            Box::new(m20250110_000004_create_workstation_transactions::Migration),
            Box::new(m20250110_000005_create_vehicles_and_itineraries::Migration),
            Box::new(m20250110_000006_create_itinerary_actions::Migration),
            Box::new(m20250110_000007_create_pack_actions::Migration),
            Box::new(m20250110_000008_create_station_orders::Migration),
        ]
    }
}

// Migration implementations

mod m20250110_000001_create_drugs_and_batches {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250110_000001_create_drugs_and_batches"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Drugs::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Drugs::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Drugs::Name).string().not_null())
                        .col(ColumnDef::new(Drugs::Code).string().null())
                        .col(
                            ColumnDef::new(Drugs::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Batches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Batches::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Batches::DrugId).big_integer().not_null())
                        .col(ColumnDef::new(Batches::BatchNo).string().not_null())
                        .col(ColumnDef::new(Batches::ExpiryDate).date().not_null())
                        .col(
                            ColumnDef::new(Batches::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Batches resolve idempotently by (drug, batch number)
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_batches_drug_id_batch_no")
                        .table(Batches::Table)
                        .col(Batches::DrugId)
                        .col(Batches::BatchNo)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Batches::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Drugs::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Drugs {
        Table,
        Id,
        Name,
        Code,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Batches {
        Table,
        Id,
        DrugId,
        BatchNo,
        ExpiryDate,
        CreatedAt,
    }
}

mod m20250110_000002_create_workstations {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250110_000002_create_workstations"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Workstations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Workstations::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Workstations::Name).string().not_null())
                        .col(ColumnDef::new(Workstations::Kind).string().not_null())
                        .col(
                            ColumnDef::new(Workstations::AssociatedDeviceId)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(Workstations::AuditedBy).uuid().null())
                        .col(
                            ColumnDef::new(Workstations::AuditedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Workstations::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Workstations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Workstations::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_workstations_associated_device_id")
                        .table(Workstations::Table)
                        .col(Workstations::AssociatedDeviceId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Workstations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Workstations {
        Table,
        Id,
        Name,
        Kind,
        AssociatedDeviceId,
        AuditedBy,
        AuditedAt,
        DeletedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250110_000003_create_workstation_audits {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250110_000003_create_workstation_audits"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(WorkstationAudits::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WorkstationAudits::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(WorkstationAudits::WorkstationId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkstationAudits::AuditorId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(WorkstationAudits::Comment).string().null())
                        .col(
                            ColumnDef::new(WorkstationAudits::BatchQuantities)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkstationAudits::InventoryChanges)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkstationAudits::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Latest audit per workstation is looked up by greatest id
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_workstation_audits_workstation_id")
                        .table(WorkstationAudits::Table)
                        .col(WorkstationAudits::WorkstationId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WorkstationAudits::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum WorkstationAudits {
        Table,
        Id,
        WorkstationId,
        AuditorId,
        Comment,
        BatchQuantities,
        InventoryChanges,
        CreatedAt,
    }
}

mod m20250110_000004_create_workstation_transactions {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250110_000004_create_workstation_transactions"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(WorkstationTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WorkstationTransactions::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(WorkstationTransactions::WorkstationId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkstationTransactions::AuditId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(WorkstationTransactions::UserId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkstationTransactions::BatchId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkstationTransactions::TransactionType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkstationTransactions::Quantity)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkstationTransactions::RunningTotal)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkstationTransactions::LinkedTransactionId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(WorkstationTransactions::LinkedWorkstationName)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(WorkstationTransactions::Comment)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(WorkstationTransactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Reconciliation scans transactions per (audit, batch)
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_workstation_transactions_audit_id_batch_id")
                        .table(WorkstationTransactions::Table)
                        .col(WorkstationTransactions::AuditId)
                        .col(WorkstationTransactions::BatchId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_workstation_transactions_workstation_id")
                        .table(WorkstationTransactions::Table)
                        .col(WorkstationTransactions::WorkstationId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(
                    Table::drop()
                        .table(WorkstationTransactions::Table)
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum WorkstationTransactions {
        Table,
        Id,
        WorkstationId,
        AuditId,
        UserId,
        BatchId,
        TransactionType,
        Quantity,
        RunningTotal,
        LinkedTransactionId,
        LinkedWorkstationName,
        Comment,
        CreatedAt,
    }
}

mod m20250110_000005_create_vehicles_and_itineraries {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250110_000005_create_vehicles_and_itineraries"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Vehicles::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Vehicles::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Vehicles::FleetNo).string().not_null())
                        .col(ColumnDef::new(Vehicles::Status).string().not_null())
                        .col(
                            ColumnDef::new(Vehicles::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Vehicles::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Itineraries::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Itineraries::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Itineraries::VehicleId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Itineraries::UserId).uuid().not_null())
                        .col(ColumnDef::new(Itineraries::State).string().not_null())
                        .col(ColumnDef::new(Itineraries::IsActive).boolean().not_null())
                        .col(
                            ColumnDef::new(Itineraries::AutoCancelled)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Itineraries::PreparedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Itineraries::LoadedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Itineraries::ClosedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Itineraries::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Itineraries::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_itineraries_user_id_is_active")
                        .table(Itineraries::Table)
                        .col(Itineraries::UserId)
                        .col(Itineraries::IsActive)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Itineraries::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Vehicles::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Vehicles {
        Table,
        Id,
        FleetNo,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Itineraries {
        Table,
        Id,
        VehicleId,
        UserId,
        State,
        IsActive,
        AutoCancelled,
        PreparedAt,
        LoadedAt,
        ClosedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250110_000006_create_itinerary_actions {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250110_000006_create_itinerary_actions"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ItineraryActions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ItineraryActions::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(ItineraryActions::ItineraryId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ItineraryActions::UserId).uuid().not_null())
                        .col(ColumnDef::new(ItineraryActions::Kind).string().not_null())
                        .col(ColumnDef::new(ItineraryActions::Phase).string().not_null())
                        .col(
                            ColumnDef::new(ItineraryActions::StationOrderIds)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ItineraryActions::CollectedBlanketNo)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(ItineraryActions::Pickup).json().null())
                        .col(ColumnDef::new(ItineraryActions::Dropoff).json().null())
                        .col(ColumnDef::new(ItineraryActions::ProofPickup).json().null())
                        .col(
                            ColumnDef::new(ItineraryActions::ProofDropoff)
                                .json()
                                .null(),
                        )
                        .col(ColumnDef::new(ItineraryActions::Comment).string().null())
                        .col(
                            ColumnDef::new(ItineraryActions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ItineraryActions::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_itinerary_actions_itinerary_id")
                        .table(ItineraryActions::Table)
                        .col(ItineraryActions::ItineraryId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ItineraryActions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum ItineraryActions {
        Table,
        Id,
        ItineraryId,
        UserId,
        Kind,
        Phase,
        StationOrderIds,
        CollectedBlanketNo,
        Pickup,
        Dropoff,
        ProofPickup,
        ProofDropoff,
        Comment,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250110_000007_create_pack_actions {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250110_000007_create_pack_actions"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PackActions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PackActions::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(PackActions::PackId).big_integer().not_null())
                        .col(ColumnDef::new(PackActions::UserId).uuid().not_null())
                        .col(ColumnDef::new(PackActions::Kind).string().not_null())
                        .col(ColumnDef::new(PackActions::InputMethod).string().not_null())
                        .col(
                            ColumnDef::new(PackActions::ItineraryId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PackActions::ItineraryActionId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PackActions::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PackActions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Latest-pointer rebuilds scan per pack, newest first
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_pack_actions_pack_id")
                        .table(PackActions::Table)
                        .col(PackActions::PackId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_pack_actions_itinerary_id")
                        .table(PackActions::Table)
                        .col(PackActions::ItineraryId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(LatestPackActions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(LatestPackActions::PackId)
                                .big_integer()
                                .not_null()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(LatestPackActions::PackActionId)
                                .big_integer()
                                .null(),
                        )
                        .col(ColumnDef::new(LatestPackActions::Kind).string().null())
                        .col(ColumnDef::new(LatestPackActions::UserId).uuid().null())
                        .col(
                            ColumnDef::new(LatestPackActions::ItineraryId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(LatestPackActions::ItineraryActionId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(LatestPackActions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LatestPackActions::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(LatestPackActions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PackActions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum PackActions {
        Table,
        Id,
        PackId,
        UserId,
        Kind,
        InputMethod,
        ItineraryId,
        ItineraryActionId,
        DeletedAt,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum LatestPackActions {
        Table,
        PackId,
        PackActionId,
        Kind,
        UserId,
        ItineraryId,
        ItineraryActionId,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250110_000008_create_station_orders {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250110_000008_create_station_orders"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StationOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StationOrders::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StationOrders::StationId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StationOrders::OrderNo).string().not_null())
                        .col(ColumnDef::new(StationOrders::Status).string().not_null())
                        .col(
                            ColumnDef::new(StationOrders::LoadedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StationOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StationOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Orders resolve idempotently by (station, order number)
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_station_orders_station_id_order_no")
                        .table(StationOrders::Table)
                        .col(StationOrders::StationId)
                        .col(StationOrders::OrderNo)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StationOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StationOrders {
        Table,
        Id,
        StationId,
        OrderNo,
        Status,
        LoadedAt,
        CreatedAt,
        UpdatedAt,
    }
}
