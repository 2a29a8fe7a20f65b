use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240901_000001_create_order_tables::Migration),
            Box::new(m20240901_000002_create_payment_intents_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240901_000001_create_order_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240901_000001_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::OrderNumber).string().not_null())
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(ColumnDef::new(Orders::Currency).string().not_null())
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .decimal_len(20, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::BillingName).string().not_null())
                        .col(ColumnDef::new(Orders::BillingEmail).string().not_null())
                        .col(ColumnDef::new(Orders::BillingPhone).string())
                        .col(ColumnDef::new(Orders::TransactionId).string())
                        .col(ColumnDef::new(Orders::PaidAt).timestamp_with_time_zone())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::UpdatedAt).timestamp_with_time_zone())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Sku).string().not_null().unique_key())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(
                            ColumnDef::new(Products::StockQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::UnitPrice)
                                .decimal_len(20, 2)
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_product")
                                .from(OrderItems::Table, OrderItems::ProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderNotes::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderNotes::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderNotes::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderNotes::Note).text().not_null())
                        .col(
                            ColumnDef::new(OrderNotes::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_notes_order")
                                .from(OrderNotes::Table, OrderNotes::OrderId)
                                .to(Orders::Table, Orders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_notes_order_id")
                        .table(OrderNotes::Table)
                        .col(OrderNotes::OrderId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderNotes::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await?;
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    pub enum Orders {
        Table,
        Id,
        OrderNumber,
        Status,
        Currency,
        TotalAmount,
        BillingName,
        BillingEmail,
        BillingPhone,
        TransactionId,
        PaidAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum Products {
        Table,
        Id,
        Sku,
        Name,
        StockQuantity,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        Quantity,
        UnitPrice,
    }

    #[derive(DeriveIden)]
    pub enum OrderNotes {
        Table,
        Id,
        OrderId,
        Note,
        CreatedAt,
    }
}

mod m20240901_000002_create_payment_intents_table {
    use sea_orm_migration::prelude::*;

    use super::m20240901_000001_create_order_tables::Orders;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240901_000002_create_payment_intents_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PaymentIntents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentIntents::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentIntents::PaymentCode)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentIntents::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(PaymentIntents::Amount)
                                .decimal_len(20, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentIntents::Currency).string().not_null())
                        .col(
                            ColumnDef::new(PaymentIntents::BankPrefix)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentIntents::PaymentMethod)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentIntents::Status).string().not_null())
                        .col(ColumnDef::new(PaymentIntents::TransactionId).string())
                        .col(
                            ColumnDef::new(PaymentIntents::InventoryDecremented)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(PaymentIntents::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentIntents::UpdatedAt).timestamp_with_time_zone())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payment_intents_order")
                                .from(PaymentIntents::Table, PaymentIntents::OrderId)
                                .to(Orders::Table, Orders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            // One intent per payment code; the reconciliation lookup key
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payment_intents_payment_code")
                        .table(PaymentIntents::Table)
                        .col(PaymentIntents::PaymentCode)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payment_intents_order_id")
                        .table(PaymentIntents::Table)
                        .col(PaymentIntents::OrderId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentIntents::Table).to_owned())
                .await?;
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum PaymentIntents {
        Table,
        Id,
        PaymentCode,
        OrderId,
        Amount,
        Currency,
        BankPrefix,
        PaymentMethod,
        Status,
        TransactionId,
        InventoryDecremented,
        CreatedAt,
        UpdatedAt,
    }
}
