//! Initial schema migration - creates all tables from scratch.
//!
//! The complete schema for kumbara:
//!
//! - `accounts`: local-currency balances, addressed by unique email
//! - `cards`: USD funding sources, each owned by one account
//! - `transactions`: the append-only audit trail
//!
//! Balance-carrying tables have a `version` column used for optimistic
//! concurrency control; every balance update is guarded by it.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Accounts {
    Table,
    Id,
    Email,
    BalanceMinor,
    Currency,
    Version,
    CreatedAt,
}

#[derive(Iden)]
enum Cards {
    Table,
    Id,
    AccountId,
    HolderName,
    MaskedNumber,
    Expiry,
    CardType,
    BalanceMinor,
    Currency,
    Version,
    CreatedAt,
}

#[derive(Iden)]
enum Transactions {
    Table,
    Id,
    Kind,
    FromKind,
    FromId,
    ToKind,
    ToId,
    AmountMinor,
    Currency,
    SecondaryAmountMinor,
    SecondaryCurrency,
    Description,
    CreatedAt,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Accounts
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Accounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Accounts::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Accounts::Email).string().not_null())
                    .col(
                        ColumnDef::new(Accounts::BalanceMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Accounts::Currency)
                            .string()
                            .not_null()
                            .default("TRY"),
                    )
                    .col(
                        ColumnDef::new(Accounts::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Accounts::CreatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-accounts-email-unique")
                    .table(Accounts::Table)
                    .col(Accounts::Email)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Cards
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Cards::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Cards::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Cards::AccountId).string().not_null())
                    .col(ColumnDef::new(Cards::HolderName).string().not_null())
                    .col(ColumnDef::new(Cards::MaskedNumber).string().not_null())
                    .col(ColumnDef::new(Cards::Expiry).string().not_null())
                    .col(ColumnDef::new(Cards::CardType).string().not_null())
                    .col(ColumnDef::new(Cards::BalanceMinor).big_integer().not_null())
                    .col(
                        ColumnDef::new(Cards::Currency)
                            .string()
                            .not_null()
                            .default("USD"),
                    )
                    .col(
                        ColumnDef::new(Cards::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Cards::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-cards-account_id")
                            .from(Cards::Table, Cards::AccountId)
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-cards-account_id")
                    .table(Cards::Table)
                    .col(Cards::AccountId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Transactions
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::Kind).string().not_null())
                    .col(ColumnDef::new(Transactions::FromKind).string())
                    .col(ColumnDef::new(Transactions::FromId).string())
                    .col(ColumnDef::new(Transactions::ToKind).string())
                    .col(ColumnDef::new(Transactions::ToId).string())
                    .col(
                        ColumnDef::new(Transactions::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::Currency).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::SecondaryAmountMinor).big_integer(),
                    )
                    .col(ColumnDef::new(Transactions::SecondaryCurrency).string())
                    .col(ColumnDef::new(Transactions::Description).string())
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Feed queries filter on either leg and order by (created_at, id).
        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-from_id")
                    .table(Transactions::Table)
                    .col(Transactions::FromId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-to_id")
                    .table(Transactions::Table)
                    .col(Transactions::ToId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-created_at-id")
                    .table(Transactions::Table)
                    .col(Transactions::CreatedAt)
                    .col(Transactions::Id)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Cards::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Accounts::Table).to_owned())
            .await?;
        Ok(())
    }
}
