use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Symbols::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Symbols::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Symbols::BaseId).integer().not_null())
                    .col(ColumnDef::new(Symbols::QuoteId).integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_symbols_base_id")
                            .from(Symbols::Table, Symbols::BaseId)
                            .to(Currencies::Table, Currencies::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_symbols_quote_id")
                            .from(Symbols::Table, Symbols::QuoteId)
                            .to(Currencies::Table, Currencies::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Ordered pair: (base, quote) and (quote, base) are different symbols
        manager
            .create_index(
                Index::create()
                    .name("idx_symbols_base_quote")
                    .table(Symbols::Table)
                    .col(Symbols::BaseId)
                    .col(Symbols::QuoteId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Markets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Markets::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Markets::Name).string_len(64).not_null())
                    .col(ColumnDef::new(Markets::SymbolId).integer().not_null())
                    .col(ColumnDef::new(Markets::ExchangerId).integer().not_null())
                    .col(
                        ColumnDef::new(Markets::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Markets::Info)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Markets::Precision)
                            .integer()
                            .not_null()
                            .default(8),
                    )
                    .col(
                        ColumnDef::new(Markets::AmountMin)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Markets::AmountMax)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Markets::MinStep)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_markets_symbol_id")
                            .from(Markets::Table, Markets::SymbolId)
                            .to(Symbols::Table, Symbols::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_markets_exchanger_id")
                            .from(Markets::Table, Markets::ExchangerId)
                            .to(Exchangers::Table, Exchangers::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Markets are looked up by display name within an exchanger
        manager
            .create_index(
                Index::create()
                    .name("idx_markets_name_exchanger")
                    .table(Markets::Table)
                    .col(Markets::Name)
                    .col(Markets::ExchangerId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_markets_symbol_exchanger")
                    .table(Markets::Table)
                    .col(Markets::SymbolId)
                    .col(Markets::ExchangerId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Markets::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Symbols::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Currencies {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Exchangers {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Symbols {
    Table,
    Id,
    BaseId,
    QuoteId,
}

#[derive(DeriveIden)]
enum Markets {
    Table,
    Id,
    Name,
    SymbolId,
    ExchangerId,
    Active,
    Info,
    Precision,
    AmountMin,
    AmountMax,
    MinStep,
}
