use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Currencies::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Currencies::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Currencies::Name)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Currencies::Abbr)
                            .string_len(16)
                            .not_null()
                            .default(""),
                    )
                    // Once set, feeds can no longer change abbr
                    .col(
                        ColumnDef::new(Currencies::AbbrFinal)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Currencies::Info)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Exchangers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Exchangers::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Exchangers::Name)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Exchangers::Info)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .to_owned(),
            )
            .await?;

        // Many-to-many: currencies listed by an exchanger
        manager
            .create_table(
                Table::create()
                    .table(CurrencyExchangers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CurrencyExchangers::CurrencyId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CurrencyExchangers::ExchangerId)
                            .integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(CurrencyExchangers::CurrencyId)
                            .col(CurrencyExchangers::ExchangerId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_currency_exchangers_currency_id")
                            .from(CurrencyExchangers::Table, CurrencyExchangers::CurrencyId)
                            .to(Currencies::Table, Currencies::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_currency_exchangers_exchanger_id")
                            .from(CurrencyExchangers::Table, CurrencyExchangers::ExchangerId)
                            .to(Exchangers::Table, Exchangers::Id),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CurrencyExchangers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Exchangers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Currencies::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Currencies {
    Table,
    Id,
    Name,
    Abbr,
    AbbrFinal,
    Info,
}

#[derive(DeriveIden)]
enum Exchangers {
    Table,
    Id,
    Name,
    Info,
}

#[derive(DeriveIden)]
enum CurrencyExchangers {
    Table,
    CurrencyId,
    ExchangerId,
}
