pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_currencies_and_exchangers;
mod m20260301_000002_create_symbols_and_markets;
mod m20260301_000003_create_tickers_and_trades;
mod m20260301_000004_create_order_books;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_currencies_and_exchangers::Migration),
            Box::new(m20260301_000002_create_symbols_and_markets::Migration),
            Box::new(m20260301_000003_create_tickers_and_trades::Migration),
            Box::new(m20260301_000004_create_order_books::Migration),
        ]
    }
}
