//! `SeaORM` Entity prelude

pub use super::currencies::Entity as Currencies;
pub use super::currency_exchangers::Entity as CurrencyExchangers;
pub use super::exchangers::Entity as Exchangers;
pub use super::markets::Entity as Markets;
pub use super::order_book_asks::Entity as OrderBookAsks;
pub use super::order_book_bids::Entity as OrderBookBids;
pub use super::order_books::Entity as OrderBooks;
pub use super::price_vols::Entity as PriceVols;
pub use super::symbols::Entity as Symbols;
pub use super::tickers::Entity as Tickers;
pub use super::trades::Entity as Trades;
