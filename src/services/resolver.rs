//! Entity Resolution & Upsert Engine
//!
//! Turns partially keyed value objects (currencies, exchangers, symbols,
//! markets, price levels) into persisted rows without ever creating a second
//! row for a natural key that already exists. The store's unique indexes are
//! the authority: an insert that loses a race re-reads the winner's row.
//!
//! Exchanger, Symbol and PriceVol ids are cached in memory once resolved.
//! Currencies and Markets always go to the store because resolving them may
//! merge fields into the stored row.

use moka::future::Cache;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::entities::{currencies, exchangers, markets};
use crate::models::market::{
    normalize_abbr, normalize_name, Currency, Exchanger, Limitation, Market, Symbol,
};
use crate::models::snapshot::PriceVol;
use crate::services::store::{Store, StoreError, StoreResult};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid entity: {0}")]
    InvalidEntity(String),
}

pub type ResolveResult<T> = Result<T, ResolveError>;

#[derive(Clone)]
pub struct EntityResolver {
    store: Arc<dyn Store>,
    exchangers: Cache<String, Exchanger>,
    symbols: Cache<(i32, i32), i32>,
    price_vols: Cache<(u64, u64), i32>,
}

impl EntityResolver {
    pub fn new(store: Arc<dyn Store>, cache_capacity: u64) -> Self {
        Self {
            store,
            exchangers: Cache::builder().max_capacity(cache_capacity).build(),
            symbols: Cache::builder().max_capacity(cache_capacity).build(),
            price_vols: Cache::builder().max_capacity(cache_capacity).build(),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Find-or-create by name. An unlocked stored abbreviation is overwritten
    /// by a non-empty incoming one; a locked one never changes.
    pub async fn resolve_currency(&self, currency: Currency) -> ResolveResult<Currency> {
        Ok(self.upsert_currency(&currency).await?.into())
    }

    async fn upsert_currency(&self, currency: &Currency) -> ResolveResult<currencies::Model> {
        let name = normalize_name(&currency.name);
        if name.is_empty() {
            return Err(ResolveError::InvalidEntity(
                "currency with an empty name".to_string(),
            ));
        }
        let abbr = normalize_abbr(&currency.abbr);

        let stored = match self.store.find_currency(&name).await? {
            Some(stored) => stored,
            None => {
                let row = currencies::Model {
                    id: 0,
                    name: name.clone(),
                    abbr,
                    abbr_final: currency.abbr_final,
                    info: currency.info.clone(),
                };
                match self.store.insert_currency(&row).await {
                    Ok(id) => {
                        debug!(currency = %row.name, id, "Created currency");
                        return Ok(currencies::Model { id, ..row });
                    }
                    Err(StoreError::Constraint(msg)) => self
                        .store
                        .find_currency(&name)
                        .await?
                        .ok_or(StoreError::Constraint(msg))?,
                    Err(e) => return Err(e.into()),
                }
            }
        };

        self.merge_abbr(stored, &normalize_abbr(&currency.abbr), currency.abbr_final)
            .await
    }

    async fn merge_abbr(
        &self,
        stored: currencies::Model,
        abbr: &str,
        finalize: bool,
    ) -> ResolveResult<currencies::Model> {
        if stored.abbr_final || abbr.is_empty() || (stored.abbr == abbr && !finalize) {
            return Ok(stored);
        }

        if self
            .store
            .update_currency_abbr(stored.id, abbr, finalize)
            .await?
        {
            if stored.abbr != abbr {
                debug!(currency = %stored.name, from = %stored.abbr, to = %abbr, "Currency abbreviation changed");
            }
            return Ok(currencies::Model {
                abbr: abbr.to_string(),
                abbr_final: finalize,
                ..stored
            });
        }

        // Someone locked the row between our read and the update
        let name = stored.name.clone();
        Ok(self.store.find_currency(&name).await?.unwrap_or(stored))
    }

    /// Find-or-create by trimmed name; `info` is first-writer-wins.
    pub async fn resolve_exchanger(&self, exchanger: Exchanger) -> ResolveResult<Exchanger> {
        let name = exchanger.name.trim().to_string();
        if name.is_empty() {
            return Err(ResolveError::InvalidEntity(
                "exchanger with an empty name".to_string(),
            ));
        }

        if let Some(cached) = self.exchangers.get(&name).await {
            return Ok(cached);
        }

        let stored = match self.store.find_exchanger(&name).await? {
            Some(stored) => stored,
            None => {
                let row = exchangers::Model {
                    id: 0,
                    name: name.clone(),
                    info: exchanger.info,
                };
                let id = settle(
                    self.store.insert_exchanger(&row).await,
                    async { Ok(self.store.find_exchanger(&name).await?.map(|e| e.id)) },
                )
                .await?;
                debug!(exchanger = %name, id, "Created exchanger");
                exchangers::Model { id, ..row }
            }
        };

        let resolved = Exchanger::from(stored);
        self.exchangers.insert(name, resolved.clone()).await;
        Ok(resolved)
    }

    /// Resolves both currencies (concurrently), then finds or creates the
    /// ordered (base, quote) pair.
    pub async fn resolve_symbol(&self, symbol: Symbol) -> ResolveResult<Symbol> {
        let (base, quote) = tokio::try_join!(
            self.upsert_currency(&symbol.base),
            self.upsert_currency(&symbol.quote)
        )?;
        let key = (base.id, quote.id);

        let id = match self.symbols.get(&key).await {
            Some(id) => id,
            None => {
                let id = match self.store.find_symbol(base.id, quote.id).await? {
                    Some(stored) => stored.id,
                    None => {
                        let id = settle(
                            self.store.insert_symbol(base.id, quote.id).await,
                            async {
                                Ok(self.store.find_symbol(base.id, quote.id).await?.map(|s| s.id))
                            },
                        )
                        .await?;
                        debug!(base = %base.abbr, quote = %quote.abbr, id, "Created symbol");
                        id
                    }
                };
                self.symbols.insert(key, id).await;
                id
            }
        };

        Ok(Symbol {
            id: Some(id),
            base: base.into(),
            quote: quote.into(),
        })
    }

    /// Resolves the exchanger and symbol if they lack ids, then finds the
    /// market by (name, exchanger). An existing row takes the incoming
    /// active flag, precision, limits and min step; its symbol and info stay.
    pub async fn resolve_market(&self, market: Market) -> ResolveResult<Market> {
        let Market {
            name,
            symbol,
            exchanger,
            active,
            info,
            precision,
            limitation,
            min_step,
            ..
        } = market;

        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ResolveError::InvalidEntity(
                "market with an empty name".to_string(),
            ));
        }

        let (exchanger, symbol) = tokio::try_join!(
            async move {
                match exchanger.id {
                    Some(_) => Ok(exchanger),
                    None => self.resolve_exchanger(exchanger).await,
                }
            },
            async move {
                match symbol.id {
                    Some(_) => Ok(symbol),
                    None => self.resolve_symbol(symbol).await,
                }
            }
        )?;
        let exchanger_id = require_id(exchanger.id, "exchanger")?;
        let symbol_id = require_id(symbol.id, "symbol")?;

        let stored = match self.store.find_market(&name, exchanger_id).await? {
            Some(stored) => stored,
            None => {
                let row = markets::Model {
                    id: 0,
                    name: name.clone(),
                    symbol_id,
                    exchanger_id,
                    active,
                    info,
                    precision,
                    amount_min: limitation.min,
                    amount_max: limitation.max,
                    min_step,
                };
                match self.store.insert_market(&row).await {
                    Ok(id) => {
                        debug!(market = %name, exchanger = %exchanger.name, id, "Created market");
                        return Ok(Market {
                            id: Some(id),
                            name,
                            symbol,
                            exchanger,
                            active,
                            info: row.info,
                            precision,
                            limitation,
                            min_step,
                        });
                    }
                    Err(StoreError::Constraint(msg)) => self
                        .store
                        .find_market(&name, exchanger_id)
                        .await?
                        .ok_or(StoreError::Constraint(msg))?,
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let symbol = if stored.symbol_id != symbol_id {
            warn!(
                market = %name,
                stored_symbol = stored.symbol_id,
                incoming_symbol = symbol_id,
                "Market already bound to a different symbol, keeping stored one"
            );
            self.stored_symbol(stored.symbol_id).await?
        } else {
            symbol
        };

        let updated = markets::Model {
            active,
            precision,
            amount_min: limitation.min,
            amount_max: limitation.max,
            min_step,
            ..stored.clone()
        };
        if updated != stored {
            self.store.save_market(&updated).await?;
            debug!(market = %name, id = updated.id, "Updated market");
        }

        Ok(Market {
            id: Some(updated.id),
            name: updated.name,
            symbol,
            exchanger,
            active: updated.active,
            info: updated.info,
            precision: updated.precision,
            limitation: Limitation {
                min: updated.amount_min,
                max: updated.amount_max,
            },
            min_step: updated.min_step,
        })
    }

    /// Content-addressed find-or-create on the exact (price, volume) pair.
    pub async fn resolve_price_vol(&self, level: PriceVol) -> ResolveResult<PriceVol> {
        if !level.price.is_finite() || !level.volume.is_finite() {
            return Err(ResolveError::InvalidEntity(format!(
                "non-finite price level {}/{}",
                level.price, level.volume
            )));
        }
        // -0.0 and 0.0 compare equal in storage, so they share a key
        let price = level.price + 0.0;
        let volume = level.volume + 0.0;
        let key = (price.to_bits(), volume.to_bits());

        if let Some(id) = self.price_vols.get(&key).await {
            return Ok(PriceVol {
                id: Some(id),
                price,
                volume,
            });
        }

        let id = match self.store.find_price_vol(price, volume).await? {
            Some(stored) => stored.id,
            None => {
                settle(self.store.insert_price_vol(price, volume).await, async {
                    Ok(self.store.find_price_vol(price, volume).await?.map(|p| p.id))
                })
                .await?
            }
        };
        self.price_vols.insert(key, id).await;

        Ok(PriceVol {
            id: Some(id),
            price,
            volume,
        })
    }

    async fn stored_symbol(&self, id: i32) -> ResolveResult<Symbol> {
        let missing = || ResolveError::InvalidEntity(format!("symbol {id} has no stored row"));
        let row = self.store.get_symbol(id).await?.ok_or_else(missing)?;
        let (base, quote) = tokio::try_join!(
            self.store.get_currency(row.base_id),
            self.store.get_currency(row.quote_id)
        )?;
        Ok(Symbol {
            id: Some(row.id),
            base: base.ok_or_else(missing)?.into(),
            quote: quote.ok_or_else(missing)?.into(),
        })
    }
}

/// Maps a lost insert race onto the id of the row the winner created.
async fn settle<F>(inserted: StoreResult<i32>, reread: F) -> ResolveResult<i32>
where
    F: Future<Output = StoreResult<Option<i32>>>,
{
    match inserted {
        Ok(id) => Ok(id),
        Err(StoreError::Constraint(msg)) => Ok(reread.await?.ok_or(StoreError::Constraint(msg))?),
        Err(e) => Err(e.into()),
    }
}

fn require_id(id: Option<i32>, kind: &str) -> ResolveResult<i32> {
    id.ok_or_else(|| ResolveError::InvalidEntity(format!("{kind} was not resolved")))
}
