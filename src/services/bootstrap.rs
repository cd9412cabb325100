//! Registers an exchanger and the markets it lists before its feed starts,
//! linking every currency seen to the exchanger.

use std::collections::HashSet;
use tracing::{info, warn};

use crate::models::market::{Exchanger, Market};
use crate::services::resolver::{EntityResolver, ResolveError};

#[derive(Clone)]
pub struct ExchangerBootstrap {
    resolver: EntityResolver,
}

impl ExchangerBootstrap {
    pub fn new(resolver: EntityResolver) -> Self {
        Self { resolver }
    }

    /// Returns the markets that resolved, with ids filled in. A market that
    /// fails to resolve is logged and left out.
    pub async fn register(
        &self,
        exchanger: Exchanger,
        markets: Vec<Market>,
    ) -> Result<Vec<Market>, ResolveError> {
        let exchanger = self.resolver.resolve_exchanger(exchanger).await?;
        let Some(exchanger_id) = exchanger.id else {
            return Err(ResolveError::InvalidEntity(format!(
                "exchanger {} was not resolved",
                exchanger.name
            )));
        };

        let store = self.resolver.store();
        let mut linked = HashSet::new();
        let mut resolved = Vec::with_capacity(markets.len());

        for market in markets {
            let name = market.name.clone();
            let market = Market {
                exchanger: exchanger.clone(),
                ..market
            };

            let market = match self.resolver.resolve_market(market).await {
                Ok(market) => market,
                Err(e) => {
                    warn!(exchanger = %exchanger.name, market = %name, error = %e, "Skipping market");
                    continue;
                }
            };

            for currency_id in [market.symbol.base.id, market.symbol.quote.id]
                .into_iter()
                .flatten()
            {
                if !linked.insert(currency_id) {
                    continue;
                }
                if let Err(e) = store.link_currency_exchanger(currency_id, exchanger_id).await {
                    warn!(exchanger = %exchanger.name, currency_id, error = %e, "Failed to link currency");
                    linked.remove(&currency_id);
                }
            }

            resolved.push(market);
        }

        info!(
            exchanger = %exchanger.name,
            markets = resolved.len(),
            currencies = linked.len(),
            "Registered exchanger"
        );
        Ok(resolved)
    }
}
