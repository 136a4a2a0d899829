//! Position ledger: the single writer of positions and trade history.
//!
//! At most one position exists per market. Closing a position removes it
//! from the open set and appends an immutable [`TradeRecord`].

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use polymarket_core::types::{Position, PositionSide, TradeRecord};
use polymarket_core::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

/// Authoritative record of open positions and completed trades.
#[derive(Default)]
pub struct PositionLedger {
    /// Open positions keyed by market id.
    positions: DashMap<String, Position>,
    history: RwLock<Vec<TradeRecord>>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a position; fails if the market already holds one.
    #[allow(clippy::result_large_err)]
    pub fn open(
        &self,
        market_id: &str,
        asset: &str,
        side: PositionSide,
        size: Decimal,
        price: Decimal,
        time: DateTime<Utc>,
    ) -> Result<Position> {
        let mut position = Position::open(market_id, asset, side, size, price).inspect_err(|e| {
            error!(market = %market_id, size = %size, price = %price, error = %e, "Rejected invalid open");
        })?;
        position.entry_time = time;
        self.insert(position)
    }

    /// Insert a fully built position; fails if the market already holds one.
    #[allow(clippy::result_large_err)]
    pub fn insert(&self, position: Position) -> Result<Position> {
        match self.positions.entry(position.market_id.clone()) {
            Entry::Occupied(existing) => {
                error!(
                    market = %position.market_id,
                    existing_id = %existing.get().id,
                    existing_side = %existing.get().side,
                    "Duplicate open rejected"
                );
                Err(Error::AlreadyOpen {
                    market_id: position.market_id,
                })
            }
            Entry::Vacant(slot) => {
                info!(
                    position_id = %position.id,
                    market = %position.market_id,
                    side = %position.side,
                    size = %position.size,
                    entry_price = %position.entry_price,
                    "Position opened"
                );
                slot.insert(position.clone());
                Ok(position)
            }
        }
    }

    #[allow(clippy::result_large_err)]
    fn with_position<T>(&self, market_id: &str, f: impl FnOnce(&mut Position) -> Result<T>) -> Result<T> {
        match self.positions.get_mut(market_id) {
            Some(mut entry) => f(entry.value_mut()),
            None => {
                error!(market = %market_id, "Operation on flat market rejected");
                Err(Error::NoOpenPosition {
                    market_id: market_id.to_string(),
                })
            }
        }
    }

    /// Fold a fill of `notional` USD at `avg_price` into the open position.
    ///
    /// A zero fill is a no-op.
    #[allow(clippy::result_large_err)]
    pub fn apply_fill(&self, market_id: &str, notional: Decimal, avg_price: Decimal) -> Result<Position> {
        self.with_position(market_id, |position| {
            if notional.is_zero() {
                return Ok(position.clone());
            }
            if notional < Decimal::ZERO || avg_price <= Decimal::ZERO || avg_price >= Decimal::ONE {
                return Err(Error::InvalidPosition(format!(
                    "{}: invalid fill {} @ {}",
                    market_id, notional, avg_price
                )));
            }
            position.apply_fill(notional, avg_price);
            info!(
                market = %market_id,
                added = %notional,
                size = %position.size,
                entry_price = %position.entry_price,
                "Fill applied to position"
            );
            Ok(position.clone())
        })
    }

    /// Accumulate entry-side fees and slippage.
    #[allow(clippy::result_large_err)]
    pub fn add_costs(&self, market_id: &str, fees: Decimal, slippage: Decimal) -> Result<()> {
        self.with_position(market_id, |position| {
            position.fees_paid += fees;
            position.realized_slippage += slippage;
            Ok(())
        })
    }

    /// Open -> Closing while an exit order is in flight.
    #[allow(clippy::result_large_err)]
    pub fn mark_closing(&self, market_id: &str) -> Result<()> {
        self.with_position(market_id, |position| {
            position.mark_closing().map_err(Error::InvalidPosition)
        })
    }

    /// Closing -> Open after an exit order ended without a full fill.
    #[allow(clippy::result_large_err)]
    pub fn revert_closing(&self, market_id: &str) -> Result<()> {
        self.with_position(market_id, |position| {
            position.revert_closing().map_err(Error::InvalidPosition)
        })
    }

    /// Close the whole position at `exit_price`.
    #[allow(clippy::result_large_err)]
    pub fn close(&self, market_id: &str, exit_price: Decimal, time: DateTime<Utc>) -> Result<TradeRecord> {
        self.close_with_costs(market_id, exit_price, time, Decimal::ZERO, Decimal::ZERO)
    }

    /// Close the whole position, attributing exit fees and slippage.
    #[allow(clippy::result_large_err)]
    pub fn close_with_costs(
        &self,
        market_id: &str,
        exit_price: Decimal,
        time: DateTime<Utc>,
        exit_fees: Decimal,
        exit_slippage: Decimal,
    ) -> Result<TradeRecord> {
        validate_exit_price(market_id, exit_price)?;

        let Some((_, position)) = self.positions.remove(market_id) else {
            error!(market = %market_id, exit_price = %exit_price, "Close on flat market rejected");
            return Err(Error::NoOpenPosition {
                market_id: market_id.to_string(),
            });
        };

        let pnl = position.pnl_at(exit_price, position.shares());
        let record = TradeRecord {
            id: Uuid::new_v4(),
            position_id: position.id,
            market_id: position.market_id.clone(),
            asset: position.asset.clone(),
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            size: position.size,
            pnl,
            fees: position.fees_paid + exit_fees,
            slippage: position.realized_slippage + exit_slippage,
            entry_time: position.entry_time,
            exit_time: time,
        };

        info!(
            position_id = %position.id,
            market = %market_id,
            side = %position.side,
            entry_price = %position.entry_price,
            exit_price = %exit_price,
            pnl = %pnl,
            "Position closed"
        );

        self.append(record.clone());
        Ok(record)
    }

    /// Exit `shares` of the position; exiting everything is a full close.
    #[allow(clippy::result_large_err)]
    pub fn reduce(
        &self,
        market_id: &str,
        shares: Decimal,
        exit_price: Decimal,
        time: DateTime<Utc>,
    ) -> Result<TradeRecord> {
        validate_exit_price(market_id, exit_price)?;
        if shares <= Decimal::ZERO {
            return Err(Error::InvalidPosition(format!(
                "{}: reduce by non-positive shares {}",
                market_id, shares
            )));
        }

        let held = self
            .get(market_id)
            .map(|p| p.shares())
            .ok_or_else(|| Error::NoOpenPosition {
                market_id: market_id.to_string(),
            })?;
        if shares >= held {
            return self.close(market_id, exit_price, time);
        }

        let record = self.with_position(market_id, |position| {
            let notional = shares * position.entry_price;
            let pnl = position.pnl_at(exit_price, shares);
            position.size -= notional;
            position.realized_pnl += pnl;
            position.updated_at = time;

            Ok(TradeRecord {
                id: Uuid::new_v4(),
                position_id: position.id,
                market_id: position.market_id.clone(),
                asset: position.asset.clone(),
                side: position.side,
                entry_price: position.entry_price,
                exit_price,
                size: notional,
                pnl,
                fees: Decimal::ZERO,
                slippage: Decimal::ZERO,
                entry_time: position.entry_time,
                exit_time: time,
            })
        })?;

        info!(
            market = %market_id,
            shares = %shares,
            exit_price = %exit_price,
            pnl = %record.pnl,
            "Position reduced"
        );

        self.append(record.clone());
        Ok(record)
    }

    /// Close at market expiry. `settlement_price` is 0, 1 or the last mid.
    #[allow(clippy::result_large_err)]
    pub fn settle(&self, market_id: &str, settlement_price: Decimal, time: DateTime<Utc>) -> Result<TradeRecord> {
        let record = self.close(market_id, settlement_price, time)?;
        info!(market = %market_id, settlement_price = %settlement_price, pnl = %record.pnl, "Position settled");
        Ok(record)
    }

    fn append(&self, record: TradeRecord) {
        self.history
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }

    pub fn get(&self, market_id: &str) -> Option<Position> {
        self.positions.get(market_id).map(|p| p.clone())
    }

    pub fn is_open(&self, market_id: &str) -> bool {
        self.positions.contains_key(market_id)
    }

    pub fn open_positions(&self) -> Vec<Position> {
        self.positions.iter().map(|e| e.value().clone()).collect()
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    /// Sum of open position notionals.
    pub fn total_exposure(&self) -> Decimal {
        self.positions.iter().map(|e| e.value().size).sum()
    }

    pub fn market_exposure(&self, market_id: &str) -> Decimal {
        self.positions
            .get(market_id)
            .map(|p| p.size)
            .unwrap_or(Decimal::ZERO)
    }

    /// Mark-to-market P&L of a market's open position.
    pub fn unrealized_pnl(&self, market_id: &str, mark_price: Decimal) -> Option<Decimal> {
        self.positions
            .get(market_id)
            .map(|p| p.unrealized_pnl(mark_price))
    }

    /// Completed trades, oldest first.
    pub fn trade_history(&self) -> Vec<TradeRecord> {
        self.history
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.history
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|r| r.pnl)
            .sum()
    }

    pub fn stats(&self) -> LedgerStats {
        let history = self.history.read().unwrap_or_else(|e| e.into_inner());
        let wins = history.iter().filter(|r| !r.is_loss()).count();
        let losses = history.len() - wins;
        let win_rate = if history.is_empty() {
            Decimal::ZERO
        } else {
            Decimal::from(wins as u64) / Decimal::from(history.len() as u64)
        };

        LedgerStats {
            open_positions: self.positions.len(),
            closed_trades: history.len(),
            total_exposure: self.total_exposure(),
            realized_pnl: history.iter().map(|r| r.pnl).sum(),
            wins,
            losses,
            win_rate,
        }
    }
}

#[allow(clippy::result_large_err)]
fn validate_exit_price(market_id: &str, exit_price: Decimal) -> Result<()> {
    if exit_price < Decimal::ZERO || exit_price > Decimal::ONE {
        error!(market = %market_id, exit_price = %exit_price, "Exit price outside [0, 1]");
        return Err(Error::InvalidPosition(format!(
            "{}: exit price {} outside [0, 1]",
            market_id, exit_price
        )));
    }
    Ok(())
}

/// Summary statistics for the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerStats {
    pub open_positions: usize,
    pub closed_trades: usize,
    pub total_exposure: Decimal,
    pub realized_pnl: Decimal,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: Decimal,
}
