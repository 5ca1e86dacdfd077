//! In-memory collateral ledger.
//!
//! Holds every account the execution engine touches: per-market insurance
//! and liquidity-fee pools, the per-asset global insurance pool and party
//! general accounts. Accounts live in a `BTreeMap` keyed by
//! `(AccountId, Asset)` so the ledger hash is independent of insertion order.
//!
//! All mutations are atomic: either the full operation succeeds or the
//! balances are unchanged.

use std::collections::BTreeMap;

use marketcore_types::*;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::SupplyConservation;

/// Default [`Collateral`] implementation.
#[derive(Debug, Clone, Default)]
pub struct InsuranceLedger {
    /// Registered assets and their quantum.
    assets: BTreeMap<Asset, Decimal>,
    accounts: BTreeMap<(AccountId, Asset), Decimal>,
    supply: SupplyConservation,
}

impl InsuranceLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset with its quantum.
    pub fn register_asset(&mut self, asset: &str, quantum: Decimal) {
        self.assets.insert(asset.to_string(), quantum);
    }

    /// Mint funds into an account.
    ///
    /// # Errors
    /// `UnknownAsset` if the asset is not registered.
    pub fn deposit(&mut self, account: AccountId, asset: &str, amount: Decimal) -> Result<()> {
        if !self.assets.contains_key(asset) {
            return Err(MarketcoreError::UnknownAsset(asset.to_string()));
        }
        *self.accounts.entry((account, asset.to_string())).or_default() += amount;
        self.supply.record_mint(asset, amount);
        Ok(())
    }

    /// Balance of an account; zero if it does not exist.
    #[must_use]
    pub fn balance(&self, account: &AccountId, asset: &str) -> Decimal {
        self.accounts
            .get(&(account.clone(), asset.to_string()))
            .copied()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn has_account(&self, account: &AccountId, asset: &str) -> bool {
        self.accounts.contains_key(&(account.clone(), asset.to_string()))
    }

    /// Sum of all account balances for an asset.
    #[must_use]
    pub fn total_supply(&self, asset: &str) -> Decimal {
        self.accounts
            .iter()
            .filter(|((_, a), _)| a == asset)
            .map(|(_, balance)| *balance)
            .sum()
    }

    /// Check supply conservation for every tracked asset.
    ///
    /// # Errors
    /// `SupplyInvariantViolation` on the first asset that does not balance.
    pub fn verify_supply(&self) -> Result<()> {
        self.supply
            .assets()
            .try_for_each(|asset| self.supply.check(asset, self.total_supply(asset)))
    }

    /// Move `amount` between two accounts, creating the destination.
    ///
    /// # Errors
    /// `InsufficientBalance` if the source holds less than `amount`.
    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        asset: &str,
        amount: Decimal,
    ) -> Result<LedgerMovement> {
        let available = self.balance(from, asset);
        if available < amount {
            return Err(MarketcoreError::InsufficientBalance {
                needed: amount,
                available,
            });
        }
        *self
            .accounts
            .entry((from.clone(), asset.to_string()))
            .or_default() -= amount;
        *self
            .accounts
            .entry((to.clone(), asset.to_string()))
            .or_default() += amount;

        tracing::debug!(from = %from, to = %to, asset, amount = %amount, "Ledger transfer");
        Ok(LedgerMovement {
            from: from.clone(),
            to: to.clone(),
            asset: asset.to_string(),
            amount,
        })
    }

    /// Drain an account into `to` and delete it. Returns the movement when
    /// the account held funds.
    fn drain(&mut self, from: &AccountId, to: &AccountId, asset: &str) -> Result<Option<LedgerMovement>> {
        let balance = self.balance(from, asset);
        let movement = if balance > Decimal::ZERO {
            Some(self.transfer(from, to, asset, balance)?)
        } else {
            None
        };
        self.accounts.remove(&(from.clone(), asset.to_string()));
        Ok(movement)
    }

    /// Hex rendering of the ledger hash, for logs.
    #[must_use]
    pub fn hash_hex(&self) -> String {
        hex::encode(Collateral::hash(self))
    }
}

impl Collateral for InsuranceLedger {
    fn asset_exists(&self, asset: &str) -> bool {
        self.assets.contains_key(asset)
    }

    fn asset_quantum(&self, asset: &str) -> Result<Decimal> {
        self.assets
            .get(asset)
            .copied()
            .ok_or_else(|| MarketcoreError::AssetQuantumUnavailable(asset.to_string()))
    }

    fn create_market_accounts(&mut self, market: &MarketId, asset: &str) -> Result<()> {
        if !self.asset_exists(asset) {
            return Err(MarketcoreError::UnknownAsset(asset.to_string()));
        }
        let insurance = (AccountId::Insurance(market.clone()), asset.to_string());
        if self.accounts.contains_key(&insurance) {
            return Err(MarketcoreError::DuplicateAccounts(market.clone()));
        }
        self.accounts.insert(insurance, Decimal::ZERO);
        self.accounts
            .insert((AccountId::LiquidityFees(market.clone()), asset.to_string()), Decimal::ZERO);
        self.accounts
            .entry((AccountId::GlobalInsurance, asset.to_string()))
            .or_default();
        Ok(())
    }

    fn insurance_balance(&self, market: &MarketId, asset: &str) -> Decimal {
        self.balance(&AccountId::Insurance(market.clone()), asset)
    }

    fn restore_insurance_balance(
        &mut self,
        market: &MarketId,
        asset: &str,
        balance: Decimal,
    ) -> Result<()> {
        if !self.asset_exists(asset) {
            return Err(MarketcoreError::UnknownAsset(asset.to_string()));
        }
        let key = (AccountId::Insurance(market.clone()), asset.to_string());
        let current = self.accounts.get(&key).copied().unwrap_or_default();
        if balance > current {
            self.supply.record_mint(asset, balance - current);
        } else if balance < current {
            self.supply.record_burn(asset, current - balance);
        }
        self.accounts.insert(key, balance);
        Ok(())
    }

    fn successor_insurance_fraction(
        &mut self,
        successor: &MarketId,
        parent: &MarketId,
        asset: &str,
        fraction: Decimal,
    ) -> Option<LedgerMovement> {
        let from = AccountId::Insurance(parent.clone());
        let amount = self.balance(&from, asset) * fraction;
        if amount <= Decimal::ZERO {
            return None;
        }
        match self.transfer(&from, &AccountId::Insurance(successor.clone()), asset, amount) {
            Ok(movement) => Some(movement),
            Err(e) => {
                tracing::warn!(
                    parent = %parent,
                    successor = %successor,
                    error = %e,
                    "Could not move insurance fraction to successor"
                );
                None
            }
        }
    }

    fn clear_insurance_pool(
        &mut self,
        market: &MarketId,
        asset: &str,
        clear_fees: bool,
    ) -> Result<Vec<LedgerMovement>> {
        let mut movements = Vec::new();
        movements.extend(self.drain(&AccountId::Insurance(market.clone()), &AccountId::GlobalInsurance, asset)?);
        if clear_fees {
            movements.extend(self.drain(
                &AccountId::LiquidityFees(market.clone()),
                &AccountId::GlobalInsurance,
                asset,
            )?);
        }
        tracing::debug!(market = %market, asset, movements = movements.len(), "Insurance pool cleared");
        Ok(movements)
    }

    fn accrue_liquidity_fees(&mut self, market: &MarketId, asset: &str, amount: Decimal) {
        if amount <= Decimal::ZERO {
            return;
        }
        if let Err(e) = self.deposit(AccountId::LiquidityFees(market.clone()), asset, amount) {
            tracing::warn!(market = %market, error = %e, "Could not accrue liquidity fees");
        }
    }

    fn distribute_liquidity_fees(
        &mut self,
        market: &MarketId,
        asset: &str,
        amounts: &[(PartyId, Decimal)],
    ) -> Result<Vec<LedgerMovement>> {
        let pool = AccountId::LiquidityFees(market.clone());
        let total: Decimal = amounts.iter().map(|(_, amount)| *amount).sum();
        let available = self.balance(&pool, asset);
        if total > available {
            return Err(MarketcoreError::InsufficientBalance {
                needed: total,
                available,
            });
        }
        amounts
            .iter()
            .filter(|(_, amount)| *amount > Decimal::ZERO)
            .map(|(party, amount)| self.transfer(&pool, &AccountId::General(party.clone()), asset, *amount))
            .collect()
    }

    fn liquidity_fee_balance(&self, market: &MarketId, asset: &str) -> Decimal {
        self.balance(&AccountId::LiquidityFees(market.clone()), asset)
    }

    fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"marketcore:ledger:v1:");
        hasher.update((self.assets.len() as u64).to_le_bytes());
        for (asset, quantum) in &self.assets {
            hasher.update(asset.as_bytes());
            hasher.update(quantum.to_string().as_bytes());
        }
        hasher.update((self.accounts.len() as u64).to_le_bytes());
        for ((account, asset), balance) in &self.accounts {
            hasher.update(account.to_string().as_bytes());
            hasher.update(asset.as_bytes());
            hasher.update(balance.to_string().as_bytes());
        }
        hasher.finalize().into()
    }
}
