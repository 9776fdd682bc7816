// crates/bastion-staking/src/bank.rs
//
// Token custody interface and a store-backed implementation.
//
// The staking engine never holds balances itself: bonded stake sits in the
// `bonded_tokens_pool` module account, stake that is unbonding (or backs a
// non-bonded validator) sits in `not_bonded_tokens_pool`, and every status
// transition or withdrawal is a transfer between them and user accounts.
//
// `StoreBank` keeps balances in the same store the engine writes to, so a
// rolled-back message also rolls back its transfers.

use bastion_core::crypto::hash_bytes;
use bastion_core::{Address, Amount, Coin, Context, Event, ADDRESS_LEN};

use crate::error::StakingError;
use crate::events;

pub const BONDED_POOL_NAME: &str = "bonded_tokens_pool";
pub const NOT_BONDED_POOL_NAME: &str = "not_bonded_tokens_pool";
pub const MINT_MODULE_NAME: &str = "mint";

const BALANCE_KEY: u8 = 0xB0;
const SUPPLY_KEY: u8 = 0xB1;

/// Deterministic account address of a named module.
pub fn module_address(name: &str) -> Address {
    let digest = hash_bytes(name.as_bytes());
    let mut out = [0u8; ADDRESS_LEN];
    out.copy_from_slice(&digest[..ADDRESS_LEN]);
    Address(out)
}

/// Token custody operations consumed by the staking engine.
pub trait BankKeeper: Send + Sync {
    fn get_balance(&self, ctx: &Context<'_>, address: &Address, denom: &str)
        -> Result<Amount, StakingError>;

    fn send_coins_from_account_to_module(
        &self,
        ctx: &mut Context<'_>,
        sender: &Address,
        module: &str,
        coin: &Coin,
    ) -> Result<(), StakingError>;

    fn send_coins_from_module_to_account(
        &self,
        ctx: &mut Context<'_>,
        module: &str,
        recipient: &Address,
        coin: &Coin,
    ) -> Result<(), StakingError>;

    fn send_coins_from_module_to_module(
        &self,
        ctx: &mut Context<'_>,
        sender_module: &str,
        recipient_module: &str,
        coin: &Coin,
    ) -> Result<(), StakingError>;

    /// Destroy coins held by a module account.
    fn burn_coins(&self, ctx: &mut Context<'_>, module: &str, coin: &Coin)
        -> Result<(), StakingError>;

    /// Create coins into a module account.
    fn mint_coins(&self, ctx: &mut Context<'_>, module: &str, coin: &Coin)
        -> Result<(), StakingError>;

    fn get_module_balance(
        &self,
        ctx: &Context<'_>,
        module: &str,
        denom: &str,
    ) -> Result<Amount, StakingError> {
        self.get_balance(ctx, &module_address(module), denom)
    }
}

/// Bank whose balances live in the engine's own store.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreBank;

impl StoreBank {
    pub fn new() -> Self {
        Self
    }

    fn balance_key(address: &Address, denom: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + ADDRESS_LEN + denom.len());
        key.push(BALANCE_KEY);
        key.extend_from_slice(address.as_bytes());
        key.extend_from_slice(denom.as_bytes());
        key
    }

    fn supply_key(denom: &str) -> Vec<u8> {
        let mut key = vec![SUPPLY_KEY];
        key.extend_from_slice(denom.as_bytes());
        key
    }

    fn read_amount(ctx: &Context<'_>, key: &[u8]) -> Result<Amount, StakingError> {
        match ctx.store().get(key)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(0),
        }
    }

    fn write_amount(ctx: &mut Context<'_>, key: &[u8], amount: Amount) -> Result<(), StakingError> {
        if amount == 0 {
            ctx.store_mut().delete(key)?;
        } else {
            ctx.store_mut().set(key, &serde_json::to_vec(&amount)?)?;
        }
        Ok(())
    }

    fn sub_balance(ctx: &mut Context<'_>, address: &Address, coin: &Coin) -> Result<(), StakingError> {
        let key = Self::balance_key(address, &coin.denom);
        let available = Self::read_amount(ctx, &key)?;
        if available < coin.amount {
            return Err(StakingError::InsufficientFunds {
                address: *address,
                available,
                required: coin.amount,
            });
        }
        Self::write_amount(ctx, &key, available - coin.amount)
    }

    fn add_balance(ctx: &mut Context<'_>, address: &Address, coin: &Coin) -> Result<(), StakingError> {
        let key = Self::balance_key(address, &coin.denom);
        let current = Self::read_amount(ctx, &key)?;
        let next = current
            .checked_add(coin.amount)
            .ok_or(StakingError::ArithmeticOverflow("account balance"))?;
        Self::write_amount(ctx, &key, next)
    }

    fn transfer(
        ctx: &mut Context<'_>,
        from: &Address,
        to: &Address,
        coin: &Coin,
    ) -> Result<(), StakingError> {
        if coin.is_zero() {
            return Ok(());
        }
        Self::sub_balance(ctx, from, coin)?;
        Self::add_balance(ctx, to, coin)?;
        ctx.emit_event(
            Event::new(events::EVENT_TYPE_TRANSFER)
                .attr(events::ATTRIBUTE_KEY_SENDER, from)
                .attr(events::ATTRIBUTE_KEY_RECIPIENT, to)
                .attr(events::ATTRIBUTE_KEY_AMOUNT, coin),
        );
        Ok(())
    }

    /// Total minted minus burned for `denom`.
    pub fn supply(&self, ctx: &Context<'_>, denom: &str) -> Result<Amount, StakingError> {
        Self::read_amount(ctx, &Self::supply_key(denom))
    }

    /// Mint straight into an account; used to fund genesis accounts.
    pub fn fund_account(
        &self,
        ctx: &mut Context<'_>,
        address: &Address,
        coin: &Coin,
    ) -> Result<(), StakingError> {
        self.mint_coins(ctx, MINT_MODULE_NAME, coin)?;
        self.send_coins_from_module_to_account(ctx, MINT_MODULE_NAME, address, coin)
    }
}

impl BankKeeper for StoreBank {
    fn get_balance(
        &self,
        ctx: &Context<'_>,
        address: &Address,
        denom: &str,
    ) -> Result<Amount, StakingError> {
        Self::read_amount(ctx, &Self::balance_key(address, denom))
    }

    fn send_coins_from_account_to_module(
        &self,
        ctx: &mut Context<'_>,
        sender: &Address,
        module: &str,
        coin: &Coin,
    ) -> Result<(), StakingError> {
        Self::transfer(ctx, sender, &module_address(module), coin)
    }

    fn send_coins_from_module_to_account(
        &self,
        ctx: &mut Context<'_>,
        module: &str,
        recipient: &Address,
        coin: &Coin,
    ) -> Result<(), StakingError> {
        Self::transfer(ctx, &module_address(module), recipient, coin)
    }

    fn send_coins_from_module_to_module(
        &self,
        ctx: &mut Context<'_>,
        sender_module: &str,
        recipient_module: &str,
        coin: &Coin,
    ) -> Result<(), StakingError> {
        Self::transfer(
            ctx,
            &module_address(sender_module),
            &module_address(recipient_module),
            coin,
        )
    }

    fn burn_coins(
        &self,
        ctx: &mut Context<'_>,
        module: &str,
        coin: &Coin,
    ) -> Result<(), StakingError> {
        if coin.is_zero() {
            return Ok(());
        }
        let holder = module_address(module);
        Self::sub_balance(ctx, &holder, coin)?;
        let supply_key = Self::supply_key(&coin.denom);
        let supply = Self::read_amount(ctx, &supply_key)?;
        Self::write_amount(ctx, &supply_key, supply.saturating_sub(coin.amount))?;
        ctx.emit_event(
            Event::new(events::EVENT_TYPE_BURN)
                .attr(events::ATTRIBUTE_KEY_SENDER, holder)
                .attr(events::ATTRIBUTE_KEY_AMOUNT, coin),
        );
        Ok(())
    }

    fn mint_coins(
        &self,
        ctx: &mut Context<'_>,
        module: &str,
        coin: &Coin,
    ) -> Result<(), StakingError> {
        if coin.is_zero() {
            return Ok(());
        }
        let holder = module_address(module);
        Self::add_balance(ctx, &holder, coin)?;
        let supply_key = Self::supply_key(&coin.denom);
        let supply = Self::read_amount(ctx, &supply_key)?;
        let next = supply
            .checked_add(coin.amount)
            .ok_or(StakingError::ArithmeticOverflow("supply"))?;
        Self::write_amount(ctx, &supply_key, next)?;
        ctx.emit_event(
            Event::new(events::EVENT_TYPE_MINT)
                .attr(events::ATTRIBUTE_KEY_RECIPIENT, holder)
                .attr(events::ATTRIBUTE_KEY_AMOUNT, coin),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::BlockHeader;
    use bastion_store::MemStore;
    use chrono::{DateTime, Utc};

    fn header() -> BlockHeader {
        BlockHeader::new("test", 1, DateTime::<Utc>::UNIX_EPOCH)
    }

    #[test]
    fn test_module_addresses_are_distinct() {
        assert_ne!(
            module_address(BONDED_POOL_NAME),
            module_address(NOT_BONDED_POOL_NAME)
        );
    }

    #[test]
    fn test_fund_and_transfer() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, header());
        let bank = StoreBank::new();
        let alice = Address([1; 20]);
        let coin = Coin::new("ubstn", 500);

        bank.fund_account(&mut ctx, &alice, &coin).unwrap();
        assert_eq!(bank.get_balance(&ctx, &alice, "ubstn").unwrap(), 500);
        assert_eq!(bank.supply(&ctx, "ubstn").unwrap(), 500);

        bank.send_coins_from_account_to_module(
            &mut ctx,
            &alice,
            BONDED_POOL_NAME,
            &Coin::new("ubstn", 200),
        )
        .unwrap();
        assert_eq!(bank.get_balance(&ctx, &alice, "ubstn").unwrap(), 300);
        assert_eq!(
            bank.get_module_balance(&ctx, BONDED_POOL_NAME, "ubstn").unwrap(),
            200
        );
    }

    #[test]
    fn test_overdraft_rejected() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, header());
        let bank = StoreBank::new();
        let err = bank
            .send_coins_from_module_to_module(
                &mut ctx,
                BONDED_POOL_NAME,
                NOT_BONDED_POOL_NAME,
                &Coin::new("ubstn", 1),
            )
            .unwrap_err();
        assert!(matches!(err, StakingError::InsufficientFunds { .. }));
    }

    #[test]
    fn test_burn_reduces_supply() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, header());
        let bank = StoreBank::new();
        bank.mint_coins(&mut ctx, NOT_BONDED_POOL_NAME, &Coin::new("ubstn", 10))
            .unwrap();
        bank.burn_coins(&mut ctx, NOT_BONDED_POOL_NAME, &Coin::new("ubstn", 4))
            .unwrap();
        assert_eq!(bank.supply(&ctx, "ubstn").unwrap(), 6);
        assert_eq!(
            bank.get_module_balance(&ctx, NOT_BONDED_POOL_NAME, "ubstn").unwrap(),
            6
        );
    }
}
