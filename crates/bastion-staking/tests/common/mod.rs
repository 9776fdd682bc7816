// crates/bastion-staking/tests/common/mod.rs
//
// Shared harness for the staking integration tests: a keeper over an
// in-memory store, driven block by block with 5-second block times.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use bastion_core::{
    Address, BlockHeader, Coin, ConsensusParams, ConsensusPubKey, Context, HexCodec, KvStore,
    Order,
};
use bastion_staking::{
    begin_block, end_block, CommissionRates, Description, Keeper, Msg, Params, StakingError,
    StoreBank, TxResult, ValidatorUpdate,
};
use bastion_store::MemStore;

pub const DENOM: &str = "ubstn";

pub fn header(height: u64) -> BlockHeader {
    BlockHeader::new(
        "bastion-it",
        height,
        DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(height as i64 * 5),
    )
}

/// One token per unit of power, 100-second unbonding.
pub fn params() -> Params {
    Params {
        power_reduction: 1,
        unbonding_time_secs: 100,
        historical_entries: 100,
        ..Params::default()
    }
}

pub fn addr(n: u8) -> Address {
    Address([n; 20])
}

pub fn pubkey(n: u8) -> ConsensusPubKey {
    ConsensusPubKey::ed25519([n; 32])
}

pub fn coin(amount: u64) -> Coin {
    Coin::new(DENOM, amount)
}

pub struct Chain {
    pub keeper: Keeper,
    pub store: MemStore,
}

impl Chain {
    pub fn new(params: Params) -> Self {
        let mut chain = Self {
            keeper: Keeper::new(Box::new(StoreBank::new()), Box::new(HexCodec::default())),
            store: MemStore::new(),
        };
        chain.with_ctx(0, |k, ctx| k.set_params(ctx, &params).unwrap());
        chain
    }

    pub fn enc(&self, address: &Address) -> String {
        self.keeper.codec().encode(address.as_bytes())
    }

    pub fn with_ctx<R>(&mut self, height: u64, f: impl FnOnce(&Keeper, &mut Context<'_>) -> R) -> R {
        let mut ctx = Context::new(&mut self.store, header(height));
        f(&self.keeper, &mut ctx)
    }

    pub fn deliver(&mut self, height: u64, msg: Msg) -> Result<TxResult, StakingError> {
        bastion_staking::MsgServer::new(&self.keeper).deliver(
            &mut self.store,
            header(height),
            ConsensusParams::default(),
            &msg,
        )
    }

    /// Run begin and end block at `height`, returning the set updates.
    pub fn block(&mut self, height: u64) -> Vec<ValidatorUpdate> {
        self.with_ctx(height, |k, ctx| {
            begin_block(k, ctx).unwrap();
            end_block(k, ctx).unwrap()
        })
    }

    pub fn fund(&mut self, who: &Address, amount: u64) {
        self.with_ctx(0, |_, ctx| {
            StoreBank::new().fund_account(ctx, who, &coin(amount)).unwrap()
        });
    }

    pub fn balance(&mut self, who: &Address) -> u64 {
        self.with_ctx(0, |k, ctx| k.bank().get_balance(ctx, who, DENOM).unwrap())
    }

    /// Fund `addr(n)` and create its validator with a self-bond of `bond`.
    pub fn create_validator(&mut self, height: u64, n: u8, bond: u64) {
        self.fund(&addr(n), bond);
        let msg = Msg::CreateValidator {
            description: Description::new(format!("validator-{}", n)),
            commission: CommissionRates::new(
                Decimal::new(1, 1),
                Decimal::new(2, 1),
                Decimal::new(1, 2),
            ),
            min_self_delegation: 1,
            validator_address: self.enc(&addr(n)),
            pubkey: pubkey(n),
            value: coin(bond),
        };
        self.deliver(height, msg).unwrap();
    }

    pub fn delegate(&mut self, height: u64, delegator: &Address, operator: &Address, amount: u64) {
        let msg = Msg::Delegate {
            delegator_address: self.enc(delegator),
            validator_address: self.enc(operator),
            amount: coin(amount),
        };
        self.deliver(height, msg).unwrap();
    }

    /// Every key-value pair in the store, in key order.
    pub fn dump(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.store.range(&[], None, Order::Ascending).unwrap()
    }
}
