// crates/bastion-staking/src/msg_server.rs
//
// Transaction entry points.
//
// `MsgServer::handle` validates a message and drives the keeper inside an
// existing context. `MsgServer::deliver` is the transaction runner: it
// executes one message against a `CacheStore` overlay and commits the
// buffered writes (staking records and bank transfers alike) only if the
// message succeeds, so a failing message leaves no trace in the store.
// `MsgServer::deliver_evidence` gives slashing the same guarantee.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use bastion_core::{
    Address, Amount, BlockHeader, Coin, ConsAddress, ConsensusParams, ConsensusPubKey, Context,
    Event, KvStore,
};
use bastion_store::CacheStore;

use crate::error::StakingError;
use crate::events;
use crate::hooks::StakingHooks;
use crate::keeper::Keeper;
use crate::validator::{BondStatus, CommissionRates, Description};

/// A staking transaction. Addresses are in their encoded string form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Msg {
    CreateValidator {
        description: Description,
        commission: CommissionRates,
        min_self_delegation: Amount,
        validator_address: String,
        pubkey: ConsensusPubKey,
        value: Coin,
    },
    EditValidator {
        validator_address: String,
        description: Description,
        commission_rate: Option<Decimal>,
        min_self_delegation: Option<Amount>,
    },
    Delegate {
        delegator_address: String,
        validator_address: String,
        amount: Coin,
    },
    Undelegate {
        delegator_address: String,
        validator_address: String,
        amount: Coin,
    },
    BeginRedelegate {
        delegator_address: String,
        validator_src_address: String,
        validator_dst_address: String,
        amount: Coin,
    },
    CancelUnbondingDelegation {
        delegator_address: String,
        validator_address: String,
        amount: Coin,
        creation_height: u64,
    },
    RotateConsPubKey {
        validator_address: String,
        new_pubkey: ConsensusPubKey,
    },
}

impl Msg {
    pub fn type_name(&self) -> &'static str {
        match self {
            Msg::CreateValidator { .. } => "create_validator",
            Msg::EditValidator { .. } => "edit_validator",
            Msg::Delegate { .. } => "delegate",
            Msg::Undelegate { .. } => "undelegate",
            Msg::BeginRedelegate { .. } => "begin_redelegate",
            Msg::CancelUnbondingDelegation { .. } => "cancel_unbonding_delegation",
            Msg::RotateConsPubKey { .. } => "rotate_cons_pubkey",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MsgResponse {
    CreateValidator,
    EditValidator,
    Delegate { new_shares: Decimal },
    Undelegate { completion_time: DateTime<Utc>, amount: Coin },
    BeginRedelegate { completion_time: DateTime<Utc> },
    CancelUnbondingDelegation,
    RotateConsPubKey,
}

/// Outcome of a delivered message.
#[derive(Debug, Clone, PartialEq)]
pub struct TxResult {
    pub response: MsgResponse,
    pub events: Vec<Event>,
}

/// A consensus fault reported by the evidence handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub cons_address: ConsAddress,
    pub infraction_height: u64,
    /// Consensus power of the validator at the infraction.
    pub power: u64,
    pub slash_factor: Decimal,
}

/// Outcome of delivered evidence.
#[derive(Debug, Clone, PartialEq)]
pub struct SlashResult {
    pub burned: Amount,
    pub events: Vec<Event>,
}

pub struct MsgServer<'k> {
    keeper: &'k Keeper,
}

impl<'k> MsgServer<'k> {
    pub fn new(keeper: &'k Keeper) -> Self {
        Self { keeper }
    }

    /// Execute `msg` atomically against `store`. On error nothing is written.
    pub fn deliver(
        &self,
        store: &mut dyn KvStore,
        header: BlockHeader,
        consensus_params: ConsensusParams,
        msg: &Msg,
    ) -> Result<TxResult, StakingError> {
        let (response, events) = self.run_atomic(
            store,
            header,
            consensus_params,
            msg.type_name(),
            |ctx| self.handle(ctx, msg),
        )?;
        Ok(TxResult { response, events })
    }

    /// Slash for `evidence` atomically against `store`. A slash that fails
    /// part way leaves no entry, pool or validator change behind.
    pub fn deliver_evidence(
        &self,
        store: &mut dyn KvStore,
        header: BlockHeader,
        consensus_params: ConsensusParams,
        evidence: &Evidence,
    ) -> Result<SlashResult, StakingError> {
        let (burned, events) = self.run_atomic(
            store,
            header,
            consensus_params,
            "evidence",
            |ctx| {
                self.keeper.slash(
                    ctx,
                    &evidence.cons_address,
                    evidence.infraction_height,
                    evidence.power,
                    evidence.slash_factor,
                )
            },
        )?;
        Ok(SlashResult { burned, events })
    }

    /// Run `f` on a `CacheStore` over `store` and commit its writes only if
    /// it succeeds.
    fn run_atomic<R>(
        &self,
        store: &mut dyn KvStore,
        header: BlockHeader,
        consensus_params: ConsensusParams,
        label: &str,
        f: impl FnOnce(&mut Context<'_>) -> Result<R, StakingError>,
    ) -> Result<(R, Vec<Event>), StakingError> {
        let height = header.height;
        let (result, writes) = {
            let mut cache = CacheStore::new(&*store);
            let mut ctx = Context::new(&mut cache, header).with_consensus_params(consensus_params);
            let result = f(&mut ctx);
            let events = ctx.into_events();
            (result.map(|value| (value, events)), cache.into_writes())
        };
        match result {
            Ok(out) => {
                debug!(
                    "Delivered {} at height {} ({} writes)",
                    label,
                    height,
                    writes.len()
                );
                writes.write_to(store)?;
                Ok(out)
            }
            Err(e) => {
                warn!("Rejected {} at height {}: {}", label, height, e);
                Err(e)
            }
        }
    }

    /// Validate and apply `msg` within `ctx`. Callers that need rollback on
    /// failure must run this on an overlay (see `deliver`).
    pub fn handle(&self, ctx: &mut Context<'_>, msg: &Msg) -> Result<MsgResponse, StakingError> {
        match msg {
            Msg::CreateValidator {
                description,
                commission,
                min_self_delegation,
                validator_address,
                pubkey,
                value,
            } => {
                let operator = self.decode(validator_address)?;
                self.check_denom(ctx, value)?;
                if value.amount < *min_self_delegation {
                    return Err(StakingError::SelfDelegationBelowMinimum {
                        operator,
                        tokens: value.amount,
                        min: *min_self_delegation,
                    });
                }
                self.keeper.create_validator(
                    ctx,
                    operator,
                    pubkey.clone(),
                    description.clone(),
                    commission.clone(),
                    *min_self_delegation,
                )?;
                self.keeper
                    .delegate(ctx, &operator, value.amount, BondStatus::Unbonded, &operator, true)?;
                ctx.emit_event(
                    Event::new(events::EVENT_TYPE_CREATE_VALIDATOR)
                        .attr(events::ATTRIBUTE_KEY_VALIDATOR, validator_address)
                        .attr(events::ATTRIBUTE_KEY_AMOUNT, value),
                );
                Ok(MsgResponse::CreateValidator)
            }

            Msg::EditValidator {
                validator_address,
                description,
                commission_rate,
                min_self_delegation,
            } => {
                let operator = self.decode(validator_address)?;
                let mut validator = self.keeper.must_get_validator(ctx, &operator)?;
                validator.description = validator.description.update(description)?;

                if let Some(rate) = commission_rate {
                    self.keeper
                        .hooks()
                        .before_validator_modified(ctx, &operator)?;
                    self.keeper
                        .update_validator_commission(ctx, &mut validator, *rate)?;
                }
                if let Some(min) = min_self_delegation {
                    if *min <= validator.min_self_delegation {
                        return Err(StakingError::MinSelfDelegationDecreased {
                            current: validator.min_self_delegation,
                            requested: *min,
                        });
                    }
                    if *min > validator.tokens {
                        return Err(StakingError::SelfDelegationBelowMinimum {
                            operator,
                            tokens: validator.tokens,
                            min: *min,
                        });
                    }
                    validator.min_self_delegation = *min;
                }
                self.keeper.set_validator(ctx, &validator)?;
                ctx.emit_event(
                    Event::new(events::EVENT_TYPE_EDIT_VALIDATOR)
                        .attr(
                            events::ATTRIBUTE_KEY_COMMISSION_RATE,
                            validator.commission.rates.rate,
                        )
                        .attr(
                            events::ATTRIBUTE_KEY_MIN_SELF_DELEGATION,
                            validator.min_self_delegation,
                        ),
                );
                Ok(MsgResponse::EditValidator)
            }

            Msg::Delegate {
                delegator_address,
                validator_address,
                amount,
            } => {
                let delegator = self.decode(delegator_address)?;
                let operator = self.decode(validator_address)?;
                self.check_denom(ctx, amount)?;
                Self::check_positive(amount)?;
                self.keeper.must_get_validator(ctx, &operator)?;
                let new_shares = self.keeper.delegate(
                    ctx,
                    &delegator,
                    amount.amount,
                    BondStatus::Unbonded,
                    &operator,
                    true,
                )?;
                ctx.emit_event(
                    Event::new(events::EVENT_TYPE_DELEGATE)
                        .attr(events::ATTRIBUTE_KEY_VALIDATOR, validator_address)
                        .attr(events::ATTRIBUTE_KEY_DELEGATOR, delegator_address)
                        .attr(events::ATTRIBUTE_KEY_AMOUNT, amount)
                        .attr(events::ATTRIBUTE_KEY_NEW_SHARES, new_shares),
                );
                Ok(MsgResponse::Delegate { new_shares })
            }

            Msg::Undelegate {
                delegator_address,
                validator_address,
                amount,
            } => {
                let delegator = self.decode(delegator_address)?;
                let operator = self.decode(validator_address)?;
                self.check_denom(ctx, amount)?;
                Self::check_positive(amount)?;
                let shares = self
                    .keeper
                    .validate_unbond_amount(ctx, &delegator, &operator, amount.amount)?;
                let (completion_time, unbonded) =
                    self.keeper.undelegate(ctx, &delegator, &operator, shares)?;
                let paid = Coin::new(amount.denom.clone(), unbonded);
                ctx.emit_event(
                    Event::new(events::EVENT_TYPE_UNBOND)
                        .attr(events::ATTRIBUTE_KEY_VALIDATOR, validator_address)
                        .attr(events::ATTRIBUTE_KEY_DELEGATOR, delegator_address)
                        .attr(events::ATTRIBUTE_KEY_AMOUNT, &paid)
                        .attr(events::ATTRIBUTE_KEY_COMPLETION_TIME, completion_time.to_rfc3339()),
                );
                Ok(MsgResponse::Undelegate {
                    completion_time,
                    amount: paid,
                })
            }

            Msg::BeginRedelegate {
                delegator_address,
                validator_src_address,
                validator_dst_address,
                amount,
            } => {
                let delegator = self.decode(delegator_address)?;
                let src = self.decode(validator_src_address)?;
                let dst = self.decode(validator_dst_address)?;
                self.check_denom(ctx, amount)?;
                Self::check_positive(amount)?;
                let shares = self
                    .keeper
                    .validate_unbond_amount(ctx, &delegator, &src, amount.amount)?;
                let completion_time =
                    self.keeper
                        .begin_redelegation(ctx, &delegator, &src, &dst, shares)?;
                ctx.emit_event(
                    Event::new(events::EVENT_TYPE_REDELEGATE)
                        .attr(events::ATTRIBUTE_KEY_SRC_VALIDATOR, validator_src_address)
                        .attr(events::ATTRIBUTE_KEY_DST_VALIDATOR, validator_dst_address)
                        .attr(events::ATTRIBUTE_KEY_DELEGATOR, delegator_address)
                        .attr(events::ATTRIBUTE_KEY_AMOUNT, amount)
                        .attr(events::ATTRIBUTE_KEY_COMPLETION_TIME, completion_time.to_rfc3339()),
                );
                Ok(MsgResponse::BeginRedelegate { completion_time })
            }

            Msg::CancelUnbondingDelegation {
                delegator_address,
                validator_address,
                amount,
                creation_height,
            } => {
                let delegator = self.decode(delegator_address)?;
                let operator = self.decode(validator_address)?;
                self.check_denom(ctx, amount)?;
                Self::check_positive(amount)?;
                self.keeper.cancel_unbonding_delegation(
                    ctx,
                    &delegator,
                    &operator,
                    *creation_height,
                    amount.amount,
                )?;
                Ok(MsgResponse::CancelUnbondingDelegation)
            }

            Msg::RotateConsPubKey {
                validator_address,
                new_pubkey,
            } => {
                let operator = self.decode(validator_address)?;
                self.keeper
                    .rotate_consensus_pubkey(ctx, &operator, new_pubkey.clone())?;
                Ok(MsgResponse::RotateConsPubKey)
            }
        }
    }

    fn decode(&self, encoded: &str) -> Result<Address, StakingError> {
        Ok(self.keeper.codec().decode_address(encoded)?)
    }

    fn check_denom(&self, ctx: &Context<'_>, coin: &Coin) -> Result<(), StakingError> {
        let expected = self.keeper.params(ctx)?.bond_denom;
        if coin.denom != expected {
            return Err(StakingError::InvalidDenomination {
                expected,
                got: coin.denom.clone(),
            });
        }
        Ok(())
    }

    fn check_positive(coin: &Coin) -> Result<(), StakingError> {
        if coin.is_zero() {
            return Err(StakingError::InvalidAmount(format!(
                "amount must be positive, got {}",
                coin
            )));
        }
        Ok(())
    }
}
