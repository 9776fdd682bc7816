// crates/bastion-staking/src/hooks.rs
//
// Observer callbacks for cross-module bookkeeping.
//
// Hooks are registered once, at keeper construction, as an ordered list and
// invoked synchronously in registration order. A hook error aborts the
// surrounding message like any other failure.

use rust_decimal::Decimal;

use bastion_core::{Address, ConsAddress, ConsensusPubKey, Context};

use crate::error::StakingError;

/// Staking lifecycle callbacks. Every method defaults to a no-op.
#[allow(unused_variables)]
pub trait StakingHooks: Send + Sync {
    fn after_validator_created(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
    ) -> Result<(), StakingError> {
        Ok(())
    }

    fn before_validator_modified(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
    ) -> Result<(), StakingError> {
        Ok(())
    }

    fn after_validator_removed(
        &self,
        ctx: &mut Context<'_>,
        cons: &ConsAddress,
        operator: &Address,
    ) -> Result<(), StakingError> {
        Ok(())
    }

    fn after_validator_bonded(
        &self,
        ctx: &mut Context<'_>,
        cons: &ConsAddress,
        operator: &Address,
    ) -> Result<(), StakingError> {
        Ok(())
    }

    fn after_validator_begin_unbonding(
        &self,
        ctx: &mut Context<'_>,
        cons: &ConsAddress,
        operator: &Address,
    ) -> Result<(), StakingError> {
        Ok(())
    }

    fn before_delegation_created(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> Result<(), StakingError> {
        Ok(())
    }

    fn before_delegation_shares_modified(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> Result<(), StakingError> {
        Ok(())
    }

    fn before_delegation_removed(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> Result<(), StakingError> {
        Ok(())
    }

    fn after_delegation_modified(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> Result<(), StakingError> {
        Ok(())
    }

    fn before_validator_slashed(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
        fraction: Decimal,
    ) -> Result<(), StakingError> {
        Ok(())
    }

    fn after_consensus_pubkey_update(
        &self,
        ctx: &mut Context<'_>,
        old_key: &ConsensusPubKey,
        new_key: &ConsensusPubKey,
    ) -> Result<(), StakingError> {
        Ok(())
    }
}

/// Ordered fan-out over registered hooks.
#[derive(Default)]
pub struct MultiStakingHooks {
    hooks: Vec<Box<dyn StakingHooks>>,
}

impl MultiStakingHooks {
    pub fn new(hooks: Vec<Box<dyn StakingHooks>>) -> Self {
        Self { hooks }
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl StakingHooks for MultiStakingHooks {
    fn after_validator_created(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
    ) -> Result<(), StakingError> {
        for hook in &self.hooks {
            hook.after_validator_created(ctx, operator)?;
        }
        Ok(())
    }

    fn before_validator_modified(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
    ) -> Result<(), StakingError> {
        for hook in &self.hooks {
            hook.before_validator_modified(ctx, operator)?;
        }
        Ok(())
    }

    fn after_validator_removed(
        &self,
        ctx: &mut Context<'_>,
        cons: &ConsAddress,
        operator: &Address,
    ) -> Result<(), StakingError> {
        for hook in &self.hooks {
            hook.after_validator_removed(ctx, cons, operator)?;
        }
        Ok(())
    }

    fn after_validator_bonded(
        &self,
        ctx: &mut Context<'_>,
        cons: &ConsAddress,
        operator: &Address,
    ) -> Result<(), StakingError> {
        for hook in &self.hooks {
            hook.after_validator_bonded(ctx, cons, operator)?;
        }
        Ok(())
    }

    fn after_validator_begin_unbonding(
        &self,
        ctx: &mut Context<'_>,
        cons: &ConsAddress,
        operator: &Address,
    ) -> Result<(), StakingError> {
        for hook in &self.hooks {
            hook.after_validator_begin_unbonding(ctx, cons, operator)?;
        }
        Ok(())
    }

    fn before_delegation_created(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> Result<(), StakingError> {
        for hook in &self.hooks {
            hook.before_delegation_created(ctx, delegator, validator)?;
        }
        Ok(())
    }

    fn before_delegation_shares_modified(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> Result<(), StakingError> {
        for hook in &self.hooks {
            hook.before_delegation_shares_modified(ctx, delegator, validator)?;
        }
        Ok(())
    }

    fn before_delegation_removed(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> Result<(), StakingError> {
        for hook in &self.hooks {
            hook.before_delegation_removed(ctx, delegator, validator)?;
        }
        Ok(())
    }

    fn after_delegation_modified(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> Result<(), StakingError> {
        for hook in &self.hooks {
            hook.after_delegation_modified(ctx, delegator, validator)?;
        }
        Ok(())
    }

    fn before_validator_slashed(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
        fraction: Decimal,
    ) -> Result<(), StakingError> {
        for hook in &self.hooks {
            hook.before_validator_slashed(ctx, operator, fraction)?;
        }
        Ok(())
    }

    fn after_consensus_pubkey_update(
        &self,
        ctx: &mut Context<'_>,
        old_key: &ConsensusPubKey,
        new_key: &ConsensusPubKey,
    ) -> Result<(), StakingError> {
        for hook in &self.hooks {
            hook.after_consensus_pubkey_update(ctx, old_key, new_key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use bastion_core::BlockHeader;
    use bastion_store::MemStore;
    use chrono::{DateTime, Utc};

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl StakingHooks for Recorder {
        fn after_validator_created(
            &self,
            _ctx: &mut Context<'_>,
            _operator: &Address,
        ) -> Result<(), StakingError> {
            self.log.lock().unwrap().push(self.name.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_hooks_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = MultiStakingHooks::new(vec![
            Box::new(Recorder { name: "first", log: log.clone() }),
            Box::new(Recorder { name: "second", log: log.clone() }),
        ]);
        let mut store = MemStore::new();
        let mut ctx = Context::new(
            &mut store,
            BlockHeader::new("test", 1, DateTime::<Utc>::UNIX_EPOCH),
        );
        hooks.after_validator_created(&mut ctx, &Address([1; 20])).unwrap();
        hooks.after_delegation_modified(&mut ctx, &Address([1; 20]), &Address([2; 20])).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }
}
