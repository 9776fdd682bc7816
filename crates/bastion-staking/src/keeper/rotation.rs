// crates/bastion-staking/src/keeper/rotation.rs
//
// Consensus key rotation.
//
// A validator may replace its consensus key at most once per unbonding
// period. The old consensus address keeps resolving to the operator so
// evidence signed with the old key can still be slashed, and the next set
// update reports the old key at power zero followed by the new key.

use chrono::{DateTime, Utc};
use tracing::info;

use bastion_core::{Address, ConsensusPubKey, Context, Event};

use super::{get_json, set_json, Keeper};
use crate::error::StakingError;
use crate::events;
use crate::hooks::StakingHooks;
use crate::keys;

impl Keeper {
    pub fn rotate_consensus_pubkey(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
        new_key: ConsensusPubKey,
    ) -> Result<(), StakingError> {
        let mut validator = self.must_get_validator(ctx, operator)?;

        let key_type = new_key.key_type();
        if !ctx.consensus_params().accepts(key_type) {
            return Err(StakingError::ValidatorPubKeyTypeNotSupported {
                key_type,
                accepted: ctx.consensus_params().pub_key_types.clone(),
            });
        }
        let new_cons = new_key.address();
        if self.cons_addr_in_use(ctx, &new_cons)? {
            return Err(StakingError::ValidatorPubKeyExists {
                cons_address: new_cons,
            });
        }

        let params = self.params(ctx)?;
        let last: Option<DateTime<Utc>> =
            get_json(ctx.store(), &keys::last_rotation_time_key(operator))?;
        if let Some(last) = last {
            if ctx.block_time() < params.unbonding_completion(last)? {
                return Err(StakingError::ConsensusPubKeyRotationLimit {
                    operator: *operator,
                });
            }
        }

        let old_key = validator.consensus_pubkey.clone();
        let old_cons = validator.cons_address();
        ctx.store_mut()
            .delete(&keys::validator_by_cons_addr_key(&old_cons))?;
        set_json(ctx.store_mut(), &keys::old_cons_addr_key(&old_cons), operator)?;
        if !ctx.store().has(&keys::pending_rotation_key(operator))? {
            set_json(ctx.store_mut(), &keys::pending_rotation_key(operator), &old_key)?;
        }

        validator.consensus_pubkey = new_key.clone();
        self.set_validator(ctx, &validator)?;
        self.set_validator_by_cons_addr(ctx, &validator)?;
        let now = ctx.block_time();
        set_json(ctx.store_mut(), &keys::last_rotation_time_key(operator), &now)?;

        self.hooks()
            .after_consensus_pubkey_update(ctx, &old_key, &new_key)?;
        ctx.emit_event(
            Event::new(events::EVENT_TYPE_ROTATE_CONS_PUBKEY)
                .attr(events::ATTRIBUTE_KEY_VALIDATOR, operator)
                .attr(events::ATTRIBUTE_KEY_CONS_ADDRESS, new_cons),
        );
        info!(
            "Validator {} rotated consensus key {} -> {}",
            operator, old_cons, new_cons
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::validator::ValidatorUpdate;
    use bastion_store::MemStore;

    #[test]
    fn test_rotation_reports_old_key_removed() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut c = ctx(&mut store, 1);
        k.set_params(&mut c, &unit_params()).unwrap();
        let op = create_validator(&k, &mut c, 1, 100);
        k.apply_and_return_validator_set_updates(&mut c).unwrap();

        k.rotate_consensus_pubkey(&mut c, &op, pubkey(42)).unwrap();
        let updates = k.apply_and_return_validator_set_updates(&mut c).unwrap();
        assert_eq!(
            updates,
            vec![
                ValidatorUpdate { pub_key: pubkey(1), power: 0 },
                ValidatorUpdate { pub_key: pubkey(42), power: 100 },
            ]
        );
        assert!(k.apply_and_return_validator_set_updates(&mut c).unwrap().is_empty());

        // Old evidence still resolves to the operator.
        let v = k.get_validator_by_cons_addr(&c, &pubkey(1).address()).unwrap().unwrap();
        assert_eq!(v.operator_address, op);
    }

    #[test]
    fn test_second_rotation_within_period_rejected() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut c = ctx(&mut store, 1);
        k.set_params(&mut c, &unit_params()).unwrap();
        let op = create_validator(&k, &mut c, 1, 100);
        k.rotate_consensus_pubkey(&mut c, &op, pubkey(42)).unwrap();
        let err = k.rotate_consensus_pubkey(&mut c, &op, pubkey(43)).unwrap_err();
        assert!(matches!(err, StakingError::ConsensusPubKeyRotationLimit { .. }));
    }

    #[test]
    fn test_rotation_to_bound_key_rejected() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut c = ctx(&mut store, 1);
        k.set_params(&mut c, &unit_params()).unwrap();
        let op = create_validator(&k, &mut c, 1, 100);
        create_validator(&k, &mut c, 2, 100);
        let err = k.rotate_consensus_pubkey(&mut c, &op, pubkey(2)).unwrap_err();
        assert!(matches!(err, StakingError::ValidatorPubKeyExists { .. }));
    }
}
