// crates/bastion-staking/src/abci.rs
//
// Per-block hooks driven by the consensus adapter.
//
// begin_block records the bonded set for the current height. end_block
// applies the validator-set diff, then matures the validator, unbonding and
// redelegation queues in that order, and returns the updates to report.

use tracing::{debug, info};

use bastion_core::Context;

use crate::error::StakingError;
use crate::keeper::Keeper;
use crate::validator::ValidatorUpdate;

pub fn begin_block(keeper: &Keeper, ctx: &mut Context<'_>) -> Result<(), StakingError> {
    keeper.track_historical_info(ctx)
}

pub fn end_block(keeper: &Keeper, ctx: &mut Context<'_>) -> Result<Vec<ValidatorUpdate>, StakingError> {
    let updates = keeper.apply_and_return_validator_set_updates(ctx)?;

    keeper.unbond_all_mature_validators(ctx)?;

    let mature_unbondings = keeper.dequeue_all_mature_ubd_queue(ctx)?;
    for pair in &mature_unbondings {
        match keeper.complete_unbonding(ctx, &pair.delegator_address, &pair.validator_address) {
            Ok(paid) => debug!(
                "Matured unbonding ({}, {}) paid {}",
                pair.delegator_address, pair.validator_address, paid
            ),
            // Fully cancelled or already paid through an earlier queue slot.
            Err(StakingError::NoUnbondingDelegation { .. }) => continue,
            Err(e) => return Err(e),
        }
    }

    let mature_redelegations = keeper.dequeue_all_mature_red_queue(ctx)?;
    for triplet in &mature_redelegations {
        keeper.complete_redelegation(
            ctx,
            &triplet.delegator_address,
            &triplet.validator_src_address,
            &triplet.validator_dst_address,
        )?;
    }

    if !updates.is_empty() || !mature_unbondings.is_empty() || !mature_redelegations.is_empty() {
        info!(
            "End block {}: {} validator updates, {} unbondings and {} redelegations matured",
            ctx.height(),
            updates.len(),
            mature_unbondings.len(),
            mature_redelegations.len()
        );
    }
    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keeper::testutil::*;
    use crate::validator::BondStatus;
    use bastion_store::MemStore;
    use rust_decimal_macros::dec;

    #[test]
    fn test_end_block_reports_new_validator() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut c = ctx(&mut store, 1);
        k.set_params(&mut c, &unit_params()).unwrap();
        create_validator(&k, &mut c, 1, 100);
        begin_block(&k, &mut c).unwrap();
        let updates = end_block(&k, &mut c).unwrap();
        assert_eq!(updates, vec![ValidatorUpdate { pub_key: pubkey(1), power: 100 }]);
        assert!(end_block(&k, &mut c).unwrap().is_empty());
    }

    #[test]
    fn test_unbonding_pays_out_after_maturity() {
        let k = keeper();
        let mut store = MemStore::new();
        {
            let mut c = ctx(&mut store, 1);
            k.set_params(&mut c, &unit_params()).unwrap();
            create_validator(&k, &mut c, 1, 100);
            fund(&mut c, &addr(5), 50);
            k.delegate(&mut c, &addr(5), 50, BondStatus::Unbonded, &addr(1), true).unwrap();
            end_block(&k, &mut c).unwrap();
            k.undelegate(&mut c, &addr(5), &addr(1), dec!(50)).unwrap();
        }
        // Unbonding time is 100s and blocks are 5s apart: matures at height 21.
        {
            let mut c = ctx(&mut store, 20);
            end_block(&k, &mut c).unwrap();
            assert_eq!(balance(&c, &addr(5)), 0);
        }
        let mut c = ctx(&mut store, 21);
        end_block(&k, &mut c).unwrap();
        assert_eq!(balance(&c, &addr(5)), 50);
        assert!(k.get_unbonding_delegation(&c, &addr(5), &addr(1)).unwrap().is_none());
    }

    #[test]
    fn test_displaced_validator_unbonds_then_matures() {
        let k = keeper();
        let mut store = MemStore::new();
        {
            let mut c = ctx(&mut store, 1);
            let params = crate::params::Params {
                max_validators: 1,
                ..unit_params()
            };
            k.set_params(&mut c, &params).unwrap();
            create_validator(&k, &mut c, 1, 100);
            end_block(&k, &mut c).unwrap();
        }
        {
            let mut c = ctx(&mut store, 2);
            create_validator(&k, &mut c, 2, 200);
            let updates = end_block(&k, &mut c).unwrap();
            assert_eq!(
                updates,
                vec![
                    ValidatorUpdate { pub_key: pubkey(2), power: 200 },
                    ValidatorUpdate { pub_key: pubkey(1), power: 0 },
                ]
            );
            assert!(k.must_get_validator(&c, &addr(1)).unwrap().is_unbonding());
        }
        let mut c = ctx(&mut store, 22);
        end_block(&k, &mut c).unwrap();
        assert!(k.must_get_validator(&c, &addr(1)).unwrap().is_unbonded());
    }
}
