// crates/bastion-staking/src/keys.rs
//
// Store key layout.
//
// Every record lives under a one-byte prefix followed by fixed-width
// components, so bytewise key order is the iteration order the engine
// relies on:
//   0x11 | operator                        -> last reported power (u64)
//   0x12                                   -> last total power (u64)
//   0x21 | operator                        -> Validator
//   0x22 | cons address                    -> operator
//   0x23 | !power | creation_height | op   -> operator (power index)
//   0x31 | delegator | validator           -> Delegation
//   0x32 | delegator | validator           -> UnbondingDelegation
//   0x33 | validator | delegator           -> () (by-validator index)
//   0x34 | delegator | src | dst           -> Redelegation
//   0x35 | src | delegator | dst           -> () (slash lookup index)
//   0x36 | dst | delegator | src           -> () (transitive check index)
//   0x41 | time                            -> Vec<DvPair>
//   0x42 | time                            -> Vec<DvvTriplet>
//   0x43 | time | height                   -> Vec<operator>
//   0x50 | height                          -> HistoricalInfo
//   0x51                                   -> Params
//   0x71 | operator                        -> pre-rotation consensus key
//   0x72 | operator                        -> last rotation time
//   0x73 | old cons address                -> operator
//
// Integers are big-endian. Times are 12 bytes: seconds with the sign bit
// flipped (so pre-epoch times still sort first) followed by nanoseconds.

use chrono::{DateTime, Utc};

use bastion_core::{Address, BastionError, ConsAddress, ADDRESS_LEN};

pub const LAST_VALIDATOR_POWER_KEY: u8 = 0x11;
pub const LAST_TOTAL_POWER_KEY: u8 = 0x12;

pub const VALIDATORS_KEY: u8 = 0x21;
pub const VALIDATORS_BY_CONS_ADDR_KEY: u8 = 0x22;
pub const VALIDATORS_BY_POWER_INDEX_KEY: u8 = 0x23;

pub const DELEGATION_KEY: u8 = 0x31;
pub const UNBONDING_DELEGATION_KEY: u8 = 0x32;
pub const UNBONDING_DELEGATION_BY_VAL_INDEX_KEY: u8 = 0x33;
pub const REDELEGATION_KEY: u8 = 0x34;
pub const REDELEGATION_BY_VAL_SRC_INDEX_KEY: u8 = 0x35;
pub const REDELEGATION_BY_VAL_DST_INDEX_KEY: u8 = 0x36;

pub const UNBONDING_QUEUE_KEY: u8 = 0x41;
pub const REDELEGATION_QUEUE_KEY: u8 = 0x42;
pub const VALIDATOR_QUEUE_KEY: u8 = 0x43;

pub const HISTORICAL_INFO_KEY: u8 = 0x50;
pub const PARAMS_KEY: u8 = 0x51;

pub const PENDING_CONS_PUBKEY_ROTATION_KEY: u8 = 0x71;
pub const LAST_CONS_PUBKEY_ROTATION_TIME_KEY: u8 = 0x72;
pub const OLD_CONS_ADDR_TO_OPERATOR_KEY: u8 = 0x73;

/// Encoded width of a time component.
pub const TIME_KEY_LEN: usize = 12;

const POWER_KEY_LEN: usize = 1 + 8 + 8 + ADDRESS_LEN;

fn join(prefix: u8, parts: &[&[u8]]) -> Vec<u8> {
    let len = 1 + parts.iter().map(|p| p.len()).sum::<usize>();
    let mut key = Vec::with_capacity(len);
    key.push(prefix);
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

/// Read the address stored at `offset` in a composite key.
pub fn address_at(key: &[u8], offset: usize) -> Result<Address, BastionError> {
    key.get(offset..offset + ADDRESS_LEN)
        .ok_or_else(|| {
            BastionError::InvalidState(format!(
                "key of {} bytes too short for address at {}",
                key.len(),
                offset
            ))
        })
        .and_then(Address::from_slice)
}

pub fn time_bytes(time: DateTime<Utc>) -> [u8; TIME_KEY_LEN] {
    let secs = (time.timestamp() as u64) ^ (1u64 << 63);
    let mut out = [0u8; TIME_KEY_LEN];
    out[..8].copy_from_slice(&secs.to_be_bytes());
    out[8..].copy_from_slice(&time.timestamp_subsec_nanos().to_be_bytes());
    out
}

pub fn last_validator_power_key(operator: &Address) -> Vec<u8> {
    join(LAST_VALIDATOR_POWER_KEY, &[operator.as_bytes()])
}

pub fn last_total_power_key() -> Vec<u8> {
    vec![LAST_TOTAL_POWER_KEY]
}

pub fn validator_key(operator: &Address) -> Vec<u8> {
    join(VALIDATORS_KEY, &[operator.as_bytes()])
}

pub fn validator_by_cons_addr_key(cons: &ConsAddress) -> Vec<u8> {
    join(VALIDATORS_BY_CONS_ADDR_KEY, &[cons.as_bytes()])
}

/// Power index key. Ascending order yields the highest power first, then
/// the earliest created validator, then the lowest operator bytes.
pub fn power_index_key(power: u64, creation_height: u64, operator: &Address) -> Vec<u8> {
    join(
        VALIDATORS_BY_POWER_INDEX_KEY,
        &[
            &(u64::MAX - power).to_be_bytes(),
            &creation_height.to_be_bytes(),
            operator.as_bytes(),
        ],
    )
}

pub fn operator_from_power_index_key(key: &[u8]) -> Result<Address, BastionError> {
    if key.len() != POWER_KEY_LEN {
        return Err(BastionError::InvalidState(format!(
            "power index key has {} bytes, expected {}",
            key.len(),
            POWER_KEY_LEN
        )));
    }
    address_at(key, 17)
}

pub fn delegation_key(delegator: &Address, validator: &Address) -> Vec<u8> {
    join(DELEGATION_KEY, &[delegator.as_bytes(), validator.as_bytes()])
}

pub fn delegations_prefix(delegator: &Address) -> Vec<u8> {
    join(DELEGATION_KEY, &[delegator.as_bytes()])
}

pub fn unbonding_delegation_key(delegator: &Address, validator: &Address) -> Vec<u8> {
    join(
        UNBONDING_DELEGATION_KEY,
        &[delegator.as_bytes(), validator.as_bytes()],
    )
}

pub fn unbonding_delegations_prefix(delegator: &Address) -> Vec<u8> {
    join(UNBONDING_DELEGATION_KEY, &[delegator.as_bytes()])
}

pub fn unbonding_delegation_by_val_key(validator: &Address, delegator: &Address) -> Vec<u8> {
    join(
        UNBONDING_DELEGATION_BY_VAL_INDEX_KEY,
        &[validator.as_bytes(), delegator.as_bytes()],
    )
}

pub fn unbonding_delegations_by_val_prefix(validator: &Address) -> Vec<u8> {
    join(UNBONDING_DELEGATION_BY_VAL_INDEX_KEY, &[validator.as_bytes()])
}

pub fn redelegation_key(delegator: &Address, src: &Address, dst: &Address) -> Vec<u8> {
    join(
        REDELEGATION_KEY,
        &[delegator.as_bytes(), src.as_bytes(), dst.as_bytes()],
    )
}

pub fn redelegations_prefix(delegator: &Address) -> Vec<u8> {
    join(REDELEGATION_KEY, &[delegator.as_bytes()])
}

pub fn redelegations_from_prefix(delegator: &Address, src: &Address) -> Vec<u8> {
    join(REDELEGATION_KEY, &[delegator.as_bytes(), src.as_bytes()])
}

pub fn redelegation_by_src_key(src: &Address, delegator: &Address, dst: &Address) -> Vec<u8> {
    join(
        REDELEGATION_BY_VAL_SRC_INDEX_KEY,
        &[src.as_bytes(), delegator.as_bytes(), dst.as_bytes()],
    )
}

pub fn redelegations_by_src_prefix(src: &Address) -> Vec<u8> {
    join(REDELEGATION_BY_VAL_SRC_INDEX_KEY, &[src.as_bytes()])
}

pub fn redelegation_by_dst_key(dst: &Address, delegator: &Address, src: &Address) -> Vec<u8> {
    join(
        REDELEGATION_BY_VAL_DST_INDEX_KEY,
        &[dst.as_bytes(), delegator.as_bytes(), src.as_bytes()],
    )
}

/// Redelegations by `delegator` whose destination is `dst`.
pub fn redelegations_by_dst_prefix(dst: &Address, delegator: &Address) -> Vec<u8> {
    join(
        REDELEGATION_BY_VAL_DST_INDEX_KEY,
        &[dst.as_bytes(), delegator.as_bytes()],
    )
}

pub fn unbonding_queue_key(time: DateTime<Utc>) -> Vec<u8> {
    join(UNBONDING_QUEUE_KEY, &[&time_bytes(time)])
}

pub fn redelegation_queue_key(time: DateTime<Utc>) -> Vec<u8> {
    join(REDELEGATION_QUEUE_KEY, &[&time_bytes(time)])
}

pub fn validator_queue_key(time: DateTime<Utc>, height: u64) -> Vec<u8> {
    join(
        VALIDATOR_QUEUE_KEY,
        &[&time_bytes(time), &height.to_be_bytes()],
    )
}

/// Height component of a validator queue key.
pub fn height_from_validator_queue_key(key: &[u8]) -> Result<u64, BastionError> {
    let start = 1 + TIME_KEY_LEN;
    let bytes: [u8; 8] = key
        .get(start..start + 8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            BastionError::InvalidState(format!("validator queue key of {} bytes", key.len()))
        })?;
    Ok(u64::from_be_bytes(bytes))
}

pub fn historical_info_key(height: u64) -> Vec<u8> {
    join(HISTORICAL_INFO_KEY, &[&height.to_be_bytes()])
}

pub fn params_key() -> Vec<u8> {
    vec![PARAMS_KEY]
}

pub fn pending_rotation_key(operator: &Address) -> Vec<u8> {
    join(PENDING_CONS_PUBKEY_ROTATION_KEY, &[operator.as_bytes()])
}

pub fn last_rotation_time_key(operator: &Address) -> Vec<u8> {
    join(LAST_CONS_PUBKEY_ROTATION_TIME_KEY, &[operator.as_bytes()])
}

pub fn old_cons_addr_key(cons: &ConsAddress) -> Vec<u8> {
    join(OLD_CONS_ADDR_TO_OPERATOR_KEY, &[cons.as_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_power_index_orders_by_power_then_height_then_operator() {
        let a = Address([1; 20]);
        let b = Address([2; 20]);
        let mut keys = vec![
            power_index_key(50, 0, &a),
            power_index_key(100, 7, &b),
            power_index_key(100, 3, &b),
            power_index_key(100, 3, &a),
        ];
        keys.sort();
        assert_eq!(keys[0], power_index_key(100, 3, &a));
        assert_eq!(keys[1], power_index_key(100, 3, &b));
        assert_eq!(keys[2], power_index_key(100, 7, &b));
        assert_eq!(keys[3], power_index_key(50, 0, &a));
    }

    #[test]
    fn test_operator_recovered_from_power_key() {
        let op = Address([9; 20]);
        let key = power_index_key(42, 11, &op);
        assert_eq!(operator_from_power_index_key(&key).unwrap(), op);
        assert!(operator_from_power_index_key(&key[..10]).is_err());
    }

    #[test]
    fn test_time_keys_sort_chronologically() {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        let before = epoch - Duration::seconds(5);
        let later = epoch + Duration::nanoseconds(1);
        assert!(time_bytes(before) < time_bytes(epoch));
        assert!(time_bytes(epoch) < time_bytes(later));
    }

    #[test]
    fn test_validator_queue_height_roundtrip() {
        let key = validator_queue_key(DateTime::<Utc>::UNIX_EPOCH, 77);
        assert_eq!(height_from_validator_queue_key(&key).unwrap(), 77);
    }

    #[test]
    fn test_composite_key_addresses() {
        let d = Address([1; 20]);
        let s = Address([2; 20]);
        let t = Address([3; 20]);
        let key = redelegation_by_dst_key(&t, &d, &s);
        assert!(key.starts_with(&redelegations_by_dst_prefix(&t, &d)));
        assert_eq!(address_at(&key, 41).unwrap(), s);
    }
}
