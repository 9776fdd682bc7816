// crates/bastion-staking/src/events.rs
//
// Event types and attribute keys emitted by the staking engine.

pub const EVENT_TYPE_CREATE_VALIDATOR: &str = "create_validator";
pub const EVENT_TYPE_EDIT_VALIDATOR: &str = "edit_validator";
pub const EVENT_TYPE_DELEGATE: &str = "delegate";
pub const EVENT_TYPE_UNBOND: &str = "unbond";
pub const EVENT_TYPE_CANCEL_UNBONDING_DELEGATION: &str = "cancel_unbonding_delegation";
pub const EVENT_TYPE_REDELEGATE: &str = "redelegate";
pub const EVENT_TYPE_ROTATE_CONS_PUBKEY: &str = "rotate_cons_pubkey";
pub const EVENT_TYPE_COMPLETE_UNBONDING: &str = "complete_unbonding";
pub const EVENT_TYPE_COMPLETE_REDELEGATION: &str = "complete_redelegation";
pub const EVENT_TYPE_SLASH: &str = "slash";
pub const EVENT_TYPE_JAIL: &str = "jail";
pub const EVENT_TYPE_UNJAIL: &str = "unjail";
pub const EVENT_TYPE_VALIDATOR_STATUS: &str = "validator_status";
pub const EVENT_TYPE_TRANSFER: &str = "transfer";
pub const EVENT_TYPE_BURN: &str = "burn";
pub const EVENT_TYPE_MINT: &str = "mint";

pub const ATTRIBUTE_KEY_VALIDATOR: &str = "validator";
pub const ATTRIBUTE_KEY_SRC_VALIDATOR: &str = "source_validator";
pub const ATTRIBUTE_KEY_DST_VALIDATOR: &str = "destination_validator";
pub const ATTRIBUTE_KEY_DELEGATOR: &str = "delegator";
pub const ATTRIBUTE_KEY_AMOUNT: &str = "amount";
pub const ATTRIBUTE_KEY_NEW_SHARES: &str = "new_shares";
pub const ATTRIBUTE_KEY_COMPLETION_TIME: &str = "completion_time";
pub const ATTRIBUTE_KEY_CREATION_HEIGHT: &str = "creation_height";
pub const ATTRIBUTE_KEY_COMMISSION_RATE: &str = "commission_rate";
pub const ATTRIBUTE_KEY_MIN_SELF_DELEGATION: &str = "min_self_delegation";
pub const ATTRIBUTE_KEY_CONS_ADDRESS: &str = "cons_address";
pub const ATTRIBUTE_KEY_INFRACTION_HEIGHT: &str = "infraction_height";
pub const ATTRIBUTE_KEY_POWER: &str = "power";
pub const ATTRIBUTE_KEY_SLASH_FACTOR: &str = "slash_factor";
pub const ATTRIBUTE_KEY_BURNED: &str = "burned";
pub const ATTRIBUTE_KEY_STATUS: &str = "status";
pub const ATTRIBUTE_KEY_SENDER: &str = "sender";
pub const ATTRIBUTE_KEY_RECIPIENT: &str = "recipient";
