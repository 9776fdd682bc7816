// crates/bastion-staking/src/genesis.rs
//
// Genesis state and chain initialisation.
//
// Accounts are funded by minting through the bank; validators are created
// through the CreateValidator handler so they pass exactly the checks a
// transaction would. The returned updates form the initial consensus set.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use bastion_core::{Address, Amount, BastionError, Coin, ConsensusPubKey, Context, PubKeyType};

use crate::bank::MINT_MODULE_NAME;
use crate::error::StakingError;
use crate::keeper::Keeper;
use crate::msg_server::{Msg, MsgServer};
use crate::params::Params;
use crate::validator::{CommissionRates, Description, ValidatorUpdate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: String,
    pub balance: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisValidator {
    /// Encoded operator address; must also appear in `accounts` with enough
    /// balance for `self_bond`.
    pub operator: String,
    #[serde(default = "default_pubkey_type")]
    pub pubkey_type: String,
    pub pubkey_hex: String,
    pub moniker: String,
    pub commission: CommissionRates,
    #[serde(default = "default_min_self_delegation")]
    pub min_self_delegation: Amount,
    pub self_bond: Amount,
}

fn default_pubkey_type() -> String {
    "ed25519".to_string()
}

fn default_min_self_delegation() -> Amount {
    1
}

impl GenesisValidator {
    pub fn pubkey(&self) -> Result<ConsensusPubKey, StakingError> {
        let key_type = PubKeyType::parse(&self.pubkey_type)?;
        let bytes = hex::decode(&self.pubkey_hex).map_err(BastionError::from)?;
        Ok(ConsensusPubKey::from_type_and_bytes(key_type, &bytes)?)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenesisState {
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub accounts: Vec<GenesisAccount>,
    #[serde(default)]
    pub validators: Vec<GenesisValidator>,
}

impl GenesisState {
    /// Stateless checks: valid params, no duplicate accounts or operators,
    /// and well-formed validator keys.
    pub fn validate(&self) -> Result<(), StakingError> {
        self.params.validate()?;
        let mut accounts = HashSet::new();
        for account in &self.accounts {
            if !accounts.insert(account.address.as_str()) {
                return Err(StakingError::InvalidParams(format!(
                    "duplicate genesis account {}",
                    account.address
                )));
            }
        }
        let mut operators = HashSet::new();
        for validator in &self.validators {
            if !operators.insert(validator.operator.as_str()) {
                return Err(StakingError::InvalidParams(format!(
                    "duplicate genesis validator {}",
                    validator.operator
                )));
            }
            if validator.self_bond == 0 {
                return Err(StakingError::InvalidParams(format!(
                    "genesis validator {} has no self bond",
                    validator.operator
                )));
            }
            validator.pubkey()?;
        }
        Ok(())
    }
}

/// Initialise staking state from `genesis` and return the initial
/// validator-set updates.
pub fn init_genesis(
    keeper: &Keeper,
    ctx: &mut Context<'_>,
    genesis: &GenesisState,
) -> Result<Vec<ValidatorUpdate>, StakingError> {
    genesis.validate()?;
    keeper.set_params(ctx, &genesis.params)?;
    let denom = genesis.params.bond_denom.clone();

    for account in &genesis.accounts {
        let address: Address = keeper.codec().decode_address(&account.address)?;
        let coin = Coin::new(denom.clone(), account.balance);
        keeper.bank().mint_coins(ctx, MINT_MODULE_NAME, &coin)?;
        keeper
            .bank()
            .send_coins_from_module_to_account(ctx, MINT_MODULE_NAME, &address, &coin)?;
    }

    let server = MsgServer::new(keeper);
    for validator in &genesis.validators {
        let msg = Msg::CreateValidator {
            description: Description::new(validator.moniker.clone()),
            commission: validator.commission.clone(),
            min_self_delegation: validator.min_self_delegation,
            validator_address: validator.operator.clone(),
            pubkey: validator.pubkey()?,
            value: Coin::new(denom.clone(), validator.self_bond),
        };
        server.handle(ctx, &msg)?;
    }

    let updates = keeper.apply_and_return_validator_set_updates(ctx)?;
    info!(
        "Initialised staking genesis: {} accounts, {} validators, {} bonded",
        genesis.accounts.len(),
        genesis.validators.len(),
        updates.len()
    );
    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keeper::testutil::{self, addr, balance};
    use bastion_core::crypto::Keypair;
    use bastion_store::MemStore;
    use rust_decimal_macros::dec;

    fn genesis(k: &Keeper, keys: &[Keypair]) -> GenesisState {
        let mut state = GenesisState {
            params: testutil::unit_params(),
            ..GenesisState::default()
        };
        for (i, kp) in keys.iter().enumerate() {
            let operator = k.codec().encode(addr(i as u8 + 1).as_bytes());
            state.accounts.push(GenesisAccount {
                address: operator.clone(),
                balance: 1_000,
            });
            state.validators.push(GenesisValidator {
                operator,
                pubkey_type: "ed25519".to_string(),
                pubkey_hex: hex::encode(kp.public_key_bytes()),
                moniker: format!("genesis-{}", i),
                commission: CommissionRates::new(dec!(0.05), dec!(0.2), dec!(0.01)),
                min_self_delegation: 1,
                self_bond: 100 * (i as u64 + 1),
            });
        }
        state
    }

    #[test]
    fn test_init_genesis_bonds_validators() {
        let k = testutil::keeper();
        let keys = vec![Keypair::generate(), Keypair::generate()];
        let state = genesis(&k, &keys);
        let mut store = MemStore::new();
        let mut c = testutil::ctx(&mut store, 1);

        let updates = init_genesis(&k, &mut c, &state).unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].power, 200);
        assert_eq!(updates[0].pub_key, keys[1].consensus_pubkey());
        assert_eq!(balance(&c, &addr(1)), 900);
        assert_eq!(k.get_bonded_validators_by_power(&c).unwrap().len(), 2);
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let k = testutil::keeper();
        let kp = Keypair::generate();
        let mut state = genesis(&k, &[kp]);
        state.validators.push(state.validators[0].clone());
        assert!(matches!(state.validate(), Err(StakingError::InvalidParams(_))));
    }

    #[test]
    fn test_genesis_from_json_defaults() {
        let state: GenesisState = serde_json::from_str(r#"{"accounts": []}"#).unwrap();
        assert_eq!(state.params, Params::default());
        assert!(state.validators.is_empty());
    }
}
