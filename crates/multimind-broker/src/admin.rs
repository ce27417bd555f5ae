//! Skill allow-list administration, as driven by the command line.
//!
//! Mutations only act on access keys the client database knows. Listing
//! reads the allow-list alone.

use multimind_skills::{CapabilityRegistry, RegistryError};
use thiserror::Error;
use tracing::info;

use crate::accounts::AccessKeyStore;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("invalid access key, no such hivemind client: {0}")]
    UnknownClient(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

fn require_client(accounts: &dyn AccessKeyStore, access_key: &str) -> Result<(), AdminError> {
    match accounts.lookup(access_key) {
        Some(_) => Ok(()),
        None => Err(AdminError::UnknownClient(access_key.to_string())),
    }
}

/// Allow `skill` for a known client, seeding its defaults first if needed.
pub fn allow_skill(
    accounts: &dyn AccessKeyStore,
    registry: &CapabilityRegistry,
    access_key: &str,
    skill: &str,
) -> Result<Vec<String>, AdminError> {
    require_client(accounts, access_key)?;
    let skills = registry.grant(access_key, skill)?;
    info!(access_key, skill, "Skill allowed for client");
    Ok(skills)
}

/// Disallow `skill` for a known client.
pub fn remove_skill(
    accounts: &dyn AccessKeyStore,
    registry: &CapabilityRegistry,
    access_key: &str,
    skill: &str,
) -> Result<Vec<String>, AdminError> {
    require_client(accounts, access_key)?;
    Ok(registry.remove(access_key, skill)?)
}

pub fn list_skills(
    registry: &CapabilityRegistry,
    access_key: &str,
) -> Result<Vec<String>, AdminError> {
    Ok(registry.list(access_key)?)
}
