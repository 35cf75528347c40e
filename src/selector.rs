//! Per-attempt identity and hardware id selection.

use rand::Rng;
use serde::Serialize;

use crate::credentials::CredentialSet;
use crate::mac::{HardwareId, MacPool};

/// Everything one attempt needs to know about who it pretends to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptParameters {
    pub identity: String,
    #[serde(skip_serializing)]
    pub secret: String,
    pub hardware_id: Option<HardwareId>,
}

/// Pick a credential uniformly at random and attach a hardware id.
///
/// A credential's static id always wins. Otherwise one id is drawn
/// uniformly from `macs`, or none when the pool is empty. The function
/// holds no state of its own; pass a seeded RNG for reproducible picks.
pub fn select<R: Rng + ?Sized>(
    credentials: &CredentialSet,
    macs: &MacPool,
    rng: &mut R,
) -> AttemptParameters {
    let idx = rng.gen_range(0..credentials.len());
    // CredentialSet is non-empty by construction.
    let cred = &credentials.as_slice()[idx];

    let hardware_id = match cred.hardware_id {
        Some(id) => Some(id),
        None if !macs.is_empty() => macs.get(rng.gen_range(0..macs.len())).copied(),
        None => None,
    };

    AttemptParameters {
        identity: cred.identity.clone(),
        secret: cred.secret.clone(),
        hardware_id,
    }
}
