//! Simulated client hardware identifiers (Calling-Station-Id values).

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Locally administered address bit of the first octet.
const LOCAL_BIT: u8 = 0x02;
/// Group (multicast) address bit of the first octet.
const MULTICAST_BIT: u8 = 0x01;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid hardware id '{0}': expected six hex octets separated by ':' or '-'")]
pub struct ParseHardwareIdError(pub String);

/// A 6-byte link-layer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HardwareId([u8; 6]);

impl HardwareId {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Generate a random unicast, locally administered address from the OS CSPRNG.
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    pub fn generate_with<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut buf = [0u8; 6];
        rng.fill_bytes(&mut buf);
        buf[0] = (buf[0] | LOCAL_BIT) & !MULTICAST_BIT;
        Self(buf)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_locally_administered(&self) -> bool {
        self.0[0] & LOCAL_BIT != 0
    }
}

impl fmt::Display for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for HardwareId {
    type Err = ParseHardwareIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseHardwareIdError(s.to_string());
        let parts: Vec<&str> = s.trim().split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(err());
        }
        let mut octets = [0u8; 6];
        for (slot, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(err());
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| err())?;
        }
        Ok(Self(octets))
    }
}

impl Serialize for HardwareId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Read-only pool of generated hardware ids.
///
/// Ids are unique and kept in generation order so iteration is stable.
#[derive(Debug, Clone, Default)]
pub struct MacPool {
    ids: Vec<HardwareId>,
}

impl MacPool {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Generate `size` distinct ids from the OS CSPRNG.
    pub fn generate(size: usize) -> Self {
        Self::generate_with(size, &mut OsRng)
    }

    pub fn generate_with<R: RngCore + ?Sized>(size: usize, rng: &mut R) -> Self {
        let mut seen = HashSet::with_capacity(size);
        let mut ids = Vec::with_capacity(size);
        while ids.len() < size {
            let id = HardwareId::generate_with(rng);
            if seen.insert(id) {
                ids.push(id);
            }
        }
        Self { ids }
    }

    /// Build a pool from existing ids, dropping duplicates but keeping first-seen order.
    pub fn from_ids(ids: impl IntoIterator<Item = HardwareId>) -> Self {
        let mut seen = HashSet::new();
        let ids = ids.into_iter().filter(|id| seen.insert(*id)).collect();
        Self { ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&HardwareId> {
        self.ids.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HardwareId> {
        self.ids.iter()
    }
}
