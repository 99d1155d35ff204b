//! Marketplace tags and marketplace sets.
//!
//! A marketplace is a deployment target. Content nodes carry the set of
//! marketplaces they are distributable to; propagation only ever removes
//! tags from that set.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Deployment target for content.
///
/// Closed enum: the set of marketplaces is fixed per release of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Marketplace {
    #[serde(rename = "xsoar")]
    Xsoar,
    #[serde(rename = "marketplacev2")]
    MarketplaceV2,
    #[serde(rename = "xpanse")]
    Xpanse,
}

impl Marketplace {
    /// All known marketplaces.
    pub const ALL: [Marketplace; 3] = [
        Marketplace::Xsoar,
        Marketplace::MarketplaceV2,
        Marketplace::Xpanse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Marketplace::Xsoar => "xsoar",
            Marketplace::MarketplaceV2 => "marketplacev2",
            Marketplace::Xpanse => "xpanse",
        }
    }

    /// Parse a wire-format marketplace name. Unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "xsoar" => Some(Marketplace::Xsoar),
            "marketplacev2" => Some(Marketplace::MarketplaceV2),
            "xpanse" => Some(Marketplace::Xpanse),
            _ => None,
        }
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordered set of marketplace tags.
///
/// Backed by a `BTreeSet` so iteration and serialization are deterministic.
/// Set operations are idempotent and commutative; the propagation engine
/// relies on both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketplaceSet(BTreeSet<Marketplace>);

impl MarketplaceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full set of known marketplaces.
    pub fn all() -> Self {
        Marketplace::ALL.iter().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, marketplace: Marketplace) -> bool {
        self.0.contains(&marketplace)
    }

    /// Insert a tag. Returns `true` if it was not already present.
    pub fn insert(&mut self, marketplace: Marketplace) -> bool {
        self.0.insert(marketplace)
    }

    /// Remove a tag. Returns `true` if it was present.
    pub fn remove(&mut self, marketplace: Marketplace) -> bool {
        self.0.remove(&marketplace)
    }

    /// Union the other set into this one.
    pub fn union_with(&mut self, other: &MarketplaceSet) {
        for mp in other.iter() {
            self.0.insert(mp);
        }
    }

    /// Tags present in both sets.
    pub fn intersection(&self, other: &MarketplaceSet) -> MarketplaceSet {
        self.0.intersection(&other.0).copied().collect()
    }

    /// Whether the two sets share at least one tag.
    pub fn intersects(&self, other: &MarketplaceSet) -> bool {
        self.0.iter().any(|mp| other.0.contains(mp))
    }

    /// Whether every tag of `self` is also in `other`.
    pub fn is_subset(&self, other: &MarketplaceSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = Marketplace> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Marketplace> for MarketplaceSet {
    fn from_iter<I: IntoIterator<Item = Marketplace>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Marketplace> for MarketplaceSet {
    fn from(marketplace: Marketplace) -> Self {
        Self(BTreeSet::from([marketplace]))
    }
}

impl fmt::Display for MarketplaceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|mp| mp.as_str()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
