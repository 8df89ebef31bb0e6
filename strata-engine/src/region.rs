//! Tier-presence tags and the unified metadata entry.

use std::fmt;

use strata_store::ObjectMeta;

/// Metadata key under which a nested gateway, acting as a far store,
/// publishes its own region set. Plain stores never set it.
pub const REGIONS_TAG: &str = "strata-sys-regions";

// -----------------------------------------------------------------------------
// Region / RegionSet
// -----------------------------------------------------------------------------

/// Which tier holds a usable copy of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// The fast, client-facing tier.
    Near,
    /// The backing tier.
    Far,
    /// A copy visible through a chained far tier.
    Farther,
}

impl Region {
    const fn bit(self) -> u8 {
        match self {
            Self::Near => 0b001,
            Self::Far => 0b010,
            Self::Farther => 0b100,
        }
    }
}

/// A set of [`Region`] tags.
///
/// Three canonical sets matter to the decision engine: [`Self::NEAR_ONLY`],
/// [`Self::FAR_ONLY`] and [`Self::EVERYWHERE`]. Listing translation can
/// additionally produce sets containing [`Region::Farther`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionSet(u8);

impl RegionSet {
    /// No usable copy anywhere.
    pub const EMPTY: Self = Self(0);
    /// Only the near tier holds a usable copy.
    pub const NEAR_ONLY: Self = Self(Region::Near.bit());
    /// Only the far tier holds a usable copy.
    pub const FAR_ONLY: Self = Self(Region::Far.bit());
    /// Only a chained deeper tier holds a usable copy.
    pub const FARTHER_ONLY: Self = Self(Region::Farther.bit());
    /// Both direct tiers hold equal copies.
    pub const EVERYWHERE: Self = Self(Region::Near.bit() | Region::Far.bit());

    /// True if the set contains `region`.
    #[must_use]
    pub const fn contains(self, region: Region) -> bool {
        self.0 & region.bit() != 0
    }

    /// Returns the set with `region` added.
    #[must_use]
    pub const fn with(self, region: Region) -> Self {
        Self(self.0 | region.bit())
    }

    /// Returns the union of two sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// True if the set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Serializes the set as a comma-separated tag list, e.g. `"near,far"`.
    #[must_use]
    pub fn encode(self) -> String {
        let mut tags = Vec::with_capacity(3);
        if self.contains(Region::Near) {
            tags.push("near");
        }
        if self.contains(Region::Far) {
            tags.push("far");
        }
        if self.contains(Region::Farther) {
            tags.push("farther");
        }
        tags.join(",")
    }

    /// Parses a comma-separated tag list; unknown tags are ignored.
    #[must_use]
    pub fn decode(encoded: &str) -> Self {
        let mut set = Self::EMPTY;
        for tag in encoded.split(',') {
            set = match tag.trim() {
                "near" => set.with(Region::Near),
                "far" => set.with(Region::Far),
                "farther" => set.with(Region::Farther),
                _ => set,
            };
        }
        set
    }
}

impl fmt::Debug for RegionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.encode())
    }
}

/// Folds the region set a far-tier listing entry reports into this
/// gateway's view of the world.
///
/// A plain far entry (no [`REGIONS_TAG`]) is a direct far copy. A nested
/// gateway's entry folds: its near-only is our far, its far-only is our
/// farther, anything else is both.
#[must_use]
pub fn translate_regions(far_meta: &ObjectMeta) -> RegionSet {
    let Some(encoded) = far_meta.user_metadata.get(REGIONS_TAG) else {
        return RegionSet::FAR_ONLY;
    };
    let nested = RegionSet::decode(encoded);
    if nested == RegionSet::FAR_ONLY {
        RegionSet::FARTHER_ONLY
    } else if nested == RegionSet::NEAR_ONLY {
        RegionSet::FAR_ONLY
    } else {
        RegionSet::FAR_ONLY.with(Region::Farther)
    }
}

// -----------------------------------------------------------------------------
// TierMeta / TierPage
// -----------------------------------------------------------------------------

/// An entry in the unified namespace: one tier's metadata plus the
/// gateway's view of where copies live.
#[derive(Debug, Clone)]
pub struct TierMeta {
    /// The underlying metadata the entry is presented from.
    pub meta: ObjectMeta,
    /// Which tiers hold a usable copy.
    pub regions: RegionSet,
    /// True when the most recent mutation has not yet been reconciled.
    pub has_pending_marker: bool,
    /// Size of the near-tier pointer itself, when the near entry is a link
    /// standing in for a far object. Distinct from `meta.size`, which is
    /// then the size of the object pointed to.
    pub link_size: Option<u64>,
}

impl TierMeta {
    /// Creates an entry with no pending marker and no link size.
    #[must_use]
    pub const fn new(meta: ObjectMeta, regions: RegionSet) -> Self {
        Self {
            meta,
            regions,
            has_pending_marker: false,
            link_size: None,
        }
    }
}

/// One page of the merged namespace listing.
#[derive(Debug, Clone)]
pub struct TierPage {
    /// Entries in strictly increasing name order.
    pub entries: Vec<TierMeta>,
    /// Continuation token: the last emitted name, present iff truncated.
    pub next: Option<String>,
}
