//! Render groups, render sequences, and the fixed tables mapping one to the other.
//!
//! Callers tag every primitive with a [`RenderPrimitiveGroup`]. Together with
//! the material's blend flag, the group selects exactly one
//! [`RenderPrimitiveSequence`]. Sequences are drawn in declaration order.

/// Logical layer a primitive belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderPrimitiveGroup {
    Cab,
    Sky,
    World,
    Lights,
    Precipitation,
    Particles,
    Interior,
    Labels,
    Overlay,
}

impl RenderPrimitiveGroup {
    /// Number of groups.
    pub const COUNT: usize = 9;

    /// All groups in declaration order.
    pub const ALL: [RenderPrimitiveGroup; Self::COUNT] = [
        Self::Cab,
        Self::Sky,
        Self::World,
        Self::Lights,
        Self::Precipitation,
        Self::Particles,
        Self::Interior,
        Self::Labels,
        Self::Overlay,
    ];

    /// Position of this group in [`Self::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// A draw bucket. The declaration order is the draw order.
///
/// The cab is drawn first when opaque (it hides most of the screen, so its
/// depth rejects a lot of world pixels) but after the world and interior when
/// blended, so cab windows composite over everything outside.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderPrimitiveSequence {
    CabOpaque,
    Sky,
    WorldOpaque,
    WorldBlended,
    Lights,
    Precipitation,
    Particles,
    InteriorOpaque,
    InteriorBlended,
    Labels,
    CabBlended,
    OverlayOpaque,
    OverlayBlended,
}

impl RenderPrimitiveSequence {
    /// Number of sequences.
    pub const COUNT: usize = 13;

    /// All sequences in draw order.
    pub const ALL: [RenderPrimitiveSequence; Self::COUNT] = [
        Self::CabOpaque,
        Self::Sky,
        Self::WorldOpaque,
        Self::WorldBlended,
        Self::Lights,
        Self::Precipitation,
        Self::Particles,
        Self::InteriorOpaque,
        Self::InteriorBlended,
        Self::Labels,
        Self::CabBlended,
        Self::OverlayOpaque,
        Self::OverlayBlended,
    ];

    /// Position of this sequence in [`Self::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Sequence for `group` when the material does not blend.
    pub const fn for_opaque(group: RenderPrimitiveGroup) -> Self {
        SEQUENCE_FOR_OPAQUE[group.index()]
    }

    /// Sequence for `group` when the material blends.
    pub const fn for_blended(group: RenderPrimitiveGroup) -> Self {
        SEQUENCE_FOR_BLENDED[group.index()]
    }

    /// Sequence for `group` given the material's blend flag.
    pub const fn for_group(group: RenderPrimitiveGroup, blended: bool) -> Self {
        if blended {
            Self::for_blended(group)
        } else {
            Self::for_opaque(group)
        }
    }
}

/// Opaque sequence per group, indexed by [`RenderPrimitiveGroup::index`].
pub const SEQUENCE_FOR_OPAQUE: [RenderPrimitiveSequence; RenderPrimitiveGroup::COUNT] = [
    RenderPrimitiveSequence::CabOpaque,
    RenderPrimitiveSequence::Sky,
    RenderPrimitiveSequence::WorldOpaque,
    RenderPrimitiveSequence::Lights,
    RenderPrimitiveSequence::Precipitation,
    RenderPrimitiveSequence::Particles,
    RenderPrimitiveSequence::InteriorOpaque,
    RenderPrimitiveSequence::Labels,
    RenderPrimitiveSequence::OverlayOpaque,
];

/// Blended sequence per group, indexed by [`RenderPrimitiveGroup::index`].
pub const SEQUENCE_FOR_BLENDED: [RenderPrimitiveSequence; RenderPrimitiveGroup::COUNT] = [
    RenderPrimitiveSequence::CabBlended,
    RenderPrimitiveSequence::Sky,
    RenderPrimitiveSequence::WorldBlended,
    RenderPrimitiveSequence::Lights,
    RenderPrimitiveSequence::Precipitation,
    RenderPrimitiveSequence::Particles,
    RenderPrimitiveSequence::InteriorBlended,
    RenderPrimitiveSequence::Labels,
    RenderPrimitiveSequence::OverlayBlended,
];
