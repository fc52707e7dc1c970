//! Parser configuration.

pub use corelib::WSign;

/// How a hierarchy joint's component field selects animated channels.
///
/// Channels are ordered `tx ty tz qx qy qz`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ComponentLayout {
    /// The field is a count `n <= 6`: the first `n` channels are animated,
    /// the rest come from the base frame.
    #[default]
    Prefix,
    /// The field is a bit mask, bit `i` animating channel `i`
    /// (1, 2, 4 = Tx, Ty, Tz; 8, 16, 32 = Qx, Qy, Qz).
    Flags,
}

impl ComponentLayout {
    /// Which channels are animated, or `None` if `field` is out of range.
    pub fn animated_channels(self, field: u32) -> Option<[bool; 6]> {
        match self {
            ComponentLayout::Prefix if field <= 6 => {
                Some(std::array::from_fn(|i| (i as u32) < field))
            }
            ComponentLayout::Flags if field < 64 => {
                Some(std::array::from_fn(|i| field & (1 << i) != 0))
            }
            _ => None,
        }
    }
}

/// Options for the MD5 mesh and animation parsers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Md5Options {
    pub w_sign: WSign,
    pub component_layout: ComponentLayout,
}

impl Md5Options {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_w_sign(mut self, w_sign: WSign) -> Self {
        self.w_sign = w_sign;
        self
    }

    #[inline]
    pub fn with_component_layout(mut self, layout: ComponentLayout) -> Self {
        self.component_layout = layout;
        self
    }
}

/// Options for the OBJ and MTL parsers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObjOptions {
    /// Escalate unsupported/unknown statements instead of logging and
    /// skipping them.
    pub strict: bool,
}

impl ObjOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}
