use std::fmt;

/// Identifies an isolated world.
///
/// The empty identifier is the primary world. Any other identifier names a secondary
/// dimension instance, such as a pocket realm.
///
/// Chunk coordinates are only comparable within the same dimension. Two dimensions may use
/// the same coordinates for unrelated chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct DimensionId(String);

impl DimensionId {
    /// Creates a new [`DimensionId`].
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier of the primary world.
    #[inline]
    pub const fn primary() -> Self {
        Self(String::new())
    }

    /// Returns whether this is the primary world.
    #[inline]
    pub fn is_primary(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the identifier as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DimensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_primary() {
            f.write_str("<primary>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for DimensionId {
    #[inline]
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DimensionId {
    #[inline]
    fn from(value: String) -> Self {
        Self(value)
    }
}
