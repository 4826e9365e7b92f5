use std::fmt::{self, Display};

/// Identifies an independent event id space.
///
/// Each [`Registry`][crate::Registry] belongs to exactly one namespace and each namespace is
/// unified separately, producing its own global id space. Typical programs use one namespace
/// for function events and another for user-defined counters.
///
/// Every rank must unify the same set of namespaces, in the same order.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NamespaceId(u16);

impl NamespaceId {
    /// The namespace of function (timer) events.
    pub const FUNCTIONS: Self = Self(0);

    /// The namespace of user-defined counter events.
    pub const COUNTERS: Self = Self(1);

    /// Creates a namespace identifier from a raw value.
    ///
    /// Values 0 and 1 are the predefined [`FUNCTIONS`][Self::FUNCTIONS] and
    /// [`COUNTERS`][Self::COUNTERS] namespaces.
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// The raw value of the identifier.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl Default for NamespaceId {
    fn default() -> Self {
        Self::FUNCTIONS
    }
}

impl Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::FUNCTIONS => write!(f, "functions"),
            Self::COUNTERS => write!(f, "counters"),
            Self(value) => write!(f, "namespace-{value}"),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn predefined_namespaces_are_distinct() {
        assert_ne!(NamespaceId::FUNCTIONS, NamespaceId::COUNTERS);
        assert_eq!(NamespaceId::default(), NamespaceId::FUNCTIONS);
        assert_eq!(NamespaceId::new(1), NamespaceId::COUNTERS);
    }

    #[test]
    fn display_names_namespaces() {
        assert_eq!(NamespaceId::FUNCTIONS.to_string(), "functions");
        assert_eq!(NamespaceId::COUNTERS.to_string(), "counters");
        assert_eq!(NamespaceId::new(7).to_string(), "namespace-7");
    }
}
