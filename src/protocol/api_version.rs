#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct ApiVersion(pub i16);

impl ApiVersion {
    pub const fn new(value: i16) -> ApiVersion {
        ApiVersion(value)
    }
}

impl From<i16> for ApiVersion {
    fn from(value: i16) -> Self {
        ApiVersion(value)
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive range of versions an API is supported in.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ApiVersionRange {
    min: ApiVersion,
    max: ApiVersion,
}

impl ApiVersionRange {
    pub const fn new(min: i16, max: i16) -> Self {
        assert!(min <= max);

        Self {
            min: ApiVersion(min),
            max: ApiVersion(max),
        }
    }

    pub fn min(&self) -> ApiVersion {
        self.min
    }

    pub fn max(&self) -> ApiVersion {
        self.max
    }

    pub fn contains(&self, version: ApiVersion) -> bool {
        (self.min..=self.max).contains(&version)
    }

    /// Highest version both sides support, if any.
    pub fn highest_common(&self, other: &Self) -> Option<ApiVersion> {
        let max = self.max.min(other.max);
        let min = self.min.max(other.min);
        (min <= max).then_some(max)
    }
}

impl std::fmt::Display for ApiVersionRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.min, self.max)
    }
}
