use serde::{Deserialize, Serialize};
use std::fmt;

/// Observed type of a column across a corpus.
///
/// Starts out numeric with zero width. Any value that does not parse as an
/// integer turns it into text for good, and the width only ever grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableType {
    pub is_numeric: bool,
    pub max_width: usize,
}

impl Default for VariableType {
    fn default() -> Self {
        VariableType {
            is_numeric: true,
            max_width: 0,
        }
    }
}

impl VariableType {
    pub fn new(is_numeric: bool, max_width: usize) -> Self {
        VariableType {
            is_numeric,
            max_width,
        }
    }

    /// Fold one observed value into the type
    pub fn observe(&mut self, value: &str) {
        if self.is_numeric && value.parse::<i32>().is_err() {
            self.is_numeric = false;
        }
        self.max_width = self.max_width.max(value.chars().count());
    }

    /// Widen in place so the type also covers `other`
    pub fn widen(&mut self, other: VariableType) {
        self.is_numeric &= other.is_numeric;
        self.max_width = self.max_width.max(other.max_width);
    }

    pub fn union(mut self, other: VariableType) -> VariableType {
        self.widen(other);
        self
    }

    /// Type covering every value in `values`
    pub fn of<'a, I: IntoIterator<Item = &'a str>>(values: I) -> VariableType {
        let mut ty = VariableType::default();
        for value in values {
            ty.observe(value);
        }
        ty
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_numeric { "numeric" } else { "text" };
        write!(f, "{}({})", kind, self.max_width)
    }
}
