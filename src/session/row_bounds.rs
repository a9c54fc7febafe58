use serde::{Deserialize, Serialize};

pub const NO_ROW_OFFSET: usize = 0;
pub const NO_ROW_LIMIT: usize = i32::MAX as usize;

/// Offset/limit window applied to a query result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowBounds {
    pub offset: usize,
    pub limit: usize,
}

impl RowBounds {
    /// Every row
    pub const DEFAULT: Self = Self::new(NO_ROW_OFFSET, NO_ROW_LIMIT);

    #[must_use]
    pub const fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    #[must_use]
    pub const fn is_default(&self) -> bool {
        self.offset == NO_ROW_OFFSET && self.limit == NO_ROW_LIMIT
    }
}

impl Default for RowBounds {
    fn default() -> Self {
        Self::DEFAULT
    }
}
