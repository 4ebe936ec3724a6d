//! Conversion directives and analyzer hints.
//!
//! Directives are set by the caller to restrict or steer the conversion;
//! hints are derived by the expression analyzer and consumed by the planner.
//! Both live in the same bitset so the process context carries a single flag
//! word that listeners can inspect.

use bitflags::bitflags;

bitflags! {
    /// Flag word shared by caller directives and analyzer hints.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ConversionFlags: u32 {
        // --- caller directives ---

        /// Disable the DATE-to-finer-resolution rewrites (range, after-today).
        const DISABLE_DATE_TIME_ALIGNMENT = 1 << 0;
        /// Reject CONTAINS regardless of column capability.
        const DISABLE_CONTAINS = 1 << 1;
        /// Reject `<` and `>` comparisons.
        const DISABLE_LESS_THAN_GREATER_THAN = 1 << 2;
        /// Reject argument-to-argument comparisons.
        const DISABLE_REFERENCE_MATCHING = 1 << 3;
        /// Forbid union-based base queries.
        const DISABLE_UNION = 1 << 4;
        /// Always start from the configured primary table.
        const ENFORCE_PRIMARY_TABLE = 1 << 5;

        // --- analyzer hints ---

        const NO_IS_UNKNOWN = 1 << 8;
        const NO_REFERENCE_MATCH = 1 << 9;
        const NO_AND = 1 << 10;
        const NO_OR = 1 << 11;
        const NO_MULTI_ROW_SENSITIVITY = 1 << 12;
        const NO_MULTI_ROW_REFERENCE_MATCH = 1 << 13;
        const NO_JOINS_REQUIRED = 1 << 14;
        const LEFT_OUTER_JOINS_REQUIRED = 1 << 15;
        const SINGLE_ATTRIBUTE = 1 << 16;
        const SINGLE_TABLE = 1 << 17;
        const SINGLE_TABLE_CONTAINING_ALL_ROWS = 1 << 18;
        const SIMPLE_CONDITION = 1 << 19;

        /// Mask selecting the caller-directive portion of the word.
        const DIRECTIVES = Self::DISABLE_DATE_TIME_ALIGNMENT.bits()
            | Self::DISABLE_CONTAINS.bits()
            | Self::DISABLE_LESS_THAN_GREATER_THAN.bits()
            | Self::DISABLE_REFERENCE_MATCHING.bits()
            | Self::DISABLE_UNION.bits()
            | Self::ENFORCE_PRIMARY_TABLE.bits();
    }
}

impl ConversionFlags {
    /// Returns only the caller-directive bits.
    pub fn directives(self) -> Self {
        self & Self::DIRECTIVES
    }

    /// Returns only the analyzer-hint bits.
    pub fn hints(self) -> Self {
        self & !Self::DIRECTIVES
    }
}
