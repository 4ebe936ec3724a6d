//! The per-conversion alias registry.
//!
//! Aliases are canonical positive forms: a single positive match, an IN
//! fold of positive matches on one argument, or the IS-NOT-NULL companion
//! of an argument. A negation in the input maps to the positive alias plus
//! a negative reference; an AND-of-negations collapses to the positive IN
//! alias plus a negative reference.
//!
//! Names are sequential (`a001`, `a002`, ...) in creation order, which the
//! emitter also uses as the deterministic output order.

use crate::catalog::MappingCatalog;
use crate::conditions::MatchCondition;
use std::collections::HashMap;
#[cfg(feature = "tracing")]
use tracing::debug;

/// What the alias's positive expression is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AliasKind {
    /// A single positive match.
    Plain,
    /// An IN fold of positive equality matches on one argument.
    In,
    /// The IS-NOT-NULL companion used for strict negation and IS UNKNOWN.
    NotNullHelper,
}

/// A named positive sub-query with reference counts against the WHERE
/// skeleton.
#[derive(Debug, Clone)]
pub(crate) struct Alias {
    pub name: String,
    pub table: String,
    pub condition: MatchCondition,
    pub kind: AliasKind,
    pub pos_refs: u32,
    pub neg_refs: u32,
    /// Fulfillment of this alias is required for the root to hold.
    pub required: bool,
}

#[derive(Debug, Default)]
pub(crate) struct AliasRegistry {
    aliases: Vec<Alias>,
    by_key: HashMap<String, usize>,
}

impl AliasRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the alias index for the canonical condition, creating it on
    /// first use.
    pub(crate) fn get_or_create(&mut self, condition: MatchCondition, kind: AliasKind) -> usize {
        if let Some(&idx) = self.by_key.get(&condition.key) {
            return idx;
        }
        let idx = self.aliases.len();
        let name = format!("a{:03}", idx + 1);
        #[cfg(feature = "tracing")]
        debug!(alias = %name, key = %condition.key, "creating alias");
        self.by_key.insert(condition.key.clone(), idx);
        self.aliases.push(Alias {
            name,
            table: condition.table.clone(),
            condition,
            kind,
            pos_refs: 0,
            neg_refs: 0,
            required: false,
        });
        idx
    }

    pub(crate) fn register_pos(&mut self, idx: usize) {
        self.aliases[idx].pos_refs += 1;
    }

    pub(crate) fn register_neg(&mut self, idx: usize) {
        self.aliases[idx].neg_refs += 1;
    }

    pub(crate) fn mark_required(&mut self, idx: usize) {
        self.aliases[idx].required = true;
    }

    pub(crate) fn get(&self, idx: usize) -> &Alias {
        &self.aliases[idx]
    }

    pub(crate) fn len(&self) -> usize {
        self.aliases.len()
    }

    /// Whether the alias may contribute to a union-based base query. An
    /// alias referenced positively cannot act as union member when it is
    /// also referenced negatively or when its positive form is the
    /// IS-NOT-NULL companion; both need a full-table substitute.
    pub(crate) fn union_eligible(&self, idx: usize) -> bool {
        let alias = &self.aliases[idx];
        !(alias.pos_refs > 0
            && (alias.neg_refs > 0 || alias.kind == AliasKind::NotNullHelper))
    }

    /// Picks the alias whose fulfillment is required for the root, whose
    /// sign usage does not require both polarities, and that is eligible as
    /// a base query. Among candidates the most condition-heavy one wins,
    /// but a candidate running on the primary table takes precedence.
    pub(crate) fn determine_primary(
        &self,
        catalog: &MappingCatalog,
        blocked: bool,
    ) -> Option<usize> {
        if blocked {
            return None;
        }
        let primary_table = catalog.primary_table().map(|t| t.name.as_str());
        let candidates: Vec<usize> = self
            .aliases
            .iter()
            .enumerate()
            .filter(|(idx, alias)| {
                alias.required
                    && alias.pos_refs > 0
                    && alias.neg_refs == 0
                    && alias.kind != AliasKind::NotNullHelper
                    && self.union_eligible(*idx)
            })
            .map(|(idx, _)| idx)
            .collect();

        let best = |indexes: &[usize]| -> Option<usize> {
            indexes
                .iter()
                .copied()
                .max_by(|a, b| {
                    let ca = self.aliases[*a].condition.complexity();
                    let cb = self.aliases[*b].condition.complexity();
                    // On equal complexity prefer the earlier (lower) name.
                    ca.cmp(&cb).then(b.cmp(a))
                })
        };

        let on_primary: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|idx| Some(self.aliases[*idx].table.as_str()) == primary_table)
            .collect();
        if !on_primary.is_empty() {
            return best(&on_primary);
        }
        best(&candidates)
    }
}
