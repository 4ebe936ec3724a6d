//! The augmentation hook: a listener surface letting embedders observe the
//! emission process, append SQL, override join types and register
//! additional parameters.

use crate::flags::ConversionFlags;
use crate::params::ParameterRegistry;
use crate::types::JoinType;
use std::collections::HashMap;

/// Append-oriented SQL buffer with a small cursor API.
#[derive(Debug, Default)]
pub struct SqlWriter {
    buf: String,
}

impl SqlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, text: impl AsRef<str>) {
        self.buf.push_str(text.as_ref());
    }

    /// Current cursor position (byte length).
    pub fn cursor(&self) -> usize {
        self.buf.len()
    }

    /// Inserts text at a previously captured cursor position.
    pub fn insert_at(&mut self, cursor: usize, text: &str) {
        self.buf.insert_str(cursor, text);
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

/// Process context handed to listener callbacks.
pub struct AugmentationContext<'a> {
    /// The SQL buffer; listeners may append or insert at captured cursors.
    pub sql: &'a mut SqlWriter,
    /// The parameter registry; listeners may register additional
    /// parameters for SQL they append.
    pub params: &'a mut ParameterRegistry,
    /// The run's variables (read-only).
    pub variables: &'a HashMap<String, String>,
    /// Directives and hints of the run.
    pub flags: ConversionFlags,
}

/// Callback surface invoked during SQL emission.
///
/// All methods default to no-ops; implement only what you need.
pub trait AugmentationListener {
    fn on_script_start(&mut self, ctx: &mut AugmentationContext<'_>) {
        let _ = ctx;
    }

    /// Called after the SELECT of each WITH body has been written, before
    /// the closing parenthesis.
    fn on_after_with_select(&mut self, alias: &str, ctx: &mut AugmentationContext<'_>) {
        let _ = (alias, ctx);
    }

    /// Called before the main SELECT is written.
    fn on_before_main_select(&mut self, ctx: &mut AugmentationContext<'_>) {
        let _ = ctx;
    }

    /// Chooses the join type for a joined table or alias; returning the
    /// proposed type keeps the planner's decision.
    fn join_type(
        &mut self,
        target: &str,
        proposed: JoinType,
        ctx: &mut AugmentationContext<'_>,
    ) -> JoinType {
        let _ = (target, ctx);
        proposed
    }

    /// Called after `ON ` has been written, before the id equality.
    fn on_before_on_clause(&mut self, target: &str, ctx: &mut AugmentationContext<'_>) {
        let _ = (target, ctx);
    }

    /// Called before additional ON restrictions are written.
    fn on_before_on_conditions(&mut self, target: &str, ctx: &mut AugmentationContext<'_>) {
        let _ = (target, ctx);
    }

    /// Called after additional ON restrictions have been written.
    fn on_after_on_conditions(&mut self, target: &str, ctx: &mut AugmentationContext<'_>) {
        let _ = (target, ctx);
    }

    fn on_script_end(&mut self, ctx: &mut AugmentationContext<'_>) {
        let _ = ctx;
    }
}

/// The default listener: observes nothing, changes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAugmentation;

impl AugmentationListener for NoAugmentation {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_append_and_insert() {
        let mut writer = SqlWriter::new();
        writer.append("SELECT ");
        let cursor = writer.cursor();
        writer.append("FROM T");
        writer.insert_at(cursor, "* ");
        assert_eq!(writer.as_str(), "SELECT * FROM T");
        assert_eq!(writer.into_string(), "SELECT * FROM T");
    }

    #[test]
    fn default_listener_keeps_proposed_join_type() {
        let mut listener = NoAugmentation;
        let mut writer = SqlWriter::new();
        let mut params = ParameterRegistry::new();
        let variables = HashMap::new();
        let mut ctx = AugmentationContext {
            sql: &mut writer,
            params: &mut params,
            variables: &variables,
            flags: ConversionFlags::empty(),
        };
        let join = listener.join_type("a001", JoinType::LeftOuter, &mut ctx);
        assert_eq!(join, JoinType::LeftOuter);
    }
}
