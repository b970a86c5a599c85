//! Scoped label resolution for branch targets
//!
//! Branch operands are emitted before their target position is known (the
//! else clause of a conditional, the shared exit of a replayable region),
//! so emission records symbolic targets and resolves them when the scope
//! closes. Scopes do not inherit labels: a target must be defined in the
//! same scope that references it.

use crate::error::{CompileError, CompileResult};
use indexmap::IndexMap;

#[derive(Debug, Default)]
pub struct LabelScope {
    labels: IndexMap<String, u32>,
    targets: Vec<(u32, String)>,
}

impl LabelScope {
    pub fn new() -> Self {
        LabelScope::default()
    }

    /// Records `position` as the definition of `name`.
    pub fn define(&mut self, name: &str, position: u32) {
        let previous = self.labels.insert(name.to_string(), position);
        assert!(
            previous.is_none(),
            "label {name:?} defined twice in the same scope"
        );
    }

    /// Records that the operand word at `at` should become the relative
    /// displacement to `name` once the scope resolves.
    pub fn target(&mut self, at: u32, name: &str) {
        self.targets.push((at, name.to_string()));
    }

    /// Computes `(operand address, displacement)` fixups for every recorded
    /// target. A target whose label was never defined is a fatal error.
    pub fn resolve(self) -> CompileResult<Vec<(u32, i32)>> {
        let mut fixups = Vec::with_capacity(self.targets.len());
        for (at, name) in self.targets {
            let position = *self
                .labels
                .get(&name)
                .ok_or(CompileError::UndefinedLabel { name })?;
            fixups.push((at, position as i32 - at as i32));
        }
        Ok(fixups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_and_backward_targets() {
        let mut scope = LabelScope::new();
        scope.target(2, "EXIT");
        scope.define("LOOP", 4);
        scope.target(7, "LOOP");
        scope.define("EXIT", 10);

        let fixups = scope.resolve().unwrap();
        assert_eq!(fixups, vec![(2, 8), (7, -3)]);
    }

    #[test]
    fn test_undefined_label_is_fatal() {
        let mut scope = LabelScope::new();
        scope.target(0, "NOWHERE");

        let err = scope.resolve().unwrap_err();
        assert!(matches!(err, CompileError::UndefinedLabel { name } if name == "NOWHERE"));
    }

    #[test]
    #[should_panic(expected = "defined twice")]
    fn test_duplicate_label_panics() {
        let mut scope = LabelScope::new();
        scope.define("HERE", 1);
        scope.define("HERE", 2);
    }
}
