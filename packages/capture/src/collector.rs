//! Run-scoped model collector
//!
//! Scripts that want several snapshots of one build call [`CaptureContext::save`]
//! along the way and return [`CaptureContext::drain`] at the end. A fresh
//! context is created for every script execution, so nothing leaks between
//! scripts. A context is single-writer; concurrent runs need one each.

use crate::config::Overrides;

/// A model handle together with its output name and display overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedModel<M> {
    pub model: M,
    /// Output file stem; must be unique within a batch or later images win.
    pub name: String,
    pub overrides: Overrides,
}

impl<M> CapturedModel<M> {
    pub fn new(model: M, name: impl Into<String>, overrides: Overrides) -> Self {
        Self {
            model,
            name: name.into(),
            overrides,
        }
    }
}

/// Models registered by one script execution.
#[derive(Debug)]
pub struct CaptureContext<M> {
    saved: Vec<CapturedModel<M>>,
}

impl<M> CaptureContext<M> {
    pub fn new() -> Self {
        Self { saved: Vec::new() }
    }

    /// Append a capture. Names are not checked for uniqueness here.
    pub fn save(&mut self, model: M, name: impl Into<String>, overrides: Option<Overrides>) {
        self.saved
            .push(CapturedModel::new(model, name, overrides.unwrap_or_default()));
    }

    /// Hand back everything saved since the last drain or clear, in call
    /// order, leaving the context empty.
    pub fn drain(&mut self) -> Vec<CapturedModel<M>> {
        std::mem::take(&mut self.saved)
    }

    pub fn clear(&mut self) {
        self.saved.clear();
    }

    pub fn len(&self) -> usize {
        self.saved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }
}

impl<M> Default for CaptureContext<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn overrides(value: serde_json::Value) -> Overrides {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_drain_returns_saves_in_order() {
        let mut ctx = CaptureContext::new();
        ctx.save("a", "step1", None);
        ctx.save("b", "step2", Some(overrides(json!({ "cadWidth": 500 }))));

        let drained = ctx.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].name, "step1");
        assert_eq!(drained[0].model, "a");
        assert!(drained[0].overrides.is_empty());
        assert_eq!(drained[1].name, "step2");
        assert_eq!(drained[1].overrides["cadWidth"], json!(500));
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_second_drain_is_empty() {
        let mut ctx = CaptureContext::new();
        ctx.save(1, "only", None);

        assert_eq!(ctx.drain().len(), 1);
        assert!(ctx.drain().is_empty());
    }

    #[test]
    fn test_clear_discards_saves() {
        let mut ctx = CaptureContext::new();
        ctx.save(1, "one", None);
        ctx.save(2, "two", None);
        ctx.clear();

        assert_eq!(ctx.len(), 0);
        assert!(ctx.drain().is_empty());
    }

    #[test]
    fn test_duplicate_names_are_kept() {
        let mut ctx = CaptureContext::new();
        ctx.save(1, "same", None);
        ctx.save(2, "same", None);

        let drained = ctx.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1].model, 2);
    }
}
