//! Locator - a selector bound to a root, with bounded waits

use crate::deadline::{self, Deadline};
use crate::element::UIElement;
use crate::error::{Error, Result};
use crate::search::{self, Lineage, DEFAULT_DEPTH};
use crate::selector::Selector;

#[derive(Debug, Clone)]
pub struct Locator {
    selector: Selector,
    root: UIElement,
    max_depth: usize,
}

impl Locator {
    pub fn new(root: UIElement, selector: Selector) -> Self {
        Self {
            selector,
            root,
            max_depth: DEFAULT_DEPTH,
        }
    }

    pub fn parse(root: UIElement, selector: &str) -> Result<Self> {
        Ok(Self::new(root, Selector::parse(selector)?))
    }

    pub fn depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    fn not_found(&self) -> Error {
        Error::control_not_found(&self.selector.to_string()).with_context(serde_json::json!({
            "root": self.root.info(),
            "max_depth": self.max_depth,
        }))
    }

    /// Exactly one match.
    pub fn find(&self) -> Result<UIElement> {
        let mut elements = self.find_all();

        if elements.len() > 1 {
            return Err(Error::multiple_matches(&self.selector.to_string(), elements.len())
                .with_suggestions(vec![
                    "Add more conditions to narrow the match".to_string(),
                    "Search from a narrower root, such as the detail pane".to_string(),
                ])
                .with_context(serde_json::json!({
                    "matches": elements.iter().map(|e| e.info()).collect::<Vec<_>>()
                })));
        }

        elements.pop().ok_or_else(|| self.not_found())
    }

    /// First match in pre-order.
    pub fn find_first(&self) -> Result<UIElement> {
        let selector = &self.selector;
        search::first_descendant(&self.root, |e| selector.matches(e), self.max_depth)
            .ok_or_else(|| self.not_found())
    }

    pub fn find_all(&self) -> Vec<UIElement> {
        let selector = &self.selector;
        search::all_descendants(&self.root, |e| selector.matches(e), self.max_depth)
    }

    pub fn find_with_lineage(&self) -> Result<Lineage> {
        let selector = &self.selector;
        search::first_descendant_with_lineage(&self.root, |e| selector.matches(e), self.max_depth)
            .ok_or_else(|| self.not_found())
    }

    pub fn exists(&self) -> bool {
        self.find_first().is_ok()
    }

    /// Poll until the first match appears.
    pub async fn wait(&self, deadline: Deadline) -> Result<UIElement> {
        let mut found = None;
        deadline::wait_until(deadline, || {
            found = self.find_first().ok();
            found.is_some()
        })
        .await;
        found.ok_or_else(|| self.not_found())
    }

    pub fn wait_blocking(&self, deadline: Deadline) -> Result<UIElement> {
        let mut found = None;
        deadline::wait_until_blocking(deadline, || {
            found = self.find_first().ok();
            found.is_some()
        });
        found.ok_or_else(|| self.not_found())
    }

    pub async fn wait_gone(&self, deadline: Deadline) -> Result<()> {
        let budget = deadline.remaining_ms();
        if deadline::wait_until(deadline, || !self.exists()).await {
            Ok(())
        } else {
            Err(Error::verification_timeout(
                &format!("{} to disappear", self.selector),
                budget,
            ))
        }
    }
}
