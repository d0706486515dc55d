use std::collections::HashMap;

use crate::error::TemplateError;
use crate::node::{Child, Node, attributes};

/// State of one render: compiled text of every named node seen so far.
///
/// A pass must not be reused across unrelated renders, since the same block
/// name carries different content in different templates.
#[derive(Debug)]
pub struct RenderPass {
    memo: HashMap<String, String>,
    compiled: HashMap<String, usize>,
    depth: usize,
    max_depth: usize,
}

impl Default for RenderPass {
    fn default() -> Self {
        RenderPass::new(crate::DEFAULT_MAX_DEPTH)
    }
}

impl RenderPass {
    pub fn new(max_depth: usize) -> Self {
        RenderPass {
            memo: HashMap::new(),
            compiled: HashMap::new(),
            depth: 0,
            max_depth,
        }
    }

    /// Compiled text of a named node, if it was compiled in this pass.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.memo.get(name).map(|s| s.as_str())
    }

    /// How many times a node with this name was actually compiled (memo hits excluded).
    pub fn compiled_count(&self, name: &str) -> usize {
        self.compiled.get(name).copied().unwrap_or(0)
    }

    /// A pass with an empty memo that continues this pass's depth budget.
    pub(crate) fn standalone(&self) -> RenderPass {
        RenderPass {
            depth: self.depth,
            ..RenderPass::new(self.max_depth)
        }
    }

    fn descend(&mut self, node: &Node) -> Result<String, TemplateError> {
        self.depth += 1;
        let result = node.compile_with(self);
        self.depth -= 1;
        result
    }

    /// Compile an anonymous node against an empty memo. Anonymous nodes wrap
    /// imported templates, whose block names must not collide with the
    /// importer's or with other imports of the same template.
    ///
    /// The wrapper does not count as a level: its `context` child is one
    /// level below the importing node, as it is while parsing.
    fn descend_isolated(&mut self, node: &Node) -> Result<String, TemplateError> {
        let outer = std::mem::take(&mut self.memo);
        let result = node.compile_with(self);
        self.memo = outer;
        result
    }
}

impl Node {
    /// Render this node in a fresh pass.
    pub fn compile(&self) -> Result<String, TemplateError> {
        self.compile_with(&mut RenderPass::default())
    }

    /// Fail with [`TemplateError::RecursionLimitExceeded`] if compiling this
    /// node in a fresh pass could nest deeper than `max_depth`.
    ///
    /// Levels are counted as [`Node::compile_with`] counts them: named
    /// children one level down, anonymous children and skipped nodes on the
    /// level of their owner.
    pub fn check_depth(&self, max_depth: usize) -> Result<(), TemplateError> {
        self.check_depth_at(0, max_depth)
    }

    fn check_depth_at(&self, depth: usize, max_depth: usize) -> Result<(), TemplateError> {
        if depth > max_depth {
            return Err(TemplateError::RecursionLimitExceeded { limit: max_depth });
        }
        for node in self.child_nodes() {
            let level = if node.is_anonymous() { depth } else { depth + 1 };
            node.check_depth_at(level, max_depth)?;
        }
        for node in &self.skipped {
            node.check_depth_at(depth, max_depth)?;
        }
        Ok(())
    }

    /// Render this node, sharing compiled named nodes through `pass`.
    pub fn compile_with(&self, pass: &mut RenderPass) -> Result<String, TemplateError> {
        if pass.depth > pass.max_depth {
            return Err(TemplateError::RecursionLimitExceeded {
                limit: pass.max_depth,
            });
        }

        let mut result = String::new();
        for child in &self.children {
            match child {
                Child::Text(text) => result.push_str(text),
                Child::Node(node) if node.is_anonymous() => {
                    result.push_str(&pass.descend_isolated(node)?);
                }
                Child::Node(node) => {
                    if let Some(compiled) = pass.memo.get(&node.name) {
                        tracing::trace!(block = %node.name, "reusing compiled block");
                        result.push_str(compiled);
                        continue;
                    }

                    let compiled = pass.descend(node)?;
                    *pass.compiled.entry(node.name.clone()).or_default() += 1;
                    result.push_str(&compiled);
                    // Overwrites anything a same-named placeholder stored meanwhile.
                    pass.memo.insert(node.name.clone(), compiled);
                }
            }
        }

        attributes::inject(result, &self.skipped, pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Options;

    #[test]
    fn named_nodes_compile_once_per_pass() {
        let mut root = Node::new("root", Options::new());
        root.push(Child::Node(Node::with_text("shared", "S", Options::new())));
        root.push(Child::Text("-".into()));
        root.push(Child::Node(Node::with_text("shared", "other", Options::new())));

        let mut pass = RenderPass::default();
        assert_eq!(root.compile_with(&mut pass).unwrap(), "S-S");
        assert_eq!(pass.compiled_count("shared"), 1);
        assert_eq!(pass.get("shared"), Some("S"));
    }

    #[test]
    fn anonymous_nodes_are_never_memoized() {
        let mut root = Node::new("root", Options::new());
        root.push(Child::Node(Node::with_text("", "a", Options::new())));
        root.push(Child::Node(Node::with_text("", "b", Options::new())));
        let mut pass = RenderPass::default();
        assert_eq!(root.compile_with(&mut pass).unwrap(), "ab");
        assert_eq!(pass.get(""), None);
    }

    #[test]
    fn anonymous_nodes_get_their_own_memo() {
        let mut first = Node::new("", Options::new());
        first.push(Child::Node(Node::with_text("title", "A", Options::new())));
        let mut second = Node::new("", Options::new());
        second.push(Child::Node(Node::with_text("title", "B", Options::new())));

        let mut root = Node::new("root", Options::new());
        root.push(Child::Node(Node::with_text("title", "root", Options::new())));
        root.push(Child::Node(first));
        root.push(Child::Node(second));
        root.push(Child::Node(Node::with_text("title", "ignored", Options::new())));

        let mut pass = RenderPass::default();
        assert_eq!(root.compile_with(&mut pass).unwrap(), "rootABroot");
        assert_eq!(pass.compiled_count("title"), 3);
    }

    #[test]
    fn anonymous_wrappers_do_not_count_as_levels() {
        let mut node = Node::new("", Options::new());
        node.push(Child::Node(Node::with_text("leaf", "x", Options::new())));
        for _ in 0..5 {
            let mut wrapper = Node::new("", Options::new());
            wrapper.push(Child::Node(node));
            node = wrapper;
        }
        let mut root = Node::new("root", Options::new());
        root.push(Child::Node(node));

        assert_eq!(root.compile_with(&mut RenderPass::new(1)).unwrap(), "x");
        assert!(root.check_depth(1).is_ok());
        assert!(matches!(
            root.compile_with(&mut RenderPass::new(0)),
            Err(TemplateError::RecursionLimitExceeded { limit: 0 })
        ));
        assert!(root.check_depth(0).is_err());
    }

    #[test]
    fn depth_check_agrees_with_compile() {
        let mut node = Node::with_text("leaf", "x", Options::new());
        for i in 0..4 {
            let mut parent = Node::new(if i % 2 == 0 { String::new() } else { format!("level{}", i) }, Options::new());
            parent.push(Child::Node(node));
            node = parent;
        }
        let mut root = Node::new("root", Options::new());
        root.push(Child::Node(node));

        for limit in 0..6 {
            assert_eq!(
                root.check_depth(limit).is_ok(),
                root.compile_with(&mut RenderPass::new(limit)).is_ok(),
                "limit {}",
                limit
            );
        }
    }

    #[test]
    fn passes_do_not_share_memo() {
        let mut first = Node::new("root", Options::new());
        first.push(Child::Node(Node::with_text("title", "One", Options::new())));
        let mut second = Node::new("root", Options::new());
        second.push(Child::Node(Node::with_text("title", "Two", Options::new())));
        assert_eq!(first.compile().unwrap(), "One");
        assert_eq!(second.compile().unwrap(), "Two");
    }

    #[test]
    fn depth_limit_is_enforced() {
        let mut node = Node::with_text("leaf", "x", Options::new());
        for i in 0..5 {
            let mut parent = Node::new(format!("level{}", i), Options::new());
            parent.push(Child::Node(node));
            node = parent;
        }
        assert!(matches!(
            node.compile_with(&mut RenderPass::new(3)),
            Err(TemplateError::RecursionLimitExceeded { limit: 3 })
        ));
        assert_eq!(node.compile_with(&mut RenderPass::new(5)).unwrap(), "x");
    }
}
