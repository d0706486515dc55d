use crate::error::TemplateError;
use crate::node::{CONTEXT_BLOCK, Child, Node};

impl Node {
    /// Graft this node's named blocks into `parent` and take over its content.
    ///
    /// Every named child (with `context` wrappers also contributing their own
    /// named children) replaces the content of the first same-named block
    /// found in `parent`. A same-named block nested inside the override
    /// receives the parent's original content. Children with no counterpart
    /// in `parent` are kept as skipped nodes for dynamic attributes.
    ///
    /// Options of a matched block are replaced by the override's options; its
    /// descendants keep their own.
    pub fn extend_parent(&mut self, mut parent: Node) -> Result<(), TemplateError> {
        if self.extended {
            return Err(TemplateError::AlreadyExtended(self.name.clone()));
        }
        self.extended = true;

        let mut overrides = Vec::new();
        let own: Vec<Node> = std::mem::take(&mut self.children)
            .into_iter()
            .filter_map(|child| match child {
                Child::Node(node) => Some(node),
                Child::Text(_) => None,
            })
            .collect();
        collect_named(own, &mut overrides);

        for mut node in overrides {
            let name = node.name.clone();
            match parent.find_node_mut(&name) {
                Some(target) => {
                    let original = std::mem::take(&mut target.children);
                    if let Some(placeholder) = node.find_node_mut(&name) {
                        placeholder.children = original;
                    }
                    target.children = node.children;
                    target.options = node.options;
                    tracing::debug!(node = %self.name, block = %name, "block overrides parent");
                }
                None => {
                    tracing::debug!(node = %self.name, block = %name, "block has no target in parent, kept as skipped");
                    self.skipped.push(node);
                }
            }
        }

        self.children = parent.children;
        Ok(())
    }
}

/// Collect named nodes, later names replacing earlier ones in place. A
/// `context` node is collected itself and also contributes copies of its own
/// named children.
fn collect_named(nodes: Vec<Node>, out: &mut Vec<Node>) {
    for node in nodes {
        if node.is_anonymous() {
            continue;
        }

        let inner: Vec<Node> = if node.name == CONTEXT_BLOCK {
            node.child_nodes().cloned().collect()
        } else {
            Vec::new()
        };

        match out.iter_mut().find(|existing| existing.name == node.name) {
            Some(slot) => *slot = node,
            None => out.push(node),
        }
        collect_named(inner, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Options;

    fn block(name: &str, children: Vec<Child>) -> Node {
        let mut node = Node::new(name, Options::new());
        for child in children {
            node.push(child);
        }
        node
    }

    fn text(s: &str) -> Child {
        Child::Text(s.to_string())
    }

    fn layout() -> Node {
        block(
            "",
            vec![
                text("<title>"),
                Child::Node(Node::with_text("title", "Parent", Options::new())),
                text("</title>"),
            ],
        )
    }

    #[test]
    fn override_replaces_named_block() {
        let mut child = block("root", vec![Child::Node(Node::with_text("title", "Child", Options::new()))]);
        child.extend_parent(layout()).unwrap();
        assert_eq!(child.compile().unwrap(), "<title>Child</title>");
        assert!(child.skipped().is_empty());
    }

    #[test]
    fn own_text_is_discarded() {
        let mut child = block("root", vec![text("ignored"), Child::Node(Node::with_text("title", "X", Options::new()))]);
        child.extend_parent(layout()).unwrap();
        assert_eq!(child.compile().unwrap(), "<title>X</title>");
    }

    #[test]
    fn unmatched_block_is_skipped() {
        let mut child = block("root", vec![Child::Node(Node::with_text("class", "box", Options::new()))]);
        child.extend_parent(layout()).unwrap();
        assert_eq!(child.compile().unwrap(), "<title>Parent</title>");
        assert_eq!(child.skipped().len(), 1);
        assert_eq!(child.skipped()[0].name(), "class");
    }

    #[test]
    fn placeholder_receives_parent_content() {
        let placeholder = Node::new("title", Options::new());
        let mut child = block(
            "root",
            vec![Child::Node(block("title", vec![text("Prefix - "), Child::Node(placeholder)]))],
        );
        child.extend_parent(layout()).unwrap();
        assert_eq!(child.compile().unwrap(), "<title>Prefix - Parent</title>");
    }

    #[test]
    fn only_first_nested_placeholder_is_filled() {
        let inner = Node::with_text("title", "dropped", Options::new());
        let middle = block("title", vec![text("B"), Child::Node(inner)]);
        let mut child = block(
            "root",
            vec![Child::Node(block("title", vec![text("A"), Child::Node(middle)]))],
        );
        child.extend_parent(layout()).unwrap();
        assert_eq!(child.compile().unwrap(), "<title>AParent</title>");
    }

    #[test]
    fn options_are_replaced_only_on_matched_block() {
        let mut parent_options = Options::new();
        parent_options.insert("origin".into(), "parent".into());
        let nested = Node::with_text("inner", "i", parent_options.clone());
        let mut parent = block("", vec![]);
        let mut target = block("outer", vec![Child::Node(nested)]);
        target.options = parent_options.clone();
        parent.push(Child::Node(target));

        let mut child_options = Options::new();
        child_options.insert("origin".into(), "child".into());
        let mut override_node = Node::with_text("outer", "o", Options::new());
        override_node.options = child_options.clone();
        let mut child = block("root", vec![Child::Node(override_node)]);
        child.extend_parent(parent).unwrap();

        let outer = child.find_node("outer").unwrap();
        assert_eq!(outer.options, child_options);

        let mut parent = block("", vec![]);
        let nested = Node::with_text("inner", "i", parent_options.clone());
        let mut target = block("outer", vec![Child::Node(nested)]);
        target.options = parent_options.clone();
        parent.push(Child::Node(target));
        let mut override_node = block("outer", vec![Child::Node(Node::new("outer", Options::new()))]);
        override_node.options = child_options.clone();
        let mut child = block("root", vec![Child::Node(override_node)]);
        child.extend_parent(parent).unwrap();

        let inner = child.find_node("inner").unwrap();
        assert_eq!(inner.options, parent_options);
        assert_eq!(child.find_node("outer").unwrap().options, child_options);
    }

    #[test]
    fn context_children_take_part_in_merge() {
        let context = block(
            CONTEXT_BLOCK,
            vec![text("body "), Child::Node(Node::with_text("title", "T", Options::new()))],
        );
        let mut wrapper = block("", vec![Child::Node(context)]);
        let parent = block(
            "",
            vec![
                Child::Node(Node::with_text("title", "default", Options::new())),
                text("|"),
                Child::Node(Node::with_text(CONTEXT_BLOCK, "", Options::new())),
            ],
        );
        wrapper.extend_parent(parent).unwrap();
        assert_eq!(wrapper.compile().unwrap(), "T|body T");
    }

    #[test]
    fn extending_twice_is_rejected() {
        let mut child = block("root", vec![]);
        child.extend_parent(layout()).unwrap();
        assert!(matches!(
            child.extend_parent(layout()),
            Err(TemplateError::AlreadyExtended(name)) if name == "root"
        ));
    }
}
