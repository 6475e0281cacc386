use std::collections::HashMap;

use crate::domain::comments::{Comment, PlaceholderComment};
use crate::error::CoreError;

/// Index of a node inside one [`CommentTree`], assigned in insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Comments of one source thread in display order.
///
/// Nodes live in an arena; the synthetic root is implicit and owns
/// `roots`. Every node is appended after its parent, so the structure is
/// acyclic by construction.
#[derive(Debug, Clone, Default)]
pub struct CommentTree {
    nodes: Vec<Comment>,
    children: Vec<Vec<NodeId>>,
    roots: Vec<NodeId>,
    by_source_id: HashMap<String, NodeId>,
}

impl CommentTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_top_level(&mut self, comment: Comment) -> NodeId {
        let id = self.insert(comment);
        self.roots.push(id);
        id
    }

    pub fn push_reply(&mut self, parent: NodeId, comment: Comment) -> Result<NodeId, CoreError> {
        if parent.0 >= self.nodes.len() {
            return Err(CoreError::UnknownParent {
                comment_id: source_id_of(&comment).unwrap_or_default(),
                parent_id: format!("#{}", parent.0),
            });
        }
        let id = self.insert(comment);
        self.children[parent.0].push(id);
        Ok(id)
    }

    /// Places a comment under the already-placed comment whose source id is
    /// `parent_source_id`, or at the top level when it is `None`.
    ///
    /// Parents must appear before their replies; a reference to an unseen
    /// id fails with [`CoreError::UnknownParent`] and leaves the tree
    /// unchanged.
    pub fn push_with_parent_ref(
        &mut self,
        comment: Comment,
        parent_source_id: Option<&str>,
    ) -> Result<NodeId, CoreError> {
        match parent_source_id {
            None => Ok(self.push_top_level(comment)),
            Some(parent_id) => {
                let Some(parent) = self.by_source_id.get(parent_id).copied() else {
                    return Err(CoreError::UnknownParent {
                        comment_id: source_id_of(&comment).unwrap_or_default(),
                        parent_id: parent_id.to_string(),
                    });
                };
                self.push_reply(parent, comment)
            }
        }
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.children
            .get(id.0)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn comment(&self, id: NodeId) -> Option<&Comment> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &PlaceholderComment> {
        self.nodes.iter().filter_map(|comment| match comment {
            Comment::Placeholder(placeholder) => Some(placeholder),
            Comment::Real(_) => None,
        })
    }

    /// Node ids of the subtree rooted at `id` in pre-order, `id` included.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    fn insert(&mut self, comment: Comment) -> NodeId {
        let id = NodeId(self.nodes.len());
        if let Some(source_id) = source_id_of(&comment) {
            self.by_source_id.entry(source_id).or_insert(id);
        }
        self.nodes.push(comment);
        self.children.push(Vec::new());
        id
    }
}

fn source_id_of(comment: &Comment) -> Option<String> {
    comment
        .as_real()
        .map(|real| real.source_comment_id.clone())
}
