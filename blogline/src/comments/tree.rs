//! Flat comment list to reply forest.
//!
//! Comments live in an arena in arrival order; each node stores the arena
//! indices of its direct replies. Construction is linear: one grouping pass,
//! one iterative attach pass, one pass to break any parent cycles.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::{Comment, CommentId};

/// Why a comment with a parent reference ended up at the top level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Promotion {
    /// The parent is missing from the list or belongs to another post.
    Orphan,
    /// The comment sat on a parent cycle and was chosen to break it.
    BrokenCycle,
}

/// Reply forest derived from a flat comment list. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct CommentTree {
    comments: Vec<Comment>,
    children: Vec<Vec<usize>>,
    promotions: Vec<Option<Promotion>>,
    roots: Vec<usize>,
    index: HashMap<CommentId, usize>,
}

/// Owned, fully materialised node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentNode {
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

/// Borrowed view of one node in a [`CommentTree`].
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a CommentTree,
    index: usize,
}

impl<'a> NodeRef<'a> {
    pub fn comment(&self) -> &'a Comment {
        &self.tree.comments[self.index]
    }

    pub fn id(&self) -> CommentId {
        self.comment().id
    }

    pub fn promotion(&self) -> Option<Promotion> {
        self.tree.promotions[self.index]
    }

    pub fn children(&self) -> impl DoubleEndedIterator<Item = NodeRef<'a>> + ExactSizeIterator + 'a {
        let tree = self.tree;
        tree.children[self.index].iter().map(move |&index| NodeRef { tree, index })
    }

    pub fn reply_count(&self) -> usize {
        self.tree.children[self.index].len()
    }
}

fn attach(start: usize, grouped: &[Vec<usize>], visited: &mut [bool], children: &mut [Vec<usize>]) {
    visited[start] = true;
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        for &child in &grouped[node] {
            if !visited[child] {
                visited[child] = true;
                children[node].push(child);
                stack.push(child);
            }
        }
    }
}

impl CommentTree {
    /// Builds the forest for one post's comments.
    ///
    /// Top-level nodes and every sibling list keep input order. A reply whose
    /// parent is absent (never existed, was deleted, or lives on another post)
    /// is promoted to the top level. Comments caught in a parent cycle still
    /// appear exactly once: the first cycle member reached from the earliest
    /// unattached comment becomes a top-level node.
    pub fn build(comments: &[Comment]) -> Self {
        let count = comments.len();
        let mut index: HashMap<CommentId, usize> = HashMap::with_capacity(count);
        for (position, comment) in comments.iter().enumerate() {
            index.entry(comment.id).or_insert(position);
        }

        let parent_of: Vec<Option<usize>> = comments
            .iter()
            .map(|comment| {
                comment
                    .parent_comment_id
                    .and_then(|parent_id| index.get(&parent_id).copied())
                    .filter(|&parent| comments[parent].post_id == comment.post_id)
            })
            .collect();

        let mut grouped: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut promotions: Vec<Option<Promotion>> = vec![None; count];
        let mut is_root = vec![false; count];
        for (position, parent) in parent_of.iter().enumerate() {
            match parent {
                Some(parent) => grouped[*parent].push(position),
                None => {
                    is_root[position] = true;
                    if let Some(missing) = comments[position].parent_comment_id {
                        log::debug!(
                            "comment {} promoted to top level: parent {missing} not in thread",
                            comments[position].id
                        );
                        promotions[position] = Some(Promotion::Orphan);
                    }
                }
            }
        }

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut visited = vec![false; count];
        for position in 0..count {
            if is_root[position] {
                attach(position, &grouped, &mut visited, &mut children);
            }
        }

        // Whatever is still unattached hangs off a parent cycle. An unattached
        // comment always has an unattached parent, so walking parent links
        // must revisit a node; that node is on the cycle.
        let mut walk_mark = vec![usize::MAX; count];
        for start in 0..count {
            if visited[start] {
                continue;
            }
            let mut cursor = start;
            while walk_mark[cursor] != start {
                walk_mark[cursor] = start;
                match parent_of[cursor] {
                    Some(parent) => cursor = parent,
                    None => break,
                }
            }
            log::warn!("comment {} breaks a reply cycle and is shown at top level", comments[cursor].id);
            is_root[cursor] = true;
            promotions[cursor] = Some(Promotion::BrokenCycle);
            attach(cursor, &grouped, &mut visited, &mut children);
        }

        let roots = (0..count).filter(|&position| is_root[position]).collect();

        Self {
            comments: comments.to_vec(),
            children,
            promotions,
            roots,
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn roots(&self) -> impl DoubleEndedIterator<Item = NodeRef<'_>> + ExactSizeIterator + '_ {
        self.roots.iter().map(move |&index| NodeRef { tree: self, index })
    }

    pub fn get(&self, id: CommentId) -> Option<NodeRef<'_>> {
        self.index.get(&id).map(|&index| NodeRef { tree: self, index })
    }

    /// Pre-order walk yielding each node with its depth (top level is 0).
    pub fn depth_first(&self) -> Vec<(NodeRef<'_>, usize)> {
        let mut ordered = Vec::with_capacity(self.comments.len());
        let mut stack: Vec<(usize, usize)> = self.roots.iter().rev().map(|&index| (index, 0)).collect();
        while let Some((index, depth)) = stack.pop() {
            ordered.push((NodeRef { tree: self, index }, depth));
            stack.extend(self.children[index].iter().rev().map(|&child| (child, depth + 1)));
        }
        ordered
    }

    /// Pre-order flat list of the comments.
    pub fn flatten(&self) -> Vec<Comment> {
        self.depth_first()
            .into_iter()
            .map(|(node, _)| node.comment().clone())
            .collect()
    }

    /// Owned copy of the forest. Built bottom-up so depth is not limited by the call stack.
    pub fn nodes(&self) -> Vec<CommentNode> {
        let order = self.depth_first();
        let mut built: Vec<Option<CommentNode>> = vec![None; self.comments.len()];
        for (node, _) in order.iter().rev() {
            let replies = self.children[node.index]
                .iter()
                .filter_map(|&child| built[child].take())
                .collect();
            built[node.index] = Some(CommentNode {
                comment: node.comment().clone(),
                replies,
            });
        }
        self.roots.iter().filter_map(|&root| built[root].take()).collect()
    }
}
