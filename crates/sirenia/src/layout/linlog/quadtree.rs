//! Barnes-Hut quadtree stored as an index arena.
//!
//! Nodes live in one `Vec` and refer to each other through `u32` handles; [`QuadTree::reset`]
//! truncates the arena without releasing its capacity, so rebuilding the tree every iteration
//! does not reallocate. Every body remembers the leaf that holds it, and [`QuadTree::move_body`]
//! walks the parent handles from that leaf to keep aggregates current without a rebuild.

use crate::geometry::{Point, Vector};

pub(crate) type NodeId = u32;

const NONE: NodeId = u32::MAX;
pub(crate) const ROOT: NodeId = 0;

/// Bodies below this depth are merged into the leaf aggregate instead of splitting further.
pub(crate) const MAX_DEPTH: u8 = 20;

#[derive(Debug, Clone)]
pub(crate) struct QuadNode {
    /// Weighted centroid of every body below this node.
    pub(crate) centroid: Point,
    pub(crate) weight: f64,
    pub(crate) bodies: u32,
    /// Minimum corner of the node's square.
    pub(crate) min: Point,
    pub(crate) width: f64,
    pub(crate) children: [NodeId; 4],
    pub(crate) parent: NodeId,
    /// The single resident body of an unsplit leaf.
    pub(crate) body: Option<usize>,
    pub(crate) depth: u8,
}

impl QuadNode {
    fn empty(min: Point, width: f64, parent: NodeId, depth: u8) -> Self {
        Self {
            centroid: Point::origin(),
            weight: 0.0,
            bodies: 0,
            min,
            width,
            children: [NONE; 4],
            parent,
            body: None,
            depth,
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        self.children.iter().all(|&c| c == NONE)
    }

    pub(crate) fn child_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.iter().copied().filter(|&c| c != NONE)
    }

    fn quadrant(&self, p: Point) -> usize {
        let half = self.width / 2.0;
        let right = p.x >= self.min.x + half;
        let below = p.y >= self.min.y + half;
        usize::from(right) | (usize::from(below) << 1)
    }

    fn child_min(&self, quadrant: usize) -> Point {
        let half = self.width / 2.0;
        Point::new(
            self.min.x + if quadrant & 1 == 1 { half } else { 0.0 },
            self.min.y + if quadrant & 2 == 2 { half } else { 0.0 },
        )
    }

    fn absorb(&mut self, p: Point, w: f64) {
        let total = self.weight + w;
        self.centroid = if total > 0.0 {
            Point::new(
                (self.centroid.x * self.weight + p.x * w) / total,
                (self.centroid.y * self.weight + p.y * w) / total,
            )
        } else {
            p
        };
        self.weight = total;
        self.bodies += 1;
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct QuadTree {
    nodes: Vec<QuadNode>,
    leaf_of: Vec<NodeId>,
}

impl QuadTree {
    /// Empties the tree and sets a new root square; capacity is kept.
    pub(crate) fn reset(&mut self, min: Point, width: f64, body_count: usize) {
        self.nodes.clear();
        self.nodes.push(QuadNode::empty(min, width, NONE, 0));
        self.leaf_of.clear();
        self.leaf_of.resize(body_count, NONE);
    }

    pub(crate) fn node(&self, id: NodeId) -> &QuadNode {
        &self.nodes[id as usize]
    }

    pub(crate) fn root(&self) -> &QuadNode {
        self.node(ROOT)
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn leaf_of(&self, body: usize) -> Option<NodeId> {
        let id = *self.leaf_of.get(body)?;
        (id != NONE).then_some(id)
    }

    /// Handles from `body`'s leaf up to the root, leaf first.
    pub(crate) fn path_of(&self, body: usize, out: &mut Vec<NodeId>) {
        out.clear();
        let mut id = self.leaf_of(body).unwrap_or(NONE);
        while id != NONE {
            out.push(id);
            id = self.nodes[id as usize].parent;
        }
    }

    fn push_child(&mut self, parent: NodeId, quadrant: usize) -> NodeId {
        let p = &self.nodes[parent as usize];
        let child = QuadNode::empty(p.child_min(quadrant), p.width / 2.0, parent, p.depth + 1);
        let id = self.nodes.len() as NodeId;
        self.nodes.push(child);
        self.nodes[parent as usize].children[quadrant] = id;
        id
    }

    pub(crate) fn insert(&mut self, body: usize, p: Point, w: f64) {
        let mut id = ROOT;
        loop {
            let node = &mut self.nodes[id as usize];
            if node.bodies == 0 {
                node.absorb(p, w);
                node.body = Some(body);
                self.leaf_of[body] = id;
                return;
            }

            if node.is_leaf() {
                if node.depth >= MAX_DEPTH {
                    node.absorb(p, w);
                    self.leaf_of[body] = id;
                    return;
                }
                // Split: push the resident body one level down.
                if let Some(resident) = node.body.take() {
                    let (rp, rw) = (node.centroid, node.weight);
                    let q = node.quadrant(rp);
                    let child = self.push_child(id, q);
                    let c = &mut self.nodes[child as usize];
                    c.absorb(rp, rw);
                    c.body = Some(resident);
                    self.leaf_of[resident] = child;
                }
            }

            let node = &mut self.nodes[id as usize];
            node.absorb(p, w);
            let q = node.quadrant(p);
            let next = node.children[q];
            id = if next == NONE {
                self.push_child(id, q)
            } else {
                next
            };
        }
    }

    /// Moves `body` (of weight `w`) from `from` to `to`, updating every aggregate on its path.
    pub(crate) fn move_body(&mut self, body: usize, from: Point, to: Point, w: f64) {
        let shift: Vector = to - from;
        let mut id = self.leaf_of(body).unwrap_or(NONE);
        while id != NONE {
            let node = &mut self.nodes[id as usize];
            if node.weight > 0.0 {
                node.centroid += shift * (w / node.weight);
            }
            id = node.parent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(points: &[(f64, f64)]) -> QuadTree {
        let mut t = QuadTree::default();
        t.reset(Point::new(0.0, 0.0), 8.0, points.len());
        for (i, &(x, y)) in points.iter().enumerate() {
            t.insert(i, Point::new(x, y), 1.0);
        }
        t
    }

    #[test]
    fn root_aggregates_every_body() {
        let t = tree(&[(1.0, 1.0), (7.0, 1.0), (1.0, 7.0), (7.0, 7.0)]);
        let root = t.root();
        assert_eq!(root.bodies, 4);
        assert_eq!(root.weight, 4.0);
        assert_eq!(root.centroid, Point::new(4.0, 4.0));
        assert!(root.children.iter().all(|&c| c != NONE));
        for body in 0..4 {
            let leaf = t.node(t.leaf_of(body).expect("leaf"));
            assert_eq!(leaf.body, Some(body));
            assert_eq!(leaf.width, 4.0);
        }
    }

    #[test]
    fn coincident_bodies_merge_at_the_depth_bound() {
        let t = tree(&[(3.0, 3.0), (3.0, 3.0), (3.0, 3.0)]);
        let leaf_id = t.leaf_of(0).expect("leaf");
        assert_eq!(t.leaf_of(1), Some(leaf_id));
        assert_eq!(t.leaf_of(2), Some(leaf_id));
        let leaf = t.node(leaf_id);
        assert_eq!(leaf.depth, MAX_DEPTH);
        assert_eq!(leaf.bodies, 3);
        assert_eq!(leaf.centroid, Point::new(3.0, 3.0));
    }

    #[test]
    fn move_body_propagates_to_the_root() {
        let mut t = tree(&[(1.0, 1.0), (7.0, 7.0)]);
        t.move_body(0, Point::new(1.0, 1.0), Point::new(3.0, 1.0), 1.0);
        assert_eq!(t.node(t.leaf_of(0).expect("leaf")).centroid, Point::new(3.0, 1.0));
        assert_eq!(t.root().centroid, Point::new(5.0, 4.0));
    }

    #[test]
    fn path_runs_leaf_first_to_the_root() {
        let t = tree(&[(1.0, 1.0), (1.5, 1.5)]);
        let mut path = Vec::new();
        t.path_of(1, &mut path);
        assert_eq!(path.first().copied(), t.leaf_of(1));
        assert_eq!(path.last().copied(), Some(ROOT));
        for w in path.windows(2) {
            assert_eq!(t.node(w[0]).parent, w[1]);
        }
    }

    #[test]
    fn reset_keeps_capacity() {
        let mut t = tree(&[(1.0, 1.0), (7.0, 1.0), (1.0, 7.0)]);
        let cap = t.nodes.capacity();
        t.reset(Point::origin(), 1.0, 3);
        assert_eq!(t.len(), 1);
        assert_eq!(t.nodes.capacity(), cap);
        assert_eq!(t.leaf_of(0), None);
    }
}
