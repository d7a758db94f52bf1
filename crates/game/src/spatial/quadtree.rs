use std::collections::HashMap;

use glam::Vec2;

use crate::id::UniqueId;

use super::shape::{Aabb, Shape};

const ROOT: usize = 0;

#[derive(Debug, Clone, Copy)]
pub struct QuadtreeConfig {
    pub bounds: Aabb,
    pub max_depth: u8,
    pub split_threshold: usize,
}

impl Default for QuadtreeConfig {
    fn default() -> Self {
        Self {
            bounds: Aabb::new(Vec2::ZERO, Vec2::splat(4096.0)),
            max_depth: 8,
            split_threshold: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Shapes touching or overlapping the region.
    Intersects,
    /// Shapes lying strictly inside the region.
    Inside,
    /// Shapes that strictly contain the region.
    Contains,
}

#[derive(Debug, Clone)]
struct Entry {
    id: UniqueId,
    shape: Shape,
    bounds: Aabb,
}

#[derive(Debug, Clone)]
struct Node {
    nominal: Aabb,
    loose: Aabb,
    depth: u8,
    parent: Option<usize>,
    children: Option<[usize; 4]>,
    entries: Vec<Entry>,
    subtree_len: usize,
    live: bool,
}

impl Node {
    fn new(nominal: Aabb, depth: u8, parent: Option<usize>) -> Self {
        Self {
            nominal,
            loose: nominal.expanded(nominal.half_extents()),
            depth,
            parent,
            children: None,
            entries: Vec::new(),
            subtree_len: 0,
            live: true,
        }
    }

    fn child_slot(&self, point: Vec2) -> usize {
        let mid = self.nominal.center();
        (point.x >= mid.x) as usize | (((point.y >= mid.y) as usize) << 1)
    }

    fn descendants_empty(&self) -> bool {
        self.subtree_len == self.entries.len()
    }
}

/// Loose quadtree over circles and rotated rectangles.
///
/// Every node accepts objects whose bounds fit inside twice its nominal extent, so an
/// object drifting across a nominal boundary stays where it is. Emptied branches are
/// collapsed lazily while queries walk them, or all at once by [`Self::force_cleanup`].
#[derive(Debug, Clone)]
pub struct LooseQuadtree {
    nodes: Vec<Node>,
    free_nodes: Vec<usize>,
    locations: HashMap<UniqueId, usize>,
    config: QuadtreeConfig,
}

impl Default for LooseQuadtree {
    fn default() -> Self {
        Self::new(QuadtreeConfig::default())
    }
}

impl LooseQuadtree {
    pub fn new(config: QuadtreeConfig) -> Self {
        Self {
            nodes: vec![Node::new(config.bounds, 0, None)],
            free_nodes: Vec::new(),
            locations: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &QuadtreeConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn contains(&self, id: UniqueId) -> bool {
        self.locations.contains_key(&id)
    }

    pub fn shape(&self, id: UniqueId) -> Option<Shape> {
        let node = *self.locations.get(&id)?;
        self.nodes[node]
            .entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.shape)
    }

    /// Number of nodes currently allocated, including ones awaiting collapse.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.live).count()
    }

    /// Returns false without touching the tree when `id` is already present.
    pub fn insert(&mut self, id: UniqueId, shape: Shape) -> bool {
        if self.locations.contains_key(&id) {
            return false;
        }
        let entry = Entry {
            id,
            shape,
            bounds: shape.bounds(),
        };
        self.place(ROOT, entry);
        true
    }

    /// Repositions `id`. Returns false, leaving the tree untouched, when `id` is absent.
    pub fn update(&mut self, id: UniqueId, shape: Shape) -> bool {
        let Some(&node_index) = self.locations.get(&id) else {
            return false;
        };

        let bounds = shape.bounds();
        let node = &mut self.nodes[node_index];
        let stays = if node_index == ROOT {
            node.children.is_none()
        } else {
            node.loose.contains(&bounds)
        };

        if stays {
            if let Some(entry) = node.entries.iter_mut().find(|e| e.id == id) {
                entry.shape = shape;
                entry.bounds = bounds;
            }
            return true;
        }

        let Some(entry) = self.detach(node_index, id) else {
            return false;
        };
        let entry = Entry {
            shape,
            bounds,
            ..entry
        };

        let mut start = self.nodes[node_index].parent.unwrap_or(ROOT);
        while start != ROOT && !self.nodes[start].loose.contains(&bounds) {
            start = self.nodes[start].parent.unwrap_or(ROOT);
        }
        self.place(start, entry);
        true
    }

    /// Returns false when `id` was not in the tree.
    pub fn remove(&mut self, id: UniqueId) -> bool {
        let Some(&node_index) = self.locations.get(&id) else {
            return false;
        };
        self.detach(node_index, id).is_some()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.nodes.push(Node::new(self.config.bounds, 0, None));
        self.free_nodes.clear();
        self.locations.clear();
    }

    pub fn query(&mut self, region: Shape, kind: QueryKind) -> Query<'_> {
        Query::new(self, region, kind)
    }

    pub fn query_intersects_region(&mut self, region: Shape) -> Query<'_> {
        self.query(region, QueryKind::Intersects)
    }

    pub fn query_inside_region(&mut self, region: Shape) -> Query<'_> {
        self.query(region, QueryKind::Inside)
    }

    pub fn query_contains_region(&mut self, region: Shape) -> Query<'_> {
        self.query(region, QueryKind::Contains)
    }

    /// Collapses every branch that no longer holds objects.
    pub fn force_cleanup(&mut self) {
        self.cleanup_subtree(ROOT);
    }

    fn cleanup_subtree(&mut self, node_index: usize) {
        let Some(children) = self.nodes[node_index].children else {
            return;
        };
        for child in children {
            self.cleanup_subtree(child);
        }
        self.try_collapse(node_index);
    }

    fn try_collapse(&mut self, node_index: usize) -> bool {
        let node = &self.nodes[node_index];
        if node.children.is_none()
            || !node.descendants_empty()
            || node.entries.len() > self.config.split_threshold
        {
            return false;
        }
        if let Some(children) = self.nodes[node_index].children.take() {
            for child in children {
                self.release_subtree(child);
            }
        }
        true
    }

    fn release_subtree(&mut self, node_index: usize) {
        if let Some(children) = self.nodes[node_index].children.take() {
            for child in children {
                self.release_subtree(child);
            }
        }
        let node = &mut self.nodes[node_index];
        node.live = false;
        node.entries.clear();
        node.subtree_len = 0;
        self.free_nodes.push(node_index);
    }

    fn allocate_node(&mut self, nominal: Aabb, depth: u8, parent: usize) -> usize {
        let node = Node::new(nominal, depth, Some(parent));
        match self.free_nodes.pop() {
            Some(index) => {
                self.nodes[index] = node;
                index
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn place(&mut self, start: usize, entry: Entry) {
        let center = entry.shape.center();
        let mut node_index = start;

        while let Some(children) = self.nodes[node_index].children {
            let child = children[self.nodes[node_index].child_slot(center)];
            if !self.nodes[child].loose.contains(&entry.bounds) {
                break;
            }
            node_index = child;
        }

        self.locations.insert(entry.id, node_index);
        self.nodes[node_index].entries.push(entry);
        self.adjust_counts(node_index, 1);

        let node = &self.nodes[node_index];
        if node.children.is_none()
            && node.entries.len() > self.config.split_threshold
            && node.depth < self.config.max_depth
        {
            self.split(node_index);
        }
    }

    fn split(&mut self, node_index: usize) {
        let nominal = self.nodes[node_index].nominal;
        let depth = self.nodes[node_index].depth + 1;
        let mid = nominal.center();

        let quadrants = [
            Aabb::new(nominal.min, mid),
            Aabb::new(Vec2::new(mid.x, nominal.min.y), Vec2::new(nominal.max.x, mid.y)),
            Aabb::new(Vec2::new(nominal.min.x, mid.y), Vec2::new(mid.x, nominal.max.y)),
            Aabb::new(mid, nominal.max),
        ];
        let children = quadrants.map(|q| self.allocate_node(q, depth, node_index));
        self.nodes[node_index].children = Some(children);

        let entries = std::mem::take(&mut self.nodes[node_index].entries);
        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries {
            let slot = self.nodes[node_index].child_slot(entry.shape.center());
            let child = children[slot];
            if self.nodes[child].loose.contains(&entry.bounds) {
                self.locations.insert(entry.id, child);
                let child_node = &mut self.nodes[child];
                child_node.entries.push(entry);
                child_node.subtree_len += 1;
            } else {
                kept.push(entry);
            }
        }
        self.nodes[node_index].entries = kept;
    }

    fn detach(&mut self, node_index: usize, id: UniqueId) -> Option<Entry> {
        let node = &mut self.nodes[node_index];
        let position = node.entries.iter().position(|e| e.id == id)?;
        let entry = node.entries.swap_remove(position);
        self.locations.remove(&id);
        self.adjust_counts(node_index, -1);
        Some(entry)
    }

    fn adjust_counts(&mut self, node_index: usize, delta: isize) {
        let mut current = Some(node_index);
        while let Some(index) = current {
            let node = &mut self.nodes[index];
            node.subtree_len = node.subtree_len.saturating_add_signed(delta);
            current = node.parent;
        }
    }
}

/// Lazy region query. Consumers may stop early; the tree stays valid either way.
pub struct Query<'a> {
    tree: &'a mut LooseQuadtree,
    region: Shape,
    region_bounds: Aabb,
    kind: QueryKind,
    stack: Vec<usize>,
    node: Option<usize>,
    cursor: usize,
}

impl<'a> Query<'a> {
    fn new(tree: &'a mut LooseQuadtree, region: Shape, kind: QueryKind) -> Self {
        Self {
            tree,
            region,
            region_bounds: region.bounds(),
            kind,
            stack: vec![ROOT],
            node: None,
            cursor: 0,
        }
    }

    pub fn region(&self) -> &Shape {
        &self.region
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn end_of_query(&self) -> bool {
        self.node.is_none() && self.stack.is_empty()
    }

    /// Rewinds to the root so the same region can be walked again.
    pub fn restart(&mut self) {
        self.stack.clear();
        self.stack.push(ROOT);
        self.node = None;
        self.cursor = 0;
    }

    fn accepts(&self, shape: &Shape) -> bool {
        match self.kind {
            QueryKind::Intersects => shape.intersects(&self.region),
            QueryKind::Inside => self.region.contains(shape),
            QueryKind::Contains => shape.contains(&self.region),
        }
    }

    fn open_next_node(&mut self) -> bool {
        while let Some(index) = self.stack.pop() {
            let node = &self.tree.nodes[index];
            if node.subtree_len == 0 && node.children.is_none() {
                continue;
            }
            if index != ROOT && !node.loose.intersects(&self.region_bounds) {
                continue;
            }

            self.tree.try_collapse(index);
            if let Some(children) = self.tree.nodes[index].children {
                for child in children {
                    if self.tree.nodes[child].subtree_len > 0 {
                        self.stack.push(child);
                    }
                }
            }

            if !self.tree.nodes[index].entries.is_empty() {
                self.node = Some(index);
                self.cursor = 0;
                return true;
            }
        }
        false
    }
}

impl Iterator for Query<'_> {
    type Item = (UniqueId, Shape);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(index) = self.node {
                let entries = &self.tree.nodes[index].entries;
                while self.cursor < entries.len() {
                    let entry = &entries[self.cursor];
                    self.cursor += 1;
                    if entry.bounds.intersects(&self.region_bounds) && self.accepts(&entry.shape) {
                        return Some((entry.id, entry.shape));
                    }
                }
                self.node = None;
            }

            if !self.open_next_node() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_tree() -> LooseQuadtree {
        LooseQuadtree::new(QuadtreeConfig {
            bounds: Aabb::new(Vec2::ZERO, Vec2::splat(100.0)),
            max_depth: 5,
            split_threshold: 2,
        })
    }

    fn collect(query: Query<'_>) -> Vec<u32> {
        let mut ids: Vec<u32> = query.map(|(id, _)| id.0).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn insert_query_remove() {
        let mut tree = small_tree();
        for i in 0..10u32 {
            let center = Vec2::new(5.0 + i as f32 * 10.0, 5.0);
            assert!(tree.insert(UniqueId(i + 1), Shape::circle(center, 2.0)));
        }
        assert!(!tree.insert(UniqueId(1), Shape::circle(Vec2::ZERO, 1.0)));
        assert!(tree.node_count() > 1);

        let region = Shape::rect(Vec2::new(20.0, 5.0), Vec2::new(11.0, 5.0), 0.0);
        assert_eq!(collect(tree.query_intersects_region(region)), vec![2, 3, 4]);

        assert!(tree.remove(UniqueId(3)));
        assert!(!tree.remove(UniqueId(3)));
        assert_eq!(collect(tree.query_intersects_region(region)), vec![2, 4]);
    }

    #[test]
    fn update_absent_reports_false() {
        let mut tree = small_tree();
        assert!(!tree.update(UniqueId(5), Shape::circle(Vec2::ONE, 1.0)));
        assert!(tree.is_empty());
        assert!(!tree.contains(UniqueId(5)));
    }

    #[test]
    fn update_moves_across_branches() {
        let mut tree = small_tree();
        for i in 0..6u32 {
            tree.insert(UniqueId(i + 1), Shape::circle(Vec2::new(10.0 + i as f32, 10.0), 1.0));
        }

        assert!(tree.update(UniqueId(1), Shape::circle(Vec2::new(90.0, 90.0), 1.0)));
        let far = Shape::circle(Vec2::new(90.0, 90.0), 3.0);
        assert_eq!(collect(tree.query_intersects_region(far)), vec![1]);
        let near = Shape::circle(Vec2::new(10.0, 10.0), 0.5);
        assert!(collect(tree.query_intersects_region(near)).is_empty());
        assert_eq!(tree.shape(UniqueId(1)).map(|s| s.center()), Some(Vec2::new(90.0, 90.0)));
    }

    #[test]
    fn inside_and_contains_queries() {
        let mut tree = small_tree();
        tree.insert(UniqueId(1), Shape::circle(Vec2::new(50.0, 50.0), 1.0));
        tree.insert(UniqueId(2), Shape::circle(Vec2::new(50.0, 50.0), 30.0));
        tree.insert(UniqueId(3), Shape::circle(Vec2::new(58.0, 50.0), 3.0));

        let region = Shape::circle(Vec2::new(50.0, 50.0), 10.0);
        assert_eq!(collect(tree.query_inside_region(region)), vec![1]);
        assert_eq!(collect(tree.query_contains_region(region)), vec![2]);
        assert_eq!(collect(tree.query_intersects_region(region)), vec![1, 2, 3]);
    }

    #[test]
    fn abandoned_query_leaves_tree_valid_and_restart_rewinds() {
        let mut tree = small_tree();
        for i in 0..20u32 {
            tree.insert(UniqueId(i + 1), Shape::circle(Vec2::new(3.0 + i as f32 * 4.0, 50.0), 1.0));
        }
        let region = Shape::aabb(Aabb::new(Vec2::ZERO, Vec2::splat(100.0)));

        let mut query = tree.query_intersects_region(region);
        assert!(query.next().is_some());
        assert!(query.next().is_some());
        assert!(!query.end_of_query());
        query.restart();
        assert_eq!(query.by_ref().count(), 20);
        assert!(query.end_of_query());

        let mut partial = tree.query_intersects_region(region);
        partial.next();
        drop(partial);
        assert_eq!(collect(tree.query_intersects_region(region)).len(), 20);
    }

    #[test]
    fn emptied_branches_collapse() {
        let mut tree = small_tree();
        for i in 0..12u32 {
            tree.insert(UniqueId(i + 1), Shape::circle(Vec2::new(5.0 + i as f32, 5.0), 0.5));
        }
        assert!(tree.node_count() > 1);

        for i in 0..12u32 {
            assert!(tree.remove(UniqueId(i + 1)));
        }
        tree.force_cleanup();
        assert_eq!(tree.node_count(), 1);

        for i in 0..12u32 {
            tree.insert(UniqueId(i + 1), Shape::circle(Vec2::new(5.0 + i as f32, 5.0), 0.5));
        }
        for i in 0..12u32 {
            tree.remove(UniqueId(i + 1));
        }
        let everything = Shape::aabb(Aabb::new(Vec2::ZERO, Vec2::splat(100.0)));
        assert_eq!(tree.query_intersects_region(everything).count(), 0);
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn objects_outside_root_bounds_are_still_found() {
        let mut tree = small_tree();
        tree.insert(UniqueId(1), Shape::circle(Vec2::new(-50.0, -50.0), 2.0));
        tree.insert(UniqueId(2), Shape::circle(Vec2::new(500.0, 20.0), 2.0));
        let region = Shape::circle(Vec2::new(-50.0, -49.0), 1.0);
        assert_eq!(collect(tree.query_intersects_region(region)), vec![1]);
    }
}
