//! 3-axis K-D tree over fixed-point earth coordinates.
//!
//! The build sorts the point ids by X, Y, and Z with a
//! concurrency-bounded merge sort, then recursively partitions the three
//! orderings around the true median of the rotating axis. Child links
//! live in write-once arrays indexed by node id; concurrent subtree
//! builds write disjoint entries, so the only synchronization is the
//! fork-join barrier. After `build` the tree is immutable and queries
//! are safe for unsynchronized concurrent callers.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::forkjoin::{ForkJoin, DEFAULT_SEQUENTIAL_LIMIT};
use crate::geo::{great_circle_distance, sq_axis_dist, sq_dist, Coords, SqDist};
use crate::graph::{NodeId, NO_NODE};

/// Source of indexed points. Ids must be dense: `node(i)` maps
/// `0..len()` onto `1..=len()` in any order.
pub trait PointSet: Sync {
    fn len(&self) -> usize;
    fn node(&self, i: usize) -> NodeId;
    fn point(&self, id: NodeId) -> Coords;
}

/// K-D tree with k = 3. Wraps a point set; owns only the child links.
pub struct KdTree<'g, G: PointSet> {
    points: &'g G,
    left: Vec<AtomicU32>,
    right: Vec<AtomicU32>,
    root: NodeId,
}

impl<'g, G: PointSet> KdTree<'g, G> {
    /// Build with a default scheduler.
    pub fn build(points: &'g G) -> KdTree<'g, G> {
        KdTree::build_with(points, &ForkJoin::new(DEFAULT_SEQUENTIAL_LIMIT))
    }

    /// Build under the caller's fork-join budget. The scheduler
    /// threshold doubles as the merge sort's sequential cutoff.
    pub fn build_with(points: &'g G, fj: &ForkJoin) -> KdTree<'g, G> {
        let count = points.len();
        let ids: Vec<NodeId> = (0..count).map(|i| points.node(i)).collect();
        let mut xs = ids.clone();
        let mut ys = ids.clone();
        let mut zs = ids;

        // The three axis sorts share the same thread budget.
        fj.join(
            count,
            || concurrent_sort(&mut xs, points, 0, fj),
            count,
            || {
                fj.join(
                    count,
                    || concurrent_sort(&mut ys, points, 1, fj),
                    count,
                    || concurrent_sort(&mut zs, points, 2, fj),
                );
            },
        );
        log::debug!("axis sorting finished for {count} points");

        let mut tree = KdTree {
            points,
            left: std::iter::repeat_with(|| AtomicU32::new(NO_NODE))
                .take(count + 1)
                .collect(),
            right: std::iter::repeat_with(|| AtomicU32::new(NO_NODE))
                .take(count + 1)
                .collect(),
            root: NO_NODE,
        };
        let mut scratch = vec![NO_NODE; count];
        tree.root = tree.build_rec(&mut xs, &mut ys, &mut zs, &mut scratch, 0, fj);
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn left_of(&self, id: NodeId) -> NodeId {
        self.left[id as usize].load(Ordering::Relaxed)
    }

    fn right_of(&self, id: NodeId) -> NodeId {
        self.right[id as usize].load(Ordering::Relaxed)
    }

    /// Locate a point by exact coordinate. Descends by the rotating
    /// split axis; an absent child means the point is not in the set.
    pub fn find_exact(&self, point: Coords) -> Option<NodeId> {
        let mut node = self.root;
        let mut axis = 0;
        while node != NO_NODE {
            let np = self.points.point(node);
            if np == point {
                return Some(node);
            }
            node = if point[axis] < np[axis] {
                self.left_of(node)
            } else {
                self.right_of(node)
            };
            axis = (axis + 1) % 3;
        }
        None
    }

    /// The id of the nearest point to `point`, or `None` for an empty
    /// tree.
    pub fn find_nearest(&self, point: Coords) -> Option<NodeId> {
        if self.root == NO_NODE {
            return None;
        }
        Some(self.nearest_rec(point, self.root, 0).0)
    }

    /// Nearest point plus its great-circle distance in meters.
    pub fn find_nearest_with_distance(&self, point: Coords) -> Option<(NodeId, f64)> {
        let id = self.find_nearest(point)?;
        Some((id, great_circle_distance(point, self.points.point(id))))
    }

    fn nearest_rec(&self, point: Coords, node: NodeId, axis: usize) -> (NodeId, SqDist) {
        let np = self.points.point(node);
        let node_dist = sq_dist(point, np);
        let lc = self.left_of(node);
        let rc = self.right_of(node);
        if lc == NO_NODE && rc == NO_NODE {
            return (node, node_dist);
        }

        let (closer, farther) = if point[axis] < np[axis] {
            (lc, rc)
        } else {
            (rc, lc)
        };
        let next = (axis + 1) % 3;

        let (mut best, mut best_dist) = (NO_NODE, SqDist::MAX);
        if closer != NO_NODE {
            (best, best_dist) = self.nearest_rec(point, closer, next);
        }
        // The far side can only hold something closer if the best
        // candidate's distance reaches the splitting plane on this axis.
        if farther != NO_NODE && best_dist >= sq_axis_dist(np[axis], point[axis]) {
            let (far_best, far_dist) = self.nearest_rec(point, farther, next);
            if far_dist < best_dist {
                (best, best_dist) = (far_best, far_dist);
            }
        }
        if node_dist < best_dist {
            (best, best_dist) = (node, node_dist);
        }
        (best, best_dist)
    }

    /// Median index in `d`'s axis ordering, walked backward past ties so
    /// the split value is a true lower bound on the axis.
    fn find_median(&self, d: &[NodeId], axis: usize) -> usize {
        let mut mid = (d.len() + 1) / 2 - 1;
        while mid > 0 && self.axis_value(d[mid - 1], axis) >= self.axis_value(d[mid], axis) {
            mid -= 1;
        }
        mid
    }

    fn axis_value(&self, id: NodeId, axis: usize) -> i32 {
        self.points.point(id)[axis]
    }

    /// Split `src` (some axis ordering) around the split node, preserving
    /// relative order. Strictly-lower values on the split axis go left;
    /// the counts are exact because the median is a true lower bound.
    fn partition(
        &self,
        src: &[NodeId],
        split: NodeId,
        split_point: Coords,
        axis: usize,
        left: &mut [NodeId],
        right: &mut [NodeId],
    ) {
        let (mut l, mut r) = (0, 0);
        for &id in src {
            if id == split {
                continue;
            }
            if self.axis_value(id, axis) < split_point[axis] {
                left[l] = id;
                l += 1;
            } else {
                right[r] = id;
                r += 1;
            }
        }
        debug_assert_eq!(l, left.len());
        debug_assert_eq!(r, right.len());
    }

    /// Build the subtree over the points in `d0`/`d1`/`d2` (the same set
    /// in three axis orderings, starting with the current split axis)
    /// and return its root. `scratch` has the same length and serves as
    /// partition output; the buffers rotate one position per level.
    fn build_rec(
        &self,
        d0: &mut [NodeId],
        d1: &mut [NodeId],
        d2: &mut [NodeId],
        scratch: &mut [NodeId],
        axis: usize,
        fj: &ForkJoin,
    ) -> NodeId {
        if d0.is_empty() {
            return NO_NODE;
        }
        let mid = self.find_median(d0, axis);
        let split = d0[mid];
        let split_point = self.points.point(split);

        // Partition the next-axis ordering into scratch, then the
        // next-next-axis ordering into d1's freed storage.
        {
            let (s_left, s_rest) = scratch.split_at_mut(mid);
            self.partition(d1, split, split_point, axis, s_left, &mut s_rest[1..]);
        }
        {
            let (d1_left, d1_rest) = d1.split_at_mut(mid);
            self.partition(d2, split, split_point, axis, d1_left, &mut d1_rest[1..]);
        }

        let (s_left, s_rest) = scratch.split_at_mut(mid);
        let s_right = &mut s_rest[1..];
        let (d1_left, d1_rest) = d1.split_at_mut(mid);
        let d1_right = &mut d1_rest[1..];
        let (d0_left, d0_rest) = d0.split_at_mut(mid);
        let d0_right = &mut d0_rest[1..];
        let (d2_left, d2_rest) = d2.split_at_mut(mid);
        let d2_right = &mut d2_rest[1..];

        let next = (axis + 1) % 3;
        let left_size = mid;
        let right_size = d2_right.len();
        let (left_root, right_root) = fj.join(
            left_size,
            || self.build_rec(s_left, d1_left, d0_left, d2_left, next, fj),
            right_size,
            || self.build_rec(s_right, d1_right, d0_right, d2_right, next, fj),
        );

        self.left[split as usize].store(left_root, Ordering::Relaxed);
        self.right[split as usize].store(right_root, Ordering::Relaxed);
        split
    }
}

/// Concurrency-bounded merge sort of `input` by the given axis.
fn concurrent_sort<G: PointSet>(input: &mut [NodeId], points: &G, axis: usize, fj: &ForkJoin) {
    let mut output = vec![NO_NODE; input.len()];
    merge_sort(&mut output, input, points, axis, fj);
    input.copy_from_slice(&output);
}

fn merge_sort<G: PointSet>(
    out: &mut [NodeId],
    inp: &mut [NodeId],
    points: &G,
    axis: usize,
    fj: &ForkJoin,
) {
    if inp.len() < fj.threshold() || inp.len() < 2 {
        out.copy_from_slice(inp);
        out.sort_unstable_by_key(|&id| points.point(id)[axis]);
        return;
    }
    let m = (inp.len() - 1) / 2 + 1;
    {
        let (o0, o1) = out.split_at_mut(m);
        let (i0, i1) = inp.split_at_mut(m);
        fj.join(
            o0.len(),
            || merge_sort(o0, i0, points, axis, fj),
            o1.len(),
            || merge_sort(o1, i1, points, axis, fj),
        );
    }
    inp.copy_from_slice(out);
    let (i0, i1) = inp.split_at(m);
    merge(out, i0, i1, points, axis);
}

fn merge<G: PointSet>(out: &mut [NodeId], in0: &[NodeId], in1: &[NodeId], points: &G, axis: usize) {
    let (mut i, mut j, mut k) = (0, 0, 0);
    while i < in0.len() && j < in1.len() {
        if points.point(in0[i])[axis] < points.point(in1[j])[axis] {
            out[k] = in0[i];
            i += 1;
        } else {
            out[k] = in1[j];
            j += 1;
        }
        k += 1;
    }
    if i < in0.len() {
        out[k..].copy_from_slice(&in0[i..]);
    } else if j < in1.len() {
        out[k..].copy_from_slice(&in1[j..]);
    }
}
