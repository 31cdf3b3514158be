//! Run-length compression of hierarchical header labels.
//!
//! Both builders keep one span list per depth level. A new entry starts when
//! the label at a level differs from the last entry there, and once a level
//! starts a new entry every deeper level does too, so spans never straddle a
//! boundary of their parent.

use pivotcast_core::flat::{ColSpan, RowSpan, UNIT_SEPARATOR};
use pivotcast_core::types::Scalar;

#[derive(Debug, Clone, Default)]
pub struct ColSpanBuilder {
    levels: Vec<Vec<ColSpan>>,
}

impl ColSpanBuilder {
    pub fn new(depth: usize) -> Self {
        Self {
            levels: vec![Vec::new(); depth],
        }
    }

    /// Add one leaf column given its unit-separator joined path. A path with
    /// more segments than levels keeps the remainder in the deepest segment.
    pub fn push_path(&mut self, joined: &str) {
        let depth = self.levels.len();
        if depth == 0 {
            return;
        }
        let mut reset = false;
        for (level, segment) in joined.splitn(depth, UNIT_SEPARATOR).enumerate() {
            let spans = &mut self.levels[level];
            match spans.last_mut() {
                Some(last) if !reset && last.0 == segment => last.1 += 1,
                _ => {
                    spans.push(ColSpan(segment.to_string(), 1));
                    reset = true;
                }
            }
        }
    }

    pub fn finish(self) -> Vec<Vec<ColSpan>> {
        self.levels
    }
}

#[derive(Debug, Clone, Default)]
pub struct RowSpanBuilder {
    levels: Vec<Vec<RowSpan>>,
}

impl RowSpanBuilder {
    pub fn new(depth: usize) -> Self {
        Self {
            levels: vec![Vec::new(); depth],
        }
    }

    /// Add one leaf row given its header labels, shallowest first.
    pub fn push_row(&mut self, header: &[Scalar]) {
        let mut reset = false;
        for (spans, label) in self.levels.iter_mut().zip(header) {
            match spans.last_mut() {
                Some(last) if !reset && last.label == *label => last.run_length += 1,
                _ => {
                    let mut span = RowSpan::new(label.clone());
                    span.run_length = 1;
                    spans.push(span);
                    reset = true;
                }
            }
        }
    }

    /// Per-level spans with child counts filled in.
    pub fn finish(mut self) -> Vec<Vec<RowSpan>> {
        annotate_child_counts(&mut self.levels);
        self.levels
    }
}

/// Set `child_count` on every span above the leaf level to the number of
/// entries it covers on the next level.
///
/// Children of consecutive parents are consecutive, so one cursor per level
/// is enough: each parent consumes child entries until their run lengths add
/// up to its own.
pub fn annotate_child_counts(levels: &mut [Vec<RowSpan>]) {
    for depth in 1..levels.len() {
        let (upper, lower) = levels.split_at_mut(depth);
        let parents = &mut upper[depth - 1];
        let children = &lower[0];
        let mut cursor = 0;
        for parent in parents.iter_mut() {
            let (mut covered, mut count) = (0, 0);
            while covered < parent.run_length && cursor < children.len() {
                covered += children[cursor].run_length;
                cursor += 1;
                count += 1;
            }
            parent.child_count = Some(count);
        }
    }
}
