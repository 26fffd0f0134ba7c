//! Quadtree bin-packing atlas.
//!
//! Allocates non-overlapping rectangles inside a fixed-size single-channel pixel buffer.
//! The buffer is the CPU mirror of a GPU texture; uploading it is the caller's job.
//!
//! Nodes are stored in an arena and refer to their children by index. A node is split
//! at most once and never freed; the only way to reclaim space is to build a larger
//! atlas and re-insert everything into it.
//!
//! Two split policies:
//! - quarter split: four equal children (top-left, top-right, bottom-left, bottom-right),
//!   used while the request fits in a quarter. Keeps the tree shallow.
//! - dynamic split: once a quarter would be too small, carve an exact-size leaf at the
//!   node's origin plus a right column and a bottom row for the remainder. The corner
//!   between the column and the row is left unallocated.

use glam::{UVec2, Vec2};

/// Both axes of every allocation are rounded up to this many pixels.
pub const ATLAS_ALIGNMENT: u32 = 4;

/// Rectangle in atlas pixel coordinates (top-left origin).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AtlasRectPx {
    pub min: UVec2,
    pub size: UVec2,
}

impl AtlasRectPx {
    pub const fn new(min: UVec2, size: UVec2) -> Self {
        Self { min, size }
    }

    #[inline]
    pub const fn width(self) -> u32 {
        self.size.x
    }

    #[inline]
    pub const fn height(self) -> u32 {
        self.size.y
    }

    #[inline]
    pub const fn max_x(self) -> u32 {
        self.min.x + self.size.x
    }

    #[inline]
    pub const fn max_y(self) -> u32 {
        self.min.y + self.size.y
    }

    pub fn overlaps(self, other: Self) -> bool {
        self.min.x < other.max_x()
            && other.min.x < self.max_x()
            && self.min.y < other.max_y()
            && other.min.y < self.max_y()
    }
}

/// UV rectangle (normalized texture coords, top-left origin).
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct UvRect {
    pub min: Vec2,
    pub max: Vec2,
}

impl UvRect {
    /// The whole texture.
    pub const FULL: Self = Self::new(Vec2::ZERO, Vec2::ONE);

    pub const fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub const fn to_array(self) -> [Vec2; 2] {
        [self.min, self.max]
    }
}

/// One rectangle of the packing tree.
#[derive(Copy, Clone, Debug)]
pub struct AtlasNode {
    rect: AtlasRectPx,
    // Children are contiguous in the arena: `first_child..first_child + child_count`.
    first_child: u32,
    child_count: u8,
    occupied: bool,
}

impl AtlasNode {
    const fn leaf(rect: AtlasRectPx, occupied: bool) -> Self {
        Self {
            rect,
            first_child: 0,
            child_count: 0,
            occupied,
        }
    }

    #[inline]
    pub const fn rect(&self) -> AtlasRectPx {
        self.rect
    }

    #[inline]
    pub const fn is_occupied(&self) -> bool {
        self.occupied
    }

    #[inline]
    pub const fn is_split(&self) -> bool {
        self.child_count > 0
    }

    fn children(&self) -> std::ops::Range<usize> {
        let first = self.first_child as usize;
        first..first + self.child_count as usize
    }
}

/// Fixed-size atlas: packing tree plus the pixels it describes.
pub struct BinPackingAtlas {
    size: UVec2,
    nodes: Vec<AtlasNode>,
    pixels: Vec<u8>,
}

impl BinPackingAtlas {
    pub fn new(size: UVec2) -> Self {
        let root = AtlasNode::leaf(AtlasRectPx::new(UVec2::ZERO, size), false);
        Self {
            size,
            nodes: vec![root],
            pixels: vec![0; (size.x * size.y) as usize],
        }
    }

    #[inline]
    pub const fn size(&self) -> UVec2 {
        self.size
    }

    /// Row-major pixels, one byte each, `size.x * size.y` long.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        self.pixels[(y * self.size.x + x) as usize]
    }

    /// Every node of the packing tree, root first.
    pub fn nodes(&self) -> impl Iterator<Item = &AtlasNode> {
        self.nodes.iter()
    }

    /// Reserve a region of at least `size` pixels.
    ///
    /// The returned rectangle carries the aligned size. Returns `None` when no free node
    /// can hold the request, and for empty requests, which never allocate.
    pub fn insert(&mut self, size: UVec2) -> Option<AtlasRectPx> {
        if size.x == 0 || size.y == 0 {
            return None;
        }

        let aligned = UVec2::new(
            align_up(size.x, ATLAS_ALIGNMENT),
            align_up(size.y, ATLAS_ALIGNMENT),
        );
        self.insert_at(0, aligned)
    }

    fn insert_at(&mut self, index: usize, size: UVec2) -> Option<AtlasRectPx> {
        let node = self.nodes[index];
        if node.occupied || node.rect.size.x < size.x || node.rect.size.y < size.y {
            return None;
        }

        if !node.is_split() {
            if node.rect.size == size {
                self.nodes[index].occupied = true;
                return Some(node.rect);
            }

            let half = node.rect.size / 2;
            if half.x < size.x || half.y < size.y {
                return Some(self.split_dynamic(index, size));
            }
            self.split_quarters(index);
        }

        for child in self.nodes[index].children() {
            if let Some(rect) = self.insert_at(child, size) {
                return Some(rect);
            }
        }
        None
    }

    /// Carve an occupied `size` leaf at the node's origin; the remainder becomes a
    /// right column and a bottom row. Returns the leaf.
    fn split_dynamic(&mut self, index: usize, size: UVec2) -> AtlasRectPx {
        let parent = self.nodes[index].rect;
        let first = self.nodes.len();

        let leaf = AtlasRectPx::new(parent.min, size);
        self.nodes.push(AtlasNode::leaf(leaf, true));

        if parent.size.x > size.x {
            self.nodes.push(AtlasNode::leaf(
                AtlasRectPx::new(
                    parent.min + UVec2::new(size.x, 0),
                    UVec2::new(parent.size.x - size.x, size.y),
                ),
                false,
            ));
        }
        if parent.size.y > size.y {
            self.nodes.push(AtlasNode::leaf(
                AtlasRectPx::new(
                    parent.min + UVec2::new(0, size.y),
                    UVec2::new(size.x, parent.size.y - size.y),
                ),
                false,
            ));
        }

        self.link_children(index, first);
        leaf
    }

    fn split_quarters(&mut self, index: usize) {
        let parent = self.nodes[index].rect;
        let half = parent.size / 2;
        let first = self.nodes.len();

        for offset in [
            UVec2::ZERO,
            UVec2::new(half.x, 0),
            UVec2::new(0, half.y),
            half,
        ] {
            self.nodes
                .push(AtlasNode::leaf(AtlasRectPx::new(parent.min + offset, half), false));
        }

        self.link_children(index, first);
    }

    fn link_children(&mut self, index: usize, first: usize) {
        let count = (self.nodes.len() - first) as u8;
        let node = &mut self.nodes[index];
        node.first_child = first as u32;
        node.child_count = count;
    }

    /// Copy a tightly packed `size` bitmap into the pixel buffer at `min`.
    pub fn blit(&mut self, min: UVec2, size: UVec2, bitmap: &[u8]) {
        debug_assert_eq!(bitmap.len(), (size.x * size.y) as usize);
        debug_assert!(min.x + size.x <= self.size.x && min.y + size.y <= self.size.y);

        let row_len = size.x as usize;
        for (row, src) in bitmap.chunks_exact(row_len.max(1)).enumerate() {
            let start = ((min.y as usize + row) * self.size.x as usize) + min.x as usize;
            self.pixels[start..start + row_len].copy_from_slice(src);
        }
    }

    /// Normalize a pixel rectangle against the atlas size.
    pub fn uv_rect(&self, min: UVec2, size: UVec2) -> UvRect {
        let atlas = self.size.as_vec2();
        UvRect::new(min.as_vec2() / atlas, (min + size).as_vec2() / atlas)
    }
}

fn align_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_rounds_up_to_alignment() {
        let mut atlas = BinPackingAtlas::new(UVec2::splat(64));
        let rect = atlas.insert(UVec2::new(10, 5)).unwrap();
        assert_eq!(rect.size, UVec2::new(12, 8));
        assert_eq!(rect.min, UVec2::ZERO);
    }

    #[test]
    fn test_quarter_split_fills_in_reading_order() {
        let mut atlas = BinPackingAtlas::new(UVec2::splat(16));
        let mins: Vec<UVec2> = (0..5)
            .map(|_| atlas.insert(UVec2::splat(4)).unwrap().min)
            .collect();

        assert_eq!(
            mins,
            vec![
                UVec2::new(0, 0),
                UVec2::new(4, 0),
                UVec2::new(0, 4),
                UVec2::new(4, 4),
                UVec2::new(8, 0),
            ]
        );
    }

    #[test]
    fn test_second_large_insert_into_small_atlas_fails() {
        let mut atlas = BinPackingAtlas::new(UVec2::splat(16));

        let first = atlas.insert(UVec2::splat(10)).unwrap();
        assert_eq!(first, AtlasRectPx::new(UVec2::ZERO, UVec2::splat(12)));

        // Only a 4x12 column and a 12x4 row remain.
        assert_eq!(atlas.insert(UVec2::splat(10)), None);

        // Which still take small requests.
        let small = atlas.insert(UVec2::new(4, 4)).unwrap();
        assert!(!small.overlaps(first));
    }

    #[test]
    fn test_dynamic_split_leaves_corner_unallocated() {
        let mut atlas = BinPackingAtlas::new(UVec2::splat(16));
        atlas.insert(UVec2::splat(12)).unwrap();

        let root_children: Vec<AtlasRectPx> = atlas.nodes().skip(1).map(|n| n.rect()).collect();
        assert_eq!(
            root_children,
            vec![
                AtlasRectPx::new(UVec2::ZERO, UVec2::splat(12)),
                AtlasRectPx::new(UVec2::new(12, 0), UVec2::new(4, 12)),
                AtlasRectPx::new(UVec2::new(0, 12), UVec2::new(12, 4)),
            ]
        );
        let corner = AtlasRectPx::new(UVec2::splat(12), UVec2::splat(4));
        assert!(atlas.nodes().skip(1).all(|n| !n.rect().overlaps(corner)));
    }

    #[test]
    fn test_fitting_request_never_fails_on_fresh_atlas() {
        for size in [
            UVec2::new(1, 1),
            UVec2::new(7, 19),
            UVec2::new(128, 3),
            UVec2::new(129, 129),
            UVec2::new(255, 40),
            UVec2::new(256, 256),
        ] {
            let mut atlas = BinPackingAtlas::new(UVec2::splat(256));
            assert!(atlas.insert(size).is_some(), "{size:?} should fit");
        }
    }

    #[test]
    fn test_allocations_stay_disjoint_and_in_bounds() {
        let mut atlas = BinPackingAtlas::new(UVec2::splat(128));
        let mut placed = Vec::new();

        for i in 0..200u32 {
            let size = UVec2::new(3 + (i * 7) % 13, 5 + (i * 5) % 11);
            if let Some(rect) = atlas.insert(size) {
                assert!(rect.size.x >= size.x && rect.size.y >= size.y);
                placed.push(rect);
            }
        }

        assert!(placed.len() > 20);
        for (i, a) in placed.iter().enumerate() {
            assert!(a.max_x() <= 128 && a.max_y() <= 128);
            for b in &placed[i + 1..] {
                assert!(!a.overlaps(*b), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn test_empty_request_does_not_allocate() {
        let mut atlas = BinPackingAtlas::new(UVec2::splat(16));
        assert_eq!(atlas.insert(UVec2::new(0, 8)), None);
        assert_eq!(atlas.nodes().count(), 1);
    }

    #[test]
    fn test_blit_writes_rows_at_offset() {
        let mut atlas = BinPackingAtlas::new(UVec2::splat(8));
        atlas.blit(UVec2::new(2, 3), UVec2::new(2, 2), &[1, 2, 3, 4]);

        assert_eq!(atlas.pixel(2, 3), 1);
        assert_eq!(atlas.pixel(3, 3), 2);
        assert_eq!(atlas.pixel(2, 4), 3);
        assert_eq!(atlas.pixel(3, 4), 4);
        assert_eq!(atlas.pixels().iter().map(|&p| p as u32).sum::<u32>(), 10);
    }

    #[test]
    fn test_uv_rect_normalizes_against_size() {
        let atlas = BinPackingAtlas::new(UVec2::new(64, 32));
        let uv = atlas.uv_rect(UVec2::new(16, 8), UVec2::new(16, 8));
        assert_eq!(uv, UvRect::new(Vec2::new(0.25, 0.25), Vec2::new(0.5, 0.5)));
    }
}
