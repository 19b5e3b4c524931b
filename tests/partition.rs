//! Tiling partitions a region exactly.

use proptest::prelude::*;
use std::collections::HashSet;
use tilewise::prelude::*;

fn region_and_tile() -> impl Strategy<Value = (Region, Shape5)> {
    (
        prop::array::uniform5(-6i64..6),
        prop::array::uniform5(0i64..7),
        prop::array::uniform5(-1i64..5),
    )
        .prop_map(|(start, extent, tile)| {
            let start = Point5::from_array(start);
            let region = Region::at(start, Shape5::from_array(extent)).unwrap();
            (region, Shape5::from_array(tile))
        })
}

proptest! {
    #[test]
    fn split_covers_every_point_once((region, tile) in region_and_tile()) {
        let tiles = region.split(tile);
        let total: usize = tiles.iter().map(Region::volume).sum();
        prop_assert_eq!(total, region.volume());

        for t in &tiles {
            prop_assert!(region.contains(t));
            prop_assert!(!t.is_empty());
        }
        for (i, a) in tiles.iter().enumerate() {
            for b in &tiles[i + 1..] {
                prop_assert!(!a.intersects(b));
            }
        }
        let unique: HashSet<Region> = tiles.iter().copied().collect();
        prop_assert_eq!(unique.len(), tiles.len());
    }

    #[test]
    fn split_respects_tile_extents((region, tile) in region_and_tile()) {
        for t in region.split(tile) {
            for axis in Axis::ALL {
                let step = tile.get(axis);
                if step > 0 {
                    prop_assert!(t.len(axis) <= step);
                    prop_assert_eq!((t.start().get(axis) - region.start().get(axis)) % step, 0);
                } else {
                    prop_assert_eq!(t.extent(axis), region.extent(axis));
                }
            }
        }
    }

    #[test]
    fn aligned_tiles_follow_global_grid((region, tile) in region_and_tile()) {
        let tiles = region.tiles_aligned(tile);
        let total: usize = tiles.iter().map(Region::volume).sum();
        prop_assert_eq!(total, region.volume());
        for t in tiles {
            for axis in Axis::ALL {
                let step = tile.get(axis);
                if step > 0 {
                    let (lo, hi) = t.extent(axis);
                    prop_assert_eq!(lo.div_euclid(step), (hi - 1).div_euclid(step));
                }
            }
        }
    }
}

#[test]
fn empty_region_has_no_tiles() {
    let region = Region::at(Point5::zero(), Shape5::new(1, 0, 4, 4, 1)).unwrap();
    assert!(region.split(Shape5::spatial(1, 2, 2)).is_empty());
}
