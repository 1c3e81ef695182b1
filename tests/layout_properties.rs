// 瀑布流布局的性质测试

use bookcover_wallpaper::models::{CanvasSpec, CoverImage};
use bookcover_wallpaper::services::layout::MasonryLayout;
use image::RgbaImage;
use proptest::prelude::*;

fn arb_spec() -> impl Strategy<Value = CanvasSpec> {
    (50u32..2000, 50u32..1200, 1u32..12)
        .prop_map(|(width, height, columns)| CanvasSpec::new(width, height, columns).unwrap())
}

fn arb_covers() -> impl Strategy<Value = Vec<CoverImage>> {
    prop::collection::vec((1u32..40, 1u32..80), 0..40).prop_map(|sizes| {
        sizes
            .into_iter()
            .enumerate()
            .map(|(i, (w, h))| {
                CoverImage::from_rgba(format!("cover-{}", i), RgbaImage::new(w, h)).unwrap()
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_layout_is_deterministic(spec in arb_spec(), covers in arb_covers()) {
        let layout = MasonryLayout::new(spec);
        prop_assert_eq!(layout.layout(&covers), layout.layout(&covers));
    }

    #[test]
    fn prop_placements_never_overlap(spec in arb_spec(), covers in arb_covers()) {
        let placements = MasonryLayout::new(spec).layout(&covers);
        for (i, a) in placements.iter().enumerate() {
            for b in &placements[i + 1..] {
                prop_assert!(!a.intersects(b), "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn prop_placements_start_inside_canvas(spec in arb_spec(), covers in arb_covers()) {
        for rect in MasonryLayout::new(spec).layout(&covers) {
            prop_assert!(rect.right() <= spec.width());
            prop_assert!(rect.y < spec.height());
            prop_assert!(rect.height >= 1);
        }
    }

    #[test]
    fn prop_width_is_column_width(spec in arb_spec(), covers in arb_covers()) {
        let column_width = spec.column_width();
        for rect in MasonryLayout::new(spec).layout(&covers) {
            prop_assert_eq!(rect.width, column_width);
            prop_assert_eq!(rect.x % column_width, 0);
            prop_assert!(rect.x / column_width < spec.column_count());
        }
    }

    #[test]
    fn prop_placements_follow_input_order(spec in arb_spec(), covers in arb_covers()) {
        let placements = MasonryLayout::new(spec).layout(&covers);
        prop_assert!(placements.len() <= covers.len());
        for (rect, cover) in placements.iter().zip(&covers) {
            prop_assert_eq!(rect.source_id.as_str(), cover.source_id());
        }
    }

    #[test]
    fn prop_unplaced_only_when_canvas_full(spec in arb_spec(), covers in arb_covers()) {
        let layout = MasonryLayout::new(spec);
        let placements = layout.layout(&covers);
        if placements.len() < covers.len() {
            let heights = layout.column_heights(&placements);
            prop_assert!(heights.iter().all(|h| *h >= spec.height()));
        }
    }
}
