//! Layout memoization across a context

mod common;

use common::{blocked, nvidia_ctx, tensor};
use linlayout::cache::LayoutCache;
use linlayout::encoding::{CtaLayout, Encoding, SliceEncoding, SwizzledSharedEncoding};
use linlayout::layout::Dim;
use std::sync::Arc;
use std::thread;

#[test]
fn test_structurally_equal_encodings_share_an_entry() {
    let ctx = nvidia_ctx();
    // built independently, compared by value
    let a = tensor(&[32, 32], blocked(&[1, 4], &[4, 8], &[4, 1], &[1, 0]));
    let b = tensor(&[32, 32], blocked(&[1, 4], &[4, 8], &[4, 1], &[1, 0]));

    let la = ctx.tensor_layout(&a).unwrap();
    let lb = ctx.tensor_layout(&b).unwrap();
    assert!(Arc::ptr_eq(&la, &lb));

    let stats = ctx.cache_stats();
    assert_eq!((stats.entries, stats.hits, stats.misses), (1, 1, 1));
}

#[test]
fn test_shape_is_part_of_the_key() {
    let ctx = nvidia_ctx();
    let enc = blocked(&[1, 4], &[4, 8], &[4, 1], &[1, 0]);
    let small = ctx.tensor_layout(&tensor(&[16, 32], enc.clone())).unwrap();
    let large = ctx.tensor_layout(&tensor(&[32, 32], enc)).unwrap();
    assert!(!Arc::ptr_eq(&small, &large));
    assert_eq!(ctx.cache_stats().entries, 2);

    // only the output sizes and the register repeats differ
    assert_eq!(small.in_dim_bases(&Dim::LANE).unwrap(), large.in_dim_bases(&Dim::LANE).unwrap());
    assert_eq!(small.in_dim_bases(&Dim::WARP).unwrap(), large.in_dim_bases(&Dim::WARP).unwrap());
    assert_eq!(small.out_dim_size(&Dim::out(0)), 16);
    assert_eq!(large.out_dim_size(&Dim::out(0)), 32);
    assert_eq!(large.in_dim_size(&Dim::REGISTER), 2 * small.in_dim_size(&Dim::REGISTER));
}

#[test]
fn test_alloc_shape_is_part_of_the_key() {
    let cache = LayoutCache::new();
    let enc: Encoding = SwizzledSharedEncoding::new(4, 2, 4, &[1, 0], CtaLayout::single(2))
        .unwrap()
        .into();
    let exact = cache.get_or_build(&[16, 32], &enc, &[16, 32]).unwrap();
    let larger = cache.get_or_build(&[16, 32], &enc, &[32, 32]).unwrap();
    assert_eq!(exact.out_shape(), vec![16, 32]);
    assert_eq!(larger.out_shape(), vec![32, 32]);
    assert_eq!(cache.len(), 2);
    assert!(cache.get(&[16, 32], &enc, &[32, 32]).is_some());
    assert!(cache.get(&[16, 32], &enc, &[64, 32]).is_none());
}

#[test]
fn test_slice_and_parent_are_cached_separately() {
    let ctx = nvidia_ctx();
    let parent = blocked(&[1, 4], &[4, 8], &[4, 1], &[1, 0]);
    let slice = SliceEncoding::new(0, parent.clone()).unwrap();
    let sliced = ctx.tensor_layout(&tensor(&[64], slice)).unwrap();
    assert_eq!(sliced.out_shape(), vec![64]);
    let full = ctx.tensor_layout(&tensor(&[16, 64], parent)).unwrap();
    assert_eq!(full.out_shape(), vec![16, 64]);
    assert_eq!(ctx.cache_stats().entries, 2);
}

#[test]
fn test_shared_context_across_threads() {
    let ctx = Arc::new(nvidia_ctx());
    let shapes: Vec<Vec<i64>> = vec![vec![16, 32], vec![32, 32], vec![64, 32], vec![128, 32]];

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let ctx = Arc::clone(&ctx);
            let shapes = shapes.clone();
            thread::spawn(move || {
                let enc = blocked(&[1, 4], &[4, 8], &[4, 1], &[1, 0]);
                for round in 0..10 {
                    let shape = &shapes[(i + round) % shapes.len()];
                    let layout = ctx.tensor_layout(&tensor(shape, enc.clone())).unwrap();
                    assert_eq!(&layout.out_shape(), shape);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let stats = ctx.cache_stats();
    assert_eq!(stats.entries, shapes.len());
    assert_eq!(stats.hits + stats.misses, 80);
    // racing builders may both miss, but never more than once per thread
    assert!(stats.misses >= shapes.len() as u64);
    assert!(stats.misses <= 8 * shapes.len() as u64);
}
