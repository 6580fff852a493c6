//! Layouts of every encoding, built through a context

mod common;

use common::{bases, blocked, coverage, init_tracing, nvidia_ctx, tensor};
use linlayout::config::TargetConfig;
use linlayout::context::LayoutContext;
use linlayout::dtype::DType;
use linlayout::encoding::{
    AmdMfmaEncoding, AmdRotatingSharedEncoding, AmdWmmaEncoding, BlockedEncoding, CtaLayout,
    DotOperandEncoding, Encoding, NvidiaMmaEncoding, NvmmaSharedEncoding, PaddedSharedEncoding,
    SliceEncoding, SwizzledSharedEncoding,
};
use linlayout::error::Error;
use linlayout::layout::Dim;
use linlayout::types::MemDescType;

// ============================================================================
// Output shapes
// ============================================================================

#[test]
fn test_distributed_layouts_cover_their_shape() {
    let ctx = nvidia_ctx();
    let parent = blocked(&[1, 4], &[4, 8], &[4, 1], &[1, 0]);
    let mma = NvidiaMmaEncoding::ampere(&[2, 2]).unwrap();
    let cases: Vec<(Vec<i64>, Encoding)> = vec![
        (
            vec![64, 64],
            BlockedEncoding::default_for(&[64, 64], &[1, 4], ctx.config())
                .unwrap()
                .into(),
        ),
        (vec![64, 64], mma.clone().into()),
        (vec![64, 32], DotOperandEncoding::new(0, mma.clone(), 2).unwrap().into()),
        (vec![32, 64], DotOperandEncoding::new(1, mma, 2).unwrap().into()),
        (vec![64], SliceEncoding::new(1, parent.clone()).unwrap().into()),
        (vec![32], SliceEncoding::new(0, parent).unwrap().into()),
    ];
    for (shape, enc) in cases {
        let layout = ctx.tensor_layout(&tensor(&shape, enc.clone())).unwrap();
        assert_eq!(layout.out_shape(), shape, "{}", enc.kind());
        assert!(layout.is_surjective(), "{}", enc.kind());
        assert_eq!(layout.in_dim_size(&Dim::LANE), 32);
        assert_eq!(layout.in_dim_size(&Dim::WARP), 4);
    }
}

#[test]
fn test_amd_layouts_cover_their_shape() {
    init_tracing();
    let cdna = LayoutContext::new(TargetConfig::AMD_CDNA).unwrap();
    let mfma = AmdMfmaEncoding::new(3, &[2, 2], 32, 32, false, CtaLayout::single(2)).unwrap();
    for (shape, enc) in [
        (vec![64, 64], Encoding::from(mfma.clone())),
        (vec![64, 32], DotOperandEncoding::new(0, mfma, 8).unwrap().into()),
    ] {
        let layout = cdna.tensor_layout(&tensor(&shape, enc)).unwrap();
        assert_eq!(layout.out_shape(), shape);
        assert_eq!(layout.in_dim_size(&Dim::LANE), 64);
    }

    let rdna = LayoutContext::new(TargetConfig::AMD_RDNA).unwrap();
    let wmma = AmdWmmaEncoding::new(2, false, &[2, 2], CtaLayout::single(2)).unwrap();
    let layout = rdna.tensor_layout(&tensor(&[32, 32], wmma)).unwrap();
    assert_eq!(layout.out_shape(), vec![32, 32]);
    assert_eq!(layout.in_dim_size(&Dim::LANE), 32);
}

#[test]
fn test_shared_layouts_cover_their_shape() {
    let ctx = nvidia_ctx();
    let cases: Vec<(Vec<i64>, Encoding)> = vec![
        (
            vec![64, 64],
            SwizzledSharedEncoding::new(8, 1, 8, &[1, 0], CtaLayout::single(2))
                .unwrap()
                .into(),
        ),
        (
            vec![64, 64],
            NvmmaSharedEncoding::new(128, false, 16, false, CtaLayout::single(2))
                .unwrap()
                .into(),
        ),
        (
            vec![32, 32],
            AmdRotatingSharedEncoding::new(4, 1, 4, &[1, 0], CtaLayout::single(2))
                .unwrap()
                .into(),
        ),
        (
            vec![16, 64],
            PaddedSharedEncoding::new(&[64], &[4], &[1, 0], CtaLayout::single(2))
                .unwrap()
                .into(),
        ),
    ];
    for (shape, enc) in cases {
        let ty = MemDescType::new(&shape, enc.clone(), DType::F16).unwrap();
        let layout = ctx.memdesc_layout(&ty).unwrap();
        assert_eq!(layout.out_shape(), shape, "{}", enc.kind());
        // one offset per element
        assert!(layout.is_invertible(), "{}", enc.kind());
    }
}

// ============================================================================
// Blocked distribution
// ============================================================================

#[test]
fn test_blocked_repeats_tile_in_registers() {
    init_tracing();
    let ctx = LayoutContext::new(TargetConfig::NVIDIA.with_num_warps(2)).unwrap();
    let enc = blocked(&[2, 2], &[4, 8], &[2, 1], &[1, 0]);
    let layout = ctx.tensor_layout(&tensor(&[16, 32], enc)).unwrap();

    // a 16x16 tile covers the rows once and the columns twice
    assert_eq!(
        bases(&layout, &Dim::REGISTER),
        vec![vec![0, 1], vec![1, 0], vec![0, 16]]
    );
    assert_eq!(
        bases(&layout, &Dim::LANE),
        vec![vec![0, 2], vec![0, 4], vec![0, 8], vec![2, 0], vec![4, 0]]
    );
    assert_eq!(bases(&layout, &Dim::WARP), vec![vec![8, 0]]);

    let hits = coverage(&layout);
    assert_eq!(hits.len(), 16 * 32);
    assert!(hits.values().all(|&n| n == 1));
}

#[test]
fn test_blocked_broadcasts_small_shapes() {
    let ctx = nvidia_ctx();
    let enc = blocked(&[1, 1], &[4, 8], &[4, 1], &[1, 0]);
    let layout = ctx.tensor_layout(&tensor(&[8, 4], enc)).unwrap();
    assert_eq!(layout.in_dim_size(&Dim::REGISTER), 1);
    // 128 threads over 32 elements: every element held four times
    let hits = coverage(&layout);
    assert_eq!(hits.len(), 32);
    assert!(hits.values().all(|&n| n == 4));
    let masks = layout.free_variable_masks().unwrap();
    assert!(masks.contains(&(Dim::WARP, 0b11)));
}

#[test]
fn test_warp_count_mismatch_is_rejected() {
    let ctx = nvidia_ctx();
    let enc = blocked(&[1, 1], &[4, 8], &[2, 1], &[1, 0]);
    let err = ctx.tensor_layout(&tensor(&[16, 16], enc)).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { arg: "encoding", .. }));
}

// ============================================================================
// Allocation shapes
// ============================================================================

#[test]
fn test_shared_layout_uses_alloc_shape() {
    let ctx = nvidia_ctx();
    let enc = SwizzledSharedEncoding::new(4, 2, 4, &[1, 0], CtaLayout::single(2)).unwrap();

    let view = MemDescType::with_alloc_shape(&[16, 32], &[2, 32, 64], enc.clone(), DType::F16)
        .unwrap();
    assert_eq!(view.alloc_shape_for_rank(), &[32, 64]);
    let layout = ctx.memdesc_layout(&view).unwrap();
    assert_eq!(layout.out_shape(), vec![32, 64]);

    let too_small = MemDescType::with_alloc_shape(&[16, 32], &[16, 16], enc.clone(), DType::F16)
        .unwrap();
    assert!(ctx.memdesc_layout(&too_small).is_err());

    let not_pow2 = MemDescType::with_alloc_shape(&[16, 32], &[24, 32], enc, DType::F16).unwrap();
    assert!(matches!(
        ctx.memdesc_layout(&not_pow2),
        Err(Error::NotPowerOfTwo { .. })
    ));
}

#[test]
fn test_distributed_encoding_rejects_alloc_shape() {
    let ctx = nvidia_ctx();
    let enc: Encoding = blocked(&[1, 1], &[4, 8], &[4, 1], &[1, 0]).into();
    assert!(ctx.to_linear_layout(&[16, 16], &enc, &[16, 16]).is_err());
    assert!(MemDescType::new(&[16, 16], enc, DType::F16).is_err());
}
