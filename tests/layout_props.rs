//! Property tests for the layout algebra and register lowering

mod common;

use common::{blocked, nvidia_ctx, tensor};
use linlayout::layout::{reshape_layout, Dim, LinearLayout};
use linlayout::lowering::{self, emit_offsets};
use proptest::prelude::*;
use proptest::sample::select;

/// One input dimension mapped onto one output, either as identity or broadcast.
#[derive(Clone, Debug)]
struct Piece {
    in_dim: usize,
    log2: u32,
    out_dim: usize,
    zero: bool,
}

const IN_DIMS: [Dim; 3] = [Dim::REGISTER, Dim::LANE, Dim::WARP];

fn piece() -> impl Strategy<Value = Piece> {
    (0..3usize, 0..3u32, 0..2usize, any::<bool>()).prop_map(|(in_dim, log2, out_dim, zero)| Piece {
        in_dim,
        log2,
        out_dim,
        zero,
    })
}

/// A product of pieces with inputs and outputs in a fixed global order, so
/// any two such layouts can be multiplied.
fn factor(mut pieces: Vec<Piece>) -> LinearLayout {
    pieces.sort_by_key(|p| (p.in_dim, p.out_dim));
    let mut l = LinearLayout::empty();
    for p in pieces {
        let (i, o) = (IN_DIMS[p.in_dim].clone(), Dim::out(p.out_dim));
        let part = if p.zero {
            LinearLayout::zeros_1d(1 << p.log2, i, o)
        } else {
            LinearLayout::identity_1d(1 << p.log2, i, o)
        };
        l = l.try_mul(&part.unwrap()).unwrap();
    }
    let outs: Vec<Dim> = (0..2)
        .map(Dim::out)
        .filter(|d| l.out_dim_names().any(|o| o == d))
        .collect();
    l.transpose_outs(&outs).unwrap()
}

fn layout() -> impl Strategy<Value = LinearLayout> {
    prop::collection::vec(piece(), 1..4).prop_map(factor)
}

proptest! {
    #[test]
    fn product_is_associative(a in layout(), b in layout(), c in layout()) {
        let left = a.try_mul(&b).unwrap().try_mul(&c).unwrap();
        let right = a.try_mul(&b.try_mul(&c).unwrap()).unwrap();
        prop_assert_eq!(left, right);
    }

    #[test]
    fn identity_inverse_composes_to_identity(log2 in 0..10u32) {
        let l = LinearLayout::identity_1d(1 << log2, Dim::new("x"), Dim::new("y")).unwrap();
        let round = l.compose(&l.invert().unwrap()).unwrap();
        prop_assert_eq!(round, LinearLayout::identity_1d(1 << log2, Dim::new("x"), Dim::new("x")).unwrap());
    }

    #[test]
    fn join_then_split_round_trips(
        run in select(vec![1u32, 2, 4, 8]),
        row_repeats in select(vec![1i64, 2, 4]),
    ) {
        let ctx = nvidia_ctx();
        let enc = blocked(&[1, run, 2], &[32, 1, 1], &[4, 1, 1], &[1, 2, 0]);
        let dst = tensor(&[128 * row_repeats, i64::from(run), 2], enc);
        let n = ctx.elems_per_thread(&dst).unwrap() / 2;
        let lhs: Vec<usize> = (0..n).collect();
        let rhs: Vec<usize> = (n..2 * n).collect();

        let joined = lowering::join(&ctx, &dst, &lhs, &rhs).unwrap();
        let run = run as usize;
        for (i, chunk) in joined.chunks(2 * run).enumerate() {
            prop_assert_eq!(&chunk[..run], &lhs[i * run..(i + 1) * run]);
            prop_assert_eq!(&chunk[run..], &rhs[i * run..(i + 1) * run]);
        }
        let (l, r) = lowering::split(&ctx, &dst, &joined).unwrap();
        prop_assert_eq!(l, lhs);
        prop_assert_eq!(r, rhs);
    }

    #[test]
    fn broadcast_is_idempotent(
        rows in select(vec![16i64, 32, 64, 128]),
        cols in select(vec![8i64, 32, 64]),
        spt in select(vec![[1u32, 1], [2, 2], [1, 4], [4, 1]]),
    ) {
        let ctx = nvidia_ctx();
        let enc = blocked(&spt, &[4, 8], &[4, 1], &[1, 0]);
        let src = tensor(&[rows, 1], enc.clone());
        let dst = tensor(&[rows, cols], enc);
        let vals: Vec<i32> = emit_offsets(&ctx, &src).unwrap().iter().map(|o| o[0]).collect();

        let once = lowering::broadcast(&ctx, &src, &dst, &vals).unwrap();
        let twice = lowering::broadcast(&ctx, &dst, &dst, &once).unwrap();
        prop_assert_eq!(&once, &twice);
        let offsets = emit_offsets(&ctx, &dst).unwrap();
        for (v, o) in once.iter().zip(&offsets) {
            prop_assert_eq!(*v, o[0]);
        }
    }

    #[test]
    fn reshape_layout_round_trips(
        rows in select(vec![16i64, 32, 64]),
        cols in select(vec![8i64, 32, 128]),
    ) {
        let ctx = nvidia_ctx();
        let enc = blocked(&[1, 4], &[4, 8], &[4, 1], &[1, 0]);
        let l = ctx.tensor_layout(&tensor(&[rows, cols], enc)).unwrap();
        let flat = reshape_layout(&l, &[rows * cols]).unwrap();
        prop_assert_eq!(flat.out_shape(), vec![rows * cols]);
        let back = reshape_layout(&flat, &[rows, cols]).unwrap();
        prop_assert_eq!(&back, l.as_ref());
    }
}
