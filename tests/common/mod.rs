//! Common test utilities
#![allow(dead_code)]

use linlayout::config::TargetConfig;
use linlayout::context::LayoutContext;
use linlayout::dtype::DType;
use linlayout::encoding::{BlockedEncoding, CtaLayout, Encoding};
use linlayout::layout::{Dim, LinearLayout};
use linlayout::types::TensorType;
use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a test subscriber honoring `RUST_LOG`, once per test binary
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A context for the default NVIDIA target with layout verification on
pub fn nvidia_ctx() -> LayoutContext {
    init_tracing();
    LayoutContext::new(TargetConfig::NVIDIA).expect("NVIDIA preset is valid")
}

/// Single-CTA blocked encoding
pub fn blocked(spt: &[u32], tpw: &[u32], wpc: &[u32], order: &[u32]) -> BlockedEncoding {
    BlockedEncoding::new(spt, tpw, wpc, order, CtaLayout::single(spt.len()))
        .expect("valid blocked encoding")
}

/// f32 tensor type
pub fn tensor(shape: &[i64], enc: impl Into<Encoding>) -> TensorType {
    TensorType::new(shape, enc, DType::F32).expect("valid tensor type")
}

/// Bases of one input dimension as plain vectors
pub fn bases(layout: &LinearLayout, dim: &Dim) -> Vec<Vec<i32>> {
    layout
        .in_dim_bases(dim)
        .expect("input dimension exists")
        .iter()
        .map(|b| b.to_vec())
        .collect()
}

/// Every output coordinate reached by some input, with its multiplicity
pub fn coverage(layout: &LinearLayout) -> std::collections::HashMap<Vec<i32>, usize> {
    let ins = layout.in_dims();
    let total: i64 = ins.iter().map(|(_, s)| i64::from(*s)).product();
    let mut hits = std::collections::HashMap::new();
    for flat in 0..total {
        let mut rest = flat;
        let point: Vec<(Dim, i32)> = ins
            .iter()
            .map(|(d, s)| {
                let v = (rest % i64::from(*s)) as i32;
                rest /= i64::from(*s);
                (d.clone(), v)
            })
            .collect();
        let out: Vec<i32> = layout
            .apply(&point)
            .expect("inputs in range")
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        *hits.entry(out).or_insert(0) += 1;
    }
    hits
}
