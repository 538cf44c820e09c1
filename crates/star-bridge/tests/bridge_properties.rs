//! Integration tests for the host bridge, run against a small simulated
//! native library.

use pretty_assertions::assert_eq;
use star_bridge::array_bridge::{fixed_input, fixed_output};
use star_bridge::dynamic::{rows, ScratchSpec};
use star_bridge::{
    broadcast, broadcast_mixed, classify, BroadcastArg, BroadcastOutput, BroadcastRule, DType,
    ElementSlice, ElementSliceMut, ErrorCategory, ErrorState, HostArray, TranslationMode,
};
use star_ffi::ErrorSubsystem;

// ============================================================================
// Simulated native routines
// ============================================================================

/// Unit vector; signals ZEROVECTOR for the zero vector.
fn native_vhat(native: &mut ErrorSubsystem, v: &[f64], out: &mut [f64]) {
    native.enter("vhat");
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm == 0.0 {
        native.signal_code("ZEROVECTOR", "Input vector has zero length.");
    } else {
        for (o, x) in out.iter_mut().zip(v) {
            *o = x / norm;
        }
    }
    native.leave("vhat");
}

/// 3x3 matrix times 3-vector
fn native_mxv(native: &mut ErrorSubsystem, m: &[f64], v: &[f64], out: &mut [f64]) {
    native.enter("mxv");
    for (i, o) in out.iter_mut().enumerate() {
        *o = (0..3).map(|j| m[i * 3 + j] * v[j]).sum();
    }
    native.leave("mxv");
}

/// Writes `n` event windows of two doubles each
fn native_events(n: usize) -> impl FnOnce(&mut ErrorSubsystem, &mut [f64], &mut usize) {
    move |native, out, count| {
        native.enter("gfevnt");
        for (i, v) in out.iter_mut().take(n * 2).enumerate() {
            *v = 10.0 * i as f64;
        }
        *count = n;
        native.leave("gfevnt");
    }
}

/// Unbatched wrapper, as a host entry point would expose it
fn vhat(state: &mut ErrorState, v: &HostArray) -> star_bridge::BridgeResult<HostArray> {
    let arg = fixed_input::<f64>(state, "v", v, &[3])?;
    let mut out = fixed_output::<f64>(state, &[3])?;
    state.call("vhat_c", |native| native_vhat(native, &arg, out.as_mut_slice()))?;
    drop(arg);
    Ok(out.into_array().expect("output shape"))
}

// ============================================================================
// Classification scenarios
// ============================================================================

#[test]
fn test_classification_scenarios() {
    assert_eq!(classify("LIB(MALLOCFAILURE)"), ErrorCategory::Memory);
    assert_eq!(classify("LIB(INDEXOUTOFRANGE)"), ErrorCategory::Index);
    assert_eq!(classify("LIB(DIVIDEBYZERO)"), ErrorCategory::ZeroDivision);
    assert_eq!(classify("LIB(BODYNAMENOTFOUND)"), ErrorCategory::Key);
    assert_eq!(classify("LIB(NOTAREALCODE)"), ErrorCategory::Runtime);
}

// ============================================================================
// Dynamic outputs
// ============================================================================

#[test]
fn test_dynamic_rows_within_capacity() {
    let mut state = ErrorState::new();
    for k in [0, 1, 4, 8] {
        let arr = rows(&mut state, "gfevnt_c", &ScratchSpec::new(8), None, &[2], native_events(k)).unwrap();
        assert_eq!(arr.shape(), &[k, 2]);
        let expected: Vec<f64> = (0..k * 2).map(|i| 10.0 * i as f64).collect();
        assert_eq!(arr.to_vec::<f64>().unwrap(), expected);
    }
}

#[test]
fn test_dynamic_failure_matches_classifier() {
    for id in ["FILENOTFOUND", "INVALIDINDEX", "DIVIDEBYZERO", "NOTAREALCODE"] {
        let mut state = ErrorState::with_mode(TranslationMode::Silent);
        let arr = rows::<f64, _>(&mut state, "gfevnt_c", &ScratchSpec::new(4), None, &[2], |native, _, count| {
            *count = 3;
            native.signal_code(id, "simulated failure");
        })
        .unwrap();
        assert_eq!(arr.shape(), &[0, 2]);

        state.set_mode(TranslationMode::ClassifiedRaise);
        let err = state.raise_if_needed().unwrap_err();
        assert_eq!(err.category(), classify(err.short()));
    }
}

// ============================================================================
// Traceback depth
// ============================================================================

#[test]
fn test_depth_balanced_across_calls() {
    let mut state = ErrorState::new();
    state.enter("host");
    let before = state.depth();

    let good = HostArray::from_vec(vec![3.0, 0.0, 4.0], vec![3]).unwrap();
    let zero = HostArray::from_vec(vec![0.0; 3], vec![3]).unwrap();
    let bad_shape = HostArray::from_vec(vec![1.0; 2], vec![2]).unwrap();

    assert!(vhat(&mut state, &good).is_ok());
    assert_eq!(state.depth(), before);
    assert!(vhat(&mut state, &zero).is_err());
    assert_eq!(state.depth(), before);
    assert!(vhat(&mut state, &bad_shape).is_err());
    assert_eq!(state.depth(), before);

    let _ = rows(&mut state, "gfevnt_c", &ScratchSpec::new(1), None, &[2], native_events(5));
    assert_eq!(state.depth(), before);
    state.leave("host");
    assert!(!state.poll());
}

#[test]
fn test_trace_names_failing_chain() {
    let mut state = ErrorState::new();
    let zero = HostArray::from_vec(vec![0.0; 3], vec![3]).unwrap();
    let err = vhat(&mut state, &zero).unwrap_err();
    assert_eq!(err.diagnostic().trace, vec!["vhat_c".to_string(), "vhat".to_string()]);
    assert!(err.to_string().contains("vhat_c --> vhat"));
}

// ============================================================================
// Mode persistence
// ============================================================================

#[test]
fn test_mode_persists_until_changed() {
    let mut state = ErrorState::new();
    let zero = HostArray::from_vec(vec![0.0; 3], vec![3]).unwrap();

    state.set_mode(TranslationMode::Silent);
    for _ in 0..3 {
        assert!(vhat(&mut state, &zero).is_ok());
        assert!(state.poll());
        state.reset();
    }

    state.set_mode(TranslationMode::GenericRaise);
    for _ in 0..3 {
        let err = vhat(&mut state, &zero).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Runtime);
    }

    state.set_mode(TranslationMode::Ignore);
    for _ in 0..3 {
        assert!(vhat(&mut state, &zero).is_ok());
        assert!(!state.poll());
    }
}

#[test]
fn test_ignore_clears_outstanding() {
    let mut state = ErrorState::with_mode(TranslationMode::Silent);
    let zero = HostArray::from_vec(vec![0.0; 3], vec![3]).unwrap();
    vhat(&mut state, &zero).unwrap();
    assert!(state.poll());
    state.set_mode(TranslationMode::Ignore);
    assert!(!state.poll());
}

// ============================================================================
// Broadcasting
// ============================================================================

fn batched_mxv(state: &mut ErrorState, m: &HostArray, v: &HostArray) -> star_bridge::BridgeResult<HostArray> {
    let mut out = broadcast(
        state,
        "mxv_c",
        &[BroadcastArg::new("m", m, &[3, 3]), BroadcastArg::new("v", v, &[3])],
        &[&[3]],
        BroadcastRule::Strict,
        |native, ins: &[&[f64]], outs: &mut [&mut [f64]]| native_mxv(native, ins[0], ins[1], &mut *outs[0]),
    )?;
    Ok(out.remove(0))
}

fn bits(xs: &[f64]) -> Vec<u64> {
    xs.iter().map(|x| x.to_bits()).collect()
}

fn rotation(angle: f64) -> Vec<f64> {
    let (s, c) = angle.sin_cos();
    vec![c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0]
}

#[test]
fn test_broadcast_unbatched_equivalence() {
    let mut state = ErrorState::new();
    let m = HostArray::from_vec(rotation(0.3), vec![3, 3]).unwrap();
    let v = HostArray::from_vec(vec![1.0, 2.0, 3.0], vec![3]).unwrap();

    let batched = batched_mxv(&mut state, &m, &v).unwrap();
    assert_eq!(batched.shape(), &[3]);

    let mut direct = [0.0; 3];
    native_mxv(state.native_mut(), &rotation(0.3), &[1.0, 2.0, 3.0], &mut direct);
    assert_eq!(bits(&batched.to_vec::<f64>().unwrap()), bits(&direct));
}

#[test]
fn test_broadcast_differential() {
    const B: usize = 5;
    let mut state = ErrorState::new();
    let ms: Vec<f64> = (0..B).flat_map(|i| rotation(0.1 * i as f64)).collect();
    let vs: Vec<f64> = (0..B * 3).map(|i| i as f64 - 4.0).collect();
    let m = HostArray::from_vec(ms.clone(), vec![B, 3, 3]).unwrap();
    let v = HostArray::from_vec(vs.clone(), vec![B, 3]).unwrap();

    let batched = batched_mxv(&mut state, &m, &v).unwrap();
    assert_eq!(batched.shape(), &[B, 3]);
    let values = batched.to_vec::<f64>().unwrap();

    for i in 0..B {
        let mut expected = [0.0; 3];
        native_mxv(state.native_mut(), &ms[i * 9..(i + 1) * 9], &vs[i * 3..(i + 1) * 3], &mut expected);
        assert_eq!(&values[i * 3..(i + 1) * 3], &expected);
    }
}

#[test]
fn test_broadcast_failure_propagates_like_unbatched() {
    let mut state = ErrorState::new();
    let vs = HostArray::from_vec(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0], vec![2, 3]).unwrap();
    let err = broadcast(
        &mut state,
        "vhat_c",
        &[BroadcastArg::new("v", &vs, &[3])],
        &[&[3]],
        BroadcastRule::Strict,
        |native, ins: &[&[f64]], outs: &mut [&mut [f64]]| native_vhat(native, ins[0], &mut *outs[0]),
    )
    .unwrap_err();

    let zero = HostArray::from_vec(vec![0.0; 3], vec![3]).unwrap();
    let unbatched = vhat(&mut state, &zero).unwrap_err();
    assert_eq!(err.category(), unbatched.category());
    assert_eq!(err.short(), unbatched.short());
}

fn batched_vhat(state: &mut ErrorState, vs: &HostArray) -> star_bridge::BridgeResult<HostArray> {
    let mut out = broadcast(
        state,
        "vhat_c",
        &[BroadcastArg::new("v", vs, &[3])],
        &[&[3]],
        BroadcastRule::Strict,
        |native, ins: &[&[f64]], outs: &mut [&mut [f64]]| native_vhat(native, ins[0], &mut *outs[0]),
    )?;
    Ok(out.remove(0))
}

#[test]
fn test_broadcast_silent_stops_at_failure() {
    let mut state = ErrorState::with_mode(TranslationMode::Silent);
    let vs = HostArray::from_vec(vec![3.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 0.0], vec![3, 3]).unwrap();
    let out = batched_vhat(&mut state, &vs).unwrap();

    assert!(state.poll());
    assert_eq!(state.depth(), 0);
    // The first row ran, the failing row stopped the loop, the third never ran.
    assert_eq!(out.to_vec::<f64>().unwrap(), vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
}

#[test]
fn test_broadcast_ignore_continues_past_failure() {
    let mut state = ErrorState::with_mode(TranslationMode::Ignore);
    let vs = HostArray::from_vec(vec![3.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 0.0], vec![3, 3]).unwrap();
    let out = batched_vhat(&mut state, &vs).unwrap();

    assert!(!state.poll());
    assert_eq!(out.to_vec::<f64>().unwrap(), vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
}

#[test]
fn test_broadcast_singleton_rule() {
    let mut state = ErrorState::new();
    let ms: Vec<f64> = (0..2).flat_map(|i| rotation(0.5 * i as f64)).collect();
    let vs: Vec<f64> = (0..4 * 3).map(|i| i as f64).collect();
    let m = HostArray::from_vec(ms.clone(), vec![2, 1, 3, 3]).unwrap();
    let v = HostArray::from_vec(vs.clone(), vec![4, 3]).unwrap();

    let args = [BroadcastArg::new("m", &m, &[3, 3]), BroadcastArg::new("v", &v, &[3])];
    let mxv = |native: &mut ErrorSubsystem, ins: &[&[f64]], outs: &mut [&mut [f64]]| {
        native_mxv(native, ins[0], ins[1], &mut *outs[0])
    };

    let err = broadcast(&mut state, "mxv_c", &args, &[&[3]], BroadcastRule::Strict, mxv).unwrap_err();
    assert_eq!(err.short(), "LIB(BADARRAYSHAPE)");

    let out = broadcast(&mut state, "mxv_c", &args, &[&[3]], BroadcastRule::Singleton, mxv)
        .unwrap()
        .remove(0);
    assert_eq!(out.shape(), &[2, 4, 3]);
    let values = out.to_vec::<f64>().unwrap();
    for i in 0..2 {
        for j in 0..4 {
            let mut expected = [0.0; 3];
            native_mxv(state.native_mut(), &ms[i * 9..(i + 1) * 9], &vs[j * 3..(j + 1) * 3], &mut expected);
            let k = (i * 4 + j) * 3;
            assert_eq!(bits(&values[k..k + 3]), bits(&expected));
        }
    }
}

/// Position of body `id` scaled from `base`; bodies with negative IDs are
/// not found and leave the output untouched.
fn native_locate(native: &mut ErrorSubsystem, id: i32, base: &[f64], out: &mut [f64], found: &mut bool) {
    native.enter("locate");
    *found = id >= 0;
    if *found {
        for (o, b) in out.iter_mut().zip(base) {
            *o = b * f64::from(id);
        }
    }
    native.leave("locate");
}

#[test]
fn test_broadcast_mixed_types_differential() {
    const B: usize = 4;
    let mut state = ErrorState::new();
    let ids = vec![3i32, -1, 0, 7];
    let bases: Vec<f64> = (0..B * 3).map(|i| 0.5 * i as f64).collect();
    let id_arr = HostArray::from_vec(ids.clone(), vec![B]).unwrap();
    let base_arr = HostArray::from_vec(bases.clone(), vec![B, 3]).unwrap();

    let outs = broadcast_mixed(
        &mut state,
        "locate_c",
        &[BroadcastArg::new("id", &id_arr, &[]), BroadcastArg::new("base", &base_arr, &[3])],
        &[BroadcastOutput::new(DType::Float64, &[3]), BroadcastOutput::new(DType::Bool, &[])],
        BroadcastRule::Strict,
        |native, ins: &[ElementSlice<'_>], outs: &mut [ElementSliceMut<'_>]| {
            let (Some(id), Some(base)) = (ins[0].get::<i32>(), ins[1].get::<f64>()) else {
                return native.signal_code("WRONGDATATYPE", "unexpected argument types");
            };
            let (pos, flag) = outs.split_at_mut(1);
            match (pos[0].get_mut::<f64>(), flag[0].get_mut::<bool>()) {
                (Some(pos), Some(found)) => native_locate(native, id[0], base, pos, &mut found[0]),
                _ => native.signal_code("WRONGDATATYPE", "unexpected output types"),
            }
        },
    )
    .unwrap();

    assert_eq!(outs[0].shape(), &[B, 3]);
    assert_eq!(outs[1].shape(), &[B]);
    assert_eq!(outs[1].dtype(), DType::Bool);
    let positions = outs[0].to_vec::<f64>().unwrap();
    let flags = outs[1].to_vec::<bool>().unwrap();

    for i in 0..B {
        let mut expected = [0.0; 3];
        let mut found = false;
        native_locate(state.native_mut(), ids[i], &bases[i * 3..(i + 1) * 3], &mut expected, &mut found);
        assert_eq!(flags[i], found);
        assert_eq!(bits(&positions[i * 3..(i + 1) * 3]), bits(&expected));
    }
}

#[test]
fn test_inout_aliasing_does_not_hang() {
    use star_bridge::array_bridge::inout_arg;

    let mut state = ErrorState::new();
    let v = HostArray::from_vec(vec![1.0, 2.0, 3.0], vec![3]).unwrap();
    let mut acc = inout_arg::<f64>(&mut state, "acc", &v, &[3]).unwrap();
    let err = fixed_input::<f64>(&mut state, "v", &v.clone(), &[3]).err().unwrap();
    assert_eq!(err.category(), ErrorCategory::Value);
    assert_eq!(err.short(), "LIB(ALIASEDARGUMENT)");

    acc.as_mut_slice()[2] = 9.0;
    acc.commit(&mut state, "acc").unwrap();
    assert_eq!(v.to_vec::<f64>().unwrap(), vec![1.0, 2.0, 9.0]);
}

// ============================================================================
// Round trip
// ============================================================================

#[test]
fn test_output_feeds_back_zero_copy() {
    let mut state = ErrorState::new();
    let v = HostArray::from_vec(vec![0.0, 3.0, 4.0], vec![3]).unwrap();
    let unit = vhat(&mut state, &v).unwrap();

    let arg = fixed_input::<f64>(&mut state, "v", &unit, &[3]).unwrap();
    assert!(arg.is_zero_copy());
    assert_eq!(arg.as_slice(), &[0.0, 0.6, 0.8]);

    let batch = HostArray::from_vec(vec![1.0; 6], vec![2, 3]).unwrap();
    let row = batch.slice(&[1, 0], &[2, 3]).unwrap().reshape(vec![3]).unwrap();
    assert!(fixed_input::<f64>(&mut state, "v", &row, &[3]).unwrap().is_zero_copy());
}
