//! Batched Calls
//!
//! Native entry points take one vector or matrix per parameter. The
//! broadcaster lifts such an entry point to arrays with any number of leading
//! batch dimensions: the declared element shape is stripped from the end of
//! each argument, the remaining batch shapes are combined, and the entry point
//! runs once per batch index in row-major order.
//!
//! An argument with an empty batch shape is reused at every index. When every
//! batch shape is empty there is exactly one call.
//!
//! Every argument is marshalled at its own element type. [`broadcast_mixed`]
//! hands the entry point typed [`ElementSlice`]s, so float inputs can sit
//! next to integer IDs and boolean found flags; [`broadcast`] is the shorthand
//! for entry points whose inputs share one type and outputs another.
//!
//! Iterations share the native error state and run sequentially. A failure
//! stops the remaining iterations when the translation mode raises or is
//! `Silent`; in `Ignore` mode the error is cleared and iteration continues, as
//! it would for the same sequence of unbatched calls.

use serde::{Deserialize, Serialize};
use star_ffi::messages::codes;
use star_ffi::ErrorSubsystem;
use thiserror::Error;
use tracing::debug;

use crate::array_bridge::{fixed_output, varying_input, InputArg, OutputArg};
use crate::error::BridgeResult;
use crate::error_state::{ErrorState, TranslationMode};
use crate::host_array::{DType, Element, ElementSlice, ElementSliceMut, HostArray};

/// How non-empty batch shapes are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastRule {
    /// All non-empty batch shapes must be equal
    #[default]
    Strict,
    /// Right-aligned broadcasting; size-1 dimensions stretch
    Singleton,
}

/// Shapes that cannot be combined into one batch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ShapeMismatch(pub String);

/// An array argument and the element shape its parameter declares
#[derive(Debug, Clone, Copy)]
pub struct BroadcastArg<'a> {
    pub name: &'a str,
    pub array: &'a HostArray,
    pub element_shape: &'a [usize],
    /// Element type the parameter takes; the array's own type when unset
    pub dtype: Option<DType>,
}

impl<'a> BroadcastArg<'a> {
    pub fn new(name: &'a str, array: &'a HostArray, element_shape: &'a [usize]) -> Self {
        Self {
            name,
            array,
            element_shape,
            dtype: None,
        }
    }

    /// Marshal the argument as `dtype`
    pub fn with_dtype(self, dtype: DType) -> Self {
        Self {
            dtype: Some(dtype),
            ..self
        }
    }

    fn declared_dtype(&self) -> DType {
        self.dtype.unwrap_or(self.array.dtype())
    }
}

/// Element type and element shape of one output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastOutput<'a> {
    pub dtype: DType,
    pub element_shape: &'a [usize],
}

impl<'a> BroadcastOutput<'a> {
    pub fn new(dtype: DType, element_shape: &'a [usize]) -> Self {
        Self { dtype, element_shape }
    }
}

/// Batch shapes of one call and the combined shape to iterate over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastPlan {
    /// Batch shape of each argument
    pub batch_shapes: Vec<Vec<usize>>,
    /// Combined batch shape
    pub batch_shape: Vec<usize>,
}

impl BroadcastPlan {
    /// Build a plan from `(shape, element_shape)` pairs.
    pub fn build(args: &[(&[usize], &[usize])], rule: BroadcastRule) -> Result<Self, ShapeMismatch> {
        let mut batch_shapes = Vec::with_capacity(args.len());
        for (i, (shape, element)) in args.iter().enumerate() {
            let split = shape.len().checked_sub(element.len()).filter(|&s| shape[s..] == **element);
            match split {
                Some(s) => batch_shapes.push(shape[..s].to_vec()),
                None => {
                    return Err(ShapeMismatch(format!(
                        "Argument {} has shape {:?}; its trailing dimensions must be {:?}.",
                        i, shape, element
                    )))
                }
            }
        }

        let batch_shape = match rule {
            BroadcastRule::Strict => strict_shape(&batch_shapes)?,
            BroadcastRule::Singleton => singleton_shape(&batch_shapes)?,
        };
        Ok(Self {
            batch_shapes,
            batch_shape,
        })
    }

    /// Check if no argument carries batch dimensions
    pub fn is_direct(&self) -> bool {
        self.batch_shape.is_empty()
    }

    /// Number of calls the plan makes
    pub fn iterations(&self) -> usize {
        self.batch_shape.iter().product()
    }

    /// Row-major batch index into argument `arg` for combined index `flat`
    pub fn source_index(&self, arg: usize, flat: usize) -> usize {
        let own = &self.batch_shapes[arg];
        if own.is_empty() {
            return 0;
        }
        let lead = self.batch_shape.len() - own.len();
        let mut remaining = flat;
        let mut combined = vec![0usize; self.batch_shape.len()];
        for (d, &dim) in self.batch_shape.iter().enumerate().rev() {
            combined[d] = remaining % dim.max(1);
            remaining /= dim.max(1);
        }
        own.iter().enumerate().fold(0, |acc, (d, &dim)| {
            let idx = if dim == 1 { 0 } else { combined[lead + d] };
            acc * dim + idx
        })
    }
}

fn strict_shape(batch_shapes: &[Vec<usize>]) -> Result<Vec<usize>, ShapeMismatch> {
    let mut combined: Option<&Vec<usize>> = None;
    for shape in batch_shapes.iter().filter(|s| !s.is_empty()) {
        match combined {
            Some(c) if c != shape => {
                return Err(ShapeMismatch(format!(
                    "Batch shapes {:?} and {:?} are not equal.",
                    c, shape
                )))
            }
            _ => combined = Some(shape),
        }
    }
    Ok(combined.cloned().unwrap_or_default())
}

fn singleton_shape(batch_shapes: &[Vec<usize>]) -> Result<Vec<usize>, ShapeMismatch> {
    let ndim = batch_shapes.iter().map(|s| s.len()).max().unwrap_or(0);
    let mut combined = vec![1usize; ndim];
    for shape in batch_shapes {
        let lead = ndim - shape.len();
        for (d, &dim) in shape.iter().enumerate() {
            let slot = &mut combined[lead + d];
            if *slot == 1 {
                *slot = dim;
            } else if dim != 1 && dim != *slot {
                return Err(ShapeMismatch(format!(
                    "Batch shape {:?} cannot be broadcast against {:?}.",
                    shape, combined
                )));
            }
        }
    }
    Ok(combined)
}

/// A marshalled input, sliced per batch index
trait BatchSource {
    fn batch(&self, start: usize, len: usize) -> ElementSlice<'_>;
}

impl<T: Element> BatchSource for InputArg<'_, T> {
    fn batch(&self, start: usize, len: usize) -> ElementSlice<'_> {
        T::elements(&self.as_slice()[start..start + len])
    }
}

/// An allocated output, filled per batch index
trait BatchSink {
    fn batch_mut(&mut self, start: usize, len: usize) -> ElementSliceMut<'_>;
    fn finish(self: Box<Self>) -> Option<HostArray>;
}

impl<T: Element> BatchSink for OutputArg<T> {
    fn batch_mut(&mut self, start: usize, len: usize) -> ElementSliceMut<'_> {
        T::elements_mut(&mut self.as_mut_slice()[start..start + len])
    }

    fn finish(self: Box<Self>) -> Option<HostArray> {
        (*self).into_array()
    }
}

fn batch_source<'a>(
    state: &mut ErrorState,
    arg: &BroadcastArg<'a>,
) -> BridgeResult<Box<dyn BatchSource + 'a>> {
    Ok(match arg.declared_dtype() {
        DType::Bool => Box::new(varying_input::<bool>(state, arg.name, arg.array)?),
        DType::Int32 => Box::new(varying_input::<i32>(state, arg.name, arg.array)?),
        DType::Int64 => Box::new(varying_input::<i64>(state, arg.name, arg.array)?),
        DType::Float32 => Box::new(varying_input::<f32>(state, arg.name, arg.array)?),
        DType::Float64 => Box::new(varying_input::<f64>(state, arg.name, arg.array)?),
        DType::Text { .. } => {
            return Err(state.reject(
                codes::WRONG_DATA_TYPE,
                format!("Text argument '{}' cannot be broadcast.", arg.name),
            ))
        }
    })
}

fn batch_sink(state: &mut ErrorState, dtype: DType, shape: &[usize]) -> BridgeResult<Box<dyn BatchSink>> {
    Ok(match dtype {
        DType::Bool => Box::new(fixed_output::<bool>(state, shape)?),
        DType::Int32 => Box::new(fixed_output::<i32>(state, shape)?),
        DType::Int64 => Box::new(fixed_output::<i64>(state, shape)?),
        DType::Float32 => Box::new(fixed_output::<f32>(state, shape)?),
        DType::Float64 => Box::new(fixed_output::<f64>(state, shape)?),
        DType::Text { .. } => {
            return Err(state.reject(codes::WRONG_DATA_TYPE, "Text outputs cannot be broadcast."))
        }
    })
}

/// Run a scalar native entry point over batched arguments of any element
/// types.
///
/// Each input is marshalled as its declared type (see
/// [`BroadcastArg::with_dtype`]). Each output comes back shaped as the
/// combined batch shape followed by its element shape.
pub fn broadcast_mixed<F>(
    state: &mut ErrorState,
    name: &str,
    inputs: &[BroadcastArg<'_>],
    outputs: &[BroadcastOutput<'_>],
    rule: BroadcastRule,
    mut call: F,
) -> BridgeResult<Vec<HostArray>>
where
    F: FnMut(&mut ErrorSubsystem, &[ElementSlice<'_>], &mut [ElementSliceMut<'_>]),
{
    let shapes: Vec<(&[usize], &[usize])> = inputs
        .iter()
        .map(|a| (a.array.shape(), a.element_shape))
        .collect();
    let plan = match BroadcastPlan::build(&shapes, rule) {
        Ok(plan) => plan,
        Err(err) => return Err(state.reject(codes::BAD_ARRAY_SHAPE, err.to_string())),
    };
    debug!(name, batch = ?plan.batch_shape, rule = ?rule, "broadcast plan");

    let args: Vec<Box<dyn BatchSource + '_>> = inputs
        .iter()
        .map(|a| batch_source(state, a))
        .collect::<BridgeResult<_>>()?;
    let in_lens: Vec<usize> = inputs.iter().map(|a| a.element_shape.iter().product()).collect();

    let mut outs: Vec<Box<dyn BatchSink>> = outputs
        .iter()
        .map(|out| {
            let mut shape = plan.batch_shape.clone();
            shape.extend_from_slice(out.element_shape);
            batch_sink(state, out.dtype, &shape)
        })
        .collect::<BridgeResult<_>>()?;
    let out_lens: Vec<usize> = outputs.iter().map(|o| o.element_shape.iter().product()).collect();

    for flat in 0..plan.iterations() {
        let ins: Vec<ElementSlice<'_>> = args
            .iter()
            .zip(&in_lens)
            .enumerate()
            .map(|(i, (arg, &len))| arg.batch(plan.source_index(i, flat) * len, len))
            .collect();
        let mut slots: Vec<ElementSliceMut<'_>> = outs
            .iter_mut()
            .zip(&out_lens)
            .map(|(out, &len)| out.batch_mut(flat * len, len))
            .collect();

        state.enter(name);
        call(state.native_mut(), &ins, &mut slots);
        state.leave(name);

        if state.poll() {
            if state.mode() == TranslationMode::Silent {
                debug!(name, index = flat, "broadcast stopped at failing iteration");
                break;
            }
            state.raise_if_needed()?;
        }
    }
    drop(args);

    outs.into_iter()
        .map(|out| match out.finish() {
            Some(array) => Ok(array),
            None => Err(state.reject(codes::BUG, "broadcast output does not match its shape")),
        })
        .collect()
}

/// Run a scalar native entry point whose inputs all take `I` and outputs all
/// take `O` over batched arguments.
///
/// `outputs` lists the element shape of each output.
pub fn broadcast<I, O, F>(
    state: &mut ErrorState,
    name: &str,
    inputs: &[BroadcastArg<'_>],
    outputs: &[&[usize]],
    rule: BroadcastRule,
    mut call: F,
) -> BridgeResult<Vec<HostArray>>
where
    I: Element,
    O: Element,
    F: FnMut(&mut ErrorSubsystem, &[&[I]], &mut [&mut [O]]),
{
    let inputs: Vec<BroadcastArg<'_>> = inputs.iter().map(|a| a.with_dtype(I::DTYPE)).collect();
    let outputs: Vec<BroadcastOutput<'_>> = outputs
        .iter()
        .map(|element| BroadcastOutput::new(O::DTYPE, element))
        .collect();
    broadcast_mixed(state, name, &inputs, &outputs, rule, |native, ins, outs| {
        let ins: Option<Vec<&[I]>> = ins.iter().map(|s| s.get::<I>()).collect();
        let outs: Option<Vec<&mut [O]>> = outs.iter_mut().map(|s| s.get_mut::<O>()).collect();
        match (ins, outs) {
            (Some(ins), Some(mut outs)) => call(native, &ins, &mut outs),
            _ => native.signal_code(codes::BUG, "batched argument lost its element type"),
        }
    })
}
