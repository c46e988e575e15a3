//! Workload buffers and their generation.

use crate::config::{Capability, ElementType, WorkloadShape};
use crate::error::{BenchError, Result};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A typed, owned element buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Buffer {
    F32(Vec<f32>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    Bytes(Vec<u8>),
}

impl Buffer {
    /// Allocate a zero-filled buffer, failing instead of aborting when the
    /// allocator cannot satisfy the request.
    pub fn zeroed(element: ElementType, len: usize) -> Result<Self> {
        Ok(match element {
            ElementType::F32 => Buffer::F32(alloc_zeroed(len)?),
            ElementType::I16 => Buffer::I16(alloc_zeroed(len)?),
            ElementType::I32 => Buffer::I32(alloc_zeroed(len)?),
            ElementType::Bytes => Buffer::Bytes(alloc_zeroed(len)?),
        })
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            Buffer::F32(_) => ElementType::F32,
            Buffer::I16(_) => ElementType::I16,
            Buffer::I32(_) => ElementType::I32,
            Buffer::Bytes(_) => ElementType::Bytes,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Buffer::F32(v) => v.len(),
            Buffer::I16(v) => v.len(),
            Buffer::I32(v) => v.len(),
            Buffer::Bytes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite every element with zero.
    pub fn reset(&mut self) {
        match self {
            Buffer::F32(v) => v.fill(0.0),
            Buffer::I16(v) => v.fill(0),
            Buffer::I32(v) => v.fill(0),
            Buffer::Bytes(v) => v.fill(0),
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            Buffer::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<&[i16]> {
        match self {
            Buffer::I16(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            Buffer::I32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Buffer::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn f32_mut(&mut self) -> Result<&mut [f32]> {
        match self {
            Buffer::F32(v) => Ok(v),
            other => Err(type_error("output", ElementType::F32, other)),
        }
    }

    pub fn i16_mut(&mut self) -> Result<&mut [i16]> {
        match self {
            Buffer::I16(v) => Ok(v),
            other => Err(type_error("output", ElementType::I16, other)),
        }
    }

    pub fn i32_mut(&mut self) -> Result<&mut [i32]> {
        match self {
            Buffer::I32(v) => Ok(v),
            other => Err(type_error("output", ElementType::I32, other)),
        }
    }

    pub fn bytes_mut(&mut self) -> Result<&mut [u8]> {
        match self {
            Buffer::Bytes(v) => Ok(v),
            other => Err(type_error("output", ElementType::Bytes, other)),
        }
    }
}

fn type_error(buffer: &str, expected: ElementType, actual: &Buffer) -> BenchError {
    BenchError::BufferType {
        buffer: buffer.to_string(),
        expected,
        actual: actual.element_type(),
    }
}

fn alloc_zeroed<T: Copy + Default>(len: usize) -> Result<Vec<T>> {
    let requested_bytes = len.saturating_mul(std::mem::size_of::<T>());
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| BenchError::Allocation { requested_bytes })?;
    buffer.resize(len, T::default());
    Ok(buffer)
}

/// Read-only view of a workload's inputs handed to a kernel.
#[derive(Clone, Copy)]
pub struct KernelInputs<'a> {
    pub shape: WorkloadShape,
    buffers: &'a [Buffer],
}

impl<'a> KernelInputs<'a> {
    pub fn new(shape: WorkloadShape, buffers: &'a [Buffer]) -> Self {
        Self { shape, buffers }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn f32(&self, index: usize) -> Result<&'a [f32]> {
        let buffer = self.get(index)?;
        buffer
            .as_f32()
            .ok_or_else(|| type_error(&format!("input {index}"), ElementType::F32, buffer))
    }

    pub fn i16(&self, index: usize) -> Result<&'a [i16]> {
        let buffer = self.get(index)?;
        buffer
            .as_i16()
            .ok_or_else(|| type_error(&format!("input {index}"), ElementType::I16, buffer))
    }

    pub fn bytes(&self, index: usize) -> Result<&'a [u8]> {
        let buffer = self.get(index)?;
        buffer
            .as_bytes()
            .ok_or_else(|| type_error(&format!("input {index}"), ElementType::Bytes, buffer))
    }

    fn get(&self, index: usize) -> Result<&'a Buffer> {
        self.buffers.get(index).ok_or_else(|| {
            BenchError::InvalidShape(format!(
                "{} workload has {} inputs, kernel asked for input {}",
                self.shape.capability,
                self.buffers.len(),
                index
            ))
        })
    }
}

/// Inputs plus the output buffer for one sweep point.
///
/// All buffers share one element count. The output starts zeroed and the
/// runner zeroes it again before every kernel invocation.
#[derive(Debug, Clone)]
pub struct Workload {
    shape: WorkloadShape,
    inputs: Vec<Buffer>,
    output: Buffer,
}

impl Workload {
    pub fn shape(&self) -> WorkloadShape {
        self.shape
    }

    pub fn inputs(&self) -> &[Buffer] {
        &self.inputs
    }

    pub fn output(&self) -> &Buffer {
        &self.output
    }

    pub fn reset_output(&mut self) {
        self.output.reset();
    }

    /// Borrow the inputs immutably and the output mutably at the same time.
    pub fn split_mut(&mut self) -> (KernelInputs<'_>, &mut Buffer) {
        (KernelInputs::new(self.shape, &self.inputs), &mut self.output)
    }

    /// Row-major `n x n` view of a matrix buffer belonging to this workload.
    pub fn matrix_view<'a>(&self, buffer: &'a Buffer) -> Option<ArrayView2<'a, f32>> {
        if self.shape.capability != Capability::MatrixMultiply {
            return None;
        }
        let n = self.shape.size;
        ArrayView2::from_shape((n, n), buffer.as_f32()?).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FillPolicy {
    /// `buffer[i] = i`, wrapped to the element type.
    #[default]
    Sequential,
    /// Pseudo-random contents; floats fall in `[0, 1)`.
    Seeded(u64),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkloadGenerator {
    fill: FillPolicy,
}

impl WorkloadGenerator {
    pub fn new(fill: FillPolicy) -> Self {
        Self { fill }
    }

    pub fn sequential() -> Self {
        Self::new(FillPolicy::Sequential)
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(FillPolicy::Seeded(seed))
    }

    /// Allocate and fill the inputs for `shape` plus a zeroed output.
    ///
    /// Calling this twice with the same shape yields identical buffers.
    pub fn generate(&self, shape: WorkloadShape) -> Result<Workload> {
        if shape.size == 0 {
            return Err(BenchError::InvalidShape(format!(
                "{} workload size must be at least 1",
                shape.capability
            )));
        }
        let len = shape.element_count().ok_or(BenchError::Allocation {
            requested_bytes: usize::MAX,
        })?;
        let requested_bytes = shape.footprint_bytes().ok_or(BenchError::Allocation {
            requested_bytes: usize::MAX,
        })?;

        let element = shape.element_type();
        let mut rng = match self.fill {
            FillPolicy::Seeded(seed) => Some(fastrand::Rng::with_seed(seed)),
            FillPolicy::Sequential => None,
        };

        let mut inputs = Vec::with_capacity(shape.input_count());
        for _ in 0..shape.input_count() {
            let mut buffer = Buffer::zeroed(element, len)?;
            populate(&mut buffer, rng.as_mut());
            inputs.push(buffer);
        }
        let output = Buffer::zeroed(element, len)?;

        debug!(
            capability = %shape.capability,
            shape = %shape,
            bytes = requested_bytes,
            fill = ?self.fill,
            "generated workload"
        );

        Ok(Workload {
            shape,
            inputs,
            output,
        })
    }
}

fn populate(buffer: &mut Buffer, rng: Option<&mut fastrand::Rng>) {
    match (buffer, rng) {
        (Buffer::F32(v), None) => v.iter_mut().enumerate().for_each(|(i, x)| *x = i as f32),
        (Buffer::I16(v), None) => v.iter_mut().enumerate().for_each(|(i, x)| *x = i as i16),
        (Buffer::I32(v), None) => v.iter_mut().enumerate().for_each(|(i, x)| *x = i as i32),
        (Buffer::Bytes(v), None) => v.iter_mut().enumerate().for_each(|(i, x)| *x = i as u8),
        (Buffer::F32(v), Some(rng)) => v.iter_mut().for_each(|x| *x = rng.f32()),
        (Buffer::I16(v), Some(rng)) => v.iter_mut().for_each(|x| *x = rng.i16(..)),
        (Buffer::I32(v), Some(rng)) => v.iter_mut().for_each(|x| *x = rng.i32(..)),
        (Buffer::Bytes(v), Some(rng)) => rng.fill(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_vector_inputs_count_up() {
        let workload = WorkloadGenerator::sequential()
            .generate(WorkloadShape::vector_add(256))
            .expect("workload");
        assert_eq!(workload.inputs().len(), 2);
        for input in workload.inputs() {
            let values = input.as_i16().expect("i16 input");
            assert!(values.iter().enumerate().all(|(i, v)| *v == i as i16));
        }
        assert!(workload.output().as_i16().unwrap().iter().all(|v| *v == 0));
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let generator = WorkloadGenerator::seeded(7);
        let a = generator.generate(WorkloadShape::matmul(8)).unwrap();
        let b = generator.generate(WorkloadShape::matmul(8)).unwrap();
        assert_eq!(a.inputs(), b.inputs());
        assert_ne!(a.inputs()[0], a.inputs()[1]);
        let values = a.inputs()[0].as_f32().unwrap();
        assert!(values.iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn zero_size_is_rejected() {
        let err = WorkloadGenerator::sequential()
            .generate(WorkloadShape::modify_in_place(0, 10))
            .unwrap_err();
        assert!(matches!(err, BenchError::InvalidShape(_)));
    }

    #[test]
    fn impossible_size_is_an_allocation_error() {
        let err = WorkloadGenerator::sequential()
            .generate(WorkloadShape::memory_copy(usize::MAX / 2))
            .unwrap_err();
        assert!(matches!(err, BenchError::Allocation { .. }));
    }

    #[test]
    fn reset_output_zeroes_previous_results() {
        let mut workload = WorkloadGenerator::sequential()
            .generate(WorkloadShape::memory_copy(2))
            .unwrap();
        let (_, output) = workload.split_mut();
        output.bytes_mut().unwrap().fill(0xAB);
        workload.reset_output();
        assert!(workload.output().as_bytes().unwrap().iter().all(|b| *b == 0));
    }

    #[test]
    fn matrix_view_is_row_major() {
        let workload = WorkloadGenerator::sequential()
            .generate(WorkloadShape::matmul(3))
            .unwrap();
        let view = workload.matrix_view(&workload.inputs()[0]).unwrap();
        assert_eq!(view[(1, 2)], 5.0);
        assert_eq!(view[(2, 0)], 6.0);
    }

    #[test]
    fn kernel_inputs_reject_wrong_element_type() {
        let workload = WorkloadGenerator::sequential()
            .generate(WorkloadShape::vector_add(4))
            .unwrap();
        let inputs = KernelInputs::new(workload.shape(), workload.inputs());
        assert!(inputs.i16(1).is_ok());
        assert!(matches!(
            inputs.f32(0).unwrap_err(),
            BenchError::BufferType { .. }
        ));
        assert!(matches!(
            inputs.i16(2).unwrap_err(),
            BenchError::InvalidShape(_)
        ));
    }
}
