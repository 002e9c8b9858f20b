//! Host values passed into and returned from jitted functions.

use std::fmt;

use crate::error::{JaceError, JaceResult};
use crate::sdfg::{row_major_strides, DType, DataDescriptor, StorageType};

/// Payload of a single element, widened to the largest type of its category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl ScalarValue {
    pub fn as_f64(self) -> f64 {
        match self {
            ScalarValue::Bool(v) => f64::from(u8::from(v)),
            ScalarValue::Int(v) => v as f64,
            ScalarValue::UInt(v) => v as f64,
            ScalarValue::Float(v) => v,
        }
    }

    /// Integer view; floats truncate toward zero and saturate.
    pub fn as_i64(self) -> i64 {
        match self {
            ScalarValue::Bool(v) => i64::from(v),
            ScalarValue::Int(v) => v,
            ScalarValue::UInt(v) => v as i64,
            ScalarValue::Float(v) => v as i64,
        }
    }

    pub fn as_bool(self) -> bool {
        match self {
            ScalarValue::Bool(v) => v,
            ScalarValue::Int(v) => v != 0,
            ScalarValue::UInt(v) => v != 0,
            ScalarValue::Float(v) => v != 0.0,
        }
    }

    /// Converts to the representation of `dtype`, wrapping integers to its width.
    pub fn cast(self, dtype: DType) -> ScalarValue {
        match dtype {
            DType::Bool => ScalarValue::Bool(self.as_bool()),
            DType::I8 => ScalarValue::Int(i64::from(self.as_i64() as i8)),
            DType::I16 => ScalarValue::Int(i64::from(self.as_i64() as i16)),
            DType::I32 => ScalarValue::Int(i64::from(self.as_i64() as i32)),
            DType::I64 => ScalarValue::Int(self.as_i64()),
            DType::U8 => ScalarValue::UInt(u64::from(self.as_u64() as u8)),
            DType::U16 => ScalarValue::UInt(u64::from(self.as_u64() as u16)),
            DType::U32 => ScalarValue::UInt(u64::from(self.as_u64() as u32)),
            DType::U64 => ScalarValue::UInt(self.as_u64()),
            DType::F32 => ScalarValue::Float(f64::from(self.as_f64() as f32)),
            DType::F64 => ScalarValue::Float(self.as_f64()),
        }
    }

    fn as_u64(self) -> u64 {
        match self {
            ScalarValue::UInt(v) => v,
            ScalarValue::Float(v) => v as u64,
            other => other.as_i64() as u64,
        }
    }
}

/// A typed scalar, used for call arguments and inline jaxpr literals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scalar {
    dtype: DType,
    value: ScalarValue,
}

impl Scalar {
    pub fn new(dtype: DType, value: ScalarValue) -> Self {
        Self {
            dtype,
            value: value.cast(dtype),
        }
    }

    pub fn f64(value: f64) -> Self {
        Self::new(DType::F64, ScalarValue::Float(value))
    }

    pub fn f32(value: f32) -> Self {
        Self::new(DType::F32, ScalarValue::Float(f64::from(value)))
    }

    pub fn i64(value: i64) -> Self {
        Self::new(DType::I64, ScalarValue::Int(value))
    }

    pub fn i32(value: i32) -> Self {
        Self::new(DType::I32, ScalarValue::Int(i64::from(value)))
    }

    pub fn bool(value: bool) -> Self {
        Self::new(DType::Bool, ScalarValue::Bool(value))
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn value(&self) -> ScalarValue {
        self.value
    }

    /// Source text of the value as it appears inside tasklet code.
    pub fn to_code(&self) -> String {
        match self.value {
            ScalarValue::Bool(true) => "True".to_string(),
            ScalarValue::Bool(false) => "False".to_string(),
            ScalarValue::Int(v) => v.to_string(),
            ScalarValue::UInt(v) => v.to_string(),
            ScalarValue::Float(v) if v.is_nan() => "nan".to_string(),
            ScalarValue::Float(v) if v.is_infinite() => {
                if v > 0.0 { "inf" } else { "(-inf)" }.to_string()
            }
            ScalarValue::Float(v) if v < 0.0 => format!("({v:?})"),
            ScalarValue::Float(v) => format!("{v:?}"),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.to_code(), self.dtype)
    }
}

/// Dense host buffer with explicit strides, the array type of every call boundary.
///
/// Elements are stored little-endian at their natural width. Each instance owns its
/// allocation, so [`HostArray::data_ptr`] distinguishes copies from aliases.
#[derive(Debug, Clone, PartialEq)]
pub struct HostArray {
    dtype: DType,
    shape: Vec<usize>,
    strides: Vec<usize>,
    storage: StorageType,
    data: Vec<u8>,
}

impl HostArray {
    /// Zero-initialized row-major array.
    pub fn zeros(dtype: DType, shape: Vec<usize>) -> Self {
        let count: usize = shape.iter().product();
        Self {
            dtype,
            strides: row_major_strides(&shape),
            shape,
            storage: StorageType::CpuHeap,
            data: vec![0u8; count * dtype.size_in_bytes()],
        }
    }

    /// Zero-initialized array laid out like `desc`.
    pub fn for_descriptor(desc: &DataDescriptor) -> Self {
        Self {
            dtype: desc.dtype,
            shape: desc.shape.clone(),
            strides: desc.strides.clone(),
            storage: match desc.storage {
                StorageType::Default => StorageType::CpuHeap,
                other => other,
            },
            data: vec![0u8; desc.required_len() * desc.dtype.size_in_bytes()],
        }
    }

    fn from_values(
        dtype: DType,
        shape: Vec<usize>,
        values: impl ExactSizeIterator<Item = ScalarValue>,
    ) -> JaceResult<Self> {
        let count: usize = shape.iter().product();
        if values.len() != count {
            return Err(JaceError::argument(format!(
                "array data length ({}) does not match shape {shape:?}",
                values.len()
            )));
        }
        let mut array = Self::zeros(dtype, shape);
        for (offset, value) in values.enumerate() {
            array.set(offset, value);
        }
        Ok(array)
    }

    pub fn from_f64(shape: Vec<usize>, data: Vec<f64>) -> JaceResult<Self> {
        Self::from_values(DType::F64, shape, data.into_iter().map(ScalarValue::Float))
    }

    pub fn from_f32(shape: Vec<usize>, data: Vec<f32>) -> JaceResult<Self> {
        Self::from_values(
            DType::F32,
            shape,
            data.into_iter().map(|v| ScalarValue::Float(f64::from(v))),
        )
    }

    pub fn from_i64(shape: Vec<usize>, data: Vec<i64>) -> JaceResult<Self> {
        Self::from_values(DType::I64, shape, data.into_iter().map(ScalarValue::Int))
    }

    pub fn from_i32(shape: Vec<usize>, data: Vec<i32>) -> JaceResult<Self> {
        Self::from_values(
            DType::I32,
            shape,
            data.into_iter().map(|v| ScalarValue::Int(i64::from(v))),
        )
    }

    pub fn from_bool(shape: Vec<usize>, data: Vec<bool>) -> JaceResult<Self> {
        Self::from_values(DType::Bool, shape, data.into_iter().map(ScalarValue::Bool))
    }

    /// A one-element array of shape `(1,)` holding `scalar`.
    pub fn from_scalar(scalar: Scalar) -> Self {
        let mut array = Self::zeros(scalar.dtype(), vec![1]);
        array.set(0, scalar.value());
        array
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Strides in elements.
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn storage(&self) -> StorageType {
        self.storage
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Address of the backing allocation.
    pub fn data_ptr(&self) -> usize {
        self.data.as_ptr() as usize
    }

    /// Tags the array with a storage class. The buffer itself always stays on the host.
    pub fn with_storage(mut self, storage: StorageType) -> Self {
        self.storage = storage;
        self
    }

    /// Descriptor of this array as a non-transient graph argument.
    pub fn descriptor(&self) -> DataDescriptor {
        let mut desc = DataDescriptor::array(self.shape.clone(), self.dtype)
            .with_strides(self.strides.clone())
            .with_storage(self.storage);
        desc.transient = false;
        desc
    }

    /// Number of elements the buffer holds, including stride padding.
    pub fn buffer_len(&self) -> usize {
        self.data.len() / self.dtype.size_in_bytes()
    }

    /// Reads the element at a flat buffer offset.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is outside the buffer.
    pub fn get(&self, offset: usize) -> ScalarValue {
        let width = self.dtype.size_in_bytes();
        let bytes = &self.data[offset * width..(offset + 1) * width];
        let mut raw = [0u8; 8];
        raw[..width].copy_from_slice(bytes);
        match self.dtype {
            DType::Bool => ScalarValue::Bool(raw[0] != 0),
            DType::I8 => ScalarValue::Int(i64::from(raw[0] as i8)),
            DType::I16 => ScalarValue::Int(i64::from(i16::from_le_bytes([raw[0], raw[1]]))),
            DType::I32 => ScalarValue::Int(i64::from(i32::from_le_bytes([
                raw[0], raw[1], raw[2], raw[3],
            ]))),
            DType::I64 => ScalarValue::Int(i64::from_le_bytes(raw)),
            DType::U8 | DType::U16 | DType::U32 | DType::U64 => {
                ScalarValue::UInt(u64::from_le_bytes(raw))
            }
            DType::F32 => ScalarValue::Float(f64::from(f32::from_le_bytes([
                raw[0], raw[1], raw[2], raw[3],
            ]))),
            DType::F64 => ScalarValue::Float(f64::from_le_bytes(raw)),
        }
    }

    /// Writes `value`, converted to the array dtype, at a flat buffer offset.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is outside the buffer.
    pub fn set(&mut self, offset: usize, value: ScalarValue) {
        let width = self.dtype.size_in_bytes();
        let raw: [u8; 8] = match value.cast(self.dtype) {
            ScalarValue::Bool(v) => u64::from(v).to_le_bytes(),
            ScalarValue::Int(v) => v.to_le_bytes(),
            ScalarValue::UInt(v) => v.to_le_bytes(),
            ScalarValue::Float(v) if self.dtype == DType::F32 => {
                let mut raw = [0u8; 8];
                raw[..4].copy_from_slice(&(v as f32).to_le_bytes());
                raw
            }
            ScalarValue::Float(v) => v.to_le_bytes(),
        };
        self.data[offset * width..(offset + 1) * width].copy_from_slice(&raw[..width]);
    }

    /// Buffer offset of a multi-index.
    pub fn offset_of(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut offset = 0;
        for ((&idx, &extent), &stride) in index.iter().zip(&self.shape).zip(&self.strides) {
            if idx >= extent {
                return None;
            }
            offset += idx * stride;
        }
        Some(offset)
    }

    /// Buffer offsets of all elements in row-major logical order.
    pub fn logical_offsets(&self) -> Vec<usize> {
        let count = self.len();
        let mut offsets = Vec::with_capacity(count);
        let mut index = vec![0usize; self.shape.len()];
        for _ in 0..count {
            offsets.push(index.iter().zip(&self.strides).map(|(i, s)| i * s).sum());
            for dim in (0..index.len()).rev() {
                index[dim] += 1;
                if index[dim] < self.shape[dim] {
                    break;
                }
                index[dim] = 0;
            }
        }
        offsets
    }

    /// All elements in row-major logical order.
    pub fn values(&self) -> Vec<ScalarValue> {
        self.logical_offsets()
            .into_iter()
            .map(|offset| self.get(offset))
            .collect()
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.values().into_iter().map(ScalarValue::as_f64).collect()
    }

    pub fn to_i64_vec(&self) -> Vec<i64> {
        self.values().into_iter().map(ScalarValue::as_i64).collect()
    }

    pub fn to_bool_vec(&self) -> Vec<bool> {
        self.values().into_iter().map(ScalarValue::as_bool).collect()
    }

    /// Copy of the array with the same logical contents stored under new strides.
    pub fn relayout(&self, strides: Vec<usize>) -> JaceResult<Self> {
        if strides.len() != self.shape.len() {
            return Err(JaceError::argument(format!(
                "{} strides given for an array of rank {}",
                strides.len(),
                self.shape.len()
            )));
        }
        let desc = DataDescriptor::array(self.shape.clone(), self.dtype)
            .with_strides(strides)
            .with_storage(self.storage);
        let mut out = Self::for_descriptor(&desc);
        for (dst, value) in out.logical_offsets().into_iter().zip(self.values()) {
            out.set(dst, value);
        }
        Ok(out)
    }

    /// Same elements under a new row-major shape of equal size.
    pub fn reshape(&self, shape: Vec<usize>) -> JaceResult<Self> {
        let count: usize = shape.iter().product();
        if count != self.len() {
            return Err(JaceError::argument(format!(
                "can not reshape {:?} into {shape:?}",
                self.shape
            )));
        }
        Self::from_values(self.dtype, shape, self.values().into_iter())
            .map(|array| array.with_storage(self.storage))
    }
}

/// A positional call argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Array(HostArray),
    Scalar(Scalar),
    /// Nested structure; never accepted by the pipeline.
    Tuple(Vec<Value>),
}

impl From<HostArray> for Value {
    fn from(array: HostArray) -> Self {
        Value::Array(array)
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        Value::Scalar(scalar)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Scalar(Scalar::f64(value))
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Scalar(Scalar::f32(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Scalar(Scalar::i64(value))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Scalar(Scalar::i32(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Scalar(Scalar::bool(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relayout_keeps_logical_order() {
        let a = HostArray::from_i64(vec![2, 3], vec![1, 2, 3, 4, 5, 6]).unwrap();
        let f = a.relayout(vec![1, 2]).unwrap();
        assert_eq!(f.strides(), &[1, 2]);
        assert_eq!(f.to_i64_vec(), a.to_i64_vec());
        assert_eq!(f.get(1), ScalarValue::Int(4));
        assert_ne!(f.data_ptr(), a.data_ptr());
    }

    #[test]
    fn narrow_types_wrap_and_round_trip() {
        let mut a = HostArray::zeros(DType::I8, vec![2]);
        a.set(0, ScalarValue::Int(130));
        a.set(1, ScalarValue::Float(-3.7));
        assert_eq!(a.to_i64_vec(), vec![-126, -3]);

        let b = HostArray::from_f32(vec![1], vec![0.5]).unwrap();
        assert_eq!(b.to_f64_vec(), vec![0.5]);
    }

    #[test]
    fn literal_code() {
        assert_eq!(Scalar::f64(1.0).to_code(), "1.0");
        assert_eq!(Scalar::f64(-2.5).to_code(), "(-2.5)");
        assert_eq!(Scalar::bool(true).to_code(), "True");
        assert_eq!(Scalar::i32(-4).to_code(), "-4");
        assert_eq!(Scalar::f64(f64::INFINITY).to_code(), "inf");
    }
}
