use std::fmt;

use serde::{Deserialize, Serialize};

use super::DType;

/// Where an array lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StorageType {
    /// Left to the backend, used for every transient the builder creates.
    #[default]
    Default,
    CpuHeap,
    GpuGlobal,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageType::Default => "Default",
            StorageType::CpuHeap => "CPU_Heap",
            StorageType::GpuGlobal => "GPU_Global",
        };
        f.write_str(name)
    }
}

/// Shape, layout and lifetime of one named SDFG array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataDescriptor {
    pub shape: Vec<usize>,
    pub dtype: DType,
    /// Strides in elements, one per dimension.
    pub strides: Vec<usize>,
    pub storage: StorageType,
    /// Transients are owned by the graph; non-transients are supplied by the caller.
    pub transient: bool,
}

impl DataDescriptor {
    /// A transient, row-major array on default storage.
    pub fn array(shape: Vec<usize>, dtype: DType) -> Self {
        let strides = row_major_strides(&shape);
        Self {
            shape,
            dtype,
            strides,
            storage: StorageType::Default,
            transient: true,
        }
    }

    pub fn with_strides(mut self, strides: Vec<usize>) -> Self {
        self.strides = strides;
        self
    }

    pub fn with_storage(mut self, storage: StorageType) -> Self {
        self.storage = storage;
        self
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Number of elements a buffer backing this descriptor must hold.
    pub fn required_len(&self) -> usize {
        if self.shape.iter().any(|&extent| extent == 0) {
            return 0;
        }
        1 + self
            .shape
            .iter()
            .zip(&self.strides)
            .map(|(extent, stride)| (extent - 1) * stride)
            .sum::<usize>()
    }

    /// Flat buffer offset of a multi-index, `None` when out of bounds.
    pub fn offset_of(&self, index: &[i64]) -> Option<usize> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut offset = 0usize;
        for ((&idx, &extent), &stride) in index.iter().zip(&self.shape).zip(&self.strides) {
            if idx < 0 || idx as usize >= extent {
                return None;
            }
            offset += idx as usize * stride;
        }
        Some(offset)
    }

    pub fn is_row_major(&self) -> bool {
        self.strides == row_major_strides(&self.shape)
    }
}

impl fmt::Display for DataDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims = self
            .shape
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("x");
        write!(f, "{}[{}]", self.dtype, dims)?;
        if !self.is_row_major() {
            let strides = self
                .strides
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " strides=({strides})")?;
        }
        if self.storage != StorageType::Default {
            write!(f, " @{}", self.storage)?;
        }
        if self.transient {
            f.write_str(" transient")?;
        }
        Ok(())
    }
}

/// C-order strides for `shape`, in elements.
pub fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for dim in (0..shape.len().saturating_sub(1)).rev() {
        strides[dim] = strides[dim + 1] * shape[dim + 1].max(1);
    }
    strides
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_and_offsets() {
        let desc = DataDescriptor::array(vec![2, 3, 4], DType::F64);
        assert_eq!(desc.strides, vec![12, 4, 1]);
        assert_eq!(desc.offset_of(&[1, 2, 3]), Some(23));
        assert_eq!(desc.offset_of(&[2, 0, 0]), None);
        assert_eq!(desc.required_len(), 24);

        let column_major = desc.clone().with_strides(vec![1, 2, 6]);
        assert!(!column_major.is_row_major());
        assert_eq!(column_major.offset_of(&[1, 2, 3]), Some(1 + 4 + 18));
        assert_eq!(column_major.required_len(), 24);
    }
}
