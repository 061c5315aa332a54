//! Typed device-visible storage
//!
//! A [`Resource`] is a handle to storage owned by its executor: a single
//! scalar or a variable-length array of `u32`, `i32`, or `f32`. Each resource
//! keeps a host shadow of its contents plus, once it has taken part in a
//! run, a device buffer. Transfers are implicit:
//!
//! - setters write the shadow and mark it dirty; the next run uploads it
//! - a run makes the device copy of each output authoritative; the next
//!   getter downloads it
//!
//! Once a resource holds data, accessors must use its element kind.
//! Scalar accessors on array data (and the reverse) are shape errors.
//!
//! # Example
//!
//! ```
//! use kiln_core::Executor;
//!
//! # fn main() -> kiln_core::Result<()> {
//! let executor = Executor::new()?;
//! let resource = executor.new_resource()?;
//!
//! resource.set_data_array_int32(&[-1, 0, 1])?;
//! assert_eq!(resource.get_data_array_int32()?.as_slice(), &[-1, 0, 1]);
//! assert!(resource.get_uint32().is_err());
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use crate::executor::Device;
use kiln_backends::{Backend, BufferHandle, ElementKind, Shape};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

/// Identifier of a resource within its executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

impl ResourceId {
    pub const fn new(id: u64) -> Self {
        ResourceId(id)
    }

    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res{}", self.0)
    }
}

// ================================================================================================
// Contents
// ================================================================================================

/// Host-side contents of a resource
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResourceData {
    /// Freshly created or cleared
    #[default]
    Empty,
    ScalarU32(u32),
    ScalarI32(i32),
    ScalarF32(f32),
    ArrayU32(Vec<u32>),
    ArrayI32(Vec<i32>),
    ArrayF32(Vec<f32>),
}

impl ResourceData {
    pub fn shape(&self) -> Option<Shape> {
        match self {
            ResourceData::Empty => None,
            ResourceData::ScalarU32(_) | ResourceData::ScalarI32(_) | ResourceData::ScalarF32(_) => Some(Shape::Scalar),
            ResourceData::ArrayU32(_) | ResourceData::ArrayI32(_) | ResourceData::ArrayF32(_) => Some(Shape::Array),
        }
    }

    pub fn kind(&self) -> Option<ElementKind> {
        match self {
            ResourceData::Empty => None,
            ResourceData::ScalarU32(_) | ResourceData::ArrayU32(_) => Some(ElementKind::U32),
            ResourceData::ScalarI32(_) | ResourceData::ArrayI32(_) => Some(ElementKind::I32),
            ResourceData::ScalarF32(_) | ResourceData::ArrayF32(_) => Some(ElementKind::F32),
        }
    }

    /// Element count: 0 when empty, 1 for a scalar
    pub fn len(&self) -> usize {
        match self {
            ResourceData::Empty => 0,
            ResourceData::ScalarU32(_) | ResourceData::ScalarI32(_) | ResourceData::ScalarF32(_) => 1,
            ResourceData::ArrayU32(values) => values.len(),
            ResourceData::ArrayI32(values) => values.len(),
            ResourceData::ArrayF32(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Native-endian bytes as laid out in device memory
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            ResourceData::Empty => Vec::new(),
            ResourceData::ScalarU32(value) => bytemuck::bytes_of(value).to_vec(),
            ResourceData::ScalarI32(value) => bytemuck::bytes_of(value).to_vec(),
            ResourceData::ScalarF32(value) => bytemuck::bytes_of(value).to_vec(),
            ResourceData::ArrayU32(values) => bytemuck::cast_slice(values).to_vec(),
            ResourceData::ArrayI32(values) => bytemuck::cast_slice(values).to_vec(),
            ResourceData::ArrayF32(values) => bytemuck::cast_slice(values).to_vec(),
        }
    }
}

impl fmt::Display for ResourceData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.shape(), self.kind()) {
            (Some(Shape::Array), Some(kind)) => write!(f, "{} array[{}]", kind, self.len()),
            (Some(shape), Some(kind)) => write!(f, "{} {}", kind, shape),
            _ => f.write_str("empty"),
        }
    }
}

/// Element types a resource can hold
pub trait Element: bytemuck::Pod + PartialEq + fmt::Debug + Send + Sync + 'static {
    const KIND: ElementKind;

    fn into_scalar(self) -> ResourceData;
    fn into_array(values: Vec<Self>) -> ResourceData;
    fn from_scalar(data: &ResourceData) -> Option<Self>;
    fn from_array(data: &ResourceData) -> Option<&[Self]>;
}

macro_rules! impl_element {
    ($ty:ty, $kind:ident, $scalar:ident, $array:ident) => {
        impl Element for $ty {
            const KIND: ElementKind = ElementKind::$kind;

            fn into_scalar(self) -> ResourceData {
                ResourceData::$scalar(self)
            }

            fn into_array(values: Vec<Self>) -> ResourceData {
                ResourceData::$array(values)
            }

            fn from_scalar(data: &ResourceData) -> Option<Self> {
                match data {
                    ResourceData::$scalar(value) => Some(*value),
                    _ => None,
                }
            }

            fn from_array(data: &ResourceData) -> Option<&[Self]> {
                match data {
                    ResourceData::$array(values) => Some(values),
                    _ => None,
                }
            }
        }
    };
}

impl_element!(u32, U32, ScalarU32, ArrayU32);
impl_element!(i32, I32, ScalarI32, ArrayI32);
impl_element!(f32, F32, ScalarF32, ArrayF32);

/// Host-owned copy of an array resource's contents
///
/// Independent of the resource and executor it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct DataArray<T> {
    values: Vec<T>,
}

impl<T> DataArray<T> {
    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<T> {
        self.values
    }
}

impl<T> Deref for DataArray<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.values
    }
}

impl<T> From<DataArray<T>> for Vec<T> {
    fn from(array: DataArray<T>) -> Self {
        array.values
    }
}

// ================================================================================================
// Storage (owned by the executor)
// ================================================================================================

/// Which copy of a resource is current
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Residency {
    /// Shadow is newer than the device buffer
    HostDirty,
    /// Shadow and device buffer agree (or nothing to upload)
    Synced,
    /// A run wrote the device buffer; the shadow is stale
    DeviceAuthoritative { shape: Shape, kind: ElementKind, len: usize },
}

/// Executor-side state of one resource
#[derive(Debug)]
pub(crate) struct Storage {
    data: ResourceData,
    residency: Residency,
    buffer: Option<BufferHandle>,
}

impl Storage {
    pub(crate) fn new() -> Self {
        Self {
            data: ResourceData::Empty,
            residency: Residency::Synced,
            buffer: None,
        }
    }

    /// Current shape and kind, `None` while empty
    pub(crate) fn layout(&self) -> Option<(Shape, ElementKind)> {
        match self.residency {
            Residency::DeviceAuthoritative { shape, kind, .. } => Some((shape, kind)),
            _ => self.data.shape().zip(self.data.kind()),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self.residency {
            Residency::DeviceAuthoritative { len, .. } => len,
            _ => self.data.len(),
        }
    }

    fn store(&mut self, data: ResourceData) {
        self.data = data;
        self.residency = Residency::HostDirty;
    }

    /// Make the device buffer current, returning the bytes transferred
    pub(crate) fn upload(&mut self, backend: &mut dyn Backend) -> Result<usize> {
        if self.residency != Residency::HostDirty {
            self.ensure_buffer(backend)?;
            return Ok(0);
        }

        let bytes = self.data.to_bytes();
        let buffer = match self.buffer {
            Some(buffer) => {
                backend.resize_buffer(buffer, bytes.len())?;
                buffer
            }
            None => backend.allocate_buffer(bytes.len())?,
        };
        self.buffer = Some(buffer);
        backend.copy_to_buffer(buffer, &bytes)?;
        self.residency = Residency::Synced;
        Ok(bytes.len())
    }

    /// Device buffer for this resource, allocating an empty one if needed
    pub(crate) fn ensure_buffer(&mut self, backend: &mut dyn Backend) -> Result<BufferHandle> {
        match self.buffer {
            Some(buffer) => Ok(buffer),
            None => {
                let buffer = backend.allocate_buffer(0)?;
                self.buffer = Some(buffer);
                Ok(buffer)
            }
        }
    }

    /// Record that a run wrote this resource's device buffer
    pub(crate) fn mark_written(&mut self, shape: Shape, kind: ElementKind, backend: &dyn Backend) -> Result<()> {
        let Some(buffer) = self.buffer else {
            return Ok(());
        };
        let len = match shape {
            Shape::Scalar => 1,
            Shape::Array => backend.buffer_size(buffer)? / kind.size_bytes(),
        };
        self.residency = Residency::DeviceAuthoritative { shape, kind, len };
        Ok(())
    }

    /// Bring the shadow up to date with an authoritative device copy
    fn sync(&mut self, backend: &dyn Backend) -> Result<()> {
        let Residency::DeviceAuthoritative { shape, kind, len } = self.residency else {
            return Ok(());
        };
        let Some(buffer) = self.buffer else {
            return Ok(());
        };

        self.data = match kind {
            ElementKind::U32 => download::<u32>(backend, buffer, shape, len)?,
            ElementKind::I32 => download::<i32>(backend, buffer, shape, len)?,
            ElementKind::F32 => download::<f32>(backend, buffer, shape, len)?,
        };
        self.residency = Residency::Synced;
        tracing::trace!(buffer = %buffer, elements = len, "resource_downloaded");
        Ok(())
    }

    /// Forget contents and free the device buffer
    pub(crate) fn release(&mut self, backend: &mut dyn Backend) -> Result<()> {
        self.data = ResourceData::Empty;
        self.residency = Residency::Synced;
        if let Some(buffer) = self.buffer.take() {
            backend.free_buffer(buffer)?;
        }
        Ok(())
    }
}

fn download<T: Element>(backend: &dyn Backend, buffer: BufferHandle, shape: Shape, len: usize) -> Result<ResourceData> {
    let mut values = vec![<T as bytemuck::Zeroable>::zeroed(); len];
    backend.copy_from_buffer(buffer, bytemuck::cast_slice_mut(&mut values))?;
    match shape {
        Shape::Array => Ok(T::into_array(values)),
        Shape::Scalar => values
            .first()
            .map(|value| value.into_scalar())
            .ok_or_else(|| Error::shape_mismatch(Shape::Scalar, "empty")),
    }
}

/// Check a layout against an accessor; shape is checked before kind
pub(crate) fn check_layout(layout: Option<(Shape, ElementKind)>, shape: Shape, kind: ElementKind) -> Result<()> {
    match layout {
        None => Err(Error::shape_mismatch(shape, "empty")),
        Some((actual, _)) if actual != shape => Err(Error::shape_mismatch(shape, actual)),
        Some((_, actual)) if actual != kind => Err(Error::type_mismatch(kind, actual)),
        Some(_) => Ok(()),
    }
}

// ================================================================================================
// Handle
// ================================================================================================

/// Handle to a typed resource owned by an [`Executor`](crate::Executor)
///
/// Dropping the handle releases the storage. Executables that still bind it
/// fail their next run with [`Error::DanglingBinding`].
pub struct Resource {
    id: ResourceId,
    executor_id: u64,
    device: Weak<Device>,
}

impl Resource {
    pub(crate) fn new(id: ResourceId, executor_id: u64, device: &Arc<Device>) -> Self {
        Self {
            id,
            executor_id,
            device: Arc::downgrade(device),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub(crate) fn executor_id(&self) -> u64 {
        self.executor_id
    }

    fn with_storage<R>(&self, f: impl FnOnce(&mut Storage, &Device) -> Result<R>) -> Result<R> {
        let device = self.device.upgrade().ok_or(Error::Destroyed("resource"))?;
        let mut resources = device.resources.lock();
        let storage = resources.get_mut(&self.id).ok_or(Error::Destroyed("resource"))?;
        f(storage, &device)
    }

    // ============================================================================================
    // Generic accessors
    // ============================================================================================

    /// Store a scalar, replacing previous contents of the same kind
    pub fn set_scalar<T: Element>(&self, value: T) -> Result<()> {
        self.with_storage(|storage, _| {
            match storage.layout() {
                Some((Shape::Array, _)) => return Err(Error::shape_mismatch(Shape::Scalar, Shape::Array)),
                Some((_, kind)) if kind != T::KIND => return Err(Error::type_mismatch(T::KIND, kind)),
                _ => {}
            }
            storage.store(value.into_scalar());
            Ok(())
        })
    }

    /// Read the scalar value
    pub fn get_scalar<T: Element>(&self) -> Result<T> {
        self.with_storage(|storage, device| {
            check_layout(storage.layout(), Shape::Scalar, T::KIND)?;
            storage.sync(&**device.backend.read())?;
            T::from_scalar(&storage.data).ok_or_else(|| Error::type_mismatch(T::KIND, &storage.data))
        })
    }

    /// Copy `values` into the resource, replacing prior contents and shape
    ///
    /// The kind must match the resource's current kind, if any.
    pub fn set_data_array<T: Element>(&self, values: &[T]) -> Result<()> {
        self.with_storage(|storage, _| {
            if let Some((_, kind)) = storage.layout() {
                if kind != T::KIND {
                    return Err(Error::type_mismatch(T::KIND, kind));
                }
            }
            let kind = T::KIND;
            storage.store(T::into_array(values.to_vec()));
            tracing::trace!(resource = %self.id, elements = values.len(), kind = %kind, "resource_array_set");
            Ok(())
        })
    }

    /// Snapshot the array contents
    pub fn get_data_array<T: Element>(&self) -> Result<DataArray<T>> {
        self.with_storage(|storage, device| {
            check_layout(storage.layout(), Shape::Array, T::KIND)?;
            storage.sync(&**device.backend.read())?;
            let values = T::from_array(&storage.data).ok_or_else(|| Error::type_mismatch(T::KIND, &storage.data))?;
            Ok(DataArray { values: values.to_vec() })
        })
    }

    // ============================================================================================
    // Typed accessors
    // ============================================================================================

    pub fn set_uint32(&self, value: u32) -> Result<()> {
        self.set_scalar(value)
    }

    pub fn set_int32(&self, value: i32) -> Result<()> {
        self.set_scalar(value)
    }

    pub fn set_float32(&self, value: f32) -> Result<()> {
        self.set_scalar(value)
    }

    pub fn get_uint32(&self) -> Result<u32> {
        self.get_scalar()
    }

    pub fn get_int32(&self) -> Result<i32> {
        self.get_scalar()
    }

    pub fn get_float32(&self) -> Result<f32> {
        self.get_scalar()
    }

    pub fn set_data_array_uint32(&self, values: &[u32]) -> Result<()> {
        self.set_data_array(values)
    }

    pub fn set_data_array_int32(&self, values: &[i32]) -> Result<()> {
        self.set_data_array(values)
    }

    pub fn set_data_array_float32(&self, values: &[f32]) -> Result<()> {
        self.set_data_array(values)
    }

    pub fn get_data_array_uint32(&self) -> Result<DataArray<u32>> {
        self.get_data_array()
    }

    pub fn get_data_array_int32(&self) -> Result<DataArray<i32>> {
        self.get_data_array()
    }

    pub fn get_data_array_float32(&self) -> Result<DataArray<f32>> {
        self.get_data_array()
    }

    // ============================================================================================
    // Introspection
    // ============================================================================================

    /// Reset to empty: kind and shape are forgotten, device storage freed
    pub fn clear(&self) -> Result<()> {
        self.with_storage(|storage, device| storage.release(&mut **device.backend.write()))
    }

    /// Element kind, `None` while empty
    pub fn kind(&self) -> Result<Option<ElementKind>> {
        self.with_storage(|storage, _| Ok(storage.layout().map(|(_, kind)| kind)))
    }

    /// Shape, `None` while empty
    pub fn shape(&self) -> Result<Option<Shape>> {
        self.with_storage(|storage, _| Ok(storage.layout().map(|(shape, _)| shape)))
    }

    /// Element count: 0 when empty, 1 for a scalar
    pub fn len(&self) -> Result<usize> {
        self.with_storage(|storage, _| Ok(storage.len()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|len| len == 0)
    }

    /// Release the resource now (same as dropping the handle)
    pub fn destroy(self) {}
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id)
            .field("executor", &self.executor_id)
            .finish()
    }
}

impl Drop for Resource {
    fn drop(&mut self) {
        if let Some(device) = self.device.upgrade() {
            device.release_resource(self.id);
        }
    }
}
