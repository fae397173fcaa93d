//! The context: owner of the type library and entry point for every operation.

use std::fmt;

use crate::codec::{decoder, encoder, size, InstanceInfo, InstanceRef, LoadedInstance};
use crate::error::{DlError, ErrorCode, Result};
use crate::parser::{schema_builder, schema_writer};
use crate::registry::TypeLibrary;
use crate::text;
use crate::types::{LayoutKind, TypeId};
use crate::value::Value;

/// Source of output buffers and of the scratch memory used to validate
/// packed instances.
pub trait Allocator {
    /// Allocate `size` zeroed bytes.
    fn allocate(&self, size: usize) -> Result<Vec<u8>>;
}

/// Heap allocation that reports failure instead of aborting.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    fn allocate(&self, size: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(size)
            .map_err(|_| DlError::AllocationFailure(size))?;
        buf.resize(size, 0);
        Ok(buf)
    }
}

/// Called with the code and message of every failing operation.
pub type ErrorCallback = Box<dyn Fn(ErrorCode, &str)>;

/// Context configuration
#[derive(Default)]
pub struct Config {
    allocator: Option<Box<dyn Allocator>>,
    error_callback: Option<ErrorCallback>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `allocator` for buffers the context hands out (default: [`SystemAllocator`])
    pub fn allocator(mut self, allocator: impl Allocator + 'static) -> Self {
        self.allocator = Some(Box::new(allocator));
        self
    }

    /// Report every error to `callback` as well as returning it
    pub fn error_callback(mut self, callback: impl Fn(ErrorCode, &str) + 'static) -> Self {
        self.error_callback = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("allocator", &self.allocator.as_ref().map(|_| "custom"))
            .field("error_callback", &self.error_callback.is_some())
            .finish()
    }
}

/// Holds the registered types. All operations are synchronous; registering
/// types needs `&mut self`, everything else reads.
pub struct Context {
    lib: TypeLibrary,
    allocator: Box<dyn Allocator>,
    error_callback: Option<ErrorCallback>,
}

impl Default for Context {
    fn default() -> Self {
        Context::new(Config::default())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("types", &self.lib.type_count())
            .field("enums", &self.lib.enum_count())
            .finish()
    }
}

impl Context {
    pub fn new(config: Config) -> Context {
        Context {
            lib: TypeLibrary::new(),
            allocator: config.allocator.unwrap_or_else(|| Box::new(SystemAllocator)),
            error_callback: config.error_callback,
        }
    }

    /// Release the context and everything it owns.
    pub fn destroy(self) {}

    pub fn library(&self) -> &TypeLibrary {
        &self.lib
    }

    // --- Type libraries ---

    /// Register a binary type library. On failure the registry is unchanged.
    pub fn load_library(&mut self, data: &[u8]) -> Result<()> {
        let result = self.lib.load_binary(data);
        self.report(result)
    }

    /// Register a text type library. On failure the registry is unchanged.
    pub fn load_txt_library(&mut self, text: &str) -> Result<()> {
        match schema_builder::build_library(&self.lib, text) {
            Ok(lib) => {
                self.lib = lib;
                Ok(())
            }
            Err(e) => self.report(Err(e)),
        }
    }

    /// Serialize every registered type into the binary type library format.
    pub fn write_library(&self) -> Result<Vec<u8>> {
        self.report(self.lib.write_binary())
    }

    /// Render every registered enum and type as a text type library.
    pub fn write_txt_library(&self) -> Result<String> {
        self.report(schema_writer::write_library(&self.lib))
    }

    // --- Store ---

    /// Packed size of `value` stored as `type_id`, header included.
    pub fn measure(&self, type_id: TypeId, value: &Value) -> Result<usize> {
        self.report(size::measure(&self.lib, type_id, value, LayoutKind::Packed))
    }

    /// Store `value` as a packed instance. An empty `out` only measures.
    pub fn store(&self, type_id: TypeId, value: &Value, out: &mut [u8]) -> Result<usize> {
        self.report(encoder::store(&self.lib, type_id, value, out))
    }

    pub fn store_to_vec(&self, type_id: TypeId, value: &Value) -> Result<Vec<u8>> {
        let result = self.measure_and_allocate(type_id, value).and_then(|mut buf| {
            encoder::store(&self.lib, type_id, value, &mut buf)?;
            Ok(buf)
        });
        self.report(result)
    }

    /// Re-pack a loaded in-memory instance.
    pub fn store_instance(&self, instance: &InstanceRef<'_>, out: &mut [u8]) -> Result<usize> {
        let result = instance
            .to_value()
            .and_then(|v| encoder::store(&self.lib, instance.type_desc().id, &v, out));
        self.report(result)
    }

    // --- Load ---

    /// Bytes needed to load `packed` in the in-memory layout.
    pub fn load_size(&self, type_id: TypeId, packed: &[u8]) -> Result<usize> {
        let result = decoder::prepare(&self.lib, &*self.allocator, type_id, packed)
            .map(|prepared| prepared.native_size());
        self.report(result)
    }

    /// Load `packed` into `out`. Nothing is written into `out` on failure.
    pub fn load(&self, type_id: TypeId, packed: &[u8], out: &mut [u8]) -> Result<usize> {
        self.report(decoder::load_with(&self.lib, &*self.allocator, type_id, packed, out))
    }

    /// Load into a buffer from the configured allocator.
    pub fn load_to_vec(&self, type_id: TypeId, packed: &[u8]) -> Result<LoadedInstance> {
        let result = self.load_into_vec(type_id, packed);
        self.report(result)
    }

    fn load_into_vec(&self, type_id: TypeId, packed: &[u8]) -> Result<LoadedInstance> {
        let prepared = decoder::prepare(&self.lib, &*self.allocator, type_id, packed)?;
        let mut buf = self.allocator.allocate(prepared.native_size())?;
        prepared.write(&mut buf)?;
        Ok(LoadedInstance::new(type_id, buf))
    }

    /// View an instance previously loaded into `buf`.
    pub fn instance<'a>(&'a self, type_id: TypeId, buf: &'a [u8]) -> Result<InstanceRef<'a>> {
        self.report(InstanceRef::new(&self.lib, type_id, buf))
    }

    /// Decode a packed instance into a [`Value`] without loading it.
    pub fn decode(&self, type_id: TypeId, packed: &[u8]) -> Result<Value> {
        self.report(decoder::decode_with(&self.lib, &*self.allocator, type_id, packed))
    }

    pub fn instance_info(&self, packed: &[u8]) -> Result<InstanceInfo> {
        self.report(decoder::instance_info(packed))
    }

    // --- Text ---

    /// Pack an instance literal. An empty `out` only measures.
    pub fn pack_text(&self, text: &str, out: &mut [u8]) -> Result<usize> {
        self.report(text::pack_text(&self.lib, text, out))
    }

    pub fn pack_text_to_vec(&self, text: &str) -> Result<Vec<u8>> {
        let result = text::parse_instance(&self.lib, text).and_then(|(type_id, value)| {
            let mut buf = self.measure_and_allocate(type_id, &value)?;
            encoder::store(&self.lib, type_id, &value, &mut buf)?;
            Ok(buf)
        });
        self.report(result)
    }

    pub fn unpack_text(&self, type_id: TypeId, packed: &[u8]) -> Result<String> {
        self.report(text::unpack_text_with(&self.lib, &*self.allocator, type_id, packed))
    }

    fn measure_and_allocate(&self, type_id: TypeId, value: &Value) -> Result<Vec<u8>> {
        let need = size::measure(&self.lib, type_id, value, LayoutKind::Packed)?;
        self.allocator.allocate(need)
    }

    fn report<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            let message = e.to_string();
            tracing::warn!(code = e.code() as u32, "{}", message);
            if let Some(callback) = &self.error_callback {
                callback(e.code(), &message);
            }
        }
        result
    }
}
