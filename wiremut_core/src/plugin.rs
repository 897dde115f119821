//! Host-facing lifecycle of a mutator instance.
//!
//! [`CustomMutator`] is the versioned library contract; [`export_mutator!`]
//! turns any implementor into the `afl_custom_*` C ABI a fuzzing host loads
//! from a shared library. [`Plugin`] is the implementor backed by
//! [`WireMutator`].

use crate::config::WiremutConfig;
use crate::diagnostics;
use crate::engine::WireMutator;
use crate::mutator::MutatorError;
use log::LevelFilter;
use std::ffi::{CStr, CString};
use thiserror::Error;

/// Version of the [`CustomMutator`] contract. Bumped on any change to the
/// meaning of its methods or of the exported C symbols.
pub const PLUGIN_API_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Plugin configuration error: {0}")]
    Config(String),
    #[error("Mutator construction failed: {0}")]
    Mutator(#[from] MutatorError),
}

impl From<anyhow::Error> for PluginError {
    fn from(err: anyhow::Error) -> Self {
        PluginError::Config(format!("{err:#}"))
    }
}

#[allow(unused_variables)]
/// A mutator instance as seen by the fuzzing host.
///
/// One instance exists per fuzzing worker. Returned slices borrow the
/// instance and are valid until its next call; `None` means "no output,
/// skip this case" and is distinct from an empty slice.
pub trait CustomMutator {
    /// Creates an instance. Identical seeds yield identical mutation
    /// sequences.
    fn create(seed: u32) -> Result<Self, PluginError>
    where
        Self: Sized;

    fn fuzz_count(&mut self, buffer: &[u8]) -> u32 {
        1
    }

    /// Mutates `buffer`. `companion` is a second corpus entry the host may
    /// offer for splicing. The result must not exceed `max_size` bytes.
    fn mutate(
        &mut self,
        buffer: &[u8],
        companion: Option<&[u8]>,
        max_size: usize,
    ) -> Option<&[u8]>;

    /// Converts `buffer` into the form the target program consumes.
    fn finalize_for_execution(&mut self, buffer: &[u8]) -> Option<&[u8]>;

    fn describe(&mut self, max_description: usize) -> Option<&CStr> {
        None
    }

    /// Releases the instance. Consuming `self` makes a second release
    /// impossible.
    fn destroy(self)
    where
        Self: Sized,
    {
    }
}

/// The length-prefix mutator, configured from [`crate::config::CONFIG_ENV_VAR`].
pub struct Plugin {
    engine: WireMutator,
    description: CString,
}

impl Plugin {
    pub fn with_config(seed: u32, config: &WiremutConfig) -> Result<Self, PluginError> {
        Ok(Self {
            engine: WireMutator::new(seed, config)?,
            description: CString::default(),
        })
    }

    pub fn engine(&self) -> &WireMutator {
        &self.engine
    }
}

impl CustomMutator for Plugin {
    fn create(seed: u32) -> Result<Self, PluginError> {
        let config = WiremutConfig::from_env()?;
        diagnostics::init_logging(LevelFilter::from(config.diagnostics.level));
        Self::with_config(seed, &config)
    }

    fn fuzz_count(&mut self, buffer: &[u8]) -> u32 {
        self.engine.fuzz_count(buffer)
    }

    fn mutate(
        &mut self,
        buffer: &[u8],
        _companion: Option<&[u8]>,
        max_size: usize,
    ) -> Option<&[u8]> {
        self.engine.fuzz(buffer, max_size)
    }

    fn finalize_for_execution(&mut self, buffer: &[u8]) -> Option<&[u8]> {
        self.engine.post_process(buffer)
    }

    fn describe(&mut self, max_description: usize) -> Option<&CStr> {
        let mut text = self.engine.describe()?;
        text.truncate(max_description.saturating_sub(1));
        self.description = CString::new(text).ok()?;
        Some(self.description.as_c_str())
    }

    fn destroy(self) {
        log::debug!(target: diagnostics::LOG_TARGET, "[mutator] Cleaning up");
    }
}

/// Glue behind [`export_mutator!`]. Not part of the stable contract.
#[doc(hidden)]
pub mod ffi {
    use super::CustomMutator;
    use std::ffi::{CStr, c_char, c_uint, c_void};
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::ptr;

    /// # Safety
    /// `ptr` must be null or valid for `len` bytes for the returned lifetime.
    unsafe fn bytes<'a>(ptr: *const u8, len: usize) -> Option<&'a [u8]> {
        if ptr.is_null() {
            None
        } else {
            Some(unsafe { std::slice::from_raw_parts(ptr, len) })
        }
    }

    /// # Safety
    /// `out_buf` must be valid for a pointer write.
    unsafe fn publish(out_buf: *mut *const u8, result: Option<&[u8]>) -> usize {
        match result {
            Some(out) => {
                unsafe { *out_buf = out.as_ptr() };
                out.len()
            }
            None => 0,
        }
    }

    pub fn init<M: CustomMutator>(seed: c_uint) -> *mut c_void {
        match catch_unwind(|| M::create(seed)) {
            Ok(Ok(mutator)) => Box::into_raw(Box::new(mutator)).cast(),
            Ok(Err(e)) => {
                eprintln!("[mutator] custom mutator init failed: {e}");
                ptr::null_mut()
            }
            Err(_) => {
                eprintln!("[mutator] custom mutator init panicked");
                ptr::null_mut()
            }
        }
    }

    /// # Safety
    /// `data` must come from [`init`] for the same `M`; buffers must be valid
    /// for their stated sizes.
    pub unsafe fn fuzz<M: CustomMutator>(
        data: *mut c_void,
        buf: *const u8,
        buf_size: usize,
        out_buf: *mut *const u8,
        add_buf: *const u8,
        add_buf_size: usize,
        max_size: usize,
    ) -> usize {
        if out_buf.is_null() {
            return 0;
        }
        unsafe { *out_buf = ptr::null() };
        let Some(mutator) = (unsafe { data.cast::<M>().as_mut() }) else {
            return 0;
        };
        let input = unsafe { bytes(buf, buf_size) }.unwrap_or_default();
        let companion = unsafe { bytes(add_buf, add_buf_size) };
        catch_unwind(AssertUnwindSafe(|| {
            unsafe { publish(out_buf, mutator.mutate(input, companion, max_size)) }
        }))
        .unwrap_or(0)
    }

    /// # Safety
    /// Same requirements as [`fuzz`].
    pub unsafe fn post_process<M: CustomMutator>(
        data: *mut c_void,
        buf: *const u8,
        buf_size: usize,
        out_buf: *mut *const u8,
    ) -> usize {
        if out_buf.is_null() {
            return 0;
        }
        unsafe { *out_buf = ptr::null() };
        let Some(mutator) = (unsafe { data.cast::<M>().as_mut() }) else {
            return 0;
        };
        let input = unsafe { bytes(buf, buf_size) }.unwrap_or_default();
        catch_unwind(AssertUnwindSafe(|| {
            unsafe { publish(out_buf, mutator.finalize_for_execution(input)) }
        }))
        .unwrap_or(0)
    }

    /// # Safety
    /// Same requirements as [`fuzz`].
    pub unsafe fn fuzz_count<M: CustomMutator>(
        data: *mut c_void,
        buf: *const u8,
        buf_size: usize,
    ) -> u32 {
        let Some(mutator) = (unsafe { data.cast::<M>().as_mut() }) else {
            return 0;
        };
        let input = unsafe { bytes(buf, buf_size) }.unwrap_or_default();
        catch_unwind(AssertUnwindSafe(|| mutator.fuzz_count(input))).unwrap_or(0)
    }

    /// # Safety
    /// `data` must come from [`init`] for the same `M`.
    pub unsafe fn describe<M: CustomMutator>(
        data: *mut c_void,
        max_description_len: usize,
    ) -> *const c_char {
        let Some(mutator) = (unsafe { data.cast::<M>().as_mut() }) else {
            return ptr::null();
        };
        catch_unwind(AssertUnwindSafe(|| {
            mutator
                .describe(max_description_len)
                .map_or(ptr::null(), CStr::as_ptr)
        }))
        .unwrap_or(ptr::null())
    }

    /// # Safety
    /// `data` must come from [`init`] for the same `M` and must not be used
    /// again afterwards.
    pub unsafe fn deinit<M: CustomMutator>(data: *mut c_void) {
        if data.is_null() {
            return;
        }
        let mutator = unsafe { Box::from_raw(data.cast::<M>()) };
        let _ = catch_unwind(AssertUnwindSafe(move || (*mutator).destroy()));
    }
}

/// Exports the `afl_custom_*` symbols for a [`CustomMutator`] implementor.
///
/// Use from a `cdylib` crate:
/// ```ignore
/// wiremut_core::export_mutator!(wiremut_core::plugin::Plugin);
/// ```
#[macro_export]
macro_rules! export_mutator {
    ($mutator_type:ty) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn afl_custom_api_version() -> u32 {
            $crate::plugin::PLUGIN_API_VERSION
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn afl_custom_init(
            _afl: *mut ::std::ffi::c_void,
            seed: ::std::ffi::c_uint,
        ) -> *mut ::std::ffi::c_void {
            $crate::plugin::ffi::init::<$mutator_type>(seed)
        }

        /// # Safety
        /// Called by the fuzzing host with pointers it owns.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn afl_custom_fuzz(
            data: *mut ::std::ffi::c_void,
            buf: *const u8,
            buf_size: usize,
            out_buf: *mut *const u8,
            add_buf: *const u8,
            add_buf_size: usize,
            max_size: usize,
        ) -> usize {
            unsafe {
                $crate::plugin::ffi::fuzz::<$mutator_type>(
                    data,
                    buf,
                    buf_size,
                    out_buf,
                    add_buf,
                    add_buf_size,
                    max_size,
                )
            }
        }

        /// # Safety
        /// Called by the fuzzing host with pointers it owns.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn afl_custom_post_process(
            data: *mut ::std::ffi::c_void,
            buf: *const u8,
            buf_size: usize,
            out_buf: *mut *const u8,
        ) -> usize {
            unsafe {
                $crate::plugin::ffi::post_process::<$mutator_type>(data, buf, buf_size, out_buf)
            }
        }

        /// # Safety
        /// Called by the fuzzing host with pointers it owns.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn afl_custom_fuzz_count(
            data: *mut ::std::ffi::c_void,
            buf: *const u8,
            buf_size: usize,
        ) -> u32 {
            unsafe { $crate::plugin::ffi::fuzz_count::<$mutator_type>(data, buf, buf_size) }
        }

        /// # Safety
        /// Called by the fuzzing host with pointers it owns.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn afl_custom_describe(
            data: *mut ::std::ffi::c_void,
            max_description_len: usize,
        ) -> *const ::std::ffi::c_char {
            unsafe { $crate::plugin::ffi::describe::<$mutator_type>(data, max_description_len) }
        }

        /// # Safety
        /// Called once by the fuzzing host per instance.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn afl_custom_deinit(data: *mut ::std::ffi::c_void) {
            unsafe { $crate::plugin::ffi::deinit::<$mutator_type>(data) }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    const ABC: [u8; 7] = [0, 0, 0, 3, b'a', b'b', b'c'];

    fn plugin(seed: u32) -> Plugin {
        Plugin::with_config(seed, &WiremutConfig::default()).unwrap()
    }

    #[test]
    fn mutate_ignores_companion_buffer() {
        let mut with = plugin(5);
        let mut without = plugin(5);
        let a = with.mutate(&ABC, Some(b"other"), 256).map(<[u8]>::to_vec);
        let b = without.mutate(&ABC, None, 256).map(<[u8]>::to_vec);
        assert_eq!(a, b);
        assert!(a.unwrap().len() >= ABC.len());
    }

    #[test]
    fn finalize_for_execution_strips_framing() {
        let mut p = plugin(0);
        assert_eq!(p.finalize_for_execution(&ABC), Some(&b"abc"[..]));
        assert_eq!(p.finalize_for_execution(&[0, 0, 0, 4, b'a']), None);
    }

    #[test]
    fn describe_truncates_to_host_limit() {
        let mut p = plugin(1);
        assert!(p.describe(64).is_none(), "nothing to describe before fuzzing");
        p.mutate(&ABC, None, 256).unwrap();
        let full = p.describe(64).unwrap().to_str().unwrap().to_string();
        assert!(full.starts_with("append_"));
        let short = p.describe(4).unwrap().to_bytes().len();
        assert_eq!(short, 3);
    }

    #[test]
    fn empty_alphabet_config_fails_creation() {
        let mut config = WiremutConfig::default();
        config.mutator.alphabet.clear();
        assert!(matches!(
            Plugin::with_config(0, &config),
            Err(PluginError::Mutator(MutatorError::EmptyAlphabet))
        ));
    }

    #[test]
    fn ffi_round_trip_through_raw_pointers() {
        let data = ffi::init::<Plugin>(7);
        assert!(!data.is_null());

        let mut out: *const u8 = ptr::null();
        let len = unsafe {
            ffi::post_process::<Plugin>(data, ABC.as_ptr(), ABC.len(), &mut out)
        };
        assert_eq!(len, 3);
        assert_eq!(unsafe { std::slice::from_raw_parts(out, len) }, b"abc");

        let bad = [0u8, 0, 0, 4, b'a'];
        let len = unsafe {
            ffi::fuzz::<Plugin>(
                data,
                bad.as_ptr(),
                bad.len(),
                &mut out,
                ptr::null(),
                0,
                256,
            )
        };
        assert_eq!(len, 0);
        assert!(out.is_null());

        let len = unsafe {
            ffi::fuzz::<Plugin>(
                data,
                ABC.as_ptr(),
                ABC.len(),
                &mut out,
                ptr::null(),
                0,
                256,
            )
        };
        assert!(len >= ABC.len());
        assert!(!out.is_null());

        assert_eq!(unsafe { ffi::fuzz_count::<Plugin>(data, ABC.as_ptr(), ABC.len()) }, 1);
        unsafe { ffi::deinit::<Plugin>(data) };
    }

    #[test]
    fn ffi_null_instance_produces_no_output() {
        let mut out: *const u8 = ABC.as_ptr();
        let len = unsafe {
            ffi::post_process::<Plugin>(ptr::null_mut(), ABC.as_ptr(), ABC.len(), &mut out)
        };
        assert_eq!(len, 0);
        assert!(out.is_null());
        unsafe { ffi::deinit::<Plugin>(ptr::null_mut()) };
    }
}
