//! Cross-boundary value marshalling
//!
//! Three conventions of the native surface are translated here:
//!
//! 1. **Error descriptors.** [`call`] hands a fresh [`ErrorDescriptor`] to the
//!    native function and checks it before the return value is looked at. A
//!    set descriptor discards the return value.
//! 2. **Variable-length values.** [`read_variable_length`] runs the two-phase
//!    buffer-growth protocol: one call with a default-capacity buffer and, if
//!    the reported size does not fit, exactly one more call with a buffer of
//!    the reported size. Nullness comes from the explicit out-flag, never from
//!    a zero size.
//! 3. **Sentinels.** [`optional_index`] and [`optional_handle`] turn `NOT_FOUND`
//!    and `RawHandle::NULL` into `Option`, so sentinels never leave this layer.

use tether_core::{Error, ErrorDescriptor, RawHandle, Result, NOT_FOUND};

/// Invoke a native function and translate its error descriptor.
///
/// # Errors
///
/// Returns [`Error::NativeEngine`] carrying the descriptor's kind and message
/// verbatim when the native side reports a failure.
pub fn call<T>(f: impl FnOnce(&mut ErrorDescriptor) -> T) -> Result<T> {
    let mut err = ErrorDescriptor::new();
    let value = f(&mut err);
    match err.take() {
        Some((kind, message)) => Err(Error::NativeEngine { kind, message }),
        None => Ok(value),
    }
}

/// Read a variable-length value with the two-phase buffer-growth protocol.
///
/// `read` receives the buffer, the null out-flag and the error descriptor, and
/// returns the byte length of the full value. Returns `None` for null.
///
/// # Errors
///
/// - Native failures as [`Error::NativeEngine`]
/// - [`Error::CorruptedData`] if the second call reports more bytes than the
///   buffer sized for it, or the value turns null between the two calls
pub fn read_variable_length(
    capacity: usize,
    mut read: impl FnMut(&mut [u8], &mut bool, &mut ErrorDescriptor) -> usize,
) -> Result<Option<Vec<u8>>> {
    let mut buffer = vec![0u8; capacity];
    let mut is_null = false;
    let required = call(|err| read(&mut buffer, &mut is_null, err))?;
    if is_null {
        return Ok(None);
    }
    if required <= buffer.len() {
        buffer.truncate(required);
        return Ok(Some(buffer));
    }

    drop(buffer);
    let mut buffer: Vec<u8> = Vec::new();
    buffer.try_reserve_exact(required).map_err(|e| {
        Error::corrupted(format!(
            "native side requested an unallocatable {} byte buffer: {}",
            required, e
        ))
    })?;
    buffer.resize(required, 0);
    let written = call(|err| read(&mut buffer, &mut is_null, err))?;
    if is_null {
        return Err(Error::corrupted(
            "value became null between the two reads of the buffer-growth protocol",
        ));
    }
    if written > buffer.len() {
        return Err(Error::corrupted(format!(
            "native side reported {} bytes after requesting a {} byte buffer",
            written,
            buffer.len()
        )));
    }
    buffer.truncate(written);
    Ok(Some(buffer))
}

/// Decode bytes read from a string column.
///
/// # Errors
///
/// Returns [`Error::CorruptedData`] for malformed UTF-8.
pub fn decode_string(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|e| Error::corrupted(format!("string column holds invalid UTF-8: {}", e)))
}

/// Read a nullable string with the two-phase protocol.
pub fn read_string(
    capacity: usize,
    read: impl FnMut(&mut [u8], &mut bool, &mut ErrorDescriptor) -> usize,
) -> Result<Option<String>> {
    read_variable_length(capacity, read)?
        .map(decode_string)
        .transpose()
}

/// Convert a native position result, mapping `NOT_FOUND` to `None`
pub fn optional_index(index: usize) -> Option<usize> {
    if index == NOT_FOUND {
        None
    } else {
        Some(index)
    }
}

/// Convert a native handle result, mapping `RawHandle::NULL` to `None`
pub fn optional_handle(handle: RawHandle) -> Option<RawHandle> {
    if handle.is_null() {
        None
    } else {
        Some(handle)
    }
}
