//! Growable byte buffer handle for the C facade.
//!
//! `read_line` needs an out-parameter that can grow; C callers get an
//! opaque `ByteBuffer` with accessor functions instead of managing raw
//! allocations across the boundary.

/// Opaque growable byte buffer owned by the engine.
#[derive(Debug, Default)]
pub struct ByteBuffer {
    pub(crate) data: Vec<u8>,
}

/// Allocate an empty buffer. Release it with [`sb_buffer_free`].
#[no_mangle]
pub extern "C" fn sb_buffer_new() -> *mut ByteBuffer {
    Box::into_raw(Box::new(ByteBuffer::default()))
}

/// Pointer to the buffer's bytes.
///
/// The pointer is valid until the buffer is next mutated or freed. The
/// contents are a bounded byte span, not a C string: the length comes from
/// [`sb_buffer_len`] and there is no NUL terminator.
///
/// # Safety
/// `buffer` must be null or a pointer returned by [`sb_buffer_new`] that
/// has not been freed.
#[no_mangle]
pub unsafe extern "C" fn sb_buffer_data(buffer: *const ByteBuffer) -> *const u8 {
    if buffer.is_null() {
        return std::ptr::null();
    }
    (*buffer).data.as_ptr()
}

/// Number of bytes in the buffer.
///
/// # Safety
/// `buffer` must be null or a live pointer from [`sb_buffer_new`].
#[no_mangle]
pub unsafe extern "C" fn sb_buffer_len(buffer: *const ByteBuffer) -> usize {
    if buffer.is_null() {
        return 0;
    }
    (*buffer).data.len()
}

/// Empty the buffer without releasing its allocation.
///
/// # Safety
/// `buffer` must be null or a live pointer from [`sb_buffer_new`].
#[no_mangle]
pub unsafe extern "C" fn sb_buffer_clear(buffer: *mut ByteBuffer) {
    if let Some(buffer) = buffer.as_mut() {
        buffer.data.clear();
    }
}

/// Release a buffer. Passing null is a no-op.
///
/// # Safety
/// `buffer` must be null or a pointer from [`sb_buffer_new`] that has not
/// already been freed.
#[no_mangle]
pub unsafe extern "C" fn sb_buffer_free(buffer: *mut ByteBuffer) {
    if !buffer.is_null() {
        drop(Box::from_raw(buffer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_lifecycle() {
        unsafe {
            let buffer = sb_buffer_new();
            assert_eq!(sb_buffer_len(buffer), 0);

            (*buffer).data.extend_from_slice(b"abc");
            assert_eq!(sb_buffer_len(buffer), 3);
            let bytes = std::slice::from_raw_parts(sb_buffer_data(buffer), 3);
            assert_eq!(bytes, b"abc");

            sb_buffer_clear(buffer);
            assert_eq!(sb_buffer_len(buffer), 0);

            sb_buffer_free(buffer);
        }
    }

    #[test]
    fn test_null_buffer_is_tolerated() {
        unsafe {
            assert!(sb_buffer_data(std::ptr::null()).is_null());
            assert_eq!(sb_buffer_len(std::ptr::null()), 0);
            sb_buffer_clear(std::ptr::null_mut());
            sb_buffer_free(std::ptr::null_mut());
        }
    }
}
