//! Contiguous byte buffers with shape metadata
//!
//! A buffer is a raw pointer plus byte length. It never owns storage
//! directly: a holder value keeps the backing allocation alive, so buffers
//! over a `Vec<u8>`, a shared `Arc` slab, or caller-managed memory all look
//! the same to consumers.

use std::sync::Arc;

use data_encoding::BASE64;

use crate::error::{VarError, VarResult};
use crate::value::Value;

pub struct Buffer {
    ptr: *const u8,
    len: usize,
    /// Extent per dimension, empty for flat buffers.
    pub shape: Vec<usize>,
    /// Byte stride per dimension, matching `shape`.
    pub strides: Vec<isize>,
    holder: Value,
}

// The holder keeps the pointee alive, and the bytes are never mutated
// through the buffer.
unsafe impl Send for Buffer {}
unsafe impl Sync for Buffer {}

impl Buffer {
    pub fn from_vec(data: Vec<u8>) -> Self {
        let len = data.len();
        let data = Arc::new(data);
        let ptr = data.as_ptr();
        Buffer {
            ptr,
            len,
            shape: vec![len],
            strides: vec![1],
            holder: Value::shared(data),
        }
    }

    /// Buffer over `data` reinterpreted with the given row-major shape.
    pub fn with_shape(data: Vec<u8>, shape: Vec<usize>) -> VarResult<Self> {
        let total: usize = shape.iter().product();
        if total != data.len() {
            return Err(VarError::custom(format!(
                "shape {:?} does not cover {} bytes",
                shape,
                data.len()
            )));
        }
        let mut buf = Buffer::from_vec(data);
        let mut strides = vec![1isize; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1] as isize;
        }
        buf.shape = shape;
        buf.strides = strides;
        Ok(buf)
    }

    /// Buffer over caller-managed memory, kept alive by `holder`.
    ///
    /// # Safety
    /// `ptr` must be valid for reads of `len` bytes for as long as `holder`
    /// (or any clone of the buffer) exists.
    pub unsafe fn from_raw(ptr: *const u8, len: usize, holder: Value) -> Self {
        Buffer {
            ptr,
            len,
            shape: vec![len],
            strides: vec![1],
            holder,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The value keeping the backing storage alive.
    pub fn holder(&self) -> &Value {
        &self.holder
    }

    pub fn bytes(&self) -> &[u8] {
        if self.len == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
        }
    }

    /// Deep copy into freshly owned storage.
    pub fn copy_bytes(&self) -> Buffer {
        let mut buf = Buffer::from_vec(self.bytes().to_vec());
        buf.shape = self.shape.clone();
        buf.strides = self.strides.clone();
        buf
    }

    pub fn hex(&self) -> String {
        hex::encode(self.bytes())
    }

    pub fn from_hex(input: &str) -> VarResult<Buffer> {
        let data = hex::decode(input)
            .map_err(|e| VarError::custom(format!("invalid hex input: {e}")))?;
        Ok(Buffer::from_vec(data))
    }

    pub fn base64(&self) -> String {
        BASE64.encode(self.bytes())
    }

    pub fn from_base64(input: &str) -> VarResult<Buffer> {
        let data = BASE64
            .decode(input.as_bytes())
            .map_err(|e| VarError::custom(format!("invalid base64 input: {e}")))?;
        Ok(Buffer::from_vec(data))
    }

    /// Lowercase hex MD5 digest of the contents.
    pub fn md5(&self) -> String {
        md5_hex(self.bytes())
    }
}

impl Clone for Buffer {
    fn clone(&self) -> Self {
        self.copy_bytes()
    }
}

// Per-round left-rotate amounts.
const MD5_S: [u32; 64] = [
    7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, //
    5, 9, 14, 20, 5, 9, 14, 20, 5, 9, 14, 20, 5, 9, 14, 20, //
    4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23, //
    6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21,
];

// floor(abs(sin(i + 1)) * 2^32)
const MD5_K: [u32; 64] = [
    0xd76aa478, 0xe8c7b756, 0x242070db, 0xc1bdceee, 0xf57c0faf, 0x4787c62a, 0xa8304613,
    0xfd469501, 0x698098d8, 0x8b44f7af, 0xffff5bb1, 0x895cd7be, 0x6b901122, 0xfd987193,
    0xa679438e, 0x49b40821, 0xf61e2562, 0xc040b340, 0x265e5a51, 0xe9b6c7aa, 0xd62f105d,
    0x02441453, 0xd8a1e681, 0xe7d3fbc8, 0x21e1cde6, 0xc33707d6, 0xf4d50d87, 0x455a14ed,
    0xa9e3e905, 0xfcefa3f8, 0x676f02d9, 0x8d2a4c8a, 0xfffa3942, 0x8771f681, 0x6d9d6122,
    0xfde5380c, 0xa4beea44, 0x4bdecfa9, 0xf6bb4b60, 0xbebfbc70, 0x289b7ec6, 0xeaa127fa,
    0xd4ef3085, 0x04881d05, 0xd9d4d039, 0xe6db99e5, 0x1fa27cf8, 0xc4ac5665, 0xf4292244,
    0x432aff97, 0xab9423a7, 0xfc93a039, 0x655b59c3, 0x8f0ccc92, 0xffeff47d, 0x85845dd1,
    0x6fa87e4f, 0xfe2ce6e0, 0xa3014314, 0x4e0811a1, 0xf7537e82, 0xbd3af235, 0x2ad7d2bb,
    0xeb86d391,
];

/// MD5 of `data` as a lowercase hex string.
pub fn md5_hex(data: &[u8]) -> String {
    let mut a0: u32 = 0x67452301;
    let mut b0: u32 = 0xefcdab89;
    let mut c0: u32 = 0x98badcfe;
    let mut d0: u32 = 0x10325476;

    let bit_len = (data.len() as u64).wrapping_mul(8);
    let mut msg = data.to_vec();
    msg.push(0x80);
    while msg.len() % 64 != 56 {
        msg.push(0);
    }
    msg.extend_from_slice(&bit_len.to_le_bytes());

    for chunk in msg.chunks_exact(64) {
        let mut m = [0u32; 16];
        for (i, w) in m.iter_mut().enumerate() {
            *w = u32::from_le_bytes([
                chunk[i * 4],
                chunk[i * 4 + 1],
                chunk[i * 4 + 2],
                chunk[i * 4 + 3],
            ]);
        }

        let (mut a, mut b, mut c, mut d) = (a0, b0, c0, d0);
        for i in 0..64 {
            let (f, g) = match i / 16 {
                0 => ((b & c) | (!b & d), i),
                1 => ((d & b) | (!d & c), (5 * i + 1) % 16),
                2 => (b ^ c ^ d, (3 * i + 5) % 16),
                _ => (c ^ (b | !d), (7 * i) % 16),
            };
            let tmp = f
                .wrapping_add(a)
                .wrapping_add(MD5_K[i])
                .wrapping_add(m[g]);
            a = d;
            d = c;
            c = b;
            b = b.wrapping_add(tmp.rotate_left(MD5_S[i]));
        }

        a0 = a0.wrapping_add(a);
        b0 = b0.wrapping_add(b);
        c0 = c0.wrapping_add(c);
        d0 = d0.wrapping_add(d);
    }

    let mut out = Vec::with_capacity(16);
    out.extend_from_slice(&a0.to_le_bytes());
    out.extend_from_slice(&b0.to_le_bytes());
    out.extend_from_slice(&c0.to_le_bytes());
    out.extend_from_slice(&d0.to_le_bytes());
    hex::encode(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_vectors() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            md5_hex(b"The quick brown fox jumps over the lazy dog"),
            "9e107d9d372bb6826bd81d3542a419d6"
        );
        assert_eq!(
            md5_hex(b"abcdefghijklmnopqrstuvwxyz"),
            "c3fcd3d76192e4007dfb496cca67e13b"
        );
        // 80 bytes exercises the two-block padding path.
        assert_eq!(
            md5_hex(b"12345678901234567890123456789012345678901234567890123456789012345678901234567890"),
            "57edf4a22be3c955ac49da2e2107b67a"
        );
    }

    #[test]
    fn hex_round_trip() {
        let b = Buffer::from_vec(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(b.hex(), "deadbeef");
        let back = Buffer::from_hex("DEADBEEF").unwrap();
        assert_eq!(back.bytes(), b.bytes());
        assert!(Buffer::from_hex("xyz").is_err());
    }

    #[test]
    fn base64_round_trip() {
        let b = Buffer::from_vec(b"hello world".to_vec());
        assert_eq!(b.base64(), "aGVsbG8gd29ybGQ=");
        let back = Buffer::from_base64("aGVsbG8gd29ybGQ=").unwrap();
        assert_eq!(back.bytes(), b"hello world");
        assert!(Buffer::from_base64("!!").is_err());
    }

    #[test]
    fn shape_strides() {
        let b = Buffer::with_shape(vec![0; 6], vec![2, 3]).unwrap();
        assert_eq!(b.strides, vec![3, 1]);
        assert!(Buffer::with_shape(vec![0; 5], vec![2, 3]).is_err());
    }

    #[test]
    fn copy_is_deep() {
        let b = Buffer::from_vec(vec![1, 2, 3]);
        let c = b.copy_bytes();
        assert_eq!(c.bytes(), b.bytes());
        assert_ne!(c.bytes().as_ptr(), b.bytes().as_ptr());
    }

    #[test]
    fn empty_buffer() {
        let b = Buffer::from_vec(vec![]);
        assert!(b.is_empty());
        assert_eq!(b.hex(), "");
        assert_eq!(b.md5(), "d41d8cd98f00b204e9800998ecf8427e");
    }
}
