use std::io;

type CountType = u32;
const COUNT_SIZE: usize = size_of::<CountType>();

/// Side length in pixels of every image crop.
pub const IMAGE_SIDE: usize = 64;
/// Channels per pixel (RGB).
pub const CHANNELS: usize = 3;
/// Bytes taken by a single image crop on the wire.
pub const IMAGE_BYTES: usize = IMAGE_SIDE * IMAGE_SIDE * CHANNELS;
/// Bytes taken by a request header.
pub const HEADER_SIZE: usize = 2 * COUNT_SIZE;

/// The fixed size prefix of every request, declaring how many images follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub left_count: u32,
    pub right_count: u32,
}

impl Header {
    /// Decodes a header from its big endian wire form.
    pub fn from_bytes(buf: [u8; HEADER_SIZE]) -> Self {
        let [l0, l1, l2, l3, r0, r1, r2, r3] = buf;

        let left_count = CountType::from_be_bytes([l0, l1, l2, l3]);
        let right_count = CountType::from_be_bytes([r0, r1, r2, r3]);

        Self {
            left_count,
            right_count,
        }
    }

    /// Encodes this header into its big endian wire form.
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut buf = [0; HEADER_SIZE];
        buf[..COUNT_SIZE].copy_from_slice(&self.left_count.to_be_bytes());
        buf[COUNT_SIZE..].copy_from_slice(&self.right_count.to_be_bytes());
        buf
    }

    /// Byte length of the left image payload.
    pub fn left_len(&self) -> io::Result<usize> {
        payload_len(self.left_count)
    }

    /// Byte length of the right image payload.
    pub fn right_len(&self) -> io::Result<usize> {
        payload_len(self.right_count)
    }
}

fn payload_len(count: CountType) -> io::Result<usize> {
    usize::try_from(count)
        .ok()
        .and_then(|count| count.checked_mul(IMAGE_BYTES))
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("image count {count} overflows the addressable payload size"),
            )
        })
}

/// A scoring request: two batches of raw image crops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub left: Vec<u8>,
    pub right: Vec<u8>,
}

impl Request {
    /// Builds a request from already concatenated image bytes.
    ///
    /// # Errors
    /// `InvalidData` if either buffer is not a whole number of images.
    pub fn new(left: Vec<u8>, right: Vec<u8>) -> io::Result<Self> {
        for (side, buf) in [("left", &left), ("right", &right)] {
            if buf.len() % IMAGE_BYTES != 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "{side} payload of {} bytes is not a multiple of {IMAGE_BYTES}",
                        buf.len()
                    ),
                ));
            }
        }

        Ok(Self { left, right })
    }

    pub fn left_count(&self) -> usize {
        self.left.len() / IMAGE_BYTES
    }

    pub fn right_count(&self) -> usize {
        self.right.len() / IMAGE_BYTES
    }

    /// Iterates over the left images, one `IMAGE_BYTES` slice each.
    pub fn left_images(&self) -> impl Iterator<Item = &[u8]> {
        self.left.chunks_exact(IMAGE_BYTES)
    }

    /// Iterates over the right images, one `IMAGE_BYTES` slice each.
    pub fn right_images(&self) -> impl Iterator<Item = &[u8]> {
        self.right.chunks_exact(IMAGE_BYTES)
    }

    /// The header announcing this request's payload.
    ///
    /// # Errors
    /// `InvalidData` if a side holds more images than a `u32` can count.
    pub fn header(&self) -> io::Result<Header> {
        let count = |n: usize| {
            CountType::try_from(n).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        };

        Ok(Header {
            left_count: count(self.left_count())?,
            right_count: count(self.right_count())?,
        })
    }

    /// Appends the full wire form of this request to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        buf.reserve(HEADER_SIZE + self.left.len() + self.right.len());
        buf.extend_from_slice(&self.header()?.to_bytes());
        buf.extend_from_slice(&self.left);
        buf.extend_from_slice(&self.right);
        Ok(())
    }
}
