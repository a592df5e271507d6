use std::fmt::{self, Display, Formatter};

use thiserror::Error;

/// Errors related to accumulating and extracting data in a [`FrameBuffer`].
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FrameBufferError {
    /// The initial allocation was larger than the maximum size.
    #[error("Initial allocation {} exceeds the maximum size {}", alloc, max)]
    InvalidAllocation {
        /// Requested initial allocation.
        alloc: usize,

        /// Maximum size.
        max: usize,
    },

    /// Appending would have grown the buffer past its hard maximum.
    #[error("Buffer would need {} bytes, but the maximum is {}", required, max)]
    CapacityExceeded {
        /// The maximum size of the buffer.
        max: usize,

        /// The length the buffer would have needed.
        required: usize,
    },

    /// An empty start or end marker was passed to [`FrameBuffer::extract`].
    #[error("Token start and end markers must not be empty")]
    EmptyMarker,

    /// The end marker was found inside the start marker.
    #[error("Token end marker at {} overlaps start marker at {}", end, start)]
    OverlappingMarkers {
        /// Index of the start marker.
        start: usize,

        /// Index of the end marker.
        end: usize,
    },
}

/// What to do with the buffer contents around an extracted token.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Extract {
    /// Leave the buffer untouched.
    KeepAll,

    /// Remove the token, keeping the data on either side of it.
    KeepOutside,

    /// Remove the token and everything before it.
    DiscardThrough,
}

/// Growable byte accumulator for parsing responses that arrive in pieces.
///
/// Bytes are appended as they are read from the transport and delimited tokens are
/// extracted once both their start and end markers have arrived. Capacity grows
/// geometrically up to a hard maximum; exceeding it is an error rather than silent
/// truncation, and a failed append leaves the buffer unchanged.
///
/// # Examples
///
/// ```
/// use roadlink_core::{Extract, FrameBuffer};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let mut buffer = FrameBuffer::new(16, 64)?;
/// buffer.append(b"noise<Msg>hel")?;
/// assert_eq!(None, buffer.extract(Extract::DiscardThrough, b"<Msg>", b"</Msg>")?);
///
/// buffer.append(b"lo</Msg><Msg>")?;
/// let token = buffer.extract(Extract::DiscardThrough, b"<Msg>", b"</Msg>")?;
/// assert_eq!(Some(b"<Msg>hello</Msg>".to_vec()), token);
/// assert_eq!(b"<Msg>", buffer.as_bytes());
/// #
/// # Ok(()) }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameBuffer {
    data: Vec<u8>,
    capacity: usize,
    alloc: usize,
    max: usize,
}

impl FrameBuffer {
    /// Creates an empty buffer with `alloc` bytes of initial capacity that may grow to `max`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameBufferError::InvalidAllocation`] if `alloc > max`.
    pub fn new(alloc: usize, max: usize) -> Result<Self, FrameBufferError> {
        if alloc > max {
            return Err(FrameBufferError::InvalidAllocation { alloc, max });
        }
        Ok(FrameBuffer::clamped(alloc, max))
    }

    /// Creates an empty buffer like [`new`](Self::new), reducing `alloc` to `max` if it's larger.
    pub fn clamped(alloc: usize, max: usize) -> Self {
        let alloc = alloc.min(max);
        FrameBuffer {
            data: Vec::with_capacity(alloc),
            capacity: alloc,
            alloc,
            max,
        }
    }

    /// Discards all contents and returns to the initial capacity.
    pub fn reset(&mut self) {
        self.data = Vec::with_capacity(self.alloc);
        self.capacity = self.alloc;
    }

    /// Number of bytes currently held.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if no bytes are held.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current capacity. Only grows, until [`reset`](Self::reset).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Hard maximum size.
    pub fn max_size(&self) -> usize {
        self.max
    }

    /// The bytes currently held.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Appends newly read bytes, growing the buffer if needed.
    ///
    /// # Errors
    ///
    /// Returns [`FrameBufferError::CapacityExceeded`] if the result would be larger than
    /// the maximum size. The buffer is not modified in that case.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), FrameBufferError> {
        let required = self.data.len() + bytes.len();
        if required > self.capacity {
            self.grow(required)?;
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    fn grow(&mut self, required: usize) -> Result<(), FrameBufferError> {
        if required > self.max {
            return Err(FrameBufferError::CapacityExceeded { max: self.max, required });
        }
        let capacity = required.max(2 * self.capacity).min(self.max);
        self.data.reserve_exact(capacity - self.data.len());
        self.capacity = capacity;
        Ok(())
    }

    /// Looks for a token delimited by `start` and `end` and returns it, markers included.
    ///
    /// The end marker is searched for starting at the start marker. If either is missing,
    /// `Ok(None)` is returned and the buffer is left alone so more data can be appended.
    /// Otherwise the buffer is trimmed according to `mode`.
    ///
    /// # Errors
    ///
    /// Returns:
    /// * [`FrameBufferError::EmptyMarker`] if either marker is empty.
    /// * [`FrameBufferError::OverlappingMarkers`] if the end marker begins inside the start marker.
    ///
    /// In both cases the buffer is not modified.
    ///
    /// # Examples
    ///
    /// ```
    /// use roadlink_core::{Extract, FrameBuffer};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// #
    /// let mut buffer = FrameBuffer::new(8, 32)?;
    /// buffer.append(b"xxSTART...ENDyyy")?;
    /// let token = buffer.extract(Extract::KeepOutside, b"START", b"END")?;
    /// assert_eq!(Some(b"START...END".to_vec()), token);
    /// assert_eq!(b"xxyyy", buffer.as_bytes());
    /// #
    /// # Ok(()) }
    /// ```
    pub fn extract(&mut self, mode: Extract, start: &[u8], end: &[u8]) -> Result<Option<Vec<u8>>, FrameBufferError> {
        if start.is_empty() || end.is_empty() {
            return Err(FrameBufferError::EmptyMarker);
        }
        let i1 = match find(&self.data, start, 0) {
            Some(i) => i,
            None => return Ok(None),
        };
        let i2 = match find(&self.data, end, i1) {
            Some(i) => i,
            None => return Ok(None),
        };
        if i1 + start.len() > i2 {
            return Err(FrameBufferError::OverlappingMarkers { start: i1, end: i2 });
        }
        let stop = i2 + end.len();
        let token = self.data[i1..stop].to_vec();
        match mode {
            Extract::KeepAll => {}
            Extract::KeepOutside => {
                let _ = self.data.drain(i1..stop);
            }
            Extract::DiscardThrough => {
                let _ = self.data.drain(..stop);
            }
        }
        Ok(Some(token))
    }
}

impl Display for FrameBuffer {
    /// Formats the contents as Latin-1 text, which suits the XML traffic this buffer usually holds.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for &b in &self.data {
            write!(f, "{}", char::from(b))?;
        }
        Ok(())
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.len() > haystack.len() - from {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}
