//! Network seam
//!
//! The scheduler joins the network, asks for the image of the selected page
//! and reads it as a plain byte stream. Transport, TLS and HTTP framing stay
//! in the platform crate.

use embedded_io::Read;

use crate::error::IoError;
use crate::sensor::SensorReading;
use crate::settings::Settings;

/// Network access used by one wake cycle
pub trait Network {
    /// Body of a fetched image
    ///
    /// Reads of 0 bytes mark the end of the body.
    type Stream<'a>: Read
    where
        Self: 'a;

    /// Join the configured network
    ///
    /// Must give up after `timeout_ms`.
    fn connect(&mut self, settings: &Settings, timeout_ms: u32) -> Result<(), IoError>;

    /// Request `url`, passing the current reading along (TRMNL-style headers)
    fn fetch<'a>(
        &'a mut self,
        url: &str,
        reading: &SensorReading,
    ) -> Result<Self::Stream<'a>, IoError>;

    /// Leave the network and power the radio down
    fn disconnect(&mut self);

    /// Signal strength of the current link in dBm
    fn rssi(&self) -> Option<i8> {
        None
    }
}

/// Adapts any byte slice into a [`Network::Stream`]-compatible reader
///
/// Useful for platforms that download the whole body before decoding.
#[derive(Debug)]
pub struct SliceStream<'a> {
    data: &'a [u8],
}

impl<'a> SliceStream<'a> {
    /// Wrap a complete body
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Bytes not yet read
    pub fn remaining(&self) -> usize {
        self.data.len()
    }
}

impl embedded_io::ErrorType for SliceStream<'_> {
    type Error = core::convert::Infallible;
}

impl Read for SliceStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.data.len());
        let (head, tail) = self.data.split_at(n);
        buf[..n].copy_from_slice(head);
        self.data = tail;
        Ok(n)
    }
}
