//! Attribute Protocol ([Vol 3] Part F) status codes.
//!
//! The ATT wire encoding is handled by the native stack. This crate only
//! decides the status of each request, which the native stack translates into
//! a response PDU.

use std::fmt::{Debug, Display, Formatter};

/// Request result reported to the native stack. `Ok(())` means success.
pub type IoResult = std::result::Result<(), ErrorCode>;

/// ATT error codes ([Vol 3] Part F, Section 3.4.1.1) used in request
/// responses.
#[derive(
    Clone, Copy, Debug, Eq, Hash, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum ErrorCode {
    /// The attribute handle given was not valid on this server.
    InvalidHandle = 0x01,
    /// The attribute cannot be read.
    ReadNotPermitted = 0x02,
    /// The attribute cannot be written.
    WriteNotPermitted = 0x03,
    /// The attribute PDU was invalid.
    InvalidPdu = 0x04,
    /// The attribute requires authentication before it can be read or written.
    InsufficientAuthentication = 0x05,
    /// The server does not support the request received from the client.
    RequestNotSupported = 0x06,
    /// Offset specified was past the end of the attribute.
    InvalidOffset = 0x07,
    /// The attribute requires authorization before it can be read or written.
    InsufficientAuthorization = 0x08,
    /// No attribute found for the request.
    AttributeNotFound = 0x0A,
    /// The attribute value length is invalid for the operation.
    InvalidAttributeValueLength = 0x0D,
    /// The request encountered an unlikely error.
    UnlikelyError = 0x0E,
    /// The attribute requires encryption before it can be read or written.
    InsufficientEncryption = 0x0F,
    /// Insufficient resources to complete the request.
    InsufficientResources = 0x11,
}

impl ErrorCode {
    /// Status value for a successful request.
    pub const SUCCESS: u8 = 0x00;

    /// Returns the raw status byte for a request result.
    #[inline]
    #[must_use]
    pub fn status(r: IoResult) -> u8 {
        r.map_or_else(u8::from, |_| Self::SUCCESS)
    }
}

impl Display for ErrorCode {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl std::error::Error for ErrorCode {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status() {
        assert_eq!(ErrorCode::status(Ok(())), 0);
        assert_eq!(ErrorCode::status(Err(ErrorCode::AttributeNotFound)), 0x0A);
        assert_eq!(ErrorCode::try_from(0x07).unwrap(), ErrorCode::InvalidOffset);
        assert!(ErrorCode::try_from(0x00).is_err());
        assert_eq!(ErrorCode::InvalidOffset.to_string(), "InvalidOffset");
    }
}
