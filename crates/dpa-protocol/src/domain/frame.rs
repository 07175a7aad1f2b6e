//! # DPA Frame Codec
//!
//! Request frames:
//!
//! ```text
//! NAdr (2B LE) | PNum | PCmd | HWPID (2B LE) | PData (0..56B)
//! ```
//!
//! Confirmation and response frames:
//!
//! ```text
//! NAdr (2B LE) | PNum | PCmd | HWPID (2B LE) | ResponseCode | DpaValue | Data
//! ```
//!
//! A response code of `0xFF` marks a confirmation; its data carries
//! `Hops | TimeslotLength | HopsResponse`.

use super::entities::{DpaRequest, PDATA_MAX_LENGTH};
use super::errors::ProtocolError;
use super::value_objects::{Confirmation, NodeAddress};

/// Length of the request header.
pub const REQUEST_HEADER_LENGTH: usize = 6;

/// Offset of the response code byte.
pub const RESPONSE_CODE_START: usize = 6;

/// Offset of the DPA value byte.
pub const DPA_VALUE_START: usize = 7;

/// Offset of response data.
pub const RESPONSE_DATA_START: usize = 8;

/// Response code marking a confirmation.
pub const CONFIRMATION_CODE: u8 = 0xFF;

/// Length of a confirmation's data part.
const CONFIRMATION_DATA_LENGTH: usize = 3;

impl DpaRequest {
    /// Encode the request into a DPA frame.
    pub fn to_frame(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.address.is_reserved() {
            return Err(ProtocolError::Frame(format!(
                "reserved address {} is not a valid target",
                self.address
            )));
        }
        if self.data.len() > PDATA_MAX_LENGTH {
            return Err(ProtocolError::Frame(format!(
                "request data too long: {} > {}",
                self.data.len(),
                PDATA_MAX_LENGTH
            )));
        }

        let mut frame = Vec::with_capacity(REQUEST_HEADER_LENGTH + self.data.len());
        frame.extend_from_slice(&self.address.0.to_le_bytes());
        frame.push(self.peripheral);
        frame.push(self.command);
        frame.extend_from_slice(&self.hw_profile.to_le_bytes());
        frame.extend_from_slice(&self.data);
        Ok(frame)
    }
}

/// Header fields shared by confirmations and responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Node the frame came from.
    pub address: NodeAddress,
    /// Peripheral number.
    pub peripheral: u8,
    /// Peripheral command, with the response bit set on replies.
    pub command: u8,
    /// Hardware profile ID.
    pub hw_profile: u16,
    /// Response code; `0xFF` marks a confirmation.
    pub response_code: u8,
    /// DPA value reported by the node.
    pub dpa_value: u8,
}

/// A classified incoming frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IncomingFrame {
    /// Confirmation of a request routed into the mesh.
    Confirmation {
        /// Decoded header.
        header: FrameHeader,
        /// Routing parameters carried by the confirmation.
        confirmation: Confirmation,
    },
    /// Final response.
    Response {
        /// Decoded header.
        header: FrameHeader,
        /// Payload following the header.
        data: Vec<u8>,
        /// Length of the whole frame in bytes.
        length: usize,
    },
}

impl IncomingFrame {
    /// Decode and classify a frame received from the transport.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < RESPONSE_DATA_START {
            return Err(ProtocolError::Frame(format!(
                "frame too short: {} bytes, header needs {}",
                bytes.len(),
                RESPONSE_DATA_START
            )));
        }

        let header = FrameHeader {
            address: NodeAddress(u16::from_le_bytes([bytes[0], bytes[1]])),
            peripheral: bytes[2],
            command: bytes[3],
            hw_profile: u16::from_le_bytes([bytes[4], bytes[5]]),
            response_code: bytes[RESPONSE_CODE_START],
            dpa_value: bytes[DPA_VALUE_START],
        };
        let data = &bytes[RESPONSE_DATA_START..];

        if header.response_code == CONFIRMATION_CODE {
            if data.len() < CONFIRMATION_DATA_LENGTH {
                return Err(ProtocolError::Frame(format!(
                    "confirmation data too short: {} bytes",
                    data.len()
                )));
            }
            return Ok(IncomingFrame::Confirmation {
                header,
                confirmation: Confirmation::new(data[0], data[1], data[2]),
            });
        }

        Ok(IncomingFrame::Response {
            header,
            data: data.to_vec(),
            length: bytes.len(),
        })
    }

    /// Header common to both kinds of frame.
    pub fn header(&self) -> &FrameHeader {
        match self {
            IncomingFrame::Confirmation { header, .. } => header,
            IncomingFrame::Response { header, .. } => header,
        }
    }
}

/// Encode a confirmation frame as the coordinator would deliver it.
pub fn encode_confirmation(request: &DpaRequest, confirmation: &Confirmation) -> Vec<u8> {
    let mut frame = Vec::with_capacity(RESPONSE_DATA_START + CONFIRMATION_DATA_LENGTH);
    frame.extend_from_slice(&request.address.0.to_le_bytes());
    frame.push(request.peripheral);
    frame.push(request.command);
    frame.extend_from_slice(&request.hw_profile.to_le_bytes());
    frame.push(CONFIRMATION_CODE);
    frame.push(0x00);
    frame.push(confirmation.hop_count);
    frame.push(confirmation.timeslot_length);
    frame.push(confirmation.hop_count_response);
    frame
}

/// Encode a successful response frame carrying `data`.
pub fn encode_response(request: &DpaRequest, dpa_value: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(RESPONSE_DATA_START + data.len());
    frame.extend_from_slice(&request.address.0.to_le_bytes());
    frame.push(request.peripheral);
    // Responses carry PCmd with the most significant bit set.
    frame.push(request.command | 0x80);
    frame.extend_from_slice(&request.hw_profile.to_le_bytes());
    frame.push(0x00);
    frame.push(dpa_value);
    frame.extend_from_slice(data);
    frame
}
