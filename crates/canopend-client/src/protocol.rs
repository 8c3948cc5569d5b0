//! Daemon IPC protocol
//!
//! Every message travels in a length-prefixed frame:
//!
//! ```text
//! [length u32 LE][msg_id u8][seq u16 LE][payload ...]
//! ```
//!
//! `length` counts the bytes after the prefix. Responses echo the request's
//! `seq`; the daemon's unsolicited events use `seq = 0`. All multi-byte fields
//! are little-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::transport::TransportError;

/// Largest frame body accepted from the wire
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Frame header size (msg_id + seq)
pub const HEADER_LEN: usize = 3;

/// Sequence number reserved for events
pub const EVENT_SEQ: u16 = 0;

/// Message identifiers
pub mod msg_id {
    pub const SEND_EMCY: u8 = 0x00;
    pub const SEND_TPDO: u8 = 0x01;
    pub const GET_ENTRY: u8 = 0x02;
    pub const SET_ENTRY: u8 = 0x03;
    pub const GET_STATE: u8 = 0x06;
    pub const NMT_COMMAND: u8 = 0x07;
    pub const LIST_NODES: u8 = 0x08;

    pub const ERROR_UNKNOWN_ID: u8 = 0x80;
    pub const ERROR_LENGTH: u8 = 0x81;
    pub const ERROR_TPDO_NUM: u8 = 0x82;
    pub const ERROR_OD_ABORT: u8 = 0x83;
    pub const ERROR_UNKNOWN_NODE: u8 = 0x85;

    pub const EVENT_HEARTBEAT: u8 = 0x90;
    pub const EVENT_EMCY: u8 = 0x91;
    pub const EVENT_BUS_STATUS: u8 = 0x92;
}

/// SDO abort codes (CiA 301)
pub mod abort {
    pub const TOGGLE_BIT: u32 = 0x0503_0000;
    pub const SDO_TIMEOUT: u32 = 0x0504_0000;
    pub const UNSUPPORTED_ACCESS: u32 = 0x0601_0000;
    pub const WRITE_ONLY: u32 = 0x0601_0001;
    pub const READ_ONLY: u32 = 0x0601_0002;
    pub const OBJECT_NOT_FOUND: u32 = 0x0602_0000;
    pub const NOT_MAPPABLE: u32 = 0x0604_0041;
    pub const HARDWARE_ERROR: u32 = 0x0606_0000;
    pub const LENGTH_MISMATCH: u32 = 0x0607_0010;
    pub const LENGTH_TOO_HIGH: u32 = 0x0607_0012;
    pub const LENGTH_TOO_LOW: u32 = 0x0607_0013;
    pub const SUB_INDEX_NOT_FOUND: u32 = 0x0609_0011;
    pub const INVALID_VALUE: u32 = 0x0609_0030;
    pub const VALUE_TOO_HIGH: u32 = 0x0609_0031;
    pub const VALUE_TOO_LOW: u32 = 0x0609_0032;
    pub const GENERAL_ERROR: u32 = 0x0800_0000;
    pub const DATA_TRANSFER: u32 = 0x0800_0020;
    pub const LOCAL_CONTROL: u32 = 0x0800_0021;
    pub const DEVICE_STATE: u32 = 0x0800_0022;
    pub const NO_DATA: u32 = 0x0800_0024;

    /// Human readable description of an abort code
    pub fn description(code: u32) -> &'static str {
        match code {
            TOGGLE_BIT => "Toggle bit not altered",
            SDO_TIMEOUT => "SDO protocol timed out",
            UNSUPPORTED_ACCESS => "Unsupported access to an object",
            WRITE_ONLY => "Attempt to read a write only object",
            READ_ONLY => "Attempt to write a read only object",
            OBJECT_NOT_FOUND => "Object does not exist in the object dictionary",
            NOT_MAPPABLE => "Object cannot be mapped to the PDO",
            HARDWARE_ERROR => "Access failed due to a hardware error",
            LENGTH_MISMATCH => "Data type does not match, length of service parameter does not match",
            LENGTH_TOO_HIGH => "Data type does not match, length of service parameter too high",
            LENGTH_TOO_LOW => "Data type does not match, length of service parameter too low",
            SUB_INDEX_NOT_FOUND => "Sub-index does not exist",
            INVALID_VALUE => "Invalid value for parameter",
            VALUE_TOO_HIGH => "Value of parameter written too high",
            VALUE_TOO_LOW => "Value of parameter written too low",
            GENERAL_ERROR => "General error",
            DATA_TRANSFER => "Data cannot be transferred or stored to the application",
            LOCAL_CONTROL => "Data cannot be transferred because of local control",
            DEVICE_STATE => "Data cannot be transferred because of the present device state",
            NO_DATA => "No data available",
            _ => "Unknown abort code",
        }
    }

    /// Codes meaning the address is unknown to the node
    pub fn is_not_found(code: u32) -> bool {
        matches!(code, OBJECT_NOT_FOUND | SUB_INDEX_NOT_FOUND)
    }
}

/// One frame on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_id: u8,
    pub seq: u16,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(msg_id: u8, seq: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_id,
            seq,
            payload: payload.into(),
        }
    }

    /// Encode with the length prefix
    pub fn encode(&self) -> Bytes {
        let body_len = HEADER_LEN + self.payload.len();
        let mut buf = BytesMut::with_capacity(4 + body_len);
        buf.put_u32_le(body_len as u32);
        buf.put_u8(self.msg_id);
        buf.put_u16_le(self.seq);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse a frame body (everything after the length prefix)
    pub fn parse(mut body: Bytes) -> Result<Self, TransportError> {
        if body.len() < HEADER_LEN {
            return Err(TransportError::MalformedFrame(format!(
                "frame body too short: {} bytes",
                body.len()
            )));
        }
        let msg_id = body.get_u8();
        let seq = body.get_u16_le();
        Ok(Self {
            msg_id,
            seq,
            payload: body,
        })
    }

    /// Validate a length prefix read from the wire
    pub fn check_len(len: u32) -> Result<usize, TransportError> {
        let len = len as usize;
        if !(HEADER_LEN..=MAX_FRAME_LEN).contains(&len) {
            return Err(TransportError::MalformedFrame(format!(
                "invalid frame length {}",
                len
            )));
        }
        Ok(len)
    }

    pub fn is_event(&self) -> bool {
        self.seq == EVENT_SEQ
    }
}

/// Read one length-prefixed frame
///
/// A clean end of stream before the prefix is `ConnectionClosed`.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, TransportError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32_le().await {
        Ok(len) => len,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(TransportError::ConnectionClosed)
        }
        Err(e) => return Err(TransportError::ReceiveFailed(e.to_string())),
    };
    let len = Frame::check_len(len)?;

    let mut body = BytesMut::zeroed(len);
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
    Frame::parse(body.freeze())
}

/// Client request to the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    GetEntry {
        node_id: u8,
        index: u16,
        sub_index: u8,
    },
    SetEntry {
        node_id: u8,
        index: u16,
        sub_index: u8,
        data: Vec<u8>,
    },
    GetState {
        node_id: u8,
    },
    SendNmtCommand {
        node_id: u8,
        command: u8,
    },
    ListNodes,
    SendEmcy {
        node_id: u8,
        code: u16,
        info: u32,
    },
    SendTpdo {
        node_id: u8,
        num: u8,
    },
}

impl Request {
    pub fn msg_id(&self) -> u8 {
        match self {
            Request::GetEntry { .. } => msg_id::GET_ENTRY,
            Request::SetEntry { .. } => msg_id::SET_ENTRY,
            Request::GetState { .. } => msg_id::GET_STATE,
            Request::SendNmtCommand { .. } => msg_id::NMT_COMMAND,
            Request::ListNodes => msg_id::LIST_NODES,
            Request::SendEmcy { .. } => msg_id::SEND_EMCY,
            Request::SendTpdo { .. } => msg_id::SEND_TPDO,
        }
    }

    /// Node the request is addressed to
    pub fn node_id(&self) -> Option<u8> {
        match self {
            Request::GetEntry { node_id, .. }
            | Request::SetEntry { node_id, .. }
            | Request::GetState { node_id }
            | Request::SendNmtCommand { node_id, .. }
            | Request::SendEmcy { node_id, .. }
            | Request::SendTpdo { node_id, .. } => Some(*node_id),
            Request::ListNodes => None,
        }
    }

    pub fn to_frame(&self, seq: u16) -> Frame {
        let mut buf = BytesMut::new();
        match self {
            Request::GetEntry {
                node_id,
                index,
                sub_index,
            } => {
                buf.put_u8(*node_id);
                buf.put_u16_le(*index);
                buf.put_u8(*sub_index);
            }
            Request::SetEntry {
                node_id,
                index,
                sub_index,
                data,
            } => {
                buf.put_u8(*node_id);
                buf.put_u16_le(*index);
                buf.put_u8(*sub_index);
                buf.put_slice(data);
            }
            Request::GetState { node_id } => buf.put_u8(*node_id),
            Request::SendNmtCommand { node_id, command } => {
                buf.put_u8(*node_id);
                buf.put_u8(*command);
            }
            Request::ListNodes => {}
            Request::SendEmcy {
                node_id,
                code,
                info,
            } => {
                buf.put_u8(*node_id);
                buf.put_u16_le(*code);
                buf.put_u32_le(*info);
            }
            Request::SendTpdo { node_id, num } => {
                buf.put_u8(*node_id);
                buf.put_u8(*num);
            }
        }
        Frame::new(self.msg_id(), seq, buf.freeze())
    }

    /// Parse a request frame, as the daemon side does
    ///
    /// Failures are returned as the error reply the daemon sends back.
    pub fn from_frame(frame: &Frame) -> Result<Self, DaemonError> {
        let mut p = frame.payload.clone();
        let need = |p: &Bytes, n: usize| {
            if p.len() < n {
                Err(DaemonError::BadLength)
            } else {
                Ok(())
            }
        };

        let request = match frame.msg_id {
            msg_id::GET_ENTRY => {
                need(&p, 4)?;
                Request::GetEntry {
                    node_id: p.get_u8(),
                    index: p.get_u16_le(),
                    sub_index: p.get_u8(),
                }
            }
            msg_id::SET_ENTRY => {
                need(&p, 4)?;
                Request::SetEntry {
                    node_id: p.get_u8(),
                    index: p.get_u16_le(),
                    sub_index: p.get_u8(),
                    data: p.to_vec(),
                }
            }
            msg_id::GET_STATE => {
                need(&p, 1)?;
                Request::GetState {
                    node_id: p.get_u8(),
                }
            }
            msg_id::NMT_COMMAND => {
                need(&p, 2)?;
                Request::SendNmtCommand {
                    node_id: p.get_u8(),
                    command: p.get_u8(),
                }
            }
            msg_id::LIST_NODES => Request::ListNodes,
            msg_id::SEND_EMCY => {
                need(&p, 7)?;
                Request::SendEmcy {
                    node_id: p.get_u8(),
                    code: p.get_u16_le(),
                    info: p.get_u32_le(),
                }
            }
            msg_id::SEND_TPDO => {
                need(&p, 2)?;
                Request::SendTpdo {
                    node_id: p.get_u8(),
                    num: p.get_u8(),
                }
            }
            other => return Err(DaemonError::UnknownMessage(other)),
        };
        Ok(request)
    }
}

/// Error reply from the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonError {
    /// The daemon does not know the message id
    UnknownMessage(u8),
    /// The request payload had the wrong length
    BadLength,
    /// The node has no TPDO with this number
    BadTpdo(u8),
    /// OD / SDO access aborted
    Abort(u32),
    /// No such node on the network
    UnknownNode(u8),
}

impl DaemonError {
    fn msg_id(&self) -> u8 {
        match self {
            DaemonError::UnknownMessage(_) => msg_id::ERROR_UNKNOWN_ID,
            DaemonError::BadLength => msg_id::ERROR_LENGTH,
            DaemonError::BadTpdo(_) => msg_id::ERROR_TPDO_NUM,
            DaemonError::Abort(_) => msg_id::ERROR_OD_ABORT,
            DaemonError::UnknownNode(_) => msg_id::ERROR_UNKNOWN_NODE,
        }
    }
}

/// Daemon response to one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Raw entry bytes
    Entry(Vec<u8>),
    /// Request accepted, no payload
    Ack,
    /// NMT state code
    State(u8),
    /// Known node ids
    Nodes(Vec<u8>),
    Error(DaemonError),
}

impl Response {
    /// Encode as the reply to a request with `request_id`
    ///
    /// Fails when a node list does not fit its one-byte count.
    pub fn to_frame(&self, request_id: u8, seq: u16) -> Result<Frame, TransportError> {
        let mut buf = BytesMut::new();
        let msg_id = match self {
            Response::Entry(data) => {
                buf.put_slice(data);
                request_id
            }
            Response::Ack => request_id,
            Response::State(code) => {
                buf.put_u8(*code);
                request_id
            }
            Response::Nodes(ids) => {
                let count = u8::try_from(ids.len()).map_err(|_| {
                    TransportError::MalformedFrame(format!(
                        "{} node ids do not fit a node list",
                        ids.len()
                    ))
                })?;
                buf.put_u8(count);
                buf.put_slice(ids);
                request_id
            }
            Response::Error(err) => {
                match err {
                    DaemonError::UnknownMessage(id) => buf.put_u8(*id),
                    DaemonError::BadLength => {}
                    DaemonError::BadTpdo(num) => buf.put_u8(*num),
                    DaemonError::Abort(code) => buf.put_u32_le(*code),
                    DaemonError::UnknownNode(node) => buf.put_u8(*node),
                }
                err.msg_id()
            }
        };
        Ok(Frame::new(msg_id, seq, buf.freeze()))
    }

    /// Parse a response frame
    pub fn from_frame(frame: &Frame) -> Result<Self, TransportError> {
        let mut p = frame.payload.clone();
        let short = |what: &str| {
            TransportError::MalformedFrame(format!("{} response payload too short", what))
        };

        let response = match frame.msg_id {
            msg_id::GET_ENTRY => Response::Entry(p.to_vec()),
            msg_id::SET_ENTRY | msg_id::NMT_COMMAND | msg_id::SEND_EMCY | msg_id::SEND_TPDO => {
                Response::Ack
            }
            msg_id::GET_STATE => {
                if p.is_empty() {
                    return Err(short("state"));
                }
                Response::State(p.get_u8())
            }
            msg_id::LIST_NODES => {
                if p.is_empty() {
                    return Err(short("node list"));
                }
                let count = p.get_u8() as usize;
                if p.len() < count {
                    return Err(short("node list"));
                }
                Response::Nodes(p[..count].to_vec())
            }
            msg_id::ERROR_UNKNOWN_ID => {
                Response::Error(DaemonError::UnknownMessage(first_byte(&p)))
            }
            msg_id::ERROR_LENGTH => Response::Error(DaemonError::BadLength),
            msg_id::ERROR_TPDO_NUM => Response::Error(DaemonError::BadTpdo(first_byte(&p))),
            msg_id::ERROR_OD_ABORT => {
                if p.len() < 4 {
                    return Err(short("abort"));
                }
                Response::Error(DaemonError::Abort(p.get_u32_le()))
            }
            msg_id::ERROR_UNKNOWN_NODE => {
                Response::Error(DaemonError::UnknownNode(first_byte(&p)))
            }
            other => {
                return Err(TransportError::MalformedFrame(format!(
                    "unexpected response id 0x{:02X}",
                    other
                )))
            }
        };
        Ok(response)
    }
}

fn first_byte(p: &Bytes) -> u8 {
    p.first().copied().unwrap_or(0)
}

/// Unsolicited daemon event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Heartbeat carrying a node's NMT state code
    Heartbeat { node_id: u8, state: u8 },
    /// Emergency message from a node
    Emergency { node_id: u8, code: u16, info: u32 },
    /// CAN bus status flags
    BusStatus(u8),
}

impl Event {
    pub fn to_frame(&self) -> Frame {
        let mut buf = BytesMut::new();
        let msg_id = match self {
            Event::Heartbeat { node_id, state } => {
                buf.put_u8(*node_id);
                buf.put_u8(*state);
                msg_id::EVENT_HEARTBEAT
            }
            Event::Emergency {
                node_id,
                code,
                info,
            } => {
                buf.put_u8(*node_id);
                buf.put_u16_le(*code);
                buf.put_u32_le(*info);
                msg_id::EVENT_EMCY
            }
            Event::BusStatus(status) => {
                buf.put_u8(*status);
                msg_id::EVENT_BUS_STATUS
            }
        };
        Frame::new(msg_id, EVENT_SEQ, buf.freeze())
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, TransportError> {
        let mut p = frame.payload.clone();
        let bad = || {
            TransportError::MalformedFrame(format!(
                "malformed event 0x{:02X} ({} bytes)",
                frame.msg_id,
                frame.payload.len()
            ))
        };

        match frame.msg_id {
            msg_id::EVENT_HEARTBEAT if p.len() >= 2 => Ok(Event::Heartbeat {
                node_id: p.get_u8(),
                state: p.get_u8(),
            }),
            msg_id::EVENT_EMCY if p.len() >= 7 => Ok(Event::Emergency {
                node_id: p.get_u8(),
                code: p.get_u16_le(),
                info: p.get_u32_le(),
            }),
            msg_id::EVENT_BUS_STATUS if !p.is_empty() => Ok(Event::BusStatus(p.get_u8())),
            _ => Err(bad()),
        }
    }

    /// Node the event came from, if any
    pub fn node_id(&self) -> Option<u8> {
        match self {
            Event::Heartbeat { node_id, .. } | Event::Emergency { node_id, .. } => Some(*node_id),
            Event::BusStatus(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn wire_body(frame: &Frame) -> Bytes {
        let mut encoded = frame.encode();
        let len = encoded.get_u32_le() as usize;
        assert_eq!(len, encoded.len());
        encoded
    }

    #[test]
    fn test_get_entry_layout() {
        let frame = Request::GetEntry {
            node_id: 0x10,
            index: 0x2000,
            sub_index: 1,
        }
        .to_frame(7);

        assert_eq!(
            frame.encode().to_vec(),
            vec![0x07, 0, 0, 0, 0x02, 0x07, 0x00, 0x10, 0x00, 0x20, 0x01]
        );
    }

    #[test]
    fn test_request_parse() {
        let request = Request::SetEntry {
            node_id: 3,
            index: 0x2000,
            sub_index: 2,
            data: vec![0xAA, 0xBB],
        };
        let frame = Frame::parse(wire_body(&request.to_frame(42))).unwrap();
        assert_eq!(frame.seq, 42);
        assert_eq!(Request::from_frame(&frame).unwrap(), request);
    }

    #[test]
    fn test_short_request_is_length_error() {
        let frame = Frame::new(msg_id::GET_ENTRY, 1, vec![0x01, 0x00]);
        assert_eq!(Request::from_frame(&frame), Err(DaemonError::BadLength));

        let frame = Frame::new(0x42, 1, Vec::<u8>::new());
        assert_eq!(
            Request::from_frame(&frame),
            Err(DaemonError::UnknownMessage(0x42))
        );
    }

    #[test]
    fn test_abort_response() {
        let frame = Response::Error(DaemonError::Abort(abort::OBJECT_NOT_FOUND))
            .to_frame(msg_id::GET_ENTRY, 9)
            .unwrap();
        assert_eq!(frame.msg_id, msg_id::ERROR_OD_ABORT);
        assert_eq!(frame.payload.to_vec(), vec![0x00, 0x00, 0x02, 0x06]);
        assert_eq!(
            Response::from_frame(&frame).unwrap(),
            Response::Error(DaemonError::Abort(0x0602_0000))
        );
    }

    #[test]
    fn test_node_list_response() {
        let frame = Response::Nodes(vec![1, 2, 5])
            .to_frame(msg_id::LIST_NODES, 3)
            .unwrap();
        assert_eq!(
            Response::from_frame(&frame).unwrap(),
            Response::Nodes(vec![1, 2, 5])
        );

        // The count is one byte; 256 ids must not wrap to an empty list
        let every_id: Vec<u8> = (0..=u8::MAX).collect();
        assert!(matches!(
            Response::Nodes(every_id).to_frame(msg_id::LIST_NODES, 4),
            Err(TransportError::MalformedFrame(_))
        ));
        let most_ids: Vec<u8> = (0..u8::MAX).collect();
        let frame = Response::Nodes(most_ids.clone())
            .to_frame(msg_id::LIST_NODES, 4)
            .unwrap();
        assert_eq!(frame.payload[0], u8::MAX);
        assert_eq!(Response::from_frame(&frame).unwrap(), Response::Nodes(most_ids));

        let truncated = Frame::new(msg_id::LIST_NODES, 3, vec![4, 1]);
        assert!(Response::from_frame(&truncated).is_err());
    }

    #[test]
    fn test_events_use_seq_zero() {
        let frame = Event::Heartbeat {
            node_id: 2,
            state: 0x05,
        }
        .to_frame();
        assert!(frame.is_event());
        assert_eq!(
            Event::from_frame(&frame).unwrap(),
            Event::Heartbeat {
                node_id: 2,
                state: 0x05
            }
        );
        assert!(Event::from_frame(&Frame::new(msg_id::EVENT_EMCY, 0, vec![1])).is_err());
    }

    #[test]
    fn test_frame_length_limits() {
        assert!(Frame::check_len(2).is_err());
        assert!(Frame::check_len(3).is_ok());
        assert!(Frame::check_len(MAX_FRAME_LEN as u32 + 1).is_err());
        assert!(Frame::parse(Bytes::from_static(&[0x02])).is_err());
    }

    #[test]
    fn test_abort_descriptions() {
        assert!(abort::is_not_found(abort::SUB_INDEX_NOT_FOUND));
        assert!(!abort::is_not_found(abort::READ_ONLY));
        assert_eq!(
            abort::description(abort::DEVICE_STATE),
            "Data cannot be transferred because of the present device state"
        );
    }
}
