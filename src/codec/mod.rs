//! Driver station wire codec
//!
//! Stateless encoding and decoding of the handshake, status, control and
//! telemetry packets. No I/O happens here.

pub mod encoder;
pub mod decoder;

pub use encoder::{encode_control_packet, encode_frame, encode_handshake_reply, ControlPacket};
pub use decoder::{
    decode_handshake_request, decode_status, decode_telemetry, frame_type, RobotStatus, Telemetry,
};
