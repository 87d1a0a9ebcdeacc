//! Wire protocol spoken between crater actors and the relay.
//!
//! Actors declare their role once with CONFIGURE, then pull records with
//! GET_DATA and push them with GIVE_DATA. See [`codec`] for the byte layout.

pub mod codec;
mod error;
mod frame_buffer;
mod message;

pub use codec::{Decoded, FrameHeader, MAX_BODY_LEN, decode_frame, peek_header, record_cost};
pub use error::FramingError;
pub use frame_buffer::{FrameBuffer, READ_CHUNK, SHARE_MIN};
pub use message::{Channel, Configure, GetData, GiveData, Limit, Message, MessageId, Role};
