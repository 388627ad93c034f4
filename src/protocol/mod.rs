//! Wire protocol: framing codec and the typed request/response schema.

pub mod codec;
pub mod request;
pub mod response;

pub use codec::{FrameCodec, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE};
pub use request::Request;
pub use response::Response;

// Field names shared by requests and responses.
pub const KEY_TYPE: &str = "type";
pub const KEY_QUESTION_ID: &str = "question_id";
pub const KEY_RESPONSE: &str = "response";
pub const KEY_STATUS: &str = "status";
pub const KEY_VALUE: &str = "value";
pub const KEY_EXCEPTION: &str = "exception";

pub const TYPE_START: &str = "start";
pub const TYPE_CONTINUE: &str = "continue";

pub const STATUS_OK: &str = "ok";
pub const STATUS_DONE: &str = "done";
pub const STATUS_ERROR: &str = "error";
