mod encapsulation;
mod operation_info;
mod operation_mode;
mod reply_frame;
mod reply_status;
mod request_frame;

pub use encapsulation::Encapsulation;
pub use operation_info::{
    ICE_ID, ICE_IDS, ICE_IS_A, ICE_PING, OBJECT_TYPE_ID, OperationInfo, PSEUDO_OPERATIONS,
    is_sorted_by_name,
};
pub use operation_mode::OperationMode;
pub use reply_frame::{ReplyFrame, RequestFailed};
pub use reply_status::ReplyStatus;
pub use request_frame::RequestFrame;
