//! # Domain Models
//!
//! These structs represent the core entities of the portfolio backend.
//! We use UUID v7 for time-ordered, globally unique identification.

pub mod email;
pub mod media;
pub mod message;
pub mod notification;
pub mod page;
pub mod session;

pub use email::EmailAddress;
pub use media::{
    normalize_skills, split_skills, AssetRef, MediaAsset, MediaEdit, MediaFilter, MediaKind,
    MediaSource, NewMedia, ResourceKind, UploadPayload, UploadSignature,
};
pub use message::{Message, MessageStatus, Submission, SubmitOutcome, MESSAGE_SEPARATOR};
pub use notification::Notification;
pub use page::{Page, PageRequest, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
pub use session::AdminSession;
