pub mod attachments;

pub use attachments::{AttachmentStore, StoredAttachment};
