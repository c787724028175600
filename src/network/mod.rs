pub mod annotation;

pub use annotation::{
    parse_network_status, pod_attachments, Attachment, NETWORK_STATUS_ANNOTATION,
};
