// ABOUTME: Validated domain types for a transfer invocation.
// ABOUTME: Image references, SSH targets, container ids, and the parsed request.

mod host_spec;
mod id;
mod image_ref;
mod request;

pub use host_spec::{HostSpec, HostSpecError};
pub use id::ContainerId;
pub use image_ref::{ImageRef, ParseImageRefError};
pub use request::{RequestError, TransferRequest};
