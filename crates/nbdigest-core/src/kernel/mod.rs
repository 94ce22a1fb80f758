//! Jupyter kernel plumbing.
//!
//! - [`spec`]: find and probe kernels
//! - [`connection`]: ports and keys handed to the kernel
//! - [`protocol`]: signed multipart message framing
//! - [`outputs`]: iopub messages → notebook outputs
//! - [`session`]: one running kernel process

pub mod connection;
pub mod outputs;
pub mod protocol;
pub mod session;
pub mod spec;

pub use connection::ConnectionInfo;
pub use outputs::{CollectState, OutputCollector};
pub use protocol::{Message, Signer};
pub use session::{CellRun, KernelOptions, KernelSession, ReplyStatus};
pub use spec::KernelSpec;
