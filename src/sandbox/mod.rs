//! Sandboxed code execution
//!
//! Guest code runs in a throwaway Docker container under a fixed isolation
//! policy: no network, read-only root filesystem, small no-exec scratch
//! mounts, all capabilities dropped, a non-root numeric user and explicit
//! memory/CPU/PID ceilings.
//!
//! # Example Usage
//!
//! ```ignore
//! use cody::sandbox::{CodeRunner, DockerExecutor, SandboxPolicy};
//!
//! let result = DockerExecutor::new()
//!     .run("print(6 * 7)", &SandboxPolicy::default())
//!     .await;
//! ```

pub mod executor;
pub mod policy;

pub use executor::{
    CodeRunner, DockerExecutor, ExecOutput, SandboxError, SandboxErrorKind, SandboxResult,
};
pub use policy::SandboxPolicy;
