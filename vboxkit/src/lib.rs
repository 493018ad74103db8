//! vboxkit - drive VirtualBox machines through the `vboxmanage` CLI.
//!
//! ## Layers
//!
//! - [`invoker`]: run one external command, capture or stream both output
//!   channels, enforce a deadline
//! - [`poller`]: sample a probe until it yields a value or time runs out
//! - [`properties`]: parse the tool's `KEY=VALUE` and guest-property dumps
//! - [`descriptor`]: cached view and surgical edits of `.vbox` files
//! - [`VboxRuntime`] / [`VirtualMachine`]: host queries and the per-machine
//!   facade composed from the layers above
//!
//! ```no_run
//! # async fn demo() -> vboxkit::VboxResult<()> {
//! use std::time::Duration;
//! use vboxkit::{ToolConfig, VboxRuntime};
//!
//! let runtime = VboxRuntime::new(ToolConfig::from_env());
//! let vm = runtime.machine("ubuntu-22");
//! vm.start(true).await?;
//! let ip = vm.wait_network_up(Some(Duration::from_secs(120))).await?;
//! println!("guest is up at {ip}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod descriptor;
pub mod invoker;
pub mod logging;
pub mod machine;
pub mod poller;
pub mod properties;
pub mod runtime;
pub mod shell;
pub(crate) mod util;

pub use config::ToolConfig;
pub use descriptor::{AttachedMediaRecord, ConfigCache, ConfigEditor, DescriptorTree, SnapshotRecord};
pub use invoker::{CommandLine, CommandResult, CommandRunner, ProcessRunner, RunOptions, StreamOptions};
pub use logging::{LoggingOptions, init_logging};
pub use machine::{
    AdapterSettings, AttachmentKind, Credentials, GuestRunOptions, GuestSession, MoveOptions,
    MoveReport, UsbController, VirtualMachine,
};
pub use poller::{PollOptions, PollOutcome, poll, poll_until};
pub use runtime::VboxRuntime;
pub use shell::{GuestShell, WindowsShell};
pub use vboxkit_shared::errors::{VboxError, VboxResult};
